pub mod adapters;
pub mod asciicast;
pub mod session;
pub mod surface;
pub mod term;
pub mod width;

pub use session::{FilterChains, Mediator, SessionFilter};
pub use surface::{Compositor, CursorState, RenderContext, Style, Surface};
pub use term::{AppliedToken, CellWrite, Cursor, Emulator, EmulatorEvent, EmulatorOptions};
