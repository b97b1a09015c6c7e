mod compositor;
mod surface;

pub use compositor::{diff_cells, Compositor, CursorState};
pub use surface::{RenderContext, Style, Surface};
