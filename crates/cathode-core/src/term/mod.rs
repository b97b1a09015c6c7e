mod emulator;
mod grid;
mod tracked;

pub use emulator::{
    AppliedToken, CellWrite, Cursor, Emulator, EmulatorEvent, EmulatorOptions,
};
pub use grid::Grid;
pub use tracked::TrackedStore;
