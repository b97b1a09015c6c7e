pub mod bindings;
pub mod config;
pub mod focus;
pub mod input;
pub mod layout;
pub mod popup;
pub mod reconcile;
pub mod runtime;
pub mod timer;
pub mod widget;
pub mod widgets;

pub use config::RuntimeConfig;
pub use runtime::{App, AppCommand, AppController};
pub use widget::{Node, NodeBase, Widget};

/// Display width of a string, in cells.
pub fn width_of(text: &str) -> u16 {
    cathode_core::width::graphemes(text)
        .map(cathode_core::width::grapheme_width)
        .sum()
}
