mod headless;
mod pty;
mod tty;
mod ui;
mod websocket;

pub use headless::{HeadlessHandle, HeadlessPresentation};
pub use pty::PtyWorkload;
pub use tty::TtyPresentation;
pub use ui::{UiWorkload, UiWorkloadHandle};
pub use websocket::WebSocketPresentation;
