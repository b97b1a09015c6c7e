use async_trait::async_trait;

use crate::error::Result;
use crate::input::InputEvent;
use crate::types::{Capabilities, Size};

/// What a presentation read produced. Resize and disconnect arrive in-band
/// with input so a single reader task can observe all three.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationInput {
    Bytes(Vec<u8>),
    /// New dimensions, plus cell pixel metrics when the presentation knows
    /// them (e.g. a WebSocket control message carrying `cellWidth`).
    Resized(Size, Option<(f32, f32)>),
    Disconnected,
}

/// The human-facing side of a session: a real TTY, a WebSocket peer, or a
/// headless capture.
#[async_trait]
pub trait Presentation: Send {
    fn size(&self) -> Size;

    fn capabilities(&self) -> Capabilities;

    async fn write_output(&mut self, bytes: &[u8]) -> Result<()>;

    /// Wait for the next input. `Bytes(vec![])` means EOF.
    async fn read_input(&mut self) -> Result<PresentationInput>;

    async fn enter_raw_mode(&mut self) -> Result<()>;

    async fn exit_raw_mode(&mut self) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;

    /// Whether this presentation consumes applied tokens (token + cell
    /// impacts) instead of re-serialized bytes. Headless snapshot
    /// consumers use this; real terminals never do.
    fn consumes_impacts(&self) -> bool {
        false
    }
}

/// The application-facing side of a session: the UI app, a PTY child, or a
/// recording being replayed.
#[async_trait]
pub trait Workload: Send {
    /// Wait for output bytes. An empty chunk marks a frame boundary, not
    /// EOF; disconnection is an `Adapter` error.
    async fn read_output(&mut self) -> Result<Vec<u8>>;

    async fn write_input(&mut self, bytes: &[u8]) -> Result<()>;

    async fn resize(&mut self, size: Size) -> Result<()>;

    /// Deliver a structured event. Returns `Ok(false)` when this workload
    /// only takes raw bytes, in which case the mediator falls back to
    /// `write_input`.
    async fn write_input_event(&mut self, _event: InputEvent) -> Result<bool> {
        Ok(false)
    }
}
