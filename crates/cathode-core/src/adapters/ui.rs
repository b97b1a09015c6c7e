use async_trait::async_trait;
use cathode_common::error::{CathodeError, Result};
use cathode_common::input::InputEvent;
use cathode_common::traits::Workload;
use cathode_common::types::{Capabilities, Size};
use cathode_parser::{StreamDirection, Tokenizer};
use tokio::sync::mpsc;

use crate::session::tokens_to_events;

/// The workload side of a UI application: frames flow out as byte chunks
/// (empty chunk = frame boundary), input arrives as structured events.
pub struct UiWorkload {
    output_rx: mpsc::Receiver<Vec<u8>>,
    event_tx: mpsc::UnboundedSender<InputEvent>,
    raw_input_tokenizer: Tokenizer,
    capabilities: Capabilities,
}

/// The application's handle: produce frames, consume events.
pub struct UiWorkloadHandle {
    pub frames: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::UnboundedReceiver<InputEvent>,
    pub capabilities: Capabilities,
}

impl UiWorkload {
    pub fn new(capabilities: Capabilities) -> (Self, UiWorkloadHandle) {
        let (frame_tx, output_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                output_rx,
                event_tx,
                raw_input_tokenizer: Tokenizer::new(StreamDirection::Input),
                capabilities,
            },
            UiWorkloadHandle {
                frames: frame_tx,
                events: event_rx,
                capabilities,
            },
        )
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

#[async_trait]
impl Workload for UiWorkload {
    async fn read_output(&mut self) -> Result<Vec<u8>> {
        self.output_rx
            .recv()
            .await
            .ok_or_else(|| CathodeError::Adapter("UI application closed".into()))
    }

    /// Raw bytes written to a UI workload (e.g. status replies) are
    /// tokenized and delivered as events like any other input.
    async fn write_input(&mut self, bytes: &[u8]) -> Result<()> {
        let tokens = self.raw_input_tokenizer.advance(bytes);
        for event in tokens_to_events(&tokens) {
            self.event_tx
                .send(event)
                .map_err(|_| CathodeError::Channel("UI event channel closed".into()))?;
        }
        Ok(())
    }

    async fn resize(&mut self, size: Size) -> Result<()> {
        self.event_tx
            .send(InputEvent::Resize(size))
            .map_err(|_| CathodeError::Channel("UI event channel closed".into()))
    }

    async fn write_input_event(&mut self, event: InputEvent) -> Result<bool> {
        self.event_tx
            .send(event)
            .map_err(|_| CathodeError::Channel("UI event channel closed".into()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cathode_common::input::{KeyCode, KeyEvent};

    #[tokio::test]
    async fn frames_and_events_flow() {
        let (mut workload, mut handle) = UiWorkload::new(Capabilities::default());

        handle.frames.send(b"frame".to_vec()).await.unwrap();
        assert_eq!(workload.read_output().await.unwrap(), b"frame");

        let delivered = workload
            .write_input_event(InputEvent::Key(KeyEvent::plain(KeyCode::Enter)))
            .await
            .unwrap();
        assert!(delivered);
        assert_eq!(
            handle.events.recv().await,
            Some(InputEvent::Key(KeyEvent::plain(KeyCode::Enter)))
        );

        workload.resize(Size::new(10, 5)).await.unwrap();
        assert_eq!(
            handle.events.recv().await,
            Some(InputEvent::Resize(Size::new(10, 5)))
        );
    }

    #[tokio::test]
    async fn closed_app_reads_as_disconnect() {
        let (mut workload, handle) = UiWorkload::new(Capabilities::default());
        drop(handle);
        assert!(workload.read_output().await.is_err());
    }
}
