use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cathode_common::error::Result;
use cathode_common::traits::{Presentation, PresentationInput};
use cathode_common::types::{Capabilities, Size};
use tokio::sync::mpsc;

/// A presentation with no terminal behind it: input is scripted, output
/// is captured. The session driver for tests and recordings.
pub struct HeadlessPresentation {
    size: Size,
    capabilities: Capabilities,
    input_rx: mpsc::UnboundedReceiver<PresentationInput>,
    output: Arc<Mutex<Vec<u8>>>,
    raw_mode: Arc<Mutex<bool>>,
    consumes_impacts: bool,
}

/// Driver handle: push input, inspect captured output.
#[derive(Clone)]
pub struct HeadlessHandle {
    pub input: mpsc::UnboundedSender<PresentationInput>,
    output: Arc<Mutex<Vec<u8>>>,
    raw_mode: Arc<Mutex<bool>>,
}

impl HeadlessPresentation {
    pub fn new(size: Size, capabilities: Capabilities) -> (Self, HeadlessHandle) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let output = Arc::new(Mutex::new(Vec::new()));
        let raw_mode = Arc::new(Mutex::new(false));
        (
            Self {
                size,
                capabilities,
                input_rx,
                output: Arc::clone(&output),
                raw_mode: Arc::clone(&raw_mode),
                consumes_impacts: false,
            },
            HeadlessHandle {
                input: input_tx,
                output,
                raw_mode,
            },
        )
    }

    /// Mark this presentation as consuming applied tokens instead of
    /// re-serialized bytes.
    pub fn with_impacts(mut self) -> Self {
        self.consumes_impacts = true;
        self
    }
}

impl HeadlessHandle {
    pub fn send_bytes(&self, bytes: &[u8]) {
        let _ = self.input.send(PresentationInput::Bytes(bytes.to_vec()));
    }

    pub fn send_resize(&self, size: Size) {
        let _ = self.input.send(PresentationInput::Resized(size, None));
    }

    pub fn disconnect(&self) {
        let _ = self.input.send(PresentationInput::Disconnected);
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn raw_mode(&self) -> bool {
        *self.raw_mode.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Presentation for HeadlessPresentation {
    fn size(&self) -> Size {
        self.size
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn write_output(&mut self, bytes: &[u8]) -> Result<()> {
        self.output
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(bytes);
        Ok(())
    }

    async fn read_input(&mut self) -> Result<PresentationInput> {
        match self.input_rx.recv().await {
            Some(PresentationInput::Resized(size, metrics)) => {
                self.size = size;
                Ok(PresentationInput::Resized(size, metrics))
            }
            Some(input) => Ok(input),
            None => Ok(PresentationInput::Disconnected),
        }
    }

    async fn enter_raw_mode(&mut self) -> Result<()> {
        *self.raw_mode.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }

    async fn exit_raw_mode(&mut self) -> Result<()> {
        *self.raw_mode.lock().unwrap_or_else(|e| e.into_inner()) = false;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn consumes_impacts(&self) -> bool {
        self.consumes_impacts
    }
}
