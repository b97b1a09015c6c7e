use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cathode_common::error::{CathodeError, Result};
use cathode_common::input::{InputEvent, KeyCode, KeyEvent};
use cathode_common::traits::Workload;
use cathode_common::types::{Capabilities, Size};
use cathode_core::adapters::{HeadlessPresentation, UiWorkload};
use cathode_core::session::SessionFilter;
use cathode_core::{FilterChains, Mediator};
use cathode_parser::Token;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const EXIT_TAIL: &str = "\x1b[?1000l\x1b[?1002l\x1b[?1003l\x1b[?1006l\x1b[0m\x1b[?25h\x1b[?1049l";

/// A workload scripted from the test: queued output chunks, captured
/// input writes.
struct ScriptWorkload {
    output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptWorkload {
    fn new() -> (Self, mpsc::UnboundedSender<Vec<u8>>, Arc<Mutex<Vec<u8>>>) {
        let (tx, output_rx) = mpsc::unbounded_channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                output_rx,
                written: Arc::clone(&written),
            },
            tx,
            written,
        )
    }
}

#[async_trait]
impl Workload for ScriptWorkload {
    async fn read_output(&mut self) -> Result<Vec<u8>> {
        match self.output_rx.recv().await {
            Some(bytes) => Ok(bytes),
            None => Err(CathodeError::Adapter("script finished".into())),
        }
    }

    async fn write_input(&mut self, bytes: &[u8]) -> Result<()> {
        self.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    async fn resize(&mut self, _size: Size) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn fast_path_forwards_bytes_verbatim_and_tracks_state() {
    let size = Size::new(10, 3);
    let (presentation, handle) = HeadlessPresentation::new(size, Capabilities::default());
    let (workload, frames, _written) = ScriptWorkload::new();
    let cancel = CancellationToken::new();

    let mediator = Mediator::new(presentation, workload, cancel.clone());
    let emulator = mediator.emulator();
    let task = tokio::spawn(mediator.run());

    frames.send(b"hello".to_vec()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let emu = emulator.lock().unwrap();
        assert_eq!(emu.grid().row_text(0), "hello     ");
    }

    cancel.cancel();
    task.await.unwrap().unwrap();

    let output = String::from_utf8(handle.output()).unwrap();
    assert!(output.starts_with("hello"), "got: {output:?}");
    assert!(output.ends_with(EXIT_TAIL), "exit block missing: {output:?}");
    assert!(!handle.raw_mode(), "raw mode must be left on shutdown");
}

#[tokio::test]
async fn presentation_input_becomes_ui_events() {
    let size = Size::new(10, 3);
    let (presentation, handle) = HeadlessPresentation::new(size, Capabilities::default());
    let (workload, mut ui) = UiWorkload::new(Capabilities::default());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(Mediator::new(presentation, workload, cancel.clone()).run());

    // First event is the initial resize pushed at session start.
    assert_eq!(ui.events.recv().await, Some(InputEvent::Resize(size)));

    handle.send_bytes(b"\x1b[B");
    assert_eq!(
        ui.events.recv().await,
        Some(InputEvent::Key(KeyEvent::plain(KeyCode::Down)))
    );

    handle.send_bytes(b"ok");
    assert_eq!(ui.events.recv().await, Some(InputEvent::Text("ok".into())));

    handle.send_resize(Size::new(20, 6));
    assert_eq!(
        ui.events.recv().await,
        Some(InputEvent::Resize(Size::new(20, 6)))
    );

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn dsr_requests_are_answered_to_the_workload() {
    let size = Size::new(10, 3);
    let (presentation, _handle) = HeadlessPresentation::new(size, Capabilities::default());
    let (workload, frames, written) = ScriptWorkload::new();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Mediator::new(presentation, workload, cancel.clone()).run());

    frames.send(b"\x1b[2;5H\x1b[6n".to_vec()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(written.lock().unwrap().as_slice(), b"\x1b[2;5R");

    cancel.cancel();
    task.await.unwrap().unwrap();
}

/// A presentation-output filter that rewrites text tokens; the mediator
/// must then re-serialize instead of forwarding the original bytes.
struct Redactor;

impl SessionFilter for Redactor {
    fn on_applied_output(
        &mut self,
        applied: &mut Vec<cathode_core::AppliedToken>,
        _elapsed: Duration,
    ) {
        for token in applied {
            if let Token::Text(text) = &mut token.token {
                *text = text.replace("secret", "******");
            }
        }
    }
}

#[tokio::test]
async fn presentation_filters_transform_the_stream() {
    let size = Size::new(20, 3);
    let (presentation, handle) = HeadlessPresentation::new(size, Capabilities::default());
    let (workload, frames, _written) = ScriptWorkload::new();
    let cancel = CancellationToken::new();

    let mut filters = FilterChains::default();
    filters.presentation_output.push(Box::new(Redactor));
    let mediator = Mediator::new(presentation, workload, cancel.clone()).with_filters(filters);
    let emulator = mediator.emulator();
    let task = tokio::spawn(mediator.run());

    frames.send(b"a secret thing".to_vec()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The emulator saw the real bytes; the presentation got the filtered
    // stream.
    assert_eq!(
        emulator.lock().unwrap().grid().row_text(0),
        "a secret thing      "
    );
    let output = String::from_utf8(handle.output()).unwrap();
    assert!(output.contains("a ****** thing"), "got: {output:?}");
    assert!(!output.contains("secret"));

    cancel.cancel();
    task.await.unwrap().unwrap();
}

/// Session-lifecycle hooks fire in order with an always-emitted exit
/// sequence, even when the workload disconnects on its own.
struct LifecycleProbe {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl SessionFilter for LifecycleProbe {
    fn on_session_start(&mut self, _size: Size, _title: &str) {
        self.log.lock().unwrap().push("start");
    }

    fn on_frame_complete(&mut self, _elapsed: Duration) {
        self.log.lock().unwrap().push("frame");
    }

    fn on_session_end(&mut self, _elapsed: Duration) {
        self.log.lock().unwrap().push("end");
    }
}

#[tokio::test]
async fn lifecycle_hooks_and_exit_on_disconnect() {
    let size = Size::new(10, 3);
    let (presentation, handle) = HeadlessPresentation::new(size, Capabilities::default());
    let (workload, frames, _written) = ScriptWorkload::new();
    let cancel = CancellationToken::new();

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut filters = FilterChains::default();
    filters.workload_output.push(Box::new(LifecycleProbe {
        log: Arc::clone(&log),
    }));

    let task = tokio::spawn(
        Mediator::new(presentation, workload, cancel.clone())
            .with_filters(filters)
            .run(),
    );

    frames.send(Vec::new()).unwrap(); // frame boundary
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(frames); // workload disconnect
    task.await.unwrap().unwrap();

    assert_eq!(log.lock().unwrap().as_slice(), &["start", "frame", "end"]);
    let output = String::from_utf8(handle.output()).unwrap();
    assert!(output.ends_with(EXIT_TAIL));
}
