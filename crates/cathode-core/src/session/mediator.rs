use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cathode_common::error::Result;
use cathode_common::input::{InputEvent, KeyCode, KeyEvent, Modifiers, MouseEvent};
use cathode_common::traits::{Presentation, PresentationInput, Workload};
use cathode_common::types::Size;
use cathode_parser::token::Token;
use cathode_parser::{serialize, StreamDirection, Tokenizer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::filter::FilterChains;
use crate::term::{AppliedToken, Emulator, EmulatorOptions};

/// Shutdown block, emitted in this order so the parent shell never
/// inherits mouse reports, inverted attributes, or a hidden cursor:
/// mouse off, attribute reset, cursor show, alternate screen exit.
const EXIT_SEQUENCE: &[u8] =
    b"\x1b[?1000l\x1b[?1002l\x1b[?1003l\x1b[?1006l\x1b[0m\x1b[?25h\x1b[?1049l";

#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Sleep after a workload frame boundary to avoid a busy poll loop.
    pub frame_idle: Duration,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            frame_idle: Duration::from_millis(1),
        }
    }
}

/// Shuttles bytes between a presentation and a workload, tokenizing both
/// directions, maintaining the virtual terminal, and running the filter
/// chains. The two pump directions are multiplexed over one select loop;
/// cancellation is observed at every wait and the exit sequence is always
/// emitted on the way out.
pub struct Mediator<P: Presentation, W: Workload> {
    presentation: P,
    workload: W,
    emulator: Arc<Mutex<Emulator>>,
    filters: FilterChains,
    config: MediatorConfig,
    cancel: CancellationToken,
    started: Instant,
    input_tokenizer: Tokenizer,
    output_tokenizer: Tokenizer,
    impact_sink: Option<mpsc::UnboundedSender<AppliedToken>>,
}

impl<P: Presentation, W: Workload> Mediator<P, W> {
    pub fn new(presentation: P, workload: W, cancel: CancellationToken) -> Self {
        let size = presentation.size();
        let caps = presentation.capabilities();
        let emulator = Emulator::with_options(
            size,
            EmulatorOptions {
                handles_alternate_screen_natively: caps.native_alternate_screen,
                cell_px: (caps.cell_px_w, caps.cell_px_h),
            },
        );
        Self {
            presentation,
            workload,
            emulator: Arc::new(Mutex::new(emulator)),
            filters: FilterChains::default(),
            config: MediatorConfig::default(),
            cancel,
            started: Instant::now(),
            input_tokenizer: Tokenizer::new(StreamDirection::Input),
            output_tokenizer: Tokenizer::new(StreamDirection::Output),
            impact_sink: None,
        }
    }

    pub fn with_filters(mut self, filters: FilterChains) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_config(mut self, config: MediatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a consumer for applied tokens; implied by a presentation
    /// whose `consumes_impacts` is true.
    pub fn with_impact_sink(mut self, sink: mpsc::UnboundedSender<AppliedToken>) -> Self {
        self.impact_sink = Some(sink);
        self
    }

    /// Shared handle to the session's virtual terminal, for snapshot
    /// readers. Lock scope must stay short; the pump takes the same lock
    /// per chunk.
    pub fn emulator(&self) -> Arc<Mutex<Emulator>> {
        Arc::clone(&self.emulator)
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub async fn run(mut self) -> Result<()> {
        let size = self.presentation.size();
        info!(width = size.width, height = size.height, "session starting");
        self.presentation.enter_raw_mode().await?;
        self.workload.resize(size).await.ok();
        let title = self.emulator.lock().unwrap_or_else(|e| e.into_inner()).title().to_string();
        self.filters
            .for_each(|f| f.on_session_start(size, &title));

        let outcome = self.pump_loop().await;

        // The exit block is unconditional: raw mode is only left after
        // the terminal state has been put back.
        let _ = self.presentation.write_output(EXIT_SEQUENCE).await;
        let _ = self.presentation.flush().await;
        let _ = self.presentation.exit_raw_mode().await;
        let elapsed = self.elapsed();
        self.filters.for_each(|f| f.on_session_end(elapsed));
        info!("session ended");
        outcome
    }

    async fn pump_loop(&mut self) -> Result<()> {
        loop {
            let Self {
                presentation,
                workload,
                cancel,
                ..
            } = self;
            let action = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                input = presentation.read_input() => PumpAction::Input(input?),
                output = workload.read_output() => PumpAction::Output(output),
            };
            match action {
                PumpAction::Input(PresentationInput::Bytes(bytes)) if bytes.is_empty() => {
                    debug!("presentation EOF");
                    return Ok(());
                }
                PumpAction::Input(PresentationInput::Bytes(bytes)) => {
                    self.handle_presentation_bytes(&bytes).await?;
                }
                PumpAction::Input(PresentationInput::Resized(size, metrics)) => {
                    self.handle_resize(size, metrics).await?;
                }
                PumpAction::Input(PresentationInput::Disconnected) => {
                    debug!("presentation disconnected");
                    return Ok(());
                }
                PumpAction::Output(Err(err)) => {
                    debug!(%err, "workload disconnected");
                    return Ok(());
                }
                PumpAction::Output(Ok(bytes)) if bytes.is_empty() => {
                    let elapsed = self.elapsed();
                    self.filters.for_each(|f| f.on_frame_complete(elapsed));
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.config.frame_idle) => {}
                    }
                }
                PumpAction::Output(Ok(bytes)) => {
                    self.handle_workload_bytes(&bytes).await?;
                }
            }
        }
    }

    /// Presentation → workload: tokenize, filter, then either deliver
    /// structured events (UI-app workloads) or the raw bytes (children).
    async fn handle_presentation_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut tokens = self.input_tokenizer.advance(bytes);
        let elapsed = self.elapsed();
        for filter in &mut self.filters.presentation_input {
            filter.on_input(&mut tokens, elapsed);
        }

        let events = tokens_to_events(&tokens);
        let mut delivered = !events.is_empty();
        for event in events {
            if !self.workload.write_input_event(event).await? {
                delivered = false;
                break;
            }
        }
        if !delivered {
            // Raw workload (or bytes with no event mapping): forward the
            // original bytes untouched.
            self.workload.write_input(bytes).await?;
        }
        Ok(())
    }

    async fn handle_resize(&mut self, size: Size, metrics: Option<(f32, f32)>) -> Result<()> {
        debug!(width = size.width, height = size.height, "resize");
        {
            let mut emulator = self.emulator.lock().unwrap_or_else(|e| e.into_inner());
            emulator.resize(size);
            if let Some(metrics) = metrics {
                emulator.set_cell_metrics(metrics);
            }
        }
        self.workload.resize(size).await.ok();
        let elapsed = self.elapsed();
        self.filters.for_each(|f| f.on_resize(size, elapsed));
        Ok(())
    }

    /// Workload → presentation. The fast path applies tokens for snapshot
    /// fidelity and forwards the original bytes verbatim; the general
    /// path runs filters, collects impacts, and re-serializes when the
    /// stream was transformed.
    async fn handle_workload_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let fast_path = self.filters.workload_output.is_empty()
            && self.filters.presentation_output.is_empty()
            && !self.presentation.consumes_impacts()
            && self.impact_sink.is_none();

        let mut tokens = self.output_tokenizer.advance(bytes);
        let elapsed = self.elapsed();

        if fast_path {
            let responses = {
                let mut emulator = self.emulator.lock().unwrap_or_else(|e| e.into_inner());
                for token in &tokens {
                    emulator.apply(token);
                }
                emulator.take_responses()
            };
            self.write_responses(responses).await?;
            self.presentation.write_output(bytes).await?;
            self.presentation.flush().await?;
            return Ok(());
        }

        for filter in &mut self.filters.workload_output {
            filter.on_output(&mut tokens, elapsed);
        }

        let (mut applied, responses) = {
            let mut emulator = self.emulator.lock().unwrap_or_else(|e| e.into_inner());
            let applied: Vec<AppliedToken> = tokens
                .into_iter()
                .map(|token| emulator.apply_with_impacts(token))
                .collect();
            let responses = emulator.take_responses();
            (applied, responses)
        };
        self.write_responses(responses).await?;

        let mut sink_closed = false;
        if let Some(sink) = &self.impact_sink {
            for token in &applied {
                if sink.send(token.clone()).is_err() {
                    warn!("impact sink closed");
                    sink_closed = true;
                    break;
                }
            }
        }
        if sink_closed {
            self.impact_sink = None;
        }

        if self.presentation.consumes_impacts() {
            // The presentation consumed the applied stream via the sink;
            // nothing further to write.
            return Ok(());
        }

        if self.filters.presentation_output.is_empty() {
            self.presentation.write_output(bytes).await?;
        } else {
            for filter in &mut self.filters.presentation_output {
                filter.on_applied_output(&mut applied, elapsed);
            }
            let tokens: Vec<Token> = applied.into_iter().map(|a| a.token).collect();
            let out = serialize(&tokens);
            self.presentation.write_output(&out).await?;
        }
        self.presentation.flush().await?;
        Ok(())
    }

    /// DSR replies queue behind the token that produced them and ahead of
    /// any following chunk.
    async fn write_responses(&mut self, responses: Vec<Vec<u8>>) -> Result<()> {
        for response in responses {
            self.workload.write_input(&response).await?;
        }
        Ok(())
    }
}

enum PumpAction {
    Input(PresentationInput),
    Output(Result<Vec<u8>>),
}

/// Convert input-direction tokens into structured events. Tokens with no
/// event mapping (unrecognized sequences, stray SS3 finals) are dropped.
pub fn tokens_to_events(tokens: &[Token]) -> Vec<InputEvent> {
    let mut events = Vec::new();
    for token in tokens {
        match token {
            Token::Text(text) => events.push(InputEvent::Text(text.clone())),
            Token::ControlChar(byte) => {
                if let Some(event) = control_char_event(*byte) {
                    events.push(event);
                }
            }
            Token::ArrowKey {
                direction,
                modifiers,
            } => {
                use cathode_parser::token::ArrowDirection;
                let code = match direction {
                    ArrowDirection::Up => KeyCode::Up,
                    ArrowDirection::Down => KeyCode::Down,
                    ArrowDirection::Left => KeyCode::Left,
                    ArrowDirection::Right => KeyCode::Right,
                };
                events.push(InputEvent::Key(KeyEvent::new(code, *modifiers)));
            }
            Token::SpecialKey { code, modifiers } => {
                events.push(InputEvent::Key(KeyEvent::new(*code, *modifiers)));
            }
            Token::BackTab => {
                events.push(InputEvent::Key(KeyEvent::new(
                    KeyCode::BackTab,
                    Modifiers::SHIFT,
                )));
            }
            Token::SgrMouse {
                button,
                action,
                x,
                y,
                modifiers,
                ..
            } => {
                events.push(InputEvent::Mouse(MouseEvent {
                    button: *button,
                    action: *action,
                    pos: cathode_common::types::Pos::new(*x, *y),
                    modifiers: *modifiers,
                }));
            }
            _ => {}
        }
    }
    events
}

fn control_char_event(byte: u8) -> Option<InputEvent> {
    let key = match byte {
        b'\r' | b'\n' => KeyEvent::plain(KeyCode::Enter),
        b'\t' => KeyEvent::plain(KeyCode::Tab),
        0x7F | 0x08 => KeyEvent::plain(KeyCode::Backspace),
        0x1B => KeyEvent::plain(KeyCode::Escape),
        b @ 0x01..=0x1A => KeyEvent::new(
            KeyCode::Char((b'a' + b - 1) as char),
            Modifiers::CTRL,
        ),
        _ => return None,
    };
    Some(InputEvent::Key(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cathode_common::input::MouseButton;

    #[test]
    fn control_chars_become_key_events() {
        assert_eq!(
            control_char_event(0x03),
            Some(InputEvent::Key(KeyEvent::new(
                KeyCode::Char('c'),
                Modifiers::CTRL
            )))
        );
        assert_eq!(
            control_char_event(b'\r'),
            Some(InputEvent::Key(KeyEvent::plain(KeyCode::Enter)))
        );
        assert_eq!(control_char_event(0x00), None);
    }

    #[test]
    fn token_stream_maps_to_events() {
        let mut tokenizer = Tokenizer::new(StreamDirection::Input);
        let tokens = tokenizer.advance(b"hi\x1b[A\x1b[<0;3;2M");
        let events = tokens_to_events(&tokens);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], InputEvent::Text("hi".into()));
        assert_eq!(
            events[1],
            InputEvent::Key(KeyEvent::plain(KeyCode::Up))
        );
        match &events[2] {
            InputEvent::Mouse(mouse) => {
                assert_eq!(mouse.button, MouseButton::Left);
                assert_eq!((mouse.pos.x, mouse.pos.y), (2, 1));
            }
            other => panic!("expected mouse event, got {other:?}"),
        }
    }
}
