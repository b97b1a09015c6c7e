use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cathode_common::error::{CathodeError, Result};
use cathode_common::input::{InputEvent, KeyCode, KeyEvent, MouseAction, MouseEvent};
use cathode_common::types::{CellFlags, Color, Pos, Rect, Size};
use cathode_core::adapters::UiWorkloadHandle;
use cathode_core::{Compositor, CursorState, Style};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bindings::{KeyChord, Lookup};
use crate::config::RuntimeConfig;
use crate::focus::FocusRing;
use crate::input::{ClickCounter, DragEvent, DragResponse};
use crate::layout::Constraints;
use crate::popup::{PopupEntry, PopupPosition, PopupStack};
use crate::reconcile::reconcile;
use crate::timer::Timers;
use crate::widget::{
    clear_dirty, find_path_by_id, hit_test, node_at_path, node_at_path_mut, render_tree, Node,
    Widget,
};
use crate::widgets::{Anchored, Backdrop, BackdropNode, Label, StylePanel, ZStack};

/// Deferred instructions from binding actions and app code; the loop
/// drains them after routing, before the frame renders.
pub enum AppCommand {
    Quit,
    PushPopup(PopupEntry),
    PopPopup,
    DismissCascade,
    Focus(u64),
    FocusNext,
    FocusPrevious,
    Capture(u64),
    ReleaseCapture,
    AddTimeout(Duration, Box<dyn FnMut() + Send>),
    AddInterval(Duration, Box<dyn FnMut() + Send>),
}

/// Cloneable handle for talking to a running app from actions, timers,
/// or other tasks. Commands coalesce with the next frame.
#[derive(Clone)]
pub struct AppController {
    commands: Arc<Mutex<Vec<AppCommand>>>,
    invalidate_tx: mpsc::Sender<()>,
}

impl AppController {
    fn push(&self, command: AppCommand) {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
        self.invalidate();
    }

    /// Request a re-render. Bursts collapse into one pending wakeup.
    pub fn invalidate(&self) {
        let _ = self.invalidate_tx.try_send(());
    }

    pub fn quit(&self) {
        self.push(AppCommand::Quit);
    }

    pub fn push_popup(&self, entry: PopupEntry) {
        self.push(AppCommand::PushPopup(entry));
    }

    pub fn pop_popup(&self) {
        self.push(AppCommand::PopPopup);
    }

    pub fn focus(&self, id: u64) {
        self.push(AppCommand::Focus(id));
    }

    pub fn focus_next(&self) {
        self.push(AppCommand::FocusNext);
    }

    pub fn focus_previous(&self) {
        self.push(AppCommand::FocusPrevious);
    }

    pub fn capture(&self, id: u64) {
        self.push(AppCommand::Capture(id));
    }

    pub fn release_capture(&self) {
        self.push(AppCommand::ReleaseCapture);
    }

    pub fn add_timeout(&self, delay: Duration, callback: impl FnMut() + Send + 'static) {
        self.push(AppCommand::AddTimeout(delay, Box::new(callback)));
    }

    pub fn add_interval(&self, period: Duration, callback: impl FnMut() + Send + 'static) {
        self.push(AppCommand::AddInterval(period, Box::new(callback)));
    }
}

struct DragState {
    path: Vec<usize>,
    binding_index: usize,
}

/// The reactive pipeline: build → reconcile → layout → render → diff →
/// emit, driven by a select over input, invalidations, timers, and
/// cancellation.
pub struct App {
    handle: UiWorkloadHandle,
    builder: Box<dyn FnMut(&AppController) -> Box<dyn Widget> + Send>,
    controller: AppController,
    commands: Arc<Mutex<Vec<AppCommand>>>,
    invalidate_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    config: RuntimeConfig,

    root: Option<Box<dyn Node>>,
    focus: FocusRing,
    popups: PopupStack,
    timers: Timers,
    compositor: Compositor,
    size: Size,
    cell_px: (f32, f32),

    click_counter: ClickCounter,
    pending_chords: Vec<KeyChord>,
    drag: Option<DragState>,
    hovered: Option<u64>,
    rescue_observer: Option<Box<dyn FnMut(&str) + Send>>,
    quit: bool,
}

impl App {
    pub fn new(
        handle: UiWorkloadHandle,
        builder: impl FnMut(&AppController) -> Box<dyn Widget> + Send + 'static,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_config(handle, builder, cancel, RuntimeConfig::default())
    }

    pub fn with_config(
        handle: UiWorkloadHandle,
        builder: impl FnMut(&AppController) -> Box<dyn Widget> + Send + 'static,
        cancel: CancellationToken,
        config: RuntimeConfig,
    ) -> Self {
        let (invalidate_tx, invalidate_rx) = mpsc::channel(1);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let controller = AppController {
            commands: Arc::clone(&commands),
            invalidate_tx,
        };
        let caps = handle.capabilities;
        let size = Size::new(80, 24);
        Self {
            handle,
            builder: Box::new(builder),
            controller,
            commands,
            invalidate_rx,
            cancel,
            click_counter: ClickCounter::new(
                config.multi_click_interval,
                config.click_distance_threshold,
            ),
            config,
            root: None,
            focus: FocusRing::default(),
            popups: PopupStack::default(),
            timers: Timers::default(),
            compositor: Compositor::new(size, (caps.cell_px_w, caps.cell_px_h)),
            size,
            cell_px: (caps.cell_px_w, caps.cell_px_h),
            pending_chords: Vec::new(),
            drag: None,
            hovered: None,
            rescue_observer: None,
            quit: false,
        }
    }

    pub fn controller(&self) -> AppController {
        self.controller.clone()
    }

    pub fn on_rescue(&mut self, observer: impl FnMut(&str) + Send + 'static) {
        self.rescue_observer = Some(Box::new(observer));
    }

    pub async fn run(mut self) -> Result<()> {
        // The mediator delivers the initial size as the first event; wait
        // briefly for it so the first frame is not drawn at a guess.
        match tokio::time::timeout(Duration::from_millis(100), self.handle.events.recv()).await {
            Ok(Some(InputEvent::Resize(size))) => self.size = size,
            Ok(Some(event)) => self.route_event(event),
            _ => {}
        }
        self.render_frame().await?;

        loop {
            if self.quit || self.cancel.is_cancelled() {
                break;
            }

            let fired = self.timers.fire_due(Instant::now());
            if fired > 0 {
                self.controller.invalidate();
            }

            let timer_due = self.timers.next_due();
            let wake = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.handle.events.recv() => Wake::Input(event),
                _ = self.invalidate_rx.recv() => Wake::Invalidated,
                _ = sleep_until_opt(timer_due) => Wake::Timer,
            };

            match wake {
                Wake::Input(None) => break,
                Wake::Input(Some(event)) => {
                    self.route_event(event);
                    if self.config.adaptive_coalescing {
                        self.coalesce_input().await;
                    }
                }
                Wake::Invalidated | Wake::Timer => {
                    // Drain queued input first so a pending resize is
                    // never starved by an invalidation storm.
                    while let Ok(event) = self.handle.events.try_recv() {
                        self.route_event(event);
                    }
                }
            }

            self.drain_commands();
            if self.quit {
                break;
            }
            self.render_frame().await?;

            let mut extra = 0;
            while extra < self.config.extra_render_budget
                && self.invalidate_rx.try_recv().is_ok()
            {
                while let Ok(event) = self.handle.events.try_recv() {
                    self.route_event(event);
                }
                self.drain_commands();
                self.render_frame().await?;
                extra += 1;
            }
        }
        debug!("app loop exited");
        Ok(())
    }

    /// Scale the post-event wait with the output backlog, then drain
    /// whatever queued up, so bursts become one frame.
    async fn coalesce_input(&mut self) {
        let backlog = self.handle.frames.max_capacity() - self.handle.frames.capacity();
        let wait = (self.config.coalesce_initial + Duration::from_millis(10) * backlog as u32)
            .min(self.config.coalesce_max);
        if !wait.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        while let Ok(event) = self.handle.events.try_recv() {
            self.route_event(event);
        }
    }

    fn drain_commands(&mut self) {
        let drained: Vec<AppCommand> = std::mem::take(
            &mut *self.commands.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for command in drained {
            match command {
                AppCommand::Quit => self.quit = true,
                AppCommand::PushPopup(mut entry) => {
                    if entry.focus_restore.is_none() {
                        entry.focus_restore = self.focus.focused();
                    }
                    self.popups.push(entry);
                }
                AppCommand::PopPopup => {
                    if let Some(id) = self.popups.pop() {
                        self.restore_focus(id);
                    }
                }
                AppCommand::DismissCascade => {
                    for id in self.popups.dismiss_cascade() {
                        self.restore_focus(id);
                    }
                }
                AppCommand::Focus(id) => {
                    self.focus.focus(id);
                }
                AppCommand::FocusNext => {
                    self.focus.focus_next();
                }
                AppCommand::FocusPrevious => {
                    self.focus.focus_previous();
                }
                AppCommand::Capture(id) => self.focus.capture(id),
                AppCommand::ReleaseCapture => self.focus.release_capture(),
                AppCommand::AddTimeout(delay, callback) => {
                    self.timers.add_timeout(delay, callback);
                }
                AppCommand::AddInterval(period, callback) => {
                    self.timers.add_interval(period, callback);
                }
            }
        }
    }

    /// Refocus after a popup closes, unless the node went stale (left
    /// the tree or arranged to zero bounds).
    fn restore_focus(&mut self, id: u64) {
        let stale = match (self.root.as_deref(), self.focus.path_of(id)) {
            (Some(root), Some(path)) => node_at_path(root, path)
                .map(|node| node.base().bounds.is_empty())
                .unwrap_or(true),
            _ => true,
        };
        if !stale {
            self.focus.focus(id);
        }
    }

    // --------------------------------------------------------------
    // Frame production

    fn build_and_layout(&mut self) -> std::thread::Result<()> {
        catch_unwind(AssertUnwindSafe(|| {
            let widget = compose_root(
                self.builder.as_mut(),
                &mut self.popups,
                &self.controller,
            );
            let existing = self.root.take();
            let mut node = reconcile(existing, widget.as_ref());
            node.measure(Constraints::tight(self.size));
            node.arrange(Rect::new(0, 0, self.size.width, self.size.height));
            self.root = Some(node);
        }))
    }

    fn draw(&mut self) -> std::thread::Result<Vec<u8>> {
        let cursor = self.cursor_state();
        catch_unwind(AssertUnwindSafe(|| {
            {
                let mut ctx = self.compositor.begin_frame(self.size, self.cell_px);
                if let Some(root) = &self.root {
                    render_tree(root.as_ref(), &mut ctx);
                }
            }
            self.compositor.end_frame(cursor)
        }))
    }

    fn cursor_state(&self) -> CursorState {
        let hint = self
            .focus
            .focused_path()
            .and_then(|path| node_at_path(self.root.as_deref()?, path))
            .and_then(Node::cursor_hint);
        CursorState {
            pos: hint.unwrap_or(Pos::new(0, 0)),
            visible: hint.is_some(),
            shape: Default::default(),
        }
    }

    fn install_fallback(&mut self, message: &str) {
        warn!(message, "widget tree fault; substituting fallback");
        if let Some(observer) = &mut self.rescue_observer {
            observer(message);
        }
        let widget = Label::styled(
            format!("! {message}"),
            Style {
                fg: Some(Color::Palette(15)),
                bg: Some(Color::Palette(1)),
                flags: CellFlags::BOLD,
            },
        );
        let mut node = reconcile(None, &widget);
        node.measure(Constraints::tight(self.size));
        node.arrange(Rect::new(0, 0, self.size.width, self.size.height));
        self.root = Some(node);
        self.compositor.invalidate_all();
    }

    async fn render_frame(&mut self) -> Result<()> {
        if let Err(panic) = self.build_and_layout() {
            let message = panic_message(&panic);
            if !self.config.rescue_enabled {
                return Err(CathodeError::Rescue(message));
            }
            self.install_fallback(&message);
        }

        if let Some(root) = self.root.as_mut() {
            self.focus.rebuild(root);
        }

        let bytes = match self.draw() {
            Ok(bytes) => bytes,
            Err(panic) => {
                let message = panic_message(&panic);
                if !self.config.rescue_enabled {
                    return Err(CathodeError::Rescue(message));
                }
                self.install_fallback(&message);
                if let Some(root) = self.root.as_mut() {
                    self.focus.rebuild(root);
                }
                self.draw()
                    .map_err(|p| CathodeError::Rescue(panic_message(&p)))?
            }
        };

        if let Some(root) = self.root.as_mut() {
            clear_dirty(root.as_mut());
        }

        if !bytes.is_empty() {
            self.send_frame(bytes).await?;
        }
        // Empty chunk marks the frame boundary.
        self.send_frame(Vec::new()).await
    }

    async fn send_frame(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.handle
            .frames
            .send(bytes)
            .await
            .map_err(|_| CathodeError::Channel("session closed".into()))
    }

    // --------------------------------------------------------------
    // Routing

    fn route_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::Resize(size) => {
                debug!(width = size.width, height = size.height, "resize event");
                self.size = size;
                if let Some(root) = self.root.as_mut() {
                    root.base_mut().dirty = true;
                }
                self.compositor.invalidate_all();
            }
            InputEvent::Key(key) => self.route_key(key),
            InputEvent::Text(text) => {
                for c in text.chars() {
                    self.route_key(KeyEvent::plain(KeyCode::Char(c)));
                }
            }
            InputEvent::Mouse(mouse) => self.route_mouse(mouse),
            InputEvent::FocusGained | InputEvent::FocusLost => {}
        }
    }

    fn route_key(&mut self, key: KeyEvent) {
        let Some(root) = self.root.as_mut() else {
            return;
        };
        self.pending_chords.push(KeyChord::from(key));

        let captured = self
            .focus
            .captured()
            .and_then(|id| find_path_by_id(root.as_ref(), id));
        let capture_active = captured.is_some();
        let target: Vec<usize> = captured
            .or_else(|| self.focus.focused_path().map(<[usize]>::to_vec))
            .unwrap_or_default();

        // Deepest-first walk of the target's ancestor chain. While input
        // is captured, ancestors only match bindings flagged global or
        // capture-overriding; the captured node itself always matches.
        let mut saw_prefix = false;
        for depth in (0..=target.len()).rev() {
            let Some(node) = node_at_path_mut(root.as_mut(), &target[..depth]) else {
                continue;
            };
            let is_target = depth == target.len();
            match node.base_mut().bindings.lookup(&self.pending_chords) {
                Lookup::Exact(binding)
                    if !capture_active
                        || is_target
                        || binding.options.global
                        || binding.options.capture_override =>
                {
                    binding.run();
                    self.pending_chords.clear();
                    return;
                }
                Lookup::Prefix => saw_prefix = true,
                _ => {}
            }
        }
        if saw_prefix {
            // An unfinished sequence; hold the chords for the next key.
            return;
        }
        self.pending_chords.clear();

        if let Some(node) = node_at_path_mut(root.as_mut(), &target) {
            if node.handle_key(&key) {
                return;
            }
        }
        self.default_key(key);
    }

    fn default_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => {
                self.focus.focus_next();
            }
            KeyCode::BackTab => {
                self.focus.focus_previous();
            }
            KeyCode::Escape if !self.popups.is_empty() => {
                if let Some(id) = self.popups.pop() {
                    self.restore_focus(id);
                }
            }
            _ => {}
        }
    }

    fn route_mouse(&mut self, mouse: MouseEvent) {
        let Some(root) = self.root.as_mut() else {
            return;
        };
        let hit = hit_test(root.as_ref(), mouse.pos);
        Self::update_hover(root.as_mut(), &mut self.hovered, hit.as_deref());

        if self.drag.is_some() {
            self.continue_drag(mouse);
            return;
        }

        if mouse.action != MouseAction::Down {
            return;
        }
        let clicks = self
            .click_counter
            .register(mouse.button, mouse.pos, Instant::now());
        let Some(path) = hit else {
            return;
        };
        let root = self.root.as_mut().expect("root checked above");

        // A backdrop hit is a click-away: cascade-dismiss to the nearest
        // barrier.
        let is_backdrop = node_at_path(root.as_ref(), &path)
            .is_some_and(|node| node.as_any().is::<BackdropNode>());
        if is_backdrop {
            for id in self.popups.dismiss_cascade() {
                self.restore_focus(id);
            }
            return;
        }

        // Focus the nearest focusable node on the hit path.
        for depth in (0..=path.len()).rev() {
            if let Some(node) = node_at_path(root.as_ref(), &path[..depth]) {
                if node.focusable() {
                    self.focus.focus(node.base().id);
                    break;
                }
            }
        }

        let root = self.root.as_mut().expect("root checked above");
        let Some(node) = node_at_path_mut(root.as_mut(), &path) else {
            return;
        };

        // Drag bindings first, in registration order; a rejecting
        // handler passes the gesture along.
        for index in 0..node.base().drag_bindings.len() {
            let response = (node.base_mut().drag_bindings[index])(DragEvent::Start(mouse.pos));
            if response == DragResponse::Accept {
                self.drag = Some(DragState {
                    path,
                    binding_index: index,
                });
                return;
            }
        }

        // Mouse bindings by descending click requirement, so a
        // double-click binding beats a single-click one.
        let mut order: Vec<usize> = (0..node.base().mouse_bindings.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(node.base().mouse_bindings[i].clicks));
        for index in order {
            if node.base().mouse_bindings[index].clicks <= clicks {
                (node.base_mut().mouse_bindings[index].action)(&mouse);
                return;
            }
        }

        node.handle_click(&mouse, clicks);
    }

    fn continue_drag(&mut self, mouse: MouseEvent) {
        let Some(drag) = &self.drag else {
            return;
        };
        let Some(root) = self.root.as_mut() else {
            return;
        };
        let ended = mouse.action == MouseAction::Up;
        let event = if ended {
            DragEvent::End(mouse.pos)
        } else {
            DragEvent::Move(mouse.pos)
        };
        if let Some(node) = node_at_path_mut(root.as_mut(), &drag.path) {
            if let Some(binding) = node.base_mut().drag_bindings.get_mut(drag.binding_index) {
                let _ = binding(event);
            }
        }
        if ended {
            self.drag = None;
        }
    }

    fn update_hover(root: &mut dyn Node, hovered: &mut Option<u64>, hit: Option<&[usize]>) {
        let new_id = hit
            .and_then(|path| node_at_path(&*root, path))
            .map(|node| node.base().id);
        if *hovered == new_id {
            return;
        }
        if let Some(old) = *hovered {
            if let Some(path) = find_path_by_id(&*root, old) {
                if let Some(node) = node_at_path_mut(root, &path) {
                    node.base_mut().hovered = false;
                }
            }
        }
        if let Some(path) = hit {
            if let Some(node) = node_at_path_mut(root, path) {
                node.base_mut().hovered = true;
            }
        }
        *hovered = new_id;
    }
}

enum Wake {
    Input(Option<InputEvent>),
    Invalidated,
    Timer,
}

async fn sleep_until_opt(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due.into()).await,
        None => std::future::pending().await,
    }
}

fn compose_root(
    builder: &mut (dyn FnMut(&AppController) -> Box<dyn Widget> + Send),
    popups: &mut PopupStack,
    controller: &AppController,
) -> Box<dyn Widget> {
    let mut children: Vec<Box<dyn Widget>> = vec![builder(controller)];
    for index in 0..popups.len() {
        let entry = &mut popups.entries_mut()[index];
        children.push(Box::new(Backdrop {
            style: Style::default(),
            popup_index: index,
        }));
        let mut content = (entry.builder)();
        if let Some(style) = entry.theme {
            content = Box::new(StylePanel::new(style, content));
        }
        if let PopupPosition::Anchored(anchor) = entry.position {
            content = Box::new(Anchored::new(anchor, content));
        }
        children.push(content);
    }
    Box::new(ZStack::new(children))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
