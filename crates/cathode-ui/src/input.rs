use std::time::{Duration, Instant};

use cathode_common::input::{MouseButton, MouseEvent};
use cathode_common::types::Pos;

/// Multi-click detection per spec: same button, within the interval,
/// within the cell distance threshold, capped at triple.
#[derive(Debug)]
pub struct ClickCounter {
    interval: Duration,
    threshold: u16,
    last_time: Option<Instant>,
    last_pos: Pos,
    last_button: Option<MouseButton>,
    count: u8,
}

impl ClickCounter {
    pub fn new(interval: Duration, threshold: u16) -> Self {
        Self {
            interval,
            threshold,
            last_time: None,
            last_pos: Pos::new(0, 0),
            last_button: None,
            count: 0,
        }
    }

    /// Register a button-down and return the click count to route with.
    pub fn register(&mut self, button: MouseButton, pos: Pos, now: Instant) -> u8 {
        let within_time = self
            .last_time
            .is_some_and(|last| now.duration_since(last) <= self.interval);
        let within_distance = chebyshev(self.last_pos, pos) <= self.threshold;
        let same_button = self.last_button == Some(button);

        self.count = if same_button && within_time && within_distance {
            (self.count + 1).min(3)
        } else {
            1
        };
        self.last_time = Some(now);
        self.last_pos = pos;
        self.last_button = Some(button);
        self.count
    }
}

fn chebyshev(a: Pos, b: Pos) -> u16 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    dx.max(dy)
}

/// Phases delivered to a drag binding once it has accepted the gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEvent {
    /// Button went down on the node; return `Reject` to decline.
    Start(Pos),
    Move(Pos),
    End(Pos),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragResponse {
    Accept,
    Reject,
}

pub type DragBinding = Box<dyn FnMut(DragEvent) -> DragResponse + Send>;

pub struct MouseBinding {
    /// Minimum click count this binding requires; candidates are tried in
    /// descending order so a double-click binding wins over single.
    pub clicks: u8,
    pub action: Box<dyn FnMut(&MouseEvent) + Send>,
}
