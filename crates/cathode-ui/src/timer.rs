use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::warn;

type TimerCallback = Box<dyn FnMut() + Send>;

struct TimerEntry {
    due: Instant,
    period: Option<Duration>,
    callback: TimerCallback,
}

/// Animation timers driven by the event loop. Callbacks run between
/// frames, never mid-token or mid-render; a panicking callback is logged
/// and dropped without rescheduling.
#[derive(Default)]
pub struct Timers {
    entries: Vec<TimerEntry>,
}

impl Timers {
    pub fn add_timeout(&mut self, delay: Duration, callback: impl FnMut() + Send + 'static) {
        self.entries.push(TimerEntry {
            due: Instant::now() + delay,
            period: None,
            callback: Box::new(callback),
        });
    }

    pub fn add_interval(&mut self, period: Duration, callback: impl FnMut() + Send + 'static) {
        self.entries.push(TimerEntry {
            due: Instant::now() + period,
            period: Some(period),
            callback: Box::new(callback),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.entries.iter().map(|t| t.due).min()
    }

    /// Run every due timer. Returns how many fired.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].due > now {
                index += 1;
                continue;
            }
            fired += 1;
            let entry = &mut self.entries[index];
            let ok = catch_unwind(AssertUnwindSafe(|| (entry.callback)())).is_ok();
            match (ok, entry.period) {
                (true, Some(period)) => {
                    entry.due = now + period;
                    index += 1;
                }
                (true, None) => {
                    self.entries.remove(index);
                }
                (false, _) => {
                    warn!("timer callback panicked; timer dropped");
                    self.entries.remove(index);
                }
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn timeout_fires_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut timers = Timers::default();
        let h = Arc::clone(&hits);
        timers.add_timeout(Duration::from_millis(0), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let later = Instant::now() + Duration::from_millis(5);
        assert_eq!(timers.fire_due(later), 1);
        assert_eq!(timers.fire_due(later), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn interval_reschedules() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut timers = Timers::default();
        let h = Arc::clone(&hits);
        timers.add_interval(Duration::from_millis(10), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let t1 = Instant::now() + Duration::from_millis(11);
        assert_eq!(timers.fire_due(t1), 1);
        assert!(!timers.is_empty());
        let t2 = t1 + Duration::from_millis(11);
        assert_eq!(timers.fire_due(t2), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_timer_is_dropped_not_rescheduled() {
        let mut timers = Timers::default();
        timers.add_interval(Duration::from_millis(1), || panic!("boom"));
        let later = Instant::now() + Duration::from_millis(5);
        assert_eq!(timers.fire_due(later), 1);
        assert!(timers.is_empty(), "faulted timer must not reschedule");
    }
}
