use cathode_common::types::Rect;
use cathode_core::Style;

use crate::widget::Widget;

/// Where a popup's content goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupPosition {
    /// Fill the screen (content decides its own placement inside).
    Overlay,
    /// Positioned against an anchor rect (a node's bounds at open time).
    Anchored(Rect),
}

/// One stacked popup: a builder for its content plus placement, theming,
/// focus-restore, and dismissal behavior.
pub struct PopupEntry {
    pub builder: Box<dyn FnMut() -> Box<dyn Widget> + Send>,
    pub position: PopupPosition,
    pub theme: Option<Style>,
    /// A barrier stops cascade dismissal: click-away closes popups above
    /// it but not the barrier itself.
    pub is_barrier: bool,
    pub on_dismiss: Option<Box<dyn FnMut() + Send>>,
    /// Node to refocus when this entry closes. Validated against the
    /// ring at restore time; a stale node (zero bounds or gone) is
    /// silently discarded.
    pub focus_restore: Option<u64>,
}

impl PopupEntry {
    pub fn new(builder: impl FnMut() -> Box<dyn Widget> + Send + 'static) -> Self {
        Self {
            builder: Box::new(builder),
            position: PopupPosition::Overlay,
            theme: None,
            is_barrier: false,
            on_dismiss: None,
            focus_restore: None,
        }
    }

    pub fn anchored(mut self, anchor: Rect) -> Self {
        self.position = PopupPosition::Anchored(anchor);
        self
    }

    pub fn themed(mut self, style: Style) -> Self {
        self.theme = Some(style);
        self
    }

    pub fn barrier(mut self) -> Self {
        self.is_barrier = true;
        self
    }

    pub fn on_dismiss(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_dismiss = Some(Box::new(f));
        self
    }
}

/// The ordered popup stack. Dismissal runs `on_dismiss` hooks and
/// returns focus-restore candidates to the runtime.
#[derive(Default)]
pub struct PopupStack {
    entries: Vec<PopupEntry>,
}

impl PopupStack {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, entry: PopupEntry) {
        self.entries.push(entry);
    }

    pub fn entries_mut(&mut self) -> &mut [PopupEntry] {
        &mut self.entries
    }

    /// Close the top entry. Returns its focus-restore candidate.
    pub fn pop(&mut self) -> Option<u64> {
        let mut entry = self.entries.pop()?;
        if let Some(hook) = &mut entry.on_dismiss {
            hook();
        }
        entry.focus_restore
    }

    /// Click-away: unwind non-barrier entries down to (and excluding)
    /// the nearest barrier. Returns focus-restore candidates in pop
    /// order.
    pub fn dismiss_cascade(&mut self) -> Vec<u64> {
        let mut restored = Vec::new();
        while let Some(top) = self.entries.last() {
            if top.is_barrier {
                break;
            }
            if let Some(id) = self.pop() {
                restored.push(id);
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::Label;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entry(dismissed: &Arc<AtomicUsize>) -> PopupEntry {
        let dismissed = Arc::clone(dismissed);
        PopupEntry::new(|| Box::new(Label::new("popup"))).on_dismiss(move || {
            dismissed.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn cascade_stops_at_barrier() {
        let dismissed = Arc::new(AtomicUsize::new(0));
        let mut stack = PopupStack::default();
        stack.push(entry(&dismissed).barrier());
        stack.push(entry(&dismissed));
        stack.push(entry(&dismissed));

        stack.dismiss_cascade();
        assert_eq!(stack.len(), 1, "barrier survives");
        assert_eq!(dismissed.load(Ordering::SeqCst), 2);

        // A second cascade does not remove the barrier either.
        stack.dismiss_cascade();
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn pop_reports_focus_restore() {
        let mut stack = PopupStack::default();
        let mut entry = PopupEntry::new(|| Box::new(Label::new("p")));
        entry.focus_restore = Some(42);
        stack.push(entry);
        assert_eq!(stack.pop(), Some(42));
        assert_eq!(stack.pop(), None);
    }
}
