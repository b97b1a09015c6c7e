use crate::widget::{collect_focusables, node_at_path, node_at_path_mut, Node};

/// Ordered list of focusable nodes, rebuilt from the arranged tree after
/// every layout. One node may be focused; at most one may have captured
/// input, which overrides focus for routing without affecting ring
/// membership.
#[derive(Default)]
pub struct FocusRing {
    entries: Vec<(u64, Vec<usize>)>,
    focused: Option<u64>,
    captured: Option<u64>,
}

impl FocusRing {
    pub fn rebuild(&mut self, root: &mut Box<dyn Node>) {
        self.entries.clear();
        collect_focusables(root.as_ref(), &mut self.entries);
        if let Some(id) = self.focused {
            if !self.entries.iter().any(|(entry, _)| *entry == id) {
                self.focused = None;
            }
        }
        self.apply_flags(root);
    }

    fn apply_flags(&self, root: &mut Box<dyn Node>) {
        for (id, path) in &self.entries {
            if let Some(node) = node_at_path_mut(root.as_mut(), path) {
                node.base_mut().focused = self.focused == Some(*id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn focused(&self) -> Option<u64> {
        self.focused
    }

    pub fn focused_path(&self) -> Option<&[usize]> {
        self.path_of(self.focused?)
    }

    pub fn path_of(&self, id: u64) -> Option<&[usize]> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, path)| path.as_slice())
    }

    /// Focus a node by id; ignored when the node is not in the ring.
    pub fn focus(&mut self, id: u64) -> bool {
        if self.entries.iter().any(|(entry, _)| *entry == id) {
            self.focused = Some(id);
            true
        } else {
            false
        }
    }

    pub fn unfocus(&mut self) {
        self.focused = None;
    }

    /// Focus the first ring member satisfying the predicate, in document
    /// order.
    pub fn focus_where(
        &mut self,
        root: &dyn Node,
        predicate: impl Fn(&dyn Node) -> bool,
    ) -> Option<u64> {
        let id = self.entries.iter().find_map(|(id, path)| {
            node_at_path(root, path)
                .filter(|node| predicate(*node))
                .map(|_| *id)
        })?;
        self.focused = Some(id);
        Some(id)
    }

    pub fn focus_next(&mut self) -> Option<u64> {
        self.advance(1)
    }

    pub fn focus_previous(&mut self) -> Option<u64> {
        self.advance(-1)
    }

    fn advance(&mut self, step: isize) -> Option<u64> {
        if self.entries.is_empty() {
            return None;
        }
        let len = self.entries.len() as isize;
        let current = self
            .focused
            .and_then(|id| self.entries.iter().position(|(entry, _)| *entry == id));
        let next = match current {
            Some(index) => (index as isize + step).rem_euclid(len) as usize,
            None if step >= 0 => 0,
            None => (len - 1) as usize,
        };
        self.focused = Some(self.entries[next].0);
        self.focused
    }

    pub fn captured(&self) -> Option<u64> {
        self.captured
    }

    /// Route all input to one node until released.
    pub fn capture(&mut self, id: u64) {
        self.captured = Some(id);
    }

    pub fn release_capture(&mut self) {
        self.captured = None;
    }

    /// The path input routes to: the captured node when set and still
    /// present, otherwise the focused node.
    pub fn routing_path(&self) -> Option<&[usize]> {
        if let Some(id) = self.captured {
            if let Some(path) = self.path_of(id) {
                return Some(path);
            }
        }
        self.focused_path()
    }

    pub fn is_captured(&self) -> bool {
        self.captured.is_some_and(|id| self.path_of(id).is_some())
    }
}
