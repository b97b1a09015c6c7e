use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};

use cathode_common::input::{KeyEvent, MouseEvent};
use cathode_common::types::{Pos, Rect, Size};
use cathode_core::RenderContext;

use crate::bindings::BindingTrie;
use crate::input::{DragBinding, MouseBinding};
use crate::layout::{Constraints, LayoutHints};

static NODE_IDS: AtomicU64 = AtomicU64::new(1);

/// An immutable declarative description of a piece of UI. Each widget
/// type names one concrete node type; reconciliation updates a node in
/// place when its type (and key) match, and replaces it otherwise.
pub trait Widget: Send {
    /// `TypeId` of the node type this widget reconciles to.
    fn node_type(&self) -> TypeId;

    fn key(&self) -> Option<&str> {
        None
    }

    fn create_node(&self) -> Box<dyn Node>;

    /// Update an existing node of the expected type in place. Called only
    /// when `node_type` matched; implementations downcast via `as_any_mut`.
    fn update_node(&self, node: &mut dyn Node);

    fn children(&self) -> &[Box<dyn Widget>] {
        &[]
    }
}

/// Retained state every node carries: identity, bounds, flags, bindings,
/// and the child list. Parent linkage is implicit; traversal uses
/// child-index paths from the root, which keeps the tree strictly
/// acyclic.
pub struct NodeBase {
    pub id: u64,
    pub key: Option<String>,
    pub bounds: Rect,
    pub dirty: bool,
    pub is_new: bool,
    pub focused: bool,
    pub hovered: bool,
    pub hints: LayoutHints,
    pub bindings: BindingTrie,
    pub drag_bindings: Vec<DragBinding>,
    pub mouse_bindings: Vec<MouseBinding>,
    pub children: Vec<Box<dyn Node>>,
}

impl NodeBase {
    pub fn new() -> Self {
        Self {
            id: NODE_IDS.fetch_add(1, Ordering::Relaxed),
            key: None,
            bounds: Rect::default(),
            dirty: true,
            is_new: true,
            focused: false,
            hovered: false,
            hints: LayoutHints::default(),
            bindings: BindingTrie::new(),
            drag_bindings: Vec::new(),
            mouse_bindings: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl Default for NodeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// A mutable retained render object. The default implementations suit a
/// leaf that fills whatever space it is given.
pub trait Node: Any + Send {
    fn base(&self) -> &NodeBase;
    fn base_mut(&mut self) -> &mut NodeBase;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn measure(&mut self, constraints: Constraints) -> Size {
        constraints.max
    }

    /// Set final bounds. Containers position children here; the default
    /// overlays every child on the node's own rect.
    fn arrange(&mut self, bounds: Rect) {
        self.base_mut().bounds = bounds;
        for child in &mut self.base_mut().children {
            child.arrange(bounds);
        }
    }

    /// Draw this node (children are walked separately, in order, which
    /// makes sibling order the z-order).
    fn render(&self, _ctx: &mut RenderContext) {}

    fn focusable(&self) -> bool {
        false
    }

    /// Fallback key handling when no binding matched.
    fn handle_key(&mut self, _key: &KeyEvent) -> bool {
        false
    }

    /// Fallback click handling when no mouse binding matched.
    fn handle_click(&mut self, _event: &MouseEvent, _clicks: u8) -> bool {
        false
    }

    /// Where the terminal cursor belongs while this node is focused.
    fn cursor_hint(&self) -> Option<Pos> {
        None
    }
}

// ---------------------------------------------------------------------
// Tree walks. Paths are child-index vectors from the root; they stay
// valid for one routed event because only the event loop mutates the
// tree.

pub fn node_at_path<'a>(root: &'a dyn Node, path: &[usize]) -> Option<&'a dyn Node> {
    let mut node = root;
    for &index in path {
        node = node.base().children.get(index)?.as_ref();
    }
    Some(node)
}

pub fn node_at_path_mut<'a>(
    root: &'a mut dyn Node,
    path: &[usize],
) -> Option<&'a mut dyn Node> {
    let mut node = root;
    for &index in path {
        node = node.base_mut().children.get_mut(index)?.as_mut();
    }
    Some(node)
}

/// Topmost, deepest node whose bounds contain `pos`: later siblings are
/// above earlier ones, children above their parent.
pub fn hit_test(root: &dyn Node, pos: Pos) -> Option<Vec<usize>> {
    if !root.base().bounds.contains(pos) {
        return None;
    }
    for (index, child) in root.base().children.iter().enumerate().rev() {
        if let Some(mut sub) = hit_test(child.as_ref(), pos) {
            let mut path = vec![index];
            path.append(&mut sub);
            return Some(path);
        }
    }
    Some(Vec::new())
}

/// Render a subtree: the node first, then its children in order, each
/// clipped to its own bounds nested inside the parent clip.
pub fn render_tree(node: &dyn Node, ctx: &mut RenderContext) {
    let mut clipped = ctx.clipped(node.base().bounds);
    if clipped.clip().is_empty() {
        return;
    }
    node.render(&mut clipped);
    for child in &node.base().children {
        render_tree(child.as_ref(), &mut clipped);
    }
}

/// Document-order collection of focusable nodes, as `(id, path)` pairs.
pub fn collect_focusables(root: &dyn Node, out: &mut Vec<(u64, Vec<usize>)>) {
    fn walk(node: &dyn Node, path: &mut Vec<usize>, out: &mut Vec<(u64, Vec<usize>)>) {
        if node.focusable() {
            out.push((node.base().id, path.clone()));
        }
        for (index, child) in node.base().children.iter().enumerate() {
            path.push(index);
            walk(child.as_ref(), path, out);
            path.pop();
        }
    }
    walk(root, &mut Vec::new(), out);
}

/// Path of the node with `id`, anywhere in the tree. Capture targets
/// need not be focus-ring members, so this walks everything.
pub fn find_path_by_id(root: &dyn Node, id: u64) -> Option<Vec<usize>> {
    fn walk(node: &dyn Node, id: u64, path: &mut Vec<usize>) -> bool {
        if node.base().id == id {
            return true;
        }
        for (index, child) in node.base().children.iter().enumerate() {
            path.push(index);
            if walk(child.as_ref(), id, path) {
                return true;
            }
            path.pop();
        }
        false
    }
    let mut path = Vec::new();
    walk(root, id, &mut path).then_some(path)
}

/// Clear dirty flags after a frame.
pub fn clear_dirty(node: &mut dyn Node) {
    node.base_mut().dirty = false;
    node.base_mut().is_new = false;
    for child in &mut node.base_mut().children {
        clear_dirty(child.as_mut());
    }
}

pub fn any_dirty(node: &dyn Node) -> bool {
    node.base().dirty || node.base().children.iter().any(|c| any_dirty(c.as_ref()))
}
