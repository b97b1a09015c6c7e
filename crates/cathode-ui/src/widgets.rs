use std::any::{Any, TypeId};

use cathode_common::input::MouseEvent;
use cathode_common::types::{Rect, Size};
use cathode_core::{RenderContext, Style};

use crate::layout::Constraints;
use crate::widget::{Node, NodeBase, Widget};
use crate::width_of;

/// A single line of styled text.
pub struct Label {
    pub text: String,
    pub style: Style,
    pub key: Option<String>,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::default(),
            key: None,
        }
    }

    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            style,
            ..Self::new(text)
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

pub struct LabelNode {
    base: NodeBase,
    text: String,
    style: Style,
}

impl Widget for Label {
    fn node_type(&self) -> TypeId {
        TypeId::of::<LabelNode>()
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn create_node(&self) -> Box<dyn Node> {
        Box::new(LabelNode {
            base: NodeBase::new(),
            text: self.text.clone(),
            style: self.style,
        })
    }

    fn update_node(&self, node: &mut dyn Node) {
        let node = node
            .as_any_mut()
            .downcast_mut::<LabelNode>()
            .expect("reconciler matched node type");
        if node.text != self.text || node.style != self.style {
            node.text = self.text.clone();
            node.style = self.style;
            node.base.dirty = true;
        }
    }
}

impl Node for LabelNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn measure(&mut self, constraints: Constraints) -> Size {
        constraints.clamp(Size::new(width_of(&self.text), 1))
    }

    fn arrange(&mut self, bounds: Rect) {
        self.base.bounds = bounds;
    }

    fn render(&self, ctx: &mut RenderContext) {
        let clip = ctx.clip();
        ctx.set_style(self.style);
        ctx.move_to(clip.x, clip.y);
        ctx.print(&self.text);
    }
}

/// Children overlaid on the same rect, later children on top. This is
/// the composition primitive the popup machinery builds on.
pub struct ZStack {
    pub children: Vec<Box<dyn Widget>>,
    pub key: Option<String>,
}

impl ZStack {
    pub fn new(children: Vec<Box<dyn Widget>>) -> Self {
        Self {
            children,
            key: None,
        }
    }
}

pub struct ZStackNode {
    base: NodeBase,
}

impl Widget for ZStack {
    fn node_type(&self) -> TypeId {
        TypeId::of::<ZStackNode>()
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn create_node(&self) -> Box<dyn Node> {
        Box::new(ZStackNode {
            base: NodeBase::new(),
        })
    }

    fn update_node(&self, _node: &mut dyn Node) {}

    fn children(&self) -> &[Box<dyn Widget>] {
        &self.children
    }
}

impl Node for ZStackNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn measure(&mut self, constraints: Constraints) -> Size {
        let mut size = constraints.min;
        for child in &mut self.base.children {
            let child_size = child.measure(constraints);
            size.width = size.width.max(child_size.width);
            size.height = size.height.max(child_size.height);
        }
        constraints.clamp(size)
    }
}

/// Fills its rect and swallows clicks; hosts use it behind popups so a
/// click-away can be told apart from a click into content.
pub struct Backdrop {
    pub style: Style,
    /// Index of the popup entry this backdrop belongs to.
    pub popup_index: usize,
}

pub struct BackdropNode {
    base: NodeBase,
    style: Style,
    pub popup_index: usize,
}

impl Widget for Backdrop {
    fn node_type(&self) -> TypeId {
        TypeId::of::<BackdropNode>()
    }

    fn create_node(&self) -> Box<dyn Node> {
        Box::new(BackdropNode {
            base: NodeBase::new(),
            style: self.style,
            popup_index: self.popup_index,
        })
    }

    fn update_node(&self, node: &mut dyn Node) {
        let node = node
            .as_any_mut()
            .downcast_mut::<BackdropNode>()
            .expect("reconciler matched node type");
        node.style = self.style;
        node.popup_index = self.popup_index;
    }
}

impl Node for BackdropNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn render(&self, ctx: &mut RenderContext) {
        ctx.set_style(self.style);
        ctx.fill(ctx.clip(), " ");
    }

    fn handle_click(&mut self, _event: &MouseEvent, _clicks: u8) -> bool {
        true
    }
}

/// Positions its single child next to an anchor rect, nudged back inside
/// the available bounds when it would overflow.
pub struct Anchored {
    pub anchor: Rect,
    pub child: Vec<Box<dyn Widget>>,
}

impl Anchored {
    pub fn new(anchor: Rect, child: Box<dyn Widget>) -> Self {
        Self {
            anchor,
            child: vec![child],
        }
    }
}

pub struct AnchoredNode {
    base: NodeBase,
    anchor: Rect,
    child_size: Size,
}

impl Widget for Anchored {
    fn node_type(&self) -> TypeId {
        TypeId::of::<AnchoredNode>()
    }

    fn create_node(&self) -> Box<dyn Node> {
        Box::new(AnchoredNode {
            base: NodeBase::new(),
            anchor: self.anchor,
            child_size: Size::new(0, 0),
        })
    }

    fn update_node(&self, node: &mut dyn Node) {
        let node = node
            .as_any_mut()
            .downcast_mut::<AnchoredNode>()
            .expect("reconciler matched node type");
        node.anchor = self.anchor;
    }

    fn children(&self) -> &[Box<dyn Widget>] {
        &self.child
    }
}

impl Node for AnchoredNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn measure(&mut self, constraints: Constraints) -> Size {
        let loose = Constraints::loose(constraints.max);
        self.child_size = Size::new(0, 0);
        for child in &mut self.base.children {
            let size = child.measure(loose);
            self.child_size.width = self.child_size.width.max(size.width);
            self.child_size.height = self.child_size.height.max(size.height);
        }
        constraints.max
    }

    fn arrange(&mut self, bounds: Rect) {
        self.base.bounds = bounds;
        // Prefer below the anchor, flipping above when there is no room;
        // clamp horizontally into the bounds.
        let width = self.child_size.width.min(bounds.width);
        let height = self.child_size.height.min(bounds.height);
        let max_x = bounds.right().saturating_sub(width);
        let x = self.anchor.x.min(max_x).max(bounds.x);
        let below = self.anchor.bottom();
        let y = if below + height <= bounds.bottom() {
            below
        } else {
            self.anchor.y.saturating_sub(height).max(bounds.y)
        };
        let child_rect = Rect::new(x, y, width, height);
        for child in &mut self.base.children {
            child.arrange(child_rect);
        }
    }
}

/// Applies a style before its subtree renders; realizes popup theme
/// mutators.
pub struct StylePanel {
    pub style: Style,
    pub child: Vec<Box<dyn Widget>>,
}

impl StylePanel {
    pub fn new(style: Style, child: Box<dyn Widget>) -> Self {
        Self {
            style,
            child: vec![child],
        }
    }
}

pub struct StylePanelNode {
    base: NodeBase,
    style: Style,
}

impl Widget for StylePanel {
    fn node_type(&self) -> TypeId {
        TypeId::of::<StylePanelNode>()
    }

    fn create_node(&self) -> Box<dyn Node> {
        Box::new(StylePanelNode {
            base: NodeBase::new(),
            style: self.style,
        })
    }

    fn update_node(&self, node: &mut dyn Node) {
        let node = node
            .as_any_mut()
            .downcast_mut::<StylePanelNode>()
            .expect("reconciler matched node type");
        node.style = self.style;
    }

    fn children(&self) -> &[Box<dyn Widget>] {
        &self.child
    }
}

impl Node for StylePanelNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn measure(&mut self, constraints: Constraints) -> Size {
        let mut size = constraints.min;
        for child in &mut self.base.children {
            let child_size = child.measure(constraints);
            size.width = size.width.max(child_size.width);
            size.height = size.height.max(child_size.height);
        }
        constraints.clamp(size)
    }

    fn render(&self, ctx: &mut RenderContext) {
        ctx.set_style(self.style);
    }
}
