use tracing::trace;

use crate::widget::{Node, Widget};

/// Match a widget against an existing node: update in place when the
/// concrete node type and key both line up, replace otherwise. Children
/// reconcile recursively by insertion order, with keyed children matched
/// by key within the same parent only.
pub fn reconcile(existing: Option<Box<dyn Node>>, widget: &dyn Widget) -> Box<dyn Node> {
    let mut node = match existing {
        Some(mut node)
            if node.as_any().type_id() == widget.node_type()
                && node.base().key.as_deref() == widget.key() =>
        {
            widget.update_node(node.as_mut());
            node
        }
        other => {
            if other.is_some() {
                trace!("replacing node of mismatched type");
            }
            let mut node = widget.create_node();
            {
                let base = node.base_mut();
                base.is_new = true;
                base.dirty = true;
                base.key = widget.key().map(String::from);
            }
            node
        }
    };
    reconcile_children(&mut node, widget.children());
    node
}

fn reconcile_children(parent: &mut Box<dyn Node>, widgets: &[Box<dyn Widget>]) {
    let mut old: Vec<Option<Box<dyn Node>>> = parent
        .base_mut()
        .children
        .drain(..)
        .map(Some)
        .collect();

    let mut next = Vec::with_capacity(widgets.len());
    for (index, widget) in widgets.iter().enumerate() {
        let candidate = match widget.key() {
            Some(key) => old
                .iter_mut()
                .find(|slot| {
                    slot.as_ref()
                        .is_some_and(|node| node.base().key.as_deref() == Some(key))
                })
                .and_then(Option::take),
            None => old.get_mut(index).and_then(Option::take),
        };
        next.push(reconcile(candidate, widget.as_ref()));
    }
    // Unmatched old children drop here, with their subtrees.
    parent.base_mut().children = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::{Label, ZStack};
    use cathode_core::Style;

    fn label(text: &str) -> Box<dyn Widget> {
        Box::new(Label::new(text))
    }

    fn keyed_label(text: &str, key: &str) -> Box<dyn Widget> {
        Box::new(Label::new(text).with_key(key))
    }

    #[test]
    fn matching_type_updates_in_place() {
        let first = reconcile(None, &Label::new("a"));
        let id = first.base().id;
        assert!(first.base().is_new);

        let second = reconcile(Some(first), &Label::new("b"));
        assert_eq!(second.base().id, id, "node must be reused");
        assert!(second.base().dirty, "text change marks dirty");
    }

    #[test]
    fn unchanged_widget_is_not_dirty() {
        let mut first = reconcile(None, &Label::new("a"));
        first.base_mut().dirty = false;
        first.base_mut().is_new = false;
        let second = reconcile(Some(first), &Label::new("a"));
        assert!(!second.base().dirty);
    }

    #[test]
    fn type_mismatch_replaces_node() {
        let first = reconcile(None, &Label::new("a"));
        let id = first.base().id;
        let second = reconcile(Some(first), &ZStack::new(vec![]));
        assert_ne!(second.base().id, id);
        assert!(second.base().is_new);
    }

    #[test]
    fn children_match_by_position() {
        let tree = reconcile(None, &ZStack::new(vec![label("a"), label("b")]));
        let ids: Vec<u64> = tree.base().children.iter().map(|c| c.base().id).collect();

        let tree = reconcile(
            Some(tree),
            &ZStack::new(vec![label("a2"), label("b2"), label("c")]),
        );
        let new_ids: Vec<u64> = tree.base().children.iter().map(|c| c.base().id).collect();
        assert_eq!(&new_ids[..2], &ids[..], "positional children reused");
        assert_eq!(tree.base().children.len(), 3);
        assert!(tree.base().children[2].base().is_new);
    }

    #[test]
    fn keyed_children_follow_their_key() {
        let tree = reconcile(
            None,
            &ZStack::new(vec![keyed_label("a", "ka"), keyed_label("b", "kb")]),
        );
        let id_a = tree.base().children[0].base().id;
        let id_b = tree.base().children[1].base().id;

        // Swap order; identity follows the key.
        let tree = reconcile(
            Some(tree),
            &ZStack::new(vec![keyed_label("b", "kb"), keyed_label("a", "ka")]),
        );
        assert_eq!(tree.base().children[0].base().id, id_b);
        assert_eq!(tree.base().children[1].base().id, id_a);
    }

    #[test]
    fn dropped_keyed_child_is_not_resurrected() {
        let tree = reconcile(
            None,
            &ZStack::new(vec![keyed_label("a", "ka"), keyed_label("b", "kb")]),
        );
        let id_b = tree.base().children[1].base().id;

        let tree = reconcile(Some(tree), &ZStack::new(vec![keyed_label("b", "kb")]));
        assert_eq!(tree.base().children.len(), 1);
        assert_eq!(tree.base().children[0].base().id, id_b);

        let tree = reconcile(
            Some(tree),
            &ZStack::new(vec![keyed_label("b", "kb"), keyed_label("a", "ka")]),
        );
        assert!(tree.base().children[1].base().is_new, "ka was dropped");
    }

    #[test]
    fn style_only_change_marks_dirty() {
        let mut first = reconcile(None, &Label::new("a"));
        first.base_mut().dirty = false;
        let styled = Label::styled(
            "a",
            Style {
                fg: None,
                bg: None,
                flags: cathode_common::types::CellFlags::BOLD,
            },
        );
        let second = reconcile(Some(first), &styled);
        assert!(second.base().dirty);
    }
}
