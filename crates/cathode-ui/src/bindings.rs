use std::collections::HashMap;

use cathode_common::input::{KeyCode, KeyEvent, Modifiers};

/// One key press with its modifiers, as stored in binding tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyChord {
    pub fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self { code, modifiers }
    }

    pub fn plain(code: KeyCode) -> Self {
        Self::new(code, Modifiers::empty())
    }

    pub fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), Modifiers::CTRL)
    }
}

impl From<KeyEvent> for KeyChord {
    fn from(event: KeyEvent) -> Self {
        Self::new(event.code, event.modifiers)
    }
}

pub type BindingAction = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOptions {
    /// Consulted even when an unrelated node is focused.
    pub global: bool,
    /// Consulted even while another node has captured input.
    pub capture_override: bool,
}

pub struct Binding {
    pub options: BindOptions,
    action: BindingAction,
}

impl Binding {
    pub fn run(&mut self) {
        (self.action)();
    }
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<KeyChord, TrieNode>,
    binding: Option<Binding>,
}

/// What a sequence lookup found.
pub enum Lookup<'a> {
    None,
    /// Some binding continues past this sequence; hold the keys.
    Prefix,
    Exact(&'a mut Binding),
}

/// Prefix trie of key sequences. A later registration at the same
/// sequence replaces the earlier one.
#[derive(Default)]
pub struct BindingTrie {
    root: TrieNode,
}

impl BindingTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub fn bind(&mut self, sequence: &[KeyChord], options: BindOptions, action: BindingAction) {
        debug_assert!(!sequence.is_empty());
        let mut node = &mut self.root;
        for chord in sequence {
            node = node.children.entry(*chord).or_default();
        }
        node.binding = Some(Binding { options, action });
    }

    pub fn bind_key(&mut self, chord: KeyChord, action: BindingAction) {
        self.bind(&[chord], BindOptions::default(), action);
    }

    pub fn lookup(&mut self, sequence: &[KeyChord]) -> Lookup<'_> {
        let mut node = &mut self.root;
        for chord in sequence {
            match node.children.get_mut(chord) {
                Some(next) => node = next,
                None => return Lookup::None,
            }
        }
        match &mut node.binding {
            Some(binding) => Lookup::Exact(binding),
            None if !node.children.is_empty() => Lookup::Prefix,
            None => Lookup::None,
        }
    }

    /// Whether any sequence in this trie starts with `sequence` strictly
    /// continuing past it.
    pub fn has_continuation(&mut self, sequence: &[KeyChord]) -> bool {
        matches!(self.lookup(sequence), Lookup::Prefix)
    }
}
