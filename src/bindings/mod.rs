//! Prefix tree mapping key sequences to actions.
//!
//! `BindingTrie` nodes carry an optional [`Binding`] and a map of children.
//! A node holding both a binding and children is *ambiguous*: the mode
//! machine waits for a follow-on key or the ambiguity timeout before firing.
//!
//! Tries are immutable once built. Reconfiguration rebuilds them whole and
//! swaps them in through [`SharedKeymaps`].

pub mod default;
pub mod keymap;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::builtins::Builtins;
use crate::command::{CommandAction, CommandRunner};
use crate::keys::{Key, KeyParseError, KeySequence};
use crate::mode::{ActionContext, Substate};

pub use keymap::{BindingSet, Keymaps, RawBinding, SharedKeymaps};

/// Something a binding fires.
///
/// Actions run on the dispatcher task, never on the input pump.
pub trait Action: Send + Sync {
    fn run(&self, count: Option<u32>, substate: Substate, ctx: &ActionContext);

    /// Target form, e.g. `builtin:scroll_down` or `cmd:open example.com`.
    fn describe(&self) -> String;
}

/// `from` → `to`.
#[derive(Clone)]
pub struct Binding {
    pub from: KeySequence,
    pub to: Arc<dyn Action>,
}

impl Binding {
    pub fn new(from: KeySequence, to: Arc<dyn Action>) -> Self {
        Self { from, to }
    }

    pub fn action(&self) -> Arc<dyn Action> {
        self.to.clone()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("from", &self.from.render(true))
            .field("to", &self.to.describe())
            .finish()
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from, self.to.describe())
    }
}

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("binding conflict: `{existing}` already bound, `{new}` rejected")]
    Conflict { existing: Binding, new: Binding },
    #[error("cannot bind an empty key sequence")]
    EmptySequence,
}

// ─────────────────────────────────────────────────────────────────────────────
// BindingTrie
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct BindingTrie {
    binding: Option<Binding>,
    children: HashMap<Key, Arc<BindingTrie>>,
    /// Insertion order, for stable leaf listings.
    order: Vec<Key>,
}

impl BindingTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `binding` at the end of its key path.
    ///
    /// Intermediate bindings are fine (ambiguous prefixes); a binding already
    /// sitting on the terminal node is a conflict and the trie is unchanged.
    pub fn insert(&mut self, binding: Binding) -> Result<(), TrieError> {
        if binding.from.is_empty() {
            return Err(TrieError::EmptySequence);
        }

        let mut node = self;
        for key in binding.from.iter() {
            if !node.children.contains_key(key) {
                node.order.push(*key);
            }
            node = Arc::make_mut(node.children.entry(*key).or_default());
        }

        if let Some(existing) = &node.binding {
            return Err(TrieError::Conflict {
                existing: existing.clone(),
                new: binding,
            });
        }
        node.binding = Some(binding);
        Ok(())
    }

    pub fn descend(&self, key: &Key) -> Option<&Arc<BindingTrie>> {
        self.children.get(&key.normalize())
    }

    /// Follows a whole sequence from this node.
    pub fn lookup(&self, keys: &KeySequence) -> Option<&BindingTrie> {
        let mut node = self;
        for key in keys.iter() {
            node = node.descend(key)?;
        }
        Some(node)
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Binding present and further keys possible.
    pub fn is_ambiguous(&self) -> bool {
        self.binding.is_some() && self.has_children()
    }

    /// Every `(path, binding)` below this node, paths relative to it.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            stack: vec![(KeySequence::new(), self)],
        }
    }

    pub fn len(&self) -> usize {
        self.leaves().count()
    }

    pub fn is_empty(&self) -> bool {
        self.binding.is_none() && self.children.is_empty()
    }
}

impl fmt::Debug for BindingTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.leaves().map(|(path, b)| (path.render(true), b.to.describe())))
            .finish()
    }
}

/// Depth-first walk, parents before children, siblings in insertion order.
pub struct Leaves<'a> {
    stack: Vec<(KeySequence, &'a BindingTrie)>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = (KeySequence, &'a Binding);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, node)) = self.stack.pop() {
            for key in node.order.iter().rev() {
                if let Some(child) = node.children.get(key) {
                    let mut child_path = path.clone();
                    child_path.push(*key);
                    self.stack.push((child_path, child.as_ref()));
                }
            }
            if let Some(binding) = &node.binding {
                return Some((path, binding));
            }
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Targets and build
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("invalid key sequence `{from}`: {source}")]
    Keys {
        from: String,
        #[source]
        source: KeyParseError,
    },
    #[error("`{{n}}` may only prefix a binding, found in `{0}`")]
    MisplacedCount(String),
    #[error(transparent)]
    Trie(#[from] TrieError),
    #[error("unknown builtin `{0}`")]
    UnknownBuiltin(String),
    #[error("builtin `{name}`: {reason}")]
    BadArguments { name: String, reason: String },
    #[error("invalid binding target `{0}` (expected `builtin:NAME` or `cmd:COMMAND`)")]
    BadTarget(String),
}

/// Right-hand side of a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Builtin { name: String, args: Vec<String> },
    Command(String),
}

impl Target {
    pub fn parse(to: &str) -> Result<Self, BindingError> {
        let to = to.trim();
        if let Some(rest) = to.strip_prefix("builtin:") {
            let mut words = rest.split_whitespace();
            let Some(name) = words.next() else {
                return Err(BindingError::BadTarget(to.to_string()));
            };
            return Ok(Target::Builtin {
                name: name.to_string(),
                args: words.map(str::to_string).collect(),
            });
        }
        if let Some(command) = to.strip_prefix("cmd:") {
            let command = command.trim();
            if command.is_empty() {
                return Err(BindingError::BadTarget(to.to_string()));
            }
            return Ok(Target::Command(command.to_string()));
        }
        Err(BindingError::BadTarget(to.to_string()))
    }

    pub fn resolve(
        self,
        builtins: &Builtins,
        runner: &Arc<dyn CommandRunner>,
    ) -> Result<Arc<dyn Action>, BindingError> {
        match self {
            Target::Builtin { name, args } => builtins.resolve(&name, args),
            Target::Command(command) => Ok(Arc::new(CommandAction::new(command, runner.clone()))),
        }
    }
}

/// Parses a left-hand side; a leading `{n}` is accepted and dropped since
/// every normal-mode binding already receives the typed count.
pub fn parse_from(from: &str) -> Result<KeySequence, BindingError> {
    let mut keys = KeySequence::parse(from).map_err(|source| BindingError::Keys {
        from: from.to_string(),
        source,
    })?;
    keys.strip_count_prefix();
    if keys.iter().any(Key::is_virtual) {
        return Err(BindingError::MisplacedCount(from.to_string()));
    }
    Ok(keys)
}

/// Resolves one raw `(from, to)` pair into a binding.
pub fn resolve_binding(
    from: &str,
    to: &str,
    builtins: &Builtins,
    runner: &Arc<dyn CommandRunner>,
) -> Result<Binding, BindingError> {
    let keys = parse_from(from)?;
    let action = Target::parse(to)?.resolve(builtins, runner)?;
    Ok(Binding::new(keys, action))
}

/// Builds a trie from raw pairs. Faulty pairs are dropped and reported; the
/// rest of the trie is still built.
pub fn build<'a, I>(
    raw: I,
    builtins: &Builtins,
    runner: &Arc<dyn CommandRunner>,
) -> (BindingTrie, Vec<BindingError>)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut trie = BindingTrie::new();
    let mut errors = Vec::new();
    for (from, to) in raw {
        let inserted = resolve_binding(from, to, builtins, runner)
            .and_then(|binding| trie.insert(binding).map_err(BindingError::from));
        if let Err(error) = inserted {
            errors.push(error);
        }
    }
    (trie, errors)
}
