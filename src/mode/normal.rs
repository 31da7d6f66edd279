use std::sync::Arc;

use tracing::debug;

use super::timeout::{self, CancelHandle};
use super::{State, StateContext, StateId, Substate};
use crate::bindings::BindingTrie;
use crate::keys::{Key, KeySequence};

/// Normal mode: walks the substate's trie one key at a time.
pub struct NormalState {
    id: StateId,
    substate: Substate,
    /// `None` is the root of the substate's trie.
    node: Option<Arc<BindingTrie>>,
    keys: KeySequence,
    count: Option<u32>,
    pending: Option<CancelHandle>,
}

impl NormalState {
    pub(crate) fn new(substate: Substate) -> Self {
        Self {
            id: StateId::fresh(),
            substate,
            node: None,
            keys: KeySequence::new(),
            count: None,
            pending: None,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn substate(&self) -> Substate {
        self.substate
    }

    pub fn keys(&self) -> &KeySequence {
        &self.keys
    }

    pub fn count(&self) -> Option<u32> {
        self.count
    }

    /// An ambiguous binding is waiting for its timer.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn step(mut self, key: &Key, ctx: &StateContext) -> (State, bool) {
        // Préfixe numérique, avant toute descente dans le trie.
        if self.substate.accepts_count()
            && self.keys.is_empty()
            && let Some(digit) = key.digit()
            && (digit != 0 || self.count.is_some())
        {
            let count = self.count.unwrap_or(0).saturating_mul(10).saturating_add(digit);
            self.count = Some(count);
            return (State::Normal(self), true);
        }

        let node = self
            .node
            .clone()
            .or_else(|| ctx.keymaps.trie(self.substate));
        let child = node.as_ref().and_then(|n| n.descend(key)).cloned();

        let Some(child) = child else {
            return self.miss(key);
        };

        self.keys.push(key.normalize());

        if let Some(binding) = child.binding()
            && !child.has_children()
        {
            if let Some(pending) = self.pending.take() {
                pending.cancel();
            }
            debug!(keys = %self.keys, to = %binding.to.describe(), "binding matched");
            ctx.dispatcher
                .dispatch(binding.action(), self.dispatch_count(), self.substate);
            return (State::normal_in(self.substate.reset_target()), true);
        }

        if let Some(binding) = child.binding() {
            if let Some(pending) = self.pending.take() {
                pending.cancel();
            }
            debug!(keys = %self.keys, "ambiguous binding, waiting");
            self.pending = Some(timeout::schedule(
                binding.action(),
                self.dispatch_count(),
                self.substate,
                ctx,
            ));
        }

        self.node = Some(child);
        (State::Normal(self), true)
    }

    /// No child for `key` below the current node.
    fn miss(mut self, key: &Key) -> (State, bool) {
        let leave_submode = self.substate != Substate::NormalNormal;

        if let Some(pending) = self.pending.take() {
            pending.expedite();
            return (State::normal(), key.is_escape() || leave_submode);
        }
        if leave_submode {
            return (State::normal(), true);
        }
        if self.keys.is_empty() && self.count.is_none() {
            return (State::Normal(self), false);
        }
        (State::normal(), key.is_escape())
    }

    fn dispatch_count(&self) -> Option<u32> {
        self.count.filter(|n| *n > 0)
    }

    pub(crate) fn status_line(&self) -> String {
        let label = match self.substate {
            Substate::NormalQuickmark => "QUICKMARK",
            Substate::NormalQuickmarkTab => "QUICKMARK TAB",
            Substate::NormalQuickmarkWindow => "QUICKMARK WINDOW",
            Substate::NormalQuickmarksRapid => "QUICKMARKS RAPID",
            _ => "NORMAL",
        };
        let mut line = format!("-- {label} --");
        if self.count.is_some() || !self.keys.is_empty() {
            line.push(' ');
            if let Some(count) = self.count {
                line.push_str(&count.to_string());
            }
            line.push_str(&self.keys.render(true));
        }
        line
    }
}
