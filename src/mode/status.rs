use super::{State, StateContext, StateId, Substate};
use crate::keys::Key;

/// Message de statut posé par-dessus un autre état.
///
/// Keys go to the inner state. If the inner state comes back with the same
/// id (updated in place or untouched) the message stays; any other result
/// replaces the wrapper.
pub struct StatusState {
    id: StateId,
    substate: Substate,
    message: String,
    inner: Box<State>,
}

impl StatusState {
    pub(crate) fn new(inner: State, substate: Substate, message: String) -> Self {
        Self {
            id: StateId::fresh(),
            substate,
            message,
            inner: Box::new(inner),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn substate(&self) -> Substate {
        self.substate
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn inner(&self) -> &State {
        &self.inner
    }

    pub fn into_inner(self) -> State {
        *self.inner
    }

    pub(crate) fn step(mut self, key: &Key, ctx: &StateContext) -> (State, bool) {
        let before = self.inner.id();
        let (next, swallow) = self.inner.step(key, ctx);
        if next.id() == before {
            self.inner = Box::new(next);
            (State::Status(self), swallow)
        } else {
            (next, swallow)
        }
    }

    pub(crate) fn status_line(&self) -> String {
        let tag = match self.substate {
            Substate::StatusError => "E",
            Substate::StatusMajor => "!",
            _ => "-",
        };
        format!("[{tag}] {} │ {}", self.message, self.inner.status_line())
    }
}
