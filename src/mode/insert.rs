use super::{State, StateId};
use crate::keys::Key;

/// Every key goes to the page, except Escape.
pub struct InsertState {
    id: StateId,
}

impl InsertState {
    pub(crate) fn new() -> Self {
        Self {
            id: StateId::fresh(),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub(crate) fn step(self, key: &Key) -> (State, bool) {
        if key.is_escape() {
            return (State::normal(), true);
        }
        (State::Insert(self), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Keymaps;
    use crate::keys::{Modifiers, NamedKey};
    use crate::mode::fixtures::fixture;

    #[tokio::test]
    async fn test_insert_forwards_everything_but_escape() {
        let f = fixture(Keymaps::new());
        let state = State::insert();
        let id = state.id();

        let (state, swallow) = state.step(&Key::char('j'), &f.ctx);
        assert!(!swallow);
        assert_eq!(state.id(), id);

        let (state, swallow) = state.step(&Key::named(NamedKey::Return), &f.ctx);
        assert!(!swallow);

        let shifted_escape = Key::named(NamedKey::Escape).with_modifiers(Modifiers::SHIFT);
        let (state, swallow) = state.step(&shifted_escape, &f.ctx);
        assert!(swallow);
        assert_eq!(state.substate(), crate::mode::Substate::NormalNormal);
    }
}
