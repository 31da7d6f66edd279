use tokio::sync::oneshot;
use tracing::debug;

use super::{State, StateId};
use crate::keys::Key;

/// Question oui/non. La réponse part dans le `oneshot` ; si l'état est
/// remplacé sans réponse, le récepteur voit le canal fermé.
pub struct ConfirmState {
    id: StateId,
    prompt: String,
    result: Option<oneshot::Sender<bool>>,
}

impl ConfirmState {
    pub(crate) fn new(prompt: String, result: oneshot::Sender<bool>) -> Self {
        Self {
            id: StateId::fresh(),
            prompt,
            result: Some(result),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub(crate) fn step(self, key: &Key) -> (State, bool) {
        match key.printable() {
            Some('y' | 'Y') => self.answer(true),
            Some('n' | 'N') => self.answer(false),
            _ if key.is_escape() => self.answer(false),
            _ => (State::Confirm(self), true),
        }
    }

    fn answer(mut self, yes: bool) -> (State, bool) {
        debug!(prompt = %self.prompt, yes, "confirm answered");
        if let Some(result) = self.result.take() {
            let _ = result.send(yes);
        }
        (State::normal(), true)
    }
}
