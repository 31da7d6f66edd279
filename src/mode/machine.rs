//! Pompe d'entrée : applique les mises à jour d'état puis fait avancer
//! l'état courant touche par touche.

use std::mem;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use super::{State, StateContext, StateUpdate};
use crate::keys::{Debouncer, Key};

/// One key event from the host. `reply` receives the swallow flag.
pub struct KeyPress {
    pub key: Key,
    pub at: Instant,
    pub reply: Option<oneshot::Sender<bool>>,
}

impl KeyPress {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            at: Instant::now(),
            reply: None,
        }
    }
}

/// Sole owner of the current state.
pub struct ModeMachine {
    state: State,
    ctx: StateContext,
    updates: mpsc::UnboundedReceiver<StateUpdate>,
    debouncer: Debouncer,
}

impl ModeMachine {
    pub fn new(
        ctx: StateContext,
        updates: mpsc::UnboundedReceiver<StateUpdate>,
        debounce: Duration,
    ) -> Self {
        Self {
            state: State::normal(),
            ctx,
            updates,
            debouncer: Debouncer::new(debounce),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn context(&self) -> &StateContext {
        &self.ctx
    }

    /// Steps the current state with `key`; returns the swallow flag.
    ///
    /// Pending updates are applied first. A debounced duplicate is dropped
    /// and reported as swallowed so the host does not forward it either.
    pub fn handle_key(&mut self, key: Key, at: Instant) -> bool {
        self.apply_updates();
        if !self.debouncer.admit(&key, at) {
            trace!(key = %key, "duplicate key dropped");
            return true;
        }
        let state = mem::take(&mut self.state);
        let (next, swallow) = state.step(&key, &self.ctx);
        debug!(key = %key, swallow, state = %next.status_line(), "key");
        self.state = next;
        swallow
    }

    /// Applies every queued update, in arrival order.
    pub fn apply_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates.try_recv() {
            self.apply(update);
            applied += 1;
        }
        applied
    }

    /// Waits for the next update and applies it. `false` once every sender
    /// is gone.
    pub async fn next_update(&mut self) -> bool {
        match self.updates.recv().await {
            Some(update) => {
                self.apply(update);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Set(state) => {
                debug!(state = %state.status_line(), "set_state");
                self.state = state;
            }
            StateUpdate::Replace { from, state } => {
                if self.state.inner().id() == from {
                    debug!(state = %state.status_line(), "replace");
                    self.state = state;
                } else {
                    debug!(?from, current = ?self.state.id(), "stale replace dropped");
                }
            }
            StateUpdate::Status { substate, message } => {
                let current = mem::take(&mut self.state);
                self.state = State::status(current, substate, message);
            }
        }
    }

    /// Runs until the key channel closes. `observe` sees the state after
    /// every key and every update.
    pub async fn run<F>(mut self, mut keys: mpsc::Receiver<KeyPress>, mut observe: F)
    where
        F: FnMut(&State),
    {
        enum Event {
            Key(KeyPress),
            Update(StateUpdate),
            Closed,
        }

        loop {
            let event = tokio::select! {
                biased;
                update = self.updates.recv() => match update {
                    Some(update) => Event::Update(update),
                    None => Event::Closed,
                },
                press = keys.recv() => match press {
                    Some(press) => Event::Key(press),
                    None => Event::Closed,
                },
            };

            match event {
                Event::Update(update) => self.apply(update),
                Event::Key(press) => {
                    let swallow = self.handle_key(press.key, press.at);
                    if let Some(reply) = press.reply {
                        let _ = reply.send(swallow);
                    }
                }
                Event::Closed => break,
            }
            observe(&self.state);
        }
        debug!("input pump stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Keymaps;
    use crate::bindings::tests::trie;
    use crate::mode::Substate;
    use crate::mode::fixtures::{Fixture, fixture};

    fn machine(f: &mut Fixture) -> ModeMachine {
        let (_, empty) = mpsc::unbounded_channel();
        let updates = mem::replace(&mut f.updates, empty);
        ModeMachine::new(f.ctx.clone(), updates, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_debouncer_drops_double_fire() {
        let mut f = fixture(Keymaps::new().with(Substate::NormalNormal, trie(&[("j", "down")])));
        let mut m = machine(&mut f);
        let t0 = Instant::now();
        assert!(m.handle_key(Key::char('j'), t0));
        assert!(m.handle_key(Key::char('j'), t0 + Duration::from_millis(3)));
        assert!(m.handle_key(Key::char('j'), t0 + Duration::from_millis(40)));
        assert_eq!(f.dispatched().len(), 2);
    }

    #[tokio::test]
    async fn test_updates_apply_before_next_key() {
        let mut f = fixture(Keymaps::new());
        let mut m = machine(&mut f);
        f.ctx.states.set(State::insert());
        let swallow = m.handle_key(Key::char('j'), Instant::now());
        assert!(!swallow);
        assert_eq!(m.state().substate(), Substate::InsertNormal);
    }

    #[tokio::test]
    async fn test_status_update_wraps_current_state() {
        let mut f = fixture(Keymaps::new());
        let mut m = machine(&mut f);
        f.ctx.states.status(Substate::StatusError, "nope");
        assert!(m.next_update().await);
        assert_eq!(m.state().substate(), Substate::StatusError);
        assert_eq!(m.state().inner().substate(), Substate::NormalNormal);

        // set_state replaces the wrapper too.
        f.ctx.states.set(State::insert());
        m.apply_updates();
        assert!(matches!(m.state(), State::Insert(_)));
    }

    #[tokio::test]
    async fn test_replace_only_applies_to_its_state() {
        let mut f = fixture(Keymaps::new());
        let mut m = machine(&mut f);
        let normal = m.state().id();

        f.ctx.states.status(Substate::StatusMinor, "hello");
        f.ctx.states.replace(normal, State::insert());
        m.apply_updates();
        assert_eq!(m.state().substate(), Substate::InsertNormal);

        // Le Normal d'origine n'est plus là : la réponse tardive est ignorée.
        f.ctx.states.replace(normal, State::normal_in(Substate::NormalQuickmark));
        m.apply_updates();
        assert_eq!(m.state().substate(), Substate::InsertNormal);
    }

    #[tokio::test]
    async fn test_run_replies_and_stops_on_close() {
        let mut f = fixture(Keymaps::new().with(Substate::NormalNormal, trie(&[("j", "down")])));
        let m = machine(&mut f);
        let (keys_tx, keys_rx) = mpsc::channel(1);
        let pump = tokio::spawn(m.run(keys_rx, |_| {}));

        let (reply_tx, reply_rx) = oneshot::channel();
        keys_tx
            .send(KeyPress {
                key: Key::char('j'),
                at: Instant::now(),
                reply: Some(reply_tx),
            })
            .await
            .unwrap();
        assert!(reply_rx.await.unwrap());

        let (reply_tx, reply_rx) = oneshot::channel();
        keys_tx
            .send(KeyPress {
                key: Key::char('x'),
                at: Instant::now(),
                reply: Some(reply_tx),
            })
            .await
            .unwrap();
        assert!(!reply_rx.await.unwrap());

        drop(keys_tx);
        pump.await.unwrap();
        assert_eq!(f.dispatched(), vec![("down".to_string(), None)]);
    }
}
