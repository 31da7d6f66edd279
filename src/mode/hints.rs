use tokio::sync::watch;
use tracing::{debug, warn};

use super::{State, StateContext, StateId, StateSender, Substate};
use crate::host::Hinter;
use crate::keys::{Key, NamedKey};

/// Étiquettes de liens tapées au clavier.
///
/// Every buffer change asks the host to filter; the answer comes back on a
/// spawned task and only touches the machine through a guarded replace.
/// Dropping the state (Escape, Return, any `set_state`) closes `alive` and
/// abandons the filter tasks still in flight.
pub struct HintsState {
    id: StateId,
    typed: String,
    rapid: bool,
    hinter: Hinter,
    alive: watch::Sender<()>,
}

impl HintsState {
    pub(crate) fn new(hinter: Hinter, rapid: bool) -> Self {
        Self {
            id: StateId::fresh(),
            typed: String::new(),
            rapid,
            hinter,
            alive: watch::channel(()).0,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn substate(&self) -> Substate {
        if self.rapid {
            Substate::HintsRapid
        } else {
            Substate::HintsNormal
        }
    }

    pub fn typed(&self) -> &str {
        &self.typed
    }

    pub(crate) fn step(mut self, key: &Key, ctx: &StateContext) -> (State, bool) {
        if key.is_escape() || key.is_return() {
            return (State::normal(), true);
        }
        if key.is_named(NamedKey::BackSpace) {
            self.typed.pop();
            if self.typed.is_empty() {
                return (State::normal(), true);
            }
            self.filter(ctx.states.clone());
            return (State::Hints(self), true);
        }
        if let Some(c) = key.printable() {
            self.typed.push(c);
            self.filter(ctx.states.clone());
        }
        (State::Hints(self), true)
    }

    fn filter(&self, states: StateSender) {
        let hinter = self.hinter.clone();
        let typed = self.typed.clone();
        let rapid = self.rapid;
        let from = self.id;
        let mut alive = self.alive.subscribe();

        tokio::spawn(async move {
            // Rien n'est jamais envoyé sur `alive` : `changed` ne se termine
            // qu'à la fermeture, quand l'état Hints a disparu.
            let hit = tokio::select! {
                hit = hinter.filter.filter(&typed) => hit,
                _ = alive.changed() => {
                    debug!(%typed, "hints left, filter abandoned");
                    return;
                }
            };
            match hit {
                Ok(false) => {}
                Ok(true) => {
                    if alive.has_changed().is_err() {
                        debug!(%typed, "hints left, hit dropped");
                        return;
                    }
                    debug!(%typed, "hint hit");
                    let next = match hinter.executer.execute().await {
                        Ok(true) => State::hints(hinter, rapid),
                        Ok(false) => State::normal(),
                        Err(error) => {
                            warn!(%error, %typed, "hint execution failed");
                            State::normal()
                        }
                    };
                    states.replace(from, next);
                }
                Err(error) => warn!(%error, %typed, "hints filter failed"),
            }
        });
    }

    pub(crate) fn status_line(&self) -> String {
        let label = if self.rapid { "RAPID HINTS" } else { "HINTS" };
        format!("-- {label} -- {}", self.typed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;
    use crate::bindings::Keymaps;
    use crate::host::{HintExecuter, HintFilter, HostError};
    use crate::mode::StateUpdate;
    use crate::mode::fixtures::fixture;

    /// Hits on `hit`, fails on `"!"`, records every query.
    struct Scripted {
        hit: &'static str,
        continue_rapid: bool,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HintFilter for Scripted {
        async fn filter(&self, typed: &str) -> Result<bool, HostError> {
            self.queries.lock().push(typed.to_string());
            if typed == "!" {
                return Err(HostError::Failed("overlay gone".into()));
            }
            Ok(typed == self.hit)
        }
    }

    #[async_trait]
    impl HintExecuter for Scripted {
        async fn execute(&self) -> Result<bool, HostError> {
            Ok(self.continue_rapid)
        }
    }

    fn hinter(hit: &'static str, continue_rapid: bool) -> (Hinter, Arc<Scripted>) {
        let scripted = Arc::new(Scripted {
            hit,
            continue_rapid,
            queries: Mutex::new(Vec::new()),
        });
        (
            Hinter {
                filter: scripted.clone(),
                executer: scripted.clone(),
            },
            scripted,
        )
    }

    #[tokio::test]
    async fn test_hit_returns_to_normal() {
        let mut f = fixture(Keymaps::new());
        let (hinter, scripted) = hinter("ab", false);
        let state = State::hints(hinter, false);
        let (state, _) = state.step(&Key::char('a'), &f.ctx);
        let (state, swallow) = state.step(&Key::char('b'), &f.ctx);
        assert!(swallow);
        assert!(matches!(state, State::Hints(_)));

        let update = f.updates.recv().await.unwrap();
        assert!(matches!(update, StateUpdate::Replace { state: State::Normal(_), .. }));
        let mut queries = scripted.queries.lock().clone();
        queries.sort();
        assert_eq!(queries, vec!["a".to_string(), "ab".to_string()]);
    }

    #[tokio::test]
    async fn test_rapid_hit_reenters_hints() {
        let mut f = fixture(Keymaps::new());
        let (hinter, _) = hinter("a", true);
        let (_state, _) = State::hints(hinter, true).step(&Key::char('a'), &f.ctx);
        let update = f.updates.recv().await.unwrap();
        let StateUpdate::Replace {
            state: State::Hints(fresh),
            ..
        } = update
        else {
            panic!("expected fresh hints state");
        };
        assert!(fresh.typed().is_empty());
        assert_eq!(fresh.substate(), Substate::HintsRapid);
    }

    #[tokio::test]
    async fn test_filter_failure_keeps_state() {
        let mut f = fixture(Keymaps::new());
        let (hinter, scripted) = hinter("zz", false);
        let state = State::hints(hinter, false);
        let id = state.id();
        let (state, _) = state.step(&Key::char('!'), &f.ctx);
        assert_eq!(state.id(), id);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(scripted.queries.lock().len(), 1);
        assert!(f.drain_updates().is_empty());
    }

    #[tokio::test]
    async fn test_backspace_and_exit_keys() {
        let f = fixture(Keymaps::new());
        let (hinter, _) = hinter("zz", false);
        let state = State::hints(hinter.clone(), false);
        let (state, _) = state.step(&Key::char('a'), &f.ctx);
        let (state, _) = state.step(&Key::char('s'), &f.ctx);
        let (state, _) = state.step(&Key::named(NamedKey::BackSpace), &f.ctx);
        let State::Hints(hints) = &state else {
            panic!("expected hints");
        };
        assert_eq!(hints.typed(), "a");
        let (state, swallow) = state.step(&Key::named(NamedKey::BackSpace), &f.ctx);
        assert!(swallow);
        assert!(matches!(state, State::Normal(_)));

        let (state, swallow) = State::hints(hinter, false).step(&Key::named(NamedKey::Return), &f.ctx);
        assert!(swallow);
        assert!(matches!(state, State::Normal(_)));
    }

    /// Filter that answers only once `gate` is notified.
    struct Gated {
        gate: Notify,
        executed: AtomicBool,
    }

    #[async_trait]
    impl HintFilter for Gated {
        async fn filter(&self, _typed: &str) -> Result<bool, HostError> {
            self.gate.notified().await;
            Ok(true)
        }
    }

    #[async_trait]
    impl HintExecuter for Gated {
        async fn execute(&self) -> Result<bool, HostError> {
            self.executed.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_pending_hit_dropped_after_escape() {
        let mut f = fixture(Keymaps::new());
        let gated = Arc::new(Gated {
            gate: Notify::new(),
            executed: AtomicBool::new(false),
        });
        let hinter = Hinter {
            filter: gated.clone(),
            executer: gated.clone(),
        };

        let (state, _) = State::hints(hinter, true).step(&Key::char('a'), &f.ctx);
        tokio::task::yield_now().await;
        let (state, swallow) = state.step(&Key::named(NamedKey::Escape), &f.ctx);
        assert!(swallow);
        assert!(matches!(state, State::Normal(_)));

        gated.gate.notify_one();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!gated.executed.load(Ordering::SeqCst), "link followed after Escape");
        assert!(f.drain_updates().is_empty());
    }
}
