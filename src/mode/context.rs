use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{Dispatcher, State, StateId, StateUpdate, Substate};
use crate::bindings::SharedKeymaps;
use crate::builtins::Builtins;
use crate::command::CommandRunner;
use crate::host::Host;

/// Sending half of the `set_state` channel.
#[derive(Clone)]
pub struct StateSender(mpsc::UnboundedSender<StateUpdate>);

pub fn state_channel() -> (StateSender, mpsc::UnboundedReceiver<StateUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StateSender(tx), rx)
}

impl StateSender {
    pub fn set(&self, state: State) {
        self.send(StateUpdate::Set(state));
    }

    pub fn replace(&self, from: StateId, state: State) {
        self.send(StateUpdate::Replace { from, state });
    }

    pub fn status(&self, substate: Substate, message: impl Into<String>) {
        self.send(StateUpdate::Status {
            substate,
            message: message.into(),
        });
    }

    fn send(&self, update: StateUpdate) {
        if self.0.send(update).is_err() {
            debug!("state update dropped, machine is gone");
        }
    }
}

/// What a `step` needs besides the key.
#[derive(Clone)]
pub struct StateContext {
    pub(crate) keymaps: SharedKeymaps,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) states: StateSender,
    pub(crate) ambiguity_timeout: Duration,
}

impl StateContext {
    pub fn new(
        keymaps: SharedKeymaps,
        dispatcher: Dispatcher,
        states: StateSender,
        ambiguity_timeout: Duration,
    ) -> Self {
        Self {
            keymaps,
            dispatcher,
            states,
            ambiguity_timeout,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ActionContext : ce que voit une action pendant son exécution
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ActionContext {
    host: Arc<dyn Host>,
    states: StateSender,
    keymaps: SharedKeymaps,
    builtins: Arc<Builtins>,
    runner: Arc<dyn CommandRunner>,
}

impl ActionContext {
    pub fn new(
        host: Arc<dyn Host>,
        states: StateSender,
        keymaps: SharedKeymaps,
        builtins: Arc<Builtins>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            host,
            states,
            keymaps,
            builtins,
            runner,
        }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn keymaps(&self) -> &SharedKeymaps {
        &self.keymaps
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// The only way for an action to change mode.
    pub fn set_state(&self, state: State) {
        self.states.set(state);
    }

    /// Wraps whatever state is current with a status message.
    pub fn set_status(&self, substate: Substate, message: impl Into<String>) {
        self.states.status(substate, message);
    }

    pub fn echo(&self, message: impl Into<String>) {
        self.set_status(Substate::StatusMinor, message);
    }

    pub fn report_error(&self, error: impl Display) {
        let message = error.to_string();
        warn!(error = %message, "action failed");
        self.states.status(Substate::StatusError, message);
    }

    /// Opens the command line; on Return the line goes through the command
    /// runner with `count`.
    pub fn prompt(&self, prefix: String, suffix: String, count: Option<u32>) {
        let finalizer = Box::new(move |line: String, ctx: &ActionContext| {
            if line.trim().is_empty() {
                return;
            }
            if let Err(error) = ctx.runner().run(&line, count, ctx) {
                ctx.report_error(error);
            }
        });
        self.set_state(State::command_line(prefix, suffix, finalizer));
    }

    /// Enters confirm mode. The receiver resolves with the answer, or errors
    /// if the prompt is replaced before one is given.
    pub fn confirm(&self, prompt: impl Into<String>) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.set_state(State::confirm(prompt.into(), tx));
        rx
    }
}
