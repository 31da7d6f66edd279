//! Machine modale : états, sous-états et transitions.
//!
//! `State::step(key) → (state, swallow)` is the whole contract. `swallow`
//! tells the host not to forward the key to the focused widget. Everything
//! asynchronous (pending-binding timers, dispatched actions, hint lookups)
//! comes back through [`StateUpdate`] messages applied by [`ModeMachine`].

mod command_line;
mod confirm;
mod context;
mod dispatch;
#[cfg(test)]
pub(crate) mod fixtures;
mod hints;
mod insert;
mod machine;
mod normal;
mod status;
mod timeout;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::host::Hinter;
use crate::keys::Key;

pub use command_line::{CommandLineState, Finalizer, LineBuffer};
pub use confirm::ConfirmState;
pub use context::{ActionContext, StateContext, StateSender, state_channel};
pub use dispatch::{Dispatcher, Job};
pub use hints::HintsState;
pub use insert::InsertState;
pub use machine::{KeyPress, ModeMachine};
pub use normal::NormalState;
pub use status::StatusState;
pub use timeout::CancelHandle;

// ─────────────────────────────────────────────────────────────────────────────
// Substate
// ─────────────────────────────────────────────────────────────────────────────

/// Refinement of a mode; selects the trie (normal family) or the status
/// line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Substate {
    NormalNormal,
    NormalQuickmark,
    NormalQuickmarkTab,
    NormalQuickmarkWindow,
    NormalQuickmarksRapid,
    InsertNormal,
    CommandLineNormal,
    CommandLinePartial,
    ConfirmNormal,
    StatusMinor,
    StatusMajor,
    StatusError,
    HintsNormal,
    HintsRapid,
}

impl Substate {
    /// Substates that own a binding trie.
    pub const BINDABLE: [Substate; 5] = [
        Substate::NormalNormal,
        Substate::NormalQuickmark,
        Substate::NormalQuickmarkTab,
        Substate::NormalQuickmarkWindow,
        Substate::NormalQuickmarksRapid,
    ];

    /// Name used by rc files, `:bind` and the `[bindings]` config table.
    pub fn name(self) -> &'static str {
        match self {
            Substate::NormalNormal => "normal",
            Substate::NormalQuickmark => "quickmark",
            Substate::NormalQuickmarkTab => "quickmark-tab",
            Substate::NormalQuickmarkWindow => "quickmark-window",
            Substate::NormalQuickmarksRapid => "quickmarks-rapid",
            Substate::InsertNormal => "insert",
            Substate::CommandLineNormal => "command-line",
            Substate::CommandLinePartial => "command-line-partial",
            Substate::ConfirmNormal => "confirm",
            Substate::StatusMinor => "status-minor",
            Substate::StatusMajor => "status-major",
            Substate::StatusError => "status-error",
            Substate::HintsNormal => "hints",
            Substate::HintsRapid => "hints-rapid",
        }
    }

    /// Only bindable substates can be named.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::BINDABLE.into_iter().find(|s| s.name() == name)
    }

    pub fn is_normal(self) -> bool {
        Self::BINDABLE.contains(&self)
    }

    /// Substate a Normal state falls back to after a match or a timeout.
    /// Rapid quickmarks stay rapid until Escape or a miss.
    pub fn reset_target(self) -> Self {
        match self {
            Substate::NormalQuickmarksRapid => Substate::NormalQuickmarksRapid,
            _ => Substate::NormalNormal,
        }
    }

    pub fn accepts_count(self) -> bool {
        self == Substate::NormalNormal
    }
}

impl fmt::Display for Substate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StateId
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a state instance. Kept across in-place updates, renewed for
/// every fresh state; the Status wrapper compares ids to tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(u64);

impl StateId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

pub enum State {
    Normal(NormalState),
    Insert(InsertState),
    CommandLine(CommandLineState),
    Confirm(ConfirmState),
    Status(StatusState),
    Hints(HintsState),
}

impl State {
    /// Fresh `NormalNormal`.
    pub fn normal() -> Self {
        Self::normal_in(Substate::NormalNormal)
    }

    pub fn normal_in(substate: Substate) -> Self {
        State::Normal(NormalState::new(substate))
    }

    pub fn insert() -> Self {
        State::Insert(InsertState::new())
    }

    /// Command line primed with `prefix` and `suffix` around the cursor.
    pub fn command_line(prefix: String, suffix: String, finalizer: Finalizer) -> Self {
        State::CommandLine(CommandLineState::new(prefix, suffix, finalizer))
    }

    pub fn confirm(prompt: String, result: tokio::sync::oneshot::Sender<bool>) -> Self {
        State::Confirm(ConfirmState::new(prompt, result))
    }

    pub fn hints(hinter: Hinter, rapid: bool) -> Self {
        State::Hints(HintsState::new(hinter, rapid))
    }

    /// Wraps `inner` with a status message. An existing wrapper is replaced,
    /// never nested.
    pub fn status(inner: State, substate: Substate, message: String) -> Self {
        let inner = match inner {
            State::Status(status) => status.into_inner(),
            other => other,
        };
        State::Status(StatusState::new(inner, substate, message))
    }

    pub fn id(&self) -> StateId {
        match self {
            State::Normal(s) => s.id(),
            State::Insert(s) => s.id(),
            State::CommandLine(s) => s.id(),
            State::Confirm(s) => s.id(),
            State::Status(s) => s.id(),
            State::Hints(s) => s.id(),
        }
    }

    pub fn substate(&self) -> Substate {
        match self {
            State::Normal(s) => s.substate(),
            State::Insert(_) => Substate::InsertNormal,
            State::CommandLine(s) => s.substate(),
            State::Confirm(_) => Substate::ConfirmNormal,
            State::Status(s) => s.substate(),
            State::Hints(s) => s.substate(),
        }
    }

    /// State below any status wrapper.
    pub fn inner(&self) -> &State {
        match self {
            State::Status(s) => s.inner(),
            other => other,
        }
    }

    pub fn step(self, key: &Key, ctx: &StateContext) -> (State, bool) {
        match self {
            State::Normal(s) => s.step(key, ctx),
            State::Insert(s) => s.step(key),
            State::CommandLine(s) => s.step(key, ctx),
            State::Confirm(s) => s.step(key),
            State::Status(s) => s.step(key, ctx),
            State::Hints(s) => s.step(key, ctx),
        }
    }

    /// One-line rendering for the status bar.
    pub fn status_line(&self) -> String {
        match self {
            State::Normal(s) => s.status_line(),
            State::Insert(_) => "-- INSERT --".to_string(),
            State::CommandLine(s) => s.status_line(),
            State::Confirm(s) => s.prompt().to_string(),
            State::Status(s) => s.status_line(),
            State::Hints(s) => s.status_line(),
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::normal()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id())
            .field("substate", &self.substate())
            .field("line", &self.status_line())
            .finish()
    }
}

/// Message from a worker task to the machine.
pub enum StateUpdate {
    /// Replaces the whole state, status wrapper included.
    Set(State),
    /// Replaces the state only while `from` is still current, status
    /// wrapper aside. Results of background work use it so they cannot
    /// clobber a mode the user has since left.
    Replace { from: StateId, state: State },
    /// Wraps the current state with a status message.
    Status { substate: Substate, message: String },
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Set(state) => f.debug_tuple("Set").field(state).finish(),
            StateUpdate::Replace { from, state } => f
                .debug_struct("Replace")
                .field("from", from)
                .field("state", state)
                .finish(),
            StateUpdate::Status { substate, message } => f
                .debug_struct("Status")
                .field("substate", substate)
                .field("message", message)
                .finish(),
        }
    }
}
