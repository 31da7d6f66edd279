//! Minuteur d'ambiguïté.
//!
//! One task per pending binding, waiting on `select(cancel, sleep)`:
//! - `true` on the channel cancels without dispatch,
//! - `false` expedites the dispatch,
//! - elapsing dispatches and then resets the machine to Normal.
//!
//! A dropped handle closes the channel, which counts as a cancel.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use super::{State, StateContext, Substate};
use crate::bindings::Action;

#[derive(Debug)]
pub struct CancelHandle(oneshot::Sender<bool>);

impl CancelHandle {
    pub fn cancel(self) {
        // Le minuteur a peut-être déjà expiré : l'envoi échoue sans effet.
        let _ = self.0.send(true);
    }

    pub fn expedite(self) {
        let _ = self.0.send(false);
    }
}

pub(crate) fn schedule(
    action: Arc<dyn Action>,
    count: Option<u32>,
    substate: Substate,
    ctx: &StateContext,
) -> CancelHandle {
    let (tx, rx) = oneshot::channel();
    let dispatcher = ctx.dispatcher.clone();
    let states = ctx.states.clone();
    let delay = ctx.ambiguity_timeout;
    // L'échéance part de la touche, pas du premier poll de la tâche.
    let deadline = tokio::time::Instant::now() + delay;

    tokio::spawn(async move {
        tokio::select! {
            signal = rx => match signal {
                Ok(false) => {
                    debug!(action = %action.describe(), "pending binding expedited");
                    dispatcher.dispatch(action, count, substate);
                }
                Ok(true) | Err(_) => {
                    debug!(action = %action.describe(), "pending binding cancelled");
                }
            },
            () = tokio::time::sleep_until(deadline) => {
                debug!(action = %action.describe(), ?delay, "pending binding timed out");
                dispatcher.dispatch(action, count, substate);
                states.set(State::normal_in(substate.reset_target()));
            }
        }
    });

    CancelHandle(tx)
}
