//! Tâche de dispatch : les actions ne tournent jamais sur la pompe d'entrée.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ActionContext, Substate};
use crate::bindings::Action;

pub enum Job {
    Action {
        action: Arc<dyn Action>,
        count: Option<u32>,
        substate: Substate,
    },
    Finalize(Box<dyn FnOnce(&ActionContext) + Send>),
}

impl Job {
    pub fn run(self, ctx: &ActionContext) {
        match self {
            Job::Action {
                action,
                count,
                substate,
            } => {
                debug!(action = %action.describe(), ?count, %substate, "dispatch");
                action.run(count, substate, ctx);
            }
            Job::Finalize(finalize) => finalize(ctx),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Starts the dispatch task. The handle finishes only if every sender is
    /// dropped or an action panics.
    pub fn spawn(ctx: ActionContext) -> (Self, JoinHandle<()>) {
        let (dispatcher, mut jobs) = Self::channel();
        let task = tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                job.run(&ctx);
            }
            info!("dispatcher stopped");
        });
        (dispatcher, task)
    }

    /// Dispatcher whose jobs are drained by the caller.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        (Self { jobs }, rx)
    }

    pub fn dispatch(&self, action: Arc<dyn Action>, count: Option<u32>, substate: Substate) {
        self.send(Job::Action {
            action,
            count,
            substate,
        });
    }

    pub fn finalize(&self, finalize: Box<dyn FnOnce(&ActionContext) + Send>) {
        self.send(Job::Finalize(finalize));
    }

    fn send(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            debug!("job dropped, dispatcher is gone");
        }
    }
}
