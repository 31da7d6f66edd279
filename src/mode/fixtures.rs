//! Contexte de test : dispatcher et canal d'état drainés à la main.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use super::{ActionContext, Dispatcher, Job, StateContext, StateSender, StateUpdate, state_channel};
use crate::bindings::{Keymaps, SharedKeymaps};
use crate::builtins::Builtins;
use crate::command::Commands;
use crate::host::LoggingHost;

pub(crate) struct Fixture {
    pub ctx: StateContext,
    pub jobs: UnboundedReceiver<Job>,
    pub updates: UnboundedReceiver<StateUpdate>,
    pub host: Arc<LoggingHost>,
    states: StateSender,
}

pub(crate) fn fixture(keymaps: Keymaps) -> Fixture {
    let (dispatcher, jobs) = Dispatcher::channel();
    let (states, updates) = state_channel();
    let ctx = StateContext::new(
        SharedKeymaps::fixed(keymaps),
        dispatcher,
        states.clone(),
        Duration::from_millis(500),
    );
    Fixture {
        ctx,
        jobs,
        updates,
        host: Arc::new(LoggingHost::new(None)),
        states,
    }
}

fn describe(job: &Job) -> (String, Option<u32>) {
    match job {
        Job::Action { action, count, .. } => (action.describe(), *count),
        Job::Finalize(_) => ("<finalize>".to_string(), None),
    }
}

impl Fixture {
    pub fn action_ctx(&self) -> ActionContext {
        ActionContext::new(
            self.host.clone(),
            self.states.clone(),
            self.ctx.keymaps.clone(),
            Arc::new(Builtins::standard()),
            Arc::new(Commands::default()),
        )
    }

    /// Jobs queued so far, without running them.
    pub fn dispatched(&mut self) -> Vec<(String, Option<u32>)> {
        let mut seen = Vec::new();
        while let Ok(job) = self.jobs.try_recv() {
            seen.push(describe(&job));
        }
        seen
    }

    pub async fn next_dispatch(&mut self) -> (String, Option<u32>) {
        match self.jobs.recv().await {
            Some(job) => describe(&job),
            None => panic!("dispatcher channel closed"),
        }
    }

    /// Runs every queued job against a `LoggingHost`.
    pub fn run_jobs(&mut self) -> usize {
        let ctx = self.action_ctx();
        let mut ran = 0;
        while let Ok(job) = self.jobs.try_recv() {
            job.run(&ctx);
            ran += 1;
        }
        ran
    }

    pub fn drain_updates(&mut self) -> Vec<StateUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            updates.push(update);
        }
        updates
    }
}
