//! Assemblage : config → keymaps → machine modale, dispatcher et filtre
//! réseau.
//!
//! Must be called from inside a tokio runtime: the dispatcher and the
//! ingestion task are spawned here.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adblock::{AdBlockEngine, DirFilterSource, IngestReport, ingest};
use crate::bindings::{BindingSet, SharedKeymaps};
use crate::builtins::Builtins;
use crate::command::{CommandRunner, Commands};
use crate::config::Config;
use crate::host::Host;
use crate::mode::{ActionContext, Dispatcher, ModeMachine, StateContext, Substate, state_channel};
use crate::privacy::{NavigatingHost, RequestFilter};
use crate::rc;

pub struct Shell {
    pub machine: ModeMachine,
    pub actions: ActionContext,
    /// Finishes only if an action panics or every dispatcher is dropped.
    pub dispatcher: JoinHandle<()>,
    pub filter: RequestFilter,
    pub ingestion: Option<JoinHandle<IngestReport>>,
    /// Every problem found while loading bindings, config and rc file.
    pub startup_errors: Vec<String>,
}

impl Shell {
    /// Default keymap, then `[bindings]`/`[quickmarks]`, then the rc file.
    pub fn start(config: &Config, host: Arc<dyn Host>) -> Self {
        let mut set = BindingSet::with_defaults();
        let mut errors: Vec<String> = config
            .apply_bindings(&mut set)
            .iter()
            .map(ToString::to_string)
            .collect();

        if let Some(path) = &config.rc.file {
            match rc::load(path) {
                Ok(rc) => {
                    errors.extend(rc.errors.iter().map(ToString::to_string));
                    rc.apply(&mut set);
                }
                Err(e) => {
                    warn!(error = %e, "rc file ignored");
                    errors.push(e.to_string());
                }
            }
        }

        let (filter, ingestion) = start_adblock(config);
        let mut shell = Self::assemble(config, host, set, filter);
        shell.ingestion = ingestion;
        errors.append(&mut shell.startup_errors);
        shell.startup_errors = errors;
        shell.surface_first_error();
        shell
    }

    /// Shell over an explicit binding set; adblock stays disabled.
    pub fn with_bindings(config: &Config, host: Arc<dyn Host>, set: BindingSet) -> Self {
        Self::assemble(config, host, set, RequestFilter::disabled())
    }

    fn assemble(
        config: &Config,
        host: Arc<dyn Host>,
        set: BindingSet,
        filter: RequestFilter,
    ) -> Self {
        let host: Arc<dyn Host> = Arc::new(NavigatingHost::new(host, filter.clone()));
        let builtins = Arc::new(Builtins::standard());
        let runner: Arc<dyn CommandRunner> =
            Arc::new(Commands::new(config.search.engine_url.as_str()));
        let (keymaps, binding_errors) = SharedKeymaps::compile(set, &builtins, &runner);

        let (states, updates) = state_channel();
        let actions = ActionContext::new(host, states.clone(), keymaps.clone(), builtins, runner);
        let (dispatcher, dispatch_task) = Dispatcher::spawn(actions.clone());
        let ctx = StateContext::new(
            keymaps,
            dispatcher,
            states,
            config.input.ambiguity_timeout(),
        );
        let machine = ModeMachine::new(ctx, updates, config.input.debounce());

        Self {
            machine,
            actions,
            dispatcher: dispatch_task,
            filter,
            ingestion: None,
            startup_errors: binding_errors.iter().map(ToString::to_string).collect(),
        }
    }

    /// Shows the first startup error in the status line.
    fn surface_first_error(&self) {
        if let Some(first) = self.startup_errors.first() {
            self.actions.set_status(Substate::StatusError, first.clone());
        }
    }
}

/// Starts list ingestion in the background. The filter answers right away
/// with whatever rules are loaded so far.
fn start_adblock(config: &Config) -> (RequestFilter, Option<JoinHandle<IngestReport>>) {
    if !config.adblock.enabled {
        info!("ad-blocking disabled by config");
        return (RequestFilter::disabled(), None);
    }
    let Some(source) = DirFilterSource::locate(config.adblock.filters_dir.as_deref()) else {
        return (RequestFilter::disabled(), None);
    };
    info!(dir = %source.dir().display(), "loading filter lists");
    let engine = Arc::new(AdBlockEngine::new());
    let ingestion = ingest(Arc::clone(&engine), source);
    (RequestFilter::new(engine), Some(ingestion))
}
