//! Commandes `:` et cibles `cmd:`.
//!
//! Une ligne de commande est un mot-clé suivi d'arguments libres. Les cibles
//! `cmd:COMMAND` des bindings passent par le même [`CommandRunner`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::bindings::{Action, BindingError, RawBinding};
use crate::host::OpenTarget;
use crate::mode::{ActionContext, Substate};

pub const DEFAULT_SEARCH_URL: &str = "https://duckduckgo.com/?q=";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("{command}: missing argument (usage: {usage})")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },
    #[error("unknown substate `{0}`")]
    UnknownSubstate(String),
    #[error("cannot open `{0}`")]
    InvalidUri(String),
    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Exécute une ligne de commande.
pub trait CommandRunner: Send + Sync {
    fn run(&self, line: &str, count: Option<u32>, ctx: &ActionContext) -> Result<(), CommandError>;
}

/// `cmd:COMMAND` bound to a key sequence.
pub struct CommandAction {
    command: String,
    runner: Arc<dyn CommandRunner>,
}

impl CommandAction {
    pub fn new(command: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            command: command.into(),
            runner,
        }
    }
}

impl Action for CommandAction {
    fn run(&self, count: Option<u32>, _substate: Substate, ctx: &ActionContext) {
        if let Err(error) = self.runner.run(&self.command, count, ctx) {
            ctx.report_error(error);
        }
    }

    fn describe(&self) -> String {
        format!("cmd:{}", self.command)
    }
}

/// Splits off the first whitespace-delimited word.
pub(crate) fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim_start()),
        None => (input, ""),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands : le jeu de commandes intégré
// ─────────────────────────────────────────────────────────────────────────────

pub struct Commands {
    search_url: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_URL)
    }
}

impl Commands {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    /// Résolution de l'entrée utilisateur en URL.
    ///
    /// - Schéma http(s) ou file : utilisé tel quel.
    /// - Contient un point et pas d'espace (ex: `wikipedia.org`) : `https://` ajouté.
    /// - Sinon : recherche via `search_url`.
    pub fn resolve_input(&self, input: &str) -> Option<Url> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let Ok(url) = Url::parse(input)
            && matches!(url.scheme(), "http" | "https" | "file")
        {
            return Some(url);
        }

        if input.contains('.')
            && !input.contains(char::is_whitespace)
            && let Ok(url) = Url::parse(&format!("https://{input}"))
        {
            return Some(url);
        }

        let encoded: String = url::form_urlencoded::byte_serialize(input.as_bytes()).collect();
        Url::parse(&format!("{}{encoded}", self.search_url)).ok()
    }

    fn open(
        &self,
        target: OpenTarget,
        input: &str,
        usage: &'static str,
        ctx: &ActionContext,
    ) -> Result<(), CommandError> {
        if input.is_empty() {
            return Err(CommandError::MissingArgument {
                command: usage_name(usage),
                usage,
            });
        }
        let url = self
            .resolve_input(input)
            .ok_or_else(|| CommandError::InvalidUri(input.to_string()))?;
        debug!(?target, url = %url, "open");
        ctx.host().open(target, &url);
        Ok(())
    }
}

fn usage_name(usage: &'static str) -> &'static str {
    next_word(usage).0
}

const BIND_USAGE: &str = "bind SUBSTATE KEYS TARGET";
const QUICKMARK_USAGE: &str = "quickmark KEYS URI";

impl CommandRunner for Commands {
    fn run(&self, line: &str, _count: Option<u32>, ctx: &ActionContext) -> Result<(), CommandError> {
        let (name, rest) = next_word(line);
        let rest = rest.trim_end();
        match name {
            "" => Err(CommandError::Empty),
            "open" | "o" => self.open(OpenTarget::Current, rest, "open URI", ctx),
            "tabopen" | "t" => self.open(OpenTarget::Tab, rest, "tabopen URI", ctx),
            "backopen" => self.open(OpenTarget::BackgroundTab, rest, "backopen URI", ctx),
            "winopen" | "w" => self.open(OpenTarget::Window, rest, "winopen URI", ctx),
            "bind" => {
                let (substate, rest) = next_word(rest);
                let (keys, target) = next_word(rest);
                if target.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "bind",
                        usage: BIND_USAGE,
                    });
                }
                let substate = Substate::from_name(substate)
                    .ok_or_else(|| CommandError::UnknownSubstate(substate.to_string()))?;
                ctx.keymaps().bind(
                    RawBinding::new(substate, keys, target),
                    ctx.builtins(),
                    ctx.runner(),
                )?;
                ctx.echo(format!("{keys} bound to {target}"));
                Ok(())
            }
            "quickmark" => {
                let (keys, uri) = next_word(rest);
                if uri.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "quickmark",
                        usage: QUICKMARK_USAGE,
                    });
                }
                ctx.keymaps()
                    .add_quickmark(keys, uri, ctx.builtins(), ctx.runner())?;
                ctx.echo(format!("quickmark {keys} → {uri}"));
                Ok(())
            }
            "echo" => {
                ctx.echo(rest);
                Ok(())
            }
            "quit" | "q" => {
                info!("quit command");
                ctx.host().quit();
                Ok(())
            }
            "panic" => panic!("panic command invoked"),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}
