//! Table des builtins : cibles `builtin:NAME [ARG]*`.
//!
//! Chaque entrée valide ses arguments au moment du `build` (une erreur fait
//! tomber la binding, pas le trie) puis s'exécute sur la tâche de dispatch
//! en ne touchant qu'aux capacités de [`Host`](crate::host::Host).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::bindings::{Action, BindingError};
use crate::host::Scroll;
use crate::mode::{ActionContext, State, Substate};

/// Upper bound for counted scrolls and history jumps.
const MAX_REPEAT: u32 = 1000;

/// Arguments d'un appel de builtin.
pub struct Invocation<'a> {
    pub args: &'a [String],
    pub count: Option<u32>,
    pub substate: Substate,
    pub ctx: &'a ActionContext,
}

type RunFn = fn(&Invocation<'_>);
type CheckFn = fn(&[String]) -> Result<(), String>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub usage: &'static str,
    min_args: usize,
    max_args: usize,
    check: Option<CheckFn>,
    run: RunFn,
}

impl Builtin {
    fn new(name: &'static str, usage: &'static str, run: RunFn) -> Self {
        Self {
            name,
            usage,
            min_args: 0,
            max_args: 0,
            check: None,
            run,
        }
    }

    fn args(mut self, min: usize, max: usize) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    fn check(mut self, check: CheckFn) -> Self {
        self.check = Some(check);
        self
    }

    fn validate(&self, args: &[String]) -> Result<(), BindingError> {
        if args.len() < self.min_args || args.len() > self.max_args {
            return Err(BindingError::BadArguments {
                name: self.name.to_string(),
                reason: format!("usage: {}", self.usage),
            });
        }
        if let Some(check) = self.check {
            check(args).map_err(|reason| BindingError::BadArguments {
                name: self.name.to_string(),
                reason,
            })?;
        }
        Ok(())
    }
}

/// Clamps a typed count into `1..=max`; absent means 1.
pub fn clamp_count(count: Option<u32>, max: u32) -> u32 {
    count.unwrap_or(1).clamp(1, max.max(1))
}

// ─────────────────────────────────────────────────────────────────────────────
// Table
// ─────────────────────────────────────────────────────────────────────────────

pub struct Builtins {
    table: HashMap<&'static str, Builtin>,
}

impl Builtins {
    pub fn standard() -> Self {
        let entries = [
            Builtin::new("scroll_down", "scroll_down", |i| scroll(i, Scroll::Down)),
            Builtin::new("scroll_up", "scroll_up", |i| scroll(i, Scroll::Up)),
            Builtin::new("scroll_left", "scroll_left", |i| scroll(i, Scroll::Left)),
            Builtin::new("scroll_right", "scroll_right", |i| scroll(i, Scroll::Right)),
            Builtin::new("scroll_top", "scroll_top", |i| {
                i.ctx.host().scroll(Scroll::Top, 1)
            }),
            Builtin::new("scroll_bottom", "scroll_bottom", |i| {
                i.ctx.host().scroll(Scroll::Bottom, 1)
            }),
            Builtin::new("half_page_down", "half_page_down", |i| {
                scroll(i, Scroll::HalfPageDown)
            }),
            Builtin::new("half_page_up", "half_page_up", |i| scroll(i, Scroll::HalfPageUp)),
            Builtin::new("back", "back", |i| history(i, -1)),
            Builtin::new("forward", "forward", |i| history(i, 1)),
            Builtin::new("reload", "reload", |i| i.ctx.host().reload(false)),
            Builtin::new("reload_bypass", "reload_bypass", |i| i.ctx.host().reload(true)),
            Builtin::new("insert", "insert", |i| i.ctx.set_state(State::insert())),
            Builtin::new("prompt", "prompt [WORD]...", prompt).args(0, usize::MAX),
            Builtin::new("prompt_uri", "prompt_uri COMMAND", prompt_uri).args(1, 1),
            Builtin::new("hints", "hints [rapid]", hints)
                .args(0, 1)
                .check(|args| match args.first().map(String::as_str) {
                    None | Some("rapid") => Ok(()),
                    Some(other) => Err(format!("unknown hints flavour `{other}`")),
                }),
            Builtin::new("quickmark", "quickmark [current|tab|window|rapid]", quickmark)
                .args(0, 1)
                .check(|args| quickmark_substate(args).map(|_| ())),
            Builtin::new("yank_uri", "yank_uri", yank_uri),
            Builtin::new("quit", "quit", |i| i.ctx.host().quit()),
            Builtin::new("confirm_quit", "confirm_quit", confirm_quit),
            Builtin::new("panic", "panic", |_| panic!("panic builtin invoked")),
        ];

        Self {
            table: entries.into_iter().map(|b| (b.name, b)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.table.get(name)
    }

    /// Validates `args` and returns the typed action handle.
    pub fn resolve(&self, name: &str, args: Vec<String>) -> Result<Arc<dyn Action>, BindingError> {
        let builtin = self
            .get(name)
            .ok_or_else(|| BindingError::UnknownBuiltin(name.to_string()))?;
        builtin.validate(&args)?;
        Ok(Arc::new(BuiltinAction {
            name: builtin.name,
            args,
            run: builtin.run,
        }))
    }
}

pub struct BuiltinAction {
    name: &'static str,
    args: Vec<String>,
    run: RunFn,
}

impl Action for BuiltinAction {
    fn run(&self, count: Option<u32>, substate: Substate, ctx: &ActionContext) {
        debug!(builtin = self.name, ?count, ?substate, "builtin");
        (self.run)(&Invocation {
            args: &self.args,
            count,
            substate,
            ctx,
        });
    }

    fn describe(&self) -> String {
        let mut target = format!("builtin:{}", self.name);
        for arg in &self.args {
            target.push(' ');
            target.push_str(arg);
        }
        target
    }
}

// ── implémentations ──────────────────────────────────────────────────

fn scroll(inv: &Invocation<'_>, direction: Scroll) {
    inv.ctx
        .host()
        .scroll(direction, clamp_count(inv.count, MAX_REPEAT));
}

fn history(inv: &Invocation<'_>, sign: i32) {
    let steps = clamp_count(inv.count, MAX_REPEAT) as i32;
    inv.ctx.host().history(sign * steps);
}

/// `prompt open` → ligne de commande pré-remplie avec `open `.
fn prompt(inv: &Invocation<'_>) {
    let mut prefix = inv.args.join(" ");
    if !prefix.is_empty() {
        prefix.push(' ');
    }
    inv.ctx.prompt(prefix, String::new(), inv.count);
}

fn prompt_uri(inv: &Invocation<'_>) {
    let Some(command) = inv.args.first() else {
        return;
    };
    let uri = inv
        .ctx
        .host()
        .current_uri()
        .map(|u| u.to_string())
        .unwrap_or_default();
    inv.ctx.prompt(format!("{command} {uri}"), String::new(), inv.count);
}

fn hints(inv: &Invocation<'_>) {
    let rapid = inv.args.first().is_some_and(|a| a == "rapid");
    match inv.ctx.host().hinter(rapid) {
        Some(hinter) => inv.ctx.set_state(State::hints(hinter, rapid)),
        None => inv.ctx.report_error("no hints on this page"),
    }
}

fn quickmark_substate(args: &[String]) -> Result<Substate, String> {
    match args.first().map(String::as_str) {
        None | Some("current") => Ok(Substate::NormalQuickmark),
        Some("tab") => Ok(Substate::NormalQuickmarkTab),
        Some("window") => Ok(Substate::NormalQuickmarkWindow),
        Some("rapid") => Ok(Substate::NormalQuickmarksRapid),
        Some(other) => Err(format!("unknown quickmark target `{other}`")),
    }
}

fn quickmark(inv: &Invocation<'_>) {
    match quickmark_substate(inv.args) {
        Ok(substate) => inv.ctx.set_state(State::normal_in(substate)),
        Err(reason) => inv.ctx.report_error(reason),
    }
}

fn yank_uri(inv: &Invocation<'_>) {
    match inv.ctx.host().current_uri() {
        Some(uri) => {
            inv.ctx.host().yank(uri.as_str());
            inv.ctx.echo(format!("yanked {uri}"));
        }
        None => inv.ctx.report_error("nothing to yank"),
    }
}

fn confirm_quit(inv: &Invocation<'_>) {
    let answer = inv.ctx.confirm("Really quit? (y/n)");
    let host = inv.ctx.host().clone();
    tokio::spawn(async move {
        if let Ok(true) = answer.await {
            info!("quit confirmed");
            host.quit();
        }
    });
}
