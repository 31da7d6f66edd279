//! Per-substate tries and their reconfiguration.
//!
//! [`BindingSet`] holds the raw `(substate, from, to)` triples (compiled-in
//! defaults, user bindings, quickmarks). [`SharedKeymaps`] compiles it and
//! publishes the result through an `ArcSwap`, so readers never see a half
//! built keymap.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{BindingError, BindingTrie, build, default, parse_from, resolve_binding};
use crate::builtins::Builtins;
use crate::command::CommandRunner;
use crate::keys::KeySequence;
use crate::mode::Substate;
use crate::quickmarks::Quickmarks;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBinding {
    pub substate: Substate,
    pub from: String,
    pub to: String,
}

impl RawBinding {
    pub fn new(substate: Substate, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            substate,
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Substate → trie.
#[derive(Debug, Clone, Default)]
pub struct Keymaps {
    tries: HashMap<Substate, Arc<BindingTrie>>,
}

impl Keymaps {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, substate: Substate, trie: BindingTrie) -> Self {
        self.insert(substate, trie);
        self
    }

    pub fn insert(&mut self, substate: Substate, trie: BindingTrie) {
        self.tries.insert(substate, Arc::new(trie));
    }

    pub fn get(&self, substate: Substate) -> Option<&Arc<BindingTrie>> {
        self.tries.get(&substate)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BindingSet
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BindingSet {
    defaults: Vec<RawBinding>,
    user: Vec<RawBinding>,
    quickmarks: Quickmarks,
}

impl BindingSet {
    pub fn with_defaults() -> Self {
        Self {
            defaults: default::bindings(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, raw: RawBinding) {
        self.user.push(raw);
    }

    pub fn user(&self) -> &[RawBinding] {
        &self.user
    }

    pub fn quickmarks(&self) -> &Quickmarks {
        &self.quickmarks
    }

    pub fn quickmarks_mut(&mut self) -> &mut Quickmarks {
        &mut self.quickmarks
    }

    /// User and quickmark entries override defaults with the same `from`;
    /// duplicates among user entries are conflicts.
    pub fn compile(
        &self,
        builtins: &Builtins,
        runner: &Arc<dyn CommandRunner>,
    ) -> (Keymaps, Vec<BindingError>) {
        let generated = self.quickmarks.raw_bindings();
        let mut keymaps = Keymaps::new();
        let mut errors = Vec::new();

        for substate in Substate::BINDABLE {
            let user: Vec<&RawBinding> = self
                .user
                .iter()
                .chain(generated.iter())
                .filter(|raw| raw.substate == substate)
                .collect();
            let overridden: HashSet<KeySequence> = user
                .iter()
                .filter_map(|raw| parse_from(&raw.from).ok())
                .collect();
            let defaults = self.defaults.iter().filter(|raw| {
                raw.substate == substate
                    && parse_from(&raw.from).map_or(true, |keys| !overridden.contains(&keys))
            });

            let pairs = user
                .iter()
                .copied()
                .chain(defaults)
                .map(|raw| (raw.from.as_str(), raw.to.as_str()));
            let (trie, mut trie_errors) = build(pairs, builtins, runner);
            errors.append(&mut trie_errors);
            keymaps.insert(substate, trie);
        }

        (keymaps, errors)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SharedKeymaps
// ─────────────────────────────────────────────────────────────────────────────

/// Published keymaps plus the raw set they were compiled from.
#[derive(Clone)]
pub struct SharedKeymaps {
    current: Arc<ArcSwap<Keymaps>>,
    set: Arc<Mutex<BindingSet>>,
}

impl SharedKeymaps {
    pub fn compile(
        set: BindingSet,
        builtins: &Builtins,
        runner: &Arc<dyn CommandRunner>,
    ) -> (Self, Vec<BindingError>) {
        let (keymaps, errors) = set.compile(builtins, runner);
        for error in &errors {
            warn!(%error, "binding dropped");
        }
        let shared = Self {
            current: Arc::new(ArcSwap::from_pointee(keymaps)),
            set: Arc::new(Mutex::new(set)),
        };
        (shared, errors)
    }

    /// Keymaps that are never recompiled.
    pub fn fixed(keymaps: Keymaps) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(keymaps)),
            set: Arc::new(Mutex::new(BindingSet::default())),
        }
    }

    pub fn load(&self) -> Arc<Keymaps> {
        self.current.load_full()
    }

    pub fn trie(&self, substate: Substate) -> Option<Arc<BindingTrie>> {
        self.current.load().get(substate).cloned()
    }

    /// Adds one user binding. The candidate set is compiled first; if the
    /// binding conflicts with anything already bound (user entries and
    /// quickmarks alike) it is rejected and the published keymaps stay as
    /// they were.
    pub fn bind(
        &self,
        raw: RawBinding,
        builtins: &Builtins,
        runner: &Arc<dyn CommandRunner>,
    ) -> Result<(), BindingError> {
        resolve_binding(&raw.from, &raw.to, builtins, runner)?;

        let mut set = self.set.lock();
        let mut candidate = set.clone();
        candidate.user.push(raw.clone());
        self.commit(&mut set, candidate, builtins, runner)?;
        info!(substate = ?raw.substate, from = %raw.from, to = %raw.to, "binding added");
        Ok(())
    }

    /// Defines (or redefines) a quickmark. Same all-or-nothing rule as
    /// [`bind`](Self::bind).
    pub fn add_quickmark(
        &self,
        keys: &str,
        uri: &str,
        builtins: &Builtins,
        runner: &Arc<dyn CommandRunner>,
    ) -> Result<(), BindingError> {
        let keys = parse_from(keys)?;
        let mut set = self.set.lock();
        let mut candidate = set.clone();
        candidate.quickmarks.insert(keys.clone(), uri.to_string());
        self.commit(&mut set, candidate, builtins, runner)?;
        info!(keys = %keys, uri, "quickmark added");
        Ok(())
    }

    /// Publishes `candidate` unless it compiles with an error `current`
    /// did not already have.
    fn commit(
        &self,
        current: &mut BindingSet,
        candidate: BindingSet,
        builtins: &Builtins,
        runner: &Arc<dyn CommandRunner>,
    ) -> Result<(), BindingError> {
        let (_, known) = current.compile(builtins, runner);
        let known: HashSet<String> = known.iter().map(ToString::to_string).collect();

        let (keymaps, errors) = candidate.compile(builtins, runner);
        if let Some(error) = errors.into_iter().find(|e| !known.contains(&e.to_string())) {
            return Err(error);
        }
        *current = candidate;
        self.current.store(Arc::new(keymaps));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Commands;

    fn runner() -> Arc<dyn CommandRunner> {
        Arc::new(Commands::default())
    }

    fn describe(shared: &SharedKeymaps, substate: Substate, from: &str) -> Option<String> {
        let trie = shared.trie(substate)?;
        let keys = KeySequence::parse(from).ok()?;
        trie.lookup(&keys)?.binding().map(|b| b.to.describe())
    }

    #[test]
    fn test_defaults_compile_cleanly() {
        let builtins = Builtins::standard();
        let (_, errors) = BindingSet::with_defaults().compile(&builtins, &runner());
        assert!(errors.is_empty(), "default bindings must be valid: {errors:?}");
    }

    #[test]
    fn test_user_binding_overrides_default() {
        let builtins = Builtins::standard();
        let mut set = BindingSet::with_defaults();
        set.add(RawBinding::new(Substate::NormalNormal, "j", "builtin:scroll_up"));
        let (shared, errors) = SharedKeymaps::compile(set, &builtins, &runner());
        assert!(errors.is_empty());
        assert_eq!(
            describe(&shared, Substate::NormalNormal, "j").as_deref(),
            Some("builtin:scroll_up")
        );
    }

    #[test]
    fn test_duplicate_user_bindings_conflict() {
        let builtins = Builtins::standard();
        let mut set = BindingSet::default();
        set.add(RawBinding::new(Substate::NormalNormal, "x", "builtin:scroll_up"));
        set.add(RawBinding::new(Substate::NormalNormal, "x", "builtin:scroll_down"));
        let (_, errors) = set.compile(&builtins, &runner());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_bind_swaps_keymaps_and_rejects_conflicts() {
        let builtins = Builtins::standard();
        let (shared, _) = SharedKeymaps::compile(BindingSet::default(), &builtins, &runner());
        let before = shared.load();

        shared
            .bind(RawBinding::new(Substate::NormalNormal, "x", "builtin:reload"), &builtins, &runner())
            .unwrap();
        assert!(before.get(Substate::NormalNormal).unwrap().is_empty());
        assert_eq!(
            describe(&shared, Substate::NormalNormal, "x").as_deref(),
            Some("builtin:reload")
        );

        let err = shared
            .bind(RawBinding::new(Substate::NormalNormal, "x", "builtin:quit"), &builtins, &runner())
            .unwrap_err();
        assert!(matches!(err, BindingError::Trie(_)));
        assert_eq!(
            describe(&shared, Substate::NormalNormal, "x").as_deref(),
            Some("builtin:reload")
        );
    }

    #[test]
    fn test_quickmarks_fill_every_quickmark_substate() {
        let builtins = Builtins::standard();
        let (shared, _) = SharedKeymaps::compile(BindingSet::default(), &builtins, &runner());
        shared
            .add_quickmark("a", "https://example.com/", &builtins, &runner())
            .unwrap();
        assert_eq!(
            describe(&shared, Substate::NormalQuickmark, "a").as_deref(),
            Some("cmd:open https://example.com/")
        );
        assert_eq!(
            describe(&shared, Substate::NormalQuickmarkTab, "a").as_deref(),
            Some("cmd:tabopen https://example.com/")
        );
        assert_eq!(
            describe(&shared, Substate::NormalQuickmarkWindow, "a").as_deref(),
            Some("cmd:winopen https://example.com/")
        );
        assert_eq!(
            describe(&shared, Substate::NormalQuickmarksRapid, "a").as_deref(),
            Some("cmd:backopen https://example.com/")
        );
    }

    #[test]
    fn test_quickmark_conflicting_with_user_binding_is_rejected() {
        let builtins = Builtins::standard();
        let (shared, _) = SharedKeymaps::compile(BindingSet::default(), &builtins, &runner());
        shared
            .bind(RawBinding::new(Substate::NormalQuickmark, "a", "builtin:reload"), &builtins, &runner())
            .unwrap();
        let before = shared.load();

        let err = shared
            .add_quickmark("a", "https://example.com/", &builtins, &runner())
            .unwrap_err();
        assert!(matches!(err, BindingError::Trie(_)));
        assert!(Arc::ptr_eq(&before, &shared.load()), "keymaps must not be republished");
        assert_eq!(
            describe(&shared, Substate::NormalQuickmark, "a").as_deref(),
            Some("builtin:reload")
        );
        assert_eq!(describe(&shared, Substate::NormalQuickmarkTab, "a"), None);
    }

    #[test]
    fn test_user_binding_conflicting_with_quickmark_is_rejected() {
        let builtins = Builtins::standard();
        let (shared, _) = SharedKeymaps::compile(BindingSet::default(), &builtins, &runner());
        shared
            .add_quickmark("a", "https://example.com/", &builtins, &runner())
            .unwrap();

        let err = shared
            .bind(RawBinding::new(Substate::NormalQuickmark, "a", "builtin:reload"), &builtins, &runner())
            .unwrap_err();
        assert!(matches!(err, BindingError::Trie(_)));
        assert_eq!(
            describe(&shared, Substate::NormalQuickmark, "a").as_deref(),
            Some("cmd:open https://example.com/")
        );

        // Redéfinir le même quickmark n'est pas un conflit.
        shared
            .add_quickmark("a", "https://other.example/", &builtins, &runner())
            .unwrap();
        assert_eq!(
            describe(&shared, Substate::NormalQuickmark, "a").as_deref(),
            Some("cmd:open https://other.example/")
        );
    }

    #[test]
    fn test_preexisting_errors_do_not_block_bind() {
        let builtins = Builtins::standard();
        let mut set = BindingSet::default();
        set.add(RawBinding::new(Substate::NormalNormal, "x", "builtin:nope"));
        let (shared, errors) = SharedKeymaps::compile(set, &builtins, &runner());
        assert_eq!(errors.len(), 1);

        shared
            .bind(RawBinding::new(Substate::NormalNormal, "y", "builtin:reload"), &builtins, &runner())
            .unwrap();
        assert_eq!(
            describe(&shared, Substate::NormalNormal, "y").as_deref(),
            Some("builtin:reload")
        );
    }
}
