//! Ligne de commande : tampon + curseur.
//!
//! Le tampon reprend la logique d'édition de l'ancienne barre d'URL : curseur
//! en offset d'octets, déplacements alignés sur les frontières de caractères.

use std::fmt;

use super::{ActionContext, State, StateContext, StateId, Substate};
use crate::keys::{Key, NamedKey};

/// Called with the final line on Return, on the dispatcher task.
pub type Finalizer = Box<dyn FnOnce(String, &ActionContext) + Send>;

/// Texte édité et position du curseur.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    text: String,
    /// Offset d'octets dans `text`.
    cursor: usize,
}

impl LineBuffer {
    /// Curseur placé entre `prefix` et `suffix`.
    pub fn primed(prefix: &str, suffix: &str) -> Self {
        Self {
            text: format!("{prefix}{suffix}"),
            cursor: prefix.len(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    /// Supprime le caractère avant le curseur.
    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            let prev = self.prev_boundary();
            self.text.drain(prev..self.cursor);
            self.cursor = prev;
        }
    }

    /// Supprime le caractère après le curseur.
    pub fn delete(&mut self) {
        if self.cursor < self.text.len() {
            let next = self.next_boundary();
            self.text.drain(self.cursor..next);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.prev_boundary();
    }

    pub fn right(&mut self) {
        self.cursor = self.next_boundary();
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.len();
    }

    fn prev_boundary(&self) -> usize {
        self.text[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn next_boundary(&self) -> usize {
        self.text[self.cursor..]
            .char_indices()
            .nth(1)
            .map(|(i, _)| self.cursor + i)
            .unwrap_or(self.text.len())
    }
}

impl fmt::Display for LineBuffer {
    /// Texte avec le curseur figuré par `|`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", &self.text[..self.cursor], &self.text[self.cursor..])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandLineState
// ─────────────────────────────────────────────────────────────────────────────

pub struct CommandLineState {
    id: StateId,
    line: LineBuffer,
    primed: bool,
    finalizer: Option<Finalizer>,
}

impl CommandLineState {
    pub(crate) fn new(prefix: String, suffix: String, finalizer: Finalizer) -> Self {
        Self {
            id: StateId::fresh(),
            primed: !prefix.is_empty() || !suffix.is_empty(),
            line: LineBuffer::primed(&prefix, &suffix),
            finalizer: Some(finalizer),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn substate(&self) -> Substate {
        if self.primed {
            Substate::CommandLinePartial
        } else {
            Substate::CommandLineNormal
        }
    }

    pub fn line(&self) -> &LineBuffer {
        &self.line
    }

    pub(crate) fn step(mut self, key: &Key, ctx: &StateContext) -> (State, bool) {
        if key.is_return() {
            let text = self.line.into_text();
            if let Some(finalize) = self.finalizer.take() {
                ctx.dispatcher
                    .finalize(Box::new(move |actx: &ActionContext| finalize(text, actx)));
            }
            return (State::normal(), true);
        }
        if key.is_escape() {
            return (State::normal(), true);
        }
        if key.is_named(NamedKey::BackSpace) {
            if self.line.is_empty() {
                return (State::normal(), true);
            }
            self.line.backspace();
            return (State::CommandLine(self), true);
        }

        if key.is_named(NamedKey::Delete) {
            self.line.delete();
        } else if key.is_named(NamedKey::Left) {
            self.line.left();
        } else if key.is_named(NamedKey::Right) {
            self.line.right();
        } else if key.is_named(NamedKey::Home) {
            self.line.home();
        } else if key.is_named(NamedKey::End) {
            self.line.end();
        } else if let Some(c) = key.printable() {
            self.line.insert(c);
        }
        (State::CommandLine(self), true)
    }

    pub(crate) fn status_line(&self) -> String {
        format!(":{}", self.line)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::bindings::Keymaps;
    use crate::keys::KeySequence;
    use crate::mode::fixtures::{Fixture, fixture};

    fn type_keys(mut state: State, keys: &str, f: &Fixture) -> State {
        for key in KeySequence::parse(keys).unwrap().iter() {
            let (next, swallow) = state.step(key, &f.ctx);
            assert!(swallow, "command line swallows every key");
            state = next;
        }
        state
    }

    fn recording() -> (Finalizer, Arc<Mutex<Option<String>>>) {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let finalizer: Finalizer = Box::new(move |line, _| *sink.lock() = Some(line));
        (finalizer, seen)
    }

    // ── LineBuffer ────────────────────────────────────────────────────

    #[test]
    fn test_line_buffer_editing() {
        let mut line = LineBuffer::primed("open ", "");
        line.insert('x');
        assert_eq!(line.text(), "open x");
        line.left();
        line.left();
        line.backspace();
        assert_eq!(line.text(), "ope x");
        assert_eq!(line.to_string(), "ope| x");
    }

    #[test]
    fn test_line_buffer_multibyte() {
        let mut line = LineBuffer::default();
        line.insert('é');
        line.insert('à');
        line.left();
        assert_eq!(line.cursor(), 'é'.len_utf8());
        line.delete();
        assert_eq!(line.text(), "é");
        line.backspace();
        assert!(line.is_empty());
        line.backspace();
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn test_primed_cursor_sits_between() {
        let line = LineBuffer::primed("tabopen ", " now");
        assert_eq!(line.to_string(), "tabopen | now");
    }

    // ── CommandLineState ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_return_finalizes_with_buffer() {
        let mut f = fixture(Keymaps::new());
        let (finalizer, seen) = recording();
        let state = State::command_line(String::new(), String::new(), finalizer);
        assert_eq!(state.substate(), Substate::CommandLineNormal);

        let state = type_keys(state, "echo<space>hi<Return>", &f);
        assert_eq!(state.substate(), Substate::NormalNormal);
        assert_eq!(f.run_jobs(), 1);
        assert_eq!(seen.lock().as_deref(), Some("echo hi"));
    }

    #[tokio::test]
    async fn test_escape_discards() {
        let mut f = fixture(Keymaps::new());
        let (finalizer, seen) = recording();
        let state = State::command_line("open ".into(), String::new(), finalizer);
        assert_eq!(state.substate(), Substate::CommandLinePartial);

        let state = type_keys(state, "x<Escape>", &f);
        assert!(matches!(state, State::Normal(_)));
        assert_eq!(f.run_jobs(), 0);
        assert!(seen.lock().is_none());
    }

    #[tokio::test]
    async fn test_backspace_on_empty_leaves() {
        let f = fixture(Keymaps::new());
        let (finalizer, _) = recording();
        let state = State::command_line(String::new(), String::new(), finalizer);
        let state = type_keys(state, "a<BackSpace>", &f);
        assert!(matches!(state, State::CommandLine(_)));
        let state = type_keys(state, "<BackSpace>", &f);
        assert!(matches!(state, State::Normal(_)));
    }

    #[tokio::test]
    async fn test_cursor_keys_keep_identity() {
        let f = fixture(Keymaps::new());
        let (finalizer, _) = recording();
        let state = State::command_line("ab".into(), String::new(), finalizer);
        let id = state.id();
        let state = type_keys(state, "<Left>X<Right><C-x>", &f);
        assert_eq!(state.id(), id);
        assert_eq!(state.status_line(), ":aXb|");
    }
}
