//! Quickmarks : séquence de touches → URI.
//!
//! One quickmark yields a binding in each of the four quickmark substates;
//! the substate decides where the URI opens.

use crate::bindings::RawBinding;
use crate::keys::KeySequence;
use crate::mode::Substate;

#[derive(Debug, Clone, Default)]
pub struct Quickmarks {
    marks: Vec<(KeySequence, String)>,
}

impl Quickmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute ou remplace.
    pub fn insert(&mut self, keys: KeySequence, uri: String) {
        match self.marks.iter_mut().find(|(k, _)| *k == keys) {
            Some(entry) => entry.1 = uri,
            None => self.marks.push((keys, uri)),
        }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Bindings for the quickmark substates, in insertion order.
    pub fn raw_bindings(&self) -> Vec<RawBinding> {
        const TARGETS: [(Substate, &str); 4] = [
            (Substate::NormalQuickmark, "open"),
            (Substate::NormalQuickmarkTab, "tabopen"),
            (Substate::NormalQuickmarkWindow, "winopen"),
            (Substate::NormalQuickmarksRapid, "backopen"),
        ];

        let mut raw = Vec::with_capacity(self.marks.len() * TARGETS.len());
        for (substate, command) in TARGETS {
            for (keys, uri) in &self.marks {
                raw.push(RawBinding::new(
                    substate,
                    keys.render(true),
                    format!("cmd:{command} {uri}"),
                ));
            }
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(s: &str) -> KeySequence {
        KeySequence::parse(s).unwrap()
    }

    #[test]
    fn test_insert_replaces_same_keys() {
        let mut marks = Quickmarks::new();
        marks.insert(keys("a"), "https://a.example/".into());
        marks.insert(keys("b"), "https://b.example/".into());
        marks.insert(keys("a"), "https://other.example/".into());
        assert_eq!(marks.len(), 2);
        let raw = marks.raw_bindings();
        assert_eq!(raw[0].from, "a");
        assert_eq!(raw[0].to, "cmd:open https://other.example/");
    }

    #[test]
    fn test_raw_bindings_cover_four_substates() {
        let mut marks = Quickmarks::new();
        marks.insert(keys("<C-a>x"), "https://a.example/".into());
        let raw = marks.raw_bindings();
        assert_eq!(raw.len(), 4);
        assert_eq!(raw[0].substate, Substate::NormalQuickmark);
        assert_eq!(raw[0].from, "<C-a>x");
        assert_eq!(raw[0].to, "cmd:open https://a.example/");
        assert_eq!(raw[3].to, "cmd:backopen https://a.example/");
    }
}
