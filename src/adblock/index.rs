//! Index par empreintes de 8 octets.
//!
//! Each simple rule lives in exactly one bucket, keyed by one of its literal
//! windows; the window whose bucket is currently smallest wins, leftmost on
//! ties. Rules without a window (regex rules, short bodies) go to the
//! trailing list, which is scanned for every URL.

use std::collections::HashMap;
use std::sync::Arc;

use super::rule::{Rule, RuleKind};

pub type Window = [u8; 8];

/// Where `RuleIndex::insert` put a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Bucket(Window),
    Trailing,
}

#[derive(Debug, Default)]
pub struct RuleIndex {
    buckets: HashMap<Window, Vec<Arc<Rule>>>,
    trailing: Vec<Arc<Rule>>,
    len: usize,
}

impl RuleIndex {
    pub fn insert(&mut self, rule: Rule) -> Placement {
        self.len += 1;
        let mut best: Option<(Window, usize)> = None;
        for window in rule.windows() {
            let size = self.buckets.get(&window).map_or(0, Vec::len);
            if best.is_none_or(|(_, smallest)| size < smallest) {
                best = Some((window, size));
            }
        }

        let rule = Arc::new(rule);
        match best {
            Some((window, _)) => {
                self.buckets.entry(window).or_default().push(rule);
                Placement::Bucket(window)
            }
            None => {
                self.trailing.push(rule);
                Placement::Trailing
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn trailing_len(&self) -> usize {
        self.trailing.len()
    }

    /// Rules worth testing against `url` (already lowercased): every bucket
    /// keyed by one of its windows, then the trailing list. A bucket is
    /// visited once per occurrence of its window.
    fn candidates<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Arc<Rule>> + 'a {
        url.as_bytes()
            .windows(8)
            .filter_map(|w| <[u8; 8]>::try_from(w).ok())
            .filter_map(|w| self.buckets.get(&w))
            .flatten()
            .chain(self.trailing.iter())
    }

    /// `true` when a Block rule matches and no Exception rule does.
    pub fn blocks(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        let mut blocked = false;
        let mut excepted = false;

        for rule in self.candidates(&url) {
            let seen = match rule.kind() {
                RuleKind::Block => &mut blocked,
                RuleKind::Exception => &mut excepted,
            };
            if !*seen && rule.matches(&url) {
                *seen = true;
                if blocked && excepted {
                    return false;
                }
            }
        }
        blocked && !excepted
    }

    /// Every distinct rule matching `url`, in scan order.
    pub fn matching(&self, url: &str) -> Vec<Arc<Rule>> {
        let url = url.to_lowercase();
        let mut found: Vec<Arc<Rule>> = Vec::new();
        for rule in self.candidates(&url) {
            if found.iter().any(|r| Arc::ptr_eq(r, rule)) {
                continue;
            }
            if rule.matches(&url) {
                found.push(Arc::clone(rule));
            }
        }
        found
    }
}
