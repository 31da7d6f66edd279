//! Moteur de blocage : règles ABP indexées par empreintes.
//!
//! The engine is shared between the request path (readers) and the
//! ingestion task (single writer). Each list is parsed completely before the
//! write lock is taken, so a reader never waits on parsing.

mod index;
mod ingest;
mod rule;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use index::{Placement, RuleIndex};

pub use ingest::{DirFilterSource, FilterSource, IngestReport, MemoryFilterSource, ingest};
pub use rule::{Rule, RuleError, RuleKind};

/// Rules from one list, plus how many lines were rejected.
#[derive(Debug, Default)]
pub struct ParsedList {
    pub rules: Vec<Rule>,
    pub malformed: usize,
}

impl ParsedList {
    pub fn parse(content: &str) -> Self {
        let mut list = ParsedList::default();
        for line in content.lines() {
            match Rule::parse(line) {
                Ok(Some(rule)) => list.rules.push(rule),
                Ok(None) => {}
                Err(_) => list.malformed += 1,
            }
        }
        list
    }
}

#[derive(Debug, Default)]
pub struct AdBlockEngine {
    index: RwLock<RuleIndex>,
    complete: AtomicBool,
}

impl AdBlockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine loaded from a single in-memory list and marked complete.
    pub fn from_list(content: &str) -> Self {
        let engine = Self::new();
        engine.append(ParsedList::parse(content).rules);
        engine.mark_complete();
        engine
    }

    /// Adds already-parsed rules under one write lock. Returns how many.
    pub fn append(&self, rules: Vec<Rule>) -> usize {
        let count = rules.len();
        let mut unindexed = 0;
        let mut index = self.index.write();
        for rule in rules {
            if index.insert(rule) == Placement::Trailing {
                unindexed += 1;
            }
        }
        debug!(
            count,
            unindexed,
            buckets = index.bucket_count(),
            trailing = index.trailing_len(),
            "rules appended"
        );
        count
    }

    /// Answers with the rules loaded so far; during ingestion that may be a
    /// subset of the lists.
    pub fn blocks(&self, url: &str) -> bool {
        self.index.read().blocks(url)
    }

    /// Source lines of every rule matching `url`.
    pub fn matching_rules(&self, url: &str) -> Vec<String> {
        self.index
            .read()
            .matching(url)
            .iter()
            .map(|rule| rule.text().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// `true` once every list has been ingested.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }
}

/// Shared handle, as held by the request filter and the ingestion task.
pub type SharedEngine = Arc<AdBlockEngine>;
