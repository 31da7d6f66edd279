//! Host capabilities consumed by actions.
//!
//! The rendering engine, tab widgets and window glue live outside this crate.
//! Builtins reach them only through [`Host`]; the hints overlay through the
//! async [`HintFilter`] / [`HintExecuter`] pair.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::info;
use url::Url;

/// Scroll request forwarded to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scroll {
    Up,
    Down,
    Left,
    Right,
    Top,
    Bottom,
    HalfPageUp,
    HalfPageDown,
}

/// Where a URI should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTarget {
    Current,
    Tab,
    BackgroundTab,
    Window,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host call failed: {0}")]
    Failed(String),
    #[error("host disconnected")]
    Disconnected,
}

/// Filters the visible hints by the typed label prefix.
///
/// Returns `true` when exactly one hint is hit.
#[async_trait]
pub trait HintFilter: Send + Sync {
    async fn filter(&self, typed: &str) -> Result<bool, HostError>;
}

/// Follows the hint that was hit.
///
/// Returns `true` to continue rapid hinting with a fresh label buffer.
#[async_trait]
pub trait HintExecuter: Send + Sync {
    async fn execute(&self) -> Result<bool, HostError>;
}

/// The pair handed to hints mode.
#[derive(Clone)]
pub struct Hinter {
    pub filter: Arc<dyn HintFilter>,
    pub executer: Arc<dyn HintExecuter>,
}

pub trait Host: Send + Sync {
    fn scroll(&self, scroll: Scroll, amount: u32);
    fn open(&self, target: OpenTarget, url: &Url);
    fn history(&self, delta: i32);
    fn reload(&self, bypass_cache: bool);
    fn current_uri(&self) -> Option<Url>;
    fn yank(&self, text: &str);
    fn quit(&self);
    /// `None` when the page cannot show hints.
    fn hinter(&self, rapid: bool) -> Option<Hinter>;
}

// ─────────────────────────────────────────────────────────────────────────────
// LoggingHost : hôte sans affichage
// ─────────────────────────────────────────────────────────────────────────────

/// Headless host: every capability is logged, navigation state is tracked so
/// `prompt_uri` and `yank_uri` have something to work with.
pub struct LoggingHost {
    current: Mutex<Option<Url>>,
    history: Mutex<Vec<Url>>,
    clipboard: Mutex<Option<String>>,
    hint_labels: Vec<String>,
    quitting: AtomicBool,
    quit_signal: Notify,
}

impl LoggingHost {
    pub fn new(initial: Option<Url>) -> Self {
        Self {
            current: Mutex::new(initial.clone()),
            history: Mutex::new(initial.into_iter().collect()),
            clipboard: Mutex::new(None),
            hint_labels: ["a", "s", "d", "f", "ja", "jk"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            quitting: AtomicBool::new(false),
            quit_signal: Notify::new(),
        }
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }

    /// Resolves once `quit` has been called.
    pub async fn quit_requested(&self) {
        let notified = self.quit_signal.notified();
        if self.is_quitting() {
            return;
        }
        notified.await;
    }

    pub fn clipboard(&self) -> Option<String> {
        self.clipboard.lock().clone()
    }

    pub fn visited(&self) -> Vec<Url> {
        self.history.lock().clone()
    }
}

impl Host for LoggingHost {
    fn scroll(&self, scroll: Scroll, amount: u32) {
        info!(?scroll, amount, "scroll");
    }

    fn open(&self, target: OpenTarget, url: &Url) {
        info!(?target, url = %url, "open");
        self.history.lock().push(url.clone());
        if matches!(target, OpenTarget::Current) {
            *self.current.lock() = Some(url.clone());
        }
    }

    fn history(&self, delta: i32) {
        info!(delta, "history");
    }

    fn reload(&self, bypass_cache: bool) {
        info!(bypass_cache, "reload");
    }

    fn current_uri(&self) -> Option<Url> {
        self.current.lock().clone()
    }

    fn yank(&self, text: &str) {
        info!(text, "yank");
        *self.clipboard.lock() = Some(text.to_string());
    }

    fn quit(&self) {
        info!("quit requested");
        self.quitting.store(true, Ordering::SeqCst);
        self.quit_signal.notify_waiters();
    }

    fn hinter(&self, rapid: bool) -> Option<Hinter> {
        let labels = Arc::new(LabelHints {
            labels: self.hint_labels.clone(),
            rapid,
        });
        Some(Hinter {
            filter: labels.clone(),
            executer: labels,
        })
    }
}

/// Fixed label set: a hint is hit once the typed text equals one label.
struct LabelHints {
    labels: Vec<String>,
    rapid: bool,
}

#[async_trait]
impl HintFilter for LabelHints {
    async fn filter(&self, typed: &str) -> Result<bool, HostError> {
        let candidates = self.labels.iter().filter(|l| l.starts_with(typed)).count();
        Ok(candidates == 1 && self.labels.iter().any(|l| l == typed))
    }
}

#[async_trait]
impl HintExecuter for LabelHints {
    async fn execute(&self) -> Result<bool, HostError> {
        info!(rapid = self.rapid, "hint followed");
        Ok(self.rapid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_current_updates_uri() {
        let host = LoggingHost::new(None);
        let url = Url::parse("https://example.com/").unwrap();
        host.open(OpenTarget::Tab, &url);
        assert!(host.current_uri().is_none());
        host.open(OpenTarget::Current, &url);
        assert_eq!(host.current_uri(), Some(url));
        assert_eq!(host.visited().len(), 2);
    }

    #[tokio::test]
    async fn test_label_hints_hit_on_unique_label() {
        let host = LoggingHost::new(None);
        let hinter = host.hinter(false).unwrap();
        assert!(!hinter.filter.filter("j").await.unwrap());
        assert!(hinter.filter.filter("jk").await.unwrap());
        assert!(hinter.filter.filter("a").await.unwrap());
        assert!(!hinter.executer.execute().await.unwrap());
    }

    #[tokio::test]
    async fn test_quit_notifies_waiters() {
        let host = Arc::new(LoggingHost::new(None));
        host.quit();
        host.quit_requested().await;
        assert!(host.is_quitting());
    }
}
