//! Middleware de filtrage réseau.
//!
//! `RequestFilter` sits on the request path: the host asks it about every
//! outgoing request. Empty or unparseable URLs (data URIs, blobs, garbage)
//! are always allowed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::adblock::AdBlockEngine;
use crate::host::{Hinter, Host, OpenTarget, Scroll};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    engine: Option<Arc<AdBlockEngine>>,
    /// Only filled once ingestion is complete; earlier answers may change.
    cache: Arc<Mutex<HashMap<String, Decision>>>,
}

impl RequestFilter {
    pub fn new(engine: Arc<AdBlockEngine>) -> Self {
        Self {
            engine: Some(engine),
            cache: Arc::default(),
        }
    }

    /// Filter that allows everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.is_some()
    }

    pub fn decide(&self, url: &str) -> Decision {
        let Some(engine) = &self.engine else {
            return Decision::Allow;
        };
        let url = url.trim();
        if url.is_empty() {
            return Decision::Allow;
        }
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") => {}
            _ => return Decision::Allow,
        }

        let complete = engine.is_complete();
        if complete && let Some(&cached) = self.cache.lock().get(url) {
            return cached;
        }

        let decision = if engine.blocks(url) {
            debug!(url, "request blocked");
            Decision::Block
        } else {
            Decision::Allow
        };
        if complete {
            self.cache.lock().insert(url.to_string(), decision);
        }
        decision
    }

    /// Vide le cache ; à appeler à chaque navigation.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation : vidage du cache
// ─────────────────────────────────────────────────────────────────────────────

/// Host wrapper that clears the filter cache on every navigation (open,
/// history move, reload), so the cache only ever holds one page's worth of
/// requests.
pub struct NavigatingHost {
    inner: Arc<dyn Host>,
    filter: RequestFilter,
}

impl NavigatingHost {
    pub fn new(inner: Arc<dyn Host>, filter: RequestFilter) -> Self {
        Self { inner, filter }
    }
}

impl Host for NavigatingHost {
    fn scroll(&self, scroll: Scroll, amount: u32) {
        self.inner.scroll(scroll, amount);
    }

    fn open(&self, target: OpenTarget, url: &Url) {
        self.filter.clear_cache();
        self.inner.open(target, url);
    }

    fn history(&self, delta: i32) {
        self.filter.clear_cache();
        self.inner.history(delta);
    }

    fn reload(&self, bypass_cache: bool) {
        self.filter.clear_cache();
        self.inner.reload(bypass_cache);
    }

    fn current_uri(&self) -> Option<Url> {
        self.inner.current_uri()
    }

    fn yank(&self, text: &str) {
        self.inner.yank(text);
    }

    fn quit(&self) {
        self.inner.quit();
    }

    fn hinter(&self, rapid: bool) -> Option<Hinter> {
        self.inner.hinter(rapid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LoggingHost;

    fn filter(list: &str) -> RequestFilter {
        RequestFilter::new(Arc::new(AdBlockEngine::from_list(list)))
    }

    #[test]
    fn test_decide() {
        let f = filter("ads.example.com^\n@@||good.ads.example.com/\n");
        assert_eq!(f.decide("http://ads.example.com/x"), Decision::Block);
        assert_eq!(f.decide("http://good.ads.example.com/x"), Decision::Allow);
        assert_eq!(f.decide("https://example.org/"), Decision::Allow);
    }

    #[test]
    fn test_fail_open() {
        let f = filter("*\n");
        assert_eq!(f.decide(""), Decision::Allow);
        assert_eq!(f.decide("   "), Decision::Allow);
        assert_eq!(f.decide("not a url"), Decision::Allow);
        assert_eq!(f.decide("data:text/html,hello"), Decision::Allow);
        assert_eq!(f.decide("https://anything.example/"), Decision::Block);
    }

    #[test]
    fn test_disabled_allows_everything() {
        let f = RequestFilter::disabled();
        assert!(!f.is_enabled());
        assert_eq!(f.decide("http://ads.example.com/"), Decision::Allow);
    }

    #[test]
    fn test_cache_only_after_ingestion() {
        let engine = Arc::new(AdBlockEngine::new());
        let f = RequestFilter::new(Arc::clone(&engine));
        assert_eq!(f.decide("http://ads.example.com/"), Decision::Allow);

        engine.append(crate::adblock::ParsedList::parse("||ads.example.com^").rules);
        assert_eq!(f.decide("http://ads.example.com/"), Decision::Block);

        engine.mark_complete();
        assert_eq!(f.decide("http://ads.example.com/"), Decision::Block);
        assert_eq!(f.cache.lock().len(), 1);
        f.clear_cache();
        assert!(f.cache.lock().is_empty());
    }

    #[test]
    fn test_navigation_clears_cache() {
        let f = filter("||ads.example.com^\n");
        let host = NavigatingHost::new(Arc::new(LoggingHost::new(None)), f.clone());
        f.decide("http://ads.example.com/a");
        f.decide("http://example.org/b");
        assert_eq!(f.cache.lock().len(), 2);

        host.scroll(Scroll::Down, 3);
        assert_eq!(f.cache.lock().len(), 2, "scrolling is not navigation");

        let url = Url::parse("https://example.org/next").unwrap();
        host.open(OpenTarget::Current, &url);
        assert!(f.cache.lock().is_empty());
        assert_eq!(host.current_uri(), Some(url));

        f.decide("http://ads.example.com/a");
        host.history(-1);
        assert!(f.cache.lock().is_empty());
    }
}
