//! Chargement des listes de filtres en tâche de fond.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AdBlockEngine, ParsedList};

/// Provider of filter lists, read one at a time by the ingestion task.
pub trait FilterSource: Send + 'static {
    /// List names, in load order.
    fn lists(&self) -> io::Result<Vec<String>>;

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send + '_>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// DirFilterSource
// ─────────────────────────────────────────────────────────────────────────────

/// Every `.txt` file of a directory, sorted by name.
#[derive(Debug, Clone)]
pub struct DirFilterSource {
    dir: PathBuf,
}

impl DirFilterSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cherche le dossier de filtres : chemin configuré, puis
    /// `resources/filters/` à côté de l'exécutable, puis dans le répertoire
    /// courant.
    pub fn locate(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            if path.is_dir() {
                return Some(Self::new(path));
            }
            warn!(path = %path.display(), "configured filters directory not found");
        }

        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.canonicalize().ok())
            .and_then(|exe| exe.parent().map(|dir| dir.join("resources").join("filters")));
        let in_cwd = std::env::current_dir()
            .ok()
            .map(|cwd| cwd.join("resources").join("filters"));

        for path in [beside_exe, in_cwd].into_iter().flatten() {
            if path.is_dir() {
                return Some(Self::new(path));
            }
        }

        warn!("no filters directory found, ad-blocking disabled");
        None
    }
}

impl FilterSource for DirFilterSource {
    fn lists(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(fs::File::open(self.dir.join(name))?))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryFilterSource
// ─────────────────────────────────────────────────────────────────────────────

/// Lists held in memory; `None` content simulates an unreadable list.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilterSource {
    lists: Vec<(String, Option<String>)>,
}

impl MemoryFilterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.lists.push((name.into(), Some(content.into())));
        self
    }

    pub fn with_unreadable(mut self, name: impl Into<String>) -> Self {
        self.lists.push((name.into(), None));
        self
    }
}

impl FilterSource for MemoryFilterSource {
    fn lists(&self) -> io::Result<Vec<String>> {
        Ok(self.lists.iter().map(|(name, _)| name.clone()).collect())
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send + '_>> {
        match self.lists.iter().find(|(n, _)| n == name) {
            Some((_, Some(content))) => Ok(Box::new(content.as_bytes())),
            Some((_, None)) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "unreadable list",
            )),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ingestion
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub rules: usize,
    pub malformed: usize,
    pub failed_files: usize,
}

/// Loads every list of `source` into `engine` on the blocking pool. The
/// engine answers queries throughout, with whatever has been loaded so far.
pub fn ingest<S: FilterSource>(engine: Arc<AdBlockEngine>, source: S) -> JoinHandle<IngestReport> {
    tokio::task::spawn_blocking(move || ingest_blocking(&engine, &source))
}

fn ingest_blocking(engine: &AdBlockEngine, source: &dyn FilterSource) -> IngestReport {
    let mut report = IngestReport::default();
    let names = match source.lists() {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "cannot list filter sources");
            engine.mark_complete();
            return report;
        }
    };

    for name in names {
        let content = match read_list(source, &name) {
            Ok(content) => content,
            Err(e) => {
                warn!(list = %name, error = %e, "filter list skipped");
                report.failed_files += 1;
                continue;
            }
        };

        let parsed = ParsedList::parse(&content);
        if parsed.malformed > 0 {
            debug!(list = %name, malformed = parsed.malformed, "malformed filter lines");
        }
        report.malformed += parsed.malformed;
        let rules = engine.append(parsed.rules);
        report.rules += rules;
        report.files += 1;
        info!(list = %name, rules, "filter list loaded");
    }

    engine.mark_complete();
    info!(
        files = report.files,
        rules = report.rules,
        malformed = report.malformed,
        failed_files = report.failed_files,
        "adblock ingestion complete"
    );
    report
}

fn read_list(source: &dyn FilterSource, name: &str) -> io::Result<String> {
    let mut bytes = Vec::new();
    source.open(name)?.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
