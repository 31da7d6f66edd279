//! Fichiers rc : bindings et quickmarks, une déclaration par ligne.
//!
//! ```text
//! # commentaire
//! bind normal gg builtin:scroll_top
//! bind quickmark-tab <C-a> cmd:tabopen example.com
//! quickmark w https://en.wikipedia.org
//! ```
//!
//! Une ligne malformée est ignorée et journalisée ; le reste du fichier
//! s'applique normalement.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::bindings::{BindingSet, RawBinding, parse_from};
use crate::command::next_word;
use crate::mode::Substate;

#[derive(Debug, Error)]
pub enum RcError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcEntry {
    Bind(RawBinding),
    Quickmark { keys: String, uri: String },
}

/// Parsed entries plus the lines that were skipped.
#[derive(Debug, Default)]
pub struct RcFile {
    pub entries: Vec<RcEntry>,
    pub errors: Vec<RcError>,
}

pub fn parse(content: &str) -> RcFile {
    let mut rc = RcFile::default();
    for (index, line) in content.lines().enumerate() {
        let line_num = index + 1;
        match parse_line(line) {
            Ok(Some(entry)) => rc.entries.push(entry),
            Ok(None) => {}
            Err(message) => {
                warn!(line = line_num, %message, "rc line skipped");
                rc.errors.push(RcError::Syntax {
                    line: line_num,
                    message,
                });
            }
        }
    }
    rc
}

fn parse_line(line: &str) -> Result<Option<RcEntry>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (keyword, rest) = next_word(line);
    match keyword {
        "bind" => {
            let (substate, rest) = next_word(rest);
            let (keys, target) = next_word(rest);
            if target.is_empty() {
                return Err("expected `bind SUBSTATE KEYS TARGET`".to_string());
            }
            let substate = Substate::from_name(substate)
                .ok_or_else(|| format!("unknown substate `{substate}`"))?;
            Ok(Some(RcEntry::Bind(RawBinding::new(substate, keys, target))))
        }
        "quickmark" => {
            let (keys, uri) = next_word(rest);
            if uri.is_empty() || uri.contains(char::is_whitespace) {
                return Err("expected `quickmark KEYS URI`".to_string());
            }
            parse_from(keys).map_err(|e| e.to_string())?;
            Ok(Some(RcEntry::Quickmark {
                keys: keys.to_string(),
                uri: uri.to_string(),
            }))
        }
        other => Err(format!("unknown directive `{other}`")),
    }
}

pub fn load(path: &Path) -> Result<RcFile, RcError> {
    let content = fs::read_to_string(path).map_err(|source| RcError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rc = parse(&content);
    info!(
        path = %path.display(),
        entries = rc.entries.len(),
        skipped = rc.errors.len(),
        "rc file loaded"
    );
    Ok(rc)
}

impl RcFile {
    /// Adds every entry to `set`. Binding errors surface later, when the set
    /// is compiled.
    pub fn apply(&self, set: &mut BindingSet) {
        for entry in &self.entries {
            match entry {
                RcEntry::Bind(raw) => set.add(raw.clone()),
                RcEntry::Quickmark { keys, uri } => {
                    // Les clés ont déjà été validées par `parse_line`.
                    if let Ok(keys) = parse_from(keys) {
                        set.quickmarks_mut().insert(keys, uri.clone());
                    }
                }
            }
        }
    }
}
