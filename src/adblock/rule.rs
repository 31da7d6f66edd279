//! Règles au format Adblock Plus (sous-ensemble réseau).
//!
//! ```text
//! line   := '' | '!' ... | rule
//! rule   := ['@@'] body [ '$' options ]
//! body   := '/' regex '/' | simple
//! simple := ['||' | '|'] chars ['|']
//! chars  := literal | '*' | '^'
//! ```
//!
//! Options and element hiding are not supported: options are dropped, hiding
//! rules are skipped.

use regex::Regex;
use thiserror::Error;

/// Separator class for `^`; also matches the end of the address.
const SEPARATOR: &str = "(?:[^a-z0-9_.%-]|$)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Block,
    Exception,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("empty rule")]
    Empty,
    #[error("unsupported syntax: {0}")]
    Unsupported(&'static str),
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Clone)]
enum Pattern {
    /// Glob-like rule; `body` is the literal text between the anchors with
    /// `*` and `^` left in place.
    Simple { body: Vec<u8>, regex: Regex },
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct Rule {
    kind: RuleKind,
    text: String,
    pattern: Pattern,
}

impl Rule {
    /// Parses one filter-list line. `Ok(None)` for lines that carry no
    /// network rule (blank, comment, element hiding).
    pub fn parse(line: &str) -> Result<Option<Rule>, RuleError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') || line.starts_with('[') {
            return Ok(None);
        }
        if line.contains("##") || line.contains("#@#") {
            return Ok(None);
        }

        let lowered = strip_options(line).to_lowercase();
        let (kind, body) = match lowered.strip_prefix("@@") {
            Some(rest) => (RuleKind::Exception, rest),
            None => (RuleKind::Block, lowered.as_str()),
        };
        if body.is_empty() {
            return Err(RuleError::Empty);
        }

        let pattern = if body.len() >= 2 && body.starts_with('/') && body.ends_with('/') {
            Pattern::Regex(Regex::new(&body[1..body.len() - 1])?)
        } else {
            parse_simple(body)?
        };

        Ok(Some(Rule {
            kind,
            text: line.to_string(),
            pattern,
        }))
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// The line the rule came from.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.pattern, Pattern::Simple { .. })
    }

    /// `url` must already be lowercased.
    pub fn matches(&self, url: &str) -> bool {
        match &self.pattern {
            Pattern::Simple { regex, .. } | Pattern::Regex(regex) => regex.is_match(url),
        }
    }

    /// 8-byte literal windows of a simple rule, left to right. Any URL the
    /// rule matches contains each of them.
    pub fn windows(&self) -> impl Iterator<Item = [u8; 8]> + '_ {
        let body: &[u8] = match &self.pattern {
            Pattern::Simple { body, .. } => body,
            Pattern::Regex(_) => &[],
        };
        body.windows(8)
            .filter(|w| !w.iter().any(|b| matches!(b, b'*' | b'^')))
            .filter_map(|w| <[u8; 8]>::try_from(w).ok())
    }
}

/// Drops the `$options` part at the first `$`. A body starting with `/` may
/// be a regex holding its own `$`, so there the split is at the last `$`
/// followed by something shaped like an option list.
fn strip_options(line: &str) -> &str {
    let body_start = if line.starts_with("@@") { 2 } else { 0 };
    if line[body_start..].starts_with('/') {
        return match line.rfind('$') {
            Some(i) if i >= body_start && is_option_list(&line[i + 1..]) => &line[..i],
            _ => line,
        };
    }
    match line.find('$') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// `[~]name[=value]`, comma separated.
fn is_option_list(text: &str) -> bool {
    !text.is_empty()
        && text.split(',').all(|option| {
            let option = option.strip_prefix('~').unwrap_or(option);
            let name = option.split_once('=').map_or(option, |(name, _)| name);
            !name.is_empty()
                && name
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
        })
}

fn parse_simple(body: &str) -> Result<Pattern, RuleError> {
    let (prefix, rest) = if let Some(rest) = body.strip_prefix("||") {
        ("^[^:]*://", rest)
    } else if let Some(rest) = body.strip_prefix('|') {
        ("^", rest)
    } else {
        ("^.*", body)
    };
    let (literal, suffix) = match rest.strip_suffix('|') {
        Some(literal) => (literal, "$"),
        None => (rest, ".*$"),
    };

    if literal.is_empty() {
        return Err(RuleError::Empty);
    }
    if literal.contains("||") {
        return Err(RuleError::Unsupported("`||` inside a rule"));
    }
    if literal.contains('$') {
        return Err(RuleError::Unsupported("`$` inside a rule"));
    }

    let mut pattern = String::with_capacity(prefix.len() + literal.len() * 2 + suffix.len());
    pattern.push_str(prefix);
    let mut buf = [0u8; 4];
    for c in literal.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '^' => pattern.push_str(SEPARATOR),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    pattern.push_str(suffix);

    Ok(Pattern::Simple {
        body: literal.as_bytes().to_vec(),
        regex: Regex::new(&pattern)?,
    })
}
