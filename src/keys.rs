//! Codec des séquences de touches.
//!
//! Une touche est un triplet `(keyval, modificateurs, is_modifier)`. La forme
//! textuelle suit la grammaire des fichiers rc :
//!
//! ```text
//! seq   := token+
//! token := printable | '<' name '>'
//! name  := [mod-]* base        (mod = 'C' | 'A')
//! ```
//!
//! Seuls Control et Alt participent à la comparaison : Shift, Lock, Super,
//! Hyper, Meta et les masques de boutons sont absorbés par la touche de base.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Masque de modificateurs tel que livré par l'hôte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const ALT = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;
        const BUTTON4 = 1 << 11;
        const BUTTON5 = 1 << 12;
        const SUPER = 1 << 26;
        const HYPER = 1 << 27;
        const META = 1 << 28;
    }
}

impl Modifiers {
    /// Bits retenus pour la comparaison de deux touches.
    pub const COMPARATOR: Modifiers = Modifiers::CONTROL.union(Modifiers::ALT);
}

// ─────────────────────────────────────────────────────────────────────────────
// Named keys
// ─────────────────────────────────────────────────────────────────────────────

/// Touches non imprimables reconnues par le codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Escape,
    Return,
    KpEnter,
    BackSpace,
    Tab,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
    /// F1 à F12.
    F(u8),
    ShiftL,
    ShiftR,
    ControlL,
    ControlR,
    AltL,
    AltR,
    SuperL,
    SuperR,
}

const NAMED_KEYS: &[(NamedKey, &str)] = &[
    (NamedKey::Escape, "Escape"),
    (NamedKey::Return, "Return"),
    (NamedKey::KpEnter, "KP_Enter"),
    (NamedKey::BackSpace, "BackSpace"),
    (NamedKey::Tab, "Tab"),
    (NamedKey::Delete, "Delete"),
    (NamedKey::Insert, "Insert"),
    (NamedKey::Home, "Home"),
    (NamedKey::End, "End"),
    (NamedKey::PageUp, "Page_Up"),
    (NamedKey::PageDown, "Page_Down"),
    (NamedKey::Left, "Left"),
    (NamedKey::Right, "Right"),
    (NamedKey::Up, "Up"),
    (NamedKey::Down, "Down"),
    (NamedKey::ShiftL, "Shift_L"),
    (NamedKey::ShiftR, "Shift_R"),
    (NamedKey::ControlL, "Control_L"),
    (NamedKey::ControlR, "Control_R"),
    (NamedKey::AltL, "Alt_L"),
    (NamedKey::AltR, "Alt_R"),
    (NamedKey::SuperL, "Super_L"),
    (NamedKey::SuperR, "Super_R"),
];

/// Alias acceptés en entrée, jamais produits au rendu.
const NAME_ALIASES: &[(&str, NamedKey)] = &[
    ("Esc", NamedKey::Escape),
    ("CR", NamedKey::Return),
    ("Enter", NamedKey::Return),
    ("BS", NamedKey::BackSpace),
    ("Del", NamedKey::Delete),
];

/// Noms symboliques de touches imprimables.
const PRINTABLE_NAMES: &[(char, &str)] = &[(' ', "space"), ('<', "less"), ('{', "braceleft")];

impl NamedKey {
    /// Nom canonique (forme GDK).
    pub fn name(self) -> String {
        if let NamedKey::F(n) = self {
            return format!("F{n}");
        }
        NAMED_KEYS
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_default()
    }

    /// Recherche insensible à la casse, alias compris.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(number) = name.strip_prefix(['F', 'f'])
            && let Ok(n) = number.parse::<u8>()
            && (1..=12).contains(&n)
        {
            return Some(NamedKey::F(n));
        }
        NAMED_KEYS
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
            .map(|(key, _)| *key)
            .or_else(|| {
                NAME_ALIASES
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
                    .map(|(_, key)| *key)
            })
    }

    /// Vrai pour les appuis sur une touche de modification seule.
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            NamedKey::ShiftL
                | NamedKey::ShiftR
                | NamedKey::ControlL
                | NamedKey::ControlR
                | NamedKey::AltL
                | NamedKey::AltR
                | NamedKey::SuperL
                | NamedKey::SuperR
        )
    }
}

/// Touches synthétiques, non saisissables au clavier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualKey {
    /// Emplacement du préfixe numérique, rendu `{n}`.
    Count,
}

/// Identité logique d'une touche.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyVal {
    Char(char),
    Named(NamedKey),
    Virtual(VirtualKey),
}

// ─────────────────────────────────────────────────────────────────────────────
// Key
// ─────────────────────────────────────────────────────────────────────────────

/// Une touche pressée (ou décrite dans une séquence).
///
/// `Eq` et `Hash` portent sur la forme normalisée : deux touches ne différant
/// que par Shift ou Super sont égales.
#[derive(Debug, Clone, Copy)]
pub struct Key {
    pub keyval: KeyVal,
    pub modifiers: Modifiers,
    pub is_modifier: bool,
}

impl Key {
    pub fn char(c: char) -> Self {
        Self {
            keyval: KeyVal::Char(c),
            modifiers: Modifiers::empty(),
            is_modifier: false,
        }
    }

    pub fn named(key: NamedKey) -> Self {
        Self {
            keyval: KeyVal::Named(key),
            modifiers: Modifiers::empty(),
            is_modifier: key.is_modifier(),
        }
    }

    pub fn virtual_key(key: VirtualKey) -> Self {
        Self {
            keyval: KeyVal::Virtual(key),
            modifiers: Modifiers::empty(),
            is_modifier: false,
        }
    }

    pub fn ctrl(c: char) -> Self {
        Self::char(c).with_modifiers(Modifiers::CONTROL)
    }

    pub fn alt(c: char) -> Self {
        Self::char(c).with_modifiers(Modifiers::ALT)
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Retire tous les bits hors Control/Alt.
    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            modifiers: self.modifiers & Modifiers::COMPARATOR,
            ..self
        }
    }

    /// Comparaison brute, tous bits compris (utilisée par l'anti-rebond).
    pub fn identical(&self, other: &Key) -> bool {
        self.keyval == other.keyval
            && self.modifiers == other.modifiers
            && self.is_modifier == other.is_modifier
    }

    pub fn is_named(&self, key: NamedKey) -> bool {
        self.keyval == KeyVal::Named(key)
    }

    pub fn is_escape(&self) -> bool {
        self.is_named(NamedKey::Escape)
    }

    pub fn is_return(&self) -> bool {
        self.is_named(NamedKey::Return) || self.is_named(NamedKey::KpEnter)
    }

    /// Caractère saisi, si la touche est imprimable sans Control ni Alt.
    pub fn printable(&self) -> Option<char> {
        match self.keyval {
            KeyVal::Char(c)
                if !c.is_control() && !self.modifiers.intersects(Modifiers::COMPARATOR) =>
            {
                Some(c)
            }
            _ => None,
        }
    }

    /// Valeur d'un chiffre décimal sans modificateur.
    pub fn digit(&self) -> Option<u32> {
        self.printable().and_then(|c| c.to_digit(10))
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.keyval, KeyVal::Virtual(_))
    }

    /// Rendu d'une touche isolée, sans chevrons.
    pub fn token(&self, selective: bool) -> String {
        let base = match self.keyval {
            KeyVal::Virtual(VirtualKey::Count) => return "{n}".to_string(),
            KeyVal::Named(named) => named.name(),
            KeyVal::Char(c) => match PRINTABLE_NAMES.iter().find(|(p, _)| *p == c) {
                Some((_, name)) if selective => (*name).to_string(),
                _ => c.to_string(),
            },
        };
        let mut token = String::with_capacity(base.len() + 4);
        if self.modifiers.contains(Modifiers::CONTROL) {
            token.push_str("C-");
        }
        if self.modifiers.contains(Modifiers::ALT) {
            token.push_str("A-");
        }
        token.push_str(&base);
        token
    }

    /// Rendu dans une séquence : tout jeton de plus d'un caractère est encadré.
    pub fn render(&self, selective: bool) -> String {
        let token = self.token(selective);
        if !self.is_virtual() && token.chars().count() > 1 {
            format!("<{token}>")
        } else {
            token
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.keyval == other.keyval
            && (self.modifiers & Modifiers::COMPARATOR) == (other.modifiers & Modifiers::COMPARATOR)
            && self.is_modifier == other.is_modifier
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.keyval.hash(state);
        (self.modifiers & Modifiers::COMPARATOR).hash(state);
        self.is_modifier.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    /// Analyse une touche unique (`j`, `<C-a>`, `<Escape>`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sequence = KeySequence::parse(s)?;
        match sequence.keys() {
            [key] => Ok(*key),
            _ => Err(KeyParseError::UnknownName(s.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parse errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("empty key token")]
    EmptyToken,
    #[error("unknown key name `{0}`")]
    UnknownName(String),
    #[error("bad modifier prefix in `{0}`")]
    BadModifierPrefix(String),
}

/// Analyse le contenu d'un jeton `<…>` (sans les chevrons).
fn parse_bracketed(token: &str) -> Result<Key, KeyParseError> {
    if token.is_empty() {
        return Err(KeyParseError::EmptyToken);
    }

    let mut modifiers = Modifiers::empty();
    let mut rest = token;
    while rest.len() > 2 && rest.as_bytes()[1] == b'-' {
        match rest.as_bytes()[0] {
            b'C' => modifiers |= Modifiers::CONTROL,
            b'A' => modifiers |= Modifiers::ALT,
            _ => return Err(KeyParseError::BadModifierPrefix(token.to_string())),
        }
        rest = &rest[2..];
    }

    let mut chars = rest.chars();
    let base = match (chars.next(), chars.next()) {
        (Some(c), None) => Key::char(c),
        _ => {
            if let Some((c, _)) = PRINTABLE_NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(rest))
            {
                Key::char(*c)
            } else {
                NamedKey::from_name(rest)
                    .map(Key::named)
                    .ok_or_else(|| KeyParseError::UnknownName(token.to_string()))?
            }
        }
    };
    Ok(base.with_modifiers(modifiers))
}

// ─────────────────────────────────────────────────────────────────────────────
// KeySequence
// ─────────────────────────────────────────────────────────────────────────────

/// Suite ordonnée de touches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeySequence(Vec<Key>);

impl KeySequence {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Analyse de gauche à droite : `<…>` est une touche nommée, tout autre
    /// caractère est une touche imprimable.
    pub fn parse(input: &str) -> Result<Self, KeyParseError> {
        if input.is_empty() {
            return Err(KeyParseError::EmptyToken);
        }

        let mut keys = Vec::new();
        let mut rest = input;
        while let Some(c) = rest.chars().next() {
            if c == '<' {
                let Some(mut end) = rest.find('>') else {
                    return Err(KeyParseError::UnknownName(rest.to_string()));
                };
                // `<C->>` : le `>` fait partie du nom.
                if rest[..end].ends_with('-') && rest[end + 1..].starts_with('>') {
                    end += 1;
                }
                keys.push(parse_bracketed(&rest[1..end])?);
                rest = &rest[end + 1..];
            } else if let Some(tail) = rest.strip_prefix("{n}") {
                keys.push(Key::virtual_key(VirtualKey::Count));
                rest = tail;
            } else {
                keys.push(Key::char(c));
                rest = &rest[c.len_utf8()..];
            }
        }
        Ok(Self(keys))
    }

    /// `selective` : espace, `<` et `{` sont rendus par leur nom
    /// (affichage de séquences) ; sinon ils sont rendus tels quels (écho texte).
    pub fn render(&self, selective: bool) -> String {
        self.0.iter().map(|key| key.render(selective)).collect()
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn push(&mut self, key: Key) {
        self.0.push(key);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.0.iter()
    }

    /// Retire un `{n}` initial ; renvoie vrai s'il était présent.
    pub fn strip_count_prefix(&mut self) -> bool {
        if self.0.first().is_some_and(Key::is_virtual) {
            self.0.remove(0);
            true
        } else {
            false
        }
    }
}

impl From<Vec<Key>> for KeySequence {
    fn from(keys: Vec<Key>) -> Self {
        Self(keys)
    }
}

impl FromStr for KeySequence {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

impl<'a> IntoIterator for &'a KeySequence {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Debouncer
// ─────────────────────────────────────────────────────────────────────────────

/// Filtre les doubles émissions : un événement identique au dernier admis et
/// arrivé moins de `window` après lui est ignoré. L'ordre n'est jamais modifié.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: Option<(Key, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn admit(&mut self, key: &Key, at: Instant) -> bool {
        if let Some((last, last_at)) = &self.last
            && last.identical(key)
            && at.saturating_duration_since(*last_at) < self.window
        {
            return false;
        }
        self.last = Some((*key, at));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seq(s: &str) -> KeySequence {
        KeySequence::parse(s).unwrap()
    }

    // ── parse ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_printables() {
        assert_eq!(seq("gg").keys(), &[Key::char('g'), Key::char('g')]);
    }

    #[test]
    fn test_parse_named_and_modifiers() {
        assert_eq!(seq("<Escape>").keys(), &[Key::named(NamedKey::Escape)]);
        assert_eq!(seq("<C-a>").keys(), &[Key::ctrl('a')]);
        assert_eq!(
            seq("<C-A-Return>").keys(),
            &[Key::named(NamedKey::Return).with_modifiers(Modifiers::CONTROL | Modifiers::ALT)]
        );
        assert_eq!(seq("<KP_Enter>").keys(), &[Key::named(NamedKey::KpEnter)]);
        assert_eq!(seq("<F12>").keys(), &[Key::named(NamedKey::F(12))]);
    }

    #[test]
    fn test_parse_is_case_insensitive_for_names() {
        assert_eq!(seq("<escape>"), seq("<Escape>"));
        assert_eq!(seq("<Esc>"), seq("<Escape>"));
        assert_eq!(seq("<backspace>"), seq("<BackSpace>"));
    }

    #[test]
    fn test_parse_printable_names() {
        assert_eq!(seq("<space>").keys(), &[Key::char(' ')]);
        assert_eq!(seq("<less>").keys(), &[Key::char('<')]);
    }

    #[test]
    fn test_parse_count_placeholder() {
        let mut s = seq("{n}j");
        assert!(s.keys()[0].is_virtual());
        assert!(s.strip_count_prefix());
        assert_eq!(s.keys(), &[Key::char('j')]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(KeySequence::parse(""), Err(KeyParseError::EmptyToken));
        assert_eq!(KeySequence::parse("<>"), Err(KeyParseError::EmptyToken));
        assert_eq!(
            KeySequence::parse("<Bogus>"),
            Err(KeyParseError::UnknownName("Bogus".to_string()))
        );
        assert_eq!(
            KeySequence::parse("<S-a>"),
            Err(KeyParseError::BadModifierPrefix("S-a".to_string()))
        );
        assert!(matches!(KeySequence::parse("a<b"), Err(KeyParseError::UnknownName(_))));
    }

    // ── render ────────────────────────────────────────────────────────

    #[test]
    fn test_render_wraps_multi_char_tokens() {
        assert_eq!(seq("<C-a>x<Escape>").render(true), "<C-a>x<Escape>");
        assert_eq!(seq("<A-C-x>").render(true), "<C-A-x>");
        assert_eq!(seq("{n}gg").render(true), "{n}gg");
        assert_eq!(seq("<C->>").keys(), &[Key::ctrl('>')]);
        assert_eq!(Key::ctrl('>').render(true), "<C->>");
    }

    #[test]
    fn test_render_selective_space_and_less() {
        let s = KeySequence::from(vec![Key::char(' '), Key::char('<')]);
        assert_eq!(s.render(true), "<space><less>");
        assert_eq!(s.render(false), " <");
    }

    // ── normalisation ─────────────────────────────────────────────────

    #[test]
    fn test_only_control_and_alt_compare() {
        let plain = Key::char('a');
        let noisy = Key::char('a').with_modifiers(Modifiers::LOCK | Modifiers::SUPER | Modifiers::BUTTON1);
        assert_eq!(plain, noisy);
        assert_ne!(plain, Key::ctrl('a'));
        assert_eq!(noisy.normalize().modifiers, Modifiers::empty());
    }

    #[test]
    fn test_printable_and_digit() {
        assert_eq!(Key::char('5').digit(), Some(5));
        assert_eq!(Key::ctrl('5').digit(), None);
        assert_eq!(Key::named(NamedKey::Tab).printable(), None);
        assert!(Key::named(NamedKey::ShiftL).is_modifier);
    }

    // ── debouncer ─────────────────────────────────────────────────────

    #[test]
    fn test_debouncer_drops_fast_duplicates_only() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        let t0 = Instant::now();
        assert!(debouncer.admit(&Key::char('j'), t0));
        assert!(!debouncer.admit(&Key::char('j'), t0 + Duration::from_millis(5)));
        assert!(debouncer.admit(&Key::char('k'), t0 + Duration::from_millis(6)));
        assert!(debouncer.admit(&Key::char('k'), t0 + Duration::from_millis(20)));
    }

    // ── round-trip laws ───────────────────────────────────────────────

    fn arb_key() -> impl Strategy<Value = Key> {
        let base = prop_oneof![
            any::<char>()
                .prop_filter("typeable", |c| !c.is_control())
                .prop_map(Key::char),
            (0..NAMED_KEYS.len()).prop_map(|i| Key::named(NAMED_KEYS[i].0)),
            (1u8..=12).prop_map(|n| Key::named(NamedKey::F(n))),
        ];
        (base, any::<bool>(), any::<bool>()).prop_map(|(key, ctrl, alt)| {
            let mut modifiers = Modifiers::empty();
            modifiers.set(Modifiers::CONTROL, ctrl);
            modifiers.set(Modifiers::ALT, alt);
            key.with_modifiers(modifiers)
        })
    }

    proptest! {
        #[test]
        fn prop_parse_render_roundtrip(keys in proptest::collection::vec(arb_key(), 1..8)) {
            let sequence = KeySequence::from(keys);
            let rendered = sequence.render(true);
            prop_assert_eq!(KeySequence::parse(&rendered).unwrap(), sequence);
        }
    }
}
