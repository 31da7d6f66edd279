//! # Modalbrows : cœur d'un navigateur modal
//!
//! Tout ce qui, dans un navigateur piloté au clavier, ne dépend pas du
//! moteur de rendu : décodage des touches, tables de bindings, machine
//! modale, filtrage des requêtes.
//!
//! ## Architecture des modules
//!
//! - [`keys`] : touches, modificateurs, séquences `<C-x>gg` (parse/render),
//!   anti-rebond.
//!
//! - [`bindings`] : trie de séquences → actions, keymap par défaut,
//!   compilation et swap atomique des keymaps.
//!
//! - [`builtins`] / [`command`] : cibles `builtin:NAME args` et `cmd:LINE`.
//!
//! - [`mode`] : la machine modale (Normal, Insert, CommandLine, Confirm,
//!   Status, Hints), le minuteur d'ambiguïté et la tâche de dispatch.
//!
//! - [`adblock`] / [`privacy`] : règles Adblock Plus indexées par empreintes
//!   de 8 octets, et la décision Allow/Block sur le chemin des requêtes.
//!
//! - [`host`] : ce que le navigateur hôte doit fournir (scroll, open, hints…).
//!
//! - [`config`], [`rc`], [`quickmarks`], [`shell`] : chargement et assemblage.

pub mod adblock;
pub mod bindings;
pub mod builtins;
pub mod command;
pub mod config;
pub mod host;
pub mod keys;
pub mod mode;
pub mod privacy;
pub mod quickmarks;
pub mod rc;
pub mod shell;
