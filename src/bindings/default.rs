//! Compiled-in default bindings.
//!
//! User bindings (config `[bindings]`, rc files, `:bind`) with the same
//! left-hand side replace these.

use super::RawBinding;
use crate::mode::Substate;

const NORMAL: &[(&str, &str)] = &[
    // Scrolling
    ("j", "builtin:scroll_down"),
    ("k", "builtin:scroll_up"),
    ("h", "builtin:scroll_left"),
    ("l", "builtin:scroll_right"),
    ("gg", "builtin:scroll_top"),
    ("G", "builtin:scroll_bottom"),
    ("<C-d>", "builtin:half_page_down"),
    ("<C-u>", "builtin:half_page_up"),
    // History / page
    ("H", "builtin:back"),
    ("L", "builtin:forward"),
    ("r", "builtin:reload"),
    ("R", "builtin:reload_bypass"),
    // Modes
    ("i", "builtin:insert"),
    (":", "builtin:prompt"),
    ("o", "builtin:prompt open"),
    ("O", "builtin:prompt_uri open"),
    ("t", "builtin:prompt tabopen"),
    ("T", "builtin:prompt_uri tabopen"),
    ("f", "builtin:hints"),
    ("F", "builtin:hints rapid"),
    // Quickmarks
    ("go", "builtin:quickmark"),
    ("gn", "builtin:quickmark tab"),
    ("gw", "builtin:quickmark window"),
    ("gq", "builtin:quickmark rapid"),
    // Misc
    ("yy", "builtin:yank_uri"),
    ("ZZ", "builtin:confirm_quit"),
    ("ZQ", "builtin:quit"),
];

pub fn bindings() -> Vec<RawBinding> {
    NORMAL
        .iter()
        .map(|(from, to)| RawBinding::new(Substate::NormalNormal, *from, *to))
        .collect()
}
