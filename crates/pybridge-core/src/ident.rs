//! Identifier validation.

use std::sync::OnceLock;

use regex::Regex;

fn ident_regex() -> Option<&'static Regex> {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Python keywords that are not usable as function names.
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Whether `name` can be used as a global name in the interpreter.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    ident_regex().is_some_and(|re| re.is_match(name)) && !KEYWORDS.contains(&name)
}
