//! Math normalisation: repair the inside of one `$...$` span.
//!
//! Authors type math the way it looks rather than the way LaTeX wants it:
//! `sinx` instead of `\sin x`, `×` instead of `\times`, Japanese words in the
//! middle of a formula. [`normalize_math`] rewrites one span interior in six
//! passes. Order matters: escaping bare names must happen before the spacing
//! pass looks for escaped names, and whitespace is collapsed only after the
//! symbol table has appended its trailing spaces.
//!
//! The `regex` crate has no look-around, so "not preceded by `\`" is
//! expressed by capturing the optional backslash and deciding in the
//! replacement closure.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Function names that receive a backslash when written bare, longest first
/// so that alternation never stops at a prefix.
pub const FUNCTION_NAMES: &[&str] = &[
    "arcsin", "arccos", "arctan", "sinh", "cosh", "tanh", "sqrt", "sin", "cos", "tan", "log",
    "exp", "lim", "max", "min", "ln",
];

/// Command words that look like a function name plus a suffix but are real
/// commands in their own right. The spacing pass never splits these.
const UNSPLITTABLE: &[&str] = &[
    "limits", "nolimits", "lnot", "lneq", "lneqq", "lnsim", "lnapprox", "expandafter",
    "liminf", "limsup", "sqrtsign", "cosec", "tanh", "sinh", "cosh", "arcsin", "arccos", "arctan",
];

/// Style commands that may follow a function name without a separating space.
const STYLE_COMMANDS: &[&str] = &["displaystyle", "text", "mathrm", "mathbb", "d"];

/// Normalise one math span interior (without the `$` markers).
///
/// Passes, in order:
/// 1. Escape bare function names (`sin` → `\sin`; `sinh` stays hyperbolic)
/// 2. Expand the `\d` shorthand to `\displaystyle`
/// 3. Space an escaped function name from a following letter, digit or command
/// 4. Replace Unicode math symbols with commands
/// 5. Collapse whitespace runs to one space
/// 6. Wrap Japanese runs in `\text{}`
pub fn normalize_math(inner: &str) -> String {
    let s = escape_bare_functions(inner);
    let s = expand_displaystyle(&s);
    let s = space_after_functions(&s);
    let s = replace_unicode_symbols(&s);
    let s = collapse_whitespace(&s);
    wrap_japanese(&s)
}

// ── Pass 1: bare function names ──────────────────────────────────────────────

/// A text-mode group whose contents are prose, not math.
const TEXT_GROUP: &str = r"\\(?:text|textrm|mathrm|mbox)\{[^{}]*\}";

// Text-mode groups are matched first and passed through, so `\text{cost}`
// never becomes `\text{\cos t}`.
static RE_BARE_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{TEXT_GROUP}|(\\?)\b({})",
        FUNCTION_NAMES.join("|")
    ))
    .unwrap()
});

// `sinh` precedes `sin` in the alternation, so hyperbolic names are escaped
// whole and never read as `sin` followed by `h`.
fn escape_bare_functions(input: &str) -> String {
    RE_BARE_FUNCTION
        .replace_all(input, |caps: &Captures<'_>| match (caps.get(1), caps.get(2)) {
            (Some(slash), Some(name)) if slash.as_str().is_empty() => {
                format!("\\{}", name.as_str())
            }
            _ => caps[0].to_string(),
        })
        .into_owned()
}

// ── Pass 2: \d shorthand ─────────────────────────────────────────────────────

static RE_D_SHORTHAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\d([^A-Za-z]|$)").unwrap());

fn expand_displaystyle(input: &str) -> String {
    RE_D_SHORTHAND
        .replace_all(input, "\\displaystyle$1")
        .into_owned()
}

// ── Pass 3: spacing after function names ─────────────────────────────────────

static RE_COMMAND_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([A-Za-z]+)").unwrap());

fn space_after_functions(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut last = 0;

    for caps in RE_COMMAND_WORD.captures_iter(input) {
        let Some(m) = caps.get(0) else { continue };
        let word = &caps[1];
        out.push_str(&input[last..m.start()]);
        last = m.end();

        if FUNCTION_NAMES.contains(&word) {
            out.push_str(m.as_str());
            if needs_space(&input[m.end()..]) {
                out.push(' ');
            }
            continue;
        }

        // `\sinx` → `\sin x`, unless the whole word is a command of its own.
        let split = if UNSPLITTABLE.contains(&word) {
            None
        } else {
            FUNCTION_NAMES
                .iter()
                .find(|f| word.len() > f.len() && word.starts_with(*f))
        };
        match split {
            Some(func) => {
                out.push('\\');
                out.push_str(func);
                out.push(' ');
                out.push_str(&word[func.len()..]);
            }
            None => out.push_str(m.as_str()),
        }
    }
    out.push_str(&input[last..]);
    out
}

/// Whether the text after an escaped function name needs a separating space.
fn needs_space(rest: &str) -> bool {
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('\\') => {
            let next: String = chars.take_while(|c| c.is_ascii_alphabetic()).collect();
            !next.is_empty() && !STYLE_COMMANDS.contains(&next.as_str())
        }
        _ => false,
    }
}

// ── Pass 4: Unicode symbols ──────────────────────────────────────────────────

/// Visual symbol → command. Commands carry a trailing space so the next token
/// never fuses with the command name.
pub const UNICODE_SYMBOLS: &[(char, &str)] = &[
    ('×', "\\times "),
    ('·', "\\cdot "),
    ('∙', "\\cdot "),
    ('・', "\\cdot "),
    ('÷', "\\div "),
    ('±', "\\pm "),
    ('∓', "\\mp "),
    ('∞', "\\infty "),
    ('π', "\\pi "),
    ('≤', "\\leq "),
    ('≦', "\\leqq "),
    ('≥', "\\geq "),
    ('≧', "\\geqq "),
    ('≠', "\\neq "),
    ('≈', "\\approx "),
    ('≒', "\\fallingdotseq "),
    ('→', "\\to "),
    ('←', "\\leftarrow "),
    ('↔', "\\leftrightarrow "),
    ('⇒', "\\Rightarrow "),
    ('⇔', "\\Leftrightarrow "),
    ('∈', "\\in "),
    ('∋', "\\ni "),
    ('⊂', "\\subset "),
    ('⊆', "\\subseteq "),
    ('⊃', "\\supset "),
    ('⊇', "\\supseteq "),
    ('∪', "\\cup "),
    ('∩', "\\cap "),
    ('°', "^\\circ "),
    ('（', "("),
    ('）', ")"),
];

fn replace_unicode_symbols(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match UNICODE_SYMBOLS.iter().find(|(u, _)| *u == c) {
            Some((_, tex)) => out.push_str(tex),
            None => out.push(c),
        }
    }
    out
}

// ── Pass 5: whitespace ───────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").trim().to_string()
}

// ── Pass 6: Japanese runs ────────────────────────────────────────────────────

// The first alternative consumes text-mode groups that already exist so the
// second never wraps their contents twice.
static RE_JAPANESE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{TEXT_GROUP}|[\p{{Hiragana}}\p{{Katakana}}\p{{Han}}\u{{3001}}-\u{{303F}}\u{{30FC}}\u{{FF01}}-\u{{FF5E}}]+"
    ))
    .unwrap()
});

fn wrap_japanese(input: &str) -> String {
    RE_JAPANESE
        .replace_all(input, |caps: &Captures<'_>| {
            let m = &caps[0];
            if m.starts_with('\\') {
                m.to_string()
            } else {
                format!("\\text{{{m}}}")
            }
        })
        .into_owned()
}
