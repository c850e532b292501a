//! Markup assembly: one cell's raw text → the LaTeX body of its document.
//!
//! This is the text half of the pipeline. Nothing here touches the
//! filesystem or spawns a process, so every rule can be unit-tested with
//! plain strings. The steps run in a fixed order:
//!
//! 1. Relation commands written in prose (`\le`, `\ge`, `\neq`) are unified
//!    to the characters they stand for.
//! 2. Line-break artifacts (a literal `\n`, `_x000A_`, `_x000D_`, CR/CRLF)
//!    become real newlines.
//! 3. An odd number of `$` markers is repaired by appending one.
//! 4. Every math span is normalised; empty spans are dropped.
//! 5. Optionally, single letters standing alone in prose become math.
//! 6. Prose is escaped.
//! 7. Lines are trimmed and joined with forced line breaks.

use crate::config::PipelineProfile;
use crate::pipeline::escape::{escape_prose, unify_relations};
use crate::pipeline::math::normalize_math;
use crate::pipeline::vault::Protected;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};

/// A `$$...$$` display span or a `$...$` inline span. The display form is
/// tried first so `$$x$$` is one span. Empty pairs match too so they can be
/// dropped.
static RE_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$[^$]+\$\$|\$[^$]*\$").unwrap());

static RE_LITERAL_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\n([A-Za-z]*)").unwrap());

/// Commands that begin with `\n` and must not be read as a line break.
const N_COMMANDS: &[&str] = &["nu", "neq", "ne", "ni", "not", "neg", "nabla", "newline"];

/// Convert one cell's text into the document body.
///
/// Blank input yields an empty string, which callers treat as "no cell".
pub fn to_markup(cell: &str, profile: &PipelineProfile) -> String {
    if cell.trim().is_empty() {
        return String::new();
    }

    let text = normalize_line_breaks(cell);
    let text = Protected::protect(&text, &RE_MATH)
        .map_text(|t| convert_literal_newlines(&unify_relations(t)))
        .restore();
    let text = balance_markers(text);

    let mut body = Protected::protect(&text, &RE_MATH).map_held(normalize_span);
    if profile.wrap_bare_variables {
        body = body
            .map_text(wrap_bare_variables)
            .protect_more(&RE_MATH);
    }
    let markup = escape_prose(body, profile.escape_rules).restore();

    join_lines(&markup)
}

// ── Line breaks ──────────────────────────────────────────────────────────────

fn normalize_line_breaks(text: &str) -> String {
    text.replace("_x000D_", "\r")
        .replace("_x000A_", "\n")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

fn convert_literal_newlines(text: &str) -> String {
    RE_LITERAL_NEWLINE
        .replace_all(text, |caps: &Captures<'_>| {
            let word = format!("n{}", &caps[1]);
            if N_COMMANDS.contains(&word.as_str()) {
                caps[0].to_string()
            } else {
                format!("\n{}", &caps[1])
            }
        })
        .into_owned()
}

// ── Math markers ─────────────────────────────────────────────────────────────

/// Append a closing `$` when the marker count is odd.
pub fn balance_markers(text: String) -> String {
    let count = text.matches('$').count();
    if count % 2 == 0 {
        return text;
    }
    let preview: String = text.chars().take(50).collect();
    warn!("Unbalanced '$' ({} markers), appending one: {:?}", count, preview);
    let mut text = text;
    text.push('$');
    text
}

fn normalize_span(span: &str) -> String {
    let marker = if span.len() >= 4 && span.starts_with("$$") && span.ends_with("$$") {
        "$$"
    } else {
        "$"
    };
    let inner = &span[marker.len()..span.len() - marker.len()];
    if inner.trim().is_empty() {
        debug!("Dropping empty math span");
        return String::new();
    }
    format!("{marker}{}{marker}", normalize_math(inner))
}

// ── Bare variables ───────────────────────────────────────────────────────────

fn is_variable_neighbour(c: Option<char>) -> bool {
    matches!(c, Some(c) if c.is_ascii_alphanumeric() || c == '\\' || c == '$')
}

/// Wrap lowercase letters that stand alone in prose as math (`x` → `$x$`).
///
/// `f`, `g` and `h` directly followed by `(` read as function calls and stay
/// as they are.
fn wrap_bare_variables(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let standalone = c.is_ascii_lowercase()
            && !is_variable_neighbour(prev)
            && !is_variable_neighbour(next)
            && !(matches!(c, 'f' | 'g' | 'h') && next == Some('('));
        if standalone {
            out.push('$');
            out.push(c);
            out.push('$');
        } else {
            out.push(c);
        }
    }
    out
}

// ── Lines ────────────────────────────────────────────────────────────────────

fn join_lines(markup: &str) -> String {
    let lines: Vec<&str> = markup.split('\n').map(str::trim_end).collect();
    let Some(first) = lines.iter().position(|l| !l.is_empty()) else {
        return String::new();
    };
    let last = lines.iter().rposition(|l| !l.is_empty()).unwrap_or(first);

    lines[first..=last]
        .iter()
        .map(|l| if l.is_empty() { "\\mbox{}" } else { l })
        .collect::<Vec<_>>()
        .join("\\\\\n")
}
