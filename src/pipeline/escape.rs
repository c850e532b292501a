//! Prose escaping: make everything outside math safe for LaTeX.
//!
//! Cell prose may contain characters that are special to LaTeX (`%` starts a
//! comment, `&` is an alignment tab) and stray backslashes. It may also
//! contain commands the author typed on purpose, such as `\alpha` or
//! `\hspace{1em}`. [`escape_prose`] holds the intentional ones, then makes a
//! single character-level pass over what remains. Because the pass emits
//! `\textbackslash{}` and the brace escapes together, no replacement is ever
//! fed back through another replacement.

use crate::config::EscapeRules;
use crate::pipeline::vault::Protected;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ── Allow-lists ──────────────────────────────────────────────────────────────

const FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "sec", "csc", "cot", "arcsin", "arccos", "arctan", "sinh", "cosh",
    "tanh", "log", "ln", "exp", "sqrt", "lim", "max", "min",
];

const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "varepsilon", "zeta", "eta", "theta",
    "vartheta", "iota", "kappa", "lambda", "mu", "nu", "xi", "pi", "varpi", "rho", "varrho",
    "sigma", "varsigma", "tau", "upsilon", "phi", "varphi", "chi", "psi", "omega", "Gamma",
    "Delta", "Theta", "Lambda", "Xi", "Pi", "Sigma", "Upsilon", "Phi", "Psi", "Omega",
];

const EXTENDED: &[&str] = &[
    // big operators
    "sum", "prod", "int", "iint", "iiint", "oint",
    // relations and arrows
    "neq", "leq", "geq", "approx", "simeq", "to", "leftarrow", "rightarrow",
    "leftrightarrow", "Rightarrow", "Leftrightarrow",
    // sets
    "in", "ni", "subset", "subseteq", "supset", "supseteq", "cup", "cap",
    // arithmetic
    "times", "div", "pm", "mp", "infty",
    // layout
    "quad", "qquad", "hspace", "vspace", "ldots", "cdots", "vdots", "ddots", "par",
    // style
    "displaystyle", "textstyle", "scriptstyle", "scriptscriptstyle", "text", "mathrm",
    "mathbb", "mathcal", "mathsf", "mathtt", "mathit", "mathbf", "boldsymbol", "vec", "hat",
    "bar", "d",
];

/// Whether `\word` is kept verbatim in prose under `rules`.
pub fn is_known_command(word: &str, rules: EscapeRules) -> bool {
    FUNCTIONS.contains(&word)
        || GREEK.contains(&word)
        || (rules == EscapeRules::Extended && EXTENDED.contains(&word))
}

// ── Holding ──────────────────────────────────────────────────────────────────

static RE_ESCAPED_SPECIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[%&#_{}$]").unwrap());

// A known command keeps its first brace argument, so `\hspace{1em}` survives
// whole instead of having its braces escaped.
static RE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\([A-Za-z]+)(?:\{[^{}]*\})?").unwrap());

/// Escape every text segment of `prose`, leaving held spans and intentional
/// markup untouched.
pub fn escape_prose(prose: Protected, rules: EscapeRules) -> Protected {
    prose
        .protect_more(&RE_ESCAPED_SPECIAL)
        .protect_more_with(&RE_COMMAND, |caps: &Captures<'_>| {
            is_known_command(&caps[1], rules)
        })
        .map_text(escape_chars)
}

/// Escape a plain string with nothing held.
pub fn escape_text(text: &str, rules: EscapeRules) -> String {
    escape_prose(Protected::plain(text), rules).restore()
}

fn escape_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' => out.push_str("\\&"),
            '%' => out.push_str("\\%"),
            '#' => out.push_str("\\#"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '_' => out.push_str("\\_"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            c => out.push(c),
        }
    }
    out
}

// ── Relation unification ─────────────────────────────────────────────────────

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([A-Za-z]+)").unwrap());

/// Replace the prose commands `\le`, `\ge` and `\neq` by the characters they
/// stand for. Only whole command words match, so `\leq` and `\left` stay.
pub fn unify_relations(text: &str) -> String {
    RE_WORD
        .replace_all(text, |caps: &Captures<'_>| match &caps[1] {
            "le" => "<".to_string(),
            "ge" => ">".to_string(),
            "neq" => "≠".to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(s: &str) -> String {
        escape_text(s, EscapeRules::Extended)
    }

    #[test]
    fn specials_escaped() {
        assert_eq!(ext("50% & #1"), "50\\% \\& \\#1");
        assert_eq!(ext("a_b ~c^d"), "a\\_b \\textasciitilde{}c\\textasciicircum{}d");
        assert_eq!(ext("{x}"), "\\{x\\}");
    }

    #[test]
    fn stray_backslash_not_double_escaped() {
        assert_eq!(ext("C:\\path"), "C:\\textbackslash{}path");
        assert_eq!(ext("\\"), "\\textbackslash{}");
    }

    #[test]
    fn author_escapes_kept() {
        assert_eq!(ext("100\\% sure"), "100\\% sure");
        assert_eq!(ext("\\{a\\}"), "\\{a\\}");
    }

    #[test]
    fn known_commands_kept() {
        assert_eq!(ext("angle \\alpha"), "angle \\alpha");
        assert_eq!(ext("a\\hspace{1em}b"), "a\\hspace{1em}b");
        assert_eq!(ext("\\text{x_1}"), "\\text{x_1}");
    }

    #[test]
    fn basic_rules_use_short_list() {
        assert_eq!(escape_text("\\alpha", EscapeRules::Basic), "\\alpha");
        assert_eq!(
            escape_text("\\quad", EscapeRules::Basic),
            "\\textbackslash{}quad"
        );
        assert_eq!(ext("\\quad"), "\\quad");
    }

    #[test]
    fn held_math_untouched() {
        let re = Regex::new(r"\$[^$]+\$").unwrap();
        let out = escape_prose(Protected::protect("x_1 is $x_1$", &re), EscapeRules::Extended)
            .restore();
        assert_eq!(out, "x\\_1 is $x_1$");
    }

    #[test]
    fn relations_unified_whole_word() {
        assert_eq!(unify_relations("a \\le b \\ge c \\neq d"), "a < b > c ≠ d");
        assert_eq!(unify_relations("\\leq \\left \\geq"), "\\leq \\left \\geq");
        assert_eq!(unify_relations("\\le1"), "<1");
    }
}
