//! Standalone LaTeX document wrapping one cell body.

/// Wrap `body` in a `standalone` document sized to its content.
///
/// `font` names a system font for `fontspec`; `font_size` (e.g. `"12pt"`) is
/// passed as a class option when given. `\d` is redefined as
/// `\displaystyle`, which the math normaliser relies on for any `\d` it
/// leaves in place.
pub fn standalone(body: &str, font: &str, font_size: Option<&str>) -> String {
    let class_options = match font_size {
        Some(size) if !size.trim().is_empty() => format!("border=10pt,{}", size.trim()),
        _ => "border=10pt".to_string(),
    };

    format!(
        r"\documentclass[{class_options}]{{standalone}}
\usepackage{{amsmath}}
\usepackage{{amssymb}}
\usepackage{{graphicx}}
\usepackage{{fontspec}}
\usepackage{{varwidth}}
\usepackage[legacycolonsymbols]{{mathtools}}
\setmainfont{{{font}}}
\renewcommand{{\d}}{{\displaystyle}}
\begin{{document}}
\begin{{varwidth}}{{\textwidth}}
{body}
\end{{varwidth}}
\end{{document}}
"
    )
}
