//! Placeholder vault: hold substrings aside while a pass rewrites the rest.
//!
//! Instead of swapping protected substrings for sentinel tokens inside one
//! string, [`Protected`] keeps the text as a list of segments: plain text that
//! passes may rewrite, and held spans that they never see. Because a held span
//! is never spelled out as text, no input can collide with it, and
//! [`Protected::restore`] is an exact concatenation.
//!
//! Layers nest: [`Protected::protect_more`] holds additional matches found in
//! the remaining text, and a single `restore()` unwinds every layer.

use regex::{Captures, Regex};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Held(String),
}

/// Text split into rewritable segments and held spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    segments: Vec<Segment>,
}

impl Protected {
    /// Hold every non-overlapping match of `pattern`, in match order.
    pub fn protect(text: &str, pattern: &Regex) -> Self {
        Self::protect_with(text, pattern, |_| true)
    }

    /// Hold only the matches of `pattern` that `keep` accepts.
    pub fn protect_with(text: &str, pattern: &Regex, keep: impl Fn(&Captures<'_>) -> bool) -> Self {
        Self {
            segments: split(text, pattern, &keep),
        }
    }

    /// Wrap text without holding anything.
    pub fn plain(text: &str) -> Self {
        Self {
            segments: vec![Segment::Text(text.to_string())],
        }
    }

    /// Hold further matches found in the text segments (a nested layer).
    pub fn protect_more(self, pattern: &Regex) -> Self {
        self.protect_more_with(pattern, |_| true)
    }

    /// Like [`Protected::protect_more`], filtered by `keep`.
    pub fn protect_more_with(self, pattern: &Regex, keep: impl Fn(&Captures<'_>) -> bool) -> Self {
        let segments = self
            .segments
            .into_iter()
            .flat_map(|seg| match seg {
                Segment::Text(t) => split(&t, pattern, &keep),
                held => vec![held],
            })
            .collect();
        Self { segments }
    }

    /// Rewrite every text segment.
    pub fn map_text(self, mut f: impl FnMut(&str) -> String) -> Self {
        let segments = self
            .segments
            .into_iter()
            .map(|seg| match seg {
                Segment::Text(t) => Segment::Text(f(&t)),
                held => held,
            })
            .collect();
        Self { segments }
    }

    /// Rewrite every held span in place.
    pub fn map_held(self, mut f: impl FnMut(&str) -> String) -> Self {
        let segments = self
            .segments
            .into_iter()
            .map(|seg| match seg {
                Segment::Held(h) => Segment::Held(f(&h)),
                text => text,
            })
            .collect();
        Self { segments }
    }

    /// Number of held spans.
    pub fn held_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Held(_)))
            .count()
    }

    /// Held spans in order.
    pub fn held(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Held(h) => Some(h.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Reassemble the full text.
    pub fn restore(self) -> String {
        let mut out = String::new();
        for seg in self.segments {
            match seg {
                Segment::Text(t) | Segment::Held(t) => out.push_str(&t),
            }
        }
        out
    }
}

fn split(text: &str, pattern: &Regex, keep: &dyn Fn(&Captures<'_>) -> bool) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in pattern.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if m.as_str().is_empty() || !keep(&caps) {
            continue;
        }
        if m.start() > last {
            segments.push(Segment::Text(text[last..m.start()].to_string()));
        }
        segments.push(Segment::Held(m.as_str().to_string()));
        last = m.end();
    }
    if last < text.len() || segments.is_empty() {
        segments.push(Segment::Text(text[last..].to_string()));
    }
    segments
}
