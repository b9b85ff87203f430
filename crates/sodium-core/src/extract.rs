//! Narrowing and pattern extraction.
//!
//! Diagnostic dumps such as `dumpsys audio` contain many candidate lines
//! (every stream prints its own `Max:`), so a strategy first narrows the
//! raw output to the relevant section and only then applies its pattern.
//!
//! Extraction never fails: a non-matching input, an uncompilable pattern and
//! a capture group that does not exist all yield `None`.

use regex::Regex;
use std::borrow::Cow;
use tracing::warn;

/// Reduction of raw output to the section a pattern should see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Narrowing {
    /// Use the full output.
    #[default]
    Whole,
    /// Keep every line containing any of `needles`, plus the `after` lines
    /// that follow it (the behavior of `grep -A`).
    Lines { needles: Vec<String>, after: usize },
}

impl Narrowing {
    /// Lines containing `needle`.
    pub fn lines_containing(needle: impl Into<String>) -> Self {
        Narrowing::Lines {
            needles: vec![needle.into()],
            after: 0,
        }
    }

    /// Lines containing any of `needles`.
    pub fn lines_containing_any<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Narrowing::Lines {
            needles: needles.into_iter().map(Into::into).collect(),
            after: 0,
        }
    }

    /// Also keep `count` lines of trailing context after each hit.
    pub fn with_after(self, count: usize) -> Self {
        match self {
            Narrowing::Whole => Narrowing::Whole,
            Narrowing::Lines { needles, .. } => Narrowing::Lines {
                needles,
                after: count,
            },
        }
    }

    /// Apply the narrowing. Kept lines are each terminated by `\n`.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let (needles, after) = match self {
            Narrowing::Whole => return Cow::Borrowed(text),
            Narrowing::Lines { needles, after } => (needles, *after),
        };

        let mut out = String::new();
        let mut remaining_context = 0usize;
        for line in text.lines() {
            if needles.iter().any(|needle| line.contains(needle.as_str())) {
                remaining_context = after;
            } else if remaining_context > 0 {
                remaining_context -= 1;
            } else {
                continue;
            }
            out.push_str(line);
            out.push('\n');
        }
        Cow::Owned(out)
    }
}

/// Which capture group of a pattern carries the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    Index(usize),
    Name(String),
}

/// A regular expression with one authoritative capture group.
#[derive(Debug, Clone)]
pub struct ExtractionPattern {
    source: String,
    regex: Option<Regex>,
    group: Group,
}

impl ExtractionPattern {
    /// Pattern whose first capture group is the value.
    pub fn new(pattern: &str) -> Self {
        Self::with_group(pattern, 1)
    }

    /// Pattern whose `group`-th capture group is the value.
    pub fn with_group(pattern: &str, group: usize) -> Self {
        Self::build(pattern, Group::Index(group))
    }

    /// Pattern whose named capture group is the value.
    pub fn named(pattern: &str, name: &str) -> Self {
        Self::build(pattern, Group::Name(name.to_string()))
    }

    fn build(pattern: &str, group: Group) -> Self {
        let regex = match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern, error = %e, "extraction pattern does not compile; it will never match");
                None
            }
        };
        Self {
            source: pattern.to_string(),
            regex,
            group,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    /// Whether the pattern compiled and declares the configured group.
    pub fn is_usable(&self) -> bool {
        let Some(regex) = &self.regex else {
            return false;
        };
        match &self.group {
            Group::Index(index) => *index < regex.captures_len(),
            Group::Name(name) => regex.capture_names().flatten().any(|n| n == name),
        }
    }

    /// First match of the configured group in `text`.
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        let captures = self.regex.as_ref()?.captures(text)?;
        let m = match &self.group {
            Group::Index(index) => captures.get(*index),
            Group::Name(name) => captures.name(name),
        }?;
        Some(m.as_str())
    }
}
