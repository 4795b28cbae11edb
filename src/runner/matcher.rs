//! What an output assertion looks for

use regex::Regex;
use std::fmt;

use crate::error::CheckError;

/// Literal substring or regular expression
#[derive(Debug, Clone)]
pub enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    pub fn literal(text: impl Into<String>) -> Self {
        Matcher::Literal(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, CheckError> {
        Ok(Matcher::Regex(Regex::new(pattern)?))
    }

    /// Byte range of the first match in `haystack`
    pub fn find(&self, haystack: &str) -> Option<(usize, usize)> {
        match self {
            Matcher::Literal(text) => haystack
                .find(text.as_str())
                .map(|start| (start, start + text.len())),
            Matcher::Regex(regex) => regex.find(haystack).map(|m| (m.start(), m.end())),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Literal(text) => write!(f, "{}", text),
            Matcher::Regex(regex) => write!(f, "{}", regex.as_str()),
        }
    }
}

impl From<&str> for Matcher {
    fn from(text: &str) -> Self {
        Matcher::Literal(text.to_string())
    }
}

impl From<String> for Matcher {
    fn from(text: String) -> Self {
        Matcher::Literal(text)
    }
}

impl From<Regex> for Matcher {
    fn from(regex: Regex) -> Self {
        Matcher::Regex(regex)
    }
}

/// Pattern matching `number` exactly, not as part of a longer number
///
/// `decimal(5)` matches "5" in "got 5 coins" but not in "15" or "5.25".
pub fn decimal(number: impl fmt::Display) -> String {
    let text = number.to_string();
    let prefix = if text.starts_with('-') {
        ""
    } else {
        r"(?:^|[^\d\-])"
    };
    format!(r"{}{}(?:$|[^\d.]|\.(?:$|\D))", prefix, regex::escape(&text))
}
