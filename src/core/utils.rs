use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Longest `actual` text embedded in a mismatch rationale
const MAX_DESCRIBED_CHARS: usize = 128;

fn ansi_pattern() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("ANSI escape pattern is valid")
    })
}

/// Remove terminal color/style escape sequences
pub fn strip_ansi(text: &str) -> String {
    ansi_pattern().replace_all(text, "").into_owned()
}

/// Keep at most `max_lines` lines, taking the head and the tail when longer
pub fn truncate_lines(text: &str, max_lines: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return lines.into_iter().map(str::to_string).collect();
    }

    let half = max_lines / 2;
    lines[..half]
        .iter()
        .chain(lines[lines.len() - half..].iter())
        .map(|line| line.to_string())
        .collect()
}

/// Shorten text for inclusion in a one-line rationale
pub fn abbreviate(text: &str) -> String {
    if text.chars().count() <= MAX_DESCRIBED_CHARS {
        return text.to_string();
    }
    let mut short: String = text.chars().take(MAX_DESCRIBED_CHARS).collect();
    short.push_str("...");
    short
}

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
