//! Cleanup of raw PDF text before it is sent to the model.

use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Lines shorter than this (after trimming) are layout noise.
const MIN_LINE_CHARS: usize = 3;

/// Collapse blank-line runs and drop short lines and bare page numbers.
pub fn clean_text(text: &str) -> String {
    let collapsed = BLANK_RUNS.replace_all(text, "\n\n");
    collapsed
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= MIN_LINE_CHARS)
        .filter(|line| !line.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join page texts and clean the result.
pub fn join_pages(pages: &[String]) -> String {
    clean_text(&pages.concat())
}

/// Whether a title is predominantly written in Latin letters
/// (more than 70% of its alphabetic characters are ASCII).
pub fn is_english_title(title: &str) -> bool {
    let total = title.chars().filter(|c| c.is_alphabetic()).count();
    if total == 0 {
        return false;
    }
    let ascii = title
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .count();
    ascii as f64 / total as f64 > 0.7
}

/// First `max_chars` characters of `s`, respecting char boundaries.
pub fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
