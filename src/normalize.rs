//! Text normalization for scraped and transcribed content.
//!
//! Both functions are total: any input, including the empty string, yields a
//! cleaned string, and cleaning is idempotent.

use regex::Regex;
use std::sync::LazyLock;

static INLINE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("Invalid regex"));

static NEWLINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?\n[\s]*").expect("Invalid regex"));

// [00:01:23], [01:23], (01:23), (00:01:23), optionally with milliseconds.
static TIMESTAMPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\[(]\d{1,2}:\d{2}(?::\d{2})?(?:[.,]\d{1,3})?[\])]").expect("Invalid regex")
});

// "Speaker 2:", "SPEAKER_1:", "Jane:", "Jane Doe:" at the start of a line.
static SPEAKER_LABELS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[^\S\n]*(?:(?i:speaker)[ _]?\d+|[A-Z][\w'.-]*(?:[ ][A-Z][\w'.-]*){0,2})[^\S\n]*:[^\S\n]*",
    )
    .expect("Invalid regex")
});

/// Clean raw text.
///
/// Strips carriage returns, collapses runs of spaces and tabs to one space,
/// collapses runs of newlines to one newline, and trims both ends.
pub fn clean(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let without_cr = text.replace('\r', "");
    let spaced = INLINE_WHITESPACE.replace_all(&without_cr, " ");
    let lined = NEWLINE_RUNS.replace_all(&spaced, "\n");
    lined.trim().to_string()
}

/// Clean a transcript.
///
/// Removes timestamp markers and leading speaker labels before applying [`clean`].
pub fn clean_transcript(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let without_cr = text.replace('\r', "");
    let without_timestamps = TIMESTAMPS.replace_all(&without_cr, " ");
    // Timestamps usually precede the label, so drop them first and clean the
    // leading whitespace they leave behind.
    let realigned = clean(&without_timestamps);
    let without_speakers = SPEAKER_LABELS.replace_all(&realigned, "");
    clean(&without_speakers)
}

/// Approximate token count using the 4-characters-per-token heuristic.
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
