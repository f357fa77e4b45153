//! Post-hoc check of the Hindi line / English line layout.
//!
//! The model is asked to put every Hindi sentence on its own line with the
//! plain English translation on the very next line. Nothing forces it to, so
//! callers that need the layout guaranteed can run the notes through
//! [`check_line_pairs`] and reject or retry on violations.

use crate::error::{NotesError, Result};
use serde::Serialize;

/// Outcome of checking a set of notes for line pairing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatReport {
    /// Lines containing Devanagari text.
    pub hindi_lines: usize,
    /// Hindi lines followed by an English line.
    pub pairs: usize,
    /// 1-based line numbers of Hindi lines with no English line after them.
    pub unpaired: Vec<usize>,
    /// 1-based line numbers of English translations wrapped in parentheses.
    pub parenthesized: Vec<usize>,
}

impl FormatReport {
    /// True if every Hindi line is paired with a plain English line.
    pub fn is_clean(&self) -> bool {
        self.unpaired.is_empty() && self.parenthesized.is_empty()
    }

    /// One-line description of what is wrong, empty if clean.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.unpaired.is_empty() {
            parts.push(format!(
                "{} Hindi line(s) without a translation (lines {})",
                self.unpaired.len(),
                join_line_numbers(&self.unpaired)
            ));
        }
        if !self.parenthesized.is_empty() {
            parts.push(format!(
                "{} translation(s) in parentheses (lines {})",
                self.parenthesized.len(),
                join_line_numbers(&self.parenthesized)
            ));
        }
        parts.join("; ")
    }
}

fn join_line_numbers(lines: &[usize]) -> String {
    lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

fn is_hindi_line(line: &str) -> bool {
    line.chars().any(is_devanagari)
}

fn is_english_line(line: &str) -> bool {
    !is_hindi_line(line) && line.chars().any(|c| c.is_ascii_alphabetic())
}

/// Strips markdown and emoji decoration around the text of a line.
fn strip_decoration(line: &str) -> &str {
    line.trim_matches(|c: char| !c.is_alphanumeric() && c != '(' && c != ')')
}

/// Headers introduce a section; they never translate the line above.
fn is_translation_line(line: &str) -> bool {
    !line.starts_with('#') && is_english_line(line)
}

/// True when the whole line sits inside one pair of parentheses.
fn is_parenthesized(line: &str) -> bool {
    let text = strip_decoration(line);
    if !text.starts_with('(') {
        return false;
    }

    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + c.len_utf8() == text.len();
                }
            }
            _ => {}
        }
    }
    false
}

/// Checks that every Hindi line is followed by a plain English line.
///
/// Blank lines are skipped when looking for the translation.
pub fn check_line_pairs(text: &str) -> FormatReport {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    let mut report = FormatReport::default();
    for (idx, (number, line)) in lines.iter().enumerate() {
        if !is_hindi_line(line) {
            continue;
        }
        report.hindi_lines += 1;

        match lines.get(idx + 1) {
            Some((next_number, next)) if is_translation_line(next) => {
                report.pairs += 1;
                if is_parenthesized(next) {
                    report.parenthesized.push(*next_number);
                }
            }
            _ => report.unpaired.push(*number),
        }
    }
    report
}

/// Like [`check_line_pairs`], but fails with [`NotesError::FormatViolation`]
/// when the layout is broken.
pub fn enforce_line_pairs(text: &str) -> Result<FormatReport> {
    let report = check_line_pairs(text);
    if report.is_clean() {
        Ok(report)
    } else {
        Err(NotesError::FormatViolation(report.summary()))
    }
}
