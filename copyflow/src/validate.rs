//! Structural comparison of a rewritten document against its reference.
//!
//! Four independent checks run on every call and every failure is reported.
//! The validator never decides what to do with a failure; the caller does.

use crate::markup::{tokenize, Segment};
use serde::{Deserialize, Serialize};

/// Stands in for every text segment in a skeleton.
pub const SKELETON_PLACEHOLDER: char = '\u{FFFC}';

/// Characters of context shown on each side of a skeleton mismatch.
const MISMATCH_WINDOW: usize = 40;

/// Result of a structural validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when every check passed.
    pub valid: bool,
    /// One diagnostic per failed check.
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Comment/tag structure with each text segment collapsed to one placeholder.
#[must_use]
pub fn skeleton(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if segment.is_text() {
            out.push(SKELETON_PLACEHOLDER);
        } else {
            out.push_str(&segment.raw);
        }
    }
    out
}

/// Re-tokenizes `rewritten` and compares it against `reference` segments.
#[must_use]
pub fn validate(reference: &[Segment], rewritten: &str) -> ValidationResult {
    let candidate = tokenize(rewritten);
    let mut errors = Vec::new();

    if let Some(error) = check_skeleton(reference, &candidate) {
        errors.push(error);
    }
    if let Some(error) = check_sequence("Block comment", reference, &candidate, Segment::is_comment) {
        errors.push(error);
    }
    if let Some(error) = check_sequence("Tag", reference, &candidate, Segment::is_tag) {
        errors.push(error);
    }

    let reference_count = reference.iter().filter(|s| !s.is_text()).count();
    let candidate_count = candidate.iter().filter(|s| !s.is_text()).count();
    if reference_count != candidate_count {
        errors.push(format!(
            "Non-text segment count changed: {reference_count} -> {candidate_count}"
        ));
    }

    ValidationResult::from_errors(errors)
}

fn check_skeleton(reference: &[Segment], candidate: &[Segment]) -> Option<String> {
    let expected: Vec<char> = skeleton(reference).chars().collect();
    let actual: Vec<char> = skeleton(candidate).chars().collect();
    if expected == actual {
        return None;
    }
    let index = expected
        .iter()
        .zip(actual.iter())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| expected.len().min(actual.len()));
    Some(format!(
        "Skeleton mismatch at char {index}: expected {:?}, found {:?}",
        window(&expected, index),
        window(&actual, index)
    ))
}

fn window(chars: &[char], index: usize) -> String {
    let start = index.saturating_sub(MISMATCH_WINDOW);
    let end = (index + MISMATCH_WINDOW).min(chars.len());
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect()
}

fn check_sequence(
    label: &str,
    reference: &[Segment],
    candidate: &[Segment],
    keep: fn(&Segment) -> bool,
) -> Option<String> {
    let expected: Vec<&str> = reference.iter().filter(|s| keep(s)).map(|s| s.raw.as_str()).collect();
    let actual: Vec<&str> = candidate.iter().filter(|s| keep(s)).map(|s| s.raw.as_str()).collect();
    if expected.len() != actual.len() {
        return Some(format!(
            "{label} count changed: {} -> {}",
            expected.len(),
            actual.len()
        ));
    }
    let (position, (before, after)) = expected
        .iter()
        .zip(actual.iter())
        .enumerate()
        .find(|(_, (a, b))| a != b)?;
    Some(format!("{label} #{position} changed: {before:?} -> {after:?}"))
}
