//! Scores a fresh typing sample against an enrolled pattern.
//!
//! Four signals feed the confidence score:
//!
//! * length similarity of the keystroke sequences, which also acts as a
//!   hard gate: samples that differ too much in length are rejected before
//!   anything else is computed,
//! * normalized Levenshtein similarity of the typed phrases,
//! * timing similarity of index-aligned inter-key intervals,
//! * positional agreement of the tempo hashes.
//!
//! The comparison is pure and never mutates its inputs. It is symmetric in
//! everything except float summation order.

use crate::error::KeyprintError;
use crate::pattern::TypingPattern;
use serde::{Deserialize, Serialize};

/// Below this the samples are rejected on length alone.
pub const LENGTH_GATE: f64 = 0.6;
/// Confidence at which the comparator itself calls a match.
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Fewest aligned intervals needed for a timing score.
pub const MIN_ALIGNED_INTERVALS: usize = 5;
/// Mean absolute interval difference that drives the timing score to zero.
pub const TIMING_TOLERANCE_MS: f64 = 300.0;
/// Per-interval difference counted as significant.
pub const SIGNIFICANT_DIFF_MS: u64 = 200;

const TIMING_WEIGHT: f64 = 0.5;
const HASH_WEIGHT: f64 = 0.3;
const TEXT_WEIGHT: f64 = 0.1;
const LENGTH_WEIGHT: f64 = 0.1;

const MATCH_MESSAGE: &str = "Pattern matches successfully";
const NO_MATCH_MESSAGE: &str = "Typing pattern does not match. Please try typing more consistently.";
const LENGTH_MESSAGE: &str = "Typing patterns are too different in length";

/// The individual signals behind a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub length_similarity: f64,
    pub text_similarity: f64,
    pub timing_score: f64,
    pub hash_score: f64,
}

impl ScoreBreakdown {
    pub fn confidence(&self) -> f64 {
        let combined = TIMING_WEIGHT * self.timing_score
            + HASH_WEIGHT * self.hash_score
            + TEXT_WEIGHT * self.text_similarity
            + LENGTH_WEIGHT * self.length_similarity;
        combined.min(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub is_match: bool,
    pub score: f64,
    pub confidence: f64,
    pub message: String,
    /// `None` when the length gate rejected the sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

impl MatchResult {
    /// The rejection error for a non-match, distinguishing the length gate from a low score.
    pub fn rejection(&self) -> Option<KeyprintError> {
        if self.is_match {
            return None;
        }
        Some(match self.breakdown {
            None => KeyprintError::LengthMismatch { score: self.score },
            Some(_) => KeyprintError::LowConfidence { score: self.score },
        })
    }

    pub fn was_length_gated(&self) -> bool {
        self.breakdown.is_none()
    }
}

pub fn compare_patterns(reference: &TypingPattern, candidate: &TypingPattern) -> MatchResult {
    let length_similarity =
        length_similarity(reference.keystrokes.len(), candidate.keystrokes.len());

    if length_similarity < LENGTH_GATE {
        tracing::debug!(
            reference_len = reference.keystrokes.len(),
            candidate_len = candidate.keystrokes.len(),
            length_similarity,
            "pattern lengths too different"
        );
        return MatchResult {
            is_match: false,
            score: length_similarity,
            confidence: length_similarity,
            message: LENGTH_MESSAGE.to_string(),
            breakdown: None,
        };
    }

    let breakdown = ScoreBreakdown {
        length_similarity,
        text_similarity: text_similarity(&reference.text, &candidate.text),
        timing_score: timing_similarity(&reference.intervals, &candidate.intervals),
        hash_score: hash_similarity(&reference.pattern_hash, &candidate.pattern_hash),
    };
    let confidence = breakdown.confidence();
    let is_match = confidence >= MATCH_THRESHOLD;

    tracing::debug!(
        length = breakdown.length_similarity,
        text = breakdown.text_similarity,
        timing = breakdown.timing_score,
        hash = breakdown.hash_score,
        confidence,
        is_match,
        "compared typing patterns"
    );

    MatchResult {
        is_match,
        score: confidence,
        confidence,
        message: if is_match { MATCH_MESSAGE } else { NO_MATCH_MESSAGE }.to_string(),
        breakdown: Some(breakdown),
    }
}

/// `1 - |a - b| / mean(a, b)`, floored at zero.
pub fn length_similarity(a: usize, b: usize) -> f64 {
    let avg = (a + b) as f64 / 2.0;
    if avg == 0.0 {
        return 1.0;
    }
    (1.0 - a.abs_diff(b) as f64 / avg).max(0.0)
}

/// Normalized edit-distance similarity; two empty strings are identical.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    (longest - levenshtein(a, b)) as f64 / longest as f64
}

/// Edit distance over chars with unit-cost insert, delete and substitute.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Compare index-aligned intervals over the shorter sequence.
pub fn timing_similarity(a: &[u64], b: &[u64]) -> f64 {
    let n = a.len().min(b.len());
    if n < MIN_ALIGNED_INTERVALS {
        return 0.0;
    }

    let (total, significant) = a
        .iter()
        .zip(b)
        .fold((0f64, 0usize), |(total, significant), (x, y)| {
            let diff = x.abs_diff(*y);
            // summed as f64 so client-supplied timestamps cannot overflow
            (
                total + diff as f64,
                significant + usize::from(diff > SIGNIFICANT_DIFF_MS),
            )
        });

    let avg_diff = total / n as f64;
    let penalty = (1.0 - significant as f64 / n as f64).max(0.0);
    let base = (1.0 - avg_diff / TIMING_TOLERANCE_MS).max(0.0);
    base * penalty
}

/// Fraction of positions where the tempo hashes agree, over the shorter hash.
pub fn hash_similarity(a: &str, b: &str) -> f64 {
    let n = a.chars().count().min(b.chars().count());
    if n == 0 {
        return 0.0;
    }
    let matches = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    matches as f64 / n as f64
}
