//! Enrollment-time quality gate.
//!
//! A pattern is only worth storing if it looks like a human typing at a
//! natural pace. Speed and consistency are scored separately and blended
//! 60/40 into a single quality figure. The gate is never applied to
//! verification samples.

use crate::error::{KeyprintError, Result};
use crate::pattern::{TypingPattern, MIN_KEYSTROKES};
use serde::{Deserialize, Serialize};

/// Minimum blended quality for a pattern to be enrolled.
pub const QUALITY_THRESHOLD: f64 = 0.4;

const SPEED_WEIGHT: f64 = 0.6;
const CONSISTENCY_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    pub is_valid: bool,
    pub quality: f64,
    pub message: String,
}

impl QualityAssessment {
    /// Turn a failed assessment into `LowQuality`.
    pub fn into_result(self) -> Result<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(KeyprintError::LowQuality {
                quality: self.quality,
                message: self.message,
            })
        }
    }
}

/// Score the mean inter-key interval in milliseconds.
pub fn speed_score(average_interval: f64) -> f64 {
    if average_interval < 50.0 {
        // scripted or pasted
        0.3
    } else if average_interval > 1000.0 {
        0.5
    } else if (100.0..=500.0).contains(&average_interval) {
        1.0
    } else {
        0.7
    }
}

/// Score the population variance of the intervals.
pub fn consistency_score(interval_variance: f64) -> f64 {
    if interval_variance < 1000.0 {
        // suspiciously uniform
        0.8
    } else if interval_variance > 50_000.0 {
        0.4
    } else if (5000.0..=20_000.0).contains(&interval_variance) {
        1.0
    } else {
        0.7
    }
}

pub fn assess_quality(pattern: &TypingPattern) -> QualityAssessment {
    if pattern.keystrokes.len() < MIN_KEYSTROKES {
        return QualityAssessment {
            is_valid: false,
            quality: 0.0,
            message: format!("Need at least {MIN_KEYSTROKES} keystrokes for pattern analysis"),
        };
    }

    let speed = speed_score(pattern.average_interval);
    let consistency = consistency_score(pattern.interval_variance);
    let quality = SPEED_WEIGHT * speed + CONSISTENCY_WEIGHT * consistency;
    let is_valid = quality >= QUALITY_THRESHOLD;

    tracing::debug!(speed, consistency, quality, is_valid, "assessed pattern quality");

    let message = if is_valid {
        format!("Pattern quality: {:.1}%", quality * 100.0)
    } else if speed < 0.5 {
        "Please type at a more natural speed (not too fast or too slow)".to_string()
    } else if consistency < 0.5 {
        "Please type more consistently. Try to maintain a steady rhythm.".to_string()
    } else {
        "Pattern quality too low. Please try typing more naturally and consistently.".to_string()
    };

    QualityAssessment {
        is_valid,
        quality,
        message,
    }
}
