use crate::error::{KeyprintError, Result, Shortfall};
use crate::keystroke::KeystrokeEvent;
use crate::util::{mean, population_variance};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Fewest keystrokes a pattern can be built from.
pub const MIN_KEYSTROKES: usize = 10;

/// Intervals below this are `Fast`.
pub const FAST_BELOW_MS: u64 = 150;
/// Intervals below this (and not fast) are `Medium`; the rest are `Slow`.
pub const MEDIUM_BELOW_MS: u64 = 400;

/// Coarse bucket for one inter-key interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Tempo {
    Fast,
    Medium,
    Slow,
}

impl Tempo {
    pub fn classify(interval_ms: u64) -> Self {
        if interval_ms < FAST_BELOW_MS {
            Tempo::Fast
        } else if interval_ms < MEDIUM_BELOW_MS {
            Tempo::Medium
        } else {
            Tempo::Slow
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Tempo::Fast => 'F',
            Tempo::Medium => 'M',
            Tempo::Slow => 'S',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'F' => Some(Tempo::Fast),
            'M' => Some(Tempo::Medium),
            'S' => Some(Tempo::Slow),
            _ => None,
        }
    }
}

/// Timing fingerprint derived from one typing session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPattern {
    pub keystrokes: Vec<KeystrokeEvent>,
    pub text: String,
    pub intervals: Vec<u64>,
    pub average_interval: f64,
    pub interval_variance: f64,
    pub pattern_hash: String,
}

impl TypingPattern {
    pub fn tempo_profile(&self) -> impl Iterator<Item = Tempo> + '_ {
        self.pattern_hash.chars().filter_map(Tempo::from_symbol)
    }
}

/// Build a pattern from keystrokes in capture order and the phrase that was typed.
pub fn generate_pattern(keystrokes: &[KeystrokeEvent], text: &str) -> Result<TypingPattern> {
    if keystrokes.len() < MIN_KEYSTROKES {
        return Err(KeyprintError::InsufficientData(Shortfall::Keystrokes {
            found: keystrokes.len(),
            required: MIN_KEYSTROKES,
        }));
    }

    // Ties are zero-length; out-of-order timestamps never go negative
    let intervals: Vec<u64> = keystrokes
        .iter()
        .tuple_windows()
        .map(|(prev, next)| {
            next.timestamp_offset_ms
                .saturating_sub(prev.timestamp_offset_ms)
        })
        .collect();

    let as_f64: Vec<f64> = intervals.iter().map(|&i| i as f64).collect();
    let average_interval = mean(&as_f64).unwrap_or(0.0);
    let interval_variance = population_variance(&as_f64).unwrap_or(0.0);

    let pattern_hash: String = intervals
        .iter()
        .map(|&i| Tempo::classify(i).symbol())
        .collect();

    Ok(TypingPattern {
        keystrokes: keystrokes.to_vec(),
        text: text.to_string(),
        intervals,
        average_interval,
        interval_variance,
        pattern_hash,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Keystrokes whose inter-key gaps are exactly `intervals`, starting at offset 0.
    pub(crate) fn keystrokes_with_intervals(intervals: &[u64]) -> Vec<KeystrokeEvent> {
        let mut t = 0;
        let mut out = vec![KeystrokeEvent::new("a", 0, 65)];
        for (i, gap) in intervals.iter().enumerate() {
            t += gap;
            let c = (b'a' + ((i + 1) % 26) as u8) as char;
            out.push(KeystrokeEvent::new(
                c.to_string(),
                t,
                c.to_ascii_uppercase() as i32,
            ));
        }
        out
    }

    #[test]
    fn test_tempo_boundaries() {
        assert_eq!(Tempo::classify(0), Tempo::Fast);
        assert_eq!(Tempo::classify(149), Tempo::Fast);
        assert_eq!(Tempo::classify(150), Tempo::Medium);
        assert_eq!(Tempo::classify(399), Tempo::Medium);
        assert_eq!(Tempo::classify(400), Tempo::Slow);
        assert_eq!(Tempo::Slow.to_string(), "Slow");
    }

    #[test]
    fn test_rejects_fewer_than_ten_keystrokes() {
        let keys = keystrokes_with_intervals(&[100; 8]);
        assert_eq!(keys.len(), 9);
        assert_matches!(
            generate_pattern(&keys, "abcdefghi"),
            Err(KeyprintError::InsufficientData(Shortfall::Keystrokes {
                found: 9,
                required: 10
            }))
        );
    }

    #[test]
    fn test_generate_intervals_and_stats() {
        let keys = keystrokes_with_intervals(&[100, 200, 100, 200, 100, 200, 100, 200, 500]);
        let p = generate_pattern(&keys, "abcdefghij").unwrap();

        assert_eq!(p.intervals, vec![100, 200, 100, 200, 100, 200, 100, 200, 500]);
        assert_eq!(p.average_interval, 200.0);
        // deviations: 4 x 100^2 + 4 x 0 + 300^2, over 9
        assert_eq!(p.interval_variance, (4.0 * 10_000.0 + 90_000.0) / 9.0);
        assert_eq!(p.pattern_hash, "FMFMFMFMS");
        assert_eq!(p.keystrokes, keys);
        assert_eq!(p.text, "abcdefghij");
    }

    #[test]
    fn test_hash_length_matches_intervals() {
        let keys = keystrokes_with_intervals(&[150, 250, 150, 250, 150, 250, 150, 250, 150, 250, 150]);
        let p = generate_pattern(&keys, "hello world!").unwrap();
        assert_eq!(p.intervals.len(), keys.len() - 1);
        assert_eq!(p.pattern_hash.len(), p.intervals.len());
        assert!(p.tempo_profile().all(|t| t == Tempo::Medium));
    }

    #[test]
    fn test_ties_and_backwards_timestamps() {
        let mut keys = keystrokes_with_intervals(&[0, 0, 120, 0, 80, 0, 0, 300, 0]);
        keys[5].timestamp_offset_ms = 10;
        let p = generate_pattern(&keys, "abcdefghij").unwrap();
        assert_eq!(p.intervals[4], 0);
        assert!(p.intervals.iter().all(|&i| i <= 500));
    }

    #[test]
    fn test_deterministic() {
        let keys = keystrokes_with_intervals(&[90, 180, 420, 130, 260, 75, 310, 145, 500, 220]);
        let a = generate_pattern(&keys, "correct horse").unwrap();
        let b = generate_pattern(&keys, "correct horse").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.average_interval.to_bits(), b.average_interval.to_bits());
        assert_eq!(a.interval_variance.to_bits(), b.interval_variance.to_bits());
    }

    #[test]
    fn test_pattern_json_is_camel_case() {
        let keys = keystrokes_with_intervals(&[100; 9]);
        let p = generate_pattern(&keys, "abcdefghij").unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("averageInterval").is_some());
        assert!(json.get("intervalVariance").is_some());
        assert_eq!(json["patternHash"], "FFFFFFFFF");
        let back: TypingPattern = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
