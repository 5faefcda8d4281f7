//! Login-time acceptance policy with a bounded retry budget.
//!
//! The coordinator itself is stateless: each call recomputes the remaining
//! budget from the attempt number it is given. [`AttemptLedger`] lets the
//! login boundary keep its own count per login transaction so a client
//! cannot reset the budget by resubmitting a lower attempt number.

use crate::compare::{compare_patterns, MatchResult};
use crate::config::{DEFAULT_ACCEPTANCE_THRESHOLD, DEFAULT_MAX_RETRIES};
use crate::error::KeyprintError;
use crate::pattern::TypingPattern;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationAttemptState {
    pub attempt_number: u32,
    pub max_retries: u32,
}

impl VerificationAttemptState {
    pub fn new(attempt_number: u32, max_retries: u32) -> Self {
        Self {
            attempt_number,
            max_retries,
        }
    }

    /// Attempts remaining after this one; negative once the budget is spent.
    pub fn attempts_left(&self) -> i64 {
        i64::from(self.max_retries) - (i64::from(self.attempt_number) + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum VerificationOutcome {
    /// No typing sample; login proceeds on credentials alone.
    NoSample,
    Accepted {
        score: f64,
    },
    #[serde(rename_all = "camelCase")]
    RetryOffered {
        score: f64,
        attempt_number: u32,
        attempts_left: i64,
    },
    #[serde(rename_all = "camelCase")]
    Exhausted {
        score: f64,
        attempts_left: i64,
    },
}

impl VerificationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            VerificationOutcome::NoSample | VerificationOutcome::Accepted { .. }
        )
    }

    pub fn can_retry(&self) -> bool {
        matches!(self, VerificationOutcome::RetryOffered { .. })
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            VerificationOutcome::NoSample => None,
            VerificationOutcome::Accepted { score }
            | VerificationOutcome::RetryOffered { score, .. }
            | VerificationOutcome::Exhausted { score, .. } => Some(*score),
        }
    }

    pub fn attempts_left(&self) -> Option<i64> {
        match self {
            VerificationOutcome::RetryOffered { attempts_left, .. }
            | VerificationOutcome::Exhausted { attempts_left, .. } => Some(*attempts_left),
            _ => None,
        }
    }

    /// `RetryBudgetExhausted` for a spent budget, otherwise `None`.
    pub fn into_error(self) -> Option<KeyprintError> {
        match self {
            VerificationOutcome::Exhausted { score, .. } => {
                Some(KeyprintError::RetryBudgetExhausted { score })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationCoordinator {
    pub acceptance_threshold: f64,
    pub max_retries: u32,
}

impl Default for VerificationCoordinator {
    fn default() -> Self {
        Self {
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl VerificationCoordinator {
    pub fn new(acceptance_threshold: f64, max_retries: u32) -> Self {
        Self {
            acceptance_threshold,
            max_retries,
        }
    }

    /// Compare the candidate (if any) against the enrolled reference and decide.
    pub fn evaluate(
        &self,
        reference: &TypingPattern,
        candidate: Option<&TypingPattern>,
        attempt_number: u32,
    ) -> VerificationOutcome {
        match candidate {
            None => VerificationOutcome::NoSample,
            Some(candidate) => {
                let result = compare_patterns(reference, candidate);
                self.decide(&result, attempt_number)
            }
        }
    }

    /// Apply the acceptance threshold and retry budget to a comparison.
    pub fn decide(&self, result: &MatchResult, attempt_number: u32) -> VerificationOutcome {
        if result.is_match && result.score >= self.acceptance_threshold {
            return VerificationOutcome::Accepted {
                score: result.score,
            };
        }

        let state = VerificationAttemptState::new(attempt_number, self.max_retries);
        let attempts_left = state.attempts_left();
        if attempts_left >= 0 {
            VerificationOutcome::RetryOffered {
                score: result.score,
                attempt_number: attempt_number.saturating_add(1),
                attempts_left,
            }
        } else {
            VerificationOutcome::Exhausted {
                score: result.score,
                attempts_left,
            }
        }
    }
}

/// How long an idle login transaction keeps its rejection count.
pub const DEFAULT_LEDGER_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    rejections: u32,
    last_seen: Instant,
}

/// Server-side count of rejected attempts per login transaction.
///
/// Entries idle for longer than the ledger's ttl are forgotten, so abandoned
/// transactions do not accumulate for the life of the host. A poisoned lock
/// is recovered rather than treated as an empty ledger: losing counts would
/// hand the client a fresh budget.
#[derive(Debug)]
pub struct AttemptLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
    ttl: Duration,
}

impl Default for AttemptLedger {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_LEDGER_TTL)
    }
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &LedgerEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_seen) > self.ttl
    }

    /// Rejected attempts recorded so far for `key`.
    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts_at(key, Instant::now())
    }

    fn attempts_at(&self, key: &str, now: Instant) -> u32 {
        self.entries()
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map_or(0, |entry| entry.rejections)
    }

    /// The attempt number to score with: never lower than what the ledger has seen.
    pub fn effective_attempt(&self, key: &str, client_attempt: Option<u32>) -> u32 {
        client_attempt.unwrap_or(0).max(self.attempts(key))
    }

    pub fn record_rejection(&self, key: &str) -> u32 {
        self.record_rejection_at(key, Instant::now())
    }

    fn record_rejection_at(&self, key: &str, now: Instant) -> u32 {
        let mut entries = self.entries();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let entry = entries.entry(key.to_string()).or_insert(LedgerEntry {
            rejections: 0,
            last_seen: now,
        });
        entry.rejections = entry.rejections.saturating_add(1);
        entry.last_seen = now;
        entry.rejections
    }

    /// Drop every entry idle past the ttl. Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    fn prune_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Forget a finished login transaction.
    pub fn clear(&self, key: &str) {
        self.entries().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::generate_pattern;
    use crate::pattern::tests::keystrokes_with_intervals;
    use assert_matches::assert_matches;

    fn rejected(score: f64) -> MatchResult {
        MatchResult {
            is_match: false,
            score,
            confidence: score,
            message: "no".into(),
            breakdown: None,
        }
    }

    fn matched(score: f64) -> MatchResult {
        MatchResult {
            is_match: true,
            score,
            confidence: score,
            message: "yes".into(),
            breakdown: None,
        }
    }

    #[test]
    fn test_attempts_left() {
        assert_eq!(VerificationAttemptState::new(0, 3).attempts_left(), 2);
        assert_eq!(VerificationAttemptState::new(2, 3).attempts_left(), 0);
        assert_eq!(VerificationAttemptState::new(3, 3).attempts_left(), -1);
    }

    #[test]
    fn test_first_rejection_offers_retry() {
        let outcome = VerificationCoordinator::default().decide(&rejected(0.31), 0);
        assert_eq!(
            outcome,
            VerificationOutcome::RetryOffered {
                score: 0.31,
                attempt_number: 1,
                attempts_left: 2
            }
        );
        assert!(outcome.can_retry());
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn test_last_allowed_attempt_still_offers_retry() {
        let outcome = VerificationCoordinator::default().decide(&rejected(0.2), 2);
        assert_eq!(outcome.attempts_left(), Some(0));
        assert!(outcome.can_retry());
    }

    #[test]
    fn test_budget_exhausted() {
        let outcome = VerificationCoordinator::default().decide(&rejected(0.2), 3);
        assert_eq!(outcome.attempts_left(), Some(-1));
        assert!(!outcome.can_retry());
        assert_matches!(
            outcome.into_error(),
            Some(KeyprintError::RetryBudgetExhausted { .. })
        );
    }

    #[test]
    fn test_own_threshold_is_independent_of_is_match() {
        let strict = VerificationCoordinator::new(0.7, 3);
        assert!(!strict.decide(&matched(0.6), 0).is_accepted());
        assert!(strict.decide(&matched(0.7), 0).is_accepted());
        // is_match false is never accepted, whatever the score
        assert!(!VerificationCoordinator::default()
            .decide(&rejected(0.9), 0)
            .is_accepted());
    }

    #[test]
    fn test_evaluate() {
        let reference = generate_pattern(
            &keystrokes_with_intervals(&[120, 260, 180, 90, 340, 150, 220, 110, 300]),
            "hello world",
        )
        .unwrap();
        let coordinator = VerificationCoordinator::default();

        assert_eq!(
            coordinator.evaluate(&reference, None, 0),
            VerificationOutcome::NoSample
        );
        let outcome = coordinator.evaluate(&reference, Some(&reference), 0);
        assert_matches!(outcome, VerificationOutcome::Accepted { .. });
        assert!(outcome.score().unwrap() > 0.99);
    }

    #[test]
    fn test_ledger_cannot_be_reset_by_client() {
        let ledger = AttemptLedger::new();
        assert_eq!(ledger.effective_attempt("tx-1", None), 0);

        ledger.record_rejection("tx-1");
        ledger.record_rejection("tx-1");
        assert_eq!(ledger.attempts("tx-1"), 2);
        assert_eq!(ledger.effective_attempt("tx-1", Some(0)), 2);
        assert_eq!(ledger.effective_attempt("tx-1", None), 2);
        assert_eq!(ledger.effective_attempt("tx-1", Some(3)), 3);
        assert_eq!(ledger.effective_attempt("tx-2", None), 0);

        ledger.clear("tx-1");
        assert_eq!(ledger.attempts("tx-1"), 0);
    }

    #[test]
    fn test_ledger_forgets_idle_transactions() {
        let ledger = AttemptLedger::with_ttl(Duration::from_secs(60));
        let t0 = Instant::now();
        ledger.record_rejection_at("stale", t0);
        ledger.record_rejection_at("stale", t0);
        ledger.record_rejection_at("live", t0 + Duration::from_secs(50));

        let later = t0 + Duration::from_secs(100);
        assert_eq!(ledger.attempts_at("stale", later), 0);
        assert_eq!(ledger.attempts_at("live", later), 1);
        assert_eq!(ledger.prune_at(later), 1);
        assert_eq!(ledger.len(), 1);

        // recording also sweeps expired entries
        ledger.record_rejection_at("fresh", t0 + Duration::from_secs(200));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.attempts_at("fresh", t0 + Duration::from_secs(200)), 1);
    }

    #[test]
    fn test_ledger_activity_extends_ttl() {
        let ledger = AttemptLedger::with_ttl(Duration::from_secs(60));
        let t0 = Instant::now();
        ledger.record_rejection_at("tx", t0);
        ledger.record_rejection_at("tx", t0 + Duration::from_secs(45));
        assert_eq!(ledger.attempts_at("tx", t0 + Duration::from_secs(90)), 2);
    }

    #[test]
    fn test_poisoned_ledger_keeps_counts() {
        let ledger = AttemptLedger::new();
        ledger.record_rejection("tx");
        ledger.record_rejection("tx");

        std::thread::scope(|s| {
            let poisoner = s.spawn(|| {
                let _guard = ledger.entries.lock().unwrap();
                panic!("poison the ledger");
            });
            assert!(poisoner.join().is_err());
        });
        assert!(ledger.entries.is_poisoned());

        assert_eq!(ledger.attempts("tx"), 2);
        assert_eq!(ledger.record_rejection("tx"), 3);
        assert_eq!(ledger.effective_attempt("tx", Some(0)), 3);
    }
}
