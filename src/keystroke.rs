use crate::error::{KeyprintError, Result, Shortfall};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single key press, timed from the start of recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeEvent {
    pub key: String,
    #[serde(rename = "timestamp")]
    pub timestamp_offset_ms: u64,
    #[serde(rename = "keyCode")]
    pub key_code: i32,
}

impl KeystrokeEvent {
    pub fn new(key: impl Into<String>, timestamp_offset_ms: u64, key_code: i32) -> Self {
        Self {
            key: key.into(),
            timestamp_offset_ms,
            key_code,
        }
    }
}

/// Capability implemented by anything that accepts raw key events from a capture UI.
pub trait KeyEventSink {
    fn record_key_event(&mut self, key: &str, key_code: i32, at: Instant);
}

/// Records key events as offsets from the moment recording started.
#[derive(Debug, Clone)]
pub struct KeystrokeRecorder {
    started_at: Instant,
    events: Vec<KeystrokeEvent>,
}

impl KeystrokeRecorder {
    pub fn start() -> Self {
        Self::start_at(Instant::now())
    }

    pub fn start_at(started_at: Instant) -> Self {
        Self {
            started_at,
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[KeystrokeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<KeystrokeEvent> {
        self.events
    }

    /// Fraction of `target` keystrokes recorded so far, capped at 1.0.
    pub fn progress(&self, target: usize) -> f64 {
        if target == 0 {
            return 1.0;
        }
        (self.events.len() as f64 / target as f64).min(1.0)
    }
}

impl KeyEventSink for KeystrokeRecorder {
    fn record_key_event(&mut self, key: &str, key_code: i32, at: Instant) {
        let offset = at.saturating_duration_since(self.started_at).as_millis() as u64;
        // A clock that steps backwards records a tie rather than a negative gap
        let floor = self
            .events
            .last()
            .map(|e| e.timestamp_offset_ms)
            .unwrap_or(0);
        self.events
            .push(KeystrokeEvent::new(key, offset.max(floor), key_code));
    }
}

/// What the capture boundary hands to the engine: the keystrokes and the phrase they typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingSample {
    pub keystrokes: Vec<KeystrokeEvent>,
    pub text: String,
}

impl TypingSample {
    pub fn new(keystrokes: Vec<KeystrokeEvent>, text: impl Into<String>) -> Self {
        Self {
            keystrokes,
            text: text.into(),
        }
    }

    /// Enforce the capture-boundary minimum phrase length (trimmed, counted in chars).
    pub fn check_phrase(&self, min_chars: usize) -> Result<()> {
        let found = self.text.trim().chars().count();
        if found < min_chars {
            return Err(KeyprintError::InsufficientData(Shortfall::Phrase {
                found,
                required: min_chars,
            }));
        }
        Ok(())
    }
}
