use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::error::{KeyprintError, Result};
use crate::keystroke::{KeyEventSink, KeystrokeRecorder, TypingSample};

/// Unified event type consumed by the capture loop
#[derive(Clone, Debug)]
pub enum CaptureEvent {
    Key(KeyEvent, Instant),
    Tick,
}

/// Source of terminal key events
pub trait KeyEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<CaptureEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<CaptureEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            match event::read() {
                // Timestamp on arrival, before the event crosses the channel
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    if tx.send(CaptureEvent::Key(key, Instant::now())).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<CaptureEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Channel-fed event source for tests
pub struct ChannelEventSource {
    rx: Receiver<CaptureEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<CaptureEvent>) -> Self {
        Self { rx }
    }
}

impl KeyEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<CaptureEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Browser-style key code: upper-case ASCII for letters.
pub fn key_code_for(code: &KeyCode) -> i32 {
    match code {
        KeyCode::Char(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase() as i32,
        KeyCode::Char(c) => *c as i32,
        KeyCode::Backspace => 8,
        KeyCode::Tab => 9,
        KeyCode::Enter => 13,
        KeyCode::Esc => 27,
        _ => 0,
    }
}

fn key_name(code: &KeyCode) -> String {
    match code {
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        other => format!("{other:?}"),
    }
}

/// Record a phrase until Enter. Esc or Ctrl-C cancels; `max_idle` without a key also cancels.
pub fn capture_phrase<E: KeyEventSource>(
    source: &E,
    recorder: &mut KeystrokeRecorder,
    max_idle: Duration,
) -> Result<TypingSample> {
    let mut text = String::new();

    loop {
        let (key, at) = match source.recv_timeout(max_idle) {
            Ok(CaptureEvent::Key(key, at)) => (key, at),
            Ok(CaptureEvent::Tick) => continue,
            Err(_) => return Err(KeyprintError::CaptureCancelled),
        };

        match key.code {
            KeyCode::Enter => break,
            KeyCode::Esc => return Err(KeyprintError::CaptureCancelled),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(KeyprintError::CaptureCancelled)
            }
            KeyCode::Char(c) => {
                recorder.record_key_event(&key_name(&key.code), key_code_for(&key.code), at);
                text.push(c);
            }
            KeyCode::Backspace => {
                recorder.record_key_event(&key_name(&key.code), key_code_for(&key.code), at);
                text.pop();
            }
            _ => {}
        }
    }

    Ok(TypingSample::new(recorder.events().to_vec(), text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn key(code: KeyCode, at: Instant) -> CaptureEvent {
        CaptureEvent::Key(KeyEvent::new(code, KeyModifiers::NONE), at)
    }

    #[test]
    fn captures_phrase_with_backspace() {
        let (tx, rx) = mpsc::channel();
        let t0 = Instant::now();
        for (i, c) in "helo".chars().enumerate() {
            tx.send(key(KeyCode::Char(c), t0 + Duration::from_millis(100 * i as u64)))
                .unwrap();
        }
        tx.send(key(KeyCode::Backspace, t0 + Duration::from_millis(450))).unwrap();
        tx.send(CaptureEvent::Tick).unwrap();
        tx.send(key(KeyCode::Char('l'), t0 + Duration::from_millis(600))).unwrap();
        tx.send(key(KeyCode::Char('o'), t0 + Duration::from_millis(700))).unwrap();
        tx.send(key(KeyCode::Enter, t0 + Duration::from_millis(800))).unwrap();

        let source = ChannelEventSource::new(rx);
        let mut recorder = KeystrokeRecorder::start_at(t0);
        let sample = capture_phrase(&source, &mut recorder, Duration::from_millis(50)).unwrap();

        assert_eq!(sample.text, "hello");
        assert_eq!(sample.keystrokes.len(), 7);
        assert_eq!(sample.keystrokes[4].key, "Backspace");
        assert_eq!(sample.keystrokes[4].key_code, 8);
        assert_eq!(sample.keystrokes[4].timestamp_offset_ms, 450);
        assert_eq!(sample.keystrokes[0].key_code, 'H' as i32);
    }

    #[test]
    fn escape_cancels() {
        let (tx, rx) = mpsc::channel();
        let t0 = Instant::now();
        tx.send(key(KeyCode::Char('a'), t0)).unwrap();
        tx.send(key(KeyCode::Esc, t0)).unwrap();
        let source = ChannelEventSource::new(rx);
        let mut recorder = KeystrokeRecorder::start_at(t0);
        assert_matches!(
            capture_phrase(&source, &mut recorder, Duration::from_millis(50)),
            Err(KeyprintError::CaptureCancelled)
        );
    }

    #[test]
    fn idle_timeout_cancels() {
        let (_tx, rx) = mpsc::channel::<CaptureEvent>();
        let source = ChannelEventSource::new(rx);
        let mut recorder = KeystrokeRecorder::start();
        assert_matches!(
            capture_phrase(&source, &mut recorder, Duration::from_millis(5)),
            Err(KeyprintError::CaptureCancelled)
        );
    }

    #[test]
    fn key_codes_follow_browser_convention() {
        assert_eq!(key_code_for(&KeyCode::Char('a')), 65);
        assert_eq!(key_code_for(&KeyCode::Char(' ')), 32);
        assert_eq!(key_code_for(&KeyCode::Char('1')), 49);
        assert_eq!(key_code_for(&KeyCode::Enter), 13);
        assert_eq!(key_code_for(&KeyCode::Backspace), 8);
    }
}
