use keyprint::keystroke::{KeystrokeEvent, TypingSample};

/// Keystrokes whose inter-key gaps are exactly `gaps`, starting at offset 0.
pub fn keystrokes(gaps: &[u64]) -> Vec<KeystrokeEvent> {
    let mut t = 0;
    let mut out = vec![KeystrokeEvent::new("h", 0, 72)];
    for (i, gap) in gaps.iter().enumerate() {
        t += gap;
        let c = (b'a' + (i % 26) as u8) as char;
        out.push(KeystrokeEvent::new(c.to_string(), t, c.to_ascii_uppercase() as i32));
    }
    out
}

#[allow(dead_code)]
pub fn sample(gaps: &[u64], text: &str) -> TypingSample {
    TypingSample::new(keystrokes(gaps), text)
}

/// `n` gaps alternating between `a` and `b`, starting with `a`.
#[allow(dead_code)]
pub fn alternating(n: usize, a: u64, b: u64) -> Vec<u64> {
    (0..n).map(|i| if i % 2 == 0 { a } else { b }).collect()
}

#[allow(dead_code)]
pub fn scaled(gaps: &[u64], num: u64, den: u64) -> Vec<u64> {
    gaps.iter().map(|g| g * num / den).collect()
}
