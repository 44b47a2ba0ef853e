//! Duplicate-mode modifier tracking.
//!
//! Duplicate mode is on while the configured key (Shift by default) is held.
//! Key-up does not switch it off immediately: the drop event that ends a drag
//! often arrives just after the key is released. Instead each key-up arms a
//! forced reset 500 ms later. Key-up events get lost (focus changes while the
//! key is down), so the reset fires no matter what key events follow; a
//! key-down between key-up and the deadline does not cancel it.
//!
//! Time is passed in explicitly so behavior is deterministic under test.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::reorder::DropMode;

/// Delay between key-up and the forced reset.
pub const MODIFIER_RELEASE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DuplicateModifier {
    key: String,
    pressed: bool,
    pending_resets: VecDeque<Instant>,
}

impl DuplicateModifier {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            pressed: false,
            pending_resets: VecDeque::new(),
        }
    }

    /// The key this tracker listens for.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn key_down(&mut self, key: &str, now: Instant) {
        self.expire(now);
        if key == self.key {
            self.pressed = true;
        }
    }

    pub fn key_up(&mut self, key: &str, now: Instant) {
        self.expire(now);
        if key == self.key {
            self.pending_resets.push_back(now + MODIFIER_RELEASE_TIMEOUT);
        }
    }

    pub fn is_active(&mut self, now: Instant) -> bool {
        self.expire(now);
        self.pressed
    }

    pub fn mode(&mut self, now: Instant) -> DropMode {
        DropMode::from(self.is_active(now))
    }

    /// Apply every reset whose deadline has passed.
    fn expire(&mut self, now: Instant) {
        while self.pending_resets.front().is_some_and(|deadline| *deadline <= now) {
            self.pending_resets.pop_front();
            if self.pressed {
                tracing::trace!(key = %self.key, "duplicate modifier reset");
            }
            self.pressed = false;
        }
    }
}

impl Default for DuplicateModifier {
    fn default() -> Self {
        Self::new("Shift")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_key_down_activates() {
        let t0 = Instant::now();
        let mut modifier = DuplicateModifier::default();
        assert!(!modifier.is_active(t0));

        modifier.key_down("Shift", t0);
        assert!(modifier.is_active(t0 + ms(10_000)));
        assert_eq!(modifier.mode(t0), DropMode::Duplicate);
    }

    #[test]
    fn test_release_resets_after_timeout() {
        let t0 = Instant::now();
        let mut modifier = DuplicateModifier::default();
        modifier.key_down("Shift", t0);
        modifier.key_up("Shift", t0 + ms(100));

        assert!(modifier.is_active(t0 + ms(599)));
        assert!(!modifier.is_active(t0 + ms(600)));
        assert_eq!(modifier.mode(t0 + ms(700)), DropMode::Move);
    }

    #[test]
    fn test_reset_fires_despite_later_key_down() {
        let t0 = Instant::now();
        let mut modifier = DuplicateModifier::default();
        modifier.key_down("Shift", t0);
        modifier.key_up("Shift", t0);
        modifier.key_down("Shift", t0 + ms(200));

        assert!(modifier.is_active(t0 + ms(400)));
        assert!(!modifier.is_active(t0 + ms(500)));

        // A fresh press after the deadline sticks again.
        modifier.key_down("Shift", t0 + ms(800));
        assert!(modifier.is_active(t0 + ms(5_000)));
    }

    #[test]
    fn test_other_keys_ignored() {
        let t0 = Instant::now();
        let mut modifier = DuplicateModifier::new("Alt");
        modifier.key_down("Shift", t0);
        assert!(!modifier.is_active(t0));

        modifier.key_down("Alt", t0);
        modifier.key_up("Control", t0);
        assert!(modifier.is_active(t0 + ms(1_000)));
    }
}
