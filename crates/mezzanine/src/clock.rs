//! The media clock.
//!
//! Playback position is held in integer microseconds and advanced per
//! animation tick from whichever time source is healthiest: the audio
//! device's monotonic clock while it is running, the embedder's wall clock
//! otherwise. The clock never advances on its own; the element decides
//! when to advance, when to hold, and how to clamp against the buffered
//! window.

use mezzanine_core::micros_to_seconds;

/// Signed-rate playback clock over integer microseconds.
#[derive(Debug)]
pub struct MediaClock {
    current_us: i64,
    rate: f64,
    last_wall: Option<f64>,
    last_audio: Option<f64>,
}

impl MediaClock {
    pub fn new() -> Self {
        Self {
            current_us: 0,
            rate: 1.0,
            last_wall: None,
            last_audio: None,
        }
    }

    pub fn current_us(&self) -> i64 {
        self.current_us
    }

    pub fn current_seconds(&self) -> f64 {
        micros_to_seconds(self.current_us)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Changes the rate and restarts elapsed-time measurement so the next
    /// advance doesn't apply the new rate to an interval measured under
    /// the old one.
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        self.last_wall = None;
        self.last_audio = None;
    }

    /// Jumps the position without producing elapsed time.
    pub fn set_current_us(&mut self, current_us: i64) {
        self.current_us = current_us.max(0);
        self.last_wall = None;
        self.last_audio = None;
    }

    /// Clamps the position into `[min_us, max_us]` without disturbing
    /// elapsed-time measurement; used to pin the position inside the
    /// buffered window.
    pub fn clamp_current(&mut self, min_us: i64, max_us: i64) {
        self.current_us = self.current_us.clamp(min_us, max_us);
    }

    /// Records the time sources without advancing, so a later resume
    /// measures elapsed time from here.
    pub fn hold(&mut self, wall_now: f64, audio_now: Option<f64>) {
        self.last_wall = Some(wall_now);
        self.last_audio = audio_now;
    }

    /// Advances the position by rate-scaled elapsed time and returns the
    /// new position in microseconds.
    ///
    /// The audio clock wins when both it and a previous audio reading are
    /// available; negative elapsed readings (a restarted device clock)
    /// count as zero.
    pub fn advance(&mut self, wall_now: f64, audio_now: Option<f64>) -> i64 {
        let elapsed = match (audio_now, self.last_audio) {
            (Some(now), Some(last)) => (now - last).max(0.0),
            _ => match self.last_wall {
                Some(last) => (wall_now - last).max(0.0),
                None => 0.0,
            },
        };
        self.last_wall = Some(wall_now);
        self.last_audio = audio_now;

        self.current_us += (self.rate * elapsed * 1_000_000.0).round() as i64;
        self.current_us = self.current_us.max(0);
        self.current_us
    }
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_uses_wall_clock_without_audio() {
        let mut clock = MediaClock::new();
        clock.hold(10.0, None);
        assert_eq!(clock.advance(10.5, None), 500_000);
        assert_eq!(clock.advance(11.0, None), 1_000_000);
    }

    #[test]
    fn test_advance_prefers_audio_clock() {
        let mut clock = MediaClock::new();
        clock.hold(10.0, Some(100.0));
        // Wall says 1 s elapsed, audio says 0.25 s: audio wins.
        assert_eq!(clock.advance(11.0, Some(100.25)), 250_000);
    }

    #[test]
    fn test_negative_rate_counts_down_and_floors_at_zero() {
        let mut clock = MediaClock::new();
        clock.set_current_us(300_000);
        clock.set_rate(-1.0);
        clock.hold(0.0, None);
        assert_eq!(clock.advance(0.2, None), 100_000);
        assert_eq!(clock.advance(0.6, None), 0);
    }

    #[test]
    fn test_set_rate_restarts_measurement() {
        let mut clock = MediaClock::new();
        clock.hold(0.0, None);
        clock.advance(1.0, None);
        clock.set_rate(2.0);
        // No anchor: the first advance after a rate change is a no-op.
        assert_eq!(clock.advance(5.0, None), 1_000_000);
        assert_eq!(clock.advance(5.5, None), 2_000_000);
    }
}
