//! Count-up animation for counter displays

use std::time::Duration;

/// Hero counter count-up duration
pub const HERO_ANIMATION: Duration = Duration::from_millis(1200);

/// Family counter count-up duration
pub const FAMILY_ANIMATION: Duration = Duration::from_millis(1500);

/// Share of the element that must be visible before it animates
pub const REVEAL_THRESHOLD: f64 = 0.5;

/// One frame per display refresh
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Ease-out-cubic count from `start` to `end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterAnimation {
    pub start: u64,
    pub end: u64,
    pub duration: Duration,
}

impl CounterAnimation {
    pub fn new(start: u64, end: u64, duration: Duration) -> Self {
        Self { start, end, duration }
    }

    /// Progress in `[0, 1]`
    pub fn progress(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Value shown `elapsed` after the animation started
    pub fn value_at(&self, elapsed: Duration) -> u64 {
        let p = self.progress(elapsed);
        if p >= 1.0 {
            return self.end;
        }
        let eased = 1.0 - (1.0 - p).powi(3);
        let start = self.start as f64;
        let span = self.end as f64 - start;
        (start + span * eased).floor().max(0.0) as u64
    }

    /// Render frames until the end value has been shown
    pub async fn play<F>(&self, mut render: F)
    where
        F: FnMut(u64),
    {
        let started = tokio::time::Instant::now();
        let mut frames = tokio::time::interval(FRAME_INTERVAL);
        loop {
            frames.tick().await;
            let elapsed = started.elapsed();
            render(self.value_at(elapsed));
            if elapsed >= self.duration {
                break;
            }
        }
    }
}

/// Fires once, the first time an element is at least half visible
#[derive(Debug, Default)]
pub struct RevealLatch {
    fired: bool,
}

impl RevealLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an intersection ratio. True only on the first qualifying call.
    pub fn observe(&mut self, ratio: f64) -> bool {
        if self.fired || ratio < REVEAL_THRESHOLD {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_and_converges() {
        let anim = CounterAnimation::new(0, 137, HERO_ANIMATION);
        let mut last = 0;
        for ms in (0..=1300).step_by(7) {
            let v = anim.value_at(Duration::from_millis(ms));
            assert!(v >= last, "dropped from {} to {} at {}ms", last, v, ms);
            assert!(v <= 137);
            last = v;
        }
        assert_eq!(anim.value_at(HERO_ANIMATION), 137);
        assert_eq!(anim.value_at(Duration::ZERO), 0);
    }

    #[test]
    fn test_ease_out_front_loads_progress() {
        let anim = CounterAnimation::new(0, 1000, FAMILY_ANIMATION);
        // Halfway through time, 1 - 0.5^3 = 87.5% of the way there
        assert_eq!(anim.value_at(Duration::from_millis(750)), 875);
    }

    #[test]
    fn test_nonzero_start_and_zero_duration() {
        let anim = CounterAnimation::new(40, 50, Duration::ZERO);
        assert_eq!(anim.value_at(Duration::ZERO), 50);

        let anim = CounterAnimation::new(40, 50, HERO_ANIMATION);
        assert_eq!(anim.value_at(Duration::ZERO), 40);
    }

    #[test]
    fn test_reveal_latch_fires_once() {
        let mut latch = RevealLatch::new();
        assert!(!latch.observe(0.2));
        assert!(latch.observe(0.5));
        assert!(!latch.observe(1.0));
        assert!(latch.fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_ends_on_target() {
        let anim = CounterAnimation::new(0, 25, HERO_ANIMATION);
        let mut frames = Vec::new();
        anim.play(|v| frames.push(v)).await;

        assert_eq!(frames.first(), Some(&0));
        assert_eq!(frames.last(), Some(&25));
        assert!(frames.windows(2).all(|w| w[0] <= w[1]));
    }
}
