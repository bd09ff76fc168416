//! Fixed-step simulation clock.
//!
//! Variable frame times are accumulated and released as whole fixed steps, so
//! agent logic sees the same delta regardless of frame pacing.

/// Most fixed steps released by one frame.
const MAX_STEPS_PER_FRAME: u32 = 10;

/// Frame time accumulator with a fixed step.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Fixed timestep delta
    fixed_dt: f32,
    /// Longest frame accepted before clamping
    max_frame: f32,
    /// Time not yet released as a step
    accumulator: f32,
    /// Simulated seconds released so far
    elapsed: f64,
    /// Frames fed so far
    frames: u64,
}

impl SimClock {
    /// Creates a clock. Steps shorter than 1ms are raised to 1ms.
    #[must_use]
    pub fn new(fixed_dt: f32) -> Self {
        Self {
            fixed_dt: fixed_dt.max(0.001),
            max_frame: 0.25, // Max 250ms frame (prevents spiral of death)
            accumulator: 0.0,
            elapsed: 0.0,
            frames: 0,
        }
    }

    /// Get the fixed timestep value.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Accumulate one frame. Returns the number of fixed steps to run.
    pub fn accumulate(&mut self, frame_dt: f32) -> u32 {
        self.frames += 1;
        self.accumulator += frame_dt.clamp(0.0, self.max_frame);

        let mut count = 0;
        while self.accumulator >= self.fixed_dt && count < MAX_STEPS_PER_FRAME {
            self.accumulator -= self.fixed_dt;
            count += 1;
        }

        // Still behind after the cap: drop the backlog
        if self.accumulator > self.fixed_dt * 2.0 {
            self.accumulator = 0.0;
        }

        self.elapsed += f64::from(self.fixed_dt) * f64::from(count);
        count
    }

    /// Simulated seconds released as fixed steps.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Frames fed so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(1.0 / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_frames_release_one_step_each() {
        let mut clock = SimClock::new(0.02);
        let steps: u32 = (0..10).map(|_| clock.accumulate(0.02)).sum();
        assert!((9..=10).contains(&steps));
        assert_eq!(clock.frames(), 10);
    }

    #[test]
    fn test_short_frames_accumulate() {
        let mut clock = SimClock::new(0.1);
        assert_eq!(clock.accumulate(0.04), 0);
        assert_eq!(clock.accumulate(0.04), 0);
        assert_eq!(clock.accumulate(0.04), 1);
        assert!(clock.accumulator < 0.05);
    }

    #[test]
    fn test_long_frame_is_capped() {
        let mut clock = SimClock::new(0.01);
        assert_eq!(clock.accumulate(5.0), MAX_STEPS_PER_FRAME);
        assert_eq!(clock.accumulator, 0.0);
        assert!((clock.elapsed() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_minimum_step() {
        assert_eq!(SimClock::new(0.0).fixed_dt(), 0.001);
    }
}
