//! Logic cadence decoupled from the frame rate.

/// Accumulates frame time and releases one fixed logic step per interval.
///
/// At most one step runs per frame; leftover time beyond one interval is
/// dropped so a long frame cannot trigger a burst of catch-up steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicThrottle {
    interval: f32,
    elapsed: f32,
}

impl LogicThrottle {
    /// Creates a throttle. A non-positive interval runs logic every frame.
    #[must_use]
    pub const fn new(interval: f32) -> Self {
        Self {
            interval,
            elapsed: 0.0,
        }
    }

    /// Adds frame time. Returns the logic delta when a step is due.
    pub fn tick(&mut self, frame_dt: f32) -> Option<f32> {
        if self.interval <= 0.0 {
            return Some(frame_dt);
        }
        self.elapsed += frame_dt;
        if self.elapsed < self.interval {
            return None;
        }
        self.elapsed = (self.elapsed - self.interval).min(self.interval);
        Some(self.interval)
    }

    /// Logic step length.
    #[must_use]
    pub const fn interval(&self) -> f32 {
        self.interval
    }

    /// Time accumulated toward the next step.
    #[must_use]
    pub const fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Changes the step length without discarding accumulated time.
    pub fn set_interval(&mut self, interval: f32) {
        self.interval = interval;
    }

    /// Discards accumulated time.
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

impl Default for LogicThrottle {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_interval() {
        let mut throttle = LogicThrottle::new(0.1);
        let fired: Vec<_> = (0..20).filter_map(|_| throttle.tick(0.016)).collect();
        // 20 frames of 16ms is 320ms: three steps
        assert_eq!(fired.len(), 3);
        assert!(fired.iter().all(|dt| (*dt - 0.1).abs() < f32::EPSILON));
    }

    #[test]
    fn test_long_frame_runs_single_step() {
        let mut throttle = LogicThrottle::new(0.1);
        assert_eq!(throttle.tick(1.0), Some(0.1));
        assert!(throttle.elapsed() <= throttle.interval());
        assert_eq!(throttle.tick(0.0), Some(0.1));
        assert_eq!(throttle.tick(0.0), None);
    }

    #[test]
    fn test_zero_interval_passes_frame_delta() {
        let mut throttle = LogicThrottle::new(0.0);
        assert_eq!(throttle.tick(0.016), Some(0.016));
    }
}
