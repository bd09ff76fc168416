//! Waypoint routes.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use warden_common::planar_jitter;

/// How the next waypoint is chosen after arriving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatrolMode {
    /// Next index, wrapping. Targets get a small planar jitter.
    #[default]
    Sequential,
    /// Uniformly random index, repeats allowed
    Random,
}

/// Ordered waypoints and a cursor into them.
#[derive(Debug, Clone, PartialEq)]
pub struct PatrolRoute {
    points: Vec<Vec3>,
    index: usize,
    mode: PatrolMode,
    jitter: f32,
}

impl PatrolRoute {
    /// Creates a route starting at a random waypoint.
    pub fn new(points: Vec<Vec3>, mode: PatrolMode, jitter: f32, rng: &mut fastrand::Rng) -> Self {
        let index = if points.is_empty() {
            0
        } else {
            rng.usize(..points.len())
        };
        Self {
            points,
            index,
            mode,
            jitter,
        }
    }

    /// Route with no waypoints.
    #[must_use]
    pub fn empty(mode: PatrolMode) -> Self {
        Self {
            points: Vec::new(),
            index: 0,
            mode,
            jitter: 0.0,
        }
    }

    /// Waypoints in order.
    #[must_use]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Current cursor.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Selection mode.
    #[must_use]
    pub fn mode(&self) -> PatrolMode {
        self.mode
    }

    /// Changes the selection mode.
    pub fn set_mode(&mut self, mode: PatrolMode) {
        self.mode = mode;
    }

    /// Whether there are no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Current waypoint without jitter.
    #[must_use]
    pub fn current(&self) -> Option<Vec3> {
        self.points.get(self.index).copied()
    }

    /// Movement target for the current waypoint.
    pub fn target(&self, rng: &mut fastrand::Rng) -> Option<Vec3> {
        let point = self.current()?;
        Some(match self.mode {
            PatrolMode::Sequential => point + planar_jitter(rng, self.jitter),
            PatrolMode::Random => point,
        })
    }

    /// Moves the cursor to the next waypoint.
    pub fn advance(&mut self, rng: &mut fastrand::Rng) {
        if self.points.is_empty() {
            return;
        }
        self.index = match self.mode {
            PatrolMode::Sequential => (self.index + 1) % self.points.len(),
            PatrolMode::Random => rng.usize(..self.points.len()),
        };
    }
}
