//! Planar spatial helpers.
//!
//! The world is y-up and agents move on the XZ plane. An unrotated agent
//! faces +Z, so `rotation * Vec3::Z` is its forward axis.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Directions shorter than this have no meaningful heading.
pub const DIRECTION_EPSILON: f32 = 1e-4;

/// Position and orientation of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position
    pub position: Vec3,
    /// World orientation
    pub rotation: Quat,
}

impl Pose {
    /// Creates a pose at `position` facing +Z.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Returns the forward axis.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// Transforms a point from local space to world space.
    #[must_use]
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

/// Projects a vector onto the ground plane.
#[must_use]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Distance between two points ignoring height.
#[must_use]
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    flatten(b - a).length()
}

/// Unit direction from `from` to `to` on the ground plane, or zero.
#[must_use]
pub fn planar_direction(from: Vec3, to: Vec3) -> Vec3 {
    flatten(to - from).normalize_or_zero()
}

/// Yaw-only rotation facing `direction`.
///
/// Returns `None` when the planar part of `direction` is too short to define
/// a heading.
#[must_use]
pub fn look_rotation(direction: Vec3) -> Option<Quat> {
    let planar = flatten(direction);
    if planar.length() < DIRECTION_EPSILON {
        return None;
    }
    Some(Quat::from_rotation_y(planar.x.atan2(planar.z)))
}

/// Uniform sample in `[min, max)`.
#[must_use]
pub fn random_range(rng: &mut fastrand::Rng, min: f32, max: f32) -> f32 {
    if max <= min {
        return min;
    }
    min + rng.f32() * (max - min)
}

/// Independent uniform noise in `[-amplitude, amplitude)` on both planar axes.
#[must_use]
pub fn planar_jitter(rng: &mut fastrand::Rng, amplitude: f32) -> Vec3 {
    Vec3::new(
        random_range(rng, -amplitude, amplitude),
        0.0,
        random_range(rng, -amplitude, amplitude),
    )
}

/// Uniform point inside a planar disc of `radius` centred on the origin.
#[must_use]
pub fn random_in_disc(rng: &mut fastrand::Rng, radius: f32) -> Vec3 {
    let r = radius * rng.f32().sqrt();
    let theta = rng.f32() * std::f32::consts::TAU;
    Vec3::new(r * theta.cos(), 0.0, r * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_look_rotation_faces_direction() {
        let rot = look_rotation(Vec3::X).expect("non-zero direction");
        let forward = rot * Vec3::Z;
        assert!((forward - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_look_rotation_rejects_vertical() {
        assert!(look_rotation(Vec3::Y).is_none());
        assert!(look_rotation(Vec3::ZERO).is_none());
    }

    #[test]
    fn test_pose_transform_point() {
        let pose = Pose {
            position: Vec3::new(1.0, 0.0, 1.0),
            rotation: look_rotation(Vec3::X).expect("non-zero direction"),
        };
        let world = pose.transform_point(Vec3::Z * 2.0);
        assert!((world - Vec3::new(3.0, 0.0, 1.0)).length() < 1e-5);
        assert!((pose.forward() - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_planar_direction_zero_when_coincident() {
        assert_eq!(planar_direction(Vec3::ONE, Vec3::ONE), Vec3::ZERO);
    }

    proptest! {
        #[test]
        fn test_jitter_stays_in_bounds(seed in any::<u64>(), amplitude in 0.0f32..10.0) {
            let mut rng = fastrand::Rng::with_seed(seed);
            let j = planar_jitter(&mut rng, amplitude);
            prop_assert!(j.x.abs() <= amplitude);
            prop_assert!(j.z.abs() <= amplitude);
            prop_assert_eq!(j.y, 0.0);
        }

        #[test]
        fn test_disc_sample_inside_radius(seed in any::<u64>(), radius in 0.0f32..50.0) {
            let mut rng = fastrand::Rng::with_seed(seed);
            let p = random_in_disc(&mut rng, radius);
            prop_assert!(p.length() <= radius + 1e-3);
        }
    }
}
