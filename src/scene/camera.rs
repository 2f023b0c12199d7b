//! Camera aiming for the composite rig.
//!
//! Recipes may give the camera an explicit `rotation_euler`, or a `look_at`
//! target from which the rotation is derived here. The application's camera
//! looks down its local -Z with +Y up, in a +Z-up world.

use glam::{EulerRot, Mat3, Quat, Vec3};

pub struct LookAt {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl LookAt {
    pub fn new(eye: [f32; 3], target: [f32; 3]) -> Self {
        Self {
            eye: Vec3::from_array(eye),
            target: Vec3::from_array(target),
            up: Vec3::Z,
        }
    }

    /// XYZ euler angles orienting the camera from `eye` toward `target`.
    pub fn rotation_euler(&self) -> [f32; 3] {
        let back = (self.eye - self.target).normalize_or_zero();
        let back = if back == Vec3::ZERO { Vec3::Z } else { back };

        let mut right = self.up.cross(back).normalize_or_zero();
        if right == Vec3::ZERO {
            // Looking straight along the up axis; any horizontal right works.
            right = Vec3::X;
        }
        let up = back.cross(right);

        let quat = Quat::from_mat3(&Mat3::from_cols(right, up, back));
        let (x, y, z) = quat.to_euler(EulerRot::XYZ);
        [x, y, z]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn camera_behind_the_desk_pitches_up_ninety_degrees() {
        let euler = LookAt::new([0.0, -1.0, 0.0], [0.0, 0.0, 0.0]).rotation_euler();
        assert!((euler[0] - FRAC_PI_2).abs() < 1e-5, "{euler:?}");
        assert!(euler[1].abs() < 1e-5, "{euler:?}");
        assert!(euler[2].abs() < 1e-5, "{euler:?}");
    }

    #[test]
    fn top_down_camera_is_not_degenerate() {
        let euler = LookAt::new([0.0, 0.0, 2.0], [0.0, 0.0, 0.0]).rotation_euler();
        for angle in euler {
            assert!(angle.is_finite(), "{euler:?}");
        }
        assert!(euler[0].abs() < 1e-5, "looking straight down is identity-ish: {euler:?}");
    }

    #[test]
    fn typical_desk_rig_pitches_between_horizon_and_straight_down() {
        let euler = LookAt::new([0.0, -2.0, 1.3], [0.0, 0.3, 0.75]).rotation_euler();
        assert!(euler[0] > 1.0 && euler[0] < FRAC_PI_2, "{euler:?}");
        assert!(euler[2].abs() < 1e-5, "no roll for a level camera: {euler:?}");
    }
}
