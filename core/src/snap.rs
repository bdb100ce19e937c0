use crate::geometry::{angle_within, Pose};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapParams {
    pub snap_distance: f32,
    /// Radians. `None` when the puzzle type does not check rotation.
    pub rotation_tolerance: Option<f32>,
}

/// Decides whether a dropped piece counts as placed. Position must be strictly
/// inside the snap distance; rotation (when checked) may sit on either side of
/// the canonical angle, including across the 0/2π seam.
pub fn evaluate_snap(current: &Pose, canonical: &Pose, params: SnapParams) -> bool {
    let distance = current.position.distance(canonical.position);
    if !(distance < params.snap_distance) {
        return false;
    }
    match params.rotation_tolerance {
        None => true,
        Some(tolerance) => angle_within(current.rotation, canonical.rotation, tolerance),
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use super::*;
    use crate::difficulty::{Difficulty, PuzzleType, ALL_DIFFICULTIES};
    use crate::geometry::{Vec3, QUARTER_TURN};

    fn pose(x: f32, y: f32, rotation: f32) -> Pose {
        Pose::new(Vec3::new(x, y, 0.0), rotation)
    }

    #[test]
    fn distance_table() {
        let canonical = pose(1.0, 1.0, 0.0);
        let cases = [
            (Difficulty::Easy, 0.39, true),
            (Difficulty::Easy, 0.41, false),
            (Difficulty::Medium, 0.29, true),
            (Difficulty::Medium, 0.35, false),
            (Difficulty::Hard, 0.19, true),
            (Difficulty::Hard, 0.25, false),
            (Difficulty::Expert, 0.11, true),
            (Difficulty::Expert, 0.13, false),
        ];
        for (difficulty, dx, expected) in cases {
            let current = pose(1.0 + dx, 1.0, 0.0);
            let params = difficulty.snap_params(PuzzleType::Classic);
            assert_eq!(
                evaluate_snap(&current, &canonical, params),
                expected,
                "{difficulty} dx={dx}"
            );
        }
    }

    #[test]
    fn rotation_ignored_when_disabled() {
        let canonical = pose(0.0, 0.0, 0.0);
        let current = pose(0.1, 0.0, 2.0 * QUARTER_TURN);
        for difficulty in ALL_DIFFICULTIES {
            if difficulty.snap_distance() <= 0.1 {
                continue;
            }
            let params = difficulty.snap_params(PuzzleType::Classic);
            assert!(evaluate_snap(&current, &canonical, params));
        }
    }

    #[test]
    fn rotation_checked_with_wraparound() {
        let params = Difficulty::Easy.snap_params(PuzzleType::Rotating);
        let canonical = pose(0.0, 0.0, 0.0);
        let near = 10f32.to_radians();
        assert!(evaluate_snap(&pose(0.0, 0.0, near), &canonical, params));
        assert!(evaluate_snap(&pose(0.0, 0.0, TAU - near), &canonical, params));
        assert!(evaluate_snap(&pose(0.0, 0.0, -near), &canonical, params));
        assert!(!evaluate_snap(&pose(0.0, 0.0, QUARTER_TURN), &canonical, params));
    }

    #[test]
    fn canonical_pose_always_snaps() {
        for difficulty in ALL_DIFFICULTIES {
            let canonical = pose(2.5, -1.0, QUARTER_TURN);
            let params = difficulty.snap_params(PuzzleType::Rotating);
            assert!(evaluate_snap(&canonical, &canonical, params));
        }
    }
}
