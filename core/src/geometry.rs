use std::f32::consts::TAU;

use rkyv::{Archive, Deserialize, Serialize};

pub const QUARTER_TURN: f32 = TAU / 4.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn offset(self, dx: f32, dy: f32, dz: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Position plus rotation (radians, about the view axis).
#[derive(Clone, Copy, Debug, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: f32,
}

impl Pose {
    pub const fn new(position: Vec3, rotation: f32) -> Self {
        Self { position, rotation }
    }

    pub fn with_position(self, position: Vec3) -> Self {
        Self {
            position,
            rotation: self.rotation,
        }
    }

    pub fn with_rotation(self, rotation: f32) -> Self {
        Self {
            position: self.position,
            rotation,
        }
    }
}

pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Difference `a - b` folded into `[0, 2π)`.
pub fn angle_difference(a: f32, b: f32) -> f32 {
    normalize_angle(a - b)
}

pub fn angle_within(a: f32, b: f32, tolerance: f32) -> bool {
    let diff = angle_difference(a, b);
    diff <= tolerance || diff >= TAU - tolerance
}

pub fn splitmix32(mut value: u32) -> u32 {
    value = value.wrapping_add(0x9E37_79B9);
    let mut z = value;
    z = (z ^ (z >> 16)).wrapping_mul(0x85EB_CA6B);
    z = (z ^ (z >> 13)).wrapping_mul(0xC2B2_AE35);
    z ^ (z >> 16)
}

pub fn rand_unit(seed: u32, salt: u32) -> f32 {
    let mixed = splitmix32(seed ^ splitmix32(salt));
    let top = mixed >> 8;
    top as f32 / ((1u32 << 24) as f32)
}

pub fn rand_range(seed: u32, salt: u32, min: f32, max: f32) -> f32 {
    min + (max - min) * rand_unit(seed, salt)
}
