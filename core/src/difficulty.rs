use std::fmt;
use std::str::FromStr;

use rkyv::Archive;
use thiserror::Error;

use crate::snap::SnapParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    pub cols: u16,
    pub rows: u16,
}

impl GridSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    pub fn piece_count(self) -> usize {
        self.cols as usize * self.rows as usize
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

pub const ALL_DIFFICULTIES: [Difficulty; 4] = [
    Difficulty::Easy,
    Difficulty::Medium,
    Difficulty::Hard,
    Difficulty::Expert,
];

impl Difficulty {
    pub fn grid(self) -> GridSize {
        match self {
            Difficulty::Easy => GridSize::new(3, 2),
            Difficulty::Medium => GridSize::new(4, 3),
            Difficulty::Hard => GridSize::new(6, 4),
            Difficulty::Expert => GridSize::new(8, 6),
        }
    }

    /// Maximum centre distance (world units, one piece wide = 1.0) accepted
    /// as a correct drop.
    pub fn snap_distance(self) -> f32 {
        match self {
            Difficulty::Easy => 0.40,
            Difficulty::Medium => 0.30,
            Difficulty::Hard => 0.20,
            Difficulty::Expert => 0.12,
        }
    }

    pub fn rotation_tolerance_deg(self) -> f32 {
        match self {
            Difficulty::Easy => 15.0,
            Difficulty::Medium => 10.0,
            Difficulty::Hard => 6.0,
            Difficulty::Expert => 3.0,
        }
    }

    pub fn total_pieces(self) -> usize {
        self.grid().piece_count()
    }

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        }
    }

    pub fn snap_params(self, puzzle_type: PuzzleType) -> SnapParams {
        SnapParams {
            snap_distance: self.snap_distance(),
            rotation_tolerance: puzzle_type
                .rotation_enabled()
                .then(|| self.rotation_tolerance_deg().to_radians()),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Difficulty {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        ALL_DIFFICULTIES
            .iter()
            .copied()
            .find(|difficulty| difficulty.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseEnumError {
                kind: "difficulty",
                value: value.to_string(),
            })
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PuzzleType {
    /// Flat grid, pieces keep their orientation.
    Classic,
    /// Flat grid, pieces are scrambled in quarter turns.
    Rotating,
    /// Grid wrapped around a vertical cylinder.
    Cylinder,
}

pub const ALL_PUZZLE_TYPES: [PuzzleType; 3] =
    [PuzzleType::Classic, PuzzleType::Rotating, PuzzleType::Cylinder];

impl PuzzleType {
    pub fn rotation_enabled(self) -> bool {
        matches!(self, PuzzleType::Rotating)
    }

    pub fn requires_premium(self) -> bool {
        matches!(self, PuzzleType::Cylinder)
    }

    pub fn label(self) -> &'static str {
        match self {
            PuzzleType::Classic => "classic",
            PuzzleType::Rotating => "rotating",
            PuzzleType::Cylinder => "cylinder",
        }
    }
}

impl fmt::Display for PuzzleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PuzzleType {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        ALL_PUZZLE_TYPES
            .iter()
            .copied()
            .find(|kind| kind.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseEnumError {
                kind: "puzzle type",
                value: value.to_string(),
            })
    }
}
