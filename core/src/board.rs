use std::collections::BTreeMap;
use std::f32::consts::TAU;

use crate::difficulty::{Difficulty, PuzzleType};
use crate::geometry::{rand_range, rand_unit, Pose, Vec3, QUARTER_TURN};
use crate::ids::{ClientId, PieceId};
use crate::records::{PieceEntry, PieceMapRecord};

pub const PIECE_SIZE: f32 = 1.0;
pub const TRAY_GAP: f32 = 1.5;
pub const TRAY_WIDTH: f32 = 3.0;

const SALT_X: u32 = 0x00A1_0000;
const SALT_Y: u32 = 0x00B2_0000;
const SALT_Z: u32 = 0x00C3_0000;
const SALT_ROT: u32 = 0x00D4_0000;

#[derive(Clone, Debug, PartialEq)]
pub struct Piece {
    pub id: PieceId,
    pub canonical: Pose,
    pub current: Pose,
    pub is_placed: bool,
    pub last_writer: Option<ClientId>,
    pub last_write_time: i64,
}

impl Piece {
    pub fn new(id: PieceId, canonical: Pose, current: Pose) -> Self {
        Self {
            id,
            canonical,
            current,
            is_placed: false,
            last_writer: None,
            last_write_time: 0,
        }
    }

    /// `(time, writer)` of the placement, used to order placements
    /// identically on every client.
    pub fn placement_stamp(&self) -> Option<(i64, ClientId)> {
        if !self.is_placed {
            return None;
        }
        self.last_writer.map(|writer| (self.last_write_time, writer))
    }

    pub fn snap_to_canonical(&mut self) {
        self.current = self.canonical;
        self.is_placed = true;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Board {
    pub generation: u32,
    pub difficulty: Difficulty,
    pub puzzle_type: PuzzleType,
    pub seed: u32,
    pieces: BTreeMap<PieceId, Piece>,
}

impl Board {
    pub fn empty(difficulty: Difficulty, puzzle_type: PuzzleType) -> Self {
        Self {
            generation: 0,
            difficulty,
            puzzle_type,
            seed: 0,
            pieces: BTreeMap::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.pieces.len()
    }

    pub fn placed_count(&self) -> usize {
        self.pieces.values().filter(|piece| piece.is_placed).count()
    }

    pub fn is_complete(&self) -> bool {
        !self.pieces.is_empty() && self.placed_count() == self.total()
    }

    pub fn get(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.get(&id)
    }

    pub fn get_mut(&mut self, id: PieceId) -> Option<&mut Piece> {
        self.pieces.get_mut(&id)
    }

    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    /// The placement with the greatest `(time, writer)` stamp.
    pub fn closing_placement(&self) -> Option<(i64, ClientId)> {
        self.pieces
            .values()
            .filter_map(Piece::placement_stamp)
            .max()
    }

    pub fn to_record(&self, written_by: ClientId) -> PieceMapRecord {
        PieceMapRecord {
            generation: self.generation,
            difficulty: self.difficulty,
            puzzle_type: self.puzzle_type,
            seed: self.seed,
            written_by,
            pieces: self
                .pieces
                .values()
                .map(|piece| PieceEntry {
                    id: piece.id,
                    canonical: piece.canonical,
                    current: piece.current,
                    is_placed: piece.is_placed,
                    last_updated_by: piece.last_writer,
                    last_updated: piece.last_write_time,
                })
                .collect(),
        }
    }

    pub fn from_record(record: &PieceMapRecord) -> Self {
        let pieces = record
            .pieces
            .iter()
            .map(|entry| {
                let mut piece = Piece::new(entry.id, entry.canonical, entry.current);
                piece.last_writer = entry.last_updated_by;
                piece.last_write_time = entry.last_updated;
                if entry.is_placed {
                    piece.snap_to_canonical();
                }
                (entry.id, piece)
            })
            .collect();
        Self {
            generation: record.generation,
            difficulty: record.difficulty,
            puzzle_type: record.puzzle_type,
            seed: record.seed,
            pieces,
        }
    }
}

/// Builds a fresh board. Canonical poses follow the grid geometry of the
/// puzzle type; starting poses are scattered in a tray outside the assembly
/// area so nothing begins inside its own snap radius.
pub fn generate_board(
    difficulty: Difficulty,
    puzzle_type: PuzzleType,
    seed: u32,
    generation: u32,
) -> Board {
    let grid = difficulty.grid();
    let mut pieces = BTreeMap::new();
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let id = PieceId::new(col, row);
            let canonical = canonical_pose(puzzle_type, grid.cols, grid.rows, col, row);
            let current = tray_pose(puzzle_type, grid.cols, grid.rows, id, seed);
            pieces.insert(id, Piece::new(id, canonical, current));
        }
    }
    Board {
        generation,
        difficulty,
        puzzle_type,
        seed,
        pieces,
    }
}

fn cylinder_radius(cols: u16) -> f32 {
    (cols as f32 * PIECE_SIZE) / TAU
}

fn grid_y(rows: u16, row: u16) -> f32 {
    ((rows as f32 - 1.0) * 0.5 - row as f32) * PIECE_SIZE
}

pub fn canonical_pose(puzzle_type: PuzzleType, cols: u16, rows: u16, col: u16, row: u16) -> Pose {
    let y = grid_y(rows, row);
    match puzzle_type {
        PuzzleType::Classic | PuzzleType::Rotating => {
            let x = (col as f32 - (cols as f32 - 1.0) * 0.5) * PIECE_SIZE;
            Pose::new(Vec3::new(x, y, 0.0), 0.0)
        }
        PuzzleType::Cylinder => {
            let radius = cylinder_radius(cols);
            let angle = col as f32 * TAU / cols.max(1) as f32;
            let (sin, cos) = angle.sin_cos();
            Pose::new(Vec3::new(radius * sin, y, radius * cos), angle)
        }
    }
}

fn tray_pose(puzzle_type: PuzzleType, cols: u16, rows: u16, id: PieceId, seed: u32) -> Pose {
    let salt = ((id.row as u32) << 8) | id.col as u32;
    let half_height = rows as f32 * PIECE_SIZE * 0.5;
    let y = rand_range(seed, SALT_Y ^ salt, -half_height, half_height);
    match puzzle_type {
        PuzzleType::Classic | PuzzleType::Rotating => {
            let tray_left = cols as f32 * PIECE_SIZE * 0.5 + TRAY_GAP;
            let x = rand_range(seed, SALT_X ^ salt, tray_left, tray_left + TRAY_WIDTH);
            let rotation = if puzzle_type.rotation_enabled() {
                let turns = 1 + (rand_unit(seed, SALT_ROT ^ salt) * 3.0) as u32;
                turns.min(3) as f32 * QUARTER_TURN
            } else {
                0.0
            };
            Pose::new(Vec3::new(x, y, 0.0), rotation)
        }
        PuzzleType::Cylinder => {
            let radius = cylinder_radius(cols);
            let half_width = (cols as f32 * PIECE_SIZE * 0.5).max(TRAY_WIDTH * 0.5);
            let x = rand_range(seed, SALT_X ^ salt, -half_width, half_width);
            let z = radius + TRAY_GAP + rand_range(seed, SALT_Z ^ salt, 0.0, TRAY_WIDTH * 0.5);
            Pose::new(Vec3::new(x, y, z), 0.0)
        }
    }
}
