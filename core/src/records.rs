use rkyv::{Archive, Deserialize, Serialize};

use crate::difficulty::{Difficulty, PuzzleType};
use crate::geometry::{Pose, Vec3};
use crate::ids::{ClientId, PieceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionStatus {
    Waiting,
    Playing,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Playing => "playing",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub client_id: ClientId,
    pub name: String,
    pub score: u64,
    pub elapsed_ms: u64,
    pub move_count: u32,
    pub accurate_drops: u32,
    pub finished_at: i64,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SessionRecord {
    pub host_id: ClientId,
    pub status: SessionStatus,
    pub difficulty: Difficulty,
    pub puzzle_type: PuzzleType,
    pub generation: u32,
    pub seed: u32,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub winner: Option<WinnerRecord>,
    /// Bumped by every writer from the revision it last saw. Together with
    /// `generation` it orders records across replicas, see
    /// [`SessionRecord::order_key`].
    pub revision: u64,
    pub written_by: ClientId,
}

impl SessionRecord {
    /// A newer board always wins, then the higher revision.
    pub fn order_key(&self) -> (u32, u64) {
        (self.generation, self.revision)
    }

    /// Equal apart from the revision and writer stamps.
    pub fn same_content(&self, other: &SessionRecord) -> bool {
        let stamped = |record: &SessionRecord| SessionRecord {
            revision: 0,
            written_by: ClientId::new(0),
            ..record.clone()
        };
        stamped(self) == stamped(other)
    }

    /// The earlier of two completions of the same board, by finish time and
    /// then client id.
    pub fn first_winner<'a>(
        a: &'a WinnerRecord,
        b: &'a WinnerRecord,
    ) -> &'a WinnerRecord {
        if (b.finished_at, b.client_id) < (a.finished_at, a.client_id) {
            b
        } else {
            a
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: ClientId,
    pub name: String,
    pub is_host: bool,
    pub is_online: bool,
    pub last_active: i64,
}

/// Single-piece write. Drag updates and placements share this shape; only a
/// record with `is_placed` set is load-bearing.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PieceRecord {
    pub position: Vec3,
    pub rotation: f32,
    pub is_placed: bool,
    pub last_updated_by: ClientId,
    pub last_updated: i64,
    pub generation: u32,
}

impl PieceRecord {
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PieceEntry {
    pub id: PieceId,
    pub canonical: Pose,
    pub current: Pose,
    pub is_placed: bool,
    pub last_updated_by: Option<ClientId>,
    pub last_updated: i64,
}

/// Whole-board replacement published by the host on (re)generation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PieceMapRecord {
    pub generation: u32,
    pub difficulty: Difficulty,
    pub puzzle_type: PuzzleType,
    pub seed: u32,
    pub written_by: ClientId,
    pub pieces: Vec<PieceEntry>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub generation: u32,
    pub percent: f64,
    pub written_by: ClientId,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum StoreValue {
    Session(SessionRecord),
    Player(PlayerRecord),
    Piece(PieceRecord),
    PieceMap(PieceMapRecord),
    Timer(u64),
    Progress(ProgressRecord),
}

impl StoreValue {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreValue::Session(_) => "session",
            StoreValue::Player(_) => "player",
            StoreValue::Piece(_) => "piece",
            StoreValue::PieceMap(_) => "piece_map",
            StoreValue::Timer(_) => "timer",
            StoreValue::Progress(_) => "progress",
        }
    }
}
