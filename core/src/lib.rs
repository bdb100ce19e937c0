pub mod board;
pub mod codec;
pub mod config;
pub mod difficulty;
pub mod geometry;
pub mod ids;
pub mod path;
pub mod progress;
pub mod records;
pub mod scoring;
pub mod session_id;
pub mod snap;

pub use board::{generate_board, Board, Piece, PIECE_SIZE};
pub use codec::{decode, decode_value, encode, encode_value};
pub use config::{
    saturating_ms, ConfigError, PresenceRules, RulesConfig, ScoringRules, SessionRules,
    MAX_INTERVAL_MS,
};
pub use difficulty::{
    Difficulty, GridSize, ParseEnumError, PuzzleType, ALL_DIFFICULTIES, ALL_PUZZLE_TYPES,
};
pub use geometry::{angle_within, normalize_angle, splitmix32, Pose, Vec3, QUARTER_TURN};
pub use ids::{ClientId, PieceId, PieceIdError};
pub use path::{SessionPath, StorePath};
pub use progress::{derived_percent, ProgressAggregator};
pub use records::{
    PieceEntry, PieceMapRecord, PieceRecord, PlayerRecord, ProgressRecord, SessionRecord,
    SessionStatus, StoreValue, WinnerRecord,
};
pub use scoring::{ClientGameStats, PlacementScore, ScoringEngine};
pub use session_id::{is_valid_session_id, SessionId, SessionIdError, SESSION_ID_ALPHABET, SESSION_ID_LEN};
pub use snap::{evaluate_snap, SnapParams};
