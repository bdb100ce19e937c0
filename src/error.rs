use std::fmt;

use jigsync_core::{PieceId, PuzzleType, SessionStatus};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unreachable")]
    Unreachable,
    #[error("store connection closed")]
    Closed,
    #[error("failed to encode {0} value")]
    Codec(&'static str),
    #[error("subscription to {0} rejected")]
    SubscriptionRejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    Start,
    Pause,
    Resume,
    Reset,
    SetDifficulty,
    SetPuzzleType,
    TickTimer,
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HostAction::Start => "start",
            HostAction::Pause => "pause",
            HostAction::Resume => "resume",
            HostAction::Reset => "reset",
            HostAction::SetDifficulty => "set difficulty",
            HostAction::SetPuzzleType => "set puzzle type",
            HostAction::TickTimer => "drive the timer",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("only the host may {0}")]
    HostOnly(HostAction),
    #[error("the {0} puzzle type requires a premium account")]
    PremiumRequired(PuzzleType),
    #[error("cannot {action} while the session is {}", .from.label())]
    InvalidTransition {
        from: SessionStatus,
        action: HostAction,
    },
    #[error("pieces can only be moved while playing (session is {})", .0.label())]
    NotPlaying(SessionStatus),
    #[error("piece {0} is already being dragged")]
    DragInProgress(PieceId),
    #[error("no piece is being dragged")]
    NoActiveDrag,
    #[error("unknown piece {0}")]
    UnknownPiece(PieceId),
    #[error("piece {0} is already placed")]
    PiecePlaced(PieceId),
    #[error("pieces cannot be rotated in a {0} puzzle")]
    RotationDisabled(PuzzleType),
    #[error("session record is missing")]
    SessionMissing,
    #[error(transparent)]
    Store(#[from] StoreError),
}
