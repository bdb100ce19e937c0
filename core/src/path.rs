use std::fmt;

use crate::ids::{ClientId, PieceId};
use crate::session_id::SessionId;

const ROOT: &str = "session";
const STATE: &str = "state";
const PLAYERS: &str = "players";
const PIECES: &str = "pieces";
const TIMER: &str = "timer";
const PROGRESS: &str = "progress";

/// Slash-separated location in the realtime store. A subscription on a path
/// covers the path itself and all of its descendants.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn session(id: &SessionId) -> Self {
        Self::from_segments([ROOT, id.as_str()])
    }

    pub fn session_state(id: &SessionId) -> Self {
        Self::session(id).child(STATE)
    }

    pub fn players(id: &SessionId) -> Self {
        Self::session(id).child(PLAYERS)
    }

    pub fn player(id: &SessionId, player: ClientId) -> Self {
        Self::players(id).child(player.to_string())
    }

    pub fn pieces(id: &SessionId) -> Self {
        Self::session(id).child(PIECES)
    }

    pub fn piece(id: &SessionId, piece: PieceId) -> Self {
        Self::pieces(id).child(piece.to_string())
    }

    pub fn timer(id: &SessionId) -> Self {
        Self::session(id).child(TIMER)
    }

    pub fn progress(id: &SessionId) -> Self {
        Self::session(id).child(PROGRESS)
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// True when `self` equals `other` or lies underneath it.
    pub fn is_within(&self, other: &StorePath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// The typed meaning of a path inside one session, if it has one.
    pub fn classify(&self, session: &SessionId) -> Option<SessionPath> {
        let base = Self::session(session);
        if !self.is_within(&base) {
            return None;
        }
        let rest = &self.segments[base.segments.len()..];
        match rest {
            [state] if state == STATE => Some(SessionPath::State),
            [timer] if timer == TIMER => Some(SessionPath::Timer),
            [progress] if progress == PROGRESS => Some(SessionPath::Progress),
            [pieces] if pieces == PIECES => Some(SessionPath::Pieces),
            [pieces, piece] if pieces == PIECES => piece.parse().ok().map(SessionPath::Piece),
            [players, player] if players == PLAYERS => Some(SessionPath::Player(player.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionPath {
    State,
    Timer,
    Progress,
    Pieces,
    Piece(PieceId),
    Player(String),
}
