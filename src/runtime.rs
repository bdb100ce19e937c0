use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use jigsync_core::{ClientId, Difficulty, PieceId, PuzzleType, SessionStatus, StorePath, WinnerRecord};

use crate::error::{ClientError, StoreError};

/// Milliseconds since the Unix epoch. Every timestamp a client writes comes
/// from its clock, so tests swap in [`ManualClock`].
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Shared, hand-driven clock. Clones observe the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.set(now);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.set(self.now.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    Joined {
        client_id: ClientId,
        is_host: bool,
    },
    /// A write was not accepted by the store. Local state is kept.
    WriteFailed {
        path: StorePath,
        error: StoreError,
    },
    /// A local request was refused before anything was written.
    Rejected(ClientError),
    DragAborted {
        piece: PieceId,
    },
    PiecePlaced {
        piece: PieceId,
        by: ClientId,
        local: bool,
    },
    ProgressChanged {
        percent: f64,
    },
    StatusChanged {
        status: SessionStatus,
    },
    Reconfigured {
        difficulty: Difficulty,
        puzzle_type: PuzzleType,
        generation: u32,
    },
    Completed {
        winner: WinnerRecord,
    },
    SessionFailed {
        message: String,
    },
}

impl ClientEvent {
    /// Notices a front end surfaces to the user as a toast.
    pub fn is_notice(&self) -> bool {
        matches!(
            self,
            ClientEvent::WriteFailed { .. }
                | ClientEvent::Rejected(_)
                | ClientEvent::SessionFailed { .. }
        )
    }
}

#[derive(Clone)]
pub struct ClientHooks {
    pub on_event: Rc<dyn Fn(ClientEvent)>,
}

impl ClientHooks {
    pub fn empty() -> Self {
        Self {
            on_event: Rc::new(|_| {}),
        }
    }

    pub fn on_event(callback: impl Fn(ClientEvent) + 'static) -> Self {
        Self {
            on_event: Rc::new(callback),
        }
    }
}

impl Default for ClientHooks {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ClientView {
    #[default]
    Joining,
    Active,
    /// Fatal: the session could not be read. Only returning to the lobby is
    /// possible from here.
    Failed {
        message: String,
    },
    Left,
}

impl ClientView {
    pub fn is_active(&self) -> bool {
        matches!(self, ClientView::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(250);
        assert_eq!(other.now_ms(), 1_250);
        other.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn notices_are_failures_and_rejections() {
        assert!(ClientEvent::Rejected(ClientError::NoActiveDrag).is_notice());
        assert!(!ClientEvent::ProgressChanged { percent: 50.0 }.is_notice());
    }
}
