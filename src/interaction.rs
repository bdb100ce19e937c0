use std::rc::Rc;

use jigsync_core::{evaluate_snap, normalize_angle, PieceId, SessionStatus, Vec3, QUARTER_TURN};
use tracing::debug;

use crate::error::ClientError;
use crate::piece_store::{PieceStore, WriteReceipt};
use crate::surface::CameraControl;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceInteraction {
    Tray,
    Dragging,
    Evaluating,
    Placed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveDrag {
    pub piece: PieceId,
    pub started_at: i64,
    /// Piece origin minus the grab point, so the piece does not jump to the
    /// cursor on the first move.
    pub grab_offset: Vec3,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReleaseOutcome {
    Placed {
        piece: PieceId,
        started_at: i64,
        receipt: WriteReceipt,
    },
    Missed {
        piece: PieceId,
        receipt: WriteReceipt,
    },
}

impl ReleaseOutcome {
    pub fn piece(&self) -> PieceId {
        match self {
            ReleaseOutcome::Placed { piece, .. } | ReleaseOutcome::Missed { piece, .. } => *piece,
        }
    }

    pub fn receipt(&self) -> &WriteReceipt {
        match self {
            ReleaseOutcome::Placed { receipt, .. } | ReleaseOutcome::Missed { receipt, .. } => {
                receipt
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    Idle,
    Dragging(ActiveDrag),
    Evaluating(ActiveDrag),
}

/// Drives the single drag a client may hold at a time.
pub struct InteractionMachine {
    camera: Rc<dyn CameraControl>,
    phase: Phase,
}

impl InteractionMachine {
    pub fn new(camera: Rc<dyn CameraControl>) -> Self {
        Self {
            camera,
            phase: Phase::Idle,
        }
    }

    pub fn active(&self) -> Option<&ActiveDrag> {
        match &self.phase {
            Phase::Dragging(drag) | Phase::Evaluating(drag) => Some(drag),
            Phase::Idle => None,
        }
    }

    pub fn state_of(&self, pieces: &PieceStore, id: PieceId) -> PieceInteraction {
        match self.phase {
            Phase::Evaluating(drag) if drag.piece == id => return PieceInteraction::Evaluating,
            Phase::Dragging(drag) if drag.piece == id => return PieceInteraction::Dragging,
            _ => {}
        }
        match pieces.get(id) {
            Some(piece) if piece.is_placed => PieceInteraction::Placed,
            _ => PieceInteraction::Tray,
        }
    }

    pub fn begin(
        &mut self,
        pieces: &PieceStore,
        status: SessionStatus,
        id: PieceId,
        grab_point: Vec3,
        now: i64,
    ) -> Result<(), ClientError> {
        if let Some(drag) = self.active() {
            return Err(ClientError::DragInProgress(drag.piece));
        }
        if status != SessionStatus::Playing {
            return Err(ClientError::NotPlaying(status));
        }
        let piece = pieces.get(id).ok_or(ClientError::UnknownPiece(id))?;
        if piece.is_placed {
            return Err(ClientError::PiecePlaced(id));
        }
        let origin = piece.current.position;
        self.phase = Phase::Dragging(ActiveDrag {
            piece: id,
            started_at: now,
            grab_offset: Vec3::new(
                origin.x - grab_point.x,
                origin.y - grab_point.y,
                origin.z - grab_point.z,
            ),
        });
        self.camera.set_enabled(false);
        debug!(piece = %id, "drag started");
        Ok(())
    }

    /// Moves the held piece and publishes the intermediate pose.
    pub fn drag_to(
        &mut self,
        pieces: &mut PieceStore,
        point: Vec3,
        now: i64,
    ) -> Result<WriteReceipt, ClientError> {
        let Phase::Dragging(drag) = self.phase else {
            return Err(ClientError::NoActiveDrag);
        };
        let current = pieces
            .get(drag.piece)
            .ok_or(ClientError::UnknownPiece(drag.piece))?
            .current;
        let target = point.offset(drag.grab_offset.x, drag.grab_offset.y, drag.grab_offset.z);
        self.write_or_abort(pieces, drag.piece, current.with_position(target), now)
    }

    pub fn rotate_by(
        &mut self,
        pieces: &mut PieceStore,
        quarter_turns: i32,
        now: i64,
    ) -> Result<WriteReceipt, ClientError> {
        let Phase::Dragging(drag) = self.phase else {
            return Err(ClientError::NoActiveDrag);
        };
        let puzzle_type = pieces.board().puzzle_type;
        if !puzzle_type.rotation_enabled() {
            return Err(ClientError::RotationDisabled(puzzle_type));
        }
        let current = pieces
            .get(drag.piece)
            .ok_or(ClientError::UnknownPiece(drag.piece))?
            .current;
        let rotation = normalize_angle(current.rotation + quarter_turns as f32 * QUARTER_TURN);
        self.write_or_abort(pieces, drag.piece, current.with_rotation(rotation), now)
    }

    /// Drops the held piece and decides whether it snapped. A failed publish
    /// still completes the release; the receipt carries the store error.
    pub fn release(
        &mut self,
        pieces: &mut PieceStore,
        now: i64,
    ) -> Result<ReleaseOutcome, ClientError> {
        let Phase::Dragging(drag) = self.phase else {
            return Err(ClientError::NoActiveDrag);
        };
        self.phase = Phase::Evaluating(drag);
        let result = self.evaluate(pieces, drag, now);
        self.finish();
        result
    }

    /// Cancels the held drag without committing anything. Returns the piece
    /// that was held.
    pub fn abort(&mut self) -> Option<PieceId> {
        let piece = self.active().map(|drag| drag.piece)?;
        self.finish();
        debug!(piece = %piece, "drag aborted");
        Some(piece)
    }

    fn evaluate(
        &self,
        pieces: &mut PieceStore,
        drag: ActiveDrag,
        now: i64,
    ) -> Result<ReleaseOutcome, ClientError> {
        let board = pieces.board();
        let params = board.difficulty.snap_params(board.puzzle_type);
        let piece = pieces
            .get(drag.piece)
            .ok_or(ClientError::UnknownPiece(drag.piece))?;
        let current = piece.current;
        let snapped = evaluate_snap(&current, &piece.canonical, params);
        let receipt = pieces.write(drag.piece, current, snapped, now)?;
        debug!(piece = %drag.piece, snapped, "drag released");
        Ok(if snapped {
            ReleaseOutcome::Placed {
                piece: drag.piece,
                started_at: drag.started_at,
                receipt,
            }
        } else {
            ReleaseOutcome::Missed {
                piece: drag.piece,
                receipt,
            }
        })
    }

    fn write_or_abort(
        &mut self,
        pieces: &mut PieceStore,
        id: PieceId,
        pose: jigsync_core::Pose,
        now: i64,
    ) -> Result<WriteReceipt, ClientError> {
        match pieces.write(id, pose, false, now) {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Idle;
        self.camera.set_enabled(true);
    }
}
