use std::rc::Rc;

use jigsync_core::{
    Board, ClientId, Piece, PieceId, PieceMapRecord, PieceRecord, Pose, SessionId, StorePath,
    StoreValue,
};
use tracing::{debug, warn};

use crate::error::{ClientError, StoreError};
use crate::store::RealtimeStore;
use crate::surface::PieceView;

/// Result of a local piece write. The local board has already changed by the
/// time this is returned, whatever `published` says.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteReceipt {
    pub pose: Pose,
    pub placed: bool,
    pub published: Result<(), StoreError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteApply {
    Echo,
    StaleGeneration,
    UnknownPiece,
    /// A non-placed record for a piece that is already placed.
    IgnoredRegression,
    Moved,
    Placed,
    AlreadyPlaced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardApply {
    Echo,
    Stale,
    Replaced,
}

/// Local replica of the session's piece map plus the write path back to the
/// shared store.
pub struct PieceStore {
    session: SessionId,
    local: ClientId,
    board: Board,
    store: Rc<dyn RealtimeStore>,
}

impl PieceStore {
    pub fn new(session: SessionId, local: ClientId, board: Board, store: Rc<dyn RealtimeStore>) -> Self {
        Self {
            session,
            local,
            board,
            store,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn local(&self) -> ClientId {
        self.local
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn generation(&self) -> u32 {
        self.board.generation
    }

    pub fn total(&self) -> usize {
        self.board.total()
    }

    pub fn placed_count(&self) -> usize {
        self.board.placed_count()
    }

    pub fn get(&self, id: PieceId) -> Option<&Piece> {
        self.board.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Piece> {
        self.board.pieces()
    }

    pub fn views(&self, selected: Option<PieceId>) -> Vec<PieceView> {
        self.board
            .pieces()
            .map(|piece| PieceView {
                id: piece.id,
                pose: piece.current,
                is_placed: piece.is_placed,
                is_selected: selected == Some(piece.id),
            })
            .collect()
    }

    /// Applies a move or placement locally, then publishes it. A placement
    /// always lands on the canonical pose regardless of `pose`.
    pub fn write(
        &mut self,
        id: PieceId,
        pose: Pose,
        placed: bool,
        now: i64,
    ) -> Result<WriteReceipt, ClientError> {
        let generation = self.board.generation;
        let local = self.local;
        let piece = self.board.get_mut(id).ok_or(ClientError::UnknownPiece(id))?;
        if piece.is_placed {
            return Err(ClientError::PiecePlaced(id));
        }
        if placed {
            piece.snap_to_canonical();
        } else {
            piece.current = pose;
        }
        piece.last_writer = Some(local);
        piece.last_write_time = now;
        let record = PieceRecord {
            position: piece.current.position,
            rotation: piece.current.rotation,
            is_placed: piece.is_placed,
            last_updated_by: local,
            last_updated: now,
            generation,
        };
        let pose = piece.current;
        let path = StorePath::piece(&self.session, id);
        let published = self.store.write(&path, StoreValue::Piece(record));
        if let Err(err) = &published {
            warn!(piece = %id, error = %err, "piece write not published");
        }
        Ok(WriteReceipt {
            pose,
            placed,
            published,
        })
    }

    pub fn on_remote_update(&mut self, id: PieceId, record: &PieceRecord) -> RemoteApply {
        if record.generation != self.board.generation {
            debug!(
                piece = %id,
                record_generation = record.generation,
                generation = self.board.generation,
                "dropping piece update from another board"
            );
            return RemoteApply::StaleGeneration;
        }
        let local = self.local;
        let Some(piece) = self.board.get_mut(id) else {
            warn!(piece = %id, "update for unknown piece");
            return RemoteApply::UnknownPiece;
        };
        if record.last_updated_by == local {
            return RemoteApply::Echo;
        }
        let stamp = (record.last_updated, record.last_updated_by);
        if piece.is_placed {
            if !record.is_placed {
                return RemoteApply::IgnoredRegression;
            }
            // keep the earliest placement so every replica agrees on who placed it
            if piece.placement_stamp().map_or(true, |current| stamp < current) {
                piece.last_write_time = stamp.0;
                piece.last_writer = Some(stamp.1);
            }
            return RemoteApply::AlreadyPlaced;
        }
        piece.last_write_time = record.last_updated;
        piece.last_writer = Some(record.last_updated_by);
        if record.is_placed {
            piece.snap_to_canonical();
            RemoteApply::Placed
        } else {
            piece.current = record.pose();
            RemoteApply::Moved
        }
    }

    /// Replaces the whole board locally and publishes it as one value.
    pub fn write_all(&mut self, board: Board) -> Result<(), StoreError> {
        self.board = board;
        let record = self.board.to_record(self.local);
        debug!(
            generation = record.generation,
            pieces = record.pieces.len(),
            "publishing piece map"
        );
        self.store
            .write(&StorePath::pieces(&self.session), StoreValue::PieceMap(record))
    }

    pub fn apply_remote_board(&mut self, record: &PieceMapRecord) -> BoardApply {
        if record.generation < self.board.generation {
            return BoardApply::Stale;
        }
        if record.generation == self.board.generation && record.written_by == self.local {
            return BoardApply::Echo;
        }
        self.board = Board::from_record(record);
        BoardApply::Replaced
    }
}

#[cfg(test)]
mod tests {
    use jigsync_core::{generate_board, Difficulty, PuzzleType, Vec3};

    use super::*;
    use crate::memory_store::MemoryHub;

    const HOST: ClientId = ClientId::new(1);
    const GUEST: ClientId = ClientId::new(2);

    fn session() -> SessionId {
        SessionId::parse("PieceStore").unwrap()
    }

    fn store_for(hub: &MemoryHub, local: ClientId) -> PieceStore {
        let board = generate_board(Difficulty::Easy, PuzzleType::Classic, 9, 1);
        PieceStore::new(session(), local, board, Rc::new(hub.connect()))
    }

    fn placed_record(by: ClientId, at: i64) -> PieceRecord {
        PieceRecord {
            position: Vec3::ZERO,
            rotation: 0.0,
            is_placed: true,
            last_updated_by: by,
            last_updated: at,
            generation: 1,
        }
    }

    #[test]
    fn placement_forces_canonical_pose_and_publishes() {
        let hub = MemoryHub::new();
        let mut pieces = store_for(&hub, HOST);
        let id = PieceId::new(0, 0);
        let canonical = pieces.get(id).unwrap().canonical;
        let receipt = pieces
            .write(id, Pose::new(Vec3::new(9.0, 9.0, 0.0), 1.0), true, 10)
            .unwrap();
        assert_eq!(receipt.pose, canonical);
        assert_eq!(receipt.published, Ok(()));
        assert_eq!(pieces.placed_count(), 1);
        let stored = hub.read(&StorePath::piece(&session(), id));
        assert!(matches!(stored, Some(StoreValue::Piece(record)) if record.is_placed));
    }

    #[test]
    fn placed_and_unknown_pieces_reject_writes() {
        let hub = MemoryHub::new();
        let mut pieces = store_for(&hub, HOST);
        let id = PieceId::new(1, 0);
        pieces.write(id, Pose::default(), true, 1).unwrap();
        assert_eq!(
            pieces.write(id, Pose::default(), false, 2).unwrap_err(),
            ClientError::PiecePlaced(id)
        );
        let missing = PieceId::new(40, 40);
        assert_eq!(
            pieces.write(missing, Pose::default(), false, 2).unwrap_err(),
            ClientError::UnknownPiece(missing)
        );
    }

    #[test]
    fn failed_publish_keeps_local_state() {
        let hub = MemoryHub::new();
        let store = hub.connect();
        hub.set_reachable(store.connection_id(), false);
        let board = generate_board(Difficulty::Easy, PuzzleType::Classic, 9, 1);
        let mut pieces = PieceStore::new(session(), HOST, board, Rc::new(store));
        let id = PieceId::new(2, 1);
        let receipt = pieces.write(id, Pose::default(), true, 5).unwrap();
        assert_eq!(receipt.published, Err(StoreError::Unreachable));
        assert!(pieces.get(id).unwrap().is_placed);
    }

    #[test]
    fn identical_remote_update_twice_is_idempotent() {
        let hub = MemoryHub::new();
        let mut pieces = store_for(&hub, HOST);
        let id = PieceId::new(0, 1);
        let record = placed_record(GUEST, 100);
        assert_eq!(pieces.on_remote_update(id, &record), RemoteApply::Placed);
        let after_first = pieces.board().clone();
        assert_eq!(pieces.on_remote_update(id, &record), RemoteApply::AlreadyPlaced);
        assert_eq!(pieces.board(), &after_first);
        assert_eq!(pieces.placed_count(), 1);
    }

    #[test]
    fn placed_piece_never_reverts() {
        let hub = MemoryHub::new();
        let mut pieces = store_for(&hub, HOST);
        let id = PieceId::new(1, 1);
        pieces.on_remote_update(id, &placed_record(GUEST, 100));
        let moved = PieceRecord {
            position: Vec3::new(4.0, 4.0, 0.0),
            is_placed: false,
            last_updated: 200,
            ..placed_record(ClientId::new(3), 200)
        };
        assert_eq!(pieces.on_remote_update(id, &moved), RemoteApply::IgnoredRegression);
        let piece = pieces.get(id).unwrap();
        assert!(piece.is_placed);
        assert_eq!(piece.current, piece.canonical);
    }

    #[test]
    fn placement_stamp_converges_to_earliest() {
        let hub = MemoryHub::new();
        let id = PieceId::new(2, 0);
        let early = placed_record(GUEST, 100);
        let late = placed_record(ClientId::new(3), 150);

        let mut forward = store_for(&hub, HOST);
        forward.on_remote_update(id, &early);
        forward.on_remote_update(id, &late);

        let mut backward = store_for(&hub, ClientId::new(4));
        backward.on_remote_update(id, &late);
        backward.on_remote_update(id, &early);

        assert_eq!(forward.get(id).unwrap().placement_stamp(), Some((100, GUEST)));
        assert_eq!(forward.get(id), backward.get(id));
    }

    #[test]
    fn echoes_and_other_generations_are_ignored() {
        let hub = MemoryHub::new();
        let mut pieces = store_for(&hub, HOST);
        let id = PieceId::new(0, 0);
        assert_eq!(pieces.on_remote_update(id, &placed_record(HOST, 1)), RemoteApply::Echo);
        let old = PieceRecord {
            generation: 0,
            ..placed_record(GUEST, 1)
        };
        assert_eq!(pieces.on_remote_update(id, &old), RemoteApply::StaleGeneration);
        assert_eq!(pieces.placed_count(), 0);
    }

    #[test]
    fn remote_board_replaces_older_generation_only() {
        let hub = MemoryHub::new();
        let mut guest = store_for(&hub, GUEST);
        let next = generate_board(Difficulty::Medium, PuzzleType::Classic, 3, 2);
        assert_eq!(guest.apply_remote_board(&next.to_record(HOST)), BoardApply::Replaced);
        assert_eq!(guest.total(), 12);
        let older = generate_board(Difficulty::Easy, PuzzleType::Classic, 3, 1);
        assert_eq!(guest.apply_remote_board(&older.to_record(HOST)), BoardApply::Stale);
        assert_eq!(guest.generation(), 2);
    }

    #[test]
    fn write_all_echo_is_recognised() {
        let hub = MemoryHub::new();
        let mut host = store_for(&hub, HOST);
        let next = generate_board(Difficulty::Hard, PuzzleType::Rotating, 5, 2);
        host.write_all(next.clone()).unwrap();
        let Some(StoreValue::PieceMap(record)) = hub.read(&StorePath::pieces(&session())) else {
            panic!("piece map missing");
        };
        assert_eq!(host.apply_remote_board(&record), BoardApply::Echo);
        assert_eq!(host.board(), &next);
    }
}
