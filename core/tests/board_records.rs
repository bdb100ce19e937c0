use jigsync_core::{
    decode_value, encode_value, generate_board, Board, ClientId, Difficulty, PieceId,
    PieceRecord, PuzzleType, SessionRecord, SessionStatus, StoreValue, Vec3, WinnerRecord,
};

#[test]
fn piece_map_survives_the_wire() {
    let board = generate_board(Difficulty::Medium, PuzzleType::Cylinder, 0xC0FFEE, 4);
    let value = StoreValue::PieceMap(board.to_record(ClientId::new(1)));
    let bytes = encode_value(&value).expect("encode piece map");
    let Some(StoreValue::PieceMap(record)) = decode_value(&bytes) else {
        panic!("decoded value has the wrong kind");
    };
    assert_eq!(record.generation, 4);
    assert_eq!(record.pieces.len(), Difficulty::Medium.total_pieces());
    assert_eq!(Board::from_record(&record), board);
}

#[test]
fn completed_session_keeps_winner() {
    let record = SessionRecord {
        host_id: ClientId::new(9),
        status: SessionStatus::Completed,
        difficulty: Difficulty::Easy,
        puzzle_type: PuzzleType::Classic,
        generation: 1,
        seed: 3,
        started_at: Some(1_000),
        ended_at: Some(61_000),
        winner: Some(WinnerRecord {
            client_id: ClientId::new(9),
            name: "host".to_string(),
            score: 3_150,
            elapsed_ms: 60_000,
            move_count: 7,
            accurate_drops: 6,
            finished_at: 61_000,
        }),
        revision: 4,
        written_by: ClientId::new(9),
    };
    let bytes = encode_value(&StoreValue::Session(record.clone())).expect("encode session");
    assert_eq!(decode_value(&bytes), Some(StoreValue::Session(record)));
}

#[test]
fn truncated_bytes_do_not_decode() {
    let value = StoreValue::Piece(PieceRecord {
        position: Vec3::new(1.0, 2.0, 0.0),
        rotation: 0.0,
        is_placed: false,
        last_updated_by: ClientId::new(3),
        last_updated: 10,
        generation: 1,
    });
    let bytes = encode_value(&value).expect("encode piece");
    assert!(decode_value(&bytes[..bytes.len() / 2]).is_none());
}

#[test]
fn placing_every_piece_completes_the_board() {
    let mut board = generate_board(Difficulty::Easy, PuzzleType::Classic, 5, 1);
    let ids: Vec<PieceId> = board.pieces().map(|piece| piece.id).collect();
    for (idx, id) in ids.iter().enumerate() {
        assert!(!board.is_complete());
        let piece = board.get_mut(*id).unwrap();
        piece.snap_to_canonical();
        piece.last_writer = Some(ClientId::new(1));
        piece.last_write_time = idx as i64;
    }
    assert!(board.is_complete());
    assert_eq!(board.closing_placement(), Some((5, ClientId::new(1))));
}
