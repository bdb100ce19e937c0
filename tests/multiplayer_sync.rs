use std::cell::{Cell, RefCell};
use std::error::Error;
use std::rc::Rc;

use jigsync::{
    ClientBuilder, ClientError, ClientEvent, ClientHooks, ClientView, Clock, Entitlements, GameClient,
    HostAction, Liveness, ManualClock, MemoryHub, PieceInteraction, RealtimeStore, ReleaseOutcome,
    RenderSurface, ScreenPoint, StoreChange, StoreError,
};
use jigsync_core::{
    ClientId, Difficulty, PieceId, PieceRecord, PuzzleType, SessionId, SessionStatus, StorePath,
    StoreValue, Vec3,
};
use tracing_subscriber::EnvFilter;

const HOST: ClientId = ClientId::new(0x0A);
const GUEST: ClientId = ClientId::new(0x0B);
const THIRD: ClientId = ClientId::new(0x0C);

type TestResult = Result<(), Box<dyn Error>>;

#[derive(Default)]
struct TestSurface {
    target: Cell<Option<PieceId>>,
    point: Cell<Vec3>,
}

impl TestSurface {
    fn aim(&self, piece: PieceId, point: Vec3) {
        self.target.set(Some(piece));
        self.point.set(point);
    }
}

impl RenderSurface for TestSurface {
    fn pick(&self, _screen: ScreenPoint) -> Option<PieceId> {
        self.target.get()
    }

    fn project(&self, _screen: ScreenPoint) -> Vec3 {
        self.point.get()
    }
}

struct Table {
    hub: MemoryHub,
    clock: ManualClock,
    session: SessionId,
}

impl Table {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        Self {
            hub: MemoryHub::new(),
            clock: ManualClock::new(1_000),
            session: SessionId::parse("TableTest1").expect("valid session id"),
        }
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    fn builder(&self, id: ClientId, hooks: ClientHooks) -> ClientBuilder {
        ClientBuilder::new(self.session.clone(), id)
            .name(format!("player-{id}"))
            .clock(Rc::new(self.clock.clone()))
            .hooks(hooks)
    }

    fn host(&self, difficulty: Difficulty) -> Result<(GameClient, Events), ClientError> {
        let (events, hooks) = recorder();
        let client = self.builder(HOST, hooks).host(
            Rc::new(self.hub.connect()),
            difficulty,
            PuzzleType::Classic,
            7,
        )?;
        Ok((client, events))
    }

    fn join(&self, id: ClientId) -> (GameClient, Events) {
        let (events, hooks) = recorder();
        let client = self.builder(id, hooks).join(Rc::new(self.hub.connect()));
        (client, events)
    }

    /// Host plus one guest, both looking at a started game.
    fn playing_pair(&self) -> Result<(GameClient, Events, GameClient, Events), ClientError> {
        let (host, host_events) = self.host(Difficulty::Easy)?;
        let (guest, guest_events) = self.join(GUEST);
        self.hub.flush();
        host.start()?;
        self.hub.flush();
        Ok((host, host_events, guest, guest_events))
    }
}

type Events = Rc<RefCell<Vec<ClientEvent>>>;

fn recorder() -> (Events, ClientHooks) {
    let events: Events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    (events, ClientHooks::on_event(move |event| sink.borrow_mut().push(event)))
}

fn count(events: &Events, predicate: impl Fn(&ClientEvent) -> bool) -> usize {
    events.borrow().iter().filter(|event| predicate(event)).count()
}

fn piece_ids(client: &GameClient) -> Vec<PieceId> {
    client.pieces().into_iter().map(|view| view.id).collect()
}

fn grab(client: &GameClient, surface: &TestSurface, id: PieceId) -> Result<(), ClientError> {
    let piece = client.piece(id).ok_or(ClientError::UnknownPiece(id))?;
    surface.aim(id, piece.current.position);
    client.pointer_down(surface, ScreenPoint::new(0.0, 0.0))?;
    Ok(())
}

fn move_to(client: &GameClient, surface: &TestSurface, point: Vec3) -> Result<(), ClientError> {
    surface.point.set(point);
    client.pointer_move(surface, ScreenPoint::new(1.0, 1.0))
}

fn place(client: &GameClient, id: PieceId) -> Result<Option<ReleaseOutcome>, ClientError> {
    let surface = TestSurface::default();
    grab(client, &surface, id)?;
    let canonical = client
        .piece(id)
        .ok_or(ClientError::UnknownPiece(id))?
        .canonical
        .position;
    move_to(client, &surface, canonical.offset(0.05, -0.05, 0.0))?;
    client.pointer_up()
}

#[test]
fn single_player_easy_board_progress_and_completion() -> TestResult {
    let table = Table::new();
    let (host, events) = table.host(Difficulty::Easy)?;
    table.hub.flush();
    assert_eq!(host.view(), ClientView::Active);
    assert_eq!(host.total_pieces(), 6);
    host.start()?;
    table.hub.flush();

    let mut seen = vec![host.progress()];
    for id in piece_ids(&host) {
        table.clock.advance(500);
        let outcome = place(&host, id)?;
        assert!(matches!(outcome, Some(ReleaseOutcome::Placed { .. })));
        seen.push(host.progress());
        table.hub.flush();
    }
    assert_eq!(seen, vec![0.0, 16.67, 33.33, 50.0, 66.67, 83.33, 100.0]);

    table.clock.advance(10_000);
    host.tick();
    table.hub.flush();

    assert_eq!(host.status(), SessionStatus::Completed);
    assert_eq!(count(&events, |e| matches!(e, ClientEvent::Completed { .. })), 1);
    let winner = host.winner().ok_or("winner missing")?;
    assert_eq!(winner.client_id, HOST);
    assert_eq!(winner.move_count, 6);
    assert_eq!(winner.accurate_drops, 6);
    assert!(winner.score > 0);
    let stored = table.hub.read(&StorePath::session_state(&table.session));
    assert!(matches!(
        stored,
        Some(StoreValue::Session(record)) if record.winner.is_some()
    ));
    Ok(())
}

#[test]
fn guest_sees_drags_and_placements_without_being_blocked() -> TestResult {
    let table = Table::new();
    let (host, _, guest, guest_events) = table.playing_pair()?;
    assert_eq!(guest.view(), ClientView::Active);
    assert_eq!(guest.status(), SessionStatus::Playing);
    assert!(!guest.is_host());

    let ids = piece_ids(&host);
    let (held, other) = (ids[0], ids[1]);
    let surface = TestSurface::default();
    grab(&host, &surface, held)?;
    let start = host.piece(held).ok_or("piece missing")?.current.position;
    let dragged_to = start.offset(0.0, 0.5, 0.0);
    move_to(&host, &surface, dragged_to)?;
    table.hub.flush();

    let mirrored = guest.piece(held).ok_or("piece missing")?;
    assert_eq!(mirrored.current.position, dragged_to);
    assert!(!mirrored.is_placed);
    assert_eq!(guest.piece_state(held), PieceInteraction::Tray);

    // the guest is free to work on another piece meanwhile
    let outcome = place(&guest, other)?;
    assert!(matches!(outcome, Some(ReleaseOutcome::Placed { .. })));

    let canonical = host.piece(held).ok_or("piece missing")?.canonical.position;
    move_to(&host, &surface, canonical)?;
    host.pointer_up()?;
    table.hub.flush();

    assert_eq!(guest.placed_count(), 2);
    assert_eq!(host.placed_count(), 2);
    assert_eq!(guest.progress(), 33.33);
    assert_eq!(host.progress(), 33.33);
    assert_eq!(
        count(&guest_events, |e| matches!(
            e,
            ClientEvent::PiecePlaced { by, local: false, .. } if *by == HOST
        )),
        1
    );
    Ok(())
}

#[test]
fn difficulty_change_aborts_drags_and_resets_everyone() -> TestResult {
    let table = Table::new();
    let (host, _, guest, guest_events) = table.playing_pair()?;
    let ids = piece_ids(&host);
    place(&host, ids[0])?;
    table.hub.flush();
    assert_eq!(guest.placed_count(), 1);

    let surface = TestSurface::default();
    grab(&guest, &surface, ids[1])?;
    move_to(&guest, &surface, Vec3::new(0.0, 9.0, 0.0))?;
    assert_eq!(guest.selected(), Some(ids[1]));

    table.clock.advance(1_500);
    host.tick();
    table.hub.flush();
    assert_eq!(guest.timer_ms(), 1_500);

    host.set_difficulty(Difficulty::Medium)?;
    assert_eq!(host.generation(), 2);
    assert_eq!(host.total_pieces(), 12);
    assert_eq!(host.status(), SessionStatus::Playing);
    table.hub.flush();

    assert_eq!(guest.selected(), None);
    assert_eq!(
        count(&guest_events, |e| *e == ClientEvent::DragAborted { piece: ids[1] }),
        1
    );
    assert_eq!(
        count(&guest_events, |e| *e
            == ClientEvent::Reconfigured {
                difficulty: Difficulty::Medium,
                puzzle_type: PuzzleType::Classic,
                generation: 2,
            }),
        1
    );
    assert_eq!(guest.generation(), 2);
    assert_eq!(guest.difficulty(), Difficulty::Medium);
    assert_eq!(guest.total_pieces(), 12);
    assert_eq!(guest.placed_count(), 0);
    assert_eq!(guest.progress(), 0.0);
    assert_eq!(guest.stats().move_count, 0);
    assert_eq!(guest.status(), SessionStatus::Playing);
    assert_eq!(guest.pointer_up()?, None);
    assert_eq!(host.timer_ms(), 0);
    assert_eq!(guest.timer_ms(), 0);
    Ok(())
}

#[test]
fn release_racing_a_reconfigure_leaves_no_stray_placement() -> TestResult {
    let table = Table::new();
    let (host, _, guest, _) = table.playing_pair()?;
    let id = piece_ids(&guest)[2];
    let surface = TestSurface::default();
    grab(&guest, &surface, id)?;
    let canonical = guest.piece(id).ok_or("piece missing")?.canonical.position;
    move_to(&guest, &surface, canonical)?;

    host.set_difficulty(Difficulty::Hard)?;
    // the guest has not heard about the new board yet
    let outcome = guest.pointer_up()?;
    assert!(matches!(outcome, Some(ReleaseOutcome::Placed { .. })));
    table.hub.flush();

    assert_eq!(guest.generation(), 2);
    assert_eq!(guest.total_pieces(), 24);
    assert_eq!(guest.placed_count(), 0);
    assert_eq!(host.placed_count(), 0);
    assert_eq!(host.progress(), 0.0);
    assert_eq!(guest.progress(), 0.0);

    // a late joiner replays the leftover write and ignores it as well
    let (late, _) = table.join(THIRD);
    table.hub.flush();
    assert_eq!(late.total_pieces(), 24);
    assert_eq!(late.placed_count(), 0);
    Ok(())
}

#[test]
fn finish_of_a_replaced_board_does_not_stick_in_the_store() -> TestResult {
    let table = Table::new();
    let (host, host_events, guest, _) = table.playing_pair()?;
    let ids = piece_ids(&host);
    for id in &ids[..5] {
        place(&host, *id)?;
        table.hub.flush();
    }
    assert_eq!(guest.placed_count(), 5);

    host.set_difficulty(Difficulty::Medium)?;
    // the guest finishes the old board before the new one reaches it
    place(&guest, ids[5])?;
    table.hub.flush();

    let Some(StoreValue::Session(stored)) =
        table.hub.read(&StorePath::session_state(&table.session))
    else {
        return Err("session record missing".into());
    };
    assert_eq!(stored.generation, 2);
    assert_eq!(stored.status, SessionStatus::Playing);
    for client in [&host, &guest] {
        assert_eq!(client.generation(), 2);
        assert_eq!(client.status(), SessionStatus::Playing);
        assert_eq!(client.winner(), None);
    }
    assert_eq!(count(&host_events, |e| matches!(e, ClientEvent::Completed { .. })), 0);

    let (late, _) = table.join(THIRD);
    table.hub.flush();
    assert_eq!(late.generation(), 2);
    assert_eq!(late.status(), host.status());
    assert_eq!(late.total_pieces(), 12);
    assert_eq!(late.placed_count(), 0);
    Ok(())
}

#[test]
fn near_simultaneous_finish_completes_once() -> TestResult {
    let table = Table::new();
    let (host, host_events, guest, guest_events) = table.playing_pair()?;

    let completed_writes = Rc::new(Cell::new(0));
    let counter = completed_writes.clone();
    let spectator = table.hub.connect();
    let _watch = spectator.subscribe(
        &StorePath::session_state(&table.session),
        Rc::new(move |change: StoreChange| {
            if let Some(StoreValue::Session(record)) = change.value {
                if record.status == SessionStatus::Completed {
                    counter.set(counter.get() + 1);
                }
            }
        }),
    )?;

    let ids = piece_ids(&host);
    for id in &ids[..4] {
        table.clock.advance(200);
        place(&host, *id)?;
        table.hub.flush();
    }
    table.clock.advance(200);
    place(&host, ids[4])?;
    place(&guest, ids[5])?;
    table.hub.flush();

    assert_eq!(host.progress(), 100.0);
    assert_eq!(guest.progress(), 100.0);
    assert_eq!(completed_writes.get(), 1);

    table.clock.advance(10_000);
    host.tick();
    guest.tick();
    table.hub.flush();
    assert_eq!(completed_writes.get(), 1);

    // equal stamps fall back to the larger client id
    let winner = host.winner().ok_or("winner missing")?;
    assert_eq!(winner.client_id, GUEST);
    assert_eq!(guest.winner(), Some(winner));
    for events in [&host_events, &guest_events] {
        assert_eq!(count(events, |e| matches!(e, ClientEvent::Completed { .. })), 1);
    }
    Ok(())
}

#[test]
fn silent_closer_is_covered_after_grace() -> TestResult {
    let table = Table::new();
    let (host, _) = table.host(Difficulty::Easy)?;
    let guest_store = table.hub.connect();
    let guest_connection = guest_store.connection_id();
    let (events, hooks) = recorder();
    let guest = table.builder(GUEST, hooks).join(Rc::new(guest_store));
    table.hub.flush();
    host.start()?;
    table.hub.flush();

    let ids = piece_ids(&host);
    for id in &ids[..4] {
        place(&guest, *id)?;
        table.hub.flush();
    }
    place(&host, ids[4])?;
    // the guest places the last piece later than the host but never hears
    // about the host's piece before going silent
    table.clock.advance(100);
    place(&guest, ids[5])?;
    table.hub.drop_connection(guest_connection);
    table.hub.flush();

    assert_eq!(host.progress(), 100.0);
    assert_eq!(host.status(), SessionStatus::Playing);
    host.tick();
    assert_eq!(host.status(), SessionStatus::Playing);

    table.clock.advance(2_000);
    host.tick();
    assert_eq!(host.status(), SessionStatus::Completed);
    assert_eq!(host.winner().map(|winner| winner.client_id), Some(HOST));
    assert_eq!(count(&events, |e| matches!(e, ClientEvent::Completed { .. })), 0);
    Ok(())
}

#[test]
fn duplicate_remote_update_counts_once() -> TestResult {
    let table = Table::new();
    let (host, _) = table.host(Difficulty::Easy)?;
    table.hub.flush();
    host.start()?;
    table.hub.flush();

    let id = piece_ids(&host)[3];
    let record = PieceRecord {
        position: Vec3::ZERO,
        rotation: 0.0,
        is_placed: true,
        last_updated_by: THIRD,
        last_updated: table.now(),
        generation: 1,
    };
    let raw = table.hub.connect();
    let path = StorePath::piece(&table.session, id);
    raw.write(&path, StoreValue::Piece(record.clone()))?;
    raw.write(&path, StoreValue::Piece(record))?;
    table.hub.flush();

    assert_eq!(host.placed_count(), 1);
    assert_eq!(host.progress(), 16.67);
    let piece = host.piece(id).ok_or("piece missing")?;
    assert_eq!(piece.current, piece.canonical);
    Ok(())
}

#[test]
fn guests_cannot_drive_the_session() -> TestResult {
    let table = Table::new();
    let (_host, _, guest, guest_events) = table.playing_pair()?;
    let before = table.hub.read(&StorePath::session_state(&table.session));

    assert_eq!(guest.pause(), Err(ClientError::HostOnly(HostAction::Pause)));
    assert_eq!(
        guest.set_difficulty(Difficulty::Expert),
        Err(ClientError::HostOnly(HostAction::SetDifficulty))
    );
    assert_eq!(guest.reset(), Err(ClientError::HostOnly(HostAction::Reset)));
    table.hub.flush();

    assert_eq!(table.hub.read(&StorePath::session_state(&table.session)), before);
    assert_eq!(count(&guest_events, |e| matches!(e, ClientEvent::Rejected(_))), 3);
    assert_eq!(guest.status(), SessionStatus::Playing);
    Ok(())
}

#[test]
fn pause_aborts_the_host_drag_and_blocks_new_ones() -> TestResult {
    let table = Table::new();
    let (host, host_events, guest, _) = table.playing_pair()?;
    let ids = piece_ids(&host);
    let surface = TestSurface::default();
    grab(&host, &surface, ids[0])?;
    host.pause()?;
    assert_eq!(host.selected(), None);
    assert_eq!(
        count(&host_events, |e| *e == ClientEvent::DragAborted { piece: ids[0] }),
        1
    );
    table.hub.flush();
    assert_eq!(guest.status(), SessionStatus::Paused);
    assert_eq!(
        grab(&guest, &surface, ids[1]),
        Err(ClientError::NotPlaying(SessionStatus::Paused))
    );
    host.resume()?;
    table.hub.flush();
    grab(&guest, &surface, ids[1])?;
    Ok(())
}

#[test]
fn premium_puzzle_type_needs_entitlement() -> TestResult {
    let table = Table::new();
    let (host, _) = table.host(Difficulty::Easy)?;
    table.hub.flush();
    assert_eq!(
        host.set_puzzle_type(PuzzleType::Cylinder),
        Err(ClientError::PremiumRequired(PuzzleType::Cylinder))
    );
    assert_eq!(host.generation(), 1);

    let premium_table = Table::new();
    let (events, hooks) = recorder();
    let premium = premium_table
        .builder(HOST, hooks)
        .entitlements(Entitlements::premium())
        .host(
            Rc::new(premium_table.hub.connect()),
            Difficulty::Easy,
            PuzzleType::Classic,
            3,
        )?;
    premium_table.hub.flush();
    premium.set_puzzle_type(PuzzleType::Cylinder)?;
    assert_eq!(premium.puzzle_type(), PuzzleType::Cylinder);
    assert_eq!(premium.total_pieces(), 6);
    assert_eq!(count(&events, |e| matches!(e, ClientEvent::Rejected(_))), 0);
    Ok(())
}

#[test]
fn failed_write_keeps_local_placement() -> TestResult {
    let table = Table::new();
    let (host, _) = table.host(Difficulty::Easy)?;
    let guest_store = table.hub.connect();
    let guest_connection = guest_store.connection_id();
    let (events, hooks) = recorder();
    let guest = table.builder(GUEST, hooks).join(Rc::new(guest_store));
    table.hub.flush();
    host.start()?;
    table.hub.flush();

    table.hub.set_reachable(guest_connection, false);
    let id = piece_ids(&guest)[0];
    let outcome = place(&guest, id)?;
    assert!(matches!(outcome, Some(ReleaseOutcome::Placed { .. })));
    table.hub.flush();

    assert_eq!(guest.placed_count(), 1);
    assert_eq!(host.placed_count(), 0);
    let failures = events
        .borrow()
        .iter()
        .filter(|event| {
            matches!(
                event,
                ClientEvent::WriteFailed { error: StoreError::Unreachable, .. }
            )
        })
        .count();
    // the move, the placement and the progress broadcast
    assert_eq!(failures, 3);
    Ok(())
}

#[test]
fn presence_tracks_disconnects_and_leaves() -> TestResult {
    let table = Table::new();
    let (host, _) = table.host(Difficulty::Easy)?;
    let guest_store = table.hub.connect();
    let guest_connection = guest_store.connection_id();
    let guest = table
        .builder(GUEST, ClientHooks::empty())
        .join(Rc::new(guest_store));
    let (third, _) = table.join(THIRD);
    table.hub.flush();
    assert_eq!(host.players().len(), 3);

    table.hub.drop_connection(guest_connection);
    third.leave();
    table.hub.flush();

    let players = host.players();
    assert_eq!(players.len(), 2);
    let guest_presence = players
        .iter()
        .find(|presence| presence.record.id == GUEST)
        .ok_or("guest missing")?;
    assert_eq!(guest_presence.liveness, Liveness::Offline);
    assert!(players.iter().all(|presence| presence.record.id != THIRD));
    assert_eq!(third.view(), ClientView::Left);
    drop(guest);
    Ok(())
}

#[test]
fn host_timer_reaches_guests() -> TestResult {
    let table = Table::new();
    let (host, _, guest, _) = table.playing_pair()?;
    table.clock.advance(1_500);
    host.tick();
    guest.tick();
    table.hub.flush();
    assert_eq!(host.timer_ms(), 1_500);
    assert_eq!(guest.timer_ms(), 1_500);
    Ok(())
}

#[test]
fn unreadable_session_fails_the_join() -> TestResult {
    let table = Table::new();
    let store = table.hub.connect();
    table.hub.set_reachable(store.connection_id(), false);
    let (events, hooks) = recorder();
    let guest = table.builder(GUEST, hooks).join(Rc::new(store));

    assert!(matches!(guest.view(), ClientView::Failed { .. }));
    assert_eq!(
        count(&events, |e| matches!(e, ClientEvent::SessionFailed { .. })),
        1
    );
    let surface = TestSurface::default();
    surface.aim(PieceId::new(0, 0), Vec3::ZERO);
    assert_eq!(
        guest.pointer_down(&surface, ScreenPoint::new(0.0, 0.0)),
        Err(ClientError::SessionMissing)
    );
    guest.return_to_lobby();
    assert_eq!(guest.view(), ClientView::Left);
    Ok(())
}

#[test]
fn joining_a_missing_session_fails() -> TestResult {
    let table = Table::new();
    let (guest, events) = table.join(GUEST);

    assert_eq!(
        guest.view(),
        ClientView::Failed {
            message: "session not found".to_string(),
        }
    );
    assert_eq!(
        table.hub.read(&StorePath::player(&table.session, GUEST)),
        None
    );
    table.clock.advance(60_000);
    guest.tick();
    table.hub.flush();
    assert_eq!(
        count(&events, |e| matches!(e, ClientEvent::SessionFailed { .. })),
        1
    );
    assert!(matches!(guest.view(), ClientView::Failed { .. }));
    Ok(())
}
