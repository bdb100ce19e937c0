use std::cell::RefCell;
use std::rc::{Rc, Weak};

use jigsync_core::{
    generate_board, saturating_ms, Board, ClientGameStats, ClientId, Difficulty, Piece, PieceId,
    PieceMapRecord, PieceRecord, ProgressAggregator, ProgressRecord, PuzzleType, RulesConfig,
    ScoringEngine, SessionId, SessionPath, SessionRecord, SessionStatus, StorePath, StoreValue,
    WinnerRecord,
};
use tracing::{debug, info, warn};

use crate::error::{ClientError, HostAction};
use crate::interaction::{InteractionMachine, PieceInteraction, ReleaseOutcome};
use crate::piece_store::{BoardApply, PieceStore, RemoteApply, WriteReceipt};
use crate::runtime::{ClientEvent, ClientHooks, ClientView, Clock, SystemClock};
use crate::session::{Entitlements, PlayerPresence, SessionChange, SessionController};
use crate::store::{RealtimeStore, StoreCallback, StoreChange, Subscription};
use crate::surface::{CameraControl, NoCamera, PieceView, RenderSurface, ScreenPoint};

struct ClientState {
    local: ClientId,
    view: ClientView,
    rules: RulesConfig,
    store: Rc<dyn RealtimeStore>,
    session: SessionController,
    pieces: PieceStore,
    interaction: InteractionMachine,
    scoring: ScoringEngine,
    progress: ProgressAggregator,
    finalized_generation: Option<u32>,
    complete_since: Option<i64>,
    events: Vec<ClientEvent>,
}

impl ClientState {
    fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    fn push(&mut self, event: ClientEvent) {
        self.events.push(event);
    }

    fn require_active(&self) -> Result<(), ClientError> {
        if self.view.is_active() {
            Ok(())
        } else {
            Err(ClientError::SessionMissing)
        }
    }

    fn fail(&mut self, message: String) {
        warn!(session = %self.session.session(), %message, "session failed");
        self.abort_drag();
        self.view = ClientView::Failed {
            message: message.clone(),
        };
        self.push(ClientEvent::SessionFailed { message });
    }

    fn abort_drag(&mut self) {
        if let Some(piece) = self.interaction.abort() {
            self.push(ClientEvent::DragAborted { piece });
        }
    }

    fn collect_failures(&mut self) {
        for (path, error) in self.session.drain_failed_writes() {
            self.push(ClientEvent::WriteFailed { path, error });
        }
    }

    fn note_receipt(&mut self, piece: PieceId, receipt: &WriteReceipt) {
        if let Err(error) = &receipt.published {
            self.push(ClientEvent::WriteFailed {
                path: StorePath::piece(self.session.session(), piece),
                error: error.clone(),
            });
        }
    }

    fn apply_change(&mut self, change: StoreChange, now: i64) {
        if matches!(self.view, ClientView::Failed { .. } | ClientView::Left) {
            return;
        }
        let Some(kind) = change.path.classify(self.session.session()) else {
            debug!(path = %change.path, "ignoring change outside the session");
            return;
        };
        match (kind, change.value) {
            (SessionPath::State, Some(StoreValue::Session(record))) => {
                self.on_session_record(&record, now)
            }
            (SessionPath::State, None) => self.fail("session was removed".to_string()),
            (SessionPath::Pieces, Some(StoreValue::PieceMap(record))) => self.on_board(&record, now),
            (SessionPath::Piece(id), Some(StoreValue::Piece(record))) => {
                self.on_piece(id, &record, now)
            }
            (SessionPath::Timer, Some(StoreValue::Timer(elapsed))) => {
                self.session.apply_remote_timer(elapsed)
            }
            (SessionPath::Progress, Some(StoreValue::Progress(record))) => {
                self.on_progress(&record)
            }
            (SessionPath::Player(key), Some(StoreValue::Player(record))) => {
                self.session.apply_remote_player(&key, Some(record))
            }
            (SessionPath::Player(key), None) => self.session.apply_remote_player(&key, None),
            (kind, value) => warn!(
                ?kind,
                value = value.as_ref().map(StoreValue::kind),
                "unexpected value at session path"
            ),
        }
    }

    fn on_session_record(&mut self, record: &SessionRecord, now: i64) {
        if let Some(change) = self.session.apply_remote_session(record, now) {
            self.after_session_change(change, now);
        }
        self.collect_failures();
    }

    fn apply_local_change(&mut self, previous: Option<SessionRecord>, now: i64) {
        let Some(current) = self.session.record().cloned() else {
            return;
        };
        if previous.as_ref() != Some(&current) {
            self.after_session_change(SessionChange { previous, current }, now);
        }
    }

    fn after_session_change(&mut self, change: SessionChange, now: i64) {
        if self.view == ClientView::Joining {
            self.view = ClientView::Active;
            self.push(ClientEvent::Joined {
                client_id: self.local,
                is_host: self.session.is_host(),
            });
        }
        let current = &change.current;
        if change.generation_changed() {
            self.abort_drag();
            self.scoring.reset(now);
            self.finalized_generation = None;
            self.complete_since = None;
            if self.progress.generation() != current.generation {
                self.progress
                    .reset(current.generation, current.difficulty.total_pieces());
            }
            if change.previous.is_some() {
                self.push(ClientEvent::ProgressChanged {
                    percent: self.progress.display(),
                });
                info!(
                    difficulty = %current.difficulty,
                    puzzle_type = %current.puzzle_type,
                    generation = current.generation,
                    "board replaced"
                );
                self.push(ClientEvent::Reconfigured {
                    difficulty: current.difficulty,
                    puzzle_type: current.puzzle_type,
                    generation: current.generation,
                });
            }
            self.refresh_progress(now);
        }
        if change.status_changed() {
            if current.status != SessionStatus::Playing {
                self.abort_drag();
            }
            let previous_status = change.previous.as_ref().map(|prev| prev.status);
            if current.status == SessionStatus::Playing
                && previous_status == Some(SessionStatus::Waiting)
            {
                self.scoring.reset(now);
            }
            self.push(ClientEvent::StatusChanged {
                status: current.status,
            });
        }
        if let Some(winner) = change.newly_completed() {
            info!(winner = %winner.client_id, score = winner.score, "session completed");
            self.push(ClientEvent::Completed {
                winner: winner.clone(),
            });
        }
    }

    fn on_board(&mut self, record: &PieceMapRecord, now: i64) {
        match self.pieces.apply_remote_board(record) {
            BoardApply::Replaced => {
                debug!(generation = record.generation, "piece map replaced");
                self.abort_drag();
                if self.progress.generation() != record.generation {
                    self.progress.reset(record.generation, self.pieces.total());
                }
                self.refresh_progress(now);
            }
            BoardApply::Echo | BoardApply::Stale => {}
        }
    }

    fn on_piece(&mut self, id: PieceId, record: &PieceRecord, now: i64) {
        match self.pieces.on_remote_update(id, record) {
            RemoteApply::Placed => {
                if self.interaction.active().is_some_and(|drag| drag.piece == id) {
                    self.abort_drag();
                }
                self.push(ClientEvent::PiecePlaced {
                    piece: id,
                    by: record.last_updated_by,
                    local: false,
                });
                self.refresh_progress(now);
            }
            // the placement stamp may have moved, which can change the closer
            RemoteApply::AlreadyPlaced => self.check_completion(now),
            RemoteApply::Echo
            | RemoteApply::Moved
            | RemoteApply::StaleGeneration
            | RemoteApply::UnknownPiece
            | RemoteApply::IgnoredRegression => {}
        }
    }

    fn on_progress(&mut self, record: &ProgressRecord) {
        let before = self.progress.display();
        if self.progress.apply_broadcast(record) && self.progress.display() != before {
            self.push(ClientEvent::ProgressChanged {
                percent: self.progress.display(),
            });
        }
    }

    fn update_progress(&mut self) -> bool {
        if self.pieces.generation() != self.progress.generation() {
            return false;
        }
        let before = self.progress.display();
        let display = self.progress.set_placed(self.pieces.placed_count());
        if display != before {
            self.push(ClientEvent::ProgressChanged { percent: display });
        }
        true
    }

    fn refresh_progress(&mut self, now: i64) {
        if self.update_progress() {
            self.check_completion(now);
        }
    }

    fn publish_progress(&mut self) {
        let path = StorePath::progress(self.session.session());
        let record = self.progress.record(self.local);
        if let Err(error) = self.store.write(&path, StoreValue::Progress(record)) {
            warn!(%error, "progress write failed");
            self.push(ClientEvent::WriteFailed { path, error });
        }
    }

    fn check_completion(&mut self, now: i64) {
        let generation = self.session.generation();
        let board_current =
            self.pieces.generation() == generation && self.progress.generation() == generation;
        if !board_current || !self.progress.is_complete() {
            self.complete_since = None;
            return;
        }
        if !matches!(
            self.session.status(),
            SessionStatus::Playing | SessionStatus::Paused
        ) {
            return;
        }
        if self.finalized_generation == Some(generation) {
            return;
        }
        let since = *self.complete_since.get_or_insert(now);
        let closer = self
            .pieces
            .board()
            .closing_placement()
            .map(|(_, writer)| writer);
        let grace = saturating_ms(self.rules.session.completion_grace_ms);
        if closer == Some(self.local) {
            self.finalize(now);
        } else if now.saturating_sub(since) >= grace {
            info!(?closer, "closer did not finalize in time");
            self.finalize(now);
        }
    }

    fn finalize(&mut self, now: i64) {
        self.finalized_generation = Some(self.session.generation());
        let elapsed = self.session.elapsed_ms(now);
        let stats = self.scoring.stats();
        let winner = WinnerRecord {
            client_id: self.local,
            name: self.session.name().to_string(),
            score: self.scoring.final_score(elapsed),
            elapsed_ms: elapsed,
            move_count: stats.move_count,
            accurate_drops: stats.accurate_drops,
            finished_at: now,
        };
        let previous = self.session.record().cloned();
        match self.session.complete(winner, now) {
            Ok(true) => self.apply_local_change(previous, now),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "could not finalize session"),
        }
        self.collect_failures();
    }

    fn create_session(
        &mut self,
        difficulty: Difficulty,
        puzzle_type: PuzzleType,
        seed: u32,
        now: i64,
    ) -> Result<(), ClientError> {
        let record = self.session.create(difficulty, puzzle_type, seed)?.clone();
        let board = generate_board(difficulty, puzzle_type, seed, record.generation);
        self.after_session_change(
            SessionChange {
                previous: None,
                current: record,
            },
            now,
        );
        self.write_board(board);
        self.session.reset_timer()?;
        self.publish_progress();
        self.session.join(true, now);
        self.collect_failures();
        Ok(())
    }

    fn write_board(&mut self, board: Board) {
        if let Err(error) = self.pieces.write_all(board) {
            self.push(ClientEvent::WriteFailed {
                path: StorePath::pieces(self.session.session()),
                error,
            });
        }
        self.progress.reset(self.pieces.generation(), self.pieces.total());
        self.update_progress();
    }

    fn pointer_down(
        &mut self,
        surface: &dyn RenderSurface,
        screen: ScreenPoint,
        now: i64,
    ) -> Result<Option<PieceId>, ClientError> {
        self.require_active()?;
        let Some(id) = surface.pick(screen) else {
            return Ok(None);
        };
        let grab = surface.project(screen);
        self.interaction
            .begin(&self.pieces, self.session.status(), id, grab, now)?;
        Ok(Some(id))
    }

    fn pointer_move(
        &mut self,
        surface: &dyn RenderSurface,
        screen: ScreenPoint,
        now: i64,
    ) -> Result<(), ClientError> {
        let Some(piece) = self.interaction.active().map(|drag| drag.piece) else {
            return Ok(());
        };
        let point = surface.project(screen);
        match self.interaction.drag_to(&mut self.pieces, point, now) {
            Ok(receipt) => {
                self.note_receipt(piece, &receipt);
                Ok(())
            }
            Err(err) => {
                self.push(ClientEvent::DragAborted { piece });
                Err(err)
            }
        }
    }

    fn rotate_selected(&mut self, quarter_turns: i32, now: i64) -> Result<(), ClientError> {
        let piece = self
            .interaction
            .active()
            .map(|drag| drag.piece)
            .ok_or(ClientError::NoActiveDrag)?;
        let was_active = self.interaction.active().is_some();
        match self.interaction.rotate_by(&mut self.pieces, quarter_turns, now) {
            Ok(receipt) => {
                self.note_receipt(piece, &receipt);
                Ok(())
            }
            Err(err) => {
                if was_active && self.interaction.active().is_none() {
                    self.push(ClientEvent::DragAborted { piece });
                }
                Err(err)
            }
        }
    }

    fn pointer_up(&mut self, now: i64) -> Result<Option<ReleaseOutcome>, ClientError> {
        let Some(piece) = self.interaction.active().map(|drag| drag.piece) else {
            return Ok(None);
        };
        let outcome = match self.interaction.release(&mut self.pieces, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.push(ClientEvent::DragAborted { piece });
                return Err(err);
            }
        };
        self.note_receipt(piece, outcome.receipt());
        match &outcome {
            ReleaseOutcome::Placed { started_at, .. } => {
                let score = self.scoring.record_placement(*started_at, now);
                debug!(
                    piece = %piece,
                    awarded = score.awarded,
                    quick = score.quick,
                    combo = score.combo_count,
                    "piece placed"
                );
                self.push(ClientEvent::PiecePlaced {
                    piece,
                    by: self.local,
                    local: true,
                });
                if self.update_progress() {
                    self.publish_progress();
                    self.check_completion(now);
                }
            }
            ReleaseOutcome::Missed { .. } => self.scoring.record_miss(),
        }
        Ok(Some(outcome))
    }

    fn host_action(&mut self, action: HostAction, now: i64) -> Result<(), ClientError> {
        self.require_active()?;
        let previous = self.session.record().cloned();
        match action {
            HostAction::Start => self.session.start(now)?,
            HostAction::Pause => self.session.pause(now)?,
            HostAction::Resume => self.session.resume(now)?,
            HostAction::TickTimer => {
                self.session.tick_timer(now)?;
            }
            HostAction::Reset | HostAction::SetDifficulty | HostAction::SetPuzzleType => {
                let (difficulty, puzzle_type) = self.current_layout()?;
                return self.reconfigure(action, difficulty, puzzle_type, now);
            }
        }
        self.apply_local_change(previous, now);
        self.collect_failures();
        Ok(())
    }

    fn current_layout(&self) -> Result<(Difficulty, PuzzleType), ClientError> {
        self.session
            .record()
            .map(|record| (record.difficulty, record.puzzle_type))
            .ok_or(ClientError::SessionMissing)
    }

    fn reconfigure(
        &mut self,
        action: HostAction,
        difficulty: Difficulty,
        puzzle_type: PuzzleType,
        now: i64,
    ) -> Result<(), ClientError> {
        self.require_active()?;
        let previous = self.session.record().cloned();
        let plan = self
            .session
            .begin_reconfigure(action, difficulty, puzzle_type, now)?;
        self.apply_local_change(previous, now);
        self.write_board(generate_board(
            plan.difficulty,
            plan.puzzle_type,
            plan.seed,
            plan.generation,
        ));
        self.session.reset_timer()?;
        self.publish_progress();
        let previous = self.session.record().cloned();
        self.session.finish_reconfigure(&plan, now)?;
        self.apply_local_change(previous, now);
        self.collect_failures();
        Ok(())
    }

    fn tick(&mut self, now: i64) {
        if !self.view.is_active() {
            return;
        }
        self.session.heartbeat(now);
        if self.session.is_host() {
            if let Err(err) = self.session.tick_timer(now) {
                warn!(error = %err, "timer tick failed");
            }
        }
        self.check_completion(now);
        self.collect_failures();
    }

    fn leave(&mut self) {
        self.abort_drag();
        if matches!(self.view, ClientView::Active | ClientView::Joining) {
            self.session.leave();
            self.collect_failures();
        }
        self.view = ClientView::Left;
    }
}

struct ClientInner {
    state: RefCell<ClientState>,
    hooks: ClientHooks,
    clock: Rc<dyn Clock>,
}

impl ClientInner {
    fn with_state<R>(&self, f: impl FnOnce(&mut ClientState, i64) -> R) -> R {
        let now = self.clock.now_ms();
        let (result, events) = {
            let mut state = self.state.borrow_mut();
            let result = f(&mut state, now);
            (result, state.take_events())
        };
        self.emit(events);
        result
    }

    fn read<R>(&self, f: impl FnOnce(&ClientState) -> R) -> R {
        f(&self.state.borrow())
    }

    fn on_change(&self, change: StoreChange) {
        let now = self.clock.now_ms();
        let events = match self.state.try_borrow_mut() {
            Ok(mut state) => {
                state.apply_change(change, now);
                state.take_events()
            }
            Err(_) => {
                warn!(path = %change.path, "store delivered re-entrantly; dropping change");
                return;
            }
        };
        self.emit(events);
    }

    fn emit(&self, events: Vec<ClientEvent>) {
        for event in events {
            (self.hooks.on_event)(event);
        }
    }
}

/// Collects everything a client needs before it touches the store.
pub struct ClientBuilder {
    session: SessionId,
    local: ClientId,
    name: String,
    rules: RulesConfig,
    entitlements: Entitlements,
    camera: Rc<dyn CameraControl>,
    clock: Rc<dyn Clock>,
    hooks: ClientHooks,
}

impl ClientBuilder {
    pub fn new(session: SessionId, local: ClientId) -> Self {
        Self {
            session,
            local,
            name: local.to_string(),
            rules: RulesConfig::default(),
            entitlements: Entitlements::default(),
            camera: Rc::new(NoCamera),
            clock: Rc::new(SystemClock),
            hooks: ClientHooks::empty(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn rules(mut self, rules: RulesConfig) -> Self {
        self.rules = rules;
        self
    }

    pub fn entitlements(mut self, entitlements: Entitlements) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn camera(mut self, camera: Rc<dyn CameraControl>) -> Self {
        self.camera = camera;
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn hooks(mut self, hooks: ClientHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Creates the session with this client as host, publishes the first
    /// board and joins it.
    pub fn host(
        self,
        store: Rc<dyn RealtimeStore>,
        difficulty: Difficulty,
        puzzle_type: PuzzleType,
        seed: u32,
    ) -> Result<GameClient, ClientError> {
        let client = self.build(store);
        client
            .inner
            .with_state(|state, now| state.create_session(difficulty, puzzle_type, seed, now))?;
        client.subscribe();
        Ok(client)
    }

    /// Joins an existing session. A failed subscription, or a session that
    /// cannot be read, leaves the client in [`ClientView::Failed`].
    pub fn join(self, store: Rc<dyn RealtimeStore>) -> GameClient {
        let client = self.build(store);
        if client.subscribe() && client.session_exists() {
            client.inner.with_state(|state, now| {
                state.session.join(false, now);
                state.collect_failures();
            });
        }
        client
    }

    fn build(self, store: Rc<dyn RealtimeStore>) -> GameClient {
        let scoring = ScoringEngine::new(self.rules.scoring, self.clock.now_ms());
        let session = SessionController::new(
            self.session.clone(),
            self.local,
            self.name,
            self.rules.presence,
            self.rules.session,
            self.entitlements,
            store.clone(),
        );
        let pieces = PieceStore::new(
            self.session,
            self.local,
            Board::empty(Difficulty::Easy, PuzzleType::Classic),
            store.clone(),
        );
        let state = ClientState {
            local: self.local,
            view: ClientView::Joining,
            rules: self.rules,
            store: store.clone(),
            session,
            pieces,
            interaction: InteractionMachine::new(self.camera),
            scoring,
            progress: ProgressAggregator::new(0, 0),
            finalized_generation: None,
            complete_since: None,
            events: Vec::new(),
        };
        GameClient {
            inner: Rc::new(ClientInner {
                state: RefCell::new(state),
                hooks: self.hooks,
                clock: self.clock,
            }),
            store,
            subscription: RefCell::new(None),
        }
    }
}

/// One participant in a shared puzzle session.
pub struct GameClient {
    inner: Rc<ClientInner>,
    store: Rc<dyn RealtimeStore>,
    subscription: RefCell<Option<Subscription>>,
}

impl GameClient {
    fn subscribe(&self) -> bool {
        let weak: Weak<ClientInner> = Rc::downgrade(&self.inner);
        let callback: StoreCallback = Rc::new(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.on_change(change);
            }
        });
        let path = self.inner.read(|state| StorePath::session(state.session.session()));
        match self.store.subscribe(&path, callback) {
            Ok(subscription) => {
                *self.subscription.borrow_mut() = Some(subscription);
                true
            }
            Err(err) => {
                self.inner
                    .with_state(|state, _| state.fail(format!("could not open session: {err}")));
                false
            }
        }
    }

    fn session_exists(&self) -> bool {
        let path = self.inner.read(|state| StorePath::session_state(state.session.session()));
        let failure = match self.store.read(&path) {
            Ok(Some(StoreValue::Session(_))) => return true,
            Ok(Some(other)) => format!("unexpected {} at the session path", other.kind()),
            Ok(None) => "session not found".to_string(),
            Err(err) => format!("could not read session: {err}"),
        };
        self.subscription.borrow_mut().take();
        self.inner.with_state(|state, _| state.fail(failure));
        false
    }

    pub fn client_id(&self) -> ClientId {
        self.inner.read(|state| state.local)
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.read(|state| state.session.session().clone())
    }

    pub fn view(&self) -> ClientView {
        self.inner.read(|state| state.view.clone())
    }

    pub fn is_host(&self) -> bool {
        self.inner.read(|state| state.session.is_host())
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read(|state| state.session.status())
    }

    pub fn session_record(&self) -> Option<SessionRecord> {
        self.inner.read(|state| state.session.record().cloned())
    }

    pub fn generation(&self) -> u32 {
        self.inner.read(|state| state.session.generation())
    }

    pub fn difficulty(&self) -> Difficulty {
        self.inner.read(|state| state.pieces.board().difficulty)
    }

    pub fn puzzle_type(&self) -> PuzzleType {
        self.inner.read(|state| state.pieces.board().puzzle_type)
    }

    pub fn pieces(&self) -> Vec<PieceView> {
        self.inner.read(|state| {
            let selected = state.interaction.active().map(|drag| drag.piece);
            state.pieces.views(selected)
        })
    }

    pub fn piece(&self, id: PieceId) -> Option<Piece> {
        self.inner.read(|state| state.pieces.get(id).cloned())
    }

    pub fn piece_state(&self, id: PieceId) -> PieceInteraction {
        self.inner
            .read(|state| state.interaction.state_of(&state.pieces, id))
    }

    pub fn selected(&self) -> Option<PieceId> {
        self.inner
            .read(|state| state.interaction.active().map(|drag| drag.piece))
    }

    pub fn placed_count(&self) -> usize {
        self.inner.read(|state| state.pieces.placed_count())
    }

    pub fn total_pieces(&self) -> usize {
        self.inner.read(|state| state.pieces.total())
    }

    pub fn progress(&self) -> f64 {
        self.inner.read(|state| state.progress.display())
    }

    pub fn stats(&self) -> ClientGameStats {
        self.inner.read(|state| state.scoring.stats().clone())
    }

    pub fn timer_ms(&self) -> u64 {
        self.inner.read(|state| state.session.timer_ms())
    }

    pub fn players(&self) -> Vec<PlayerPresence> {
        let now = self.inner.clock.now_ms();
        self.inner.read(|state| state.session.players(now))
    }

    pub fn winner(&self) -> Option<WinnerRecord> {
        self.inner.read(|state| state.session.winner().cloned())
    }

    pub fn pointer_down(
        &self,
        surface: &dyn RenderSurface,
        screen: ScreenPoint,
    ) -> Result<Option<PieceId>, ClientError> {
        self.inner
            .with_state(|state, now| state.pointer_down(surface, screen, now))
    }

    pub fn pointer_move(
        &self,
        surface: &dyn RenderSurface,
        screen: ScreenPoint,
    ) -> Result<(), ClientError> {
        self.inner
            .with_state(|state, now| state.pointer_move(surface, screen, now))
    }

    pub fn pointer_up(&self) -> Result<Option<ReleaseOutcome>, ClientError> {
        self.inner.with_state(|state, now| state.pointer_up(now))
    }

    pub fn rotate_selected(&self, quarter_turns: i32) -> Result<(), ClientError> {
        self.inner
            .with_state(|state, now| state.rotate_selected(quarter_turns, now))
    }

    pub fn start(&self) -> Result<(), ClientError> {
        self.host_action(HostAction::Start)
    }

    pub fn pause(&self) -> Result<(), ClientError> {
        self.host_action(HostAction::Pause)
    }

    pub fn resume(&self) -> Result<(), ClientError> {
        self.host_action(HostAction::Resume)
    }

    /// Regenerates the board with the current difficulty and puzzle type.
    pub fn reset(&self) -> Result<(), ClientError> {
        self.host_action(HostAction::Reset)
    }

    pub fn set_difficulty(&self, difficulty: Difficulty) -> Result<(), ClientError> {
        self.reconfigure(HostAction::SetDifficulty, |_, puzzle_type| {
            (difficulty, puzzle_type)
        })
    }

    pub fn set_puzzle_type(&self, puzzle_type: PuzzleType) -> Result<(), ClientError> {
        self.reconfigure(HostAction::SetPuzzleType, |difficulty, _| {
            (difficulty, puzzle_type)
        })
    }

    /// Heartbeat, host timer and the completion fallback. Call periodically.
    pub fn tick(&self) {
        self.inner.with_state(|state, now| state.tick(now));
    }

    pub fn leave(&self) {
        self.inner.with_state(|state, _| state.leave());
        self.subscription.borrow_mut().take();
    }

    /// Same as [`Self::leave`]; the only way out of [`ClientView::Failed`].
    pub fn return_to_lobby(&self) {
        self.leave();
    }

    fn host_action(&self, action: HostAction) -> Result<(), ClientError> {
        self.inner.with_state(|state, now| {
            let result = state.host_action(action, now);
            if let Err(err) = &result {
                state.push(ClientEvent::Rejected(err.clone()));
            }
            result
        })
    }

    fn reconfigure(
        &self,
        action: HostAction,
        layout: impl FnOnce(Difficulty, PuzzleType) -> (Difficulty, PuzzleType),
    ) -> Result<(), ClientError> {
        self.inner.with_state(|state, now| {
            let result = state.current_layout().and_then(|(difficulty, puzzle_type)| {
                let (difficulty, puzzle_type) = layout(difficulty, puzzle_type);
                state.reconfigure(action, difficulty, puzzle_type, now)
            });
            if let Err(err) = &result {
                state.push(ClientEvent::Rejected(err.clone()));
            }
            result
        })
    }
}
