use std::collections::BTreeMap;
use std::rc::Rc;

use jigsync_core::{
    saturating_ms, splitmix32, ClientId, Difficulty, PlayerRecord, PresenceRules, PuzzleType,
    SessionId, SessionRecord, SessionRules, SessionStatus, StorePath, StoreValue, WinnerRecord,
};
use tracing::{debug, info, warn};

use crate::error::{ClientError, HostAction, StoreError};
use crate::store::{DisconnectAction, RealtimeStore};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Entitlements {
    pub premium: bool,
}

impl Entitlements {
    pub fn premium() -> Self {
        Self { premium: true }
    }

    pub fn allows(self, puzzle_type: PuzzleType) -> bool {
        self.premium || !puzzle_type.requires_premium()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Online,
    /// Still flagged online but has not refreshed within the stale window.
    Stalled,
    Offline,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerPresence {
    pub record: PlayerRecord,
    pub liveness: Liveness,
}

/// A session record replacing the previous local copy.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionChange {
    pub previous: Option<SessionRecord>,
    pub current: SessionRecord,
}

impl SessionChange {
    pub fn status_changed(&self) -> bool {
        self.previous
            .as_ref()
            .map_or(true, |prev| prev.status != self.current.status)
    }

    /// True when the board was replaced, including the first record a
    /// client sees.
    pub fn generation_changed(&self) -> bool {
        self.previous
            .as_ref()
            .map_or(true, |prev| prev.generation != self.current.generation)
    }

    pub fn newly_completed(&self) -> Option<&WinnerRecord> {
        let was_completed = self.previous.as_ref().is_some_and(|prev| {
            prev.generation == self.current.generation && prev.status == SessionStatus::Completed
        });
        if was_completed || self.current.status != SessionStatus::Completed {
            return None;
        }
        self.current.winner.as_ref()
    }
}

/// Plan for replacing the board, produced by [`SessionController::begin_reconfigure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reconfigure {
    pub difficulty: Difficulty,
    pub puzzle_type: PuzzleType,
    pub generation: u32,
    pub seed: u32,
    pub resume: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct PlayClock {
    accumulated_ms: u64,
    running_since: Option<i64>,
}

impl PlayClock {
    fn start(&mut self, now: i64) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    fn stop(&mut self, now: i64) {
        if let Some(since) = self.running_since.take() {
            self.accumulated_ms += now.saturating_sub(since).max(0) as u64;
        }
    }

    fn elapsed(&self, now: i64) -> u64 {
        let running = self
            .running_since
            .map_or(0, |since| now.saturating_sub(since).max(0) as u64);
        self.accumulated_ms + running
    }
}

/// Session lifecycle, presence and the host-driven timer for one client.
pub struct SessionController {
    session: SessionId,
    local: ClientId,
    name: String,
    presence_rules: PresenceRules,
    session_rules: SessionRules,
    entitlements: Entitlements,
    store: Rc<dyn RealtimeStore>,
    record: Option<SessionRecord>,
    players: BTreeMap<ClientId, PlayerRecord>,
    clock: PlayClock,
    timer_ms: u64,
    last_timer_publish: Option<i64>,
    last_heartbeat: Option<i64>,
    joined_as_host: bool,
    failed_writes: Vec<(StorePath, StoreError)>,
}

impl SessionController {
    pub fn new(
        session: SessionId,
        local: ClientId,
        name: impl Into<String>,
        presence_rules: PresenceRules,
        session_rules: SessionRules,
        entitlements: Entitlements,
        store: Rc<dyn RealtimeStore>,
    ) -> Self {
        Self {
            session,
            local,
            name: name.into(),
            presence_rules,
            session_rules,
            entitlements,
            store,
            record: None,
            players: BTreeMap::new(),
            clock: PlayClock::default(),
            timer_ms: 0,
            last_timer_publish: None,
            last_heartbeat: None,
            joined_as_host: false,
            failed_writes: Vec::new(),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn local(&self) -> ClientId {
        self.local
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.record
            .as_ref()
            .map_or(SessionStatus::Waiting, |record| record.status)
    }

    pub fn generation(&self) -> u32 {
        self.record.as_ref().map_or(0, |record| record.generation)
    }

    pub fn is_host(&self) -> bool {
        self.record
            .as_ref()
            .is_some_and(|record| record.host_id == self.local)
    }

    pub fn winner(&self) -> Option<&WinnerRecord> {
        self.record.as_ref().and_then(|record| record.winner.as_ref())
    }

    pub fn timer_ms(&self) -> u64 {
        self.timer_ms
    }

    pub fn elapsed_ms(&self, now: i64) -> u64 {
        self.clock.elapsed(now)
    }

    pub fn entitlements(&self) -> Entitlements {
        self.entitlements
    }

    /// Store failures collected since the last call.
    pub fn drain_failed_writes(&mut self) -> Vec<(StorePath, StoreError)> {
        std::mem::take(&mut self.failed_writes)
    }

    /// Writes the initial record of a new session with this client as host.
    pub fn create(
        &mut self,
        difficulty: Difficulty,
        puzzle_type: PuzzleType,
        seed: u32,
    ) -> Result<&SessionRecord, ClientError> {
        if !self.entitlements.allows(puzzle_type) {
            return Err(ClientError::PremiumRequired(puzzle_type));
        }
        let record = SessionRecord {
            host_id: self.local,
            status: SessionStatus::Waiting,
            difficulty,
            puzzle_type,
            generation: 1,
            seed,
            started_at: None,
            ended_at: None,
            winner: None,
            revision: 0,
            written_by: self.local,
        };
        self.publish(record);
        info!(session = %self.session, %difficulty, %puzzle_type, "session created");
        self.record.as_ref().ok_or(ClientError::SessionMissing)
    }

    pub fn join(&mut self, is_host: bool, now: i64) {
        self.joined_as_host = is_host;
        let path = StorePath::player(&self.session, self.local);
        self.write_player(now);
        if let Err(err) = self
            .store
            .register_disconnect_action(&path, DisconnectAction::MarkOffline)
        {
            warn!(error = %err, "failed to register presence disconnect action");
            self.failed_writes.push((path, err));
        }
        info!(session = %self.session, client = %self.local, is_host, "joined");
    }

    pub fn leave(&mut self) {
        let path = StorePath::player(&self.session, self.local);
        if let Err(err) = self.store.cancel_disconnect_actions(&path) {
            self.failed_writes.push((path.clone(), err));
        }
        if let Err(err) = self.store.remove(&path) {
            warn!(error = %err, "failed to remove player record");
            self.failed_writes.push((path, err));
        }
        self.players.remove(&self.local);
        info!(session = %self.session, client = %self.local, "left");
    }

    /// Refreshes `last_active` once per heartbeat interval. Returns whether a
    /// write was issued.
    pub fn heartbeat(&mut self, now: i64) -> bool {
        let due = self.last_heartbeat.map_or(true, |last| {
            now.saturating_sub(last) >= saturating_ms(self.presence_rules.heartbeat_interval_ms)
        });
        if due {
            self.write_player(now);
        }
        due
    }

    pub fn apply_remote_player(&mut self, key: &str, record: Option<PlayerRecord>) {
        match record {
            Some(record) => {
                self.players.insert(record.id, record);
            }
            None => match u64::from_str_radix(key, 16) {
                Ok(id) => {
                    self.players.remove(&ClientId::new(id));
                }
                Err(_) => warn!(key, "removal for malformed player key"),
            },
        }
    }

    pub fn players(&self, now: i64) -> Vec<PlayerPresence> {
        let stale_after = saturating_ms(self.presence_rules.stale_after_ms);
        self.players
            .values()
            .map(|record| {
                let liveness = if !record.is_online {
                    Liveness::Offline
                } else if now.saturating_sub(record.last_active) > stale_after {
                    Liveness::Stalled
                } else {
                    Liveness::Online
                };
                PlayerPresence {
                    record: record.clone(),
                    liveness,
                }
            })
            .collect()
    }

    pub fn require_host(&self, action: HostAction) -> Result<&SessionRecord, ClientError> {
        let record = self.record.as_ref().ok_or(ClientError::SessionMissing)?;
        if record.host_id != self.local {
            return Err(ClientError::HostOnly(action));
        }
        Ok(record)
    }

    pub fn start(&mut self, now: i64) -> Result<(), ClientError> {
        let mut next = self.transition(HostAction::Start, SessionStatus::Waiting)?;
        next.status = SessionStatus::Playing;
        next.started_at = Some(now);
        next.ended_at = None;
        self.clock = PlayClock::default();
        self.clock.start(now);
        self.publish(next);
        Ok(())
    }

    pub fn pause(&mut self, now: i64) -> Result<(), ClientError> {
        let mut next = self.transition(HostAction::Pause, SessionStatus::Playing)?;
        next.status = SessionStatus::Paused;
        self.clock.stop(now);
        self.publish(next);
        Ok(())
    }

    pub fn resume(&mut self, now: i64) -> Result<(), ClientError> {
        let mut next = self.transition(HostAction::Resume, SessionStatus::Paused)?;
        next.status = SessionStatus::Playing;
        self.clock.start(now);
        self.publish(next);
        Ok(())
    }

    /// Moves the session to `waiting` on a fresh board generation. The caller
    /// publishes the new board and then calls [`Self::finish_reconfigure`].
    pub fn begin_reconfigure(
        &mut self,
        action: HostAction,
        difficulty: Difficulty,
        puzzle_type: PuzzleType,
        now: i64,
    ) -> Result<Reconfigure, ClientError> {
        let current = self.require_host(action)?.clone();
        if !self.entitlements.allows(puzzle_type) {
            return Err(ClientError::PremiumRequired(puzzle_type));
        }
        let generation = current.generation.wrapping_add(1);
        let plan = Reconfigure {
            difficulty,
            puzzle_type,
            generation,
            seed: splitmix32(current.seed ^ generation),
            resume: current.status == SessionStatus::Playing,
        };
        let next = SessionRecord {
            status: SessionStatus::Waiting,
            difficulty,
            puzzle_type,
            generation,
            seed: plan.seed,
            started_at: None,
            ended_at: None,
            winner: None,
            ..current
        };
        self.clock.stop(now);
        self.clock = PlayClock::default();
        self.publish(next);
        info!(
            %difficulty,
            %puzzle_type,
            generation,
            ?action,
            "board reconfigured"
        );
        Ok(plan)
    }

    pub fn finish_reconfigure(&mut self, plan: &Reconfigure, now: i64) -> Result<(), ClientError> {
        let mut next = self.require_host(HostAction::Reset)?.clone();
        if next.generation != plan.generation || !plan.resume {
            return Ok(());
        }
        next.status = SessionStatus::Playing;
        next.started_at = Some(now);
        self.clock.start(now);
        self.publish(next);
        Ok(())
    }

    /// Publishes the elapsed play time at most once per publish interval.
    /// Returns the published value, if any.
    pub fn tick_timer(&mut self, now: i64) -> Result<Option<u64>, ClientError> {
        let status = self.require_host(HostAction::TickTimer)?.status;
        if status != SessionStatus::Playing {
            return Ok(None);
        }
        let due = self.last_timer_publish.map_or(true, |last| {
            now.saturating_sub(last)
                >= saturating_ms(self.session_rules.timer_publish_interval_ms)
        });
        if !due {
            return Ok(None);
        }
        let elapsed = self.clock.elapsed(now);
        self.last_timer_publish = Some(now);
        self.publish_timer(elapsed);
        Ok(Some(elapsed))
    }

    pub fn reset_timer(&mut self) -> Result<(), ClientError> {
        self.require_host(HostAction::TickTimer)?;
        self.last_timer_publish = None;
        self.publish_timer(0);
        Ok(())
    }

    pub fn apply_remote_timer(&mut self, elapsed_ms: u64) {
        self.timer_ms = elapsed_ms;
    }

    /// Writes the completed record unless the session already completed.
    /// Returns whether this call finalized.
    pub fn complete(&mut self, winner: WinnerRecord, now: i64) -> Result<bool, ClientError> {
        let current = self.record.clone().ok_or(ClientError::SessionMissing)?;
        if current.status == SessionStatus::Completed {
            debug!("session already completed");
            return Ok(false);
        }
        self.clock.stop(now);
        info!(winner = %winner.client_id, score = winner.score, "finalizing session");
        let next = SessionRecord {
            status: SessionStatus::Completed,
            ended_at: Some(now),
            winner: Some(winner),
            ..current
        };
        self.publish(next);
        Ok(true)
    }

    /// Folds a delivered session record into the local copy. Returns `None`
    /// when the delivery is older than what is already held.
    ///
    /// Records order by generation, then revision. A completion of the held
    /// generation is folded in even when its revision is behind. When the
    /// host ends up holding something other than what was delivered, it
    /// writes its copy back so the stored value converges with the replicas.
    pub fn apply_remote_session(
        &mut self,
        record: &SessionRecord,
        now: i64,
    ) -> Option<SessionChange> {
        let previous = self.record.clone();
        if let Some(prev) = previous.as_ref() {
            let completes_held = record.generation == prev.generation
                && record.status == SessionStatus::Completed;
            if record.order_key() < prev.order_key() && !completes_held {
                debug!(
                    generation = record.generation,
                    revision = record.revision,
                    held_generation = prev.generation,
                    held_revision = prev.revision,
                    "dropping stale session record"
                );
                if record.written_by != self.local && self.is_host() {
                    info!(
                        generation = prev.generation,
                        "re-publishing session record over a stale write"
                    );
                    self.publish(prev.clone());
                }
                return None;
            }
        }
        let mut current = record.clone();
        if let Some(prev) = previous.as_ref() {
            if prev.generation == current.generation {
                current.revision = current.revision.max(prev.revision);
                if let (Some(held), Some(incoming)) = (prev.winner.as_ref(), current.winner.as_ref()) {
                    let kept = SessionRecord::first_winner(held, incoming).clone();
                    current.winner = Some(kept);
                }
                if prev.status == SessionStatus::Completed && current.winner.is_none() {
                    current.status = SessionStatus::Completed;
                    current.ended_at = prev.ended_at;
                    current.winner = prev.winner.clone();
                }
            }
        }
        if previous
            .as_ref()
            .map_or(true, |prev| prev.generation != current.generation)
        {
            self.clock = PlayClock::default();
            self.timer_ms = 0;
        }
        if current.status == SessionStatus::Playing {
            self.clock.start(now);
        } else {
            self.clock.stop(now);
        }
        self.record = Some(current.clone());
        if current.host_id == self.local && !current.same_content(record) {
            info!(
                status = current.status.label(),
                "re-publishing merged session record"
            );
            self.publish(current.clone());
        }
        Some(SessionChange { previous, current })
    }

    fn transition(
        &self,
        action: HostAction,
        from: SessionStatus,
    ) -> Result<SessionRecord, ClientError> {
        let record = self.require_host(action)?;
        if record.status != from {
            return Err(ClientError::InvalidTransition {
                from: record.status,
                action,
            });
        }
        Ok(record.clone())
    }

    fn publish(&mut self, mut record: SessionRecord) {
        let revision = self.record.as_ref().map_or(0, |held| held.revision) + 1;
        record.revision = revision;
        record.written_by = self.local;
        self.record = Some(record.clone());
        let path = StorePath::session_state(&self.session);
        debug!(status = record.status.label(), revision, "publishing session record");
        if let Err(err) = self.store.write(&path, StoreValue::Session(record)) {
            warn!(error = %err, "session write failed");
            self.failed_writes.push((path, err));
        }
    }

    fn publish_timer(&mut self, elapsed: u64) {
        self.timer_ms = elapsed;
        let path = StorePath::timer(&self.session);
        if let Err(err) = self.store.write(&path, StoreValue::Timer(elapsed)) {
            warn!(error = %err, "timer write failed");
            self.failed_writes.push((path, err));
        }
    }

    fn write_player(&mut self, now: i64) {
        self.last_heartbeat = Some(now);
        let record = PlayerRecord {
            id: self.local,
            name: self.name.clone(),
            is_host: self.joined_as_host,
            is_online: true,
            last_active: now,
        };
        self.players.insert(self.local, record.clone());
        let path = StorePath::player(&self.session, self.local);
        if let Err(err) = self.store.write(&path, StoreValue::Player(record)) {
            warn!(error = %err, "presence write failed");
            self.failed_writes.push((path, err));
        }
    }
}
