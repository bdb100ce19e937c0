use super::*;

use std::cell::Cell;
use std::rc::Rc;

use jigsync::{
    random_client_id, random_session_id, ClientBuilder, ClientError, ClientEvent, ClientHooks,
    Entitlements, GameClient, ManualClock, MemoryHub, ReleaseOutcome, RenderSurface, ScreenPoint,
};
use jigsync_core::{
    normalize_angle, ClientGameStats, PieceId, SessionId, SessionStatus, Vec3, WinnerRecord,
    QUARTER_TURN,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{sleep, Duration};

const SIM_START_MS: i64 = 1_000;

#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub clients: usize,
    pub difficulty: Difficulty,
    pub puzzle_type: PuzzleType,
    pub board_seed: Option<u32>,
    pub accuracy: f32,
    pub step_ms: u64,
    pub tick_ms: u64,
    pub max_ticks: u32,
    pub premium: bool,
    pub rules: RulesConfig,
}

#[derive(Debug)]
pub struct ClientReport {
    pub client_id: jigsync_core::ClientId,
    pub progress: f64,
    pub stats: ClientGameStats,
    pub completed_events: usize,
}

#[derive(Debug)]
pub struct SimReport {
    pub session: SessionId,
    pub ticks: u32,
    pub winner: Option<WinnerRecord>,
    pub clients: Vec<ClientReport>,
}

/// Pointer stand-in: picks whatever the bot aimed at and projects to the
/// point it chose.
#[derive(Default)]
struct AimSurface {
    target: Cell<Option<PieceId>>,
    point: Cell<Vec3>,
}

impl RenderSurface for AimSurface {
    fn pick(&self, _screen: ScreenPoint) -> Option<PieceId> {
        self.target.get()
    }

    fn project(&self, _screen: ScreenPoint) -> Vec3 {
        self.point.get()
    }
}

struct Bot {
    client: GameClient,
    surface: AimSurface,
    completed: Rc<Cell<usize>>,
}

impl Bot {
    fn new(client: GameClient, completed: Rc<Cell<usize>>) -> Self {
        Self {
            client,
            surface: AimSurface::default(),
            completed,
        }
    }

    fn is_done(&self) -> bool {
        self.client.status() == SessionStatus::Completed
    }

    /// One drag from pickup to release. Lost races against other bots come
    /// back as errors and are only logged.
    fn take_turn(&self, config: &SimConfig, rng: &mut StdRng) -> Result<(), ClientError> {
        let open: Vec<PieceId> = self
            .client
            .pieces()
            .into_iter()
            .filter(|view| !view.is_placed)
            .map(|view| view.id)
            .collect();
        if open.is_empty() {
            return Ok(());
        }
        let id = open[rng.random_range(0..open.len())];
        let Some(piece) = self.client.piece(id) else {
            return Ok(());
        };

        self.surface.target.set(Some(id));
        self.surface.point.set(piece.current.position);
        if self
            .client
            .pointer_down(&self.surface, ScreenPoint::new(0.0, 0.0))?
            .is_none()
        {
            return Ok(());
        }

        if config.puzzle_type.rotation_enabled() {
            let turns = (normalize_angle(piece.canonical.rotation - piece.current.rotation)
                / QUARTER_TURN)
                .round() as i32;
            if turns != 0 {
                self.client.rotate_selected(turns)?;
            }
        }

        let target = drop_point(piece.canonical.position, config, rng);
        self.surface.point.set(target);
        self.client
            .pointer_move(&self.surface, ScreenPoint::new(1.0, 1.0))?;
        match self.client.pointer_up()? {
            Some(ReleaseOutcome::Placed { piece, .. }) => {
                tracing::debug!(client = %self.client.client_id(), %piece, "placed");
            }
            Some(ReleaseOutcome::Missed { piece, .. }) => {
                tracing::debug!(client = %self.client.client_id(), %piece, "missed");
            }
            None => {}
        }
        Ok(())
    }

    fn report(&self) -> ClientReport {
        ClientReport {
            client_id: self.client.client_id(),
            progress: self.client.progress(),
            stats: self.client.stats(),
            completed_events: self.completed.get(),
        }
    }
}

fn drop_point(canonical: Vec3, config: &SimConfig, rng: &mut StdRng) -> Vec3 {
    let snap = config.difficulty.snap_distance();
    let hit = rng.random::<f32>() < config.accuracy;
    let radius = if hit {
        rng.random_range(0.0..=snap * 0.5)
    } else {
        rng.random_range(snap * 1.5..=snap * 3.0)
    };
    let theta = rng.random_range(0.0f32..std::f32::consts::TAU);
    canonical.offset(radius * theta.cos(), radius * theta.sin(), 0.0)
}

pub fn validate_sim_config(config: &SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.clients == 0 {
        return Err(err_msg("at least one client is required"));
    }
    if !(0.0..=1.0).contains(&config.accuracy) {
        return Err(err_msg("accuracy must be between 0 and 1"));
    }
    if config.step_ms == 0 {
        return Err(err_msg("step-ms must be positive"));
    }
    if config.max_ticks == 0 {
        return Err(err_msg("max-ticks must be positive"));
    }
    if config.puzzle_type.requires_premium() && !config.premium {
        return Err(err_msg("cylinder puzzles need --premium"));
    }
    config.rules.validate()?;
    Ok(())
}

/// Hosts a session, seats the guests, starts play and lets every bot take a
/// turn per tick until all of them see the session completed.
pub async fn run_sim(
    config: SimConfig,
    bot_seed: Option<u64>,
) -> Result<SimReport, Box<dyn std::error::Error>> {
    validate_sim_config(&config)?;
    let mut rng = {
        let base_seed = bot_seed.unwrap_or_else(|| rand::rng().random());
        StdRng::seed_from_u64(base_seed)
    };
    let board_seed = config.board_seed.unwrap_or_else(|| rng.random());

    let hub = MemoryHub::new();
    let clock = ManualClock::new(SIM_START_MS);
    let session = random_session_id(&mut rng);
    tracing::info!(%session, clients = config.clients, difficulty = %config.difficulty, puzzle_type = %config.puzzle_type, board_seed, "starting simulation");

    let mut bots = Vec::with_capacity(config.clients);
    for index in 0..config.clients {
        let completed = Rc::new(Cell::new(0usize));
        let counter = completed.clone();
        let hooks = ClientHooks::on_event(move |event| match event {
            ClientEvent::Completed { .. } => counter.set(counter.get() + 1),
            event if event.is_notice() => tracing::warn!(?event, "client notice"),
            _ => {}
        });
        let id = random_client_id(&mut rng);
        let builder = ClientBuilder::new(session.clone(), id)
            .name(format!("bot-{index}"))
            .rules(config.rules)
            .entitlements(Entitlements {
                premium: config.premium,
            })
            .clock(Rc::new(clock.clone()))
            .hooks(hooks);
        let store = Rc::new(hub.connect());
        let client = if index == 0 {
            builder.host(store, config.difficulty, config.puzzle_type, board_seed)?
        } else {
            builder.join(store)
        };
        hub.flush();
        bots.push(Bot::new(client, completed));
    }

    let host = &bots[0].client;
    host.start()?;
    hub.flush();

    let mut ticks = 0;
    while ticks < config.max_ticks && !bots.iter().all(Bot::is_done) {
        ticks += 1;
        clock.advance(config.step_ms as i64);
        for bot in &bots {
            if let Err(err) = bot.take_turn(&config, &mut rng) {
                tracing::debug!(client = %bot.client.client_id(), %err, "turn rejected");
            }
            hub.flush();
        }
        for bot in &bots {
            bot.client.tick();
        }
        hub.flush();
        if config.tick_ms > 0 {
            sleep(Duration::from_millis(config.tick_ms)).await;
        }
    }

    let winner = bots[0].client.winner();
    let clients = bots.iter().map(Bot::report).collect();
    for bot in &bots {
        bot.client.leave();
    }
    hub.flush();

    Ok(SimReport {
        session,
        ticks,
        winner,
        clients,
    })
}

fn err_msg(msg: &str) -> Box<dyn std::error::Error> {
    Box::new(std::io::Error::other(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(clients: usize) -> SimConfig {
        SimConfig {
            clients,
            difficulty: Difficulty::Easy,
            puzzle_type: PuzzleType::Classic,
            board_seed: Some(7),
            accuracy: 1.0,
            step_ms: 500,
            tick_ms: 0,
            max_ticks: 200,
            premium: false,
            rules: RulesConfig::default(),
        }
    }

    #[test]
    fn config_validation_rejects_bad_input() {
        assert!(validate_sim_config(&config(2)).is_ok());
        assert!(validate_sim_config(&SimConfig { clients: 0, ..config(2) }).is_err());
        assert!(validate_sim_config(&SimConfig { accuracy: 1.5, ..config(2) }).is_err());
        let cylinder = SimConfig {
            puzzle_type: PuzzleType::Cylinder,
            ..config(1)
        };
        assert!(validate_sim_config(&cylinder).is_err());
        assert!(validate_sim_config(&SimConfig { premium: true, ..cylinder }).is_ok());
    }

    #[test]
    fn misses_land_outside_the_snap_window() {
        let mut rng = StdRng::seed_from_u64(42);
        let miss = SimConfig {
            accuracy: 0.0,
            ..config(1)
        };
        let origin = Vec3::new(1.0, 1.0, 0.0);
        for _ in 0..32 {
            let point = drop_point(origin, &miss, &mut rng);
            assert!(point.distance(origin) > Difficulty::Easy.snap_distance());
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn solo_bot_finishes_easy_board() {
        let report = run_sim(config(1), Some(1)).await.unwrap();
        let winner = report.winner.expect("winner");
        assert_eq!(winner.client_id, report.clients[0].client_id);
        assert_eq!(report.clients[0].completed_events, 1);
        assert_eq!(report.clients[0].stats.accurate_drops, 6);
        assert!((report.clients[0].progress - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn every_bot_sees_one_completion() {
        let report = run_sim(config(3), Some(9)).await.unwrap();
        assert!(report.winner.is_some());
        assert!(report.ticks < 200);
        for client in &report.clients {
            assert_eq!(client.completed_events, 1);
        }
    }
}
