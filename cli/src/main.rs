use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jigsync_core::{Difficulty, PuzzleType, RulesConfig, ALL_DIFFICULTIES, ALL_PUZZLE_TYPES};
use tracing_subscriber::EnvFilter;

mod bot;

use bot::{run_sim, SimConfig};

#[derive(Parser)]
#[command(name = "jigsync-cli", version, about = "Tools for shared jigsaw sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays a whole session with simulated clients over an in-memory store.
    Sim {
        #[arg(long, default_value_t = 2)]
        clients: usize,
        #[arg(long, default_value = "easy")]
        difficulty: Difficulty,
        #[arg(long, default_value = "classic")]
        puzzle_type: PuzzleType,
        /// Board seed, decimal or 0x-prefixed hex.
        #[arg(long)]
        seed: Option<String>,
        /// Seed for the bots' choices; random when omitted.
        #[arg(long)]
        bot_seed: Option<u64>,
        /// Chance that a drop lands inside the snap window.
        #[arg(long, default_value_t = 0.8)]
        accuracy: f32,
        /// Simulated milliseconds between bot turns.
        #[arg(long, default_value_t = 700)]
        step_ms: u64,
        /// Wall-clock pause per turn, zero to run flat out.
        #[arg(long, default_value_t = 0)]
        tick_ms: u64,
        #[arg(long, default_value_t = 500)]
        max_ticks: u32,
        #[arg(long, env = "JIGSYNC_RULES")]
        config: Option<PathBuf>,
        #[arg(long)]
        premium: bool,
    },
    /// Lists the difficulty table and puzzle types.
    Difficulties,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Parses and validates a rules file, then prints the effective values.
    Check { path: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sim {
            clients,
            difficulty,
            puzzle_type,
            seed,
            bot_seed,
            accuracy,
            step_ms,
            tick_ms,
            max_ticks,
            config,
            premium,
        } => {
            let rules = match config.as_deref() {
                Some(path) => RulesConfig::load(path)?,
                None => RulesConfig::default(),
            };
            let board_seed = match seed.as_deref() {
                Some(raw) => Some(parse_seed_arg(raw)?),
                None => None,
            };
            let config = SimConfig {
                clients,
                difficulty,
                puzzle_type,
                board_seed,
                accuracy,
                step_ms,
                tick_ms,
                max_ticks,
                premium,
                rules,
            };
            let report = run_sim(config, bot_seed).await?;
            println!("session: {}", report.session);
            println!("ticks: {}", report.ticks);
            for line in &report.clients {
                println!(
                    "client {}: progress={:.0}% moves={} accurate={} points={} completed_events={}",
                    line.client_id,
                    line.progress,
                    line.stats.move_count,
                    line.stats.accurate_drops,
                    line.stats.points,
                    line.completed_events
                );
            }
            match &report.winner {
                Some(winner) => println!(
                    "winner: {} ({}) score={} elapsed={}ms",
                    winner.name, winner.client_id, winner.score, winner.elapsed_ms
                ),
                None => println!("winner: none (stopped after {} ticks)", report.ticks),
            }
        }
        Commands::Difficulties => {
            println!("{:<8} {:>6} {:>7} {:>5} {:>9}", "level", "grid", "pieces", "snap", "rot_tol");
            for difficulty in ALL_DIFFICULTIES {
                let grid = difficulty.grid();
                println!(
                    "{:<8} {:>6} {:>7} {:>5.2} {:>8.0}°",
                    difficulty.label(),
                    format!("{}x{}", grid.cols, grid.rows),
                    difficulty.total_pieces(),
                    difficulty.snap_distance(),
                    difficulty.rotation_tolerance_deg()
                );
            }
            println!();
            for puzzle_type in ALL_PUZZLE_TYPES {
                let mut notes = Vec::new();
                if puzzle_type.rotation_enabled() {
                    notes.push("rotation");
                }
                if puzzle_type.requires_premium() {
                    notes.push("premium");
                }
                println!("{:<8} {}", puzzle_type.label(), notes.join(", "));
            }
        }
        Commands::Config { command } => match command {
            ConfigCommand::Check { path } => {
                let rules = RulesConfig::load(&path)?;
                println!("{rules:#?}");
            }
        },
    }

    Ok(())
}

fn parse_seed_arg(raw: &str) -> Result<u32, Box<dyn std::error::Error>> {
    let trimmed = raw.trim();
    let value = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)?
    } else {
        trimmed.parse::<u32>()?
    };
    Ok(value)
}
