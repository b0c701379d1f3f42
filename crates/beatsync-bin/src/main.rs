// beatsync: command-line front end for charts, scores and offline playback runs.

mod chart;
mod simulate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use beatsync_score::BeatScore;
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "beatsync", about = "Beat-synchronized music playback toolkit")]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a beat chart and list the actions on the quantized grid.
    Chart {
        file: PathBuf,

        /// Subdivision the grid must be a multiple of.
        #[arg(long)]
        grid: Option<u32>,

        /// Print the chart regenerated from the parsed actions instead.
        #[arg(long)]
        encode: bool,
    },

    /// Regenerate a score's timing table from its BPM curve.
    Bake {
        score: PathBuf,

        /// Output path; defaults to overwriting the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Play a score against the in-memory backend on a simulated clock.
    Simulate {
        score: PathBuf,

        /// Simulated run length in seconds.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        /// Update rate of the simulated host loop.
        #[arg(long, default_value_t = 60.0)]
        fps: f64,

        /// Clock time at which playback is paused.
        #[arg(long, requires = "pause_for")]
        pause_at: Option<f64>,

        /// Seconds the pause lasts before a countdown resume fires.
        #[arg(long, requires = "pause_at")]
        pause_for: Option<f64>,

        /// Playback config JSON; defaults are used when absent.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match args.command {
        Command::Chart { file, grid, encode } => chart::run(&file, grid, encode),
        Command::Bake { score, output } => bake(&score, output.as_deref().unwrap_or(&score)),
        Command::Simulate {
            score,
            seconds,
            fps,
            pause_at,
            pause_for,
            config,
        } => {
            let options = simulate::Options {
                seconds,
                fps,
                pause: pause_at.zip(pause_for),
                config,
            };
            simulate::run(&score, &options)
        }
    }
}

fn bake(input: &Path, output: &Path) -> Result<()> {
    let score = BeatScore::read(input)?;
    let baked = score
        .rebake()
        .with_context(|| format!("Failed to bake {}", input.display()))?;
    baked.write(output)?;
    info!(
        "Baked {} ticks ({} intro) into {}",
        baked.total_tick_sum(),
        baked.intro_tick_sum(),
        output.display()
    );
    Ok(())
}
