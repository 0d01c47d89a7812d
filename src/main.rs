//! # hkexport CLI
//!
//! Command-line tool for extracting workouts from an Apple Health XML export.
//!
//! ## Usage
//!
//! ```bash
//! # Full extraction with heart-rate/step correlation, JSON to a file
//! hkexport parse export.xml -o workouts.json
//!
//! # Workouts only, skipping time-series samples
//! hkexport parse export.xml --fast
//!
//! # Quick totals without JSON output
//! hkexport summary export.xml
//! ```

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;

use hkexport::export::{
    spawn_parse, FileChunkSource, ParseEvent, ParseMode, ParserConfig, WorkoutRecord,
};

/// hkexport - Streaming Health-Export Workout Parser
#[derive(Parser)]
#[command(name = "hkexport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an export and emit the workout records as JSON
    Parse {
        /// Input export.xml path
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output JSON path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Workouts only; skip heart-rate and step samples
        #[arg(long)]
        fast: bool,

        /// Workout activity types to extract (e.g. HKWorkoutActivityTypeCycling).
        /// May be given multiple times; defaults to running workouts.
        #[arg(long = "activity", value_name = "TYPE")]
        activities: Vec<String>,
    },

    /// Parse an export and print totals only
    Summary {
        /// Input export.xml path
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Parse {
            input,
            output,
            fast,
            activities,
        } => {
            let mut config = ParserConfig::default();
            if fast {
                config.mode = ParseMode::Fast;
            }
            if !activities.is_empty() {
                config.workout_markers = activities
                    .iter()
                    .map(|activity| format!("workoutActivityType=\"{activity}\""))
                    .collect();
            }
            let workouts = run_parse(config, &input)?;
            write_json(&workouts, output.as_deref())?;
            print_summary(&workouts);
        }
        Commands::Summary { input } => {
            let workouts = run_parse(ParserConfig::fast(), &input)?;
            print_summary(&workouts);
        }
    }

    Ok(())
}

/// Run the parse on a worker thread, rendering progress to stderr
fn run_parse(config: ParserConfig, input: &std::path::Path) -> Result<Vec<WorkoutRecord>> {
    let source = FileChunkSource::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;

    for event in spawn_parse(config, source) {
        match event {
            ParseEvent::Progress(progress) => {
                eprint!(
                    "\r{} {:>5.1}%  {} workouts, {} hr, {} steps",
                    style("parsing").dim(),
                    progress.fraction_complete * 100.0,
                    progress.counts.workouts,
                    progress.counts.hr_records,
                    progress.counts.step_records,
                );
                let _ = std::io::stderr().flush();
            }
            ParseEvent::Finished(workouts) => {
                eprintln!();
                return Ok(workouts);
            }
            ParseEvent::Failed(message) => {
                eprintln!();
                bail!("parse failed: {message}");
            }
        }
    }
    bail!("parser exited without a terminal message");
}

fn write_json(workouts: &[WorkoutRecord], output: Option<&std::path::Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, workouts)?;
            eprintln!("{} {}", style("wrote").green(), path.display());
        }
        None => {
            serde_json::to_writer_pretty(std::io::stdout().lock(), workouts)?;
            println!();
        }
    }
    Ok(())
}

fn print_summary(workouts: &[WorkoutRecord]) {
    let total_miles: f64 = workouts.iter().map(|w| w.distance_mi).sum();
    let total_minutes: f64 = workouts.iter().map(|w| w.duration_min).sum();
    eprintln!(
        "{}: {} workouts, {:.1} mi, {:.0} min",
        style("summary").bold(),
        workouts.len(),
        total_miles,
        total_minutes,
    );
}
