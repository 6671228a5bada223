//! Cityscape CLI
//!
//! Command-line front end for replaying normalized traces: inspect a trace
//! file, seek the replay engine to a step, list consolidated entities, and
//! drill into nested containers.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Result};
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

use cityscape_replay::{child_range, consolidate_all, ReplayEngine};
use cityscape_trace::{EventKind, TraceDocument, TraceEvent};

#[derive(Parser)]
#[command(name = "cityscape")]
#[command(about = "Cityscape - execution trace replay and exploration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a trace file
    Inspect {
        /// Path to a normalized trace file
        #[arg(short, long)]
        trace: String,
    },
    /// Replay to a step and print the snapshot
    Seek {
        /// Path to a normalized trace file
        #[arg(short, long)]
        trace: String,
        /// Step to seek to; -1 for the state before any event
        #[arg(short, long)]
        step: i64,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Consolidate the whole trace and list the entities
    Entities {
        /// Path to a normalized trace file
        #[arg(short, long)]
        trace: String,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Drill into nested containers and list the entities at the end
    Drill {
        /// Path to a normalized trace file
        #[arg(short, long)]
        trace: String,
        /// Entity positions to descend through, comma separated
        #[arg(short, long, value_delimiter = ',')]
        path: Vec<usize>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { trace } => inspect(&trace),
        Commands::Seek {
            trace,
            step,
            pretty,
        } => seek(&trace, step, pretty),
        Commands::Entities { trace, pretty } => entities(&trace, pretty),
        Commands::Drill {
            trace,
            path,
            pretty,
        } => drill(&trace, &path, pretty),
    }
}

fn inspect(trace: &str) -> Result<()> {
    let document = TraceDocument::from_path(trace)?;

    println!("trace: {}", trace);
    for (key, value) in &document.metadata {
        println!("  {}: {}", key, value);
    }
    println!("events: {}", document.len());

    let mut histogram: IndexMap<EventKind, usize> = IndexMap::new();
    for event in &document.events {
        *histogram.entry(event.kind).or_insert(0) += 1;
    }
    for (kind, count) in &histogram {
        println!("  {:<14} {}", kind.as_str(), count);
    }
    Ok(())
}

fn seek(trace: &str, step: i64, pretty: bool) -> Result<()> {
    let document = TraceDocument::from_path(trace)?;
    let mut engine = ReplayEngine::new();
    engine.load_trace(document.events);
    engine.seek_to(step);

    let snapshot = engine.snapshot();
    let json = if pretty {
        snapshot.to_json_pretty()?
    } else {
        snapshot.to_json()?
    };
    println!("{}", json);
    Ok(())
}

fn entities(trace: &str, pretty: bool) -> Result<()> {
    let document = TraceDocument::from_path(trace)?;
    let list = consolidate_all(&document.events);
    print_json(&list, pretty)
}

fn drill(trace: &str, path: &[usize], pretty: bool) -> Result<()> {
    let document = TraceDocument::from_path(trace)?;
    let mut slice = document.events;

    for &position in path {
        let level = consolidate_all(&slice);
        let Some(entity) = level.get(position) else {
            bail!(
                "path position {} is out of range ({} entities at this level)",
                position,
                level.len()
            );
        };
        let Some(container) = entity.as_container() else {
            bail!("entity {} at this level is not a container", position);
        };
        let range = child_range(&container, &slice);
        let next: Vec<TraceEvent> = range.iter().map(|&index| slice[index].clone()).collect();
        slice = next;
    }

    let list = consolidate_all(&slice);
    print_json(&list, pretty)
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
