mod config;
mod container;
mod convert;
mod core;
mod output;
mod shared;
mod utils;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::container::{CaptureContainer, ContainerWriter};
use crate::core::pipeline;
use crate::core::progress::ProgressEvent;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract sensor frame streams from a capture file
    Extract {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        output_dir: Option<String>,
        #[arg(long, help = "Extract the depth stream")]
        depth: bool,
        #[arg(long, help = "Extract the color stream")]
        color: bool,
        #[arg(long, help = "Extract the infrared stream")]
        ir: bool,
        #[arg(long, help = "Optional pause between frames, in milliseconds")]
        throttle_ms: Option<u64>,
    },
    /// Print a capture file summary as JSON
    Info {
        #[arg(short, long)]
        input: String,
    },
    /// Build a capture file from a JSON description (testing utility)
    Pack {
        #[arg(short, long)]
        manifest: String,
        #[arg(short, long)]
        output: String,
    },
}

fn main() -> Result<()> {
    utils::logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Extract {
            input,
            output_dir,
            depth,
            color,
            ir,
            throttle_ms,
        } => run_extract(input, output_dir.as_deref(), *depth, *color, *ir, *throttle_ms),
        Commands::Info { input } => run_info(input),
        Commands::Pack { manifest, output } => run_pack(manifest, output),
    }
}

fn run_extract(
    input: &str,
    output_dir: Option<&str>,
    depth: bool,
    color: bool,
    ir: bool,
    throttle_ms: Option<u64>,
) -> Result<()> {
    let mut run_config = config::load_defaults().unwrap_or_default();
    // Any kind flag on the command line replaces the configured set
    if depth || color || ir {
        run_config.depth = depth;
        run_config.color = color;
        run_config.infrared = ir;
    }
    if let Some(dir) = output_dir {
        run_config.output_dir = PathBuf::from(dir);
    }
    if throttle_ms.is_some() {
        run_config.throttle_ms = throttle_ms;
    }

    if !run_config.any_enabled() {
        println!("No stream kinds enabled; pass --depth, --color and/or --ir.");
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();
    ctrlc::set_handler(move || {
        cancel_flag.store(true, Ordering::SeqCst);
    })?;

    utils::logger::info(&format!(
        "extract: input={} output={:?} depth={} color={} ir={}",
        input, run_config.output_dir, run_config.depth, run_config.color, run_config.infrared
    ));

    let (progress_rx, handle) =
        pipeline::run_in_background(PathBuf::from(input), run_config, cancel);

    let mut failed = false;
    for event in progress_rx {
        match event {
            ProgressEvent::Update { percent, phase } => {
                print!("\r[{:3}%] {}      ", percent, phase);
                let _ = std::io::stdout().flush();
            }
            ProgressEvent::Completed { frames } => {
                println!("\rCompleted! {} frames extracted.", frames);
            }
            ProgressEvent::Cancelled { frames } => {
                println!("\rCancelled after {} frames.", frames);
            }
            ProgressEvent::Failed { message } => {
                eprintln!("\rExtraction failed: {}", message);
                failed = true;
            }
        }
    }
    let _ = handle.join();

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Serialize)]
struct StreamSummary {
    tag: String,
    seekable: bool,
    event_count: u32,
}

#[derive(Serialize)]
struct CaptureSummary {
    path: String,
    creation_time: String,
    streams: Vec<StreamSummary>,
}

fn run_info(input: &str) -> Result<()> {
    let container = CaptureContainer::open(Path::new(input))?;
    let summary = CaptureSummary {
        path: input.to_string(),
        creation_time: container.creation_time().to_rfc3339(),
        streams: container
            .streams()
            .into_iter()
            .map(|s| StreamSummary {
                tag: s.tag,
                seekable: s.seekable,
                event_count: s.event_count,
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[derive(Deserialize)]
struct PackManifest {
    /// RFC 3339 capture creation time, e.g. "2020-01-01T00:00:00Z"
    creation_time: String,
    streams: Vec<PackStream>,
}

#[derive(Deserialize)]
struct PackStream {
    tag: String,
    events: Vec<PackEvent>,
}

#[derive(Deserialize)]
struct PackEvent {
    relative_ms: u16,
    /// Path of the raw frame payload, relative to the working directory
    file: String,
}

fn run_pack(manifest_path: &str, output: &str) -> Result<()> {
    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("Failed to read pack description: {}", manifest_path))?;
    let manifest: PackManifest =
        serde_json::from_str(&text).with_context(|| format!("Malformed pack description: {}", manifest_path))?;

    let creation = DateTime::parse_from_rfc3339(&manifest.creation_time)
        .with_context(|| format!("Bad creation_time: {}", manifest.creation_time))?
        .with_timezone(&Utc);

    let mut writer = ContainerWriter::new(creation);
    let mut event_total = 0;
    for stream in &manifest.streams {
        for event in &stream.events {
            let payload = utils::file_utils::read_file(Path::new(&event.file))?;
            writer.push_event(&stream.tag, event.relative_ms, &payload);
            event_total += 1;
        }
    }
    writer.write_to(Path::new(output))?;

    println!(
        "Packed {} events across {} streams into {}",
        event_total,
        manifest.streams.len(),
        output
    );
    Ok(())
}
