//! Radar Fusion CLI Application
//!
//! Replays a recorded CAN log through the radar fusion core:
//! - Loads capability flags, buses and DBC files from a TOML config
//! - Parses a candump log and feeds it to the core in fixed time windows
//! - Prints every committed cycle as one JSON line

use anyhow::{Context, Result};
use clap::Parser;
use radar_fusion::signals::dbc::parse_dbc_file;
use radar_fusion::{CandumpParser, CanFrame, FusionCore, SignalDatabase};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

mod config;
mod replay;

/// Radar Fusion - Replay a CAN log through the radar point table
#[derive(Parser, Debug)]
#[command(name = "radar-fusion-cli")]
#[command(about = "Replay a candump log through the radar fusion core", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (fusion.toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Path to candump log file to replay
    #[arg(short, long, value_name = "FILE")]
    log: PathBuf,

    /// Output file for emitted cycles (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Ego vehicle speed in m/s, held constant for the replay
    #[arg(long, value_name = "MPS", default_value_t = 0.0)]
    v_ego: f64,

    /// Stop after this many committed cycles
    #[arg(long, value_name = "COUNT")]
    max_cycles: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// Counters reported at the end of a replay
#[derive(Debug, Default)]
struct ReplaySummary {
    frames: usize,
    ticks: usize,
    cycles: usize,
    error_cycles: usize,
    measured_points: usize,
    first_frame_ns: Option<u64>,
    last_frame_ns: Option<u64>,
}

impl ReplaySummary {
    fn record_batch(&mut self, batch: &[CanFrame]) {
        self.ticks += 1;
        self.frames += batch.len();
        if let (Some(first), Some(last)) = (batch.first(), batch.last()) {
            self.first_frame_ns.get_or_insert(first.timestamp_ns);
            self.last_frame_ns = Some(last.timestamp_ns);
        }
    }

    fn log(&self) {
        log::info!("Replay finished");
        log::info!("  Frames:  {}", self.frames);
        log::info!("  Ticks:   {}", self.ticks);
        log::info!(
            "  Cycles:  {} ({} with CAN error)",
            self.cycles,
            self.error_cycles
        );
        log::info!("  Measured points: {}", self.measured_points);

        if let (Some(first), Some(last)) = (self.first_frame_ns, self.last_frame_ns) {
            let start = CanFrame::new(first, 0, 0, Vec::new()).timestamp();
            let end = CanFrame::new(last, 0, 0, Vec::new()).timestamp();
            let span: chrono::Duration = end - start;
            log::info!(
                "  Span: {} .. {} ({} ms)",
                start.format("%Y-%m-%d %H:%M:%S%.3f"),
                end.format("%H:%M:%S%.3f"),
                span.num_milliseconds()
            );
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Radar Fusion CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using fusion library v{}", radar_fusion::VERSION);

    let app_config = config::load_config(&args.config)?;
    log::debug!("Configuration loaded: {:?}", app_config);

    let db = load_database(&app_config.input.dbc_files)?;
    let stats = db.stats();
    log::info!(
        "Signal database: {} messages, {} signals",
        stats.num_messages,
        stats.num_signals
    );

    let mut core = FusionCore::from_database(&app_config.fusion_config(), &db)
        .context("Failed to build fusion core")?;
    log::info!(
        "Radar mode: {:?} ({} track slots)",
        core.mode(),
        core.resolution().track_count()
    );
    if !core.is_active() {
        log::warn!("No radar source is available; nothing will be emitted");
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let frames = CandumpParser::parse(&args.log)
        .with_context(|| format!("Failed to open log: {:?}", args.log))?;
    let mut summary = ReplaySummary::default();

    for batch in replay::Batches::new(frames, app_config.replay.batch_period_ms) {
        let batch = batch.with_context(|| format!("Failed to read log: {:?}", args.log))?;
        summary.record_batch(&batch);

        let Some(data) = core.update(&batch, args.v_ego) else {
            continue;
        };

        summary.cycles += 1;
        summary.measured_points += data.measured().count();
        if data.errors.can_error {
            summary.error_cycles += 1;
        }

        serde_json::to_writer(&mut out, &data)?;
        writeln!(out)?;

        if args.max_cycles.is_some_and(|max| summary.cycles >= max) {
            log::info!("Reached --max-cycles limit");
            break;
        }
    }
    out.flush()?;

    summary.log();
    Ok(())
}

/// Merge every DBC file into one database
fn load_database(paths: &[PathBuf]) -> Result<SignalDatabase> {
    let mut db = SignalDatabase::new();
    for path in paths {
        log::info!("Loading DBC: {:?}", path);
        let messages =
            parse_dbc_file(path).with_context(|| format!("Failed to load DBC: {:?}", path))?;
        for message in messages {
            db.add_message(message);
        }
    }
    Ok(db)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
