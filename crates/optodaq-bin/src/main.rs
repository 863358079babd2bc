//! optodaq command-line front end.
//!
//! ```bash
//! # kinetic series of 10 spectral frames with an excitation frame, prompting for the blank
//! optodaq run --steps 9 --excite
//!
//! # image run, no blank, stop after the third frame
//! optodaq run --read-mode image --no-blank --cancel-after 3
//!
//! # capture dark and blank references only
//! optodaq reference --read-mode fvb
//!
//! # one dark-corrected spectrum, then a raw full-resolution image
//! optodaq spectrum --dark
//! optodaq snapshot
//!
//! optodaq --config lab.toml show-config
//! ```
//!
//! Ctrl-C during a run requests cancellation; the run stops at its next checkpoint.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod console;
mod telemetry;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::Settings;
use console::{progress_line, stats_line, ConsolePrompt};
use optodaq_core::ReadMode;
use optodaq_driver_mock::build_commander;
use optodaq_experiment::{AcquisitionController, RunParameters, RunState, TaskArbiter};
use std::path::PathBuf;
use std::sync::Arc;
use telemetry::{parse_log_level, TracingConfig};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "optodaq", version)]
#[command(about = "Kinetic spectroscopy acquisition with dark and blank correction", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a dark reference and a corrected kinetic series
    Run {
        /// Index of the last step (captures steps+1 frames)
        #[arg(long)]
        steps: Option<u32>,

        /// Spectral trace or full image
        #[arg(long, value_enum)]
        read_mode: Option<ReadModeArg>,

        /// Capture one excitation frame before the series
        #[arg(long)]
        excite: bool,

        /// Skip the blank prompts and start with no blank reference
        #[arg(long)]
        no_blank: bool,

        /// Answer every prompt with OK
        #[arg(short, long)]
        yes: bool,

        /// Request cancellation once this many frames have been reported
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        cancel_after: Option<u64>,
    },

    /// Capture dark and blank references and print their statistics
    Reference {
        #[arg(long, value_enum, default_value = "spectral")]
        read_mode: ReadModeArg,
    },

    /// Capture one corrected frame outside a run
    Spectrum {
        #[arg(long, value_enum, default_value = "spectral")]
        read_mode: ReadModeArg,

        /// Capture a dark reference first
        #[arg(long)]
        dark: bool,

        /// Capture a blank reference first
        #[arg(long)]
        blank: bool,
    },

    /// Capture one uncorrected full-resolution image
    Snapshot,

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReadModeArg {
    #[value(alias = "fvb")]
    Spectral,
    Image,
}

impl From<ReadModeArg> for ReadMode {
    fn from(arg: ReadModeArg) -> Self {
        match arg {
            ReadModeArg::Spectral => ReadMode::Spectral,
            ReadModeArg::Image => ReadMode::Image,
        }
    }
}

struct RunOptions {
    steps: Option<u32>,
    read_mode: Option<ReadModeArg>,
    excite: bool,
    no_blank: bool,
    yes: bool,
    cancel_after: Option<u64>,
}

impl RunOptions {
    fn apply(&self, mut params: RunParameters) -> RunParameters {
        if let Some(steps) = self.steps {
            params.n_steps = steps;
        }
        if let Some(read_mode) = self.read_mode {
            params.read_mode = read_mode.into();
        }
        params.excite |= self.excite;
        params
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.log_level);
    telemetry::init(TracingConfig::new(parse_log_level(level)?).with_format(settings.log_format));

    match cli.command {
        Commands::Run {
            steps,
            read_mode,
            excite,
            no_blank,
            yes,
            cancel_after,
        } => {
            let options = RunOptions {
                steps,
                read_mode,
                excite,
                no_blank,
                yes,
                cancel_after,
            };
            run_series(&settings, options).await
        }
        Commands::Reference { read_mode } => capture_references(&settings, read_mode.into()),
        Commands::Spectrum {
            read_mode,
            dark,
            blank,
        } => capture_single(&settings, read_mode.into(), dark, blank),
        Commands::Snapshot => {
            let controller = controller(&settings)?;
            let image = controller.capture_snapshot()?;
            println!("image  {}", stats_line(&image));
            controller.shutdown()?;
            Ok(())
        }
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn controller(settings: &Settings) -> Result<AcquisitionController> {
    let commander = build_commander(settings.instrument.driver, &settings.detector)?;
    Ok(AcquisitionController::new(
        Arc::new(commander),
        TaskArbiter::new(settings.instrument.id.clone()),
    ))
}

async fn run_series(settings: &Settings, options: RunOptions) -> Result<()> {
    let controller = controller(settings)?;
    let params = options.apply(settings.run);

    // Prompts and the blank capture block; keep them off the async workers.
    let (run, mut progress) = tokio::task::block_in_place(|| {
        if options.no_blank {
            controller.start(params)
        } else {
            controller.start_with_prompts(params, &ConsolePrompt::new(options.yes))
        }
    })?;
    info!(
        run_id = %run.id(),
        expected = params.expected_notifications(),
        "Run started"
    );

    let token = run.cancel_token();
    let mut interruptible = true;
    loop {
        tokio::select! {
            note = progress.recv() => {
                let Some(note) = note else { break };
                println!("{}", progress_line(&note, progress.frame(&note).as_deref()));
                if options.cancel_after == Some(note.seq + 1) {
                    token.cancel();
                }
            }
            signal = tokio::signal::ctrl_c(), if interruptible && !token.is_cancelled() => {
                if interrupted(signal) {
                    token.cancel();
                } else {
                    interruptible = false;
                }
            }
        }
    }

    let state = run.wait().await;
    tokio::task::block_in_place(|| controller.shutdown())?;

    match state {
        RunState::Completed => {
            println!("Run {} completed", run.id());
            Ok(())
        }
        RunState::Cancelled => {
            println!("Run {} cancelled", run.id());
            Ok(())
        }
        RunState::Failed(failure) => bail!("Run {} failed: {}", run.id(), failure),
        other => bail!("Run {} ended in unexpected state {}", run.id(), other),
    }
}

fn capture_references(settings: &Settings, read_mode: ReadMode) -> Result<()> {
    let controller = controller(settings)?;

    let dark = controller.capture_dark(read_mode)?;
    println!("dark   {}", stats_line(&dark));

    let blank = controller.capture_blank(read_mode)?;
    println!("blank  {}", stats_line(&blank));

    controller.shutdown()?;
    Ok(())
}

/// True when Ctrl-C was received; false when the handler could not be installed.
fn interrupted(signal: std::io::Result<()>) -> bool {
    match signal {
        Ok(()) => {
            warn!("Interrupt received, cancelling run");
            true
        }
        Err(e) => {
            warn!(error = %e, "Could not listen for Ctrl-C, run is not interruptible");
            false
        }
    }
}

fn capture_single(settings: &Settings, read_mode: ReadMode, dark: bool, blank: bool) -> Result<()> {
    let controller = controller(settings)?;

    if dark {
        controller.capture_dark(read_mode)?;
    }
    if blank {
        controller.capture_blank(read_mode)?;
    }
    let frame = controller.capture_spectrum(read_mode)?;
    println!("{:<6} {}", read_mode.to_string(), stats_line(&frame));

    controller.shutdown()?;
    Ok(())
}
