//! Gazemole - gaze-driven dwell whack-a-mole, headless runner.
//!
//! Reads the eye tracker's line feed from stdin or a file and drives the
//! game from a calloop event loop.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use calloop::channel::{self, Sender};
use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};

use gazemole_engine::clock::SystemClock;
use gazemole_engine::config::{ControllerType, GridOptions, IntersectionSource, OptionsHandle};
use gazemole_engine::game::renderer::LogRenderer;
use gazemole_engine::input_source::{InputEvent, InputProvider, LineProvider};
use gazemole_engine::session::Session;

#[derive(Parser, Debug)]
#[command(name = "gazemole", about = "Gaze-driven dwell whack-a-mole", version)]
struct Cli {
    /// Options file (JSON); defaults are used if it does not exist
    #[arg(long)]
    options: Option<PathBuf>,

    /// Tracker line feed (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Controller: gaze or mouse
    #[arg(long)]
    controller: Option<String>,

    /// Intersection source: calibrated or predicted
    #[arg(long)]
    source: Option<String>,

    /// Listen to the filtered intersection block
    #[arg(long)]
    filtered: bool,

    /// Seed for mole placement (default: random)
    #[arg(long)]
    seed: Option<u64>,

    /// Write the flow log (TSV) here on exit
    #[arg(long)]
    flow_log: Option<PathBuf>,

    /// Write per-plane gaze statistics here on exit
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Exit after N seconds; the game keeps running after the feed ends
    #[arg(long)]
    exit_after: Option<u64>,

    /// Trace every gaze cursor move
    #[arg(long)]
    trace_gaze: bool,
}

struct LoopState {
    session: Session,
    running: bool,
    /// Keep running after the input closes (until the exit timer).
    linger: bool,
    failure: Option<anyhow::Error>,
}

fn load_options(cli: &Cli) -> anyhow::Result<GridOptions> {
    let mut options = match &cli.options {
        Some(path) => GridOptions::load(path)?,
        None => GridOptions::default(),
    };

    if let Some(name) = &cli.controller {
        options.controller = ControllerType::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("unknown controller '{}'. Use: gaze or mouse", name))?;
    }
    if let Some(name) = &cli.source {
        options.intersection_source = IntersectionSource::parse(name)?;
    }
    if cli.filtered {
        options.intersection_source_filtered = true;
    }
    Ok(options)
}

/// Read the feed on its own thread; lines reach the loop through `sender`.
fn spawn_reader(input: Option<PathBuf>, sender: Sender<InputEvent>) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead + Send> = match input {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open input {}", path.display()))?;
            info!("reading tracker feed from {}", path.display());
            Box::new(BufReader::new(file))
        }
        None => {
            info!("reading tracker feed from stdin");
            Box::new(BufReader::new(std::io::stdin()))
        }
    };

    std::thread::Builder::new()
        .name("tracker-input".into())
        .spawn(move || {
            let mut provider = LineProvider::new(reader);
            while let Some(event) = provider.next_event() {
                if sender.send(event).is_err() {
                    break;
                }
            }
        })?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gazemole_engine=info,gazemole=info".into()),
        )
        .init();

    info!("gazemole v{} starting", env!("CARGO_PKG_VERSION"));

    let options = load_options(&cli)?;
    let tick_interval = Duration::from_millis(options.cell_tick_interval_ms.max(1) as u64);
    let mole_interval = Duration::from_millis(options.mole_timer_interval_ms.max(1));

    let rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let session = Session::new(
        OptionsHandle::new(options),
        Arc::new(SystemClock::new()),
        Box::new(LogRenderer {
            trace_gaze: cli.trace_gaze,
        }),
        rng,
    );

    let mut event_loop = EventLoop::<LoopState>::try_new()?;
    let handle = event_loop.handle();

    // Tracker feed
    let (sender, input) = channel::channel::<InputEvent>();
    handle
        .insert_source(input, |event, _, state: &mut LoopState| match event {
            channel::Event::Msg(input) => {
                if let Err(e) = state.session.apply(input) {
                    error!("tracker feed rejected: {}", e);
                    state.failure = Some(e.into());
                    state.running = false;
                }
            }
            channel::Event::Closed => {
                info!("tracker feed closed");
                if !state.linger {
                    state.running = false;
                }
            }
        })
        .map_err(|e| anyhow::anyhow!("failed to register input channel: {}", e.error))?;
    spawn_reader(cli.input.clone(), sender)?;

    // Cell ticker
    handle
        .insert_source(Timer::from_duration(tick_interval), move |_, _, state: &mut LoopState| {
            state.session.tick();
            TimeoutAction::ToDuration(tick_interval)
        })
        .map_err(|e| anyhow::anyhow!("failed to register cell timer: {}", e.error))?;

    // Mole ticker
    handle
        .insert_source(Timer::from_duration(mole_interval), move |_, _, state: &mut LoopState| {
            state.session.mole_tick();
            TimeoutAction::ToDuration(mole_interval)
        })
        .map_err(|e| anyhow::anyhow!("failed to register mole timer: {}", e.error))?;

    // SIGTERM / SIGINT
    let signals = Signals::new(&[Signal::SIGTERM, Signal::SIGINT])
        .map_err(|e| anyhow::anyhow!("failed to create signal source: {}", e))?;
    handle
        .insert_source(signals, |event, _, state: &mut LoopState| {
            info!("received signal {:?}, stopping", event.signal());
            state.running = false;
        })
        .map_err(|e| anyhow::anyhow!("failed to register signal handler: {}", e.error))?;

    if let Some(seconds) = cli.exit_after {
        info!("will exit after {} seconds", seconds);
        handle
            .insert_source(
                Timer::from_duration(Duration::from_secs(seconds)),
                |_, _, state: &mut LoopState| {
                    info!("exit timer fired");
                    state.running = false;
                    TimeoutAction::Drop
                },
            )
            .map_err(|e| anyhow::anyhow!("failed to register exit timer: {}", e.error))?;
    }

    let mut state = LoopState {
        session,
        running: true,
        linger: cli.exit_after.is_some(),
        failure: None,
    };
    state.session.start();

    while state.running {
        event_loop.dispatch(Some(Duration::from_millis(100)), &mut state)?;
    }

    info!(
        "final score {} after {} samples",
        state.session.game().score(),
        state.session.samples()
    );
    state.session.stop();

    if let Some(path) = &cli.flow_log {
        state
            .session
            .save_flow_log(path)
            .with_context(|| format!("failed to write flow log {}", path.display()))?;
    }
    if let Some(path) = &cli.stats {
        state
            .session
            .export_statistics(path)
            .with_context(|| format!("failed to write statistics {}", path.display()))?;
    }

    match state.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
