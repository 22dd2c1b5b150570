//! Runs the reference board on simulated peripherals.
//!
//! ```text
//! idhal-sim [SETUP.json] [RUN_MS]
//! ```
//!
//! Without a setup file the reference wiring is used. `RUST_LOG` selects the
//! log level (`info` by default). The job counters are printed as JSON at
//! the end.

use std::time::Duration;

use anyhow::Context;
use tokio::time::{self, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use idhal_sim::{BoardSetup, SimBoard, Ticker};

const DEFAULT_RUN_MS: u64 = 1_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let setup = match args.next() {
        Some(path) => BoardSetup::load(&path).with_context(|| format!("loading {path}"))?,
        None => BoardSetup::default(),
    };
    let run_ms = args
        .next()
        .map(|ms| ms.parse::<u64>())
        .transpose()
        .context("run time must be a number of milliseconds")?
        .unwrap_or(DEFAULT_RUN_MS);

    setup.validate().context("invalid board setup")?;

    let mut board = SimBoard::new(setup);
    board.bring_up().context("board bring-up failed")?;

    let ticker = Ticker::new(board.pit()).start();
    let deadline = Instant::now() + Duration::from_millis(run_ms);
    while Instant::now() < deadline {
        board.poll().context("main loop failed")?;
        time::sleep(Duration::from_millis(1)).await;
    }
    let termination = ticker.shutdown().await;

    let stats = board.stats();
    info!(
        frames = stats.frames,
        samples = stats.samples,
        log_blocks = stats.log_blocks,
        ?termination,
        "Simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
