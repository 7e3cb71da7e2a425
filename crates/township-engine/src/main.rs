//! Township engine binary.
//!
//! Wires the world, the step loop, the out-of-band operation executor and
//! the generation bucket scheduler together and runs until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `township-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the world and its step loop
//! 4. Create the generation budget and start the bucket scheduler
//! 5. Start the operation executor
//! 6. Queue the seed agents
//! 7. Run the step loop until Ctrl-C

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use township_core::config::LoggingConfig;
use township_core::{BudgetStore, Game, InMemoryBudgetStore, Input, SimulationConfig, World};
use township_engine::executor::Reply;
use township_engine::{CannedContent, EngineError, Executor, ExecutorSettings, Submission, seed_agents};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "township-config.yaml";

/// Application entry point for the Township engine.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("township-engine starting");
    info!(
        source,
        world_name = %config.world.name,
        seed = config.world.seed,
        width = config.world.width,
        height = config.world.height,
        tick_ms = config.world.tick_ms,
        step_interval_ms = config.world.step_interval_ms,
        "Configuration loaded"
    );

    // 3. Create the world.
    let mut game = Game::new(World::new(config.clone()));

    // 4. Generation budget and bucket scheduler.
    let budget: Arc<dyn BudgetStore> = Arc::new(InMemoryBudgetStore::default());
    let bucket_interval = Duration::from_millis(config.generation.bucket_interval_ms.max(1));
    let scheduler = tokio::spawn(run_bucket_scheduler(Arc::clone(&budget), bucket_interval));
    info!(
        bucket_interval_ms = config.generation.bucket_interval_ms,
        window_ms = config.generation.window_ms,
        max_per_window = config.generation.max_per_window,
        "Bucket scheduler started"
    );

    // 5. Operation executor.
    let (input_tx, mut input_rx) = mpsc::channel(config.infrastructure.input_channel_capacity.max(1));
    let executor = Executor::new(
        ExecutorSettings::from(&config),
        Arc::clone(&budget),
        Arc::new(CannedContent::new()),
        input_tx,
    );
    info!(
        max_concurrent = config.infrastructure.max_concurrent_operations,
        "Operation executor ready"
    );

    // 6. Seed agents.
    let started = wall_clock_ms();
    let agents = seed_agents(game.world(), config.agents.seed_agents, &mut rand::rng());
    for args in agents {
        info!(name = %args.name, character = %args.character, "Queueing seed agent");
        game.submit(Input::CreateAgent(args), started);
    }

    // 7. Run the step loop.
    let mut replies: BTreeMap<u64, Reply> = BTreeMap::new();
    let mut interval = tokio::time::interval(Duration::from_millis(config.world.step_interval_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut steps = 0_u64;

    info!("Entering step loop");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = wall_clock_ms();
                drain_submissions(&mut input_rx, &mut game, &mut replies, now);
                let summary = match game.run_step(now) {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!(error = %e, "Step skipped");
                        continue;
                    }
                };
                steps = steps.saturating_add(1);

                for record in &summary.results {
                    let Some(reply) = replies.remove(&record.number) else {
                        continue;
                    };
                    if reply.send(record.result.clone()).is_err() {
                        debug!(number = record.number, "Submitter no longer waiting");
                    }
                }
                let stats = summary.stats();
                for op in summary.scheduled {
                    executor.spawn(op);
                }
                if stats.inputs > 0 || stats.dispatched > 0 {
                    info!(
                        step = steps,
                        ticks = stats.ticks,
                        inputs = stats.inputs,
                        rejected = stats.rejected,
                        dispatched = stats.dispatched,
                        pathfinds = stats.pathfinds,
                        players = game.world().players().len(),
                        "Step complete"
                    );
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    scheduler.abort();
    info!(
        steps,
        players = game.world().players().len(),
        agents = game.world().agents().len(),
        pending_inputs = game.pending_inputs(),
        "township-engine shutdown complete"
    );
    Ok(())
}

/// Load the simulation configuration from `township-config.yaml`, falling
/// back to defaults when the file does not exist. Returns where the
/// configuration came from.
fn load_config() -> Result<(SimulationConfig, &'static str), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        let config = SimulationConfig::from_file(config_path)?;
        Ok((config, CONFIG_PATH))
    } else {
        let mut config = SimulationConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok((config, "defaults"))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Milliseconds since the Unix epoch.
fn wall_clock_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Queue everything submitted since the last step for its first tick,
/// remembering who wants the result.
fn drain_submissions(
    input_rx: &mut mpsc::Receiver<Submission>,
    game: &mut Game,
    replies: &mut BTreeMap<u64, Reply>,
    now: u64,
) {
    let received = game.next_tick(now);
    while let Ok(submission) = input_rx.try_recv() {
        let number = game.submit(submission.input, received);
        if let Some(reply) = submission.reply {
            replies.insert(number, reply);
        }
    }
}

/// Advance the generation bucket once per `period`, opening one more
/// generation slot each time.
async fn run_bucket_scheduler(budget: Arc<dyn BudgetStore>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        match budget.advance_bucket() {
            Ok(bucket) => debug!(bucket, "Generation bucket advanced"),
            Err(e) => warn!(error = %e, "Failed to advance generation bucket"),
        }
    }
}
