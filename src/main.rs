use anyhow::{Context, Result};
use clap::Parser;
use loqa_avatar::clock::{Clock, SystemClock};
use loqa_avatar::nats::{pump_responses, run_heartbeat, NatsClient};
use loqa_avatar::{create_router, AppState, AvatarRuntime, Config};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "loqa-avatar", version, about = "Headless avatar performance service")]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/loqa-avatar")]
    config: String,

    /// Seed for idle behaviors, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Loqa Avatar v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Audio base path: {}", cfg.audio.base_path);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut runtime =
        AvatarRuntime::headless(cfg.avatar.clone(), clock, Box::new(rng), &cfg.audio.base_path);
    runtime.start();
    let inbox = runtime.inbox();
    let tick_interval = runtime.config().tick_interval();
    let runtime = Arc::new(Mutex::new(runtime));

    let mut state = AppState::new(Arc::clone(&runtime));

    if cfg.nats.enabled {
        let nats = Arc::new(NatsClient::connect(&cfg.nats).await?);
        let subscriber = nats.subscribe_responses().await?;
        tokio::spawn(pump_responses(subscriber, inbox));
        tokio::spawn(run_heartbeat(Arc::clone(&nats)));
        state = state.with_sink(nats);
    } else {
        info!("NATS disabled; replies only via POST /avatar/inbound");
    }

    let tick_runtime = Arc::clone(&runtime);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            tick_runtime.lock().await.tick();
        }
    });
    info!("Animation tick running at {} Hz", cfg.avatar.tick_hz);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}
