//! jobstream server
//!
//! Serves the streaming WebSocket endpoint and the request/acknowledge
//! endpoint, running the simulated trainer for every job.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jobstream_server::http::create_router;
use jobstream_server::{startup, AppState, Config, JobService};
use jobstream_worker::{SimulatedDatasetLoader, SimulatedTrainer, WorkerRunner};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Streams progress of blocking training jobs to WebSocket clients.
#[derive(Parser, Debug)]
#[command(name = "jobstream-server", about = "Streams progress of blocking training jobs")]
struct Args {
    /// HTTP/WebSocket server address
    #[arg(long, default_value = "0.0.0.0:8000")]
    http_addr: String,

    /// Job parameter every request must carry (repeatable)
    #[arg(long = "required-field")]
    required_fields: Vec<String>,

    /// Capacity of each session's event queue (unbounded when absent)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Environment variable holding the credential token
    #[arg(long, default_value = "JOBSTREAM_TOKEN")]
    token_env: String,

    /// Start without a credential token
    #[arg(long)]
    skip_token_check: bool,

    /// Launcher configuration file to check at startup
    #[arg(long)]
    launcher_config: Option<PathBuf>,

    /// Default number of steps for the simulated trainer
    #[arg(long, default_value = "5")]
    sim_steps: u64,

    /// Default per-step delay for the simulated trainer, in milliseconds
    #[arg(long, default_value = "500")]
    sim_step_delay_ms: u64,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            http_addr: args.http_addr,
            required_fields: args.required_fields,
            queue_capacity: args.queue_capacity,
            token_env: args.token_env,
            require_token: !args.skip_token_check,
            launcher_config: args.launcher_config,
            sim_steps: args.sim_steps,
            sim_step_delay_ms: args.sim_step_delay_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from(Args::parse());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jobstream=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    startup::initialize(&config)?;

    let http_addr: SocketAddr = config.http_addr.parse()?;

    let trainer = SimulatedTrainer::new(
        config.sim_steps,
        Duration::from_millis(config.sim_step_delay_ms),
    );
    let runner = WorkerRunner::new(Arc::new(trainer)).with_loader(Arc::new(SimulatedDatasetLoader));

    let schema = config.schema();
    info!(required = ?schema.required(), queue_capacity = ?config.queue_capacity, "Job schema loaded");
    let service = JobService::new(schema, runner).with_queue_capacity(config.queue_capacity);
    let state = AppState::new(service);

    let app = create_router(state);
    let listener = TcpListener::bind(http_addr).await?;
    info!(addr = %http_addr, "jobstream server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
