//! awake-bot - LINE bot that keeps nagging someone until they wake up.
//!
//! Usage:
//!   awake-bot serve --port 8080      # Start the webhook / push server
//!
//! Every flag can also be given through its environment variable
//! (`PORT`, `LINE_CHANNEL_SECRET`, `LINE_CHANNEL_TOKEN`, `AWAKE_BOT_TOKEN`, ...).

mod config;
mod error;
mod forecast;
mod holiday;
mod http_server;
mod messaging;
mod monitor;
mod policy;
mod registry;
mod session;
mod state;
mod timer;
mod webhook;

use clap::{Parser, Subcommand};
use config::ServeArgs;
use forecast::ForecastClient;
use messaging::LineClient;
use monitor::Monitor;
use policy::EscalationPolicy;
use state::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "awake-bot")]
#[command(about = "LINE bot that keeps nagging someone until they wake up")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => {
            if let Err(e) = serve(serve_args).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn serve(args: ServeArgs) -> error::Result<()> {
    let config = args.config();

    let line = LineClient::new(&args.line_api_base, &args.channel_token, args.send_timeout())?;
    let forecast = match config.forecast_city {
        Some(_) => Some(ForecastClient::new(&args.forecast_endpoint, args.send_timeout())?),
        None => None,
    };

    let policy = EscalationPolicy::new(args.retry_limit);
    info!(
        retry_limit = policy.limit(),
        skip_holidays = config.skip_holidays,
        forecast_city = ?config.forecast_city,
        "configuration loaded"
    );

    let monitor = Monitor::new(Arc::new(line), policy);
    let state = AppState::new(monitor, forecast, config);

    http_server::run_server(args.port, state).await?;
    Ok(())
}
