use clap::Parser;
use log::{info, warn};
use server::coordinator::SessionCoordinator;
use server::lobby::LOBBY_SCENARIO;
use server::network::{tick_period, Server};
use server::scenario::ScenarioCatalog;
use server::session::SessionStateMachine;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Directory whose subdirectories are loadable scenarios
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Scenario started whenever the session leaves idle
    #[arg(short, long, default_value = LOBBY_SCENARIO)]
    default_scenario: String,

    /// Idle ticks to wait before retrying a scenario that failed to load
    #[arg(long, default_value = "40")]
    load_retry_ticks: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let catalog = ScenarioCatalog::standard(args.scenarios.as_deref())?;
    info!("Available scenarios: {}", catalog.names().join(", "));
    if !catalog.contains(&args.default_scenario) {
        warn!(
            "Default scenario <{}> is not in the catalog, sessions will fail to load",
            args.default_scenario
        );
    }

    let session = SessionStateMachine::new(catalog, &args.default_scenario, args.load_retry_ticks);
    let coordinator = SessionCoordinator::new(session);

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, coordinator, tick_period(args.tick_rate)).await?;

    server.run().await?;

    Ok(())
}
