use clap::Parser;
use client::cache::ResourceCache;
use client::network::{Client, SessionEnd};
use client::sync::SyncClient;
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name, at least three characters
    #[arg(short = 'n', long)]
    name: String,

    /// Directory for cached scenario resources (memory only if omitted)
    #[arg(short = 'c', long)]
    cache: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let cache = match args.cache {
        Some(dir) => ResourceCache::with_dir(dir),
        None => ResourceCache::in_memory(),
    };

    info!("Starting client as @{}", args.name);
    info!("Type a line to send it to the current scenario, Ctrl+D to log out");

    let mut client = Client::new(&args.name, SyncClient::new(cache));
    match client.connect_and_run(&args.server).await? {
        SessionEnd::LoggedOut => info!("Logged out"),
        SessionEnd::ServerClosed => info!("Disconnected by server"),
    }

    Ok(())
}
