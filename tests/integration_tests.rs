//! Integration tests for the session coordinator over real TCP connections
//!
//! Each test starts a server on an ephemeral loopback port with scenarios
//! laid out in a scratch directory, then talks to it line by line.

use client::cache::ResourceCache;
use client::sync::SyncClient;
use server::coordinator::SessionCoordinator;
use server::network::{tick_period, Server};
use server::scenario::ScenarioCatalog;
use server::session::SessionStateMachine;
use shared::ServerMessage;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

const MAP: &[u8] = b"#####\n#...#\n#####\n";

/// Scenario root with a single `maze` scenario holding one map file
fn scenario_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "lobby-sync-it-{}-{}",
        std::process::id(),
        DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = fs::remove_dir_all(&root);
    let maze = root.join("maze");
    fs::create_dir_all(&maze).unwrap();
    fs::write(maze.join("map.txt"), MAP).unwrap();
    fs::write(
        maze.join("scenario.json"),
        br#"{"description": "Find the exit", "resources": ["map.txt"]}"#,
    )
    .unwrap();
    root
}

async fn start_server(default_scenario: &str) -> SocketAddr {
    start_server_in(&scenario_root(), default_scenario, 0).await
}

async fn start_server_in(root: &Path, default_scenario: &str, load_retry_ticks: u32) -> SocketAddr {
    let catalog = ScenarioCatalog::standard(Some(root)).unwrap();
    let session = SessionStateMachine::new(catalog, default_scenario, load_retry_ticks);
    let server = Server::bind("127.0.0.1:0", SessionCoordinator::new(session), tick_period(100))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    sync: SyncClient,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            sync: SyncClient::new(ResourceCache::in_memory()),
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for the server")
            .unwrap()
            .expect("server closed the connection")
    }

    /// Reads lines until one satisfies `pred`, answering sync traffic on the way
    async fn recv_until<F>(&mut self, pred: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        loop {
            let line = self.recv().await;
            if pred(&line) {
                return line;
            }
            self.answer(&line).await;
        }
    }

    async fn answer(&mut self, line: &str) {
        let Ok(message) = line.parse::<ServerMessage>() else {
            return;
        };
        for command in self.sync.handle(message) {
            self.send(&command.to_string()).await;
        }
    }

    /// Logs in and keeps syncing until the scenario reports the player joined
    async fn join(&mut self, name: &str, scenario: &str) {
        self.send(&format!("LOGIN {}", name)).await;
        assert_eq!(self.recv().await, "OK");
        let joined = format!("GAME {} joined @{}", scenario, name);
        self.recv_until(|line| line == joined).await;
    }
}

mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn login_downloads_and_verifies_resources() {
        let addr = start_server("maze").await;
        let mut alice = Peer::connect(addr).await;

        alice.send("LOGIN alice").await;
        assert_eq!(alice.recv().await, "OK");
        assert_eq!(alice.recv().await, "LOAD maze");
        assert_eq!(
            alice.recv().await,
            format!("REQUIRE maze map.txt {}", shared::digest(MAP))
        );
        alice.answer("LOAD maze").await;
        alice
            .answer(&format!("REQUIRE maze map.txt {}", shared::digest(MAP)))
            .await;

        let write = alice.recv_until(|line| line.starts_with("WRITE ")).await;
        alice.answer(&write).await;
        assert!(alice.sync.is_ready());
        assert_eq!(alice.sync.cache().get("maze", "map.txt"), Some(MAP));

        alice
            .recv_until(|line| line == "GAME maze description Find the exit")
            .await;
    }

    #[tokio::test]
    async fn short_login_is_rejected() {
        let addr = start_server("maze").await;
        let mut peer = Peer::connect(addr).await;

        peer.send("LOGIN al").await;
        assert_eq!(peer.recv().await, "FAILED Invalid login");

        peer.send("FROBNICATE").await;
        assert_eq!(peer.recv().await, "FAILED Invalid command <frobnicate>");
    }

    #[tokio::test]
    async fn strangers_are_turned_away_while_running() {
        let addr = start_server("maze").await;
        let mut alice = Peer::connect(addr).await;
        alice.join("alice", "maze").await;

        let mut eve = Peer::connect(addr).await;
        eve.send("GET maze map.txt").await;
        assert_eq!(eve.recv().await, "FAILED A game is running");

        eve.send("LOGIN evelyn").await;
        assert_eq!(eve.recv().await, "OK");
        assert_eq!(
            alice.recv_until(|line| line.starts_with("NOTIFY")).await,
            "NOTIFY @evelyn is online"
        );
    }
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn game_payloads_are_relayed_to_other_players() {
        let addr = start_server("maze").await;
        let mut alice = Peer::connect(addr).await;
        alice.join("alice", "maze").await;
        let mut bobby = Peer::connect(addr).await;
        bobby.join("bobby", "maze").await;
        alice.recv_until(|line| line == "GAME maze joined @bobby").await;

        alice.send("GAME move north").await;

        assert_eq!(
            bobby.recv_until(|line| line.starts_with("GAME ")).await,
            "GAME maze @alice move north"
        );
    }

    #[tokio::test]
    async fn disconnect_is_announced_as_logout() {
        let addr = start_server("maze").await;
        let mut alice = Peer::connect(addr).await;
        alice.join("alice", "maze").await;
        let mut bobby = Peer::connect(addr).await;
        bobby.join("bobby", "maze").await;

        drop(bobby);

        alice.recv_until(|line| line == "NOTIFY @bobby has left").await;
        alice.recv_until(|line| line == "GAME maze left @bobby").await;
    }

    #[tokio::test]
    async fn retried_load_brings_waiting_client_in() {
        let root = scenario_root();
        let manifest = root.join("maze").join("scenario.json");
        fs::write(&manifest, b"{ not json").unwrap();
        let addr = start_server_in(&root, "maze", 5).await;
        let mut alice = Peer::connect(addr).await;

        alice.send("LOGIN alice").await;
        assert_eq!(alice.recv().await, "OK");
        assert_eq!(
            alice.recv().await,
            "NOTIFY Server error while trying to load scenario"
        );
        assert_eq!(alice.recv().await, "NOTIFY Game cancelled.");

        fs::write(&manifest, br#"{"resources": ["map.txt"]}"#).unwrap();

        let first = alice
            .recv_until(|line| !line.starts_with("NOTIFY"))
            .await;
        assert_eq!(first, "LOAD maze");
        alice.answer(&first).await;
        alice.recv_until(|line| line == "GAME maze joined @alice").await;
        assert_eq!(alice.sync.cache().get("maze", "map.txt"), Some(MAP));
    }

    #[tokio::test]
    async fn lobby_vote_switches_scenario() {
        let addr = start_server("choose").await;
        let mut alice = Peer::connect(addr).await;

        alice.send("LOGIN alice").await;
        assert_eq!(alice.recv().await, "OK");
        assert_eq!(
            alice.recv_until(|line| line.starts_with("GAME choose scenarios")).await,
            "GAME choose scenarios maze"
        );

        alice.send("GAME vote maze").await;

        alice.recv_until(|line| line == "NOTIFY Next scenario: maze").await;
        alice.recv_until(|line| line == "LOAD maze").await;
        alice.answer("LOAD maze").await;
        alice.recv_until(|line| line == "GAME maze joined @alice").await;
        assert_eq!(alice.sync.cache().get("maze", "map.txt"), Some(MAP));
    }
}
