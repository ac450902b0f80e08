//! # Session Client Library
//!
//! Headless client for the session coordinator. It logs in, keeps a cache of
//! scenario resources in step with what the server advertises, answers the
//! server's `SYNC` prompts, and relays player input as `GAME` commands.
//!
//! ## Module Organization
//!
//! ### Cache Module (`cache`)
//! Resource storage keyed by scenario and file name:
//! - Digest verification before anything is stored
//! - Optional on-disk mirror so restarts skip downloads
//!
//! ### Sync Module (`sync`)
//! The client side of the synchronization protocol, free of I/O:
//! - Tracks the active scenario and its requirements
//! - Issues `GET` for missing resources, at most one in flight each
//! - Reports `wait requirement` or `ready` on every `SYNC`
//!
//! ### Network Module (`network`)
//! Line-based TCP session driving the sync module and forwarding input.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::cache::ResourceCache;
//! use client::network::Client;
//! use client::sync::SyncClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sync = SyncClient::new(ResourceCache::with_dir("./cache"));
//!     let mut client = Client::new("alice", sync);
//!     client.connect_and_run("127.0.0.1:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod network;
pub mod sync;
