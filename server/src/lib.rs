//! # Session Coordinator Library
//!
//! This library implements the server side of a multiplayer session: it
//! accepts line-oriented text connections, tracks who is present, and drives
//! one shared game session through a small state machine while keeping every
//! client synchronized with the resources the current scenario needs.
//!
//! ## Core Responsibilities
//!
//! ### Membership
//! Clients log in with a display name and stay members until they log out or
//! their connection closes. An empty room tears the session down.
//!
//! ### Session Lifecycle
//! The session goes `idle → load → running`. Loading instantiates the current
//! scenario; a failed load cancels the attempt and notifies everyone, but
//! never takes the process down.
//!
//! ### Client Synchronization
//! On login each client receives `LOAD` and one `REQUIRE` line per resource
//! with its digest. The server then prompts with `SYNC` until the client
//! reports `ready`, and only then hands the client to the scenario.
//!
//! ## Architecture Design
//!
//! ### Single Control Loop
//! Connection tasks only frame bytes into lines and forward them over a
//! channel. Every mutation of the registry, sync statuses and scenario state
//! happens on one loop that, per tick, drains all pending lines and then
//! advances the session once. No locks are involved.
//!
//! ### Single Writer
//! State handlers and scenarios queue messages on an [`outbox::Outbox`]; only
//! the [`coordinator::SessionCoordinator`] writes to connections. A write to a
//! dead connection is logged and dropped.
//!
//! ## Module Organization
//!
//! - `registry`: logged-in clients and their display names
//! - `scenario`: the scenario contract, its host and the factory catalog
//! - `lobby`, `directory`: built-in scenarios
//! - `session`: the state machine and sync protocol
//! - `coordinator`: command routing, gating and outbound writes
//! - `network`: TCP accept loop, line framing and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::coordinator::SessionCoordinator;
//! use server::network::{tick_period, Server};
//! use server::scenario::ScenarioCatalog;
//! use server::session::SessionStateMachine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = ScenarioCatalog::standard(None)?;
//!     let session = SessionStateMachine::new(catalog, "choose", 40);
//!     let coordinator = SessionCoordinator::new(session);
//!
//!     let server = Server::bind("127.0.0.1:8080", coordinator, tick_period(20)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Known Limitations
//!
//! A scenario hook that never returns stalls every later tick; hooks run on
//! the control loop without a watchdog.

pub mod coordinator;
pub mod directory;
pub mod error;
pub mod lobby;
pub mod network;
pub mod outbox;
pub mod registry;
pub mod scenario;
pub mod session;
