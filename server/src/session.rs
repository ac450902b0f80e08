//! Session state machine and the client synchronization protocol
//!
//! The session moves through three states:
//!
//! ```text
//!   idle ──(≥1 client)──▶ load ──(scenario built)──▶ running
//!    ▲                     │                           │
//!    └────(load failed)────┘                           │
//!    └────────────────(registry empty)─────────────────┘
//! ```
//!
//! One state handler runs per tick. While running, every logged-in client is
//! walked through `SYNC` prompts until it reports `ready`, at which point the
//! scenario's login hook fires exactly once for it. The scenario's update
//! hook runs every tick regardless of how many clients are done syncing.
//!
//! Exactly one session exists per process; it is owned by the coordinator.

use crate::error::{CommandError, SessionError};
use crate::outbox::Outbox;
use crate::registry::{ClientId, ClientRegistry};
use crate::scenario::{ScenarioCatalog, ScenarioHost};
use log::{debug, error, info, warn};
use shared::{ServerMessage, SyncStatus};
use std::collections::HashMap;

/// First notice broadcast when a scenario fails to load
pub const LOAD_ERROR_NOTICE: &str = "Server error while trying to load scenario";
/// Second notice broadcast when a scenario fails to load
pub const CANCELLED_NOTICE: &str = "Game cancelled.";

/// Game-level state
///
/// Only `Running` carries a scenario, so an idle session can never hold one.
pub enum SessionState {
    Idle,
    /// Transient: resolved by the next state handler.
    Load {
        /// Clients present when the load was triggered. Informational.
        client_count: usize,
    },
    Running(ScenarioHost),
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Load { .. } => "load",
            SessionState::Running(_) => "running",
        }
    }
}

/// The single game session shared by every logged-in client
///
/// Tracks which scenario is active, each client's sync progress and any
/// scenario switch requested during the current tick.
pub struct SessionStateMachine {
    state: SessionState,
    catalog: ScenarioCatalog,
    default_scenario: String,
    scenario_name: String,
    status: HashMap<ClientId, SyncStatus>,
    pending_switch: Option<String>,
    load_retry_ticks: u32,
    retry_cooldown: u32,
}

impl SessionStateMachine {
    /// Creates an idle session that will start `default_scenario` first
    ///
    /// `load_retry_ticks` is how many idle ticks to wait after a failed load
    /// before trying again.
    pub fn new(catalog: ScenarioCatalog, default_scenario: &str, load_retry_ticks: u32) -> Self {
        Self {
            state: SessionState::Idle,
            catalog,
            default_scenario: default_scenario.to_string(),
            scenario_name: default_scenario.to_string(),
            status: HashMap::new(),
            pending_switch: None,
            load_retry_ticks,
            retry_cooldown: 0,
        }
    }

    /// Current state, mostly for logging and tests
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// True while a scenario is loaded and being played
    ///
    /// Used by the coordinator to turn away connections that have not
    /// logged in.
    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running(_))
    }

    /// Scenario that is running, or the one the next load will start
    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn active_scenario(&self) -> Option<&ScenarioHost> {
        match &self.state {
            SessionState::Running(host) => Some(host),
            _ => None,
        }
    }

    /// Last sync status recorded for a client
    ///
    /// `None` until the first `SYNC` prompt, and again after logout or a
    /// scenario switch.
    pub fn status_of(&self, client: ClientId) -> Option<&SyncStatus> {
        self.status.get(&client)
    }

    /// Scenarios this session can load
    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    /// Advances the session by one step
    ///
    /// An empty registry forces the session back to idle before the state
    /// handler runs. Handler errors are logged and leave the state as is.
    pub fn tick(&mut self, registry: &ClientRegistry, outbox: &mut Outbox) {
        if registry.is_empty() && !matches!(self.state, SessionState::Idle) {
            info!("All clients have left, resetting to idle");
            self.reset();
        }

        let label = self.state.label();
        let result = match self.state {
            SessionState::Idle => {
                self.handle_idle(registry);
                Ok(())
            }
            SessionState::Load { .. } => self.load_and_announce(registry, outbox),
            SessionState::Running(_) => {
                self.handle_running(registry, outbox);
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("Session error in state {}: {}", label, e);
        }

        if let Some(name) = self.pending_switch.take() {
            if let Err(e) = self.switch_scenario(&name, registry, outbox) {
                error!("Scenario switch to <{}> failed: {}", name, e);
            }
        }
    }

    /// Clears every per-scenario field and returns to idle
    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.scenario_name = self.default_scenario.clone();
        self.status.clear();
        self.pending_switch = None;
    }

    fn handle_idle(&mut self, registry: &ClientRegistry) {
        if registry.is_empty() {
            self.retry_cooldown = 0;
            return;
        }
        if self.retry_cooldown > 0 {
            self.retry_cooldown -= 1;
            return;
        }

        let client_count = registry.len();
        info!(
            "{} client(s) present, loading scenario <{}>",
            client_count, self.scenario_name
        );
        self.state = SessionState::Load { client_count };
    }

    /// Builds the current scenario, or cancels the session if it cannot
    fn handle_load(&mut self, outbox: &mut Outbox) -> Result<(), SessionError> {
        // Drop any previous instance before its replacement is constructed.
        if let SessionState::Running(_) = self.state {
            self.state = SessionState::Load { client_count: 0 };
        }

        match ScenarioHost::load(&self.catalog, &self.scenario_name) {
            Ok(host) => {
                info!("Session running scenario <{}>", host.name());
                self.state = SessionState::Running(host);
                Ok(())
            }
            Err(source) => {
                let name = self.scenario_name.clone();
                outbox.notify_all(LOAD_ERROR_NOTICE, None);
                outbox.notify_all(CANCELLED_NOTICE, None);
                self.reset();
                self.retry_cooldown = self.load_retry_ticks;
                Err(SessionError::ScenarioLoadFailure { name, source })
            }
        }
    }

    /// One pass of the sync protocol followed by the scenario update
    fn handle_running(&mut self, registry: &ClientRegistry, outbox: &mut Outbox) {
        let SessionState::Running(host) = &mut self.state else {
            return;
        };
        let sync = ServerMessage::Sync {
            scenario: host.name().to_string(),
        };

        for (client, name) in registry.roster() {
            match self.status.get(&client) {
                None => {
                    info!("Waiting status of @{}", name);
                    outbox.send_to(client, sync.clone());
                    self.status.insert(client, SyncStatus::Init);
                }
                Some(SyncStatus::Done) => {}
                Some(SyncStatus::WaitRequirement) => {
                    outbox.send_to(client, sync.clone());
                }
                Some(SyncStatus::Ready) => {
                    self.status.insert(client, SyncStatus::Done);
                    info!("@{} is ready, joining scenario <{}>", name, host.name());
                    let result = host.with_context(registry, outbox, &mut self.pending_switch, |s, ctx| {
                        s.client_login(ctx, client)
                    });
                    if let Err(e) = result {
                        error!("Scenario login hook failed for @{}: {}", name, e);
                    }
                }
                Some(other) => {
                    debug!("@{} is still {}", name, other);
                }
            }
        }

        let result = host.with_context(registry, outbox, &mut self.pending_switch, |s, ctx| {
            s.update(ctx)
        });
        if let Err(e) = result {
            error!("Scenario <{}> update failed: {}", host.name(), e);
        }
    }

    /// Brings a freshly logged-in client up to date
    ///
    /// Sends the current scenario's `LOAD`/`REQUIRE` sequence to the client.
    /// When the session is idle the scenario is loaded first and the sequence
    /// goes to every logged-in client, since none of them has it yet.
    pub fn join(
        &mut self,
        client: ClientId,
        registry: &ClientRegistry,
        outbox: &mut Outbox,
    ) -> Result<(), SessionError> {
        if let SessionState::Idle = self.state {
            self.state = SessionState::Load {
                client_count: registry.len(),
            };
        }
        if let SessionState::Load { .. } = self.state {
            return self.load_and_announce(registry, outbox);
        }
        if let Some(host) = self.active_scenario() {
            for message in host.load_sequence() {
                outbox.send_to(client, message);
            }
        }
        Ok(())
    }

    /// Records a client's reported sync progress
    ///
    /// Reports from connections that are not logged in are ignored, so a
    /// status cannot be staged ahead of a login.
    pub fn update_client_status(&mut self, client: ClientId, status: &str, registry: &ClientRegistry) {
        if !registry.contains(client) {
            debug!("Ignoring status from unregistered client {}", client);
            return;
        }
        let status = SyncStatus::parse(status);
        debug!("Client {} reports status {}", client, status);
        self.status.insert(client, status);
    }

    /// Forwards a `GAME` payload to the running scenario
    pub fn client_receive(
        &mut self,
        client: ClientId,
        payload: &str,
        registry: &ClientRegistry,
        outbox: &mut Outbox,
    ) {
        let SessionState::Running(host) = &mut self.state else {
            warn!("Dropping game message from {}: no active scenario", client);
            return;
        };
        let result = host.with_context(registry, outbox, &mut self.pending_switch, |s, ctx| {
            s.client_receive(ctx, client, payload)
        });
        if let Err(e) = result {
            warn!("Scenario <{}> rejected message from {}: {}", host.name(), client, e);
        }
    }

    /// Forgets a departed client and tells the running scenario
    pub fn client_logout(&mut self, client: ClientId, registry: &ClientRegistry, outbox: &mut Outbox) {
        self.status.remove(&client);
        if let SessionState::Running(host) = &mut self.state {
            let result = host.with_context(registry, outbox, &mut self.pending_switch, |s, ctx| {
                s.client_logout(ctx, client)
            });
            if let Err(e) = result {
                error!("Scenario logout hook failed for {}: {}", client, e);
            }
        }
    }

    /// Builds the `WRITE` reply for a `GET` request
    pub fn fetch(&self, scenario: &str, resource: &str) -> Result<ServerMessage, CommandError> {
        let host = self
            .active_scenario()
            .filter(|host| host.name() == scenario)
            .ok_or(CommandError::InvalidScenario)?;
        let data = host.fetch(resource).map_err(|e| {
            warn!("GET {} {} failed: {}", scenario, resource, e);
            CommandError::UnknownResource(resource.to_string())
        })?;

        Ok(ServerMessage::Write {
            scenario: scenario.to_string(),
            resource: resource.to_string(),
            data: shared::encode_payload(&data),
        })
    }

    /// Replaces the active scenario and re-syncs everyone present
    ///
    /// On success every logged-in client receives the new `LOAD`/`REQUIRE`
    /// sequence and is prompted again from scratch on the next tick.
    pub fn switch_scenario(
        &mut self,
        name: &str,
        registry: &ClientRegistry,
        outbox: &mut Outbox,
    ) -> Result<(), SessionError> {
        info!("Switching scenario to <{}>", name);
        self.state = SessionState::Load {
            client_count: registry.len(),
        };
        self.scenario_name = name.to_string();
        self.status.clear();

        self.load_and_announce(registry, outbox)
    }

    /// Loads the current scenario and sends its `LOAD`/`REQUIRE` sequence to
    /// every logged-in client
    ///
    /// Whoever is present when a load succeeds is prompted with `SYNC` on the
    /// next tick, so each of them must have been told what to fetch.
    fn load_and_announce(
        &mut self,
        registry: &ClientRegistry,
        outbox: &mut Outbox,
    ) -> Result<(), SessionError> {
        self.handle_load(outbox)?;
        if let Some(host) = self.active_scenario() {
            let sequence = host.load_sequence();
            for client in registry.ids() {
                for message in &sequence {
                    outbox.send_to(client, message.clone());
                }
            }
        }
        Ok(())
    }
}
