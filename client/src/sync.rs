//! Client half of the scenario synchronization protocol
//!
//! The server announces a scenario with `LOAD`, lists what it needs with
//! `REQUIRE`, and then keeps asking `SYNC` until the client says `ready`.
//! [`SyncClient`] turns each server message into the commands to send back:
//! fetch what the cache lacks, verify what arrives, and report progress.
//! It performs no I/O of its own apart from the optional cache directory.

use crate::cache::ResourceCache;
use log::{info, warn};
use shared::{ClientCommand, ServerMessage, SyncStatus};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    resource: String,
    digest: String,
}

/// Protocol state for one connection
///
/// Remembers the active scenario, what it requires, and which resources
/// have a `GET` outstanding.
pub struct SyncClient {
    cache: ResourceCache,
    scenario: Option<String>,
    requirements: Vec<Requirement>,
    in_flight: HashSet<String>,
}

impl SyncClient {
    pub fn new(cache: ResourceCache) -> Self {
        Self {
            cache,
            scenario: None,
            requirements: Vec::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Scenario named by the last `LOAD`
    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// True once a scenario is loaded and every resource it advertised is
    /// cached with the right digest
    ///
    /// Agrees with the reply to `SYNC`: `ready` exactly when this is true.
    pub fn is_ready(&mut self) -> bool {
        self.scenario.is_some() && self.missing().is_empty()
    }

    /// Reacts to one server message, returning the commands to send back
    pub fn handle(&mut self, message: ServerMessage) -> Vec<ClientCommand> {
        match message {
            ServerMessage::Ok(None) => {
                info!("Server accepted the command");
                Vec::new()
            }
            ServerMessage::Ok(Some(text)) => {
                info!("Server: OK {}", text);
                Vec::new()
            }
            ServerMessage::Failed(reason) => {
                warn!("Server rejected a command: {}", reason);
                Vec::new()
            }
            ServerMessage::Notify(text) => {
                info!("* {}", text);
                Vec::new()
            }
            ServerMessage::Game { scenario, payload } => {
                info!("[{}] {}", scenario, payload);
                Vec::new()
            }
            ServerMessage::Load { scenario } => {
                info!("Loading scenario <{}>", scenario);
                self.scenario = Some(scenario);
                self.requirements.clear();
                self.in_flight.clear();
                Vec::new()
            }
            ServerMessage::Require {
                scenario,
                resource,
                digest,
            } => self.require(scenario, resource, digest),
            ServerMessage::Write {
                scenario,
                resource,
                data,
            } => {
                self.write(&scenario, &resource, &data);
                Vec::new()
            }
            ServerMessage::Sync { scenario } => self.sync(&scenario),
        }
    }

    fn require(&mut self, scenario: String, resource: String, digest: String) -> Vec<ClientCommand> {
        if self.scenario.as_deref() != Some(scenario.as_str()) {
            warn!("Ignoring requirement for inactive scenario <{}>", scenario);
            return Vec::new();
        }

        let cached = self.cache.has(&scenario, &resource, &digest);
        self.requirements.retain(|r| r.resource != resource);
        self.requirements.push(Requirement {
            resource: resource.clone(),
            digest,
        });

        if cached {
            return Vec::new();
        }
        self.request(&scenario, resource).into_iter().collect()
    }

    fn write(&mut self, scenario: &str, resource: &str, data: &str) {
        self.in_flight.remove(resource);

        if self.scenario.as_deref() != Some(scenario) {
            warn!("Ignoring payload for inactive scenario <{}>", scenario);
            return;
        }
        let Some(requirement) = self.requirements.iter().find(|r| r.resource == resource) else {
            warn!("Ignoring unrequested resource {}", resource);
            return;
        };

        let stored = shared::decode_payload(data)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.cache
                    .store(scenario, resource, &requirement.digest, bytes)
                    .map_err(|e| e.to_string())
            });
        match stored {
            Ok(()) => info!("Received {}/{}", scenario, resource),
            Err(e) => warn!("Discarding {}/{}: {}", scenario, resource, e),
        }
    }

    /// Answers a `SYNC` prompt, re-requesting anything lost on the way
    fn sync(&mut self, scenario: &str) -> Vec<ClientCommand> {
        if self.scenario.as_deref() != Some(scenario) {
            warn!("Sync requested for <{}> before it was loaded", scenario);
            return vec![status(SyncStatus::WaitRequirement)];
        }

        let missing = self.missing();
        if missing.is_empty() {
            return vec![status(SyncStatus::Ready)];
        }

        let mut commands: Vec<ClientCommand> = missing
            .into_iter()
            .filter_map(|resource| self.request(scenario, resource))
            .collect();
        commands.push(status(SyncStatus::WaitRequirement));
        commands
    }

    fn missing(&mut self) -> Vec<String> {
        let Some(scenario) = self.scenario.clone() else {
            return Vec::new();
        };
        let requirements = self.requirements.clone();
        requirements
            .into_iter()
            .filter(|r| !self.cache.has(&scenario, &r.resource, &r.digest))
            .map(|r| r.resource)
            .collect()
    }

    /// A `GET` for the resource, unless one is already outstanding
    fn request(&mut self, scenario: &str, resource: String) -> Option<ClientCommand> {
        if !self.in_flight.insert(resource.clone()) {
            return None;
        }
        Some(ClientCommand::Get {
            scenario: scenario.to_string(),
            resource,
        })
    }
}

fn status(status: SyncStatus) -> ClientCommand {
    ClientCommand::Status {
        status: status.to_string(),
    }
}
