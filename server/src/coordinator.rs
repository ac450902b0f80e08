//! Command routing and the single write path to client connections
//!
//! The coordinator owns the client registry, the session state machine and
//! the outbound half of every connection. Each inbound line is handled as
//! one command; a rejected command is answered with `FAILED <reason>` to its
//! sender only and never disturbs anyone else.
//!
//! There is exactly one coordinator per process. It is constructed in `main`
//! and handed to the network loop, which is its only caller.

use crate::error::CommandError;
use crate::outbox::{Outbox, Target};
use crate::registry::{ClientId, ClientRegistry};
use crate::session::SessionStateMachine;
use log::{debug, error, warn};
use shared::ServerMessage;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Routes commands from every connection and owns all outbound writes
///
/// Holds the only mutable references to the client registry and the
/// session, so everything runs on the control loop without locks.
pub struct SessionCoordinator {
    registry: ClientRegistry,
    session: SessionStateMachine,
    connections: HashMap<ClientId, mpsc::UnboundedSender<String>>,
    outbox: Outbox,
}

impl SessionCoordinator {
    /// Creates a coordinator with an empty registry around the given session
    ///
    /// Connections are attached later through [`SessionCoordinator::connect`]
    /// as the network layer accepts them.
    pub fn new(session: SessionStateMachine) -> Self {
        Self {
            registry: ClientRegistry::new(),
            session,
            connections: HashMap::new(),
            outbox: Outbox::new(),
        }
    }

    /// Logged-in clients
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// The session state machine, for inspection
    pub fn session(&self) -> &SessionStateMachine {
        &self.session
    }

    /// Attaches the outbound channel of a newly accepted connection
    pub fn connect(&mut self, client: ClientId, sender: mpsc::UnboundedSender<String>) {
        self.connections.insert(client, sender);
    }

    /// Handles a closed connection as if it had sent `LOGOUT`
    ///
    /// The logout skips the in-progress gate: a connection that never logged
    /// in has nothing to undo and nobody left to read a `FAILED` reply.
    pub fn disconnect(&mut self, client: ClientId) {
        debug!("> {} LOGOUT (connection closed)", client);
        self.connections.remove(&client);
        self.logout(client);
        self.flush();
    }

    /// Advances the session once and delivers whatever it queued
    pub fn tick(&mut self) {
        self.session.tick(&self.registry, &mut self.outbox);
        self.flush();
    }

    /// Handles one command from a connection
    pub fn handle_from(&mut self, client: ClientId, cmd: &str, args: &str) {
        debug!("> {} {} {}", client, cmd, args);

        if let Err(e) = self.dispatch(client, cmd, args) {
            warn!("Rejected {} from {}: {}", cmd, client, e);
            self.outbox.send_to(client, ServerMessage::Failed(e.to_string()));
        }
        self.flush();
    }

    fn dispatch(&mut self, client: ClientId, cmd: &str, args: &str) -> Result<(), CommandError> {
        let cmd = cmd.to_ascii_lowercase();

        if cmd != "login" && !self.registry.contains(client) && self.session.is_running() {
            return Err(CommandError::GameInProgress);
        }

        match cmd.as_str() {
            "login" => self.login(client, args),
            "logout" => {
                self.logout(client);
                Ok(())
            }
            "status" => {
                self.session
                    .update_client_status(client, args, &self.registry);
                Ok(())
            }
            "game" => {
                self.session
                    .client_receive(client, args, &self.registry, &mut self.outbox);
                Ok(())
            }
            "get" => self.get(client, args),
            other => Err(CommandError::InvalidCommand(other.to_string())),
        }
    }

    fn login(&mut self, client: ClientId, name: &str) -> Result<(), CommandError> {
        self.registry.register(client, name)?;

        self.outbox
            .notify_all(format!("@{} is online", name), Some(client));
        self.outbox.send_to(client, ServerMessage::Ok(None));

        if let Err(e) = self.session.join(client, &self.registry, &mut self.outbox) {
            error!("Could not bring {} into the session: {}", client, e);
        }
        Ok(())
    }

    fn logout(&mut self, client: ClientId) {
        let Some(name) = self.registry.unregister(client) else {
            return;
        };
        self.outbox.notify_all(format!("@{} has left", name), None);
        self.session
            .client_logout(client, &self.registry, &mut self.outbox);
    }

    fn get(&mut self, client: ClientId, args: &str) -> Result<(), CommandError> {
        let mut tokens = args.split_whitespace();
        let (Some(scenario), Some(resource), None) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(CommandError::InvalidCommand("get".to_string()));
        };

        let reply = self.session.fetch(scenario, resource)?;
        self.outbox.send_to(client, reply);
        Ok(())
    }

    /// Writes every queued envelope, resolving broadcasts against the
    /// members present right now
    fn flush(&mut self) {
        for envelope in self.outbox.drain() {
            match envelope.target {
                Target::Client(client) => self.raw(client, &envelope.message),
                Target::All { exclude } => {
                    for client in self.registry.ids() {
                        if Some(client) != exclude {
                            self.raw(client, &envelope.message);
                        }
                    }
                }
            }
        }
    }

    /// Serializes one message onto one connection
    ///
    /// A failed write only costs that connection its message.
    fn raw(&self, client: ClientId, message: &ServerMessage) {
        debug!("< {} {}", client, message);

        let Some(sender) = self.connections.get(&client) else {
            error!("Fatal error while sending {} to {}: no connection", message, client);
            return;
        };
        if sender.send(format!("{}\n", message)).is_err() {
            error!("Fatal error while sending {} to {}: connection closed", message, client);
        }
    }
}
