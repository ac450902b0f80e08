//! Queue of pending outbound messages.
//!
//! The session state machine and scenarios never touch connections. They
//! queue envelopes here and the coordinator flushes them, resolving
//! broadcast targets against the registry at flush time.

use crate::registry::ClientId;
use shared::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Client(ClientId),
    /// Every logged-in client, optionally skipping one.
    All { exclude: Option<ClientId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub target: Target,
    pub message: ServerMessage,
}

#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    /// Creates an empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message for one client
    pub fn send_to(&mut self, client: ClientId, message: ServerMessage) {
        self.envelopes.push(Envelope {
            target: Target::Client(client),
            message,
        });
    }

    /// Queues a message for every logged-in client except `exclude`
    ///
    /// Recipients are resolved at flush time, so a client that logs out
    /// before the flush is skipped.
    pub fn send_all(&mut self, message: ServerMessage, exclude: Option<ClientId>) {
        self.envelopes.push(Envelope {
            target: Target::All { exclude },
            message,
        });
    }

    /// Queues a `NOTIFY` broadcast
    pub fn notify_all(&mut self, text: impl Into<String>, exclude: Option<ClientId>) {
        self.send_all(ServerMessage::Notify(text.into()), exclude);
    }

    /// Takes every queued envelope in the order it was queued
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.envelopes)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}
