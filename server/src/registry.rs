//! Membership tracking for logged-in clients
//!
//! This module is the single source of truth for "who is present":
//! - Connection identities are assigned by the network layer, one per socket
//! - A connection becomes a member once its `LOGIN` passes validation
//! - Membership ends on `LOGOUT` or when the socket closes
//!
//! The session state machine treats an empty registry as the signal to tear
//! the running session down.

use crate::error::CommandError;
use log::info;
use shared::MIN_NAME_LEN;
use std::collections::HashMap;
use std::fmt;

/// Stable identity of one connection.
///
/// The identity belongs to the socket, not to the display name: two
/// connections may log in with the same name and still be distinct clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Maps connection identities to display names
///
/// Insertion order is irrelevant; presence in the map is equivalent to being
/// logged in. Every stored name is longer than [`MIN_NAME_LEN`] characters.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, String>,
}

impl ClientRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under the given display name
    ///
    /// Fails with `AlreadySubscribed` if the connection is already a member
    /// (the existing registration is left untouched), or with `InvalidLogin`
    /// if the name is too short. The registry is unchanged on failure.
    pub fn register(&mut self, client: ClientId, name: &str) -> Result<(), CommandError> {
        if self.clients.contains_key(&client) {
            return Err(CommandError::AlreadySubscribed);
        }
        if name.chars().count() <= MIN_NAME_LEN {
            return Err(CommandError::InvalidLogin);
        }

        info!("Client {} logged in as @{}", client, name);
        self.clients.insert(client, name.to_string());
        Ok(())
    }

    /// Removes a client, returning its display name if it was registered
    pub fn unregister(&mut self, client: ClientId) -> Option<String> {
        let name = self.clients.remove(&client)?;
        info!("Client {} (@{}) logged out", client, name);
        Some(name)
    }

    /// Checks whether the connection has logged in
    ///
    /// Commands from connections that have not are gated while a game runs.
    pub fn contains(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    /// Display name of a logged-in client
    pub fn name(&self, client: ClientId) -> Option<&str> {
        self.clients.get(&client).map(String::as_str)
    }

    /// Snapshot of member identities in a stable order
    ///
    /// Broadcasts iterate this snapshot so later registry changes cannot
    /// disturb a write pass already in progress.
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Members with their display names, ordered like [`ClientRegistry::ids`]
    pub fn roster(&self) -> Vec<(ClientId, String)> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.clients.get(&id).map(|name| (id, name.clone())))
            .collect()
    }

    /// Number of logged-in clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_client() {
        let mut registry = ClientRegistry::new();
        assert!(registry.is_empty());

        registry.register(ClientId(1), "alice").unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(ClientId(1)));
        assert_eq!(registry.name(ClientId(1)), Some("alice"));
    }

    #[test]
    fn test_short_name_rejected() {
        let mut registry = ClientRegistry::new();

        for name in ["", "a", "ab"] {
            assert_eq!(
                registry.register(ClientId(1), name),
                Err(CommandError::InvalidLogin)
            );
        }
        assert!(registry.is_empty());

        registry.register(ClientId(1), "abc").unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_login_keeps_first_name() {
        let mut registry = ClientRegistry::new();
        registry.register(ClientId(7), "alice").unwrap();

        assert_eq!(
            registry.register(ClientId(7), "mallory"),
            Err(CommandError::AlreadySubscribed)
        );
        assert_eq!(registry.name(ClientId(7)), Some("alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_check_precedes_name_check() {
        let mut registry = ClientRegistry::new();
        registry.register(ClientId(7), "alice").unwrap();

        assert_eq!(
            registry.register(ClientId(7), "x"),
            Err(CommandError::AlreadySubscribed)
        );
    }

    #[test]
    fn test_same_name_different_connections() {
        let mut registry = ClientRegistry::new();
        registry.register(ClientId(1), "bob").unwrap();
        registry.register(ClientId(2), "bob").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister() {
        let mut registry = ClientRegistry::new();
        registry.register(ClientId(1), "alice").unwrap();

        assert_eq!(registry.unregister(ClientId(1)), Some("alice".to_string()));
        assert_eq!(registry.unregister(ClientId(1)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_roster_is_sorted_by_id() {
        let mut registry = ClientRegistry::new();
        registry.register(ClientId(3), "carol").unwrap();
        registry.register(ClientId(1), "alice").unwrap();
        registry.register(ClientId(2), "bobby").unwrap();

        assert_eq!(registry.ids(), vec![ClientId(1), ClientId(2), ClientId(3)]);
        let names: Vec<String> = registry.roster().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["alice", "bobby", "carol"]);
    }
}
