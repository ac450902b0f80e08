//! Scenario plugins and the host that runs one of them
//!
//! A scenario is a game definition selected by name at runtime. It declares
//! the resources clients must hold before they can play, serves those
//! resources on demand, and reacts to four lifecycle hooks. Scenarios are
//! statically linked and looked up through a [`ScenarioCatalog`] of factory
//! closures; every load calls the factory again, so nothing from a previous
//! instance of the same scenario survives into the next one.

use crate::directory::{self, DirectoryScenario};
use crate::error::ScenarioError;
use crate::lobby::{Lobby, LOBBY_SCENARIO};
use crate::outbox::Outbox;
use crate::registry::{ClientId, ClientRegistry};
use log::info;
use shared::ServerMessage;
use std::collections::HashMap;
use std::path::Path;

/// Contract every scenario implements
///
/// Hooks receive a [`ScenarioContext`] for talking to clients. Errors
/// returned from hooks are logged by the session and never tear it down.
pub trait Scenario: Send {
    /// Stable identifier, used in every protocol line about this scenario
    fn name(&self) -> &str;

    /// Resources a client must hold before it can join the game
    fn resources(&self) -> Vec<String>;

    /// Raw bytes of a resource
    fn get(&self, resource: &str) -> Result<Vec<u8>, ScenarioError>;

    /// Digest advertised to clients so they can validate cached copies
    fn digest(&self, resource: &str) -> Result<String, ScenarioError> {
        Ok(shared::digest(&self.get(resource)?))
    }

    /// A client finished syncing and is ready to play
    fn client_login(
        &mut self,
        _ctx: &mut ScenarioContext<'_>,
        _client: ClientId,
    ) -> Result<(), ScenarioError> {
        Ok(())
    }

    fn client_logout(
        &mut self,
        _ctx: &mut ScenarioContext<'_>,
        _client: ClientId,
    ) -> Result<(), ScenarioError> {
        Ok(())
    }

    /// Text of a `GAME` command sent by a client
    fn client_receive(
        &mut self,
        _ctx: &mut ScenarioContext<'_>,
        _client: ClientId,
        _payload: &str,
    ) -> Result<(), ScenarioError> {
        Ok(())
    }

    /// Called once per tick while the session is running
    fn update(&mut self, _ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        Ok(())
    }
}

/// What a scenario may see and do from inside a hook
///
/// Messages are queued on the coordinator's outbox rather than written
/// directly; the coordinator remains the only writer to connections.
pub struct ScenarioContext<'a> {
    scenario: &'a str,
    registry: &'a ClientRegistry,
    outbox: &'a mut Outbox,
    switch_request: &'a mut Option<String>,
}

impl<'a> ScenarioContext<'a> {
    /// Binds a context to one scenario's name and the session's shared state
    pub fn new(
        scenario: &'a str,
        registry: &'a ClientRegistry,
        outbox: &'a mut Outbox,
        switch_request: &'a mut Option<String>,
    ) -> Self {
        Self {
            scenario,
            registry,
            outbox,
            switch_request,
        }
    }

    pub fn scenario(&self) -> &str {
        self.scenario
    }

    /// Logged-in clients, including those still syncing
    pub fn clients(&self) -> Vec<ClientId> {
        self.registry.ids()
    }

    /// Display name of a logged-in client
    pub fn client_name(&self, client: ClientId) -> Option<&str> {
        self.registry.name(client)
    }

    /// Sends `GAME <scenario> <payload>` to one client
    pub fn send_to(&mut self, client: ClientId, payload: impl Into<String>) {
        let message = self.game_message(payload.into());
        self.outbox.send_to(client, message);
    }

    /// Sends `GAME <scenario> <payload>` to every client except `exclude`
    pub fn send_all(&mut self, payload: impl Into<String>, exclude: Option<ClientId>) {
        let message = self.game_message(payload.into());
        self.outbox.send_all(message, exclude);
    }

    /// Broadcasts a plain `NOTIFY` line to everyone
    pub fn notify_all(&mut self, text: impl Into<String>) {
        self.outbox.notify_all(text, None);
    }

    /// Asks the session to replace this scenario once the current tick ends
    pub fn switch_scenario(&mut self, name: impl Into<String>) {
        *self.switch_request = Some(name.into());
    }

    fn game_message(&self, payload: String) -> ServerMessage {
        ServerMessage::Game {
            scenario: self.scenario.to_string(),
            payload,
        }
    }
}

/// A resource as advertised in `REQUIRE` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub digest: String,
}

/// The running instance of a scenario plus its advertised resource list
///
/// Digests are computed once at load time so every client sees the same
/// values for the whole session.
pub struct ScenarioHost {
    name: String,
    scenario: Box<dyn Scenario>,
    resources: Vec<Resource>,
}

impl ScenarioHost {
    /// Instantiates a fresh copy of the named scenario
    pub fn load(catalog: &ScenarioCatalog, name: &str) -> Result<Self, ScenarioError> {
        let scenario = catalog.instantiate(name)?;
        let resources = scenario
            .resources()
            .into_iter()
            .map(|resource| {
                let digest = scenario.digest(&resource)?;
                Ok(Resource {
                    name: resource,
                    digest,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        info!(
            "Loaded scenario <{}> with {} resource(s)",
            scenario.name(),
            resources.len()
        );

        Ok(Self {
            name: name.to_string(),
            scenario,
            resources,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resources advertised for this session, with the digests computed at load
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// `LOAD` followed by one `REQUIRE` per resource
    pub fn load_sequence(&self) -> Vec<ServerMessage> {
        let mut messages = vec![ServerMessage::Load {
            scenario: self.name.clone(),
        }];
        messages.extend(self.resources.iter().map(|resource| ServerMessage::Require {
            scenario: self.name.clone(),
            resource: resource.name.clone(),
            digest: resource.digest.clone(),
        }));
        messages
    }

    /// Bytes of an advertised resource; anything not advertised is refused
    pub fn fetch(&self, resource: &str) -> Result<Vec<u8>, ScenarioError> {
        if !self.resources.iter().any(|r| r.name == resource) {
            return Err(ScenarioError::MissingResource(resource.to_string()));
        }
        self.scenario.get(resource)
    }

    /// Runs a hook with a context bound to this scenario
    pub fn with_context<R>(
        &mut self,
        registry: &ClientRegistry,
        outbox: &mut Outbox,
        switch_request: &mut Option<String>,
        hook: impl FnOnce(&mut dyn Scenario, &mut ScenarioContext<'_>) -> R,
    ) -> R {
        let ScenarioHost { name, scenario, .. } = self;
        let mut ctx = ScenarioContext::new(name.as_str(), registry, outbox, switch_request);
        hook(scenario.as_mut(), &mut ctx)
    }
}

/// Builds a fresh scenario instance on every load
pub type ScenarioFactory = Box<dyn Fn() -> Result<Box<dyn Scenario>, ScenarioError> + Send>;

/// Registry of scenario names to factories
#[derive(Default)]
pub struct ScenarioCatalog {
    factories: HashMap<String, ScenarioFactory>,
}

impl ScenarioCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the lobby plus every scenario directory under `root`
    ///
    /// Directory scenarios re-read their files on each load, so edits on disk
    /// are picked up the next time the scenario starts.
    pub fn standard(root: Option<&Path>) -> Result<Self, ScenarioError> {
        let mut catalog = Self::new();

        if let Some(root) = root {
            for (name, path) in directory::discover(root)? {
                let scenario_name = name.clone();
                catalog.register(name, move || {
                    let scenario = DirectoryScenario::open(&scenario_name, &path)?;
                    Ok(Box::new(scenario) as Box<dyn Scenario>)
                });
            }
        }

        let choices = catalog.names();
        catalog.register(LOBBY_SCENARIO, move || {
            Ok(Box::new(Lobby::new(choices.clone())) as Box<dyn Scenario>)
        });

        Ok(catalog)
    }

    /// Adds or replaces the factory for `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Scenario>, ScenarioError> + Send + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs the factory registered under `name`
    ///
    /// Fails with [`ScenarioError::UnknownScenario`] when nothing is registered,
    /// or with whatever error the factory itself returns.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Scenario>, ScenarioError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownScenario(name.to_string()))?;
        factory()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_load_computes_digests() {
        let (catalog, _) = catalog();
        let host = ScenarioHost::load(&catalog, "maze").unwrap();

        assert_eq!(host.name(), "maze");
        assert_eq!(host.resources().len(), 2);
        assert_eq!(
            host.resources()[0].digest,
            shared::digest(b"#####\n#...#\n#####\n")
        );
    }

    #[test]
    fn test_load_sequence_order() {
        let (catalog, _) = catalog();
        let host = ScenarioHost::load(&catalog, "maze").unwrap();
        let lines: Vec<String> = host.load_sequence().iter().map(|m| m.to_string()).collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "LOAD maze");
        assert!(lines[1].starts_with("REQUIRE maze map.txt "));
        assert!(lines[2].starts_with("REQUIRE maze sprite.bin "));
    }

    #[test]
    fn test_unknown_and_failing_scenarios() {
        let (catalog, _) = catalog();
        assert!(matches!(
            ScenarioHost::load(&catalog, "nowhere"),
            Err(ScenarioError::UnknownScenario(_))
        ));
        assert!(matches!(
            ScenarioHost::load(&catalog, "broken"),
            Err(ScenarioError::Construction { .. })
        ));
    }

    #[test]
    fn test_fetch_only_advertised_resources() {
        let (catalog, _) = catalog();
        let host = ScenarioHost::load(&catalog, "maze").unwrap();

        assert_eq!(host.fetch("sprite.bin").unwrap(), vec![0u8, 255, 17, 42, 250, 251]);
        assert!(matches!(
            host.fetch("../secret"),
            Err(ScenarioError::MissingResource(_))
        ));
    }

    #[test]
    fn test_each_load_is_a_fresh_instance() {
        let (catalog, log) = catalog();
        let registry = ClientRegistry::new();
        let mut outbox = Outbox::new();
        let mut switch = None;

        let mut first = ScenarioHost::load(&catalog, "maze").unwrap();
        first.with_context(&registry, &mut outbox, &mut switch, |s, ctx| s.update(ctx)).unwrap();
        drop(first);

        let second = ScenarioHost::load(&catalog, "maze").unwrap();
        assert_eq!(second.resources().len(), 2);
        assert_eq!(log.lock().unwrap().updates, 1);
    }

    #[test]
    fn test_context_queues_game_messages() {
        let mut registry = ClientRegistry::new();
        registry.register(ClientId(1), "alice").unwrap();
        let mut outbox = Outbox::new();
        let mut switch = None;

        {
            let mut ctx = ScenarioContext::new("maze", &registry, &mut outbox, &mut switch);
            assert_eq!(ctx.clients(), vec![ClientId(1)]);
            assert_eq!(ctx.client_name(ClientId(1)), Some("alice"));
            ctx.send_to(ClientId(1), "hello");
            ctx.switch_scenario("race");
        }

        let envelopes = outbox.drain();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].message.to_string(), "GAME maze hello");
        assert_eq!(switch.as_deref(), Some("race"));
    }

    #[test]
    fn test_standard_catalog_has_lobby() {
        let catalog = ScenarioCatalog::standard(None).unwrap();
        assert_eq!(catalog.names(), vec![LOBBY_SCENARIO.to_string()]);
        assert!(catalog.contains(LOBBY_SCENARIO));
    }
}
