//! Lobby scenario where players vote on what to play next.

use crate::error::ScenarioError;
use crate::registry::ClientId;
use crate::scenario::{Scenario, ScenarioContext};
use log::info;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// Name under which the lobby is registered
pub const LOBBY_SCENARIO: &str = "choose";

/// Collects one vote per player and switches to the winner once everyone
/// present has voted. Ties are broken at random.
pub struct Lobby {
    choices: Vec<String>,
    votes: HashMap<ClientId, String>,
}

impl Lobby {
    /// Creates a lobby offering `choices`
    ///
    /// The lobby's own name is removed from the list so players cannot vote
    /// to stay where they are.
    pub fn new(choices: Vec<String>) -> Self {
        Self {
            choices: choices
                .into_iter()
                .filter(|name| name != LOBBY_SCENARIO)
                .collect(),
            votes: HashMap::new(),
        }
    }

    fn vote(&mut self, ctx: &mut ScenarioContext<'_>, client: ClientId, choice: &str) {
        if !self.choices.iter().any(|c| c == choice) {
            ctx.send_to(client, format!("error unknown scenario {}", choice));
            return;
        }

        let name = ctx.client_name(client).unwrap_or("?").to_string();
        self.votes.insert(client, choice.to_string());
        ctx.send_all(format!("vote @{} {}", name, choice), None);
        self.tally(ctx);
    }

    /// Picks a winner once every logged-in client has a vote on record
    fn tally(&mut self, ctx: &mut ScenarioContext<'_>) {
        let voters = ctx.clients();
        if voters.is_empty() || voters.iter().any(|c| !self.votes.contains_key(c)) {
            return;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for choice in self.votes.values() {
            *counts.entry(choice.as_str()).or_default() += 1;
        }
        let best = counts.values().copied().max().unwrap_or(0);
        let mut leaders: Vec<&str> = counts
            .iter()
            .filter(|(_, &count)| count == best)
            .map(|(&choice, _)| choice)
            .collect();
        leaders.sort_unstable();

        if let Some(winner) = leaders.choose(&mut rand::thread_rng()) {
            let winner = winner.to_string();
            info!("Lobby vote finished, next scenario is <{}>", winner);
            ctx.notify_all(format!("Next scenario: {}", winner));
            ctx.switch_scenario(winner);
            self.votes.clear();
        }
    }
}

impl Scenario for Lobby {
    fn name(&self) -> &str {
        LOBBY_SCENARIO
    }

    fn resources(&self) -> Vec<String> {
        Vec::new()
    }

    fn get(&self, resource: &str) -> Result<Vec<u8>, ScenarioError> {
        Err(ScenarioError::MissingResource(resource.to_string()))
    }

    fn client_login(
        &mut self,
        ctx: &mut ScenarioContext<'_>,
        client: ClientId,
    ) -> Result<(), ScenarioError> {
        ctx.send_to(client, format!("scenarios {}", self.choices.join(" ")));
        Ok(())
    }

    fn client_logout(
        &mut self,
        ctx: &mut ScenarioContext<'_>,
        client: ClientId,
    ) -> Result<(), ScenarioError> {
        self.votes.remove(&client);
        self.tally(ctx);
        Ok(())
    }

    fn client_receive(
        &mut self,
        ctx: &mut ScenarioContext<'_>,
        client: ClientId,
        payload: &str,
    ) -> Result<(), ScenarioError> {
        match shared::split_line(payload) {
            Some((command, choice)) if command.eq_ignore_ascii_case("vote") => {
                self.vote(ctx, client, choice.trim());
            }
            Some((command, _)) => {
                ctx.send_to(client, format!("error unknown command {}", command));
            }
            None => {}
        }
        Ok(())
    }
}
