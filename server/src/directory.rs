//! Scenarios backed by a directory on disk
//!
//! Each subdirectory of the scenario root is one scenario named after it.
//! Its resources are the files listed in an optional `scenario.json`
//! manifest, or every regular file in the directory when there is none.
//! Files are read into memory when the scenario is opened, so the digests
//! advertised for a session always match the bytes served during it.
//!
//! The game logic is a plain relay: whatever one player sends through
//! `GAME` is forwarded to everyone else.

use crate::error::ScenarioError;
use crate::registry::ClientId;
use crate::scenario::{Scenario, ScenarioContext};
use crate::lobby::LOBBY_SCENARIO;
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Optional manifest inside a scenario directory
pub const MANIFEST_FILE: &str = "scenario.json";

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    resources: Option<Vec<String>>,
}

/// Lists scenario directories under `root` as `(name, path)` pairs
///
/// Directories whose names cannot travel as a single protocol token, or that
/// would shadow the lobby, are skipped with a warning.
pub fn discover(root: &Path) -> Result<Vec<(String, PathBuf)>, ScenarioError> {
    let mut found = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_token(&name) || name == LOBBY_SCENARIO {
            warn!("Ignoring scenario directory {:?}", entry.path());
            continue;
        }
        found.push((name, entry.path()));
    }

    found.sort();
    info!("Found {} scenario(s) in {}", found.len(), root.display());
    Ok(found)
}

/// Plain file names only: no whitespace, no path separators, not `.`/`..`
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c.is_whitespace() || c == '/' || c == '\\')
}

/// A scenario whose resources are the files of one directory
///
/// Players are tracked from the moment their sync completes so relayed
/// messages can be tagged with the sender's name.
pub struct DirectoryScenario {
    name: String,
    description: Option<String>,
    resources: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    players: HashMap<ClientId, String>,
}

impl DirectoryScenario {
    /// Reads the scenario directory
    ///
    /// Fails if the manifest is malformed, names an invalid or missing file,
    /// or if any resource cannot be read.
    pub fn open(name: &str, dir: &Path) -> Result<Self, ScenarioError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: Manifest = if manifest_path.is_file() {
            serde_json::from_str(&fs::read_to_string(&manifest_path)?)?
        } else {
            Manifest::default()
        };

        let resources = match manifest.resources {
            Some(resources) => resources,
            None => {
                let mut listed = Vec::new();
                for entry in fs::read_dir(dir)? {
                    let entry = entry?;
                    let file_name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type()?.is_file() && file_name != MANIFEST_FILE {
                        listed.push(file_name);
                    }
                }
                listed.sort();
                listed
            }
        };

        let mut files = HashMap::new();
        for resource in &resources {
            if !is_token(resource) {
                return Err(ScenarioError::Construction {
                    name: name.to_string(),
                    reason: format!("invalid resource name {:?}", resource),
                });
            }
            files.insert(resource.clone(), fs::read(dir.join(resource))?);
        }

        Ok(Self {
            name: name.to_string(),
            description: manifest.description,
            resources,
            files,
            players: HashMap::new(),
        })
    }
}

impl Scenario for DirectoryScenario {
    fn name(&self) -> &str {
        &self.name
    }

    fn resources(&self) -> Vec<String> {
        self.resources.clone()
    }

    fn get(&self, resource: &str) -> Result<Vec<u8>, ScenarioError> {
        self.files
            .get(resource)
            .cloned()
            .ok_or_else(|| ScenarioError::MissingResource(resource.to_string()))
    }

    fn client_login(
        &mut self,
        ctx: &mut ScenarioContext<'_>,
        client: ClientId,
    ) -> Result<(), ScenarioError> {
        let name = ctx.client_name(client).unwrap_or("?").to_string();
        if let Some(description) = &self.description {
            ctx.send_to(client, format!("description {}", description));
        }
        ctx.send_all(format!("joined @{}", name), None);
        self.players.insert(client, name);
        Ok(())
    }

    fn client_logout(
        &mut self,
        ctx: &mut ScenarioContext<'_>,
        client: ClientId,
    ) -> Result<(), ScenarioError> {
        if let Some(name) = self.players.remove(&client) {
            ctx.send_all(format!("left @{}", name), None);
        }
        Ok(())
    }

    fn client_receive(
        &mut self,
        ctx: &mut ScenarioContext<'_>,
        client: ClientId,
        payload: &str,
    ) -> Result<(), ScenarioError> {
        let name = self
            .players
            .get(&client)
            .ok_or_else(|| ScenarioError::Hook(format!("client {} has not joined yet", client)))?;
        ctx.send_all(format!("@{} {}", name, payload), Some(client));
        Ok(())
    }
}
