//! Error taxonomy for command handling, scenario loading and session ticks.

use thiserror::Error;

/// Rejection of a single client command.
///
/// The `Display` text is exactly what the originating client receives after
/// `FAILED`. These never touch other clients or the session state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid login")]
    InvalidLogin,

    #[error("Already subscribed")]
    AlreadySubscribed,

    #[error("A game is running")]
    GameInProgress,

    #[error("Invalid command <{0}>")]
    InvalidCommand(String),

    #[error("Invalid scenario name for GET")]
    InvalidScenario,

    #[error("Unknown resource <{0}>")]
    UnknownResource(String),
}

/// Failures raised by scenario factories and hooks.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("no scenario named <{0}>")]
    UnknownScenario(String),

    #[error("scenario <{name}> failed to start: {reason}")]
    Construction { name: String, reason: String },

    #[error("scenario has no resource <{0}>")]
    MissingResource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scenario manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("{0}")]
    Hook(String),
}

/// Errors escaping a state handler during a tick.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load scenario <{name}>: {source}")]
    ScenarioLoadFailure {
        name: String,
        #[source]
        source: ScenarioError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_reasons() {
        assert_eq!(CommandError::InvalidLogin.to_string(), "Invalid login");
        assert_eq!(CommandError::AlreadySubscribed.to_string(), "Already subscribed");
        assert_eq!(CommandError::GameInProgress.to_string(), "A game is running");
        assert_eq!(
            CommandError::InvalidCommand("jump".to_string()).to_string(),
            "Invalid command <jump>"
        );
        assert_eq!(
            CommandError::InvalidScenario.to_string(),
            "Invalid scenario name for GET"
        );
    }

    #[test]
    fn test_load_failure_message() {
        let err = SessionError::ScenarioLoadFailure {
            name: "maze".to_string(),
            source: ScenarioError::UnknownScenario("maze".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "failed to load scenario <maze>: no scenario named <maze>"
        );
    }
}
