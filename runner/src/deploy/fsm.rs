//! Finite State Machine for a deployment attempt

use serde::{Deserialize, Serialize};

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentState {
    /// Accepted, nothing done yet
    Pending,

    /// Fetching sources and building the image
    Building,

    /// Starting and verifying the container
    Deploying,

    /// Container running
    Success,

    /// Build or run failed
    Failed,

    /// Stopped on request before reaching a result
    Canceled,
}

impl DeploymentState {
    /// Status string recorded in the deployment record store
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "PENDING",
            DeploymentState::Building => "BUILDING",
            DeploymentState::Deploying => "DEPLOYING",
            DeploymentState::Success => "SUCCESS",
            DeploymentState::Failed => "FAILED",
            DeploymentState::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Success | DeploymentState::Failed | DeploymentState::Canceled
        )
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Begin fetching and building
    StartBuild,

    /// Image built
    BuildSucceeded,

    /// Container started
    Deployed,

    /// Pipeline failed
    Fail(String),

    /// Stop requested
    Cancel,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Pending,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentState, String> {
        let new_state = match (&self.state, &event) {
            // From Pending
            (DeploymentState::Pending, DeploymentEvent::StartBuild) => DeploymentState::Building,

            // From Building
            (DeploymentState::Building, DeploymentEvent::BuildSucceeded) => {
                DeploymentState::Deploying
            }

            // From Deploying
            (DeploymentState::Deploying, DeploymentEvent::Deployed) => DeploymentState::Success,

            // Failure and cancellation from any non-terminal state
            (state, DeploymentEvent::Fail(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                DeploymentState::Failed
            }
            (state, DeploymentEvent::Cancel) if !state.is_terminal() => DeploymentState::Canceled,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
