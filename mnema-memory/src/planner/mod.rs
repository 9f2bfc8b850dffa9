//! Planner Provider - Unified Interface to the External Model
//!
//! The substrate never interprets language itself: concept location, record
//! selection and maintenance review are all delegated to a planner behind
//! this trait. Production adapters (local, HTTP) live outside the substrate;
//! the crate ships [`ScriptedPlanner`] so every staged flow is testable
//! without a model.
//!
//! # Usage
//!
//! ```rust
//! use mnema_memory::planner::{PlannerProvider, PlannerRequest, ScriptedPlanner};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let planner = ScriptedPlanner::with_responses(["1\n1.2", ""]);
//! let request = PlannerRequest::new("Locate concept nodes for: what is decay?");
//! let response = planner.complete(&request).await.unwrap();
//! assert_eq!(response, "1\n1.2");
//! # }
//! ```

mod scripted;

pub use scripted::ScriptedPlanner;

use async_trait::async_trait;
use thiserror::Error;

use crate::constants::PLANNER_PROMPT_BYTES_MAX;

// =============================================================================
// Error Types
// =============================================================================

/// Errors from planner calls.
///
/// Timeouts and protocol failures terminate the enclosing stage; they never
/// abort the cycle.
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    /// Call exceeded its per-call timeout
    #[error("planner call timed out")]
    Timeout,

    /// Output did not follow the stage protocol
    #[error("planner protocol error: {message}")]
    Protocol {
        /// What was malformed
        message: String,
    },

    /// Planner temporarily unavailable
    #[error("planner unavailable: {message}")]
    Unavailable {
        /// Reason for unavailability
        message: String,
    },

    /// Prompt failed validation
    #[error("invalid prompt: {message}")]
    InvalidPrompt {
        /// What was invalid
        message: String,
    },
}

impl PlannerError {
    /// Create a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an invalid-prompt error.
    #[must_use]
    pub fn invalid_prompt(message: impl Into<String>) -> Self {
        Self::InvalidPrompt {
            message: message.into(),
        }
    }

    /// Check whether the enclosing stage should simply stop collecting.
    ///
    /// Timeouts and protocol errors are treated as an empty planner output;
    /// unavailability propagates so the cycle can decide to retry.
    #[must_use]
    pub fn is_stage_terminal(&self) -> bool {
        matches!(self, Self::Timeout | Self::Protocol { .. })
    }
}

// =============================================================================
// Request Type
// =============================================================================

/// A single planner call.
#[derive(Debug, Clone)]
pub struct PlannerRequest {
    /// The prompt text (required)
    pub prompt: String,
    /// Optional system framing
    pub system: Option<String>,
}

impl PlannerRequest {
    /// Create a new request with just a prompt.
    ///
    /// # Panics
    /// Panics if the prompt is empty or exceeds `PLANNER_PROMPT_BYTES_MAX`.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();

        // Preconditions
        assert!(!prompt.is_empty(), "prompt must not be empty");
        assert!(
            prompt.len() <= PLANNER_PROMPT_BYTES_MAX,
            "prompt exceeds {PLANNER_PROMPT_BYTES_MAX} bytes"
        );

        Self {
            prompt,
            system: None,
        }
    }

    /// Set the system framing.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Trait for planner providers.
///
/// Higher-level components (sandbox stages, maintenance chain) work against
/// this trait and never against a concrete adapter.
#[async_trait]
pub trait PlannerProvider: Send + Sync {
    /// Complete a prompt with a text response.
    ///
    /// # Errors
    /// Returns `PlannerError` on failure.
    async fn complete(&self, request: &PlannerRequest) -> Result<String, PlannerError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Whether this is a scripted (test) provider.
    fn is_scripted(&self) -> bool;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = PlannerRequest::new("Locate nodes").with_system("You navigate a graph.");
        assert_eq!(request.prompt, "Locate nodes");
        assert_eq!(request.system.as_deref(), Some("You navigate a graph."));
    }

    #[test]
    #[should_panic(expected = "prompt must not be empty")]
    fn test_empty_prompt_panics() {
        let _ = PlannerRequest::new("");
    }

    #[test]
    fn test_stage_terminal_classification() {
        assert!(PlannerError::Timeout.is_stage_terminal());
        assert!(PlannerError::protocol("garbled").is_stage_terminal());
        assert!(!PlannerError::unavailable("down").is_stage_terminal());
    }
}
