//! `ScriptedPlanner` - Deterministic Planner for Tests
//!
//! Replays a queue of canned responses, so the three-stage sandbox and the
//! five-stage maintenance chain run byte-for-byte identically across runs.
//! Once the script is exhausted it answers with an empty string, which every
//! stage loop treats as "nothing more to collect".

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mnema_core::sim::{FaultInjector, FaultType};

use super::{PlannerError, PlannerProvider, PlannerRequest};

/// Scripted planner provider.
///
/// Clones share the same script and transcript, so a test can hand the
/// planner to the coordinator and still inspect the prompts it received.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPlanner {
    responses: Arc<Mutex<VecDeque<String>>>,
    transcript: Arc<Mutex<Vec<String>>>,
    faults: Option<Arc<FaultInjector>>,
}

impl ScriptedPlanner {
    /// Create a planner with an empty script (always answers "").
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a planner that replays `responses` in order.
    #[must_use]
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(Into::into).collect(),
            )),
            transcript: Arc::new(Mutex::new(Vec::new())),
            faults: None,
        }
    }

    /// Attach a fault injector (operation name: `planner_complete`).
    #[must_use]
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Queue another response at the end of the script.
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }

    /// Number of unconsumed responses.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Prompts received so far, in call order.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlannerProvider for ScriptedPlanner {
    #[tracing::instrument(skip(self, request), fields(prompt_len = request.prompt.len()))]
    async fn complete(&self, request: &PlannerRequest) -> Result<String, PlannerError> {
        if let Some(faults) = &self.faults {
            match faults.should_inject("planner_complete") {
                Some(FaultType::PlannerTimeout) => return Err(PlannerError::Timeout),
                Some(FaultType::PlannerProtocolFail) => {
                    return Err(PlannerError::protocol("injected protocol fault"))
                }
                Some(FaultType::PlannerUnavailable) => {
                    return Err(PlannerError::unavailable("injected outage"))
                }
                _ => {}
            }
        }

        self.transcript.lock().unwrap().push(request.prompt.clone());

        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn is_scripted(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnema_core::sim::{DeterministicRng, FaultConfig, FaultInjectorBuilder};

    #[tokio::test]
    async fn test_replays_in_order() {
        let planner = ScriptedPlanner::with_responses(["first", "second"]);
        let request = PlannerRequest::new("go");

        assert_eq!(planner.complete(&request).await.unwrap(), "first");
        assert_eq!(planner.complete(&request).await.unwrap(), "second");
        assert_eq!(planner.complete(&request).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_transcript_records_prompts() {
        let planner = ScriptedPlanner::with_responses(["ok"]);
        planner
            .complete(&PlannerRequest::new("prompt one"))
            .await
            .unwrap();

        let transcript = planner.transcript();
        assert_eq!(transcript, vec!["prompt one".to_string()]);
    }

    #[tokio::test]
    async fn test_clones_share_script() {
        let planner = ScriptedPlanner::with_responses(["only"]);
        let clone = planner.clone();

        assert_eq!(
            clone.complete(&PlannerRequest::new("go")).await.unwrap(),
            "only"
        );
        assert_eq!(planner.remaining(), 0);
    }

    #[tokio::test]
    async fn test_fault_injection_timeout() {
        let faults = Arc::new(
            FaultInjectorBuilder::new(DeterministicRng::new(7))
                .with_fault(FaultConfig::new(FaultType::PlannerTimeout, 1.0))
                .build(),
        );
        let planner = ScriptedPlanner::with_responses(["unreached"]).with_faults(faults);

        let result = planner.complete(&PlannerRequest::new("go")).await;
        assert!(matches!(result, Err(PlannerError::Timeout)));
    }

    #[test]
    fn test_is_scripted() {
        assert!(ScriptedPlanner::new().is_scripted());
        assert_eq!(ScriptedPlanner::new().name(), "scripted");
    }
}
