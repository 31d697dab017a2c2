use async_trait::async_trait;

use crate::{analysis::ReasoningBackend, error::RcaError, prompt::RcaPrompt};

const FIXTURE_RESPONSE: &str = r#"{
  "impactedServices": ["payment-gateway", "checkout"],
  "rootCause": "Database connection pool exhaustion in the payment gateway after the latest release, causing 504 Gateway Timeout responses for EU checkout traffic.",
  "recommendedSteps": [
    "Increase the maximum connections of the payment gateway database pool.",
    "Roll back the most recent payment gateway deployment.",
    "Monitor checkout latency and 5xx rates for the EU region."
  ],
  "searchQueries": [
    "index=prod_logs service=payment-gateway \"504 Gateway Timeout\" | stats count by host",
    "index=prod_logs service=payment-gateway SQLTransientConnectionException | timechart count"
  ],
  "confidence": "High"
}"#;

/// Returns canned completion text. The text still goes through parsing and
/// validation, so mock mode exercises the same contract as a live model.
#[derive(Debug, Clone)]
pub struct FixtureReasoningBackend {
    response: String,
}

impl FixtureReasoningBackend {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Default for FixtureReasoningBackend {
    fn default() -> Self {
        Self::with_response(FIXTURE_RESPONSE)
    }
}

#[async_trait]
impl ReasoningBackend for FixtureReasoningBackend {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn complete(&self, _prompt: &RcaPrompt) -> Result<String, RcaError> {
        Ok(self.response.clone())
    }
}
