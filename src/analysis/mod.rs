use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::RcaError, prompt::RcaPrompt};

pub mod fixture;
pub mod openai_compatible;
pub mod report;

pub use fixture::FixtureReasoningBackend;
pub use openai_compatible::OpenAiCompatibleBackend;
pub use report::{Confidence, RcaReport, ReportValidator};

/// A model that turns a prompt into raw completion text. Transport and provider
/// failures surface as `Llm` errors; judging the text is the engine's job.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &RcaPrompt) -> Result<String, RcaError>;
}

pub struct AnalysisEngine {
    backend: Arc<dyn ReasoningBackend>,
    validator: ReportValidator,
}

impl AnalysisEngine {
    pub fn new(backend: Arc<dyn ReasoningBackend>) -> Result<Self, RcaError> {
        Ok(Self {
            backend,
            validator: ReportValidator::new()?,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// One model call, no retries. A malformed reply is a hard failure.
    pub async fn analyze(&self, prompt: &RcaPrompt) -> Result<RcaReport, RcaError> {
        let output = self.backend.complete(prompt).await?;
        tracing::debug!(
            target: "analysis",
            backend = self.backend.name(),
            output_chars = output.chars().count(),
            "model_output_received"
        );
        self.validator.validate_text(&output)
    }
}
