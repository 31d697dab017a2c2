use std::{sync::Arc, time::Instant};

use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    analysis::{
        AnalysisEngine, FixtureReasoningBackend, OpenAiCompatibleBackend, RcaReport,
        ReasoningBackend,
    },
    case_data::{
        AccessSession, CaseComment, CaseDataSource, CaseRecord, FixtureCaseSource,
        SalesforceCaseSource,
    },
    config::{AnalysisConfig, Config, SimilarCasesConfig},
    credentials::{CredentialStore, Credentials},
    error::{RcaError, RcaErrorKind, not_found},
    prompt::PromptBuilder,
    similarity::{SimilarCase, find_most_similar},
};

/// Single entry point of the pipeline: ticket id in, report or classified error out.
///
/// Shared read-only across callers. Every [`Orchestrator::run_rca`] call authenticates
/// on its own, so sessions are never shared between runs.
pub struct Orchestrator {
    credentials: Arc<Credentials>,
    case_source: Arc<dyn CaseDataSource>,
    engine: AnalysisEngine,
    prompt_builder: PromptBuilder,
    strict_retry: bool,
    similar_cases: SimilarCasesConfig,
}

impl Orchestrator {
    pub fn new(
        credentials: Arc<Credentials>,
        case_source: Arc<dyn CaseDataSource>,
        reasoning: Arc<dyn ReasoningBackend>,
        analysis: &AnalysisConfig,
    ) -> Result<Self, RcaError> {
        Ok(Self {
            credentials,
            case_source,
            engine: AnalysisEngine::new(reasoning)?,
            prompt_builder: PromptBuilder,
            strict_retry: analysis.strict_retry,
            similar_cases: analysis.similar_cases.clone(),
        })
    }

    /// Picks live or fixture collaborators once, from the mock flag.
    pub fn from_credentials(credentials: Arc<Credentials>, config: &Config) -> Result<Self, RcaError> {
        let (case_source, reasoning): (Arc<dyn CaseDataSource>, Arc<dyn ReasoningBackend>) =
            if credentials.mock_mode {
                (
                    Arc::new(FixtureCaseSource::default()),
                    Arc::new(FixtureReasoningBackend::default()),
                )
            } else {
                (
                    Arc::new(SalesforceCaseSource::new(&config.crm)?),
                    Arc::new(OpenAiCompatibleBackend::new(
                        &config.llm,
                        credentials.openai_api_key.clone(),
                    )?),
                )
            };

        Self::new(credentials, case_source, reasoning, &config.analysis)
    }

    pub fn bootstrap(store: &CredentialStore, config: &Config) -> Result<Self, RcaError> {
        Self::from_credentials(store.load()?, config)
    }

    pub async fn run_rca(&self, ticket_id: &str) -> Result<RcaReport, RcaError> {
        let run_id = Uuid::now_v7().to_string();
        let span = tracing::info_span!(
            target: "orchestrator",
            "rca",
            run_id = %run_id,
            ticket_id = %ticket_id.trim()
        );

        async move {
            let started = Instant::now();
            tracing::info!(
                target: "orchestrator",
                case_source = self.case_source.name(),
                backend = self.engine.backend_name(),
                "rca_started"
            );

            let result = self.run_stages(ticket_id).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &result {
                Ok(report) => tracing::info!(
                    target: "orchestrator",
                    elapsed_ms,
                    impacted_services = report.impacted_services.len(),
                    "rca_completed"
                ),
                Err(err) => tracing::warn!(
                    target: "orchestrator",
                    elapsed_ms,
                    kind = %err.kind,
                    retryable = err.retryable,
                    error = %err.message,
                    "rca_failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, ticket_id: &str) -> Result<RcaReport, RcaError> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(not_found("ticket id is empty"));
        }

        let mut crm = CrmRun::open(self.case_source.as_ref(), &self.credentials).await?;
        let case = crm.fetch_case(ticket_id).await?;
        let comments = crm.fetch_comments(&case).await?;
        let similar = self.find_similar_case(&mut crm, &case).await;

        let prompt = self
            .prompt_builder
            .build_with_similar(&case, &comments, similar.as_ref());
        tracing::info!(
            target: "orchestrator",
            comment_count = comments.len(),
            similar_ticket = similar.as_ref().map(|found| found.case.ticket_id.as_str()),
            prompt_fingerprint = %prompt.fingerprint(),
            "prompt_built"
        );

        match self.engine.analyze(&prompt).await {
            Err(err)
                if self.strict_retry
                    && matches!(err.kind, RcaErrorKind::Parse | RcaErrorKind::Schema) =>
            {
                tracing::warn!(
                    target: "orchestrator",
                    kind = %err.kind,
                    error = %err.message,
                    "analysis_retrying_with_reminder"
                );
                self.engine.analyze(&prompt.with_strict_reminder()).await
            }
            other => other,
        }
    }

    /// Best-effort enrichment: a failed history lookup is logged and the run
    /// continues without a `<similar-case>` section.
    async fn find_similar_case(
        &self,
        crm: &mut CrmRun<'_>,
        case: &CaseRecord,
    ) -> Option<SimilarCase> {
        if !self.similar_cases.enabled {
            return None;
        }

        let history = match crm
            .fetch_recent_cases(&case.ticket_id, self.similar_cases.lookback)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(
                    target: "orchestrator",
                    kind = %err.kind,
                    error = %err.message,
                    "similar_case_lookup_failed"
                );
                return None;
            }
        };

        let similar = find_most_similar(case, &history, self.similar_cases.threshold);
        tracing::debug!(
            target: "orchestrator",
            candidates = history.len(),
            matched = similar.as_ref().map(|found| found.case.ticket_id.as_str()),
            score = similar.as_ref().map(|found| found.score),
            "similar_case_scored"
        );
        similar
    }
}

/// CRM access for one run. Holds the run's own session and its single
/// re-authentication allowance.
struct CrmRun<'a> {
    source: &'a dyn CaseDataSource,
    credentials: &'a Credentials,
    session: AccessSession,
    reauth_available: bool,
}

impl<'a> CrmRun<'a> {
    async fn open(
        source: &'a dyn CaseDataSource,
        credentials: &'a Credentials,
    ) -> Result<Self, RcaError> {
        let session = source.authenticate(credentials).await?;
        Ok(Self {
            source,
            credentials,
            session,
            reauth_available: true,
        })
    }

    async fn fetch_case(&mut self, ticket_id: &str) -> Result<CaseRecord, RcaError> {
        self.refresh_if_expired().await?;
        match self.source.fetch_case(&self.session, ticket_id).await {
            Err(err) if self.can_retry(&err) => {
                self.reauthenticate(&err).await?;
                self.source.fetch_case(&self.session, ticket_id).await
            }
            other => other,
        }
    }

    async fn fetch_comments(&mut self, case: &CaseRecord) -> Result<Vec<CaseComment>, RcaError> {
        self.refresh_if_expired().await?;
        match self.source.fetch_comments(&self.session, case).await {
            Err(err) if self.can_retry(&err) => {
                self.reauthenticate(&err).await?;
                self.source.fetch_comments(&self.session, case).await
            }
            other => other,
        }
    }

    async fn fetch_recent_cases(
        &mut self,
        exclude_ticket_id: &str,
        limit: usize,
    ) -> Result<Vec<CaseRecord>, RcaError> {
        self.refresh_if_expired().await?;
        match self
            .source
            .fetch_recent_cases(&self.session, exclude_ticket_id, limit)
            .await
        {
            Err(err) if self.can_retry(&err) => {
                self.reauthenticate(&err).await?;
                self.source
                    .fetch_recent_cases(&self.session, exclude_ticket_id, limit)
                    .await
            }
            other => other,
        }
    }

    fn can_retry(&self, err: &RcaError) -> bool {
        self.reauth_available && err.kind == RcaErrorKind::Auth
    }

    async fn reauthenticate(&mut self, cause: &RcaError) -> Result<(), RcaError> {
        self.reauth_available = false;
        tracing::info!(
            target: "case_data",
            source = self.source.name(),
            cause = %cause.message,
            "crm_reauthenticating"
        );
        self.session = self.source.authenticate(self.credentials).await?;
        Ok(())
    }

    /// Known-expired sessions are replaced up front; this does not use the retry allowance.
    async fn refresh_if_expired(&mut self) -> Result<(), RcaError> {
        if self.session.is_expired_at(OffsetDateTime::now_utc()) {
            tracing::debug!(target: "case_data", source = self.source.name(), "crm_session_expired");
            self.session = self.source.authenticate(self.credentials).await?;
        }
        Ok(())
    }
}
