use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use debug_genie::{
    analysis::ReasoningBackend,
    case_data::{AccessSession, CaseComment, CaseDataSource, CaseRecord},
    credentials::{Credentials, StaticCredentialSource},
    error::RcaError,
    prompt::RcaPrompt,
};
use time::macros::datetime;

pub fn mock_credentials() -> Arc<Credentials> {
    Arc::new(Credentials::from_source(&StaticCredentialSource::mock()).expect("mock creds"))
}

pub fn sample_case() -> CaseRecord {
    CaseRecord {
        id: "500SCRIPTED".to_string(),
        ticket_id: "00077777".to_string(),
        subject: "Login failures".to_string(),
        description: "Users cannot sign in to the dashboard".to_string(),
        status: "Escalated".to_string(),
        created_at: datetime!(2026-03-01 08:00 UTC),
    }
}

#[derive(Default)]
pub struct CallLog {
    pub authenticate: usize,
    pub fetch_case: usize,
    pub fetch_comments: usize,
    pub fetch_recent_cases: usize,
    pub tokens_seen: Vec<String>,
}

/// Plays back queued outcomes; once a queue is drained it answers with the sample case.
pub struct ScriptedCaseSource {
    pub calls: Arc<Mutex<CallLog>>,
    case_outcomes: Mutex<VecDeque<Result<CaseRecord, RcaError>>>,
    comment_outcomes: Mutex<VecDeque<Result<Vec<CaseComment>, RcaError>>>,
    history_outcomes: Mutex<VecDeque<Result<Vec<CaseRecord>, RcaError>>>,
    auth_outcomes: Mutex<VecDeque<Result<(), RcaError>>>,
    expires_at: Option<time::OffsetDateTime>,
}

impl ScriptedCaseSource {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(CallLog::default())),
            case_outcomes: Mutex::new(VecDeque::new()),
            comment_outcomes: Mutex::new(VecDeque::new()),
            history_outcomes: Mutex::new(VecDeque::new()),
            auth_outcomes: Mutex::new(VecDeque::new()),
            expires_at: None,
        }
    }

    pub fn then_case(self, outcome: Result<CaseRecord, RcaError>) -> Self {
        self.case_outcomes
            .lock()
            .expect("lock")
            .push_back(outcome);
        self
    }

    pub fn then_comments(self, outcome: Result<Vec<CaseComment>, RcaError>) -> Self {
        self.comment_outcomes
            .lock()
            .expect("lock")
            .push_back(outcome);
        self
    }

    pub fn then_history(self, outcome: Result<Vec<CaseRecord>, RcaError>) -> Self {
        self.history_outcomes
            .lock()
            .expect("lock")
            .push_back(outcome);
        self
    }

    pub fn then_auth(self, outcome: Result<(), RcaError>) -> Self {
        self.auth_outcomes
            .lock()
            .expect("lock")
            .push_back(outcome);
        self
    }

    pub fn with_expired_sessions(mut self) -> Self {
        self.expires_at = Some(datetime!(2000-01-01 00:00 UTC));
        self
    }
}

#[async_trait]
impl CaseDataSource for ScriptedCaseSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<AccessSession, RcaError> {
        let attempt = {
            let mut calls = self.calls.lock().expect("lock");
            calls.authenticate += 1;
            calls.authenticate
        };
        if let Some(outcome) = self.auth_outcomes.lock().expect("lock").pop_front() {
            outcome?;
        }
        Ok(AccessSession {
            access_token: format!("token-{attempt}"),
            instance_url: credentials.instance_url.clone(),
            expires_at: self.expires_at,
        })
    }

    async fn fetch_case(
        &self,
        session: &AccessSession,
        _ticket_id: &str,
    ) -> Result<CaseRecord, RcaError> {
        {
            let mut calls = self.calls.lock().expect("lock");
            calls.fetch_case += 1;
            calls.tokens_seen.push(session.access_token.clone());
        }
        self.case_outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(sample_case()))
    }

    async fn fetch_comments(
        &self,
        session: &AccessSession,
        _case: &CaseRecord,
    ) -> Result<Vec<CaseComment>, RcaError> {
        {
            let mut calls = self.calls.lock().expect("lock");
            calls.fetch_comments += 1;
            calls.tokens_seen.push(session.access_token.clone());
        }
        self.comment_outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Does not record the token, so `tokens_seen` reflects the case and comment fetches only.
    async fn fetch_recent_cases(
        &self,
        _session: &AccessSession,
        _exclude_ticket_id: &str,
        _limit: usize,
    ) -> Result<Vec<CaseRecord>, RcaError> {
        self.calls.lock().expect("lock").fetch_recent_cases += 1;
        self.history_outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// A worked case that scores well above the similarity threshold against [`sample_case`].
pub fn similar_closed_case() -> CaseRecord {
    CaseRecord {
        id: "500HISTORY".to_string(),
        ticket_id: "00070001".to_string(),
        subject: "Login failures".to_string(),
        description: "Users cannot sign in to the admin dashboard".to_string(),
        status: "Closed".to_string(),
        created_at: datetime!(2026-01-10 08:00 UTC),
    }
}

/// Replies with queued texts in order and records every prompt it was given.
pub struct ScriptedReasoning {
    replies: Mutex<VecDeque<Result<String, RcaError>>>,
    pub prompts: Arc<Mutex<Vec<RcaPrompt>>>,
}

impl ScriptedReasoning {
    pub fn replying(replies: Vec<Result<String, RcaError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedReasoning {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, prompt: &RcaPrompt) -> Result<String, RcaError> {
        self.prompts.lock().expect("lock").push(prompt.clone());
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(valid_report_json()))
    }
}

pub fn valid_report_json() -> String {
    r#"{
        "impactedServices": ["auth-service"],
        "rootCause": "Expired signing certificate on the identity provider.",
        "recommendedSteps": ["Rotate the certificate"],
        "searchQueries": ["index=prod service=auth-service cert"],
        "confidence": "Medium"
    }"#
    .to_string()
}
