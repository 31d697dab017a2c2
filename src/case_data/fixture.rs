use std::collections::BTreeMap;

use async_trait::async_trait;
use time::macros::datetime;

use crate::{
    case_data::{
        CaseDataSource,
        types::{AccessSession, CaseComment, CaseRecord, sort_chronologically},
    },
    credentials::Credentials,
    error::{RcaError, not_found},
};

pub const FIXTURE_TICKET_ID: &str = "00012345";

#[derive(Debug, Clone)]
struct FixtureCase {
    record: CaseRecord,
    comments: Vec<CaseComment>,
}

/// Canned CRM data for mock mode. Never touches the network.
#[derive(Debug, Clone)]
pub struct FixtureCaseSource {
    cases: BTreeMap<String, FixtureCase>,
    history: Vec<CaseRecord>,
}

impl FixtureCaseSource {
    pub fn empty() -> Self {
        Self {
            cases: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn with_case(mut self, record: CaseRecord, comments: Vec<CaseComment>) -> Self {
        self.cases
            .insert(record.ticket_id.clone(), FixtureCase { record, comments });
        self
    }

    /// Adds a worked case to the pool served by `fetch_recent_cases`.
    pub fn with_history(mut self, record: CaseRecord) -> Self {
        self.history.push(record);
        self
    }
}

fn closed_case(id: &str, ticket_id: &str, subject: &str, description: &str) -> CaseRecord {
    CaseRecord {
        id: id.to_string(),
        ticket_id: ticket_id.to_string(),
        subject: subject.to_string(),
        description: description.to_string(),
        status: "Closed".to_string(),
        created_at: datetime!(2026-01-20 08:00 UTC),
    }
}

impl Default for FixtureCaseSource {
    fn default() -> Self {
        Self::empty().with_case(
            CaseRecord {
                id: "500FIXTURE0012345".to_string(),
                ticket_id: FIXTURE_TICKET_ID.to_string(),
                subject: "Payment timeout".to_string(),
                description: "Checkout fails for EU users".to_string(),
                status: "New".to_string(),
                created_at: datetime!(2026-02-16 09:45 UTC),
            },
            vec![
                CaseComment {
                    author: "l2-support".to_string(),
                    body: "2026-02-16T10:00:00Z service=payment-gateway env=prod-eu \
                           java.sql.SQLTransientConnectionException: Connection is not available, \
                           request timed out after 30000ms."
                        .to_string(),
                    created_at: datetime!(2026-02-16 10:00 UTC),
                },
                CaseComment {
                    author: "sre-oncall".to_string(),
                    body: "Restarted the payment-gateway pods at 2026-02-16T10:30:00Z but \
                           504 Gateway Timeout persisted for EU checkout traffic."
                        .to_string(),
                    created_at: datetime!(2026-02-16 10:30 UTC),
                },
            ],
        )
        .with_history(closed_case(
            "500FIXTURE0001006",
            "00001006",
            "Payment gateway timeout",
            "Checkout fails for EU users with 504 errors.",
        ))
        .with_history(closed_case(
            "500FIXTURE0001007",
            "00001007",
            "User Login Failure",
            "Cannot login to dashboard.",
        ))
    }
}

#[async_trait]
impl CaseDataSource for FixtureCaseSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<AccessSession, RcaError> {
        Ok(AccessSession {
            access_token: "fixture-access-token".to_string(),
            instance_url: credentials.instance_url.clone(),
            expires_at: None,
        })
    }

    async fn fetch_case(
        &self,
        _session: &AccessSession,
        ticket_id: &str,
    ) -> Result<CaseRecord, RcaError> {
        let ticket_id = ticket_id.trim();
        self.cases
            .get(ticket_id)
            .map(|case| case.record.clone())
            .ok_or_else(|| not_found(format!("no case found for ticket {ticket_id}")))
    }

    async fn fetch_comments(
        &self,
        _session: &AccessSession,
        case: &CaseRecord,
    ) -> Result<Vec<CaseComment>, RcaError> {
        let mut comments = self
            .cases
            .get(&case.ticket_id)
            .map(|fixture| fixture.comments.clone())
            .unwrap_or_default();
        sort_chronologically(&mut comments);
        Ok(comments)
    }

    async fn fetch_recent_cases(
        &self,
        _session: &AccessSession,
        exclude_ticket_id: &str,
        limit: usize,
    ) -> Result<Vec<CaseRecord>, RcaError> {
        let mut recent = self
            .history
            .iter()
            .filter(|record| record.ticket_id != exclude_ticket_id.trim())
            .cloned()
            .collect::<Vec<_>>();
        recent.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
