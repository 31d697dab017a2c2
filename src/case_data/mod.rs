use async_trait::async_trait;

use crate::{credentials::Credentials, error::RcaError};

pub mod fixture;
pub mod salesforce;
pub mod types;

pub use fixture::FixtureCaseSource;
pub use salesforce::SalesforceCaseSource;
pub use types::{AccessSession, CaseComment, CaseRecord};

/// Read access to CRM case data. A live and a fixture implementation exist;
/// the pipeline picks one at construction time and never branches on mode afterwards.
#[async_trait]
pub trait CaseDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Exchanges the refresh credential for a fresh session.
    async fn authenticate(&self, credentials: &Credentials) -> Result<AccessSession, RcaError>;

    /// Fails with `NotFound` when the ticket id matches no case and with `Auth`
    /// when the session is rejected.
    async fn fetch_case(
        &self,
        session: &AccessSession,
        ticket_id: &str,
    ) -> Result<CaseRecord, RcaError>;

    /// Chronological, possibly empty.
    async fn fetch_comments(
        &self,
        session: &AccessSession,
        case: &CaseRecord,
    ) -> Result<Vec<CaseComment>, RcaError>;

    /// Up to `limit` already-worked cases, newest first, never including
    /// `exclude_ticket_id`. Feeds the similar-case lookup.
    async fn fetch_recent_cases(
        &self,
        session: &AccessSession,
        exclude_ticket_id: &str,
        limit: usize,
    ) -> Result<Vec<CaseRecord>, RcaError>;
}
