use std::fmt;

use time::{
    OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

use crate::credentials::redacted;

/// Short-lived bearer session for CRM data calls. Owned by a single RCA run.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessSession {
    pub access_token: String,
    pub instance_url: String,
    pub expires_at: Option<OffsetDateTime>,
}

impl AccessSession {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl fmt::Debug for AccessSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSession")
            .field("access_token", &redacted(&self.access_token))
            .field("instance_url", &self.instance_url)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    /// CRM-internal record id, used to look up related comments.
    pub id: String,
    pub ticket_id: String,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseComment {
    pub author: String,
    pub body: String,
    pub created_at: OffsetDateTime,
}

/// Ascending by creation time. The sort is stable, so ties keep retrieval order.
pub fn sort_chronologically(comments: &mut [CaseComment]) {
    comments.sort_by_key(|comment| comment.created_at);
}

/// Accepts RFC 3339 as well as the `+0000` offset form the Salesforce REST API emits.
pub fn parse_crm_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }

    let salesforce = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
    );
    OffsetDateTime::parse(raw, salesforce).ok()
}

pub fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}
