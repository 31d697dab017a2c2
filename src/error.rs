use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RcaErrorKind {
    Configuration,
    Auth,
    NotFound,
    Transient,
    Llm,
    Parse,
    Schema,
}

impl RcaErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Transient => "transient",
            Self::Llm => "llm",
            Self::Parse => "parse",
            Self::Schema => "schema",
        }
    }
}

impl fmt::Display for RcaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of the RCA pipeline. The kind is what callers branch on;
/// the message is safe to show to a user.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct RcaError {
    pub kind: RcaErrorKind,
    pub message: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
}

impl RcaError {
    pub fn new(kind: RcaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(kind, RcaErrorKind::Transient),
            http_status: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn is(&self, kind: RcaErrorKind) -> bool {
        self.kind == kind
    }
}

pub fn configuration_error(message: impl Into<String>) -> RcaError {
    RcaError::new(RcaErrorKind::Configuration, message)
}

pub fn auth_error(message: impl Into<String>) -> RcaError {
    RcaError::new(RcaErrorKind::Auth, message)
}

pub fn not_found(message: impl Into<String>) -> RcaError {
    RcaError::new(RcaErrorKind::NotFound, message)
}

pub fn transient_error(message: impl Into<String>) -> RcaError {
    RcaError::new(RcaErrorKind::Transient, message)
}

pub fn llm_error(message: impl Into<String>) -> RcaError {
    RcaError::new(RcaErrorKind::Llm, message)
}

pub fn parse_error(message: impl Into<String>) -> RcaError {
    RcaError::new(RcaErrorKind::Parse, message)
}

pub fn schema_error(message: impl Into<String>) -> RcaError {
    RcaError::new(RcaErrorKind::Schema, message)
}

/// Response bodies end up in user-facing messages, so only a prefix is kept.
pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(240).collect()
}
