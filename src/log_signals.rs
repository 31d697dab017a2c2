use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

use regex::Regex;

static EXCEPTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z][A-Za-z0-9_.$]*(?:Exception|Error)):")
        .expect("exception pattern must compile")
});
static SERVICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bservice=["']?([A-Za-z0-9_-]+)"#).expect("service pattern must compile")
});
static ENV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\benv=["']?([A-Za-z0-9_-]+)"#).expect("env pattern must compile")
});
static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)")
        .expect("timestamp pattern must compile")
});

/// Log-like evidence pasted into case text. Extraction is deterministic so the
/// prompt built from it stays byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSignals {
    /// Most frequent first; equal counts ordered by name.
    pub exceptions: Vec<(String, usize)>,
    pub services: BTreeSet<String>,
    pub environments: BTreeSet<String>,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

impl LogSignals {
    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
            && self.services.is_empty()
            && self.environments.is_empty()
            && self.first_seen.is_none()
    }
}

pub fn extract_log_signals<'a>(texts: impl IntoIterator<Item = &'a str>) -> LogSignals {
    let mut exception_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut services = BTreeSet::new();
    let mut environments = BTreeSet::new();
    let mut timestamps: BTreeSet<String> = BTreeSet::new();

    for text in texts {
        for captures in EXCEPTION_PATTERN.captures_iter(text) {
            *exception_counts.entry(captures[1].to_string()).or_default() += 1;
        }
        for captures in SERVICE_PATTERN.captures_iter(text) {
            services.insert(captures[1].to_string());
        }
        for captures in ENV_PATTERN.captures_iter(text) {
            environments.insert(captures[1].to_string());
        }
        for captures in TIMESTAMP_PATTERN.captures_iter(text) {
            timestamps.insert(captures[1].to_string());
        }
    }

    let mut exceptions = exception_counts.into_iter().collect::<Vec<_>>();
    // BTreeMap iteration is name-ordered and the sort is stable.
    exceptions.sort_by(|a, b| b.1.cmp(&a.1));

    LogSignals {
        exceptions,
        services,
        environments,
        // ISO-8601 strings of one shape order lexicographically.
        first_seen: timestamps.first().cloned(),
        last_seen: timestamps.last().cloned(),
    }
}
