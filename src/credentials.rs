use std::{
    collections::BTreeMap,
    env, fmt,
    sync::{Arc, OnceLock},
};

use validator::Validate;

use crate::error::{RcaError, configuration_error};

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const SF_CLIENT_ID: &str = "SF_CLIENT_ID";
pub const SF_CLIENT_SECRET: &str = "SF_CLIENT_SECRET";
pub const SF_REFRESH_TOKEN: &str = "SF_REFRESH_TOKEN";
pub const SF_INSTANCE_URL: &str = "SF_INSTANCE_URL";
pub const MOCK_MODE: &str = "DEBUG_GENIE_MOCK_MODE";

const REQUIRED_KEYS: [&str; 5] = [
    OPENAI_API_KEY,
    SF_CLIENT_ID,
    SF_CLIENT_SECRET,
    SF_REFRESH_TOKEN,
    SF_INSTANCE_URL,
];

/// Where secrets come from. Only the store reads it, and only once.
pub trait CredentialSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Default)]
pub struct EnvCredentialSource;

impl CredentialSource for EnvCredentialSource {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    vars: BTreeMap<String, String>,
}

impl StaticCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mock() -> Self {
        Self::new().with(MOCK_MODE, "true")
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl CredentialSource for StaticCredentialSource {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

#[derive(Clone, Validate)]
pub struct Credentials {
    pub openai_api_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[validate(url)]
    pub instance_url: String,
    pub mock_mode: bool,
}

impl Credentials {
    pub fn from_source(source: &dyn CredentialSource) -> Result<Self, RcaError> {
        let mock_mode = source
            .var(MOCK_MODE)
            .is_some_and(|raw| env_flag_enabled(&raw));
        let read = |key: &str| {
            source
                .var(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if !mock_mode {
            let missing = REQUIRED_KEYS
                .iter()
                .copied()
                .filter(|key| read(*key).is_none())
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                return Err(configuration_error(format!(
                    "missing required environment variables: {}. set {}=true to run with fixture data",
                    missing.join(", "),
                    MOCK_MODE
                )));
            }
        }

        let credentials = Self {
            openai_api_key: read(OPENAI_API_KEY).unwrap_or_default(),
            client_id: read(SF_CLIENT_ID).unwrap_or_default(),
            client_secret: read(SF_CLIENT_SECRET).unwrap_or_default(),
            refresh_token: read(SF_REFRESH_TOKEN).unwrap_or_default(),
            instance_url: read(SF_INSTANCE_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            mock_mode,
        };

        if !mock_mode {
            credentials.validate().map_err(|err| {
                configuration_error(format!("{} is not a valid url: {}", SF_INSTANCE_URL, err))
            })?;
        }

        Ok(credentials)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &redacted(&self.openai_api_key))
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("refresh_token", &redacted(&self.refresh_token))
            .field("instance_url", &self.instance_url)
            .field("mock_mode", &self.mock_mode)
            .finish()
    }
}

/// Resolves [`Credentials`] at most once; later loads hand out the cached value.
pub struct CredentialStore {
    source: Box<dyn CredentialSource>,
    cached: OnceLock<Arc<Credentials>>,
}

impl CredentialStore {
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: OnceLock::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EnvCredentialSource)
    }

    pub fn load(&self) -> Result<Arc<Credentials>, RcaError> {
        if let Some(credentials) = self.cached.get() {
            return Ok(Arc::clone(credentials));
        }

        let loaded = Arc::new(Credentials::from_source(self.source.as_ref())?);
        tracing::info!(
            target: "credentials",
            mock_mode = loaded.mock_mode,
            instance_url = %loaded.instance_url,
            "credentials_loaded"
        );
        Ok(Arc::clone(self.cached.get_or_init(|| loaded)))
    }
}

pub(crate) fn env_flag_enabled(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub(crate) fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}
