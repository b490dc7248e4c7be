use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

pub const KEY_ID_VAR: &str = "AWS_KMS_KEY_ID";
pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const REGION_VAR: &str = "AWS_REGION";

static KEY_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("key id pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not defined")]
    Missing(&'static str),
    #[error("AWS_KMS_KEY_ID is not a valid UUID: {0}")]
    InvalidKeyId(String),
}

/// Credentials and location of the remote KMS key.
#[derive(Clone, PartialEq, Eq)]
pub struct KmsConfig {
    pub key_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl KmsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as
    /// missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let config = Self {
            key_id: require(KEY_ID_VAR)?,
            access_key_id: require(ACCESS_KEY_ID_VAR)?,
            secret_access_key: require(SECRET_ACCESS_KEY_VAR)?,
            region: require(REGION_VAR)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            (KEY_ID_VAR, &self.key_id),
            (ACCESS_KEY_ID_VAR, &self.access_key_id),
            (SECRET_ACCESS_KEY_VAR, &self.secret_access_key),
            (REGION_VAR, &self.region),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        if !KEY_ID_PATTERN.is_match(&self.key_id) {
            return Err(ConfigError::InvalidKeyId(self.key_id.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for KmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsConfig")
            .field("key_id", &self.key_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}
