use crate::{env_required, ConfigError, FromEnv};

/// Redis connection configuration
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl FromEnv for RedisConfig {
    /// Reads `REDIS_URL`, falling back to `REDIS_HOST`. One of them must be set.
    fn from_env() -> Result<Self, ConfigError> {
        let url = env_required("REDIS_URL")
            .or_else(|_| env_required("REDIS_HOST"))
            .map_err(|_| ConfigError::MissingEnvVar("REDIS_URL or REDIS_HOST".to_string()))?;

        Ok(Self { url })
    }
}
