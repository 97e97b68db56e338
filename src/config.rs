//! Engine configuration
use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

pub const TIMEOUT_ENV: &str = "NEGOTIATION_GATEWAY_TIMEOUT_MS";
pub const DB_PATH_ENV: &str = "NEGOTIATION_DB_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single gateway round trip.
    pub gateway_timeout: Duration,
    /// Where a sled backed gateway keeps its data.
    pub db_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            db_path: PathBuf::from("negotiations.db"),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NEGOTIATION_GATEWAY_TIMEOUT_MS` and `NEGOTIATION_DB_PATH`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let millis: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{TIMEOUT_ENV} must be a whole number of milliseconds, got {raw:?}"))?;
            anyhow::ensure!(millis > 0, "{TIMEOUT_ENV} must be greater than zero");
            config.gateway_timeout = Duration::from_millis(millis);
        }
        if let Some(path) = lookup(DB_PATH_ENV) {
            config.db_path = PathBuf::from(path);
        }

        Ok(config)
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_overrides_defaults() {
        let config = EngineConfig::from_lookup(|key| match key {
            TIMEOUT_ENV => Some("250".into()),
            DB_PATH_ENV => Some("/tmp/neg.db".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.gateway_timeout, Duration::from_millis(250));
        assert_eq!(config.db_path, PathBuf::from("/tmp/neg.db"));
    }

    #[test]
    fn missing_values_keep_defaults() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn bad_timeout_is_an_error() {
        assert!(EngineConfig::from_lookup(|_| Some("soon".into())).is_err());
        assert!(EngineConfig::from_lookup(|k| (k == TIMEOUT_ENV).then(|| "0".into())).is_err());
    }
}
