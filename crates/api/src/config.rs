use std::fmt;
use std::str::FromStr;

use helix_core::error::CoreError;

/// Which [`helix_db::JobStore`] implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local map. Jobs do not survive a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        })
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except
/// `DATABASE_URL`, which is required for the Postgres store.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub job_store: StoreBackend,
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `JOB_STORE`            | `postgres`                 |
    /// | `DATABASE_URL`         | (required for `postgres`)  |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port: u16 = match var("PORT") {
            None => 3000,
            Some(raw) => raw.parse().map_err(|_| invalid("PORT", "a port number", &raw))?,
        };

        let request_timeout_secs: u64 = match var("REQUEST_TIMEOUT_SECS") {
            None => 30,
            Some(raw) => raw
                .parse()
                .map_err(|_| invalid("REQUEST_TIMEOUT_SECS", "a whole number of seconds", &raw))?,
        };

        let job_store = match var("JOB_STORE") {
            None => StoreBackend::Postgres,
            Some(raw) => raw
                .parse()
                .map_err(|_| invalid("JOB_STORE", "'postgres' or 'memory'", &raw))?,
        };

        let database_url = var("DATABASE_URL");
        if job_store == StoreBackend::Postgres && database_url.is_none() {
            return Err(CoreError::Configuration(
                "DATABASE_URL must be set when JOB_STORE=postgres".into(),
            ));
        }

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cors_origins,
            request_timeout_secs,
            job_store,
            database_url,
        })
    }
}

fn invalid(var: &str, expected: &str, value: &str) -> CoreError {
    CoreError::Configuration(format!("{var} must be {expected}, got '{value}'"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, CoreError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn memory_store_needs_no_database() {
        let config = config_from(&[("JOB_STORE", "memory")]).unwrap();
        assert_eq!(config.job_store, StoreBackend::Memory);
        assert_eq!(config.port, 3000);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
    }

    #[test]
    fn postgres_store_requires_database_url() {
        assert_matches!(config_from(&[]), Err(CoreError::Configuration(msg)) if msg.contains("DATABASE_URL"));

        let config = config_from(&[("DATABASE_URL", "postgres://localhost/helix")]).unwrap();
        assert_eq!(config.job_store, StoreBackend::Postgres);
    }

    #[test]
    fn malformed_values_are_configuration_errors() {
        assert_matches!(
            config_from(&[("JOB_STORE", "memory"), ("PORT", "eighty")]),
            Err(CoreError::Configuration(msg)) if msg.contains("PORT")
        );
        assert_matches!(
            config_from(&[("JOB_STORE", "sqlite")]),
            Err(CoreError::Configuration(msg)) if msg.contains("JOB_STORE")
        );
    }

    #[test]
    fn cors_origins_are_split_on_commas() {
        let config = config_from(&[
            ("JOB_STORE", "memory"),
            ("CORS_ORIGINS", "https://a.example, ,https://b.example"),
        ])
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }
}
