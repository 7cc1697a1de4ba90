//! HTTP session factory.
//!
//! Each polling campaign gets its own [`reqwest::Client`], built here and
//! dropped when the campaign's task ends (on every exit path, including
//! errors and cancellation). The pool is sized for one sequential caller.
//! The extra trust store is read once, when the factory is created.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::JobError;

/// Connect timeout, independent of the total request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connections kept per host. Polling is strictly sequential.
const MAX_IDLE_PER_HOST: usize = 1;

/// Builds campaign-scoped HTTP clients from [`ProviderConfig`].
pub struct SessionFactory {
    config: Arc<ProviderConfig>,
    extra_roots: Vec<reqwest::Certificate>,
}

impl SessionFactory {
    /// Load the configured CA bundle and check that a client can be built.
    ///
    /// Runs once at startup, so TLS misconfiguration surfaces there instead
    /// of on every job.
    pub fn new(config: Arc<ProviderConfig>) -> Result<Self, JobError> {
        let extra_roots = match &config.ca_bundle {
            None => Vec::new(),
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    JobError::Configuration(format!(
                        "Cannot read CA bundle {}: {e}",
                        path.display()
                    ))
                })?;
                reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                    JobError::Configuration(format!("Invalid CA bundle {}: {e}", path.display()))
                })?
            }
        };

        let factory = Self {
            config,
            extra_roots,
        };
        factory.build()?;
        Ok(factory)
    }

    /// Build a client with the configured trust store and timeouts.
    ///
    /// TLS verification is strict unless `insecure_tls` is set, which is
    /// logged at WARN every time a session is created.
    pub fn build(&self) -> Result<reqwest::Client, JobError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(self.config.request_timeout))
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .user_agent(concat!("helix-nims/", env!("CARGO_PKG_VERSION")));

        for cert in &self.extra_roots {
            builder = builder.add_root_certificate(cert.clone());
        }

        if self.config.insecure_tls {
            tracing::warn!(
                "TLS certificate verification is DISABLED for provider sessions \
                 (NIMS_INSECURE_TLS). Never enable this outside local development."
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| JobError::Configuration(format!("Failed to build HTTP client: {e}")))
    }
}
