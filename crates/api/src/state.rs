use std::sync::Arc;

use helix_nims::manager::JobManager;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Job handler for every capability.
    pub manager: Arc<JobManager>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Database pool, absent when running on the in-memory job store.
    pub pool: Option<helix_db::DbPool>,
}
