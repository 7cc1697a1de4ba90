//! Caller identity extractor.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! principal in `x-owner-id`. Every job route is scoped to that principal.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use helix_core::types::OwnerId;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the authenticated principal.
pub const OWNER_HEADER: &str = "x-owner-id";

const MAX_OWNER_LEN: usize = 128;

/// The principal a request acts for.
///
/// ```ignore
/// async fn my_handler(owner: Owner) -> AppResult<Json<()>> {
///     tracing::info!(owner_id = %owner.0, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Owner(pub OwnerId);

impl FromRequestParts<AppState> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {OWNER_HEADER} header")))?;

        let owner = raw
            .to_str()
            .map(str::trim)
            .map_err(|_| AppError::BadRequest(format!("{OWNER_HEADER} must be visible ASCII")))?;

        if owner.is_empty() {
            return Err(AppError::Unauthorized(format!("Empty {OWNER_HEADER} header")));
        }
        if owner.len() > MAX_OWNER_LEN {
            return Err(AppError::BadRequest(format!(
                "{OWNER_HEADER} must be at most {MAX_OWNER_LEN} characters"
            )));
        }

        Ok(Owner(owner.to_string()))
    }
}
