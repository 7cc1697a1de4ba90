//! Shared domain types for the helix job engine.
//!
//! Holds the identifiers, capability kinds, error type and field-level
//! validation report used by the store, the provider engine and the API.

pub mod error;
pub mod job_events;
pub mod job_kind;
pub mod types;
pub mod validation;
