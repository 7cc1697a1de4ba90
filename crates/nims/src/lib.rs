//! NVIDIA NIM job engine.
//!
//! Submits long-running structure-prediction, design and docking jobs to
//! the NVIDIA Health API, polls them to completion with a bounded
//! transient-failure budget, stores the resulting artifacts and keeps the
//! job store up to date. [`manager::JobManager`] is the entry point.

pub mod api;
pub mod artifact;
pub mod backoff;
pub mod capability;
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod poller;
pub mod session;
pub mod sources;
