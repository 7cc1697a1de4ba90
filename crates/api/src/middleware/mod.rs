//! Request extractors shared by handlers.
//!
//! - [`owner::Owner`] -- the calling principal, from the `x-owner-id` header.

pub mod owner;
