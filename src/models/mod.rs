//! Core data models for the upload gateway.
//!
//! These types describe what flows between the HTTP layer and the object
//! store: streamed bodies, listing pages, bucket usage and request counters.

pub mod bucket;
pub mod metrics;
pub mod object;
