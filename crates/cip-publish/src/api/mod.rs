//! HTTP API layer for the metadata destination and blob store

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::{ApiClient, QueueOutcome};
pub use types::{HealthResponse, StatusResponse};
