//! CIP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, content addressing, and error handling for the CIP
//! (Content Ingestion Pipeline) workspace.
//!
//! # Overview
//!
//! This crate provides the leaf-level building blocks used by the publish
//! pipeline:
//!
//! - **Error Handling**: Custom error type and result alias
//! - **Addressing**: SHA-256 digests and CID-style content identifiers
//! - **Records**: The content record model and its invariants
//! - **Classification**: The inline-vs-extract blob policy
//!
//! # Example
//!
//! ```no_run
//! use cip_common::addressing::ContentDigest;
//!
//! let digest = ContentDigest::from_bytes(b"hello world");
//! println!("legacy: {}", digest.legacy());
//! println!("cid:    {}", digest.cid());
//! ```

pub mod addressing;
pub mod classify;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use addressing::ContentDigest;
pub use classify::{Disposition, ExtractionPolicy};
pub use error::{CipError, Result};
pub use types::{BlobPushResult, BlobReference, ContentRecord, ImportStatus, RecordBody};
