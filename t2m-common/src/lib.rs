//! Common types and utilities shared across the twitter2mongo crates.
//!
//! This crate defines the shared error type, the observability bootstrap, and the
//! narrow [`log::Logger`] capability handed to the stream client and the pipeline.
//! It stays dependency-light so every other crate can depend on it.
//!
//! # Overview
//!
//! - [`observability`]: centralised `tracing` initialisation
//! - [`log`]: the `Logger` trait and its `tracing` adapter
//! - [`T2mError`]: errors that end the pipeline
//! - [`PersistFailurePolicy`]: what a failed insert does to the process
//!
//! # Examples
//!
//! ```rust
//! use t2m_common::{PersistFailurePolicy, T2mError};
//!
//! assert_eq!(PersistFailurePolicy::default(), PersistFailurePolicy::Abort);
//!
//! let err = T2mError::Persist {
//!     id: "42".into(),
//!     message: "connection reset".into(),
//! };
//! assert_eq!(err.to_string(), "Failed to save tweet #42: connection reset");
//! ```
use serde::Deserialize;

pub mod log;
pub mod observability;

/// Reaction to a failed document insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistFailurePolicy {
    /// Stop the whole pipeline; the binary exits non-zero.
    #[default]
    Abort,
    /// Log the failure and drop the event.
    Skip,
}

/// Errors that end the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum T2mError {
    /// A single tweet could not be persisted.
    #[error("Failed to save tweet #{id}: {message}")]
    Persist { id: String, message: String },

    /// Anything else bubbling up from a driver.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),
}
