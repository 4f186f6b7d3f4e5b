//! Persistence for received tweets.
//!
//! The pipeline only needs one operation, inserting a whole tweet as a single
//! document, so the seam is the object-safe [`DocumentStore`] trait shared as
//! `Arc<dyn DocumentStore>`:
//!
//! - [`mongo::MongoStore`]: production store over the official MongoDB driver
//! - [`memory::MemoryStore`]: in-process store with failure injection for tests
use async_trait::async_trait;
use t2m_social::twitter::Tweet;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::{MongoSettings, MongoStore};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("could not encode tweet as a document: {0}")]
    Encode(String),

    #[error("mongodb: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("insert rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `tweet` unmodified as one document. No retry.
    async fn insert(&self, tweet: &Tweet) -> Result<(), StoreError>;
}
