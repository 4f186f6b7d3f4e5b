use crate::{DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use t2m_social::twitter::Tweet;

/// Store that keeps documents in memory.
///
/// ```
/// use t2m_store::MemoryStore;
///
/// let store = MemoryStore::new().fail_on("13");
/// assert!(store.documents().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<Value>>,
    fail_all: Option<String>,
    fail_ids: HashSet<String>,
    delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_all: Some(message.into()),
            ..Self::default()
        }
    }

    /// Inserts of the tweet with this `id_str` fail.
    pub fn fail_on(mut self, id: impl Into<String>) -> Self {
        self.fail_ids.insert(id.into());
        self
    }

    /// Sleep before each insert completes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Snapshot of stored documents in insertion-completion order.
    pub fn documents(&self) -> Vec<Value> {
        self.docs.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, tweet: &Tweet) -> Result<(), StoreError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if let Some(msg) = &self.fail_all {
            return Err(StoreError::Rejected(msg.clone()));
        }
        if self.fail_ids.contains(&tweet.id_str) {
            return Err(StoreError::Rejected(format!(
                "injected failure for {}",
                tweet.id_str
            )));
        }
        let doc = serde_json::to_value(tweet).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.docs
            .lock()
            .map_err(|_| StoreError::Rejected("store lock poisoned".into()))?
            .push(doc);
        Ok(())
    }
}
