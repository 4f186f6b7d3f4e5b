use anyhow::Result;
use async_trait::async_trait;
use t2m_common::log::Logger;
use t2m_social::twitter::Tweet;

/// Per-URL follow-up work, run as a detached task after a tweet is stored.
///
/// Errors are logged by the caller and never affect other URLs or tweets.
#[async_trait]
pub trait UrlProcessor: Send + Sync {
    async fn process(&self, log: &dyn Logger, tweet: &Tweet, url: String) -> Result<()>;
}

/// Accepts every URL and does nothing with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUrlProcessor;

#[async_trait]
impl UrlProcessor for NoopUrlProcessor {
    async fn process(&self, _log: &dyn Logger, _tweet: &Tweet, _url: String) -> Result<()> {
        Ok(())
    }
}
