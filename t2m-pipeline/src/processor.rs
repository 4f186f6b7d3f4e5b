use crate::url::UrlProcessor;
use std::sync::Arc;
use t2m_common::log::Logger;
use t2m_common::{PersistFailurePolicy, T2mError};
use t2m_social::twitter::Tweet;
use t2m_social::twitter::extract::extract_distinct_urls;
use t2m_store::DocumentStore;

/// What happened to one tweet.
#[derive(Debug)]
pub enum Outcome {
    /// Persisted; this many URL tasks were spawned.
    Stored { url_tasks: usize },
    /// Insert failed and the event was dropped.
    Skipped,
    /// Insert failed and the pipeline must stop.
    Fatal(T2mError),
}

/// Handles one tweet: extract URLs, insert the document, fan out URL tasks.
pub struct TweetProcessor {
    log: Arc<dyn Logger>,
    store: Arc<dyn DocumentStore>,
    urls: Arc<dyn UrlProcessor>,
    on_failure: PersistFailurePolicy,
}

impl TweetProcessor {
    pub fn new(
        log: Arc<dyn Logger>,
        store: Arc<dyn DocumentStore>,
        urls: Arc<dyn UrlProcessor>,
        on_failure: PersistFailurePolicy,
    ) -> Self {
        Self {
            log,
            store,
            urls,
            on_failure,
        }
    }

    pub async fn process(&self, tweet: Tweet) -> Outcome {
        self.log.info(format_args!(
            "Processing tweet #{} from {}",
            tweet.id_str, tweet.user.name
        ));

        let urls = extract_distinct_urls(tweet.body());

        if let Err(err) = self.store.insert(&tweet).await {
            self.log.critical(format_args!(
                "Failed to save tweet #{}: {}",
                tweet.id_str, err
            ));
            return match self.on_failure {
                PersistFailurePolicy::Abort => Outcome::Fatal(T2mError::Persist {
                    id: tweet.id_str,
                    message: err.to_string(),
                }),
                PersistFailurePolicy::Skip => Outcome::Skipped,
            };
        }
        tracing::debug!(id = %tweet.id_str, urls = urls.len(), "tweet.stored");

        let url_tasks = urls.len();
        if url_tasks > 0 {
            let tweet = Arc::new(tweet);
            for url in urls {
                let log = self.log.clone();
                let processor = self.urls.clone();
                let tweet = tweet.clone();
                tokio::spawn(async move {
                    if let Err(err) = processor.process(log.as_ref(), &tweet, url.clone()).await {
                        log.error(format_args!(
                            "Failed to process URL {} from tweet #{}: {:#}",
                            url, tweet.id_str, err
                        ));
                    }
                });
            }
        }
        Outcome::Stored { url_tasks }
    }
}
