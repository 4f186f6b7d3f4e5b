use crate::processor::{Outcome, TweetProcessor};
use crate::url::UrlProcessor;
use anyhow::anyhow;
use std::sync::Arc;
use t2m_common::log::Logger;
use t2m_common::{PersistFailurePolicy, T2mError};
use t2m_social::twitter::{StreamItem, Subscription};
use t2m_store::DocumentStore;
use tokio::sync::{Semaphore, mpsc};

/// Immutable pipeline knobs, fixed at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Upper bound on concurrently running tweet tasks. `None` is unbounded.
    pub max_in_flight: Option<usize>,
    pub persist_failure: PersistFailurePolicy,
}

/// Counters reported when the dispatch loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub dispatched: u64,
    pub skipped: u64,
}

/// Main consumption loop: one detached task per tweet, in receipt order.
pub struct Dispatcher {
    log: Arc<dyn Logger>,
    processor: Arc<TweetProcessor>,
    limit: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new(
        log: Arc<dyn Logger>,
        store: Arc<dyn DocumentStore>,
        urls: Arc<dyn UrlProcessor>,
        opts: PipelineOptions,
    ) -> Self {
        let processor = TweetProcessor::new(log.clone(), store, urls, opts.persist_failure);
        Self {
            log,
            processor: Arc::new(processor),
            limit: opts.max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Consume `sub` until its channel closes or a tweet fails fatally.
    ///
    /// The subscription is stopped on the way out. Tasks still running are
    /// neither awaited nor cancelled.
    pub async fn run(self, mut sub: Subscription) -> Result<DispatchStats, T2mError> {
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<T2mError>();
        let mut stats = DispatchStats::default();

        let ended: Result<(), T2mError> = loop {
            let item = tokio::select! {
                biased;
                Some(err) = fatal_rx.recv() => break Err(err),
                item = sub.recv() => item,
            };
            let Some(item) = item else {
                break Ok(());
            };
            stats.received += 1;

            let tweet = match item {
                StreamItem::Tweet(tweet) => tweet,
                StreamItem::Unrecognized { kind, .. } => {
                    self.log
                        .error(format_args!("Received unexpected value of kind {kind}"));
                    stats.skipped += 1;
                    continue;
                }
            };

            let permit = match &self.limit {
                None => None,
                Some(sem) => {
                    let acquired = tokio::select! {
                        biased;
                        Some(err) = fatal_rx.recv() => break Err(err),
                        p = sem.clone().acquire_owned() => p,
                    };
                    match acquired {
                        Ok(p) => Some(p),
                        Err(e) => break Err(T2mError::Driver(anyhow!("task limit closed: {e}"))),
                    }
                }
            };

            stats.dispatched += 1;
            let processor = self.processor.clone();
            let fatal = fatal_tx.clone();
            tokio::spawn(async move {
                if let Outcome::Fatal(err) = processor.process(*tweet).await {
                    // Receiver gone means the loop already ended.
                    let _ = fatal.send(err);
                }
                drop(permit);
            });
        };

        sub.stop();
        let ended = match ended {
            // A failure reported just before the channel closed still counts.
            Ok(()) => match fatal_rx.try_recv() {
                Ok(err) => Err(err),
                Err(_) => Ok(()),
            },
            err => err,
        };

        tracing::info!(
            received = stats.received,
            dispatched = stats.dispatched,
            skipped = stats.skipped,
            ok = ended.is_ok(),
            "dispatch.finished"
        );
        ended.map(|()| stats)
    }
}
