use anyhow::{Context, Result};
use std::sync::Arc;
use t2m_common::log::{Logger, TracingLogger};
use t2m_config::Settings;
use t2m_http::OAuth1Credentials;
use t2m_pipeline::{Dispatcher, NoopUrlProcessor, PipelineOptions};
use t2m_social::twitter::{Subscription, TrackFilter, TwitterStreamClient};
use t2m_store::{MongoSettings, MongoStore};

/// Everything connected and ready to consume.
pub struct App {
    sub: Subscription,
    dispatcher: Dispatcher,
}

impl App {
    /// Connects the store, then the stream.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let log: Arc<dyn Logger> = Arc::new(TracingLogger::new());

        let store = MongoStore::connect(&mongo_settings(settings))
            .await
            .context("connecting to mongodb")?;

        let filter = TrackFilter::new(&settings.track)?;
        let client =
            TwitterStreamClient::new(&settings.stream_base_url, credentials(settings), log.clone())?;
        let sub = client.public_filter(&filter).await?;
        log.notice(format_args!(
            "Streaming tweets matching {} keyword(s)",
            filter.keywords().len()
        ));

        let dispatcher = Dispatcher::new(
            log,
            Arc::new(store),
            Arc::new(NoopUrlProcessor),
            pipeline_options(settings),
        );
        Ok(Self { sub, dispatcher })
    }

    /// Dispatch until the stream ends, a tweet fails fatally, or Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let stop = self.sub.stop_handle();
        let run = self.dispatcher.run(self.sub);
        tokio::pin!(run);

        tokio::select! {
            res = &mut run => match res {
                Ok(stats) => {
                    tracing::info!(
                        received = stats.received,
                        dispatched = stats.dispatched,
                        skipped = stats.skipped,
                        "stream.ended"
                    );
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(error = %err, "pipeline.fatal");
                    Err(err.into())
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown.ctrl_c");
                stop.stop();
                Ok(())
            }
        }
    }
}

fn credentials(s: &Settings) -> OAuth1Credentials {
    OAuth1Credentials {
        consumer_key: s.consumer_key.clone(),
        consumer_secret: s.consumer_secret.clone(),
        token: s.access_token.clone(),
        token_secret: s.access_token_secret.clone(),
    }
}

fn mongo_settings(s: &Settings) -> MongoSettings {
    MongoSettings {
        url: s.mongodb_url.clone(),
        database: s.mongodb_db.clone(),
        collection: s.mongodb_collection.clone(),
        connect_timeout: s.mongodb_connect_timeout(),
        tls: s.mongodb_tls,
        tls_insecure: s.mongodb_tls_insecure,
    }
}

fn pipeline_options(s: &Settings) -> PipelineOptions {
    PipelineOptions {
        max_in_flight: s.max_in_flight,
        persist_failure: s.persist_failure,
    }
}
