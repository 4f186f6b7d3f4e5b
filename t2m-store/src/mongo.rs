use crate::{DocumentStore, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::{Client, Collection};
use std::fmt;
use std::time::Duration;
use t2m_social::twitter::Tweet;

/// Connection parameters for [`MongoStore::connect`].
#[derive(Clone)]
pub struct MongoSettings {
    pub url: String,
    pub database: String,
    pub collection: String,
    /// Applied to both the TCP dial and server selection.
    pub connect_timeout: Duration,
    pub tls: bool,
    /// Accept invalid server certificates. Off unless explicitly enabled.
    pub tls_insecure: bool,
}

impl fmt::Debug for MongoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The URL usually embeds credentials.
        f.debug_struct("MongoSettings")
            .field("url", &"<redacted>")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("connect_timeout", &self.connect_timeout)
            .field("tls", &self.tls)
            .field("tls_insecure", &self.tls_insecure)
            .finish()
    }
}

pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Parse the URL, apply timeouts and TLS, and ping the database.
    ///
    /// Fails if the URL is malformed or no server answers within the timeout.
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        let options = client_options(settings).await?;
        let client = Client::with_options(options).context("building mongodb client")?;
        let db = client.database(&settings.database);

        db.run_command(doc! { "ping": 1 })
            .await
            .with_context(|| format!("pinging mongodb database {}", settings.database))?;
        tracing::info!(
            db = %settings.database,
            collection = %settings.collection,
            tls = settings.tls,
            "store.mongo.connected"
        );

        Ok(Self {
            collection: db.collection(&settings.collection),
        })
    }
}

async fn client_options(settings: &MongoSettings) -> Result<ClientOptions> {
    let mut options = ClientOptions::parse(&settings.url)
        .await
        .context("parsing mongodb url")?;
    options.app_name = Some("twitter2mongo".into());
    options.connect_timeout = Some(settings.connect_timeout);
    options.server_selection_timeout = Some(settings.connect_timeout);
    options.tls = Some(if settings.tls {
        Tls::Enabled(
            TlsOptions::builder()
                .allow_invalid_certificates(settings.tls_insecure)
                .build(),
        )
    } else {
        Tls::Disabled
    });
    if settings.tls && settings.tls_insecure {
        tracing::warn!("store.mongo.tls_verification_disabled");
    }
    Ok(options)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert(&self, tweet: &Tweet) -> Result<(), StoreError> {
        let doc =
            mongodb::bson::to_document(tweet).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.collection.insert_one(doc).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> MongoSettings {
        MongoSettings {
            url: url.into(),
            database: "t2m".into(),
            collection: "tweets".into(),
            connect_timeout: Duration::from_secs(2),
            tls: true,
            tls_insecure: false,
        }
    }

    #[tokio::test]
    async fn options_carry_timeouts_and_verified_tls() {
        let opts = client_options(&settings("mongodb://localhost:27017"))
            .await
            .unwrap();
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(2)));
        assert_eq!(opts.server_selection_timeout, Some(Duration::from_secs(2)));
        match opts.tls {
            Some(Tls::Enabled(tls)) => assert_eq!(tls.allow_invalid_certificates, Some(false)),
            other => panic!("expected tls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plaintext_when_tls_is_turned_off() {
        let mut s = settings("mongodb://localhost:27017/?tls=true");
        s.tls = false;
        let opts = client_options(&s).await.unwrap();
        assert!(matches!(opts.tls, Some(Tls::Disabled)));
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        assert!(client_options(&settings("not a url")).await.is_err());
    }

    #[test]
    fn debug_hides_the_url() {
        let out = format!("{:?}", settings("mongodb://user:hunter2@db"));
        assert!(!out.contains("hunter2"));
    }
}
