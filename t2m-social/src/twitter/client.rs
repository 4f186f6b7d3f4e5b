//! OAuth-signed client for the v1.1 public filter stream.
//!
//! The first connection is made before [`TwitterStreamClient::public_filter`]
//! returns so bad credentials fail at startup. After that a background task owns
//! the connection: it frames the body into lines, decodes each line into a
//! [`StreamItem`], and reconnects with [`Backoff`] until the subscription is
//! stopped or the API answers with a status that retrying cannot fix.
use crate::twitter::backoff::{Backoff, Failure, ReconnectPolicy};
use crate::twitter::stream::{
    StopHandle, StreamItem, Subscription, TrackFilter, decode_line, malformed,
};
use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Method, Response};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use t2m_common::log::Logger;
use t2m_http::{Auth, HttpClient, HttpError, OAuth1Credentials, RequestOpts};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;

pub const FILTER_PATH: &str = "1.1/statuses/filter.json";

/// The API sends keep-alive newlines every 30 s; three missed ones mean a dead link.
const STALL_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Clone)]
pub struct TwitterStreamClient {
    http: HttpClient,
    creds: Arc<OAuth1Credentials>,
    log: Arc<dyn Logger>,
    policy: ReconnectPolicy,
    stall_timeout: Duration,
}

enum Ended {
    Stopped,
    Dropped(String),
}

impl TwitterStreamClient {
    pub fn new(base_url: &str, creds: OAuth1Credentials, log: Arc<dyn Logger>) -> Result<Self> {
        let http = HttpClient::new(base_url).context("stream base url")?;
        Ok(Self {
            http,
            creds: Arc::new(creds),
            log,
            policy: ReconnectPolicy::default(),
            stall_timeout: STALL_TIMEOUT,
        })
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stall_timeout(mut self, stall: Duration) -> Self {
        self.stall_timeout = stall;
        self
    }

    /// Open the filtered public stream for `filter`.
    ///
    /// Returns once the first connection is established. Items arrive on the
    /// returned [`Subscription`] in the order the API sent them.
    pub async fn public_filter(&self, filter: &TrackFilter) -> Result<Subscription> {
        let track = filter.as_param();
        tracing::info!(track = %track, "stream.connect.start");

        let resp = self
            .connect(&track, None)
            .await
            .with_context(|| format!("opening filter stream for track={track}"))?;
        self.log
            .notice(format_args!("Connected to the filter stream (track={track})"));

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = StopHandle::new();
        tokio::spawn(self.clone().pump(resp, track, tx, stop.clone()));
        Ok(Subscription::with_stop_handle(rx, stop))
    }

    async fn connect(&self, track: &str, retries: Option<usize>) -> Result<Response, HttpError> {
        self.http
            .open_stream(
                Method::POST,
                FILTER_PATH,
                RequestOpts {
                    retries,
                    auth: Some(Auth::OAuth1(&self.creds)),
                    form: Some(vec![("track", Cow::Borrowed(track))]),
                    ..Default::default()
                },
            )
            .await
    }

    async fn pump(
        self,
        mut resp: Response,
        track: String,
        tx: mpsc::UnboundedSender<StreamItem>,
        stop: StopHandle,
    ) {
        let mut backoff = Backoff::new(self.policy);
        loop {
            let mut failure = match self.drain(resp, &tx, &stop, &mut backoff).await {
                Ended::Stopped => {
                    tracing::debug!("stream.stopped");
                    return;
                }
                Ended::Dropped(reason) => {
                    self.log
                        .warning(format_args!("Filter stream dropped: {reason}"));
                    Failure::Network
                }
            };

            resp = loop {
                let delay = backoff.next(failure);
                tracing::info!(
                    failure = ?failure,
                    delay_ms = delay.as_millis() as u64,
                    "stream.reconnect.wait"
                );
                tokio::select! {
                    biased;
                    _ = stop.stopped() => return,
                    _ = sleep(delay) => {}
                }

                let attempt = tokio::select! {
                    biased;
                    _ = stop.stopped() => return,
                    r = self.connect(&track, Some(0)) => r,
                };
                match attempt {
                    Ok(r) => break r,
                    Err(err) => match classify(&err) {
                        Some(f) => {
                            self.log
                                .warning(format_args!("Reconnect failed, will retry: {err}"));
                            failure = f;
                        }
                        None => {
                            self.log.critical(format_args!(
                                "Filter stream rejected the connection, giving up: {err}"
                            ));
                            return;
                        }
                    },
                }
            };
            self.log.notice(format_args!("Reconnected to the filter stream"));
        }
    }

    async fn drain(
        &self,
        resp: Response,
        tx: &mpsc::UnboundedSender<StreamItem>,
        stop: &StopHandle,
        backoff: &mut Backoff,
    ) -> Ended {
        let body = resp.bytes_stream().map_err(std::io::Error::other);
        let mut lines = FramedRead::new(
            StreamReader::new(body),
            AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_LINE_BYTES),
        );
        // FramedRead yields one `None` after a codec error, then resumes reading.
        let mut resuming = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = stop.stopped() => return Ended::Stopped,
                next = timeout(self.stall_timeout, lines.next()) => next,
            };
            let item = match next {
                Err(_) => {
                    return Ended::Dropped(format!(
                        "no data for {}s",
                        self.stall_timeout.as_secs_f32()
                    ));
                }
                Ok(None) if std::mem::take(&mut resuming) => continue,
                Ok(None) => return Ended::Dropped("server closed the connection".into()),
                Ok(Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded))) => {
                    tracing::warn!(max_bytes = MAX_LINE_BYTES, "stream.line.too_long");
                    resuming = true;
                    malformed(Value::Null)
                }
                Ok(Some(Err(e))) => return Ended::Dropped(e.to_string()),
                Ok(Some(Ok(line))) => {
                    let line = line.trim_ascii();
                    if line.is_empty() {
                        continue;
                    }
                    decode_line(line)
                }
            };
            backoff.reset();

            tracing::trace!(kind = item.kind(), "stream.item");
            if tx.send(item).is_err() {
                // Receiver dropped: nobody is listening any more.
                return Ended::Stopped;
            }
        }
    }
}

/// Map a failed reconnect onto a backoff schedule; `None` means give up.
fn classify(err: &HttpError) -> Option<Failure> {
    match err {
        HttpError::Network(_) => Some(Failure::Network),
        HttpError::Url(_) | HttpError::Build(_) => None,
        HttpError::Api { status, .. } => match status.as_u16() {
            401 | 403 | 404 | 406 | 413 | 416 => None,
            420 | 429 => Some(Failure::RateLimited),
            _ => Some(Failure::Http),
        },
    }
}
