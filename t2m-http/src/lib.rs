//! HTTP plumbing for long-lived streaming endpoints.
//!
//! - [`HttpClient::open_stream`] returns the live [`reqwest::Response`] on 2xx
//!   and leaves the body for the caller to read incrementally
//! - OAuth 1.0a user-context signing (see [`oauth`]), re-signed on every attempt
//! - Send failures, 429 and 5xx are retried within a per-request budget (see [`retry`])
//!
//! Example (no_run):
//! ```rust,no_run
//! # async fn demo() -> Result<(), t2m_http::HttpError> {
//! use t2m_http::{HttpClient, RequestOpts};
//! use reqwest::Method;
//!
//! let client = HttpClient::new("https://stream.example.com/")?;
//! let resp = client
//!     .open_stream(Method::GET, "v1/sample", RequestOpts::default())
//!     .await?;
//! assert!(resp.status().is_success());
//! # Ok(()) }
//! ```
//!
//! Credentials never reach the logs: events carry the auth kind and a request
//! target whose secret-looking query values are masked.

pub mod oauth;
pub mod retry;

pub use oauth::OAuth1Credentials;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "oauth_token",
    "oauth_signature",
    "token",
    "secret",
    "client_secret",
    "api_key",
    "key",
];
const MAX_ERROR_SNIPPET: usize = 500;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// HTTP status for API errors, `None` for transport and build failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// How a request authenticates.
///
/// ```
/// use t2m_http::{Auth, OAuth1Credentials};
///
/// let creds = OAuth1Credentials {
///     consumer_key: "ck".into(),
///     consumer_secret: "cs".into(),
///     token: "at".into(),
///     token_secret: "ats".into(),
/// };
/// assert_eq!(Auth::OAuth1(&creds).kind(), "oauth1");
/// assert_eq!(Auth::None.kind(), "none");
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// `Authorization: OAuth ...`, HMAC-SHA1 signed per attempt.
    OAuth1(&'a OAuth1Credentials),
    None,
}

impl Auth<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Auth::OAuth1(_) => "oauth1",
            Auth::None => "none",
        }
    }
}

/// Per-request tuning knobs.
///
/// ```
/// use t2m_http::{Auth, RequestOpts};
/// use std::borrow::Cow;
///
/// let opts = RequestOpts {
///     retries: Some(0),
///     auth: Some(Auth::None),
///     form: Some(vec![("track", Cow::Borrowed("rust,tokio"))]),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.retries, Some(0));
/// assert!(opts.timeout.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    /// Whole-request timeout. Leave unset for streams that stay open indefinitely.
    pub timeout: Option<Duration>,
    /// Overrides [`HttpClient::max_retries`] for this request.
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// Sent as an `application/x-www-form-urlencoded` body (RFC 3986 encoding).
    pub form: Option<Vec<(&'a str, Cow<'a, str>)>>,
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub max_retries: usize,
}

/// Result of one attempt that did not produce a usable response.
enum Failed {
    Retryable {
        err: HttpError,
        retry_after: Option<Duration>,
    },
    Final(HttpError),
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```
    /// use t2m_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new("https://stream.twitter.com/")?;
    /// assert_eq!(client.max_retries, 2);
    /// assert_eq!(client.base().as_str(), "https://stream.twitter.com/");
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            max_retries: 2,
        })
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Open a request whose body is consumed incrementally by the caller.
    pub async fn open_stream(
        &self,
        method: Method,
        path: &str,
        opts: RequestOpts<'_>,
    ) -> Result<Response, HttpError> {
        let url = self.resolve(path, opts.query.as_deref())?;
        let form: Vec<(&str, &str)> = opts
            .form
            .iter()
            .flatten()
            .map(|(k, v)| (*k, v.as_ref()))
            .collect();
        let body = opts.form.is_some().then(|| oauth::form_urlencode(&form));

        let budget = opts.retries.unwrap_or(self.max_retries);
        let auth = opts.auth.clone().unwrap_or(Auth::None);
        let target = redacted_target(&url);

        let mut retries_used = 0usize;
        loop {
            let req_id = uuid::Uuid::new_v4().simple().to_string();
            tracing::debug!(
                req_id = %req_id,
                attempt = retries_used + 1,
                budget,
                method = %method,
                target = %target,
                auth = auth.kind(),
                "http.stream.open"
            );

            let rb = self.request(&method, &url, &opts, &auth, &form, body.as_deref());
            let failed = match attempt(rb).await {
                Ok(resp) => {
                    tracing::debug!(
                        req_id = %req_id,
                        status = %resp.status(),
                        "http.stream.established"
                    );
                    return Ok(resp);
                }
                Err(failed) => failed,
            };

            match failed {
                Failed::Retryable { err, retry_after } if retries_used < budget => {
                    retries_used += 1;
                    let delay = retry::delay(err.status(), retry_after, retries_used);
                    tracing::warn!(
                        req_id = %req_id,
                        retry = retries_used,
                        budget,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "http.stream.retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Failed::Retryable { err, .. } | Failed::Final(err) => {
                    tracing::warn!(
                        req_id = %req_id,
                        target = %target,
                        error = %err,
                        "http.stream.failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    fn resolve(
        &self,
        path: &str,
        query: Option<&[(&str, Cow<'_, str>)]>,
    ) -> Result<Url, HttpError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;
        if let Some(q) = query {
            url.query_pairs_mut()
                .extend_pairs(q.iter().map(|(k, v)| (*k, v.as_ref())));
        }
        Ok(url)
    }

    fn request(
        &self,
        method: &Method,
        url: &Url,
        opts: &RequestOpts<'_>,
        auth: &Auth<'_>,
        form: &[(&str, &str)],
        body: Option<&str>,
    ) -> RequestBuilder {
        let mut rb = self.inner.request(method.clone(), url.clone());
        if let Some(t) = opts.timeout {
            rb = rb.timeout(t);
        }
        if let Some(h) = &opts.headers {
            rb = rb.headers(h.clone());
        }
        if let Some(body) = body {
            rb = rb
                .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
                .body(body.to_owned());
        }
        if let Auth::OAuth1(creds) = auth {
            rb = rb.header(AUTHORIZATION, creds.authorization(method, url, form));
        }
        rb
    }
}

async fn attempt(rb: RequestBuilder) -> Result<Response, Failed> {
    let resp = rb.send().await.map_err(|e| Failed::Retryable {
        err: HttpError::Network(e.to_string()),
        retry_after: None,
    })?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let headers = resp.headers().clone();
    let body = resp.bytes().await.unwrap_or_default();
    let err = HttpError::Api {
        status,
        message: api_message(&body),
        request_id: ["x-request-id", "x-transaction-id"]
            .iter()
            .find_map(|h| headers.get(*h).and_then(|v| v.to_str().ok()))
            .unwrap_or("-")
            .to_owned(),
    };
    if retry::is_retryable(status) {
        Err(Failed::Retryable {
            err,
            retry_after: retry::retry_after(&headers),
        })
    } else {
        Err(Failed::Final(err))
    }
}

/// Human-readable message from an error body.
///
/// Understands `{"errors":[{"message":..}]}` and flat `message`/`detail`/`error`
/// fields, and falls back to a trimmed snippet of the raw body.
fn api_message(body: &[u8]) -> String {
    let pick = |v: &Value| {
        ["message", "detail", "title", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_owned)
    };
    if let Ok(v) = serde_json::from_slice::<Value>(body) {
        let nested = v
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errs| errs.first())
            .and_then(pick);
        if let Some(msg) = nested.or_else(|| pick(&v)) {
            return msg;
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_SNIPPET) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

/// `host/path?query` with secret-looking values masked.
fn redacted_target(url: &Url) -> String {
    let mut out = format!("{}{}", url.host_str().unwrap_or("-"), url.path());
    let pairs: Vec<String> = url
        .query_pairs()
        .map(|(k, v)| {
            let masked = SECRET_PARAMS.iter().any(|s| k.eq_ignore_ascii_case(s));
            format!("{k}={}", if masked { "<redacted>" } else { v.as_ref() })
        })
        .collect();
    if !pairs.is_empty() {
        out.push('?');
        out.push_str(&pairs.join("&"));
    }
    out
}
