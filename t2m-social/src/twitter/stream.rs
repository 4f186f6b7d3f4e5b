//! Channel payloads and the subscription handle handed to the dispatcher.
use crate::twitter::types::Tweet;
use anyhow::{Result, ensure};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Keys that identify stream control messages rather than posts.
const CONTROL_KEYS: &[&str] = &[
    "delete",
    "scrub_geo",
    "limit",
    "status_withheld",
    "user_withheld",
    "disconnect",
    "warning",
    "event",
    "friends",
    "control",
];

/// Ordered, de-duplicated keyword set fixed for the lifetime of a subscription.
///
/// ```
/// use t2m_social::twitter::TrackFilter;
///
/// let filter = TrackFilter::new([" rust", "tokio", "rust", ""]).unwrap();
/// assert_eq!(filter.keywords(), ["rust", "tokio"]);
/// assert_eq!(filter.as_param(), "rust,tokio");
/// assert!(TrackFilter::new(Vec::<String>::new()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFilter {
    keywords: Vec<String>,
}

impl TrackFilter {
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for k in keywords {
            let k = k.as_ref().trim();
            if !k.is_empty() && !out.iter().any(|seen| seen == k) {
                out.push(k.to_owned());
            }
        }
        ensure!(!out.is_empty(), "track filter needs at least one keyword");
        Ok(Self { keywords: out })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Comma-joined form expected by the `track` request parameter.
    pub fn as_param(&self) -> String {
        self.keywords.join(",")
    }
}

/// One value received from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Tweet(Box<Tweet>),
    /// Anything that is not a post: control notices, unknown shapes, bad JSON.
    Unrecognized { kind: String, raw: Value },
}

impl StreamItem {
    /// Short name of the payload type, used when logging skipped items.
    pub fn kind(&self) -> &str {
        match self {
            StreamItem::Tweet(_) => "tweet",
            StreamItem::Unrecognized { kind, .. } => kind,
        }
    }
}

/// Decode one newline-delimited payload from the stream body.
///
/// Bytes that are not valid JSON, including invalid UTF-8, come back as
/// `Unrecognized { kind: "malformed" }` with a lossy copy of the line.
pub fn decode_line(line: &[u8]) -> StreamItem {
    let value: Value = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(_) => return malformed(Value::String(String::from_utf8_lossy(line).into_owned())),
    };

    let Some(obj) = value.as_object() else {
        return StreamItem::Unrecognized {
            kind: json_type_name(&value).into(),
            raw: value,
        };
    };

    if let Some(key) = CONTROL_KEYS.iter().find(|k| obj.contains_key(**k)) {
        return StreamItem::Unrecognized {
            kind: (*key).to_owned(),
            raw: value,
        };
    }

    if obj.contains_key("id_str") && obj.contains_key("user") {
        if let Ok(tweet) = serde_json::from_value::<Tweet>(value.clone()) {
            return StreamItem::Tweet(Box::new(tweet));
        }
    }

    StreamItem::Unrecognized {
        kind: "unknown".into(),
        raw: value,
    }
}

pub(crate) fn malformed(raw: Value) -> StreamItem {
    StreamItem::Unrecognized {
        kind: "malformed".into(),
        raw,
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Cloneable best-effort stop signal for a subscription.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// Receiving end of a live stream: an unbounded FIFO channel of [`StreamItem`]s.
///
/// The channel closes when the producer gives up (terminal error) or after
/// [`Subscription::stop`].
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StreamItem>,
    stop: StopHandle,
}

impl Subscription {
    /// Wrap an existing channel, e.g. for a replayed or synthetic feed.
    ///
    /// ```
    /// use t2m_social::twitter::{StreamItem, Subscription};
    /// use tokio::sync::mpsc;
    ///
    /// let (tx, rx) = mpsc::unbounded_channel();
    /// let sub = Subscription::new(rx);
    /// let handle = sub.stop_handle();
    /// tx.send(StreamItem::Unrecognized { kind: "limit".into(), raw: serde_json::json!({}) }).unwrap();
    /// sub.stop();
    /// assert!(handle.is_stopped());
    /// ```
    pub fn new(rx: mpsc::UnboundedReceiver<StreamItem>) -> Self {
        Self::with_stop_handle(rx, StopHandle::new())
    }

    pub fn with_stop_handle(rx: mpsc::UnboundedReceiver<StreamItem>, stop: StopHandle) -> Self {
        Self { rx, stop }
    }

    /// Next item in receipt order; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}
