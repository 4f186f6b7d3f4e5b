//! OAuth 1.0a request signing (HMAC-SHA1), as required by the streaming API.
//!
//! The signature base string is `METHOD&enc(base_url)&enc(sorted_params)` where
//! the parameters are the union of query, form body, and `oauth_*` values, each
//! percent-encoded with the RFC 3986 unreserved set.
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::{Method, Url};
use sha1::Sha1;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Characters left untouched by RFC 3986 encoding: ALPHA / DIGIT / "-" / "." / "_" / "~".
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub(crate) fn encode(s: &str) -> String {
    utf8_percent_encode(s, RFC3986).to_string()
}

/// `k=v&k=v` body with both sides RFC 3986 encoded, matching what gets signed.
pub(crate) fn form_urlencode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Consumer and access-token pair for user-context requests.
#[derive(Clone)]
pub struct OAuth1Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl fmt::Debug for OAuth1Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth1Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("token", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

impl OAuth1Credentials {
    /// Build the `Authorization` header value with a fresh nonce and timestamp.
    pub fn authorization(&self, method: &Method, url: &Url, params: &[(&str, &str)]) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.authorization_with(method, url, params, &nonce, timestamp)
    }

    /// Deterministic variant of [`OAuth1Credentials::authorization`].
    pub fn authorization_with(
        &self,
        method: &Method,
        url: &Url,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: u64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let oauth_params = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let signature = self.signature(method, url, params, &oauth_params);

        let mut header = String::from("OAuth ");
        let mut fields: Vec<(&str, &str)> = oauth_params.to_vec();
        fields.push(("oauth_signature", signature.as_str()));
        fields.sort_unstable();
        let rendered: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        header.push_str(&rendered.join(", "));
        header
    }

    fn signature(
        &self,
        method: &Method,
        url: &Url,
        params: &[(&str, &str)],
        oauth_params: &[(&str, &str)],
    ) -> String {
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut encoded: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (encode(k), encode(v)))
            .chain(params.iter().map(|(k, v)| (encode(k), encode(v))))
            .chain(oauth_params.iter().map(|(k, v)| (encode(k), encode(v))))
            .collect();
        encoded.sort();

        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut base_url = url.clone();
        base_url.set_query(None);
        base_url.set_fragment(None);

        let base_string = format!(
            "{}&{}&{}",
            method.as_str().to_ascii_uppercase(),
            encode(base_url.as_str()),
            encode(&param_string)
        );
        let signing_key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(&self.token_secret)
        );

        let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(base_string.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}
