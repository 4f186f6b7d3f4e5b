use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One post as delivered by the v1.1 filter stream.
///
/// Only the fields the pipeline reads are typed; every other attribute is kept
/// in `extra` so serialising the value reproduces the received document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tweet {
    pub id_str: String,
    pub text: String,
    pub user: User,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id_str: String,
    pub name: String,
    pub screen_name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tweet {
    /// Full body of the post: `extended_tweet.full_text` for long posts that the
    /// stream delivers truncated, otherwise `text`.
    pub fn body(&self) -> &str {
        self.extra
            .get("extended_tweet")
            .and_then(|e| e.get("full_text"))
            .and_then(Value::as_str)
            .unwrap_or(&self.text)
    }
}
