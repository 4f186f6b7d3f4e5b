//! Loader for process settings with YAML + environment overlays.
//!
//! Settings are read once at startup into an immutable [`Settings`] value that is
//! passed by reference into the pipeline. Sources, lowest precedence first:
//!
//! 1. optional YAML/TOML/JSON files or inline YAML snippets
//! 2. `TWITTER2MONGO_<KEY>` environment variables (for example
//!    `TWITTER2MONGO_CONSUMER_KEY`, `TWITTER2MONGO_TRACK=rust,tokio`)
//!
//! String values may reference other environment variables as `${VAR}`.
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use t2m_common::PersistFailurePolicy;
use t2m_common::observability::{LogConfig, LogFormat};

pub const ENV_PREFIX: &str = "TWITTER2MONGO";

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,

    pub mongodb_url: String,
    pub mongodb_db: String,
    #[serde(default = "default_collection")]
    pub mongodb_collection: String,
    #[serde(default = "default_true")]
    pub mongodb_tls: bool,
    /// Skip certificate verification for the database connection.
    #[serde(default)]
    pub mongodb_tls_insecure: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub mongodb_connect_timeout_ms: u64,

    #[serde(deserialize_with = "track_list")]
    pub track: Vec<String>,
    #[serde(default = "default_stream_base_url")]
    pub stream_base_url: String,

    /// Upper bound on concurrently processed tweets; unset means unbounded.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    #[serde(default)]
    pub persist_failure: PersistFailurePolicy,

    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_collection() -> String {
    "tweets".into()
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout_ms() -> u64 {
    2_000
}
fn default_stream_base_url() -> String {
    "https://stream.twitter.com/".into()
}
fn default_log_filter() -> String {
    "debug".into()
}

/// Accept either `"a,b,c"` (environment) or a YAML sequence.
fn track_list<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(s) => s.split(',').map(str::to_owned).collect(),
        OneOrMany::Many(v) => v,
    })
}

impl Settings {
    pub fn mongodb_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.mongodb_connect_timeout_ms)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self.log_dir.clone(),
            format: self.log_format,
            default_filter: self.log_filter.clone(),
            ..LogConfig::default()
        }
    }

    fn expand_env(&mut self) {
        for s in [
            &mut self.consumer_key,
            &mut self.consumer_secret,
            &mut self.access_token,
            &mut self.access_token_secret,
            &mut self.mongodb_url,
            &mut self.mongodb_db,
            &mut self.mongodb_collection,
            &mut self.stream_base_url,
        ] {
            *s = expand_env(s);
        }
        for t in self.track.iter_mut() {
            *t = expand_env(t);
        }
    }

    fn normalize_and_validate(&mut self) -> Result<(), SettingsError> {
        let required = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("access_token", &self.access_token),
            ("access_token_secret", &self.access_token_secret),
            ("mongodb_url", &self.mongodb_url),
            ("mongodb_db", &self.mongodb_db),
            ("mongodb_collection", &self.mongodb_collection),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(SettingsError::Invalid {
                    key,
                    reason: "must not be empty".into(),
                });
            }
        }

        self.track = self
            .track
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
        if self.track.is_empty() {
            return Err(SettingsError::Invalid {
                key: "track",
                reason: "at least one keyword is required".into(),
            });
        }

        if self.max_in_flight == Some(0) {
            return Err(SettingsError::Invalid {
                key: "max_in_flight",
                reason: "must be at least 1 when set".into(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("consumer_key", &"<redacted>")
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_token_secret", &"<redacted>")
            .field("mongodb_url", &"<redacted>")
            .field("mongodb_db", &self.mongodb_db)
            .field("mongodb_collection", &self.mongodb_collection)
            .field("mongodb_tls", &self.mongodb_tls)
            .field("mongodb_tls_insecure", &self.mongodb_tls_insecure)
            .field("mongodb_connect_timeout_ms", &self.mongodb_connect_timeout_ms)
            .field("track", &self.track)
            .field("stream_base_url", &self.stream_base_url)
            .field("max_in_flight", &self.max_in_flight)
            .field("persist_failure", &self.persist_failure)
            .field("log_format", &self.log_format)
            .field("log_dir", &self.log_dir)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

fn expand_env(s: &str) -> String {
    if !s.contains('$') {
        return s.to_owned();
    }
    let mut cur = s.to_owned();
    for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
        let expanded = match shellexpand::env(&cur) {
            Ok(cow) => cow.into_owned(),
            Err(_) => cur.clone(),
        };
        if expanded == cur {
            break;
        }
        cur = expanded;
    }
    cur
}

/// Builder hides the `config` crate wiring (files + env overrides).
pub struct SettingsLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Start with no file sources; `TWITTER2MONGO_` variables are layered on at
    /// [`SettingsLoader::load`] so they always win.
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`SettingsLoader::with_file`] but silently skipped when absent.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use t2m_config::SettingsLoader;
    ///
    /// let settings = SettingsLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// consumer_key: ck
    /// consumer_secret: cs
    /// access_token: at
    /// access_token_secret: ats
    /// mongodb_url: mongodb://localhost:27017
    /// mongodb_db: twitter
    /// track: [rust, tokio]
    /// "#,
    ///     )
    ///     .load()
    ///     .expect("valid settings");
    ///
    /// assert_eq!(settings.track, ["rust", "tokio"]);
    /// assert_eq!(settings.mongodb_collection, "tweets");
    /// assert!(settings.mongodb_tls);
    /// assert!(!settings.mongodb_tls_insecure);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders, and validate.
    pub fn load(self) -> Result<Settings, SettingsError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut settings: Settings = cfg.try_deserialize()?;
        settings.expand_env();
        settings.normalize_and_validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            assert_eq!(expand_env("prefix-${FOO}-suffix"), "prefix-bar-suffix");
        });
    }

    #[test]
    #[serial]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                assert_eq!(expand_env("X=${FOO}"), "X=start-mid-qux-end");
            },
        );
    }

    #[test]
    #[serial]
    fn stops_on_cycles_and_leaves_value_reasonable() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let s = expand_env("x=${A}-y");
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    #[serial]
    fn unknown_vars_are_left_as_is() {
        assert_eq!(expand_env("hi-${DOES_NOT_EXIST}"), "hi-${DOES_NOT_EXIST}");
    }

    fn base() -> Settings {
        Settings {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            access_token: "at".into(),
            access_token_secret: "ats".into(),
            mongodb_url: "mongodb://localhost".into(),
            mongodb_db: "db".into(),
            mongodb_collection: default_collection(),
            mongodb_tls: true,
            mongodb_tls_insecure: false,
            mongodb_connect_timeout_ms: default_connect_timeout_ms(),
            track: vec!["rust".into()],
            stream_base_url: default_stream_base_url(),
            max_in_flight: None,
            persist_failure: PersistFailurePolicy::Abort,
            log_format: LogFormat::Text,
            log_dir: None,
            log_filter: default_log_filter(),
        }
    }

    #[test]
    fn track_is_trimmed_and_blank_entries_dropped() {
        let mut s = base();
        s.track = vec![" rust".into(), "".into(), "tokio ".into(), "  ".into()];
        s.normalize_and_validate().unwrap();
        assert_eq!(s.track, ["rust", "tokio"]);
    }

    #[test]
    fn empty_track_is_rejected() {
        let mut s = base();
        s.track = vec!["".into()];
        let err = s.normalize_and_validate().unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "track", .. }));
    }

    #[test]
    fn blank_credentials_are_rejected() {
        let mut s = base();
        s.consumer_secret = "   ".into();
        let err = s.normalize_and_validate().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                key: "consumer_secret",
                ..
            }
        ));
    }

    #[test]
    fn zero_in_flight_bound_is_rejected() {
        let mut s = base();
        s.max_in_flight = Some(0);
        assert!(s.normalize_and_validate().is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", base());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("\"cs\""));
        assert!(!rendered.contains("mongodb://localhost"));
    }
}
