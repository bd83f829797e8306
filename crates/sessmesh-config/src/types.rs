//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [cache]      # memcached server
//! [session]    # session manager settings
//! [logging]    # log filter and file output
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessmesh_session::{DEFAULT_COOKIE_NAME, DEFAULT_INDEX_KEY, SessionConfig};

use crate::ConfigError;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessmeshConfig {
    /// Cache server connection.
    pub cache: Option<CacheSection>,

    /// Session manager settings.
    pub session: Option<SessionSection>,

    /// Logging settings.
    pub logging: Option<LoggingSection>,
}

impl SessmeshConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every section present with its default values.
    pub fn with_defaults() -> Self {
        Self {
            cache: Some(CacheSection::default()),
            session: Some(SessionSection::default()),
            logging: Some(LoggingSection::default()),
        }
    }

    /// Fill in missing sections with defaults.
    pub fn resolved(&self) -> Self {
        Self {
            cache: Some(self.cache()),
            session: Some(self.session()),
            logging: Some(self.logging()),
        }
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: SessmeshConfig) {
        if other.cache.is_some() {
            self.cache = other.cache;
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The `[cache]` section, or defaults.
    pub fn cache(&self) -> CacheSection {
        self.cache.clone().unwrap_or_default()
    }

    /// The `[session]` section, or defaults.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// The `[logging]` section, or defaults.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// The `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSection {
    /// Memcached host.
    pub host: String,
    /// Memcached port.
    pub port: u16,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11211,
            timeout_ms: 2000,
        }
    }
}

impl CacheSection {
    /// `host:port` of the server.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-operation timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// The `[session]` section.
///
/// Signed second counts follow the servlet convention: zero or negative
/// means "not set".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionSection {
    /// Worker name appended to node ids. Unset means node ids equal
    /// cluster ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,

    /// Cache key of the session index.
    pub index_key: String,

    /// Scavenger period in milliseconds; 0 disables it.
    pub scavenge_period_ms: u64,

    /// Idle timeout of new sessions; 0 or negative never expires.
    pub max_idle_secs: i64,

    /// Routing cookie name.
    pub cookie_name: String,

    /// Routing cookie path.
    pub cookie_path: String,

    /// Routing cookie max-age; negative means a browser-session cookie.
    pub max_cookie_age_secs: i64,

    /// Re-issue the cookie once it is this old; 0 disables refresh.
    pub refresh_cookie_age_secs: i64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            worker_name: None,
            index_key: DEFAULT_INDEX_KEY.to_string(),
            scavenge_period_ms: 30_000,
            max_idle_secs: 1800,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: "/".to_string(),
            max_cookie_age_secs: -1,
            refresh_cookie_age_secs: 0,
        }
    }
}

impl SessionSection {
    /// Build the runtime session config.
    pub fn to_session_config(&self) -> crate::Result<SessionConfig> {
        if self.index_key.is_empty() || self.index_key.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "session.index_key".to_string(),
                reason: "must be non-empty and must not contain '/'".to_string(),
            });
        }
        if self.cookie_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.cookie_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let mut config = SessionConfig::new()
            .with_index_key(&self.index_key)
            .with_scavenge_period(Duration::from_millis(self.scavenge_period_ms))
            .with_cookie_name(&self.cookie_name)
            .with_cookie_path(&self.cookie_path);

        if let Some(ref worker) = self.worker_name {
            config = config.with_worker_name(worker);
        }

        config = match positive_secs(self.max_idle_secs) {
            Some(max_idle) => config.with_max_idle(max_idle),
            None => config.without_max_idle(),
        };

        if let Some(max_age) = positive_secs(self.max_cookie_age_secs) {
            config.max_cookie_age = Some(max_age);
            config.refresh_cookie_age = positive_secs(self.refresh_cookie_age_secs);
        }

        Ok(config)
    }

    /// Problems worth telling the operator about that do not stop loading.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(ref worker) = self.worker_name
            && worker.contains('.')
        {
            warnings.push(format!(
                "[session] worker_name '{worker}' contains '.'; node ids will not map back to session ids"
            ));
        }
        if self.refresh_cookie_age_secs > 0 && self.max_cookie_age_secs <= 0 {
            warnings.push(
                "[session] refresh_cookie_age_secs has no effect without max_cookie_age_secs"
                    .to_string(),
            );
        }
        warnings
    }
}

fn positive_secs(secs: i64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs as u64))
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// The `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,

    /// Also write JSON logs to a daily rolling file.
    pub json_file: bool,

    /// Directory for the log file. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "sessmesh=info,warn".to_string(),
            json_file: false,
            dir: None,
        }
    }
}

impl LoggingSection {
    /// Directory the JSON log file goes to.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|d| d.join("sessmesh").join("logs")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SessmeshConfig::from_toml("").unwrap();
        assert!(config.cache.is_none());

        let cache = config.cache();
        assert_eq!(cache.addr(), "127.0.0.1:11211");
        assert_eq!(cache.timeout(), Duration::from_secs(2));

        let session = config.session().to_session_config().unwrap();
        assert_eq!(session.index_key, "_JSESSIONS");
        assert_eq!(session.scavenge_period, Duration::from_secs(30));
        assert_eq!(session.max_idle_ms(), 1_800_000);
        assert!(session.max_cookie_age.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = SessmeshConfig::from_toml(
            r#"
[cache]
host = "cache.internal"
port = 11311
timeout_ms = 500

[session]
worker_name = "node0"
index_key = "_SESSIONS_A"
scavenge_period_ms = 500
max_idle_secs = 3
cookie_name = "SID"
max_cookie_age_secs = 600
refresh_cookie_age_secs = 60

[logging]
filter = "debug"
json_file = true
dir = "/var/log/sessmesh"
"#,
        )
        .unwrap();

        assert_eq!(config.cache().addr(), "cache.internal:11311");

        let session = config.session().to_session_config().unwrap();
        assert_eq!(session.worker_name.as_deref(), Some("node0"));
        assert_eq!(session.index_key, "_SESSIONS_A");
        assert_eq!(session.scavenge_period, Duration::from_millis(500));
        assert_eq!(session.max_idle_ms(), 3000);
        assert_eq!(session.cookie_name, "SID");
        assert_eq!(session.max_cookie_age, Some(Duration::from_secs(600)));
        assert_eq!(session.refresh_cookie_age, Some(Duration::from_secs(60)));

        let logging = config.logging();
        assert!(logging.json_file);
        assert_eq!(logging.log_dir(), Some(PathBuf::from("/var/log/sessmesh")));
    }

    #[test]
    fn test_non_positive_idle_never_expires() {
        let section = SessionSection {
            max_idle_secs: -1,
            ..Default::default()
        };
        assert_eq!(section.to_session_config().unwrap().max_idle_ms(), -1);
    }

    #[test]
    fn test_refresh_needs_max_age() {
        let section = SessionSection {
            refresh_cookie_age_secs: 60,
            ..Default::default()
        };
        let config = section.to_session_config().unwrap();
        assert!(config.refresh_cookie_age.is_none());
        assert_eq!(section.warnings().len(), 1);
    }

    #[test]
    fn test_invalid_index_key() {
        let section = SessionSection {
            index_key: "a/b".to_string(),
            ..Default::default()
        };
        let err = section.to_session_config().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "session.index_key"));
    }

    #[test]
    fn test_dotted_worker_warns() {
        let section = SessionSection {
            worker_name: Some("host.example".to_string()),
            ..Default::default()
        };
        assert!(section.warnings()[0].contains("host.example"));
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = SessmeshConfig::from_toml("[cache]\nport = 1\n[logging]\nfilter = \"info\"").unwrap();
        let overlay = SessmeshConfig::from_toml("[cache]\nport = 2").unwrap();
        base.merge(overlay);

        assert_eq!(base.cache().port, 2);
        assert_eq!(base.logging().filter, "info");
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = SessmeshConfig {
            cache: Some(CacheSection::default()),
            session: Some(SessionSection {
                worker_name: Some("node0".to_string()),
                ..Default::default()
            }),
            logging: None,
        };
        let text = config.to_toml().unwrap();
        assert_eq!(SessmeshConfig::from_toml(&text).unwrap(), config);
    }
}
