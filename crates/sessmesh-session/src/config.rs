//! Configuration for the session manager.

use std::time::Duration;

/// Default cache key holding the list of live cluster ids.
pub const DEFAULT_INDEX_KEY: &str = "_JSESSIONS";

/// Default name of the routing cookie.
pub const DEFAULT_COOKIE_NAME: &str = "JSESSIONID";

/// Default interval between scavenger sweeps.
pub const DEFAULT_SCAVENGE_PERIOD: Duration = Duration::from_secs(30);

/// Default idle timeout for new sessions (30 minutes).
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(30 * 60);

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of this node, appended to cluster ids to form node ids.
    /// `None` or empty means node ids equal cluster ids.
    pub worker_name: Option<String>,

    /// Cache key of the session index.
    pub index_key: String,

    /// Delay between scavenger sweeps. Zero disables scavenging.
    pub scavenge_period: Duration,

    /// Idle timeout given to new sessions. `None` means sessions never expire.
    pub max_idle: Option<Duration>,

    /// Name of the routing cookie handed back to the container.
    pub cookie_name: String,

    /// Path of the routing cookie (the web context path).
    pub cookie_path: String,

    /// Max-age of the routing cookie. `None` means a browser-session cookie.
    pub max_cookie_age: Option<Duration>,

    /// Re-issue the cookie when it is older than this. Only applies when
    /// `max_cookie_age` is set.
    pub refresh_cookie_age: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            worker_name: None,
            index_key: DEFAULT_INDEX_KEY.to_string(),
            scavenge_period: DEFAULT_SCAVENGE_PERIOD,
            max_idle: Some(DEFAULT_MAX_IDLE),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: "/".to_string(),
            max_cookie_age: None,
            refresh_cookie_age: None,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker name used to build node ids.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.worker_name = (!name.is_empty()).then_some(name);
        self
    }

    /// Set the cache key of the session index.
    pub fn with_index_key(mut self, key: impl Into<String>) -> Self {
        self.index_key = key.into();
        self
    }

    /// Set the scavenge period. `Duration::ZERO` disables scavenging.
    pub fn with_scavenge_period(mut self, period: Duration) -> Self {
        self.scavenge_period = period;
        self
    }

    /// Set the idle timeout for new sessions.
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// New sessions never expire.
    pub fn without_max_idle(mut self) -> Self {
        self.max_idle = None;
        self
    }

    /// Set the routing cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the routing cookie path.
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Enable cookie refresh: cookies live for `max_age` and are re-issued
    /// once older than `refresh_after`.
    pub fn with_cookie_refresh(mut self, max_age: Duration, refresh_after: Duration) -> Self {
        self.max_cookie_age = Some(max_age);
        self.refresh_cookie_age = Some(refresh_after);
        self
    }

    /// Idle timeout for new sessions in milliseconds, `-1` when unbounded.
    pub fn max_idle_ms(&self) -> i64 {
        self.max_idle
            .map(|d| d.as_millis() as i64)
            .filter(|ms| *ms > 0)
            .unwrap_or(-1)
    }

    /// Check the configuration for values the manager cannot work with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.index_key.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "index key must not be empty".to_string(),
            ));
        }
        if self.index_key.contains('/') {
            return Err(crate::Error::InvalidConfig(format!(
                "index key '{}' must not contain '/'",
                self.index_key
            )));
        }
        if self.cookie_name.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "cookie name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.index_key, "_JSESSIONS");
        assert_eq!(config.cookie_name, "JSESSIONID");
        assert_eq!(config.scavenge_period, Duration::from_secs(30));
        assert_eq!(config.max_idle_ms(), 30 * 60 * 1000);
        assert!(config.worker_name.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_worker_name_is_none() {
        let config = SessionConfig::new().with_worker_name("");
        assert!(config.worker_name.is_none());

        let config = SessionConfig::new().with_worker_name("node0");
        assert_eq!(config.worker_name.as_deref(), Some("node0"));
    }

    #[test]
    fn test_unbounded_idle() {
        let config = SessionConfig::new().without_max_idle();
        assert_eq!(config.max_idle_ms(), -1);

        let config = SessionConfig::new().with_max_idle(Duration::ZERO);
        assert_eq!(config.max_idle_ms(), -1);
    }

    #[test]
    fn test_validate_rejects_bad_index_key() {
        assert!(SessionConfig::new().with_index_key("").validate().is_err());
        assert!(
            SessionConfig::new()
                .with_index_key("a/b")
                .validate()
                .is_err()
        );
    }
}
