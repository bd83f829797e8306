//! CLI command handlers.

pub mod config;
pub mod list;
pub mod remove;
pub mod run;
pub mod scavenge;
pub mod show;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use sessmesh_cache::MemcachedClient;
use sessmesh_config::{LayerReport, SessmeshConfig};
use sessmesh_session::SessionManager;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration (files plus CLI overrides).
    pub config: SessmeshConfig,
    /// Config files considered while loading, in order.
    pub layers: Vec<LayerReport>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Connect to the configured cache and build a session manager on it.
    ///
    /// The manager is not started; commands that need the scavenger start it.
    pub async fn manager(&self) -> Result<SessionManager> {
        let cache_config = self.config.cache();
        let client = MemcachedClient::connect(cache_config.addr(), cache_config.timeout())
            .await
            .with_context(|| format!("could not reach memcached at {}", cache_config.addr()))?;

        let session_config = self.config.session().to_session_config()?;
        Ok(SessionManager::new(Arc::new(client), session_config)?)
    }
}

/// Format a millisecond timestamp for humans.
pub(crate) fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Format an idle timeout for humans.
pub(crate) fn format_idle(max_idle_ms: i64) -> String {
    if max_idle_ms <= 0 {
        "never".to_string()
    } else if max_idle_ms % 1000 == 0 {
        format!("{}s", max_idle_ms / 1000)
    } else {
        format!("{max_idle_ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_idle() {
        assert_eq!(format_idle(-1), "never");
        assert_eq!(format_idle(0), "never");
        assert_eq!(format_idle(1_800_000), "1800s");
        assert_eq!(format_idle(250), "250ms");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00.000 UTC");
    }
}
