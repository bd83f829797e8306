//! Configuration for sessmesh.
//!
//! TOML files with three sections:
//! - `[cache]`: where the memcached server lives
//! - `[session]`: session manager settings
//! - `[logging]`: log filter and file output
//!
//! Files are layered: the user config dir first, then `./sessmesh.toml` on
//! top, unless one file is named explicitly. CLI flags override both and are
//! applied by the binary.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    Layer, LayerReport, LayerStatus, LoadedConfig, discover, load_config, project_config_file,
    read_config_file, user_config_dir, user_config_file, write_config_file,
};
pub use error::{ConfigError, Result};
pub use types::*;
