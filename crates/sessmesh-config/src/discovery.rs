//! Finding config files and stacking them.
//!
//! Without an explicit file, two layers are read, later wins per section:
//! the user file (`$SESSMESH_CONFIG_DIR/config.toml`, else the platform
//! config dir) and then `sessmesh.toml` in the working directory. A broken
//! discovered layer is skipped with a warning. An explicit file replaces
//! discovery and must load.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, SessmeshConfig};

const PROJECT_FILE: &str = "sessmesh.toml";
const USER_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "SESSMESH_CONFIG_DIR";

/// Which slot a config file fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
    /// Passed with `--config`.
    Explicit,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::User => "user",
            Layer::Project => "project",
            Layer::Explicit => "explicit",
        })
    }
}

/// What happened to one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    Applied,
    Absent,
    /// Present but unreadable or malformed; the message says why.
    Rejected(String),
}

/// One candidate file and its fate.
#[derive(Debug, Clone)]
pub struct LayerReport {
    pub layer: Layer,
    pub path: PathBuf,
    pub status: LayerStatus,
}

/// The merged config plus how it was put together.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SessmeshConfig,
    /// Candidates in the order they were applied.
    pub layers: Vec<LayerReport>,
    /// Rejected layers and suspicious values.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Reports for the files that made it into `config`.
    pub fn applied(&self) -> impl Iterator<Item = &LayerReport> {
        self.layers
            .iter()
            .filter(|l| l.status == LayerStatus::Applied)
    }
}

/// Load `explicit` if given, otherwise discover from the working directory.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    match explicit {
        Some(path) => {
            let config = read_config_file(path)?;
            let warnings = config.session().warnings();
            Ok(LoadedConfig {
                config,
                layers: vec![LayerReport {
                    layer: Layer::Explicit,
                    path: path.to_path_buf(),
                    status: LayerStatus::Applied,
                }],
                warnings,
            })
        }
        None => Ok(discover(Path::new("."), user_config_dir().as_deref())),
    }
}

/// Stack the user file from `user_dir` (if any) and `project_dir/sessmesh.toml`.
pub fn discover(project_dir: &Path, user_dir: Option<&Path>) -> LoadedConfig {
    let mut loaded = LoadedConfig {
        config: SessmeshConfig::new(),
        layers: Vec::new(),
        warnings: Vec::new(),
    };

    if let Some(dir) = user_dir {
        loaded.stack(Layer::User, dir.join(USER_FILE));
    }
    loaded.stack(Layer::Project, project_dir.join(PROJECT_FILE));

    let session_warnings = loaded.config.session().warnings();
    loaded.warnings.extend(session_warnings);
    loaded
}

impl LoadedConfig {
    fn stack(&mut self, layer: Layer, path: PathBuf) {
        let status = if !path.is_file() {
            LayerStatus::Absent
        } else {
            match read_config_file(&path) {
                Ok(file) => {
                    self.config.merge(file);
                    LayerStatus::Applied
                }
                Err(e) => {
                    self.warnings
                        .push(format!("skipping {} config {}: {e}", layer, path.display()));
                    LayerStatus::Rejected(e.to_string())
                }
            }
        };
        self.layers.push(LayerReport {
            layer,
            path,
            status,
        });
    }
}

/// Parse one file, no merging.
pub fn read_config_file(path: &Path) -> Result<SessmeshConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    SessmeshConfig::from_toml(&text)
}

/// Write `config` to `path`, creating missing directories.
///
/// An existing file is left alone unless `overwrite` is set.
pub fn write_config_file(config: &SessmeshConfig, path: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && path.exists() {
        return Err(ConfigError::AlreadyExists {
            path: path.display().to_string(),
        });
    }

    let write_err = |p: &Path, source| ConfigError::WriteFile {
        path: p.display().to_string(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(|e| write_err(path, e))
}

/// Directory holding the user config file.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("sessmesh")),
    }
}

/// Full path of the user config file.
pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_FILE))
}

/// Path of the project file for `dir`.
pub fn project_config_file(dir: &Path) -> PathBuf {
    dir.join(PROJECT_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dirs() -> (TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[test]
    fn test_read_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache]\nhost = \"10.0.0.5\"\n").unwrap();

        let config = read_config_file(&path).unwrap();
        assert_eq!(config.cache().host, "10.0.0.5");
        assert_eq!(config.cache().port, 11211);
    }

    #[test]
    fn test_read_missing_and_malformed() {
        let err = read_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache\nport = ").unwrap();
        assert!(matches!(read_config_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_nothing_to_discover() {
        let (project, user) = dirs();

        let loaded = discover(project.path(), Some(user.path()));
        assert!(loaded.config.cache.is_none());
        assert_eq!(loaded.applied().count(), 0);
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.layers.len(), 2);
        assert!(loaded.layers.iter().all(|l| l.status == LayerStatus::Absent));
    }

    #[test]
    fn test_project_overrides_user() {
        let (project, user) = dirs();
        fs::write(
            user.path().join("config.toml"),
            "[cache]\nhost = \"user-host\"\n\n[session]\nworker_name = \"node0\"\n",
        )
        .unwrap();
        fs::write(
            project.path().join("sessmesh.toml"),
            "[cache]\nhost = \"project-host\"\nport = 22122\n",
        )
        .unwrap();

        let loaded = discover(project.path(), Some(user.path()));

        assert_eq!(loaded.config.cache().addr(), "project-host:22122");
        assert_eq!(loaded.config.session().worker_name.as_deref(), Some("node0"));
        let applied: Vec<Layer> = loaded.applied().map(|l| l.layer).collect();
        assert_eq!(applied, vec![Layer::User, Layer::Project]);
    }

    #[test]
    fn test_broken_layer_is_skipped_with_warning() {
        let (project, user) = dirs();
        fs::write(user.path().join("config.toml"), "[cache]\nport = 1\n").unwrap();
        fs::write(project.path().join("sessmesh.toml"), "not valid toml {{{{").unwrap();

        let loaded = discover(project.path(), Some(user.path()));
        assert_eq!(loaded.config.cache().port, 1);
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].starts_with("skipping project config"));
        assert!(matches!(loaded.layers[1].status, LayerStatus::Rejected(_)));
    }

    #[test]
    fn test_dotted_worker_warning_surfaces() {
        let (project, _) = dirs();
        fs::write(
            project.path().join("sessmesh.toml"),
            "[session]\nworker_name = \"a.b\"\n",
        )
        .unwrap();

        let loaded = discover(project.path(), None);
        assert_eq!(loaded.layers.len(), 1);
        assert!(loaded.warnings.iter().any(|w| w.contains("a.b")));
    }

    #[test]
    fn test_explicit_file_replaces_discovery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[session]\nworker_name = \"x.y\"\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.layers.len(), 1);
        assert_eq!(loaded.layers[0].layer, Layer::Explicit);
        assert_eq!(loaded.warnings.len(), 1);

        fs::write(&path, "[cache\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = SessmeshConfig::with_defaults();

        write_config_file(&config, &path, false).unwrap();
        assert_eq!(read_config_file(&path).unwrap(), config);
    }

    #[test]
    fn test_write_refuses_to_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "# mine\n").unwrap();

        let err = write_config_file(&SessmeshConfig::with_defaults(), &path, false).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine\n");

        write_config_file(&SessmeshConfig::with_defaults(), &path, true).unwrap();
        assert!(read_config_file(&path).unwrap().cache.is_some());
    }
}
