use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use playerconfig::PlayerConfig;

const CONFIG_FILE_NAME: &str = "alphaplay.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    /// `ALPHAPLAY_CONFIG_DIR` wins over the platform config directory.
    pub fn discover() -> Result<Self> {
        if let Some(dir) = env::var_os("ALPHAPLAY_CONFIG_DIR") {
            return Ok(Self {
                config_dir: PathBuf::from(dir),
            });
        }
        let dirs = ProjectDirs::from("io", "packalpha", "alphaplay")
            .context("failed to resolve a home directory for alphaplay")?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn default_config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// The file `load_config` reads, if any.
    pub fn config_file(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = self.default_config_file();
                default.exists().then_some(default)
            }
        }
    }

    /// Loads the explicit config, else the default file, else built-in
    /// defaults. An explicit path that cannot be read is an error.
    pub fn load_config(&self, explicit: Option<&Path>) -> Result<PlayerConfig> {
        match self.config_file(explicit) {
            Some(path) => {
                let config = PlayerConfig::load(&path)
                    .with_context(|| format!("failed to load config at {}", path.display()))?;
                tracing::debug!(path = %path.display(), clips = config.clips.len(), "loaded player config");
                Ok(config)
            }
            None => {
                tracing::debug!(
                    dir = %self.config_dir.display(),
                    "no player config found; using built-in defaults"
                );
                Ok(PlayerConfig::default())
            }
        }
    }
}
