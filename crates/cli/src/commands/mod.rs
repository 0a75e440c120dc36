pub mod config_cmd;
pub mod run;
pub mod tools;

use std::path::{Path, PathBuf};

use steward_config::{AppConfig, ConfigError};

/// The config file in use: `--config` if given, else the default location.
pub(crate) fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load the config file with environment overrides applied.
pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::load_with_env(&config_file(path))
}
