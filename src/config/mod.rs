// Configuration management module
// TOML settings under the user config directory plus the interactive setup flow

pub mod interactive;
pub mod settings;


use std::path::{Path, PathBuf};

pub use interactive::{run_interactive_config, show_config};
pub use settings::{API_KEY_ENV, Config, ConfigError, OllamaConfig};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn resolve_config_dir(override_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Config::default_dir(),
    }
}
