//! Where the daemon looks for its configuration file

use std::path::PathBuf;

/// Environment variable overriding the default configuration path
pub const CONFIG_ENV_VAR: &str = "VFAND_CONFIG";

/// `~/.config/vfan/config.toml`, or `/etc/vfan/config.toml` when the user
/// has no config directory (system services).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("vfan")
        .join("config.toml")
}

/// Pick the configuration file: explicit path, then `VFAND_CONFIG`, then the default
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    resolve_with_env(explicit, std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
}

fn resolve_with_env(explicit: Option<PathBuf>, from_env: Option<PathBuf>) -> PathBuf {
    explicit
        .or(from_env.filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(default_config_path)
}
