//! Optional config file loading. Search order: ./storyfetch.toml, then
//! $XDG_CONFIG_HOME/storyfetch/config.toml (or ~/.config/storyfetch/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Base folder for downloaded chapter files when -o is not set.
    pub output_dir: Option<PathBuf>,
    /// Base folder for per-story ledger files.
    pub metadata_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Lower bound of the politeness delay between requests, in milliseconds.
    pub delay_min_ms: Option<u64>,
    /// Upper bound of the politeness delay between requests, in milliseconds.
    pub delay_max_ms: Option<u64>,
}

/// Search order: (1) ./storyfetch.toml, (2) $XDG_CONFIG_HOME/storyfetch/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("storyfetch.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("storyfetch").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
