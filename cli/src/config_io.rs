use std::path::{Path, PathBuf};

use restsync_core::config::RepoConfig;

const MAX_CONFIG_BYTES: usize = 1024 * 1024;

/// A validated repository config plus the directory its relative paths
/// resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RepoConfig,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<LoadedConfig> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    if bytes.len() > MAX_CONFIG_BYTES {
        anyhow::bail!(
            "config file is too large ({} bytes; max {} bytes)",
            bytes.len(),
            MAX_CONFIG_BYTES
        );
    }
    let raw = String::from_utf8(bytes)?;
    let ext = path.extension().and_then(|s| s.to_str());
    let config: RepoConfig = match ext {
        Some("json") => serde_json::from_str(&raw)?,
        Some("toml") | None => toml::from_str(&raw)?,
        Some(other) => anyhow::bail!("unsupported config extension: {other}"),
    };
    config.validate()?;

    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LoadedConfig { config, base_dir })
}

/// Defaults rooted at the current directory, used when no config file is given.
pub fn default_config() -> LoadedConfig {
    LoadedConfig {
        config: RepoConfig::default(),
        base_dir: PathBuf::from("."),
    }
}
