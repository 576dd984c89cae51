//! YAML configuration I/O
//!
//! Two flavours of loading: [`load_config`] is forgiving and falls back to
//! defaults (used for the engine settings file), [`read_config`] is strict and
//! reports what went wrong (used for render jobs, where silently rendering
//! with defaults would be wrong).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file, falling back to defaults
///
/// A missing file yields `T::default()`. A file that exists but fails to
/// read or parse logs a warning and also yields the defaults.
///
/// # Example
///
/// ```ignore
/// let config: EngineConfig = load_config(&default_engine_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("[CONFIG] Loading {:?}", path);

    if !path.exists() {
        log::info!("[CONFIG] {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match read_config(path) {
        Ok(config) => {
            log::info!("[CONFIG] Loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("[CONFIG] {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Load configuration from a YAML file, failing on any error
pub fn read_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("[CONFIG] Saving {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Settings {
        rate: u32,
        label: String,
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: Settings = load_config(Path::new("/nonexistent/path/engine.yaml"));
        assert_eq!(config, Settings::default());
    }

    #[test]
    fn test_roundtrip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.yaml");

        let config = Settings {
            rate: 44100,
            label: "hall".to_string(),
        };

        save_config(&config, &path).unwrap();
        let loaded: Settings = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_yaml_falls_back_or_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "rate: [not a number").unwrap();

        let loaded: Settings = load_config(&path);
        assert_eq!(loaded, Settings::default());
        assert!(read_config::<Settings>(&path).is_err());
    }
}
