//! Standard locations for impulse reverb configuration files

use std::path::PathBuf;

/// Directory holding impulse reverb configuration
///
/// Returns: `<config dir>/impulse-reverb` (e.g. `~/.config/impulse-reverb`)
fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("impulse-reverb")
}

/// Default location of the engine settings file
pub fn default_engine_config_path() -> PathBuf {
    default_config_dir().join("engine.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_path_layout() {
        let path = default_engine_config_path();
        assert!(path.ends_with("impulse-reverb/engine.yaml"));
    }
}
