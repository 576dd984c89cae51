//! Configuration for the impulse reverb engine
//!
//! - Generic YAML config loading/saving
//! - Engine construction settings
//! - Offline render jobs for the `ir-render` tool
//!
//! # Usage
//!
//! ```ignore
//! use impulse_core::config::{load_config, default_engine_config_path, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_engine_config_path());
//! ```

mod engine;
mod io;
mod paths;
mod render;

pub use engine::EngineConfig;
pub use io::{load_config, read_config, save_config};
pub use paths::default_engine_config_path;
pub use render::{ImpulseFileConfig, RenderJob};
