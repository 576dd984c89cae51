//! Impulse Core - Offline reconfiguration and real-time convolution engine
//! for a multi-impulse-response reverb

pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod sample;
pub mod task;
pub mod types;

pub use error::{LoadStatus, TaskError, TaskResult};
pub use types::*;
