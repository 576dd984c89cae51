//! Real-time engine: parameters, ports and the block orchestrator
//!
//! Control threads talk to the engine through a [`CommandSender`]; display
//! threads read [`ReverbAtomics`]. Everything else happens inside
//! [`ReverbEngine::process`] on the audio thread.
//!
//! # Example
//!
//! ```ignore
//! let executor = Arc::new(ThreadPoolExecutor::new(2, 16));
//! let (mut engine, mut sender) = ReverbEngine::new(&EngineConfig::default(), executor);
//!
//! // Control thread
//! sender.set_file_path(0, Some("hall.wav".into()));
//!
//! // Audio thread
//! engine.process(&[&in_l, &in_r], &mut out_l, &mut out_r);
//! ```

mod engine;
mod file;
mod params;
mod ports;
mod slot;

pub use engine::ReverbEngine;
pub use file::ImpulseFile;
pub use params::{command_channel, CommandSender, ParamCommand, Parameters, SlotParams};
pub use ports::{FileAtomics, MeshPort, PathPort, PathRequest, ReverbAtomics, Toggle};
pub use slot::{ConvolutionSlot, OutputChannel};
