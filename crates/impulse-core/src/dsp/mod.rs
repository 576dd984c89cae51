//! Signal-path building blocks
//!
//! - [`Convolver`]: zero-latency partitioned FFT convolution
//! - [`Delay`]: slot pre-delay
//! - [`Equalizer`]: wet-signal EQ and cut filters
//! - [`Bypass`]: click-free bypass crossfade
//! - [`SamplePlayer`]: impulse preview playback

mod bypass;
mod convolver;
mod delay;
mod equalizer;
mod player;

pub use bypass::Bypass;
pub use convolver::{Convolver, ConvolverError, FFT_RANK_MAX};
pub use delay::Delay;
pub use equalizer::{EqMode, EqSettings, Equalizer};
pub use player::SamplePlayer;
