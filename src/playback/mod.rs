//! # Audio Playback
//!
//! Decoding and gapless scheduling of agent audio.
//!
//! ## Components:
//! - **decoder**: encoded bytes → f32 samples + derived duration
//! - **output**: the `AudioOutput` seam and its rodio-backed device impl
//! - **scheduler**: the next-free-slot cursor and live-handle bookkeeping

pub mod decoder;
pub mod output;
pub mod scheduler;

pub use decoder::DecodedChunk;
pub use output::{AudioOutput, RodioOutput};
pub use scheduler::PlaybackScheduler;
