//! Crescendo - Multi-band Loudness Enhancement Engine
//!
//! Crescendo takes raw PCM frames and a parameter set and returns
//! loudness-enhanced frames: the input is split into frequency bands, each
//! band is compressed independently, and the bands are recombined with
//! makeup gain under a soft output limiter.
//!
//! # Architecture
//!
//! - Frame queue: producer thread pushes variable-size chunks, the audio
//!   thread pulls fixed-size blocks (drop-oldest on overrun)
//! - Parameter store: immutable versioned snapshots published lock-free
//! - Pipeline: crossover split → per-band dynamics → mixer/output stage
//!
//! Platform concerns (effect discovery, session management, GUIs) are out
//! of scope; the [`registry::EffectRegistry`] maps effect names to factory
//! functions and is the only wiring surface.

pub mod dsp;
pub mod engine;
pub mod error;
pub mod frame;
pub mod params;
pub mod queue;
pub mod registry;
pub mod snapshot;

pub use engine::{BlockReport, Controller, Engine, EngineConfig, InputPort};
pub use error::{CrescendoError, Result};
pub use frame::AudioFrame;
pub use params::{BandParams, Parameters};
