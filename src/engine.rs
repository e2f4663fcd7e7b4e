//! Engine core
//!
//! Wires the stages together: input chunks land in the frame queue, the
//! audio thread pulls fixed-size blocks through crossover split, per-band
//! dynamics and the mixer/output stage. The control interface lives on its
//! own thread and publishes parameter snapshots the audio thread picks up
//! at block boundaries.

use crate::dsp::{recombine, soft_limit, Crossover, CrossoverLayout, Dynamics};
use crate::error::{CrescendoError, Result};
use crate::frame::AudioFrame;
use crate::params::{BandParams, Parameters};
use crate::queue::FrameQueue;
use crate::snapshot::SnapshotCell;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Supported sample rate range in Hz
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Supported block size range in frames
pub const MIN_BLOCK_SIZE: usize = 32;
pub const MAX_BLOCK_SIZE: usize = 8_192;

/// Engine configuration, fixed at session start
///
/// Validation happens once in [`Engine::new`]; an unsupported configuration
/// is a `ConfigurationConflict` and the session never starts.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub num_channels: usize,
    /// Processing block size in frames
    pub block_size: usize,
    /// Initial crossover layout
    pub layout: CrossoverLayout,
    /// Frame queue capacity, in blocks
    pub queue_blocks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            num_channels: 2,
            block_size: 512,
            layout: CrossoverLayout::default_three_band(),
            queue_blocks: 8,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(CrescendoError::ConfigurationConflict {
                reason: format!(
                    "unsupported sample rate {} Hz (supported: {} to {})",
                    self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
                ),
            });
        }
        if !(1..=2).contains(&self.num_channels) {
            return Err(CrescendoError::ConfigurationConflict {
                reason: format!(
                    "unsupported channel count {} (supported: 1 or 2)",
                    self.num_channels
                ),
            });
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(CrescendoError::ConfigurationConflict {
                reason: format!(
                    "unsupported block size {} frames (supported: {} to {})",
                    self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
                ),
            });
        }
        if self.queue_blocks == 0 {
            return Err(CrescendoError::ConfigurationConflict {
                reason: "queue capacity must be at least one block".to_string(),
            });
        }
        // Re-validate the layout against this sample rate
        CrossoverLayout::new(self.layout.crossovers_hz().to_vec(), self.sample_rate)?;
        Ok(())
    }
}

/// State shared between the control thread and the audio thread
struct Shared {
    queue: FrameQueue,
    params: SnapshotCell<Parameters>,
    /// Layout change queued by the controller, applied at a block boundary
    pending_layout: Mutex<Option<CrossoverLayout>>,
}

/// Control interface handle
///
/// Owns the writer side of the snapshot cell: validates updates, rejects
/// out-of-range values leaving the prior snapshot in effect, and publishes
/// accepted updates atomically for the next processing cycle.
pub struct Controller {
    shared: Arc<Shared>,
    /// Writer-side working copy of the latest accepted parameters
    current: Mutex<Parameters>,
    sample_rate: u32,
}

impl Controller {
    /// Set a single named control
    ///
    /// On success a new snapshot is published; on error nothing changes.
    pub fn set(&self, name: &str, value: &Value) -> Result<()> {
        let mut current = self.current.lock();
        let mut updated = current.clone();
        updated.set(name, value)?;
        updated.version = current.version + 1;
        *current = updated.clone();
        self.shared.params.publish(Arc::new(updated));
        Ok(())
    }

    /// Enable processing
    pub fn enable(&self) -> Result<()> {
        self.set("enabled", &Value::Bool(true))
    }

    /// Bypass the engine: raw input passes to output unchanged
    pub fn bypass(&self) -> Result<()> {
        self.set("enabled", &Value::Bool(false))
    }

    /// Replace the whole parameter set (e.g. a loaded tuning)
    pub fn apply(&self, mut params: Parameters) -> Result<()> {
        params.validate()?;
        let mut current = self.current.lock();
        if params.bands.len() != current.bands.len() {
            return Err(CrescendoError::InvalidParameter {
                param: "bands".to_string(),
                value: params.bands.len().to_string(),
                expected: format!("{} bands (current layout)", current.bands.len()),
            });
        }
        params.version = current.version + 1;
        *current = params.clone();
        self.shared.params.publish(Arc::new(params));
        Ok(())
    }

    /// Queue a crossover layout change
    ///
    /// Applied by the audio thread at the next block boundary, never
    /// mid-block. Band parameters carry over where bands still exist; new
    /// bands start from defaults.
    pub fn reconfigure(&self, crossovers_hz: Vec<f32>) -> Result<()> {
        let layout = CrossoverLayout::new(crossovers_hz, self.sample_rate)?;
        let num_bands = layout.num_bands();

        let mut current = self.current.lock();
        let mut updated = current.clone();
        updated.bands.resize(num_bands, BandParams::default());
        updated.version = current.version + 1;
        *current = updated.clone();

        *self.shared.pending_layout.lock() = Some(layout);
        self.shared.params.publish(Arc::new(updated));
        Ok(())
    }

    /// Copy of the latest accepted parameters
    pub fn snapshot(&self) -> Parameters {
        self.current.lock().clone()
    }
}

/// Producer-side input handle
///
/// Clones share the engine's frame queue, so an I/O thread can feed input
/// while the audio thread owns the engine exclusively.
#[derive(Clone)]
pub struct InputPort {
    shared: Arc<Shared>,
}

impl InputPort {
    /// Queue an interleaved input chunk of any size
    ///
    /// Overrun drops the oldest queued frames and reports once per episode.
    pub fn push(&self, chunk: &[f32]) -> Result<()> {
        self.shared.queue.push(chunk)
    }

    /// Number of queued input frames, for producer-side backpressure
    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len_frames()
    }

    /// Queue capacity in frames
    pub fn capacity_frames(&self) -> usize {
        self.shared.queue.capacity_frames()
    }
}

/// Outcome of one processed block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReport {
    /// Version of the parameter snapshot in effect for the block
    pub snapshot_version: u64,
    /// Whether the block took the bypass path
    pub bypassed: bool,
}

/// Multi-band loudness enhancement engine
///
/// Owns all processing state. `process_block` is the audio-thread entry
/// point and never blocks or allocates after warm-up; `push_input` is the
/// producer-thread entry point.
pub struct Engine {
    config: EngineConfig,
    shared: Arc<Shared>,
    crossover: Crossover,
    dynamics: Dynamics,
    /// Snapshot in effect for the current block
    active: Arc<Parameters>,
    input_block: Vec<f32>,
    band_buffers: Vec<Vec<f32>>,
    mix_buffer: Vec<f32>,
}

impl Engine {
    /// Initialize an engine and its control handle
    pub fn new(config: EngineConfig) -> Result<(Engine, Controller)> {
        config.validate()?;

        let num_bands = config.layout.num_bands();
        let defaults = Parameters::defaults(num_bands);
        let shared = Arc::new(Shared {
            queue: FrameQueue::new(
                config.block_size * config.queue_blocks,
                config.num_channels,
            ),
            params: SnapshotCell::new(defaults.clone()),
            pending_layout: Mutex::new(None),
        });

        let controller = Controller {
            shared: Arc::clone(&shared),
            current: Mutex::new(defaults.clone()),
            sample_rate: config.sample_rate,
        };

        let block_samples = config.block_size * config.num_channels;
        let engine = Engine {
            crossover: Crossover::new(
                config.layout.clone(),
                config.sample_rate,
                config.num_channels,
            ),
            dynamics: Dynamics::new(num_bands, config.sample_rate, config.num_channels),
            active: Arc::new(defaults),
            input_block: vec![0.0; block_samples],
            band_buffers: vec![Vec::with_capacity(block_samples); num_bands],
            mix_buffer: Vec::with_capacity(block_samples),
            shared,
            config,
        };

        log::info!(
            "engine initialized: {} Hz, {} ch, {} frame blocks, {} bands",
            engine.config.sample_rate,
            engine.config.num_channels,
            engine.config.block_size,
            num_bands
        );
        Ok((engine, controller))
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parameter snapshot in effect for the most recent block
    pub fn active_params(&self) -> Arc<Parameters> {
        Arc::clone(&self.active)
    }

    /// Current gain reduction for a band in dB (metering)
    pub fn gain_reduction_db(&self, band: usize) -> f32 {
        self.dynamics.gain_reduction_db(band)
    }

    /// Producer-side handle to the frame queue
    ///
    /// Detached from the engine's lifetime, so a producer thread can push
    /// while the audio thread drives `process_block`.
    pub fn input_port(&self) -> InputPort {
        InputPort {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue an interleaved input chunk of any size (producer side)
    ///
    /// Overrun drops the oldest queued frames and reports once per episode.
    /// Cross-thread producers use [`Engine::input_port`] instead.
    pub fn push_input(&self, chunk: &[f32]) -> Result<()> {
        self.shared.queue.push(chunk)
    }

    /// Number of queued input frames
    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len_frames()
    }

    /// Process one block if enough input is queued (audio-thread side)
    ///
    /// `out` must hold exactly `block_size * num_channels` samples. Returns
    /// `Ok(None)` when not enough input has accumulated yet.
    pub fn process_block(&mut self, out: &mut [f32]) -> Result<Option<BlockReport>> {
        let block_samples = self.config.block_size * self.config.num_channels;
        if out.len() != block_samples {
            return Err(CrescendoError::InvalidAudio {
                reason: format!(
                    "output slice holds {} samples, expected {}",
                    out.len(),
                    block_samples
                ),
            });
        }

        self.begin_block();

        let mut input = std::mem::take(&mut self.input_block);
        if !self.shared.queue.pop_block(&mut input) {
            self.input_block = input;
            return Ok(None);
        }
        let report = self.run_stages(&input, out);
        self.input_block = input;
        Ok(Some(report))
    }

    /// Process a whole frame synchronously (offline path)
    ///
    /// Bypasses the queue: the frame is processed as a single block. The
    /// frame's shape must match the session configuration.
    pub fn process_frame(&mut self, frame: AudioFrame) -> Result<AudioFrame> {
        if frame.num_channels() != self.config.num_channels {
            return Err(CrescendoError::InvalidAudio {
                reason: format!(
                    "frame has {} channels, session expects {}",
                    frame.num_channels(),
                    self.config.num_channels
                ),
            });
        }
        if frame.sample_rate() != self.config.sample_rate {
            return Err(CrescendoError::InvalidAudio {
                reason: format!(
                    "frame sample rate {} Hz, session expects {} Hz",
                    frame.sample_rate(),
                    self.config.sample_rate
                ),
            });
        }

        self.begin_block();

        let sample_rate = frame.sample_rate();
        let num_channels = frame.num_channels();
        let input = frame.into_samples();
        let mut out = vec![0.0; input.len()];
        self.run_stages(&input, &mut out);
        AudioFrame::from_interleaved(out, num_channels, sample_rate)
    }

    /// Reset all filter and envelope state without touching parameters
    pub fn reset(&mut self) {
        self.crossover.reset();
        self.dynamics.reset();
    }

    /// Shut down: drain the queue, process the remainder, release state
    ///
    /// The tail shorter than a block is processed as a final partial block.
    pub fn release(mut self) -> Result<Vec<f32>> {
        let mut output = Vec::new();
        let block_samples = self.config.block_size * self.config.num_channels;
        let mut block = vec![0.0; block_samples];

        while let Some(_report) = self.process_block(&mut block)? {
            output.extend_from_slice(&block);
        }

        let tail = self.shared.queue.drain();
        if !tail.is_empty() {
            let mut tail_out = vec![0.0; tail.len()];
            self.begin_block();
            self.run_stages(&tail, &mut tail_out);
            output.extend_from_slice(&tail_out);
        }

        log::info!("engine released, {} tail samples flushed", output.len());
        Ok(output)
    }

    /// Block-boundary housekeeping: adopt queued layout changes and the
    /// freshest parameter snapshot
    ///
    /// Uses `try_lock` so the audio thread never waits on the controller;
    /// a contended layout change is simply picked up one block later.
    fn begin_block(&mut self) {
        let pending = self
            .shared
            .pending_layout
            .try_lock()
            .and_then(|mut slot| slot.take());

        if let Some(layout) = pending {
            let num_bands = layout.num_bands();
            self.crossover.reconfigure(layout);
            self.dynamics.reconfigure(num_bands);
            let block_samples = self.config.block_size * self.config.num_channels;
            self.band_buffers = vec![Vec::with_capacity(block_samples); num_bands];
            log::debug!("crossover reconfigured to {} bands", num_bands);
        }

        if self.shared.params.has_fresh() {
            self.active = self.shared.params.read();
        }
    }

    /// Run split → dynamics → mixer over one block
    fn run_stages(&mut self, input: &[f32], out: &mut [f32]) -> BlockReport {
        let params = Arc::clone(&self.active);

        if !params.enabled {
            out.copy_from_slice(input);
            return BlockReport {
                snapshot_version: params.version,
                bypassed: true,
            };
        }

        self.crossover.split(input, &mut self.band_buffers);

        for (band, buffer) in self.band_buffers.iter_mut().enumerate() {
            if let Some(band_params) = params.bands.get(band) {
                self.dynamics.process_band(band, buffer, band_params);
            }
        }

        recombine(&self.band_buffers, &params, &mut self.mix_buffer);
        soft_limit(&mut self.mix_buffer, params.ceiling_db);
        out.copy_from_slice(&self.mix_buffer);

        BlockReport {
            snapshot_version: params.version,
            bypassed: false,
        }
    }
}
