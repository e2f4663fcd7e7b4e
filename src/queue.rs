//! Frame buffer and ring queue
//!
//! Fixed-capacity circular buffer of interleaved samples sitting between
//! the producer (I/O) thread and the audio thread. Accepts variable-size
//! input chunks and hands out fixed-size processing blocks. When the
//! producer outruns the consumer the oldest data is dropped and the overrun
//! is reported once per episode; neither side ever blocks indefinitely.
//!
//! The critical section is a few index updates and a bounded copy, so a
//! short mutex hold keeps the audio thread wait time negligible.

use crate::error::{CrescendoError, Result};
use parking_lot::Mutex;

/// Ring queue of interleaved audio samples
pub struct FrameQueue {
    inner: Mutex<RingInner>,
    capacity: usize,
    num_channels: usize,
}

struct RingInner {
    buf: Vec<f32>,
    /// Read position in samples
    head: usize,
    /// Number of queued samples
    len: usize,
    /// Set when an overrun has been reported and not yet recovered
    overrun_latched: bool,
}

impl FrameQueue {
    /// Create a queue holding up to `capacity_frames` frames
    pub fn new(capacity_frames: usize, num_channels: usize) -> Self {
        let capacity = capacity_frames * num_channels;
        Self {
            inner: Mutex::new(RingInner {
                buf: vec![0.0; capacity],
                head: 0,
                len: 0,
                overrun_latched: false,
            }),
            capacity,
            num_channels,
        }
    }

    /// Capacity in frames
    pub fn capacity_frames(&self) -> usize {
        self.capacity / self.num_channels
    }

    /// Number of queued frames
    pub fn len_frames(&self) -> usize {
        self.inner.lock().len / self.num_channels
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().len == 0
    }

    /// Push an interleaved chunk of any size (producer side)
    ///
    /// Always accepts the chunk. If there is not enough free space the
    /// oldest queued frames are dropped to make room; the first push of an
    /// overrun episode returns `BufferOverrun` with the drop count, and
    /// subsequent overruns stay silent until a push fits without dropping.
    pub fn push(&self, chunk: &[f32]) -> Result<()> {
        if chunk.len() % self.num_channels != 0 {
            return Err(CrescendoError::InvalidAudio {
                reason: format!(
                    "chunk of {} samples is not whole {}-channel frames",
                    chunk.len(),
                    self.num_channels
                ),
            });
        }

        // A chunk larger than the whole queue keeps only its newest tail.
        let (skipped, chunk) = if chunk.len() > self.capacity {
            let skip = chunk.len() - self.capacity;
            (skip, &chunk[skip..])
        } else {
            (0, chunk)
        };

        let mut inner = self.inner.lock();
        let free = self.capacity - inner.len;
        let mut dropped = skipped;

        if chunk.len() > free {
            let deficit = chunk.len() - free;
            inner.head = (inner.head + deficit) % self.capacity;
            inner.len -= deficit;
            dropped += deficit;
        }

        let mut write = (inner.head + inner.len) % self.capacity;
        for &sample in chunk {
            inner.buf[write] = sample;
            write = (write + 1) % self.capacity;
        }
        inner.len += chunk.len();

        if dropped > 0 {
            if inner.overrun_latched {
                return Ok(());
            }
            inner.overrun_latched = true;
            drop(inner);
            log::warn!("frame queue overrun, dropped {} oldest samples", dropped);
            return Err(CrescendoError::BufferOverrun {
                dropped_samples: dropped,
            });
        }

        inner.overrun_latched = false;
        Ok(())
    }

    /// Pop one fixed-size block into `out` (consumer side)
    ///
    /// Returns `true` and fills `out` completely when enough frames are
    /// queued; returns `false` and leaves `out` untouched otherwise.
    pub fn pop_block(&self, out: &mut [f32]) -> bool {
        let mut inner = self.inner.lock();
        if inner.len < out.len() {
            return false;
        }

        for slot in out.iter_mut() {
            *slot = inner.buf[inner.head];
            inner.head = (inner.head + 1) % self.capacity;
        }
        inner.len -= out.len();
        true
    }

    /// Drain everything still queued (shutdown path)
    ///
    /// The result is always whole frames since pushes only accept whole
    /// frames.
    pub fn drain(&self) -> Vec<f32> {
        let mut inner = self.inner.lock();
        let mut out = Vec::with_capacity(inner.len);
        while inner.len > 0 {
            out.push(inner.buf[inner.head]);
            inner.head = (inner.head + 1) % self.capacity;
            inner.len -= 1;
        }
        out
    }
}
