//! Producer→consumer audio connections.
//!
//! A patch is a single-producer / single-consumer connection over a split
//! ring. [`Patch::create`] returns the two halves:
//!
//! ```text
//! PatchInput (producer) → ring of frames × channels → PatchOutput (consumer)
//! ```
//!
//! - **Gain**: applied by the input on every push, adjustable at any time
//! - **Staleness**: a patch bound to a bus goes stale when that bus is stopped
//!   or re-started with a different channel count; stale patches transfer
//!   nothing until the consumer reconnects
//! - **Real-time access**: each half owns its end of the ring, so push and
//!   pop never lock; when the consumer falls behind, the oldest unread
//!   samples are discarded on its next pop

mod ring_buffer;

pub use ring_buffer::RingBuffer;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use ring_buffer::{split_ring, RingConsumer, RingProducer};

/// Liveness signal shared between a bus and every patch bound to it.
///
/// The control thread bumps `epoch` when the bus is stopped or re-configured;
/// patches compare it against the epoch they were bound at. `rendering` is
/// published by the render thread and mirrors whether the bus is mixing.
#[derive(Debug, Default)]
pub(crate) struct BusWatch {
    epoch: AtomicU64,
    channel_count: AtomicU32,
    active: AtomicBool,
    rendering: AtomicBool,
}

impl BusWatch {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Invalidates every patch bound so far.
    pub(crate) fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn channel_count(&self) -> u32 {
        self.channel_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool, channel_count: u32) {
        self.channel_count.store(channel_count, Ordering::Release);
        self.active.store(active, Ordering::Release);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_rendering(&self, rendering: bool) {
        self.rendering.store(rendering, Ordering::Release);
    }

    pub(crate) fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Acquire)
    }
}

struct Binding {
    watch: Arc<BusWatch>,
    epoch: u64,
}

struct PatchShared {
    channel_count: u32,
    frame_capacity: u32,
    gain: AtomicU32,
    valid: bool,
    input_alive: AtomicBool,
    output_alive: AtomicBool,
    binding: OnceLock<Binding>,
}

impl PatchShared {
    fn new(frames: u32, channels: u32, gain: f32, valid: bool) -> Self {
        Self {
            channel_count: channels,
            frame_capacity: frames,
            gain: AtomicU32::new(gain.to_bits()),
            valid,
            input_alive: AtomicBool::new(true),
            output_alive: AtomicBool::new(true),
            binding: OnceLock::new(),
        }
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn is_stale(&self) -> bool {
        if !self.valid {
            return true;
        }
        match self.binding.get() {
            Some(binding) => {
                binding.watch.epoch() != binding.epoch
                    || (binding.watch.is_active()
                        && binding.watch.channel_count() != self.channel_count)
            }
            None => false,
        }
    }
}

/// Factory for connected [`PatchInput`] / [`PatchOutput`] pairs.
///
/// # Example
///
/// ```
/// use audio_patchbay::Patch;
///
/// let (mut input, mut output) = Patch::create(4, 2, 0.5);
/// input.push(&[1.0; 8]);
///
/// let mut out = [0.0; 8];
/// assert_eq!(output.pop(&mut out, false), 8);
/// assert_eq!(out, [0.5; 8]);
/// ```
pub struct Patch;

impl Patch {
    /// Creates a connected pair sharing one ring of `frames * channels` samples.
    pub fn create(frames: u32, channels: u32, gain: f32) -> (PatchInput, PatchOutput) {
        Self::split(Arc::new(PatchShared::new(frames, channels, gain, true)))
    }

    /// Creates a disconnected pair that transfers nothing.
    ///
    /// Handed out instead of an error when a device refuses to allocate, so
    /// render-thread code never has to handle a failure.
    pub fn invalid(channels: u32) -> (PatchInput, PatchOutput) {
        Self::split(Arc::new(PatchShared::new(1, channels, 0.0, false)))
    }

    fn split(shared: Arc<PatchShared>) -> (PatchInput, PatchOutput) {
        let capacity = shared.frame_capacity as usize * shared.channel_count as usize;
        let (producer, consumer) = split_ring(capacity);
        let input = PatchInput {
            shared: shared.clone(),
            scratch: vec![0.0; producer.capacity()],
            producer,
        };
        let output = PatchOutput { shared, consumer };
        (input, output)
    }
}

/// The producer half of a patch.
pub struct PatchInput {
    shared: Arc<PatchShared>,
    producer: RingProducer<f32>,
    scratch: Vec<f32>,
}

impl PatchInput {
    /// Pushes interleaved samples scaled by the patch gain.
    ///
    /// Returns the number of samples written, at most the patch capacity;
    /// only the most recent samples of an oversized buffer are kept.
    /// Pushing into a patch whose output was dropped, or into a stale patch,
    /// is a no-op returning 0. Never blocks and never allocates.
    pub fn push(&mut self, buffer: &[f32]) -> usize {
        if !self.is_connected() || self.shared.is_stale() {
            return 0;
        }

        let skipped = buffer.len().saturating_sub(self.scratch.len());
        if skipped > 0 {
            self.producer.discard(skipped);
        }
        let newest = &buffer[skipped..];

        let gain = self.shared.gain();
        let scaled = &mut self.scratch[..newest.len()];
        for (dst, src) in scaled.iter_mut().zip(newest) {
            *dst = src * gain;
        }
        self.producer.push(scaled)
    }

    /// Pushes `samples` zeros, used to keep a consumer fed with silence.
    pub fn push_silence(&mut self, samples: usize) -> usize {
        if !self.is_connected() || self.shared.is_stale() {
            return 0;
        }
        let count = samples.min(self.scratch.len());
        self.scratch[..count].fill(0.0);
        self.producer.push(&self.scratch[..count])
    }

    /// Returns `true` while the output half is alive and the patch is valid.
    pub fn is_connected(&self) -> bool {
        self.shared.valid && self.shared.output_alive.load(Ordering::Acquire)
    }

    /// Returns `true` if this patch no longer carries audio for its bus.
    pub fn is_stale(&self) -> bool {
        self.shared.is_stale()
    }

    /// Sets the gain applied to subsequent pushes.
    pub fn set_gain(&self, gain: f32) {
        self.shared.set_gain(gain);
    }

    /// Returns the current gain.
    pub fn gain(&self) -> f32 {
        self.shared.gain()
    }

    /// Returns the interleaved channel count.
    pub fn channel_count(&self) -> u32 {
        self.shared.channel_count
    }

    pub(crate) fn bind(&self, watch: Arc<BusWatch>) {
        bind(&self.shared, watch);
    }
}

impl Drop for PatchInput {
    fn drop(&mut self) {
        self.shared.input_alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PatchInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchInput")
            .field("channel_count", &self.shared.channel_count)
            .field("frame_capacity", &self.shared.frame_capacity)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// The consumer half of a patch.
pub struct PatchOutput {
    shared: Arc<PatchShared>,
    consumer: RingConsumer<f32>,
}

impl PatchOutput {
    /// Copies up to `dst.len()` samples out of the patch.
    ///
    /// With `use_latest`, older excess samples are skipped so the newest
    /// audio is returned. A stale patch yields 0 samples.
    pub fn pop(&mut self, dst: &mut [f32], use_latest: bool) -> usize {
        if self.shared.is_stale() {
            return 0;
        }
        self.consumer.pop(dst, use_latest)
    }

    /// Returns the number of samples ready to pop (0 when stale).
    pub fn available(&self) -> usize {
        if self.shared.is_stale() {
            return 0;
        }
        self.consumer.available()
    }

    /// Returns `true` if the patch no longer reflects its bus.
    ///
    /// This is the case when the bus was stopped after the patch was bound,
    /// when the bus now runs at a different channel count, or when the patch
    /// is invalid.
    pub fn is_stale(&self) -> bool {
        self.shared.is_stale()
    }

    /// Returns `false` for patches handed out after a creation failure.
    pub fn is_valid(&self) -> bool {
        self.shared.valid
    }

    /// Returns `true` while the input half is still held by a producer.
    pub fn has_producer(&self) -> bool {
        self.shared.input_alive.load(Ordering::Acquire)
    }

    /// Returns the interleaved channel count negotiated at creation.
    pub fn channel_count(&self) -> u32 {
        self.shared.channel_count
    }

    /// Returns the capacity in frames.
    pub fn frame_capacity(&self) -> u32 {
        self.shared.frame_capacity
    }

    /// Sets the gain applied by the producer side.
    pub fn set_gain(&self, gain: f32) {
        self.shared.set_gain(gain);
    }

    /// Returns the total samples discarded by ring overflow.
    pub fn overflowed(&self) -> u64 {
        self.consumer.overflowed()
    }

    pub(crate) fn bind(&self, watch: Arc<BusWatch>) {
        bind(&self.shared, watch);
    }
}

impl Drop for PatchOutput {
    fn drop(&mut self) {
        self.shared.output_alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PatchOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchOutput")
            .field("channel_count", &self.shared.channel_count)
            .field("frame_capacity", &self.shared.frame_capacity)
            .field("stale", &self.is_stale())
            .finish_non_exhaustive()
    }
}

fn bind(shared: &PatchShared, watch: Arc<BusWatch>) {
    let epoch = watch.epoch();
    if shared.binding.set(Binding { watch, epoch }).is_err() {
        tracing::debug!("patch already bound to a bus, keeping first binding");
    }
}

/// The bus-side end of a patch, handed to a bus for attachment.
///
/// Named after the patch half the bus holds:
/// - [`BusEnd::Input`]: the bus writes its mix into this input, so whoever
///   holds the matching [`PatchOutput`] reads the bus
/// - [`BusEnd::Output`]: the bus reads from this output and sums it into its
///   mix, so whoever holds the matching [`PatchInput`] sends into the bus
#[derive(Debug)]
pub enum BusEnd {
    /// The bus pushes its mix into this input.
    Input(PatchInput),
    /// The bus pops from this output into its mix.
    Output(PatchOutput),
}

impl BusEnd {
    /// Returns the channel count of the wrapped half.
    pub fn channel_count(&self) -> u32 {
        match self {
            Self::Input(input) => input.channel_count(),
            Self::Output(output) => output.channel_count(),
        }
    }

    /// Returns `true` once the far half has been dropped.
    pub fn is_orphaned(&self) -> bool {
        match self {
            Self::Input(input) => !input.is_connected(),
            Self::Output(output) => !output.has_producer(),
        }
    }

    pub(crate) fn bind(&self, watch: Arc<BusWatch>) {
        match self {
            Self::Input(input) => input.bind(watch),
            Self::Output(output) => output.bind(watch),
        }
    }
}
