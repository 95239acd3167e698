//! Synthetic audio source for tests and demos.

use std::time::Duration;

/// Generates deterministic interleaved `f32` audio.
///
/// Generators append to an internal buffer. Sine phase and the noise seed
/// carry over between calls, so a signal generated in pieces is continuous.
///
/// # Example
///
/// ```
/// use audio_patchbay::source::MockSource;
///
/// let mut mock = MockSource::new(48000, 2);
///
/// // 10ms of silence, then 10ms of a 440Hz sine at half scale
/// mock.generate_silence(10);
/// mock.generate_sine(440.0, 0.5, 10);
///
/// // Feed one 256-frame block at a time
/// let block = mock.take_frames(256);
/// assert_eq!(block.len(), 512);
/// ```
#[derive(Debug, Clone)]
pub struct MockSource {
    sample_rate: u32,
    channels: u32,
    samples: Vec<f32>,
    phase: f64,
    seed: u32,
}

impl MockSource {
    /// Creates a mock source with the given format.
    pub fn new(sample_rate: u32, channels: u32) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples: Vec::new(),
            phase: 0.0,
            seed: 12345,
        }
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel count.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Appends silence for the given duration in milliseconds.
    pub fn generate_silence(&mut self, duration_ms: u64) {
        let frames = self.frames_for_duration(duration_ms);
        self.push_frames(std::iter::repeat(0.0).take(frames));
    }

    /// Appends a sine wave, continuing the phase of the previous sine.
    pub fn generate_sine(&mut self, frequency: f64, amplitude: f32, duration_ms: u64) {
        let frames = self.frames_for_duration(duration_ms);
        let step = std::f64::consts::TAU * frequency / f64::from(self.sample_rate);

        let mut phase = self.phase;
        let values: Vec<f32> = (0..frames)
            .map(|_| {
                let value = phase.sin() as f32 * amplitude;
                phase = (phase + step) % std::f64::consts::TAU;
                value
            })
            .collect();
        self.phase = phase;
        self.push_frames(values);
    }

    /// Appends a linear ramp from `from` to `to` over `frames` frames.
    ///
    /// The first frame is `from` and the last is `to`.
    pub fn generate_ramp(&mut self, from: f32, to: f32, frames: usize) {
        let denominator = frames.saturating_sub(1).max(1) as f32;
        self.push_frames((0..frames).map(|i| from + (to - from) * i as f32 / denominator));
    }

    /// Appends white noise in `[-amplitude, amplitude]`.
    pub fn generate_noise(&mut self, duration_ms: u64, amplitude: f32) {
        let count = self.frames_for_duration(duration_ms) * self.channels as usize;
        for _ in 0..count {
            self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let unit = f32::from((self.seed >> 16) as u16) / f32::from(u16::MAX);
            self.samples.push((unit * 2.0 - 1.0) * amplitude);
        }
    }

    /// Appends raw interleaved samples.
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Takes all accumulated samples, clearing the internal buffer.
    pub fn take_samples(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    /// Takes up to `frames` frames from the front of the buffer.
    pub fn take_frames(&mut self, frames: usize) -> Vec<f32> {
        let count = (frames * self.channels as usize).min(self.samples.len());
        self.samples.drain(..count).collect()
    }

    /// Returns the accumulated samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the number of accumulated frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Returns the duration of the accumulated audio.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Writes each value to every channel.
    fn push_frames(&mut self, values: impl IntoIterator<Item = f32>) {
        for value in values {
            for _ in 0..self.channels {
                self.samples.push(value);
            }
        }
    }

    fn frames_for_duration(&self, duration_ms: u64) -> usize {
        (u64::from(self.sample_rate) * duration_ms / 1000) as usize
    }
}
