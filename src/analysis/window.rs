//! Triggered, windowed reader for waveform displays.

use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::trigger::{TriggerMode, TriggerState};
use crate::patch::{PatchOutput, RingBuffer};
use crate::{PatchbayError, ProviderConfig};

/// A display window emitted by a [`TriggeredWindowProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct WindowView {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    /// Channel count of `samples`.
    pub channels: u32,
    /// Sample rate of the audio.
    pub sample_rate: u32,
    /// Absolute index of the first frame, counted from the first frame the
    /// provider ever read.
    pub first_frame_index: u64,
}

impl WindowView {
    /// Returns the number of frames in the view.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Returns the samples of one channel.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels.max(1) as usize)
            .copied()
    }
}

/// Callback receiving every generated [`WindowView`].
pub type ViewCallback = Arc<dyn Fn(&WindowView) + Send + Sync>;

struct ProviderState {
    patch: Option<PatchOutput>,
    channels: usize,
    sample_rate: u32,
    ring: RingBuffer<f32>,
    /// Window capacity the ring and history are sized for, in frames.
    capacity_frames: usize,
    read_buf: Vec<f32>,
    history: Vec<f32>,
    trigger: TriggerState,
    trigger_offset: f32,
    time_window: Duration,
    max_time_window: Duration,
    analysis_period: Duration,
    view_range: (f32, f32),
    window: Vec<f32>,
    window_first_frame: u64,
    frames_read: u64,
    processing: bool,
}

impl ProviderState {
    fn new(patch: Option<PatchOutput>, config: &ProviderConfig) -> Self {
        let channels = patch.as_ref().map_or(1, |p| p.channel_count().max(1) as usize);
        let mut state = Self {
            patch,
            channels,
            sample_rate: config.sample_rate,
            ring: RingBuffer::new(1),
            capacity_frames: 0,
            read_buf: Vec::new(),
            history: Vec::new(),
            trigger: TriggerState {
                mode: config.trigger_mode,
                threshold: config.trigger_threshold,
                has_triggered: false,
                channel_to_analyze: config.channel_to_analyze,
                time_window_samples: 0,
                analysis_period_samples: 0,
            },
            trigger_offset: config.trigger_offset.clamp(0.0, 1.0),
            time_window: config.time_window.min(config.max_time_window),
            max_time_window: config.max_time_window,
            analysis_period: config.analysis_period,
            view_range: (0.0, 1.0),
            window: Vec::new(),
            window_first_frame: 0,
            frames_read: 0,
            processing: false,
        };
        state.update_sizes();
        state
    }

    fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize
    }

    /// Recomputes frame counts and grows storage when the window outgrows it.
    fn update_sizes(&mut self) {
        let window_frames = self.frames_for(self.time_window);
        self.trigger.time_window_samples = u32::try_from(window_frames).unwrap_or(u32::MAX);
        self.trigger.analysis_period_samples =
            u32::try_from(self.frames_for(self.analysis_period)).unwrap_or(u32::MAX);

        if window_frames > self.capacity_frames {
            let max_frames = self.frames_for(self.max_time_window);
            self.reallocate(window_frames.min(max_frames).max(1));
        }
    }

    fn reallocate(&mut self, capacity_frames: usize) {
        // Two windows of history so a crossing can be centred.
        let samples = capacity_frames * 2 * self.channels;
        tracing::debug!(capacity_frames, channels = self.channels, "resizing window storage");
        self.capacity_frames = capacity_frames;
        self.ring = RingBuffer::new(samples);
        self.history = vec![0.0; samples];
        self.read_buf = vec![0.0; samples];
        self.window.clear();
    }

    fn set_patch(&mut self, patch: Option<PatchOutput>) {
        self.channels = patch.as_ref().map_or(1, |p| p.channel_count().max(1) as usize);
        self.patch = patch;
        let capacity = self.capacity_frames.max(1);
        self.reallocate(capacity);
        self.trigger.reset();
    }

    /// Moves everything the patch has queued into the ring. Returns frames read.
    fn pull(&mut self) -> usize {
        let Some(patch) = self.patch.as_mut() else {
            return 0;
        };
        let mut total = 0;
        loop {
            let popped = patch.pop(&mut self.read_buf, false);
            if popped == 0 {
                break;
            }
            self.ring.push(&self.read_buf[..popped]);
            total += popped;
            if popped < self.read_buf.len() {
                break;
            }
        }
        let frames = total / self.channels;
        self.frames_read += frames as u64;
        frames
    }

    fn process(&mut self) -> Option<WindowView> {
        if self.pull() == 0 {
            return None;
        }

        let channels = self.channels;
        let window = (self.trigger.time_window_samples as usize).min(self.capacity_frames);
        let available = self.ring.available() / channels;
        if window == 0 || available < window {
            return None;
        }

        let history_frames = available.min(self.history.len() / channels);
        let history = &mut self.history[..history_frames * channels];
        self.ring.copy_latest(history);
        let latest_start = history_frames - window;

        let start = if self.trigger.mode == TriggerMode::None {
            latest_start
        } else {
            let offset = ((window as f32 * self.trigger_offset).round() as usize).min(window - 1);
            let search = latest_start.max(offset)..=latest_start + offset;
            match self.trigger.find_crossing(history, channels, search) {
                Some(crossing) => {
                    self.trigger.has_triggered = true;
                    crossing - offset
                }
                None if self.trigger.has_triggered => return None,
                None => latest_start,
            }
        };

        self.window.clear();
        self.window
            .extend_from_slice(&history[start * channels..(start + window) * channels]);
        self.window_first_frame = self.frames_read - history_frames as u64 + start as u64;
        Some(self.view())
    }

    fn view(&self) -> WindowView {
        let frames = self.window.len() / self.channels;
        let first = ((frames as f32 * self.view_range.0).floor() as usize).min(frames);
        let last = ((frames as f32 * self.view_range.1).ceil() as usize).clamp(first, frames);
        WindowView {
            samples: self.window[first * self.channels..last * self.channels].to_vec(),
            channels: self.channels as u32,
            sample_rate: self.sample_rate,
            first_frame_index: self.window_first_frame + first as u64,
        }
    }
}

/// Pulls a bus through a patch on a timer and emits trigger-aligned windows.
///
/// The provider reads every sample its [`PatchOutput`] has queued into an
/// internal ring, then derives a window of `time_window` from the most recent
/// audio:
/// - [`TriggerMode::None`]: the latest window
/// - edge modes: the window is shifted so the first threshold crossing sits at
///   `trigger_offset` of the window; while no crossing is found after an
///   earlier trigger, the last stable window is kept and nothing is emitted;
///   before any trigger the window free-runs
///
/// # Example
///
/// ```
/// use audio_patchbay::{Patch, ProviderConfig, TriggeredWindowProvider};
/// use std::time::Duration;
///
/// let (mut input, output) = Patch::create(256, 1, 1.0);
/// let config = ProviderConfig {
///     sample_rate: 1000,
///     time_window: Duration::from_millis(10),
///     ..Default::default()
/// };
/// let provider = TriggeredWindowProvider::new(Some(output), config);
///
/// input.push(&[0.5; 32]);
/// assert!(provider.tick());
/// assert_eq!(provider.current_view().map(|view| view.frames()), Some(10));
/// ```
pub struct TriggeredWindowProvider {
    state: Mutex<ProviderState>,
    callback: Mutex<Option<ViewCallback>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TriggeredWindowProvider {
    /// Creates a provider reading `patch`, which may be attached later with
    /// [`set_patch`](Self::set_patch).
    pub fn new(patch: Option<PatchOutput>, config: ProviderConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProviderState::new(patch, &config)),
            callback: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    /// Replaces the patch read from. Buffered audio is discarded.
    pub fn set_patch(&self, patch: Option<PatchOutput>) {
        self.state.lock().set_patch(patch);
    }

    /// Returns `true` if there is no patch or the patch has gone stale.
    pub fn needs_patch(&self) -> bool {
        self.state
            .lock()
            .patch
            .as_ref()
            .map_or(true, PatchOutput::is_stale)
    }

    /// Sets the callback receiving generated views.
    ///
    /// The callback runs without internal locks held and may call back into
    /// the provider, including [`stop_processing`](Self::stop_processing).
    pub fn on_view_generated(&self, callback: ViewCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Starts periodic processing on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PatchbayError::NoRuntime`] outside of a tokio runtime.
    pub fn start_processing(self: &Arc<Self>) -> Result<(), PatchbayError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PatchbayError::NoRuntime)?;
        self.state.lock().processing = true;

        let weak = Arc::downgrade(self);
        let task = runtime.spawn(run_periodic(weak));
        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        tracing::debug!("window provider processing started");
        Ok(())
    }

    /// Stops periodic processing.
    ///
    /// No pop happens after this returns. Safe to call at any time, including
    /// from the view callback.
    pub fn stop_processing(&self) {
        self.state.lock().processing = false;
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::debug!("window provider processing stopped");
        }
    }

    /// Returns `true` between [`start_processing`](Self::start_processing)
    /// and [`stop_processing`](Self::stop_processing).
    pub fn is_processing(&self) -> bool {
        self.state.lock().processing
    }

    /// Reads new audio and emits a view if one was generated.
    ///
    /// Called by the periodic task; call it directly to drive the provider
    /// manually. Returns `true` if a view was emitted.
    pub fn tick(&self) -> bool {
        let view = self.state.lock().process();
        self.deliver(view)
    }

    /// Selects a sub-range of the window, as ratios in `[0, 1]`, and
    /// re-emits the current window through it. Resets the trigger latch.
    pub fn request_view(&self, range: RangeInclusive<f32>) {
        let view = {
            let mut state = self.state.lock();
            let start = range.start().clamp(0.0, 1.0);
            let end = range.end().clamp(start, 1.0);
            state.view_range = (start, end);
            state.trigger.reset();
            (!state.window.is_empty()).then(|| state.view())
        };
        self.deliver(view);
    }

    /// Returns the current window through the selected view range.
    pub fn current_view(&self) -> Option<WindowView> {
        let state = self.state.lock();
        (!state.window.is_empty()).then(|| state.view())
    }

    /// Sets the window length, clamped to
    /// [`max_time_window`](Self::max_time_window). Resets the trigger latch.
    pub fn set_time_window(&self, window: Duration) {
        let mut state = self.state.lock();
        state.time_window = window.min(state.max_time_window);
        state.trigger.reset();
        state.update_sizes();
    }

    /// Returns the window length.
    pub fn time_window(&self) -> Duration {
        self.state.lock().time_window
    }

    /// Returns the longest window the provider accepts.
    pub fn max_time_window(&self) -> Duration {
        self.state.lock().max_time_window
    }

    /// Sets the sample rate of the patched audio and recomputes frame counts.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        let mut state = self.state.lock();
        if state.sample_rate == sample_rate || sample_rate == 0 {
            return;
        }
        state.sample_rate = sample_rate;
        state.trigger.reset();
        state.update_sizes();
    }

    /// Returns the sample rate views are produced at.
    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    /// Sets how often the periodic task reads new audio.
    ///
    /// Takes effect from the next period.
    pub fn set_analysis_period(&self, period: Duration) {
        let mut state = self.state.lock();
        state.analysis_period = period.max(Duration::from_millis(1));
        state.update_sizes();
    }

    /// Sets the trigger threshold.
    pub fn set_trigger_threshold(&self, threshold: f32) {
        self.state.lock().trigger.threshold = threshold;
    }

    /// Sets the trigger mode. Resets the trigger latch.
    pub fn set_trigger_mode(&self, mode: TriggerMode) {
        let mut state = self.state.lock();
        state.trigger.mode = mode;
        state.trigger.reset();
    }

    /// Sets the channel analysed for triggers; negative averages all channels.
    pub fn set_channel_to_analyze(&self, channel: i32) {
        self.state.lock().trigger.channel_to_analyze = channel;
    }

    /// Sets where the trigger point sits in the window, as a fraction.
    pub fn set_trigger_offset(&self, offset: f32) {
        self.state.lock().trigger_offset = offset.clamp(0.0, 1.0);
    }

    /// Returns a copy of the trigger state.
    pub fn trigger_state(&self) -> TriggerState {
        self.state.lock().trigger.clone()
    }

    fn analysis_period(&self) -> Duration {
        self.state.lock().analysis_period
    }

    /// One scheduled tick. Returns `false` once processing was stopped.
    fn scheduled_tick(&self) -> bool {
        let view = {
            let mut state = self.state.lock();
            if !state.processing {
                return false;
            }
            state.process()
        };
        self.deliver(view);
        true
    }

    fn deliver(&self, view: Option<WindowView>) -> bool {
        let Some(view) = view else {
            return false;
        };
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&view);
        }
        true
    }
}

async fn run_periodic(provider: Weak<TriggeredWindowProvider>) {
    loop {
        let Some(period) = provider.upgrade().map(|p| p.analysis_period()) else {
            return;
        };
        tokio::time::sleep(period).await;

        let Some(strong) = provider.upgrade() else {
            return;
        };
        if !strong.scheduled_tick() {
            return;
        }
    }
}

impl Drop for TriggeredWindowProvider {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TriggeredWindowProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TriggeredWindowProvider")
            .field("channels", &state.channels)
            .field("time_window", &state.time_window)
            .field("trigger", &state.trigger)
            .field("processing", &state.processing)
            .finish_non_exhaustive()
    }
}
