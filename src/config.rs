//! Configuration types for the routing fabric.

use std::time::Duration;

use crate::bus::BusKey;

/// Configuration for a [`BusRegistry`](crate::BusRegistry).
///
/// # Example
///
/// ```
/// use audio_patchbay::FabricConfig;
///
/// let config = FabricConfig {
///     default_patch_frames: 2048,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// Frame capacity used for patches created without an explicit size.
    ///
    /// Default: 1024
    pub default_patch_frames: u32,

    /// Maximum number of ends parked while no render device is attached.
    ///
    /// Ends past this limit are dropped with a warning and their consumers
    /// read silence.
    /// Default: 256
    pub max_parked_ends: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            default_patch_frames: 1024,
            max_parked_ends: 256,
        }
    }
}

/// Configuration for a [`SoftwareMixer`](crate::SoftwareMixer).
///
/// All render-side storage is sized from these values up front so the render
/// thread never allocates.
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Frames rendered per block.
    ///
    /// Default: 512
    pub frames_per_block: u32,

    /// Output channel count of the device.
    ///
    /// Default: 2
    pub channel_count: u32,

    /// Sample rate in Hz.
    ///
    /// Default: 48000
    pub sample_rate: u32,

    /// Capacity of the control → render command queue.
    ///
    /// Default: 256
    pub command_capacity: usize,

    /// Maximum number of buses rendered at once.
    ///
    /// Default: 64
    pub max_buses: usize,

    /// Maximum number of patch ends attached to one bus.
    ///
    /// Default: 32
    pub max_patches_per_bus: usize,

    /// Largest patch the device will allocate, in samples.
    ///
    /// Default: 1 048 576
    pub max_patch_samples: usize,
}

impl MixerConfig {
    /// Sets the frames rendered per block.
    #[must_use]
    pub fn with_frames_per_block(mut self, frames: u32) -> Self {
        self.frames_per_block = frames;
        self
    }

    /// Sets the output channel count.
    #[must_use]
    pub fn with_channel_count(mut self, channels: u32) -> Self {
        self.channel_count = channels;
        self
    }

    /// Sets the sample rate.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frames_per_block: 512,
            channel_count: 2,
            sample_rate: 48000,
            command_capacity: 256,
            max_buses: 64,
            max_patches_per_bus: 32,
            max_patch_samples: 1 << 20,
        }
    }
}

/// Configuration for a [`TriggeredWindowProvider`](crate::TriggeredWindowProvider).
///
/// # Example
///
/// ```
/// use audio_patchbay::{ProviderConfig, TriggerMode};
/// use std::time::Duration;
///
/// let config = ProviderConfig {
///     time_window: Duration::from_millis(50),
///     trigger_mode: TriggerMode::RisingEdge,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Length of the emitted window.
    ///
    /// Default: 20ms
    pub time_window: Duration,

    /// Upper bound for [`time_window`](Self::time_window); longer requests
    /// are clamped.
    ///
    /// Default: 1s
    pub max_time_window: Duration,

    /// How often new samples are pulled and analysed.
    ///
    /// Default: 10ms
    pub analysis_period: Duration,

    /// Trigger detection mode.
    ///
    /// Default: [`TriggerMode::None`](crate::TriggerMode::None)
    pub trigger_mode: crate::TriggerMode,

    /// Trigger threshold in linear sample units.
    ///
    /// Default: 0.0
    pub trigger_threshold: f32,

    /// Position of the trigger point within the window, as a fraction.
    ///
    /// Default: 0.5
    pub trigger_offset: f32,

    /// Channel used for trigger detection. Negative averages all channels.
    ///
    /// Default: 0
    pub channel_to_analyze: i32,

    /// Sample rate of the audio read from the patch.
    ///
    /// Default: 48000
    pub sample_rate: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            time_window: Duration::from_millis(20),
            max_time_window: Duration::from_secs(1),
            analysis_period: Duration::from_millis(10),
            trigger_mode: crate::TriggerMode::None,
            trigger_threshold: 0.0,
            trigger_offset: 0.5,
            channel_to_analyze: 0,
            sample_rate: 48000,
        }
    }
}

/// An external audio-bus asset referenced by a default bus entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioBusAsset {
    /// Stable object id of the asset; `None` for an unloaded reference.
    pub object_id: Option<u32>,
    /// Channel count the bus renders at.
    pub channel_count: u32,
}

impl AudioBusAsset {
    /// Returns the bus key this asset resolves to, if it is loaded.
    pub fn resolve(&self) -> Option<BusKey> {
        self.object_id.map(BusKey::from_object_id)
    }
}

/// One entry of a default bus list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultBusEntry {
    /// The asset backing the bus.
    pub asset: AudioBusAsset,
    /// Display name.
    pub name: String,
}

/// Buses started when the fabric initializes.
///
/// Implemented for `Vec<DefaultBusEntry>`; hosts backed by a settings store
/// implement it directly.
pub trait DefaultBusList {
    /// Returns the configured entries in start order.
    fn entries(&self) -> Vec<DefaultBusEntry>;
}

impl DefaultBusList for Vec<DefaultBusEntry> {
    fn entries(&self) -> Vec<DefaultBusEntry> {
        self.clone()
    }
}
