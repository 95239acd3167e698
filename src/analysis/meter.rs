//! Peak and RMS level metering.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::rack::{connect_provider, RackUnit};
use super::window::{TriggeredWindowProvider, WindowView};
use crate::bus::{BusKey, BusRegistry};
use crate::{PatchbayError, ProviderConfig, TriggerMode};

/// Level reported for digital silence and empty blocks.
pub const SILENCE_FLOOR_DB: f32 = -96.0;

/// Converts a linear level relative to full scale into dB, floored at
/// [`SILENCE_FLOOR_DB`].
pub fn level_to_db(level: f32) -> f32 {
    if level > 0.0 {
        (20.0 * level.log10()).max(SILENCE_FLOOR_DB)
    } else {
        SILENCE_FLOOR_DB
    }
}

/// Per-channel levels measured over one window.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReading {
    /// Peak level per channel, in dBFS.
    pub peak_db: Vec<f32>,
    /// RMS level per channel, in dBFS.
    pub rms_db: Vec<f32>,
    /// Samples at or beyond full scale, across all channels.
    pub clipped_samples: u32,
    /// Frames measured.
    pub frames: usize,
}

impl MeterReading {
    /// Measures a window view.
    pub fn from_view(view: &WindowView) -> Self {
        let channels = view.channels.max(1) as usize;
        let frames = view.frames();

        let mut peak = vec![0.0f32; channels];
        let mut sum_squares = vec![0.0f64; channels];
        let mut clipped = 0;
        for frame in view.samples.chunks_exact(channels) {
            for (channel, &sample) in frame.iter().enumerate() {
                let abs = sample.abs();
                peak[channel] = peak[channel].max(abs);
                sum_squares[channel] += f64::from(sample).powi(2);
                if abs >= 1.0 {
                    clipped += 1;
                }
            }
        }

        let rms_db = sum_squares
            .iter()
            .map(|&sum| {
                if frames == 0 {
                    return SILENCE_FLOOR_DB;
                }
                level_to_db((sum / frames as f64).sqrt() as f32)
            })
            .collect();

        Self {
            peak_db: peak.into_iter().map(level_to_db).collect(),
            rms_db,
            clipped_samples: clipped,
            frames,
        }
    }
}

/// A rack unit that meters its bus.
///
/// Runs a free-running [`TriggeredWindowProvider`] and keeps the reading of
/// the most recent window.
pub struct MeterUnit {
    name: String,
    provider: Arc<TriggeredWindowProvider>,
    reading: Arc<Mutex<Option<MeterReading>>>,
}

impl MeterUnit {
    /// Creates a meter integrating over `window`.
    pub fn new(name: impl Into<String>, window: Duration) -> Self {
        let config = ProviderConfig {
            time_window: window,
            analysis_period: window,
            trigger_mode: TriggerMode::None,
            ..Default::default()
        };
        let provider = TriggeredWindowProvider::new(None, config);

        let reading = Arc::new(Mutex::new(None));
        let slot = reading.clone();
        provider.on_view_generated(Arc::new(move |view: &WindowView| {
            *slot.lock() = Some(MeterReading::from_view(view));
        }));

        Self {
            name: name.into(),
            provider,
            reading,
        }
    }

    /// Returns the latest reading, if any window was measured yet.
    pub fn reading(&self) -> Option<MeterReading> {
        self.reading.lock().clone()
    }

    /// Returns the provider feeding the meter.
    pub fn provider(&self) -> &Arc<TriggeredWindowProvider> {
        &self.provider
    }
}

impl RackUnit for MeterUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_audio_bus_info(&self, registry: &Arc<BusRegistry>, key: BusKey, channel_count: u32) {
        *self.reading.lock() = None;
        connect_provider(&self.provider, registry, key, channel_count);
    }

    fn needs_reconnect(&self) -> bool {
        self.provider.needs_patch()
    }

    fn start_processing(&self) -> Result<(), PatchbayError> {
        self.provider.start_processing()
    }

    fn stop_processing(&self) {
        self.provider.stop_processing();
    }
}

impl std::fmt::Debug for MeterUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterUnit")
            .field("name", &self.name)
            .field("reading", &self.reading.lock())
            .finish_non_exhaustive()
    }
}
