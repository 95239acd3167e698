//! Threshold-crossing trigger detection.

use std::ops::RangeInclusive;

/// Direction of the threshold crossing that fires a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// No trigger; the window free-runs on the latest audio.
    #[default]
    None,
    /// Fires where `previous < threshold <= current`.
    RisingEdge,
    /// Fires where `previous > threshold >= current`.
    FallingEdge,
}

/// Trigger configuration plus the latch that keeps a display stable.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerState {
    /// Crossing direction.
    pub mode: TriggerMode,
    /// Threshold in linear sample units.
    pub threshold: f32,
    /// Set once a crossing has been found since the last reset.
    pub has_triggered: bool,
    /// Channel analysed. Negative averages every channel; indices past the
    /// last channel clamp to it.
    pub channel_to_analyze: i32,
    /// Window length in frames.
    pub time_window_samples: u32,
    /// Analysis period in frames.
    pub analysis_period_samples: u32,
}

impl TriggerState {
    /// Clears the latch so the next window free-runs until a new crossing.
    pub fn reset(&mut self) {
        self.has_triggered = false;
    }

    /// Returns the first frame in `frames` whose value crosses the threshold
    /// in the configured direction, comparing it against the frame before.
    ///
    /// `samples` is interleaved with `channels` channels. Frame 0 has no
    /// predecessor and never matches. Always `None` for [`TriggerMode::None`].
    pub fn find_crossing(
        &self,
        samples: &[f32],
        channels: usize,
        frames: RangeInclusive<usize>,
    ) -> Option<usize> {
        if self.mode == TriggerMode::None || channels == 0 {
            return None;
        }
        let total = samples.len() / channels;

        let value = |frame: usize| -> f32 {
            let frame_samples = &samples[frame * channels..(frame + 1) * channels];
            match usize::try_from(self.channel_to_analyze) {
                Ok(channel) => frame_samples[channel.min(channels - 1)],
                Err(_) => frame_samples.iter().sum::<f32>() / channels as f32,
            }
        };

        let start = (*frames.start()).max(1);
        let end = (*frames.end()).min(total.saturating_sub(1));
        (start..=end).find(|&frame| {
            let previous = value(frame - 1);
            let current = value(frame);
            match self.mode {
                TriggerMode::RisingEdge => previous < self.threshold && self.threshold <= current,
                TriggerMode::FallingEdge => previous > self.threshold && self.threshold >= current,
                TriggerMode::None => false,
            }
        })
    }
}

impl Default for TriggerState {
    fn default() -> Self {
        Self {
            mode: TriggerMode::None,
            threshold: 0.0,
            has_triggered: false,
            channel_to_analyze: 0,
            time_window_samples: 0,
            analysis_period_samples: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(mode: TriggerMode, threshold: f32) -> TriggerState {
        TriggerState {
            mode,
            threshold,
            ..Default::default()
        }
    }

    #[test]
    fn test_rising_edge_inclusive_threshold() {
        let trigger = state(TriggerMode::RisingEdge, 0.5);
        let samples = [0.0, 0.2, 0.5, 0.9];
        assert_eq!(trigger.find_crossing(&samples, 1, 0..=3), Some(2));
    }

    #[test]
    fn test_rising_edge_ignores_falling() {
        let trigger = state(TriggerMode::RisingEdge, 0.0);
        let samples = [1.0, 0.5, -0.5, -1.0];
        assert_eq!(trigger.find_crossing(&samples, 1, 0..=3), None);
    }

    #[test]
    fn test_falling_edge() {
        let trigger = state(TriggerMode::FallingEdge, 0.0);
        let samples = [1.0, 0.5, 0.0, -1.0];
        assert_eq!(trigger.find_crossing(&samples, 1, 0..=3), Some(2));
    }

    #[test]
    fn test_sample_at_threshold_does_not_refire() {
        let trigger = state(TriggerMode::RisingEdge, 0.5);
        let samples = [0.5, 0.5, 0.5];
        assert_eq!(trigger.find_crossing(&samples, 1, 0..=2), None);
    }

    #[test]
    fn test_none_mode_never_fires() {
        let trigger = state(TriggerMode::None, 0.0);
        assert_eq!(trigger.find_crossing(&[-1.0, 1.0], 1, 0..=1), None);
    }

    #[test]
    fn test_search_range_respected() {
        let trigger = state(TriggerMode::RisingEdge, 0.0);
        let samples = [-1.0, 1.0, -1.0, 1.0];
        assert_eq!(trigger.find_crossing(&samples, 1, 2..=3), Some(3));
    }

    #[test]
    fn test_channel_selection_and_clamp() {
        // Channel 0 rises at frame 1, channel 1 at frame 2.
        let samples = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0];
        let mut trigger = state(TriggerMode::RisingEdge, 0.0);

        assert_eq!(trigger.find_crossing(&samples, 2, 0..=2), Some(1));

        trigger.channel_to_analyze = 1;
        assert_eq!(trigger.find_crossing(&samples, 2, 0..=2), Some(2));

        trigger.channel_to_analyze = 9;
        assert_eq!(trigger.find_crossing(&samples, 2, 0..=2), Some(2));
    }

    #[test]
    fn test_negative_channel_averages() {
        // Average: -1.0, 0.0, 1.0 -> crosses 0.5 at frame 2 only.
        let samples = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0];
        let mut trigger = state(TriggerMode::RisingEdge, 0.5);
        trigger.channel_to_analyze = -1;
        assert_eq!(trigger.find_crossing(&samples, 2, 0..=2), Some(2));
    }

    #[test]
    fn test_reset_clears_latch() {
        let mut trigger = state(TriggerMode::RisingEdge, 0.0);
        trigger.has_triggered = true;
        trigger.reset();
        assert!(!trigger.has_triggered);
    }
}
