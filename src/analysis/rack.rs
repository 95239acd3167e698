//! Analyzer rack: a private bus feeding pluggable analysis units.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::trigger::TriggerState;
use super::window::{TriggeredWindowProvider, ViewCallback, WindowView};
use crate::bus::{BusKey, BusRegistry};
use crate::patch::PatchInput;
use crate::{PatchbayError, ProviderConfig, TriggerMode};

/// An analysis unit hosted by an [`AnalyzerRack`].
///
/// Implementations must be thread-safe. `set_audio_bus_info` may be called
/// again whenever the rack reconnects, and must replace any earlier patch.
pub trait RackUnit: Send + Sync {
    /// Display name of the unit.
    fn name(&self) -> &str;

    /// Connects the unit to the bus it analyses.
    fn set_audio_bus_info(&self, registry: &Arc<BusRegistry>, key: BusKey, channel_count: u32);

    /// Returns `true` when the unit has no live patch to its bus.
    fn needs_reconnect(&self) -> bool;

    /// Starts periodic analysis.
    fn start_processing(&self) -> Result<(), PatchbayError>;

    /// Stops periodic analysis.
    fn stop_processing(&self);
}

/// Points `provider` at a fresh receive patch on `key`.
///
/// The patch holds at least 100ms of audio at the device rate so a provider
/// reading on its analysis period never starves the bus.
pub(crate) fn connect_provider(
    provider: &TriggeredWindowProvider,
    registry: &Arc<BusRegistry>,
    key: BusKey,
    channel_count: u32,
) {
    if let Some(device) = registry.device() {
        provider.set_sample_rate(device.sample_rate());
    }
    let frames = registry
        .config()
        .default_patch_frames
        .max(provider.sample_rate() / 10);
    let output = registry.add_patch_output(key, frames, channel_count, 1.0);
    provider.set_patch(Some(output));
}

/// Triggered waveform display unit.
pub struct OscilloscopeUnit {
    name: String,
    provider: Arc<TriggeredWindowProvider>,
}

impl OscilloscopeUnit {
    /// Creates an oscilloscope with the given window and trigger settings.
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            provider: TriggeredWindowProvider::new(None, config),
        }
    }

    /// Sets the callback receiving each display window.
    pub fn on_view_generated(&self, callback: ViewCallback) {
        self.provider.on_view_generated(callback);
    }

    /// Returns the current display window.
    pub fn current_view(&self) -> Option<WindowView> {
        self.provider.current_view()
    }

    /// Returns the trigger state.
    pub fn trigger_state(&self) -> TriggerState {
        self.provider.trigger_state()
    }

    /// Returns the underlying provider for direct configuration.
    pub fn provider(&self) -> &Arc<TriggeredWindowProvider> {
        &self.provider
    }
}

impl RackUnit for OscilloscopeUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_audio_bus_info(&self, registry: &Arc<BusRegistry>, key: BusKey, channel_count: u32) {
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

impl std::fmt::Debug for OscilloscopeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscilloscopeUnit")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .finish()
    }
}

/// Stereo phase display unit.
///
/// Always reads two channels with no trigger; each frame is a point
/// `(left, right)`.
pub struct VectorscopeUnit {
    name: String,
    provider: Arc<TriggeredWindowProvider>,
}

impl VectorscopeUnit {
    /// Creates a vectorscope showing `config.time_window` of audio.
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        let config = ProviderConfig {
            trigger_mode: TriggerMode::None,
            ..config
        };
        Self {
            name: name.into(),
            provider: TriggeredWindowProvider::new(None, config),
        }
    }

    /// Returns the current window as `(left, right)` points.
    pub fn points(&self) -> Vec<(f32, f32)> {
        let Some(view) = self.provider.current_view() else {
            return Vec::new();
        };
        if view.channels < 2 {
            return view.samples.iter().map(|&s| (s, s)).collect();
        }
        view.samples
            .chunks_exact(view.channels as usize)
            .map(|frame| (frame[0], frame[1]))
            .collect()
    }

    /// Returns the underlying provider.
    pub fn provider(&self) -> &Arc<TriggeredWindowProvider> {
        &self.provider
    }
}

impl RackUnit for VectorscopeUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_audio_bus_info(&self, registry: &Arc<BusRegistry>, key: BusKey, _channel_count: u32) {
        connect_provider(&self.provider, registry, key, 2);
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

impl std::fmt::Debug for VectorscopeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorscopeUnit")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Hosts analysis units on a private, automatically started bus.
///
/// The rack allocates an instance key and starts a bus under it. Producers
/// send into the bus with [`send`](Self::send); each unit receives the bus
/// mix through its own patch.
///
/// # Example
///
/// ```
/// use audio_patchbay::{
///     software_mixer, AnalyzerRack, BusRegistry, FabricConfig, MeterUnit, MixerConfig,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let registry = BusRegistry::new(FabricConfig::default());
/// let (mixer, mut renderer) = software_mixer(MixerConfig::default());
/// registry.attach_device(mixer);
///
/// let rack = AnalyzerRack::new(registry.clone(), 2);
/// let meter = Arc::new(MeterUnit::new("level", Duration::from_millis(10)));
/// rack.add_unit(meter.clone()).unwrap();
///
/// let mut send = rack.send(1024, 1.0);
/// send.push(&[0.5; 1024]);
/// renderer.process_block();
/// ```
pub struct AnalyzerRack {
    registry: Arc<BusRegistry>,
    key: BusKey,
    channel_count: u32,
    units: Mutex<Vec<Arc<dyn RackUnit>>>,
    processing: AtomicBool,
    destroyed: AtomicBool,
}

impl AnalyzerRack {
    /// Creates a rack with its own `channel_count`-channel bus.
    pub fn new(registry: Arc<BusRegistry>, channel_count: u32) -> Self {
        let key = registry.new_instance_key();
        registry.start(key, "Analyzer Rack", channel_count, true);
        tracing::debug!(%key, channel_count, "analyzer rack created");
        Self {
            registry,
            key,
            channel_count,
            units: Mutex::new(Vec::new()),
            processing: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Returns the key of the rack's bus.
    pub fn audio_bus(&self) -> BusKey {
        self.key
    }

    /// Returns the channel count of the rack's bus.
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Creates a patch sending into the rack's bus.
    pub fn send(&self, frames: u32, gain: f32) -> PatchInput {
        self.registry
            .add_patch_input(self.key, frames, self.channel_count, gain)
    }

    /// Connects a unit to the rack's bus and hosts it.
    ///
    /// If the rack is processing the unit starts right away.
    pub fn add_unit(&self, unit: Arc<dyn RackUnit>) -> Result<(), PatchbayError> {
        unit.set_audio_bus_info(&self.registry, self.key, self.channel_count);
        if self.is_processing() {
            unit.start_processing()?;
        }
        tracing::debug!(key = %self.key, unit = unit.name(), "rack unit added");
        self.units.lock().push(unit);
        Ok(())
    }

    /// Returns the hosted units in insertion order.
    pub fn units(&self) -> Vec<Arc<dyn RackUnit>> {
        self.units.lock().clone()
    }

    /// Starts every unit.
    ///
    /// # Errors
    ///
    /// Returns the first unit error; units started before it keep running.
    pub fn start_processing(&self) -> Result<(), PatchbayError> {
        for unit in self.units() {
            unit.start_processing()?;
        }
        self.processing.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops every unit.
    pub fn stop_processing(&self) {
        self.processing.store(false, Ordering::Release);
        for unit in self.units() {
            unit.stop_processing();
        }
    }

    /// Returns `true` between start and stop.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Restarts the rack's bus if needed and reconnects units whose patch
    /// went stale, as happens across a device detach and attach.
    ///
    /// Returns the number of units reconnected.
    pub fn validate(&self) -> usize {
        if self.destroyed.load(Ordering::Acquire) {
            return 0;
        }
        self.registry
            .start(self.key, "Analyzer Rack", self.channel_count, true);

        let mut reconnected = 0;
        for unit in self.units() {
            if unit.needs_reconnect() {
                unit.set_audio_bus_info(&self.registry, self.key, self.channel_count);
                reconnected += 1;
            }
        }
        if reconnected > 0 {
            tracing::debug!(key = %self.key, reconnected, "rack units reconnected");
        }
        reconnected
    }

    /// Stops processing, drops every unit and stops the rack's bus.
    pub fn destroy_analyzers(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_processing();
        self.units.lock().clear();
        self.registry.stop(self.key);
        tracing::debug!(key = %self.key, "analyzer rack destroyed");
    }
}

impl Drop for AnalyzerRack {
    fn drop(&mut self) {
        self.destroy_analyzers();
    }
}

impl std::fmt::Debug for AnalyzerRack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRack")
            .field("key", &self.key)
            .field("channel_count", &self.channel_count)
            .field("units", &self.units.lock().len())
            .field("processing", &self.is_processing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{software_mixer, FabricConfig, MeterUnit, MixerConfig, TriggerMode};
    use std::time::Duration;

    fn rack_with_mixer() -> (Arc<BusRegistry>, crate::BusRenderer, AnalyzerRack) {
        let registry = BusRegistry::new(FabricConfig::default());
        let (mixer, renderer) = software_mixer(
            MixerConfig::default()
                .with_frames_per_block(64)
                .with_channel_count(2)
                .with_sample_rate(1000),
        );
        registry.attach_device(mixer);
        let rack = AnalyzerRack::new(registry.clone(), 2);
        (registry, renderer, rack)
    }

    #[test]
    fn test_rack_starts_automatic_instance_bus() {
        let (registry, _renderer, rack) = rack_with_mixer();
        let bus = registry.get_audio_bus(&rack.audio_bus()).unwrap();

        assert!(rack.audio_bus().instance_id().is_some());
        assert!(bus.is_automatic);
        assert_eq!(bus.channel_count, 2);
        assert_eq!(bus.name, "Analyzer Rack");
    }

    #[test]
    fn test_units_receive_bus_mix() {
        let (_registry, mut renderer, rack) = rack_with_mixer();
        let meter = Arc::new(MeterUnit::new("level", Duration::from_millis(10)));
        let scope = Arc::new(OscilloscopeUnit::new(
            "scope",
            ProviderConfig {
                time_window: Duration::from_millis(8),
                trigger_mode: TriggerMode::RisingEdge,
                ..Default::default()
            },
        ));
        rack.add_unit(meter.clone()).unwrap();
        rack.add_unit(scope.clone()).unwrap();
        assert_eq!(meter.provider().sample_rate(), 1000);

        let mut send = rack.send(256, 0.5);
        send.push(&[1.0; 128]);
        renderer.process_block();

        assert!(meter.provider().tick());
        let reading = meter.reading().unwrap();
        assert!((reading.peak_db[0] - -6.0206).abs() < 0.001);

        assert!(scope.provider().tick());
        assert_eq!(scope.current_view().unwrap().frames(), 8);
    }

    #[test]
    fn test_vectorscope_points() {
        let (_registry, mut renderer, rack) = rack_with_mixer();
        let scope = Arc::new(VectorscopeUnit::new(
            "phase",
            ProviderConfig {
                time_window: Duration::from_millis(4),
                trigger_mode: TriggerMode::RisingEdge,
                ..Default::default()
            },
        ));
        rack.add_unit(scope.clone()).unwrap();
        assert_eq!(scope.provider().trigger_state().mode, TriggerMode::None);

        let mut send = rack.send(256, 1.0);
        let block: Vec<f32> = (0..64).flat_map(|_| [0.25, -0.75]).collect();
        send.push(&block);
        renderer.process_block();

        assert!(scope.provider().tick());
        assert_eq!(scope.points(), vec![(0.25, -0.75); 4]);
    }

    #[test]
    fn test_validate_reconnects_after_device_cycle() {
        let (registry, _renderer, rack) = rack_with_mixer();
        let meter = Arc::new(MeterUnit::new("level", Duration::from_millis(10)));
        rack.add_unit(meter.clone()).unwrap();
        assert!(!meter.needs_reconnect());

        registry.detach_device();
        assert!(meter.needs_reconnect());
        assert!(!registry.is_active(&rack.audio_bus()));

        let (mixer, _renderer) = software_mixer(MixerConfig::default());
        registry.attach_device(mixer);
        assert_eq!(rack.validate(), 1);
        assert!(!meter.needs_reconnect());
        assert!(registry.is_active(&rack.audio_bus()));
        assert_eq!(meter.provider().sample_rate(), 48000);
    }

    #[test]
    fn test_destroy_stops_bus() {
        let (registry, _renderer, rack) = rack_with_mixer();
        rack.add_unit(Arc::new(MeterUnit::new("level", Duration::from_millis(10))))
            .unwrap();
        let key = rack.audio_bus();

        rack.destroy_analyzers();
        assert!(rack.units().is_empty());
        assert!(!registry.is_active(&key));
        assert_eq!(rack.validate(), 0);
    }

    #[test]
    fn test_drop_stops_bus() {
        let (registry, _renderer, rack) = rack_with_mixer();
        let key = rack.audio_bus();
        drop(rack);
        assert!(!registry.is_active(&key));
    }

    #[tokio::test]
    async fn test_rack_processing_lifecycle() {
        let (_registry, _renderer, rack) = rack_with_mixer();
        let meter = Arc::new(MeterUnit::new("level", Duration::from_millis(10)));
        rack.add_unit(meter.clone()).unwrap();

        rack.start_processing().unwrap();
        assert!(rack.is_processing());
        assert!(meter.provider().is_processing());

        let late = Arc::new(MeterUnit::new("late", Duration::from_millis(10)));
        rack.add_unit(late.clone()).unwrap();
        assert!(late.provider().is_processing());

        rack.stop_processing();
        assert!(!meter.provider().is_processing());
        assert!(!late.provider().is_processing());
    }
}
