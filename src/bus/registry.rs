//! The bus registry: control-side owner of every bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BusKey, BusKeyFactory};
use crate::mixer::{BusHandle, MixerDevice, RenderCommand};
use crate::patch::{BusEnd, BusWatch, Patch, PatchInput, PatchOutput};
use crate::{DefaultBusList, EventCallback, FabricConfig, FabricEvent};

/// Control-side record of a started bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBus {
    /// The bus key.
    pub key: BusKey,
    /// Display name given at start.
    pub name: String,
    /// Channel count the bus renders at.
    pub channel_count: u32,
    /// `true` for buses started on demand by a consumer rather than by
    /// configuration.
    pub is_automatic: bool,
}

/// A start/stop request issued off the control thread.
#[derive(Debug)]
enum ControlCommand {
    Start {
        key: BusKey,
        name: String,
        channel_count: u32,
        is_automatic: bool,
    },
    Stop {
        key: BusKey,
    },
}

#[derive(Default)]
struct ControlState {
    active: HashMap<BusKey, ActiveBus>,
    watches: HashMap<BusKey, Arc<BusWatch>>,
    /// Ends created while no device was attached.
    parked: Vec<(BusKey, BusEnd)>,
    /// Resolved default buses, started again on every device attach.
    defaults: Vec<ActiveBus>,
    device: Option<Arc<dyn MixerDevice>>,
}

impl ControlState {
    fn watch(&mut self, key: BusKey) -> Arc<BusWatch> {
        self.watches.entry(key).or_default().clone()
    }
}

/// Owns every bus and routes patches to the render device.
///
/// The registry is created on the control thread and shared via `Arc` with
/// everything that creates patches. Calls from the control thread are applied
/// immediately; [`start`](Self::start) and [`stop`](Self::stop) issued from
/// any other thread are queued and applied by the next [`pump`](Self::pump).
///
/// Nothing here fails loudly. Without a device the registry keeps its
/// bookkeeping and parks patch ends until [`attach_device`](Self::attach_device);
/// a device that refuses a patch yields an invalid patch that carries silence.
///
/// # Example
///
/// ```
/// use audio_patchbay::{software_mixer, BusKey, BusRegistry, FabricConfig, MixerConfig};
///
/// let registry = BusRegistry::new(FabricConfig::default());
/// let (mixer, mut renderer) = software_mixer(MixerConfig::default());
/// registry.attach_device(mixer);
///
/// let key = BusKey::from_object_id(1);
/// registry.start(key, "Reverb", 2, false);
///
/// let mut send = registry.add_patch_input(key, 1024, 2, 1.0);
/// let mut receive = registry.add_patch_output(key, 1024, 2, 1.0);
///
/// send.push(&[0.5; 1024]);
/// renderer.process_block();
///
/// let mut out = [0.0; 1024];
/// assert_eq!(receive.pop(&mut out, false), 1024);
/// assert_eq!(out[0], 0.5);
/// ```
pub struct BusRegistry {
    config: FabricConfig,
    control_thread: ThreadId,
    state: Mutex<ControlState>,
    keys: BusKeyFactory,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    control_rx: Mutex<mpsc::UnboundedReceiver<ControlCommand>>,
    event_callback: Mutex<Option<EventCallback>>,
}

impl BusRegistry {
    /// Creates a registry whose control thread is the calling thread.
    pub fn new(config: FabricConfig) -> Arc<Self> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            control_thread: std::thread::current().id(),
            state: Mutex::new(ControlState::default()),
            keys: BusKeyFactory::new(),
            control_tx,
            control_rx: Mutex::new(control_rx),
            event_callback: Mutex::new(None),
        })
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// Sets the callback receiving [`FabricEvent`]s.
    pub fn on_event(&self, callback: EventCallback) {
        *self.event_callback.lock() = Some(callback);
    }

    /// Returns `true` when called from the thread that created the registry.
    pub fn is_control_thread(&self) -> bool {
        std::thread::current().id() == self.control_thread
    }

    /// Starts a bus, or updates its channel count if it is already active.
    ///
    /// A duplicate start with the same channel count is a no-op. A start with
    /// a different channel count marks every patch already bound to the bus
    /// stale.
    pub fn start(
        &self,
        key: BusKey,
        name: impl Into<String>,
        channel_count: u32,
        is_automatic: bool,
    ) {
        if !key.is_valid() {
            tracing::warn!("ignoring start for invalid bus key");
            return;
        }
        let name = name.into();
        if self.is_control_thread() {
            self.apply_start(key, name, channel_count, is_automatic);
        } else {
            self.defer(ControlCommand::Start {
                key,
                name,
                channel_count,
                is_automatic,
            });
        }
    }

    /// Stops a bus. Unknown keys are ignored.
    ///
    /// Every patch bound to the bus is stale once this returns (on the control
    /// thread) or once the next [`pump`](Self::pump) applies it.
    pub fn stop(&self, key: BusKey) {
        if self.is_control_thread() {
            self.apply_stop(key);
        } else {
            self.defer(ControlCommand::Stop { key });
        }
    }

    /// Returns `true` if the bus is active.
    ///
    /// On the control thread this reads the control map. Other threads read the
    /// flag published by the renderer, so a bus counts as active there once it
    /// is actually being mixed. Contention on the registry reads as inactive.
    pub fn is_active(&self, key: &BusKey) -> bool {
        if self.is_control_thread() {
            return self.state.lock().active.contains_key(key);
        }
        self.state
            .try_lock()
            .and_then(|state| state.watches.get(key).map(|watch| watch.is_rendering()))
            .unwrap_or(false)
    }

    /// Creates a patch that sends audio into the bus.
    ///
    /// The bus sums the patch into its mix. On failure an invalid patch is
    /// returned whose pushes are no-ops.
    pub fn add_patch_input(
        &self,
        key: BusKey,
        frames: u32,
        channels: u32,
        gain: f32,
    ) -> PatchInput {
        let (input, output) = self.create_patch(key, frames, channels, gain);
        self.attach(key, BusEnd::Output(output));
        input
    }

    /// Creates a patch that receives the bus mix.
    ///
    /// On failure an invalid patch is returned that always reads zero samples.
    /// The patch reads zero samples until the bus is active.
    pub fn add_patch_output(
        &self,
        key: BusKey,
        frames: u32,
        channels: u32,
        gain: f32,
    ) -> PatchOutput {
        let (input, output) = self.create_patch(key, frames, channels, gain);
        self.attach(key, BusEnd::Input(input));
        output
    }

    /// Attaches an already created bus-side end to a bus.
    ///
    /// The end is bound to the bus so it goes stale when the bus stops. With
    /// no device attached the end is parked until one is.
    pub fn attach(&self, key: BusKey, end: BusEnd) {
        if !key.is_valid() {
            tracing::warn!("dropping patch end for invalid bus key");
            return;
        }

        let device = {
            let mut state = self.state.lock();
            end.bind(state.watch(key));
            match state.device.clone() {
                Some(device) => device,
                None if state.parked.len() < self.config.max_parked_ends => {
                    tracing::debug!(%key, "no device attached, parking patch end");
                    state.parked.push((key, end));
                    return;
                }
                None => {
                    tracing::warn!(
                        %key,
                        limit = self.config.max_parked_ends,
                        "parked end limit reached, dropping patch end"
                    );
                    return;
                }
            }
        };

        self.dispatch(device.as_ref(), key, RenderCommand::Attach { key, end });
    }

    /// Returns the record of an active bus.
    pub fn get_audio_bus(&self, key: &BusKey) -> Option<ActiveBus> {
        self.state.lock().active.get(key).cloned()
    }

    /// Returns every active bus, ordered by key.
    pub fn active_buses(&self) -> Vec<ActiveBus> {
        let mut buses: Vec<ActiveBus> = self.state.lock().active.values().cloned().collect();
        buses.sort_by_key(|bus| bus.key);
        buses
    }

    /// Allocates a fresh instance-identified key.
    pub fn new_instance_key(&self) -> BusKey {
        self.keys.next_key()
    }

    /// Starts every configured default bus.
    ///
    /// Entries whose asset does not resolve are skipped with a warning. The
    /// resolved list is kept, and the buses are started again whenever a
    /// device is attached after a detach.
    pub fn initialize(&self, defaults: &dyn DefaultBusList) {
        let mut resolved = Vec::new();
        for entry in defaults.entries() {
            match entry.asset.resolve() {
                Some(key) => resolved.push(ActiveBus {
                    key,
                    name: entry.name,
                    channel_count: entry.asset.channel_count,
                    is_automatic: false,
                }),
                None => tracing::warn!(name = %entry.name, "default bus asset did not resolve"),
            }
        }

        self.state.lock().defaults = resolved.clone();
        self.start_defaults(resolved);
    }

    /// Stops every tracked bus and forgets the default list.
    pub fn teardown(&self) {
        let keys: Vec<BusKey> = {
            let mut state = self.state.lock();
            state.defaults.clear();
            state.active.keys().copied().collect()
        };
        tracing::debug!(count = keys.len(), "tearing down buses");
        for key in keys {
            self.stop(key);
        }
    }

    /// Attaches a render device, replacing any current one.
    ///
    /// Every active bus is started on the device and parked ends are handed
    /// over.
    pub fn attach_device(&self, device: Arc<dyn MixerDevice>) {
        if self.has_device() {
            self.detach_device();
        }

        let (handles, defaults, parked) = {
            let mut state = self.state.lock();
            state.device = Some(device.clone());
            let buses: Vec<(BusKey, u32)> = state
                .active
                .values()
                .map(|bus| (bus.key, bus.channel_count))
                .collect();
            let handles: Vec<BusHandle> = buses
                .into_iter()
                .map(|(key, channels)| BusHandle::new(key, channels, state.watch(key)))
                .collect();
            let defaults: Vec<ActiveBus> = state
                .defaults
                .iter()
                .filter(|bus| !state.active.contains_key(&bus.key))
                .cloned()
                .collect();
            (handles, defaults, std::mem::take(&mut state.parked))
        };

        tracing::info!(
            buses = handles.len() + defaults.len(),
            parked_ends = parked.len(),
            "render device attached"
        );

        for handle in handles {
            let key = handle.key();
            self.dispatch(device.as_ref(), key, RenderCommand::StartBus { handle });
        }
        self.start_defaults(defaults);
        let parked_ends = parked.len();
        for (key, end) in parked {
            self.dispatch(device.as_ref(), key, RenderCommand::Attach { key, end });
        }

        self.emit(FabricEvent::DeviceAttached { parked_ends });
    }

    /// Stops every bus and releases the render device.
    ///
    /// Patches bound before this call are stale afterwards; consumers
    /// reconnect once a device is attached again.
    pub fn detach_device(&self) {
        let keys: Vec<BusKey> = self.state.lock().active.keys().copied().collect();
        for key in keys {
            self.apply_stop(key);
        }

        let device = self.state.lock().device.take();
        if let Some(device) = device {
            device.reclaim_retired();
            tracing::info!("render device detached");
            self.emit(FabricEvent::DeviceDetached);
        }
    }

    fn start_defaults(&self, defaults: Vec<ActiveBus>) {
        for bus in defaults {
            self.start(bus.key, bus.name, bus.channel_count, false);
        }
    }

    /// Returns `true` if a render device is attached.
    pub fn has_device(&self) -> bool {
        self.state.lock().device.is_some()
    }

    /// Returns the attached render device.
    pub fn device(&self) -> Option<Arc<dyn MixerDevice>> {
        self.state.lock().device.clone()
    }

    /// Applies queued start/stop requests and reclaims resources the render
    /// thread released.
    ///
    /// Call periodically from the control thread. Returns the number of
    /// requests applied.
    pub fn pump(&self) -> usize {
        if !self.is_control_thread() {
            tracing::warn!("pump called off the control thread");
        }

        let mut applied = 0;
        loop {
            let command = self.control_rx.lock().try_recv();
            let Ok(command) = command else { break };
            match command {
                ControlCommand::Start {
                    key,
                    name,
                    channel_count,
                    is_automatic,
                } => self.apply_start(key, name, channel_count, is_automatic),
                ControlCommand::Stop { key } => self.apply_stop(key),
            }
            applied += 1;
        }

        if let Some(device) = self.device() {
            let reclaimed = device.reclaim_retired();
            if reclaimed > 0 {
                tracing::trace!(reclaimed, "reclaimed render resources");
            }
        }
        applied
    }

    fn defer(&self, command: ControlCommand) {
        tracing::trace!(?command, "deferring to control thread");
        // The receiver lives as long as the registry.
        let _ = self.control_tx.send(command);
    }

    fn apply_start(&self, key: BusKey, name: String, channel_count: u32, is_automatic: bool) {
        let mut events = Vec::new();
        let start = {
            let mut state = self.state.lock();
            let watch = state.watch(key);
            match state.active.get_mut(&key) {
                Some(bus) if bus.channel_count == channel_count => {
                    tracing::debug!(%key, "bus already active");
                    return;
                }
                Some(bus) => {
                    tracing::debug!(
                        %key,
                        previous = bus.channel_count,
                        current = channel_count,
                        "bus channel count changed"
                    );
                    events.push(FabricEvent::ChannelCountChanged {
                        key,
                        previous: bus.channel_count,
                        current: channel_count,
                    });
                    bus.channel_count = channel_count;
                    watch.invalidate();
                }
                None => {
                    tracing::debug!(%key, %name, channel_count, is_automatic, "starting bus");
                    state.active.insert(
                        key,
                        ActiveBus {
                            key,
                            name,
                            channel_count,
                            is_automatic,
                        },
                    );
                }
            }
            watch.set_active(true, channel_count);
            state
                .device
                .clone()
                .map(|device| (device, BusHandle::new(key, channel_count, watch)))
        };

        if let Some((device, handle)) = start {
            self.dispatch(device.as_ref(), key, RenderCommand::StartBus { handle });
        }
        events.push(FabricEvent::BusStarted { key, channel_count });
        for event in events {
            self.emit(event);
        }
    }

    fn apply_stop(&self, key: BusKey) {
        let device = {
            let mut state = self.state.lock();
            let Some(bus) = state.active.remove(&key) else {
                tracing::debug!(%key, "stop for inactive bus ignored");
                return;
            };
            if let Some(watch) = state.watches.get(&key) {
                watch.invalidate();
                watch.set_active(false, bus.channel_count);
            }
            state.parked.retain(|(parked_key, _)| *parked_key != key);
            tracing::debug!(%key, "stopped bus");
            state.device.clone()
        };

        if let Some(device) = device {
            self.dispatch(device.as_ref(), key, RenderCommand::StopBus { key });
        }
        self.emit(FabricEvent::BusStopped { key });
    }

    fn create_patch(
        &self,
        key: BusKey,
        frames: u32,
        channels: u32,
        gain: f32,
    ) -> (PatchInput, PatchOutput) {
        if !key.is_valid() {
            return Patch::invalid(channels);
        }
        let Some(device) = self.device() else {
            return Patch::create(frames, channels, gain);
        };
        match device.create_patch(frames, channels, gain) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(%key, error = %e, "device refused patch, handing out silence");
                self.emit(FabricEvent::PatchCreationFailed {
                    key,
                    reason: e.to_string(),
                });
                Patch::invalid(channels)
            }
        }
    }

    fn dispatch(&self, device: &dyn MixerDevice, key: BusKey, command: RenderCommand) {
        if let Err(e) = device.run_on_render_thread(command) {
            tracing::warn!(%key, error = %e, "render command dropped");
            self.emit(FabricEvent::CommandDropped {
                key,
                reason: e.to_string(),
            });
        }
    }

    pub(crate) fn emit(&self, event: FabricEvent) {
        let callback = self.event_callback.lock().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

impl std::fmt::Debug for BusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BusRegistry")
            .field("active", &state.active.len())
            .field("parked", &state.parked.len())
            .field("has_device", &state.device.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event_callback, software_mixer, AudioBusAsset, DefaultBusEntry, MixerConfig};

    fn recording_registry() -> (Arc<BusRegistry>, Arc<Mutex<Vec<FabricEvent>>>) {
        let registry = BusRegistry::new(FabricConfig::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        registry.on_event(event_callback(move |event| sink.lock().push(event)));
        (registry, events)
    }

    fn started_count(events: &Mutex<Vec<FabricEvent>>) -> usize {
        events
            .lock()
            .iter()
            .filter(|event| matches!(event, FabricEvent::BusStarted { .. }))
            .count()
    }

    #[test]
    fn test_start_is_idempotent() {
        let (registry, events) = recording_registry();
        let key = BusKey::from_object_id(1);

        registry.start(key, "Reverb", 2, false);
        registry.start(key, "Reverb", 2, false);

        assert_eq!(registry.active_buses().len(), 1);
        assert_eq!(started_count(&events), 1);
        assert!(registry.is_active(&key));
    }

    #[test]
    fn test_stop_unknown_is_noop() {
        let (registry, events) = recording_registry();
        registry.stop(BusKey::from_object_id(99));

        assert!(registry.active_buses().is_empty());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_stop_marks_patches_stale() {
        let registry = BusRegistry::new(FabricConfig::default());
        let key = BusKey::from_object_id(2);
        registry.start(key, "Bus", 2, false);

        let output = registry.add_patch_output(key, 64, 2, 1.0);
        assert!(!output.is_stale());

        registry.stop(key);
        assert!(output.is_stale());
        assert!(!registry.is_active(&key));
    }

    #[test]
    fn test_channel_change_marks_patches_stale() {
        let (registry, events) = recording_registry();
        let key = BusKey::from_object_id(3);
        registry.start(key, "Bus", 2, false);
        let output = registry.add_patch_output(key, 64, 2, 1.0);

        registry.start(key, "Bus", 6, false);

        assert!(output.is_stale());
        assert_eq!(
            registry.get_audio_bus(&key).map(|bus| bus.channel_count),
            Some(6)
        );
        assert!(events.lock().iter().any(|event| matches!(
            event,
            FabricEvent::ChannelCountChanged { previous: 2, current: 6, .. }
        )));
    }

    #[test]
    fn test_off_thread_start_applied_on_pump() {
        let registry = BusRegistry::new(FabricConfig::default());
        let key = BusKey::from_object_id(4);

        let remote = registry.clone();
        std::thread::spawn(move || {
            assert!(!remote.is_control_thread());
            remote.start(key, "Deferred", 2, true);
        })
        .join()
        .unwrap();

        assert!(!registry.is_active(&key));
        assert_eq!(registry.pump(), 1);
        assert!(registry.is_active(&key));
        assert!(registry.get_audio_bus(&key).is_some_and(|bus| bus.is_automatic));
    }

    #[test]
    fn test_off_thread_is_active_follows_renderer() {
        let registry = BusRegistry::new(FabricConfig::default());
        let (mixer, mut renderer) = software_mixer(MixerConfig::default());
        registry.attach_device(mixer);

        let key = BusKey::from_object_id(5);
        registry.start(key, "Bus", 2, false);

        let remote = registry.clone();
        let before = std::thread::spawn(move || remote.is_active(&key)).join().unwrap();
        assert!(!before);

        renderer.process_block();
        let remote = registry.clone();
        let after = std::thread::spawn(move || remote.is_active(&key)).join().unwrap();
        assert!(after);
    }

    #[test]
    fn test_ends_parked_until_device_attached() {
        let (registry, events) = recording_registry();
        let key = BusKey::from_object_id(6);
        registry.start(key, "Bus", 1, false);

        let mut send = registry.add_patch_input(key, 16, 1, 1.0);
        let mut receive = registry.add_patch_output(key, 16, 1, 1.0);

        let (mixer, mut renderer) = software_mixer(
            MixerConfig::default()
                .with_frames_per_block(4)
                .with_channel_count(1),
        );
        registry.attach_device(mixer);
        assert!(events
            .lock()
            .iter()
            .any(|event| matches!(event, FabricEvent::DeviceAttached { parked_ends: 2 })));

        send.push(&[0.5; 4]);
        renderer.process_block();

        let mut out = [0.0; 4];
        assert_eq!(receive.pop(&mut out, false), 4);
        assert_eq!(out, [0.5; 4]);
    }

    #[test]
    fn test_refused_patch_is_invalid() {
        let (registry, events) = recording_registry();
        let (mixer, _renderer) = software_mixer(MixerConfig::default());
        registry.attach_device(mixer);

        let output = registry.add_patch_output(BusKey::from_object_id(7), 0, 2, 1.0);
        assert!(!output.is_valid());
        assert!(events
            .lock()
            .iter()
            .any(|event| matches!(event, FabricEvent::PatchCreationFailed { .. })));
    }

    #[test]
    fn test_invalid_key_yields_invalid_patch() {
        let registry = BusRegistry::new(FabricConfig::default());
        let output = registry.add_patch_output(BusKey::default(), 16, 2, 1.0);
        assert!(!output.is_valid());

        registry.start(BusKey::default(), "Nothing", 2, false);
        assert!(registry.active_buses().is_empty());
    }

    #[test]
    fn test_initialize_and_teardown() {
        let registry = BusRegistry::new(FabricConfig::default());
        let defaults = vec![
            DefaultBusEntry {
                asset: AudioBusAsset {
                    object_id: Some(10),
                    channel_count: 2,
                },
                name: "Music".into(),
            },
            DefaultBusEntry {
                asset: AudioBusAsset {
                    object_id: None,
                    channel_count: 2,
                },
                name: "Unloaded".into(),
            },
            DefaultBusEntry {
                asset: AudioBusAsset {
                    object_id: Some(11),
                    channel_count: 1,
                },
                name: "Voice".into(),
            },
        ];

        registry.initialize(&defaults);
        let buses = registry.active_buses();
        assert_eq!(buses.len(), 2);
        assert!(buses.iter().all(|bus| !bus.is_automatic));
        assert_eq!(buses[0].name, "Music");

        registry.teardown();
        assert!(registry.active_buses().is_empty());
    }

    #[test]
    fn test_detach_device_stops_buses() {
        let (registry, events) = recording_registry();
        let (mixer, _renderer) = software_mixer(MixerConfig::default());
        registry.attach_device(mixer);

        let key = BusKey::from_object_id(12);
        registry.start(key, "Bus", 2, false);
        let output = registry.add_patch_output(key, 64, 2, 1.0);

        registry.detach_device();

        assert!(!registry.has_device());
        assert!(!registry.is_active(&key));
        assert!(output.is_stale());
        assert!(events
            .lock()
            .iter()
            .any(|event| matches!(event, FabricEvent::DeviceDetached)));
    }

    #[test]
    fn test_default_buses_survive_device_cycle() {
        let registry = BusRegistry::new(FabricConfig::default());
        let (mixer, _renderer) = software_mixer(MixerConfig::default());
        registry.attach_device(mixer);

        let music = BusKey::from_object_id(10);
        registry.initialize(&vec![DefaultBusEntry {
            asset: AudioBusAsset {
                object_id: Some(10),
                channel_count: 2,
            },
            name: "Music".into(),
        }]);
        let adhoc = BusKey::from_object_id(13);
        registry.start(adhoc, "Ad hoc", 2, false);

        registry.detach_device();
        assert!(!registry.is_active(&music));

        let (mixer, _renderer) = software_mixer(MixerConfig::default());
        registry.attach_device(mixer.clone());
        assert!(registry.is_active(&music));
        assert!(!registry.is_active(&adhoc));
        assert!(mixer.find_bus_by_key(&music).is_some());
        assert_eq!(
            registry.get_audio_bus(&music).map(|bus| bus.name),
            Some("Music".to_string())
        );

        registry.teardown();
        registry.detach_device();
        let (mixer, _renderer) = software_mixer(MixerConfig::default());
        registry.attach_device(mixer);
        assert!(!registry.is_active(&music));
    }

    #[test]
    fn test_new_instance_keys_unique() {
        let registry = BusRegistry::new(FabricConfig::default());
        let a = registry.new_instance_key();
        let b = registry.new_instance_key();
        assert_ne!(a, b);
        assert!(a.instance_id().is_some());
    }
}
