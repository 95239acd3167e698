//! In-process mixer device.
//!
//! [`software_mixer`] returns two halves:
//! - [`SoftwareMixer`]: the control-side [`MixerDevice`], shared via `Arc`
//! - [`BusRenderer`]: owned by the render thread, which calls
//!   [`BusRenderer::process_block`] once per audio callback
//!
//! Commands cross to the renderer through a bounded SPSC queue; only the
//! control side serialises its pushes behind a mutex. Every
//! allocation a command needs (mix buffers, patch lists) is made on the control
//! side before the command is queued; anything the renderer releases goes back
//! through a retire queue and is dropped in [`SoftwareMixer::reclaim_retired`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{BusHandle, MixerDevice, RenderCommand};
use crate::bus::BusKey;
use crate::patch::{BusEnd, Patch, PatchInput, PatchOutput};
use crate::{MixerConfig, PatchbayError};

enum RenderMessage {
    Start(Box<RenderBus>),
    Stop(BusKey),
    Attach(BusKey, BusEnd),
}

enum Retired {
    Bus(Box<RenderBus>),
    End(BusEnd),
}

/// Render-side state of one bus.
struct RenderBus {
    handle: BusHandle,
    /// Ends the bus reads from and sums.
    readers: Vec<PatchOutput>,
    /// Ends the bus writes its mix into.
    writers: Vec<PatchInput>,
    mix: Vec<f32>,
    scratch: Vec<f32>,
}

impl RenderBus {
    fn new(handle: BusHandle, frames_per_block: u32, max_patches: usize) -> Self {
        let samples = frames_per_block as usize * handle.channel_count() as usize;
        Self {
            handle,
            readers: Vec::with_capacity(max_patches),
            writers: Vec::with_capacity(max_patches),
            mix: vec![0.0; samples],
            scratch: vec![0.0; samples],
        }
    }

    /// Attaches an end, handing it back if it cannot be rendered here.
    fn attach(&mut self, end: BusEnd) -> Result<(), BusEnd> {
        if end.channel_count() != self.handle.channel_count() {
            return Err(end);
        }
        match end {
            BusEnd::Output(output) if self.readers.len() < self.readers.capacity() => {
                self.readers.push(output);
                Ok(())
            }
            BusEnd::Input(input) if self.writers.len() < self.writers.capacity() => {
                self.writers.push(input);
                Ok(())
            }
            full => Err(full),
        }
    }

    fn render(&mut self, retired: &mut HeapProd<Retired>) {
        self.mix.fill(0.0);

        let mut i = 0;
        while i < self.readers.len() {
            let reader = &mut self.readers[i];
            let drained = !reader.has_producer() && reader.available() == 0;
            if drained || reader.is_stale() {
                let end = self.readers.swap_remove(i);
                retire(retired, Retired::End(BusEnd::Output(end)));
                continue;
            }

            let popped = reader.pop(&mut self.scratch, false);
            for (sum, sample) in self.mix.iter_mut().zip(&self.scratch[..popped]) {
                *sum += *sample;
            }
            i += 1;
        }

        let mut i = 0;
        while i < self.writers.len() {
            let writer = &mut self.writers[i];
            if !writer.is_connected() || writer.is_stale() {
                let end = self.writers.swap_remove(i);
                retire(retired, Retired::End(BusEnd::Input(end)));
                continue;
            }
            writer.push(&self.mix);
            i += 1;
        }
    }
}

fn retire(queue: &mut HeapProd<Retired>, item: Retired) {
    // Dropped in place when the control thread has stopped reclaiming.
    let _ = queue.try_push(item);
}

/// Creates a connected mixer / renderer pair.
///
/// # Example
///
/// ```
/// use audio_patchbay::{software_mixer, MixerConfig, MixerDevice};
///
/// let (mixer, mut renderer) = software_mixer(MixerConfig::default());
/// assert_eq!(mixer.output_frames_per_block(), 512);
///
/// // On the audio callback:
/// renderer.process_block();
/// ```
pub fn software_mixer(config: MixerConfig) -> (Arc<SoftwareMixer>, BusRenderer) {
    let command_capacity = config.command_capacity.max(1);
    let retire_capacity =
        command_capacity + config.max_buses * (config.max_patches_per_bus * 2 + 1);

    let (command_tx, command_rx) = HeapRb::<RenderMessage>::new(command_capacity).split();
    let (retire_tx, retire_rx) = HeapRb::<Retired>::new(retire_capacity).split();

    let renderer = BusRenderer {
        commands: command_rx,
        retired: retire_tx,
        buses: HashMap::with_capacity(config.max_buses),
        parked: Vec::with_capacity(command_capacity),
        max_buses: config.max_buses,
        frames_per_block: config.frames_per_block,
        blocks_rendered: 0,
    };

    let mixer = SoftwareMixer {
        config,
        commands: Mutex::new(command_tx),
        retired: Mutex::new(retire_rx),
        directory: Mutex::new(HashMap::new()),
    };

    (Arc::new(mixer), renderer)
}

/// Control-side half of the in-process mixer.
pub struct SoftwareMixer {
    config: MixerConfig,
    commands: Mutex<HeapProd<RenderMessage>>,
    retired: Mutex<HeapCons<Retired>>,
    directory: Mutex<HashMap<BusKey, BusHandle>>,
}

impl SoftwareMixer {
    /// Returns the configuration the mixer was created with.
    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    fn send(&self, message: RenderMessage) -> Result<(), PatchbayError> {
        self.commands
            .lock()
            .try_push(message)
            .map_err(|_| PatchbayError::CommandQueueFull {
                capacity: self.config.command_capacity,
            })
    }
}

impl MixerDevice for SoftwareMixer {
    fn output_frames_per_block(&self) -> u32 {
        self.config.frames_per_block
    }

    fn output_channel_count(&self) -> u32 {
        self.config.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn create_patch(
        &self,
        frames: u32,
        channels: u32,
        gain: f32,
    ) -> Result<(PatchInput, PatchOutput), PatchbayError> {
        if frames == 0 || channels == 0 {
            return Err(PatchbayError::patch_creation_failed(format!(
                "empty patch requested ({frames} frames x {channels} channels)"
            )));
        }
        let samples = frames as usize * channels as usize;
        if samples > self.config.max_patch_samples {
            return Err(PatchbayError::patch_creation_failed(format!(
                "{samples} samples exceeds limit of {}",
                self.config.max_patch_samples
            )));
        }
        Ok(Patch::create(frames, channels, gain))
    }

    fn run_on_render_thread(&self, command: RenderCommand) -> Result<(), PatchbayError> {
        match command {
            RenderCommand::StartBus { handle } => {
                let bus = RenderBus::new(
                    handle.clone(),
                    self.config.frames_per_block,
                    self.config.max_patches_per_bus,
                );
                self.send(RenderMessage::Start(Box::new(bus)))?;
                self.directory.lock().insert(handle.key(), handle);
            }
            RenderCommand::StopBus { key } => {
                self.send(RenderMessage::Stop(key))?;
                self.directory.lock().remove(&key);
            }
            RenderCommand::Attach { key, end } => {
                self.send(RenderMessage::Attach(key, end))?;
            }
        }
        Ok(())
    }

    fn find_bus_by_key(&self, key: &BusKey) -> Option<BusHandle> {
        self.directory.lock().get(key).cloned()
    }

    fn reclaim_retired(&self) -> usize {
        let mut retired = self.retired.lock();
        let mut count = 0;
        while let Some(item) = retired.try_pop() {
            match item {
                Retired::Bus(bus) => tracing::trace!(key = %bus.handle.key(), "reclaimed bus"),
                Retired::End(end) => {
                    tracing::trace!(channels = end.channel_count(), "reclaimed patch end");
                }
            }
            count += 1;
        }
        count
    }
}

impl std::fmt::Debug for SoftwareMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareMixer")
            .field("config", &self.config)
            .field("buses", &self.directory.lock().len())
            .finish_non_exhaustive()
    }
}

/// Render-thread half of the in-process mixer.
///
/// Owns the render mirror of every active bus. Never blocks, never allocates
/// once constructed.
pub struct BusRenderer {
    commands: HeapCons<RenderMessage>,
    retired: HeapProd<Retired>,
    buses: HashMap<BusKey, Box<RenderBus>>,
    /// Ends attached to buses that have not started yet.
    parked: Vec<(BusKey, BusEnd)>,
    max_buses: usize,
    frames_per_block: u32,
    blocks_rendered: u64,
}

impl BusRenderer {
    /// Applies queued commands, then renders one block of every bus.
    ///
    /// For each bus: the audio available in every send patch is summed into
    /// the bus mix, then the mix is pushed into every receive patch. Patches
    /// whose far half was dropped, or that went stale, are detached.
    ///
    /// Returns the number of frames rendered.
    pub fn process_block(&mut self) -> u32 {
        while let Some(message) = self.commands.try_pop() {
            self.apply(message);
        }

        for bus in self.buses.values_mut() {
            bus.render(&mut self.retired);
        }

        self.blocks_rendered += 1;
        self.frames_per_block
    }

    /// Returns `true` if the renderer is mixing `key`.
    ///
    /// This is the render thread's view; it catches up with control-side
    /// changes at the start of the next block.
    pub fn is_active(&self, key: &BusKey) -> bool {
        self.buses.contains_key(key)
    }

    /// Returns the number of buses being rendered.
    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    /// Returns the number of patch ends waiting for their bus to start.
    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    /// Returns the number of blocks rendered so far.
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered
    }

    fn apply(&mut self, message: RenderMessage) {
        match message {
            RenderMessage::Start(mut bus) => {
                let key = bus.handle.key();
                if !self.buses.contains_key(&key) && self.buses.len() >= self.max_buses {
                    retire(&mut self.retired, Retired::Bus(bus));
                    return;
                }

                let mut i = 0;
                while i < self.parked.len() {
                    if self.parked[i].0 == key {
                        let (_, end) = self.parked.swap_remove(i);
                        if let Err(end) = bus.attach(end) {
                            retire(&mut self.retired, Retired::End(end));
                        }
                    } else {
                        i += 1;
                    }
                }

                bus.handle.watch().set_rendering(true);
                if let Some(previous) = self.buses.insert(key, bus) {
                    retire(&mut self.retired, Retired::Bus(previous));
                }
            }
            RenderMessage::Stop(key) => {
                if let Some(bus) = self.buses.remove(&key) {
                    bus.handle.watch().set_rendering(false);
                    retire(&mut self.retired, Retired::Bus(bus));
                }
                let mut i = 0;
                while i < self.parked.len() {
                    if self.parked[i].0 == key {
                        let (_, end) = self.parked.swap_remove(i);
                        retire(&mut self.retired, Retired::End(end));
                    } else {
                        i += 1;
                    }
                }
            }
            RenderMessage::Attach(key, end) => match self.buses.get_mut(&key) {
                Some(bus) => {
                    if let Err(end) = bus.attach(end) {
                        retire(&mut self.retired, Retired::End(end));
                    }
                }
                None if self.parked.len() < self.parked.capacity() => {
                    self.parked.push((key, end));
                }
                None => retire(&mut self.retired, Retired::End(end)),
            },
        }
    }
}

impl std::fmt::Debug for BusRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusRenderer")
            .field("buses", &self.buses.len())
            .field("parked", &self.parked.len())
            .field("frames_per_block", &self.frames_per_block)
            .field("blocks_rendered", &self.blocks_rendered)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::BusWatch;

    fn mono_mixer(frames: u32) -> (Arc<SoftwareMixer>, BusRenderer) {
        software_mixer(
            MixerConfig::default()
                .with_frames_per_block(frames)
                .with_channel_count(1),
        )
    }

    fn start(mixer: &SoftwareMixer, key: BusKey, channels: u32) -> Arc<BusWatch> {
        let watch = Arc::new(BusWatch::default());
        let handle = BusHandle::new(key, channels, watch.clone());
        mixer
            .run_on_render_thread(RenderCommand::StartBus { handle })
            .unwrap();
        watch
    }

    fn attach(mixer: &SoftwareMixer, key: BusKey, end: BusEnd) {
        mixer
            .run_on_render_thread(RenderCommand::Attach { key, end })
            .unwrap();
    }

    #[test]
    fn test_bus_sums_sends_into_receivers() {
        let (mixer, mut renderer) = mono_mixer(4);
        let key = BusKey::from_object_id(1);
        start(&mixer, key, 1);

        let (mut a_in, a_out) = Patch::create(16, 1, 1.0);
        let (mut b_in, b_out) = Patch::create(16, 1, 0.5);
        let (mix_in, mut mix_out) = Patch::create(16, 1, 1.0);
        attach(&mixer, key, BusEnd::Output(a_out));
        attach(&mixer, key, BusEnd::Output(b_out));
        attach(&mixer, key, BusEnd::Input(mix_in));

        a_in.push(&[0.25; 4]);
        b_in.push(&[1.0; 4]);
        assert_eq!(renderer.process_block(), 4);

        let mut out = [0.0; 4];
        assert_eq!(mix_out.pop(&mut out, false), 4);
        assert_eq!(out, [0.75; 4]);
    }

    #[test]
    fn test_mix_is_not_clipped() {
        let (mixer, mut renderer) = mono_mixer(2);
        let key = BusKey::from_object_id(1);
        start(&mixer, key, 1);

        let (mut a_in, a_out) = Patch::create(8, 1, 1.0);
        let (mut b_in, b_out) = Patch::create(8, 1, 1.0);
        let (mix_in, mut mix_out) = Patch::create(8, 1, 1.0);
        attach(&mixer, key, BusEnd::Output(a_out));
        attach(&mixer, key, BusEnd::Output(b_out));
        attach(&mixer, key, BusEnd::Input(mix_in));

        a_in.push(&[0.75; 2]);
        b_in.push(&[0.75; 2]);
        renderer.process_block();

        let mut out = [0.0; 2];
        mix_out.pop(&mut out, false);
        assert_eq!(out, [1.5; 2]);
    }

    #[test]
    fn test_attach_before_start_is_parked() {
        let (mixer, mut renderer) = mono_mixer(4);
        let key = BusKey::from_object_id(2);

        let (mix_in, mix_out) = Patch::create(16, 1, 1.0);
        attach(&mixer, key, BusEnd::Input(mix_in));
        renderer.process_block();
        assert_eq!(renderer.parked_count(), 1);
        assert!(!renderer.is_active(&key));

        let watch = start(&mixer, key, 1);
        renderer.process_block();
        assert_eq!(renderer.parked_count(), 0);
        assert!(renderer.is_active(&key));
        assert!(watch.is_rendering());
        assert_eq!(mix_out.available(), 4);
    }

    #[test]
    fn test_stop_retires_bus() {
        let (mixer, mut renderer) = mono_mixer(4);
        let key = BusKey::from_object_id(3);
        let watch = start(&mixer, key, 1);

        let (mix_in, _mix_out) = Patch::create(16, 1, 1.0);
        attach(&mixer, key, BusEnd::Input(mix_in));
        renderer.process_block();
        assert!(mixer.find_bus_by_key(&key).is_some());

        mixer
            .run_on_render_thread(RenderCommand::StopBus { key })
            .unwrap();
        renderer.process_block();

        assert!(!renderer.is_active(&key));
        assert!(!watch.is_rendering());
        assert!(mixer.find_bus_by_key(&key).is_none());
        assert_eq!(mixer.reclaim_retired(), 1);
    }

    #[test]
    fn test_orphaned_ends_are_detached() {
        let (mixer, mut renderer) = mono_mixer(4);
        let key = BusKey::from_object_id(4);
        start(&mixer, key, 1);

        let (mix_in, mix_out) = Patch::create(16, 1, 1.0);
        attach(&mixer, key, BusEnd::Input(mix_in));
        renderer.process_block();
        assert_eq!(mixer.reclaim_retired(), 0);

        drop(mix_out);
        renderer.process_block();
        assert_eq!(mixer.reclaim_retired(), 1);
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let (mixer, mut renderer) = mono_mixer(4);
        let key = BusKey::from_object_id(5);
        start(&mixer, key, 2);

        let (mix_in, _mix_out) = Patch::create(16, 1, 1.0);
        attach(&mixer, key, BusEnd::Input(mix_in));
        renderer.process_block();
        assert_eq!(mixer.reclaim_retired(), 1);
    }

    #[test]
    fn test_create_patch_limits() {
        let (mixer, _renderer) = mono_mixer(4);
        assert!(mixer.create_patch(0, 2, 1.0).is_err());

        let err = mixer.create_patch(u32::MAX, 2, 1.0).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::PatchCreationFailed);
        assert!(mixer.create_patch(256, 2, 1.0).is_ok());
    }

    #[test]
    fn test_command_queue_full() {
        let config = MixerConfig {
            command_capacity: 1,
            ..MixerConfig::default()
        };
        let (mixer, _renderer) = software_mixer(config);
        let key = BusKey::from_object_id(6);

        mixer
            .run_on_render_thread(RenderCommand::StopBus { key })
            .unwrap();
        let err = mixer
            .run_on_render_thread(RenderCommand::StopBus { key })
            .unwrap_err();
        assert_eq!(err, PatchbayError::CommandQueueFull { capacity: 1 });
    }

    #[test]
    fn test_restart_replaces_bus() {
        let (mixer, mut renderer) = mono_mixer(4);
        let key = BusKey::from_object_id(7);
        start(&mixer, key, 1);
        renderer.process_block();
        start(&mixer, key, 1);
        renderer.process_block();

        assert_eq!(renderer.bus_count(), 1);
        assert_eq!(mixer.reclaim_retired(), 1);
    }
}
