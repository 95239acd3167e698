//! Sidechain / key input resolution.
//!
//! A processor with a key input either keys off its own input or off a bus.
//! [`KeySourceResolver`] holds the bus connection, checks it once per render
//! block and rebuilds it after the bus or the render device was torn down.

use std::sync::Arc;

use crate::bus::{BusKey, BusRegistry};
use crate::patch::PatchOutput;
use crate::{FabricEvent, PatchbayError};

/// Where a key input takes its signal from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySource {
    /// The processor's own input.
    #[default]
    Default,
    /// The mix of a bus.
    Bus(BusKey),
}

/// Outcome of [`KeySourceResolver::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Keying off the processor's own input.
    Default,
    /// The existing bus connection is usable.
    Valid,
    /// The bus connection was rebuilt this block.
    Recreated,
    /// No bus connection could be made; the key signal is silence.
    Silent,
}

/// Resolves a key input to a signal, once per render block.
///
/// ```text
/// validate() → Default | Valid | Recreated | Silent
/// key_signal(own_input, frames) → own input | bus audio | silence
/// ```
///
/// # Example
///
/// ```
/// use audio_patchbay::{
///     BusKey, BusRegistry, FabricConfig, KeySource, KeySourceResolver, KeyStatus,
/// };
///
/// let registry = BusRegistry::new(FabricConfig::default());
/// let mut resolver = KeySourceResolver::new(registry, 2, 256);
///
/// let own = [0.25; 512];
/// assert_eq!(resolver.validate(), KeyStatus::Default);
/// assert_eq!(resolver.key_signal(&own, 256), &own[..]);
///
/// // No render device is attached, so the bus cannot be reached.
/// resolver.set_key_source(KeySource::Bus(BusKey::from_object_id(4)));
/// assert_eq!(resolver.validate(), KeyStatus::Silent);
/// assert!(resolver.key_signal(&own, 256).iter().all(|&s| s == 0.0));
/// ```
pub struct KeySourceResolver {
    registry: Arc<BusRegistry>,
    source: KeySource,
    channel_count: u32,
    max_block_frames: usize,
    patch: Option<PatchOutput>,
    signal: Vec<f32>,
    status: KeyStatus,
}

impl KeySourceResolver {
    /// Creates a resolver keyed off its own input.
    ///
    /// `max_block_frames` bounds the frames requested per
    /// [`key_signal`](Self::key_signal) call; the signal buffer is allocated
    /// for it up front.
    pub fn new(
        registry: Arc<BusRegistry>,
        channel_count: u32,
        max_block_frames: usize,
    ) -> Self {
        Self {
            registry,
            source: KeySource::Default,
            channel_count,
            max_block_frames,
            patch: None,
            signal: vec![0.0; max_block_frames * channel_count as usize],
            status: KeyStatus::Default,
        }
    }

    /// Selects the key source. Switching to another source releases the
    /// current bus connection.
    pub fn set_key_source(&mut self, source: KeySource) {
        if source != self.source {
            tracing::debug!(?source, "key source changed");
            self.source = source;
            self.patch = None;
        }
    }

    /// Returns the selected key source.
    pub fn key_source(&self) -> KeySource {
        self.source
    }

    /// Sets the channel count the key signal is read at.
    ///
    /// A connection negotiated at another count is rebuilt on the next
    /// [`validate`](Self::validate). A bus already running at another count
    /// wins: the resolver switches to the bus's count when it reconnects.
    pub fn set_channel_count(&mut self, channel_count: u32) {
        if channel_count != self.channel_count {
            self.channel_count = channel_count;
            self.signal = vec![0.0; self.max_block_frames * channel_count as usize];
        }
    }

    /// Returns the key signal channel count.
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Returns the status of the last [`validate`](Self::validate).
    pub fn status(&self) -> KeyStatus {
        self.status
    }

    /// Returns `true` while a bus connection is held.
    pub fn has_patch(&self) -> bool {
        self.patch.is_some()
    }

    /// Checks the bus connection and rebuilds it if it went stale.
    ///
    /// Call once per render block before [`key_signal`](Self::key_signal).
    pub fn validate(&mut self) -> KeyStatus {
        self.status = match self.source {
            KeySource::Default => {
                self.patch = None;
                KeyStatus::Default
            }
            KeySource::Bus(key) => {
                let usable = self.patch.as_ref().is_some_and(|patch| {
                    patch.is_valid()
                        && !patch.is_stale()
                        && patch.channel_count() == self.channel_count
                });
                if usable {
                    KeyStatus::Valid
                } else {
                    self.recreate(key)
                }
            }
        };
        self.status
    }

    /// Returns `frames` frames of key signal.
    ///
    /// For [`KeyStatus::Default`] this is `own_input` unchanged. Otherwise the
    /// result holds `frames * channel_count` samples (clamped to the buffer
    /// allocated at construction): bus audio zero-padded on underrun, or
    /// silence.
    pub fn key_signal<'a>(&'a mut self, own_input: &'a [f32], frames: usize) -> &'a [f32] {
        let samples = (frames * self.channel_count as usize).min(self.signal.len());
        match self.status {
            KeyStatus::Default => own_input,
            KeyStatus::Valid | KeyStatus::Recreated => {
                let buffer = &mut self.signal[..samples];
                let popped = match self.patch.as_mut() {
                    Some(patch) => patch.pop(buffer, false),
                    None => 0,
                };
                buffer[popped..].fill(0.0);
                &*buffer
            }
            KeyStatus::Silent => {
                let buffer = &mut self.signal[..samples];
                buffer.fill(0.0);
                &*buffer
            }
        }
    }

    fn recreate(&mut self, key: BusKey) -> KeyStatus {
        self.patch = None;

        if !key.is_valid() {
            return self.silence(key, &PatchbayError::InvalidBusKey);
        }
        if !self.registry.has_device() {
            return self.silence(key, &PatchbayError::NoDevice);
        }

        match self.registry.get_audio_bus(&key) {
            Some(bus) if bus.channel_count != self.channel_count => {
                let mismatch = PatchbayError::ChannelCountMismatch {
                    expected: self.channel_count,
                    actual: bus.channel_count,
                };
                tracing::debug!(
                    %key,
                    reason = %mismatch,
                    "key input following bus channel count"
                );
                self.set_channel_count(bus.channel_count);
            }
            Some(_) => {}
            None => {
                let name = format!("key {key}");
                self.registry.start(key, name, self.channel_count, false);
            }
        }

        let frames = self.registry.config().default_patch_frames;
        let patch = self
            .registry
            .add_patch_output(key, frames, self.channel_count, 1.0);
        if !patch.is_valid() {
            return self.silence(
                key,
                &PatchbayError::patch_creation_failed("device refused key patch"),
            );
        }

        tracing::debug!(%key, "key input connected");
        self.patch = Some(patch);
        self.registry.emit(FabricEvent::KeySourceRecreated { key });
        KeyStatus::Recreated
    }

    fn silence(&mut self, key: BusKey, reason: &PatchbayError) -> KeyStatus {
        if self.status != KeyStatus::Silent {
            tracing::warn!(%key, error = %reason, "key input silent");
            self.registry.emit(FabricEvent::KeySourceSilent {
                key: key.is_valid().then_some(key),
                reason: reason.to_string(),
            });
        }
        KeyStatus::Silent
    }
}

impl std::fmt::Debug for KeySourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySourceResolver")
            .field("source", &self.source)
            .field("channel_count", &self.channel_count)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{software_mixer, BusRenderer, FabricConfig, MixerConfig};

    fn mono_fabric() -> (Arc<BusRegistry>, BusRenderer) {
        let registry = BusRegistry::new(FabricConfig::default());
        let (mixer, renderer) = software_mixer(
            MixerConfig::default()
                .with_frames_per_block(4)
                .with_channel_count(1),
        );
        registry.attach_device(mixer);
        (registry, renderer)
    }

    #[test]
    fn test_default_source_passes_own_input() {
        let registry = BusRegistry::new(FabricConfig::default());
        let mut resolver = KeySourceResolver::new(registry, 1, 4);
        let own = [0.1, 0.2, 0.3, 0.4];

        assert_eq!(resolver.validate(), KeyStatus::Default);
        assert_eq!(resolver.key_signal(&own, 4), &own);
    }

    #[test]
    fn test_bus_source_connects_then_stays_valid() {
        let (registry, mut renderer) = mono_fabric();
        let key = BusKey::from_object_id(1);
        let mut resolver = KeySourceResolver::new(registry.clone(), 1, 4);
        resolver.set_key_source(KeySource::Bus(key));

        assert_eq!(resolver.validate(), KeyStatus::Recreated);
        assert!(registry.is_active(&key));

        let mut send = registry.add_patch_input(key, 16, 1, 1.0);
        send.push(&[0.5; 4]);
        renderer.process_block();

        assert_eq!(resolver.validate(), KeyStatus::Valid);
        assert_eq!(resolver.key_signal(&[0.0; 4], 4), &[0.5; 4]);
    }

    #[test]
    fn test_underrun_is_zero_padded() {
        let (registry, mut renderer) = mono_fabric();
        let key = BusKey::from_object_id(2);
        let mut resolver = KeySourceResolver::new(registry, 1, 8);
        resolver.set_key_source(KeySource::Bus(key));
        resolver.validate();
        renderer.process_block();

        let signal = resolver.key_signal(&[1.0; 8], 8);
        assert_eq!(signal.len(), 8);
        assert!(signal.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_no_device_is_silent() {
        let registry = BusRegistry::new(FabricConfig::default());
        let mut resolver = KeySourceResolver::new(registry, 2, 4);
        resolver.set_key_source(KeySource::Bus(BusKey::from_object_id(3)));

        assert_eq!(resolver.validate(), KeyStatus::Silent);
        let signal = resolver.key_signal(&[1.0; 8], 4);
        assert_eq!(signal, &[0.0; 8]);
    }

    #[test]
    fn test_invalid_key_is_silent() {
        let (registry, _renderer) = mono_fabric();
        let mut resolver = KeySourceResolver::new(registry, 1, 4);
        resolver.set_key_source(KeySource::Bus(BusKey::default()));
        assert_eq!(resolver.validate(), KeyStatus::Silent);
    }

    #[test]
    fn test_adopts_channel_count_of_running_bus() {
        let (registry, _renderer) = mono_fabric();
        let key = BusKey::from_object_id(4);
        registry.start(key, "Surround", 6, false);

        let mut resolver = KeySourceResolver::new(registry, 2, 4);
        resolver.set_key_source(KeySource::Bus(key));
        assert_eq!(resolver.validate(), KeyStatus::Recreated);
        assert_eq!(resolver.channel_count(), 6);
        assert_eq!(resolver.validate(), KeyStatus::Valid);
        assert_eq!(resolver.key_signal(&[], 4).len(), 24);
    }

    #[test]
    fn test_follows_bus_restarted_at_new_channel_count() {
        let (registry, mut renderer) = mono_fabric();
        let key = BusKey::from_object_id(8);
        let mut resolver = KeySourceResolver::new(registry.clone(), 1, 4);
        resolver.set_key_source(KeySource::Bus(key));
        assert_eq!(resolver.validate(), KeyStatus::Recreated);

        registry.start(key, "Key", 2, false);
        assert_eq!(resolver.validate(), KeyStatus::Recreated);
        assert_eq!(resolver.channel_count(), 2);
        assert_eq!(resolver.validate(), KeyStatus::Valid);

        let mut send = registry.add_patch_input(key, 16, 2, 1.0);
        send.push(&[0.5; 8]);
        renderer.process_block();
        assert_eq!(resolver.key_signal(&[0.0; 8], 4), &[0.5; 8]);
    }

    #[test]
    fn test_recreates_after_device_cycle() {
        let (registry, _renderer) = mono_fabric();
        let key = BusKey::from_object_id(5);
        let mut resolver = KeySourceResolver::new(registry.clone(), 1, 4);
        resolver.set_key_source(KeySource::Bus(key));
        assert_eq!(resolver.validate(), KeyStatus::Recreated);
        assert_eq!(resolver.validate(), KeyStatus::Valid);

        registry.detach_device();
        assert_eq!(resolver.validate(), KeyStatus::Silent);
        assert_eq!(resolver.validate(), KeyStatus::Silent);

        let (mixer, _next_renderer) =
            software_mixer(MixerConfig::default().with_channel_count(1));
        registry.attach_device(mixer);
        assert_eq!(resolver.validate(), KeyStatus::Recreated);
        assert_eq!(resolver.validate(), KeyStatus::Valid);
    }

    #[test]
    fn test_switch_to_default_releases_patch() {
        let (registry, _renderer) = mono_fabric();
        let mut resolver = KeySourceResolver::new(registry, 1, 4);
        resolver.set_key_source(KeySource::Bus(BusKey::from_object_id(6)));
        resolver.validate();
        assert!(resolver.has_patch());

        resolver.set_key_source(KeySource::Default);
        assert!(!resolver.has_patch());
        assert_eq!(resolver.validate(), KeyStatus::Default);
    }

    #[test]
    fn test_channel_count_change_recreates() {
        let (registry, _renderer) = mono_fabric();
        let key = BusKey::from_instance_id(77);
        let mut resolver = KeySourceResolver::new(registry.clone(), 1, 4);
        resolver.set_key_source(KeySource::Bus(key));
        resolver.validate();

        registry.stop(key);
        resolver.set_channel_count(2);
        assert_eq!(resolver.validate(), KeyStatus::Recreated);
        assert_eq!(
            registry.get_audio_bus(&key).map(|bus| bus.channel_count),
            Some(2)
        );
    }
}
