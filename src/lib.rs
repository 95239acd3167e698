//! # audio-patchbay
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time audio bus routing between a control thread and a render thread.
//!
//! `audio-patchbay` lets independent producers and consumers exchange
//! streaming audio through named buses. Connections are lock-free patches
//! that go stale when their bus changes, requests for buses that do not
//! exist yet are deferred, and a triggered window reader turns any bus into
//! a stable oscilloscope display.
//!
//! ## Quick Start
//!
//! ```rust
//! use audio_patchbay::{software_mixer, BusKey, BusRegistry, FabricConfig, MixerConfig};
//!
//! // The registry lives on the control thread
//! let registry = BusRegistry::new(FabricConfig::default());
//!
//! // The renderer half goes to the audio callback
//! let (mixer, mut renderer) = software_mixer(MixerConfig::default().with_channel_count(1));
//! registry.attach_device(mixer);
//!
//! let key = BusKey::from_object_id(7);
//! registry.start(key, "Sidechain", 1, false);
//!
//! let mut send = registry.add_patch_input(key, 1024, 1, 0.5);
//! let mut receive = registry.add_patch_output(key, 1024, 1, 1.0);
//!
//! send.push(&[1.0; 512]);
//! renderer.process_block();
//!
//! let mut mix = [0.0; 512];
//! receive.pop(&mut mix, false);
//! assert_eq!(mix[0], 0.5);
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Control thread**: owns the [`BusRegistry`]; starts and stops buses and
//!   creates patches
//! - **Command queue**: bounded SPSC queue carrying [`RenderCommand`]s to the
//!   render thread, which pops without locking
//! - **Render thread**: the [`BusRenderer`] sums every send into its bus and
//!   copies the mix to every receive, without allocating or blocking
//! - **Patches**: each half owns one end of a split ring, so push and pop
//!   never lock
//! - **Tokio runtime**: drives periodic [`TriggeredWindowProvider`] reads
//!
//! Failures never stop audio. They degrade to silence and surface as
//! [`FabricEvent`]s.

#![warn(missing_docs)]
// Sample counts and rates move between integer and float widths throughout
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod analysis;
mod bus;
mod config;
mod error;
mod event;
mod key_source;
mod mixer;
mod patch;
pub mod source;

pub use analysis::{
    AnalyzerRack, MeterReading, MeterUnit, OscilloscopeUnit, RackUnit, TriggerMode, TriggerState,
    TriggeredWindowProvider, VectorscopeUnit, ViewCallback, WindowView,
};
pub use bus::{
    ActiveBus, BusKey, BusKeyFactory, BusRegistry, PatchDirection, PendingConnection,
    PendingConnectionQueue, ResolvedConnection, SoundInstanceId,
};
pub use config::{
    AudioBusAsset, DefaultBusEntry, DefaultBusList, FabricConfig, MixerConfig, ProviderConfig,
};
pub use error::{ErrorKind, PatchbayError};
pub use event::{event_callback, EventCallback, FabricEvent};
pub use key_source::{KeySource, KeySourceResolver, KeyStatus};
pub use mixer::{software_mixer, BusHandle, BusRenderer, MixerDevice, RenderCommand, SoftwareMixer};
pub use patch::{BusEnd, Patch, PatchInput, PatchOutput, RingBuffer};
pub use source::MockSource;
