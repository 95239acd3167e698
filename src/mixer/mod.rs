//! Render device boundary.
//!
//! The fabric never renders audio itself. It talks to a [`MixerDevice`], which
//! owns the render thread and applies [`RenderCommand`]s there:
//!
//! ```text
//! BusRegistry (control) → MixerDevice::run_on_render_thread → render block
//! ```
//!
//! [`SoftwareMixer`] is the in-process implementation: its [`BusRenderer`] half
//! is driven by whatever audio callback the host owns.

mod software;

pub use software::{software_mixer, BusRenderer, SoftwareMixer};

use std::sync::Arc;

use crate::bus::BusKey;
use crate::patch::{BusEnd, BusWatch, Patch, PatchInput, PatchOutput};
use crate::PatchbayError;

/// Device-side view of a started bus.
#[derive(Debug, Clone)]
pub struct BusHandle {
    key: BusKey,
    channel_count: u32,
    watch: Arc<BusWatch>,
}

impl BusHandle {
    pub(crate) fn new(key: BusKey, channel_count: u32, watch: Arc<BusWatch>) -> Self {
        Self {
            key,
            channel_count,
            watch,
        }
    }

    /// Returns the bus key.
    pub fn key(&self) -> BusKey {
        self.key
    }

    /// Returns the channel count the bus was started with.
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Returns `true` once the render thread is mixing this bus.
    pub fn is_rendering(&self) -> bool {
        self.watch.is_rendering()
    }

    pub(crate) fn watch(&self) -> &Arc<BusWatch> {
        &self.watch
    }
}

/// A request executed on the render thread at the start of the next block.
#[derive(Debug)]
pub enum RenderCommand {
    /// Begin mixing a bus, replacing any bus with the same key.
    StartBus {
        /// The bus to start.
        handle: BusHandle,
    },
    /// Stop mixing a bus and release its patches. Unknown keys are ignored.
    StopBus {
        /// The bus to stop.
        key: BusKey,
    },
    /// Attach a patch end to a bus.
    ///
    /// If the bus is not active yet the end is parked and attached when the
    /// bus starts.
    Attach {
        /// The bus to attach to.
        key: BusKey,
        /// The bus-side half of the patch.
        end: BusEnd,
    },
}

/// The render device the fabric routes through.
///
/// Implementations must make [`run_on_render_thread`] non-blocking: the
/// command is queued and applied before the next block is rendered.
///
/// [`run_on_render_thread`]: MixerDevice::run_on_render_thread
pub trait MixerDevice: Send + Sync {
    /// Frames rendered per block.
    fn output_frames_per_block(&self) -> u32;

    /// Channel count of the device output.
    fn output_channel_count(&self) -> u32;

    /// Sample rate of the device in Hz.
    fn sample_rate(&self) -> u32;

    /// Allocates a patch.
    ///
    /// The default implementation always succeeds with [`Patch::create`].
    fn create_patch(
        &self,
        frames: u32,
        channels: u32,
        gain: f32,
    ) -> Result<(PatchInput, PatchOutput), PatchbayError> {
        Ok(Patch::create(frames, channels, gain))
    }

    /// Queues a command for the render thread.
    fn run_on_render_thread(&self, command: RenderCommand) -> Result<(), PatchbayError>;

    /// Looks up a bus the device knows about.
    fn find_bus_by_key(&self, key: &BusKey) -> Option<BusHandle>;

    /// Drops resources the render thread has handed back.
    ///
    /// Called from the control thread so deallocation never happens while
    /// rendering. Returns the number of items released.
    fn reclaim_retired(&self) -> usize {
        0
    }
}
