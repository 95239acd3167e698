//! Runtime events for monitoring routing health.
//!
//! Events are non-fatal notifications. The fabric keeps routing after any of
//! them is emitted; they exist for logging and metrics, not error handling.

use std::sync::Arc;

use crate::bus::BusKey;

/// Runtime events emitted by the fabric.
///
/// # Example
///
/// ```
/// use audio_patchbay::FabricEvent;
///
/// fn handle_event(event: FabricEvent) {
///     match event {
///         FabricEvent::BusStarted { key, channel_count } => {
///             eprintln!("bus {} started ({} ch)", key, channel_count);
///         }
///         FabricEvent::BusStopped { key } => eprintln!("bus {} stopped", key),
///         FabricEvent::ChannelCountChanged { key, previous, current } => {
///             eprintln!("bus {}: {} -> {} channels", key, previous, current);
///         }
///         FabricEvent::PatchCreationFailed { key, reason } => {
///             eprintln!("patch on {} failed: {}", key, reason);
///         }
///         FabricEvent::KeySourceRecreated { key } => eprintln!("reconnected to {}", key),
///         FabricEvent::KeySourceSilent { key, reason } => {
///             eprintln!("key input {:?} silent: {}", key, reason);
///         }
///         FabricEvent::DeviceAttached { parked_ends } => {
///             eprintln!("device attached, flushed {} ends", parked_ends);
///         }
///         FabricEvent::DeviceDetached => eprintln!("device detached"),
///         FabricEvent::CommandDropped { key, reason } => {
///             eprintln!("command for {} dropped: {}", key, reason);
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FabricEvent {
    /// A bus was started or re-started.
    BusStarted {
        /// The bus.
        key: BusKey,
        /// Channel count it renders at.
        channel_count: u32,
    },

    /// A bus was stopped. Every patch bound to it is now stale.
    BusStopped {
        /// The bus.
        key: BusKey,
    },

    /// An active bus was re-started with a different channel count.
    ///
    /// Patches negotiated at the old count are stale.
    ChannelCountChanged {
        /// The bus.
        key: BusKey,
        /// Channel count before the change.
        previous: u32,
        /// Channel count after the change.
        current: u32,
    },

    /// The device refused to allocate a patch; an invalid patch was handed
    /// out instead.
    PatchCreationFailed {
        /// Bus the patch was meant for.
        key: BusKey,
        /// Device-provided reason.
        reason: String,
    },

    /// A key input re-established its connection to a bus.
    KeySourceRecreated {
        /// The bus reconnected to.
        key: BusKey,
    },

    /// A key input could not connect and is producing silence.
    KeySourceSilent {
        /// The requested bus, if any.
        key: Option<BusKey>,
        /// Why the connection failed.
        reason: String,
    },

    /// A render device was attached.
    DeviceAttached {
        /// Ends parked while no device was present, now handed to the device.
        parked_ends: usize,
    },

    /// The render device was detached after stopping every bus.
    DeviceDetached,

    /// A render command could not be queued.
    CommandDropped {
        /// Bus the command targeted.
        key: BusKey,
        /// Why it was dropped.
        reason: String,
    },
}

/// Callback type for receiving fabric events.
///
/// Called from whichever thread emitted the event, usually the control
/// thread. Must be `Send + Sync`.
pub type EventCallback = Arc<dyn Fn(FabricEvent) + Send + Sync>;

/// Creates an event callback from a closure.
///
/// # Example
///
/// ```
/// use audio_patchbay::{event_callback, FabricEvent};
///
/// let callback = event_callback(|event| {
///     if let FabricEvent::BusStopped { key } = event {
///         eprintln!("stopped {}", key);
///     }
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(FabricEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
