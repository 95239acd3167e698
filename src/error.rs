//! Error types for audio-patchbay.
//!
//! Nothing in the fabric fails hard on the render thread. Every error kind
//! here is recovered locally:
//! - **Control-side results** ([`PatchbayError`]): returned by device and
//!   registry internals, logged and converted into silence or a no-op
//! - **Recoverable events**: surfaced via [`EventCallback`](crate::EventCallback)
//!   so monitoring code can observe degraded routing

use crate::bus::BusKey;

/// Errors produced inside the routing fabric.
///
/// These never cross into render-thread code as failures. Public entry points
/// such as [`BusRegistry::start`](crate::BusRegistry::start) absorb them and
/// degrade to "produce silence / consume nothing".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchbayError {
    /// The operation needs a render device and none is attached.
    #[error("no render device attached")]
    NoDevice,

    /// A stop or validate referenced a bus that was never started.
    #[error("unknown bus key: {key}")]
    UnknownBusKey {
        /// The key that was not found.
        key: BusKey,
    },

    /// A patch was negotiated with a channel count the bus no longer has.
    #[error("channel count mismatch: expected {expected}, bus has {actual}")]
    ChannelCountMismatch {
        /// Channel count the consumer expects.
        expected: u32,
        /// Channel count the bus currently renders.
        actual: u32,
    },

    /// The device refused to allocate a patch.
    #[error("patch creation failed: {reason}")]
    PatchCreationFailed {
        /// Why the device refused.
        reason: String,
    },

    /// A read from a stale patch was ignored.
    #[error("read from stale patch ignored")]
    StaleReadIgnored,

    /// A bus key with neither an object id nor an instance id.
    #[error("invalid bus key")]
    InvalidBusKey,

    /// The render command queue was full and the command was dropped.
    #[error("render command queue full (capacity {capacity})")]
    CommandQueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// A periodic task was requested outside of a tokio runtime.
    #[error("no tokio runtime available to drive periodic processing")]
    NoRuntime,
}

/// Coarse classification of [`PatchbayError`] for matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`PatchbayError::NoDevice`].
    NoDevice,
    /// See [`PatchbayError::UnknownBusKey`].
    UnknownBusKey,
    /// See [`PatchbayError::ChannelCountMismatch`].
    ChannelCountMismatch,
    /// See [`PatchbayError::PatchCreationFailed`].
    PatchCreationFailed,
    /// See [`PatchbayError::StaleReadIgnored`].
    StaleReadIgnored,
    /// See [`PatchbayError::InvalidBusKey`].
    InvalidBusKey,
    /// See [`PatchbayError::CommandQueueFull`].
    CommandQueueFull,
    /// See [`PatchbayError::NoRuntime`].
    NoRuntime,
}

impl PatchbayError {
    /// Creates a patch creation error with the given reason.
    pub fn patch_creation_failed(reason: impl Into<String>) -> Self {
        Self::PatchCreationFailed {
            reason: reason.into(),
        }
    }

    /// Returns the payload-free kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDevice => ErrorKind::NoDevice,
            Self::UnknownBusKey { .. } => ErrorKind::UnknownBusKey,
            Self::ChannelCountMismatch { .. } => ErrorKind::ChannelCountMismatch,
            Self::PatchCreationFailed { .. } => ErrorKind::PatchCreationFailed,
            Self::StaleReadIgnored => ErrorKind::StaleReadIgnored,
            Self::InvalidBusKey => ErrorKind::InvalidBusKey,
            Self::CommandQueueFull { .. } => ErrorKind::CommandQueueFull,
            Self::NoRuntime => ErrorKind::NoRuntime,
        }
    }
}
