//! Deferred patch connections for sound instances that are not ready yet.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BusKey, BusRegistry};
use crate::patch::{BusEnd, Patch, PatchInput, PatchOutput};

/// Identifies a sound instance that owns pending connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundInstanceId(pub u64);

impl std::fmt::Display for SoundInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sound#{}", self.0)
    }
}

/// Which way audio flows between an instance and a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchDirection {
    /// The instance sends into the bus.
    Send,
    /// The instance receives the bus mix.
    Receive,
}

/// A patch end waiting for its sound instance to become ready.
#[derive(Debug)]
pub struct PendingConnection {
    /// The bus-side end to attach.
    pub patch: BusEnd,
    /// The bus to attach it to.
    pub bus_key: BusKey,
    /// Patch capacity in frames.
    pub frames: u32,
    /// Interleaved channel count.
    pub channels: u32,
    /// Start the bus on connect if it is not active.
    pub is_automatic: bool,
}

impl PendingConnection {
    /// Creates a pending send. The instance keeps the returned input and may
    /// push into it right away; audio flows once the connection resolves.
    pub fn send(
        bus_key: BusKey,
        frames: u32,
        channels: u32,
        gain: f32,
        is_automatic: bool,
    ) -> (Self, PatchInput) {
        let (input, output) = Patch::create(frames, channels, gain);
        let connection = Self {
            patch: BusEnd::Output(output),
            bus_key,
            frames,
            channels,
            is_automatic,
        };
        (connection, input)
    }

    /// Creates a pending receive. The returned output reads zero samples
    /// until the connection resolves.
    pub fn receive(
        bus_key: BusKey,
        frames: u32,
        channels: u32,
        gain: f32,
        is_automatic: bool,
    ) -> (Self, PatchOutput) {
        let (input, output) = Patch::create(frames, channels, gain);
        let connection = Self {
            patch: BusEnd::Input(input),
            bus_key,
            frames,
            channels,
            is_automatic,
        };
        (connection, output)
    }

    /// Returns the direction as seen from the sound instance.
    pub fn direction(&self) -> PatchDirection {
        match self.patch {
            BusEnd::Output(_) => PatchDirection::Send,
            BusEnd::Input(_) => PatchDirection::Receive,
        }
    }
}

/// A connection handed to the registry by [`PendingConnectionQueue::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedConnection {
    /// The bus the patch was attached to.
    pub bus_key: BusKey,
    /// Direction as seen from the sound instance.
    pub direction: PatchDirection,
}

/// Holds patch connections until their sound instance is ready.
///
/// Entries for one instance never resolve before [`connect`](Self::connect)
/// is called for it, never resolve twice, and never resolve after
/// [`remove`](Self::remove).
///
/// # Example
///
/// ```
/// use audio_patchbay::{
///     BusKey, BusRegistry, FabricConfig, PendingConnection, PendingConnectionQueue,
///     SoundInstanceId,
/// };
///
/// let registry = BusRegistry::new(FabricConfig::default());
/// let queue = PendingConnectionQueue::new(registry.clone());
///
/// let id = SoundInstanceId(1);
/// let key = BusKey::from_object_id(3);
/// let (connection, _send) = PendingConnection::send(key, 256, 2, 1.0, true);
/// queue.add_pending(id, connection);
///
/// let resolved = queue.connect(id);
/// assert_eq!(resolved.len(), 1);
/// assert!(registry.is_active(&key));
/// ```
pub struct PendingConnectionQueue {
    registry: Arc<BusRegistry>,
    pending: Mutex<HashMap<SoundInstanceId, Vec<PendingConnection>>>,
}

impl PendingConnectionQueue {
    /// Creates an empty queue resolving against `registry`.
    pub fn new(registry: Arc<BusRegistry>) -> Self {
        Self {
            registry,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Queues a connection for `id`.
    pub fn add_pending(&self, id: SoundInstanceId, connection: PendingConnection) {
        tracing::trace!(%id, key = %connection.bus_key, "queued pending connection");
        self.pending.lock().entry(id).or_default().push(connection);
    }

    /// Resolves every connection queued for `id`.
    ///
    /// Automatic connections start their bus first if it is not active.
    /// Returns what was attached, in queue order.
    pub fn connect(&self, id: SoundInstanceId) -> Vec<ResolvedConnection> {
        let Some(connections) = self.pending.lock().remove(&id) else {
            return Vec::new();
        };

        tracing::debug!(%id, count = connections.len(), "resolving pending connections");
        let mut resolved = Vec::with_capacity(connections.len());
        for connection in connections {
            let key = connection.bus_key;
            let direction = connection.direction();
            if connection.is_automatic && !self.registry.is_active(&key) {
                let name = format!("auto {key}");
                self.registry.start(key, name, connection.channels, true);
            }
            self.registry.attach(key, connection.patch);
            resolved.push(ResolvedConnection {
                bus_key: key,
                direction,
            });
        }
        resolved
    }

    /// Discards every connection queued for `id`. Returns how many were
    /// discarded.
    pub fn remove(&self, id: SoundInstanceId) -> usize {
        let removed = self.pending.lock().remove(&id).map_or(0, |list| list.len());
        if removed > 0 {
            tracing::debug!(%id, removed, "discarded pending connections");
        }
        removed
    }

    /// Returns the number of connections queued for `id`.
    pub fn pending_count(&self, id: SoundInstanceId) -> usize {
        self.pending.lock().get(&id).map_or(0, Vec::len)
    }

    /// Returns `true` if nothing is queued for any instance.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl std::fmt::Debug for PendingConnectionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnectionQueue")
            .field("instances", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}
