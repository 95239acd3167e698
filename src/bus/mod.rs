//! Bus identification, lifecycle and deferred connections.
//!
//! - [`BusKey`] / [`BusKeyFactory`]: identify buses
//! - [`BusRegistry`]: owns active buses and routes patches to the device
//! - [`PendingConnectionQueue`]: holds connections until a sound instance is
//!   ready

mod key;
mod pending;
mod registry;

pub use key::{BusKey, BusKeyFactory};
pub use pending::{
    PatchDirection, PendingConnection, PendingConnectionQueue, ResolvedConnection,
    SoundInstanceId,
};
pub use registry::{ActiveBus, BusRegistry};
