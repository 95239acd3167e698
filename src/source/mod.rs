//! Signal sources for driving the fabric without an audio device.

mod mock;

pub use mock::MockSource;
