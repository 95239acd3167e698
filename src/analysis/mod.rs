//! Consumers that read a bus for display.
//!
//! [`TriggeredWindowProvider`] is the building block: it pulls a bus through
//! a patch and emits trigger-aligned windows. Rack units wrap it for specific
//! displays and an [`AnalyzerRack`] hosts them on a private bus.

mod meter;
mod rack;
mod trigger;
mod window;

pub use meter::{level_to_db, MeterReading, MeterUnit, SILENCE_FLOOR_DB};
pub use rack::{AnalyzerRack, OscilloscopeUnit, RackUnit, VectorscopeUnit};
pub use trigger::{TriggerMode, TriggerState};
pub use window::{TriggeredWindowProvider, ViewCallback, WindowView};
