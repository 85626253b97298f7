//! Water-balance and non-revenue-water loss accounting over a multi-tier
//! metering network (main bulk, zone bulks, buildings/villas, apartments and
//! direct connections).
//!
//! Every entry point is a pure function over an in-memory snapshot: nothing
//! here performs I/O or keeps state between calls.

pub mod anomaly;
pub mod balance;
pub mod daily;
pub mod error;
pub mod hierarchy;
pub mod meter;
pub mod numeric;
pub mod options;
pub mod period;
pub mod report;
pub mod stage;
pub mod zone;

pub use error::{Error, Result};
pub use options::EngineOptions;
