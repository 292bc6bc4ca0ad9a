//! Statistics pipeline
//!
//! Raw W3C-style records come from the capability, get reduced into a flat
//! [`StatsSnapshot`], and are published on the event bus by the
//! [`StatsCollector`] on a per-session timer.

mod collector;
mod records;
mod snapshot;

pub use collector::StatsCollector;
pub use records::{MediaKind, StatsRecord};
pub use snapshot::StatsSnapshot;
