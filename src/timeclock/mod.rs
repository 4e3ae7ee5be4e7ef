//! Time-Entry Engine: timer sessions and the single-active-entry invariant.

pub mod engine;
pub mod model;

pub use engine::TimeEntryEngine;
pub use model::{format_duration, EntryFilter, EntryView, SummaryPeriod, TimeEntry, TimeSummary};
