//! Profiling providers and the statistics they produce.
//!
//! A provider collects raw call counts and durations while enabled. The
//! phase stack owns one provider per phase name and turns it on and off
//! around every bracket of that phase.

pub mod call_profiler;
pub mod stats;

// Re-export main types
pub use call_profiler::{active_collectors, CallProfiler, CallSpan};
pub use stats::{CallSite, CallSiteStats, ProfileStats, SortKey};

/// Capability every profiling provider must expose
///
/// Statistics accumulate inside the provider across repeated
/// enable/disable cycles; `stats` returns everything collected so far.
pub trait ProfileProvider {
    /// Begin collecting
    fn enable(&mut self);

    /// Stop collecting
    fn disable(&mut self);

    fn is_enabled(&self) -> bool;

    /// Snapshot of the accumulated statistics
    fn stats(&self) -> ProfileStats;
}
