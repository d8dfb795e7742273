//! Phase Profiler
//!
//! Phase-based execution profiling: mark named phases of a program, collect
//! wall-clock time and per-call-site statistics for each phase across
//! repeated and nested runs, then export everything to one tab-delimited
//! file.
//!
//! ## Getting Started
//!
//! ```ignore
//! use phase_profiler::{profile_call, PhaseStack, SortKey};
//!
//! fn load() {
//!     let _span = profile_call!("load");
//!     // ...
//! }
//!
//! let mut profiler: PhaseStack = PhaseStack::new();
//! profiler.phase("startup", |p| {
//!     load();
//!     p.phase("warmup", |_| load())
//! })??;
//! print!("{}", profiler);
//! profiler.export_to(SortKey::Cumulative, "prof.txt")?;
//! ```

pub mod output;
pub mod parser;
pub mod phase;
pub mod provider;
pub mod utils;

pub use output::{PhaseReport, StatsExporter};
pub use phase::{PhaseGuard, PhaseStack, PhaseTimer};
pub use provider::{CallProfiler, CallSite, CallSpan, ProfileProvider, ProfileStats, SortKey};
pub use utils::{ConfigError, ExportError, ParseError, PhaseError, ProfilerConfig};
