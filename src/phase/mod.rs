//! Phase accounting.
//!
//! This module provides:
//! - `PhaseStack`: nested, repeated phases with one capture per phase name
//! - `PhaseGuard`: scoped bracket that ends its phase on every exit path
//! - `PhaseTimer`: sequential stage timer without captures

pub mod stack;
pub mod timer;

// Re-export main types
pub use stack::{PhaseGuard, PhaseStack};
pub use timer::PhaseTimer;
