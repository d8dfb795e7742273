//! Statistics text parsing.
//!
//! This module handles:
//! - Reading pstats-style rendered tables into structured statistics
//! - Rejoining bracketed identifiers split by whitespace

pub mod pstats_text;

// Re-export main functions
pub use pstats_text::{merge_grouped_tokens, parse_stats_text};
