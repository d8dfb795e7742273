//! Phase stack: nested and repeated timed phases with per-phase captures.
//!
//! Each distinct phase name owns one provider instance (its capture) and one
//! running time total. Entering a phase enables its provider and pushes a
//! frame; ending pops the frame, disables the provider and adds the bracket's
//! elapsed time to the total. Phases are reported in the order they were
//! first started.

use crate::output::json::{write_report, PhaseReport};
use crate::output::tsv::StatsExporter;
use crate::provider::{CallProfiler, ProfileProvider, ProfileStats, SortKey};
use crate::utils::config::ProfilerConfig;
use crate::utils::error::PhaseError;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::{Duration, Instant};

/// Capture and accumulated timing of one phase name
struct PhaseRecord<P> {
    name: String,
    capture: P,
    elapsed: Duration,
    brackets: u32,
}

/// An open bracket on the stack
#[derive(Debug)]
struct Frame {
    index: usize,
    started: Instant,
}

/// Stack of open phases plus the ordered per-phase accumulators
///
/// **Public** - main entry point of the crate
pub struct PhaseStack<P: ProfileProvider = CallProfiler> {
    records: Vec<PhaseRecord<P>>,
    index: HashMap<String, usize>,
    frames: Vec<Frame>,
    config: ProfilerConfig,
}

impl<P: ProfileProvider + Default> PhaseStack<P> {
    pub fn new() -> Self {
        Self::with_config(ProfilerConfig::default())
    }

    pub fn with_config(config: ProfilerConfig) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            frames: Vec::new(),
            config,
        }
    }

    /// Open a bracket of `name`
    ///
    /// The capture for `name` is created on first use and reused after
    /// that. Starting a phase that is already open fails with
    /// `PhaseError::ReentrantPhase`.
    pub fn start(&mut self, name: &str) -> Result<(), PhaseError> {
        let index = match self.index.get(name) {
            Some(&index) => {
                if self.frames.iter().any(|f| f.index == index) {
                    return Err(PhaseError::ReentrantPhase(name.to_string()));
                }
                index
            }
            None => {
                let index = self.records.len();
                self.records.push(PhaseRecord {
                    name: name.to_string(),
                    capture: P::default(),
                    elapsed: Duration::ZERO,
                    brackets: 0,
                });
                self.index.insert(name.to_string(), index);
                index
            }
        };

        debug!("Starting phase '{}' at depth {}", name, self.frames.len());

        self.records[index].capture.enable();
        self.frames.push(Frame {
            index,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Discard every phase and capture
    pub fn reset(&mut self) -> Result<(), PhaseError> {
        self.ensure_idle()?;
        let config = self.config.clone();
        *self = Self::with_config(config);
        Ok(())
    }
}

impl<P: ProfileProvider> PhaseStack<P> {
    /// Close the innermost open bracket and return its elapsed time
    pub fn end(&mut self) -> Result<Duration, PhaseError> {
        let frame = self.frames.pop().ok_or(PhaseError::EmptyStack)?;
        let elapsed = frame.started.elapsed();

        let record = &mut self.records[frame.index];
        record.capture.disable();
        record.elapsed += elapsed;
        record.brackets += 1;

        debug!(
            "Ended phase '{}' after {:.6}s (total {:.6}s over {} bracket(s))",
            record.name,
            elapsed.as_secs_f64(),
            record.elapsed.as_secs_f64(),
            record.brackets
        );

        Ok(elapsed)
    }

    /// Number of open brackets
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }

    /// Names of the open phases, outermost first
    pub fn active_phases(&self) -> Vec<&str> {
        self.frames
            .iter()
            .map(|f| self.records[f.index].name.as_str())
            .collect()
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Accumulated time of `name`, once at least one bracket has ended
    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        self.index
            .get(name)
            .map(|&i| &self.records[i])
            .filter(|r| r.brackets > 0)
            .map(|r| r.elapsed)
    }

    /// Accumulated time of `name` in seconds
    pub fn seconds(&self, name: &str) -> Option<f64> {
        self.elapsed(name).map(|d| d.as_secs_f64())
    }

    /// Number of completed brackets of `name`
    pub fn brackets(&self, name: &str) -> u32 {
        self.index
            .get(name)
            .map(|&i| self.records[i].brackets)
            .unwrap_or(0)
    }

    /// Timed phases in first-seen order
    pub fn timings(&self) -> impl Iterator<Item = (&str, Duration)> + '_ {
        self.records
            .iter()
            .filter(|r| r.brackets > 0)
            .map(|r| (r.name.as_str(), r.elapsed))
    }

    pub fn capture(&self, name: &str) -> Option<&P> {
        self.index.get(name).map(|&i| &self.records[i].capture)
    }

    /// Every started phase's capture in first-seen order
    pub fn captures(&self) -> impl Iterator<Item = (&str, &P)> + '_ {
        self.records.iter().map(|r| (r.name.as_str(), &r.capture))
    }

    /// Statistics snapshot of every capture in first-seen order
    pub fn phase_stats(&self) -> Vec<(String, ProfileStats)> {
        self.records
            .iter()
            .map(|r| (r.name.clone(), r.capture.stats()))
            .collect()
    }

    /// Write the tabular report to the configured path and sort order
    ///
    /// Also writes the JSON report when one is configured.
    pub fn export(&self) -> Result<(), PhaseError> {
        self.export_to(self.config.sort_key, &self.config.output_path)?;
        if let Some(json_path) = &self.config.json_report {
            self.write_json_report(json_path)?;
        }
        Ok(())
    }

    /// Write the tabular report with an explicit sort key and path
    pub fn export_to(
        &self,
        sort_key: SortKey,
        path: impl AsRef<Path>,
    ) -> Result<(), PhaseError> {
        self.ensure_idle()?;
        info!(
            "Exporting {} phase(s) sorted by {}",
            self.records.len(),
            sort_key
        );
        StatsExporter::new(sort_key).write_to_file(&self.phase_stats(), path)?;
        Ok(())
    }

    /// Write timings and statistics of every phase as JSON
    pub fn write_json_report(&self, path: impl AsRef<Path>) -> Result<(), PhaseError> {
        self.ensure_idle()?;
        let report = PhaseReport::from_phases(self.records.iter().map(|r| {
            (r.name.as_str(), r.elapsed, r.brackets, r.capture.stats())
        }));
        write_report(&report, path)?;
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), PhaseError> {
        if self.frames.is_empty() {
            Ok(())
        } else {
            Err(PhaseError::ActivePhases(self.frames.len()))
        }
    }
}

impl<P: ProfileProvider + Default> PhaseStack<P> {
    /// Run `f` inside a bracket of `name`
    ///
    /// The phase is ended on every exit path of `f`, unwinding included.
    /// `f` receives the stack so it can open nested phases.
    pub fn phase<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> R,
    ) -> Result<R, PhaseError> {
        let mut guard = self.enter(name)?;
        let result = f(&mut *guard);
        guard.finish()?;
        Ok(result)
    }

    /// Open a bracket of `name` that ends when the guard is dropped
    pub fn enter(&mut self, name: &str) -> Result<PhaseGuard<'_, P>, PhaseError> {
        self.start(name)?;
        let depth = self.frames.len();
        let index = self.frames[depth - 1].index;
        Ok(PhaseGuard {
            stack: self,
            depth,
            index,
            finished: false,
        })
    }
}

impl<P: ProfileProvider + Default> Default for PhaseStack<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProfileProvider> fmt::Display for PhaseStack<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, elapsed) in self.timings() {
            writeln!(f, "{}: {:.2}s", name, elapsed.as_secs_f64())?;
        }
        Ok(())
    }
}

impl<P: ProfileProvider> fmt::Debug for PhaseStack<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseStack")
            .field(
                "phases",
                &self.records.iter().map(|r| &r.name).collect::<Vec<_>>(),
            )
            .field("depth", &self.frames.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Scoped bracket returned by `PhaseStack::enter`
///
/// Derefs to the stack, so nested phases are entered through the guard.
#[must_use = "the phase ends as soon as the guard is dropped"]
pub struct PhaseGuard<'a, P: ProfileProvider = CallProfiler> {
    stack: &'a mut PhaseStack<P>,
    depth: usize,
    // Record of the guarded phase, to tell its frame apart from a later one
    index: usize,
    finished: bool,
}

impl<P: ProfileProvider> PhaseGuard<'_, P> {
    /// End the bracket now and return its elapsed time
    pub fn finish(mut self) -> Result<Duration, PhaseError> {
        self.finished = true;
        self.close()
    }

    fn close(&mut self) -> Result<Duration, PhaseError> {
        // Own frame already ended through the guard, possibly replaced since
        let owns_frame = matches!(
            self.stack.frames.get(self.depth - 1),
            Some(frame) if frame.index == self.index
        );
        if !owns_frame {
            let name = self.stack.records[self.index].name.clone();
            return Err(PhaseError::GuardedPhaseEnded(name));
        }
        // Inner brackets left open through the guard are closed first
        while self.stack.frames.len() > self.depth {
            self.stack.end()?;
        }
        self.stack.end()
    }
}

impl<P: ProfileProvider> Deref for PhaseGuard<'_, P> {
    type Target = PhaseStack<P>;

    fn deref(&self) -> &Self::Target {
        self.stack
    }
}

impl<P: ProfileProvider> DerefMut for PhaseGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stack
    }
}

impl<P: ProfileProvider> Drop for PhaseGuard<'_, P> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.close() {
            warn!("Failed to end phase on drop: {}", e);
        }
    }
}
