//! Sequential phase timer.
//!
//! Lighter than `PhaseStack`: no captures and no nesting. Starting a phase
//! ends whichever phase was running, so a program can be split into
//! consecutive stages with one call per stage boundary.

use crate::utils::error::PhaseError;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct PhaseTimer {
    current: Option<(String, Instant)>,
    // Ended phases in first-end order
    times: Vec<(String, Duration)>,
    index: HashMap<String, usize>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `name`, ending the running phase first
    ///
    /// Returns the elapsed time of the phase that was ended, if any.
    pub fn start_phase(&mut self, name: &str) -> Option<Duration> {
        let ended = self.end_phase().ok();
        self.current = Some((name.to_string(), Instant::now()));
        debug!("Timer phase '{}' started", name);
        ended
    }

    /// End the running phase and add its time to the phase total
    pub fn end_phase(&mut self) -> Result<Duration, PhaseError> {
        let (name, started) = self.current.take().ok_or(PhaseError::EmptyStack)?;
        let elapsed = started.elapsed();
        let index = self.slot(name);
        self.times[index].1 += elapsed;
        Ok(elapsed)
    }

    /// Run `f` as phase `name`, ending it afterwards even on unwind
    pub fn phase<R>(&mut self, name: &str, f: impl FnOnce() -> R) -> R {
        struct EndOnDrop<'a>(&'a mut PhaseTimer);

        impl Drop for EndOnDrop<'_> {
            fn drop(&mut self) {
                let _ = self.0.end_phase();
            }
        }

        self.start_phase(name);
        let _end = EndOnDrop(self);
        f()
    }

    pub fn current_phase(&self) -> Option<&str> {
        self.current.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        self.index.get(name).map(|&i| self.times[i].1)
    }

    /// Totals of ended phases; a running phase is not listed
    pub fn times(&self) -> impl Iterator<Item = (&str, Duration)> + '_ {
        self.times.iter().map(|(name, d)| (name.as_str(), *d))
    }

    fn slot(&mut self, name: String) -> usize {
        if let Some(&i) = self.index.get(&name) {
            return i;
        }
        self.times.push((name.clone(), Duration::ZERO));
        self.index.insert(name, self.times.len() - 1);
        self.times.len() - 1
    }
}

impl fmt::Display for PhaseTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Times:")?;
        for (name, elapsed) in self.times() {
            writeln!(
                f,
                "    {:<20} {:.2}s",
                format!("{}:", name),
                elapsed.as_secs_f64()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::thread;

    #[test]
    fn test_start_phase_ends_previous() {
        let mut timer = PhaseTimer::new();
        assert!(timer.start_phase("read").is_none());
        thread::sleep(Duration::from_millis(5));

        let ended = timer.start_phase("write").unwrap();
        assert!(ended >= Duration::from_millis(5));
        assert_eq!(timer.elapsed("read"), Some(ended));
        assert_eq!(timer.current_phase(), Some("write"));
    }

    #[test]
    fn test_repeated_phase_accumulates() {
        let mut timer = PhaseTimer::new();
        timer.phase("step", || thread::sleep(Duration::from_millis(2)));
        let after_one = timer.elapsed("step").unwrap();

        timer.phase("step", || thread::sleep(Duration::from_millis(2)));
        assert!(timer.elapsed("step").unwrap() > after_one);
        assert_eq!(timer.times().count(), 1);
    }

    #[test]
    fn test_end_without_phase() {
        let mut timer = PhaseTimer::new();
        assert!(matches!(timer.end_phase(), Err(PhaseError::EmptyStack)));
    }

    #[test]
    fn test_phase_ends_on_panic() {
        let mut timer = PhaseTimer::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            timer.phase("explode", || panic!("stage failed"));
        }));
        assert!(outcome.is_err());
        assert!(timer.current_phase().is_none());
        assert!(timer.elapsed("explode").is_some());
    }

    #[test]
    fn test_running_phase_not_listed() {
        let mut timer = PhaseTimer::new();
        timer.phase("parse", || ());
        timer.start_phase("emit");

        assert_eq!(timer.current_phase(), Some("emit"));
        assert!(timer.elapsed("emit").is_none());
        assert_eq!(timer.times().count(), 1);
        assert_eq!(timer.to_string(), "Times:\n    parse:               0.00s\n");

        timer.end_phase().unwrap();
        assert_eq!(timer.times().count(), 2);
    }

    #[test]
    fn test_display() {
        let mut timer = PhaseTimer::new();
        timer.phase("parse", || ());
        assert_eq!(timer.to_string(), "Times:\n    parse:               0.00s\n");
    }
}
