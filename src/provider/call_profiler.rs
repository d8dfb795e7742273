//! Instrumentation-based call profiler.
//!
//! Call sites are instrumented with `CallSpan` guards (or the
//! `profile_call!` macro). While a `CallProfiler` is enabled its collector is
//! registered on the current thread, and every span entered on that thread is
//! recorded into every registered collector. Nested phases therefore each see
//! the calls made while they were open.

use super::stats::{CallSite, CallSiteStats, ProfileStats};
use super::ProfileProvider;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::{Duration, Instant};

thread_local! {
    static ACTIVE: RefCell<Vec<Rc<RefCell<Collector>>>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` against every collector registered on this thread
fn with_active(f: impl Fn(&mut Collector)) {
    // try_with: spans may drop during thread teardown
    let _ = ACTIVE.try_with(|active| {
        for collector in active.borrow().iter() {
            f(&mut collector.borrow_mut());
        }
    });
}

/// An open invocation inside a collector
struct Frame {
    site: CallSite,
    started: Instant,
    child_time: Duration,
}

/// Accumulator behind one `CallProfiler`
#[derive(Default)]
struct Collector {
    rows: HashMap<CallSite, CallSiteStats>,
    // First-seen order keeps snapshots deterministic
    order: Vec<CallSite>,
    frames: Vec<Frame>,
    // Open invocations per site, for recursion detection
    depth: HashMap<CallSite, u32>,
}

impl Collector {
    fn enter(&mut self, site: &CallSite, now: Instant) {
        if !self.rows.contains_key(site) {
            self.order.push(site.clone());
            self.rows.insert(site.clone(), CallSiteStats::new(site.clone()));
        }

        let depth = self.depth.entry(site.clone()).or_insert(0);
        if let Some(row) = self.rows.get_mut(site) {
            row.ncalls += 1;
            if *depth == 0 {
                row.pcalls += 1;
            }
        }
        *depth += 1;

        self.frames.push(Frame {
            site: site.clone(),
            started: now,
            child_time: Duration::ZERO,
        });
    }

    /// Close the innermost open invocation of `site`
    ///
    /// Frames above it belong to spans dropped out of order and are closed
    /// at the same instant.
    fn exit(&mut self, site: &CallSite, now: Instant) {
        // No frame for spans entered before enable or already closed above
        let Some(position) = self.frames.iter().rposition(|f| &f.site == site) else {
            return;
        };
        while self.frames.len() > position {
            self.pop_frame(now);
        }
    }

    /// Close every open frame at `now`
    fn flush(&mut self, now: Instant) {
        while !self.frames.is_empty() {
            self.pop_frame(now);
        }
    }

    fn pop_frame(&mut self, now: Instant) {
        let Some(frame) = self.frames.pop() else {
            return;
        };

        let elapsed = now.saturating_duration_since(frame.started);
        let own = elapsed.saturating_sub(frame.child_time);

        let outermost = match self.depth.get_mut(&frame.site) {
            Some(depth) => {
                *depth = depth.saturating_sub(1);
                *depth == 0
            }
            None => true,
        };

        if let Some(row) = self.rows.get_mut(&frame.site) {
            row.tottime += own;
            if outermost {
                row.cumtime += elapsed;
            }
        }

        if let Some(parent) = self.frames.last_mut() {
            parent.child_time += elapsed;
        }
    }

    fn snapshot(&self) -> ProfileStats {
        let rows = self
            .order
            .iter()
            .filter_map(|site| self.rows.get(site).cloned())
            .collect();
        ProfileStats::from_rows(rows)
    }
}

/// Default profiling provider: records instrumented calls while enabled
///
/// Statistics accumulate across enable/disable cycles.
pub struct CallProfiler {
    collector: Rc<RefCell<Collector>>,
    enabled: bool,
}

impl CallProfiler {
    pub fn new() -> Self {
        Self {
            collector: Rc::new(RefCell::new(Collector::default())),
            enabled: false,
        }
    }
}

impl Default for CallProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileProvider for CallProfiler {
    fn enable(&mut self) {
        if self.enabled {
            return;
        }
        let collector = Rc::clone(&self.collector);
        let _ = ACTIVE.try_with(|active| active.borrow_mut().push(collector));
        self.enabled = true;
        debug!("Call collector enabled");
    }

    fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.collector.borrow_mut().flush(Instant::now());
        let _ = ACTIVE.try_with(|active| {
            active
                .borrow_mut()
                .retain(|c| !Rc::ptr_eq(c, &self.collector))
        });
        self.enabled = false;
        debug!("Call collector disabled");
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn stats(&self) -> ProfileStats {
        self.collector.borrow().snapshot()
    }
}

impl Drop for CallProfiler {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Guard recording one invocation of a call site
///
/// Entering records the call; dropping records its duration.
#[must_use = "the call is timed until the span is dropped"]
pub struct CallSpan {
    site: CallSite,
    // Spans belong to the thread whose collectors they feed
    _not_send: PhantomData<*const ()>,
}

impl CallSpan {
    pub fn enter(site: CallSite) -> Self {
        let now = Instant::now();
        with_active(|collector| collector.enter(&site, now));
        Self {
            site,
            _not_send: PhantomData,
        }
    }

    /// Time `f` as one call of `site`
    pub fn scoped<R>(site: CallSite, f: impl FnOnce() -> R) -> R {
        let _span = Self::enter(site);
        f()
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }
}

impl Drop for CallSpan {
    fn drop(&mut self) {
        let now = Instant::now();
        with_active(|collector| collector.exit(&self.site, now));
    }
}

/// Number of collectors currently registered on this thread
pub fn active_collectors() -> usize {
    ACTIVE.try_with(|active| active.borrow().len()).unwrap_or(0)
}

/// Instrument the enclosing scope as a call of `name`
///
/// ```ignore
/// fn parse() {
///     let _span = profile_call!("parse");
///     // ...
/// }
/// ```
#[macro_export]
macro_rules! profile_call {
    ($name:expr) => {
        $crate::provider::CallSpan::enter($crate::provider::CallSite::new(
            file!(),
            line!(),
            $name,
        ))
    };
}
