//! Nested phase timing for sccache
//!
//! A [`Timer`] accumulates wall-clock durations per named phase, in the order
//! the phases were first started. Starting a phase implicitly stops the one
//! that was running, so a pipeline only has to announce where it is:
//!
//! ```
//! use sccache_timing::Timer;
//!
//! let mut timer = Timer::new();
//! timer.start("pp");
//! timer.start("hash");
//! let summary = timer.summary();
//! assert!(summary.contains("pp: "));
//! assert!(summary.contains("hash: "));
//! ```
//!
//! Work delegated to another layer (a blob store request, a background
//! upload) records into a *group*: [`Timer::start_group`] starts the phase on
//! the parent and hands back a child timer. When the parent renders, the
//! phase shows the child's own breakdown instead of a bare number.
//!
//! Timers are plain values passed by `&mut`; there is no process-wide
//! "current timer". Code that wants to record a phase takes the timer it
//! should record into as an argument.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::time::{Duration, Instant};

/// Phase name that collects untracked time between an explicit stop and the
/// next phase.
pub const OTHER_PHASE: &str = "other";

/// Gaps shorter than this are not worth an `other` entry.
const MIN_OTHER_GAP: Duration = Duration::from_millis(1);

/// Accumulated phase durations plus nested group timers.
///
/// Serializes its finished phases and groups only; a deserialized timer has
/// no active phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timer {
    timings: IndexMap<String, Duration>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    groups: HashMap<String, Timer>,
    #[serde(skip)]
    current: Option<(String, Instant)>,
    #[serde(skip)]
    idle_since: Option<Instant>,
}

impl Timer {
    /// Create an empty timer with no active phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the active phase (if any) and start timing `name`.
    pub fn start(&mut self, name: impl Into<String>) {
        self.start_at(name.into(), Instant::now());
    }

    /// Start `name` like [`Timer::start`] and return a fresh child timer for
    /// the delegated work done during that phase.
    ///
    /// Restarting a group replaces the previous child.
    pub fn start_group(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.start_at(name.clone(), Instant::now());
        match self.groups.entry(name) {
            Entry::Occupied(mut entry) => {
                entry.insert(Self::new());
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(Self::new()),
        }
    }

    /// Stop the active phase without starting another one.
    ///
    /// Time spent until the next phase starts is booked under
    /// [`OTHER_PHASE`] when it exceeds a millisecond.
    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    fn start_at(&mut self, name: String, now: Instant) {
        self.stop_at(now);
        self.idle_since = None;
        self.current = Some((name, now));
    }

    fn stop_at(&mut self, end: Instant) {
        if let Some(idle) = self.idle_since {
            let gap = end.saturating_duration_since(idle);
            if gap >= MIN_OTHER_GAP {
                self.record(OTHER_PHASE, gap);
            }
            self.idle_since = Some(end);
        }

        let Some((name, began)) = self.current.take() else {
            return;
        };
        self.idle_since = Some(end);
        self.record(&name, end.saturating_duration_since(began));
        if let Some(group) = self.groups.get_mut(&name) {
            group.stop_at(end);
        }
    }

    fn record(&mut self, name: &str, duration: Duration) {
        *self.timings.entry(name.to_string()).or_default() += duration;
    }

    /// Name of the phase currently being timed.
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.current.as_ref().map(|(name, _)| name.as_str())
    }

    /// Accumulated duration of a finished phase.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Duration> {
        self.timings.get(name).copied()
    }

    /// Child timer created by [`Timer::start_group`] for `name`.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Self> {
        self.groups.get(name)
    }

    /// Finished phases in the order they were first started.
    pub fn phases(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.timings
            .iter()
            .map(|(name, duration)| (name.as_str(), *duration))
    }

    /// Sum of all finished phases.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.timings.values().sum()
    }

    /// Stop the active phase and render the summary line.
    pub fn summary(&mut self) -> String {
        self.stop();
        self.to_string()
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Renders `total (phase: value; ...)` in milliseconds with two decimals.
/// A phase backed by a group renders the group recursively.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} (", millis(self.total()))?;
        for (index, (name, duration)) in self.timings.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            match self.groups.get(name) {
                Some(group) => write!(f, "{name}: {group}")?,
                None => write!(f, "{name}: {:.2}", millis(*duration))?,
            }
        }
        f.write_str(")")
    }
}
