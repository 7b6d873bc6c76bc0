//! The shared optimization context: events, diagnostics and statistics.
//!
//! One context serves a whole module; functions may be optimized on
//! different threads against the same context, so everything here is
//! thread-safe behind shared references. Function-local analysis tables
//! never live here - each pass run owns its own.

use std::sync::Mutex;

use dashmap::{DashMap, DashSet};

/// What an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A pass changed the function.
    PassChange,
    /// Dominator refinement found an irreducible region.
    IrreducibleCfg,
    /// A variable was read with no reaching definition.
    UninitializedRead,
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The pass or analysis that recorded it.
    pub source: &'static str,
    /// The function it happened in.
    pub function: String,
    /// Human-readable detail.
    pub message: String,
}

/// The shared per-module optimization context.
#[derive(Debug, Default)]
pub struct OptContext {
    events: Mutex<Vec<Event>>,
    /// `(function, symbol)` pairs already diagnosed as read-uninitialized;
    /// the diagnostic is emitted at most once per variable.
    warned_uninitialized: DashSet<(String, String)>,
    /// Change counts by pass name.
    stats: DashMap<&'static str, usize>,
}

impl OptContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event.
    pub fn record(&self, kind: EventKind, source: &'static str, function: &str, message: String) {
        self.events
            .lock()
            .expect("event log poisoned")
            .push(Event {
                kind,
                source,
                function: function.to_string(),
                message,
            });
    }

    /// Emits the "read with no reaching definition" diagnostic for
    /// `symbol`, unless it was already emitted for this variable. Returns
    /// `true` if the event was recorded.
    pub fn warn_uninitialized(&self, function: &str, symbol: &str) -> bool {
        if !self
            .warned_uninitialized
            .insert((function.to_string(), symbol.to_string()))
        {
            return false;
        }
        self.record(
            EventKind::UninitializedRead,
            "const-prop",
            function,
            format!("'{symbol}' may be used before it is assigned a value"),
        );
        true
    }

    /// Adds to a pass's change counter.
    pub fn count_changes(&self, pass: &'static str, changes: usize) {
        *self.stats.entry(pass).or_insert(0) += changes;
    }

    /// Total recorded changes for `pass`.
    #[must_use]
    pub fn changes_of(&self, pass: &'static str) -> usize {
        self.stats.get(pass).map_or(0, |c| *c)
    }

    /// Drains and returns every recorded event.
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().expect("event log poisoned"))
    }

    /// Number of events currently recorded.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().expect("event log poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_warning_suppresses_repeats() {
        let ctx = OptContext::new();
        assert!(ctx.warn_uninitialized("f", "x"));
        assert!(!ctx.warn_uninitialized("f", "x"));
        assert!(ctx.warn_uninitialized("f", "y"));
        assert!(ctx.warn_uninitialized("g", "x"));
        assert_eq!(ctx.event_count(), 3);
    }

    #[test]
    fn test_change_counters() {
        let ctx = OptContext::new();
        ctx.count_changes("licm", 2);
        ctx.count_changes("licm", 3);
        assert_eq!(ctx.changes_of("licm"), 5);
        assert_eq!(ctx.changes_of("dce"), 0);
    }
}
