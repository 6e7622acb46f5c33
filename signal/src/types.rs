use std::fmt;

use market::types::TrackedKey;

/// Direction of a spot-vs-mean transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    /// Value moved from below the mean to above it.
    Crossover,
    /// Value moved from above the mean to below it.
    Crossunder,
}

impl fmt::Display for CrossDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrossDirection::Crossover => "crossover",
            CrossDirection::Crossunder => "crossunder",
        };
        f.write_str(s)
    }
}

/// Emitted by the comparator exactly once per state change.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub direction: CrossDirection,
    pub value: f64,
    pub mean: f64,
}

/// A transition bound to its tracked series, handed to the policy layer.
#[derive(Debug, Clone)]
pub struct TransitionAlert {
    pub key: TrackedKey,
    pub event: TransitionEvent,
    pub bar_close_ms: u64,
}
