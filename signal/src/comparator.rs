use crate::types::{CrossDirection, TransitionEvent};

/// Relation of the current value to the window mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeanSide {
    Above,
    Below,
    /// No prior evaluation exists. Cold start never alerts.
    Unknown,
}

/// Edge-triggered spot-vs-mean detector.
///
/// `evaluate` fires a `TransitionEvent` only when the side changes between
/// successive evaluations and the previous side was known. The recorded side
/// is updated on every call, whether or not an event fired.
#[derive(Debug)]
pub struct MeanComparator {
    prev: MeanSide,
}

impl MeanComparator {
    pub fn new() -> Self {
        Self {
            prev: MeanSide::Unknown,
        }
    }

    pub fn side(&self) -> MeanSide {
        self.prev
    }

    pub fn evaluate(&mut self, current: f64, mean: f64) -> Option<TransitionEvent> {
        let side = if current > mean {
            MeanSide::Above
        } else {
            MeanSide::Below
        };

        let direction = match (self.prev, side) {
            (MeanSide::Unknown, _) => None,
            (MeanSide::Below, MeanSide::Above) => Some(CrossDirection::Crossover),
            (MeanSide::Above, MeanSide::Below) => Some(CrossDirection::Crossunder),
            _ => None,
        };

        self.prev = side;

        direction.map(|direction| TransitionEvent {
            direction,
            value: current,
            mean,
        })
    }
}

impl Default for MeanComparator {
    fn default() -> Self {
        Self::new()
    }
}
