//! Confidence-weighted voting over a sliding window of observations

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use super::code::Code;

/// Lowest accepted observation confidence
pub const MIN_CONFIDENCE: f32 = 0.0;
/// Highest accepted observation confidence
pub const MAX_CONFIDENCE: f32 = 100.0;

/// One validated code reading from a single frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    code: Code,
    confidence: f32,
    observed_at_ms: u64,
}

impl Observation {
    /// Create an observation; confidence is clamped into 0-100, NaN counts as 0
    pub fn new(code: Code, confidence: f32, observed_at_ms: u64) -> Self {
        let confidence = if confidence.is_nan() {
            MIN_CONFIDENCE
        } else {
            confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
        };
        Self {
            code,
            confidence,
            observed_at_ms,
        }
    }
}

/// Running tally for one code value inside the window
#[derive(Debug, Clone, Copy)]
struct Tally {
    total: f64,
    latest_ms: u64,
    latest_index: usize,
}

/// Bounded FIFO window of observations with a weighted estimate
#[derive(Debug, Clone)]
pub struct VotingAggregator {
    window: VecDeque<Observation>,
    capacity: usize,
}

impl VotingAggregator {
    /// Create an aggregator holding at most `capacity` observations (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Append an observation, evicting the oldest one past capacity.
    /// Returns the evicted observation, if any.
    pub fn record(&mut self, observation: Observation) -> Option<Observation> {
        self.window.push_back(observation);
        if self.window.len() > self.capacity {
            self.window.pop_front()
        } else {
            None
        }
    }

    /// Total confidence in the window for `code`
    pub fn total_confidence(&self, code: &Code) -> f64 {
        self.window
            .iter()
            .filter(|o| &o.code == code)
            .map(|o| f64::from(o.confidence))
            .sum()
    }

    /// Code with the highest summed confidence.
    ///
    /// Equal sums go to the code observed most recently (by timestamp), then
    /// to the one recorded last.
    pub fn current_estimate(&self) -> Option<Code> {
        let mut tallies: HashMap<&Code, Tally> = HashMap::new();
        for (index, observation) in self.window.iter().enumerate() {
            let tally = tallies.entry(&observation.code).or_insert(Tally {
                total: 0.0,
                latest_ms: observation.observed_at_ms,
                latest_index: index,
            });
            tally.total += f64::from(observation.confidence);
            tally.latest_ms = tally.latest_ms.max(observation.observed_at_ms);
            tally.latest_index = index;
        }

        tallies
            .into_iter()
            .max_by(|(_, a), (_, b)| {
                a.total
                    .total_cmp(&b.total)
                    .then(a.latest_ms.cmp(&b.latest_ms))
                    .then(a.latest_index.cmp(&b.latest_index))
            })
            .map(|(code, _)| code.clone())
    }
}
