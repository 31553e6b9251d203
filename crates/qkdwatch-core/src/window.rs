//! Bounded sliding window over detected events and its six-feature fingerprint.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::quantum::Basis;
use crate::stream::Event;

/// Events held by a full window.
pub const DEFAULT_WINDOW_SIZE: usize = 500;

/// Dimensionality of a [`Fingerprint`].
pub const FEATURE_COUNT: usize = 6;

/// Feature names in [`Fingerprint::to_array`] order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "qber_overall",
    "qber_rectilinear",
    "qber_diagonal",
    "voltage",
    "jitter",
    "count_rate",
];

/// Window statistics consumed by the detection cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Sifted error rate over all basis-matched pairs.
    pub qber_overall: f64,
    /// Sifted error rate where the sender used the rectilinear basis.
    pub qber_rectilinear: f64,
    /// Sifted error rate where the sender used the diagonal basis.
    pub qber_diagonal: f64,
    /// Mean bias voltage (V).
    pub voltage: f64,
    /// Mean timing jitter (ns).
    pub jitter: f64,
    /// Detected events per tick across the window.
    pub count_rate: f64,
}

impl Fingerprint {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.qber_overall,
            self.qber_rectilinear,
            self.qber_diagonal,
            self.voltage,
            self.jitter,
            self.count_rate,
        ]
    }

    pub fn from_array(v: [f64; FEATURE_COUNT]) -> Self {
        Self {
            qber_overall: v[0],
            qber_rectilinear: v[1],
            qber_diagonal: v[2],
            voltage: v[3],
            jitter: v[4],
            count_rate: v[5],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|x| x.is_finite())
    }
}

/// Ratio that is 0 when the denominator is 0.
fn safe_ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Ring buffer of the most recent `capacity` events.
///
/// Alongside each event the window keeps the number of ticks that elapsed
/// since the previous event, so the detection rate covers exactly the ticks
/// spanned by the events currently held.
#[derive(Debug, Clone)]
pub struct EventWindow {
    capacity: usize,
    events: VecDeque<Event>,
    spans: VecDeque<u64>,
    span_sum: u64,
    pending_ticks: u64,
}

impl Default for EventWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl EventWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
            spans: VecDeque::with_capacity(capacity),
            span_sum: 0,
            pending_ticks: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True once the window has held `capacity` events; stays true.
    pub fn is_ready(&self) -> bool {
        self.events.len() == self.capacity
    }

    /// Record that one stream tick elapsed.
    pub fn tick(&mut self) {
        self.pending_ticks += 1;
    }

    /// Append an event, evicting the oldest when full.
    pub fn push(&mut self, event: Event) {
        let span = self.pending_ticks.max(1);
        self.pending_ticks = 0;
        if self.events.len() == self.capacity {
            self.events.pop_front();
            if let Some(old) = self.spans.pop_front() {
                self.span_sum -= old;
            }
        }
        self.events.push_back(event);
        self.spans.push_back(span);
        self.span_sum += span;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Compute the fingerprint in one pass. `None` until the window is full.
    pub fn extract_features(&self) -> Option<Fingerprint> {
        if !self.is_ready() {
            return None;
        }

        let mut matched = [0usize; 2];
        let mut errors = [0usize; 2];
        let mut voltage = 0.0;
        let mut jitter = 0.0;
        for e in &self.events {
            voltage += e.voltage;
            jitter += e.jitter;
            if e.bases_match() {
                let b = match e.sender_basis {
                    Basis::Rectilinear => 0,
                    Basis::Diagonal => 1,
                };
                matched[b] += 1;
                if e.sender_bit != e.receiver_bit {
                    errors[b] += 1;
                }
            }
        }

        let n = self.events.len() as f64;
        Some(Fingerprint {
            qber_overall: safe_ratio(errors[0] + errors[1], matched[0] + matched[1]),
            qber_rectilinear: safe_ratio(errors[0], matched[0]),
            qber_diagonal: safe_ratio(errors[1], matched[1]),
            voltage: voltage / n,
            jitter: jitter / n,
            count_rate: n / self.span_sum as f64,
        })
    }
}
