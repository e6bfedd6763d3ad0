use std::collections::VecDeque;

/// Fixed-capacity moving average over per-interval hit counts
///
/// Holds at most `capacity` samples. The running sum is kept as an integer,
/// so [`average`](Self::average) is the exact mean of the retained samples.
#[derive(Debug, Clone)]
pub struct MovingWindow {
    /// Retained samples, oldest first
    samples: VecDeque<u64>,
    /// Maximum number of samples retained
    capacity: usize,
    /// Sum of `samples`
    sum: u128,
}

impl MovingWindow {
    /// Create an empty window. A capacity of zero is treated as one.
    /// Storage grows with the samples pushed, not with `capacity`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::new(),
            capacity,
            sum: 0,
        }
    }

    /// Add the newest sample, evicting the oldest once the window is full
    pub fn push(&mut self, sample: u64) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= u128::from(oldest);
            }
        }
        self.samples.push_back(sample);
        self.sum += u128::from(sample);
    }

    /// Mean of the retained samples; `0.0` when empty
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum as f64 / self.samples.len() as f64
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been pushed yet
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether warm-up is over
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Samples currently held, oldest first
    pub fn samples(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }
}
