//! Rolling window of recent ticks for one symbol.

use std::collections::VecDeque;
use tickgate_core::{MarketTick, Price, Size};

/// Fixed-size window of the most recent ticks, oldest first.
#[derive(Debug, Clone)]
pub struct TickWindow {
    capacity: usize,
    ticks: VecDeque<MarketTick>,
}

impl TickWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ticks: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a tick, discarding the oldest when full.
    pub fn push(&mut self, tick: MarketTick) {
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
    }

    pub fn ticks(&self) -> &VecDeque<MarketTick> {
        &self.ticks
    }

    pub fn prices(&self) -> Vec<Price> {
        self.ticks.iter().map(|t| t.price).collect()
    }

    pub fn volumes(&self) -> Vec<Size> {
        self.ticks.iter().map(|t| t.volume).collect()
    }

    pub fn latest(&self) -> Option<&MarketTick> {
        self.ticks.back()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ticks.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
