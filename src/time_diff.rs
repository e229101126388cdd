//! Modular trigger-time comparator.
//!
//! The board's trigger-time counter wraps at `max_trigger_time`, so "how far
//! apart are these two timestamps" has to be measured on a circle rather than
//! a line.

/// Compares trigger times modulo `max_trigger_time`.
#[derive(Debug, Clone, Copy)]
pub struct TimeDiff {
    max_trigger_time: u32,
    time_threshold: u32,
    half_max: u32,
}

impl TimeDiff {
    pub fn new(max_trigger_time: u32, time_threshold: u32) -> Self {
        Self {
            max_trigger_time,
            time_threshold,
            half_max: max_trigger_time / 2,
        }
    }

    pub fn max_trigger_time(&self) -> u32 {
        self.max_trigger_time
    }

    pub fn time_threshold(&self) -> u32 {
        self.time_threshold
    }

    /// Shortest distance between `new` and `old` on a circle of circumference
    /// `max_trigger_time`. The `> half_max` test is strict so the midpoint
    /// maps to `abs_diff`, keeping the function single-valued.
    pub fn distance(&self, new: u32, old: u32) -> u32 {
        let abs_diff = new.abs_diff(old);
        if abs_diff > self.half_max {
            self.max_trigger_time - abs_diff
        } else {
            abs_diff
        }
    }

    pub fn within_threshold(&self, new: u32, old: u32) -> bool {
        self.distance(new, old) <= self.time_threshold
    }
}
