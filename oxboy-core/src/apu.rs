//! Audio integration point.
//!
//! Channel synthesis lives in the host audio backend; the core only routes
//! register traffic for 0xFF10-0xFF3F through the I/O register file and keeps
//! the sample clock the backend paces itself against.

#[derive(Debug, Clone, Copy, Default)]
pub struct ApuState {
    clock: u64,
}

impl ApuState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, cycles: u32) {
        self.clock += u64::from(cycles);
    }

    /// Total dots elapsed, for the host to derive how many samples to pull.
    pub fn sample_clock(&self) -> u64 {
        self.clock
    }
}
