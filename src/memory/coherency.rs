//! Pool coherency tracking.
//!
//! A pool is `Incoherent` while lazily freed blocks are still parked in the
//! used tables. Fragmentation numbers taken in that state count those blocks
//! as used, so reports only carry metrics once a clean pass has run.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Whether pending frees have been consolidated into the free index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoherencyStatus {
    Coherent,
    Incoherent,
}

impl std::fmt::Display for CoherencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coherent => write!(f, "coherent"),
            Self::Incoherent => write!(f, "incoherent"),
        }
    }
}

/// Coherency state machine of one pool.
#[derive(Debug, Clone)]
pub struct CoherencyMonitor {
    status: CoherencyStatus,
    pending_frees: u64,
    passes: u64,
    last_pass: Option<Instant>,
}

impl Default for CoherencyMonitor {
    fn default() -> Self {
        Self {
            status: CoherencyStatus::Coherent,
            pending_frees: 0,
            passes: 0,
            last_pass: None,
        }
    }
}

impl CoherencyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lazy free.
    pub fn note_free(&mut self) {
        self.pending_frees += 1;
        self.status = CoherencyStatus::Incoherent;
    }

    /// Record a completed clean pass.
    pub fn mark_coherent(&mut self) {
        self.pending_frees = 0;
        self.passes += 1;
        self.last_pass = Some(Instant::now());
        self.status = CoherencyStatus::Coherent;
    }

    /// Forget pending frees without counting a pass (reset/destroy).
    pub fn reset(&mut self) {
        self.pending_frees = 0;
        self.status = CoherencyStatus::Coherent;
    }

    pub fn status(&self) -> CoherencyStatus {
        self.status
    }

    pub fn is_coherent(&self) -> bool {
        self.status == CoherencyStatus::Coherent
    }

    pub fn pending_frees(&self) -> u64 {
        self.pending_frees
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn last_pass(&self) -> Option<Instant> {
        self.last_pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_coherent() {
        let monitor = CoherencyMonitor::new();
        assert!(monitor.is_coherent());
        assert_eq!(monitor.passes(), 0);
        assert!(monitor.last_pass().is_none());
    }

    #[test]
    fn test_free_then_clean_cycle() {
        let mut monitor = CoherencyMonitor::new();
        monitor.note_free();
        monitor.note_free();
        assert_eq!(monitor.status(), CoherencyStatus::Incoherent);
        assert_eq!(monitor.pending_frees(), 2);

        monitor.mark_coherent();
        assert!(monitor.is_coherent());
        assert_eq!(monitor.pending_frees(), 0);
        assert_eq!(monitor.passes(), 1);
        assert!(monitor.last_pass().is_some());
    }

    #[test]
    fn test_reset_does_not_count_pass() {
        let mut monitor = CoherencyMonitor::new();
        monitor.note_free();
        monitor.reset();
        assert!(monitor.is_coherent());
        assert_eq!(monitor.passes(), 0);
    }
}
