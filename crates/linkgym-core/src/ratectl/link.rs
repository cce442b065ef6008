//! Per-link selection state
//!
//! One record per remote link: the raw quality feedback from the most recent
//! exchange, a memo of the last decision, and the append-only history of
//! confirmed mode indices that feeds the exploitation regime.

use super::mode::{ModeDescriptor, PeerCaps};

/// Identifier of a remote link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u32);

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link{}", self.0)
    }
}

/// Mutable per-link record, owned exclusively by the selector
#[derive(Debug, Clone)]
pub struct LinkState {
    /// Capabilities negotiated with the peer
    pub peer: PeerCaps,
    /// Quality (dB) reported by the most recent exchange
    pub last_quality_db: f64,
    /// Channel width the last observation was made at
    pub last_width_mhz: u16,
    /// Stream count the last observation was made at
    pub last_nss: u8,
    /// Quality the cached decision was computed for; `None` until the first
    /// search completes or after a reset
    pub cached_quality_db: Option<f64>,
    /// Width the cached decision was computed for
    pub cached_width_mhz: u16,
    /// The cached mode; the catalog default until the first search
    pub cached_mode: ModeDescriptor,
    /// Stream count of the cached decision
    pub cached_nss: u8,
    /// Confirmed mode indices, append-only for the run's lifetime
    pub history: Vec<u8>,
}

impl LinkState {
    /// Fresh state for a link, created on the first transmission attempt
    pub fn new(peer: PeerCaps, default_mode: ModeDescriptor) -> Self {
        Self {
            peer,
            last_quality_db: 0.0,
            last_width_mhz: 0,
            last_nss: 1,
            cached_quality_db: None,
            cached_width_mhz: 0,
            cached_mode: default_mode,
            cached_nss: 1,
            history: Vec::new(),
        }
    }

    /// Return every field to its default and clear the history.
    ///
    /// Called on a terminal failure signal (final retry exhausted); the
    /// next selection starts from scratch.
    pub fn reset(&mut self, default_mode: ModeDescriptor) {
        self.last_quality_db = 0.0;
        self.last_width_mhz = 0;
        self.last_nss = 1;
        self.cached_quality_db = None;
        self.cached_width_mhz = 0;
        self.cached_mode = default_mode;
        self.cached_nss = 1;
        self.history.clear();
    }

    /// Mean of the confirmed mode indices, `None` while the history is empty
    pub fn history_mean(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let sum: u64 = self.history.iter().map(|&i| u64::from(i)).sum();
        Some(sum as f64 / self.history.len() as f64)
    }
}
