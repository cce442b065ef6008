//! Link rate control
//!
//! Quality-adaptive selection of coding/modulation modes, split into:
//!
//! - **mode**: mode descriptors, their pure data-rate arithmetic, and
//!   capability negotiation
//! - **thresholds**: the (mode, streams, width) → minimum-quality table and
//!   the PHY quality-model seam
//! - **link**: per-remote-link feedback, decision cache and mode history
//! - **selector**: the search/cache/exploit decision algorithm
//! - **control**: externally dictated overrides that bypass the selector
//!
//! ## Decision flow
//!
//! ```text
//! PHY feedback ──▶ LinkState ──▶ ModeSelector ──▶ TxSelection
//!                                  │    ▲
//!                                  ▼    │ rebuild on miss
//!                             ThresholdTable ◀── QualityModel
//!                                  ▲
//!                 OverrideTable ───┘ (bypasses the search entirely)
//! ```
//!
//! During a warmup window the selector searches the threshold table for the
//! fastest mode the observed quality supports; afterwards it permanently
//! exploits the per-link average of confirmed modes.

pub mod control;
pub mod link;
pub mod mode;
pub mod selector;
pub mod thresholds;

pub use control::{OverrideEntry, OverrideScope, OverrideTable};
pub use link::{LinkId, LinkState};
pub use mode::{
    non_ht_reference_mode, non_ht_reference_rate, DeviceCaps, ModeCatalog, ModeDescriptor,
    ModulationClass, PeerCaps,
};
pub use selector::{ModeSelector, SelectorConfig, TxSelection};
pub use thresholds::{QualityModel, ShannonQualityModel, ThresholdTable};
