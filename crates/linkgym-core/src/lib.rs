//! # Link-Adaptive Rate Control Library
//!
//! This crate implements quality-adaptive transmission-mode selection for
//! simulated Wi-Fi links, together with a step-synchronized exchange loop
//! that lets an external agent observe the link and override the selector's
//! decisions.
//!
//! ## Overview
//!
//! Each station tracks a quality figure (an SNR in dB) per peer link and
//! picks the fastest transmission mode whose precomputed quality threshold
//! the link still clears. The selector runs two regimes:
//!
//! - **Warmup**: exhaustive threshold search over the negotiated mode
//!   catalog, caching the result until the observed quality changes
//! - **Exploitation**: after the warmup deadline, the rounded-up mean of
//!   the modes chosen so far becomes the fixed operating point
//!
//! An external controller may bypass both regimes entirely through the
//! override table, per link or globally.
//!
//! ## Decision Flow
//!
//! ```text
//! quality report → normalize → override? ─yes→ forced mode
//!                                  │no
//!                         warmup passed? ─yes→ ceil(mean(history))
//!                                  │no
//!                            cache valid? ─yes→ cached mode
//!                                  │no
//!                        threshold search → cache + history
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use linkgym_core::prelude::*;
//!
//! use linkgym_core::ratectl::ShannonQualityModel;
//!
//! let caps = DeviceCaps::default();
//! let config = SelectorConfig::default();
//! let mut selector = ModeSelector::new(caps, ShannonQualityModel, config).unwrap();
//!
//! let link = LinkId(0);
//! selector.register_link(link, PeerCaps::default());
//! selector.report_data_ok(link, 23.5, 20, 1);
//! let tx = selector.select_data_mode(link, 20, 500).unwrap();
//! println!("sending with {}", tx.mode);
//! ```

pub mod error;
pub mod gym;
pub mod ratectl;
pub mod sim;

// Re-export main types
pub use error::{LinkGymError, Result};
pub use gym::{Action, ActionValue, EnvConfig, Measurement, StepLoop, StepOutcome, Transport};
pub use ratectl::{
    DeviceCaps, LinkId, ModeCatalog, ModeDescriptor, ModeSelector, ModulationClass, OverrideScope,
    PeerCaps, SelectorConfig, ShannonQualityModel, ThresholdTable, TxSelection,
};
pub use sim::Scheduler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{LinkGymError, Result};
    pub use crate::gym::{Action, ActionValue, EnvConfig, Measurement, StepLoop, Transport};
    pub use crate::ratectl::{
        DeviceCaps, LinkId, ModeDescriptor, ModeSelector, ModulationClass, OverrideScope, PeerCaps,
        SelectorConfig, TxSelection,
    };
    pub use crate::sim::Scheduler;
}
