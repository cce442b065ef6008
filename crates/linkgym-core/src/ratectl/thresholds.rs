//! Minimum-quality thresholds per transmission mode
//!
//! The table maps (mode, stream count, channel width) to the minimum link
//! quality (dB) at which that combination still meets the target error rate.
//! It is built wholesale from the mode catalog and a PHY quality model, and
//! rebuilt wholesale when a lookup misses (a miss signals that capabilities
//! changed at runtime).

use super::mode::{DeviceCaps, ModeCatalog, ModeDescriptor, ModulationClass};
use std::collections::HashMap;
use tracing::debug;

/// PHY-layer quality calculator.
///
/// Implementations answer: how much link quality does this mode need, at
/// this width and stream count, to stay under the target error rate?
pub trait QualityModel {
    /// Minimum quality in dB for the mode to meet `target_error_rate`
    fn required_quality_db(
        &self,
        mode: &ModeDescriptor,
        width_mhz: u16,
        guard_ns: u16,
        nss: u8,
        target_error_rate: f64,
    ) -> f64;
}

/// SNR-gap-to-capacity quality model.
///
/// Required per-stream SNR is `gap * (2^se - 1)` where `se` is the mode's
/// per-stream spectral efficiency and the gap widens as the target error
/// rate tightens. Monotone in data rate for fixed width and stream count,
/// which is all the selector contract needs.
#[derive(Debug, Clone, Default)]
pub struct ShannonQualityModel;

impl QualityModel for ShannonQualityModel {
    fn required_quality_db(
        &self,
        mode: &ModeDescriptor,
        width_mhz: u16,
        guard_ns: u16,
        nss: u8,
        target_error_rate: f64,
    ) -> f64 {
        let rate = mode.data_rate(width_mhz, guard_ns, nss) as f64;
        let se = rate / f64::from(nss) / (f64::from(width_mhz) * 1e6);
        let gap = -(5.0 * target_error_rate).ln() / 1.5;
        let snr = gap * (2f64.powf(se) - 1.0);
        10.0 * snr.log10()
    }
}

/// Key of one threshold entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ThresholdKey {
    mode: ModeDescriptor,
    nss: u8,
    width_mhz: u16,
}

/// Map of (mode, nss, width) to minimum quality in dB.
///
/// At most one entry per key. `lookup` never answers from a stale table:
/// the caller rebuilds on a miss and retries exactly once; a second miss is
/// a fatal capability/table desynchronization surfaced by the selector.
#[derive(Debug, Default)]
pub struct ThresholdTable {
    entries: HashMap<ThresholdKey, f64>,
}

impl ThresholdTable {
    /// Build (or rebuild) the table for every combination the catalog and
    /// device capabilities permit. Discards all previous entries.
    pub fn build<M: QualityModel>(
        &mut self,
        catalog: &ModeCatalog,
        model: &M,
        caps: &DeviceCaps,
        target_error_rate: f64,
    ) {
        self.entries.clear();
        for mode in catalog.iter() {
            match mode.class {
                ModulationClass::Dsss | ModulationClass::Ofdm => {
                    let width = mode.class.non_ht_width_mhz();
                    self.insert(*mode, 1, width, model, 800, target_error_rate);
                }
                ModulationClass::Ht => {
                    let guard = if caps.short_gi { 400 } else { 800 };
                    let nss = mode.implied_nss();
                    let mut width = 20;
                    while width <= caps.max_width_mhz {
                        if mode.is_allowed(width, nss) {
                            self.insert(*mode, nss, width, model, guard, target_error_rate);
                        }
                        width *= 2;
                    }
                }
                ModulationClass::Vht | ModulationClass::He => {
                    let guard = match mode.class {
                        ModulationClass::He => caps.he_guard_ns,
                        _ => {
                            if caps.short_gi {
                                400
                            } else {
                                800
                            }
                        }
                    };
                    let mut width = 20;
                    while width <= caps.max_width_mhz {
                        for nss in 1..=caps.max_tx_streams {
                            if mode.is_allowed(width, nss) {
                                self.insert(*mode, nss, width, model, guard, target_error_rate);
                            }
                        }
                        width *= 2;
                    }
                }
            }
        }
    }

    fn insert<M: QualityModel>(
        &mut self,
        mode: ModeDescriptor,
        nss: u8,
        width_mhz: u16,
        model: &M,
        guard_ns: u16,
        target_error_rate: f64,
    ) {
        let threshold =
            model.required_quality_db(&mode, width_mhz, guard_ns, nss, target_error_rate);
        debug!(%mode, nss, width_mhz, threshold, "adding threshold");
        self.entries.insert(ThresholdKey { mode, nss, width_mhz }, threshold);
    }

    /// Threshold for the combination, or `None` on a miss
    pub fn lookup(&self, mode: ModeDescriptor, nss: u8, width_mhz: u16) -> Option<f64> {
        self.entries.get(&ThresholdKey { mode, nss, width_mhz }).copied()
    }

    /// Number of entries in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratectl::mode::DeviceCaps;

    fn table_for(caps: &DeviceCaps) -> (ModeCatalog, ThresholdTable) {
        let catalog = ModeCatalog::for_caps(caps);
        let mut table = ThresholdTable::default();
        table.build(&catalog, &ShannonQualityModel, caps, 1e-7);
        (catalog, table)
    }

    #[test]
    fn test_build_covers_catalog() {
        let caps = DeviceCaps::default();
        let (catalog, table) = table_for(&caps);
        for mode in catalog.iter() {
            let nss = mode.implied_nss();
            let width = if mode.class.is_legacy() {
                mode.class.non_ht_width_mhz()
            } else {
                20
            };
            // Undefined combinations (VhtMcs9 at 20 MHz, single stream)
            // must stay out of the table.
            if !mode.is_allowed(width, nss) {
                assert!(
                    table.lookup(*mode, nss, width).is_none(),
                    "unexpected entry for {mode} nss {nss} width {width}"
                );
                continue;
            }
            assert!(
                table.lookup(*mode, nss, width).is_some(),
                "missing entry for {mode} nss {nss} width {width}"
            );
        }
    }

    #[test]
    fn test_no_duplicate_keys() {
        let caps = DeviceCaps { max_tx_streams: 2, max_width_mhz: 40, ..DeviceCaps::default() };
        let (_, table) = table_for(&caps);
        // 8 OFDM + 16 HT x 2 widths + (10 VHT + 12 HE) x 2 widths x 2 nss,
        // minus VHT MCS 9 at 20 MHz (both nss)
        assert_eq!(table.len(), 8 + 32 + 88 - 2);
    }

    #[test]
    fn test_thresholds_monotone_in_mcs() {
        let caps = DeviceCaps::default();
        let (_, table) = table_for(&caps);
        let mut prev = f64::NEG_INFINITY;
        for i in 0..12 {
            let mode = ModeDescriptor::new(ModulationClass::He, i);
            let t = table.lookup(mode, 1, 20).unwrap();
            assert!(t > prev, "HeMcs{i} threshold {t} not above {prev}");
            prev = t;
        }
    }

    #[test]
    fn test_rebuild_drops_removed_mode() {
        let caps = DeviceCaps::default();
        let (mut catalog, mut table) = table_for(&caps);
        let gone = ModeDescriptor::new(ModulationClass::He, 11);
        assert!(table.lookup(gone, 1, 20).is_some());

        catalog.remove(gone);
        table.build(&catalog, &ShannonQualityModel, &caps, 1e-7);
        assert!(table.lookup(gone, 1, 20).is_none());
    }
}
