//! Transmission mode descriptors and capability negotiation
//!
//! A mode pairs a modulation class with an index inside that class and
//! exposes a pure data-rate function over channel width, guard interval and
//! spatial stream count. Capabilities are closed structs checked through
//! explicit functions; there is no open-ended dispatch on station types.

use crate::error::{LinkGymError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Modulation class families, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModulationClass {
    /// Direct-sequence spread spectrum (legacy 2.4 GHz rates)
    Dsss,
    /// Legacy OFDM rates
    Ofdm,
    /// High throughput (nss encoded in the mode index)
    Ht,
    /// Very high throughput
    Vht,
    /// High efficiency
    He,
}

impl ModulationClass {
    /// Legacy classes carry a fixed canonical channel width
    pub fn is_legacy(&self) -> bool {
        matches!(self, ModulationClass::Dsss | ModulationClass::Ofdm)
    }

    /// Canonical width for modes of this class when sent as non-HT frames
    pub fn non_ht_width_mhz(&self) -> u16 {
        match self {
            ModulationClass::Dsss => 22,
            _ => 20,
        }
    }

    /// Number of mode indices this class defines (per stream for HT)
    pub fn index_count(&self) -> u8 {
        match self {
            ModulationClass::Dsss => 4,
            ModulationClass::Ofdm => 8,
            ModulationClass::Ht => 8,
            ModulationClass::Vht => 10,
            ModulationClass::He => 12,
        }
    }
}

/// DSSS rates in kb/s, by index
const DSSS_RATES_KBPS: [u64; 4] = [1_000, 2_000, 5_500, 11_000];

/// Legacy OFDM rates in kb/s, by index
const OFDM_RATES_KBPS: [u64; 8] = [6_000, 9_000, 12_000, 18_000, 24_000, 36_000, 48_000, 54_000];

/// (modulation bits per subcarrier, coding numerator, coding denominator)
/// for MCS indices shared by HT/VHT/HE
const MCS_BITS_CODING: [(u32, u32, u32); 12] = [
    (1, 1, 2),  // BPSK 1/2
    (2, 1, 2),  // QPSK 1/2
    (2, 3, 4),  // QPSK 3/4
    (4, 1, 2),  // 16-QAM 1/2
    (4, 3, 4),  // 16-QAM 3/4
    (6, 2, 3),  // 64-QAM 2/3
    (6, 3, 4),  // 64-QAM 3/4
    (6, 5, 6),  // 64-QAM 5/6
    (8, 3, 4),  // 256-QAM 3/4
    (8, 5, 6),  // 256-QAM 5/6
    (10, 3, 4), // 1024-QAM 3/4
    (10, 5, 6), // 1024-QAM 5/6
];

/// Non-HT reference rates in kb/s for HE mode indices, used to derive the
/// control-frame companion of an externally dictated data mode
const NON_HT_REFERENCE_KBPS: [u64; 12] = [
    6_000, 12_000, 18_000, 24_000, 36_000, 48_000, 54_000, 54_000, 54_000, 54_000, 54_000, 54_000,
];

/// Reference rate (bits/s) of the legacy OFDM mode that shadows an HE mode.
///
/// Control frames answering an HE data frame are sent at this legacy rate.
pub fn non_ht_reference_rate(he_index: u8) -> Result<u64> {
    NON_HT_REFERENCE_KBPS
        .get(he_index as usize)
        .map(|kbps| kbps * 1_000)
        .ok_or_else(|| LinkGymError::InvalidMode(format!("HeMcs{he_index}")))
}

/// Legacy OFDM mode whose rate equals the non-HT reference rate of an HE mode
pub fn non_ht_reference_mode(he_index: u8) -> Result<ModeDescriptor> {
    let rate = non_ht_reference_rate(he_index)?;
    let index = OFDM_RATES_KBPS
        .iter()
        .position(|kbps| kbps * 1_000 == rate)
        .ok_or_else(|| LinkGymError::InvalidMode(format!("no OFDM rate {rate} b/s")))?;
    Ok(ModeDescriptor::new(ModulationClass::Ofdm, index as u8))
}

/// An immutable coding/modulation mode descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModeDescriptor {
    /// Modulation class family
    pub class: ModulationClass,
    /// Index within the class. HT encodes the stream count here
    /// (`index / 8 + 1`); other classes index rates only.
    pub index: u8,
}

impl ModeDescriptor {
    /// Create a descriptor. Index validity is checked at catalog build time.
    pub fn new(class: ModulationClass, index: u8) -> Self {
        Self { class, index }
    }

    /// Stream count implied by the mode itself (HT only; 1 elsewhere)
    pub fn implied_nss(&self) -> u8 {
        match self.class {
            ModulationClass::Ht => self.index / 8 + 1,
            _ => 1,
        }
    }

    /// Rate-table index within the class (strips the HT stream encoding)
    fn rate_index(&self) -> u8 {
        match self.class {
            ModulationClass::Ht => self.index % 8,
            _ => self.index,
        }
    }

    /// Data subcarriers for this class at the given width
    fn data_subcarriers(&self, width_mhz: u16) -> u32 {
        match self.class {
            ModulationClass::He => match width_mhz {
                20 => 234,
                40 => 468,
                80 => 980,
                _ => 1960, // 160 MHz
            },
            _ => match width_mhz {
                20 => 52,
                40 => 108,
                80 => 234,
                _ => 468, // 160 MHz
            },
        }
    }

    /// Data rate in bits/s at the given width, guard interval and stream
    /// count. Pure; legacy rates ignore width, guard and streams.
    pub fn data_rate(&self, width_mhz: u16, guard_ns: u16, nss: u8) -> u64 {
        match self.class {
            ModulationClass::Dsss => DSSS_RATES_KBPS[self.rate_index() as usize] * 1_000,
            ModulationClass::Ofdm => OFDM_RATES_KBPS[self.rate_index() as usize] * 1_000,
            _ => {
                let (bits, num, den) = MCS_BITS_CODING[self.rate_index() as usize];
                let symbol_us = match self.class {
                    ModulationClass::He => 12.8,
                    _ => 3.2,
                };
                let guard_us = f64::from(guard_ns) / 1_000.0;
                let bits_per_symbol = f64::from(self.data_subcarriers(width_mhz))
                    * f64::from(bits)
                    * f64::from(num)
                    / f64::from(den);
                let rate = bits_per_symbol * f64::from(nss) / ((symbol_us + guard_us) * 1e-6);
                rate.round() as u64
            }
        }
    }

    /// Whether this (width, nss) combination is defined for the mode.
    ///
    /// VHT MCS 9 does not fit the 20 MHz tone plan except at three streams;
    /// HT tops out at 40 MHz. Legacy modes only exist at their canonical
    /// width.
    pub fn is_allowed(&self, width_mhz: u16, nss: u8) -> bool {
        match self.class {
            ModulationClass::Dsss | ModulationClass::Ofdm => {
                width_mhz == self.class.non_ht_width_mhz() && nss == 1
            }
            ModulationClass::Ht => width_mhz <= 40 && nss == self.implied_nss(),
            ModulationClass::Vht => {
                !(self.index == 9 && width_mhz == 20 && nss % 3 != 0)
            }
            ModulationClass::He => true,
        }
    }
}

impl fmt::Display for ModeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            ModulationClass::Dsss => {
                let kbps = DSSS_RATES_KBPS[self.rate_index() as usize];
                if kbps % 1_000 == 0 {
                    write!(f, "DsssRate{}Mbps", kbps / 1_000)
                } else {
                    write!(f, "DsssRate{}_{}Mbps", kbps / 1_000, (kbps % 1_000) / 100)
                }
            }
            ModulationClass::Ofdm => {
                write!(f, "OfdmRate{}Mbps", OFDM_RATES_KBPS[self.rate_index() as usize] / 1_000)
            }
            ModulationClass::Ht => write!(f, "HtMcs{}", self.index),
            ModulationClass::Vht => write!(f, "VhtMcs{}", self.index),
            ModulationClass::He => write!(f, "HeMcs{}", self.index),
        }
    }
}

/// Local device capabilities discovered at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCaps {
    /// DSSS legacy rates supported (2.4 GHz band)
    pub dsss: bool,
    /// High-throughput modes supported
    pub ht: bool,
    /// Very-high-throughput modes supported
    pub vht: bool,
    /// High-efficiency modes supported
    pub he: bool,
    /// Widest configured channel in MHz (20/40/80/160)
    pub max_width_mhz: u16,
    /// Maximum transmit spatial streams
    pub max_tx_streams: u8,
    /// Short guard interval (400 ns) supported for HT/VHT
    pub short_gi: bool,
    /// Configured HE guard interval in ns (800/1600/3200)
    pub he_guard_ns: u16,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            dsss: false,
            ht: true,
            vht: true,
            he: true,
            max_width_mhz: 20,
            max_tx_streams: 1,
            short_gi: false,
            he_guard_ns: 800,
        }
    }
}

/// Remote peer capabilities learned from association
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerCaps {
    /// Peer supports HT modes
    pub ht: bool,
    /// Peer supports VHT modes
    pub vht: bool,
    /// Peer supports HE modes
    pub he: bool,
    /// Peer's channel width in MHz
    pub width_mhz: u16,
    /// Peer's receive spatial streams
    pub max_rx_streams: u8,
    /// Peer supports the short guard interval
    pub short_gi: bool,
}

impl Default for PeerCaps {
    fn default() -> Self {
        Self {
            ht: true,
            vht: true,
            he: true,
            width_mhz: 20,
            max_rx_streams: 1,
            short_gi: false,
        }
    }
}

/// The immutable set of modes a device can transmit, in stable enumeration
/// order: legacy rates ascending, then HT, VHT and HE indices ascending.
#[derive(Debug, Clone)]
pub struct ModeCatalog {
    modes: Vec<ModeDescriptor>,
}

impl ModeCatalog {
    /// Build the catalog for a device's capabilities
    pub fn for_caps(caps: &DeviceCaps) -> Self {
        let mut modes = Vec::new();
        if caps.dsss {
            for i in 0..ModulationClass::Dsss.index_count() {
                modes.push(ModeDescriptor::new(ModulationClass::Dsss, i));
            }
        }
        for i in 0..ModulationClass::Ofdm.index_count() {
            modes.push(ModeDescriptor::new(ModulationClass::Ofdm, i));
        }
        if caps.ht {
            for i in 0..8 * caps.max_tx_streams {
                modes.push(ModeDescriptor::new(ModulationClass::Ht, i));
            }
        }
        if caps.vht {
            for i in 0..ModulationClass::Vht.index_count() {
                modes.push(ModeDescriptor::new(ModulationClass::Vht, i));
            }
        }
        if caps.he {
            for i in 0..ModulationClass::He.index_count() {
                modes.push(ModeDescriptor::new(ModulationClass::He, i));
            }
        }
        Self { modes }
    }

    /// All modes in stable enumeration order
    pub fn iter(&self) -> impl Iterator<Item = &ModeDescriptor> {
        self.modes.iter()
    }

    /// Legacy (basic) modes, the control-frame candidate set
    pub fn basic_modes(&self) -> impl Iterator<Item = &ModeDescriptor> {
        self.modes.iter().filter(|m| m.class.is_legacy())
    }

    /// Lowest-rate mode in the catalog, the forward-progress fallback
    pub fn default_mode(&self) -> Result<ModeDescriptor> {
        self.modes
            .iter()
            .copied()
            .min_by_key(|m| m.data_rate(m.class.non_ht_width_mhz().min(20), 800, 1))
            .ok_or(LinkGymError::EmptyCatalog)
    }

    /// Number of modes in the catalog
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Remove a mode at runtime (capability renegotiation). Threshold
    /// lookups for removed modes miss from then on.
    pub fn remove(&mut self, mode: ModeDescriptor) {
        self.modes.retain(|m| *m != mode);
    }
}
