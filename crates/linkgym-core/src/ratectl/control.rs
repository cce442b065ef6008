//! External control override
//!
//! An externally pushed value dictates the transmitted mode for a scope,
//! bypassing the autonomous selector until a new value arrives or the
//! override is cleared. The data mode is the value interpreted as an HE
//! index; the control-frame companion comes from the fixed non-HT
//! reference-rate formula.

use super::link::LinkId;
use super::mode::{non_ht_reference_mode, ModeDescriptor, ModulationClass};
use crate::error::Result;
use std::collections::HashMap;
use tracing::info;

/// Which links an override addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideScope {
    /// A single link
    Link(LinkId),
    /// Every link of the device
    All,
}

/// A dictated (data, control) mode pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideEntry {
    /// Mode for data transmissions
    pub data_mode: ModeDescriptor,
    /// Companion mode for control-frame transmissions
    pub control_mode: ModeDescriptor,
}

/// Overrides currently in effect, per link and device-wide
#[derive(Debug, Default)]
pub struct OverrideTable {
    global: Option<OverrideEntry>,
    per_link: HashMap<LinkId, OverrideEntry>,
}

impl OverrideTable {
    /// Apply an override: `value` is an HE mode index. Replaces any
    /// previous override for the scope.
    pub fn apply(&mut self, scope: OverrideScope, value: u8) -> Result<()> {
        let data_mode = ModeDescriptor::new(ModulationClass::He, value);
        let control_mode = non_ht_reference_mode(value)?;
        let entry = OverrideEntry { data_mode, control_mode };
        info!(?scope, %data_mode, %control_mode, "applying external override");
        match scope {
            OverrideScope::Link(id) => {
                self.per_link.insert(id, entry);
            }
            OverrideScope::All => self.global = Some(entry),
        }
        Ok(())
    }

    /// Explicitly clear an override; the selector resumes for that scope
    pub fn clear(&mut self, scope: OverrideScope) {
        match scope {
            OverrideScope::Link(id) => {
                self.per_link.remove(&id);
            }
            OverrideScope::All => self.global = None,
        }
    }

    /// Override in effect for a link, if any. A link-scoped override wins
    /// over a device-wide one.
    pub fn for_link(&self, link: LinkId) -> Option<&OverrideEntry> {
        self.per_link.get(&link).or(self.global.as_ref())
    }

    /// Whether any override is in effect
    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.per_link.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_derives_control_mode() {
        let mut table = OverrideTable::default();
        table.apply(OverrideScope::All, 4).unwrap();
        let entry = table.for_link(LinkId(0)).unwrap();
        assert_eq!(entry.data_mode, ModeDescriptor::new(ModulationClass::He, 4));
        // Non-HT reference rate of HeMcs4 is 36 Mb/s
        assert_eq!(entry.control_mode.data_rate(20, 800, 1), 36_000_000);
    }

    #[test]
    fn test_link_scope_wins_over_global() {
        let mut table = OverrideTable::default();
        table.apply(OverrideScope::All, 2).unwrap();
        table.apply(OverrideScope::Link(LinkId(7)), 9).unwrap();

        assert_eq!(
            table.for_link(LinkId(7)).unwrap().data_mode.index,
            9,
        );
        assert_eq!(table.for_link(LinkId(1)).unwrap().data_mode.index, 2);
    }

    #[test]
    fn test_clear_restores_selector() {
        let mut table = OverrideTable::default();
        table.apply(OverrideScope::Link(LinkId(1)), 5).unwrap();
        table.clear(OverrideScope::Link(LinkId(1)));
        assert!(table.for_link(LinkId(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalid_index_rejected() {
        let mut table = OverrideTable::default();
        assert!(table.apply(OverrideScope::All, 13).is_err());
        assert!(table.is_empty());
    }
}
