//! Privilege modes
//!
//! The three privilege modes of the privileged spec (section 1.2),
//! with the helpers the trap core needs: numeric encoding for the
//! mstatus.MPP/SPP fields, a total order (traps never target a mode
//! lower than the current one), and clamping against the set of modes
//! the hart actually implements.

use crate::config::HartConfig;

/// Privilege modes, ordered from least to most privileged.
///
/// The discriminants are the architectural encodings used by
/// mstatus.MPP and dcsr.prv. Encoding 2 is the reserved hypervisor
/// slot and is not modelled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrivMode {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

impl PrivMode {
    pub fn encoding(self) -> u64 {
        self as u64
    }

    pub fn from_encoding(encoding: u64) -> Option<PrivMode> {
        match encoding {
            0 => Some(PrivMode::User),
            1 => Some(PrivMode::Supervisor),
            3 => Some(PrivMode::Machine),
            _ => None,
        }
    }

    /// Single-letter CSR prefix for this mode ('u', 's' or 'm')
    pub fn letter(self) -> char {
        match self {
            PrivMode::User => 'u',
            PrivMode::Supervisor => 's',
            PrivMode::Machine => 'm',
        }
    }

    /// Whether the hart implements this mode. M-mode is always
    /// implemented; S and U require the corresponding misa letters.
    pub fn is_implemented(self, config: &HartConfig) -> bool {
        match self {
            PrivMode::Machine => true,
            PrivMode::Supervisor => config.extensions.has('S'),
            PrivMode::User => config.extensions.has('U'),
        }
    }

    /// Clamp this mode up to the nearest implemented mode
    pub fn clamp_implemented(self, config: &HartConfig) -> PrivMode {
        let mut mode = self;
        loop {
            if mode.is_implemented(config) {
                return mode;
            }
            mode = match mode {
                PrivMode::User => PrivMode::Supervisor,
                _ => PrivMode::Machine,
            };
        }
    }

    /// The least privileged mode the hart implements
    pub fn minimum_implemented(config: &HartConfig) -> PrivMode {
        PrivMode::User.clamp_implemented(config)
    }
}
