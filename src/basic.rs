//! Basic (CLINT-style) interrupt selector
//!
//! Computes the highest-priority pending-and-enabled interrupt from
//! mip, mie, the interrupt delegation registers and the global
//! interrupt-enable bits. The conditions are laid out in section
//! 3.1.6.1 of the privileged spec: an interrupt for cause i traps to
//! mode X when bit i is pending and enabled, delegation routes it to
//! X, and interrupts are globally enabled for X (which they always
//! are when executing below X, and never when executing above X).
//!
//! In order for these conditions to be evaluated within a bounded
//! amount of time from when the interrupt becomes pending, the
//! selector is re-run after every change to the inputs and the result
//! is cached on the hart.

use std::cmp::Reverse;

use crate::csr::Mstatus;
use crate::mode::PrivMode;

/// Inputs to one selection pass
#[derive(Debug, Copy, Clone)]
pub struct BasicInputs {
    pub mip: u64,
    pub mie: u64,
    /// Interrupt delegation M to S. Zero when S-mode is absent.
    pub mideleg: u64,
    /// Interrupt delegation S to U. Zero without the N extension.
    pub sideleg: u64,
    pub mstatus: Mstatus,
    /// Current execution mode
    pub mode: PrivMode,
    /// Whether CLIC mode is active per privilege; basic interrupts
    /// targeting a CLIC-active mode are masked out
    pub clic_active: [bool; 3],
}

/// A pending-and-enabled basic interrupt, with the mode it traps to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BasicSelection {
    pub code: u32,
    pub target: PrivMode,
}

fn clic_active(inputs: &BasicInputs, mode: PrivMode) -> bool {
    match mode {
        PrivMode::User => inputs.clic_active[0],
        PrivMode::Supervisor => inputs.clic_active[1],
        PrivMode::Machine => inputs.clic_active[2],
    }
}

/// Effective global interrupt enable for interrupts targeting the
/// given mode: always enabled from below, never from above, xIE at
/// the same mode, and off entirely when the target mode is using the
/// CLIC.
fn effective_enable(inputs: &BasicInputs, target: PrivMode) -> bool {
    if clic_active(inputs, target) {
        false
    } else if inputs.mode < target {
        true
    } else if inputs.mode > target {
        false
    } else {
        inputs.mstatus.xie(target)
    }
}

/// Fixed priority of the standard interrupts, mandated by section
/// 3.1.9 of the privileged spec: MEI > MSI > MTI > SEI > SSI > STI >
/// UEI > USI > UTI. All other codes rank below the standard set, in
/// ascending code order. Lower rank wins.
fn priority_rank(code: u32) -> u32 {
    match code {
        11 => 0,
        3 => 1,
        7 => 2,
        9 => 3,
        1 => 4,
        5 => 5,
        8 => 6,
        0 => 7,
        4 => 8,
        _ => 9 + code,
    }
}

/// The delegation target of one interrupt code: clear in mideleg
/// means M, clear in sideleg means S, else U
fn delegation_target(inputs: &BasicInputs, code: u32) -> PrivMode {
    if inputs.mideleg >> code & 1 == 0 {
        PrivMode::Machine
    } else if inputs.sideleg >> code & 1 == 0 {
        PrivMode::Supervisor
    } else {
        PrivMode::User
    }
}

/// Run one selection pass. Returns the winning pending-and-enabled
/// interrupt, or None if nothing is currently deliverable.
///
/// Among the surviving candidates the winner is the one with the
/// highest target mode, ties broken by the fixed priority table.
pub fn select(inputs: &BasicInputs) -> Option<BasicSelection> {
    let candidates = inputs.mip & inputs.mie;
    if candidates == 0 {
        return None;
    }

    (0..64)
        .filter(|code| candidates >> code & 1 != 0)
        .map(|code| BasicSelection {
            code,
            target: delegation_target(inputs, code),
        })
        .filter(|candidate| effective_enable(inputs, candidate.target))
        .max_by_key(|candidate| {
            (candidate.target, Reverse(priority_rank(candidate.code)))
        })
}

#[cfg(test)]
mod tests {

    use super::*;

    fn inputs() -> BasicInputs {
        let mut mstatus = Mstatus::default();
        mstatus.set_mie(true);
        mstatus.set_sie(true);
        mstatus.set_uie(true);
        BasicInputs {
            mip: 0,
            mie: 0xffff_ffff_ffff_ffff,
            mideleg: 0,
            sideleg: 0,
            mstatus,
            mode: PrivMode::Machine,
            clic_active: [false; 3],
        }
    }

    #[test]
    fn check_nothing_pending() {
        assert_eq!(select(&inputs()), None);
    }

    #[test]
    fn check_pending_but_not_enabled() {
        let mut inputs = inputs();
        inputs.mip = 1 << 7;
        inputs.mie = 0;
        assert_eq!(select(&inputs), None);
    }

    #[test]
    fn check_globally_disabled_at_same_mode() {
        let mut inputs = inputs();
        inputs.mip = 1 << 7;
        inputs.mstatus.set_mie(false);
        assert_eq!(select(&inputs), None);
    }

    #[test]
    fn check_priority_order_within_machine() {
        // MEI beats MSI beats MTI regardless of code order
        let mut inputs = inputs();
        inputs.mip = 1 << 3 | 1 << 7 | 1 << 11;
        let selected = select(&inputs).unwrap();
        assert_eq!(selected.code, 11);
        inputs.mip = 1 << 3 | 1 << 7;
        let selected = select(&inputs).unwrap();
        assert_eq!(selected.code, 3);
        inputs.mip = 1 << 7;
        let selected = select(&inputs).unwrap();
        assert_eq!(selected.code, 7);
    }

    #[test]
    fn check_higher_target_mode_wins() {
        // STI is delegated to S; MTI targets M. M wins even though
        // the S interrupt would rank earlier among S codes.
        let mut inputs = inputs();
        inputs.mode = PrivMode::User;
        inputs.mideleg = 1 << 5;
        inputs.mip = 1 << 5 | 1 << 7;
        let selected = select(&inputs).unwrap();
        assert_eq!(selected.code, 7);
        assert_eq!(selected.target, PrivMode::Machine);
    }

    #[test]
    fn check_delegated_interrupt_from_below() {
        // From U-mode, an S-delegated timer interrupt is always
        // enabled regardless of sstatus.SIE
        let mut inputs = inputs();
        inputs.mode = PrivMode::User;
        inputs.mideleg = 1 << 5;
        inputs.mip = 1 << 5;
        inputs.mstatus.set_sie(false);
        let selected = select(&inputs).unwrap();
        assert_eq!(
            selected,
            BasicSelection { code: 5, target: PrivMode::Supervisor }
        );
    }

    #[test]
    fn check_delegated_interrupt_masked_from_above() {
        // From M-mode, an S-delegated interrupt must not fire
        let mut inputs = inputs();
        inputs.mideleg = 1 << 5;
        inputs.mip = 1 << 5;
        assert_eq!(select(&inputs), None);
    }

    #[test]
    fn check_two_level_delegation_to_user() {
        let mut inputs = inputs();
        inputs.mode = PrivMode::User;
        inputs.mideleg = 1 << 4;
        inputs.sideleg = 1 << 4;
        inputs.mip = 1 << 4;
        let selected = select(&inputs).unwrap();
        assert_eq!(
            selected,
            BasicSelection { code: 4, target: PrivMode::User }
        );
    }

    #[test]
    fn check_clic_active_masks_partition() {
        // CLIC active in M: M-targeted basic interrupts are masked
        let mut inputs = inputs();
        inputs.mip = 1 << 7;
        inputs.clic_active = [false, false, true];
        assert_eq!(select(&inputs), None);
    }

    #[test]
    fn check_local_interrupt_ranks_below_standard() {
        let mut inputs = inputs();
        inputs.mip = 1 << 16 | 1 << 7;
        let selected = select(&inputs).unwrap();
        assert_eq!(selected.code, 7);
        inputs.mip = 1 << 16 | 1 << 20;
        let selected = select(&inputs).unwrap();
        assert_eq!(selected.code, 16);
    }
}
