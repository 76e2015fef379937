//! Fetch-boundary delivery pipeline
//!
//! The host's fetch callback is the only place interrupts are taken.
//! On each instruction fetch the checks run in a fixed priority
//! order: the reset halt request sampled at reset, then a Debug halt
//! request, then a deliverable interrupt, and finally validation of
//! the fetch address itself.

use crate::host::Host;
use crate::trap::{Exception, Interrupt, Trap};

use super::{debug::DebugCause, Hart, Selection};

impl Hart {
    /// Fetch-boundary check for an instruction of `bytes` bytes at
    /// `addr`. Returns true when the fetch may proceed; false when
    /// control was redirected (Debug entry, interrupt delivery or a
    /// fetch fault).
    pub fn fetch<H: Host>(
        &mut self,
        host: &mut H,
        addr: u64,
        bytes: u64,
    ) -> bool {
        // Reset halt request, sampled at the last reset: enter Debug
        // before the first instruction runs
        if self.net_value.resethaltreq_s {
            self.net_value.resethaltreq_s = false;
            self.enter_debug(host, DebugCause::ResetHaltRequest);
            return false;
        }

        if self.net_value.haltreq && !self.debug_mode {
            self.enter_debug(host, DebugCause::HaltRequest);
            return false;
        }

        if !self.debug_mode && !self.net_value.deferint {
            if let Some(selection) = self.pend_enab {
                self.take_selected_interrupt(host, selection);
                return false;
            }
        }

        // Validate the fetch address. Compound instructions with
        // compressed disabled span two halfwords; both halves are
        // checked. A failed translation is delivered as a page fault
        // by the MMU itself.
        let mut half = addr;
        while half < addr + bytes {
            if !host.check_execute_permission(half) {
                return false;
            }
            if !host.is_executable(half) {
                self.take_exception(
                    host,
                    Trap::Exception(Exception::InstructionAccessFault),
                    addr,
                );
                return false;
            }
            half += 2;
        }
        true
    }

    fn take_selected_interrupt<H: Host>(
        &mut self,
        host: &mut H,
        selection: Selection,
    ) {
        let interrupt = Interrupt::from_code(selection.id)
            .expect("selected interrupt id should decode");
        self.take_exception(host, Trap::Interrupt(interrupt), 0);
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::config::HartConfig;
    use crate::csr::TvecMode;
    use crate::host::SimpleHost;
    use crate::mode::PrivMode;

    fn hart() -> (Hart, SimpleHost) {
        (Hart::new(0, HartConfig::default()), SimpleHost::new())
    }

    /// Delegated supervisor timer interrupt taken from U-mode
    #[test]
    fn check_delegated_timer_interrupt_to_supervisor() {
        let (mut hart, mut host) = hart();
        hart.mode = PrivMode::User;
        hart.csrs.mideleg = 1 << 5;
        hart.csrs.mstatus.set_sie(true);
        hart.csrs.xtvec_mut(PrivMode::Supervisor).set_base(0x3000);
        hart.write_mie(&mut host, 1 << 5);
        hart.signal_interrupt(&mut host, 5, true);
        host.set_pc(0x88);

        assert!(!hart.fetch(&mut host, 0x88, 4));
        assert_eq!(hart.mode, PrivMode::Supervisor);
        assert_eq!(
            hart.csrs.xcause(PrivMode::Supervisor).as_raw(),
            0x8000_0005
        );
        assert_eq!(hart.csrs.xepc(PrivMode::Supervisor), 0x88);
        assert!(hart.csrs.mstatus.spie());
        assert!(!hart.csrs.mstatus.sie());
        assert_eq!(host.pc(), 0x3000);
    }

    /// Vectored machine external interrupt lands at base + 4 * 11
    #[test]
    fn check_vectored_machine_external() {
        let (mut hart, mut host) = hart();
        hart.mode = PrivMode::User;
        let tvec = hart.csrs.xtvec_mut(PrivMode::Machine);
        tvec.set_base(0x2000);
        tvec.set_mode(TvecMode::Vectored);
        hart.write_mie(&mut host, 1 << 11);
        hart.signal_interrupt(&mut host, 11, true);

        assert!(!hart.fetch(&mut host, 0x10, 4));
        assert_eq!(host.pc(), 0x2000 + 44);
        assert_eq!(
            hart.csrs.xcause(PrivMode::Machine).as_raw(),
            0x8000_000b
        );
    }

    #[test]
    fn check_reset_halt_request_beats_everything() {
        let (mut hart, mut host) = hart();
        hart.net_value.resethaltreq_s = true;
        hart.net_value.haltreq = true;
        hart.csrs.mstatus.set_mie(true);
        hart.write_mie(&mut host, 1 << 7);
        hart.signal_interrupt(&mut host, 7, true);

        assert!(!hart.fetch(&mut host, 0, 4));
        assert!(hart.debug_mode);
        assert_eq!(
            hart.csrs.dcsr.cause(),
            DebugCause::ResetHaltRequest as u64
        );
        // The latch is consumed
        assert!(!hart.net_value.resethaltreq_s);
    }

    #[test]
    fn check_halt_request_beats_interrupt() {
        let (mut hart, mut host) = hart();
        hart.signal_haltreq(&mut host, true);
        hart.csrs.mstatus.set_mie(true);
        hart.write_mie(&mut host, 1 << 7);
        hart.signal_interrupt(&mut host, 7, true);

        assert!(!hart.fetch(&mut host, 0, 4));
        assert!(hart.debug_mode);
        assert_eq!(hart.csrs.dcsr.cause(), DebugCause::HaltRequest as u64);
    }

    #[test]
    fn check_deferint_holds_off_delivery() {
        let (mut hart, mut host) = hart();
        hart.signal_deferint(&mut host, true);
        hart.csrs.mstatus.set_mie(true);
        hart.write_mie(&mut host, 1 << 7);
        hart.signal_interrupt(&mut host, 7, true);
        assert!(hart.pending_interrupt().is_some());

        // Held off while deferint is high
        assert!(hart.fetch(&mut host, 0, 4));
        hart.signal_deferint(&mut host, false);
        assert!(!hart.fetch(&mut host, 0, 4));
        assert_eq!(
            hart.csrs.xcause(PrivMode::Machine).as_raw(),
            0x8000_0007
        );
    }

    #[test]
    fn check_non_executable_fetch_faults() {
        let (mut hart, mut host) = hart();
        host.set_non_executable(0x5000, 0x1000);
        hart.csrs.xtvec_mut(PrivMode::Machine).set_base(0x100);
        host.set_pc(0x5000);

        assert!(!hart.fetch(&mut host, 0x5000, 4));
        assert_eq!(hart.csrs.xcause(PrivMode::Machine).as_raw(), 1);
        assert_eq!(hart.csrs.xtval(PrivMode::Machine), 0x5000);
        assert_eq!(host.pc(), 0x100);
    }

    #[test]
    fn check_second_half_of_compound_fetch_validated() {
        let (mut hart1, mut host) = hart();
        // Only the second halfword is non-executable
        host.set_non_executable(0x5002, 2);
        assert!(!hart1.fetch(&mut host, 0x5000, 4));
        assert_eq!(hart1.csrs.xcause(PrivMode::Machine).as_raw(), 1);
        // A compressed 2-byte fetch at the same base is fine
        let (mut hart2, _) = hart();
        assert!(hart2.fetch(&mut host, 0x5000, 2));
    }

    #[test]
    fn check_mmu_refusal_defers_to_page_fault_path() {
        let (mut hart, mut host) = hart();
        host.refuse_execute_permission(0x6000, 0x1000);
        // The MMU delivers the page fault itself; the core only
        // abandons the fetch
        assert!(!hart.fetch(&mut host, 0x6000, 4));
        assert_eq!(hart.csrs.xcause(PrivMode::Machine).as_raw(), 0);
        assert_eq!(hart.last_trap(), None);
    }

    #[test]
    fn check_interrupt_not_taken_in_debug_mode() {
        let (mut hart, mut host) = hart();
        hart.csrs.mstatus.set_mie(true);
        hart.write_mie(&mut host, 1 << 7);
        hart.signal_interrupt(&mut host, 7, true);
        hart.enter_debug(&mut host, DebugCause::HaltRequest);
        hart.net_value.haltreq = false;

        assert!(hart.fetch(&mut host, 0, 4));
        assert_eq!(hart.last_trap(), None);
    }

    #[test]
    fn check_clean_fetch_proceeds() {
        let (mut hart, mut host) = hart();
        assert!(hart.fetch(&mut host, 0x100, 4));
        assert_eq!(hart.last_trap(), None);
    }
}
