//! Trap return
//!
//! MRET, SRET and URET share one return routine parameterized by the
//! mode being returned from; DRET is handled by the Debug controller
//! and is an illegal instruction anywhere else.
//!
//! References to the privileged spec refer to version 20211203
//! (section 3.1.6.1 for the interrupt-enable stack pop, 3.1.6.3 for
//! the MPRV rule).

use log::warn;

use crate::host::Host;
use crate::mode::PrivMode;

use super::Hart;

impl Hart {
    /// Return from an M-mode trap. A NOP in Debug mode.
    pub fn mret<H: Host>(&mut self, host: &mut H) {
        self.xret(host, PrivMode::Machine);
    }

    /// Return from an S-mode trap. A NOP in Debug mode.
    pub fn sret<H: Host>(&mut self, host: &mut H) {
        self.xret(host, PrivMode::Supervisor);
    }

    /// Return from a U-mode trap (N extension). A NOP in Debug mode.
    pub fn uret<H: Host>(&mut self, host: &mut H) {
        self.xret(host, PrivMode::User);
    }

    /// DRET resumes from Debug mode; outside Debug mode it raises an
    /// illegal instruction
    pub fn dret<H: Host>(&mut self, host: &mut H, instruction: u64) {
        if self.debug_mode {
            self.leave_debug(host);
        } else {
            warn!("hart {}: dret outside debug mode", self.id);
            self.illegal_instruction(host, instruction);
        }
    }

    /// Common return-from-trap routine for mode `returning`
    fn xret<H: Host>(&mut self, host: &mut H, returning: PrivMode) {
        if self.debug_mode {
            return;
        }

        if !self.config.xret_preserves_lr {
            self.clear_reservation();
        }

        // With the CLIC active in the returning mode, the active
        // interrupt level pops from the pil snapshot in xcause
        if self.clic_active_in(returning) {
            let level = self.csrs.xcause(returning).pil();
            self.csrs.mintstatus.set_xil(returning, level);
        }

        // Pop the interrupt-enable stack and park xPP at the least
        // privileged implemented mode, so a later trap records the
        // lowest possible previous privilege
        let destination = self
            .csrs
            .mstatus
            .xpp(returning)
            .clamp_implemented(&self.config);
        self.csrs.mstatus.pop_interrupt_enable(returning);
        self.csrs.mstatus.set_xpp(
            returning,
            PrivMode::minimum_implemented(&self.config),
        );

        if self.config.priv_version.xret_clears_mprv()
            && destination != PrivMode::Machine
        {
            self.csrs.mstatus.set_mprv(false);
        }

        self.set_mode(destination);

        // Resume at xepc; without compressed instructions the target
        // snaps down to a 4-byte boundary
        let mut pc = self.csrs.xepc(returning);
        if !self.config.extensions.has('C') {
            pc &= !0b11;
        }
        host.set_pc(pc);

        self.observers.notify_eret(self.id, destination);

        // The pop may have exposed a deliverable interrupt
        self.refresh_pending(host);
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::config::{ExtensionSet, HartConfig, PrivVersion};
    use crate::csr::TvecMode;
    use crate::host::SimpleHost;
    use crate::trap::{Exception, Trap};

    fn hart() -> (Hart, SimpleHost) {
        (Hart::new(0, HartConfig::default()), SimpleHost::new())
    }

    #[test]
    fn check_mret_pops_interrupt_enable_stack() {
        let (mut hart, mut host) = hart();
        hart.csrs.mstatus.set_mie(true);
        host.set_pc(0x100);
        hart.take_exception(
            &mut host,
            Trap::Exception(Exception::Breakpoint),
            0,
        );
        assert!(!hart.csrs.mstatus.mie());
        assert!(hart.csrs.mstatus.mpie());

        hart.mret(&mut host);
        assert!(hart.csrs.mstatus.mie());
        assert!(hart.csrs.mstatus.mpie());
        assert_eq!(host.pc(), 0x100);
    }

    #[test]
    fn check_mret_to_user_clears_mprv() {
        let (mut hart, mut host) = hart();
        hart.csrs.mstatus.set_mprv(true);
        hart.csrs.mstatus.set_xpp(PrivMode::Machine, PrivMode::User);
        hart.csrs.set_xepc(PrivMode::Machine, 0x200);
        hart.mret(&mut host);
        assert_eq!(hart.mode, PrivMode::User);
        assert!(!hart.csrs.mstatus.mprv());
        // MPP parks at the minimum implemented mode, MPIE at 1
        assert_eq!(hart.csrs.mstatus.xpp(PrivMode::Machine), PrivMode::User);
        assert!(hart.csrs.mstatus.mpie());
        assert_eq!(host.pc(), 0x200);
    }

    #[test]
    fn check_mret_keeps_mprv_before_1_12() {
        let mut config = HartConfig::default();
        config.priv_version = PrivVersion::V20190405;
        let mut hart = Hart::new(0, config);
        let mut host = SimpleHost::new();
        hart.csrs.mstatus.set_mprv(true);
        hart.csrs.mstatus.set_xpp(PrivMode::Machine, PrivMode::User);
        hart.mret(&mut host);
        assert!(hart.csrs.mstatus.mprv());
    }

    #[test]
    fn check_mret_to_machine_keeps_mprv() {
        let (mut hart, mut host) = hart();
        hart.csrs.mstatus.set_mprv(true);
        hart.csrs.mstatus.set_xpp(PrivMode::Machine, PrivMode::Machine);
        hart.mret(&mut host);
        assert!(hart.csrs.mstatus.mprv());
    }

    #[test]
    fn check_xret_clears_reservation_unless_configured() {
        let (mut hart, mut host) = hart();
        hart.set_reservation(&mut host, 0x9000);
        hart.mret(&mut host);
        assert_eq!(hart.reservation(), None);

        let mut config = HartConfig::default();
        config.xret_preserves_lr = true;
        let mut hart = Hart::new(0, config);
        hart.set_reservation(&mut host, 0x9000);
        hart.mret(&mut host);
        assert_eq!(hart.reservation(), Some(0x9000));
    }

    #[test]
    fn check_sret_returns_to_spp() {
        let (mut hart, mut host) = hart();
        hart.mode = PrivMode::Supervisor;
        hart.csrs.mstatus.set_xpp(PrivMode::Supervisor, PrivMode::User);
        hart.csrs.set_xepc(PrivMode::Supervisor, 0x3000);
        hart.sret(&mut host);
        assert_eq!(hart.mode, PrivMode::User);
        assert_eq!(host.pc(), 0x3000);
    }

    #[test]
    fn check_xret_pc_aligns_without_compressed() {
        let mut config = HartConfig::default();
        config.extensions = ExtensionSet::from_letters("NSUV");
        let mut hart = Hart::new(0, config);
        let mut host = SimpleHost::new();
        // xepc keeps bit 1; the return masks it off when C is absent
        hart.csrs.set_xepc(PrivMode::Machine, 0x1006);
        hart.mret(&mut host);
        assert_eq!(host.pc(), 0x1004);
    }

    #[test]
    fn check_xret_is_nop_in_debug_mode() {
        let (mut hart, mut host) = hart();
        hart.debug_mode = true;
        hart.mode = PrivMode::Machine;
        hart.csrs.mstatus.set_mpie(true);
        host.set_pc(0xabc);
        hart.mret(&mut host);
        assert_eq!(host.pc(), 0xabc);
        assert_eq!(hart.mode, PrivMode::Machine);
        assert!(!hart.csrs.mstatus.mie());
    }

    #[test]
    fn check_mret_restores_clic_level() {
        let (mut hart, mut host) = hart();
        hart.csrs.xtvec_mut(PrivMode::Machine).set_mode(TvecMode::Clic);
        hart.csrs.xcause_mut(PrivMode::Machine).set_pil(0x55);
        hart.csrs.mintstatus.set_xil(PrivMode::Machine, 0xff);
        hart.mret(&mut host);
        assert_eq!(hart.csrs.mintstatus.xil(PrivMode::Machine), 0x55);
    }

    #[test]
    fn check_dret_outside_debug_is_illegal() {
        let (mut hart, mut host) = hart();
        hart.csrs.xtvec_mut(PrivMode::Machine).set_base(0x6000);
        hart.dret(&mut host, 0x7b200073);
        assert_eq!(hart.mode, PrivMode::Machine);
        assert_eq!(hart.csrs.xcause(PrivMode::Machine).as_raw(), 2);
        assert_eq!(hart.csrs.xtval(PrivMode::Machine), 0x7b200073);
        assert_eq!(host.pc(), 0x6000);
    }
}
