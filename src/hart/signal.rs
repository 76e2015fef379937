//! External signal layer
//!
//! The host invokes these handlers synchronously between instructions
//! when an input net changes. Each handler latches the new level,
//! applies its edge/level semantics, and leaves any resulting
//! delivery to the fetch-boundary pipeline (ringing the host doorbell
//! where the change can make an interrupt deliverable).

use log::debug;

use crate::host::Host;
use crate::mode::PrivMode;
use crate::trap::Trap;

use super::{HaltReason, Hart};

impl Hart {
    /// The reset input. The rising edge stalls the hart; the falling
    /// edge performs the full reset.
    pub fn signal_reset<H: Host>(&mut self, host: &mut H, value: bool) {
        let previous = self.net_value.reset;
        self.net_value.reset = value;
        if value && !previous {
            self.halt_hart(host, HaltReason::Reset);
        } else if !value && previous {
            self.reset(host);
        }
    }

    /// Full reset: resume from any stall, drop out of Debug, return
    /// to M-mode with reset-state CSRs, clear the interrupt state,
    /// and restart at the configured reset address. The reset halt
    /// request input is sampled here.
    pub fn reset<H: Host>(&mut self, host: &mut H) {
        debug!("hart {}: reset", self.id);
        if self.debug_mode {
            self.debug_mode = false;
            host.write_net(crate::host::OutputNet::DebugMode, 0);
        }
        self.set_mode(PrivMode::Machine);
        self.csrs.reset();
        if let Some(clic) = self.clic.as_mut() {
            clic.reset();
        }
        for word in self.ip.iter_mut() {
            *word = 0;
        }
        self.swip = 0;
        self.pend_enab = None;
        self.basic_sel = None;
        self.exception = None;
        self.clear_reservation();
        self.v_first_fault = false;
        self.observers.notify_reset(self.id);
        host.set_pc(self.config.reset_address);
        self.net_value.resethaltreq_s = self.net_value.resethaltreq;

        // One restart per state transition, however the hart came to
        // be stalled
        self.restart_hart(host, HaltReason::Wfi);
        self.restart_hart(host, HaltReason::Debug);
        self.restart_hart(host, HaltReason::Reset);
    }

    /// The non-maskable interrupt input. Taken on the rising edge
    /// outside Debug mode; the live level is mirrored into dcsr.nmip.
    pub fn signal_nmi<H: Host>(&mut self, host: &mut H, value: bool) {
        let previous = self.net_value.nmi;
        self.net_value.nmi = value;
        self.csrs.dcsr.set_nmip(value);
        if value && !previous && !self.debug_mode {
            debug!("hart {}: nmi", self.id);
            self.set_mode(PrivMode::Machine);
            *self.csrs.xcause_mut(PrivMode::Machine) =
                crate::csr::Xcause::from_raw(self.config.nmi_cause);
            self.csrs.set_xepc(PrivMode::Machine, host.pc());
            host.set_pc_exception(self.config.nmi_address);
            self.restart_hart(host, HaltReason::Wfi);
        }
    }

    /// The Debug halt request input. Edge-triggered: the latched
    /// level is consumed by the fetch pipeline.
    pub fn signal_haltreq<H: Host>(&mut self, host: &mut H, value: bool) {
        let previous = self.net_value.haltreq;
        self.net_value.haltreq = value;
        if value && !previous {
            host.schedule_interrupt();
        }
    }

    /// The reset halt request input, sampled when reset falls
    pub fn signal_resethaltreq(&mut self, value: bool) {
        self.net_value.resethaltreq = value;
    }

    /// The interrupt-deferral artifact input. While high, deliveries
    /// are held off; the falling edge re-arms anything pending.
    pub fn signal_deferint<H: Host>(&mut self, host: &mut H, value: bool) {
        let previous = self.net_value.deferint;
        self.net_value.deferint = value;
        if previous && !value && self.pend_enab.is_some() {
            host.schedule_interrupt();
        }
    }

    /// The SC_valid input: deassertion invalidates the LR reservation
    pub fn signal_sc_valid(&mut self, value: bool) {
        if !value {
            self.clear_reservation();
        }
    }

    /// A per-interrupt input net changed level. The raw level is
    /// latched into the external pending bitmap, the CLIC applies its
    /// edge/level and polarity rules, and the basic selector sees the
    /// updated mip.
    pub fn signal_interrupt<H: Host>(
        &mut self,
        host: &mut H,
        id: u32,
        value: bool,
    ) {
        if id >= self.config.interrupt_count() {
            return;
        }
        let word = (id / 64) as usize;
        let bit = 1u64 << (id % 64);
        let previous = self.ip[word] & bit != 0;
        if value {
            self.ip[word] |= bit;
        } else {
            self.ip[word] &= !bit;
        }
        if let Some(clic) = self.clic.as_mut() {
            if id < clic.interrupt_count() {
                clic.input(id, previous, value);
            }
        }
        self.refresh_pending(host);
    }

    /// An ExternalInterruptID input: a nonzero value substitutes the
    /// reported cause code for external interrupts targeting the
    /// given mode
    pub fn signal_external_interrupt_id(
        &mut self,
        mode: PrivMode,
        code: u64,
    ) {
        self.ext_int[mode.encoding() as usize] = code;
    }

    /// Wait for interrupt: stall unless something is already pending
    pub fn wfi<H: Host>(&mut self, host: &mut H) {
        if !self.wfi_wakeup_pending() {
            self.halt_hart(host, HaltReason::Wfi);
        }
    }

    /// The last trap taken, for host-side inspection
    pub fn last_trap(&self) -> Option<Trap> {
        self.exception
    }
}
