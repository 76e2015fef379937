//! Debug mode
//!
//! Entry and exit for Debug mode per the debug spec (section 4):
//! halt requests, single step, ebreak routing, and the reset halt
//! request sampled at reset. What the hart does on entry is
//! configurable: stall and wait for the debugger (the usual
//! transport), deliver an asynchronous host interrupt, or jump to a
//! debug vector.

use log::debug;

use crate::config::DebugEntryMode;
use crate::host::{Host, OutputNet};
use crate::mode::PrivMode;
use crate::trap::{Exception, Trap};

use super::{HaltReason, Hart};

/// The dcsr.cause encodings (debug spec table 4.3)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DebugCause {
    /// Re-entry for a trap taken while already in Debug
    None = 0,
    Ebreak = 1,
    Trigger = 2,
    HaltRequest = 3,
    Step = 4,
    ResetHaltRequest = 5,
}

impl Hart {
    /// Enter Debug mode. On a fresh entry the previous privilege and
    /// pc are banked in dcsr.prv and dpc and the hart switches to M;
    /// a nested entry only re-dispatches per the configured entry
    /// style. The counter-inhibit state is carried across the
    /// transition untouched.
    pub fn enter_debug<H: Host>(&mut self, host: &mut H, cause: DebugCause) {
        let fresh = !self.debug_mode;
        if fresh {
            let count_inhibit = self.csrs.mcountinhibit;
            self.debug_mode = true;
            host.write_net(OutputNet::DebugMode, 1);
            self.csrs.dcsr.set_prv(self.mode.encoding());
            self.csrs.dcsr.set_cause(cause as u64);
            self.csrs.dpc = host.pc();
            self.set_mode(PrivMode::Machine);
            self.csrs.mcountinhibit = count_inhibit;
            debug!("hart {}: entered debug mode ({:?})", self.id, cause);
        }
        match self.config.debug_mode {
            DebugEntryMode::Halt => self.halt_hart(host, HaltReason::Debug),
            DebugEntryMode::Interrupt => host.deliver_async_interrupt(),
            DebugEntryMode::Vector => {
                let vector = if fresh {
                    self.config.debug_address
                } else {
                    self.config.dexc_address
                };
                host.set_pc_exception(vector);
            }
        }
    }

    /// Leave Debug mode: resume at dpc in the privilege banked in
    /// dcsr.prv, clearing MPRV by the same rule as xRET
    pub fn leave_debug<H: Host>(&mut self, host: &mut H) {
        if !self.debug_mode {
            return;
        }
        let count_inhibit = self.csrs.mcountinhibit;
        self.debug_mode = false;
        host.write_net(OutputNet::DebugMode, 0);

        let destination = PrivMode::from_encoding(self.csrs.dcsr.prv())
            .unwrap_or(PrivMode::Machine)
            .clamp_implemented(&self.config);
        if self.config.priv_version.xret_clears_mprv()
            && destination != PrivMode::Machine
        {
            self.csrs.mstatus.set_mprv(false);
        }
        self.set_mode(destination);
        host.set_pc(self.csrs.dpc);
        self.csrs.mcountinhibit = count_inhibit;
        debug!("hart {}: left debug mode", self.id);

        self.restart_hart(host, HaltReason::Debug);
        self.observers.notify_eret(self.id, destination);
        self.refresh_pending(host);
    }

    /// Execute an ebreak: enter Debug when dcsr enables it for the
    /// current mode (or the hart is already in Debug), else deliver a
    /// breakpoint trap. From privilege version 1.12 the breakpoint
    /// reports mtval = 0 rather than the pc.
    pub fn ebreak<H: Host>(&mut self, host: &mut H) {
        if self.debug_mode
            || self.csrs.dcsr.ebreak_enters_debug(self.mode)
        {
            // The ebreak bypasses normal completion, so with
            // stopcount set it is counted by direct adjustment
            if self.csrs.dcsr.stopcount() {
                self.csrs.minstret += 1;
            }
            self.enter_debug(host, DebugCause::Ebreak);
        } else {
            let tval = if self.config.priv_version.breakpoint_tval_zero() {
                0
            } else {
                host.pc()
            };
            self.take_exception(
                host,
                Trap::Exception(Exception::Breakpoint),
                tval,
            );
        }
    }

    /// The one-shot single-step timer fired: one instruction has
    /// retired with dcsr.step set
    pub fn step_timer_expired<H: Host>(&mut self, host: &mut H) {
        host.cancel_step_timer();
        if self.csrs.dcsr.step() && !self.debug_mode {
            self.enter_debug(host, DebugCause::Step);
        }
    }
}
