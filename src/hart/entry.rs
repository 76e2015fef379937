//! Trap entry
//!
//! The single entry point for every architectural trap:
//! [`Hart::take_exception`]. Interrupt deliveries arrive here from
//! the fetch pipeline with their selection already cached on the
//! hart; synchronous exceptions arrive from the executor and the
//! memory subsystem (the latter through
//! [`Hart::take_memory_exception`], which adds the vector
//! first-only-fault handling).
//!
//! References to the privileged spec refer to version 20211203.

use log::debug;

use crate::csr::TvecMode;
use crate::host::Host;
use crate::mode::PrivMode;
use crate::trap::{AccessFaultKind, Exception, Trap};

use super::{debug::DebugCause, Hart};

impl Hart {
    /// Take a trap with the given trap value. All CSR side effects,
    /// the mode switch, handler pc resolution and observer
    /// notification happen here.
    pub fn take_exception<H: Host>(
        &mut self,
        host: &mut H,
        trap: Trap,
        tval: u64,
    ) {
        // In Debug mode the hart takes no further exceptions: abort
        // any repeated instruction and re-enter Debug
        if self.debug_mode {
            host.abort_repeat();
            self.enter_debug(host, DebugCause::None);
            return;
        }

        // Exceptions taken mid-instruction do not retire it, but
        // ecall and ebreak historically did; credit them here since
        // they bypass the normal completion path
        if let Trap::Exception(exception) = trap {
            if exception.is_retiring()
                && self.config.priv_version.ecall_ebreak_retire()
                && !self.csrs.mcountinhibit.ir()
            {
                self.csrs.minstret += 1;
            }
        }

        // Access-fault side channel: the device/plain sub-cause is
        // latched through for the three access faults and cleared for
        // everything else
        self.af_error_out = match trap {
            Trap::Exception(exception) if exception.is_access_fault() => {
                self.af_error_in
            }
            _ => AccessFaultKind::None,
        };

        self.clear_reservation();

        let is_interrupt = trap.is_interrupt();
        let code = trap.code();
        let selection = if is_interrupt { self.pend_enab } else { None };
        let clic_delivery = selection
            .map_or(false, |selection| selection.is_clic && selection.id == code);

        // Target mode: a CLIC delivery carries its privilege from the
        // selector, everything else consults the delegation CSRs.
        // Traps never fall below the current privilege.
        let mut mode_x = if clic_delivery {
            selection.map(|selection| selection.target)
                .unwrap_or(PrivMode::Machine)
        } else if is_interrupt {
            self.interrupt_target(code)
        } else {
            self.exception_target(code)
        };
        if mode_x < self.mode {
            mode_x = self.mode;
        }

        // Platforms with an integrated interrupt-ID bus substitute
        // the reported cause code for external interrupts
        let mut ecode_mod = u64::from(code);
        if let Trap::Interrupt(interrupt) = trap {
            if let Some(ext_mode) = interrupt.external_mode() {
                let substitute =
                    self.ext_int[ext_mode.encoding() as usize];
                if substitute != 0 {
                    ecode_mod = substitute;
                }
            }
        }

        // Interrupt level: interrupts carry the selector's level; a
        // vertical synchronous trap starts at level 0 in the higher
        // mode; a horizontal one leaves the active level alone
        let level: Option<u8> = if is_interrupt {
            Some(
                selection
                    .filter(|selection| selection.id == code)
                    .map_or(0, |selection| selection.level),
            )
        } else if mode_x == self.mode {
            None
        } else {
            Some(0)
        };

        let tval = if self.config.tval_zero { 0 } else { tval };

        // Per-mode CSR update for the target mode
        let previous_level = self.csrs.mintstatus.xil(mode_x);
        self.csrs.mstatus.push_interrupt_enable(mode_x);
        if !self.clic_active_in(mode_x) {
            self.csrs.xcause_mut(mode_x).zero();
        }
        let xlen = self.config.xlen;
        {
            let cause = self.csrs.xcause_mut(mode_x);
            cause.set_code(ecode_mod);
            cause.set_interrupt(xlen, is_interrupt);
            cause.set_pil(previous_level);
        }
        let epc = host.pc_deferred().0;
        self.csrs.set_xepc(mode_x, epc);
        self.csrs.set_xtval(mode_x, tval);
        let tvec = self.csrs.xtvec(mode_x);
        if let Some(level) = level {
            self.csrs.mintstatus.set_xil(mode_x, u64::from(level));
        }
        self.csrs.mstatus.set_xpp(mode_x, self.mode);

        self.set_mode(mode_x);

        // Hardware vectoring comes from the CLIC selection record
        let shv = clic_delivery
            && self
                .clic
                .as_ref()
                .and_then(|clic| clic.sel)
                .map_or(false, |clic_sel| clic_sel.id == code && clic_sel.shv);
        let handler = match self.resolve_handler_pc(
            host,
            mode_x,
            tvec,
            is_interrupt,
            code,
            ecode_mod,
            shv,
        ) {
            Some(handler) => handler,
            // A nested trap during the vector fetch wins; abandon
            // this delivery without touching the pc
            None => return,
        };

        host.set_pc_exception(handler);
        self.exception = Some(trap);
        debug!(
            "hart {}: {:?} taken to {}-mode, handler 0x{:x}",
            self.id,
            trap,
            mode_x.letter(),
            handler
        );
        self.observers.notify_trap(self.id, mode_x, trap);
        self.refresh_pending(host);
    }

    /// Memory exceptions pass through the vector first-only-fault
    /// filter: when the flag is armed and vstart is nonzero, the trap
    /// is dropped and vl is clamped to vstart instead. A taken memory
    /// trap forces vstart to zero.
    pub fn take_memory_exception<H: Host>(
        &mut self,
        host: &mut H,
        trap: Trap,
        tval: u64,
    ) {
        debug!(
            "hart {}: memory exception {:?} tval 0x{:x}",
            self.id, trap, tval
        );
        let first_fault = self.v_first_fault;
        self.v_first_fault = false;
        if first_fault && self.csrs.vstart != 0 {
            debug!(
                "hart {}: first-only-fault, vl clamped to {}",
                self.id, self.csrs.vstart
            );
            self.csrs.vl = self.csrs.vstart;
            return;
        }
        self.csrs.vstart = 0;
        self.take_exception(host, trap, tval);
    }

    /// Illegal instruction trap. The trap value is the faulting
    /// encoding when the configuration asks for it, else zero.
    pub fn illegal_instruction<H: Host>(
        &mut self,
        host: &mut H,
        instruction: u64,
    ) {
        let tval = if self.config.tval_ii_code && !self.config.tval_zero {
            instruction
        } else {
            0
        };
        self.take_exception(
            host,
            Trap::Exception(Exception::IllegalInstruction),
            tval,
        );
    }

    /// Instruction address misaligned trap; the reported target
    /// address has its low bit cleared
    pub fn instruction_address_misaligned<H: Host>(
        &mut self,
        host: &mut H,
        target: u64,
    ) {
        self.take_exception(
            host,
            Trap::Exception(Exception::InstructionAddressMisaligned),
            target & !1,
        );
    }

    /// Environment call from the current mode
    pub fn environment_call<H: Host>(&mut self, host: &mut H) {
        let exception = Exception::environment_call(self.mode);
        self.take_exception(host, Trap::Exception(exception), 0);
    }

    /// Delegation lookup for a synchronous exception: clear in
    /// medeleg traps to M, else clear in sedeleg traps to S, else U
    fn exception_target(&self, code: u32) -> PrivMode {
        let s = self.config.extensions.has('S');
        let n = self.config.extensions.has('N');
        let medeleg = if s { self.csrs.medeleg } else { 0 };
        let sedeleg = if s && n { self.csrs.sedeleg } else { 0 };
        delegation_target(code, medeleg, sedeleg)
    }

    /// Delegation lookup for a basic interrupt, against mideleg and
    /// sideleg
    fn interrupt_target(&self, code: u32) -> PrivMode {
        let s = self.config.extensions.has('S');
        let n = self.config.extensions.has('N');
        let mideleg = if s { self.csrs.mideleg } else { 0 };
        let sideleg = if s && n { self.csrs.sideleg } else { 0 };
        delegation_target(code, mideleg, sideleg)
    }

    /// Resolve the handler pc (privileged spec section 3.1.7 plus
    /// the CLIC extensions):
    ///
    /// * direct mode, or any synchronous exception: the vector base
    /// * classic vectored: base + 4 * cause
    /// * CLIC without hardware vectoring: the base aligned down to 64
    /// * CLIC with hardware vectoring: acknowledge the interrupt,
    ///   then read the handler pointer from the vector table
    ///
    /// The acknowledgement happens before the table read, so an
    /// edge-triggered source stays deasserted even when the read
    /// faults; this matches what the bus fabric would have done.
    /// A faulting read abandons the delivery (None): the host's
    /// memory subsystem follows up with the nested trap, whose
    /// handler pc prevails.
    #[allow(clippy::too_many_arguments)]
    fn resolve_handler_pc<H: Host>(
        &mut self,
        host: &mut H,
        mode_x: PrivMode,
        tvec: crate::csr::Xtvec,
        is_interrupt: bool,
        code: u32,
        ecode_mod: u64,
        shv: bool,
    ) -> Option<u64> {
        let base = tvec.base();
        if !is_interrupt || tvec.mode() == TvecMode::Direct {
            return Some(base);
        }
        match tvec.mode() {
            TvecMode::Vectored => Some(base + 4 * u64::from(code)),
            _ if !shv => Some(base & !63),
            _ => {
                if let Some(clic) = self.clic.as_mut() {
                    clic.acknowledge(code);
                }
                self.csrs.xcause_mut(mode_x).set_inhv(true);
                let pointer_bytes = self.config.xlen.pointer_bytes();
                let address =
                    self.csrs.xtvt(mode_x) + pointer_bytes * ecode_mod;
                let entry =
                    host.read_data(address, pointer_bytes, self.config.endian);
                match entry {
                    Some(entry) => {
                        self.csrs.xcause_mut(mode_x).set_inhv(false);
                        Some(entry & !1)
                    }
                    None => None,
                }
            }
        }
    }
}

/// Shared delegation rule: a clear bit in the machine-level register
/// keeps the trap in M; a clear bit in the supervisor-level register
/// stops it at S; otherwise it reaches U
fn delegation_target(code: u32, m_deleg: u64, s_deleg: u64) -> PrivMode {
    let delegated = |register: u64| code < 64 && register >> code & 1 != 0;
    if !delegated(m_deleg) {
        PrivMode::Machine
    } else if !delegated(s_deleg) {
        PrivMode::Supervisor
    } else {
        PrivMode::User
    }
}
