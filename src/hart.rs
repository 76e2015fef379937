//! RISC-V hart trap state
//!
//! One [`Hart`] holds the per-hart architectural state the trap core
//! owns: the current privilege mode, the Debug flag, the halt-reason
//! bitmask, the latched interrupt inputs, the pending-and-enabled
//! selection cache, the LR reservation tag, and the access-fault
//! sub-cause pipeline.
//!
//! The trap machinery itself is split across the submodules: trap
//! entry, trap return, Debug mode, the external signal layer and the
//! fetch-boundary delivery pipeline. Everything here is shared
//! plumbing used by more than one of those.

use log::debug;

use crate::basic::{self, BasicInputs, BasicSelection};
use crate::clic::ClicHartState;
use crate::config::HartConfig;
use crate::csr::{Csrs, TvecMode};
use crate::host::{Host, OutputNet};
use crate::mode::PrivMode;
use crate::observer::ObserverList;
use crate::trap::{AccessFaultKind, Trap, TrapDescriptor, STANDARD_TRAPS};

pub mod debug;
pub mod entry;
pub mod fetch;
pub mod ret;
pub mod signal;

/// Reasons a hart can be stalled. The reasons form a bitmask so that
/// several can be active at once; the hart runs only when all are
/// clear.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HaltReason {
    Reset = 0x1,
    Wfi = 0x2,
    Debug = 0x4,
}

/// Latched input net levels
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NetValues {
    pub reset: bool,
    pub nmi: bool,
    pub haltreq: bool,
    pub resethaltreq: bool,
    /// resethaltreq as sampled at the last reset
    pub resethaltreq_s: bool,
    pub deferint: bool,
}

/// The interrupt currently selected for delivery, from either
/// selector. Level is only meaningful for CLIC selections.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Selection {
    pub id: u32,
    pub target: PrivMode,
    pub level: u8,
    pub is_clic: bool,
}

#[derive(Debug)]
pub struct Hart {
    pub id: u32,
    pub config: HartConfig,
    pub csrs: Csrs,
    pub mode: PrivMode,
    pub debug_mode: bool,
    /// Halt-reason bitmask; nonzero means stalled
    disable: u32,
    /// Externally-asserted pending bits, latched from the input nets
    pub(crate) ip: Vec<u64>,
    /// Software-asserted pending bits (CSR writes)
    pub(crate) swip: u64,
    /// The last trap taken
    pub exception: Option<Trap>,
    /// Deliverable-interrupt cache; None iff nothing is deliverable
    pub(crate) pend_enab: Option<Selection>,
    /// Basic selector result, kept for the CLIC delivery gate and
    /// change logging
    pub(crate) basic_sel: Option<BasicSelection>,
    pub clic: Option<ClicHartState>,
    /// ExternalInterruptID input per mode, indexed by mode encoding
    pub(crate) ext_int: [u64; 4],
    /// Active LR reservation, None when no reservation is held
    pub(crate) exclusive_tag: Option<u64>,
    pub af_error_in: AccessFaultKind,
    pub af_error_out: AccessFaultKind,
    /// Vector first-only-fault suppression is armed
    pub v_first_fault: bool,
    pub net_value: NetValues,
    pub observers: ObserverList,
}

impl Hart {
    pub fn new(id: u32, config: HartConfig) -> Self {
        let clic = config
            .clic
            .as_ref()
            .map(|clic_config| ClicHartState::new(clic_config, &config));
        Self {
            id,
            config,
            csrs: Csrs::new(),
            mode: PrivMode::Machine,
            debug_mode: false,
            disable: 0,
            ip: vec![0; config.pending_words()],
            swip: 0,
            exception: None,
            pend_enab: None,
            basic_sel: None,
            clic,
            ext_int: [0; 4],
            exclusive_tag: None,
            af_error_in: AccessFaultKind::default(),
            af_error_out: AccessFaultKind::default(),
            v_first_fault: false,
            net_value: NetValues::default(),
            observers: ObserverList::default(),
        }
    }

    /// The mip register: hardware-latched input bits ORed with the
    /// software-asserted bits
    pub fn mip(&self) -> u64 {
        self.ip[0] | self.swip
    }

    /// Write the software-writable mip bits (SSIP/STIP/SEIP and the
    /// N-extension user bits). The machine-level bits are read-only
    /// reflections of the input nets.
    pub fn write_mip<H: Host>(&mut self, host: &mut H, value: u64) {
        let mut writable = 0;
        if self.config.extensions.has('S') {
            writable |= 1 << 1 | 1 << 5 | 1 << 9;
        }
        if self.config.extensions.has('N') {
            writable |= 1 << 0 | 1 << 4 | 1 << 8;
        }
        self.swip = value & writable;
        self.refresh_pending(host);
    }

    /// Write mie, masked to the interrupts the hart implements
    pub fn write_mie<H: Host>(&mut self, host: &mut H, value: u64) {
        let implemented = self
            .trap_descriptors()
            .iter()
            .filter(|descriptor| descriptor.interrupt && descriptor.code < 64)
            .fold(0u64, |bits, descriptor| bits | 1 << descriptor.code);
        let locals = if self.config.local_interrupts > 0 {
            let top = 16 + u64::from(self.config.local_interrupts);
            if top >= 64 {
                !0xffff
            } else {
                ((1u64 << top) - 1) & !0xffff
            }
        } else {
            0
        };
        self.csrs.mie = value & (implemented | locals);
        self.refresh_pending(host);
    }

    /// Call after mutating delegation, mstatus, xtvec or threshold
    /// CSRs directly, so the selection caches track the change
    pub fn refresh_interrupts<H: Host>(&mut self, host: &mut H) {
        self.refresh_pending(host);
    }

    /// Whether the given mode takes its interrupts through the CLIC
    /// (xtvec selects CLIC mode and a CLIC is configured)
    pub fn clic_active_in(&self, mode: PrivMode) -> bool {
        self.clic.is_some()
            && mode.is_implemented(&self.config)
            && self.csrs.xtvec(mode).mode() == TvecMode::Clic
    }

    fn basic_inputs(&self) -> BasicInputs {
        let s = self.config.extensions.has('S');
        let n = self.config.extensions.has('N');
        BasicInputs {
            // CSIP only exists on the CLIC side
            mip: self.mip() & !(1 << 12),
            mie: self.csrs.mie,
            mideleg: if s { self.csrs.mideleg } else { 0 },
            sideleg: if s && n { self.csrs.sideleg } else { 0 },
            mstatus: self.csrs.mstatus,
            mode: self.mode,
            clic_active: [
                self.clic_active_in(PrivMode::User),
                self.clic_active_in(PrivMode::Supervisor),
                self.clic_active_in(PrivMode::Machine),
            ],
        }
    }

    /// Re-run both selectors and rebuild the deliverable-interrupt
    /// cache. Called after every change to the interrupt state; also
    /// restarts a WFI-stalled hart and rings the host doorbell when a
    /// new selection becomes deliverable.
    pub(crate) fn refresh_pending<H: Host>(&mut self, host: &mut H) {
        if let Some(clic) = self.clic.as_mut() {
            clic.reselect();
        }

        let basic = basic::select(&self.basic_inputs());
        if basic != self.basic_sel {
            debug!("hart {}: basic interrupt selection {:?}", self.id, basic);
            self.basic_sel = basic;
        }

        let mut next = basic.map(|selection| Selection {
            id: selection.code,
            target: selection.target,
            level: 0,
            is_clic: false,
        });

        // The CLIC selection is promoted over the basic one unless
        // the basic selector found a strictly more privileged target
        if let Some(clic_sel) = self.clic.as_ref().and_then(|clic| clic.sel)
        {
            let target = clic_sel.target;
            let basic_higher =
                basic.map_or(false, |selection| selection.target > target);
            let enabled = self.mode < target
                || self.csrs.mstatus.xie(target);
            let level = u64::from(clic_sel.level);
            if !basic_higher
                && self.mode <= target
                && self.clic_active_in(target)
                && enabled
                && level > self.csrs.mintstatus.xil(target)
                && level > self.csrs.xintthresh(target)
            {
                next = Some(Selection {
                    id: clic_sel.id,
                    target,
                    level: clic_sel.level,
                    is_clic: true,
                });
            }
        }

        if next != self.pend_enab {
            debug!("hart {}: deliverable interrupt {:?}", self.id, next);
            self.pend_enab = next;
            if next.is_some() && !self.net_value.deferint {
                host.schedule_interrupt();
            }
        }

        if self.wfi_wakeup_pending() {
            self.restart_hart(host, HaltReason::Wfi);
        }
    }

    /// The currently deliverable interrupt, if any
    pub fn pending_interrupt(&self) -> Option<Selection> {
        self.pend_enab
    }

    /// WFI completes immediately (or a WFI stall ends) when any basic
    /// interrupt is pending and enabled, or any CLIC interrupt is
    /// pending and enabled, regardless of global enables
    pub(crate) fn wfi_wakeup_pending(&self) -> bool {
        self.mip() & self.csrs.mie != 0
            || self
                .clic
                .as_ref()
                .map_or(false, |clic| clic.any_pending_enabled())
    }

    pub fn is_halted(&self) -> bool {
        self.disable != 0
    }

    pub fn halt_reasons(&self) -> u32 {
        self.disable
    }

    /// Stall the hart for the given reason. The host and the
    /// observers see one notification per state transition, however
    /// many reasons pile up.
    pub(crate) fn halt_hart<H: Host>(
        &mut self,
        host: &mut H,
        reason: HaltReason,
    ) {
        if self.disable == 0 {
            host.halt();
            self.observers.notify_halt_restart(self.id, false);
            debug!("hart {}: halted ({:?})", self.id, reason);
        }
        self.disable |= reason as u32;
    }

    /// Clear one stall reason; the hart resumes when the last reason
    /// clears
    pub(crate) fn restart_hart<H: Host>(
        &mut self,
        host: &mut H,
        reason: HaltReason,
    ) {
        if self.disable & reason as u32 != 0 {
            self.disable &= !(reason as u32);
            if self.disable == 0 {
                host.restart();
                self.observers.notify_halt_restart(self.id, true);
                debug!("hart {}: restarted", self.id);
            }
        }
    }

    /// Install an LR reservation. The address passes through the
    /// registered address snaps and is broadcast on the LR_address
    /// net.
    pub fn set_reservation<H: Host>(&mut self, host: &mut H, addr: u64) {
        let addr = self.observers.snap_read_address(addr);
        self.exclusive_tag = Some(addr);
        host.write_net(OutputNet::LrAddress, addr);
    }

    pub fn clear_reservation(&mut self) {
        self.exclusive_tag = None;
    }

    /// Broadcast a store-conditional address on the SC_address net
    pub fn broadcast_sc_address<H: Host>(&mut self, host: &mut H, addr: u64) {
        let addr = self.observers.snap_write_address(addr);
        host.write_net(OutputNet::ScAddress, addr);
    }

    /// Drive the active-AMO code net (zero when no AMO is in flight)
    pub fn set_amo_active<H: Host>(&mut self, host: &mut H, code: u64) {
        host.write_net(OutputNet::AmoActive, code);
    }

    pub fn reservation(&self) -> Option<u64> {
        self.exclusive_tag
    }

    /// The host reports each completed instruction here: bump the
    /// retired-instruction counter and, when single-stepping, arm the
    /// one-shot step timer
    pub fn retire<H: Host>(&mut self, host: &mut H) {
        if !self.csrs.mcountinhibit.ir() {
            self.csrs.minstret += 1;
        }
        if self.csrs.dcsr.step() && !self.debug_mode {
            host.arm_step_timer();
        }
    }

    /// Every trap this hart can raise: the standard catalogue
    /// filtered by configuration, then the descriptors contributed by
    /// derived models, in registration order
    pub fn trap_descriptors(&self) -> Vec<TrapDescriptor> {
        itertools::chain(
            STANDARD_TRAPS
                .iter()
                .filter(|descriptor| descriptor.is_implemented(&self.config))
                .copied(),
            self.observers.extra_traps(),
        )
        .collect()
    }

    pub(crate) fn set_mode(&mut self, mode: PrivMode) {
        self.mode = mode;
    }
}
