//! Control and status registers touched by the trap core
//!
//! Only the registers the trap and interrupt machinery reads or
//! writes are modelled here; the rest of the 4096-entry CSR space
//! belongs to the surrounding simulator. Registers with architectural
//! bit fields are wrapped in small typed values with `from_raw` /
//! `as_raw` and per-field accessors, so that clamping and WPRI rules
//! are applied in exactly one place.
//!
//! The M/S/U trap register groups (xepc, xcause, xtval, xtvec, xtvt,
//! xintthresh) are addressed through a [`PrivMode`] parameter rather
//! than three copies of each routine.
//!
//! References to the privileged spec refer to version 20211203; CLIC
//! register layouts follow the draft CLIC spec.

use crate::config::{ClicConfig, Xlen};
use crate::mode::PrivMode;
use crate::utils::{deposit_field, extract_field};

macro_rules! csr_flag {
    ($get:ident, $set:ident, $bit:expr) => {
        pub fn $get(&self) -> bool {
            extract_field(self.0, $bit, $bit) != 0
        }

        pub fn $set(&mut self, value: bool) {
            self.0 =
                deposit_field(self.0, $bit, $bit, if value { 1 } else { 0 });
        }
    };
}

macro_rules! csr_field {
    ($get:ident, $set:ident, $hi:expr, $lo:expr) => {
        pub fn $get(&self) -> u64 {
            extract_field(self.0, $hi, $lo)
        }

        pub fn $set(&mut self, value: u64) {
            self.0 = deposit_field(self.0, $hi, $lo, value);
        }
    };
    ($get:ident, $set:ident, $hi:expr, $lo:expr, $ty:ty) => {
        pub fn $get(&self) -> $ty {
            extract_field(self.0, $hi, $lo)
        }

        pub fn $set(&mut self, value: $ty) {
            self.0 = deposit_field(self.0, $hi, $lo, value);
        }
    };
}

/// The mstatus register (privileged spec section 3.1.6). Only the
/// interrupt-enable stack, the previous-privilege fields and MPRV are
/// modelled; the remaining fields belong to the wider simulator.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Mstatus(u64);

impl Mstatus {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    csr_flag!(uie, set_uie, 0);
    csr_flag!(sie, set_sie, 1);
    csr_flag!(mie, set_mie, 3);
    csr_flag!(upie, set_upie, 4);
    csr_flag!(spie, set_spie, 5);
    csr_flag!(mpie, set_mpie, 7);
    csr_field!(spp, set_spp, 8, 8);
    csr_field!(mpp, set_mpp, 12, 11);
    csr_flag!(mprv, set_mprv, 17);

    /// Global interrupt-enable bit for the given mode
    pub fn xie(&self, mode: PrivMode) -> bool {
        match mode {
            PrivMode::User => self.uie(),
            PrivMode::Supervisor => self.sie(),
            PrivMode::Machine => self.mie(),
        }
    }

    pub fn set_xie(&mut self, mode: PrivMode, value: bool) {
        match mode {
            PrivMode::User => self.set_uie(value),
            PrivMode::Supervisor => self.set_sie(value),
            PrivMode::Machine => self.set_mie(value),
        }
    }

    /// Previous interrupt-enable bit for the given mode
    pub fn xpie(&self, mode: PrivMode) -> bool {
        match mode {
            PrivMode::User => self.upie(),
            PrivMode::Supervisor => self.spie(),
            PrivMode::Machine => self.mpie(),
        }
    }

    pub fn set_xpie(&mut self, mode: PrivMode, value: bool) {
        match mode {
            PrivMode::User => self.set_upie(value),
            PrivMode::Supervisor => self.set_spie(value),
            PrivMode::Machine => self.set_mpie(value),
        }
    }

    /// Previous privilege mode recorded for a trap into the given
    /// mode. There is no UPP field, so returns from U-mode traps
    /// always go back to U.
    pub fn xpp(&self, mode: PrivMode) -> PrivMode {
        match mode {
            PrivMode::User => PrivMode::User,
            PrivMode::Supervisor => {
                if self.spp() != 0 {
                    PrivMode::Supervisor
                } else {
                    PrivMode::User
                }
            }
            PrivMode::Machine => PrivMode::from_encoding(self.mpp())
                .unwrap_or(PrivMode::Machine),
        }
    }

    pub fn set_xpp(&mut self, mode: PrivMode, value: PrivMode) {
        match mode {
            PrivMode::User => {}
            PrivMode::Supervisor => {
                self.set_spp(if value == PrivMode::User { 0 } else { 1 })
            }
            PrivMode::Machine => self.set_mpp(value.encoding()),
        }
    }

    /// As per section 3.1.6.1 privileged spec, xIE is saved to xPIE
    /// on a trap, and xIE is set to 0
    pub fn push_interrupt_enable(&mut self, mode: PrivMode) {
        let enable = self.xie(mode);
        self.set_xpie(mode, enable);
        self.set_xie(mode, false);
    }

    /// As per section 3.1.6.1 privileged spec, xPIE is restored to
    /// xIE on an xRET, and xPIE is set to 1
    pub fn pop_interrupt_enable(&mut self, mode: PrivMode) {
        let enable = self.xpie(mode);
        self.set_xie(mode, enable);
        self.set_xpie(mode, true);
    }
}

/// The xcause register, including the CLIC pil and inhv fields. The
/// interrupt flag occupies the top bit of the register, so the two
/// accessors that touch it take the hart's xlen.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Xcause(u64);

impl Xcause {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    csr_field!(code, set_code, 11, 0);
    csr_field!(pil, set_pil, 23, 16);
    csr_flag!(inhv, set_inhv, 30);

    pub fn interrupt(&self, xlen: Xlen) -> bool {
        let top = xlen.bits() - 1;
        extract_field(self.0, top, top) != 0
    }

    pub fn set_interrupt(&mut self, xlen: Xlen, value: bool) {
        let top = xlen.bits() - 1;
        self.0 = deposit_field(self.0, top, top, if value { 1 } else { 0 });
    }

    pub fn zero(&mut self) {
        self.0 = 0;
    }
}

/// Trap handler dispatch mode held in the low bits of xtvec
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TvecMode {
    #[default]
    Direct,
    Vectored,
    Clic,
}

/// The xtvec register. The base is held in bits above the 2-bit mode
/// field; encoding 2 is reserved and reads back as direct.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Xtvec(u64);

impl Xtvec {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    pub fn base(&self) -> u64 {
        self.0 & !0b11
    }

    pub fn set_base(&mut self, base: u64) {
        self.0 = (base & !0b11) | (self.0 & 0b11);
    }

    pub fn mode(&self) -> TvecMode {
        match self.0 & 0b11 {
            1 => TvecMode::Vectored,
            3 => TvecMode::Clic,
            _ => TvecMode::Direct,
        }
    }

    pub fn set_mode(&mut self, mode: TvecMode) {
        let encoding = match mode {
            TvecMode::Direct => 0,
            TvecMode::Vectored => 1,
            TvecMode::Clic => 3,
        };
        self.0 = (self.0 & !0b11) | encoding;
    }
}

/// The mintstatus register: the active interrupt level per privilege
/// mode (CLIC draft spec)
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Mintstatus(u64);

impl Mintstatus {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    csr_field!(mil, set_mil, 31, 24);
    csr_field!(sil, set_sil, 15, 8);
    csr_field!(uil, set_uil, 7, 0);

    pub fn xil(&self, mode: PrivMode) -> u64 {
        match mode {
            PrivMode::User => self.uil(),
            PrivMode::Supervisor => self.sil(),
            PrivMode::Machine => self.mil(),
        }
    }

    pub fn set_xil(&mut self, mode: PrivMode, level: u64) {
        match mode {
            PrivMode::User => self.set_uil(level),
            PrivMode::Supervisor => self.set_sil(level),
            PrivMode::Machine => self.set_mil(level),
        }
    }
}

/// The mcountinhibit register (privileged spec section 3.1.13)
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Mcountinhibit(u64);

impl Mcountinhibit {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    csr_flag!(cy, set_cy, 0);
    csr_flag!(ir, set_ir, 2);
}

/// The dcsr register (debug spec section 4.8.1)
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Dcsr(u64);

impl Dcsr {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    csr_field!(prv, set_prv, 1, 0);
    csr_flag!(step, set_step, 2);
    csr_flag!(nmip, set_nmip, 3);
    csr_field!(cause, set_cause, 8, 6);
    csr_flag!(stopcount, set_stopcount, 10);
    csr_flag!(ebreaku, set_ebreaku, 12);
    csr_flag!(ebreaks, set_ebreaks, 13);
    csr_flag!(ebreakm, set_ebreakm, 15);
    csr_field!(xdebugver, set_xdebugver, 31, 28);

    /// Whether ebreak in the given mode enters Debug instead of
    /// raising a breakpoint trap
    pub fn ebreak_enters_debug(&self, mode: PrivMode) -> bool {
        match mode {
            PrivMode::User => self.ebreaku(),
            PrivMode::Supervisor => self.ebreaks(),
            PrivMode::Machine => self.ebreakm(),
        }
    }
}

/// The cliccfg byte shared by the whole cluster. Field layout follows
/// the CLIC draft: nvbits in bit 0, nlbits in bits 4:1, nmbits in
/// bits 6:5; bit 7 is WPRI.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Cliccfg(u8);

impl Cliccfg {
    pub fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u8 {
        self.0
    }

    csr_flag!(nvbits, set_nvbits, 0);
    csr_field!(nlbits, set_nlbits, 4, 1, u8);
    csr_field!(nmbits, set_nmbits, 6, 5, u8);
}

/// One clicintattr byte: shv in bit 0, trig in bits 2:1, mode in
/// bits 7:6. The trig low bit selects edge triggering and the high
/// bit selects an active-low input.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ClicIntAttr(u8);

impl ClicIntAttr {
    pub fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u8 {
        self.0
    }

    csr_flag!(shv, set_shv, 0);
    csr_field!(trig, set_trig, 2, 1, u8);
    csr_field!(mode, set_mode, 7, 6, u8);

    pub fn edge_triggered(&self) -> bool {
        self.trig() & 1 != 0
    }

    pub fn active_low(&self) -> bool {
        self.trig() & 2 != 0
    }
}

/// The read-only clicinfo word exposed in the CLIC control page
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Clicinfo(u32);

impl Clicinfo {
    pub fn new(config: &ClicConfig) -> Self {
        let mut info = Self(0);
        info.set_num_interrupt(config.num_interrupt);
        info.set_version(u32::from(config.version));
        info.set_ctl_bits(u32::from(config.ctl_bits));
        info
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }

    csr_field!(num_interrupt, set_num_interrupt, 12, 0, u32);
    csr_field!(version, set_version, 20, 13, u32);
    csr_field!(ctl_bits, set_ctl_bits, 24, 21, u32);
}

/// The privileged registers the trap core owns, one set per hart.
///
/// The M/S/U trap groups are stored as three scalar fields each and
/// addressed through the mode-parameterized accessors below.
#[derive(Debug, Default, Clone)]
pub struct Csrs {
    pub mstatus: Mstatus,
    mepc: u64,
    sepc: u64,
    uepc: u64,
    mcause: Xcause,
    scause: Xcause,
    ucause: Xcause,
    mtval: u64,
    stval: u64,
    utval: u64,
    mtvec: Xtvec,
    stvec: Xtvec,
    utvec: Xtvec,
    mtvt: u64,
    stvt: u64,
    utvt: u64,
    pub medeleg: u64,
    pub mideleg: u64,
    pub sedeleg: u64,
    pub sideleg: u64,
    pub mie: u64,
    pub mintstatus: Mintstatus,
    mintthresh: u64,
    sintthresh: u64,
    uintthresh: u64,
    pub mcountinhibit: Mcountinhibit,
    pub dcsr: Dcsr,
    pub dpc: u64,
    pub minstret: u64,
    pub vstart: u64,
    pub vl: u64,
}

impl Csrs {
    pub fn new() -> Self {
        let mut csrs = Self::default();
        // Reset state: mstatus.MPP reads as M, dcsr reports debug
        // spec version 1.0
        csrs.mstatus.set_mpp(PrivMode::Machine.encoding());
        csrs.dcsr.set_xdebugver(4);
        csrs
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn xepc(&self, mode: PrivMode) -> u64 {
        match mode {
            PrivMode::User => self.uepc,
            PrivMode::Supervisor => self.sepc,
            PrivMode::Machine => self.mepc,
        }
    }

    /// Write xepc. The low bit is not writable (privileged spec
    /// section 3.1.14).
    pub fn set_xepc(&mut self, mode: PrivMode, value: u64) {
        let value = value & !1;
        match mode {
            PrivMode::User => self.uepc = value,
            PrivMode::Supervisor => self.sepc = value,
            PrivMode::Machine => self.mepc = value,
        }
    }

    pub fn xcause(&self, mode: PrivMode) -> Xcause {
        match mode {
            PrivMode::User => self.ucause,
            PrivMode::Supervisor => self.scause,
            PrivMode::Machine => self.mcause,
        }
    }

    pub fn xcause_mut(&mut self, mode: PrivMode) -> &mut Xcause {
        match mode {
            PrivMode::User => &mut self.ucause,
            PrivMode::Supervisor => &mut self.scause,
            PrivMode::Machine => &mut self.mcause,
        }
    }

    pub fn xtval(&self, mode: PrivMode) -> u64 {
        match mode {
            PrivMode::User => self.utval,
            PrivMode::Supervisor => self.stval,
            PrivMode::Machine => self.mtval,
        }
    }

    pub fn set_xtval(&mut self, mode: PrivMode, value: u64) {
        match mode {
            PrivMode::User => self.utval = value,
            PrivMode::Supervisor => self.stval = value,
            PrivMode::Machine => self.mtval = value,
        }
    }

    pub fn xtvec(&self, mode: PrivMode) -> Xtvec {
        match mode {
            PrivMode::User => self.utvec,
            PrivMode::Supervisor => self.stvec,
            PrivMode::Machine => self.mtvec,
        }
    }

    pub fn xtvec_mut(&mut self, mode: PrivMode) -> &mut Xtvec {
        match mode {
            PrivMode::User => &mut self.utvec,
            PrivMode::Supervisor => &mut self.stvec,
            PrivMode::Machine => &mut self.mtvec,
        }
    }

    pub fn xtvt(&self, mode: PrivMode) -> u64 {
        match mode {
            PrivMode::User => self.utvt,
            PrivMode::Supervisor => self.stvt,
            PrivMode::Machine => self.mtvt,
        }
    }

    /// The CLIC vector table base is 64-byte aligned
    pub fn set_xtvt(&mut self, mode: PrivMode, value: u64) {
        let value = value & !0x3f;
        match mode {
            PrivMode::User => self.utvt = value,
            PrivMode::Supervisor => self.stvt = value,
            PrivMode::Machine => self.mtvt = value,
        }
    }

    /// The interrupt-level threshold for the given mode (the th field
    /// of xintthresh)
    pub fn xintthresh(&self, mode: PrivMode) -> u64 {
        match mode {
            PrivMode::User => self.uintthresh,
            PrivMode::Supervisor => self.sintthresh,
            PrivMode::Machine => self.mintthresh,
        }
    }

    pub fn set_xintthresh(&mut self, mode: PrivMode, value: u64) {
        let value = value & 0xff;
        match mode {
            PrivMode::User => self.uintthresh = value,
            PrivMode::Supervisor => self.sintthresh = value,
            PrivMode::Machine => self.mintthresh = value,
        }
    }
}
