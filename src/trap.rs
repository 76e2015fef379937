//! Trap catalogue
//!
//! This file contains the catalogue of standard exceptions and
//! interrupts: their cause codes, the composition of the xcause
//! value, and the static descriptor table used to enumerate which
//! traps a configured hart can raise.
//!
//! References to the privileged spec refer to version 20211203 (cause
//! codes are in table 3.6).

use crate::config::{HartConfig, Xlen};
use crate::mode::PrivMode;

/// All standard synchronous exceptions
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    InstructionAddressMisaligned,
    InstructionAccessFault,
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreAmoAddressMisaligned,
    StoreAmoAccessFault,
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
    InstructionPageFault,
    LoadPageFault,
    StoreAmoPageFault,
}

impl Exception {
    /// The exception code reported in xcause
    pub fn code(&self) -> u32 {
        match self {
            Exception::InstructionAddressMisaligned => 0,
            Exception::InstructionAccessFault => 1,
            Exception::IllegalInstruction => 2,
            Exception::Breakpoint => 3,
            Exception::LoadAddressMisaligned => 4,
            Exception::LoadAccessFault => 5,
            Exception::StoreAmoAddressMisaligned => 6,
            Exception::StoreAmoAccessFault => 7,
            Exception::EnvironmentCallFromUMode => 8,
            Exception::EnvironmentCallFromSMode => 9,
            Exception::EnvironmentCallFromMMode => 11,
            Exception::InstructionPageFault => 12,
            Exception::LoadPageFault => 13,
            Exception::StoreAmoPageFault => 15,
        }
    }

    /// The ecall exception for the given current mode. The cause code
    /// is EnvironmentCallFromUMode plus the mode encoding.
    pub fn environment_call(mode: PrivMode) -> Exception {
        match mode {
            PrivMode::User => Exception::EnvironmentCallFromUMode,
            PrivMode::Supervisor => Exception::EnvironmentCallFromSMode,
            PrivMode::Machine => Exception::EnvironmentCallFromMMode,
        }
    }

    /// Whether this is one of the three access faults that carry the
    /// device/plain sub-cause through the side channel
    pub fn is_access_fault(&self) -> bool {
        matches!(
            self,
            Exception::InstructionAccessFault
                | Exception::LoadAccessFault
                | Exception::StoreAmoAccessFault
        )
    }

    /// ecall and ebreak count as retired in privilege versions before
    /// 1.12; all other exceptions abandon the faulting instruction
    pub fn is_retiring(&self) -> bool {
        matches!(
            self,
            Exception::Breakpoint
                | Exception::EnvironmentCallFromUMode
                | Exception::EnvironmentCallFromSMode
                | Exception::EnvironmentCallFromMMode
        )
    }
}

/// All interrupts the model can deliver. The sixteen standard ids are
/// named; local interrupts occupy ids 16 and up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Interrupt {
    UserSoftware,
    SupervisorSoftware,
    MachineSoftware,
    UserTimer,
    SupervisorTimer,
    MachineTimer,
    UserExternal,
    SupervisorExternal,
    MachineExternal,
    /// CLIC software interrupt (CSIP, id 12)
    ClicSoftware,
    /// LocalInterruptN input, id 16+N
    Local(u32),
}

impl Interrupt {
    /// The exception code for an interrupt is the bit position in mie
    /// and mip used to enable the interrupt and report it as pending.
    pub fn code(&self) -> u32 {
        match self {
            Interrupt::UserSoftware => 0,
            Interrupt::SupervisorSoftware => 1,
            Interrupt::MachineSoftware => 3,
            Interrupt::UserTimer => 4,
            Interrupt::SupervisorTimer => 5,
            Interrupt::MachineTimer => 7,
            Interrupt::UserExternal => 8,
            Interrupt::SupervisorExternal => 9,
            Interrupt::MachineExternal => 11,
            Interrupt::ClicSoftware => 12,
            Interrupt::Local(n) => 16 + n,
        }
    }

    pub fn from_code(code: u32) -> Option<Interrupt> {
        match code {
            0 => Some(Interrupt::UserSoftware),
            1 => Some(Interrupt::SupervisorSoftware),
            3 => Some(Interrupt::MachineSoftware),
            4 => Some(Interrupt::UserTimer),
            5 => Some(Interrupt::SupervisorTimer),
            7 => Some(Interrupt::MachineTimer),
            8 => Some(Interrupt::UserExternal),
            9 => Some(Interrupt::SupervisorExternal),
            11 => Some(Interrupt::MachineExternal),
            12 => Some(Interrupt::ClicSoftware),
            n if n >= 16 => Some(Interrupt::Local(n - 16)),
            _ => None,
        }
    }

    /// The external interrupts whose reported cause code can be
    /// substituted by an ExternalInterruptID input, together with the
    /// mode the substitute code belongs to
    pub fn external_mode(&self) -> Option<PrivMode> {
        match self {
            Interrupt::UserExternal => Some(PrivMode::User),
            Interrupt::SupervisorExternal => Some(PrivMode::Supervisor),
            Interrupt::MachineExternal => Some(PrivMode::Machine),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trap {
    Exception(Exception),
    Interrupt(Interrupt),
}

impl Trap {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Trap::Interrupt(_))
    }

    pub fn code(&self) -> u32 {
        match self {
            Trap::Exception(exception) => exception.code(),
            Trap::Interrupt(interrupt) => interrupt.code(),
        }
    }

    /// Returns the interrupt-bit component of xcause (the top bit of
    /// the register)
    pub fn interrupt_bit(&self, xlen: Xlen) -> u64 {
        match self {
            Trap::Interrupt(_) => 1 << (xlen.bits() - 1),
            Trap::Exception(_) => 0,
        }
    }

    /// The value of the xcause CSR for this trap, before any cause
    /// code substitution
    pub fn xcause(&self, xlen: Xlen) -> u64 {
        self.interrupt_bit(xlen) | u64::from(self.code())
    }
}

/// Access-fault sub-cause carried from the memory subsystem to trap
/// observers: whether the fault hit a device region or plain memory
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum AccessFaultKind {
    #[default]
    None,
    Plain,
    Device,
}

/// What a trap descriptor needs from the hart before the trap exists
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Requirement {
    Always,
    /// A misa extension letter must be present
    Extension(char),
    /// The CLIC must be configured
    Clic,
}

/// One entry in the static trap catalogue
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TrapDescriptor {
    pub code: u32,
    pub interrupt: bool,
    pub name: &'static str,
    pub requires: Requirement,
}

impl TrapDescriptor {
    pub fn is_implemented(&self, config: &HartConfig) -> bool {
        match self.requires {
            Requirement::Always => true,
            Requirement::Extension(letter) => config.extensions.has(letter),
            Requirement::Clic => config.clic.is_some(),
        }
    }
}

/// The standard exceptions and interrupts, indexed by numeric code.
/// Derived models can contribute further descriptors through the
/// observer list.
pub const STANDARD_TRAPS: &[TrapDescriptor] = &[
    TrapDescriptor { code: 0, interrupt: false, name: "InstructionAddressMisaligned", requires: Requirement::Always },
    TrapDescriptor { code: 1, interrupt: false, name: "InstructionAccessFault", requires: Requirement::Always },
    TrapDescriptor { code: 2, interrupt: false, name: "IllegalInstruction", requires: Requirement::Always },
    TrapDescriptor { code: 3, interrupt: false, name: "Breakpoint", requires: Requirement::Always },
    TrapDescriptor { code: 4, interrupt: false, name: "LoadAddressMisaligned", requires: Requirement::Always },
    TrapDescriptor { code: 5, interrupt: false, name: "LoadAccessFault", requires: Requirement::Always },
    TrapDescriptor { code: 6, interrupt: false, name: "StoreAMOAddressMisaligned", requires: Requirement::Always },
    TrapDescriptor { code: 7, interrupt: false, name: "StoreAMOAccessFault", requires: Requirement::Always },
    TrapDescriptor { code: 8, interrupt: false, name: "EnvironmentCallFromUMode", requires: Requirement::Extension('U') },
    TrapDescriptor { code: 9, interrupt: false, name: "EnvironmentCallFromSMode", requires: Requirement::Extension('S') },
    TrapDescriptor { code: 11, interrupt: false, name: "EnvironmentCallFromMMode", requires: Requirement::Always },
    TrapDescriptor { code: 12, interrupt: false, name: "InstructionPageFault", requires: Requirement::Extension('S') },
    TrapDescriptor { code: 13, interrupt: false, name: "LoadPageFault", requires: Requirement::Extension('S') },
    TrapDescriptor { code: 15, interrupt: false, name: "StoreAMOPageFault", requires: Requirement::Extension('S') },
    TrapDescriptor { code: 0, interrupt: true, name: "USWInterrupt", requires: Requirement::Extension('N') },
    TrapDescriptor { code: 1, interrupt: true, name: "SSWInterrupt", requires: Requirement::Extension('S') },
    TrapDescriptor { code: 3, interrupt: true, name: "MSWInterrupt", requires: Requirement::Always },
    TrapDescriptor { code: 4, interrupt: true, name: "UTimerInterrupt", requires: Requirement::Extension('N') },
    TrapDescriptor { code: 5, interrupt: true, name: "STimerInterrupt", requires: Requirement::Extension('S') },
    TrapDescriptor { code: 7, interrupt: true, name: "MTimerInterrupt", requires: Requirement::Always },
    TrapDescriptor { code: 8, interrupt: true, name: "UExternalInterrupt", requires: Requirement::Extension('N') },
    TrapDescriptor { code: 9, interrupt: true, name: "SExternalInterrupt", requires: Requirement::Extension('S') },
    TrapDescriptor { code: 11, interrupt: true, name: "MExternalInterrupt", requires: Requirement::Always },
    TrapDescriptor { code: 12, interrupt: true, name: "CSIP", requires: Requirement::Clic },
];
