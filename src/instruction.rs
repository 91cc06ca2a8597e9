// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Instruction length decoding and classification
//!
//! This module provides the [length decoder][ild] for the traced machine code
//! and the [`Instruction`] descriptors it produces. An [`Instruction`] carries
//! the information needed for following the control flow: its size and, for
//! instructions that may alter the flow, its [`Kind`].
//!
//! # Example
//!
//! ```
//! use ptflow::instruction::{self, Class, Kind};
//! use ptflow::types::Mode;
//!
//! let insn = instruction::decode(b"\xe9\x60\xf9\xff\xff", Mode::Bit64).unwrap();
//! assert_eq!(insn.size, 5);
//! assert_eq!(insn.kind, Some(Kind::jmp_e9(-0x6a0)));
//! assert_eq!(insn.class(), Class::Jump);
//! assert_eq!(insn.branch_target(0x1000), Some(0x965));
//! ```

pub mod ild;
mod table;

#[cfg(test)]
mod tests;

use core::fmt;

use crate::types::Mode;

/// Decode a single instruction
///
/// Length-decodes and classifies the instruction at the start of `bytes`.
pub fn decode(bytes: &[u8], mode: Mode) -> Result<Instruction, Error> {
    ild::Ild::new(bytes, mode)
        .length_decode()
        .map(|d| d.classify())
}

/// A single length-decoded and classified instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Size of the instruction in bytes
    pub size: u8,
    /// Execution mode the instruction was decoded for
    pub mode: Mode,
    /// Whether the operand-size override prefix `66` is present
    pub osz: bool,
    /// Kind of the instruction, if it is relevant for the control flow
    pub kind: Option<Kind>,
}

impl Instruction {
    /// Retrieve the instruction's [`Class`]
    pub fn class(&self) -> Class {
        self.kind.map(Kind::class).unwrap_or(Class::Other)
    }

    /// Retrieve the relative branch displacement
    ///
    /// Returns `None` if the instruction is not a relative branch.
    pub fn displacement(&self) -> Option<i32> {
        self.kind.and_then(Kind::displacement)
    }

    /// Compute the target of a relative branch
    ///
    /// Returns the address of the branch target for an instruction located at
    /// `ip` or `None` if the instruction is not a relative branch. Outside
    /// 64-bit mode, the target wraps around at 4GiB or, with a 16-bit operand
    /// size, at 64KiB.
    pub fn branch_target(&self, ip: u64) -> Option<u64> {
        let target = self
            .next_ip(ip)
            .wrapping_add_signed(self.displacement()?.into());
        match (self.mode, self.osz) {
            (Mode::Bit64, _) => Some(target),
            (Mode::Bit16, false) | (Mode::Bit32, true) => Some(target & 0xffff),
            _ => Some(target & 0xffff_ffff),
        }
    }

    /// Compute the address of the instruction following this one
    pub fn next_ip(&self, ip: u64) -> u64 {
        ip.wrapping_add(self.size.into())
    }

    /// Determine whether this instruction is a conditional branch
    pub fn is_conditional(&self) -> bool {
        self.class() == Class::CondJump
    }

    /// Determine whether this instruction is an indirect call or jump
    pub fn is_indirect(&self) -> bool {
        matches!(
            self.kind,
            Some(Kind::call_ff2 | Kind::call_ff3 | Kind::jmp_ff4 | Kind::jmp_ff5)
        )
    }

    /// Determine whether this instruction is a call
    pub fn is_call(&self) -> bool {
        matches!(
            self.kind,
            Some(Kind::call_e8(_) | Kind::call_9a | Kind::call_ff2 | Kind::call_ff3)
        )
    }

    /// Determine whether this instruction is a return
    pub fn is_return(&self) -> bool {
        matches!(
            self.kind,
            Some(Kind::ret_c2 | Kind::ret_c3 | Kind::ret_ca | Kind::ret_cb)
        )
    }

    /// Determine whether this instruction transfers control to a target that
    /// cannot be inferred from the code alone
    ///
    /// Such a transfer is always accompanied by a TIP (or a TIP.PGD) in the
    /// trace.
    pub fn is_uninferable_discon(&self) -> bool {
        self.is_return()
            || self.is_indirect()
            || matches!(
                self.class(),
                Class::FarCall | Class::FarReturn | Class::FarJump
            )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind} ({} bytes)", self.size),
            None => write!(f, "other ({} bytes)", self.size),
        }
    }
}

/// Control flow relevant instruction forms
///
/// Variants are named after the mnemonic and, where ambigious, the opcode
/// (and ModRM `reg` field). Relative branches carry their sign-extended
/// displacement.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    // Calls
    call_e8(i32),
    call_9a,
    call_ff2,
    call_ff3,
    // Jumps
    jmp_e9(i32),
    jmp_eb(i32),
    jmp_ea,
    jmp_ff4,
    jmp_ff5,
    // Conditional
    jcc(i32),
    jrcxz(i32),
    loop_(i32),
    loope(i32),
    loopne(i32),
    // Returns
    ret_c2,
    ret_c3,
    ret_ca,
    ret_cb,
    // Traps and system calls
    int,
    int1,
    int3,
    into,
    iret,
    syscall,
    sysret,
    sysenter,
    sysexit,
    // Virtualization
    vmlaunch,
    vmresume,
    vmcall,
    vmptrld,
    // Paging
    mov_cr3,
}

impl Kind {
    /// Retrieve the [`Class`] of this kind
    pub fn class(self) -> Class {
        match self {
            Self::call_e8(_) | Self::call_ff2 => Class::Call,
            Self::call_9a
            | Self::call_ff3
            | Self::int
            | Self::int1
            | Self::int3
            | Self::into
            | Self::syscall
            | Self::sysenter
            | Self::vmcall => Class::FarCall,
            Self::ret_c2 | Self::ret_c3 => Class::Return,
            Self::ret_ca
            | Self::ret_cb
            | Self::iret
            | Self::sysret
            | Self::sysexit
            | Self::vmlaunch
            | Self::vmresume => Class::FarReturn,
            Self::jmp_e9(_) | Self::jmp_eb(_) | Self::jmp_ff4 => Class::Jump,
            Self::jmp_ea | Self::jmp_ff5 => Class::FarJump,
            Self::jcc(_) | Self::jrcxz(_) | Self::loop_(_) | Self::loope(_) | Self::loopne(_) => {
                Class::CondJump
            }
            Self::vmptrld | Self::mov_cr3 => Class::Other,
        }
    }

    /// Retrieve the displacement of a relative branch
    pub fn displacement(self) -> Option<i32> {
        match self {
            Self::call_e8(d)
            | Self::jmp_e9(d)
            | Self::jmp_eb(d)
            | Self::jcc(d)
            | Self::jrcxz(d)
            | Self::loop_(d)
            | Self::loope(d)
            | Self::loopne(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::call_e8(_) | Self::call_9a | Self::call_ff2 | Self::call_ff3 => "call",
            Self::jmp_e9(_) | Self::jmp_eb(_) | Self::jmp_ea | Self::jmp_ff4 | Self::jmp_ff5 => {
                "jmp"
            }
            Self::jcc(_) => "jcc",
            Self::jrcxz(_) => "jrcxz",
            Self::loop_(_) => "loop",
            Self::loope(_) => "loope",
            Self::loopne(_) => "loopne",
            Self::ret_c2 | Self::ret_c3 => "ret",
            Self::ret_ca | Self::ret_cb => "retf",
            Self::int => "int",
            Self::int1 => "int1",
            Self::int3 => "int3",
            Self::into => "into",
            Self::iret => "iret",
            Self::syscall => "syscall",
            Self::sysret => "sysret",
            Self::sysenter => "sysenter",
            Self::sysexit => "sysexit",
            Self::vmlaunch => "vmlaunch",
            Self::vmresume => "vmresume",
            Self::vmcall => "vmcall",
            Self::vmptrld => "vmptrld",
            Self::mov_cr3 => "mov cr3",
        };
        match self.displacement() {
            Some(d) if d < 0 => write!(f, "{name} -{:#x}", d.unsigned_abs()),
            Some(d) => write!(f, "{name} +{d:#x}"),
            None => f.write_str(name),
        }
    }
}

/// Instruction class
///
/// A coarse classification of instructions by their effect on the control
/// flow.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Class {
    /// Not a control flow instruction
    #[default]
    Other,
    /// Near call
    Call,
    /// Near return
    Return,
    /// Near unconditional jump
    Jump,
    /// Near conditional jump
    CondJump,
    /// Far call, including software interrupts and system calls
    FarCall,
    /// Far return, including returns from interrupts and system calls
    FarReturn,
    /// Far jump
    FarJump,
}

/// Instruction decoding errors
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The instruction exceeds the maximum instruction length
    TooLong,
    /// The instruction extends beyond the bytes availible
    Truncated,
}

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong => write!(f, "instruction exceeds {} bytes", ild::MAX_SIZE),
            Self::Truncated => write!(f, "instruction truncated"),
        }
    }
}
