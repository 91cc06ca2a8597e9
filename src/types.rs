// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Types not specific to [packets][crate::packet] or [instructions][crate::instruction]

pub mod branch;

#[cfg(test)]
mod tests;

use core::fmt;

/// Processor execution mode
///
/// The execution mode determines default operand and address sizes of
/// instructions. It is communicated in the trace through MODE.EXEC packets.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Mode {
    /// 16-bit (real, virtual-8086 or 16-bit protected) mode
    Bit16,
    /// 32-bit protected or compatibility mode
    Bit32,
    /// 64-bit mode
    #[default]
    Bit64,
}

impl Mode {
    /// Create a mode from the `CS.L` and `CS.D` segment flags
    ///
    /// Returns `None` for the reserved combination of both flags being set.
    pub const fn from_cs(csl: bool, csd: bool) -> Option<Self> {
        match (csl, csd) {
            (false, false) => Some(Self::Bit16),
            (false, true) => Some(Self::Bit32),
            (true, false) => Some(Self::Bit64),
            (true, true) => None,
        }
    }

    /// Retrieve the `CS.L` flag for this mode
    pub const fn csl(self) -> bool {
        matches!(self, Self::Bit64)
    }

    /// Retrieve the `CS.D` flag for this mode
    pub const fn csd(self) -> bool {
        matches!(self, Self::Bit32)
    }

    /// Retrieve the width of an address in this mode in bytes
    pub const fn address_bytes(self) -> u8 {
        match self {
            Self::Bit16 => 2,
            Self::Bit32 => 4,
            Self::Bit64 => 8,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bit16 => write!(f, "16-bit"),
            Self::Bit32 => write!(f, "32-bit"),
            Self::Bit64 => write!(f, "64-bit"),
        }
    }
}
