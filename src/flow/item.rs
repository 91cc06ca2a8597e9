// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Tracing item

use core::fmt;

use crate::instruction::Instruction;
use crate::packet::payload::Pip;

/// Tracing item
///
/// A tracing item corresponds to either a traced, retired [`Instruction`] or
/// some other noteworthy event such as tracing being enabled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Item {
    ip: u64,
    kind: Kind,
}

impl Item {
    /// Create a new item
    pub fn new(ip: u64, kind: Kind) -> Self {
        Self { ip, kind }
    }

    /// Retrieve the IP
    ///
    /// For items signalling a retired [`Instruction`], this fn will return its
    /// address. For other items, it will return the IP at which the event
    /// occured, if known, or the address of the last instruction retired.
    pub fn ip(&self) -> u64 {
        self.ip
    }

    /// Retrieve the item's [`Kind`]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Retrieve the (retired) [`Instruction`]
    pub fn instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            Kind::Regular(insn) => Some(insn),
            _ => None,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}: {}", self.ip, self.kind)
    }
}

/// Kind of a tracing [`Item`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Signals the retiring of the [`Instruction`] at the [`Item`]'s IP
    Regular(Instruction),
    /// Tracing was enabled, the [`Item`]'s IP is the first one traced
    Enabled,
    /// Tracing was disabled
    ///
    /// The [`Item`]'s IP is the target of the transfer that disabled tracing,
    /// if known.
    Disabled,
    /// Trace data was lost
    ///
    /// The IP is unknown until it is re-established by the trace.
    Overflow,
    /// The paging context changed
    Paging(Pip),
}

impl From<Instruction> for Kind {
    fn from(insn: Instruction) -> Self {
        Self::Regular(insn)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular(insn) => write!(f, "{insn}"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Overflow => write!(f, "overflow"),
            Self::Paging(pip) => write!(f, "paging {pip}"),
        }
    }
}
