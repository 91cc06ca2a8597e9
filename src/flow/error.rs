// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

use crate::types::branch;
use crate::{instruction, packet};

/// Flow reconstruction specific errors
///
/// Errors other than [`Packet`][Self::Packet] errors indicate that the trace
/// does not match the code fetched from the [`Image`][crate::image::Image].
/// The [`Tracer`][super::Tracer] recovers from them at the next packet
/// establishing an IP.
#[derive(Debug, PartialEq, Eq)]
pub enum Error<I> {
    /// A packet could not be decoded
    Packet(packet::Error),
    /// Code could not be fetched from the given address
    CannotFetch(I, u64),
    /// The instruction at the given address could not be decoded
    Instruction(instruction::Error, u64),
    /// TNT received while a TIP was expected for the instruction at the given
    /// address
    UnexpectedTnt(u64),
    /// TIP received while TNT bits are still pending
    UnexpectedTip(u64),
    /// The conditional branch at the given address cannot be resolved
    ///
    /// The trace did not supply a TNT bit for the branch.
    UnresolvableBranch(u64),
    /// Branch information could not be queued
    CannotAddBranches(branch::Error),
}

impl<I> core::error::Error for Error<I>
where
    I: fmt::Debug + core::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Packet(inner) => Some(inner),
            Self::CannotFetch(inner, _) => Some(inner),
            Self::Instruction(inner, _) => Some(inner),
            Self::CannotAddBranches(inner) => Some(inner),
            _ => None,
        }
    }
}

impl<I> fmt::Display for Error<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packet(_) => write!(f, "Could not decode packet"),
            Self::CannotFetch(_, addr) => write!(f, "Cannot fetch code at {addr:#0x}"),
            Self::Instruction(_, addr) => {
                write!(f, "Cannot decode the instruction at {addr:#0x}")
            }
            Self::UnexpectedTnt(addr) => {
                write!(f, "unexpected TNT, expected TIP for {addr:#0x}")
            }
            Self::UnexpectedTip(addr) => write!(f, "unexpected TIP at {addr:#0x}"),
            Self::UnresolvableBranch(addr) => write!(f, "unresolvable branch at {addr:#0x}"),
            Self::CannotAddBranches(_) => write!(f, "Cannot add branches"),
        }
    }
}
