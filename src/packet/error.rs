// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet-specific error types and utilities

use core::fmt;
use core::num::NonZeroUsize;

/// Packet decode/encode errors
///
/// None of these errors leave a [`Decoder`][super::decoder::Decoder] or
/// [`Encoder`][super::encoder::Encoder] in an altered state. An operation may
/// be retried after the condition is resolved, e.g. after more data became
/// availible.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The byte does not start any known packet
    BadOpcode(u8),
    /// The packet was recognized but its contents are malformed
    BadPacket,
    /// Some more bytes of data are required for the operation to succeed
    Truncated(NonZeroUsize),
    /// The target buffer is too small for the encoded packet
    Overflow,
    /// A packet field is out of the range representable in the packet
    BadArgument,
    /// The address is not representable with the requested compression
    OutOfRange,
}

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadOpcode(o) => write!(f, "Unknown opcode {o:#04x}"),
            Self::BadPacket => write!(f, "Malformed packet"),
            Self::Truncated(n) => write!(f, "At least {n} more bytes of data are required"),
            Self::Overflow => write!(f, "Reached end of buffer while encoding"),
            Self::BadArgument => write!(f, "Packet field out of range"),
            Self::OutOfRange => write!(f, "Address not representable with compression"),
        }
    }
}
