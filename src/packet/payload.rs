// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Definitions of packet payloads
//!
//! This module holds the payload types of packets carrying more than a single
//! integer. Compressed instruction pointers are defined in [`super::ip`].

use core::fmt;

use super::{Error, util};

/// Taken/not-taken payload
///
/// Holds the outcomes of up to [`Tnt::MAX_LONG`] conditional branches. Bit
/// `size - 1` of [`bits`][Self::bits] holds the oldest outcome and bit `0` the
/// newest. A set bit denotes a taken branch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tnt {
    size: u8,
    bits: u64,
}

impl Tnt {
    /// Maximum number of outcomes in a short (TNT-8) packet
    pub const MAX_SHORT: u8 = 6;
    /// Maximum number of outcomes in a long (TNT-64) packet
    pub const MAX_LONG: u8 = 47;

    /// Create a new payload with `size` outcomes
    ///
    /// The values are not checked here. An [`Encoder`][super::encoder::Encoder]
    /// will reject payloads with more outcomes than the packet can carry or
    /// with `bits` set above `size`.
    pub const fn new(size: u8, bits: u64) -> Self {
        Self { size, bits }
    }

    /// Retrieve the number of outcomes
    pub const fn size(&self) -> u8 {
        self.size
    }

    /// Retrieve the raw outcome bits
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Check whether the payload fits a packet with the given capacity
    pub(super) fn fits(&self, max: u8) -> bool {
        self.size <= max && self.bits >> self.size == 0
    }

    /// Retrieve the payload with the stop bit prepended
    pub(super) fn with_stop_bit(&self) -> u64 {
        (1 << self.size) | self.bits
    }

    /// Recover a payload from a value with a stop bit
    ///
    /// Returns `None` if there is no stop bit, i.e. if `value` is zero.
    pub(super) fn from_stop_bit(value: u64) -> Option<Self> {
        let size = u64::BITS.checked_sub(value.leading_zeros() + 1)?;
        Some(Self::new(size as u8, value & !(1 << size)))
    }
}

impl fmt::Display for Tnt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (0..self.size).rev().try_for_each(|i| {
            let taken = self.bits >> i & 1 != 0;
            write!(f, "{}", if taken { '!' } else { '.' })
        })
    }
}

/// Paging information payload
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pip {
    /// Page table base (CR3 value)
    ///
    /// Only bits 51 to 5 may be set.
    pub cr3: u64,
    /// Whether the processor operates in non-root (guest) mode
    pub nr: bool,
}

impl Pip {
    /// Bits of CR3 carried in the packet
    pub const CR3_MASK: u64 = 0x000f_ffff_ffff_ffe0;

    pub(super) fn decode(payload: &[u8]) -> Self {
        let raw = util::read_le(payload);
        Self {
            cr3: (raw >> 1) << 5,
            nr: raw & 1 != 0,
        }
    }

    pub(super) fn encode(&self, payload: &mut [u8]) -> Result<(), Error> {
        if self.cr3 & !Self::CR3_MASK != 0 {
            return Err(Error::BadArgument);
        }
        util::write_le((self.cr3 >> 5) << 1 | u64::from(self.nr), payload);
        Ok(())
    }
}

impl fmt::Display for Pip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cr3 {:#x}", self.cr3)?;
        if self.nr {
            write!(f, ", nr")?;
        }
        Ok(())
    }
}

/// Transactional memory state payload
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tsx {
    /// Whether the processor is in a transaction
    pub intx: bool,
    /// Whether a transaction was aborted
    pub abrt: bool,
}

impl Tsx {
    pub(super) fn from_byte(byte: u8) -> Self {
        Self {
            intx: byte & 0x01 != 0,
            abrt: byte & 0x02 != 0,
        }
    }

    pub(super) fn to_byte(self) -> u8 {
        u8::from(self.intx) | u8::from(self.abrt) << 1
    }
}

impl fmt::Display for Tsx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.intx, self.abrt) {
            (false, false) => write!(f, "commit"),
            (true, false) => write!(f, "begin"),
            (_, true) => write!(f, "abort"),
        }
    }
}

/// Timing alignment payload
///
/// Relates the core crystal clock to the bus clock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tma {
    /// Lower 16 bits of the core crystal clock value
    pub ctc: u16,
    /// Fast counter, 9 bits
    pub fc: u16,
}

impl Tma {
    /// Maximum value of the fast counter
    pub const MAX_FC: u16 = 0x1ff;

    pub(super) fn decode(payload: &[u8; 5]) -> Self {
        let [ctc_lo, ctc_hi, _, fc_lo, fc_hi] = *payload;
        Self {
            ctc: u16::from_le_bytes([ctc_lo, ctc_hi]),
            fc: u16::from_le_bytes([fc_lo, fc_hi & 0x01]),
        }
    }

    pub(super) fn encode(&self, payload: &mut [u8]) -> Result<(), Error> {
        if self.fc > Self::MAX_FC {
            return Err(Error::BadArgument);
        }
        let [ctc_lo, ctc_hi] = self.ctc.to_le_bytes();
        let [fc_lo, fc_hi] = self.fc.to_le_bytes();
        payload.copy_from_slice(&[ctc_lo, ctc_hi, 0, fc_lo, fc_hi]);
        Ok(())
    }
}

impl fmt::Display for Tma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctc {:#x}, fc {:#x}", self.ctc, self.fc)
    }
}
