// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Instruction pointer compression
//!
//! IP-bearing packets (TIP, TIP.PGE, TIP.PGD and FUP) usually only carry the
//! lower bits of an address. The upper bits are taken from the last address
//! communicated in the same trace, which is tracked as a [`LastIp`]. The number
//! of bits carried and how they are combined with the [`LastIp`] is determined
//! by the [`Compression`] encoded in the packet's opcode.

use core::fmt;

use super::Error;

/// Compression of an instruction pointer
///
/// The discriminant is the 3-bit code used in the packet's opcode byte.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Compression {
    /// No payload, the IP is the last IP
    Suppressed = 0,
    /// Lower 16 bits, upper bits from the last IP
    Update16 = 1,
    /// Lower 32 bits, upper bits from the last IP
    Update32 = 2,
    /// Lower 48 bits, sign-extended from bit 47
    Sext48 = 3,
    /// Lower 48 bits, upper bits from the last IP
    Update48 = 4,
    /// Full 64-bit IP
    Full = 6,
}

impl Compression {
    /// All compressions, ordered by payload size
    ///
    /// For compressions with the same payload size, the one not depending on
    /// the last IP comes first.
    pub const ALL: [Self; 6] = [
        Self::Suppressed,
        Self::Update16,
        Self::Update32,
        Self::Sext48,
        Self::Update48,
        Self::Full,
    ];

    /// Retrieve the size of the payload in bytes
    pub const fn payload_size(self) -> usize {
        match self {
            Self::Suppressed => 0,
            Self::Update16 => 2,
            Self::Update32 => 4,
            Self::Sext48 | Self::Update48 => 6,
            Self::Full => 8,
        }
    }

    /// Retrieve the mask of the address bits carried in the payload
    pub const fn mask(self) -> u64 {
        match self.payload_size() {
            8 => u64::MAX,
            s => (1 << (8 * s)) - 1,
        }
    }

    /// Create a compression from the 3-bit code in an opcode
    ///
    /// Returns `None` for reserved codes.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Suppressed),
            1 => Some(Self::Update16),
            2 => Some(Self::Update32),
            3 => Some(Self::Sext48),
            4 => Some(Self::Update48),
            6 => Some(Self::Full),
            _ => None,
        }
    }

    /// Retrieve the 3-bit code for this compression
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suppressed => write!(f, "suppressed"),
            Self::Update16 => write!(f, "update-16"),
            Self::Update32 => write!(f, "update-32"),
            Self::Sext48 => write!(f, "sext-48"),
            Self::Update48 => write!(f, "update-48"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// A compressed instruction pointer as carried by IP-bearing packets
///
/// Only the bits covered by the [`Compression`]'s [mask][Compression::mask]
/// are meaningful. The full address may be recovered using a [`LastIp`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ip {
    compression: Compression,
    bits: u64,
}

impl Ip {
    /// Create a new compressed IP
    ///
    /// Bits not covered by the [`Compression`] will be rejected by the
    /// [encoder][super::encoder::Encoder].
    pub const fn new(compression: Compression, bits: u64) -> Self {
        Self { compression, bits }
    }

    /// Create a suppressed IP
    pub const fn suppressed() -> Self {
        Self::new(Compression::Suppressed, 0)
    }

    /// Retrieve the [`Compression`]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Retrieve the raw payload bits
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Check whether the IP is suppressed, i.e. carries no address
    pub const fn is_suppressed(&self) -> bool {
        matches!(self.compression, Compression::Suppressed)
    }

    /// Check whether the bits fit the compression's payload
    pub const fn is_valid(&self) -> bool {
        self.bits & !self.compression.mask() == 0
    }
}

impl fmt::Display for Ip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.compression {
            Compression::Suppressed => write!(f, "{}", self.compression),
            c => write!(f, "{c}: {:#x}", self.bits),
        }
    }
}

/// Last IP compression context
///
/// Holds the last fully materialized instruction pointer of an encode or
/// decode session. It is reset at the start of a trace and by every PSB.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LastIp {
    ip: u64,
}

impl LastIp {
    /// Create a new, reset context
    pub const fn new() -> Self {
        Self { ip: 0 }
    }

    /// Reset the context
    pub fn reset(&mut self) {
        self.ip = 0;
    }

    /// Retrieve the last IP
    pub const fn get(&self) -> u64 {
        self.ip
    }

    /// Compute the full address for an [`Ip`] without updating the context
    pub const fn resolve(&self, ip: &Ip) -> u64 {
        let bits = ip.bits & ip.compression.mask();
        match ip.compression {
            Compression::Suppressed => self.ip,
            Compression::Sext48 => (((bits << 16) as i64) >> 16) as u64,
            Compression::Full => bits,
            c => (self.ip & !c.mask()) | bits,
        }
    }

    /// Compute the full address for an [`Ip`] and update the context
    ///
    /// After this call, the context holds the returned address.
    pub fn expand(&mut self, ip: &Ip) -> u64 {
        self.ip = self.resolve(ip);
        self.ip
    }

    /// Compress an address relative to this context
    ///
    /// If a `compression` is given, the address is compressed accordingly. An
    /// [`Error::OutOfRange`] is returned if the result would not
    /// [resolve][Self::resolve] to the given address. If no compression is
    /// given, the narrowest compression resolving to the address is chosen.
    ///
    /// # Example
    ///
    /// ```
    /// use ptflow::packet::ip::{Compression, Ip, LastIp};
    ///
    /// let mut last_ip = LastIp::new();
    /// last_ip.expand(&Ip::new(Compression::Full, 0xffff_8000_0000_1000));
    ///
    /// let ip = last_ip.compress(0xffff_8000_0000_2000, None).unwrap();
    /// assert_eq!(ip, Ip::new(Compression::Update16, 0x2000));
    /// ```
    pub fn compress(&self, address: u64, compression: Option<Compression>) -> Result<Ip, Error> {
        let attempt = |c: Compression| {
            let ip = Ip::new(c, address & c.mask());
            (self.resolve(&ip) == address).then_some(ip)
        };
        match compression {
            Some(c) => attempt(c).ok_or(Error::OutOfRange),
            None => Compression::ALL
                .into_iter()
                .find_map(attempt)
                .ok_or(Error::OutOfRange),
        }
    }
}
