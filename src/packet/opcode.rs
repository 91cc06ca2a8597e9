// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Opcode table
//!
//! This module defines the mapping between packet [`Kind`]s and the opcode
//! bytes identifying them in the trace. All packets with multi-byte opcodes
//! share the lead byte `0x02`, which doubles as a TNT-8 packet without any
//! branch bits. Packets carrying a compressed IP, TNT-8 and CYC packets are
//! identified by a subset of the lead byte's bits.
//!
//! The [`TABLE`] is ordered by precedence: the first entry matching the data
//! wins. Entries with longer opcodes precede entries with shorter ones sharing
//! the same lead byte.

use core::num::NonZeroUsize;

use crate::config::Config;

use super::Error;

/// Packet kind
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Pad,
    Psb,
    Psbend,
    Tip,
    TipPge,
    TipPgd,
    Fup,
    Tnt8,
    Tnt64,
    Pip,
    Ovf,
    ModeExec,
    ModeTsx,
    Tsc,
    Cbr,
    Mtc,
    Tma,
    Cyc,
    Vmcs,
    Stop,
}

impl Kind {
    /// Retrieve this kind's [`Layout`]
    pub fn layout(self) -> Layout {
        entry(self).layout
    }

    /// Retrieve this kind's [`Entry`]
    pub fn entry(self) -> &'static Entry {
        entry(self)
    }

    /// Determine whether this kind is enabled in the given [`Config`]
    pub fn is_enabled(self, config: &Config) -> bool {
        match self {
            Self::Mtc | Self::Tma => config.mtc,
            Self::Cyc => config.cyc,
            _ => true,
        }
    }
}

/// Packet layout rule
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Fixed size in bytes, including the opcode
    Fixed(usize),
    /// Opcode byte followed by an IP payload
    ///
    /// The payload size is determined by the [compression][super::ip] code in
    /// the upper three bits of the opcode byte.
    Ip,
    /// Continued payload
    ///
    /// The lead byte's bit 2 and every following byte's bit 0 signal that
    /// another byte follows.
    Continued,
}

/// Opcode table entry
#[derive(Debug)]
pub struct Entry {
    /// Kind of packet identified by this entry
    pub kind: Kind,
    /// Opcode bits, after masking
    pub opcode: &'static [u8],
    /// Bits of the data relevant for matching the opcode
    pub mask: &'static [u8],
    /// Layout of the packet
    pub layout: Layout,
}

impl Entry {
    /// Match this entry's opcode against the given data
    ///
    /// Returns `Some(true)` if the opcode matches, `Some(false)` if the data
    /// is too short for a decision and `None` if it does not match.
    fn matches(&self, data: &[u8]) -> Option<bool> {
        self.opcode
            .iter()
            .zip(self.mask)
            .enumerate()
            .try_fold(true, |complete, (i, (opcode, mask))| match data.get(i) {
                Some(byte) if byte & mask == *opcode => Some(complete),
                Some(_) => None,
                None => Some(false),
            })
    }
}

/// Lead byte of all packets with multi-byte opcodes
pub const EXT: u8 = 0x02;

/// The opcode table, ordered by precedence
pub static TABLE: [Entry; 20] = ENTRIES;

const ENTRIES: [Entry; 20] = [
    Entry {
        kind: Kind::Psb,
        opcode: &[EXT, 0x82],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(16),
    },
    Entry {
        kind: Kind::Psbend,
        opcode: &[EXT, 0x23],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(2),
    },
    Entry {
        kind: Kind::Tnt64,
        opcode: &[EXT, 0xa3],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(8),
    },
    Entry {
        kind: Kind::Pip,
        opcode: &[EXT, 0x43],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(8),
    },
    Entry {
        kind: Kind::Ovf,
        opcode: &[EXT, 0xf3],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(2),
    },
    Entry {
        kind: Kind::Cbr,
        opcode: &[EXT, 0x03],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(4),
    },
    Entry {
        kind: Kind::Tma,
        opcode: &[EXT, 0x73],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(7),
    },
    Entry {
        kind: Kind::Vmcs,
        opcode: &[EXT, 0xc8],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(7),
    },
    Entry {
        kind: Kind::Stop,
        opcode: &[EXT, 0x83],
        mask: &[0xff, 0xff],
        layout: Layout::Fixed(2),
    },
    Entry {
        kind: Kind::Pad,
        opcode: &[0x00],
        mask: &[0xff],
        layout: Layout::Fixed(1),
    },
    Entry {
        kind: Kind::Tsc,
        opcode: &[0x19],
        mask: &[0xff],
        layout: Layout::Fixed(8),
    },
    Entry {
        kind: Kind::Mtc,
        opcode: &[0x59],
        mask: &[0xff],
        layout: Layout::Fixed(2),
    },
    Entry {
        kind: Kind::ModeExec,
        opcode: &[0x99, 0x00],
        mask: &[0xff, 0xe0],
        layout: Layout::Fixed(2),
    },
    Entry {
        kind: Kind::ModeTsx,
        opcode: &[0x99, 0x20],
        mask: &[0xff, 0xe0],
        layout: Layout::Fixed(2),
    },
    Entry {
        kind: Kind::Tip,
        opcode: &[0x0d],
        mask: &[0x1f],
        layout: Layout::Ip,
    },
    Entry {
        kind: Kind::TipPge,
        opcode: &[0x11],
        mask: &[0x1f],
        layout: Layout::Ip,
    },
    Entry {
        kind: Kind::TipPgd,
        opcode: &[0x01],
        mask: &[0x1f],
        layout: Layout::Ip,
    },
    Entry {
        kind: Kind::Fup,
        opcode: &[0x1d],
        mask: &[0x1f],
        layout: Layout::Ip,
    },
    Entry {
        kind: Kind::Cyc,
        opcode: &[0x03],
        mask: &[0x03],
        layout: Layout::Continued,
    },
    Entry {
        kind: Kind::Tnt8,
        opcode: &[0x00],
        mask: &[0x01],
        layout: Layout::Fixed(1),
    },
];

/// Check the [`TABLE`] for consistency
///
/// Every kind must appear exactly once, opcodes and masks must agree in length
/// and opcodes may not have bits outside their mask.
const fn table_is_consistent() -> bool {
    let mut i = 0;
    while i < ENTRIES.len() {
        let opcode = ENTRIES[i].opcode;
        let mask = ENTRIES[i].mask;
        if opcode.is_empty() || opcode.len() != mask.len() {
            return false;
        }
        let mut j = 0;
        while j < opcode.len() {
            if opcode[j] & !mask[j] != 0 {
                return false;
            }
            j += 1;
        }
        let mut k = i + 1;
        while k < ENTRIES.len() {
            if ENTRIES[k].kind as u8 == ENTRIES[i].kind as u8 {
                return false;
            }
            k += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(table_is_consistent(), "Inconsistent opcode table");

/// Retrieve the table [`Entry`] for a [`Kind`]
pub fn entry(kind: Kind) -> &'static Entry {
    &TABLE[index_of(kind)]
}

/// Retrieve the position of a [`Kind`] in the [`TABLE`]
const fn index_of(kind: Kind) -> usize {
    match kind {
        Kind::Psb => 0,
        Kind::Psbend => 1,
        Kind::Tnt64 => 2,
        Kind::Pip => 3,
        Kind::Ovf => 4,
        Kind::Cbr => 5,
        Kind::Tma => 6,
        Kind::Vmcs => 7,
        Kind::Stop => 8,
        Kind::Pad => 9,
        Kind::Tsc => 10,
        Kind::Mtc => 11,
        Kind::ModeExec => 12,
        Kind::ModeTsx => 13,
        Kind::Tip => 14,
        Kind::TipPge => 15,
        Kind::TipPgd => 16,
        Kind::Fup => 17,
        Kind::Cyc => 18,
        Kind::Tnt8 => 19,
    }
}

const _: () = {
    let mut i = 0;
    while i < ENTRIES.len() {
        assert!(index_of(ENTRIES[i].kind) == i, "Opcode table out of order");
        i += 1;
    }
};

/// Classify the packet at the start of `data`
///
/// Returns the first [`Entry`] in the [`TABLE`] matching the data. If an entry
/// preceding the first match could not be checked due to the data ending
/// prematurely, an [`Error::Truncated`] is returned instead. Packet kinds not
/// enabled in the given [`Config`] are reported as [`Error::BadOpcode`].
///
/// A lone [`EXT`] byte is an empty TNT-8. It is only accepted if it is followed
/// by a byte which cannot continue an extended opcode, i.e. PAD or the lead
/// byte of an IP, TSC, MTC or MODE packet. Otherwise, `EXT` followed by an
/// unknown sub-opcode is reported as [`Error::BadOpcode`]. Since the data may
/// be continued, a lone `EXT` at the end of `data` is reported as truncated.
/// Use [`classify_complete`] for data known to end there.
///
/// # Example
///
/// ```
/// use ptflow::config::Config;
/// use ptflow::packet::{Error, opcode};
///
/// let config = Config::default();
/// assert_eq!(opcode::classify(b"\x02\x23", &config).map(|e| e.kind), Ok(opcode::Kind::Psbend));
/// assert_eq!(opcode::classify(b"\x6d", &config).map(|e| e.kind), Ok(opcode::Kind::Tip));
/// assert!(matches!(opcode::classify(b"\x02", &config), Err(Error::Truncated(_))));
/// assert_eq!(opcode::classify(b"\x02\x12", &config).map(|e| e.kind), Err(Error::BadOpcode(0x02)));
/// ```
pub fn classify(data: &[u8], config: &Config) -> Result<&'static Entry, Error> {
    lookup(data, config, false)
}

/// Classify the packet at the start of `data`, which is known to be complete
///
/// Unlike [`classify`], entries cut off by the end of `data` are skipped
/// rather than reported as truncated. An [`Error::Truncated`] is only returned
/// if no later entry matches.
///
/// # Example
///
/// ```
/// use ptflow::config::Config;
/// use ptflow::packet::opcode;
///
/// let config = Config::default();
/// assert_eq!(opcode::classify_complete(b"\x02", &config).map(|e| e.kind), Ok(opcode::Kind::Tnt8));
/// ```
pub fn classify_complete(data: &[u8], config: &Config) -> Result<&'static Entry, Error> {
    lookup(data, config, true)
}

/// Look up the [`Entry`] for the packet at the start of `data`
fn lookup(data: &[u8], config: &Config, complete: bool) -> Result<&'static Entry, Error> {
    let lead = *data.first().ok_or(Error::Truncated(NonZeroUsize::MIN))?;
    let mut cut = None;
    for entry in &TABLE {
        match entry.matches(data) {
            Some(true) if entry.kind == Kind::Tnt8 && lead == EXT => {
                return match data.get(1) {
                    Some(next) if !ends_empty_tnt8(*next) => Err(Error::BadOpcode(lead)),
                    _ => Ok(entry),
                };
            }
            Some(true) if entry.kind.is_enabled(config) => return Ok(entry),
            Some(true) => return Err(Error::BadOpcode(lead)),
            Some(false) => {
                let need = entry.opcode.len().saturating_sub(data.len());
                let need = Error::Truncated(NonZeroUsize::new(need).unwrap_or(NonZeroUsize::MIN));
                if !complete {
                    return Err(need);
                }
                cut = cut.or(Some(need));
            }
            None => (),
        }
    }
    Err(cut.unwrap_or(Error::BadOpcode(lead)))
}

/// Check whether `byte` may follow an empty TNT-8
///
/// Extended sub-opcodes have bit 1 set or, like VMCS, bit 0 cleared. PAD is
/// the only such byte never used as a sub-opcode.
const fn ends_empty_tnt8(byte: u8) -> bool {
    byte == 0x00 || byte & 0x03 == 0x01
}
