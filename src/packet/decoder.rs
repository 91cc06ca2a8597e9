// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet decoder

use core::num::NonZeroUsize;

use crate::config::Config;
use crate::types::Mode;

use super::error::Error;
use super::ip::{Compression, Ip, LastIp};
use super::opcode::{self, Kind, Layout};
use super::payload::{Pip, Tma, Tnt, Tsx};
use super::{Packet, util};

/// Maximum size of a CYC packet in bytes
const MAX_CYC_SIZE: usize = 10;

/// A decoder for [`Packet`]s
///
/// A decoder is created via a [`Builder`][super::Builder] for a given slice of
/// trace data. Packets are decoded one by one, in stream order, via
/// [`decode`][Self::decode]. The decoder tracks the last IP context needed for
/// expanding compressed IPs, which is reset by every PSB.
///
/// If a packet could not be decoded, the decoder reports an [`Error`] and
/// stays at the position of the offending packet. In particular, an
/// [`Error::Truncated`] signals that more data is required, which may be
/// supplied by [`reset`][Self::reset]ing a [streaming][Self::set_streaming]
/// decoder to a longer slice. After
/// other errors, decoding may resume at the next PSB via
/// [`sync_forward`][Self::sync_forward].
///
/// # Example
///
/// The follwing example demonstrates decoding trace data arriving in chunks,
/// including the recovery from attempting to decode an incomplete packet.
///
/// ```
/// use ptflow::packet::{self, Packet};
///
/// let trace_data = b"\x02\x23\x19\x01\x02";
/// let trace_data_next = b"\x02\x23\x19\x01\x02\x03\x04\x05\x06\x07";
///
/// let mut decoder = packet::builder().with_streaming(true).decoder(trace_data);
/// let mut packets = Vec::new();
/// let pos = loop {
///     match decoder.decode() {
///         Ok((packet, _)) => packets.push(packet),
///         Err(packet::Error::Truncated(_)) => break decoder.byte_pos(),
///         Err(e) => panic!("{e:?}"),
///     }
/// };
/// decoder.reset(&trace_data_next[pos..]);
/// packets.push(decoder.decode().unwrap().0);
/// assert_eq!(packets, [Packet::Psbend, Packet::Tsc(0x07060504030201)]);
/// ```
#[derive(Clone, Debug)]
pub struct Decoder<'d> {
    data: &'d [u8],
    pos: usize,
    sync: Option<usize>,
    streaming: bool,
    config: Config,
    last_ip: LastIp,
}

impl<'d> Decoder<'d> {
    /// Create a new decoder
    pub(super) fn new(data: &'d [u8], config: Config, streaming: bool) -> Self {
        Self {
            data,
            pos: 0,
            sync: None,
            streaming,
            config,
            last_ip: LastIp::new(),
        }
    }

    /// Decode a single [`Packet`]
    ///
    /// On success, returns the packet and the number of bytes consumed and
    /// advances the decoder past the packet. IP-bearing packets are returned
    /// with their compressed [`Ip`]. The full address is availible via
    /// [`last_ip`][Self::last_ip] afterwards.
    ///
    /// On error, the decoder is not altered.
    pub fn decode(&mut self) -> Result<(Packet, usize), Error> {
        let data = self.remaining_data();
        let entry = if self.streaming {
            opcode::classify(data, &self.config)?
        } else {
            opcode::classify_complete(data, &self.config)?
        };
        let size = packet_size(entry.layout, data)?;
        let bytes = data.get(..size).ok_or_else(|| missing(size - data.len()))?;
        let packet = parse(entry.kind, bytes)?;

        match &packet {
            Packet::Psb => {
                self.last_ip.reset();
                self.sync = Some(self.pos);
            }
            p => {
                if let Some(ip) = p.ip() {
                    self.last_ip.expand(ip);
                }
            }
        }
        self.pos += size;
        Ok((packet, size))
    }

    /// Move to the next PSB
    ///
    /// Searches the remaining data for the next PSB and moves the decoder
    /// there, resetting the last IP context. If the decoder is currently
    /// positioned at the PSB it last synchronized to, the search starts after
    /// it. Returns the new position or `None` if there is no further PSB. In
    /// the latter case, the decoder is not altered.
    pub fn sync_forward(&mut self) -> Option<usize> {
        let psb = opcode::entry(Kind::Psb);
        let Layout::Fixed(psb_size) = psb.layout else {
            return None;
        };
        let start = if self.sync == Some(self.pos) {
            self.pos + 1
        } else {
            self.pos
        };
        let offset = self
            .data
            .get(start..)?
            .windows(psb_size)
            .position(|w| w.chunks_exact(2).all(|c| c == psb.opcode))?;

        self.pos = start + offset;
        self.sync = Some(self.pos);
        self.last_ip.reset();
        Some(self.pos)
    }

    /// Retrieve the number of bytes left in this decoder's data
    pub fn bytes_left(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Retrieve the current byte position
    ///
    /// Returns the zero-based position of the next packet to decode.
    ///
    /// # Example
    ///
    /// ```
    /// use ptflow::packet;
    ///
    /// # let trace_data = &[];
    /// let decoder = packet::builder().decoder(trace_data);
    /// assert_eq!(decoder.byte_pos(), 0);
    /// ```
    pub fn byte_pos(&self) -> usize {
        self.pos
    }

    /// Reset the inner data to the given byte slice
    ///
    /// The last IP context is kept, allowing a trace to be decoded in chunks.
    pub fn reset(&mut self, data: &'d [u8]) {
        self.data = data;
        self.pos = 0;
        self.sync = None;
    }

    /// Declare whether the current data may be continued
    ///
    /// A streaming decoder reports an [`Error::Truncated`] for any packet
    /// which might extend beyond its data. In particular, a lone `0x02` at the
    /// end of the data may be the start of an extended opcode. A decoder which
    /// is not streaming decodes it as an empty TNT-8 instead. When resetting a
    /// streaming decoder to the final chunk of a trace, streaming should be
    /// disabled.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Check whether this decoder is streaming
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Retrieve the last IP decoded
    pub fn last_ip(&self) -> u64 {
        self.last_ip.get()
    }

    /// Compute the full address for a compressed [`Ip`]
    ///
    /// The address is resolved against the current last IP, without updating
    /// it.
    pub fn resolve(&self, ip: &Ip) -> u64 {
        self.last_ip.resolve(ip)
    }

    /// Retrieve the [`Config`] this decoder operates with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Retrieve the remaining inner data
    fn remaining_data(&self) -> &'d [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }
}

/// Create an [`Error::Truncated`] for the given number of missing bytes
fn missing(need: usize) -> Error {
    Error::Truncated(NonZeroUsize::new(need).unwrap_or(NonZeroUsize::MIN))
}

/// Determine the size of the packet at the start of `data`
fn packet_size(layout: Layout, data: &[u8]) -> Result<usize, Error> {
    match layout {
        Layout::Fixed(size) => Ok(size),
        Layout::Ip => {
            let lead = data.first().ok_or_else(|| missing(1))?;
            Compression::from_code(lead >> 5)
                .map(|c| 1 + c.payload_size())
                .ok_or(Error::BadPacket)
        }
        Layout::Continued => {
            let mut more = data.first().is_some_and(|b| b & 0x04 != 0);
            let mut size = 1;
            while more {
                if size >= MAX_CYC_SIZE {
                    return Err(Error::BadPacket);
                }
                let byte = data.get(size).ok_or_else(|| missing(1))?;
                more = byte & 0x01 != 0;
                size += 1;
            }
            Ok(size)
        }
    }
}

/// Parse the packet of the given kind from exactly its bytes
fn parse(kind: Kind, bytes: &[u8]) -> Result<Packet, Error> {
    let lead = bytes.first().copied().unwrap_or_default();
    let payload = bytes.get(opcode::entry(kind).opcode.len()..).unwrap_or_default();
    let sub = bytes.get(1).copied().unwrap_or_default();
    let packet = match kind {
        Kind::Pad => Packet::Pad,
        Kind::Psb => {
            let opcode = opcode::entry(Kind::Psb).opcode;
            if !bytes.chunks_exact(2).all(|c| c == opcode) {
                return Err(Error::BadPacket);
            }
            Packet::Psb
        }
        Kind::Psbend => Packet::Psbend,
        Kind::Tip => Packet::Tip(parse_ip(lead, payload)?),
        Kind::TipPge => Packet::TipPge(parse_ip(lead, payload)?),
        Kind::TipPgd => Packet::TipPgd(parse_ip(lead, payload)?),
        Kind::Fup => Packet::Fup(parse_ip(lead, payload)?),
        Kind::Tnt8 => Tnt::from_stop_bit((lead >> 1).into())
            .map(Packet::Tnt8)
            .ok_or(Error::BadPacket)?,
        Kind::Tnt64 => Tnt::from_stop_bit(util::read_le(payload))
            .map(Packet::Tnt64)
            .ok_or(Error::BadPacket)?,
        Kind::Pip => Packet::Pip(Pip::decode(payload)),
        Kind::Ovf => Packet::Ovf,
        Kind::ModeExec => Mode::from_cs(sub & 0x01 != 0, sub & 0x02 != 0)
            .map(Packet::ModeExec)
            .ok_or(Error::BadPacket)?,
        Kind::ModeTsx => Packet::ModeTsx(Tsx::from_byte(sub)),
        Kind::Tsc => Packet::Tsc(util::read_le(payload)),
        Kind::Cbr => Packet::Cbr(payload.first().copied().ok_or(Error::BadPacket)?),
        Kind::Mtc => Packet::Mtc(payload.first().copied().ok_or(Error::BadPacket)?),
        Kind::Tma => {
            let payload = payload.try_into().map_err(|_| Error::BadPacket)?;
            Packet::Tma(Tma::decode(payload))
        }
        Kind::Cyc => Packet::Cyc(parse_cyc(lead, payload)?),
        Kind::Vmcs => Packet::Vmcs(util::read_le(payload) << 12),
        Kind::Stop => Packet::Stop,
    };
    Ok(packet)
}

/// Parse a compressed [`Ip`] from an opcode byte and payload
fn parse_ip(lead: u8, payload: &[u8]) -> Result<Ip, Error> {
    let compression = Compression::from_code(lead >> 5).ok_or(Error::BadPacket)?;
    Ok(Ip::new(compression, util::read_le(payload)))
}

/// Parse the value of a CYC packet
fn parse_cyc(lead: u8, rest: &[u8]) -> Result<u64, Error> {
    rest.iter()
        .enumerate()
        .try_fold(u64::from(lead >> 3), |acc, (i, byte)| {
            let bits = u64::from(byte >> 1);
            let shift = 5 + 7 * i as u32;
            let value = bits.checked_shl(shift).unwrap_or_default();
            if value >> shift != bits {
                return Err(Error::BadPacket);
            }
            Ok(acc | value)
        })
}
