// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet encoder

use crate::config::Config;

use super::error::Error;
use super::ip::{Compression, Ip, LastIp};
use super::opcode;
use super::payload::Tnt;
use super::{Packet, util};

/// Size of the largest packet in bytes
pub const MAX_PACKET_SIZE: usize = 16;

/// An encoder for [`Packet`]s
///
/// An encoder appends packets to a fixed buffer, one at a time. Encoding is
/// atomic per packet: a packet is either written completely or, on any error,
/// not at all. Neither the buffer contents already written nor the encoder's
/// [last IP][LastIp] context are altered by a failed operation.
///
/// # Example
///
/// ```
/// use ptflow::packet::{self, Compression, Error, Packet};
///
/// let mut buffer = [0u8; 4];
/// let mut encoder = packet::builder().encoder(buffer.as_mut());
/// assert_eq!(encoder.encode(&Packet::Psbend), Ok(2));
/// assert_eq!(
///     encoder.encode_ip(Packet::Fup, 0x1000, Some(Compression::Update32)),
///     Err(Error::Overflow),
/// );
/// assert_eq!(encoder.encode_ip(Packet::Fup, 0x1000, None), Err(Error::Overflow));
/// assert_eq!(encoder.encode(&Packet::Pad), Ok(1));
/// assert_eq!(encoder.remaining(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct Encoder<B: AsMut<[u8]>> {
    data: B,
    pos: usize,
    config: Config,
    last_ip: LastIp,
}

impl<B: AsMut<[u8]>> Encoder<B> {
    /// Create a new encoder
    pub(super) fn new(data: B, config: Config) -> Self {
        Self {
            data,
            pos: 0,
            config,
            last_ip: LastIp::new(),
        }
    }

    /// Encode a single [`Packet`]
    ///
    /// Returns the number of bytes written. For IP-bearing packets, the
    /// [`Ip`] is taken as is and the encoder's last IP is updated to the
    /// address it resolves to.
    pub fn encode(&mut self, packet: &Packet) -> Result<usize, Error> {
        let mut staging = [0u8; MAX_PACKET_SIZE];
        let size = serialize(packet, &self.config, &mut staging)?;
        let target = self
            .data
            .as_mut()
            .get_mut(self.pos..)
            .and_then(|d| d.get_mut(..size))
            .ok_or(Error::Overflow)?;
        target.copy_from_slice(&staging[..size]);
        self.pos += size;

        match packet {
            Packet::Psb => self.last_ip.reset(),
            p => {
                if let Some(ip) = p.ip() {
                    self.last_ip.expand(ip);
                }
            }
        }
        Ok(size)
    }

    /// Encode an IP-bearing packet for a full address
    ///
    /// The address is compressed against the encoder's last IP and passed to
    /// `make` for constructing the packet, e.g. [`Packet::Tip`]. If no
    /// `compression` is given, the default one from the [`Config`] is used. If
    /// there is no default either, the narrowest lossless compression is
    /// chosen.
    pub fn encode_ip(
        &mut self,
        make: impl FnOnce(Ip) -> Packet,
        address: u64,
        compression: Option<Compression>,
    ) -> Result<usize, Error> {
        let compression = compression.or(self.config.compression);
        let ip = self.last_ip.compress(address, compression)?;
        self.encode(&make(ip))
    }

    /// Write a single raw byte
    ///
    /// This may be used for writing single-byte packets such as PAD directly.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        let target = self
            .data
            .as_mut()
            .get_mut(self.pos)
            .ok_or(Error::Overflow)?;
        *target = byte;
        self.pos += 1;
        Ok(())
    }

    /// Finish the encoding process
    ///
    /// Returns the buffer and the number of bytes written.
    pub fn finish(self) -> (B, usize) {
        (self.data, self.pos)
    }

    /// Retrieve the current byte position, i.e. the number of bytes written
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Retrieve the number of bytes still availible in the buffer
    pub fn remaining(&mut self) -> usize {
        self.data.as_mut().len().saturating_sub(self.pos)
    }

    /// Retrieve the last IP encoded
    pub fn last_ip(&self) -> u64 {
        self.last_ip.get()
    }

    /// Retrieve the [`Config`] this encoder operates with
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Serialize a packet into the given staging buffer
///
/// Validates all fields and returns the number of bytes produced.
fn serialize(
    packet: &Packet,
    config: &Config,
    out: &mut [u8; MAX_PACKET_SIZE],
) -> Result<usize, Error> {
    let kind = packet.kind();
    if !kind.is_enabled(config) {
        return Err(Error::BadArgument);
    }
    let size = packet.size();
    let entry = opcode::entry(kind);
    let (head, payload) = out[..size].split_at_mut(entry.opcode.len());
    head.copy_from_slice(entry.opcode);

    match packet {
        Packet::Pad | Packet::Psbend | Packet::Ovf | Packet::Stop => (),
        Packet::Psb => payload
            .chunks_exact_mut(2)
            .for_each(|c| c.copy_from_slice(entry.opcode)),
        Packet::Tip(ip) | Packet::TipPge(ip) | Packet::TipPgd(ip) | Packet::Fup(ip) => {
            if !ip.is_valid() {
                return Err(Error::BadArgument);
            }
            head[0] |= ip.compression().code() << 5;
            util::write_le(ip.bits(), payload);
        }
        Packet::Tnt8(tnt) => head[0] = short_tnt(tnt)?,
        Packet::Tnt64(tnt) => {
            if !tnt.fits(Tnt::MAX_LONG) {
                return Err(Error::BadArgument);
            }
            util::write_le(tnt.with_stop_bit(), payload);
        }
        Packet::Pip(pip) => pip.encode(payload)?,
        Packet::ModeExec(mode) => head[1] |= u8::from(mode.csl()) | u8::from(mode.csd()) << 1,
        Packet::ModeTsx(tsx) => head[1] |= tsx.to_byte(),
        Packet::Tsc(tsc) => {
            if !util::fits_bytes(*tsc, payload.len()) {
                return Err(Error::BadArgument);
            }
            util::write_le(*tsc, payload);
        }
        Packet::Cbr(ratio) => payload[0] = *ratio,
        Packet::Mtc(ctc) => payload[0] = *ctc,
        Packet::Tma(tma) => tma.encode(payload)?,
        Packet::Cyc(value) => write_cyc(*value, &mut head[0], payload),
        Packet::Vmcs(base) => {
            if base & 0xfff != 0 || !util::fits_bytes(base >> 12, payload.len()) {
                return Err(Error::BadArgument);
            }
            util::write_le(base >> 12, payload);
        }
    }
    Ok(size)
}

/// Produce the single byte of a TNT-8 packet
fn short_tnt(tnt: &Tnt) -> Result<u8, Error> {
    if !tnt.fits(Tnt::MAX_SHORT) {
        return Err(Error::BadArgument);
    }
    Ok((tnt.with_stop_bit() as u8) << 1)
}

/// Write the bytes of a CYC packet
///
/// The lead byte carries the lowest 5 bits of the value, every following byte
/// 7 more bits. Bit 2 of the lead byte and bit 0 of every following byte
/// signal that another byte follows.
fn write_cyc(value: u64, lead: &mut u8, rest: &mut [u8]) {
    *lead |= ((value & 0x1f) as u8) << 3 | u8::from(!rest.is_empty()) << 2;
    let last = rest.len().saturating_sub(1);
    rest.iter_mut().enumerate().for_each(|(i, byte)| {
        let bits = value >> (5 + 7 * i) & 0x7f;
        *byte = (bits as u8) << 1 | u8::from(i < last);
    });
}
