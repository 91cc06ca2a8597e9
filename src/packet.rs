// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet codec and entities it can encode and decode
//!
//! This module provides the [`Packet`] type, [payloads][payload] and
//! [compressed instruction pointers][ip] as well as an [`encoder`] and a
//! [`decoder`] for the trace wire format. Both are created via a [`Builder`].
//!
//! # Example
//!
//! ```
//! use ptflow::packet::{self, Packet};
//! use ptflow::packet::payload::Tnt;
//!
//! let mut buffer = [0u8; 32];
//! let mut encoder = packet::builder().encoder(buffer.as_mut());
//! encoder.encode(&Packet::Psb).unwrap();
//! encoder.encode_ip(Packet::Tip, 0x0000_7fff_1234_5600, None).unwrap();
//! encoder.encode(&Packet::Tnt8(Tnt::new(5, 0b10110))).unwrap();
//! let (buffer, len) = encoder.finish();
//! assert_eq!(len, 24);
//!
//! let mut decoder = packet::builder().decoder(&buffer[..len]);
//! assert_eq!(decoder.decode().map(|(p, _)| p), Ok(Packet::Psb));
//! assert!(matches!(decoder.decode(), Ok((Packet::Tip(_), 7))));
//! assert_eq!(decoder.last_ip(), 0x0000_7fff_1234_5600);
//! assert_eq!(decoder.decode(), Ok((Packet::Tnt8(Tnt::new(5, 0b10110)), 1)));
//! assert_eq!(decoder.bytes_left(), 0);
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod ip;
pub mod opcode;
pub mod payload;
mod util;


use core::fmt;

pub use error::Error;
pub use ip::{Compression, Ip};

use crate::config::Config;
use crate::types::Mode;

use opcode::{Kind, Layout};

/// Create a new [`Builder`] for [`Decoder`][decoder::Decoder]s and
/// [`Encoder`][encoder::Encoder]s
pub fn builder() -> Builder {
    Default::default()
}

/// Builder for [`Decoder`][decoder::Decoder]s and [`Encoder`][encoder::Encoder]s
///
/// A builder will build a single decoder for a specific slice of bytes or a
/// single encoder for a specific buffer. If the trace data is read in chunks,
/// it may thus be neccessary to build decoders repeatedly. For this purpose,
/// [`Builder`] implements [`Copy`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Builder {
    config: Config,
    streaming: bool,
}

impl Builder {
    /// Create a new builder
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the [`Config`]
    pub fn with_config(self, config: &Config) -> Self {
        Self {
            config: *config,
            ..self
        }
    }

    /// Enable or disable MTC and TMA packets
    pub fn with_mtc(self, mtc: bool) -> Self {
        Self {
            config: Config { mtc, ..self.config },
            ..self
        }
    }

    /// Enable or disable CYC packets
    pub fn with_cyc(self, cyc: bool) -> Self {
        Self {
            config: Config { cyc, ..self.config },
            ..self
        }
    }

    /// Set the default IP [`Compression`] for [`Encoder`][encoder::Encoder]s
    ///
    /// If `None`, encoders pick the narrowest lossless compression.
    pub fn with_compression(self, compression: Option<Compression>) -> Self {
        Self {
            config: Config {
                compression,
                ..self.config
            },
            ..self
        }
    }

    /// Declare whether decoders' data may be continued
    ///
    /// By default, the data a [`Decoder`][decoder::Decoder] is built for is
    /// considered the complete trace. For trace data arriving in chunks,
    /// decoders should be built as streaming decoders. See
    /// [`Decoder::set_streaming`][decoder::Decoder::set_streaming] for details.
    pub fn with_streaming(self, streaming: bool) -> Self {
        Self { streaming, ..self }
    }

    /// Retrieve the [`Config`]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a [`Decoder`][decoder::Decoder] for the given data
    pub fn decoder(self, data: &[u8]) -> decoder::Decoder<'_> {
        decoder::Decoder::new(data, self.config, self.streaming)
    }

    /// Build an [`Encoder`][encoder::Encoder] writing into the given buffer
    pub fn encoder<B: AsMut<[u8]>>(self, buffer: B) -> encoder::Encoder<B> {
        encoder::Encoder::new(buffer, self.config)
    }
}

/// A single trace packet
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Packet {
    /// Padding
    Pad,
    /// Packet stream boundary
    Psb,
    /// End of the status packets following a [`Psb`][Self::Psb]
    Psbend,
    /// Target IP of an indirect branch, far transfer or return
    Tip(Ip),
    /// Target IP at which tracing was enabled
    TipPge(Ip),
    /// Target IP at which tracing was disabled
    TipPgd(Ip),
    /// Source IP of an asynchronous event or the current IP in PSB+
    Fup(Ip),
    /// Short taken/not-taken packet
    Tnt8(payload::Tnt),
    /// Long taken/not-taken packet
    Tnt64(payload::Tnt),
    /// Paging information
    Pip(payload::Pip),
    /// Internal buffer overflow
    Ovf,
    /// Execution mode
    ModeExec(Mode),
    /// Transactional memory state
    ModeTsx(payload::Tsx),
    /// Time stamp counter, 56 bits
    Tsc(u64),
    /// Core to bus clock ratio
    Cbr(u8),
    /// Mini time counter
    Mtc(u8),
    /// Timing alignment
    Tma(payload::Tma),
    /// Cycle count since the last CYC packet
    Cyc(u64),
    /// VMCS base address
    Vmcs(u64),
    /// Tracing was stopped
    Stop,
}

impl Packet {
    /// Retrieve the [`Kind`] of this packet
    pub fn kind(&self) -> Kind {
        match self {
            Self::Pad => Kind::Pad,
            Self::Psb => Kind::Psb,
            Self::Psbend => Kind::Psbend,
            Self::Tip(_) => Kind::Tip,
            Self::TipPge(_) => Kind::TipPge,
            Self::TipPgd(_) => Kind::TipPgd,
            Self::Fup(_) => Kind::Fup,
            Self::Tnt8(_) => Kind::Tnt8,
            Self::Tnt64(_) => Kind::Tnt64,
            Self::Pip(_) => Kind::Pip,
            Self::Ovf => Kind::Ovf,
            Self::ModeExec(_) => Kind::ModeExec,
            Self::ModeTsx(_) => Kind::ModeTsx,
            Self::Tsc(_) => Kind::Tsc,
            Self::Cbr(_) => Kind::Cbr,
            Self::Mtc(_) => Kind::Mtc,
            Self::Tma(_) => Kind::Tma,
            Self::Cyc(_) => Kind::Cyc,
            Self::Vmcs(_) => Kind::Vmcs,
            Self::Stop => Kind::Stop,
        }
    }

    /// Retrieve the compressed IP of IP-bearing packets
    pub fn ip(&self) -> Option<&Ip> {
        match self {
            Self::Tip(ip) | Self::TipPge(ip) | Self::TipPgd(ip) | Self::Fup(ip) => Some(ip),
            _ => None,
        }
    }

    /// Retrieve the size of this packet's encoding in bytes
    pub fn size(&self) -> usize {
        match (self.kind().layout(), self) {
            (_, Self::Cyc(value)) => util::cyc_size(*value),
            (Layout::Fixed(size), _) => size,
            (_, packet) => {
                1 + packet
                    .ip()
                    .map(|ip| ip.compression().payload_size())
                    .unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pad => write!(f, "pad"),
            Self::Psb => write!(f, "psb"),
            Self::Psbend => write!(f, "psbend"),
            Self::Tip(ip) => write!(f, "tip {ip}"),
            Self::TipPge(ip) => write!(f, "tip.pge {ip}"),
            Self::TipPgd(ip) => write!(f, "tip.pgd {ip}"),
            Self::Fup(ip) => write!(f, "fup {ip}"),
            Self::Tnt8(tnt) => write!(f, "tnt.8 {tnt}"),
            Self::Tnt64(tnt) => write!(f, "tnt.64 {tnt}"),
            Self::Pip(pip) => write!(f, "pip {pip}"),
            Self::Ovf => write!(f, "ovf"),
            Self::ModeExec(mode) => write!(f, "mode.exec {mode}"),
            Self::ModeTsx(tsx) => write!(f, "mode.tsx {tsx}"),
            Self::Tsc(tsc) => write!(f, "tsc {tsc:#x}"),
            Self::Cbr(ratio) => write!(f, "cbr {ratio:#x}"),
            Self::Mtc(ctc) => write!(f, "mtc {ctc:#x}"),
            Self::Tma(tma) => write!(f, "tma {tma}"),
            Self::Cyc(cyc) => write!(f, "cyc {cyc:#x}"),
            Self::Vmcs(base) => write!(f, "vmcs {base:#x}"),
            Self::Stop => write!(f, "stop"),
        }
    }
}
