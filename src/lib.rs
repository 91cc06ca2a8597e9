// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

//! # Packet codec and instruction length decoder for processor control-flow traces
//!
//! This crate implements the binary protocol layer of a hardware control-flow
//! trace format: a stream of variable-length packets carrying branch outcomes,
//! compressed instruction pointers, timing and paging information. It also
//! provides the other half needed for reconstructing control flow from such a
//! stream: an instruction length and classification decoder (ILD) for the
//! traced x86 machine code.
//!
//! * [`packet`] provides the [`Packet`][packet::Packet] type as well as an
//!   [encoder][packet::encoder::Encoder] and a
//!   [decoder][packet::decoder::Decoder] for the wire format, including the
//!   [instruction pointer compression][packet::ip] scheme.
//! * [`instruction`] provides the [ILD][instruction::ild] producing
//!   [`Instruction`] descriptors from raw bytes.
//! * [`flow`] combines both for reconstructing the executed instructions, with
//!   code bytes supplied by an [`Image`][image::Image].
//!
//! This crate is not concerned with how trace data is collected, transported
//! or stored, nor with how decoded instructions are presented.
//!
//! # no_std
//! This crate is not dependent on the standard library and only uses the Core
//! Library. It can therefore even be used in bare metal environments.
//!
//! # Features
//! - `alloc`: boxed [`Image`][image::Image]s for dynamic dispatch
//! - `either`: use an [`Either`][either::Either] of two images as an image
//! - `elf`: use ELF files as [`Image`][image::Image]s
//! - `log`: emit records from the [flow reconstruction][flow]
//! - `serde`: (de)serialization of the [configuration][config::Config]
//!
//! # Example
//!
//! The following example encodes a short trace and reconstructs the control
//! flow through a tiny code image consisting of a conditional jump over a
//! `nop` followed by a `ret`.
//!
//! ```
//! use ptflow::packet::{self, Packet};
//! use ptflow::packet::payload::Tnt;
//! use ptflow::{flow, image};
//!
//! // 0x1000: jz +1; 0x1002: nop; 0x1003: ret
//! let code = b"\x74\x01\x90\xc3";
//!
//! let mut buffer = [0u8; 64];
//! let mut encoder = packet::builder().encoder(buffer.as_mut());
//! encoder.encode(&Packet::Psb).unwrap();
//! encoder.encode_ip(Packet::Fup, 0x1000, None).unwrap();
//! encoder.encode(&Packet::Psbend).unwrap();
//! encoder.encode(&Packet::Tnt8(Tnt::new(1, 0b1))).unwrap();
//! encoder.encode_ip(Packet::Tip, 0x2000, None).unwrap();
//! let (buffer, len) = encoder.finish();
//!
//! let decoder = packet::builder().decoder(&buffer[..len]);
//! let mut tracer = flow::Tracer::new(decoder, image::Segment::new(0x1000, code));
//! let ips: Vec<u64> = tracer
//!     .by_ref()
//!     .filter_map(|i| i.ok())
//!     .filter(|i| i.instruction().is_some())
//!     .map(|i| i.ip())
//!     .collect();
//! assert_eq!(ips, [0x1000, 0x1003]);
//! ```
#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod config;
pub mod flow;
pub mod image;
pub mod instruction;
pub mod packet;
pub mod types;

pub use instruction::Instruction;
pub use packet::Packet;
