// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Control flow reconstruction
//!
//! This module provides the [`Tracer`], which correlates a stream of
//! [`Packet`]s with the code of the traced program and generates a stream of
//! tracing [`Item`]s, most of which signal retired instructions.
//!
//! The tracer walks the code from the last known IP using the
//! [length decoder][crate::instruction::ild]. Only where the code alone does
//! not determine the next IP, it consults the trace:
//!
//! * conditional branches consume one bit of TNT information each,
//! * indirect and far transfers as well as returns take the target of the next
//!   TIP,
//! * a FUP outside of PSB+ marks an asynchronous transfer taken by the
//!   following TIP or TIP.PGD once the flow reaches the FUP's IP.
//!
//! Direct jumps and calls are followed without consulting the trace.
//!
//! A suppressed IP in a TIP or FUP refers to the last IP, as for the
//! [decoder][crate::packet::decoder]. Only for TIP.PGE and TIP.PGD it means
//! that the IP is unknown.

pub mod error;
pub mod item;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use item::Item;

use crate::image::Image;
use crate::instruction::{self, Instruction, ild};
use crate::packet::{self, Packet, decoder::Decoder, payload::Tnt};
use crate::types::{Mode, branch};

use item::Kind;

macro_rules! trace {
    ($($t:tt)*) => {{
        #[cfg(feature = "log")]
        log::trace!($($t)*);
    }};
}

macro_rules! debug {
    ($($t:tt)*) => {{
        #[cfg(feature = "log")]
        log::debug!($($t)*);
    }};
}

/// Tracer
///
/// A tracer owns a packet [`Decoder`] and an [`Image`] of the traced program
/// and generates [`Item`]s via its [`Iterator`] implementation. Packets are
/// decoded on demand. The iterator ends with the trace data.
///
/// Errors do not end the iteration. After an error, the tracer drops the
/// current IP and resumes at the next packet establishing one. After packet
/// decoding errors, it skips to the next PSB.
///
/// # Example
///
/// ```
/// use ptflow::{flow, image, packet};
///
/// # let trace_data = b"\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82\x02\x23";
/// # let code = b"\x90";
/// let decoder = packet::builder().decoder(trace_data);
/// let tracer = flow::Tracer::new(decoder, image::Segment::new(0x1000, code));
/// for item in tracer {
///     match item {
///         Ok(item) => println!("{item}"),
///         Err(e) => println!("error: {e}"),
///     }
/// }
/// ```
pub struct Tracer<'d, I: Image> {
    decoder: Decoder<'d>,
    image: I,
    mode: Mode,
    state: State,
    branches: branch::Map,
    fup: Option<u64>,
    psb: Option<Option<u64>>,
    peeked: Option<(Packet, u64)>,
    event: Option<Item>,
    last_ip: u64,
}

impl<'d, I: Image> Tracer<'d, I> {
    /// Create a new tracer
    ///
    /// The initial execution [`Mode`] is taken from the decoder's
    /// [`Config`][crate::config::Config].
    pub fn new(decoder: Decoder<'d>, image: I) -> Self {
        let mode = decoder.config().mode;
        Self {
            decoder,
            image,
            mode,
            state: State::Seeking,
            branches: Default::default(),
            fup: None,
            psb: None,
            peeked: None,
            event: None,
            last_ip: 0,
        }
    }

    /// Retrieve the current execution [`Mode`]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Retrieve the IP of the next instruction to be traced, if known
    pub fn ip(&self) -> Option<u64> {
        match self.state {
            State::Walking(ip) => Some(ip),
            _ => None,
        }
    }

    /// Retrieve the inner [`Decoder`]
    pub fn decoder(&self) -> &Decoder<'d> {
        &self.decoder
    }

    /// Retrieve the inner [`Image`]
    pub fn image(&self) -> &I {
        &self.image
    }

    /// Retire the instruction at `ip`
    fn step(&mut self, ip: u64) -> Result<Option<Item>, Error<I::Error>> {
        if self.branches.is_empty() && self.fup.is_none() && self.peeked.is_none() {
            self.lookahead(ip)?;
            if self.event.is_some() || self.state != State::Walking(ip) {
                return Ok(None);
            }
        }
        if self.fup == Some(ip) {
            self.fup = None;
            self.state = State::Async(ip);
            return Ok(None);
        }

        let insn = self.fetch(ip)?;
        self.state = if insn.is_conditional() {
            match self.branches.pop_taken() {
                Some(taken) => State::Walking(successor(ip, &insn, taken)),
                None => State::Resolving(ip, insn),
            }
        } else if insn.is_uninferable_discon() {
            State::Resolving(ip, insn)
        } else {
            State::Walking(successor(ip, &insn, true))
        };
        self.last_ip = ip;
        Ok(Some(Item::new(ip, insn.into())))
    }

    /// Fetch and decode the instruction at `ip`
    fn fetch(&mut self, ip: u64) -> Result<Instruction, Error<I::Error>> {
        let code = self
            .image
            .fetch(ip, ild::MAX_SIZE)
            .map_err(|e| Error::CannotFetch(e, ip))?;
        instruction::decode(code, self.mode).map_err(|e| Error::Instruction(e, ip))
    }

    /// Consume upcoming packets not altering the flow
    ///
    /// Reads ahead until a packet is found which needs to be processed at a
    /// later point, which is then retained. TNT and FUP packets are consumed.
    /// PSB+ and OVF are processed immediately.
    fn lookahead(&mut self, ip: u64) -> Result<(), Error<I::Error>> {
        while let Some(res) = self.read_packet() {
            let (packet, address) = res.map_err(Error::Packet)?;
            if self.psb.is_some() || matches!(packet, Packet::Psb | Packet::Ovf) {
                self.process(packet, address)?;
                if self.event.is_some() || self.state != State::Walking(ip) {
                    return Ok(());
                }
                continue;
            }
            match packet {
                Packet::Tnt8(tnt) | Packet::Tnt64(tnt) => return self.add_branches(tnt),
                Packet::Fup(_) => {
                    self.fup = Some(address);
                    return Ok(());
                }
                Packet::Pip(pip) => {
                    self.event = Some(Item::new(ip, Kind::Paging(pip)));
                    return Ok(());
                }
                Packet::Pad
                | Packet::Tsc(_)
                | Packet::Cbr(_)
                | Packet::Mtc(_)
                | Packet::Tma(_)
                | Packet::Cyc(_)
                | Packet::Vmcs(_)
                | Packet::ModeTsx(_) => (),
                packet => {
                    self.peeked = Some((packet, address));
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Process the next packet
    ///
    /// Returns `false` if there are no more packets.
    fn advance(&mut self) -> Result<bool, Error<I::Error>> {
        let next = self.peeked.take().map(Ok).or_else(|| self.read_packet());
        let Some(res) = next else {
            return Ok(false);
        };
        let (packet, address) = res.map_err(Error::Packet)?;
        self.process(packet, address)?;
        Ok(true)
    }

    /// Read a single packet from the decoder
    ///
    /// Returns the packet alongside the decoder's last IP after decoding it.
    fn read_packet(&mut self) -> Option<Result<(Packet, u64), packet::Error>> {
        #[cfg(feature = "log")]
        let pos = self.decoder.byte_pos();
        match self.decoder.decode() {
            Ok((packet, _)) => {
                trace!("{pos:#x}: {packet}");
                Some(Ok((packet, self.decoder.last_ip())))
            }
            Err(packet::Error::Truncated(_)) if self.decoder.bytes_left() == 0 => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// Process a single packet in the current state
    fn process(&mut self, packet: Packet, address: u64) -> Result<(), Error<I::Error>> {
        match packet {
            Packet::Psb => self.psb = Some(None),
            Packet::Psbend => {
                if let (Some(Some(ip)), State::Seeking) = (self.psb.take(), self.state) {
                    self.enable(ip);
                }
            }
            Packet::ModeExec(mode) => self.mode = mode,
            Packet::Fup(ip) if self.psb.is_some() => {
                if !ip.is_suppressed() {
                    self.psb = Some(Some(address));
                }
            }
            Packet::Fup(_) => match self.state {
                State::Seeking => self.state = State::Walking(address),
                State::Resolving(ip, _) if ip == address => {
                    self.fup = Some(ip);
                    self.state = State::Walking(ip);
                }
                State::Resolving(ip, _) => return Err(self.desync(Error::UnresolvableBranch(ip))),
                _ => debug!("Ignoring FUP at {address:#x}"),
            },
            Packet::Tip(_) => match self.state {
                State::Resolving(src, insn) if insn.is_conditional() => {
                    return Err(self.desync(Error::UnresolvableBranch(src)));
                }
                State::Resolving(src, _) | State::Async(src) if !self.branches.is_empty() => {
                    return Err(self.desync(Error::UnexpectedTip(src)));
                }
                State::Resolving(..) | State::Async(_) | State::Seeking => {
                    self.state = State::Walking(address);
                }
                State::Walking(src) => {
                    return Err(self.desync(Error::UnexpectedTip(src)));
                }
                State::Done => (),
            },
            Packet::TipPge(ip) => {
                self.fup = None;
                if ip.is_suppressed() {
                    self.state = State::Seeking;
                } else {
                    self.enable(address);
                }
            }
            Packet::TipPgd(ip) => {
                let at = if ip.is_suppressed() {
                    self.current_ip()
                } else {
                    address
                };
                self.reset();
                self.event = Some(Item::new(at, Kind::Disabled));
            }
            Packet::Tnt8(tnt) | Packet::Tnt64(tnt) => match self.state {
                State::Seeking => debug!("Dropping {tnt} without IP"),
                State::Resolving(ip, insn) if insn.is_conditional() => {
                    self.add_branches(tnt)?;
                    let taken = self.branches.pop_taken().unwrap_or_default();
                    self.state = State::Walking(successor(ip, &insn, taken));
                }
                State::Resolving(ip, _) | State::Async(ip) => {
                    return Err(self.desync(Error::UnexpectedTnt(ip)));
                }
                _ => self.add_branches(tnt)?,
            },
            Packet::Pip(pip) => self.event = Some(Item::new(self.current_ip(), Kind::Paging(pip))),
            Packet::Ovf => {
                debug!("Overflow after {:#x}", self.current_ip());
                let at = self.current_ip();
                self.reset();
                self.event = Some(Item::new(at, Kind::Overflow));
            }
            Packet::Pad
            | Packet::ModeTsx(_)
            | Packet::Tsc(_)
            | Packet::Cbr(_)
            | Packet::Mtc(_)
            | Packet::Tma(_)
            | Packet::Cyc(_)
            | Packet::Vmcs(_)
            | Packet::Stop => (),
        }
        Ok(())
    }

    /// Queue the bits of a TNT packet
    fn add_branches(&mut self, tnt: Tnt) -> Result<(), Error<I::Error>> {
        let map = branch::Map::from_tnt(tnt)
            .ok_or(Error::CannotAddBranches(branch::Error::TooManyBranches))?;
        self.branches.append(map).map_err(Error::CannotAddBranches)
    }

    /// Start tracing at `ip`
    fn enable(&mut self, ip: u64) {
        self.state = State::Walking(ip);
        self.event = Some(Item::new(ip, Kind::Enabled));
    }

    /// Drop the current IP and all pending trace information
    fn reset(&mut self) {
        self.state = State::Seeking;
        self.branches = Default::default();
        self.fup = None;
    }

    /// Report a desynchronisation
    fn desync(&mut self, err: Error<I::Error>) -> Error<I::Error> {
        debug!("Desynchronized at {:#x}", self.current_ip());
        self.reset();
        err
    }

    /// Retrieve the best known current IP
    fn current_ip(&self) -> u64 {
        match self.state {
            State::Walking(ip) | State::Resolving(ip, _) | State::Async(ip) => ip,
            State::Seeking | State::Done => self.last_ip,
        }
    }
}

impl<I: Image> Iterator for Tracer<'_, I> {
    type Item = Result<Item, Error<I::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.event.take() {
                return Some(Ok(event));
            }
            let res = match self.state {
                State::Done => return None,
                State::Walking(ip) => self.step(ip),
                _ => self.advance().map(|more| {
                    if !more {
                        self.state = State::Done;
                    }
                    None
                }),
            };
            match res {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => (),
                Err(Error::Packet(e)) => {
                    debug!("Could not decode packet: {e}");
                    self.reset();
                    if matches!(e, packet::Error::Truncated(_)) || self.decoder.sync_forward().is_none()
                    {
                        self.state = State::Done;
                    }
                    return Some(Err(Error::Packet(e)));
                }
                Err(e) => {
                    if !matches!(self.state, State::Seeking) {
                        self.reset();
                    }
                    return Some(Err(e));
                }
            }
        }
    }
}

/// State of the flow reconstruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    /// No IP known, waiting for a packet establishing one
    Seeking,
    /// The instruction at the given IP is the next one to retire
    Walking(u64),
    /// The instruction at the given IP retired, its successor depends on the
    /// trace
    Resolving(u64, Instruction),
    /// An asynchronous transfer occurs at the given IP
    Async(u64),
    /// The trace ended
    Done,
}

/// Determine the successor of an instruction not requiring a TIP
fn successor(ip: u64, insn: &Instruction, taken: bool) -> u64 {
    taken
        .then(|| insn.branch_target(ip))
        .flatten()
        .unwrap_or_else(|| insn.next_ip(ip))
}
