// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Instruction length decoder
//!
//! The length decoder walks the bytes of a single instruction through the
//! states [`State::Prefix`], [`State::Opcode`], [`State::ModRm`],
//! [`State::Displacement`] and [`State::Immediate`], consuming the bytes each
//! state demands. A successful [`Ild::length_decode`] yields a [`Decoded`]
//! instruction, which may then be [classified][Decoded::classify].
//!
//! # Example
//!
//! ```
//! use ptflow::instruction::{ild::Ild, Kind};
//! use ptflow::types::Mode;
//!
//! let decoded = Ild::new(b"\xe9\x60\xf9\xff\xff", Mode::Bit64)
//!     .length_decode()
//!     .unwrap();
//! assert_eq!(decoded.size(), 5);
//! assert_eq!(decoded.classify().kind, Some(Kind::jmp_e9(-0x6a0)));
//! ```

use crate::types::Mode;

use super::table::{self, Imm, Template};
use super::{Error, Instruction, Kind};

/// Maximum length of an instruction in bytes
pub const MAX_SIZE: usize = 15;

/// Length decoder states
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Legacy and REX prefixes
    Prefix,
    /// Escape and opcode bytes, including VEX, EVEX and XOP payloads
    Opcode,
    /// ModRM and SIB bytes
    ModRm,
    /// Memory operand displacement
    Displacement,
    /// Immediate operand
    Immediate,
    /// The instruction is complete
    Done,
}

/// Opcode map an instruction's opcode belongs to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Map {
    /// Legacy one-byte map
    OneByte,
    /// Legacy two-byte map (`0F xx`)
    TwoByte,
    /// Legacy three-byte map (`0F 38 xx`)
    ThreeByte38,
    /// Legacy three-byte map (`0F 3A xx`)
    ThreeByte3a,
    /// VEX or EVEX encoded map
    Vex(u8),
    /// XOP encoded map
    Xop(u8),
}

/// Prefixes relevant for decoding
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Prefixes {
    /// Operand size override (`66`)
    osz: bool,
    /// Address size override (`67`)
    asz: bool,
    /// `F3`
    rep: bool,
    /// REX prefix, `0` if there is none
    rex: u8,
}

/// An instruction length decoder for a single instruction
#[derive(Copy, Clone, Debug)]
pub struct Ild<'a> {
    bytes: &'a [u8],
    mode: Mode,
}

impl<'a> Ild<'a> {
    /// Create a length decoder for the instruction at the start of `bytes`
    ///
    /// No more than [`MAX_SIZE`] bytes will ever be inspected.
    pub fn new(bytes: &'a [u8], mode: Mode) -> Self {
        Self { bytes, mode }
    }

    /// Determine the instruction's length
    ///
    /// Returns [`Error::Truncated`] if the instruction extends beyond the
    /// given bytes and [`Error::TooLong`] if it exceeds [`MAX_SIZE`] bytes.
    /// Undefined opcodes are decoded with the length of their legacy form.
    pub fn length_decode(&self) -> Result<Decoded<'a>, Error> {
        let mut machine = Machine::new(self.bytes, self.mode);
        let mut state = State::Prefix;
        while state != State::Done {
            state = match state {
                State::Prefix => machine.prefix()?,
                State::Opcode => machine.opcode()?,
                State::ModRm => machine.modrm()?,
                State::Displacement => machine.displacement()?,
                State::Immediate => machine.immediate()?,
                State::Done => State::Done,
            };
        }
        Ok(machine.finish())
    }
}

/// A length-decoded instruction
///
/// Holds the bytes of exactly one instruction along with the information
/// collected while decoding it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Decoded<'a> {
    bytes: &'a [u8],
    mode: Mode,
    map: Map,
    opcode: u8,
    modrm: Option<u8>,
    prefixes: Prefixes,
    imm_pos: usize,
}

impl Decoded<'_> {
    /// Retrieve the size of the instruction in bytes
    pub fn size(&self) -> u8 {
        self.bytes.len() as u8
    }

    /// Retrieve the instruction's bytes
    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Retrieve the execution mode the instruction was decoded for
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Retrieve the opcode map
    pub fn map(&self) -> Map {
        self.map
    }

    /// Retrieve the opcode byte within its [`Map`]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Retrieve the ModRM byte, if the instruction has one
    pub fn modrm(&self) -> Option<u8> {
        self.modrm
    }

    /// Classify the instruction
    pub fn classify(&self) -> Instruction {
        Instruction {
            size: self.size(),
            mode: self.mode,
            osz: self.prefixes.osz,
            kind: self.kind(),
        }
    }

    /// Determine the [`Kind`] of control flow relevant instructions
    fn kind(&self) -> Option<Kind> {
        let reg = self.modrm.map(|m| (m >> 3) & 0x07);
        let register_form = self.modrm.is_some_and(|m| m >> 6 == 3);
        match (self.map, self.opcode) {
            (Map::OneByte, 0x70..=0x7f) => Some(Kind::jcc(self.rel())),
            (Map::OneByte, 0x9a) => Some(Kind::call_9a),
            (Map::OneByte, 0xc2) => Some(Kind::ret_c2),
            (Map::OneByte, 0xc3) => Some(Kind::ret_c3),
            (Map::OneByte, 0xca) => Some(Kind::ret_ca),
            (Map::OneByte, 0xcb) => Some(Kind::ret_cb),
            (Map::OneByte, 0xcc) => Some(Kind::int3),
            (Map::OneByte, 0xcd) => Some(Kind::int),
            (Map::OneByte, 0xce) => Some(Kind::into),
            (Map::OneByte, 0xcf) => Some(Kind::iret),
            (Map::OneByte, 0xe0) => Some(Kind::loopne(self.rel())),
            (Map::OneByte, 0xe1) => Some(Kind::loope(self.rel())),
            (Map::OneByte, 0xe2) => Some(Kind::loop_(self.rel())),
            (Map::OneByte, 0xe3) => Some(Kind::jrcxz(self.rel())),
            (Map::OneByte, 0xe8) => Some(Kind::call_e8(self.rel())),
            (Map::OneByte, 0xe9) => Some(Kind::jmp_e9(self.rel())),
            (Map::OneByte, 0xea) => Some(Kind::jmp_ea),
            (Map::OneByte, 0xeb) => Some(Kind::jmp_eb(self.rel())),
            (Map::OneByte, 0xf1) => Some(Kind::int1),
            (Map::OneByte, 0xff) => match reg {
                Some(2) => Some(Kind::call_ff2),
                Some(3) => Some(Kind::call_ff3),
                Some(4) => Some(Kind::jmp_ff4),
                Some(5) => Some(Kind::jmp_ff5),
                _ => None,
            },
            (Map::TwoByte, 0x01) => match self.modrm {
                Some(0xc1) => Some(Kind::vmcall),
                Some(0xc2) => Some(Kind::vmlaunch),
                Some(0xc3) => Some(Kind::vmresume),
                _ => None,
            },
            (Map::TwoByte, 0x05) => Some(Kind::syscall),
            (Map::TwoByte, 0x07) => Some(Kind::sysret),
            (Map::TwoByte, 0x22) if reg == Some(3) && self.prefixes.rex & 0x04 == 0 => {
                Some(Kind::mov_cr3)
            }
            (Map::TwoByte, 0x34) => Some(Kind::sysenter),
            (Map::TwoByte, 0x35) => Some(Kind::sysexit),
            (Map::TwoByte, 0x80..=0x8f) => Some(Kind::jcc(self.rel())),
            (Map::TwoByte, 0xc7)
                if reg == Some(6)
                    && !register_form
                    && !self.prefixes.osz
                    && !self.prefixes.rep =>
            {
                Some(Kind::vmptrld)
            }
            _ => None,
        }
    }

    /// Read the relative displacement from the immediate bytes
    fn rel(&self) -> i32 {
        match self.bytes.get(self.imm_pos..).unwrap_or_default() {
            [b] => (*b as i8).into(),
            [a, b] => i16::from_le_bytes([*a, *b]).into(),
            [a, b, c, d, ..] => i32::from_le_bytes([*a, *b, *c, *d]),
            _ => 0,
        }
    }
}

/// State machine for decoding a single instruction
struct Machine<'a> {
    bytes: &'a [u8],
    mode: Mode,
    pos: usize,
    prefixes: Prefixes,
    map: Map,
    opcode: u8,
    template: Template,
    modrm: Option<u8>,
    disp_size: usize,
    imm_pos: usize,
}

impl<'a> Machine<'a> {
    fn new(bytes: &'a [u8], mode: Mode) -> Self {
        Self {
            bytes,
            mode,
            pos: 0,
            prefixes: Default::default(),
            map: Map::OneByte,
            opcode: 0,
            template: table::NONE,
            modrm: None,
            disp_size: 0,
            imm_pos: 0,
        }
    }

    fn prefix(&mut self) -> Result<State, Error> {
        loop {
            match self.peek()? {
                0x66 => self.prefixes.osz = true,
                0x67 => self.prefixes.asz = true,
                0xf3 => self.prefixes.rep = true,
                0xf0 | 0xf2 | 0x26 | 0x2e | 0x36 | 0x3e | 0x64 | 0x65 => (),
                rex @ 0x40..=0x4f if self.mode == Mode::Bit64 => {
                    self.pos += 1;
                    self.prefixes.rex = rex;
                    continue;
                }
                _ => return Ok(State::Opcode),
            }
            // A REX prefix is only effective directly preceding the opcode
            self.prefixes.rex = 0;
            self.pos += 1;
        }
    }

    fn opcode(&mut self) -> Result<State, Error> {
        let opcode = self.next()?;
        match opcode {
            0x0f => self.escape()?,
            0xc4 | 0xc5 | 0x62 if self.is_vex()? => {
                let (map, payload) = match opcode {
                    0xc5 => (1, 1),
                    0xc4 => (self.peek()? & 0x1f, 2),
                    _ => (self.peek()? & 0x07, 3),
                };
                self.skip(payload)?;
                let opcode = self.next()?;
                self.set_opcode(Map::Vex(map), opcode);
            }
            0x8f if self.peek()? & 0x1f >= 0x08 => {
                let map = self.peek()? & 0x1f;
                self.skip(2)?;
                let opcode = self.next()?;
                self.set_opcode(Map::Xop(map), opcode);
            }
            _ => self.set_opcode(Map::OneByte, opcode),
        }
        Ok(State::ModRm)
    }

    fn escape(&mut self) -> Result<(), Error> {
        match self.next()? {
            0x38 => {
                let opcode = self.next()?;
                self.set_opcode(Map::ThreeByte38, opcode);
            }
            0x3a => {
                let opcode = self.next()?;
                self.set_opcode(Map::ThreeByte3a, opcode);
            }
            opcode => self.set_opcode(Map::TwoByte, opcode),
        }
        Ok(())
    }

    fn modrm(&mut self) -> Result<State, Error> {
        if !self.template.modrm {
            return Ok(State::Immediate);
        }
        let modrm = self.next()?;
        self.modrm = Some(modrm);

        // Control and debug register moves always use the register form
        let is_creg_move = self.map == Map::TwoByte && matches!(self.opcode, 0x20..=0x27);
        let md = if is_creg_move { 3 } else { modrm >> 6 };
        let rm = modrm & 0x07;

        self.disp_size = if self.address_size() == 2 {
            match (md, rm) {
                (0, 6) | (2, _) => 2,
                (1, _) => 1,
                _ => 0,
            }
        } else {
            let base = if md != 3 && rm == 4 {
                self.next()? & 0x07
            } else {
                rm
            };
            match (md, base) {
                (0, 5) | (2, _) => 4,
                (1, _) => 1,
                _ => 0,
            }
        };
        Ok(State::Displacement)
    }

    fn displacement(&mut self) -> Result<State, Error> {
        self.skip(self.disp_size)?;
        Ok(State::Immediate)
    }

    fn immediate(&mut self) -> Result<State, Error> {
        let reg = self.modrm.map(|m| (m >> 3) & 0x07).unwrap_or_default();
        let z = if self.operand_size() == 2 { 2 } else { 4 };
        let size = match self.template.imm {
            Imm::None => 0,
            Imm::Byte | Imm::Rel8 => 1,
            Imm::Word => 2,
            Imm::Dword => 4,
            Imm::Enter => 3,
            Imm::Z => z,
            Imm::V => self.operand_size(),
            Imm::Moffs => self.address_size(),
            Imm::RelZ if self.mode == Mode::Bit64 => 4,
            Imm::RelZ => z,
            Imm::FarPtr => 2 + z,
            Imm::Group3Byte if reg < 2 => 1,
            Imm::Group3Z if reg < 2 => z,
            Imm::Group3Byte | Imm::Group3Z => 0,
        };
        self.imm_pos = self.pos;
        self.skip(size)?;
        Ok(State::Done)
    }

    fn finish(self) -> Decoded<'a> {
        Decoded {
            bytes: self.bytes.get(..self.pos).unwrap_or_default(),
            mode: self.mode,
            map: self.map,
            opcode: self.opcode,
            modrm: self.modrm,
            prefixes: self.prefixes,
            imm_pos: self.imm_pos,
        }
    }

    fn set_opcode(&mut self, map: Map, opcode: u8) {
        self.map = map;
        self.opcode = opcode;
        self.template = match map {
            Map::OneByte => table::ONE_BYTE[usize::from(opcode)],
            Map::TwoByte => table::TWO_BYTE[usize::from(opcode)],
            Map::ThreeByte38 => table::MODRM,
            Map::ThreeByte3a => table::MODRM_IB,
            Map::Vex(map) => table::vex(map, opcode),
            Map::Xop(map) => table::xop(map),
        };
    }

    /// Determine whether a `C4`, `C5` or `62` starts a VEX or EVEX prefix
    ///
    /// Outside 64-bit mode, these are only prefixes if the following byte
    /// would be a ModRM in register form.
    fn is_vex(&self) -> Result<bool, Error> {
        Ok(self.mode == Mode::Bit64 || self.peek()? >= 0xc0)
    }

    /// Retrieve the operand size in bytes
    fn operand_size(&self) -> usize {
        match (self.mode, self.prefixes.osz) {
            (Mode::Bit64, _) if self.prefixes.rex & 0x08 != 0 => 8,
            (Mode::Bit16, false) | (Mode::Bit32 | Mode::Bit64, true) => 2,
            _ => 4,
        }
    }

    /// Retrieve the address size in bytes
    fn address_size(&self) -> usize {
        match (self.mode, self.prefixes.asz) {
            (Mode::Bit64, false) => 8,
            (Mode::Bit16, false) | (Mode::Bit32, true) => 2,
            _ => 4,
        }
    }

    fn peek(&self) -> Result<u8, Error> {
        if self.pos >= MAX_SIZE {
            return Err(Error::TooLong);
        }
        self.bytes.get(self.pos).copied().ok_or(Error::Truncated)
    }

    fn next(&mut self) -> Result<u8, Error> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn skip(&mut self, count: usize) -> Result<(), Error> {
        let end = self.pos + count;
        if end > MAX_SIZE {
            return Err(Error::TooLong);
        }
        if end > self.bytes.len() {
            return Err(Error::Truncated);
        }
        self.pos = end;
        Ok(())
    }
}
