// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Instruction templates
//!
//! Every instruction form reduces to whether it carries a ModRM byte and the
//! kind of immediate following the ModRM, SIB and displacement bytes. This
//! module holds the templates for the legacy one-byte and two-byte (`0F`)
//! opcode maps as 256-entry tables as well as the fixed templates of the
//! other maps.

/// Kind of immediate operand
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Imm {
    None,
    /// 8 bit
    Byte,
    /// 16 bit
    Word,
    /// 32 bit
    Dword,
    /// 16 or 32 bit, depending on the operand size
    Z,
    /// 16, 32 or 64 bit, depending on the operand size
    V,
    /// Memory offset with the width of the address size
    Moffs,
    /// 8 bit relative branch displacement
    Rel8,
    /// 16 or 32 bit relative branch displacement
    ///
    /// Always 32 bit in 64-bit mode.
    RelZ,
    /// Far pointer: 16 or 32 bit offset and 16 bit segment selector
    FarPtr,
    /// `ENTER` operands: 16 bit size and 8 bit nesting level
    Enter,
    /// 8 bit for ModRM `reg` values 0 and 1 (`TEST`), none otherwise
    Group3Byte,
    /// 16 or 32 bit for ModRM `reg` values 0 and 1 (`TEST`), none otherwise
    Group3Z,
}

/// Instruction template
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Template {
    /// Whether a ModRM byte follows the opcode
    pub modrm: bool,
    /// Kind of immediate
    pub imm: Imm,
}

impl Template {
    const fn new(modrm: bool, imm: Imm) -> Self {
        Self { modrm, imm }
    }
}

pub const NONE: Template = Template::new(false, Imm::None);
pub const MODRM: Template = Template::new(true, Imm::None);
pub const MODRM_IB: Template = Template::new(true, Imm::Byte);
pub const MODRM_ID: Template = Template::new(true, Imm::Dword);

/// Templates of the one-byte opcode map
///
/// Entries for prefixes and escape bytes are never consulted.
pub static ONE_BYTE: [Template; 256] = build_one_byte();

/// Templates of the two-byte opcode map (`0F xx`)
///
/// Entries for the escape bytes `38` and `3A` are never consulted.
pub static TWO_BYTE: [Template; 256] = build_two_byte();

const fn build_one_byte() -> [Template; 256] {
    let mut res = [NONE; 256];
    let mut i = 0;
    while i < res.len() {
        res[i] = one_byte(i as u8);
        i += 1;
    }
    res
}

const fn build_two_byte() -> [Template; 256] {
    let mut res = [NONE; 256];
    let mut i = 0;
    while i < res.len() {
        res[i] = two_byte(i as u8);
        i += 1;
    }
    res
}

const fn one_byte(opcode: u8) -> Template {
    match opcode {
        // ALU ops, segment push/pop and BCD adjustments
        0x00..=0x3f => match opcode & 0x07 {
            0..=3 => MODRM,
            4 => Template::new(false, Imm::Byte),
            5 => Template::new(false, Imm::Z),
            _ => NONE,
        },
        0x40..=0x61 => NONE,
        0x62 | 0x63 => MODRM,
        0x68 => Template::new(false, Imm::Z),
        0x69 => Template::new(true, Imm::Z),
        0x6a => Template::new(false, Imm::Byte),
        0x6b => MODRM_IB,
        0x70..=0x7f => Template::new(false, Imm::Rel8),
        0x80 | 0x82 | 0x83 => MODRM_IB,
        0x81 => Template::new(true, Imm::Z),
        0x84..=0x8f => MODRM,
        0x9a => Template::new(false, Imm::FarPtr),
        0xa0..=0xa3 => Template::new(false, Imm::Moffs),
        0xa8 => Template::new(false, Imm::Byte),
        0xa9 => Template::new(false, Imm::Z),
        0xb0..=0xb7 => Template::new(false, Imm::Byte),
        0xb8..=0xbf => Template::new(false, Imm::V),
        0xc0 | 0xc1 | 0xc6 => MODRM_IB,
        0xc2 | 0xca => Template::new(false, Imm::Word),
        0xc4 | 0xc5 => MODRM,
        0xc7 => Template::new(true, Imm::Z),
        0xc8 => Template::new(false, Imm::Enter),
        0xcd => Template::new(false, Imm::Byte),
        0xd0..=0xd3 => MODRM,
        0xd4 | 0xd5 => Template::new(false, Imm::Byte),
        0xd8..=0xdf => MODRM,
        0xe0..=0xe3 | 0xeb => Template::new(false, Imm::Rel8),
        0xe4..=0xe7 => Template::new(false, Imm::Byte),
        0xe8 | 0xe9 => Template::new(false, Imm::RelZ),
        0xea => Template::new(false, Imm::FarPtr),
        0xf6 => Template::new(true, Imm::Group3Byte),
        0xf7 => Template::new(true, Imm::Group3Z),
        0xfe | 0xff => MODRM,
        _ => NONE,
    }
}

const fn two_byte(opcode: u8) -> Template {
    match opcode {
        0x00..=0x03 | 0x0d => MODRM,
        // 3DNow! with the opcode in the trailing byte
        0x0f => MODRM_IB,
        0x10..=0x2f => MODRM,
        0x40..=0x4f => MODRM,
        0x70..=0x73 => MODRM_IB,
        0x77 => NONE,
        0x50..=0x7f => MODRM,
        0x80..=0x8f => Template::new(false, Imm::RelZ),
        0x90..=0x9f => MODRM,
        0xa4 | 0xac | 0xba | 0xc2 | 0xc4..=0xc6 => MODRM_IB,
        0xa3 | 0xa5 | 0xab | 0xad..=0xaf => MODRM,
        0xb0..=0xb9 | 0xbb..=0xc1 | 0xc3 | 0xc7 => MODRM,
        0xd0..=0xff => MODRM,
        _ => NONE,
    }
}

/// Retrieve the template for a VEX or EVEX encoded instruction
pub fn vex(map: u8, opcode: u8) -> Template {
    match map {
        1 if opcode == 0x77 => NONE,
        1 if TWO_BYTE[opcode as usize].imm == Imm::Byte => MODRM_IB,
        3 => MODRM_IB,
        _ => MODRM,
    }
}

/// Retrieve the template for an XOP encoded instruction
pub fn xop(map: u8) -> Template {
    match map {
        0x08 => MODRM_IB,
        0x0a => MODRM_ID,
        _ => MODRM,
    }
}
