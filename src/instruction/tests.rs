// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

extern crate alloc;

use super::*;

use ild::Ild;

macro_rules! ild_test {
    ($n:ident, $b:literal, $m:expr, $s:expr) => {
        ild_test!($n, $b, $m, $s, None);
    };
    ($n:ident, $b:literal, $m:expr, $s:expr, $k:expr) => {
        mod $n {
            use super::*;

            #[test]
            fn length() {
                let decoded = Ild::new($b, $m).length_decode().expect("Could not decode");
                assert_eq!(decoded.size(), $s);
                assert_eq!(decoded.bytes(), &$b[..]);
            }

            #[test]
            fn classify() {
                let insn = decode($b, $m).expect("Could not decode");
                assert_eq!((insn.size, insn.mode, insn.kind), ($s, $m, $k));
            }

            #[test]
            fn truncated() {
                assert_eq!(decode(&$b[..$b.len() - 1], $m), Err(Error::Truncated));
            }
        }
    };
}


ild_test!(
    scenario_jmp_rel32,
    b"\xe9\x60\xf9\xff\xff",
    Mode::Bit64,
    5,
    Some(Kind::jmp_e9(-0x6a0))
);
ild_test!(
    scenario_moffs_rex_w,
    b"\x48\xa1\x3f\xaa\xbb\xcc\xdd\xee\xff\x11",
    Mode::Bit64,
    10
);

#[test]
fn scenario_jmp_rel32_class() {
    let insn = decode(b"\xe9\x60\xf9\xff\xff", Mode::Bit64).expect("Could not decode");
    assert_eq!(insn.class(), Class::Jump);
    assert_eq!(insn.displacement(), Some(i32::from_le_bytes([0x60, 0xf9, 0xff, 0xff])));
    assert!(!insn.is_conditional());
    assert!(!insn.is_uninferable_discon());
}

#[test]
fn empty() {
    assert_eq!(decode(b"", Mode::Bit64), Err(Error::Truncated));
}

#[test]
fn too_long() {
    let mut bytes = [0x66u8; 16];
    bytes[15] = 0x90;
    assert_eq!(decode(&bytes, Mode::Bit64), Err(Error::TooLong));
    assert_eq!(decode(&bytes[..15], Mode::Bit64), Err(Error::TooLong));
}

#[test]
fn max_length() {
    let mut bytes = [0x66u8; 15];
    bytes[14] = 0x90;
    assert_eq!(decode(&bytes, Mode::Bit64).map(|i| i.size), Ok(15));
}

#[test]
fn immediate_beyond_max_length() {
    let mut bytes = [0x66u8; 17];
    bytes[14] = 0xb8;
    assert_eq!(decode(&bytes, Mode::Bit64), Err(Error::TooLong));
}

#[test]
fn trailing_bytes_ignored() {
    let insn = decode(b"\xc3\xcc\xcc\xcc", Mode::Bit64).expect("Could not decode");
    assert_eq!(insn.size, 1);
    assert_eq!(insn.kind, Some(Kind::ret_c3));
}

#[test]
fn idempotent() {
    let bytes = b"\x66\x0f\x84\x00\x01\x00\x00";
    let ild = Ild::new(bytes, Mode::Bit64);
    let first = ild.length_decode().map(|d| d.classify());
    let second = ild.length_decode().map(|d| d.classify());
    assert_eq!(first, second);
    assert_eq!(bytes, b"\x66\x0f\x84\x00\x01\x00\x00");
}

#[test]
fn decoded_fields() {
    let decoded = Ild::new(b"\x66\x0f\x38\x00\xc1", Mode::Bit64)
        .length_decode()
        .expect("Could not decode");
    assert_eq!(decoded.map(), ild::Map::ThreeByte38);
    assert_eq!(decoded.opcode(), 0x00);
    assert_eq!(decoded.modrm(), Some(0xc1));
    assert_eq!(decoded.mode(), Mode::Bit64);
}

#[test]
fn branch_target() {
    let jmp = decode(b"\xeb\xfe", Mode::Bit64).expect("Could not decode");
    assert_eq!(jmp.branch_target(0x1000), Some(0x1000));

    let call = decode(b"\xe8\x00\x00\x00\x00", Mode::Bit64).expect("Could not decode");
    assert_eq!(call.branch_target(0xffff_ffff_ffff_fff0), Some(0xffff_ffff_ffff_fff5));

    let ret = decode(b"\xc3", Mode::Bit64).expect("Could not decode");
    assert_eq!(ret.branch_target(0x1000), None);
}

#[test]
fn branch_target_wraps_outside_64bit() {
    let jmp = decode(b"\xe9\x20\x00\x00\x00", Mode::Bit32).expect("Could not decode");
    assert_eq!(jmp.branch_target(0xffff_fff0), Some(0x15));

    let jmp = decode(b"\x66\xe9\x20\x00\x00\x00", Mode::Bit16).expect("Could not decode");
    assert_eq!(jmp.branch_target(0xffff_fff0), Some(0x16));
}

#[test]
fn branch_target_wraps_16bit_operand_size() {
    let jmp = decode(b"\xe9\x20\x00", Mode::Bit16).expect("Could not decode");
    assert!(!jmp.osz);
    assert_eq!(jmp.branch_target(0xfff0), Some(0x13));

    let call = decode(b"\x66\xe8\x10\x00", Mode::Bit32).expect("Could not decode");
    assert!(call.osz);
    assert_eq!(call.size, 4);
    assert_eq!(call.branch_target(0x1_fff0), Some(0x0004));

    let jcc = decode(b"\x75\xfd", Mode::Bit16).expect("Could not decode");
    assert_eq!(jcc.branch_target(0x0001), Some(0x0000));
    assert_eq!(jcc.branch_target(0x0000), Some(0xffff));
}

#[test]
fn display() {
    use alloc::string::ToString;

    assert_eq!(Kind::jmp_e9(-0x6a0).to_string(), "jmp -0x6a0");
    assert_eq!(Kind::jcc(0x10).to_string(), "jcc +0x10");
    assert_eq!(Kind::mov_cr3.to_string(), "mov cr3");
    let nop = decode(b"\x90", Mode::Bit64).expect("Could not decode");
    assert_eq!(nop.to_string(), "other (1 bytes)");
}
