// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

extern crate alloc;

use alloc::vec::Vec;

use super::*;

use crate::image::{Segment, error::SegmentError};
use crate::packet::ip::{Compression, Ip};
use crate::packet::payload::Pip;

/// Input for building a trace
enum Step {
    Raw(Packet),
    At(fn(Ip) -> Packet, u64),
}

use Step::{At, Raw};

fn encode(steps: &[Step]) -> Vec<u8> {
    encode_with(steps, Some(Compression::Full))
}

/// Encode a trace, choosing the narrowest IP compression if none is given
fn encode_with(steps: &[Step], compression: Option<Compression>) -> Vec<u8> {
    let mut buffer = [0u8; 256];
    let mut encoder = packet::builder().encoder(buffer.as_mut());
    for step in steps {
        match step {
            Raw(packet) => encoder.encode(packet),
            At(make, address) => encoder.encode_ip(*make, *address, compression),
        }
        .expect("Could not encode");
    }
    let (buffer, len) = encoder.finish();
    buffer[..len].to_vec()
}

fn psb_plus(ip: u64) -> [Step; 3] {
    [Raw(Packet::Psb), At(Packet::Fup, ip), Raw(Packet::Psbend)]
}

fn trace_with<'d>(trace: &'d [u8], code: &'d [u8]) -> Tracer<'d, Segment<&'d [u8]>> {
    Tracer::new(packet::builder().decoder(trace), Segment::new(0x1000, code))
}

fn run(trace: &[u8], code: &[u8]) -> Vec<Result<Item, Error<SegmentError>>> {
    trace_with(trace, code).collect()
}

fn insn(ip: u64, code: &[u8]) -> Result<Item, Error<SegmentError>> {
    let insn = instruction::decode(code, Mode::Bit64).expect("Could not decode");
    Ok(Item::new(ip, insn.into()))
}

fn event(ip: u64, kind: Kind) -> Result<Item, Error<SegmentError>> {
    Ok(Item::new(ip, kind))
}

#[test]
fn empty_trace() {
    assert_eq!(run(&[], b"\x90"), []);
}

#[test]
fn psb_only() {
    let trace = encode(&[Raw(Packet::Psb), Raw(Packet::Psbend)]);
    assert_eq!(run(&trace, b"\x90"), []);
}

#[test]
fn conditional_loop() {
    // 0x1000: nop; 0x1001: jnz 0x1000; 0x1003: ret
    let code = b"\x90\x75\xfd\xc3";
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::Tnt8(Tnt::new(3, 0b110))));
    steps.push(At(Packet::TipPgd, 0x5000));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\x90"),
            insn(0x1001, b"\x75\xfd"),
            insn(0x1000, b"\x90"),
            insn(0x1001, b"\x75\xfd"),
            insn(0x1000, b"\x90"),
            insn(0x1001, b"\x75\xfd"),
            insn(0x1003, b"\xc3"),
            event(0x5000, Kind::Disabled),
        ]
    );
}

#[test]
fn long_tnt() {
    // 0x1000: jz 0x1000; 0x1002: ret
    let code = b"\x74\xfe\xc3";
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::Tnt64(Tnt::new(10, 0b11_1111_1110))));
    let trace = encode(&steps);

    let items: Vec<_> = run(&trace, code)
        .into_iter()
        .map(|i| i.expect("Unexpected error"))
        .filter(|i| i.instruction().is_some())
        .map(|i| i.ip())
        .collect();
    assert_eq!(items.len(), 11);
    assert!(items[..10].iter().all(|ip| *ip == 0x1000));
    assert_eq!(items[10], 0x1002);
}

#[test]
fn indirect_call_and_returns() {
    // 0x1000: call rax; 0x1002: ret; 0x1008: nop; 0x1009: ret
    let code = b"\xff\xd0\xc3\x90\x90\x90\x90\x90\x90\xc3";
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(At(Packet::Tip, 0x1008));
    steps.push(At(Packet::Tip, 0x1002));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\xff\xd0"),
            insn(0x1008, b"\x90"),
            insn(0x1009, b"\xc3"),
            insn(0x1002, b"\xc3"),
        ]
    );
}

#[test]
fn direct_call() {
    // 0x1000: call 0x1008; 0x1005: ret; 0x1008: ret
    let code = b"\xe8\x03\x00\x00\x00\xc3\x90\x90\xc3";
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(At(Packet::Tip, 0x1005));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\xe8\x03\x00\x00\x00"),
            insn(0x1008, b"\xc3"),
            insn(0x1005, b"\xc3"),
        ]
    );
}

#[test]
fn enable_and_async_disable() {
    let code = b"\x90\x90\xc3";
    let trace = encode(&[
        At(Packet::TipPge, 0x1000),
        At(Packet::Fup, 0x1001),
        Raw(Packet::TipPgd(Ip::suppressed())),
    ]);

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\x90"),
            event(0x1001, Kind::Disabled),
        ]
    );
}

#[test]
fn async_transfer() {
    let code = b"\x90\x90\x90\xc3";
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(At(Packet::Fup, 0x1002));
    steps.push(At(Packet::Tip, 0x1003));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\x90"),
            insn(0x1001, b"\x90"),
            insn(0x1003, b"\xc3"),
        ]
    );
}

#[test]
fn overflow() {
    let code = b"\x90\x90\x90\xc3";
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::Ovf));
    steps.push(At(Packet::Fup, 0x1002));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            event(0x1000, Kind::Overflow),
            insn(0x1002, b"\x90"),
            insn(0x1003, b"\xc3"),
        ]
    );
}

#[test]
fn paging() {
    let pip = Pip {
        cr3: 0x1234_5000,
        nr: false,
    };
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::Pip(pip)));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, b"\x90\xc3"),
        [
            event(0x1000, Kind::Enabled),
            event(0x1000, Kind::Paging(pip)),
            insn(0x1000, b"\x90"),
            insn(0x1001, b"\xc3"),
        ]
    );
}

#[test]
fn timing_packets_ignored() {
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::Pad));
    steps.push(Raw(Packet::Tsc(0x1234)));
    steps.push(Raw(Packet::Cbr(0x20)));
    steps.push(Raw(Packet::Tnt8(Tnt::new(1, 0b1))));
    let trace = encode(&steps);

    // 0x1000: jz 0x1003; 0x1002: nop; 0x1003: ret
    assert_eq!(
        run(&trace, b"\x74\x01\x90\xc3"),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\x74\x01"),
            insn(0x1003, b"\xc3"),
        ]
    );
}

#[test]
fn mode_exec() {
    // mov eax, [moffs32]; ret
    let code = b"\xa1\x00\x00\x00\x00\xc3";
    let trace = encode(&[
        Raw(Packet::Psb),
        Raw(Packet::ModeExec(Mode::Bit32)),
        At(Packet::Fup, 0x1000),
        Raw(Packet::Psbend),
    ]);

    let mut tracer = trace_with(&trace, code);
    let ips: Vec<_> = tracer
        .by_ref()
        .filter_map(Result::ok)
        .filter(|i| i.instruction().is_some())
        .map(|i| i.ip())
        .collect();
    assert_eq!(ips, [0x1000, 0x1005]);
    assert_eq!(tracer.mode(), Mode::Bit32);
}

#[test]
fn tnt_without_ip() {
    let mut steps = alloc::vec![Raw(Packet::Tnt8(Tnt::new(2, 0b11)))];
    steps.extend(psb_plus(0x1000));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, b"\xc3"),
        [event(0x1000, Kind::Enabled), insn(0x1000, b"\xc3")]
    );
}

#[test]
fn unexpected_tnt() {
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::ModeExec(Mode::Bit64)));
    steps.push(Raw(Packet::Tnt8(Tnt::new(1, 0b1))));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, b"\xc3"),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\xc3"),
            Err(Error::UnexpectedTnt(0x1000)),
        ]
    );
}

#[test]
fn unexpected_tip() {
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::Tnt8(Tnt::new(1, 0b1))));
    steps.push(At(Packet::Tip, 0x2000));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, b"\xc3"),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\xc3"),
            Err(Error::UnexpectedTip(0x1000)),
        ]
    );
}

#[test]
fn unresolvable_branch() {
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(At(Packet::Tip, 0x2000));
    let trace = encode(&steps);

    assert_eq!(
        run(&trace, b"\x74\x00"),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\x74\x00"),
            Err(Error::UnresolvableBranch(0x1000)),
        ]
    );
}

#[test]
fn fetch_miss() {
    let trace = encode(&psb_plus(0x3000));
    assert_eq!(
        run(&trace, b"\x90"),
        [
            event(0x3000, Kind::Enabled),
            Err(Error::CannotFetch(SegmentError::NotCovered(0x3000), 0x3000)),
        ]
    );
}

#[test]
fn truncated_instruction() {
    let trace = encode(&psb_plus(0x1000));
    assert_eq!(
        run(&trace, b"\xe8\x00"),
        [
            event(0x1000, Kind::Enabled),
            Err(Error::Instruction(instruction::Error::Truncated, 0x1000)),
        ]
    );
}

#[test]
fn resync_after_bad_packet() {
    let code = b"\x90\x90\x90\xc3";
    let mut trace = encode(&psb_plus(0x1000));
    trace.push(0x05);
    trace.extend(encode(&psb_plus(0x1002)));

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            Err(Error::Packet(packet::Error::BadOpcode(0x05))),
            event(0x1002, Kind::Enabled),
            insn(0x1002, b"\x90"),
            insn(0x1003, b"\xc3"),
        ]
    );
}

#[test]
fn truncated_trace() {
    let mut trace = encode(&psb_plus(0x1000));
    trace.push(0xcd);

    let items = run(&trace, b"\x90\xc3");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], event(0x1000, Kind::Enabled));
    assert!(matches!(
        items[1],
        Err(Error::Packet(packet::Error::Truncated(_)))
    ));
}

#[test]
fn repeated_return_target() {
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(At(Packet::Tip, 0x1000));
    steps.push(At(Packet::TipPgd, 0x5000));
    let trace = encode_with(&steps, None);
    assert_eq!(trace[21], 0x0d);

    assert_eq!(
        run(&trace, b"\xc3"),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\xc3"),
            insn(0x1000, b"\xc3"),
            event(0x5000, Kind::Disabled),
        ]
    );
}

#[test]
fn async_transfer_at_last_ip() {
    // 0x1000: jmp rax; 0x1002: nop; 0x1003: nop; 0x1004: ret
    let code = b"\xff\xe0\x90\x90\xc3";
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(At(Packet::Tip, 0x1002));
    steps.push(At(Packet::Fup, 0x1002));
    steps.push(At(Packet::Tip, 0x1004));
    let trace = encode_with(&steps, None);

    assert_eq!(
        run(&trace, code),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\xff\xe0"),
            insn(0x1004, b"\xc3"),
        ]
    );
}

#[test]
fn empty_tnt_at_end() {
    let mut steps: Vec<_> = psb_plus(0x1000).into();
    steps.push(Raw(Packet::Tnt8(Tnt::new(0, 0))));
    let trace = encode(&steps);
    assert_eq!(trace.last(), Some(&0x02));

    assert_eq!(
        run(&trace, b"\x90\xc3"),
        [
            event(0x1000, Kind::Enabled),
            insn(0x1000, b"\x90"),
            insn(0x1001, b"\xc3"),
        ]
    );
}

#[test]
fn current_ip() {
    let trace = encode(&psb_plus(0x1000));
    let mut tracer = trace_with(&trace, b"\x90\x90");
    assert_eq!(tracer.ip(), None);
    assert_eq!(tracer.next(), Some(event(0x1000, Kind::Enabled)));
    assert_eq!(tracer.ip(), Some(0x1000));
    assert_eq!(tracer.next(), Some(insn(0x1000, b"\x90")));
    assert_eq!(tracer.ip(), Some(0x1001));
}
