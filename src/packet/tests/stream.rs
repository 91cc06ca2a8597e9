// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet sequence tests
use super::*;

const PSB: &[u8; 16] = b"\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82\x02\x82";

#[test]
fn psb_tip_tnt() {
    let tnt = Packet::Tnt8(Tnt::new(5, 0b10110));

    let mut buffer = [0u8; 64];
    let mut encoder = Builder::new().encoder(buffer.as_mut());
    assert_eq!(encoder.encode(&Packet::Psb), Ok(16));
    assert_eq!(encoder.encode_ip(Packet::Tip, 0x0000_7fff_1234_5600, None), Ok(7));
    assert_eq!(encoder.encode(&tnt), Ok(1));
    let (buffer, len) = encoder.finish();
    assert_eq!(len, 24);
    assert_eq!(&buffer[..16], PSB);
    assert_eq!(&buffer[16..24], b"\x6d\x00\x56\x34\x12\xff\x7f\x6c");

    let mut decoder = Builder::new().decoder(&buffer[..len]);
    assert_eq!(decoder.decode(), Ok((Packet::Psb, 16)));
    assert_eq!(
        decoder.decode(),
        Ok((Packet::Tip(Ip::new(Compression::Sext48, 0x7fff_1234_5600)), 7))
    );
    assert_eq!(decoder.decode(), Ok((tnt, 1)));
    assert_eq!(decoder.byte_pos(), 24);
    assert_eq!(decoder.last_ip(), 0x0000_7fff_1234_5600);
    assert_eq!(decoder.decode(), Err(truncated(1)));
}

#[test]
fn ip_context_follows_stream() {
    let addresses = [
        0xffff_ffff_8100_0000,
        0xffff_ffff_8100_1234,
        0xffff_ffff_8200_0000,
        0x0000_5555_0000_0000,
        0x0000_5555_0000_0000,
    ];

    let mut buffer = [0u8; 64];
    let mut encoder = Builder::new().encoder(buffer.as_mut());
    addresses.iter().for_each(|a| {
        encoder
            .encode_ip(Packet::Fup, *a, None)
            .expect("Could not encode");
    });
    let (buffer, len) = encoder.finish();
    // sext-48, update-16, update-32, sext-48, suppressed
    assert_eq!(len, 7 + 3 + 5 + 7 + 1);

    let mut decoder = Builder::new().decoder(&buffer[..len]);
    for address in addresses {
        let (packet, _) = decoder.decode().expect("Could not decode");
        assert!(matches!(packet, Packet::Fup(_)));
        assert_eq!(decoder.last_ip(), address);
    }
}

#[test]
fn psb_resets_context() {
    let mut buffer = [0u8; 64];
    let mut encoder = Builder::new().encoder(buffer.as_mut());
    encoder
        .encode_ip(Packet::Fup, 0xffff_ffff_8100_0000, None)
        .expect("Could not encode");
    encoder.encode(&Packet::Psb).expect("Could not encode");
    assert_eq!(encoder.last_ip(), 0);
    assert_eq!(encoder.encode_ip(Packet::Tip, 0x1000, None), Ok(3));
    let (buffer, len) = encoder.finish();

    let mut decoder = Builder::new().decoder(&buffer[..len]);
    decoder.decode().expect("Could not decode");
    assert_eq!(decoder.last_ip(), 0xffff_ffff_8100_0000);
    decoder.decode().expect("Could not decode");
    assert_eq!(decoder.last_ip(), 0);
    decoder.decode().expect("Could not decode");
    assert_eq!(decoder.last_ip(), 0x1000);
}

#[test]
fn configured_compression() {
    let mut buffer = [0u8; 16];
    let mut encoder = Builder::new()
        .with_compression(Some(Compression::Full))
        .encoder(buffer.as_mut());
    assert_eq!(encoder.encode_ip(Packet::TipPge, 0x1000, None), Ok(9));
    assert_eq!(
        encoder.encode_ip(Packet::TipPgd, 0x1000, Some(Compression::Suppressed)),
        Ok(1)
    );
}

#[test]
fn sync_forward() {
    let mut data = [0u8; 40];
    data[..3].copy_from_slice(b"\x99\x03\x05");
    data[3..19].copy_from_slice(PSB);
    data[19..21].copy_from_slice(b"\x02\x23");
    data[21..37].copy_from_slice(PSB);
    data[37..].copy_from_slice(b"\x02\x23\x19");

    let mut decoder = Builder::new().decoder(&data);
    assert_eq!(decoder.decode(), Err(Error::BadPacket));
    assert_eq!(decoder.sync_forward(), Some(3));
    assert_eq!(decoder.byte_pos(), 3);
    assert_eq!(decoder.sync_forward(), Some(21));
    assert_eq!(decoder.sync_forward(), None);
    assert_eq!(decoder.byte_pos(), 21);
    assert_eq!(decoder.decode(), Ok((Packet::Psb, 16)));
    assert_eq!(decoder.sync_forward(), None);
    assert_eq!(decoder.decode(), Ok((Packet::Psbend, 2)));
    assert_eq!(decoder.decode(), Err(truncated(7)));
}

#[test]
fn sync_forward_from_psb() {
    let mut data = [0u8; 34];
    data[..16].copy_from_slice(PSB);
    data[16..18].copy_from_slice(b"\x02\x23");
    data[18..].copy_from_slice(PSB);

    let mut decoder = Builder::new().decoder(&data);
    assert_eq!(decoder.decode(), Ok((Packet::Psb, 16)));
    assert_eq!(decoder.sync_forward(), Some(18));
    assert_eq!(decoder.decode(), Ok((Packet::Psb, 16)));
    assert_eq!(decoder.bytes_left(), 0);
}
