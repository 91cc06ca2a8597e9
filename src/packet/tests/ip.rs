// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! IP compression tests
use super::*;

use crate::packet::ip::LastIp;

const ADDRESSES: [u64; 12] = [
    0,
    0x1000,
    0xffff,
    0x1_0000,
    0xdead_beef,
    0x7fff_ffff_ffff,
    0x8000_0000_0000,
    0x0000_7fff_1234_5600,
    0x1234_5678_9abc_def0,
    0xffff_8000_0000_0000,
    0xffff_ffff_8000_1000,
    u64::MAX,
];

fn context(address: u64) -> LastIp {
    let mut last_ip = LastIp::new();
    last_ip.expand(&Ip::new(Compression::Full, address));
    last_ip
}

#[test]
fn auto_compression_roundtrip() {
    for last in ADDRESSES {
        let last_ip = context(last);
        for address in ADDRESSES {
            let ip = last_ip.compress(address, None).expect("Could not compress");
            assert_eq!(last_ip.resolve(&ip), address, "{address:#x} after {last:#x}");
        }
    }
}

#[test]
fn auto_compression_minimal() {
    for last in ADDRESSES {
        let last_ip = context(last);
        for address in ADDRESSES {
            let ip = last_ip.compress(address, None).expect("Could not compress");
            let size = ip.compression().payload_size();
            Compression::ALL
                .into_iter()
                .filter(|c| c.payload_size() < size)
                .for_each(|c| {
                    let shorter = Ip::new(c, address & c.mask());
                    assert_ne!(last_ip.resolve(&shorter), address, "{c} for {address:#x}");
                });
        }
    }
}

#[test]
fn explicit_compression() {
    let last_ip = context(0xffff_8000_0000_1000);
    assert_eq!(
        last_ip.compress(0xffff_8000_1234_5678, Some(Compression::Update32)),
        Ok(Ip::new(Compression::Update32, 0x1234_5678))
    );
    assert_eq!(
        last_ip.compress(0xffff_8000_1234_5678, Some(Compression::Update16)),
        Err(Error::OutOfRange)
    );
    assert_eq!(
        last_ip.compress(0x7fff_0000_0000, Some(Compression::Sext48)),
        Ok(Ip::new(Compression::Sext48, 0x7fff_0000_0000))
    );
    assert_eq!(
        last_ip.compress(0x0001_8000_0000_0000, Some(Compression::Sext48)),
        Err(Error::OutOfRange)
    );
    assert_eq!(
        last_ip.compress(0xffff_8000_0000_1000, Some(Compression::Suppressed)),
        Ok(Ip::suppressed())
    );
}

#[test]
fn sign_extension() {
    let last_ip = LastIp::new();
    assert_eq!(
        last_ip.compress(0xffff_8000_0000_0000, None),
        Ok(Ip::new(Compression::Sext48, 0x8000_0000_0000))
    );
    assert_eq!(
        last_ip.resolve(&Ip::new(Compression::Sext48, 0xffff_ffff_ffff)),
        u64::MAX
    );
}

#[test]
fn expand_updates_context() {
    let mut last_ip = context(0x1234_5678_9abc_def0);
    assert_eq!(last_ip.expand(&Ip::suppressed()), 0x1234_5678_9abc_def0);
    assert_eq!(
        last_ip.expand(&Ip::new(Compression::Update16, 0x1111)),
        0x1234_5678_9abc_1111
    );
    assert_eq!(
        last_ip.expand(&Ip::new(Compression::Update48, 0x2222_3333_4444)),
        0x1234_2222_3333_4444
    );
    assert_eq!(last_ip.get(), 0x1234_2222_3333_4444);
    last_ip.reset();
    assert_eq!(last_ip.get(), 0);
}

#[test]
fn reserved_codes() {
    assert_eq!(Compression::from_code(5), None);
    assert_eq!(Compression::from_code(7), None);
    Compression::ALL
        .into_iter()
        .for_each(|c| assert_eq!(Compression::from_code(c.code()), Some(c)));
}
