// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Utilities for reading and writing packet fields

/// Read a little endian integer of up to 8 bytes
pub fn read_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// Write a little endian integer filling the given bytes
///
/// Bits of `value` not fitting into `bytes` are discarded.
pub fn write_le(value: u64, bytes: &mut [u8]) {
    bytes
        .iter_mut()
        .zip(value.to_le_bytes())
        .for_each(|(dst, src)| *dst = src);
}

/// Check whether a value fits into the given number of bytes
pub fn fits_bytes(value: u64, bytes: usize) -> bool {
    value.checked_shr(8 * bytes as u32).unwrap_or(0) == 0
}

/// Compute the number of bytes of a CYC packet for the given value
pub fn cyc_size(value: u64) -> usize {
    let bits = (u64::BITS - value.leading_zeros()) as usize;
    1 + bits.saturating_sub(5).div_ceil(7)
}
