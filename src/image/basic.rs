// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Basic [`Image`]s

use super::Image;
use super::error::{NoCode, SegmentError};

/// [`Image`] consisting of a single segment of code
///
/// This [`Image`] serves a single buffer as code located at a fixed base
/// address.
///
/// # Example
///
/// ```
/// use ptflow::image::{Image, Segment};
///
/// let mut image = Segment::new(0x1000, b"\x74\x01\x90\xc3");
/// assert_eq!(image.fetch(0x1002, 15), Ok(b"\x90\xc3".as_ref()));
/// assert_eq!(image.fetch(0x1000, 1), Ok(b"\x74".as_ref()));
/// assert!(image.fetch(0x1004, 15).is_err());
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Segment<T: AsRef<[u8]>> {
    base: u64,
    data: T,
}

impl<T: AsRef<[u8]>> Segment<T> {
    /// Create a new [`Image`] for code located at `base`
    pub fn new(base: u64, data: T) -> Self {
        Self { base, data }
    }

    /// Retrieve the base address
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Check whether the segment covers the given address
    pub fn contains(&self, address: u64) -> bool {
        address
            .checked_sub(self.base)
            .and_then(|o| usize::try_from(o).ok())
            .is_some_and(|o| o < self.data.as_ref().len())
    }
}

impl<T: AsRef<[u8]>> Image for Segment<T> {
    type Error = SegmentError;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        let offset = address
            .checked_sub(self.base)
            .ok_or(SegmentError::NotCovered(address))?;
        let offset = usize::try_from(offset).map_err(|_| SegmentError::Unaddressable(address))?;
        let code = self
            .data
            .as_ref()
            .get(offset..)
            .filter(|c| !c.is_empty())
            .ok_or(SegmentError::NotCovered(address))?;
        Ok(code.get(..max_bytes).unwrap_or(code))
    }
}

/// An [`Image`] that does not contain any code
///
/// Every fetch results in a miss.
#[derive(Copy, Clone, Default, Debug)]
pub struct Empty;

impl Image for Empty {
    type Error = NoCode;

    fn fetch(&mut self, address: u64, _: usize) -> Result<&[u8], Self::Error> {
        Err(NoCode(address))
    }
}
