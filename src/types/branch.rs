// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Branch map utilities

use core::fmt;

use crate::packet::payload::Tnt;

/// A record of conditional branches that are taken or not taken
///
/// The map acts as a FIFO: outcomes are appended as they are decoded from TNT
/// packets and removed oldest first while walking the traced code.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct Map {
    count: u8,
    map: u64,
}

impl Map {
    /// Maximum number of branches a branch map can hold.
    pub const MAX_BRANCHES: u32 = u64::BITS;

    /// Create a branch map from the bits of a [`Tnt`] payload
    ///
    /// In TNT payloads, the most significant valid bit is the oldest outcome.
    /// Returns `None` if the payload claims more bits than a map can hold.
    pub fn from_tnt(tnt: Tnt) -> Option<Self> {
        let count = tnt.size();
        if u32::from(count) > Self::MAX_BRANCHES {
            return None;
        }
        let mut map = Self::default();
        (0..count)
            .rev()
            .try_for_each(|i| map.push_taken(tnt.bits() >> i & 1 != 0))
            .ok()?;
        Some(map)
    }

    /// Remove the oldest branch information and return it
    ///
    /// Returns `Some(true)` for a taken branch.
    pub fn pop_taken(&mut self) -> Option<bool> {
        let count = self.count.checked_sub(1)?;
        let res = self.map & 1 != 0;

        self.map >>= 1;
        self.count = count;

        Some(res)
    }

    /// Push a new branch information
    pub fn push_taken(&mut self, taken: bool) -> Result<(), Error> {
        let bit = 1u64
            .checked_shl(self.count.into())
            .ok_or(Error::TooManyBranches)?;
        if taken {
            self.map |= bit;
        } else {
            self.map &= !bit;
        }

        self.count += 1;
        Ok(())
    }

    /// Append another branch map to this one
    ///
    /// The branches from the other map are considered newer than the existing
    /// ones.
    pub fn append(&mut self, other: Self) -> Result<(), Error> {
        let total = self
            .count
            .checked_add(other.count)
            .filter(|c| u32::from(*c) <= Self::MAX_BRANCHES)
            .ok_or(Error::TooManyBranches)?;
        self.map |= other.map.checked_shl(self.count.into()).unwrap_or(0);
        self.count = total;
        Ok(())
    }

    /// Retrieve the number of branchs in the map
    pub fn count(&self) -> u8 {
        self.count
    }

    /// Check whether the map holds no branches
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Retrieve the raw contents of the map
    ///
    /// The lowest valued bit corresponds to the oldest branch. Set bits
    /// represent taken branches, unset bits represent branches not taken.
    pub fn raw_map(&self) -> u64 {
        self.map
    }
}

/// Errors produced by [`Map`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Too many branches
    ///
    /// The operation could not be preformed because the result would exceed the
    /// maximum number of branches a branch map may hold.
    TooManyBranches,
}

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TooManyBranches => write!(f, "Too many branches"),
        }
    }
}
