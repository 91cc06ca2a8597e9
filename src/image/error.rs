// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Errors of [`Image`][super::Image]s and traits for classifying them
//!
//! Fetching code fails for one of two reasons: either the address is simply
//! not part of the image, or something went wrong while retrieving code that
//! should be there. Only the former is recoverable by consulting another
//! image, which is what [combinators][super::combinators] do. The traits in
//! this module allow them to tell the difference.

#[cfg(feature = "alloc")]
use alloc::boxed::Box;
use core::fmt;

/// Classification of errors signalling an address outside an image
pub trait MaybeMiss {
    /// Check whether this value signals that the address is not covered
    fn is_miss(&self) -> bool;
}

impl<T, E: MaybeMiss> MaybeMiss for Result<T, E> {
    fn is_miss(&self) -> bool {
        self.as_ref().err().is_some_and(E::is_miss)
    }
}

#[cfg(feature = "alloc")]
impl<E: MaybeMiss + ?Sized> MaybeMiss for Box<E> {
    fn is_miss(&self) -> bool {
        E::is_miss(self.as_ref())
    }
}

#[cfg(feature = "either")]
impl<L: MaybeMiss, R: MaybeMiss> MaybeMiss for either::Either<L, R> {
    fn is_miss(&self) -> bool {
        either::for_both!(self, e => e.is_miss())
    }
}

/// A [`MaybeMiss`] which can express a miss for an arbitrary address
pub trait Miss: MaybeMiss {
    /// Create a value signalling that `address` is not covered
    fn miss(address: u64) -> Self;
}

impl<T, E: Miss> Miss for Result<T, E> {
    fn miss(address: u64) -> Self {
        Err(E::miss(address))
    }
}

#[cfg(feature = "alloc")]
impl Miss for Box<dyn MaybeMissError> {
    fn miss(address: u64) -> Self {
        Box::new(NoCode(address))
    }
}

/// Object safe combination of [`MaybeMiss`] and [`Error`][core::error::Error]
///
/// This is the error type of [boxed][super::boxed] images.
pub trait MaybeMissError: MaybeMiss + core::error::Error + Sync + Send {}

impl<T: MaybeMiss + core::error::Error + Sync + Send + ?Sized> MaybeMissError for T {}

/// Error of a [`Segment`][super::Segment]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentError {
    /// The address lies outside the segment
    NotCovered(u64),
    /// The address lies beyond what the host can index
    Unaddressable(u64),
}

impl Miss for SegmentError {
    fn miss(address: u64) -> Self {
        Self::NotCovered(address)
    }
}

impl MaybeMiss for SegmentError {
    fn is_miss(&self) -> bool {
        matches!(self, Self::NotCovered(_))
    }
}

impl core::error::Error for SegmentError {}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCovered(a) => write!(f, "{a:#x} is not covered by the segment"),
            Self::Unaddressable(a) => write!(f, "{a:#x} cannot be addressed on this host"),
        }
    }
}

/// Miss of an image without any code
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NoCode(pub u64);

impl Miss for NoCode {
    fn miss(address: u64) -> Self {
        Self(address)
    }
}

impl MaybeMiss for NoCode {
    fn is_miss(&self) -> bool {
        true
    }
}

impl core::error::Error for NoCode {}

impl fmt::Display for NoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no code at {:#x}", self.0)
    }
}
