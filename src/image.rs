// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Code images of the traced program
//!
//! Reconstructing the control flow requires knowledge about the program being
//! traced. This module defines the [`Image`] trait used by the
//! [`Tracer`][crate::flow::Tracer] for fetching the raw bytes of
//! [`Instruction`][crate::instruction::Instruction]s as well as a number of
//! types implementing the trait. These include:
//!
//! * [basic] [`Image`]s such as a [`Segment`] of code at a fixed address,
//! * [combinators] that allow tracing multiple programs or program parts such
//!   as a kernel and an appliction,
//! * modifiers such as [`Offset`] that are usually created through provided fns
//!   of the [`Image`] trait and
//! * feature-dependent [`Image`]s, e.g. for using ELF files as [`Image`]s.
//!
//! # Combining [`Image`]s
//!
//! Usually, [`Image`]s used in [combinators] all need to agree on the
//! [`Image::Error`] type. Combinators such as [`Multi`] in particular also
//! require the [`Image`]s themselves to be of the same type. If the `alloc`
//! feature is enabled, the error type may be erased through the provided method
//! [`Image::boxed`].
//!
//! # Example
//!
//! The following constructs an [`Image`] from a kernel and a library.
//!
//! ```
//! use ptflow::image::{Image, Multi, Segment};
//!
//! let kernel = b"\x0f\x01\xc1\xc3";
//! let library = b"\xe8\x00\x00\x00\x00\xc3";
//! let mut image = Multi::new([
//!     Segment::new(0xffff_8000_0000_0000, kernel.as_slice()),
//!     Segment::new(0x7f00_0000_0000, library.as_slice()),
//! ]);
//! assert_eq!(image.fetch(0x7f00_0000_0005, 15), Ok(b"\xc3".as_slice()));
//! assert_eq!(image.fetch(0xffff_8000_0000_0000, 2), Ok(b"\x0f\x01".as_slice()));
//! ```

pub mod basic;
#[cfg(feature = "alloc")]
pub mod boxed;
pub mod combinators;
#[cfg(feature = "elf")]
pub mod elf;
pub mod error;


#[cfg(feature = "alloc")]
use alloc::boxed::Box;

pub use basic::{Empty, Segment};
pub use combinators::Multi;

use error::Miss;

/// A source of code bytes of the traced program
///
/// See the [module level][self] documentation for more details.
pub trait Image {
    /// Error type returned by [`fetch`][Self::fetch]
    type Error;

    /// Fetch code at the given address
    ///
    /// Returns at most `max_bytes` bytes of contiguous code starting at
    /// `address`. Fewer bytes are returned if the code ends before. An address
    /// not covered by the image yields an error.
    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error>;

    /// "Move" this image by the given offset
    ///
    /// See [`Offset`] for more details.
    fn with_offset(self, offset: u64) -> Offset<Self>
    where
        Self: Sized,
        Self::Error: Miss,
    {
        Offset {
            inner: self,
            offset,
        }
    }

    /// Box this image for dynamic dispatching
    ///
    /// This allows combining images of different types with (originally)
    /// different [`Error`][Self::Error] types in [combinators].
    #[cfg(feature = "alloc")]
    fn boxed<'a>(self) -> boxed::Image<'a>
    where
        Self: Sized + 'a,
        Self::Error: error::MaybeMissError + 'static,
    {
        Box::new(boxed::BoxedError::new(self))
    }
}

/// [`Image`] implementation for a tuple of two images
///
/// This impl allows combining [`Image`]s as long as they agree on their error
/// type. If the first [`Image`] returns a "miss", the second one is consulted.
impl<A, B, E> Image for (A, B)
where
    A: Image<Error = E>,
    B: Image<Error = E>,
    E: error::MaybeMiss,
{
    type Error = E;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        use error::MaybeMiss;

        let res = self.0.fetch(address, max_bytes);
        if res.is_miss() {
            self.1.fetch(address, max_bytes)
        } else {
            res
        }
    }
}

impl<I> Image for Option<I>
where
    I: Image,
    I::Error: Miss,
{
    type Error = I::Error;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        match self {
            Some(i) => i.fetch(address, max_bytes),
            None => Miss::miss(address),
        }
    }
}

impl<I: Image + ?Sized> Image for &mut I {
    type Error = I::Error;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        I::fetch(self, address, max_bytes)
    }
}

#[cfg(feature = "alloc")]
impl<I: Image + ?Sized> Image for Box<I> {
    type Error = I::Error;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        I::fetch(self.as_mut(), address, max_bytes)
    }
}

#[cfg(feature = "either")]
impl<L, R, E> Image for either::Either<L, R>
where
    L: Image<Error = E>,
    R: Image<Error = E>,
{
    type Error = E;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        either::for_both!(self, i => i.fetch(address, max_bytes))
    }
}

/// [`Image`] moved by a fixed offset
///
/// Accesses will be mapped by subtracting the fixed offset from the address.
/// Accesses to addresses lower than the offset will result in a [miss][Miss].
#[derive(Copy, Clone, Debug)]
pub struct Offset<I> {
    inner: I,
    offset: u64,
}

impl<I> Offset<I> {
    /// Retrieve the inner [`Image`]
    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// Retrieve the offset
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<I> Image for Offset<I>
where
    I: Image,
    I::Error: Miss,
{
    type Error = I::Error;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        use error::MaybeMiss;

        // Misses report the address as seen by the tracer
        match address.checked_sub(self.offset) {
            Some(a) => self
                .inner
                .fetch(a, max_bytes)
                .map_err(|e| if e.is_miss() { Miss::miss(address) } else { e }),
            None => Miss::miss(address),
        }
    }
}
