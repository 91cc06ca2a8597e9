// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! [`Image`][super::Image]s requiring [`Box`] and other types from [`alloc`]

use alloc::boxed::Box;

use super::error::MaybeMissError;

/// Boxed, dynamically dispatched [`Image`][super::Image]
pub type Image<'a> = Box<dyn super::Image<Error = Box<dyn MaybeMissError>> + 'a>;

/// [`Image`][super::Image] returning a boxed, dynamically dispatched `Error`
///
/// This adapter boxes and type-erases errors returned by the wrapped image.
/// This allows dynamically dispatching images with differrent error types.
#[derive(Copy, Clone, Debug)]
pub struct BoxedError<I> {
    inner: I,
}

impl<I> BoxedError<I> {
    /// Create a new [`Image`][super::Image] wrapping another one
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> From<I> for BoxedError<I> {
    fn from(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> super::Image for BoxedError<I>
where
    I: super::Image,
    I::Error: MaybeMissError + 'static,
{
    type Error = Box<dyn MaybeMissError>;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        self.inner
            .fetch(address, max_bytes)
            .map_err(|e| -> Box<dyn MaybeMissError> { Box::new(e) })
    }
}
