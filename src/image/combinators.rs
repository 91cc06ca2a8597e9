// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Combination of multiple [`Image`]s

use core::borrow::BorrowMut;

use super::Image;
use super::error::{MaybeMiss, Miss};

/// Set of [`Image`]s acting as a single [`Image`]
///
/// Code is fetched from the first image covering an address. The image that
/// served the last request is consulted first, followed by the images after
/// it. Every image is asked at most once per request.
#[derive(Copy, Clone, Default, Debug)]
pub struct Multi<C: BorrowMut<[I]>, I> {
    images: C,
    last: usize,
    phantom: core::marker::PhantomData<I>,
}

impl<C: BorrowMut<[I]>, I> Multi<C, I> {
    /// Create a new [`Image`] combining all `images`
    pub fn new(images: C) -> Self {
        Self {
            images,
            last: 0,
            phantom: Default::default(),
        }
    }
}

impl<C: BorrowMut<[I]>, I> From<C> for Multi<C, I> {
    fn from(images: C) -> Self {
        Self::new(images)
    }
}

impl<C: BorrowMut<[I]> + FromIterator<I>, I> FromIterator<I> for Multi<C, I> {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        C::from_iter(iter).into()
    }
}

impl<C: BorrowMut<[I]> + Extend<I>, I> Extend<I> for Multi<C, I> {
    fn extend<T: IntoIterator<Item = I>>(&mut self, iter: T) {
        self.images.extend(iter)
    }
}

impl<C, I> Image for Multi<C, I>
where
    C: BorrowMut<[I]>,
    I: Image,
    I::Error: Miss,
{
    type Error = I::Error;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        let images = self.images.borrow_mut();
        let split = self.last.min(images.len());
        let (head, tail) = images.split_at_mut(split);
        let res = tail
            .iter_mut()
            .zip(split..)
            .chain(head.iter_mut().zip(0..))
            .map(|(i, n)| (n, i.fetch(address, max_bytes)))
            .find(|(_, r)| !r.is_miss());
        if let Some((current, res)) = res {
            self.last = current;
            res
        } else {
            Miss::miss(address)
        }
    }
}
