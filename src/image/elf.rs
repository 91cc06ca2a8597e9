// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! ELF files as [`Image`]s

use core::borrow::Borrow;
use core::fmt;

use elf::ElfBytes;
use elf::abi;
use elf::endian::EndianParse;

use crate::types::Mode;

use super::{Image, error};

/// Static ELF [`Image`]
///
/// This [`Image`] serves code from the executable `LOAD` segments of an x86 or
/// x86-64 ELF file, placed at their virtual addresses. Neither relocation nor
/// dynamic linking are supported. Position independent executables may be
/// placed via [`Image::with_offset`].
#[derive(Copy, Clone)]
pub struct Elf<'d, E, P>
where
    E: Borrow<ElfBytes<'d, P>>,
    P: EndianParse,
{
    elf: E,
    cached: Region<'d>,
    mode: Mode,
    phantom: core::marker::PhantomData<P>,
}

impl<'d, E, P> Elf<'d, E, P>
where
    E: Borrow<ElfBytes<'d, P>>,
    P: EndianParse,
{
    /// Create a new ELF [`Image`]
    ///
    /// Fails for ELF files targeting anything other than `EM_X86_64` or
    /// `EM_386` and for big endian ELF files.
    pub fn new(elf: E) -> Result<Self, Error> {
        let hdr = &elf.borrow().ehdr;
        let mode = match hdr.e_machine {
            abi::EM_X86_64 => Mode::Bit64,
            abi::EM_386 => Mode::Bit32,
            machine => return Err(Error::UnsupportedMachine(machine)),
        };
        if !hdr.endianness.is_little() {
            return Err(Error::BigEndian);
        }

        Ok(Self {
            elf,
            cached: Default::default(),
            mode,
            phantom: Default::default(),
        })
    }

    /// Retrieve the inner [`ElfBytes`]
    pub fn inner(&self) -> &ElfBytes<'d, P> {
        self.elf.borrow()
    }

    /// Retrieve the execution [`Mode`] the ELF's code is built for
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl<'d, E, P> Image for Elf<'d, E, P>
where
    E: Borrow<ElfBytes<'d, P>>,
    P: EndianParse,
{
    type Error = Error;

    fn fetch(&mut self, address: u64, max_bytes: usize) -> Result<&[u8], Self::Error> {
        let code = match self.cached.code_at(address)? {
            Some(code) => code,
            None => {
                let region = self.find(address)?;
                self.cached = region;
                region.code_at(address)?.ok_or(Error::NotCovered(address))?
            }
        };
        Ok(code.get(..max_bytes).unwrap_or(code))
    }
}

impl<'d, E, P> Elf<'d, E, P>
where
    E: Borrow<ElfBytes<'d, P>>,
    P: EndianParse,
{
    /// Find the executable segment covering `address`
    fn find(&self, address: u64) -> Result<Region<'d>, Error> {
        let elf = self.elf.borrow();
        let segments = elf.segments().ok_or(Error::NotCovered(address))?;
        for phdr in segments
            .iter()
            .filter(|p| p.p_type == abi::PT_LOAD && p.p_flags & abi::PF_X != 0)
        {
            let region = Region {
                base: phdr.p_vaddr,
                code: elf.segment_data(&phdr).map_err(Error::Parse)?,
            };
            if region.code_at(address)?.is_some() {
                return Ok(region);
            }
        }
        Err(Error::NotCovered(address))
    }
}

/// Code of a single segment
#[derive(Copy, Clone, Default)]
struct Region<'d> {
    base: u64,
    code: &'d [u8],
}

impl<'d> Region<'d> {
    /// Retrieve the code starting at `address`, if covered
    fn code_at(&self, address: u64) -> Result<Option<&'d [u8]>, Error> {
        let Some(offset) = address.checked_sub(self.base) else {
            return Ok(None);
        };
        let offset = usize::try_from(offset).map_err(|_| Error::Unaddressable(address))?;
        Ok(self.code.get(offset..).filter(|c| !c.is_empty()))
    }
}

/// ELF specific error type
#[derive(Debug)]
pub enum Error {
    /// No executable segment covers the address
    NotCovered(u64),
    /// The ELF file could not be parsed
    Parse(elf::parse::ParseError),
    /// The address lies beyond what the host can index
    Unaddressable(u64),
    /// The ELF file targets a machine other than x86 or x86-64
    UnsupportedMachine(u16),
    /// The ELF file is big endian
    BigEndian,
}

impl error::Miss for Error {
    fn miss(address: u64) -> Self {
        Self::NotCovered(address)
    }
}

impl error::MaybeMiss for Error {
    fn is_miss(&self) -> bool {
        matches!(self, Self::NotCovered(_))
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCovered(a) => write!(f, "No executable segment covers {a:#x}"),
            Self::Parse(_) => write!(f, "Could not parse ELF file"),
            Self::Unaddressable(a) => write!(f, "{a:#x} cannot be addressed on this host"),
            Self::UnsupportedMachine(m) => write!(f, "Unsupported machine {m}"),
            Self::BigEndian => write!(f, "The ELF file is not little endian"),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotCovered(l), Self::NotCovered(r)) => l == r,
            (Self::Unaddressable(l), Self::Unaddressable(r)) => l == r,
            (Self::UnsupportedMachine(l), Self::UnsupportedMachine(r)) => l == r,
            (Self::Parse(_), Self::Parse(_)) | (Self::BigEndian, Self::BigEndian) => true,
            _ => false,
        }
    }
}
