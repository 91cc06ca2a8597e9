// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Configuration and utilities

#[cfg(feature = "serde")]
mod serde_utils;

#[cfg(test)]
mod tests;

use crate::packet::ip::Compression;
use crate::types::Mode;

/// Codec and decoder configuration
///
/// A configuration defines which of the optional packet kinds are in use on
/// the traced system and some defaults applied by the
/// [encoder][crate::packet::encoder::Encoder] and the [flow
/// reconstruction][crate::flow]. The trace buffer bounds are defined by the
/// slices handed to the [`Builder`][crate::packet::Builder].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Config {
    /// Whether MTC and TMA packets may appear in the trace
    #[cfg_attr(feature = "serde", serde(with = "serde_utils::Flag"))]
    pub mtc: bool,
    /// Whether CYC packets may appear in the trace
    #[cfg_attr(feature = "serde", serde(with = "serde_utils::Flag"))]
    pub cyc: bool,
    /// Default IP compression for addresses encoded without explicit level
    ///
    /// If `None`, the narrowest lossless level is chosen.
    pub compression: Option<Compression>,
    /// Execution mode assumed before the first MODE.EXEC packet
    pub mode: Mode,
}

/// See [CONFIG] for default values of individual fields
impl Default for Config {
    fn default() -> Self {
        CONFIG
    }
}

/// Default [Config]
pub const CONFIG: Config = Config {
    mtc: true,
    cyc: true,
    compression: None,
    mode: Mode::Bit64,
};
