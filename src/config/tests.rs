// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

use super::*;

#[test]
fn defaults() {
    let config = Config::default();
    assert!(config.mtc);
    assert!(config.cyc);
    assert_eq!(config.compression, None);
    assert_eq!(config.mode, Mode::Bit64);
}

#[cfg(feature = "serde")]
#[test]
fn from_toml() {
    let config: Config = toml::from_str(
        r#"
        mtc = 0
        cyc = true
        compression = "update32"
        mode = "bit32"
        "#,
    )
    .expect("Could not parse config");
    assert_eq!(
        config,
        Config {
            mtc: false,
            cyc: true,
            compression: Some(Compression::Update32),
            mode: Mode::Bit32,
        }
    );
}

#[cfg(feature = "serde")]
#[test]
fn partial_toml() {
    let config: Config = toml::from_str("cyc = 0").expect("Could not parse config");
    assert_eq!(
        config,
        Config {
            cyc: false,
            ..CONFIG
        }
    );
}

#[cfg(feature = "serde")]
#[test]
fn bad_flag() {
    assert!(toml::from_str::<Config>("mtc = 2").is_err());
}
