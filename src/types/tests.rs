// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

use super::*;

use crate::packet::payload::Tnt;

#[test]
fn mode_cs_flags() {
    for mode in [Mode::Bit16, Mode::Bit32, Mode::Bit64] {
        assert_eq!(Mode::from_cs(mode.csl(), mode.csd()), Some(mode));
    }
    assert_eq!(Mode::from_cs(true, true), None);
}

#[test]
fn branch_map_fifo() {
    let mut map = branch::Map::default();
    map.push_taken(true).expect("Could not push");
    map.push_taken(false).expect("Could not push");
    map.push_taken(true).expect("Could not push");
    assert_eq!(map.count(), 3);
    assert_eq!(map.raw_map(), 0b101);
    assert_eq!(map.pop_taken(), Some(true));
    assert_eq!(map.pop_taken(), Some(false));
    assert_eq!(map.pop_taken(), Some(true));
    assert_eq!(map.pop_taken(), None);
    assert!(map.is_empty());
}

#[test]
fn branch_map_from_tnt() {
    // Oldest outcome is the most significant payload bit
    let mut map = branch::Map::from_tnt(Tnt::new(5, 0b10110)).expect("Could not create map");
    assert_eq!(map.count(), 5);
    assert_eq!(map.pop_taken(), Some(true));
    assert_eq!(map.pop_taken(), Some(false));
    assert_eq!(map.pop_taken(), Some(true));
    assert_eq!(map.pop_taken(), Some(true));
    assert_eq!(map.pop_taken(), Some(false));
    assert_eq!(map.pop_taken(), None);
}

#[test]
fn branch_map_append() {
    let mut map = branch::Map::from_tnt(Tnt::new(2, 0b10)).expect("Could not create map");
    let other = branch::Map::from_tnt(Tnt::new(1, 0b1)).expect("Could not create map");
    map.append(other).expect("Could not append");
    assert_eq!(map.count(), 3);
    assert_eq!(map.pop_taken(), Some(true));
    assert_eq!(map.pop_taken(), Some(false));
    assert_eq!(map.pop_taken(), Some(true));
}

#[test]
fn branch_map_overflow() {
    let mut map = branch::Map::default();
    for _ in 0..branch::Map::MAX_BRANCHES {
        map.push_taken(false).expect("Could not push");
    }
    assert_eq!(map.push_taken(true), Err(branch::Error::TooManyBranches));
    assert_eq!(
        map.append(branch::Map::from_tnt(Tnt::new(1, 1)).expect("Could not create map")),
        Err(branch::Error::TooManyBranches)
    );
}
