// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet dumper and flow reconstruction
//!
//!     Usage: ptdump [OPTIONS] <trace>
//!
//! This program decodes a raw trace file and prints a single line for every
//! packet decoded. If the code of the traced program is supplied, either as an
//! ELF file or as a raw memory dump with its load address, the control flow is
//! reconstructed instead and a single line is printed for every trace item.
//! Optionally, the codec configuration may be supplied in the form of a TOML
//! file (such as `config.toml` in this directory).
//!
//! If run with the `--debug` flag or the environment variable `DEBUG` set to
//! `1`, the configuration is printed to stderr and errors do not abort the
//! program but are reported and skipped.

use std::path::PathBuf;

use ptflow::{config, flow, image, packet};

fn main() {
    use image::Image;

    let matches = clap::Command::new("Packet dumper")
        .arg(
            clap::arg!(<trace> "Path to the raw trace data")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(-c --config <FILE> "Codec configuration")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(-e --elf <FILE> "ELF file of the traced program")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(-r --raw <FILE> "Raw code of the traced program")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(-b --base <ADDR> "Load address of the raw code")
                .value_parser(parse_address)
                .default_value("0"),
        )
        .arg(
            clap::arg!(-d --debug "Enable additional debug output")
                .env("DEBUG")
                .action(clap::ArgAction::SetTrue)
                .value_parser(clap::builder::FalseyValueParser::new()),
        )
        .get_matches();

    let debug = matches.get_flag("debug");

    let trace_data = matches
        .get_one::<PathBuf>("trace")
        .map(|p| std::fs::read(p).expect("Could not load trace file"))
        .expect("No trace file specified");

    let config_path = matches.get_one::<PathBuf>("config");
    let mut config: config::Config = config_path
        .map(|p| {
            let config = std::fs::read_to_string(p).expect("Could not load configuration");
            toml::from_str(config.as_ref()).expect("Could not parse configuration")
        })
        .unwrap_or_default();

    // The code may come from an ELF file ...
    let elf_data = matches
        .get_one::<PathBuf>("elf")
        .map(|p| std::fs::read(p).expect("Could not load ELF file"));
    let elf = elf_data.as_ref().map(|d| {
        let elf = elf::ElfBytes::<elf::endian::LittleEndian>::minimal_parse(d.as_ref())
            .expect("Could not parse ELF file");
        image::elf::Elf::new(elf).expect("Could not use ELF file as image")
    });
    if let (None, Some(elf)) = (config_path, elf.as_ref()) {
        config.mode = elf.mode();
    }

    // ... and/or a raw dump.
    let raw_data = matches
        .get_one::<PathBuf>("raw")
        .map(|p| std::fs::read(p).expect("Could not load raw code"));
    let base = matches.get_one::<u64>("base").copied().unwrap_or_default();

    if debug {
        eprintln!("Configuration: {config:?}");
    }

    let decoder = packet::builder().with_config(&config).decoder(trace_data.as_ref());

    let mut images: Vec<image::boxed::Image> = Vec::new();
    images.extend(elf.map(Image::boxed));
    images.extend(
        raw_data
            .as_ref()
            .map(|d| image::Segment::new(base, d.as_slice()).boxed()),
    );

    if images.is_empty() {
        dump(decoder, debug);
    } else {
        trace(flow::Tracer::new(decoder, image::Multi::new(images)), debug);
    }
}

/// Print every packet in the trace
fn dump(mut decoder: packet::decoder::Decoder, debug: bool) {
    let mut count = 0u64;
    while decoder.bytes_left() > 0 {
        let pos = decoder.byte_pos();
        match decoder.decode() {
            Ok((packet, _)) => {
                println!("{pos:#010x}: {packet}");
                count += 1;
            }
            Err(e) if debug => {
                eprintln!("{pos:#010x}: {e}");
                if decoder.sync_forward().is_none() {
                    break;
                }
            }
            Err(e) => panic!("Could not decode packet at {pos:#x}: {e}"),
        }
    }
    eprintln!("Decoded {count} packets");
}

/// Print every item reconstructed from the trace
fn trace<I>(tracer: flow::Tracer<I>, debug: bool)
where
    I: image::Image,
    I::Error: std::fmt::Debug,
{
    let mut icount = 0u64;
    let mut ecount = 0u64;
    for item in tracer {
        match item {
            Ok(item) => {
                println!("{item}");
                icount += 1;
            }
            Err(e) if debug => {
                eprintln!("Error while tracing: {e} ({e:?})");
                ecount += 1;
            }
            Err(e) => panic!("Error while tracing: {e}"),
        }
    }
    eprintln!("Traced {icount} items, {ecount} errors");
}

fn parse_address(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}
