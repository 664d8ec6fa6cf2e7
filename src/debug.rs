//! Memory views for an interactive debugger front end.

use std::fmt::Write as _;

use thiserror::Error;

use crate::{
    config::Bits,
    memory::{AddressSpace, MemoryError},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DebugError {
    #[error("need explicit size (1, 2, 4 or 8), got {0}")]
    InvalidWidth(usize),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

fn address_digits(bits: Bits) -> usize {
    match bits {
        Bits::W32 => 8,
        Bits::W64 => 16,
    }
}

fn check_width(width: usize) -> Result<usize, DebugError> {
    match width {
        1 | 2 | 4 | 8 => Ok(width),
        other => Err(DebugError::InvalidWidth(other)),
    }
}

/// One line per mapping, in address order.
pub fn format_mappings(space: &AddressSpace) -> String {
    let digits = address_digits(space.bits());
    let mut out = String::new();
    for m in space.mappings() {
        let _ = writeln!(
            out,
            "0x{:0digits$x}-0x{:0digits$x} {} {}",
            m.start(),
            m.end(),
            m.prot(),
            m.name()
        );
    }
    out
}

pub fn read_value(space: &AddressSpace, addr: u64, width: usize) -> Result<u64, DebugError> {
    Ok(space.read_uint(addr, check_width(width)?)?)
}

/// Poke a value in guest byte order. Like a debugger, this ignores protection.
pub fn write_value(
    space: &mut AddressSpace,
    addr: u64,
    value: u64,
    width: usize,
) -> Result<(), DebugError> {
    let width = check_width(width)?;
    let bytes = crate::memory::uint_to_bytes(value, width, space.endian());
    space.load(addr, &bytes)?;
    Ok(())
}

/// Join `parts` with single spaces and poke the bytes, without a terminator.
pub fn write_strings<S: AsRef<str>>(
    space: &mut AddressSpace,
    addr: u64,
    parts: &[S],
) -> Result<usize, DebugError> {
    let text = parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");
    space.load(addr, text.as_bytes())?;
    Ok(text.len())
}

/// Classic hex dump: address, 16 bytes in 2-byte groups, ASCII column.
pub fn hex_dump(addr: u64, bytes: &[u8], bits: Bits) -> String {
    let digits = address_digits(bits);
    let mut out = String::new();
    for (i, line) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:0digits$x}:", addr + (i as u64) * 16);
        for group in 0..8 {
            out.push(' ');
            for idx in [group * 2, group * 2 + 1] {
                match line.get(idx) {
                    Some(b) => {
                        let _ = write!(out, "{b:02x}");
                    }
                    None => out.push_str("  "),
                }
            }
        }
        out.push_str("  ");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

pub fn dump(space: &AddressSpace, addr: u64, len: u64, bits: Bits) -> Result<String, DebugError> {
    let bytes = space.read(addr, len)?;
    Ok(hex_dump(addr, &bytes, bits))
}
