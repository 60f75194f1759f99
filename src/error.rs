// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Codec error definitions.

use core::fmt;

/// Represents failures that can arise while decoding or encoding a module.
///
/// Every failure is fatal to the call that produced it; no partial values
/// are returned. There are no semantic validation errors: a byte sequence
/// whose shape matches the grammar decodes successfully regardless of what
/// its indices and types refer to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// Invalid WebAssembly magic number.
    InvalidMagic(u32),
    /// Unsupported WebAssembly version number.
    UnsupportedVersion(u32),
    /// A read ran past the end of the input or of a section frame.
    UnexpectedEnd,
    /// A LEB128 encoding was overlong or encoded an out-of-range value.
    LebOverflow,
    /// Unrecognized primary opcode.
    UnknownOpcode(u8),
    /// Unrecognized `0xfc`-prefixed subopcode.
    UnknownMiscOpcode(u32),
    /// Import descriptor kind outside `0..=3`.
    UnknownImportKind(u8),
    /// Element segment flag outside `0..=7`.
    UnknownElementFlag(u32),
    /// Data segment flag outside `0..=2`.
    UnknownDataFlag(u32),
    /// Type body kind other than func, struct, or array.
    UnknownTypeKind(u8),
    /// A section decoder consumed fewer bytes than its frame declared.
    SectionSizeMismatch {
        kind: u8,
        declared: u32,
        actual: u32,
    },
    /// A computed size prefix does not fit in a u32.
    SizeOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidMagic(magic) => write!(f, "invalid magic ({magic:#x})"),
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported version ({version:#x})")
            }
            Error::UnexpectedEnd => write!(f, "unexpected end of input"),
            Error::LebOverflow => write!(f, "invalid LEB128 encoding"),
            Error::UnknownOpcode(opcode) => write!(f, "unknown opcode ({opcode:#04x})"),
            Error::UnknownMiscOpcode(subopcode) => {
                write!(f, "unknown 0xfc subopcode ({subopcode:#x})")
            }
            Error::UnknownImportKind(kind) => write!(f, "unknown import kind ({kind:#04x})"),
            Error::UnknownElementFlag(flag) => write!(f, "unknown element flag ({flag:#x})"),
            Error::UnknownDataFlag(flag) => write!(f, "unknown data flag ({flag:#x})"),
            Error::UnknownTypeKind(kind) => write!(f, "unknown type kind ({kind:#04x})"),
            Error::SectionSizeMismatch {
                kind,
                declared,
                actual,
            } => write!(
                f,
                "invalid length for section {kind:#04x}: declared {declared:#x}; consumed {actual:#x}"
            ),
            Error::SizeOverflow => write!(f, "computed size exceeds the u32 prefix range"),
        }
    }
}

impl core::error::Error for Error {}
