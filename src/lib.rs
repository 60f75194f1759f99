// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary module codec.
//!
//! This crate decodes `.wasm` bytes into a mutable [`Module`] value and
//! encodes that value back to bytes, for programmatic inspection and editing
//! of compiled modules (rewriting a start function index, patching a custom
//! section, and so on) without a validator or runtime in the loop.
//!
//! The codec is shape-faithful rather than semantic: it accepts any byte
//! sequence that matches the binary grammar even when type or index
//! references are nonsensical, preserves sections with unknown IDs verbatim,
//! and recomputes every size prefix from the current structure on encode.
//! The one intentional asymmetry is LEB128 minimality: non-minimal integer
//! encodings are accepted on read (up to a shift guard) but always re-emitted
//! in minimal form, so byte-for-byte round-trips hold exactly for inputs
//! whose integers are already minimal, while value-level round-trips hold
//! unconditionally.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cursor;
mod decode;
mod encode;
mod error;
pub mod leb128;
pub mod types;

pub use error::Error;
pub use types::Module;
