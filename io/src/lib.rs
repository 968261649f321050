// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Buffered record I/O engine: the cache between a FITS file handle and its
//! byte-addressable storage driver.
//!
//! An [`Engine`] owns a fixed-capacity pool of [`BUFLEN`]-byte record
//! buffers shared by every file opened against it. Callers never see a
//! buffer directly; they address a file by the lightweight [`FileId`]
//! returned from [`Engine::open`] and the engine mediates every byte
//! transfer through the pool (or around it, for transfers large enough to
//! justify bypassing the cache).

mod codec;
mod engine;
mod flush;
mod pool;
#[cfg(test)]
mod test_support;
mod table;
mod transfer;

pub use codec::{
    read_f32, read_f64, read_i16, read_i32, read_i64, read_u8, write_f32, write_f64, write_i16,
    write_i32, write_i64, write_u8, FloatFormat, Ieee,
};
pub use engine::{Engine, EofMode, FileId};
pub use fits_io_err::{BufferError, Error, Result};
pub use fits_io_hdu::{HduContext, HduInfo, HduType};
pub use fits_io_storage::DataStorage;
pub use table::{read_table_bytes, write_table_bytes};

/// Canonical FITS record size, in bytes. Every record and every buffer-pool
/// slot is exactly this many bytes.
pub const BUFLEN: usize = 2880;

/// Historical default pool size. Process-wide, shared by every open file.
pub const DEFAULT_NBUF: usize = 40;

/// Transfers at or above this size bypass the cache entirely (the "direct"
/// path of spec.md §4.4.2/§4.4.3). Historically a small multiple of
/// [`BUFLEN`].
pub const MINDIRECT: usize = 3 * BUFLEN;
