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

//! spec.md §4.8 typed codec shims. FITS stores every scalar big-endian; the
//! host is almost always little-endian, so every read/write round-trips
//! through an explicit byte-order swap on top of the byte transfer engine.

use crate::engine::{Engine, EofMode, FileId};
use crate::{Result, MINDIRECT};

/// Pluggable IEEE-754 ↔ host-float transform, applied to the raw on-disk
/// bytes before/after the big-endian swap.
///
/// The historical implementation this crate's design note traces to also
/// supported VAX D/G float layouts; those are out of scope (spec.md §9
/// marks them dead on every modern target), so [`Ieee`] — the identity
/// transform — is the only implementation this crate ships.
pub trait FloatFormat {
    fn f32_from_disk(raw: [u8; 4]) -> [u8; 4] {
        raw
    }
    fn f32_to_disk(raw: [u8; 4]) -> [u8; 4] {
        raw
    }
    fn f64_from_disk(raw: [u8; 8]) -> [u8; 8] {
        raw
    }
    fn f64_to_disk(raw: [u8; 8]) -> [u8; 8] {
        raw
    }
}

/// Identity transform, correct for every IEEE-754 host.
pub struct Ieee;

impl FloatFormat for Ieee {}

trait Scalar: Copy {
    const WIDTH: usize;
    fn to_be(self) -> Vec<u8>;
    fn from_be(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($t:ty) => {
        impl Scalar for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn to_be(self) -> Vec<u8> {
                self.to_be_bytes().to_vec()
            }

            fn from_be(bytes: &[u8]) -> Self {
                <$t>::from_be_bytes(bytes.try_into().expect("chunk width matches Scalar::WIDTH"))
            }
        }
    };
}

impl_scalar!(u8);
impl_scalar!(i16);
impl_scalar!(i32);
impl_scalar!(i64);

/// Reads `out.len()` values of width `T::WIDTH` starting at absolute byte
/// offset `byteloc`, spaced `stride` bytes apart (`stride == width` means
/// contiguous).
fn read_typed<T: Scalar>(
    engine: &Engine,
    file: FileId,
    byteloc: u64,
    stride: usize,
    out: &mut [T],
) -> Result<()> {
    let width = T::WIDTH;
    let nbytes = out.len() * width;
    let mut buf = vec![0u8; nbytes];

    if stride == width {
        if nbytes < MINDIRECT {
            engine.seek_to(file, byteloc as i64, EofMode::Report)?;
            engine.get_bytes(file, &mut buf)?;
        } else {
            let saved = engine.bytepos(file);
            engine.set_bytepos_unchecked(file, byteloc);
            engine.get_bytes(file, &mut buf)?;
            engine.set_bytepos_unchecked(file, saved);
        }
    } else {
        engine.seek_to(file, byteloc as i64, EofMode::Report)?;
        engine.get_bytes_grouped(file, width, out.len(), stride - width, &mut buf)?;
    }

    for (chunk, slot) in buf.chunks_exact(width).zip(out.iter_mut()) {
        *slot = T::from_be(chunk);
    }
    Ok(())
}

/// Write counterpart of [`read_typed`].
fn write_typed<T: Scalar>(
    engine: &Engine,
    file: FileId,
    byteloc: u64,
    stride: usize,
    values: &[T],
) -> Result<()> {
    let width = T::WIDTH;
    let mut buf = Vec::with_capacity(values.len() * width);
    for &v in values {
        buf.extend_from_slice(&v.to_be());
    }

    if stride == width {
        if buf.len() < MINDIRECT {
            engine.seek_to(file, byteloc as i64, EofMode::Ignore)?;
            engine.put_bytes(file, &buf)?;
        } else {
            let saved = engine.bytepos(file);
            engine.set_bytepos_unchecked(file, byteloc);
            engine.put_bytes(file, &buf)?;
            engine.set_bytepos_unchecked(file, saved);
        }
    } else {
        engine.seek_to(file, byteloc as i64, EofMode::Ignore)?;
        engine.put_bytes_grouped(file, width, values.len(), stride - width, &buf)?;
    }
    Ok(())
}

macro_rules! typed_shim {
    ($read:ident, $write:ident, $t:ty) => {
        #[doc = concat!("Width-", stringify!($t), " typed read, per spec.md §4.8.")]
        pub fn $read(
            engine: &Engine,
            file: FileId,
            byteloc: u64,
            stride: usize,
            out: &mut [$t],
        ) -> Result<()> {
            read_typed(engine, file, byteloc, stride, out)
        }

        #[doc = concat!("Width-", stringify!($t), " typed write, per spec.md §4.8.")]
        pub fn $write(
            engine: &Engine,
            file: FileId,
            byteloc: u64,
            stride: usize,
            values: &[$t],
        ) -> Result<()> {
            write_typed(engine, file, byteloc, stride, values)
        }
    };
}

typed_shim!(read_u8, write_u8, u8);
typed_shim!(read_i16, write_i16, i16);
typed_shim!(read_i32, write_i32, i32);
typed_shim!(read_i64, write_i64, i64);

/// Width-4 float read with an explicit [`FloatFormat`]; big-endian swap
/// then the format transform, in that order (the transform operates on the
/// byte pattern as it appears on disk, before the swap).
pub fn read_f32<F: FloatFormat>(
    engine: &Engine,
    file: FileId,
    byteloc: u64,
    stride: usize,
    out: &mut [f32],
) -> Result<()> {
    let nbytes = out.len() * 4;
    let mut buf = vec![0u8; nbytes];

    if stride == 4 {
        if nbytes < MINDIRECT {
            engine.seek_to(file, byteloc as i64, EofMode::Report)?;
            engine.get_bytes(file, &mut buf)?;
        } else {
            let saved = engine.bytepos(file);
            engine.set_bytepos_unchecked(file, byteloc);
            engine.get_bytes(file, &mut buf)?;
            engine.set_bytepos_unchecked(file, saved);
        }
    } else {
        engine.seek_to(file, byteloc as i64, EofMode::Report)?;
        engine.get_bytes_grouped(file, 4, out.len(), stride - 4, &mut buf)?;
    }

    for (chunk, slot) in buf.chunks_exact(4).zip(out.iter_mut()) {
        let raw: [u8; 4] = F::f32_from_disk(chunk.try_into().unwrap());
        *slot = f32::from_be_bytes(raw);
    }
    Ok(())
}

/// Width-4 float write counterpart of [`read_f32`].
pub fn write_f32<F: FloatFormat>(
    engine: &Engine,
    file: FileId,
    byteloc: u64,
    stride: usize,
    values: &[f32],
) -> Result<()> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for &v in values {
        buf.extend_from_slice(&F::f32_to_disk(v.to_be_bytes()));
    }

    if stride == 4 {
        if buf.len() < MINDIRECT {
            engine.seek_to(file, byteloc as i64, EofMode::Ignore)?;
            engine.put_bytes(file, &buf)?;
        } else {
            let saved = engine.bytepos(file);
            engine.set_bytepos_unchecked(file, byteloc);
            engine.put_bytes(file, &buf)?;
            engine.set_bytepos_unchecked(file, saved);
        }
    } else {
        engine.seek_to(file, byteloc as i64, EofMode::Ignore)?;
        engine.put_bytes_grouped(file, 4, values.len(), stride - 4, &buf)?;
    }
    Ok(())
}

/// Width-8 float read, analogous to [`read_f32`].
pub fn read_f64<F: FloatFormat>(
    engine: &Engine,
    file: FileId,
    byteloc: u64,
    stride: usize,
    out: &mut [f64],
) -> Result<()> {
    let nbytes = out.len() * 8;
    let mut buf = vec![0u8; nbytes];

    if stride == 8 {
        if nbytes < MINDIRECT {
            engine.seek_to(file, byteloc as i64, EofMode::Report)?;
            engine.get_bytes(file, &mut buf)?;
        } else {
            let saved = engine.bytepos(file);
            engine.set_bytepos_unchecked(file, byteloc);
            engine.get_bytes(file, &mut buf)?;
            engine.set_bytepos_unchecked(file, saved);
        }
    } else {
        engine.seek_to(file, byteloc as i64, EofMode::Report)?;
        engine.get_bytes_grouped(file, 8, out.len(), stride - 8, &mut buf)?;
    }

    for (chunk, slot) in buf.chunks_exact(8).zip(out.iter_mut()) {
        let raw: [u8; 8] = F::f64_from_disk(chunk.try_into().unwrap());
        *slot = f64::from_be_bytes(raw);
    }
    Ok(())
}

/// Width-8 float write counterpart of [`read_f64`].
pub fn write_f64<F: FloatFormat>(
    engine: &Engine,
    file: FileId,
    byteloc: u64,
    stride: usize,
    values: &[f64],
) -> Result<()> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for &v in values {
        buf.extend_from_slice(&F::f64_to_disk(v.to_be_bytes()));
    }

    if stride == 8 {
        if buf.len() < MINDIRECT {
            engine.seek_to(file, byteloc as i64, EofMode::Ignore)?;
            engine.put_bytes(file, &buf)?;
        } else {
            let saved = engine.bytepos(file);
            engine.set_bytepos_unchecked(file, byteloc);
            engine.put_bytes(file, &buf)?;
            engine.set_bytepos_unchecked(file, saved);
        }
    } else {
        engine.seek_to(file, byteloc as i64, EofMode::Ignore)?;
        engine.put_bytes_grouped(file, 8, values.len(), stride - 8, &buf)?;
    }
    Ok(())
}
