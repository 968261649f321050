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

//! spec.md §4.9 table-row byte access, layered on the byte transfer engine
//! using the row/column metadata the HDU contract exposes.

use fits_io_err::BufferError;

use crate::engine::{Engine, EofMode, FileId};
use crate::Result;

/// Reads `dst.len()` bytes starting at 1-indexed `first_row`/`first_char`,
/// failing with [`BufferError::BadRowNum`] if the access runs past
/// `numrows`. Only meaningful against a table HDU; fails with
/// [`BufferError::BadRowNum`] rather than dividing by zero if `rowlength` is
/// `0` (e.g. an `Image`-typed `HduContext`).
pub fn read_table_bytes(
    engine: &Engine,
    file: FileId,
    first_row: u64,
    first_char: u64,
    dst: &mut [u8],
) -> Result<()> {
    if first_row < 1 {
        return Err(BufferError::BadRowNum.into());
    }
    if first_char < 1 || dst.is_empty() {
        return Err(BufferError::BadElemNum.into());
    }

    let (rowlength, numrows, datastart) = {
        let inner = engine.inner.lock();
        let info = inner.files[&file].hdu.hdu_info();
        (info.rowlength, info.numrows, info.datastart)
    };
    if rowlength == 0 {
        // Only a table HDU has a meaningful row length; calling this
        // against e.g. an `Image`-typed `HduContext` would otherwise divide
        // by zero below.
        return Err(BufferError::BadRowNum.into());
    }

    let nchars = dst.len() as u64;
    let endrow = (first_char + nchars - 2) / rowlength + first_row;
    if endrow > numrows {
        return Err(BufferError::BadRowNum.into());
    }

    let pos = datastart + (first_row - 1) * rowlength + (first_char - 1);
    engine.seek_to(file, pos as i64, EofMode::Report)?;
    engine.get_bytes(file, dst)
}

/// Write counterpart of [`read_table_bytes`]: symmetric positioning, but
/// grows `numrows` to `endrow` instead of rejecting the access. Same
/// `rowlength != 0` precondition as [`read_table_bytes`].
pub fn write_table_bytes(
    engine: &Engine,
    file: FileId,
    first_row: u64,
    first_char: u64,
    src: &[u8],
) -> Result<()> {
    if first_row < 1 {
        return Err(BufferError::BadRowNum.into());
    }
    if first_char < 1 || src.is_empty() {
        return Err(BufferError::BadElemNum.into());
    }

    let (rowlength, numrows, datastart) = {
        let inner = engine.inner.lock();
        let info = inner.files[&file].hdu.hdu_info();
        (info.rowlength, info.numrows, info.datastart)
    };
    if rowlength == 0 {
        return Err(BufferError::BadRowNum.into());
    }

    let nchars = src.len() as u64;
    let endrow = (first_char + nchars - 2) / rowlength + first_row;
    let pos = datastart + (first_row - 1) * rowlength + (first_char - 1);

    engine.seek_to(file, pos as i64, EofMode::Ignore)?;
    engine.put_bytes(file, src)?;

    if endrow > numrows {
        let mut inner = engine.inner.lock();
        inner
            .files
            .get_mut(&file)
            .unwrap()
            .hdu
            .hdu_info_mut()
            .numrows = endrow;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{MemStorage, TestHdu};
    use crate::{BufferError, Engine, Error};

    #[test]
    fn zero_rowlength_rejected_instead_of_dividing_by_zero() {
        let engine = Engine::new();
        let file = engine.open(MemStorage::new(), TestHdu::image(), 0);

        let mut out = [0u8; 4];
        let err = super::read_table_bytes(&engine, file, 1, 1, &mut out).unwrap_err();
        assert!(matches!(err, Error::Buffer(BufferError::BadRowNum)));

        let err = super::write_table_bytes(&engine, file, 1, 1, b"abcd").unwrap_err();
        assert!(matches!(err, Error::Buffer(BufferError::BadRowNum)));
    }
}
