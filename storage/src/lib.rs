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

pub use fits_io_err::{Error, Result};

/// Byte-addressable storage backing one open file.
///
/// This is the boundary the buffer pool mediates every read and write
/// through. A `DataStorage` has a single mutable OS-level position; callers
/// are expected to `seek` before a `read`/`write` whose starting offset
/// differs from wherever the position last landed.
pub trait DataStorage {
    /// Moves the storage's position to `pos`, measured from the start of
    /// the file.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Reads `buffer.len()` bytes starting at the current position into
    /// `buffer`, advancing the position by that amount. A short read is an
    /// error.
    fn read(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// Writes all of `buffer` at the current position, advancing the
    /// position by `buffer.len()`.
    fn write(&mut self, buffer: &[u8]) -> Result<()>;

    /// Forces any OS-buffered writes out to durable storage.
    fn flush(&mut self) -> Result<()>;
}
