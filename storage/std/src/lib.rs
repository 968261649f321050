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

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use fits_io_storage::{DataStorage, Result};
use log::debug;

/// A [`DataStorage`] backed by a regular `std::fs::File`.
///
/// Tracks the file's OS-level position itself so that repeated reads/writes
/// at a contiguous offset don't pay for a redundant `seek` syscall; callers
/// (the buffer pool) still call [`DataStorage::seek`] whenever they need to
/// land somewhere else, the same way `io_pos` is used in the engine.
pub struct FileStorage {
    file: File,
    pos: u64,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, pos: 0 })
    }

    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, pos: 0 })
    }
}

impl DataStorage for FileStorage {
    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos != self.pos {
            debug!("seeking file storage to {pos}");
            self.file.seek(SeekFrom::Start(pos))?;
            self.pos = pos;
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.file.read_exact(buffer)?;
        self.pos += buffer.len() as u64;
        Ok(())
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        self.file.write_all(buffer)?;
        self.pos += buffer.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
