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

//! Shared `#[cfg(test)]` double: an in-memory [`DataStorage`] and
//! [`HduContext`] pair, so unit tests across this crate's modules don't each
//! reinvent one.

use std::sync::{Arc, Mutex};

use fits_io_hdu::{HduContext, HduInfo, HduType};
use fits_io_storage::DataStorage;

use crate::Result;

#[derive(Clone)]
pub(crate) struct MemStorage {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
    reads: Arc<Mutex<u64>>,
}

impl MemStorage {
    pub(crate) fn new() -> Self {
        Self::with_data(Vec::new())
    }

    pub(crate) fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            pos: 0,
            reads: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn read_count(&self) -> u64 {
        *self.reads.lock().unwrap()
    }

    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl DataStorage for MemStorage {
    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        *self.reads.lock().unwrap() += 1;
        let data = self.data.lock().unwrap();
        let start = self.pos as usize;
        let end = start + buffer.len();
        if end > data.len() {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read").into());
        }
        buffer.copy_from_slice(&data[start..end]);
        self.pos += buffer.len() as u64;
        Ok(())
    }

    fn write(&mut self, buffer: &[u8]) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let start = self.pos as usize;
        let end = start + buffer.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buffer);
        self.pos += buffer.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct TestHdu(pub HduInfo);

impl TestHdu {
    pub(crate) fn image() -> Self {
        Self(HduInfo {
            curhdu: 1,
            hdutype: HduType::Image,
            datastart: 0,
            rowlength: 0,
            numrows: 0,
        })
    }

    pub(crate) fn table(datastart: u64, rowlength: u64, numrows: u64) -> Self {
        Self(HduInfo {
            curhdu: 1,
            hdutype: HduType::BinaryTable,
            datastart,
            rowlength,
            numrows,
        })
    }

    pub(crate) fn ascii_table() -> Self {
        Self(HduInfo {
            curhdu: 1,
            hdutype: HduType::AsciiTable,
            datastart: 0,
            rowlength: 0,
            numrows: 0,
        })
    }
}

impl HduContext for TestHdu {
    fn hdu_info(&self) -> HduInfo {
        self.0
    }

    fn hdu_info_mut(&mut self) -> &mut HduInfo {
        &mut self.0
    }

    fn move_to_hdu(&mut self, hdu_number: u32) -> Result<()> {
        self.0.curhdu = hdu_number;
        Ok(())
    }
}
