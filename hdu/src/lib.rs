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

/// Structural classification of a Header-Data Unit.
///
/// The buffer engine never decodes a header; this is the one piece of HDU
/// metadata it actually branches on, to pick the fill byte for records
/// synthesized past EOF (I7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HduType {
    Image,
    AsciiTable,
    BinaryTable,
}

impl HduType {
    /// `0x20` (space) for ASCII tables, `0x00` otherwise.
    pub fn fill_byte(self) -> u8 {
        match self {
            HduType::AsciiTable => b' ',
            HduType::Image | HduType::BinaryTable => 0,
        }
    }
}

/// Read-only-to-the-core snapshot of the file's currently selected HDU.
#[derive(Debug, Clone, Copy)]
pub struct HduInfo {
    pub curhdu: u32,
    pub hdutype: HduType,
    pub datastart: u64,
    pub rowlength: u64,
    pub numrows: u64,
}

/// The HDU contract a FITS file handle provides to the buffer engine: HDU
/// metadata the engine consults but never derives, plus repositioning when
/// the caller has moved to a different HDU than the one the engine last saw.
pub trait HduContext {
    /// Current cached HDU metadata.
    fn hdu_info(&self) -> HduInfo;

    /// Mutable access so `write_table_bytes` can grow `numrows`.
    fn hdu_info_mut(&mut self) -> &mut HduInfo;

    /// Repositions to the given 1-indexed HDU. Invoked when the engine
    /// notices `hdu_info().curhdu` no longer matches what the caller expects.
    fn move_to_hdu(&mut self, hdu_number: u32) -> Result<()>;
}
