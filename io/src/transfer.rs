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

use crate::engine::{self, Engine, EofMode, FileId};
use crate::{flush, Result, MINDIRECT};

impl Engine {
    /// spec.md §4.4: writes `src` at the file's current position, advancing
    /// it by `src.len()`. Transfers at or above [`MINDIRECT`] bypass the
    /// cache (§4.4.2); smaller ones go through it (§4.4.1).
    pub fn put_bytes(&self, file: FileId, src: &[u8]) -> Result<()> {
        if src.len() >= MINDIRECT {
            self.put_bytes_direct(file, src)
        } else {
            self.put_bytes_cached(file, src)
        }
    }

    /// spec.md §4.4: reads `dst.len()` bytes from the file's current
    /// position into `dst`, advancing it.
    pub fn get_bytes(&self, file: FileId, dst: &mut [u8]) -> Result<()> {
        if dst.len() >= MINDIRECT {
            self.get_bytes_direct(file, dst)
        } else {
            self.get_bytes_cached(file, dst)
        }
    }

    /// §4.4.1 small write: copy into the current slot, crossing record
    /// boundaries by loading the next record with `ignore_eof` as needed.
    fn put_bytes_cached(&self, file: FileId, src: &[u8]) -> Result<()> {
        let mut pos = 0usize;
        let total = src.len();
        while pos < total {
            let (space, offset_in_record, buflen) = {
                let inner = self.inner.lock();
                let buflen = inner.buflen;
                let bytepos = inner.files[&file].bytepos;
                let offset_in_record = (bytepos % buflen as u64) as usize;
                (buflen - offset_in_record, offset_in_record, buflen)
            };
            let n = space.min(total - pos);
            {
                let mut inner = self.inner.lock();
                let curbuf = inner.files[&file]
                    .curbuf
                    .expect("put_bytes requires a positioned file; call seek_to first");
                inner.slots[curbuf].bytes[offset_in_record..offset_in_record + n]
                    .copy_from_slice(&src[pos..pos + n]);
                inner.slots[curbuf].dirty = true;
                inner.files.get_mut(&file).unwrap().bytepos += n as u64;
            }
            pos += n;
            if n == space && pos < total {
                let next_record = {
                    let inner = self.inner.lock();
                    (inner.files[&file].bytepos / buflen as u64) as i64
                };
                self.load_record(file, next_record, EofMode::Ignore)?;
            }
        }
        Ok(())
    }

    /// §4.4.3 small read: symmetric to [`Engine::put_bytes_cached`], loading
    /// the next record with `report_eof`.
    fn get_bytes_cached(&self, file: FileId, dst: &mut [u8]) -> Result<()> {
        let mut written = 0usize;
        let total = dst.len();
        while written < total {
            let (space, offset_in_record, buflen) = {
                let inner = self.inner.lock();
                let buflen = inner.buflen;
                let bytepos = inner.files[&file].bytepos;
                let offset_in_record = (bytepos % buflen as u64) as usize;
                (buflen - offset_in_record, offset_in_record, buflen)
            };
            let n = space.min(total - written);
            {
                let inner = self.inner.lock();
                let curbuf = inner.files[&file]
                    .curbuf
                    .expect("get_bytes requires a positioned file; call seek_to first");
                dst[written..written + n].copy_from_slice(
                    &inner.slots[curbuf].bytes[offset_in_record..offset_in_record + n],
                );
            }
            {
                let mut inner = self.inner.lock();
                inner.files.get_mut(&file).unwrap().bytepos += n as u64;
            }
            written += n;
            if n == space && written < total {
                let next_record = {
                    let inner = self.inner.lock();
                    (inner.files[&file].bytepos / buflen as u64) as i64
                };
                self.load_record(file, next_record, EofMode::Report)?;
            }
        }
        Ok(())
    }

    /// §4.4.2 large write: fill the tail of the current record, flush and
    /// invalidate every cached record the direct write will overlap, write
    /// whole records straight to storage, then handle the final partial
    /// record through the cache so its un-overwritten tail bytes survive.
    fn put_bytes_direct(&self, file: FileId, src: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let buflen = inner.buflen as u64;
        let bytepos = inner.files[&file].bytepos;

        let recstart = (bytepos / buflen) as i64;
        let recend = ((bytepos + src.len() as u64 - 1) / buflen) as i64;
        let bufoff = bytepos % buflen;
        let space = (buflen - bufoff) as usize;

        // Ensure a slot actually holds `recstart` before merging the prefix
        // into it. `curbuf` cannot be trusted here: the typed codec shims
        // reach this path via `set_bytepos_unchecked`, which deliberately
        // skips `seek_to` (and therefore the record load it would trigger)
        // for the large contiguous path (spec.md §4.8), so `curbuf` may be
        // unset or may still hold whatever record an earlier cached access
        // left it on.
        engine::load_record_locked(&mut inner, file, recstart, EofMode::Ignore)?;
        let curbuf = inner.files[&file]
            .curbuf
            .expect("load_record_locked always binds curbuf on success");

        // Step 2: fill the remainder of the current (partially-written) record.
        let prefix = space.min(src.len());
        if prefix > 0 {
            inner.slots[curbuf].bytes[bufoff as usize..bufoff as usize + prefix]
                .copy_from_slice(&src[..prefix]);
            inner.slots[curbuf].dirty = true;
        }

        // Step 3: flush and invalidate every cached record (incl. curbuf)
        // this direct write is about to shadow.
        let overlapping: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.owner == Some(file) && s.record >= recstart && s.record <= recend
            })
            .map(|(idx, _)| idx)
            .collect();
        for idx in overlapping {
            if inner.slots[idx].dirty {
                flush::flush_slot(&mut inner, idx)?;
            }
            inner.slots[idx].unbind();
        }
        inner.files.get_mut(&file).unwrap().curbuf = None;

        // Step 4/5: direct write of whole records.
        let post_fill_pos = recstart as u64 * buflen + buflen;
        let remaining = (src.len() - prefix) as u64;
        let nwrite = if remaining == 0 {
            0
        } else {
            ((remaining - 1) / buflen) * buflen
        };
        if nwrite > 0 {
            let entry = inner.files.get_mut(&file).unwrap();
            if entry.io_pos != post_fill_pos {
                entry.storage.seek(post_fill_pos)?;
                entry.io_pos = post_fill_pos;
            }
            entry
                .storage
                .write(&src[prefix..prefix + nwrite as usize])?;
            entry.io_pos += nwrite;
        }
        let new_io_pos = post_fill_pos + nwrite;
        {
            let entry = inner.files.get_mut(&file).unwrap();
            entry.filesize = entry.filesize.max(new_io_pos);
        }

        // Step 6: final (partial, or exactly one whole) tail record.
        let tail_len = remaining - nwrite;
        if tail_len > 0 {
            let filesize_now = inner.files[&file].filesize;
            if new_io_pos >= filesize_now {
                let fill_byte = inner.files[&file].hdu.hdu_info().hdutype.fill_byte();
                inner.slots[curbuf].bytes.fill(fill_byte);
            } else {
                let entry = inner.files.get_mut(&file).unwrap();
                if entry.io_pos != new_io_pos {
                    entry.storage.seek(new_io_pos)?;
                    entry.io_pos = new_io_pos;
                }
                entry.storage.read(&mut inner.slots[curbuf].bytes)?;
                entry.io_pos += buflen;
            }
            let tail_start = src.len() - tail_len as usize;
            inner.slots[curbuf].bytes[..tail_len as usize].copy_from_slice(&src[tail_start..]);
            inner.slots[curbuf].dirty = true;
            inner.slots[curbuf].owner = Some(file);
            inner.slots[curbuf].record = recend;
            inner.age.touch(curbuf);
            inner.pin(file, curbuf);
        }

        // Step 7.
        let entry = inner.files.get_mut(&file).unwrap();
        entry.logfilesize = entry.logfilesize.max((recend as u64 + 1) * buflen);
        entry.bytepos = bytepos + src.len() as u64;

        Ok(())
    }

    /// §4.4.3 large read: flush (but keep) any overlapping dirty cached
    /// record, then read straight from storage into the caller's buffer.
    fn get_bytes_direct(&self, file: FileId, dst: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let buflen = inner.buflen as u64;
        let bytepos = inner.files[&file].bytepos;
        let recstart = (bytepos / buflen) as i64;
        let recend = ((bytepos + dst.len() as u64 - 1) / buflen) as i64;

        let overlapping: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.owner == Some(file) && s.dirty && s.record >= recstart && s.record <= recend
            })
            .map(|(idx, _)| idx)
            .collect();
        for idx in overlapping {
            flush::flush_slot(&mut inner, idx)?;
        }

        let entry = inner.files.get_mut(&file).unwrap();
        if entry.io_pos != bytepos {
            entry.storage.seek(bytepos)?;
            entry.io_pos = bytepos;
        }
        entry.storage.read(dst)?;
        entry.io_pos += dst.len() as u64;
        entry.bytepos += dst.len() as u64;
        Ok(())
    }

    /// spec.md §4.4.4 `put_bytoff`: writes `ngroups` groups of `gsize` bytes
    /// each, through the cache, skipping `offset` untouched bytes between
    /// groups. `src` must hold exactly `gsize * ngroups` bytes.
    pub fn put_bytes_grouped(
        &self,
        file: FileId,
        gsize: usize,
        ngroups: usize,
        offset: usize,
        src: &[u8],
    ) -> Result<()> {
        assert_eq!(src.len(), gsize * ngroups, "grouped write buffer size mismatch");
        for i in 0..ngroups {
            self.put_bytes_cached(file, &src[i * gsize..(i + 1) * gsize])?;
            if i + 1 < ngroups && offset > 0 {
                let next_pos = self.bytepos(file) + offset as u64;
                self.seek_to(file, next_pos as i64, EofMode::Ignore)?;
            }
        }
        Ok(())
    }

    /// spec.md §4.4.4 `get_bytoff`: symmetric read.
    pub fn get_bytes_grouped(
        &self,
        file: FileId,
        gsize: usize,
        ngroups: usize,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<()> {
        assert_eq!(dst.len(), gsize * ngroups, "grouped read buffer size mismatch");
        for i in 0..ngroups {
            let chunk = &mut dst[i * gsize..(i + 1) * gsize];
            self.get_bytes_cached(file, chunk)?;
            if i + 1 < ngroups && offset > 0 {
                let next_pos = self.bytepos(file) + offset as u64;
                self.seek_to(file, next_pos as i64, EofMode::Report)?;
            }
        }
        Ok(())
    }
}
