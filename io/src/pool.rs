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

use crate::engine::FileId;

/// One entry of the buffer pool (spec.md §3 "Slot").
pub(crate) struct Slot {
    pub bytes: Box<[u8]>,
    pub owner: Option<FileId>,
    pub record: i64,
    pub dirty: bool,
    /// True iff this slot is some file's `curbuf`. Mirrors I2 directly on
    /// the slot so victim selection never has to chase another file's
    /// state to ask "is this pinned".
    pub pinned: bool,
}

impl Slot {
    pub fn new(buflen: usize) -> Self {
        Self {
            bytes: vec![0u8; buflen].into_boxed_slice(),
            owner: None,
            record: -1,
            dirty: false,
            pinned: false,
        }
    }

    pub fn unbind(&mut self) {
        self.owner = None;
        self.record = -1;
        self.dirty = false;
        self.pinned = false;
    }
}

/// The LRU age index: a permutation of slot indices, oldest first.
pub(crate) struct AgeIndex(Vec<usize>);

impl AgeIndex {
    pub fn new(nbuf: usize) -> Self {
        Self((0..nbuf).collect())
    }

    /// Promotes `slot_idx` to youngest (§4.2 step 1/8: "promote slot to
    /// youngest").
    pub fn touch(&mut self, slot_idx: usize) {
        if let Some(pos) = self.0.iter().position(|&s| s == slot_idx) {
            self.0.remove(pos);
            self.0.push(slot_idx);
        }
    }

    /// Oldest-to-youngest order, for `choose_victim`.
    pub fn oldest_to_youngest(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Youngest-to-oldest order, for the record-loader's hit search
    /// (§4.2 step 1).
    pub fn youngest_to_oldest(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().rev().copied()
    }

    #[cfg(test)]
    pub fn is_permutation_of(&self, nbuf: usize) -> bool {
        let mut seen: Vec<bool> = vec![false; nbuf];
        if self.0.len() != nbuf {
            return false;
        }
        for &idx in &self.0 {
            if idx >= nbuf || seen[idx] {
                return false;
            }
            seen[idx] = true;
        }
        true
    }
}

/// §4.1 `choose_victim`: scans oldest → youngest for the first unpinned
/// slot. If every slot is pinned, the only legal reuse is the calling
/// file's own `curbuf` (a pathological situation: more simultaneously
/// active files than the pool has slots for).
pub(crate) fn choose_victim(
    slots: &[Slot],
    age: &AgeIndex,
    caller_curbuf: Option<usize>,
) -> Option<usize> {
    for idx in age.oldest_to_youngest() {
        let slot = &slots[idx];
        if slot.owner.is_none() || !slot.pinned {
            return Some(idx);
        }
    }
    caller_curbuf
}

/// §4.2 step 1: find a slot already holding `(file, record)`, searching
/// youngest to oldest.
pub(crate) fn find_resident(
    slots: &[Slot],
    age: &AgeIndex,
    file: FileId,
    record: i64,
) -> Option<usize> {
    age.youngest_to_oldest()
        .find(|&idx| slots[idx].owner == Some(file) && slots[idx].record == record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_index_touch_promotes_to_youngest() {
        let mut age = AgeIndex::new(4);
        age.touch(1);
        assert_eq!(age.oldest_to_youngest().collect::<Vec<_>>(), [0, 2, 3, 1]);
        assert!(age.is_permutation_of(4));
    }

    #[test]
    fn choose_victim_prefers_oldest_unpinned() {
        let mut slots: Vec<Slot> = (0..4).map(|_| Slot::new(8)).collect();
        slots[0].owner = Some(FileId::for_test(1));
        slots[0].pinned = true;
        let age = AgeIndex::new(4);
        // slot 0 is pinned, slot 1 is unbound: victim should be 1.
        assert_eq!(choose_victim(&slots, &age, None), Some(1));
    }

    #[test]
    fn choose_victim_falls_back_to_caller_curbuf_when_all_pinned() {
        let mut slots: Vec<Slot> = (0..2).map(|_| Slot::new(8)).collect();
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.owner = Some(FileId::for_test(i as u64));
            slot.pinned = true;
        }
        let age = AgeIndex::new(2);
        assert_eq!(choose_victim(&slots, &age, Some(1)), Some(1));
    }
}
