use std::collections::BTreeMap;

/// Free extents below the top of the temporary stack, keyed by offset.
///
/// Extents never overlap and never touch the top of the stack: releasing the topmost live
/// extent shrinks the stack instead, and [`TempFreeList::compress`] folds any extent that ends
/// up at the top back into it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TempFreeList {
    extents: BTreeMap<u32, u32>,
    current_size: u32,
    max_size: u32,
}

impl TempFreeList {
    /// Words between the bottom of the stack and the top of the highest live extent.
    pub fn current_size(&self) -> u32 {
        self.current_size
    }

    /// The high-water mark, i.e. the number of temporary words the program needs.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn extents(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.extents.iter().map(|(offset, size)| (*offset, *size))
    }

    pub fn free_words(&self) -> u32 {
        self.extents.values().sum()
    }

    /// First-fit allocation. Returns the offset of the allocated extent.
    pub fn alloc(&mut self, size: u32) -> u32 {
        debug_assert!(size > 0);
        let found = self
            .extents
            .iter()
            .find(|(_, extent)| **extent >= size)
            .map(|(offset, extent)| (*offset, *extent));
        match found {
            Some((offset, extent)) if extent == size => {
                self.extents.remove(&offset);
                offset
            }
            Some((offset, extent)) => {
                self.extents.remove(&offset);
                self.extents.insert(offset + size, extent - size);
                offset
            }
            None => {
                let offset = self.current_size;
                self.current_size += size;
                self.max_size = self.max_size.max(self.current_size);
                offset
            }
        }
    }

    /// Words `alloc(size)` would add to the top of the stack.
    pub fn growth_for(&self, size: u32) -> u32 {
        if self.extents.values().any(|extent| *extent >= size) {
            0
        } else {
            size
        }
    }

    pub fn release(&mut self, offset: u32, size: u32) {
        debug_assert!(offset + size <= self.current_size);
        debug_assert!(
            self.extents
                .iter()
                .all(|(o, s)| offset + size <= *o || o + s <= offset),
            "release of {offset}+{size} overlaps a free extent"
        );
        if offset + size == self.current_size {
            self.current_size = offset;
        } else {
            self.extents.insert(offset, size);
        }
        self.compress();
    }

    /// Merges adjacent extents and drops the ones that reach the top of the stack.
    pub fn compress(&mut self) {
        let mut merged: BTreeMap<u32, u32> = BTreeMap::new();
        for (offset, size) in std::mem::take(&mut self.extents) {
            match merged.iter_mut().next_back() {
                Some((last_offset, last_size)) if *last_offset + *last_size == offset => {
                    *last_size += size;
                }
                _ => {
                    merged.insert(offset, size);
                }
            }
        }
        while let Some((&offset, &size)) = merged.iter().next_back() {
            if offset + size != self.current_size {
                break;
            }
            merged.remove(&offset);
            self.current_size = offset;
        }
        self.extents = merged;
    }
}
