//! Lazily-materialized, dirty-tracking cache of a volume's blocks.
//!
//! Only blocks that have actually been touched are held in memory; every
//! other block is implicitly [`BlockKind::Empty`], exactly like the
//! reference filesystem's sparse block map.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::error::{AffsError, Result};
use crate::raw::RawBlock;
use crate::types::WritableBlockDevice;
use crate::volume::{BlockKind, VolumeLayout};

/// Coarse health classification used by [`BlockCache::health_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHealth {
    /// Never materialized / all zero.
    Free,
    /// Materialized, no known error.
    Used,
    /// The doctor flagged a structural error in this block.
    Erroneous,
}

/// Sparse, write-back cache of a volume's blocks over a [`WritableBlockDevice`].
pub struct BlockCache<D: WritableBlockDevice> {
    device: D,
    layout: VolumeLayout,
    blocks: BTreeMap<u32, RawBlock>,
    dirty: BTreeSet<u32>,
}

impl<D: WritableBlockDevice> BlockCache<D> {
    /// Wrap `device` under `layout`. Nothing is read from the device until
    /// a block is actually fetched.
    pub fn new(device: D, layout: VolumeLayout) -> Self {
        Self { device, layout, blocks: BTreeMap::new(), dirty: BTreeSet::new() }
    }

    /// Volume geometry this cache was opened with.
    #[inline]
    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    /// Total number of blocks on the volume.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.layout.capacity
    }

    /// Number of blocks currently materialized in memory.
    pub fn resident_count(&self) -> usize {
        self.blocks.len()
    }

    fn check_range(&self, nr: u32) -> Result<()> {
        if nr >= self.layout.capacity { Err(AffsError::BlockOutOfRange) } else { Ok(()) }
    }

    /// Fetch a block, reading it from the device and decoding it the first
    /// time it's touched. Never panics on a malformed block; its kind will
    /// simply be [`BlockKind::Unknown`]. The device's block size must be
    /// 512 bytes, matching [`crate::BlockDevice::read_block`]'s fixed-size
    /// buffer (variable block-size hard-disk volumes are handled by the
    /// separate read-only [`crate::AffsReaderVar`] path instead).
    pub fn fetch(&mut self, nr: u32) -> Result<&RawBlock> {
        self.check_range(nr)?;
        if !self.blocks.contains_key(&nr) {
            let mut sector = [0u8; 512];
            self.device.read_block(nr, &mut sector).map_err(|_| AffsError::BlockReadError)?;
            let buf = sector[..self.layout.bsize as usize].to_vec();
            let block = RawBlock::new(nr, buf, &self.layout);
            self.blocks.insert(nr, block);
        }
        Ok(self.blocks.get(&nr).expect("just inserted"))
    }

    /// Fetch a block only if it already has (or, once decoded, turns out to
    /// have) the expected kind.
    pub fn fetch_typed(&mut self, nr: u32, kind: BlockKind) -> Result<Option<&RawBlock>> {
        self.fetch(nr)?;
        let matches = self.blocks.get(&nr).is_some_and(|b| b.kind() == kind);
        Ok(if matches { self.blocks.get(&nr) } else { None })
    }

    /// Fetch a block for mutation; any change made through the returned
    /// reference must be followed by [`BlockCache::mark_dirty`], or use
    /// [`BlockCache::modify`] which does this automatically.
    pub fn fetch_mut(&mut self, nr: u32) -> Result<&mut RawBlock> {
        self.fetch(nr)?;
        Ok(self.blocks.get_mut(&nr).expect("just fetched"))
    }

    /// Mark a resident block dirty (needs to be written back on flush).
    pub fn mark_dirty(&mut self, nr: u32) {
        self.dirty.insert(nr);
    }

    /// Fetch, mutate through `f`, and mark the block dirty in one step.
    pub fn modify<R>(&mut self, nr: u32, f: impl FnOnce(&mut RawBlock) -> R) -> Result<R> {
        let block = self.fetch_mut(nr)?;
        let result = f(block);
        self.mark_dirty(nr);
        Ok(result)
    }

    /// Drop a block's cached entry and any pending dirty marker without
    /// writing anything back. Used by reclaim so a freed block is never
    /// flushed with stale (or zeroed) content.
    pub fn erase(&mut self, nr: u32) -> Result<()> {
        self.check_range(nr)?;
        self.blocks.remove(&nr);
        self.dirty.remove(&nr);
        Ok(())
    }

    /// Write a single dirty block back to the device, if it is dirty.
    /// Recomputes the block's checksum first, so callers never need to call
    /// [`RawBlock::fix_checksum`] themselves before a flush.
    pub fn flush(&mut self, nr: u32) -> Result<()> {
        if self.dirty.remove(&nr) {
            if let Some(block) = self.blocks.get_mut(&nr) {
                block.fix_checksum();
            }
            if let Some(block) = self.blocks.get(&nr) {
                self.device.write_block(nr, block.bytes())?;
            }
        }
        Ok(())
    }

    /// Write back every dirty block. Bitmap pages are flushed last, so a
    /// crash mid-flush never leaves the bitmap claiming a block free that a
    /// just-written directory or file already references.
    pub fn flush_all(&mut self) -> Result<()> {
        let mut dirty: Vec<u32> = self.dirty.iter().copied().collect();
        dirty.sort_by_key(|nr| self.blocks.get(nr).is_some_and(|b| b.kind() == BlockKind::Bitmap));
        for nr in dirty {
            self.flush(nr)?;
        }
        Ok(())
    }

    /// True if block `nr` has unwritten changes.
    pub fn is_dirty(&self, nr: u32) -> bool {
        self.dirty.contains(&nr)
    }

    /// All materialized block numbers, in ascending order.
    pub fn resident_blocks(&self) -> Vec<u32> {
        self.blocks.keys().copied().collect()
    }

    /// Downsample the volume into `len` bins, each holding the
    /// highest-priority [`BlockKind`] found among the blocks that map to
    /// it (see [`BlockKind::priority`]). Used to render a block-usage
    /// overview without needing one pixel per block.
    pub fn usage_map(&self, len: usize) -> Vec<BlockKind> {
        let max = self.layout.capacity as usize;
        let mut buf = alloc::vec![BlockKind::Unknown; len];
        if len == 0 || max == 0 {
            return buf;
        }
        let bucket = |i: usize| if max > 1 { i * (len - 1) / (max - 1) } else { 0 };

        for i in 0..max {
            buf[bucket(i)] = BlockKind::Empty;
        }
        for (&nr, block) in &self.blocks {
            let pos = bucket(nr as usize);
            if block.kind().priority() >= buf[pos].priority() {
                buf[pos] = block.kind();
            }
        }
        buf
    }

    /// Downsample allocation-vs-bitmap-reachability state into `len` bins.
    /// `code` per bin: 0 = free, 1 = used, 2 = unused-but-allocated,
    /// 3 = used-but-unallocated (see [`crate::doctor::Doctor::xray_bitmap`]).
    pub fn allocation_map(&self, len: usize, unused_but_allocated: &BTreeSet<u32>, used_but_unallocated: &BTreeSet<u32>) -> Vec<u8> {
        let max = self.layout.capacity as usize;
        let mut buf = alloc::vec![255u8; len];
        if len == 0 || max == 0 {
            return buf;
        }
        let bucket = |i: usize| if max > 1 { i * (len - 1) / (max - 1) } else { 0 };

        for i in 0..max {
            buf[bucket(i)] = 0;
        }
        for (&nr, block) in &self.blocks {
            if block.kind() != BlockKind::Empty {
                buf[bucket(nr as usize)] = 1;
            }
        }
        for &nr in unused_but_allocated {
            buf[bucket(nr as usize)] = 2;
        }
        for &nr in used_but_unallocated {
            buf[bucket(nr as usize)] = 3;
        }
        fill_gaps(&mut buf);
        buf
    }

    /// Downsample x-ray health into `len` bins. `code`: 0 = free, 1 = used,
    /// 2 = erroneous (present in `erroneous_blocks`).
    pub fn health_map(&self, len: usize, erroneous_blocks: &BTreeSet<u32>) -> Vec<u8> {
        let max = self.layout.capacity as usize;
        let mut buf = alloc::vec![255u8; len];
        if len == 0 || max == 0 {
            return buf;
        }
        let bucket = |i: usize| if max > 1 { i * (len - 1) / (max - 1) } else { 0 };

        for i in 0..max {
            buf[bucket(i)] = 0;
        }
        for (&nr, block) in &self.blocks {
            if block.kind() != BlockKind::Empty {
                buf[bucket(nr as usize)] = 1;
            }
        }
        for &nr in erroneous_blocks {
            buf[bucket(nr as usize)] = 2;
        }
        fill_gaps(&mut buf);
        buf
    }
}

fn fill_gaps(buf: &mut [u8]) {
    for i in 1..buf.len() {
        if buf[i] == 255 {
            buf[i] = buf[i - 1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FsType;

    struct MemDevice {
        blocks: Vec<[u8; 512]>,
    }

    impl MemDevice {
        fn new(capacity: u32) -> Self {
            Self { blocks: alloc::vec![[0u8; 512]; capacity as usize] }
        }
    }

    impl crate::types::BlockDevice for MemDevice {
        fn read_block(&self, block: u32, buf: &mut [u8; 512]) -> core::result::Result<(), ()> {
            buf.copy_from_slice(self.blocks.get(block as usize).ok_or(())?);
            Ok(())
        }
    }

    impl WritableBlockDevice for MemDevice {
        fn write_block(&mut self, block: u32, buf: &[u8]) -> core::result::Result<(), crate::DeviceError> {
            let slot = self.blocks.get_mut(block as usize).ok_or(crate::DeviceError::OutOfRange)?;
            slot.copy_from_slice(buf);
            Ok(())
        }

        fn capacity(&self) -> u32 {
            self.blocks.len() as u32
        }

        fn block_size(&self) -> u32 {
            512
        }
    }

    fn layout() -> VolumeLayout {
        VolumeLayout {
            capacity: 20,
            bsize: 512,
            fs_type: FsType::Ofs,
            flags: Default::default(),
            root_nr: 10,
            bm_blocks: alloc::vec![11],
            bm_ext_blocks: Vec::new(),
            reserved: 2,
        }
    }

    #[test]
    fn test_fetch_materializes_empty_block() {
        let mut cache = BlockCache::new(MemDevice::new(20), layout());
        let block = cache.fetch(5).unwrap();
        assert_eq!(block.kind(), BlockKind::Empty);
        assert_eq!(cache.resident_count(), 1);
    }

    #[test]
    fn test_modify_marks_dirty_and_flush_persists() {
        let mut cache = BlockCache::new(MemDevice::new(20), layout());
        cache.modify(5, |b| b.set_word(2, 0xDEAD_BEEF)).unwrap();
        assert!(cache.is_dirty(5));
        cache.flush_all().unwrap();
        assert!(!cache.is_dirty(5));
        assert_eq!(cache.device.blocks[5][8..12], 0xDEAD_BEEFu32.to_be_bytes());
    }

    #[test]
    fn test_fetch_out_of_range() {
        let mut cache = BlockCache::new(MemDevice::new(20), layout());
        assert_eq!(cache.fetch(20), Err(AffsError::BlockOutOfRange));
    }

    #[test]
    fn test_erase_evicts_without_writeback() {
        let mut cache = BlockCache::new(MemDevice::new(20), layout());
        cache.modify(5, |b| b.set_word(2, 1)).unwrap();
        cache.erase(5).unwrap();
        assert_eq!(cache.resident_count(), 0);
        assert!(!cache.is_dirty(5));
        // Nothing was written back: the device's block 5 is still zeroed.
        assert_eq!(cache.device.blocks[5], [0u8; 512]);
    }
}
