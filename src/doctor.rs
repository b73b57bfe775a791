//! The diagnostic engine: x-ray (read-only structural validation) and
//! rectify (write back the values x-ray expected).
//!
//! Two independent checks exist. [`Doctor::xray`] walks every *materialized*
//! block and validates each word against the rule table for that block's
//! kind. [`Doctor::xray_bitmap`] instead walks the directory tree from the
//! root and cross-checks which blocks are reachable against which blocks
//! the bitmap claims are allocated.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::bitmap::{locate_allocation_bit, Allocator};
use crate::cache::BlockCache;
use crate::error::Result;
use crate::types::WritableBlockDevice;
use crate::volume::BlockKind;

/// The kind of structural anomaly found at one word of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrayErrorKind {
    /// Word holds something other than a single expected constant.
    ExpectedValue,
    /// Word exceeds an upper bound (e.g. bytes-in-block vs. payload size).
    ExpectedSmaller,
    /// Word should reference *some* existing block but references nothing or out-of-range.
    ExpectedRef,
    /// Word should reference this block itself.
    ExpectedSelfRef,
    /// Word should reference a FileHeader block.
    ExpectedFileHeaderBlock,
    /// Word should reference a FileHeader or UserDir block (hash-chain entries).
    ExpectedHashableBlock,
    /// Word should reference a Root or UserDir block (parent directory).
    ExpectedUserDirOrRoot,
    /// Word should reference a FileList block.
    ExpectedFileListBlock,
    /// Word should reference a Bitmap block.
    ExpectedBitmapBlock,
    /// Word should reference a BitmapExt block.
    ExpectedBitmapExtBlock,
    /// Word should reference a data block (DataOfs under OFS).
    ExpectedDataBlock,
    /// Word is a 1-based data-block sequence number and must not be zero.
    ExpectedDataBlockNr,
    /// Root's word 3 must equal this volume's hash table size.
    InvalidHashTableSize,
}

/// One validation failure, with enough context to display or rectify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrayError {
    /// Block the error was found in.
    pub block: u32,
    /// Dual-indexed word position within the block.
    pub word: i32,
    /// What went wrong.
    pub kind: XrayErrorKind,
    /// The value a rectify pass would write back, if one could be computed.
    pub expected: Option<u32>,
    /// The value actually found.
    pub found: u32,
}

/// Outcome of a block x-ray pass.
#[derive(Debug, Clone, Default)]
pub struct XrayReport {
    /// Every individual anomaly found, in block-then-word order.
    pub errors: Vec<XrayError>,
    /// The set of block numbers that had at least one anomaly.
    pub erroneous_blocks: BTreeSet<u32>,
}

/// One bitmap-reachability anomaly. Mirrors the reference diagnosis codes:
/// 1 = allocated but unreachable from the root, 2 = reachable but marked free.
pub type BitmapError = u8;

/// Outcome of a bitmap x-ray pass.
#[derive(Debug, Clone, Default)]
pub struct BitmapReport {
    /// `block -> 1|2` for every block whose allocation state disagrees with
    /// tree reachability.
    pub bitmap_errors: BTreeMap<u32, BitmapError>,
    /// Blocks marked allocated that no file or directory actually references.
    pub unused_but_allocated: Vec<u32>,
    /// Blocks referenced by the tree that the bitmap marks free.
    pub used_but_unallocated: Vec<u32>,
}

/// The x-ray/rectify engine. Stateless beyond the `strict` flag: every pass
/// takes the cache (and, for bitmap checks, the allocator) it operates on.
#[derive(Debug, Clone, Copy)]
pub struct Doctor {
    /// When true, legacy-disk tolerances are disabled: zero-filled spare
    /// words, back-references, and the hash-table-size field are checked
    /// exactly; when false, several fields long-lived real-world floppies
    /// are known to get wrong are skipped.
    pub strict: bool,
}

impl Doctor {
    /// Build a doctor with the given strictness.
    pub const fn new(strict: bool) -> Self {
        Self { strict }
    }

    fn kind_at<D: WritableBlockDevice>(cache: &mut BlockCache<D>, nr: u32) -> BlockKind {
        if nr == 0 || nr >= cache.capacity() {
            return BlockKind::Unknown;
        }
        cache.fetch(nr).map(|b| b.kind()).unwrap_or(BlockKind::Unknown)
    }

    /// Validate every word of block `nr`, assuming it already has kind
    /// `kind` and is byte-identical to what a live fetch would return
    /// (`bytes`/`bsize` are a snapshot so cross-reference lookups on the
    /// cache don't alias the block being checked).
    fn xray_word<D: WritableBlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        layout_hash_table_size: usize,
        nr: u32,
        kind: BlockKind,
        bytes: &[u8],
        word: i32,
    ) -> Option<XrayError> {
        let bsize_words = bytes.len() as i32 / 4;
        let sword = word - bsize_words;
        let off = (word as usize) * 4;
        if off + 4 > bytes.len() {
            return None;
        }
        let value = u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);

        let expect_value = |exp: u32, value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            if value != exp { Some((XrayErrorKind::ExpectedValue, Some(exp))) } else { None }
        };
        let expect_checksum = |value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            let sum = crate::checksum::normal_sum_slice(bytes, self.checksum_offset(kind));
            if value != sum { Some((XrayErrorKind::ExpectedValue, Some(sum))) } else { None }
        };
        let expect_selfref = |value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            if value != nr { Some((XrayErrorKind::ExpectedSelfRef, Some(nr))) } else { None }
        };
        let expect_hashable = |cache: &mut BlockCache<D>, value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            let k = Self::kind_at(cache, value);
            if !matches!(k, BlockKind::FileHeader | BlockKind::UserDir) {
                Some((XrayErrorKind::ExpectedHashableBlock, None))
            } else {
                None
            }
        };
        let expect_bitmap = |cache: &mut BlockCache<D>, value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            if Self::kind_at(cache, value) != BlockKind::Bitmap {
                Some((XrayErrorKind::ExpectedBitmapBlock, None))
            } else {
                None
            }
        };
        let expect_parent = |cache: &mut BlockCache<D>, value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            let k = Self::kind_at(cache, value);
            if !matches!(k, BlockKind::Root | BlockKind::UserDir) {
                Some((XrayErrorKind::ExpectedUserDirOrRoot, None))
            } else {
                None
            }
        };
        let expect_filelist = |cache: &mut BlockCache<D>, value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            let k = Self::kind_at(cache, value);
            if k != BlockKind::FileList { Some((XrayErrorKind::ExpectedFileListBlock, None)) } else { None }
        };
        let expect_fileheader = |cache: &mut BlockCache<D>, value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            let k = Self::kind_at(cache, value);
            if k != BlockKind::FileHeader { Some((XrayErrorKind::ExpectedFileHeaderBlock, None)) } else { None }
        };
        let expect_data = |cache: &mut BlockCache<D>, value: u32| -> Option<(XrayErrorKind, Option<u32>)> {
            let k = Self::kind_at(cache, value);
            if !matches!(k, BlockKind::DataOfs | BlockKind::DataFfs) {
                Some((XrayErrorKind::ExpectedDataBlock, None))
            } else {
                None
            }
        };

        let outcome: Option<(XrayErrorKind, Option<u32>)> = match kind {
            BlockKind::Boot if nr == 0 => {
                if word == 0 {
                    let dos = u32::from_be_bytes([b'D', b'O', b'S', bytes.get(3).copied().unwrap_or(0)]);
                    expect_value(dos, value)
                } else if word == 1 {
                    None
                } else {
                    None
                }
            }
            BlockKind::Root => match word {
                0 => expect_value(2, value),
                1 if self.strict => expect_value(0, value),
                2 if self.strict => expect_value(0, value),
                3 if self.strict => {
                    if value as usize != layout_hash_table_size {
                        Some((XrayErrorKind::InvalidHashTableSize, Some(layout_hash_table_size as u32)))
                    } else {
                        None
                    }
                }
                4 => expect_value(0, value),
                5 => expect_checksum(value),
                _ => match sword {
                    -24 => {
                        if value != 0 { expect_bitmap_ext(cache, value) } else { None }
                    }
                    -4 | -3 | -2 if self.strict => expect_value(0, value),
                    -1 => expect_value(1, value),
                    _ if word >= 6 && sword <= -51 => {
                        if value != 0 { expect_hashable(cache, value) } else { None }
                    }
                    _ if (-49..=-25).contains(&sword) => {
                        if value != 0 { expect_bitmap(cache, value) } else { None }
                    }
                    _ => None,
                },
            },
            BlockKind::Bitmap => {
                if word == 0 { expect_checksum(value) } else { None }
            }
            BlockKind::BitmapExt => {
                if word == bsize_words - 1 {
                    if value != 0 { expect_bitmap_ext(cache, value) } else { None }
                } else {
                    None
                }
            }
            BlockKind::UserDir => match word {
                0 => expect_value(2, value),
                1 => expect_selfref(value),
                2 | 3 | 4 => expect_value(0, value),
                5 => expect_checksum(value),
                _ => match sword {
                    -4 => {
                        if value != 0 { expect_hashable(cache, value) } else { None }
                    }
                    -3 => expect_parent(cache, value),
                    -2 => expect_value(0, value),
                    -1 => expect_value(2, value),
                    _ if word <= -51 => {
                        if value != 0 { expect_hashable(cache, value) } else { None }
                    }
                    _ => None,
                },
            },
            BlockKind::FileHeader => match word {
                0 => expect_value(2, value),
                1 => expect_selfref(value),
                3 => expect_value(0, value),
                5 => expect_checksum(value),
                4 => {
                    let num_refs = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
                    if num_refs != 0 {
                        expect_data(cache, value)
                    } else {
                        expect_value(0, value)
                    }
                }
                _ => {
                    if word >= 6 && sword <= -51 {
                        let index = -51 - sword;
                        let num_refs = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as i32;
                        if index < num_refs {
                            if value != 0 { expect_data(cache, value) } else { None }
                        } else {
                            expect_value(0, value)
                        }
                    } else {
                        match sword {
                            -50 => expect_value(0, value),
                            -4 if self.strict => {
                                if value != 0 { expect_hashable(cache, value) } else { None }
                            }
                            -3 if self.strict => expect_parent(cache, value),
                            -2 => {
                                if value != 0 { expect_filelist(cache, value) } else { None }
                            }
                            -1 => expect_value((-3i32) as u32, value),
                            _ => None,
                        }
                    }
                }
            },
            BlockKind::FileList => match word {
                0 => expect_value(16, value),
                1 => expect_selfref(value),
                3 => expect_value(0, value),
                4 => {
                    if value != 0 { expect_data(cache, value) } else { None }
                }
                5 => expect_checksum(value),
                _ => {
                    if word >= 6 && sword <= -51 {
                        let index = -51 - sword;
                        let num_refs = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as i32;
                        if index < num_refs {
                            if value != 0 { expect_data(cache, value) } else { None }
                        } else {
                            expect_value(0, value)
                        }
                    } else if (-50..=-4).contains(&sword) {
                        expect_value(0, value)
                    } else {
                        match sword {
                            -3 if self.strict => expect_fileheader(cache, value),
                            -2 => {
                                if value != 0 { expect_filelist(cache, value) } else { None }
                            }
                            -1 => expect_value((-3i32) as u32, value),
                            _ => None,
                        }
                    }
                }
            },
            BlockKind::DataOfs => match word {
                0 => expect_value(8, value),
                1 => {
                    if self.strict && value != 0 { expect_fileheader(cache, value) } else { None }
                }
                2 => {
                    if value == 0 { Some((XrayErrorKind::ExpectedDataBlockNr, None)) } else { None }
                }
                3 => {
                    let max_payload = bytes.len() as u32 - 24;
                    if value > max_payload {
                        Some((XrayErrorKind::ExpectedSmaller, Some(max_payload)))
                    } else {
                        None
                    }
                }
                4 => {
                    if value != 0 { expect_data(cache, value) } else { None }
                }
                5 => expect_checksum(value),
                _ => None,
            },
            _ => None,
        };

        outcome.map(|(k, expected)| XrayError { block: nr, word, kind: k, expected, found: value })
    }

    fn checksum_offset(&self, kind: BlockKind) -> usize {
        match kind {
            BlockKind::Bitmap => 0,
            _ => 20,
        }
    }

    /// X-ray a single block, returning every word-level anomaly found.
    pub fn xray_block<D: WritableBlockDevice>(&self, cache: &mut BlockCache<D>, nr: u32) -> Result<Vec<XrayError>> {
        let (kind, bytes) = {
            let block = cache.fetch(nr)?;
            (block.kind(), block.bytes().to_vec())
        };
        let table_size = cache.layout().hash_table_size();
        let words = bytes.len() as i32 / 4;
        let mut errors = Vec::new();
        for word in 0..words {
            if let Some(err) = self.xray_word(cache, table_size, nr, kind, &bytes, word) {
                errors.push(err);
            }
        }
        Ok(errors)
    }

    /// X-ray every materialized block in the cache.
    pub fn xray<D: WritableBlockDevice>(&self, cache: &mut BlockCache<D>) -> Result<XrayReport> {
        let mut report = XrayReport::default();
        for nr in cache.resident_blocks() {
            let errors = self.xray_block(cache, nr)?;
            if !errors.is_empty() {
                report.erroneous_blocks.insert(nr);
                report.errors.extend(errors);
            }
        }
        Ok(report)
    }

    /// Write back the `expected` value for every word-level anomaly found
    /// by a prior [`Doctor::xray`] pass.
    pub fn rectify<D: WritableBlockDevice>(&self, cache: &mut BlockCache<D>, report: &XrayReport) -> Result<()> {
        for err in &report.errors {
            if let Some(expected) = err.expected {
                cache.modify(err.block, |b| b.set_word(err.word, expected))?;
            }
        }
        Ok(())
    }

    /// Walk the directory tree from `root_nr`, collect every block a file
    /// or directory actually references, add in the bitmap pages and their
    /// extension chain themselves (they're allocated but never reachable by
    /// a hash-chain walk), and cross-check that set against what the
    /// allocator believes is allocated.
    pub fn xray_bitmap<D: WritableBlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        allocator: &Allocator,
        root_nr: u32,
        bm_blocks: &[u32],
        bm_ext_blocks: &[u32],
    ) -> Result<BitmapReport> {
        let mut used: BTreeSet<u32> = BTreeSet::new();
        let mut queue = alloc::collections::VecDeque::new();
        queue.push_back(root_nr);
        used.insert(root_nr);
        for &nr in bm_blocks.iter().chain(bm_ext_blocks.iter()) {
            used.insert(nr);
        }

        while let Some(nr) = queue.pop_front() {
            let kind = cache.fetch(nr)?.kind();
            if kind.is_directory() {
                let table_size = cache.fetch(nr)?.hash_table_size();
                for i in 0..table_size {
                    let mut next = cache.fetch(nr)?.hash_ref(i);
                    while next != 0 && used.insert(next) {
                        queue.push_back(next);
                        next = cache.fetch(next)?.next_hash_ref();
                        if next != 0 && used.contains(&next) {
                            break;
                        }
                    }
                }
            } else if kind == BlockKind::FileHeader {
                let mut list_nr = nr;
                loop {
                    let (num_refs, next_list) = {
                        let b = cache.fetch(list_nr)?;
                        (b.num_data_block_refs() as usize, b.next_list_ref())
                    };
                    let max_refs = cache.fetch(list_nr)?.max_data_block_refs();
                    for i in 0..num_refs.min(max_refs) {
                        let data_nr = cache.fetch(list_nr)?.data_block_ref(i);
                        if data_nr != 0 {
                            used.insert(data_nr);
                        }
                    }
                    if next_list == 0 || !used.insert(next_list) {
                        break;
                    }
                    list_nr = next_list;
                }
            }
        }

        let mut report = BitmapReport::default();
        for nr in 2..allocator.capacity() {
            let allocated = allocator.is_allocated(nr);
            let contained = used.contains(&nr);
            if allocated && !contained {
                report.unused_but_allocated.push(nr);
                report.bitmap_errors.insert(nr, 1);
            } else if !allocated && contained {
                report.used_but_unallocated.push(nr);
                report.bitmap_errors.insert(nr, 2);
            }
        }
        Ok(report)
    }

    /// Bring the bitmap back into agreement with tree reachability: blocks
    /// allocated-but-unused become free, blocks used-but-unallocated become
    /// allocated. The bitmap, never the tree, is corrected.
    pub fn rectify_bitmap<D: WritableBlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        allocator: &mut Allocator,
        bm_pages: &[u32],
        report: &BitmapReport,
    ) -> Result<()> {
        for &nr in &report.unused_but_allocated {
            allocator.mark_free(nr);
            write_allocation_bit(cache, bm_pages, nr, true)?;
        }
        for &nr in &report.used_but_unallocated {
            allocator.mark_allocated(nr);
            write_allocation_bit(cache, bm_pages, nr, false)?;
        }
        Ok(())
    }
}

fn expect_bitmap_ext<D: WritableBlockDevice>(cache: &mut BlockCache<D>, value: u32) -> Option<(XrayErrorKind, Option<u32>)> {
    if Doctor::kind_at(cache, value) != BlockKind::BitmapExt {
        Some((XrayErrorKind::ExpectedBitmapExtBlock, None))
    } else {
        None
    }
}

fn write_allocation_bit<D: WritableBlockDevice>(cache: &mut BlockCache<D>, bm_pages: &[u32], nr: u32, free: bool) -> Result<()> {
    let bsize = cache.layout().bsize;
    if let Some((page_idx, byte, bit)) = locate_allocation_bit(nr, bsize, bm_pages.len()) {
        if let Some(&page_nr) = bm_pages.get(page_idx) {
            cache.modify(page_nr, |b| {
                let byte_val = &mut b.bytes_mut()[byte];
                if free {
                    *byte_val |= 1 << bit;
                } else {
                    *byte_val &= !(1 << bit);
                }
            })?;
            cache.modify(page_nr, |b| b.fix_checksum())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockDevice, FsFlags, FsType};
    use crate::volume::VolumeLayout;

    struct MemDevice {
        blocks: Vec<[u8; 512]>,
    }

    impl MemDevice {
        fn new(capacity: u32) -> Self {
            Self { blocks: alloc::vec![[0u8; 512]; capacity as usize] }
        }
    }

    impl BlockDevice for MemDevice {
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
            capacity: 50,
            bsize: 512,
            fs_type: FsType::Ofs,
            flags: FsFlags::default(),
            root_nr: 10,
            bm_blocks: alloc::vec![11],
            bm_ext_blocks: Vec::new(),
            reserved: 2,
        }
    }

    fn make_root(cache: &mut BlockCache<MemDevice>, nr: u32) {
        cache
            .modify(nr, |b| {
                b.set_kind(BlockKind::Root);
                b.set_word(0, 2);
                b.set_word(-1, 1);
                b.fix_checksum();
            })
            .unwrap();
    }

    #[test]
    fn test_xray_detects_wrong_block_type() {
        let lay = layout();
        let mut cache = BlockCache::new(MemDevice::new(50), lay);
        make_root(&mut cache, 10);
        cache.modify(10, |b| b.set_word(0, 99)).unwrap();

        let doctor = Doctor::new(false);
        let errors = doctor.xray_block(&mut cache, 10).unwrap();
        assert!(errors.iter().any(|e| e.word == 0 && e.kind == XrayErrorKind::ExpectedValue));
    }

    #[test]
    fn test_xray_clean_root_has_no_errors() {
        let lay = layout();
        let mut cache = BlockCache::new(MemDevice::new(50), lay);
        make_root(&mut cache, 10);

        let doctor = Doctor::new(false);
        let errors = doctor.xray_block(&mut cache, 10).unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_rectify_fixes_checksum() {
        let lay = layout();
        let mut cache = BlockCache::new(MemDevice::new(50), lay);
        make_root(&mut cache, 10);
        cache.modify(10, |b| b.set_word(5, 0xBAD)).unwrap();

        let doctor = Doctor::new(false);
        let report = doctor.xray(&mut cache).unwrap();
        assert!(!report.errors.is_empty());
        doctor.rectify(&mut cache, &report).unwrap();

        let report2 = doctor.xray(&mut cache).unwrap();
        assert!(report2.errors.is_empty());
    }

    #[test]
    fn test_xray_bitmap_finds_allocated_but_unreferenced_block() {
        let lay = layout();
        let mut cache = BlockCache::new(MemDevice::new(50), lay);
        make_root(&mut cache, 10);

        let mut allocator = Allocator::new(50, 512);
        allocator.mark_allocated(30);

        let doctor = Doctor::new(false);
        let report = doctor.xray_bitmap(&mut cache, &allocator, 10, &[11], &[]).unwrap();
        assert_eq!(report.bitmap_errors.get(&30), Some(&1));
    }
}
