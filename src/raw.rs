//! Typed, dual-indexed access to a single in-memory block.
//!
//! A [`RawBlock`] owns one block's bytes plus its inferred [`BlockKind`] and
//! never panics on a malformed field: callers ask for a word or a BCPL
//! string at a dual-indexed offset and get back a value or `None`/`0`,
//! exactly as if the disk had always held that content. The Doctor is what
//! decides whether the content was actually valid.

use alloc::string::String;
use alloc::vec::Vec;

use crate::checksum::{read_i32_be_slice, read_u32_be_slice};
use crate::constants::*;
use crate::date::AmigaDate;
use crate::volume::{BlockKind, VolumeLayout, get_word, kind_of, word_index};

/// One block's bytes, with its block number and the volume geometry needed
/// to resolve dual-indexed offsets.
#[derive(Debug, Clone)]
pub struct RawBlock {
    nr: u32,
    bsize: usize,
    bytes: Vec<u8>,
    kind: BlockKind,
}

impl RawBlock {
    /// Wrap `bytes` as block `nr`, inferring its kind from `layout`.
    pub fn new(nr: u32, bytes: Vec<u8>, layout: &VolumeLayout) -> Self {
        let bsize = bytes.len();
        let kind = kind_of(nr, layout, &bytes);
        Self { nr, bsize, bytes, kind }
    }

    /// All zero bytes, classified as [`BlockKind::Empty`].
    pub fn empty(nr: u32, bsize: usize) -> Self {
        Self { nr, bsize, bytes: alloc::vec![0u8; bsize], kind: BlockKind::Empty }
    }

    /// Block number.
    #[inline]
    pub const fn nr(&self) -> u32 {
        self.nr
    }

    /// Block size in bytes.
    #[inline]
    pub const fn bsize(&self) -> usize {
        self.bsize
    }

    /// Inferred kind.
    #[inline]
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Force this block's kind, e.g. right after formatting it as a
    /// particular type (the content hasn't settled enough for [`kind_of`]
    /// to infer it correctly yet).
    pub fn set_kind(&mut self, kind: BlockKind) {
        self.kind = kind;
    }

    /// Raw byte slice.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw byte slice. Mutating directly bypasses kind tracking;
    /// callers that change the block's type should follow up with
    /// [`RawBlock::set_kind`].
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Read the unsigned word at dual-indexed position `w`.
    #[inline]
    pub fn word(&self, w: i32) -> u32 {
        get_word(&self.bytes, w)
    }

    /// Read the signed word at dual-indexed position `w`.
    #[inline]
    pub fn word_signed(&self, w: i32) -> i32 {
        let idx = word_index(w, self.bsize);
        read_i32_be_slice(&self.bytes, idx * 4)
    }

    /// Write the word at dual-indexed position `w`.
    pub fn set_word(&mut self, w: i32, val: u32) {
        let idx = word_index(w, self.bsize);
        let off = idx * 4;
        self.bytes[off..off + 4].copy_from_slice(&val.to_be_bytes());
    }

    /// Byte offset for dual-indexed word `w`.
    #[inline]
    pub fn byte_offset(&self, w: i32) -> usize {
        word_index(w, self.bsize) * 4
    }

    /// Primary block type word (word 0).
    #[inline]
    pub fn type_word(&self) -> i32 {
        self.word_signed(0)
    }

    /// Secondary type word (last word).
    #[inline]
    pub fn sub_type(&self) -> i32 {
        self.word_signed(-1)
    }

    /// Self-reference (word 1), present on every hashable/header/list/data(OFS) block.
    #[inline]
    pub fn self_ref(&self) -> u32 {
        self.word(1)
    }

    /// Checksum word for this block's kind (word 5, or word 0 for Bitmap).
    pub fn checksum_word(&self) -> Option<i32> {
        match self.kind {
            BlockKind::Root
            | BlockKind::UserDir
            | BlockKind::FileHeader
            | BlockKind::FileList
            | BlockKind::DataOfs => Some(5),
            BlockKind::Bitmap => Some(0),
            _ => None,
        }
    }

    /// Parent directory reference (word -3). 0 if not applicable.
    pub fn parent_ref(&self) -> u32 {
        match self.kind {
            BlockKind::UserDir | BlockKind::FileHeader => self.word(-3),
            _ => 0,
        }
    }

    /// Set the parent directory reference.
    pub fn set_parent_ref(&mut self, nr: u32) {
        if matches!(self.kind, BlockKind::UserDir | BlockKind::FileHeader) {
            self.set_word(-3, nr);
        }
    }

    /// File-header owner for FileList (word -3) / DataOfs (word 1) blocks.
    pub fn file_header_ref(&self) -> u32 {
        match self.kind {
            BlockKind::FileList => self.word(-3),
            BlockKind::DataOfs => self.word(1),
            _ => 0,
        }
    }

    /// Set the file-header owner reference.
    pub fn set_file_header_ref(&mut self, nr: u32) {
        match self.kind {
            BlockKind::FileList => self.set_word(-3, nr),
            BlockKind::DataOfs => self.set_word(1, nr),
            _ => {}
        }
    }

    /// Next block in this directory's hash chain (word -4). 0 = end of chain.
    pub fn next_hash_ref(&self) -> u32 {
        match self.kind {
            BlockKind::UserDir | BlockKind::FileHeader => self.word(-4),
            _ => 0,
        }
    }

    /// Set the next-hash-chain reference.
    pub fn set_next_hash_ref(&mut self, nr: u32) {
        if matches!(self.kind, BlockKind::UserDir | BlockKind::FileHeader) {
            self.set_word(-4, nr);
        }
    }

    /// Next file-list extension block (word -2). 0 = no more extensions.
    pub fn next_list_ref(&self) -> u32 {
        match self.kind {
            BlockKind::FileHeader | BlockKind::FileList => self.word(-2),
            _ => 0,
        }
    }

    /// Set the next-list-block reference.
    pub fn set_next_list_ref(&mut self, nr: u32) {
        if matches!(self.kind, BlockKind::FileHeader | BlockKind::FileList) {
            self.set_word(-2, nr);
        }
    }

    /// Next bitmap extension block (Root: word -24, BitmapExt: word -1).
    pub fn next_bm_ext_ref(&self) -> u32 {
        match self.kind {
            BlockKind::Root => self.word(-24),
            BlockKind::BitmapExt => self.word(-1),
            _ => 0,
        }
    }

    /// Set the next-bitmap-extension reference.
    pub fn set_next_bm_ext_ref(&mut self, nr: u32) {
        match self.kind {
            BlockKind::Root => self.set_word(-24, nr),
            BlockKind::BitmapExt => self.set_word(-1, nr),
            _ => {}
        }
    }

    /// First data block referenced by a FileHeader/FileList (word 4).
    pub fn first_data_block_ref(&self) -> u32 {
        match self.kind {
            BlockKind::FileHeader | BlockKind::FileList => self.word(4),
            _ => 0,
        }
    }

    /// Set the first-data-block reference (FileHeader/FileList, word 4).
    pub fn set_first_data_block_ref(&mut self, nr: u32) {
        if matches!(self.kind, BlockKind::FileHeader | BlockKind::FileList) {
            self.set_word(4, nr);
        }
    }

    /// Maximum data-block refs this block's hash table / ref table can hold.
    #[inline]
    pub const fn max_data_block_refs(&self) -> usize {
        (self.bsize / 4) - 56
    }

    /// Number of data-block refs actually recorded (word 2).
    pub fn num_data_block_refs(&self) -> u32 {
        match self.kind {
            BlockKind::FileHeader | BlockKind::FileList => self.word(2),
            _ => 0,
        }
    }

    /// Set the number of data-block refs recorded.
    pub fn set_num_data_block_refs(&mut self, n: u32) {
        if matches!(self.kind, BlockKind::FileHeader | BlockKind::FileList) {
            self.set_word(2, n);
        }
    }

    /// The `nr`-th data-block reference, stored backwards from the tail
    /// (word `-51-nr`).
    pub fn data_block_ref(&self, nr: usize) -> u32 {
        match self.kind {
            BlockKind::FileHeader | BlockKind::FileList => self.word(-51 - nr as i32),
            _ => 0,
        }
    }

    /// Set the `nr`-th data-block reference.
    pub fn set_data_block_ref(&mut self, nr: usize, val: u32) {
        if matches!(self.kind, BlockKind::FileHeader | BlockKind::FileList) {
            self.set_word(-51 - nr as i32, val);
        }
    }

    /// Next OFS data block in the chain (word 4, DataOfs only).
    pub fn next_data_ref(&self) -> u32 {
        if self.kind == BlockKind::DataOfs { self.word(4) } else { 0 }
    }

    /// Set the next-OFS-data-block reference.
    pub fn set_next_data_ref(&mut self, nr: u32) {
        if self.kind == BlockKind::DataOfs {
            self.set_word(4, nr);
        }
    }

    /// Sequence number of this OFS data block within its file (word 2, 1-based).
    pub fn data_block_nr(&self) -> u32 {
        if self.kind == BlockKind::DataOfs { self.word(2) } else { 0 }
    }

    /// Set the OFS data-block sequence number.
    pub fn set_data_block_nr(&mut self, n: u32) {
        if self.kind == BlockKind::DataOfs {
            self.set_word(2, n);
        }
    }

    /// Number of payload bytes actually stored in an OFS data block (word 3).
    pub fn data_bytes_in_block(&self) -> u32 {
        if self.kind == BlockKind::DataOfs { self.word(3) } else { 0 }
    }

    /// Set the OFS payload-byte count.
    pub fn set_data_bytes_in_block(&mut self, n: u32) {
        if self.kind == BlockKind::DataOfs {
            self.set_word(3, n);
        }
    }

    /// File size in bytes (FileHeader only, word -47).
    pub fn file_size(&self) -> u32 {
        if self.kind == BlockKind::FileHeader { self.word(-47) } else { 0 }
    }

    /// Set the file size.
    pub fn set_file_size(&mut self, n: u32) {
        if self.kind == BlockKind::FileHeader {
            self.set_word(-47, n);
        }
    }

    /// Protection bits (UserDir/FileHeader, word -48).
    pub fn protection_bits(&self) -> u32 {
        match self.kind {
            BlockKind::UserDir | BlockKind::FileHeader => self.word(-48),
            _ => 0,
        }
    }

    /// Set the protection bits.
    pub fn set_protection_bits(&mut self, val: u32) {
        if matches!(self.kind, BlockKind::UserDir | BlockKind::FileHeader) {
            self.set_word(-48, val);
        }
    }

    /// Hash table size: 72 entries for 512-byte blocks, generally `bsize/4 - 56`.
    #[inline]
    pub const fn hash_table_size(&self) -> usize {
        (self.bsize / 4) - 56
    }

    /// The hash-table slot at index `nr` (word `6+nr`), Root/UserDir only.
    pub fn hash_ref(&self, nr: usize) -> u32 {
        if self.kind.has_hash_table() && nr < self.hash_table_size() {
            self.word(6 + nr as i32)
        } else {
            0
        }
    }

    /// Set the hash-table slot at index `nr`.
    pub fn set_hash_ref(&mut self, nr: usize, val: u32) {
        if self.kind.has_hash_table() && nr < self.hash_table_size() {
            self.set_word(6 + nr as i32, val);
        }
    }

    /// Bitmap page reference `nr` (Root: word `nr-49`, max 25; BitmapExt:
    /// word `nr`, max `bsize/4 - 1`).
    pub fn bm_block_ref(&self, nr: usize) -> u32 {
        match self.kind {
            BlockKind::Root if nr < BM_PAGES_ROOT_SIZE => self.word(nr as i32 - 49),
            BlockKind::BitmapExt if nr < (self.bsize / 4 - 1) => self.word(nr as i32),
            _ => 0,
        }
    }

    /// Set the bitmap page reference.
    pub fn set_bm_block_ref(&mut self, nr: usize, val: u32) {
        match self.kind {
            BlockKind::Root if nr < BM_PAGES_ROOT_SIZE => self.set_word(nr as i32 - 49, val),
            BlockKind::BitmapExt if nr < (self.bsize / 4 - 1) => self.set_word(nr as i32, val),
            _ => {}
        }
    }

    /// All non-zero bitmap page references held directly by this block.
    pub fn bm_block_refs(&self) -> Vec<u32> {
        let max = match self.kind {
            BlockKind::Root => BM_PAGES_ROOT_SIZE,
            BlockKind::BitmapExt => self.bsize / 4 - 1,
            _ => 0,
        };
        (0..max).map(|i| self.bm_block_ref(i)).filter(|&r| r != 0).collect()
    }

    /// BCPL name (Root/UserDir/FileHeader, word -20, max 30 bytes).
    pub fn name(&self) -> String {
        match self.kind {
            BlockKind::Root | BlockKind::UserDir | BlockKind::FileHeader => {
                self.read_bcpl_string(-20, MAX_NAME_LEN)
            }
            _ => String::new(),
        }
    }

    /// Write a BCPL name, truncating to [`MAX_NAME_LEN`] bytes.
    pub fn set_name(&mut self, name: &str) {
        if matches!(self.kind, BlockKind::Root | BlockKind::UserDir | BlockKind::FileHeader) {
            self.write_bcpl_string(-20, MAX_NAME_LEN, name);
        }
    }

    /// BCPL comment (UserDir/FileHeader, word -46, max [`MAX_COMMENT_LEN`] bytes).
    pub fn comment(&self) -> String {
        match self.kind {
            BlockKind::UserDir | BlockKind::FileHeader => self.read_bcpl_string(-46, MAX_COMMENT_LEN),
            _ => String::new(),
        }
    }

    /// Write a BCPL comment, truncating to [`MAX_COMMENT_LEN`] bytes.
    pub fn set_comment(&mut self, comment: &str) {
        if matches!(self.kind, BlockKind::UserDir | BlockKind::FileHeader) {
            self.write_bcpl_string(-46, MAX_COMMENT_LEN, comment);
        }
    }

    /// Creation date (Root: word -7; UserDir/FileHeader: word -23).
    pub fn creation_date(&self) -> Option<AmigaDate> {
        match self.kind {
            BlockKind::Root => Some(self.read_date(-7)),
            BlockKind::UserDir | BlockKind::FileHeader => Some(self.read_date(-23)),
            _ => None,
        }
    }

    /// Write the creation date.
    pub fn set_creation_date(&mut self, date: AmigaDate) {
        match self.kind {
            BlockKind::Root => self.write_date(-7, date),
            BlockKind::UserDir | BlockKind::FileHeader => self.write_date(-23, date),
            _ => {}
        }
    }

    /// Volume modification/bitmap-valid date (Root only, word -23).
    pub fn modification_date(&self) -> Option<AmigaDate> {
        if self.kind == BlockKind::Root { Some(self.read_date(-23)) } else { None }
    }

    /// Write the volume modification date.
    pub fn set_modification_date(&mut self, date: AmigaDate) {
        if self.kind == BlockKind::Root {
            self.write_date(-23, date);
        }
    }

    fn read_date(&self, w: i32) -> AmigaDate {
        AmigaDate {
            days: self.word(w) as i32,
            mins: self.word(w + 1) as i32,
            ticks: self.word(w + 2) as i32,
        }
    }

    fn write_date(&mut self, w: i32, date: AmigaDate) {
        self.set_word(w, date.days as u32);
        self.set_word(w + 1, date.mins as u32);
        self.set_word(w + 2, date.ticks as u32);
    }

    /// Read a BCPL (length-prefixed) string starting at dual-indexed word
    /// `w`, never reading past `max_len` payload bytes or the block end.
    fn read_bcpl_string(&self, w: i32, max_len: usize) -> String {
        let off = self.byte_offset(w);
        if off >= self.bytes.len() {
            return String::new();
        }
        let len = (self.bytes[off] as usize).min(max_len).min(self.bytes.len() - off - 1);
        let raw = &self.bytes[off + 1..off + 1 + len];
        crate::utf8::latin1_to_string(raw)
    }

    fn write_bcpl_string(&mut self, w: i32, max_len: usize, s: &str) {
        let off = self.byte_offset(w);
        let capacity = max_len.min(self.bytes.len().saturating_sub(off + 1));
        let bytes = crate::utf8::string_to_latin1_truncated(s, capacity);
        let len = bytes.len();
        self.bytes[off] = len as u8;
        self.bytes[off + 1..off + 1 + len].copy_from_slice(&bytes);
        for b in &mut self.bytes[off + 1 + len..off + 1 + capacity] {
            *b = 0;
        }
    }

    /// Recompute and write this block's standard checksum in place.
    pub fn fix_checksum(&mut self) {
        if let Some(w) = self.checksum_word() {
            let off = self.byte_offset(w);
            let sum = crate::checksum::normal_sum_slice(&self.bytes, off);
            self.bytes[off..off + 4].copy_from_slice(&sum.to_be_bytes());
        }
    }

    /// Verify this block's standard checksum, if it has one.
    pub fn checksum_valid(&self) -> bool {
        match self.checksum_word() {
            Some(w) => {
                let off = self.byte_offset(w);
                read_u32_be_slice(&self.bytes, off) == crate::checksum::normal_sum_slice(&self.bytes, off)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FsFlags, FsType};

    fn blank(kind: BlockKind) -> RawBlock {
        let mut b = RawBlock::empty(10, BLOCK_SIZE);
        b.set_kind(kind);
        b
    }

    #[test]
    fn test_word_round_trip_positive_and_negative() {
        let mut b = blank(BlockKind::Unknown);
        b.set_word(0, 0xDEAD_BEEF);
        b.set_word(-1, 42);
        assert_eq!(b.word(0), 0xDEAD_BEEF);
        assert_eq!(b.word(-1), 42);
        assert_eq!(b.byte_offset(-1), BLOCK_SIZE - 4);
    }

    #[test]
    fn test_name_round_trip() {
        let mut b = blank(BlockKind::FileHeader);
        b.set_name("hello.txt");
        assert_eq!(b.name(), "hello.txt");
    }

    #[test]
    fn test_name_is_noop_on_wrong_kind() {
        let mut b = blank(BlockKind::DataOfs);
        b.set_name("should not stick");
        assert_eq!(b.name(), "");
    }

    #[test]
    fn test_comment_round_trip_and_truncation() {
        let mut b = blank(BlockKind::UserDir);
        let long = "x".repeat(MAX_COMMENT_LEN + 20);
        b.set_comment(&long);
        assert_eq!(b.comment().len(), MAX_COMMENT_LEN);
    }

    #[test]
    fn test_hash_ref_round_trip() {
        let mut b = blank(BlockKind::UserDir);
        b.set_hash_ref(0, 123);
        b.set_hash_ref(71, 456);
        assert_eq!(b.hash_ref(0), 123);
        assert_eq!(b.hash_ref(71), 456);
        assert_eq!(b.hash_ref(72), 0);
    }

    #[test]
    fn test_bm_block_ref_root() {
        let mut b = blank(BlockKind::Root);
        b.set_bm_block_ref(0, 900);
        b.set_bm_block_ref(24, 901);
        assert_eq!(b.bm_block_ref(0), 900);
        assert_eq!(b.bm_block_ref(24), 901);
        assert_eq!(b.bm_block_refs(), alloc::vec![900, 901]);
    }

    #[test]
    fn test_checksum_fix_and_valid() {
        let mut b = blank(BlockKind::Root);
        b.set_word(2, 0x1234);
        assert!(!b.checksum_valid());
        b.fix_checksum();
        assert!(b.checksum_valid());
    }

    #[test]
    fn test_data_block_ref_reverse_order() {
        let mut b = blank(BlockKind::FileHeader);
        b.set_data_block_ref(0, 111);
        b.set_data_block_ref(1, 222);
        assert_eq!(b.data_block_ref(0), 111);
        assert_eq!(b.data_block_ref(1), 222);
        assert_ne!(b.byte_offset(-51), b.byte_offset(-52));
    }

    #[test]
    fn test_new_infers_kind_from_layout() {
        let layout = VolumeLayout {
            capacity: 100,
            bsize: BLOCK_SIZE as u32,
            fs_type: FsType::Ofs,
            flags: FsFlags::default(),
            root_nr: 50,
            bm_blocks: alloc::vec![51],
            bm_ext_blocks: alloc::vec::Vec::new(),
            reserved: 2,
        };
        let bytes = alloc::vec![0u8; BLOCK_SIZE];
        let bitmap = RawBlock::new(51, bytes, &layout);
        assert_eq!(bitmap.kind(), BlockKind::Bitmap);
    }
}
