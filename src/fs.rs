//! The top-level node/path layer (L3): directory-tree mutations layered
//! over the block cache, allocator and doctor.
//!
//! [`FileSystem`] owns those three and exposes the operations a real
//! AmigaDOS volume supports: name resolution (`seek`/`seek_dir`/`seek_file`),
//! glob matching and tree construction, and the mutation suite (`mkdir`,
//! `create_file`, `rename`, `move_entry`, `copy`, `rm`, `resize`, ...).
//! Every mutation leaves every touched block's checksum correct and the
//! bitmap in agreement with what the tree references.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

use crate::bitmap::{locate_allocation_bit, Allocator};
use crate::cache::BlockCache;
use crate::date::AmigaDate;
use crate::doctor::{BitmapReport, Doctor, XrayReport};
use crate::error::{AffsError, Result};
use crate::path::{FsOpt, Pattern, TreeNode};
use crate::types::{FsFlags, FsType, WritableBlockDevice};
use crate::volume::{name_hash, names_equal, BlockKind, VolumeLayout};

/// A directory-entry snapshot returned by [`FileSystem::stat`] and
/// [`FileSystem::list`] — a value, not a live handle; re-resolve `nr`
/// through the `FileSystem` for anything beyond display.
#[derive(Debug, Clone)]
pub struct EntryStat {
    /// This entry's block number.
    pub nr: u32,
    /// BCPL name.
    pub name: String,
    /// Inferred block kind (UserDir, FileHeader, Root, ...).
    pub kind: BlockKind,
    /// Parent directory's block number (0 for the root).
    pub parent: u32,
    /// File size in bytes (0 for directories).
    pub size: u32,
    /// Raw protection bits.
    pub protection: u32,
    /// BCPL comment.
    pub comment: String,
    /// Creation date, if this kind of block carries one.
    pub creation_date: Option<AmigaDate>,
}

/// An in-memory AmigaDOS (OFS/FFS) volume over a [`WritableBlockDevice`],
/// supporting both read access and the full mutation API.
pub struct FileSystem<D: WritableBlockDevice> {
    cache: BlockCache<D>,
    allocator: Allocator,
    doctor: Doctor,
    read_only: bool,
}

impl<D: WritableBlockDevice> FileSystem<D> {
    /// Open an existing volume, decoding the bitmap's free/allocated state
    /// from disk. `layout` describes the volume's geometry and flavor —
    /// this crate has no superblock-probing config subsystem; geometry is
    /// a plain constructor parameter, same as [`crate::AffsReader::new`].
    pub fn open(device: D, layout: VolumeLayout) -> Result<Self> {
        let mut cache = BlockCache::new(device, layout);
        let capacity = cache.capacity();
        let bsize = cache.layout().bsize;
        let bm_blocks = cache.layout().bm_blocks.clone();

        let mut free = alloc::vec![false; capacity as usize];
        for nr in 2..capacity {
            if let Some((page_idx, byte, bit)) = locate_allocation_bit(nr, bsize, bm_blocks.len()) {
                if let Some(&page_nr) = bm_blocks.get(page_idx) {
                    let page = cache.fetch(page_nr)?;
                    let byte_val = page.bytes().get(byte).copied().unwrap_or(0);
                    free[nr as usize] = (byte_val >> bit) & 1 != 0;
                }
            }
        }
        let allocator = Allocator::from_bits(capacity, bsize, free);

        Ok(Self { cache, allocator, doctor: Doctor::new(false), read_only: false })
    }

    /// Open a hard-disk-sized volume. Thin wrapper over [`FileSystem::open`]
    /// kept for symmetry with [`crate::AffsReader::new_hd`].
    pub fn new_hd(device: D, layout: VolumeLayout) -> Result<Self> {
        Self::open(device, layout)
    }

    /// Open a volume whose capacity is being overridden explicitly, kept
    /// for symmetry with [`crate::AffsReader::with_size`].
    pub fn with_size(device: D, mut layout: VolumeLayout, capacity: u32) -> Result<Self> {
        layout.capacity = capacity;
        Self::open(device, layout)
    }

    /// Format a fresh volume: write boot blocks, an empty root directory,
    /// and an all-free bitmap, then return a `FileSystem` ready to mutate.
    /// Not part of the original read path — added so an empty disk image
    /// can be produced without leaving the crate (see the "format an empty
    /// floppy" boundary scenario).
    pub fn format(device: D, layout: VolumeLayout, volume_name: &str, date: AmigaDate) -> Result<Self> {
        let capacity = layout.capacity;
        let bsize = layout.bsize;
        let root_nr = layout.root_nr;
        let bm_blocks = layout.bm_blocks.clone();
        let bm_ext_blocks = layout.bm_ext_blocks.clone();
        let fs_type = layout.fs_type;
        let flags = layout.flags;

        let mut cache = BlockCache::new(device, layout);

        let mut allocator = Allocator::new(capacity, bsize);
        allocator.mark_allocated(root_nr);
        for &b in &bm_blocks {
            allocator.mark_allocated(b);
        }
        for &b in &bm_ext_blocks {
            allocator.mark_allocated(b);
        }

        format_boot_blocks(&mut cache, fs_type, flags)?;
        format_bitmap_pages(&mut cache, &allocator, &bm_blocks)?;
        format_bitmap_ext_chain(&mut cache, &bm_blocks, &bm_ext_blocks)?;
        format_root_block(&mut cache, root_nr, &bm_blocks, &bm_ext_blocks, volume_name, date)?;

        Ok(Self { cache, allocator, doctor: Doctor::new(false), read_only: false })
    }

    /// Mark this handle read-only: every mutation returns [`AffsError::ReadOnly`].
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Whether this handle currently rejects mutations.
    #[inline]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Toggle the doctor's strictness for [`FileSystem::xray`].
    pub fn set_strict(&mut self, strict: bool) {
        self.doctor = Doctor::new(strict);
    }

    /// This volume's root block number.
    #[inline]
    pub fn root_nr(&self) -> u32 {
        self.cache.layout().root_nr
    }

    /// OFS or FFS.
    #[inline]
    pub fn fs_type(&self) -> FsType {
        self.cache.layout().fs_type
    }

    /// Whether INTL-mode name folding is in effect.
    #[inline]
    pub fn intl(&self) -> bool {
        self.cache.layout().flags.intl
    }

    /// Total number of blocks on the volume.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.cache.capacity()
    }

    /// Bytes per block.
    #[inline]
    pub fn block_size(&self) -> u32 {
        self.cache.layout().bsize
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(AffsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn require_dir(&mut self, nr: u32) -> Result<()> {
        if !self.cache.fetch(nr)?.kind().is_directory() {
            return Err(AffsError::NotADirectory);
        }
        Ok(())
    }

    fn require_file(&mut self, nr: u32) -> Result<()> {
        if self.cache.fetch(nr)?.kind() != BlockKind::FileHeader {
            return Err(AffsError::NotAFile);
        }
        Ok(())
    }

    // --- name resolution -------------------------------------------------

    /// Resolve a single path component against `start` (a directory). The
    /// special tokens `""`/`"."` (stay put), `".."` (parent), and `"/"`
    /// (volume root) are handled before any hashing.
    pub fn seek(&mut self, start: u32, name: &str) -> Result<Option<u32>> {
        match name {
            "" | "." => return Ok(Some(start)),
            "/" => return Ok(Some(self.root_nr())),
            ".." => {
                let parent = self.cache.fetch(start)?.parent_ref();
                return Ok(Some(if parent == 0 { self.root_nr() } else { parent }));
            }
            _ => {}
        }

        let intl = self.intl();
        let table_size = self.cache.fetch(start)?.hash_table_size();
        let h = name_hash(name.as_bytes(), intl, table_size);
        let mut next = self.cache.fetch(start)?.hash_ref(h);
        let mut visited = BTreeSet::new();
        while next != 0 && visited.insert(next) {
            let block = self.cache.fetch(next)?;
            if names_equal(block.name().as_bytes(), name.as_bytes(), intl) {
                return Ok(Some(next));
            }
            next = block.next_hash_ref();
        }
        Ok(None)
    }

    /// Resolve a `/`-separated path, component by component, from `start`.
    /// A leading `/` re-anchors at the volume root regardless of `start`.
    pub fn seek_path(&mut self, start: u32, path: &str) -> Result<Option<u32>> {
        let mut cur = if path.starts_with('/') { self.root_nr() } else { start };
        for component in path.split('/') {
            if component.is_empty() {
                continue;
            }
            match self.seek(cur, component)? {
                Some(nr) => cur = nr,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    /// Resolve `path` and require the result to be a directory.
    pub fn seek_dir(&mut self, start: u32, path: &str) -> Result<u32> {
        let nr = self.seek_path(start, path)?.ok_or(AffsError::EntryNotFound)?;
        if !self.cache.fetch(nr)?.kind().is_directory() {
            return Err(AffsError::NotADirectory);
        }
        Ok(nr)
    }

    /// Resolve `path` and require the result to be a file.
    pub fn seek_file(&mut self, start: u32, path: &str) -> Result<u32> {
        let nr = self.seek_path(start, path)?.ok_or(AffsError::EntryNotFound)?;
        if self.cache.fetch(nr)?.kind() != BlockKind::FileHeader {
            return Err(AffsError::NotAFile);
        }
        Ok(nr)
    }

    fn list_dir(&mut self, dir_nr: u32) -> Result<Vec<(String, u32, BlockKind)>> {
        self.require_dir(dir_nr)?;
        let table_size = self.cache.fetch(dir_nr)?.hash_table_size();
        let mut out = Vec::new();
        for i in 0..table_size {
            let mut next = self.cache.fetch(dir_nr)?.hash_ref(i);
            let mut visited = BTreeSet::new();
            while next != 0 && visited.insert(next) {
                let block = self.cache.fetch(next)?;
                out.push((block.name(), next, block.kind()));
                next = block.next_hash_ref();
            }
        }
        Ok(out)
    }

    /// Every direct child of directory `dir`, in hash-bucket order.
    pub fn list(&mut self, dir: u32) -> Result<Vec<EntryStat>> {
        let entries = self.list_dir(dir)?;
        entries.into_iter().map(|(_, nr, _)| self.stat(nr)).collect()
    }

    /// Snapshot a single block's directory-entry fields.
    pub fn stat(&mut self, nr: u32) -> Result<EntryStat> {
        let block = self.cache.fetch(nr)?;
        Ok(EntryStat {
            nr,
            name: block.name(),
            kind: block.kind(),
            parent: block.parent_ref(),
            size: block.file_size(),
            protection: block.protection_bits(),
            comment: block.comment(),
            creation_date: block.creation_date(),
        })
    }

    // --- glob matching and tree construction ------------------------------

    /// Match `pattern` against the tree, starting from `start` (or the
    /// volume root, if the pattern is absolute). Only directories matching
    /// an intermediate component are descended into.
    pub fn glob(&mut self, start: u32, pattern: &Pattern) -> Result<Vec<EntryStat>> {
        let mut out = Vec::new();
        if pattern.depth() == 0 {
            return Ok(out);
        }
        let origin = if pattern.is_absolute() { self.root_nr() } else { start };
        self.glob_walk(origin, pattern, 0, &mut out)?;
        Ok(out)
    }

    fn glob_walk(&mut self, dir: u32, pattern: &Pattern, index: usize, out: &mut Vec<EntryStat>) -> Result<()> {
        let intl = self.intl();
        for (name, nr, kind) in self.list_dir(dir)? {
            if !pattern.component_matches(index, name.as_bytes(), intl) {
                continue;
            }
            if index + 1 == pattern.depth() {
                out.push(self.stat(nr)?);
            } else if kind.is_directory() {
                self.glob_walk(nr, pattern, index + 1, out)?;
            }
        }
        Ok(())
    }

    /// Recursively build a [`TreeNode`] rooted at `start`, honoring
    /// `opts.depth`/`opts.accept`/`opts.sort`. A block reachable twice in
    /// the same walk raises [`AffsError::HasCycles`].
    pub fn build_tree(&mut self, start: u32, opts: &FsOpt) -> Result<TreeNode> {
        let mut visited = BTreeSet::new();
        self.build_tree_rec(start, opts, 0, &mut visited)
    }

    fn build_tree_rec(&mut self, nr: u32, opts: &FsOpt, depth: u32, visited: &mut BTreeSet<u32>) -> Result<TreeNode> {
        if !visited.insert(nr) {
            return Err(AffsError::HasCycles);
        }

        let mut children = Vec::new();
        let kind = self.cache.fetch(nr)?.kind();
        if kind.is_directory() && depth < opts.depth {
            let mut entries = self.list_dir(nr)?;
            if let Some(sort) = &opts.sort {
                entries.sort_by(|a, b| sort(&a.0, &b.0));
            }
            for (_, child_nr, child_kind) in entries {
                if let Some(accept) = &opts.accept {
                    if !accept(child_nr) {
                        continue;
                    }
                }
                if child_kind.is_directory() {
                    children.push(self.build_tree_rec(child_nr, opts, depth + 1, visited)?);
                } else {
                    visited.insert(child_nr);
                    children.push(TreeNode { nr: child_nr, children: Vec::new() });
                }
            }
        }
        Ok(TreeNode { nr, children })
    }

    // --- linkage primitives ------------------------------------------------

    fn link(&mut self, parent: u32, child: u32) -> Result<()> {
        let intl = self.intl();
        let name = self.cache.fetch(child)?.name();
        let table_size = self.cache.fetch(parent)?.hash_table_size();
        let h = name_hash(name.as_bytes(), intl, table_size);
        let head = self.cache.fetch(parent)?.hash_ref(h);

        self.cache.modify(child, |b| {
            b.set_parent_ref(parent);
            b.set_next_hash_ref(head);
            b.fix_checksum();
        })?;
        self.cache.modify(parent, |b| {
            b.set_hash_ref(h, child);
            b.fix_checksum();
        })?;
        Ok(())
    }

    fn unlink(&mut self, nr: u32) -> Result<()> {
        let parent = self.cache.fetch(nr)?.parent_ref();
        if parent == 0 {
            return Ok(());
        }
        let intl = self.intl();
        let name = self.cache.fetch(nr)?.name();
        let table_size = self.cache.fetch(parent)?.hash_table_size();
        let h = name_hash(name.as_bytes(), intl, table_size);
        let after = self.cache.fetch(nr)?.next_hash_ref();

        let head = self.cache.fetch(parent)?.hash_ref(h);
        if head == nr {
            self.cache.modify(parent, |b| {
                b.set_hash_ref(h, after);
                b.fix_checksum();
            })?;
            return Ok(());
        }

        let mut cur = head;
        let mut visited = BTreeSet::new();
        while cur != 0 && visited.insert(cur) {
            let next = self.cache.fetch(cur)?.next_hash_ref();
            if next == nr {
                self.cache.modify(cur, |b| {
                    b.set_next_hash_ref(after);
                    b.fix_checksum();
                })?;
                return Ok(());
            }
            cur = next;
        }
        Ok(())
    }

    /// Walk a file header's list-block chain, returning every list block
    /// and every data block it references, truncated to the header's
    /// recorded total — the exact set [`FileSystem::reclaim`] must free.
    fn collect_file_blocks(&mut self, header_nr: u32) -> Result<(Vec<u32>, Vec<u32>)> {
        let total = self.cache.fetch(header_nr)?.num_data_block_refs() as usize;
        let mut data = Vec::new();
        let mut lists = Vec::new();
        let mut list_nr = header_nr;
        let mut visited = BTreeSet::new();
        visited.insert(header_nr);
        loop {
            let block = self.cache.fetch(list_nr)?;
            let max = block.max_data_block_refs();
            for i in 0..max {
                if data.len() >= total {
                    break;
                }
                let r = block.data_block_ref(i);
                if r != 0 {
                    data.push(r);
                }
            }
            let next = block.next_list_ref();
            if next == 0 || !visited.insert(next) {
                break;
            }
            lists.push(next);
            list_nr = next;
        }
        Ok((lists, data))
    }

    // --- mutation API --------------------------------------------------------

    /// Create an empty subdirectory named `name` under `parent`.
    pub fn mkdir(&mut self, parent: u32, name: &str, date: AmigaDate) -> Result<u32> {
        self.check_writable()?;
        self.require_dir(parent)?;
        if self.seek(parent, name)?.is_some() {
            return Err(AffsError::AlreadyExists);
        }
        let nr = self.allocator.allocate().map_err(|_| AffsError::CannotCreateDir)?;
        self.cache.modify(nr, |b| {
            b.set_kind(BlockKind::UserDir);
            b.set_word(0, 2);
            b.set_word(1, nr);
            b.set_name(name);
            b.set_creation_date(date);
            b.set_word(-1, crate::ST_DIR as u32);
            b.fix_checksum();
        })?;
        self.link(parent, nr)?;
        Ok(nr)
    }

    /// Remove an empty directory or a file: unlink it from its parent, then
    /// reclaim its blocks. A non-empty directory raises
    /// [`AffsError::DirNotEmpty`] without touching anything.
    pub fn rm(&mut self, nr: u32) -> Result<()> {
        self.check_writable()?;
        self.unlink(nr)?;
        self.reclaim(nr)
    }

    /// Free a detached block's storage (and, for a file, every list/data
    /// block its header chain reaches). Does not touch hash-chain linkage;
    /// callers normally go through [`FileSystem::rm`] instead.
    pub fn reclaim(&mut self, nr: u32) -> Result<()> {
        self.check_writable()?;
        let kind = self.cache.fetch(nr)?.kind();
        match kind {
            BlockKind::UserDir => {
                let table_size = self.cache.fetch(nr)?.hash_table_size();
                for i in 0..table_size {
                    if self.cache.fetch(nr)?.hash_ref(i) != 0 {
                        return Err(AffsError::DirNotEmpty);
                    }
                }
                self.cache.erase(nr)?;
                self.allocator.deallocate(nr);
            }
            BlockKind::FileHeader => {
                let (lists, data) = self.collect_file_blocks(nr)?;
                self.cache.erase(nr)?;
                self.allocator.deallocate(nr);
                for b in lists {
                    self.cache.erase(b)?;
                    self.allocator.deallocate(b);
                }
                for b in data {
                    self.cache.erase(b)?;
                    self.allocator.deallocate(b);
                }
            }
            _ => return Err(AffsError::NotAFileOrDirectory),
        }
        Ok(())
    }

    /// Rename an entry in place, keeping its parent and content.
    pub fn rename(&mut self, nr: u32, new_name: &str) -> Result<()> {
        self.check_writable()?;
        if nr == self.root_nr() {
            self.cache.modify(nr, |b| {
                b.set_name(new_name);
                b.fix_checksum();
            })?;
            return Ok(());
        }
        let parent = self.cache.fetch(nr)?.parent_ref();
        if self.seek(parent, new_name)?.is_some() {
            return Err(AffsError::AlreadyExists);
        }
        self.unlink(nr)?;
        self.cache.modify(nr, |b| b.set_name(new_name))?;
        self.link(parent, nr)?;
        Ok(())
    }

    /// Move (and optionally rename) an entry into a different directory.
    pub fn move_entry(&mut self, nr: u32, dest: u32, new_name: Option<&str>) -> Result<()> {
        self.check_writable()?;
        self.require_dir(dest)?;
        let current_name = self.cache.fetch(nr)?.name();
        let name = new_name.unwrap_or(&current_name);
        if self.seek(dest, name)?.is_some() {
            return Err(AffsError::AlreadyExists);
        }
        self.unlink(nr)?;
        if new_name.is_some() {
            self.cache.modify(nr, |b| b.set_name(name))?;
        }
        self.link(dest, nr)?;
        Ok(())
    }

    /// Read a file's entire content.
    pub fn extract(&mut self, header: u32) -> Result<Vec<u8>> {
        self.require_file(header)?;
        let size = self.cache.fetch(header)?.file_size() as usize;
        let ofs = matches!(self.fs_type(), FsType::Ofs);
        let mut out = Vec::with_capacity(size);

        if ofs {
            let mut next = self.cache.fetch(header)?.first_data_block_ref();
            let mut visited = BTreeSet::new();
            while next != 0 && visited.insert(next) && out.len() < size {
                let block = self.cache.fetch(next)?;
                let n = (block.data_bytes_in_block() as usize).min(block.bsize().saturating_sub(24));
                out.extend_from_slice(&block.bytes()[24..24 + n]);
                next = block.next_data_ref();
            }
        } else {
            let (_, data_blocks) = self.collect_file_blocks(header)?;
            for nr in data_blocks {
                if out.len() >= size {
                    break;
                }
                let block = self.cache.fetch(nr)?;
                let take = (size - out.len()).min(block.bsize());
                out.extend_from_slice(&block.bytes()[..take]);
            }
        }
        out.truncate(size);
        Ok(out)
    }

    /// Replace a file's content with `bytes`, freeing its old list/data
    /// blocks and allocating fresh ones sized to fit.
    pub fn replace(&mut self, header: u32, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.require_file(header)?;

        let (old_lists, old_data) = self.collect_file_blocks(header)?;
        for b in old_lists {
            self.cache.erase(b)?;
            self.allocator.deallocate(b);
        }
        for b in old_data {
            self.cache.erase(b)?;
            self.allocator.deallocate(b);
        }

        let ofs = matches!(self.fs_type(), FsType::Ofs);
        let (list_blocks, data_blocks) =
            self.allocator.allocate_file_blocks(bytes.len(), ofs).map_err(|_| AffsError::OutOfSpace)?;
        let refs_per_block = self.allocator.refs_per_block();
        let payload_size = self.allocator.data_payload(ofs);

        for (i, &data_nr) in data_blocks.iter().enumerate() {
            let start = i * payload_size;
            let end = (start + payload_size).min(bytes.len());
            let chunk = &bytes[start..end];
            let next = data_blocks.get(i + 1).copied().unwrap_or(0);
            if ofs {
                self.cache.modify(data_nr, |b| {
                    b.set_kind(BlockKind::DataOfs);
                    b.set_word(0, crate::T_DATA as u32);
                    b.set_file_header_ref(header);
                    b.set_data_block_nr((i + 1) as u32);
                    b.set_data_bytes_in_block(chunk.len() as u32);
                    b.set_next_data_ref(next);
                    b.bytes_mut()[24..24 + chunk.len()].copy_from_slice(chunk);
                    b.fix_checksum();
                })?;
            } else {
                self.cache.modify(data_nr, |b| {
                    b.set_kind(BlockKind::DataFfs);
                    b.bytes_mut()[..chunk.len()].copy_from_slice(chunk);
                })?;
            }
        }

        for (li, &list_nr) in list_blocks.iter().enumerate() {
            let next_list = list_blocks.get(li + 1).copied().unwrap_or(0);
            let start_idx = refs_per_block * (li + 1);
            let refs: Vec<u32> = data_blocks.iter().skip(start_idx).take(refs_per_block).copied().collect();
            self.cache.modify(list_nr, |b| {
                b.set_kind(BlockKind::FileList);
                b.set_word(0, crate::T_LIST as u32);
                b.set_word(1, list_nr);
                b.set_num_data_block_refs(refs.len() as u32);
                for (i, &r) in refs.iter().enumerate() {
                    b.set_data_block_ref(i, r);
                }
                b.set_first_data_block_ref(refs.first().copied().unwrap_or(0));
                b.set_file_header_ref(header);
                b.set_next_list_ref(next_list);
                b.set_word(-1, crate::ST_FILE as u32);
                b.fix_checksum();
            })?;
        }

        let header_refs: Vec<u32> = data_blocks.iter().take(refs_per_block).copied().collect();
        self.cache.modify(header, |b| {
            for (i, &r) in header_refs.iter().enumerate() {
                b.set_data_block_ref(i, r);
            }
            for i in header_refs.len()..refs_per_block {
                b.set_data_block_ref(i, 0);
            }
            b.set_num_data_block_refs(data_blocks.len() as u32);
            b.set_first_data_block_ref(data_blocks.first().copied().unwrap_or(0));
            b.set_next_list_ref(list_blocks.first().copied().unwrap_or(0));
            b.set_file_size(bytes.len() as u32);
            b.fix_checksum();
        })?;

        Ok(())
    }

    /// Grow or shrink a file to exactly `new_size` bytes, zero-padding any
    /// new tail and preserving the original prefix.
    pub fn resize(&mut self, header: u32, new_size: usize) -> Result<()> {
        let mut bytes = self.extract(header)?;
        bytes.resize(new_size, 0);
        self.replace(header, &bytes)
    }

    /// Create a file named `name` under `parent`, optionally seeding it
    /// with `bytes`.
    pub fn create_file(&mut self, parent: u32, name: &str, bytes: Option<&[u8]>, date: AmigaDate) -> Result<u32> {
        self.check_writable()?;
        self.require_dir(parent)?;
        if self.seek(parent, name)?.is_some() {
            return Err(AffsError::AlreadyExists);
        }
        let nr = self.allocator.allocate().map_err(|_| AffsError::CannotCreateFile)?;
        self.cache.modify(nr, |b| {
            b.set_kind(BlockKind::FileHeader);
            b.set_word(0, crate::T_HEADER as u32);
            b.set_word(1, nr);
            b.set_name(name);
            b.set_creation_date(date);
            b.set_word(-1, crate::ST_FILE as u32);
            b.fix_checksum();
        })?;
        self.link(parent, nr)?;
        if let Some(data) = bytes {
            self.replace(nr, data)?;
        }
        Ok(nr)
    }

    /// Copy a file's content into a new file under `dest`.
    pub fn copy(&mut self, src: u32, dest: u32, new_name: &str, date: AmigaDate) -> Result<u32> {
        self.check_writable()?;
        let bytes = self.extract(src)?;
        self.create_file(dest, new_name, Some(&bytes), date)
    }

    // --- diagnostics and visualization ---------------------------------------

    /// Structural validation of every materialized block.
    pub fn xray(&mut self) -> Result<XrayReport> {
        self.doctor.xray(&mut self.cache)
    }

    /// Rewrite every word-level anomaly a prior [`FileSystem::xray`] found.
    pub fn rectify(&mut self, report: &XrayReport) -> Result<()> {
        self.check_writable()?;
        self.doctor.rectify(&mut self.cache, report)
    }

    /// Cross-check tree reachability against bitmap allocation state.
    pub fn xray_bitmap(&mut self) -> Result<BitmapReport> {
        let root_nr = self.root_nr();
        let bm_blocks = self.cache.layout().bm_blocks.clone();
        let bm_ext_blocks = self.cache.layout().bm_ext_blocks.clone();
        self.doctor.xray_bitmap(&mut self.cache, &self.allocator, root_nr, &bm_blocks, &bm_ext_blocks)
    }

    /// Bring the bitmap back into agreement with tree reachability.
    pub fn rectify_bitmap(&mut self, report: &BitmapReport) -> Result<()> {
        self.check_writable()?;
        let bm_pages = self.cache.layout().bm_blocks.clone();
        self.doctor.rectify_bitmap(&mut self.cache, &mut self.allocator, &bm_pages, report)
    }

    /// Downsampled block-kind overview, one [`BlockKind`] per of `len` bins.
    pub fn usage_map(&self, len: usize) -> Vec<BlockKind> {
        self.cache.usage_map(len)
    }

    /// Downsampled allocation-vs-reachability overview (see
    /// [`crate::cache::BlockCache::allocation_map`]).
    pub fn allocation_map(&mut self, len: usize) -> Result<Vec<u8>> {
        let report = self.xray_bitmap()?;
        let unused: BTreeSet<u32> = report.unused_but_allocated.iter().copied().collect();
        let used: BTreeSet<u32> = report.used_but_unallocated.iter().copied().collect();
        Ok(self.cache.allocation_map(len, &unused, &used))
    }

    /// Downsampled x-ray health overview (see
    /// [`crate::cache::BlockCache::health_map`]).
    pub fn health_map(&mut self, len: usize) -> Result<Vec<u8>> {
        let report = self.xray()?;
        Ok(self.cache.health_map(len, &report.erroneous_blocks))
    }

    /// Write back every dirty block (bitmap pages last).
    pub fn flush(&mut self) -> Result<()> {
        self.check_writable()?;
        self.cache.flush_all()
    }
}

fn dos_type_byte(fs_type: FsType, flags: FsFlags) -> u8 {
    let mut b = match fs_type {
        FsType::Ofs => crate::DOSFS_OFS,
        FsType::Ffs => crate::DOSFS_FFS,
    };
    if flags.intl {
        b |= crate::DOSFS_INTL;
    }
    if flags.dircache {
        b |= crate::DOSFS_DIRCACHE;
    }
    b
}

fn format_boot_blocks<D: WritableBlockDevice>(cache: &mut BlockCache<D>, fs_type: FsType, flags: FsFlags) -> Result<()> {
    let bsize = cache.layout().bsize as usize;
    cache.modify(0, |b| {
        b.set_kind(BlockKind::Boot);
        let bytes = b.bytes_mut();
        bytes[0] = b'D';
        bytes[1] = b'O';
        bytes[2] = b'S';
        bytes[3] = dos_type_byte(fs_type, flags);
        for x in &mut bytes[4..] {
            *x = 0;
        }
    })?;
    cache.modify(1, |b| {
        b.set_kind(BlockKind::Boot);
        for x in b.bytes_mut() {
            *x = 0;
        }
    })?;

    if bsize == 512 {
        let mut buf = [0u8; 1024];
        buf[..512].copy_from_slice(cache.fetch(0)?.bytes());
        buf[512..].copy_from_slice(cache.fetch(1)?.bytes());
        let sum = crate::checksum::boot_sum(&buf);
        cache.modify(0, |b| b.set_word(1, sum))?;
    }
    Ok(())
}

fn format_bitmap_pages<D: WritableBlockDevice>(cache: &mut BlockCache<D>, allocator: &Allocator, bm_blocks: &[u32]) -> Result<()> {
    // Start every page fully allocated (all bits clear); a page addresses
    // more bits than the volume has blocks, and the tail past `capacity`
    // must stay allocated rather than read back as free.
    for &page_nr in bm_blocks {
        cache.modify(page_nr, |b| {
            b.set_kind(BlockKind::Bitmap);
            for byte in &mut b.bytes_mut()[4..] {
                *byte = 0x00;
            }
        })?;
    }

    let bsize = cache.layout().bsize;
    for nr in 0..allocator.capacity() {
        if !allocator.is_free(nr) {
            continue;
        }
        if let Some((page_idx, byte, bit)) = locate_allocation_bit(nr, bsize, bm_blocks.len()) {
            if let Some(&page_nr) = bm_blocks.get(page_idx) {
                cache.modify(page_nr, |b| {
                    b.bytes_mut()[byte] |= 1 << bit;
                })?;
            }
        }
    }

    for &page_nr in bm_blocks {
        cache.modify(page_nr, |b| b.fix_checksum())?;
    }
    Ok(())
}

fn format_bitmap_ext_chain<D: WritableBlockDevice>(cache: &mut BlockCache<D>, bm_blocks: &[u32], bm_ext_blocks: &[u32]) -> Result<()> {
    if bm_ext_blocks.is_empty() {
        return Ok(());
    }
    let overflow: Vec<u32> = bm_blocks.iter().skip(crate::BM_PAGES_ROOT_SIZE).copied().collect();
    let refs_per_ext = (cache.layout().bsize as usize / 4) - 1;

    for (i, &ext_nr) in bm_ext_blocks.iter().enumerate() {
        let chunk: Vec<u32> = overflow.iter().skip(i * refs_per_ext).take(refs_per_ext).copied().collect();
        let next = bm_ext_blocks.get(i + 1).copied().unwrap_or(0);
        cache.modify(ext_nr, |b| {
            b.set_kind(BlockKind::BitmapExt);
            for (j, &r) in chunk.iter().enumerate() {
                b.set_word(j as i32, r);
            }
            b.set_next_bm_ext_ref(next);
        })?;
    }
    Ok(())
}

fn format_root_block<D: WritableBlockDevice>(
    cache: &mut BlockCache<D>,
    root_nr: u32,
    bm_blocks: &[u32],
    bm_ext_blocks: &[u32],
    volume_name: &str,
    date: AmigaDate,
) -> Result<()> {
    let hash_table_size = cache.layout().hash_table_size();
    let first_ext = bm_ext_blocks.first().copied().unwrap_or(0);
    cache.modify(root_nr, |b| {
        b.set_kind(BlockKind::Root);
        b.set_word(0, crate::T_HEADER as u32);
        b.set_word(3, hash_table_size as u32);
        for i in 0..hash_table_size {
            b.set_hash_ref(i, 0);
        }
        for (i, &pg) in bm_blocks.iter().take(crate::BM_PAGES_ROOT_SIZE).enumerate() {
            b.set_bm_block_ref(i, pg);
        }
        b.set_word(-50, crate::BM_VALID as u32);
        b.set_next_bm_ext_ref(first_ext);
        b.set_name(volume_name);
        b.set_creation_date(date);
        b.set_modification_date(date);
        b.set_word(-1, crate::ST_ROOT as u32);
        b.fix_checksum();
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockDevice, FsFlags};
    use alloc::vec;

    struct MemDevice {
        blocks: Vec<[u8; 512]>,
    }

    impl MemDevice {
        fn new(capacity: u32) -> Self {
            Self { blocks: vec![[0u8; 512]; capacity as usize] }
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

    fn small_layout() -> VolumeLayout {
        VolumeLayout {
            capacity: 200,
            bsize: 512,
            fs_type: FsType::Ofs,
            flags: FsFlags::default(),
            root_nr: 100,
            bm_blocks: vec![101],
            bm_ext_blocks: Vec::new(),
            reserved: 2,
        }
    }

    fn date() -> AmigaDate {
        AmigaDate { days: 0, mins: 0, ticks: 0 }
    }

    fn formatted() -> FileSystem<MemDevice> {
        FileSystem::format(MemDevice::new(200), small_layout(), "Work", date()).unwrap()
    }

    #[test]
    fn test_format_produces_empty_root() {
        let mut fs = formatted();
        assert_eq!(fs.list(fs.root_nr()).unwrap().len(), 0);
        assert!(fs.xray().unwrap().errors.is_empty());
    }

    #[test]
    fn test_mkdir_then_seek() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let dir = fs.mkdir(root, "C", date()).unwrap();
        assert_eq!(fs.seek(root, "C").unwrap(), Some(dir));
        assert_eq!(fs.seek_dir(root, "C").unwrap(), dir);
    }

    #[test]
    fn test_mkdir_rejects_duplicate_name() {
        let mut fs = formatted();
        let root = fs.root_nr();
        fs.mkdir(root, "C", date()).unwrap();
        assert_eq!(fs.mkdir(root, "C", date()), Err(AffsError::AlreadyExists));
    }

    #[test]
    fn test_create_file_small_round_trips() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let f = fs.create_file(root, "hello", Some(b"HELLO"), date()).unwrap();
        assert_eq!(fs.extract(f).unwrap(), b"HELLO");
        assert_eq!(fs.stat(f).unwrap().size, 5);
    }

    #[test]
    fn test_create_file_spanning_multiple_data_blocks() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let content: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let f = fs.create_file(root, "big", Some(&content), date()).unwrap();
        assert_eq!(fs.extract(f).unwrap(), content);
    }

    #[test]
    fn test_rename_then_seek() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let f = fs.create_file(root, "old", Some(b"x"), date()).unwrap();
        fs.rename(f, "new").unwrap();
        assert_eq!(fs.seek(root, "old").unwrap(), None);
        assert_eq!(fs.seek(root, "new").unwrap(), Some(f));
    }

    #[test]
    fn test_move_entry_into_subdirectory() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let dir = fs.mkdir(root, "sub", date()).unwrap();
        let f = fs.create_file(root, "f", Some(b"x"), date()).unwrap();
        fs.move_entry(f, dir, None).unwrap();
        assert_eq!(fs.seek(root, "f").unwrap(), None);
        assert_eq!(fs.seek(dir, "f").unwrap(), Some(f));
    }

    #[test]
    fn test_rm_nonempty_dir_fails() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let dir = fs.mkdir(root, "sub", date()).unwrap();
        fs.create_file(dir, "f", Some(b"x"), date()).unwrap();
        assert_eq!(fs.rm(dir), Err(AffsError::DirNotEmpty));
    }

    #[test]
    fn test_rm_file_frees_blocks() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let free_before = fs.allocator.free_count();
        let f = fs.create_file(root, "f", Some(b"hello world"), date()).unwrap();
        assert!(fs.allocator.free_count() < free_before);
        fs.rm(f).unwrap();
        assert_eq!(fs.allocator.free_count(), free_before);
        assert_eq!(fs.seek(root, "f").unwrap(), None);
    }

    #[test]
    fn test_resize_grows_and_zero_pads() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let f = fs.create_file(root, "f", Some(b"abc"), date()).unwrap();
        fs.resize(f, 6).unwrap();
        assert_eq!(fs.extract(f).unwrap(), b"abc\0\0\0");
    }

    #[test]
    fn test_copy_produces_independent_file() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let src = fs.create_file(root, "src", Some(b"payload"), date()).unwrap();
        let dst = fs.copy(src, root, "dst", date()).unwrap();
        assert_eq!(fs.extract(dst).unwrap(), b"payload");
        fs.rm(src).unwrap();
        assert_eq!(fs.extract(dst).unwrap(), b"payload");
    }

    #[test]
    fn test_glob_matches_wildcard() {
        let mut fs = formatted();
        let root = fs.root_nr();
        fs.create_file(root, "a.txt", Some(b"1"), date()).unwrap();
        fs.create_file(root, "b.txt", Some(b"2"), date()).unwrap();
        fs.create_file(root, "c.doc", Some(b"3"), date()).unwrap();
        let pattern = Pattern::compile("*.txt").unwrap();
        let mut matches = fs.glob(root, &pattern).unwrap();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].name, "a.txt");
    }

    #[test]
    fn test_build_tree_detects_no_cycle_in_normal_tree() {
        let mut fs = formatted();
        let root = fs.root_nr();
        let a = fs.mkdir(root, "a", date()).unwrap();
        fs.create_file(a, "f", Some(b"x"), date()).unwrap();
        let tree = fs.build_tree(root, &FsOpt::default()).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 1);
    }

    #[test]
    fn test_read_only_blocks_mutation() {
        let mut fs = formatted();
        fs.set_read_only(true);
        let root = fs.root_nr();
        assert_eq!(fs.mkdir(root, "x", date()), Err(AffsError::ReadOnly));
    }

    #[test]
    fn test_format_leaves_out_of_range_bits_allocated() {
        // Volume capacity is 200 blocks but a single 512-byte bitmap page
        // addresses (512-4)*8 = 4064 bits; every bit past `capacity` must
        // come up allocated, never free.
        let mut fs = formatted();
        let bm_nr = fs.cache.layout().bm_blocks[0];
        let (_, byte, bit) = crate::bitmap::locate_allocation_bit(250, 512, 1).unwrap();
        let page = fs.cache.fetch(bm_nr).unwrap();
        assert_eq!(page.bytes()[byte] & (1 << bit), 0);
    }

    #[test]
    fn test_xray_bitmap_clean_after_format() {
        let mut fs = formatted();
        let root = fs.root_nr();
        fs.create_file(root, "f", Some(b"hello"), date()).unwrap();
        let report = fs.xray_bitmap().unwrap();
        assert!(report.bitmap_errors.is_empty());
    }
}
