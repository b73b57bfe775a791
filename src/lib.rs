//! # affs-fs
//!
//! A `no_std` compatible crate for mounting, mutating, and diagnosing Amiga
//! Fast File System (AFFS) disk images over any block device.
//!
//! This crate supports both OFS (Original File System) and FFS (Fast File
//! System) variants, and layers two independent stacks on the same block
//! primitives:
//!
//! - a zero-allocation read-only path ([`AffsReader`], [`FileReader`],
//!   [`DirIter`], [`AffsReaderVar`] for variable-block-size hard disk
//!   partitions) for mounting and streaming an existing image without
//!   paying for the allocator or cache;
//! - a mutating node/path layer ([`FileSystem`], behind the `alloc`
//!   feature) built over a dirty-tracked [`BlockCache`], a free-bitmap
//!   [`Allocator`], and a [`Doctor`] that validates and repairs structural
//!   corruption.
//!
//! ## Features
//!
//! - `no_std` compatible by default
//! - Zero heap allocations in the read-only path
//! - Support for OFS and FFS filesystems, INTL and DIRCACHE modes
//! - Streaming file reading, directory traversal, symlink resolution
//! - Creation, rename, move, resize, deletion, and glob/tree walking via
//!   [`FileSystem`] (requires the `alloc` feature)
//! - Structural x-ray/rectify diagnostics and bitmap-reachability auditing
//! - Extensively fuzz-tested for safety and correctness
//!
//! ## Example
//!
//! ```ignore
//! use affs_fs::{AffsReader, BlockDevice};
//!
//! // Implement BlockDevice for your storage
//! struct MyDevice { /* ... */ }
//!
//! impl BlockDevice for MyDevice {
//!     fn read_block(&self, block: u32, buf: &mut [u8; 512]) -> Result<(), ()> {
//!         // Read block from storage
//!         Ok(())
//!     }
//! }
//!
//! let device = MyDevice { /* ... */ };
//! let reader = AffsReader::new(&device)?;
//!
//! // List root directory
//! for entry in reader.read_dir(reader.root_block())? {
//!     println!("{}", entry.name());
//! }
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

mod block;
mod checksum;
mod constants;
mod date;
mod dir;
mod error;
mod file;
mod reader;
mod symlink;
mod types;
mod utf8;
mod varblock;
mod volume;

#[cfg(feature = "alloc")]
mod raw;
#[cfg(feature = "alloc")]
mod bitmap;
#[cfg(feature = "alloc")]
mod cache;
#[cfg(feature = "alloc")]
mod doctor;
#[cfg(feature = "alloc")]
mod path;
#[cfg(feature = "alloc")]
mod fs;

pub use block::*;
pub use checksum::{bitmap_sum, boot_sum, normal_sum, normal_sum_slice, read_u16_be};
pub use constants::*;
pub use date::AmigaDate;
pub use dir::{DirEntry, DirIter};
pub use error::{AffsError, DeviceError, Result};
pub use file::FileReader;
pub use reader::AffsReader;
pub use symlink::{
    MAX_SYMLINK_LEN, max_utf8_len, read_symlink_target, read_symlink_target_with_block_size,
};
pub use types::*;
pub use varblock::{AffsReaderVar, MAX_BLOCK_SIZE, VarDirEntry, VarDirIter};
pub use volume::{BlockKind, VolumeLayout, get_word, kind_of, word_index};

#[cfg(feature = "alloc")]
pub use raw::RawBlock;
#[cfg(feature = "alloc")]
pub use bitmap::Allocator;
#[cfg(feature = "alloc")]
pub use cache::{BlockCache, BlockHealth};
#[cfg(feature = "alloc")]
pub use doctor::{BitmapError, Doctor, XrayError, XrayErrorKind};
#[cfg(feature = "alloc")]
pub use path::{FsOpt, Pattern, TreeNode};
#[cfg(feature = "alloc")]
pub use fs::{EntryStat, FileSystem};
