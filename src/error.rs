//! Error types for AFFS operations.

use core::fmt;

/// Error type for AFFS operations, covering both the read-only decode path
/// and the mutable cache/allocator/doctor/node layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffsError {
    /// Block read failed.
    BlockReadError,
    /// Invalid DOS type signature.
    InvalidDosType,
    /// Invalid block type.
    InvalidBlockType,
    /// Invalid secondary type.
    InvalidSecType,
    /// Checksum verification failed.
    ChecksumMismatch,
    /// Block number out of valid range.
    BlockOutOfRange,
    /// Entry not found.
    EntryNotFound,
    /// Name too long (max 30 characters).
    NameTooLong,
    /// Invalid filesystem state.
    InvalidState,
    /// End of file reached.
    EndOfFile,
    /// Not a file entry.
    NotAFile,
    /// Not a directory entry.
    NotADirectory,
    /// Buffer too small.
    BufferTooSmall,
    /// Invalid data block sequence.
    InvalidDataSequence,
    /// Not a symlink entry.
    NotASymlink,
    /// Symlink target too long.
    SymlinkTooLong,

    /// Disk has never been formatted.
    Unformatted,
    /// Volume was opened with a block size the device does not support.
    WrongBSize,
    /// Volume capacity does not match the device's reported capacity.
    WrongCapacity,
    /// Operation requires a DOS type this volume does not have.
    WrongDosType,
    /// Allocator ran out of free blocks.
    OutOfSpace,
    /// Path resolves to neither a file nor a directory.
    NotAFileOrDirectory,
    /// Target name already exists in the destination directory.
    AlreadyExists,
    /// Directory is not empty (rm without recursion).
    DirNotEmpty,
    /// Path string is malformed (empty component, embedded NUL, etc).
    InvalidPath,
    /// Glob pattern failed to compile.
    InvalidRegex,
    /// A linked structure (hash chain, tree) contains a cycle where none is allowed.
    HasCycles,
    /// The doctor's x-ray found structural corruption severe enough to block the operation.
    Corrupted,
    /// Mutation attempted on a file system opened read-only.
    ReadOnly,
    /// Underlying block device failed to open or could not be probed.
    CannotOpen,
    /// mkdir could not complete (allocator or linkage failure).
    CannotCreateDir,
    /// create_file could not complete (allocator or linkage failure).
    CannotCreateFile,
    /// The underlying block device reported an I/O failure.
    Io,
}

impl fmt::Display for AffsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockReadError => write!(f, "block read error"),
            Self::InvalidDosType => write!(f, "invalid DOS type signature"),
            Self::InvalidBlockType => write!(f, "invalid block type"),
            Self::InvalidSecType => write!(f, "invalid secondary type"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::BlockOutOfRange => write!(f, "block out of range"),
            Self::EntryNotFound => write!(f, "entry not found"),
            Self::NameTooLong => write!(f, "name too long"),
            Self::InvalidState => write!(f, "invalid filesystem state"),
            Self::EndOfFile => write!(f, "end of file"),
            Self::NotAFile => write!(f, "not a file"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidDataSequence => write!(f, "invalid data block sequence"),
            Self::NotASymlink => write!(f, "not a symlink"),
            Self::SymlinkTooLong => write!(f, "symlink target too long"),
            Self::Unformatted => write!(f, "volume is unformatted"),
            Self::WrongBSize => write!(f, "unsupported block size"),
            Self::WrongCapacity => write!(f, "volume capacity does not match device"),
            Self::WrongDosType => write!(f, "wrong DOS type for this operation"),
            Self::OutOfSpace => write!(f, "no free blocks left on volume"),
            Self::NotAFileOrDirectory => write!(f, "path is neither a file nor a directory"),
            Self::AlreadyExists => write!(f, "an entry with that name already exists"),
            Self::DirNotEmpty => write!(f, "directory is not empty"),
            Self::InvalidPath => write!(f, "invalid path"),
            Self::InvalidRegex => write!(f, "pattern failed to compile"),
            Self::HasCycles => write!(f, "structure contains a cycle"),
            Self::Corrupted => write!(f, "volume structure is corrupted"),
            Self::ReadOnly => write!(f, "file system is read-only"),
            Self::CannotOpen => write!(f, "cannot open block device"),
            Self::CannotCreateDir => write!(f, "cannot create directory"),
            Self::CannotCreateFile => write!(f, "cannot create file"),
            Self::Io => write!(f, "block device I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AffsError {}

/// Result type for AFFS operations.
pub type Result<T> = core::result::Result<T, AffsError>;

/// Error type surfaced directly by a [`crate::WritableBlockDevice`].
///
/// Kept distinct from [`AffsError`] because devices are external collaborators
/// with a much smaller failure surface; `From<DeviceError> for AffsError` folds
/// the two at the L0/L1 boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Requested block number is outside the device's capacity.
    OutOfRange,
    /// The underlying medium reported a read/write failure.
    Io,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "block number out of range"),
            Self::Io => write!(f, "device I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeviceError {}

impl From<DeviceError> for AffsError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::OutOfRange => Self::BlockOutOfRange,
            DeviceError::Io => Self::Io,
        }
    }
}
