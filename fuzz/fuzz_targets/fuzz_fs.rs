#![no_main]

extern crate alloc;

use affs_fs::{AffsError, FileSystem, FsFlags, FsType, VolumeLayout, WritableBlockDevice};
use libfuzzer_sys::fuzz_target;

/// An in-memory device backed by fuzzed data, sized to a small fixed volume
/// so every run exercises the same bitmap/hash-table geometry.
struct FuzzDevice {
    blocks: Vec<[u8; 512]>,
}

impl affs_fs::BlockDevice for FuzzDevice {
    fn read_block(&self, block: u32, buf: &mut [u8; 512]) -> Result<(), ()> {
        buf.copy_from_slice(self.blocks.get(block as usize).ok_or(())?);
        Ok(())
    }
}

impl WritableBlockDevice for FuzzDevice {
    fn write_block(&mut self, block: u32, buf: &[u8]) -> Result<(), affs_fs::DeviceError> {
        let slot = self.blocks.get_mut(block as usize).ok_or(affs_fs::DeviceError::OutOfRange)?;
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
        capacity: 200,
        bsize: 512,
        fs_type: FsType::Ofs,
        flags: FsFlags::default(),
        root_nr: 100,
        bm_blocks: alloc::vec![101],
        bm_ext_blocks: Vec::new(),
        reserved: 2,
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 200 * 512 {
        return;
    }
    let mut blocks = Vec::with_capacity(200);
    for i in 0..200usize {
        let mut b = [0u8; 512];
        b.copy_from_slice(&data[i * 512..(i + 1) * 512]);
        blocks.push(b);
    }
    let device = FuzzDevice { blocks };

    // An arbitrary fuzzed image rarely decodes to a consistent bitmap, so
    // `open` itself must never panic walking garbage bitmap/hash-chain bytes.
    let mut fs = match FileSystem::open(device, layout()) {
        Ok(fs) => fs,
        Err(_) => return,
    };

    let root = fs.root_nr();
    let _ = fs.list(root);
    let _ = fs.xray();
    let _ = fs.xray_bitmap();

    // A handful of mutation calls against whatever garbage tree resulted;
    // none of these may panic regardless of how corrupt the starting image
    // was, only return a typed `AffsError`.
    match fs.create_file(root, "fuzz", Some(b"hello"), affs_fs::AmigaDate { days: 0, mins: 0, ticks: 0 }) {
        Ok(nr) => {
            let _ = fs.extract(nr);
            let _ = fs.resize(nr, 37);
            let _ = fs.rename(nr, "fuzzed");
            let _ = fs.rm(nr);
        }
        Err(AffsError::AlreadyExists | AffsError::OutOfSpace | AffsError::NotADirectory) => {}
        Err(_) => {}
    }
});
