use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TargetError {
    /// the range is not part of the target memory
    #[error("the range 0x{address:X} .. 0x{address:X}+{size} is outside of the target memory")]
    OutOfRange { address: u64, size: usize },

    #[error("target {0} can not be written")]
    ReadOnly(String),

    /// adding the base offset of the link to an address overflowed
    #[error("address 0x{0:X} overflows when the base offset is added")]
    AddressOverflow(u64),

    #[error("Failed to access {filename}: {ioerror}")]
    Io {
        filename: PathBuf,
        ioerror: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Read,
    Write,
}

/// one queued memory access
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub address: u64,
    /// the bytes to write, or the buffer that receives the bytes read
    pub data: Vec<u8>,
    pub kind: BlockKind,
    /// set by the target once the access was performed
    pub done: bool,
}

/// a group of memory accesses that is handed to the target as a whole
///
/// The record layout engine fills a group in one step and reads the answers in the next one,
/// which lets a target transfer all blocks of a group in a single round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestGroup {
    blocks: Vec<DataBlock>,
}

impl RequestGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// queue a read of `size` bytes. A read of the same range is only queued once
    pub fn request_read(&mut self, address: u64, size: usize) {
        let exists = self.blocks.iter().any(|block| {
            block.kind == BlockKind::Read && block.address == address && block.data.len() == size
        });
        if !exists {
            self.blocks.push(DataBlock {
                address,
                data: vec![0; size],
                kind: BlockKind::Read,
                done: false,
            });
        }
    }

    pub fn request_write(&mut self, address: u64, data: Vec<u8>) {
        self.blocks.push(DataBlock {
            address,
            data,
            kind: BlockKind::Write,
            done: false,
        });
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [DataBlock] {
        &mut self.blocks
    }

    /// the answered bytes of the range `address .. address + size`, if a finished read covers it
    pub fn data(&self, address: u64, size: usize) -> Option<&[u8]> {
        self.blocks.iter().find_map(|block| {
            if block.kind != BlockKind::Read || !block.done || address < block.address {
                return None;
            }
            let start = usize::try_from(address - block.address).ok()?;
            block.data.get(start..start.checked_add(size)?)
        })
    }

    /// true if every queued access has been performed
    pub fn is_complete(&self) -> bool {
        self.blocks.iter().all(|block| block.done)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

/// access to the memory of a calibration target
///
/// Implemented by [`BinaryImage`] for static memory images. Live processes are attached by
/// implementing this trait on top of their own transport.
pub trait TargetAccess: Send + Sync {
    fn name(&self) -> &str;

    fn read_bytes(&self, address: u64, buffer: &mut [u8]) -> Result<(), TargetError>;

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<(), TargetError>;

    fn is_writable(&self) -> bool {
        true
    }

    /// perform all pending reads of a group
    fn fetch(&self, group: &mut RequestGroup) -> Result<(), TargetError> {
        for block in group.blocks_mut() {
            if block.kind == BlockKind::Read && !block.done {
                self.read_bytes(block.address, &mut block.data)?;
                block.done = true;
            }
        }
        Ok(())
    }

    /// perform all pending writes of a group, in the order they were queued
    fn flush(&self, group: &mut RequestGroup) -> Result<(), TargetError> {
        for block in group.blocks_mut() {
            if block.kind == BlockKind::Write && !block.done {
                self.write_bytes(block.address, &block.data)?;
                block.done = true;
            }
        }
        Ok(())
    }
}

/// an in-memory image of the target memory, starting at `start_address`
#[derive(Debug)]
pub struct BinaryImage {
    name: String,
    start_address: u64,
    writable: bool,
    data: RwLock<Vec<u8>>,
}

impl BinaryImage {
    pub fn new(name: &str, start_address: u64, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            start_address,
            writable: true,
            data: RwLock::new(data),
        }
    }

    pub fn new_read_only(name: &str, start_address: u64, data: Vec<u8>) -> Self {
        Self {
            writable: false,
            ..Self::new(name, start_address, data)
        }
    }

    /// load a raw binary file; the name of the image is the file name
    pub fn from_file<P: AsRef<Path>>(path: P, start_address: u64) -> Result<Self, TargetError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|ioerror| TargetError::Io {
            filename: path.to_path_buf(),
            ioerror,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        log::debug!("loaded binary image {} ({} bytes)", path.display(), data.len());
        Ok(Self::new(&name, start_address, data))
    }

    pub fn start_address(&self) -> u64 {
        self.start_address
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// a copy of the current memory content
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TargetError> {
        let path = path.as_ref();
        std::fs::write(path, &*self.data.read()).map_err(|ioerror| TargetError::Io {
            filename: path.to_path_buf(),
            ioerror,
        })
    }

    fn range(&self, address: u64, size: usize, len: usize) -> Result<std::ops::Range<usize>, TargetError> {
        let out_of_range = || TargetError::OutOfRange { address, size };
        let start = address
            .checked_sub(self.start_address)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(out_of_range)?;
        let end = start.checked_add(size).ok_or_else(out_of_range)?;
        if end > len {
            return Err(out_of_range());
        }
        Ok(start..end)
    }
}

impl TargetAccess for BinaryImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self, address: u64, buffer: &mut [u8]) -> Result<(), TargetError> {
        let data = self.data.read();
        let range = self.range(address, buffer.len(), data.len())?;
        buffer.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<(), TargetError> {
        if !self.writable {
            return Err(TargetError::ReadOnly(self.name.clone()));
        }
        let mut data = self.data.write();
        let range = self.range(address, bytes.len(), data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_access() {
        let image = BinaryImage::new("ecu", 0x1000, vec![1, 2, 3, 4]);
        let mut buffer = [0u8; 2];
        image.read_bytes(0x1001, &mut buffer).unwrap();
        assert_eq!(buffer, [2, 3]);

        image.write_bytes(0x1002, &[9, 8]).unwrap();
        assert_eq!(image.data(), vec![1, 2, 9, 8]);

        let result = image.read_bytes(0x1003, &mut buffer);
        assert!(matches!(result, Err(TargetError::OutOfRange { address: 0x1003, size: 2 })));
        let result = image.read_bytes(0xFFF, &mut buffer);
        assert!(matches!(result, Err(TargetError::OutOfRange { .. })));

        let image = BinaryImage::new_read_only("rom", 0, vec![0; 4]);
        assert!(!image.is_writable());
        assert!(matches!(image.write_bytes(0, &[1]), Err(TargetError::ReadOnly(_))));
    }

    #[test]
    fn request_groups() {
        let image = BinaryImage::new("ecu", 0x100, (0u8..16).collect());
        let mut group = RequestGroup::new();
        group.request_read(0x104, 4);
        group.request_read(0x104, 4);
        group.request_read(0x10C, 2);
        assert_eq!(group.len(), 2);
        assert!(group.data(0x104, 4).is_none());

        image.fetch(&mut group).unwrap();
        assert!(group.is_complete());
        assert_eq!(group.data(0x104, 4), Some(&[4u8, 5, 6, 7][..]));
        // a sub range of an answered block
        assert_eq!(group.data(0x105, 2), Some(&[5u8, 6][..]));
        assert!(group.data(0x106, 4).is_none());

        let mut writes = RequestGroup::new();
        writes.request_write(0x100, vec![0xAA, 0xBB]);
        image.flush(&mut writes).unwrap();
        assert!(writes.is_complete());
        assert_eq!(&image.data()[0..3], &[0xAA, 0xBB, 2]);

        writes.clear();
        assert!(writes.is_empty());
    }

    #[test]
    fn image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::write(&path, [0x64, 0x00]).unwrap();
        let image = BinaryImage::from_file(&path, 0x1000).unwrap();
        assert_eq!(image.name(), "image.bin");
        assert_eq!(image.len(), 2);
        image.write_bytes(0x1000, &[0x65]).unwrap();
        image.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x65, 0x00]);

        let missing = BinaryImage::from_file(dir.path().join("missing.bin"), 0);
        assert!(matches!(missing, Err(TargetError::Io { .. })));
    }
}
