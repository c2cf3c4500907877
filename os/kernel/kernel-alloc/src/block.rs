//! # Block Device Boundary
//!
//! The swap path moves pages through a device with fixed-size blocks. A page
//! spans `PAGE_SIZE / block_size` contiguous blocks.

use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_sync::SpinLock;

/// A device addressed in fixed-size blocks.
///
/// Implementations serialize access themselves; the swap path calls these
/// without holding any of its own locks.
pub trait BlockDevice {
    /// Size of one block in bytes. Constant for the life of the device.
    fn block_size(&self) -> usize;

    /// Read block `block` into `buf`, which must be exactly one block long.
    ///
    /// # Errors
    /// [`BlockDeviceError::OutOfRange`] past the end of the device,
    /// [`BlockDeviceError::BufferSize`] if `buf` is not one block.
    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), BlockDeviceError>;

    /// Write `buf`, exactly one block long, to block `block`.
    ///
    /// # Errors
    /// Same as [`read_block`](Self::read_block).
    fn write_block(&self, block: u64, buf: &[u8]) -> Result<(), BlockDeviceError>;
}

impl<D: BlockDevice> BlockDevice for &D {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), BlockDeviceError> {
        (**self).read_block(block, buf)
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> Result<(), BlockDeviceError> {
        (**self).write_block(block, buf)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BlockDeviceError {
    #[error("block {0} is past the end of the device")]
    OutOfRange(u64),
    #[error("buffer of {actual} bytes for a {expected}-byte block")]
    BufferSize { expected: usize, actual: usize },
}

/// A block device backed by heap memory.
///
/// Serves as the swap device on machines without storage, and in tests.
/// Counts every block transferred.
pub struct RamDisk {
    block_size: usize,
    data: SpinLock<Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    /// A zero-filled disk of `blocks` blocks of `block_size` bytes.
    ///
    /// # Panics
    /// If `block_size` is zero or the total size overflows.
    #[must_use]
    pub fn new(block_size: usize, blocks: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        let Some(len) = block_size.checked_mul(blocks) else {
            panic!("ram disk of {blocks} x {block_size} bytes overflows");
        };
        Self {
            block_size,
            data: SpinLock::new(vec![0; len]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of blocks on the disk.
    #[must_use]
    pub fn blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }

    /// Blocks read so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Blocks written so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn range(&self, len: usize, block: u64, buf_len: usize) -> Result<Range<usize>, BlockDeviceError> {
        if buf_len != self.block_size {
            return Err(BlockDeviceError::BufferSize {
                expected: self.block_size,
                actual: buf_len,
            });
        }
        let start = usize::try_from(block)
            .ok()
            .and_then(|b| b.checked_mul(self.block_size))
            .ok_or(BlockDeviceError::OutOfRange(block))?;
        match start.checked_add(self.block_size) {
            Some(end) if end <= len => Ok(start..end),
            _ => Err(BlockDeviceError::OutOfRange(block)),
        }
    }
}

impl BlockDevice for RamDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), BlockDeviceError> {
        let data = self.data.lock();
        let range = self.range(data.len(), block, buf.len())?;
        buf.copy_from_slice(&data[range]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> Result<(), BlockDeviceError> {
        let mut data = self.data.lock();
        let range = self.range(data.len(), block, buf.len())?;
        data[range].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
