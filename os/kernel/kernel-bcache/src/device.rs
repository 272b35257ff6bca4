use core::fmt;
use kernel_info::fs::BLOCK_SIZE;

/// Payload of one cached block.
pub type BlockData = [u8; BLOCK_SIZE];

/// A block on a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    pub dev: u32,
    pub blockno: u32,
}

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}:{}", self.dev, self.blockno)
    }
}

/// Direction of a device transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IoOp {
    /// Device to memory.
    Read,
    /// Memory to device.
    Write,
}

/// The backing store behind the cache.
///
/// Transfers are synchronous: the call returns once the data has been moved.
/// The cache never holds a bucket lock across a call, only the buffer's
/// content lock.
pub trait BlockDevice: Sync {
    fn read_or_write(&self, block: BlockId, data: &mut BlockData, op: IoOp);
}

impl<D> BlockDevice for &D
where
    D: BlockDevice + ?Sized,
{
    #[inline]
    fn read_or_write(&self, block: BlockId, data: &mut BlockData, op: IoOp) {
        (**self).read_or_write(block, data, op);
    }
}
