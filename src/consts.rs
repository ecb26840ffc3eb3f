pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_COUNT: usize = 256;
pub const IMAGE_SIZE: u64 = (BLOCK_SIZE * BLOCK_COUNT) as u64;

// block 0 layout
pub(crate) const BLOCK_BITMAP_SIZE: usize = BLOCK_COUNT / 8;
pub(crate) const INODE_BITMAP_SIZE: usize = 32;
pub(crate) const INODE_TABLE_OFFSET: usize = BLOCK_BITMAP_SIZE + INODE_BITMAP_SIZE;

pub const DIRECT_POINTERS: usize = 4;
pub const MAX_FILE_SIZE: u64 = (DIRECT_POINTERS * BLOCK_SIZE) as u64;
pub const MAX_INODES: usize = 256;
pub const ROOT_INODE: InodePointer = 0;

pub(crate) const FILE_NAME_FIELD: usize = 48;
pub const FILE_NAME_LENGTH: usize = FILE_NAME_FIELD - 1;

pub const DEFAULT_SECTOR_SIZE: usize = 512;

pub type BlockPointer = u64;
pub type InodePointer = u64;
pub type DirectPointers = [BlockPointer; DIRECT_POINTERS];
