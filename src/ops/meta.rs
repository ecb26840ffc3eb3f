use crate::consts::{InodePointer, BLOCK_SIZE};
use crate::structure::inode::Inode;
use crate::util::mode::{ModeBits, ModeBitsHelper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,
    Directory,
}

pub type UserId = u32;
pub type GroupId = u32;

/// What `getattr` reports. Ownership is not stored per file; it is whoever
/// runs the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub inode: InodePointer,
    pub inode_type: InodeType,
    pub mode: ModeBits,
    pub permissions: u16,
    pub size: u64,
    pub blocks: u64,
    pub nlinks: u32,
    pub user_id: UserId,
    pub group_id: GroupId,
}

impl Metadata {
    pub fn from_inode(id: InodePointer, inode: &Inode, user_id: UserId, group_id: GroupId) -> Metadata {
        Metadata {
            inode: id,
            inode_type: if inode.is_directory() { InodeType::Directory } else { InodeType::File },
            mode: inode.get_mode(),
            permissions: inode.get_mode().get_permissions(),
            size: inode.get_size(),
            blocks: inode.used_pointers() as u64,
            nlinks: inode.get_refs() as u32,
            user_id,
            group_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub free_blocks: u64,
    pub files: u64,
    pub free_files: u64,
    pub block_size: u32,
    pub name_length: u32,
}

impl StatFs {
    pub fn used_bytes(&self) -> u64 {
        (self.blocks - self.free_blocks) * BLOCK_SIZE as u64
    }
}
