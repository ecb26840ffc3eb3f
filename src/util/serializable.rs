/// Fixed-layout on-disk records. `from_bytes` gets a slice of at least
/// `size_on_disk()` bytes.
pub trait ByteSerializable {
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Self;
}

pub trait KnownSize: ByteSerializable {
    fn size_on_disk() -> usize;
}

// little endian field readers for record decoding

pub(crate) fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub(crate) fn le_i32(bytes: &[u8], at: usize) -> i32 {
    le_u32(bytes, at) as i32
}
