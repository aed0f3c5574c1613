use crc32fast::Hasher;

/// Reflected CRC-32 (polynomial 0xEDB88320, complemented in and out) of
/// `bytes`, continuing from `seed`.
///
/// A seed of 0 starts a fresh checksum.  Passing the result of a previous
/// call continues it, so `crc32(crc32(0, a), b) == crc32(0, a ++ b)`.
pub fn crc32(seed: u32, bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(seed);
    hasher.update(bytes);
    hasher.finalize()
}
