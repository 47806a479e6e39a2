pub const WORD_SIZE: usize = 4;

/// Whether `len` bytes fill whole 32-bit words.
pub const fn is_align4(len: usize) -> bool {
    len & (WORD_SIZE - 1) == 0
}
