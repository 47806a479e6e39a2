use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::xxh3_64;

/// Which family of artifacts a key belongs to.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum KeyDomain {
    Bitmap = 1,
    MipMap = 2,
    ScratchTexture = 3,
    ContentTexture = 4,
}

impl KeyDomain {
    /// Content domains store the content (generation) id as their first payload word.
    pub const fn is_content(self) -> bool {
        !matches!(self, KeyDomain::ScratchTexture)
    }

    /// Structural keys may be shared by several interchangeable records.
    pub const fn allows_duplicates(self) -> bool {
        matches!(self, KeyDomain::ScratchTexture)
    }

    pub const fn name(self) -> &'static str {
        match self {
            KeyDomain::Bitmap => "Bitmap",
            KeyDomain::MipMap => "MipMap",
            KeyDomain::ScratchTexture => "Scratch Texture",
            KeyDomain::ContentTexture => "Content Texture",
        }
    }
}

type Words = SmallVec<[u32; 12]>;

/// Immutable, word-aligned cache key.
///
/// The first word is the [`KeyDomain`], the rest is the domain payload. Two keys are
/// equal iff their words are identical, so a key never mixes padding into comparisons.
#[derive(Clone)]
pub struct CacheKey {
    domain: KeyDomain,
    hash: u32,
    words: Words,
}

impl CacheKey {
    pub fn new(domain: KeyDomain, payload: &[u32]) -> Self {
        let mut words = Words::with_capacity(payload.len() + 1);
        words.push(domain.into());
        words.extend_from_slice(payload);

        let hash = xxh3_64(bytemuck::cast_slice(&words)) as u32;
        CacheKey {
            domain,
            hash,
            words,
        }
    }

    pub fn domain(&self) -> KeyDomain {
        self.domain
    }

    pub fn payload(&self) -> &[u32] {
        &self.words[1..]
    }

    pub fn content_id(&self) -> Option<u32> {
        if self.domain().is_content() {
            self.payload().first().copied()
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    pub fn byte_len(&self) -> usize {
        self.words.len() * size_of::<u32>()
    }

    pub fn hash32(&self) -> u32 {
        self.hash
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.words == other.words
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}

impl Debug for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Key{:08x?}", self.domain().name().replace(' ', ""), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_words_equal_keys() {
        let a = CacheKey::new(KeyDomain::Bitmap, &[7, 1, 2]);
        let b = CacheKey::new(KeyDomain::Bitmap, &[7, 1, 2]);
        let c = CacheKey::new(KeyDomain::MipMap, &[7, 1, 2]);

        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a, c);
        assert_eq!(a.content_id(), Some(7));
        assert_eq!(a.byte_len(), 16);
    }

    #[test]
    fn scratch_keys_have_no_content() {
        let key = CacheKey::new(KeyDomain::ScratchTexture, &[1, 2, 3, 4]);
        assert_eq!(key.content_id(), None);
        assert!(key.domain().allows_duplicates());
        assert_eq!(KeyDomain::try_from(3u32).ok(), Some(KeyDomain::ScratchTexture));
    }
}
