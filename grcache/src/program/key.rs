use dashmap::DashMap;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::any::TypeId;
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide id of a processor type, assigned on first use.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ClassId(u32);

static CLASS_IDS: Lazy<DashMap<TypeId, ClassId>> = Lazy::new(DashMap::new);
static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(1);

impl ClassId {
    pub fn of<T: 'static>() -> Self {
        Self::for_type_id(TypeId::of::<T>())
    }

    pub fn for_type_id(type_id: TypeId) -> Self {
        *CLASS_IDS
            .entry(type_id)
            .or_insert_with(|| ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Collects the key words of one processor stage.
#[derive(Debug, Default, Clone)]
pub struct ProcessorKeyBuilder {
    words: SmallVec<[u32; 8]>,
}

impl ProcessorKeyBuilder {
    pub fn add32(&mut self, word: u32) -> &mut Self {
        self.words.push(word);
        self
    }

    pub fn add_bool(&mut self, flag: bool) -> &mut Self {
        self.add32(flag as u32)
    }

    pub fn byte_len(&self) -> usize {
        self.words.len() * size_of::<u32>()
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// Words every stage key starts with, ahead of the processor's own words.
pub(crate) const STAGE_PREFIX_WORDS: usize = 3;

/// One stage's key fragment inside a program descriptor.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProcessorKey<'a> {
    words: &'a [u32],
}

impl<'a> ProcessorKey<'a> {
    pub(crate) fn new(words: &'a [u32]) -> Self {
        ProcessorKey { words }
    }

    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    pub fn class_id(&self) -> u32 {
        self.words.first().copied().unwrap_or(0)
    }

    pub fn transform_key(&self) -> u32 {
        self.words.get(1).copied().unwrap_or(0)
    }

    pub fn texture_key(&self) -> u32 {
        self.words.get(2).copied().unwrap_or(0)
    }

    /// The words the processor wrote itself.
    pub fn processor_words(&self) -> &'a [u32] {
        self.words.get(STAGE_PREFIX_WORDS..).unwrap_or(&[])
    }
}
