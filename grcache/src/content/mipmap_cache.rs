use crate::content::bitmap::Bitmap;
use crate::content::bitmap_cache::scaled_key;
use crate::content::mipmap::{MipMap, MipMapRef};
use crate::resource_cache::{CacheKey, CacheRecord, KeyDomain, ResourceCache, with_cache};
use std::any::Any;
use std::sync::Arc;

/// Mip maps use the otherwise invalid scale `(0, 0)`.
pub fn mipmap_key(src: &Bitmap) -> CacheKey {
    scaled_key(
        KeyDomain::MipMap,
        src.generation_id(),
        0.0,
        0.0,
        src.bounds_in_pixel_ref(),
    )
}

struct MipMapRecord {
    key: CacheKey,
    mipmap: Arc<MipMap>,
}

impl MipMapRecord {
    fn new(key: CacheKey, mipmap: Arc<MipMap>) -> Self {
        mipmap.attach_to_cache();
        MipMapRecord { key, mipmap }
    }
}

impl Drop for MipMapRecord {
    fn drop(&mut self) {
        self.mipmap.detach_from_cache();
    }
}

impl CacheRecord for MipMapRecord {
    fn key(&self) -> &CacheKey {
        &self.key
    }

    fn bytes_used(&self) -> usize {
        self.key.byte_len() + self.mipmap.size()
    }

    fn name(&self) -> &'static str {
        "MipMap"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Finds the mip map of `src`. The reference keeps its pixels locked until dropped.
pub fn find_and_ref(src: &Bitmap, local: Option<&mut ResourceCache>) -> Option<MipMapRef> {
    let key = mipmap_key(src);
    with_cache(local, |cache| {
        cache.find(&key, |record| {
            let record = record.as_any().downcast_ref::<MipMapRecord>()?;
            MipMapRef::acquire(&record.mipmap)
        })
    })
}

/// Builds the mip map of `src`, caches it and returns a reference to it.
pub fn add_and_ref(src: &Bitmap, local: Option<&mut ResourceCache>) -> Option<MipMapRef> {
    let key = mipmap_key(src);
    with_cache(local, |cache| {
        let factory = cache.discardable_factory().cloned();
        let mipmap = MipMap::build(src, factory.as_ref())?;
        cache.add(Box::new(MipMapRecord::new(key, mipmap.mipmap().clone())));
        Some(mipmap)
    })
}
