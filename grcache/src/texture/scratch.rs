use crate::resource_cache::{CacheKey, CacheRecord, ResourceCache, with_cache};
use crate::texture::desc::TextureDesc;
use crate::texture::keys::scratch_key;
use crate::texture::surface::{GpuMemoryListener, Texture};
use log::trace;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A content texture shared between the cache and its users.
pub type SharedTexture = Arc<Mutex<Texture>>;

pub fn lock_texture(texture: &SharedTexture) -> MutexGuard<'_, Texture> {
    texture.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A free texture parked under its scratch key.
struct ScratchRecord {
    key: CacheKey,
    texture: Texture,
}

impl CacheRecord for ScratchRecord {
    fn key(&self) -> &CacheKey {
        &self.key
    }

    fn bytes_used(&self) -> usize {
        self.texture.gpu_memory_size()
    }

    fn is_referenced(&self) -> bool {
        self.texture.has_pending_io() || self.texture.counters().has_refs()
    }

    fn name(&self) -> &'static str {
        "Scratch Texture"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Parks a texture nobody uses anymore so a same-shaped request can reuse it.
pub fn return_scratch(texture: Texture, local: Option<&mut ResourceCache>) -> bool {
    if texture.was_destroyed() {
        return false;
    }

    let record = ScratchRecord {
        key: texture.scratch_key(),
        texture,
    };
    with_cache(local, |cache| cache.add(Box::new(record)))
}

/// Takes a free texture matching `desc` out of the cache.
///
/// Textures the GPU still reads from or writes to are left alone.
pub fn acquire_scratch(desc: &TextureDesc, local: Option<&mut ResourceCache>) -> Option<Texture> {
    let key = scratch_key(desc);
    let record = with_cache(local, |cache| {
        cache.remove_where(&key, |record| !record.is_referenced())
    })?;

    let record = record.into_any().downcast::<ScratchRecord>().ok()?;
    trace!("Reusing scratch texture #{}", record.texture.id().get());
    Some(record.texture)
}

struct ContentRecord {
    key: CacheKey,
    texture: SharedTexture,
}

impl CacheRecord for ContentRecord {
    fn key(&self) -> &CacheKey {
        &self.key
    }

    fn bytes_used(&self) -> usize {
        lock_texture(&self.texture).gpu_memory_size()
    }

    fn is_referenced(&self) -> bool {
        // a texture locked elsewhere is in use
        Arc::strong_count(&self.texture) > 1
            || self
                .texture
                .try_lock()
                .map_or(true, |texture| texture.has_pending_io())
    }

    fn name(&self) -> &'static str {
        "Content Texture"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl Drop for ContentRecord {
    fn drop(&mut self) {
        // detach from the cache, a texture locked elsewhere keeps its listener until then
        if let Ok(mut texture) = self.texture.try_lock() {
            texture.set_memory_listener(None);
        }
    }
}

/// Caches `texture` under a content key and returns the shared handle.
///
/// Footprint changes of the texture (mip levels being allocated) are reported back to the cache
/// for as long as it holds the record. Returns `None` if the key is already taken, dropping
/// `texture`.
pub fn add_content(
    key: CacheKey,
    texture: Texture,
    local: Option<&mut ResourceCache>,
) -> Option<SharedTexture> {
    with_cache(local, |cache| {
        if cache.contains(&key) {
            return None;
        }

        let shared = Arc::new(Mutex::new(texture));
        let record = ContentRecord {
            key: key.clone(),
            texture: shared.clone(),
        };
        if !cache.add(Box::new(record)) {
            return None;
        }

        if let Some(notifier) = cache.size_change_notifier(&key) {
            let listener: Arc<dyn GpuMemoryListener> = Arc::new(notifier);
            lock_texture(&shared).set_memory_listener(Some(listener));
        }
        Some(shared)
    })
}

pub fn find_content(key: &CacheKey, local: Option<&mut ResourceCache>) -> Option<SharedTexture> {
    with_cache(local, |cache| {
        cache.find(key, |record| {
            let record = record.as_any().downcast_ref::<ContentRecord>()?;
            Some(record.texture.clone())
        })
    })
}
