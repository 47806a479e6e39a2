use crate::texture::backend::{self, BackendTexture, ResourceId};
use crate::texture::io::ResourceCounters;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StencilBuffer {
    pub bits: u32,
    pub sample_count: u32,
}

/// The render target view of a texture.
///
/// The texture owns its render target. The render target only remembers the id of its
/// owner, which is cleared when the owning texture is destroyed.
pub struct RenderTarget {
    id: ResourceId,
    sample_count: u32,
    stencil: Option<StencilBuffer>,
    counters: Arc<ResourceCounters>,
    owner: AtomicU32,
    msaa_backend: Mutex<Option<Box<dyn BackendTexture>>>,
}

impl RenderTarget {
    pub fn new(
        sample_count: u32,
        stencil: Option<StencilBuffer>,
        msaa_backend: Option<Box<dyn BackendTexture>>,
    ) -> Self {
        RenderTarget {
            id: ResourceId::next(),
            sample_count,
            stencil,
            counters: Arc::default(),
            owner: AtomicU32::new(0),
            msaa_backend: Mutex::new(msaa_backend),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 0
    }

    pub fn stencil_buffer(&self) -> Option<&StencilBuffer> {
        self.stencil.as_ref()
    }

    pub fn counters(&self) -> &Arc<ResourceCounters> {
        &self.counters
    }

    /// The texture this render target belongs to, if it still exists.
    pub fn owner(&self) -> Option<ResourceId> {
        ResourceId::from_raw(self.owner.load(Ordering::Acquire))
    }

    pub(crate) fn set_owner(&self, owner: ResourceId) {
        self.owner.store(owner.get(), Ordering::Release);
    }

    pub(crate) fn owning_texture_destroyed(&self) {
        self.owner.store(0, Ordering::Release);
    }

    pub(crate) fn release(&self) {
        backend::release(self.take_backend());
    }

    pub(crate) fn abandon(&self) {
        backend::abandon(self.take_backend());
    }

    fn take_backend(&self) -> Option<Box<dyn BackendTexture>> {
        self.msaa_backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.release();
    }
}
