use std::sync::atomic::{AtomicU32, Ordering};

/// Unique id of a GPU object, never 0.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(u32);

static NEXT_RESOURCE_ID: AtomicU32 = AtomicU32::new(1);

impl ResourceId {
    pub fn next() -> Self {
        ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then_some(ResourceId(raw))
    }
}

/// The GPU object behind a texture or render target.
pub trait BackendTexture: Send {
    /// Deletes the GPU object.
    fn release(&mut self);

    /// The context is gone; the object must not be touched anymore, including when the handle is
    /// dropped afterwards.
    fn abandon(&mut self) {}
}

#[cfg(not(target_arch = "wasm32"))]
impl BackendTexture for wgpu::Texture {
    fn release(&mut self) {
        self.destroy();
    }
}

pub(crate) fn release(backend: Option<Box<dyn BackendTexture>>) {
    if let Some(mut backend) = backend {
        backend.release();
    }
}

/// Handles of an abandoned context are dropped without being deleted.
pub(crate) fn abandon(backend: Option<Box<dyn BackendTexture>>) {
    if let Some(mut backend) = backend {
        backend.abandon();
    }
}
