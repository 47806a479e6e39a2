use crate::content::ImageInfo;
use crate::geometry::IRect;
use crate::resource_cache::{CacheKey, SizeChangeNotifier};
use crate::texture::backend::{self, BackendTexture, ResourceId};
use crate::texture::desc::{PixelConfig, SurfaceOrigin, TextureDesc, TextureFlags};
use crate::texture::io::ResourceCounters;
use crate::texture::keys;
use crate::texture::render_target::RenderTarget;
use log::{trace, warn};
use snafu::{Snafu, ensure};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MipMapsStatus {
    NotAllocated,
    /// Allocated, but the levels no longer match level 0.
    Allocated,
    Valid,
}

/// Told whenever a texture's GPU memory footprint changes.
pub trait GpuMemoryListener: Send + Sync {
    fn did_change_gpu_memory_size(&self, texture: ResourceId, old_size: usize, new_size: usize);
}

impl GpuMemoryListener for SizeChangeNotifier {
    fn did_change_gpu_memory_size(&self, _texture: ResourceId, old_size: usize, new_size: usize) {
        self.notify(old_size, new_size);
    }
}

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum PixelOpError {
    #[snafu(display("Texture has no pixel transfer attached"))]
    Detached,

    #[snafu(display("Texture was already released or abandoned"))]
    Destroyed,

    #[snafu(display("Region {region:?} is outside of the {width}x{height} surface"))]
    OutOfBounds {
        region: IRect,
        width: u32,
        height: u32,
    },

    #[snafu(display("Buffer holds {len} bytes, the region needs {needed}"))]
    BufferTooSmall { len: usize, needed: usize },

    #[snafu(display("Pixel transfer failed: {reason}"))]
    Transfer { reason: String },
}

/// Moves pixels between the CPU and a texture. Implemented by the GPU call layer.
pub trait PixelTransfer: Send + Sync {
    fn read_texture_pixels(
        &self,
        texture: &Texture,
        region: IRect,
        config: PixelConfig,
        buffer: &mut [u8],
        row_bytes: usize,
    ) -> Result<(), PixelOpError>;

    fn write_texture_pixels(
        &self,
        texture: &Texture,
        region: IRect,
        config: PixelConfig,
        buffer: &[u8],
        row_bytes: usize,
    ) -> Result<(), PixelOpError>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Lifetime {
    Live,
    Released,
    Abandoned,
}

pub struct Texture {
    id: ResourceId,
    desc: TextureDesc,
    mip_maps_status: MipMapsStatus,
    render_target: Option<Arc<RenderTarget>>,
    backend: Option<Box<dyn BackendTexture>>,
    counters: Arc<ResourceCounters>,
    memory_listener: Option<Arc<dyn GpuMemoryListener>>,
    transfer: Option<Arc<dyn PixelTransfer>>,
    lifetime: Lifetime,
}

impl Texture {
    pub fn new(desc: TextureDesc, backend: Option<Box<dyn BackendTexture>>) -> Self {
        Self::build(desc, backend, None)
    }

    /// A texture that can also be rendered to through `render_target`.
    pub fn with_render_target(
        desc: TextureDesc,
        backend: Option<Box<dyn BackendTexture>>,
        render_target: RenderTarget,
    ) -> Self {
        Self::build(desc, backend, Some(render_target))
    }

    fn build(
        desc: TextureDesc,
        backend: Option<Box<dyn BackendTexture>>,
        render_target: Option<RenderTarget>,
    ) -> Self {
        let id = ResourceId::next();
        if let Some(rt) = &render_target {
            rt.set_owner(id);
        }

        let texture = Texture {
            id,
            desc,
            mip_maps_status: MipMapsStatus::NotAllocated,
            render_target: render_target.map(Arc::new),
            backend,
            counters: Arc::default(),
            memory_listener: None,
            transfer: None,
            lifetime: Lifetime::Live,
        };
        texture.validate();
        texture
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn config(&self) -> PixelConfig {
        self.desc.config
    }

    pub fn origin(&self) -> SurfaceOrigin {
        self.desc.resolved_origin()
    }

    pub fn render_target(&self) -> Option<&Arc<RenderTarget>> {
        self.render_target.as_ref()
    }

    pub fn counters(&self) -> &Arc<ResourceCounters> {
        &self.counters
    }

    pub fn scratch_key(&self) -> CacheKey {
        keys::scratch_key(&self.desc)
    }

    pub fn info(&self) -> Option<ImageInfo> {
        let color_type = self.desc.config.color_type()?;
        Some(ImageInfo::new(
            self.desc.width as i32,
            self.desc.height as i32,
            color_type,
        ))
    }

    pub fn mip_maps_status(&self) -> MipMapsStatus {
        self.mip_maps_status
    }

    pub fn has_mip_maps(&self) -> bool {
        self.mip_maps_status != MipMapsStatus::NotAllocated
    }

    pub fn mip_maps_are_dirty(&self) -> bool {
        self.mip_maps_status == MipMapsStatus::Allocated
    }

    /// `true` marks valid levels stale. `false` means the levels were just (re)generated,
    /// which allocates them on first use and reports the doubled footprint.
    pub fn dirty_mip_maps(&mut self, dirty: bool) {
        if dirty {
            if self.mip_maps_status == MipMapsStatus::Valid {
                self.mip_maps_status = MipMapsStatus::Allocated;
            }
        } else {
            let old_size = self.gpu_memory_size();
            let size_changed = self.mip_maps_status == MipMapsStatus::NotAllocated;
            self.mip_maps_status = MipMapsStatus::Valid;
            if size_changed {
                // status must already be updated for the new size to be right
                self.did_change_gpu_memory_size(old_size);
            }
        }
        self.validate();
    }

    /// Computed from the descriptor, doubled once mip levels are allocated.
    pub fn gpu_memory_size(&self) -> usize {
        let size = self.desc.config.data_size(self.desc.width, self.desc.height);
        if self.has_mip_maps() { size * 2 } else { size }
    }

    pub fn set_memory_listener(&mut self, listener: Option<Arc<dyn GpuMemoryListener>>) {
        self.memory_listener = listener;
    }

    fn did_change_gpu_memory_size(&self, old_size: usize) {
        let new_size = self.gpu_memory_size();
        trace!("Texture #{} changed size: {old_size} -> {new_size} bytes", self.id.get());
        if let Some(listener) = &self.memory_listener {
            listener.did_change_gpu_memory_size(self.id, old_size, new_size);
        }
    }

    /// A surface may be read through its texture or its render target view.
    pub fn has_pending_read(&self) -> bool {
        self.counters.has_pending_read()
            || self
                .render_target
                .as_ref()
                .is_some_and(|rt| rt.counters().has_pending_read())
    }

    pub fn has_pending_write(&self) -> bool {
        self.counters.has_pending_write()
            || self
                .render_target
                .as_ref()
                .is_some_and(|rt| rt.counters().has_pending_write())
    }

    pub fn has_pending_io(&self) -> bool {
        self.counters.has_pending_io()
            || self
                .render_target
                .as_ref()
                .is_some_and(|rt| rt.counters().has_pending_io())
    }

    /// Surfaces with a render target are identified by it, plain textures by themselves.
    pub fn is_same_as(&self, other: &Texture) -> bool {
        match (&self.render_target, &other.render_target) {
            (Some(a), Some(b)) => a.id() == b.id(),
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => self.id == other.id,
        }
    }

    pub fn set_pixel_transfer(&mut self, transfer: Option<Arc<dyn PixelTransfer>>) {
        self.transfer = transfer;
    }

    fn check_region(
        &self,
        region: IRect,
        config: PixelConfig,
        len: usize,
        row_bytes: usize,
    ) -> Result<(), PixelOpError> {
        ensure!(self.lifetime == Lifetime::Live, DestroyedErr);

        let bounds = IRect::from_wh(self.desc.width as i32, self.desc.height as i32);
        ensure!(
            bounds.contains(&region),
            OutOfBoundsErr {
                region,
                width: self.desc.width,
                height: self.desc.height,
            }
        );

        let needed = (region.height() as usize - 1) * row_bytes
            + config.data_size(region.width() as u32, 1);
        ensure!(len >= needed, BufferTooSmallErr { len, needed });
        Ok(())
    }

    pub fn read_pixels(
        &self,
        region: IRect,
        config: PixelConfig,
        buffer: &mut [u8],
        row_bytes: usize,
    ) -> Result<(), PixelOpError> {
        let transfer = self.transfer.as_ref().ok_or(PixelOpError::Detached)?;
        self.check_region(region, config, buffer.len(), row_bytes)?;
        transfer.read_texture_pixels(self, region, config, buffer, row_bytes)
    }

    pub fn write_pixels(
        &mut self,
        region: IRect,
        config: PixelConfig,
        buffer: &[u8],
        row_bytes: usize,
    ) -> Result<(), PixelOpError> {
        let transfer = self.transfer.clone().ok_or(PixelOpError::Detached)?;
        self.check_region(region, config, buffer.len(), row_bytes)?;
        transfer.write_texture_pixels(self, region, config, buffer, row_bytes)?;

        // level 0 changed under the mip levels
        self.dirty_mip_maps(true);
        Ok(())
    }

    pub fn was_destroyed(&self) -> bool {
        self.lifetime != Lifetime::Live
    }

    /// Deletes the GPU objects now instead of on drop.
    pub fn release(&mut self) {
        if self.was_destroyed() {
            return;
        }
        if let Some(rt) = &self.render_target {
            rt.release();
        }
        backend::release(self.backend.take());
        self.lifetime = Lifetime::Released;
    }

    /// The context was lost: drop every GPU handle without deleting it.
    pub fn abandon(&mut self) {
        if self.was_destroyed() {
            return;
        }
        if let Some(rt) = &self.render_target {
            rt.abandon();
        }
        backend::abandon(self.backend.take());
        self.lifetime = Lifetime::Abandoned;
    }

    #[cfg(debug_assertions)]
    fn validate(&self) {
        let flags = self.desc.flags;
        match &self.render_target {
            Some(rt) => {
                debug_assert!(
                    flags.contains(TextureFlags::RENDER_TARGET),
                    "texture with a render target lacks the render target flag"
                );
                if flags.contains(TextureFlags::NO_STENCIL) {
                    debug_assert!(
                        rt.stencil_buffer().is_none(),
                        "no-stencil render target has a stencil buffer"
                    );
                }
                debug_assert_eq!(
                    self.desc.sample_count,
                    rt.sample_count(),
                    "texture and render target disagree on sample count"
                );
            }
            None => {
                debug_assert!(
                    !flags.intersects(TextureFlags::RENDER_TARGET | TextureFlags::NO_STENCIL),
                    "render target flags on a plain texture"
                );
                debug_assert_eq!(self.desc.sample_count, 0, "multisampled plain texture");
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn validate(&self) {}
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(rt) = &self.render_target {
            rt.owning_texture_destroyed();
        }

        if self.has_pending_io() {
            warn!("Texture #{} destroyed with pending IO", self.id.get());
        }
        self.release();
    }
}

impl Debug for Texture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("mip_maps_status", &self.mip_maps_status)
            .field("render_target", &self.render_target.as_ref().map(|rt| rt.id()))
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
