//! GPU textures, their render target views and the keys they are cached under.

pub mod backend;
pub mod desc;
pub mod io;
pub mod keys;
pub mod render_target;
pub mod scratch;
pub mod surface;

pub use backend::{BackendTexture, ResourceId};
pub use desc::*;
pub use io::{IoType, PendingIo, ResourceCounters, ResourceRef};
pub use keys::{ContentFlags, content_key, needs_bilerp, needs_resizing, scratch_key};
pub use render_target::{RenderTarget, StencilBuffer};
pub use scratch::{
    SharedTexture, acquire_scratch, add_content, find_content, lock_texture, return_scratch,
};
pub use surface::{GpuMemoryListener, MipMapsStatus, PixelOpError, PixelTransfer, Texture};
