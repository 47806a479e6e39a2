use crate::caps::Caps;
use crate::resource_cache::{CacheKey, KeyDomain};
use crate::texture::desc::{FilterMode, TextureDesc, TextureParams};
use bitflags::bitflags;

bitflags! {
    /// Folded into content keys: how the cached pixels differ from the source.
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct ContentFlags: u32 {
        /// NPOT texture that is tiled on hardware without NPOT tiling.
        const STRETCH_TO_POT = 0x1;
        /// Only with `STRETCH_TO_POT`: the stretched copy is filtered.
        const BILERP = 0x2;
    }
}

/// Structural key: any free texture with the same shape, config and flags is interchangeable.
pub fn scratch_key(desc: &TextureDesc) -> CacheKey {
    let config: u16 = desc.config.into();
    let origin: u32 = desc.resolved_origin().into();
    CacheKey::new(
        KeyDomain::ScratchTexture,
        &[
            desc.width,
            desc.height,
            desc.sample_count,
            config as u32,
            desc.flags.bits(),
            origin,
        ],
    )
}

pub fn content_flags(
    caps: &Caps,
    params: Option<&TextureParams>,
    desc: &TextureDesc,
) -> ContentFlags {
    let tiled = params.is_some_and(|p| p.is_tiled());
    if !tiled || caps.npot_texture_tile_support {
        return ContentFlags::empty();
    }
    if desc.width.is_power_of_two() && desc.height.is_power_of_two() {
        return ContentFlags::empty();
    }

    let mut flags = ContentFlags::STRETCH_TO_POT;
    if params.is_some_and(|p| p.filter != FilterMode::None) {
        flags |= ContentFlags::BILERP;
    }
    flags
}

/// Key of a texture holding the client content `content_id`, as sampled with `params`.
pub fn content_key(
    content_id: u32,
    caps: &Caps,
    params: Option<&TextureParams>,
    desc: &TextureDesc,
) -> CacheKey {
    let flags = content_flags(caps, params, desc);
    CacheKey::new(KeyDomain::ContentTexture, &[content_id, flags.bits()])
}

fn key_flags(key: &CacheKey) -> ContentFlags {
    match key.domain() {
        KeyDomain::ContentTexture => key
            .payload()
            .get(1)
            .map_or(ContentFlags::empty(), |bits| ContentFlags::from_bits_truncate(*bits)),
        _ => ContentFlags::empty(),
    }
}

pub fn needs_resizing(key: &CacheKey) -> bool {
    key_flags(key).contains(ContentFlags::STRETCH_TO_POT)
}

pub fn needs_bilerp(key: &CacheKey) -> bool {
    key_flags(key).contains(ContentFlags::BILERP)
}
