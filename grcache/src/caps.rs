use bon::Builder;

/// What the backend can do, as far as keys and generated programs are concerned.
#[derive(Debug, Clone, Builder)]
pub struct Caps {
    /// Non power of two textures can be sampled with repeat or mirror tiling.
    #[builder(default = true)]
    pub npot_texture_tile_support: bool,
    #[builder(default = false)]
    pub dual_source_blending_support: bool,
    #[builder(default = false)]
    pub path_rendering_support: bool,
    #[builder(default = 4)]
    pub max_sample_count: u32,
}

impl Default for Caps {
    fn default() -> Self {
        Caps::builder().build()
    }
}

impl Caps {
    pub fn from_device(features: wgpu::Features, downlevel: &wgpu::DownlevelCapabilities) -> Self {
        Caps::builder()
            .npot_texture_tile_support(
                downlevel
                    .flags
                    .contains(wgpu::DownlevelFlags::NON_POWER_OF_TWO_MIPMAPPED_TEXTURES),
            )
            .dual_source_blending_support(features.contains(wgpu::Features::DUAL_SOURCE_BLENDING))
            .build()
    }
}
