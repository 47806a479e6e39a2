use crate::content::ColorType;
use bitflags::bitflags;
use bon::Builder;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use wgpu::{AstcBlock, AstcChannel, TextureFormat};

#[repr(u16)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum PixelConfig {
    #[default]
    Unknown = 0,
    Alpha8 = 1,
    Rgba8888 = 2,
    Bgra8888 = 3,
    Srgba8888 = 4,
    RgbaHalf = 5,
    RgbaFloat = 6,
    Etc2Rgb8 = 7,
    Bc1Rgba = 8,
    Astc4x4 = 9,
}

impl PixelConfig {
    pub fn format(self) -> Option<TextureFormat> {
        Some(match self {
            PixelConfig::Unknown => return None,
            PixelConfig::Alpha8 => TextureFormat::R8Unorm,
            PixelConfig::Rgba8888 => TextureFormat::Rgba8Unorm,
            PixelConfig::Bgra8888 => TextureFormat::Bgra8Unorm,
            PixelConfig::Srgba8888 => TextureFormat::Rgba8UnormSrgb,
            PixelConfig::RgbaHalf => TextureFormat::Rgba16Float,
            PixelConfig::RgbaFloat => TextureFormat::Rgba32Float,
            PixelConfig::Etc2Rgb8 => TextureFormat::Etc2Rgb8Unorm,
            PixelConfig::Bc1Rgba => TextureFormat::Bc1RgbaUnorm,
            PixelConfig::Astc4x4 => TextureFormat::Astc {
                block: AstcBlock::B4x4,
                channel: AstcChannel::Unorm,
            },
        })
    }

    pub fn is_compressed(self) -> bool {
        self.format().is_some_and(|f| f.is_compressed())
    }

    /// Bytes per pixel of uncompressed configs, 0 for compressed or unknown ones.
    pub fn bytes_per_pixel(self) -> usize {
        match self.format() {
            Some(f) if !f.is_compressed() => f.block_copy_size(None).unwrap_or(0) as usize,
            _ => 0,
        }
    }

    /// Bytes needed for one `width` x `height` image, compressed formats rounded up to whole
    /// blocks.
    pub fn data_size(self, width: u32, height: u32) -> usize {
        let Some(format) = self.format() else {
            return 0;
        };
        let (block_w, block_h) = format.block_dimensions();
        let block_bytes = format.block_copy_size(None).unwrap_or(0) as usize;
        width.div_ceil(block_w) as usize * height.div_ceil(block_h) as usize * block_bytes
    }

    pub fn is_alpha_only(self) -> bool {
        matches!(self, PixelConfig::Alpha8)
    }

    pub fn color_type(self) -> Option<ColorType> {
        match self {
            PixelConfig::Alpha8 => Some(ColorType::Alpha8),
            PixelConfig::Rgba8888 | PixelConfig::Srgba8888 => Some(ColorType::Rgba8888),
            PixelConfig::Bgra8888 => Some(ColorType::Bgra8888),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct TextureFlags: u32 {
        const RENDER_TARGET = 0x1;
        /// The render target never gets a stencil buffer.
        const NO_STENCIL = 0x2;
    }
}

#[repr(u32)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum SurfaceOrigin {
    #[default]
    Default = 0,
    TopLeft = 1,
    BottomLeft = 2,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Builder)]
pub struct TextureDesc {
    #[builder(default)]
    pub flags: TextureFlags,
    #[builder(default)]
    pub origin: SurfaceOrigin,
    pub width: u32,
    pub height: u32,
    pub config: PixelConfig,
    /// 0 for single sampled surfaces.
    #[builder(default = 0)]
    pub sample_count: u32,
}

impl TextureDesc {
    pub fn is_render_target(&self) -> bool {
        self.flags.contains(TextureFlags::RENDER_TARGET)
    }

    /// `Default` resolves to bottom-left for render targets and top-left otherwise.
    pub fn resolved_origin(&self) -> SurfaceOrigin {
        match self.origin {
            SurfaceOrigin::Default if self.is_render_target() => SurfaceOrigin::BottomLeft,
            SurfaceOrigin::Default => SurfaceOrigin::TopLeft,
            origin => origin,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TileMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FilterMode {
    #[default]
    None,
    Bilerp,
    MipMap,
}

/// How a texture is going to be sampled.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureParams {
    pub tile_x: TileMode,
    pub tile_y: TileMode,
    pub filter: FilterMode,
}

impl TextureParams {
    pub fn is_tiled(&self) -> bool {
        self.tile_x != TileMode::Clamp || self.tile_y != TileMode::Clamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_sizes_round_up_to_blocks() {
        assert_eq!(PixelConfig::Rgba8888.data_size(3, 3), 36);
        assert_eq!(PixelConfig::Alpha8.data_size(3, 3), 9);
        // 4x4 blocks of 8 bytes
        assert_eq!(PixelConfig::Etc2Rgb8.data_size(5, 4), 16);
        assert!(PixelConfig::Bc1Rgba.is_compressed());
        assert_eq!(PixelConfig::Bc1Rgba.bytes_per_pixel(), 0);
        assert_eq!(PixelConfig::Unknown.data_size(8, 8), 0);
    }

    #[test]
    fn default_origin_depends_on_render_target() {
        let rt = TextureDesc::builder()
            .flags(TextureFlags::RENDER_TARGET)
            .width(4)
            .height(4)
            .config(PixelConfig::Rgba8888)
            .build();
        let plain = TextureDesc { flags: TextureFlags::empty(), ..rt };
        let explicit = TextureDesc { origin: SurfaceOrigin::TopLeft, ..rt };

        assert_eq!(rt.resolved_origin(), SurfaceOrigin::BottomLeft);
        assert_eq!(plain.resolved_origin(), SurfaceOrigin::TopLeft);
        assert_eq!(explicit.resolved_origin(), SurfaceOrigin::TopLeft);
    }
}
