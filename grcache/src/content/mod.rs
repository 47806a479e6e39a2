//! Keys and records for raster artifacts derived from bitmap content.

pub mod bitmap;
pub mod bitmap_cache;
pub mod mipmap;
pub mod mipmap_cache;

pub use bitmap::{Bitmap, ColorType, ImageInfo, PixelRef};
pub use mipmap::{MipLevel, MipMap, MipMapRef};
