use crate::content::bitmap::{Bitmap, ImageInfo, PixelRef};
use crate::geometry::IRect;
use crate::resource_cache::{CacheKey, CacheRecord, KeyDomain, ResourceCache, with_cache};
use std::any::Any;

/// Key of a raster artifact derived from the pixels with generation id `generation_id`.
///
/// A scale of `(0, 0)` is reserved for mip maps, so bitmap lookups reject zero scales.
pub fn bitmap_key(generation_id: u32, scale_x: f32, scale_y: f32, bounds: IRect) -> CacheKey {
    scaled_key(KeyDomain::Bitmap, generation_id, scale_x, scale_y, bounds)
}

pub(crate) fn scaled_key(
    domain: KeyDomain,
    generation_id: u32,
    scale_x: f32,
    scale_y: f32,
    bounds: IRect,
) -> CacheKey {
    let [l, t, r, b] = bounds.to_words();
    CacheKey::new(
        domain,
        &[generation_id, scale_x.to_bits(), scale_y.to_bits(), l, t, r, b],
    )
}

pub(crate) struct BitmapRecord {
    key: CacheKey,
    bitmap: Bitmap,
}

impl CacheRecord for BitmapRecord {
    fn key(&self) -> &CacheKey {
        &self.key
    }

    fn bytes_used(&self) -> usize {
        self.key.byte_len() + self.bitmap.byte_size()
    }

    fn is_immutable(&self) -> bool {
        self.bitmap.is_immutable()
    }

    fn name(&self) -> &'static str {
        "Bitmap"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn is_degenerate(scale_x: f32, scale_y: f32) -> bool {
    scale_x == 0.0 || scale_y == 0.0
}

fn visit_bitmap(record: &dyn CacheRecord) -> Option<Bitmap> {
    let record = record.as_any().downcast_ref::<BitmapRecord>()?;
    // a discardable result may have been reclaimed since it was cached
    record.bitmap.lock_pixels().then(|| record.bitmap.clone())
}

/// Finds the result of scaling `src` by the inverse scale factors.
///
/// The returned bitmap's pixels are locked; pair with [`Bitmap::unlock_pixels`].
pub fn find(
    src: &Bitmap,
    inv_scale_x: f32,
    inv_scale_y: f32,
    local: Option<&mut ResourceCache>,
) -> Option<Bitmap> {
    if is_degenerate(inv_scale_x, inv_scale_y) {
        return None;
    }

    let key = bitmap_key(
        src.generation_id(),
        inv_scale_x,
        inv_scale_y,
        src.bounds_in_pixel_ref(),
    );
    with_cache(local, |cache| cache.find(&key, visit_bitmap))
}

/// Caches `result` as `src` scaled by the inverse scale factors. `result` must be immutable.
pub fn add(
    src: &Bitmap,
    inv_scale_x: f32,
    inv_scale_y: f32,
    result: &Bitmap,
    local: Option<&mut ResourceCache>,
) -> bool {
    if is_degenerate(inv_scale_x, inv_scale_y) {
        return false;
    }

    let record = BitmapRecord {
        key: bitmap_key(
            src.generation_id(),
            inv_scale_x,
            inv_scale_y,
            src.bounds_in_pixel_ref(),
        ),
        bitmap: result.clone(),
    };
    with_cache(local, |cache| cache.add(Box::new(record)))
}

fn is_valid_subset(subset: &IRect) -> bool {
    !subset.is_empty() && subset.left >= 0 && subset.top >= 0
}

/// Finds the unscaled `subset` of the pixels with generation id `generation_id`.
pub fn find_subset(
    generation_id: u32,
    subset: IRect,
    local: Option<&mut ResourceCache>,
) -> Option<Bitmap> {
    if !is_valid_subset(&subset) {
        return None;
    }

    let key = bitmap_key(generation_id, 1.0, 1.0, subset);
    with_cache(local, |cache| cache.find(&key, visit_bitmap))
}

/// Caches `result` as the unscaled `subset` of the pixels with generation id `generation_id`.
///
/// Rejects subsets with a negative origin, an empty area, or dimensions that don't match `result`.
pub fn add_subset(
    generation_id: u32,
    subset: IRect,
    result: &Bitmap,
    local: Option<&mut ResourceCache>,
) -> bool {
    if !is_valid_subset(&subset)
        || result.width() != subset.width()
        || result.height() != subset.height()
    {
        return false;
    }

    let record = BitmapRecord {
        key: bitmap_key(generation_id, 1.0, 1.0, subset),
        bitmap: result.clone(),
    };
    with_cache(local, |cache| cache.add(Box::new(record)))
}

/// Drops every artifact derived from the pixels with generation id `generation_id`.
pub fn purge_content(generation_id: u32, local: Option<&mut ResourceCache>) -> usize {
    with_cache(local, |cache| cache.purge_content(generation_id))
}

/// Allocates pixels for a cached result, discardable when the cache has a factory.
///
/// Discardable pixels come back locked.
pub fn alloc_pixels(info: ImageInfo, local: Option<&mut ResourceCache>) -> Option<Bitmap> {
    if info.is_empty() {
        return None;
    }

    let row_bytes = info.min_row_bytes();
    let factory = with_cache(local, |cache| cache.discardable_factory().cloned());

    let pixel_ref = match factory {
        Some(factory) => {
            let memory = factory(info.byte_size(row_bytes))?;
            PixelRef::new_discardable(info, row_bytes, memory)?
        }
        None => PixelRef::new_heap(info, row_bytes),
    };
    Some(Bitmap::from_pixel_ref(pixel_ref))
}
