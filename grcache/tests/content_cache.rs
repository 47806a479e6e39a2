mod common;

use common::init_logging;
use grcache::content::{Bitmap, ColorType, ImageInfo, PixelRef, bitmap_cache, mipmap_cache};
use grcache::geometry::IRect;
use grcache::resource_cache::{DiscardableMemoryPool, ResourceCache};
use serial_test::serial;

fn immutable_bitmap(width: i32, height: i32) -> Bitmap {
    let bitmap = Bitmap::alloc_heap(ImageInfo::new(width, height, ColorType::Rgba8888));
    bitmap.set_immutable();
    bitmap
}

fn gradient(width: i32, height: i32) -> Bitmap {
    let info = ImageInfo::new(width, height, ColorType::Alpha8);
    let pixels = (0..width * height).map(|i| (i * 4) as u8).collect();
    Bitmap::from_pixels(info, pixels).unwrap()
}

#[test]
fn bitmap_keys_encode_every_field() {
    let bounds = IRect::from_ltrb(0, 0, 100, 100);
    let key = bitmap_cache::bitmap_key(7, 0.5, 0.5, bounds);

    assert_eq!(key, bitmap_cache::bitmap_key(7, 0.5, 0.5, bounds));
    assert_eq!(key.as_bytes(), bitmap_cache::bitmap_key(7, 0.5, 0.5, bounds).as_bytes());
    assert_eq!(key.content_id(), Some(7));
    assert_ne!(key, bitmap_cache::bitmap_key(8, 0.5, 0.5, bounds));
    assert_ne!(key, bitmap_cache::bitmap_key(7, 0.25, 0.5, bounds));
    assert_ne!(key, bitmap_cache::bitmap_key(7, 0.5, 0.5, IRect::from_ltrb(0, 0, 100, 99)));
}

#[test]
fn scaled_result_hits_only_at_its_scale() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let src = immutable_bitmap(100, 100);
    let half = immutable_bitmap(50, 50);
    assert_eq!(src.bounds_in_pixel_ref(), IRect::from_ltrb(0, 0, 100, 100));

    assert!(bitmap_cache::add(&src, 0.5, 0.5, &half, Some(&mut cache)));

    let found = bitmap_cache::find(&src, 0.5, 0.5, Some(&mut cache));
    assert_eq!(
        found.as_ref().map(Bitmap::generation_id),
        Some(half.generation_id())
    );
    assert!(bitmap_cache::find(&src, 0.25, 0.25, Some(&mut cache)).is_none());
    assert!(bitmap_cache::find(&src, 0.5, 0.25, Some(&mut cache)).is_none());

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[test]
fn zero_scales_are_rejected() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let src = immutable_bitmap(8, 8);
    let result = immutable_bitmap(1, 1);

    assert!(!bitmap_cache::add(&src, 0.0, 0.5, &result, Some(&mut cache)));
    assert!(!bitmap_cache::add(&src, 0.5, 0.0, &result, Some(&mut cache)));
    assert!(bitmap_cache::find(&src, 0.0, 0.0, Some(&mut cache)).is_none());
    assert_eq!(cache.count(), 0);
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "Refusing to cache mutable"))]
fn mutable_results_are_never_cached() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let src = immutable_bitmap(8, 8);
    let result = Bitmap::alloc_heap(ImageInfo::new(4, 4, ColorType::Rgba8888));

    assert!(!bitmap_cache::add(&src, 0.5, 0.5, &result, Some(&mut cache)));
    assert!(bitmap_cache::find(&src, 0.5, 0.5, Some(&mut cache)).is_none());
    assert_eq!(cache.count(), 0);
}

#[test]
fn subsets_of_different_views_are_separate() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let src = immutable_bitmap(16, 16);
    let view = src.extract_subset(IRect::from_xywh(4, 4, 8, 8)).unwrap();

    let small = immutable_bitmap(8, 8);
    assert!(bitmap_cache::add(&view, 0.5, 0.5, &small, Some(&mut cache)));

    // same pixels, different bounds
    assert!(bitmap_cache::find(&src, 0.5, 0.5, Some(&mut cache)).is_none());
    assert!(bitmap_cache::find(&view, 0.5, 0.5, Some(&mut cache)).is_some());
}

#[test]
fn subset_entries_validate_their_rect() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let id = immutable_bitmap(32, 32).generation_id();
    let piece = immutable_bitmap(4, 4);

    assert!(!bitmap_cache::add_subset(id, IRect::from_xywh(-1, 0, 4, 4), &piece, Some(&mut cache)));
    assert!(!bitmap_cache::add_subset(id, IRect::from_xywh(0, 0, 0, 4), &piece, Some(&mut cache)));
    assert!(!bitmap_cache::add_subset(id, IRect::from_xywh(0, 0, 4, 5), &piece, Some(&mut cache)));
    let negative = IRect::from_xywh(-1, 0, 4, 4);
    assert!(bitmap_cache::find_subset(id, negative, Some(&mut cache)).is_none());

    let subset = IRect::from_xywh(8, 4, 4, 4);
    assert!(bitmap_cache::add_subset(id, subset, &piece, Some(&mut cache)));
    assert!(bitmap_cache::find_subset(id, subset, Some(&mut cache)).is_some());
    let shorter = IRect::from_xywh(8, 4, 4, 3);
    assert!(bitmap_cache::find_subset(id, shorter, Some(&mut cache)).is_none());
}

#[test]
fn purging_content_drops_all_derived_entries() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let src = immutable_bitmap(8, 8);
    let other = immutable_bitmap(8, 8);

    bitmap_cache::add(&src, 0.5, 0.5, &immutable_bitmap(4, 4), Some(&mut cache));
    bitmap_cache::add(&src, 0.25, 0.25, &immutable_bitmap(2, 2), Some(&mut cache));
    bitmap_cache::add(&other, 0.5, 0.5, &immutable_bitmap(4, 4), Some(&mut cache));

    assert_eq!(bitmap_cache::purge_content(src.generation_id(), Some(&mut cache)), 2);
    assert!(bitmap_cache::find(&src, 0.5, 0.5, Some(&mut cache)).is_none());
    assert!(bitmap_cache::find(&other, 0.5, 0.5, Some(&mut cache)).is_some());
}

#[test]
fn changed_pixels_miss_old_entries() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let src = Bitmap::alloc_heap(ImageInfo::new(8, 8, ColorType::Rgba8888));
    let before = src.generation_id();

    bitmap_cache::add(&src, 0.5, 0.5, &immutable_bitmap(4, 4), Some(&mut cache));
    let written = src.pixel_ref().is_some_and(|p| p.write(|data| data.fill(0xff)));
    assert!(written);

    assert_ne!(src.generation_id(), before);
    assert!(bitmap_cache::find(&src, 0.5, 0.5, Some(&mut cache)).is_none());
}

#[test]
fn mipmaps_are_shared_through_the_cache() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);
    let src = gradient(4, 4);

    assert!(mipmap_cache::find_and_ref(&src, Some(&mut cache)).is_none());

    let built = mipmap_cache::add_and_ref(&src, Some(&mut cache)).unwrap();
    assert_eq!(built.count_levels(), 2);
    assert!(built.mipmap().is_attached_to_cache());

    let found = mipmap_cache::find_and_ref(&src, Some(&mut cache));
    assert!(found.as_ref().is_some_and(|f| f.is_same(&built)));
    // 4x4 box filtered down to 1x1 is the mean of the gradient
    assert_eq!(built.level_pixels(1), Some(vec![30]));

    drop(found);
    drop(built);
    cache.purge_all();
    assert_eq!(cache.count(), 0);
}

#[test]
fn empty_sources_have_no_mipmaps() {
    init_logging();
    let mut cache = ResourceCache::new(1 << 20);

    for (width, height) in [(0, 4), (4, 0), (0, 0)] {
        let src = immutable_bitmap(width, height);
        assert!(mipmap_cache::add_and_ref(&src, Some(&mut cache)).is_none());
        assert!(mipmap_cache::find_and_ref(&src, Some(&mut cache)).is_none());
    }
    assert_eq!(cache.count(), 0);
}

#[test]
fn short_pixel_buffers_are_rejected() {
    let info = ImageInfo::new(4, 4, ColorType::Rgba8888);

    assert!(Bitmap::from_pixels(info, vec![0; 63]).is_none());
    assert!(PixelRef::from_pixels(info, 16, vec![0; 64]).is_some());
    assert!(PixelRef::from_pixels(info, 32, vec![0; 64]).is_none());
    assert!(PixelRef::from_pixels(info, 8, vec![0; 64]).is_none());

    let bitmap = Bitmap::from_pixels(info, (0..64).collect()).unwrap();
    assert_eq!(bitmap.copy_pixels().map(|p| p.len()), Some(64));
}

#[test]
fn reclaimed_mipmaps_are_dropped_on_lookup() {
    init_logging();
    let pool = DiscardableMemoryPool::new(0);
    let mut cache = ResourceCache::with_discardable_factory(pool.factory());
    let src = gradient(8, 8);

    let built = mipmap_cache::add_and_ref(&src, Some(&mut cache));
    assert!(built.as_ref().is_some_and(|m| m.mipmap().is_discardable()));
    assert!(built.as_ref().is_some_and(|m| m.mipmap().is_locked()));
    assert_eq!(pool.resident_bytes(), 16 + 4 + 1);

    // the last external ref unlocks the storage, the empty pool budget reclaims it
    drop(built);
    assert_eq!(pool.resident_bytes(), 0);

    assert!(mipmap_cache::find_and_ref(&src, Some(&mut cache)).is_none());
    assert_eq!(cache.count(), 0);
}

#[test]
fn result_pixels_follow_the_cache_mode() {
    init_logging();
    let info = ImageInfo::new(4, 4, ColorType::Rgba8888);

    let mut heap = ResourceCache::new(1 << 20);
    let bitmap = bitmap_cache::alloc_pixels(info, Some(&mut heap));
    assert!(bitmap.as_ref().and_then(Bitmap::pixel_ref).is_some_and(|p| !p.is_discardable()));

    let pool = DiscardableMemoryPool::new(1 << 20);
    let mut discardable = ResourceCache::with_discardable_factory(pool.factory());
    let bitmap = bitmap_cache::alloc_pixels(info, Some(&mut discardable));
    assert!(bitmap.as_ref().and_then(Bitmap::pixel_ref).is_some_and(|p| p.is_discardable()));
    assert_eq!(pool.resident_bytes(), 64);

    let empty = ImageInfo::new(0, 4, ColorType::Rgba8888);
    assert!(bitmap_cache::alloc_pixels(empty, Some(&mut heap)).is_none());
}

#[test]
#[serial]
fn global_cache_serves_requests_without_local() {
    init_logging();
    let src = immutable_bitmap(8, 8);
    let half = immutable_bitmap(4, 4);

    assert!(bitmap_cache::add(&src, 0.5, 0.5, &half, None));
    assert!(bitmap_cache::find(&src, 0.5, 0.5, None).is_some());
    assert_eq!(bitmap_cache::purge_content(src.generation_id(), None), 1);
    assert!(bitmap_cache::find(&src, 0.5, 0.5, None).is_none());
}
