use crate::geometry::IRect;
use crate::resource_cache::DiscardableMemory;
use grcache_utils::debug_panic;
use log::warn;
use nalgebra::Point2;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum ColorType {
    Alpha8 = 1,
    Rgb565 = 2,
    Rgba8888 = 3,
    Bgra8888 = 4,
}

impl ColorType {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Alpha8 => 1,
            ColorType::Rgb565 => 2,
            ColorType::Rgba8888 | ColorType::Bgra8888 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ImageInfo {
    pub width: i32,
    pub height: i32,
    pub color_type: ColorType,
}

impl ImageInfo {
    pub const fn new(width: i32, height: i32, color_type: ColorType) -> Self {
        ImageInfo {
            width,
            height,
            color_type,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub const fn min_row_bytes(&self) -> usize {
        if self.width <= 0 {
            return 0;
        }
        self.width as usize * self.color_type.bytes_per_pixel()
    }

    pub const fn byte_size(&self, row_bytes: usize) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.height as usize - 1) * row_bytes + self.min_row_bytes()
    }

    pub const fn bounds(&self) -> IRect {
        IRect::from_wh(self.width, self.height)
    }

    pub const fn with_dimensions(&self, width: i32, height: i32) -> Self {
        ImageInfo::new(width, height, self.color_type)
    }
}

static NEXT_GENERATION_ID: AtomicU32 = AtomicU32::new(1);

/// Hands out generation ids. Zero is never returned and means "not assigned yet".
pub fn next_generation_id() -> u32 {
    loop {
        let id = NEXT_GENERATION_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

enum PixelStorage {
    Heap(RwLock<Box<[u8]>>),
    Discardable(Box<dyn DiscardableMemory>),
}

fn fits(info: &ImageInfo, row_bytes: usize, len: usize) -> bool {
    info.is_empty() || (row_bytes >= info.min_row_bytes() && len >= info.byte_size(row_bytes))
}

/// Shared pixel memory, identified by a generation id that changes whenever the pixels do.
pub struct PixelRef {
    info: ImageInfo,
    row_bytes: usize,
    storage: PixelStorage,
    generation_id: AtomicU32,
    immutable: AtomicBool,
}

impl PixelRef {
    pub fn new_heap(info: ImageInfo, row_bytes: usize) -> Arc<Self> {
        let pixels = vec![0; info.byte_size(row_bytes)];
        Self::with_storage(info, row_bytes, PixelStorage::Heap(RwLock::new(pixels.into())))
    }

    /// Wraps `pixels`, `None` if they cannot hold `info` at `row_bytes`.
    pub fn from_pixels(info: ImageInfo, row_bytes: usize, pixels: Vec<u8>) -> Option<Arc<Self>> {
        if !fits(&info, row_bytes, pixels.len()) {
            warn!(
                "{} bytes of pixels cannot hold {info:?} at {row_bytes} bytes per row",
                pixels.len()
            );
            return None;
        }
        let storage = PixelStorage::Heap(RwLock::new(pixels.into_boxed_slice()));
        Some(Self::with_storage(info, row_bytes, storage))
    }

    /// Wraps discardable memory. The memory's lock state is left to the caller.
    ///
    /// `None` if the memory cannot hold `info` at `row_bytes`.
    pub fn new_discardable(
        info: ImageInfo,
        row_bytes: usize,
        memory: Box<dyn DiscardableMemory>,
    ) -> Option<Arc<Self>> {
        if !fits(&info, row_bytes, memory.len()) {
            warn!(
                "{} bytes of discardable memory cannot hold {info:?}",
                memory.len()
            );
            return None;
        }
        let storage = PixelStorage::Discardable(memory);
        Some(Self::with_storage(info, row_bytes, storage))
    }

    fn with_storage(info: ImageInfo, row_bytes: usize, storage: PixelStorage) -> Arc<Self> {
        Arc::new(PixelRef {
            info,
            row_bytes,
            storage,
            generation_id: AtomicU32::new(0),
            immutable: AtomicBool::new(false),
        })
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn is_discardable(&self) -> bool {
        matches!(self.storage, PixelStorage::Discardable(_))
    }

    pub fn generation_id(&self) -> u32 {
        let id = self.generation_id.load(Ordering::Acquire);
        if id != 0 {
            return id;
        }

        let fresh = next_generation_id();
        match self
            .generation_id
            .compare_exchange(0, fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => fresh,
            Err(raced) => raced,
        }
    }

    /// Marks the pixels as changed, invalidating everything derived from the old generation.
    pub fn notify_pixels_changed(&self) {
        if self.is_immutable() {
            debug_panic!("Pixels of an immutable pixel ref changed");
            return;
        }
        self.generation_id.store(0, Ordering::Release);
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable.load(Ordering::Acquire)
    }

    pub fn set_immutable(&self) {
        self.immutable.store(true, Ordering::Release);
    }

    pub fn lock_pixels(&self) -> bool {
        match &self.storage {
            PixelStorage::Heap(_) => true,
            PixelStorage::Discardable(memory) => memory.lock(),
        }
    }

    pub fn unlock_pixels(&self) {
        if let PixelStorage::Discardable(memory) = &self.storage {
            memory.unlock();
        }
    }

    /// Runs `f` on the raw pixel memory. Discardable memory must be locked.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        match &self.storage {
            PixelStorage::Heap(pixels) => {
                let pixels = pixels.read().unwrap_or_else(PoisonError::into_inner);
                Some(f(&pixels))
            }
            PixelStorage::Discardable(memory) => {
                let mut f = Some(f);
                let mut out = None;
                memory.read(&mut |data| out = f.take().map(|f| f(data)));
                out
            }
        }
    }

    /// Runs `f` on the raw pixel memory and bumps the generation id.
    /// Immutable pixel refs refuse writes.
    pub fn write(&self, f: impl FnOnce(&mut [u8])) -> bool {
        if self.is_immutable() {
            return false;
        }

        let written = match &self.storage {
            PixelStorage::Heap(pixels) => {
                let mut pixels = pixels.write().unwrap_or_else(PoisonError::into_inner);
                f(&mut pixels);
                true
            }
            PixelStorage::Discardable(memory) => {
                let mut f = Some(f);
                memory.write(&mut |data| {
                    if let Some(f) = f.take() {
                        f(data)
                    }
                })
            }
        };

        if written {
            self.notify_pixels_changed();
        }
        written
    }
}

impl Debug for PixelRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelRef")
            .field("info", &self.info)
            .field("row_bytes", &self.row_bytes)
            .field("discardable", &self.is_discardable())
            .field("immutable", &self.is_immutable())
            .finish()
    }
}

/// A view of (part of) a [`PixelRef`].
#[derive(Debug, Clone)]
pub struct Bitmap {
    info: ImageInfo,
    pixel_ref: Option<Arc<PixelRef>>,
    origin: Point2<i32>,
}

impl Bitmap {
    /// A bitmap without pixels.
    pub fn new(info: ImageInfo) -> Self {
        Bitmap {
            info,
            pixel_ref: None,
            origin: Point2::origin(),
        }
    }

    pub fn alloc_heap(info: ImageInfo) -> Self {
        Self::from_pixel_ref(PixelRef::new_heap(info, info.min_row_bytes()))
    }

    pub fn from_pixel_ref(pixel_ref: Arc<PixelRef>) -> Self {
        Bitmap {
            info: *pixel_ref.info(),
            pixel_ref: Some(pixel_ref),
            origin: Point2::origin(),
        }
    }

    /// Tightly packed pixels in row order, moved into a new heap bitmap.
    ///
    /// `None` if there are fewer pixels than `info` covers.
    pub fn from_pixels(info: ImageInfo, pixels: Vec<u8>) -> Option<Self> {
        let pixel_ref = PixelRef::from_pixels(info, info.min_row_bytes(), pixels)?;
        Some(Self::from_pixel_ref(pixel_ref))
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn width(&self) -> i32 {
        self.info.width
    }

    pub fn height(&self) -> i32 {
        self.info.height
    }

    pub fn pixel_ref(&self) -> Option<&Arc<PixelRef>> {
        self.pixel_ref.as_ref()
    }

    pub fn pixel_ref_origin(&self) -> Point2<i32> {
        self.origin
    }

    /// Generation id of the pixels, 0 when there are none.
    pub fn generation_id(&self) -> u32 {
        self.pixel_ref.as_ref().map_or(0, |p| p.generation_id())
    }

    /// Bounds of this bitmap within its pixel ref. Empty without a pixel ref.
    pub fn bounds_in_pixel_ref(&self) -> IRect {
        match self.pixel_ref {
            Some(_) => IRect::from_xywh(self.origin.x, self.origin.y, self.width(), self.height()),
            None => IRect::EMPTY,
        }
    }

    pub fn is_immutable(&self) -> bool {
        self.pixel_ref.as_ref().is_some_and(|p| p.is_immutable())
    }

    pub fn set_immutable(&self) {
        if let Some(p) = &self.pixel_ref {
            p.set_immutable();
        }
    }

    /// Bytes needed to hold the pixels this bitmap views.
    pub fn byte_size(&self) -> usize {
        self.pixel_ref
            .as_ref()
            .map_or(0, |p| self.info.byte_size(p.row_bytes()))
    }

    pub fn lock_pixels(&self) -> bool {
        self.pixel_ref.as_ref().is_some_and(|p| p.lock_pixels())
    }

    pub fn unlock_pixels(&self) {
        if let Some(p) = &self.pixel_ref {
            p.unlock_pixels();
        }
    }

    /// Shares the pixel ref, viewing only `subset` of this bitmap.
    pub fn extract_subset(&self, subset: IRect) -> Option<Bitmap> {
        if !self.info.bounds().contains(&subset) {
            return None;
        }

        Some(Bitmap {
            info: self.info.with_dimensions(subset.width(), subset.height()),
            pixel_ref: self.pixel_ref.clone(),
            origin: self.origin + nalgebra::Vector2::new(subset.left, subset.top),
        })
    }

    /// The viewed pixels, tightly packed. `None` without pixels or when they were reclaimed.
    pub fn copy_pixels(&self) -> Option<Vec<u8>> {
        let pixel_ref = self.pixel_ref.as_ref()?;
        let bpp = self.info.color_type.bytes_per_pixel();
        let row_bytes = pixel_ref.row_bytes();
        let row_len = self.info.min_row_bytes();
        let (x, y) = (self.origin.x as usize, self.origin.y as usize);

        pixel_ref
            .read(|data| {
                let mut out = Vec::with_capacity(row_len * self.height().max(0) as usize);
                for row in 0..self.height().max(0) as usize {
                    let start = (y + row) * row_bytes + x * bpp;
                    out.extend_from_slice(data.get(start..start + row_len)?);
                }
                Some(out)
            })
            .flatten()
    }
}
