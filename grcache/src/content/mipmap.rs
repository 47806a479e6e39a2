use crate::content::bitmap::{Bitmap, ColorType, ImageInfo};
use crate::resource_cache::{DiscardableFactory, DiscardableMemory};
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MipLevel {
    pub info: ImageInfo,
    pub offset: usize,
    pub row_bytes: usize,
}

impl MipLevel {
    pub fn byte_size(&self) -> usize {
        self.info.byte_size(self.row_bytes)
    }
}

enum MipStorage {
    Heap(Box<[u8]>),
    Discardable(Box<dyn DiscardableMemory>),
}

#[derive(Default)]
struct AttachState {
    refs: u32,
    in_cache: bool,
    locked: bool,
}

/// A chain of successively halved copies of a source image, stored in one allocation.
///
/// Level 0 is half the source size, the source itself is not part of the chain. Discardable
/// storage stays locked while anyone besides the cache holds a [`MipMapRef`].
pub struct MipMap {
    levels: Vec<MipLevel>,
    storage: MipStorage,
    state: Mutex<AttachState>,
}

fn supports(color_type: ColorType) -> bool {
    matches!(
        color_type,
        ColorType::Alpha8 | ColorType::Rgba8888 | ColorType::Bgra8888
    )
}

fn level_infos(src: &ImageInfo) -> Vec<ImageInfo> {
    let mut levels = Vec::new();
    if src.is_empty() {
        return levels;
    }

    let (mut width, mut height) = (src.width, src.height);
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        levels.push(src.with_dimensions(width, height));
    }
    levels
}

/// 2x2 box filter per channel. Odd edges reuse the last row or column.
fn downsample(
    src: &[u8],
    src_info: &ImageInfo,
    src_row_bytes: usize,
    out: &mut [u8],
    level: &MipLevel,
) {
    let bpp = src_info.color_type.bytes_per_pixel();
    let (sw, sh) = (src_info.width as usize, src_info.height as usize);
    let at = |px: usize, py: usize, c: usize| src[py * src_row_bytes + px * bpp + c] as u32;

    for y in 0..level.info.height as usize {
        let y0 = (y * 2).min(sh - 1);
        let y1 = (y * 2 + 1).min(sh - 1);
        for x in 0..level.info.width as usize {
            let x0 = (x * 2).min(sw - 1);
            let x1 = (x * 2 + 1).min(sw - 1);
            for c in 0..bpp {
                let sum = at(x0, y0, c) + at(x1, y0, c) + at(x0, y1, c) + at(x1, y1, c);
                out[y * level.row_bytes + x * bpp + c] = ((sum + 2) / 4) as u8;
            }
        }
    }
}

impl MipMap {
    /// Builds the chain for `src`, in discardable memory when a factory is given.
    ///
    /// Returns `None` for empty sources, sources without readable pixels, unsupported color
    /// types, or sources too small to have any level.
    pub fn build(src: &Bitmap, factory: Option<&DiscardableFactory>) -> Option<MipMapRef> {
        let src_info = *src.info();
        if src_info.is_empty() || !supports(src_info.color_type) {
            return None;
        }

        let infos = level_infos(&src_info);
        if infos.is_empty() {
            return None;
        }

        let mut offset = 0;
        let levels: Vec<MipLevel> = infos
            .into_iter()
            .map(|info| {
                let level = MipLevel {
                    info,
                    offset,
                    row_bytes: info.min_row_bytes(),
                };
                offset += level.byte_size();
                level
            })
            .collect();
        let total = offset;

        let src_pixels = src.copy_pixels()?;
        let mut data = vec![0u8; total];
        for (i, level) in levels.iter().enumerate() {
            let (built, rest) = data.split_at_mut(level.offset);
            let out = &mut rest[..level.byte_size()];
            match i.checked_sub(1).map(|p| levels[p]) {
                None => downsample(&src_pixels, &src_info, src_info.min_row_bytes(), out, level),
                Some(prev) => downsample(
                    &built[prev.offset..prev.offset + prev.byte_size()],
                    &prev.info,
                    prev.row_bytes,
                    out,
                    level,
                ),
            }
        }

        let storage = match factory {
            Some(factory) => {
                let memory = factory(total)?;
                // fresh discardable memory comes back locked
                if !memory.write(&mut |dst| dst[..total].copy_from_slice(&data)) {
                    return None;
                }
                MipStorage::Discardable(memory)
            }
            None => MipStorage::Heap(data.into_boxed_slice()),
        };

        trace!(
            "Built {} mip levels for {}x{} source ({total} bytes)",
            levels.len(),
            src_info.width,
            src_info.height
        );

        let mipmap = Arc::new(MipMap {
            levels,
            storage,
            state: Mutex::new(AttachState {
                refs: 1,
                in_cache: false,
                locked: true,
            }),
        });
        Some(MipMapRef { mipmap })
    }

    pub fn count_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<MipLevel> {
        self.levels.get(index).copied()
    }

    /// Bytes held by all levels.
    pub fn size(&self) -> usize {
        self.levels.last().map_or(0, |l| l.offset + l.byte_size())
    }

    pub fn is_discardable(&self) -> bool {
        matches!(self.storage, MipStorage::Discardable(_))
    }

    pub fn is_attached_to_cache(&self) -> bool {
        self.state().in_cache
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    pub(crate) fn attach_to_cache(&self) {
        let mut state = self.state();
        debug_assert!(!state.in_cache, "mip map attached to the cache twice");
        state.in_cache = true;
        if state.refs == 0 && state.locked {
            state.locked = false;
            self.unlock_storage();
        }
    }

    pub(crate) fn detach_from_cache(&self) {
        self.state().in_cache = false;
    }

    fn state(&self) -> MutexGuard<'_, AttachState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ref_and_lock(&self) -> bool {
        let mut state = self.state();
        if !state.locked {
            let locked = match &self.storage {
                MipStorage::Heap(_) => true,
                MipStorage::Discardable(memory) => memory.lock(),
            };
            if !locked {
                return false;
            }
            state.locked = true;
        }
        state.refs += 1;
        true
    }

    fn unref(&self) {
        let mut state = self.state();
        state.refs = state.refs.saturating_sub(1);
        // only the cache is left, the memory may be reclaimed now
        if state.refs == 0 && state.in_cache && state.locked {
            state.locked = false;
            self.unlock_storage();
        }
    }

    fn unlock_storage(&self) {
        if let MipStorage::Discardable(memory) = &self.storage {
            memory.unlock();
        }
    }

    fn read_range(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        match &self.storage {
            MipStorage::Heap(data) => data.get(offset..offset + len).map(<[u8]>::to_vec),
            MipStorage::Discardable(memory) => {
                let mut out = None;
                memory.read(&mut |data| out = data.get(offset..offset + len).map(<[u8]>::to_vec));
                out
            }
        }
    }
}

impl Debug for MipMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MipMap")
            .field("levels", &self.levels.len())
            .field("size", &self.size())
            .field("discardable", &self.is_discardable())
            .finish()
    }
}

/// A counted reference that keeps the mip map's pixels locked.
#[derive(Debug)]
pub struct MipMapRef {
    mipmap: Arc<MipMap>,
}

impl MipMapRef {
    /// Refs `mipmap`, locking its storage on the first external ref.
    /// Returns `None` if the storage was reclaimed.
    pub(crate) fn acquire(mipmap: &Arc<MipMap>) -> Option<Self> {
        mipmap.ref_and_lock().then(|| MipMapRef {
            mipmap: mipmap.clone(),
        })
    }

    pub fn mipmap(&self) -> &Arc<MipMap> {
        &self.mipmap
    }

    pub fn count_levels(&self) -> usize {
        self.mipmap.count_levels()
    }

    pub fn level(&self, index: usize) -> Option<MipLevel> {
        self.mipmap.level(index)
    }

    /// Pixels of level `index`, with its own row bytes.
    pub fn level_pixels(&self, index: usize) -> Option<Vec<u8>> {
        let level = self.mipmap.level(index)?;
        self.mipmap.read_range(level.offset, level.byte_size())
    }

    pub fn is_same(&self, other: &MipMapRef) -> bool {
        Arc::ptr_eq(&self.mipmap, &other.mipmap)
    }
}

impl Clone for MipMapRef {
    fn clone(&self) -> Self {
        // a live ref keeps the storage locked, so this can't fail
        self.mipmap.ref_and_lock();
        MipMapRef {
            mipmap: self.mipmap.clone(),
        }
    }
}

impl Drop for MipMapRef {
    fn drop(&mut self) {
        self.mipmap.unref();
    }
}
