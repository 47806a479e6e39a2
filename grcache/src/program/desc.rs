use crate::caps::Caps;
use crate::program::draw_state::{
    BlendCoeffs, DrawState, DrawType, DstCopy, PrimaryOutputType, SecondaryOutputType,
    VertexLayout,
};
use crate::program::key::{ProcessorKey, ProcessorKeyBuilder};
use crate::program::processor::{Processor, UnsupportedError};
use crate::texture::SurfaceOrigin;
use bytemuck::{Pod, Zeroable};
use grcache_utils::{WORD_SIZE, is_align4};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use static_assertions::const_assert_eq;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::xxh3_64;

pub const MAX_COORD_TRANSFORMS: usize = 16;
pub const MAX_TEXTURE_ACCESSES: usize = 32;

const LENGTH_WORD: usize = 0;
const CHECKSUM_WORD: usize = 1;
const HEADER_WORD: usize = 2;
const HEADER_WORDS: usize = size_of::<KeyHeader>() / WORD_SIZE;
const OFFSETS_WORD: usize = HEADER_WORD + HEADER_WORDS;

pub const DST_READ_KEY: u8 = 0x1;
pub const DST_READ_ALPHA_CONFIG: u8 = 0x2;
pub const DST_READ_TOP_LEFT: u8 = 0x4;

pub const FRAG_POS_TOP_LEFT: u8 = 0x1;
pub const FRAG_POS_BOTTOM_LEFT: u8 = 0x2;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum DescBuildError {
    #[snafu(display("Effect {name} can't produce a program key: {source}"))]
    UnsupportedEffect {
        name: &'static str,
        source: UnsupportedError,
    },

    #[snafu(display("The draw reads the destination color but no destination copy was supplied"))]
    MissingDstCopy,

    #[snafu(display("The blend needs dual source blending, which the device doesn't support"))]
    DualSourceBlendingUnsupported,

    #[snafu(display("{draw_type:?} needs path rendering, which the device doesn't support"))]
    PathRenderingUnsupported { draw_type: DrawType },

    #[snafu(display("Effect {name} uses {count} coord transforms, at most {MAX_COORD_TRANSFORMS} fit"))]
    TooManyCoordTransforms { name: &'static str, count: usize },

    #[snafu(display("Effect {name} samples {count} textures, at most {MAX_TEXTURE_ACCESSES} fit"))]
    TooManyTextures { name: &'static str, count: usize },

    #[snafu(display("A chain of {count} effects doesn't fit in the key header"))]
    TooManyEffects { count: usize },

    #[snafu(display("Program key of {len} bytes can't be addressed with 16 bit offsets"))]
    KeyTooLarge { len: usize },
}

/// Where the initial color or coverage of the fragment chain comes from.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum InputType {
    AllOnes = 0,
    AllZeros = 1,
    Attribute = 2,
    Uniform = 3,
}

/// Fixed-layout header of a program key.
#[repr(C)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct KeyHeader {
    pub dst_read_key: u8,
    pub frag_pos_key: u8,
    pub use_frag_shader_only: u8,
    pub emits_point_size: u8,
    pub color_input: u8,
    pub coverage_input: u8,
    pub primary_output: u8,
    pub secondary_output: u8,
    /// -1 when the input isn't bound to an attribute.
    pub position_attribute_index: i8,
    pub local_coord_attribute_index: i8,
    pub color_attribute_index: i8,
    pub coverage_attribute_index: i8,
    pub has_geometry_processor: u8,
    pub color_effect_count: u8,
    pub coverage_effect_count: u8,
    _pad: u8,
}

const_assert_eq!(size_of::<KeyHeader>(), 16);
const_assert_eq!(size_of::<KeyHeader>() % WORD_SIZE, 0);

impl KeyHeader {
    pub fn color_input(&self) -> InputType {
        InputType::try_from(self.color_input).unwrap_or(InputType::Uniform)
    }

    pub fn coverage_input(&self) -> InputType {
        InputType::try_from(self.coverage_input).unwrap_or(InputType::Uniform)
    }

    pub fn primary_output(&self) -> PrimaryOutputType {
        match self.primary_output {
            1 => PrimaryOutputType::CombineWithDst,
            _ => PrimaryOutputType::Modulate,
        }
    }

    pub fn secondary_output(&self) -> SecondaryOutputType {
        match self.secondary_output {
            1 => SecondaryOutputType::Coverage,
            2 => SecondaryOutputType::CoverageIsa,
            3 => SecondaryOutputType::CoverageIsc,
            _ => SecondaryOutputType::None,
        }
    }

    pub fn reads_dst(&self) -> bool {
        self.dst_read_key & DST_READ_KEY != 0
    }

    pub fn reads_frag_position(&self) -> bool {
        self.frag_pos_key != 0
    }

    pub fn frag_shader_only(&self) -> bool {
        self.use_frag_shader_only != 0
    }

    pub fn emits_point_size(&self) -> bool {
        self.emits_point_size != 0
    }

    pub fn has_geometry_processor(&self) -> bool {
        self.has_geometry_processor != 0
    }

    pub fn attribute_index(index: i8) -> Option<u32> {
        u32::try_from(index).ok()
    }
}

impl Debug for KeyHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHeader")
            .field("dst_read_key", &self.dst_read_key)
            .field("frag_pos_key", &self.frag_pos_key)
            .field("frag_shader_only", &self.frag_shader_only())
            .field("emits_point_size", &self.emits_point_size())
            .field("color_input", &self.color_input())
            .field("coverage_input", &self.coverage_input())
            .field("primary_output", &self.primary_output())
            .field("secondary_output", &self.secondary_output())
            .field("has_geometry_processor", &self.has_geometry_processor())
            .field("color_effect_count", &self.color_effect_count)
            .field("coverage_effect_count", &self.coverage_effect_count)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StageKind {
    Geometry,
    Color,
    Coverage,
}

/// The binary key identifying a generated program.
///
/// Layout in words: `[length][checksum][header; 4][offset | length << 16; n][stage keys...]`.
/// Offsets and lengths are in bytes from the start of the key.
#[derive(Clone)]
pub struct ProgramDesc {
    words: Vec<u32>,
}

impl ProgramDesc {
    pub fn build(
        state: &DrawState,
        draw_type: DrawType,
        blend: BlendCoeffs,
        caps: &Caps,
        dst_copy: Option<&DstCopy<'_>>,
    ) -> Result<ProgramDesc, DescBuildError> {
        let stages = stage_processors(state);

        let needs_dual_source = blend.is_dual_source()
            || state.secondary_output != SecondaryOutputType::None;
        ensure!(
            !needs_dual_source || caps.dual_source_blending_support,
            DualSourceBlendingUnsupportedErr
        );
        ensure!(
            !draw_type.is_path_rendering() || caps.path_rendering_support,
            PathRenderingUnsupportedErr { draw_type }
        );

        let mut header = KeyHeader::zeroed();

        let reads_dst = state.primary_output == PrimaryOutputType::CombineWithDst
            || stages.iter().any(|p| p.will_read_dst_color());
        if reads_dst {
            let copy = dst_copy.context(MissingDstCopyErr)?;
            let desc = copy.texture.desc();
            header.dst_read_key = DST_READ_KEY;
            if desc.config.is_alpha_only() {
                header.dst_read_key |= DST_READ_ALPHA_CONFIG;
            }
            if desc.resolved_origin() == SurfaceOrigin::TopLeft {
                header.dst_read_key |= DST_READ_TOP_LEFT;
            }
        }

        if stages.iter().any(|p| p.will_read_fragment_position()) {
            header.frag_pos_key = match state.render_target.origin {
                SurfaceOrigin::BottomLeft => FRAG_POS_BOTTOM_LEFT,
                _ => FRAG_POS_TOP_LEFT,
            };
        }

        header.use_frag_shader_only = draw_type.is_path_rendering() as u8;
        header.emits_point_size = draw_type.is_points() as u8;

        // Fragment-only programs have no vertex inputs besides what path rendering generates.
        let layout = if draw_type.is_path_rendering() {
            VertexLayout::POSITION_ONLY
        } else {
            state.vertex_layout
        };
        header.color_input = select_input(
            layout.color,
            state.color_is_opaque_white(),
            state.color == [0.0; 4],
        )
        .into();
        header.coverage_input = select_input(
            layout.coverage,
            state.has_full_coverage(),
            state.coverage == 0.0,
        )
        .into();
        header.primary_output = state.primary_output as u8;
        header.secondary_output = state.secondary_output as u8;

        header.position_attribute_index = attribute_slot(Some(layout.position));
        header.local_coord_attribute_index = attribute_slot(layout.local_coords);
        header.color_attribute_index = attribute_slot(layout.color);
        header.coverage_attribute_index = attribute_slot(layout.coverage);

        header.has_geometry_processor = state.geometry.is_some() as u8;
        header.color_effect_count = effect_count(state.color_stages.len())?;
        header.coverage_effect_count = effect_count(state.coverage_stages.len())?;

        let stage_keys = stages
            .iter()
            .map(|p| stage_key(*p, caps))
            .collect::<Result<Vec<_>, _>>()?;

        let mut words = vec![0u32; OFFSETS_WORD + stage_keys.len()];
        bytemuck::cast_slice_mut::<u32, u8>(&mut words[HEADER_WORD..OFFSETS_WORD])
            .copy_from_slice(bytemuck::bytes_of(&header));

        for (i, key) in stage_keys.iter().enumerate() {
            let offset = words.len() * WORD_SIZE;
            let len = key.byte_len();
            let offset16 = u16::try_from(offset).ok();
            let len16 = u16::try_from(len).ok();
            let (Some(offset16), Some(len16)) = (offset16, len16) else {
                return KeyTooLargeErr { len: offset + len }.fail();
            };
            words[OFFSETS_WORD + i] = offset16 as u32 | (len16 as u32) << 16;
            words.extend_from_slice(key.words());
        }

        let len = words.len() * WORD_SIZE;
        ensure!(len <= u16::MAX as usize, KeyTooLargeErr { len });
        words[LENGTH_WORD] = len as u32;
        words[CHECKSUM_WORD] = checksum(&words);

        Ok(ProgramDesc { words })
    }

    pub fn header(&self) -> &KeyHeader {
        bytemuck::from_bytes(bytemuck::cast_slice::<u32, u8>(
            &self.words[HEADER_WORD..OFFSETS_WORD],
        ))
    }

    pub fn key_length(&self) -> usize {
        self.words[LENGTH_WORD] as usize
    }

    pub fn checksum(&self) -> u32 {
        self.words[CHECKSUM_WORD]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u32, u8>(&self.words)[..self.key_length()]
    }

    pub fn stage_count(&self) -> usize {
        let h = self.header();
        h.has_geometry_processor as usize
            + h.color_effect_count as usize
            + h.coverage_effect_count as usize
    }

    pub fn key_provider(&self, kind: StageKind) -> EffectKeyProvider<'_> {
        let h = self.header();
        let gp = h.has_geometry_processor as usize;
        let colors = h.color_effect_count as usize;
        let (base, count) = match kind {
            StageKind::Geometry => (0, gp),
            StageKind::Color => (gp, colors),
            StageKind::Coverage => (gp + colors, h.coverage_effect_count as usize),
        };
        EffectKeyProvider {
            desc: self,
            base,
            count,
        }
    }

    fn stage_key(&self, index: usize) -> ProcessorKey<'_> {
        let entry = self.words[OFFSETS_WORD + index];
        let (offset, len) = ((entry & 0xffff) as usize, (entry >> 16) as usize);
        debug_assert!(is_align4(offset) && is_align4(len), "misaligned stage key entry");
        let (offset, len) = (offset / WORD_SIZE, len / WORD_SIZE);
        ProcessorKey::new(&self.words[offset..offset + len])
    }
}

/// Indexed access to the stage keys of one chain.
#[derive(Debug, Copy, Clone)]
pub struct EffectKeyProvider<'a> {
    desc: &'a ProgramDesc,
    base: usize,
    count: usize,
}

impl<'a> EffectKeyProvider<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> ProcessorKey<'a> {
        debug_assert!(index < self.count);
        self.desc.stage_key(self.base + index)
    }
}

impl PartialEq for ProgramDesc {
    fn eq(&self, other: &Self) -> bool {
        self.key_length() == other.key_length() && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ProgramDesc {}

impl PartialOrd for ProgramDesc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProgramDesc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for ProgramDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.checksum());
    }
}

impl Debug for ProgramDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramDesc")
            .field("len", &self.key_length())
            .field("checksum", &format_args!("{:#010x}", self.checksum()))
            .field("header", self.header())
            .finish()
    }
}

/// Processors in key order: geometry, then color, then coverage.
fn stage_processors(state: &DrawState) -> Vec<&dyn Processor> {
    let geometry = state.geometry.iter().map(|s| s.processor().as_processor());
    let colors = state.color_stages.iter().map(|s| s.processor());
    let coverages = state.coverage_stages.iter().map(|s| s.processor());
    geometry.chain(colors).chain(coverages).collect()
}

fn stage_key(
    processor: &dyn Processor,
    caps: &Caps,
) -> Result<ProcessorKeyBuilder, DescBuildError> {
    let name = processor.name();
    let transforms = processor.coord_transforms();
    ensure!(
        transforms.len() <= MAX_COORD_TRANSFORMS,
        TooManyCoordTransformsErr {
            name,
            count: transforms.len()
        }
    );
    let textures = processor.texture_accesses();
    ensure!(
        textures.len() <= MAX_TEXTURE_ACCESSES,
        TooManyTexturesErr {
            name,
            count: textures.len()
        }
    );

    let transform_key = transforms
        .iter()
        .enumerate()
        .fold(0, |key, (i, t)| key | t.key_bits() << (2 * i));
    let texture_key = textures
        .iter()
        .enumerate()
        .fold(0, |key, (i, t)| key | (t.config.is_alpha_only() as u32) << i);

    let mut builder = ProcessorKeyBuilder::default();
    builder
        .add32(processor.class_id().get())
        .add32(transform_key)
        .add32(texture_key);
    processor
        .gen_key(caps, &mut builder)
        .context(UnsupportedEffectErr { name })?;
    Ok(builder)
}

fn select_input(attribute: Option<u8>, all_ones: bool, all_zeros: bool) -> InputType {
    if attribute.is_some() {
        InputType::Attribute
    } else if all_ones {
        InputType::AllOnes
    } else if all_zeros {
        InputType::AllZeros
    } else {
        InputType::Uniform
    }
}

fn attribute_slot(slot: Option<u8>) -> i8 {
    slot.and_then(|s| i8::try_from(s).ok()).unwrap_or(-1)
}

fn effect_count(count: usize) -> Result<u8, DescBuildError> {
    u8::try_from(count).ok().context(TooManyEffectsErr { count })
}

fn checksum(words: &[u32]) -> u32 {
    let bytes: &[u8] = bytemuck::cast_slice(&words[CHECKSUM_WORD + 1..]);
    xxh3_64(bytes) as u32
}
