use crate::caps::Caps;
use crate::program::builder::ProgramBuilder;
use crate::program::gpu_program::ProgramDataManager;
use crate::program::key::{ClassId, ProcessorKey, ProcessorKeyBuilder};
use crate::program::shader_var::SlType;
use crate::texture::{PixelConfig, TextureParams};
use nalgebra::Matrix3;
use snafu::Snafu;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Returned by key generation when an effect can't be expressed with the current caps.
#[derive(Debug, Snafu)]
#[snafu(display("{reason}"))]
pub struct UnsupportedError {
    pub reason: String,
}

impl UnsupportedError {
    pub fn new(reason: impl Into<String>) -> Self {
        UnsupportedError {
            reason: reason.into(),
        }
    }
}

/// Which vertex input a coord transform reads from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CoordSource {
    LocalCoords,
    Position,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CoordTransform {
    pub matrix: Matrix3<f32>,
    pub source: CoordSource,
}

impl CoordTransform {
    pub fn new(matrix: Matrix3<f32>, source: CoordSource) -> Self {
        CoordTransform { matrix, source }
    }

    pub fn local(matrix: Matrix3<f32>) -> Self {
        Self::new(matrix, CoordSource::LocalCoords)
    }

    pub fn has_perspective(&self) -> bool {
        let m = &self.matrix;
        m[(2, 0)] != 0.0 || m[(2, 1)] != 0.0 || m[(2, 2)] != 1.0
    }

    /// Two bits per transform: perspective, then position source.
    pub(crate) fn key_bits(&self) -> u32 {
        (self.has_perspective() as u32) | ((self.source == CoordSource::Position) as u32) << 1
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureAccess {
    pub config: PixelConfig,
    pub params: TextureParams,
}

impl TextureAccess {
    pub fn new(config: PixelConfig, params: TextureParams) -> Self {
        TextureAccess { config, params }
    }
}

#[derive(Debug, Clone)]
pub struct TransformedCoords {
    pub name: String,
    pub ty: SlType,
}

impl TransformedCoords {
    /// The coordinates as a `vec2`, dividing out perspective when present.
    pub fn to_vec2(&self) -> String {
        if self.ty == SlType::Vec3 {
            format!("({0}.xy / {0}.z)", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureSampler {
    pub texture: String,
    pub sampler: String,
    pub alpha_only: bool,
}

impl TextureSampler {
    /// Sampling expression; alpha-only textures are splatted from the red channel.
    pub fn sample(&self, coords: &str) -> String {
        let swizzle = if self.alpha_only { ".rrrr" } else { "" };
        format!(
            "textureSample({}, {}, {coords}){swizzle}",
            self.texture, self.sampler
        )
    }
}

/// Everything an emitter needs to write one stage.
#[derive(Debug)]
pub struct EmitArgs<'a> {
    pub key: ProcessorKey<'a>,
    pub output: &'a str,
    /// `None` means the input is known to be all ones.
    pub input: Option<&'a str>,
    pub coords: &'a [TransformedCoords],
    pub samplers: &'a [TextureSampler],
}

impl EmitArgs<'_> {
    pub fn input_or_ones(&self) -> String {
        self.input
            .map(str::to_string)
            .unwrap_or_else(|| "vec4<f32>(1.0)".to_string())
    }
}

pub trait ProcessorEmitter: Send + Sync {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>);

    fn set_data(&self, _pdm: &mut ProgramDataManager<'_>, _processor: &dyn Processor) {}
}

pub trait Processor: Any + Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn class_id(&self) -> ClassId {
        ClassId::for_type_id(Any::type_id(self))
    }

    /// Appends the processor's own key words; fails when the caps can't support it.
    fn gen_key(&self, caps: &Caps, key: &mut ProcessorKeyBuilder) -> Result<(), UnsupportedError>;

    fn coord_transforms(&self) -> &[CoordTransform] {
        &[]
    }

    fn texture_accesses(&self) -> &[TextureAccess] {
        &[]
    }

    fn will_read_dst_color(&self) -> bool {
        false
    }

    fn will_read_fragment_position(&self) -> bool {
        false
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter>;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexAttrib {
    pub name: &'static str,
    pub ty: SlType,
}

/// A processor that also consumes vertex attributes. It runs first and produces coverage.
pub trait GeometryProcessor: Processor {
    fn vertex_attribs(&self) -> &[VertexAttrib];

    fn as_processor(&self) -> &dyn Processor;
}

#[derive(Debug, Clone)]
pub struct FragmentStage {
    processor: Arc<dyn Processor>,
}

impl FragmentStage {
    pub fn new(processor: Arc<dyn Processor>) -> Self {
        FragmentStage { processor }
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct GeometryStage {
    processor: Arc<dyn GeometryProcessor>,
}

impl GeometryStage {
    pub fn new(processor: Arc<dyn GeometryProcessor>) -> Self {
        GeometryStage { processor }
    }

    pub fn processor(&self) -> &dyn GeometryProcessor {
        self.processor.as_ref()
    }
}
