#![allow(dead_code)]

use grcache::caps::Caps;
use grcache::program::{
    CoordTransform, DrawState, EmitArgs, FragmentStage, GeometryProcessor, GeometryStage,
    Processor, ProcessorEmitter, ProcessorKeyBuilder, ProgramBuilder, ProgramDataManager,
    RenderTargetInfo, SlType, TextureAccess, UniformHandle, UnsupportedError, VertexAttrib,
};
use grcache::texture::{PixelConfig, SurfaceOrigin, TextureParams};
use nalgebra::Matrix3;
use std::any::Any;
use std::sync::Arc;
use wgpu::ShaderStages;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn render_target() -> RenderTargetInfo {
    RenderTargetInfo::new(256, 128, SurfaceOrigin::TopLeft)
}

pub fn base_state() -> DrawState {
    DrawState::builder().render_target(render_target()).build()
}

pub fn stage<P: Processor>(processor: P) -> FragmentStage {
    FragmentStage::new(Arc::new(processor))
}

pub fn dual_source_caps() -> Caps {
    Caps::builder().dual_source_blending_support(true).build()
}

/// Multiplies the input by a constant color uniform.
#[derive(Debug, Clone)]
pub struct ModulateColor {
    pub color: [f32; 4],
}

#[derive(Default)]
struct ModulateColorEmitter {
    color: Option<UniformHandle>,
}

impl ProcessorEmitter for ModulateColorEmitter {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>) {
        let handle = builder.add_uniform(ShaderStages::FRAGMENT, SlType::Vec4, "Color");
        self.color = Some(handle);
        let color = builder.uniform_name(handle).to_string();
        let line = format!("{} = {} * {color};", args.output, args.input_or_ones());
        builder.fs().code_append(&line);
    }

    fn set_data(&self, pdm: &mut ProgramDataManager<'_>, processor: &dyn Processor) {
        let effect = processor.as_any().downcast_ref::<ModulateColor>();
        if let (Some(handle), Some(effect)) = (self.color, effect) {
            pdm.set4f(handle, effect.color);
        }
    }
}

impl Processor for ModulateColor {
    fn name(&self) -> &'static str {
        "ModulateColor"
    }

    fn gen_key(
        &self,
        _caps: &Caps,
        _key: &mut ProcessorKeyBuilder,
    ) -> Result<(), UnsupportedError> {
        Ok(())
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(ModulateColorEmitter::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scales coverage by a compile-time step count, which therefore lands in the key.
#[derive(Debug, Clone)]
pub struct CoverageRamp {
    pub steps: u32,
}

struct CoverageRampEmitter;

impl ProcessorEmitter for CoverageRampEmitter {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>) {
        let steps = args.key.processor_words().first().copied().unwrap_or(1);
        let line = format!(
            "{} = {} * (f32({steps}u) / 16.0);",
            args.output,
            args.input_or_ones()
        );
        builder.fs().code_append(&line);
    }
}

impl Processor for CoverageRamp {
    fn name(&self) -> &'static str {
        "CoverageRamp"
    }

    fn gen_key(&self, _caps: &Caps, key: &mut ProcessorKeyBuilder) -> Result<(), UnsupportedError> {
        key.add32(self.steps);
        Ok(())
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(CoverageRampEmitter)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Samples one texture through one coord transform.
#[derive(Debug, Clone)]
pub struct TextureEffect {
    pub transforms: [CoordTransform; 1],
    pub textures: [TextureAccess; 1],
}

impl TextureEffect {
    pub fn new(matrix: Matrix3<f32>, config: PixelConfig) -> Self {
        TextureEffect {
            transforms: [CoordTransform::local(matrix)],
            textures: [TextureAccess::new(config, TextureParams::default())],
        }
    }
}

struct TextureEffectEmitter;

impl ProcessorEmitter for TextureEffectEmitter {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>) {
        let (Some(coords), Some(sampler)) = (args.coords.first(), args.samplers.first()) else {
            return;
        };
        let sample = sampler.sample(&coords.to_vec2());
        let line = format!("{} = {} * {sample};", args.output, args.input_or_ones());
        builder.fs().code_append(&line);
    }
}

impl Processor for TextureEffect {
    fn name(&self) -> &'static str {
        "TextureEffect"
    }

    fn gen_key(
        &self,
        _caps: &Caps,
        _key: &mut ProcessorKeyBuilder,
    ) -> Result<(), UnsupportedError> {
        Ok(())
    }

    fn coord_transforms(&self) -> &[CoordTransform] {
        &self.transforms
    }

    fn texture_accesses(&self) -> &[TextureAccess] {
        &self.textures
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(TextureEffectEmitter)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Averages the input with the destination color.
#[derive(Debug, Clone)]
pub struct DstBlend;

struct DstBlendEmitter;

impl ProcessorEmitter for DstBlendEmitter {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>) {
        let dst = builder.fs().dst_color().unwrap_or("vec4<f32>(0.0)");
        let line = format!("{} = ({} + {dst}) * 0.5;", args.output, args.input_or_ones());
        builder.fs().code_append(&line);
    }
}

impl Processor for DstBlend {
    fn name(&self) -> &'static str {
        "DstBlend"
    }

    fn gen_key(
        &self,
        _caps: &Caps,
        _key: &mut ProcessorKeyBuilder,
    ) -> Result<(), UnsupportedError> {
        Ok(())
    }

    fn will_read_dst_color(&self) -> bool {
        true
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(DstBlendEmitter)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Stripes by fragment x position.
#[derive(Debug, Clone)]
pub struct Stripes;

struct StripesEmitter;

impl ProcessorEmitter for StripesEmitter {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>) {
        let pos = builder.fs().fragment_position();
        let line = format!(
            "{} = {} * fract({pos}.x * 0.5);",
            args.output,
            args.input_or_ones()
        );
        builder.fs().code_append(&line);
    }
}

impl Processor for Stripes {
    fn name(&self) -> &'static str {
        "Stripes"
    }

    fn gen_key(
        &self,
        _caps: &Caps,
        _key: &mut ProcessorKeyBuilder,
    ) -> Result<(), UnsupportedError> {
        Ok(())
    }

    fn will_read_fragment_position(&self) -> bool {
        true
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(StripesEmitter)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Refuses to produce a key.
#[derive(Debug, Clone)]
pub struct NeedsPathRendering;

impl Processor for NeedsPathRendering {
    fn name(&self) -> &'static str {
        "NeedsPathRendering"
    }

    fn gen_key(&self, caps: &Caps, _key: &mut ProcessorKeyBuilder) -> Result<(), UnsupportedError> {
        if caps.path_rendering_support {
            Ok(())
        } else {
            Err(UnsupportedError::new("path rendering is not available"))
        }
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(ModulateColorEmitter::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Emits code that doesn't parse.
#[derive(Debug, Clone)]
pub struct Broken;

struct BrokenEmitter;

impl ProcessorEmitter for BrokenEmitter {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>) {
        builder
            .fs()
            .code_append(&format!("{} = this is not a shader;", args.output));
    }
}

impl Processor for Broken {
    fn name(&self) -> &'static str {
        "Broken"
    }

    fn gen_key(
        &self,
        _caps: &Caps,
        _key: &mut ProcessorKeyBuilder,
    ) -> Result<(), UnsupportedError> {
        Ok(())
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(BrokenEmitter)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Antialiased edge coverage from a per-vertex attribute.
#[derive(Debug, Clone)]
pub struct EdgeGp;

const EDGE_ATTRIBS: [VertexAttrib; 1] = [VertexAttrib {
    name: "Edge",
    ty: SlType::Vec4,
}];

struct EdgeGpEmitter;

impl ProcessorEmitter for EdgeGpEmitter {
    fn emit_code(&mut self, builder: &mut ProgramBuilder<'_>, args: &EmitArgs<'_>) {
        let varying = builder.add_varying(SlType::Vec4, "Edge");
        let attribute = builder.vs().attribute("Edge").unwrap_or_default();
        builder
            .vs()
            .code_append(&format!("{} = {attribute};", varying.vs_out));
        let line = format!(
            "{} = {} * clamp({}.x, 0.0, 1.0);",
            args.output,
            args.input_or_ones(),
            varying.fs_in
        );
        builder.fs().code_append(&line);
    }
}

impl Processor for EdgeGp {
    fn name(&self) -> &'static str {
        "EdgeGp"
    }

    fn gen_key(
        &self,
        _caps: &Caps,
        _key: &mut ProcessorKeyBuilder,
    ) -> Result<(), UnsupportedError> {
        Ok(())
    }

    fn create_emitter(&self) -> Box<dyn ProcessorEmitter> {
        Box::new(EdgeGpEmitter)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl GeometryProcessor for EdgeGp {
    fn vertex_attribs(&self) -> &[VertexAttrib] {
        &EDGE_ATTRIBS
    }

    fn as_processor(&self) -> &dyn Processor {
        self
    }
}

pub fn edge_gp() -> GeometryStage {
    GeometryStage::new(Arc::new(EdgeGp))
}

pub fn texture_effect() -> TextureEffect {
    TextureEffect::new(Matrix3::new_scaling(0.5), PixelConfig::Rgba8888)
}
