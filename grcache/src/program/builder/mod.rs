//! Assembles WGSL vertex and fragment modules from a program key and its processors.

mod fragment;
mod vertex;

pub use fragment::{DST_COLOR, FRAG_COORD, FRAG_POSITION, FragmentBuilder};
pub use vertex::VertexBuilder;

use crate::program::desc::{
    DST_READ_ALPHA_CONFIG, DST_READ_TOP_LEFT, FRAG_POS_TOP_LEFT, InputType, KeyHeader,
    ProgramDesc, StageKind,
};
use crate::program::draw_state::{DrawState, PrimaryOutputType, SecondaryOutputType};
use crate::program::key::ProcessorKey;
use crate::program::processor::{
    CoordSource, EmitArgs, Processor, ProcessorEmitter, TextureSampler, TransformedCoords,
};
use crate::program::shader_var::{Expr4, ShaderVar, SlType, UniformHandle, UniformInfo};
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use wgpu::ShaderStages;

/// Shader body text with block-aware indentation.
#[derive(Debug, Default, Clone)]
pub(crate) struct ShaderCode {
    text: String,
    depth: usize,
}

impl ShaderCode {
    pub fn append(&mut self, code: &str) {
        for line in code.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                self.text.push('\n');
                continue;
            }
            for _ in 0..=self.depth {
                self.text.push_str("    ");
            }
            self.text.push_str(line);
            self.text.push('\n');
        }
    }

    pub fn open_block(&mut self, comment: &str) {
        self.append(&format!("{{ // {comment}"));
        self.depth += 1;
    }

    pub fn close_block(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.append("}");
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

pub(crate) fn declare_uniforms(out: &mut String, uniforms: &[UniformInfo], stage: ShaderStages) {
    let mut declared = false;
    for uniform in uniforms.iter().filter(|u| u.visibility.contains(stage)) {
        let space = if uniform.var.ty.is_opaque() {
            ""
        } else {
            "<uniform>"
        };
        out.push_str(&format!(
            "@group(0) @binding({}) var{space} {}: {};\n",
            uniform.binding,
            uniform.var.name,
            uniform.var.ty.wgsl()
        ));
        declared = true;
    }
    if declared {
        out.push('\n');
    }
}

#[derive(Debug, Clone)]
pub struct Varying {
    pub vs_out: String,
    pub fs_in: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureBinding {
    pub texture: UniformHandle,
    pub sampler: UniformHandle,
}

/// Uniforms the assembler declares itself, outside any stage.
#[derive(Debug, Default, Copy, Clone)]
pub struct BuiltinUniforms {
    pub view_matrix: Option<UniformHandle>,
    pub rt_adjustment: Option<UniformHandle>,
    pub color: Option<UniformHandle>,
    pub coverage: Option<UniformHandle>,
    pub dst_copy_upper_left: Option<UniformHandle>,
    pub dst_copy_coord_scale: Option<UniformHandle>,
    pub dst_copy_texture: Option<TextureBinding>,
    pub rt_height: Option<UniformHandle>,
}

/// A processor's emitter together with the uniforms the assembler made for it.
pub struct InstalledStage {
    pub(crate) emitter: Box<dyn ProcessorEmitter>,
    pub(crate) transforms: Vec<UniformHandle>,
    pub(crate) textures: Vec<TextureBinding>,
}

impl InstalledStage {
    pub fn transforms(&self) -> &[UniformHandle] {
        &self.transforms
    }

    pub fn textures(&self) -> &[TextureBinding] {
        &self.textures
    }
}

impl Debug for InstalledStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledStage")
            .field("transforms", &self.transforms)
            .field("textures", &self.textures)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShaderSources {
    /// `None` for fragment-only programs.
    pub vertex: Option<String>,
    pub fragment: String,
}

impl ShaderSources {
    pub const VERTEX_ENTRY: &'static str = "vs_main";
    pub const FRAGMENT_ENTRY: &'static str = "fs_main";

    pub fn vertex_module(&self) -> Option<wgpu::ShaderModuleDescriptor<'_>> {
        self.vertex
            .as_deref()
            .map(|source| wgpu::ShaderModuleDescriptor {
                label: Some("Generated Vertex Shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            })
    }

    pub fn fragment_module(&self) -> wgpu::ShaderModuleDescriptor<'_> {
        wgpu::ShaderModuleDescriptor {
            label: Some("Generated Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&self.fragment)),
        }
    }
}

/// Output of the emit phase; turned into a [`Program`](crate::program::Program) by linking.
#[derive(Debug)]
pub struct EmittedProgram {
    pub sources: ShaderSources,
    pub uniforms: Vec<UniformInfo>,
    /// `(location, name)` of every vertex input.
    pub attributes: Vec<(u32, String)>,
    pub builtin: BuiltinUniforms,
    pub geometry: Option<InstalledStage>,
    pub color: Vec<InstalledStage>,
    pub coverage: Vec<InstalledStage>,
    pub point_list: bool,
}

pub struct ProgramBuilder<'a> {
    desc: &'a ProgramDesc,
    header: KeyHeader,
    stage: Option<usize>,
    next_stage: usize,
    uniforms: Vec<UniformInfo>,
    varyings: Vec<ShaderVar>,
    vs: VertexBuilder,
    fs: FragmentBuilder,
    builtin: BuiltinUniforms,
}

impl<'a> ProgramBuilder<'a> {
    /// Generates the shader sources for `desc`. Emitting twice yields identical sources.
    pub fn emit(desc: &'a ProgramDesc, state: &DrawState) -> EmittedProgram {
        ProgramBuilder {
            desc,
            header: *desc.header(),
            stage: None,
            next_stage: 0,
            uniforms: Vec::new(),
            varyings: Vec::new(),
            vs: VertexBuilder::default(),
            fs: FragmentBuilder::default(),
            builtin: BuiltinUniforms::default(),
        }
        .emit_program(state)
    }

    pub fn header(&self) -> &KeyHeader {
        &self.header
    }

    /// Index of the stage being emitted, if any.
    pub fn stage_index(&self) -> Option<usize> {
        self.stage
    }

    pub fn vs(&mut self) -> &mut VertexBuilder {
        &mut self.vs
    }

    pub fn fs(&mut self) -> &mut FragmentBuilder {
        &mut self.fs
    }

    /// Prefixes `name` and, inside a stage, suffixes it with the stage index.
    pub fn name_variable(&self, prefix: Option<char>, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 8);
        if let Some(prefix) = prefix {
            out.push(prefix);
        }
        out.push_str(name);
        if let Some(stage) = self.stage {
            if name.ends_with('_') {
                out.push('x');
            }
            out.push_str(&format!("_Stage{stage}"));
        }
        out
    }

    pub fn add_uniform(
        &mut self,
        visibility: ShaderStages,
        ty: SlType,
        name: &str,
    ) -> UniformHandle {
        let var = ShaderVar::new(self.name_variable(Some('u'), name), ty);
        debug_assert!(
            !self.uniforms.iter().any(|u| u.var.name == var.name),
            "uniform {} declared twice",
            var.name
        );
        let handle = UniformHandle(self.uniforms.len());
        self.uniforms.push(UniformInfo {
            var,
            visibility,
            binding: handle.0 as u32,
        });
        handle
    }

    pub fn uniform_name(&self, handle: UniformHandle) -> &str {
        self.uniforms
            .get(handle.0)
            .map(|u| u.var.name.as_str())
            .unwrap_or_default()
    }

    /// Declares a value passed from the vertex to the fragment stage.
    pub fn add_varying(&mut self, ty: SlType, name: &str) -> Varying {
        debug_assert!(
            !self.header.frag_shader_only(),
            "varying {name} in a fragment-only program"
        );
        let field = self.name_variable(Some('v'), name);
        self.varyings.push(ShaderVar::new(field.clone(), ty));
        Varying {
            vs_out: format!("vout.{field}"),
            fs_in: format!("fin.{field}"),
        }
    }

    fn emit_program(mut self, state: &DrawState) -> EmittedProgram {
        debug_assert_eq!(self.desc.stage_count(), state.stage_count());
        let desc = self.desc;
        let header = self.header;
        let frag_only = header.frag_shader_only();

        if frag_only {
            self.fs.use_frag_coord();
        } else {
            self.setup_vertex(state);
        }
        if header.reads_dst() {
            self.emit_dst_copy_read();
        }
        if header.reads_frag_position() {
            self.emit_frag_position();
        }

        let (mut color, color_uniform) =
            self.setup_input(header.color_input(), "Color", header.color_attribute_index);
        self.builtin.color = color_uniform;
        let (mut coverage, coverage_uniform) = self.setup_input(
            header.coverage_input(),
            "Coverage",
            header.coverage_attribute_index,
        );
        self.builtin.coverage = coverage_uniform;

        let mut geometry = None;
        if let Some(stage) = &state.geometry {
            let key = desc.key_provider(StageKind::Geometry).get(0);
            let (installed, output) =
                self.emit_stage(stage.processor().as_processor(), key, &coverage);
            geometry = Some(installed);
            coverage = output;
        }

        let keys = desc.key_provider(StageKind::Color);
        let mut color_stages = Vec::with_capacity(state.color_stages.len());
        for (i, stage) in state.color_stages.iter().enumerate() {
            let (installed, output) = self.emit_stage(stage.processor(), keys.get(i), &color);
            color_stages.push(installed);
            color = output;
        }

        let keys = desc.key_provider(StageKind::Coverage);
        let mut coverage_stages = Vec::with_capacity(state.coverage_stages.len());
        for (i, stage) in state.coverage_stages.iter().enumerate() {
            let (installed, output) = self.emit_stage(stage.processor(), keys.get(i), &coverage);
            coverage_stages.push(installed);
            coverage = output;
        }

        if let Some(rt) = self.builtin.rt_adjustment {
            let rt = self.uniform_name(rt).to_string();
            self.vs.code_append(&format!(
                "vout.position = vec4<f32>(dot(pos3.xz, {rt}.xy), dot(pos3.yz, {rt}.zw), 0.0, pos3.z);"
            ));
        }

        self.emit_outputs(&color, &coverage);

        let vertex = (!frag_only).then(|| self.vs.finish(&self.uniforms, &self.varyings));
        let fragment = self.fs.finish(&self.uniforms, &self.varyings);
        let attributes = self
            .vs
            .inputs()
            .iter()
            .map(|i| (i.location, i.var.name.clone()))
            .collect();

        EmittedProgram {
            sources: ShaderSources { vertex, fragment },
            uniforms: self.uniforms,
            attributes,
            builtin: self.builtin,
            geometry,
            color: color_stages,
            coverage: coverage_stages,
            point_list: header.emits_point_size(),
        }
    }

    fn setup_vertex(&mut self, state: &DrawState) {
        let header = self.header;
        let position = KeyHeader::attribute_index(header.position_attribute_index).unwrap_or(0);
        self.vs.add_input(position, "Position", SlType::Vec2);
        match KeyHeader::attribute_index(header.local_coord_attribute_index) {
            Some(local) if local != position => {
                let expr = self.vs.add_input(local, "LocalCoords", SlType::Vec2);
                self.vs.set_local_coords(expr);
            }
            _ => {}
        }

        if let Some(stage) = &state.geometry {
            let mut location = first_free_location(&header);
            for attrib in stage.processor().vertex_attribs() {
                self.vs.add_input(location, attrib.name, attrib.ty);
                location += 1;
            }
        }

        let view = self.add_uniform(ShaderStages::VERTEX, SlType::Mat3, "ViewM");
        let rt = self.add_uniform(ShaderStages::VERTEX, SlType::Vec4, "RTAdjustment");
        self.builtin.view_matrix = Some(view);
        self.builtin.rt_adjustment = Some(rt);

        let view = self.uniform_name(view).to_string();
        let position = self.vs.position();
        let position3 = self.vs.position3();
        self.vs
            .code_append(&format!("let {position3} = {view} * vec3<f32>({position}, 1.0);"));
    }

    fn setup_input(
        &mut self,
        input: InputType,
        name: &str,
        attribute: i8,
    ) -> (Expr4, Option<UniformHandle>) {
        match input {
            InputType::AllOnes => (Expr4::Ones, None),
            InputType::AllZeros => (Expr4::Zeros, None),
            InputType::Uniform => {
                let handle = self.add_uniform(ShaderStages::FRAGMENT, SlType::Vec4, name);
                (Expr4::named(self.uniform_name(handle)), Some(handle))
            }
            InputType::Attribute => {
                let location = KeyHeader::attribute_index(attribute).unwrap_or(0);
                let input = self.vs.add_input(location, name, SlType::Vec4);
                let varying = self.add_varying(SlType::Vec4, name);
                self.vs
                    .code_append(&format!("{} = {input};", varying.vs_out));
                (Expr4::Named(varying.fs_in), None)
            }
        }
    }

    fn emit_dst_copy_read(&mut self) {
        let key = self.header.dst_read_key;
        let upper_left = self.add_uniform(ShaderStages::FRAGMENT, SlType::Vec2, "DstCopyUpperLeft");
        let scale = self.add_uniform(ShaderStages::FRAGMENT, SlType::Vec2, "DstCopyCoordScale");
        let texture = self.add_uniform(ShaderStages::FRAGMENT, SlType::Texture2d, "DstCopyTexture");
        let sampler = self.add_uniform(ShaderStages::FRAGMENT, SlType::Sampler, "DstCopySampler");
        self.builtin.dst_copy_upper_left = Some(upper_left);
        self.builtin.dst_copy_coord_scale = Some(scale);
        self.builtin.dst_copy_texture = Some(TextureBinding { texture, sampler });
        self.fs.set_reads_dst();

        let coords = format!(
            "({FRAG_COORD}.xy - {}) * {}",
            self.uniform_name(upper_left),
            self.uniform_name(scale)
        );
        let sampler = TextureSampler {
            texture: self.uniform_name(texture).to_string(),
            sampler: self.uniform_name(sampler).to_string(),
            alpha_only: key & DST_READ_ALPHA_CONFIG != 0,
        };

        self.fs.code_append("// Read color from copy of the destination.");
        if key & DST_READ_TOP_LEFT != 0 {
            self.fs.code_append(&format!("let dstTexCoord = {coords};"));
        } else {
            self.fs.code_append(&format!("let dstTexCoordFlipped = {coords};"));
            self.fs.code_append(
                "let dstTexCoord = vec2<f32>(dstTexCoordFlipped.x, 1.0 - dstTexCoordFlipped.y);",
            );
        }
        self.fs.code_append(&format!(
            "let {DST_COLOR} = {};",
            sampler.sample("dstTexCoord")
        ));
    }

    fn emit_frag_position(&mut self) {
        self.fs.set_reads_frag_position();
        if self.header.frag_pos_key == FRAG_POS_TOP_LEFT {
            self.fs
                .code_append(&format!("let {FRAG_POSITION} = {FRAG_COORD};"));
        } else {
            let height = self.add_uniform(ShaderStages::FRAGMENT, SlType::Float, "RTHeight");
            self.builtin.rt_height = Some(height);
            let height = self.uniform_name(height).to_string();
            self.fs.code_append(&format!(
                "let {FRAG_POSITION} = vec4<f32>({FRAG_COORD}.x, {height} - {FRAG_COORD}.y, {FRAG_COORD}.zw);"
            ));
        }
    }

    fn emit_stage(
        &mut self,
        processor: &dyn Processor,
        key: ProcessorKey<'_>,
        input: &Expr4,
    ) -> (InstalledStage, Expr4) {
        let stage = self.next_stage;
        self.next_stage += 1;
        self.stage = Some(stage);

        let output = self.name_variable(None, "output");
        self.fs.code_append(&format!("var {output}: vec4<f32>;"));
        let input = match input {
            Expr4::Ones => None,
            Expr4::Zeros => {
                let name = self.name_variable(None, "input");
                self.fs
                    .code_append(&format!("let {name} = {};", Expr4::Zeros));
                Some(name)
            }
            Expr4::Named(name) => Some(name.clone()),
        };

        let label = format!("Stage {stage}: {}", processor.name());
        self.fs.code.open_block(&label);
        self.vs.code.open_block(&label);

        let (coords, transforms) = self.emit_transforms(processor);
        let (samplers, textures) = self.emit_samplers(processor, key);

        let mut emitter = processor.create_emitter();
        emitter.emit_code(
            self,
            &EmitArgs {
                key,
                output: &output,
                input: input.as_deref(),
                coords: &coords,
                samplers: &samplers,
            },
        );

        self.vs.code.close_block();
        self.fs.code.close_block();
        self.stage = None;

        let installed = InstalledStage {
            emitter,
            transforms,
            textures,
        };
        (installed, Expr4::Named(output))
    }

    fn emit_transforms(
        &mut self,
        processor: &dyn Processor,
    ) -> (Vec<TransformedCoords>, Vec<UniformHandle>) {
        let frag_only = self.header.frag_shader_only();
        let mut coords = Vec::new();
        let mut handles = Vec::new();

        for (t, transform) in processor.coord_transforms().iter().enumerate() {
            let suffix = if t == 0 { String::new() } else { format!("_{t}") };
            let ty = if transform.has_perspective() {
                SlType::Vec3
            } else {
                SlType::Vec2
            };
            let swizzle = if ty == SlType::Vec2 { ".xy" } else { "" };

            let visibility = if frag_only {
                ShaderStages::FRAGMENT
            } else {
                ShaderStages::VERTEX
            };
            let matrix =
                self.add_uniform(visibility, SlType::Mat3, &format!("StageMatrix{suffix}"));
            handles.push(matrix);
            let matrix = self.uniform_name(matrix).to_string();

            if frag_only {
                let name = self.name_variable(None, &format!("matrixCoord{suffix}"));
                self.fs.code_append(&format!(
                    "let {name} = ({matrix} * vec3<f32>({FRAG_COORD}.xy, 1.0)){swizzle};"
                ));
                coords.push(TransformedCoords { name, ty });
            } else {
                let varying = self.add_varying(ty, &format!("MatrixCoord{suffix}"));
                let source = match transform.source {
                    CoordSource::LocalCoords => self.vs.local_coords(),
                    CoordSource::Position => self.vs.position(),
                };
                self.vs.code_append(&format!(
                    "{} = ({matrix} * vec3<f32>({source}, 1.0)){swizzle};",
                    varying.vs_out
                ));
                coords.push(TransformedCoords {
                    name: varying.fs_in,
                    ty,
                });
            }
        }
        (coords, handles)
    }

    fn emit_samplers(
        &mut self,
        processor: &dyn Processor,
        key: ProcessorKey<'_>,
    ) -> (Vec<TextureSampler>, Vec<TextureBinding>) {
        let count = processor.texture_accesses().len();
        let mut samplers = Vec::with_capacity(count);
        let mut bindings = Vec::with_capacity(count);
        for t in 0..count {
            let texture = self.add_uniform(
                ShaderStages::FRAGMENT,
                SlType::Texture2d,
                &format!("Texture{t}"),
            );
            let sampler = self.add_uniform(
                ShaderStages::FRAGMENT,
                SlType::Sampler,
                &format!("Sampler{t}"),
            );
            samplers.push(TextureSampler {
                texture: self.uniform_name(texture).to_string(),
                sampler: self.uniform_name(sampler).to_string(),
                alpha_only: (key.texture_key() >> t) & 1 != 0,
            });
            bindings.push(TextureBinding { texture, sampler });
        }
        (samplers, bindings)
    }

    fn emit_outputs(&mut self, color: &Expr4, coverage: &Expr4) {
        let secondary = match self.header.secondary_output() {
            SecondaryOutputType::None => None,
            SecondaryOutputType::Coverage => Some(coverage.clone()),
            SecondaryOutputType::CoverageIsa => {
                Some(Expr4::named(format!("vec4<f32>(1.0 - {})", color.alpha())).mul(coverage))
            }
            SecondaryOutputType::CoverageIsc => Some(color.inverse().mul(coverage)),
        };
        if let Some(secondary) = secondary {
            self.fs.enable_secondary_output();
            self.fs
                .code_append(&format!("{} = {secondary};", fragment::SECONDARY_OUTPUT));
        }

        let mut primary = color.mul(coverage);
        if self.header.primary_output() == PrimaryOutputType::CombineWithDst {
            debug_assert!(self.fs.dst_color().is_some());
            let dst = Expr4::named(DST_COLOR);
            primary = primary.add(&coverage.inverse().mul(&dst));
        }
        self.fs
            .code_append(&format!("{} = {primary};", fragment::PRIMARY_OUTPUT));
    }
}

fn first_free_location(header: &KeyHeader) -> u32 {
    [
        header.position_attribute_index,
        header.local_coord_attribute_index,
        header.color_attribute_index,
        header.coverage_attribute_index,
    ]
    .into_iter()
    .filter_map(KeyHeader::attribute_index)
    .max()
    .map_or(0, |m| m + 1)
}
