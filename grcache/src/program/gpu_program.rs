use crate::program::builder::{
    BuiltinUniforms, EmittedProgram, InstalledStage, ProgramBuilder, ShaderSources,
};
use crate::program::desc::ProgramDesc;
use crate::program::device::{
    CompileErr, CreateProgramErr, LinkErr, ProgramBuildError, ProgramDevice, ProgramHandle,
    UniformLocation, UniformValue,
};
use crate::program::draw_state::{DrawState, DrawType, DstCopy};
use crate::program::processor::Processor;
use crate::program::shader_var::{UniformHandle, UniformInfo};
use itertools::Itertools;
use log::{debug, error, trace};
use nalgebra::Matrix3;
use naga::ShaderStage;
use snafu::OptionExt;
use wgpu::PrimitiveTopology;

/// Pushes uniform values of one program to the device.
pub struct ProgramDataManager<'a> {
    device: &'a mut dyn ProgramDevice,
    program: ProgramHandle,
    locations: &'a [Option<UniformLocation>],
}

impl ProgramDataManager<'_> {
    fn set(&mut self, handle: UniformHandle, value: UniformValue) {
        match self.locations.get(handle.index()).copied().flatten() {
            Some(location) => self.device.set_uniform(self.program, location, value),
            None => trace!("[Program] Skipping unused uniform {}", handle.index()),
        }
    }

    pub fn set1f(&mut self, handle: UniformHandle, v: f32) {
        self.set(handle, UniformValue::Float(v));
    }

    pub fn set2f(&mut self, handle: UniformHandle, v: [f32; 2]) {
        self.set(handle, UniformValue::Vec2(v));
    }

    pub fn set4f(&mut self, handle: UniformHandle, v: [f32; 4]) {
        self.set(handle, UniformValue::Vec4(v));
    }

    pub fn set_matrix3(&mut self, handle: UniformHandle, m: &Matrix3<f32>) {
        let mut columns = [0.0; 9];
        columns.copy_from_slice(m.as_slice());
        self.set(handle, UniformValue::Mat3(columns));
    }
}

/// A linked program and everything needed to feed it per draw.
#[derive(Debug)]
pub struct Program {
    handle: ProgramHandle,
    desc: ProgramDesc,
    sources: ShaderSources,
    uniforms: Vec<UniformInfo>,
    locations: Vec<Option<UniformLocation>>,
    builtin: BuiltinUniforms,
    geometry: Option<InstalledStage>,
    color: Vec<InstalledStage>,
    coverage: Vec<InstalledStage>,
    point_list: bool,
}

impl Program {
    /// Emits, compiles and links the program for `desc`. Nothing stays on the device on failure.
    pub fn create(
        desc: &ProgramDesc,
        state: &DrawState,
        device: &mut dyn ProgramDevice,
    ) -> Result<Program, ProgramBuildError> {
        let emitted = ProgramBuilder::emit(desc, state);
        Self::finalize(desc.clone(), emitted, device)
    }

    fn finalize(
        desc: ProgramDesc,
        emitted: EmittedProgram,
        device: &mut dyn ProgramDevice,
    ) -> Result<Program, ProgramBuildError> {
        let handle = device.create_program().context(CreateProgramErr)?;

        if let Some(vertex) = &emitted.sources.vertex {
            compile(device, handle, ShaderStage::Vertex, vertex)?;
        }
        compile(device, handle, ShaderStage::Fragment, &emitted.sources.fragment)?;

        for (location, name) in &emitted.attributes {
            device.bind_attribute_location(handle, *location, name);
        }

        if let Err(log) = device.link_program(handle) {
            error!("[Program] Program linking failed: {log}");
            debug!(
                "[Program] Bound attributes: {}",
                emitted
                    .attributes
                    .iter()
                    .map(|(location, name)| format!("{name}@{location}"))
                    .join(", ")
            );
            debug!(
                "[Program] Sources:\n{}\n{}",
                emitted.sources.vertex.as_deref().unwrap_or_default(),
                emitted.sources.fragment
            );
            device.delete_program(handle);
            return LinkErr { log }.fail();
        }

        let locations = emitted
            .uniforms
            .iter()
            .map(|u| device.uniform_location(handle, &u.var.name))
            .collect();

        debug!("[Program] Linked {handle:?} for {desc:?}");
        Ok(Program {
            handle,
            desc,
            sources: emitted.sources,
            uniforms: emitted.uniforms,
            locations,
            builtin: emitted.builtin,
            geometry: emitted.geometry,
            color: emitted.color,
            coverage: emitted.coverage,
            point_list: emitted.point_list,
        })
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn desc(&self) -> &ProgramDesc {
        &self.desc
    }

    pub fn sources(&self) -> &ShaderSources {
        &self.sources
    }

    pub fn uniforms(&self) -> &[UniformInfo] {
        &self.uniforms
    }

    pub fn uniform_location(&self, handle: UniformHandle) -> Option<UniformLocation> {
        self.locations.get(handle.index()).copied().flatten()
    }

    pub fn builtin_uniforms(&self) -> &BuiltinUniforms {
        &self.builtin
    }

    pub fn color_stages(&self) -> &[InstalledStage] {
        &self.color
    }

    pub fn coverage_stages(&self) -> &[InstalledStage] {
        &self.coverage
    }

    /// Points always draw as a point list; everything else follows the draw type.
    pub fn topology(&self, draw_type: DrawType) -> PrimitiveTopology {
        if self.point_list {
            PrimitiveTopology::PointList
        } else {
            draw_type.topology()
        }
    }

    /// Uploads the per-draw uniform values of `state` and of every stage's processor.
    pub fn set_data(
        &self,
        device: &mut dyn ProgramDevice,
        state: &DrawState,
        dst_copy: Option<&DstCopy<'_>>,
    ) {
        let mut pdm = ProgramDataManager {
            device,
            program: self.handle,
            locations: &self.locations,
        };
        let builtin = &self.builtin;

        if let Some(h) = builtin.view_matrix {
            pdm.set_matrix3(h, &state.view_matrix);
        }
        if let Some(h) = builtin.rt_adjustment {
            pdm.set4f(h, state.render_target.adjustment());
        }
        if let Some(h) = builtin.color {
            pdm.set4f(h, state.color);
        }
        if let Some(h) = builtin.coverage {
            pdm.set4f(h, [state.coverage; 4]);
        }
        if let Some(h) = builtin.rt_height {
            pdm.set1f(h, state.render_target.height as f32);
        }
        match dst_copy {
            Some(copy) => {
                if let Some(h) = builtin.dst_copy_upper_left {
                    pdm.set2f(h, [copy.offset.x as f32, copy.offset.y as f32]);
                }
                if let Some(h) = builtin.dst_copy_coord_scale {
                    pdm.set2f(h, copy.coord_scale());
                }
            }
            None => debug_assert!(
                builtin.dst_copy_upper_left.is_none(),
                "program reads the destination but no copy was supplied"
            ),
        }

        if let (Some(installed), Some(stage)) = (&self.geometry, &state.geometry) {
            set_stage_data(&mut pdm, installed, stage.processor().as_processor());
        }
        for (installed, stage) in self.color.iter().zip(&state.color_stages) {
            set_stage_data(&mut pdm, installed, stage.processor());
        }
        for (installed, stage) in self.coverage.iter().zip(&state.coverage_stages) {
            set_stage_data(&mut pdm, installed, stage.processor());
        }
    }
}

fn set_stage_data(
    pdm: &mut ProgramDataManager<'_>,
    installed: &InstalledStage,
    processor: &dyn Processor,
) {
    for (handle, transform) in installed.transforms.iter().zip(processor.coord_transforms()) {
        pdm.set_matrix3(*handle, &transform.matrix);
    }
    installed.emitter.set_data(pdm, processor);
}

fn compile(
    device: &mut dyn ProgramDevice,
    program: ProgramHandle,
    stage: ShaderStage,
    source: &str,
) -> Result<(), ProgramBuildError> {
    if let Err(log) = device.compile_and_attach_shader(program, stage, source) {
        error!("[Program] {stage:?} shader compilation failed: {log}");
        debug!("[Program] Shader source:\n{source}");
        device.delete_program(program);
        return CompileErr { stage, log }.fail();
    }
    Ok(())
}
