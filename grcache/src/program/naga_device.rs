use crate::program::device::{ProgramDevice, ProgramHandle, UniformLocation, UniformValue};
use log::{debug, trace};
use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{Binding, Handle, Module, ShaderStage, Type, TypeInner};
use std::collections::HashMap;

struct CompiledShader {
    stage: ShaderStage,
    module: Module,
}

#[derive(Default)]
struct NagaProgram {
    shaders: Vec<CompiledShader>,
    attributes: Vec<(u32, String)>,
    linked: bool,
    uniforms: HashMap<UniformLocation, UniformValue>,
}

/// A [`ProgramDevice`] that compiles WGSL with naga and checks the interface between stages at
/// link.
///
/// Useful headless and in tests; uniform values are recorded rather than uploaded.
#[derive(Default)]
pub struct NagaDevice {
    programs: HashMap<ProgramHandle, NagaProgram>,
    next_handle: u32,
}

impl NagaDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn is_live(&self, program: ProgramHandle) -> bool {
        self.programs.contains_key(&program)
    }

    pub fn is_linked(&self, program: ProgramHandle) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    pub fn uniform_value(
        &self,
        program: ProgramHandle,
        location: UniformLocation,
    ) -> Option<UniformValue> {
        self.programs.get(&program)?.uniforms.get(&location).copied()
    }
}

impl ProgramDevice for NagaDevice {
    fn create_program(&mut self) -> Option<ProgramHandle> {
        self.next_handle = self.next_handle.checked_add(1)?;
        let handle = ProgramHandle(self.next_handle);
        self.programs.insert(handle, NagaProgram::default());
        Some(handle)
    }

    fn compile_and_attach_shader(
        &mut self,
        program: ProgramHandle,
        stage: ShaderStage,
        source: &str,
    ) -> Result<(), String> {
        let module = wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
        let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
        validator
            .validate(&module)
            .map_err(|e| e.emit_to_string(source))?;

        if !module.entry_points.iter().any(|ep| ep.stage == stage) {
            return Err(format!("no {stage:?} entry point"));
        }

        let entry = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program {program:?}"))?;
        if entry.shaders.iter().any(|s| s.stage == stage) {
            return Err(format!("a {stage:?} shader is already attached"));
        }
        entry.shaders.push(CompiledShader { stage, module });
        trace!("[Naga Device] Attached {stage:?} shader to {program:?}");
        Ok(())
    }

    fn bind_attribute_location(&mut self, program: ProgramHandle, location: u32, name: &str) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.attributes.push((location, name.to_string()));
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> Result<(), String> {
        let entry = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program {program:?}"))?;

        let fragment = entry
            .shaders
            .iter()
            .find(|s| s.stage == ShaderStage::Fragment)
            .ok_or("no fragment shader attached")?;
        let vertex = entry.shaders.iter().find(|s| s.stage == ShaderStage::Vertex);

        match vertex {
            Some(vertex) => {
                let inputs = stage_inputs(&vertex.module, ShaderStage::Vertex);
                for (location, name) in &entry.attributes {
                    let found = inputs
                        .iter()
                        .any(|(l, n)| l == location && n.as_deref() == Some(name.as_str()));
                    if !found {
                        return Err(format!(
                            "attribute {name} is not an input at location {location}"
                        ));
                    }
                }

                let outputs = stage_outputs(&vertex.module, ShaderStage::Vertex);
                for (location, name) in stage_inputs(&fragment.module, ShaderStage::Fragment) {
                    if !outputs.iter().any(|(l, _)| *l == location) {
                        return Err(format!(
                            "fragment input {} at location {location} has no vertex output",
                            name.unwrap_or_default()
                        ));
                    }
                }
            }
            None if !entry.attributes.is_empty() => {
                return Err("attributes bound without a vertex shader".to_string());
            }
            None => {}
        }

        entry.linked = true;
        debug!("[Naga Device] Linked {program:?}");
        Ok(())
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let entry = self.programs.get(&program)?;
        if !entry.linked {
            return None;
        }
        entry.shaders.iter().find_map(|shader| {
            shader
                .module
                .global_variables
                .iter()
                .find(|(_, var)| var.name.as_deref() == Some(name))
                .and_then(|(_, var)| var.binding.as_ref())
                .map(|binding| UniformLocation(binding.binding))
        })
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        location: UniformLocation,
        value: UniformValue,
    ) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.uniforms.insert(location, value);
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() {
            trace!("[Naga Device] Deleted {program:?}");
        }
    }
}

/// `(location, name)` of every located input of the stage's entry point.
fn stage_inputs(module: &Module, stage: ShaderStage) -> Vec<(u32, Option<String>)> {
    let mut out = Vec::new();
    for ep in module.entry_points.iter().filter(|ep| ep.stage == stage) {
        for arg in &ep.function.arguments {
            collect_locations(module, arg.ty, arg.binding.as_ref(), arg.name.as_deref(), &mut out);
        }
    }
    out
}

fn stage_outputs(module: &Module, stage: ShaderStage) -> Vec<(u32, Option<String>)> {
    let mut out = Vec::new();
    for ep in module.entry_points.iter().filter(|ep| ep.stage == stage) {
        if let Some(result) = &ep.function.result {
            collect_locations(module, result.ty, result.binding.as_ref(), None, &mut out);
        }
    }
    out
}

fn collect_locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    name: Option<&str>,
    out: &mut Vec<(u32, Option<String>)>,
) {
    if let Some(Binding::Location { location, .. }) = binding {
        out.push((*location, name.map(str::to_string)));
        return;
    }
    if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
        for member in members {
            if let Some(Binding::Location { location, .. }) = &member.binding {
                out.push((*location, member.name.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "struct vs_in { @location(0) in_Position: vec2<f32>, }
struct vs_out { @builtin(position) position: vec4<f32>, @location(0) vColor: vec4<f32>, }
@vertex
fn vs_main(vin: vs_in) -> vs_out {
    var vout: vs_out;
    vout.position = vec4<f32>(vin.in_Position, 0.0, 1.0);
    return vout;
}
";

    const FS: &str = "@group(0) @binding(3) var<uniform> uColor: vec4<f32>;
struct fs_in { @location(0) vColor: vec4<f32>, }
struct fs_out { @location(0) color: vec4<f32>, }
@fragment
fn fs_main(fin: fs_in) -> fs_out {
    var fout: fs_out;
    fout.color = fin.vColor * uColor;
    return fout;
}
";

    #[test]
    fn links_matching_stages() {
        let mut device = NagaDevice::new();
        let program = device.create_program().unwrap();
        device
            .compile_and_attach_shader(program, ShaderStage::Vertex, VS)
            .unwrap();
        device
            .compile_and_attach_shader(program, ShaderStage::Fragment, FS)
            .unwrap();
        device.bind_attribute_location(program, 0, "in_Position");
        device.link_program(program).unwrap();
        assert_eq!(
            device.uniform_location(program, "uColor"),
            Some(UniformLocation(3))
        );
        assert_eq!(device.uniform_location(program, "uMissing"), None);
    }

    #[test]
    fn rejects_misplaced_attributes() {
        let mut device = NagaDevice::new();
        let program = device.create_program().unwrap();
        device
            .compile_and_attach_shader(program, ShaderStage::Vertex, VS)
            .unwrap();
        device
            .compile_and_attach_shader(program, ShaderStage::Fragment, FS)
            .unwrap();
        device.bind_attribute_location(program, 1, "in_Position");
        assert!(device.link_program(program).is_err());
    }

    #[test]
    fn reports_parse_errors() {
        let mut device = NagaDevice::new();
        let program = device.create_program().unwrap();
        let err = device
            .compile_and_attach_shader(program, ShaderStage::Fragment, "fn broken(")
            .unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn wrong_stage_is_rejected() {
        let mut device = NagaDevice::new();
        let program = device.create_program().unwrap();
        assert!(
            device
                .compile_and_attach_shader(program, ShaderStage::Fragment, VS)
                .is_err()
        );
    }
}
