use crate::program::builder::{ShaderCode, declare_uniforms};
use crate::program::shader_var::{ShaderVar, SlType, UniformInfo};
use wgpu::ShaderStages;

pub const POSITION_INPUT: &str = "in_Position";

#[derive(Debug, Clone)]
pub(crate) struct VertexInput {
    pub location: u32,
    pub var: ShaderVar,
}

/// Collects the vertex entry point: attribute inputs and body code.
#[derive(Debug, Default)]
pub struct VertexBuilder {
    inputs: Vec<VertexInput>,
    local_coords: Option<String>,
    pub(crate) code: ShaderCode,
}

impl VertexBuilder {
    /// Declares an attribute input and returns the expression reading it.
    pub(crate) fn add_input(&mut self, location: u32, name: &str, ty: SlType) -> String {
        let field = format!("in_{name}");
        if !self.inputs.iter().any(|i| i.var.name == field) {
            self.inputs.push(VertexInput {
                location,
                var: ShaderVar::new(field.clone(), ty),
            });
        }
        format!("vin.{field}")
    }

    pub(crate) fn set_local_coords(&mut self, expr: String) {
        self.local_coords = Some(expr);
    }

    pub(crate) fn inputs(&self) -> &[VertexInput] {
        &self.inputs
    }

    pub fn position(&self) -> String {
        format!("vin.{POSITION_INPUT}")
    }

    /// View-transformed position as a homogeneous `vec3`.
    pub fn position3(&self) -> &'static str {
        "pos3"
    }

    pub fn local_coords(&self) -> String {
        self.local_coords.clone().unwrap_or_else(|| self.position())
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        let field = format!("in_{name}");
        self.inputs
            .iter()
            .find(|i| i.var.name == field)
            .map(|i| format!("vin.{}", i.var.name))
    }

    pub fn code_append(&mut self, code: &str) {
        self.code.append(code);
    }

    pub(crate) fn finish(&self, uniforms: &[UniformInfo], varyings: &[ShaderVar]) -> String {
        let mut out = String::new();
        declare_uniforms(&mut out, uniforms, ShaderStages::VERTEX);

        out.push_str("struct vs_in {\n");
        for input in &self.inputs {
            out.push_str(&format!(
                "    @location({}) {}: {},\n",
                input.location,
                input.var.name,
                input.var.ty.wgsl()
            ));
        }
        out.push_str("}\n\n");

        out.push_str("struct vs_out {\n    @builtin(position) position: vec4<f32>,\n");
        for (location, varying) in varyings.iter().enumerate() {
            out.push_str(&format!(
                "    @location({location}) {}: {},\n",
                varying.name,
                varying.ty.wgsl()
            ));
        }
        out.push_str("}\n\n");

        out.push_str("@vertex\nfn vs_main(vin: vs_in) -> vs_out {\n    var vout: vs_out;\n");
        out.push_str(self.code.as_str());
        out.push_str("    return vout;\n}\n");
        out
    }
}
