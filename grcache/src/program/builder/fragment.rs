use crate::program::builder::{ShaderCode, declare_uniforms};
use crate::program::shader_var::{ShaderVar, UniformInfo};
use wgpu::ShaderStages;

pub const FRAG_COORD: &str = "fin.frag_coord";
pub const FRAG_POSITION: &str = "fragPos";
pub const DST_COLOR: &str = "dstColor";
pub const PRIMARY_OUTPUT: &str = "fout.color";
pub const SECONDARY_OUTPUT: &str = "fout.secondary";

/// Collects the fragment entry point.
#[derive(Debug, Default)]
pub struct FragmentBuilder {
    uses_frag_coord: bool,
    reads_dst: bool,
    reads_frag_position: bool,
    has_read_frag_position: bool,
    has_secondary_output: bool,
    pub(crate) code: ShaderCode,
}

impl FragmentBuilder {
    pub fn code_append(&mut self, code: &str) {
        self.code.append(code);
    }

    /// Name of the destination color, when the program reads it.
    pub fn dst_color(&self) -> Option<&'static str> {
        self.reads_dst.then_some(DST_COLOR)
    }

    /// Fragment position in render target space with the origin the key asked for.
    pub fn fragment_position(&mut self) -> &'static str {
        debug_assert!(
            self.reads_frag_position,
            "fragment position read without the key requesting it"
        );
        self.has_read_frag_position = true;
        FRAG_POSITION
    }

    pub(crate) fn use_frag_coord(&mut self) {
        self.uses_frag_coord = true;
    }

    pub(crate) fn set_reads_dst(&mut self) {
        self.reads_dst = true;
        self.uses_frag_coord = true;
    }

    pub(crate) fn set_reads_frag_position(&mut self) {
        self.reads_frag_position = true;
        self.uses_frag_coord = true;
    }

    pub(crate) fn enable_secondary_output(&mut self) {
        self.has_secondary_output = true;
    }

    pub(crate) fn has_secondary_output(&self) -> bool {
        self.has_secondary_output
    }

    pub(crate) fn finish(&self, uniforms: &[UniformInfo], varyings: &[ShaderVar]) -> String {
        debug_assert!(
            !self.reads_frag_position || self.has_read_frag_position,
            "the key requested the fragment position but no stage read it"
        );
        let mut out = String::new();
        if self.has_secondary_output {
            out.push_str("enable dual_source_blending;\n\n");
        }
        declare_uniforms(&mut out, uniforms, ShaderStages::FRAGMENT);

        let has_inputs = self.uses_frag_coord || !varyings.is_empty();
        if has_inputs {
            out.push_str("struct fs_in {\n");
            if self.uses_frag_coord {
                out.push_str("    @builtin(position) frag_coord: vec4<f32>,\n");
            }
            for (location, varying) in varyings.iter().enumerate() {
                out.push_str(&format!(
                    "    @location({location}) {}: {},\n",
                    varying.name,
                    varying.ty.wgsl()
                ));
            }
            out.push_str("}\n\n");
        }

        out.push_str("struct fs_out {\n");
        if self.has_secondary_output {
            out.push_str("    @location(0) @blend_src(0) color: vec4<f32>,\n");
            out.push_str("    @location(0) @blend_src(1) secondary: vec4<f32>,\n");
        } else {
            out.push_str("    @location(0) color: vec4<f32>,\n");
        }
        out.push_str("}\n\n");

        if has_inputs {
            out.push_str("@fragment\nfn fs_main(fin: fs_in) -> fs_out {\n");
        } else {
            out.push_str("@fragment\nfn fs_main() -> fs_out {\n");
        }
        out.push_str("    var fout: fs_out;\n");
        out.push_str(self.code.as_str());
        out.push_str("    return fout;\n}\n");
        out
    }
}
