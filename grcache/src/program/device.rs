use naga::ShaderStage;
use snafu::Snafu;

/// Opaque program object owned by a [`ProgramDevice`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ProgramHandle(pub u32);

/// Device-side address of a uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    /// Column major.
    Mat3([f32; 9]),
}

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum ProgramBuildError {
    #[snafu(display("The device failed to create a program object"))]
    CreateProgram,

    #[snafu(display("Failed to compile {stage:?} shader: {log}"))]
    Compile { stage: ShaderStage, log: String },

    #[snafu(display("Failed to link program: {log}"))]
    Link { log: String },
}

/// The GPU calls a program build goes through. All calls are synchronous.
///
/// Error strings are diagnostics only.
pub trait ProgramDevice {
    fn create_program(&mut self) -> Option<ProgramHandle>;

    fn compile_and_attach_shader(
        &mut self,
        program: ProgramHandle,
        stage: ShaderStage,
        source: &str,
    ) -> Result<(), String>;

    fn bind_attribute_location(&mut self, program: ProgramHandle, location: u32, name: &str);

    fn link_program(&mut self, program: ProgramHandle) -> Result<(), String>;

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        location: UniformLocation,
        value: UniformValue,
    );

    /// Deletes the program and every shader attached to it.
    fn delete_program(&mut self, program: ProgramHandle);
}
