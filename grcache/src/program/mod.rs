//! Program keys and the WGSL programs generated from them.

pub mod builder;
pub mod cache;
pub mod desc;
pub mod device;
pub mod draw_state;
pub mod gpu_program;
pub mod key;
pub mod naga_device;
pub mod processor;
pub mod shader_var;

pub use builder::{EmittedProgram, ProgramBuilder, ShaderSources};
pub use cache::{ProgramCache, ProgramCacheStats, ProgramError};
pub use desc::{DescBuildError, EffectKeyProvider, InputType, KeyHeader, ProgramDesc, StageKind};
pub use device::{ProgramBuildError, ProgramDevice, ProgramHandle, UniformLocation, UniformValue};
pub use draw_state::*;
pub use gpu_program::{Program, ProgramDataManager};
pub use key::{ClassId, ProcessorKey, ProcessorKeyBuilder};
pub use naga_device::NagaDevice;
pub use processor::*;
pub use shader_var::{Expr4, ShaderVar, SlType, UniformHandle, UniformInfo};
