use std::fmt::{Display, Formatter};

/// Shading-language types the assembler knows how to declare.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SlType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Texture2d,
    Sampler,
}

impl SlType {
    pub fn wgsl(self) -> &'static str {
        match self {
            SlType::Float => "f32",
            SlType::Vec2 => "vec2<f32>",
            SlType::Vec3 => "vec3<f32>",
            SlType::Vec4 => "vec4<f32>",
            SlType::Mat3 => "mat3x3<f32>",
            SlType::Texture2d => "texture_2d<f32>",
            SlType::Sampler => "sampler",
        }
    }

    pub fn is_opaque(self) -> bool {
        matches!(self, SlType::Texture2d | SlType::Sampler)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShaderVar {
    pub name: String,
    pub ty: SlType,
}

impl ShaderVar {
    pub fn new(name: impl Into<String>, ty: SlType) -> Self {
        ShaderVar {
            name: name.into(),
            ty,
        }
    }
}

/// Index of a uniform inside a program's uniform list.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformHandle(pub(crate) usize);

impl UniformHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct UniformInfo {
    pub var: ShaderVar,
    pub visibility: wgpu::ShaderStages,
    pub binding: u32,
}

/// A vec4 expression that folds known constants away.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Expr4 {
    Ones,
    Zeros,
    Named(String),
}

impl Expr4 {
    pub fn named(name: impl Into<String>) -> Self {
        Expr4::Named(name.into())
    }

    pub fn is_ones(&self) -> bool {
        matches!(self, Expr4::Ones)
    }

    pub fn is_zeros(&self) -> bool {
        matches!(self, Expr4::Zeros)
    }

    pub fn mul(&self, other: &Expr4) -> Expr4 {
        match (self, other) {
            (Expr4::Zeros, _) | (_, Expr4::Zeros) => Expr4::Zeros,
            (Expr4::Ones, e) | (e, Expr4::Ones) => e.clone(),
            (Expr4::Named(a), Expr4::Named(b)) => Expr4::Named(format!("({a} * {b})")),
        }
    }

    pub fn add(&self, other: &Expr4) -> Expr4 {
        match (self, other) {
            (Expr4::Zeros, e) | (e, Expr4::Zeros) => e.clone(),
            _ => Expr4::Named(format!("({self} + {other})")),
        }
    }

    /// `1 - self`
    pub fn inverse(&self) -> Expr4 {
        match self {
            Expr4::Ones => Expr4::Zeros,
            Expr4::Zeros => Expr4::Ones,
            Expr4::Named(n) => Expr4::Named(format!("(vec4<f32>(1.0) - {n})")),
        }
    }

    pub fn alpha(&self) -> String {
        match self {
            Expr4::Ones => "1.0".to_string(),
            Expr4::Zeros => "0.0".to_string(),
            Expr4::Named(n) => format!("{n}.a"),
        }
    }
}

impl Display for Expr4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr4::Ones => f.write_str("vec4<f32>(1.0)"),
            Expr4::Zeros => f.write_str("vec4<f32>(0.0)"),
            Expr4::Named(n) => f.write_str(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_fold() {
        let c = Expr4::named("c");
        assert_eq!(Expr4::Ones.mul(&c), c);
        assert_eq!(c.mul(&Expr4::Zeros), Expr4::Zeros);
        assert_eq!(c.mul(&Expr4::named("k")).to_string(), "(c * k)");
        assert_eq!(Expr4::Ones.inverse(), Expr4::Zeros);
        assert_eq!(Expr4::Zeros.add(&c), c);
    }
}
