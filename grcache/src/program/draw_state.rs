use crate::program::processor::{FragmentStage, GeometryStage};
use crate::texture::{SurfaceOrigin, Texture};
use bon::Builder;
use nalgebra::{Matrix3, Point2};
use wgpu::{BlendComponent, BlendFactor, BlendOperation, PrimitiveTopology};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DrawType {
    Points,
    Lines,
    Triangles,
    StencilPath,
    DrawPath,
    DrawPaths,
}

impl DrawType {
    pub fn is_path_rendering(self) -> bool {
        matches!(
            self,
            DrawType::StencilPath | DrawType::DrawPath | DrawType::DrawPaths
        )
    }

    pub fn is_points(self) -> bool {
        self == DrawType::Points
    }

    pub fn topology(self) -> PrimitiveTopology {
        match self {
            DrawType::Points => PrimitiveTopology::PointList,
            DrawType::Lines => PrimitiveTopology::LineList,
            _ => PrimitiveTopology::TriangleList,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendCoeff {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    DstColor,
    InvDstColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    ConstColor,
    InvConstColor,
    Src2Color,
    InvSrc2Color,
    Src2Alpha,
    InvSrc2Alpha,
}

impl BlendCoeff {
    /// Reads the secondary fragment output.
    pub fn is_dual_source(self) -> bool {
        matches!(
            self,
            BlendCoeff::Src2Color
                | BlendCoeff::InvSrc2Color
                | BlendCoeff::Src2Alpha
                | BlendCoeff::InvSrc2Alpha
        )
    }

    pub fn to_wgpu(self) -> BlendFactor {
        match self {
            BlendCoeff::Zero => BlendFactor::Zero,
            BlendCoeff::One => BlendFactor::One,
            BlendCoeff::SrcColor => BlendFactor::Src,
            BlendCoeff::InvSrcColor => BlendFactor::OneMinusSrc,
            BlendCoeff::DstColor => BlendFactor::Dst,
            BlendCoeff::InvDstColor => BlendFactor::OneMinusDst,
            BlendCoeff::SrcAlpha => BlendFactor::SrcAlpha,
            BlendCoeff::InvSrcAlpha => BlendFactor::OneMinusSrcAlpha,
            BlendCoeff::DstAlpha => BlendFactor::DstAlpha,
            BlendCoeff::InvDstAlpha => BlendFactor::OneMinusDstAlpha,
            BlendCoeff::ConstColor => BlendFactor::Constant,
            BlendCoeff::InvConstColor => BlendFactor::OneMinusConstant,
            BlendCoeff::Src2Color => BlendFactor::Src1,
            BlendCoeff::InvSrc2Color => BlendFactor::OneMinusSrc1,
            BlendCoeff::Src2Alpha => BlendFactor::Src1Alpha,
            BlendCoeff::InvSrc2Alpha => BlendFactor::OneMinusSrc1Alpha,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlendCoeffs {
    pub src: BlendCoeff,
    pub dst: BlendCoeff,
}

impl BlendCoeffs {
    pub const SRC_OVER: BlendCoeffs = BlendCoeffs {
        src: BlendCoeff::One,
        dst: BlendCoeff::InvSrcAlpha,
    };

    pub fn new(src: BlendCoeff, dst: BlendCoeff) -> Self {
        BlendCoeffs { src, dst }
    }

    pub fn is_dual_source(&self) -> bool {
        self.src.is_dual_source() || self.dst.is_dual_source()
    }

    pub fn component(&self) -> BlendComponent {
        BlendComponent {
            src_factor: self.src.to_wgpu(),
            dst_factor: self.dst.to_wgpu(),
            operation: BlendOperation::Add,
        }
    }
}

impl Default for BlendCoeffs {
    fn default() -> Self {
        Self::SRC_OVER
    }
}

/// How the primary fragment output is formed from color and coverage.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrimaryOutputType {
    #[default]
    Modulate = 0,
    CombineWithDst = 1,
}

#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SecondaryOutputType {
    #[default]
    None = 0,
    Coverage = 1,
    /// `(1 - color.a) * coverage`
    CoverageIsa = 2,
    /// `(1 - color) * coverage`
    CoverageIsc = 3,
}

/// Vertex attribute slots of the built-in inputs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexLayout {
    pub position: u8,
    pub local_coords: Option<u8>,
    pub color: Option<u8>,
    pub coverage: Option<u8>,
}

impl VertexLayout {
    pub const POSITION_ONLY: VertexLayout = VertexLayout {
        position: 0,
        local_coords: None,
        color: None,
        coverage: None,
    };

    /// First location not taken by a built-in input.
    pub fn first_free_location(&self) -> u32 {
        [Some(self.position), self.local_coords, self.color, self.coverage]
            .into_iter()
            .flatten()
            .max()
            .map_or(0, |m| m as u32 + 1)
    }
}

impl Default for VertexLayout {
    fn default() -> Self {
        Self::POSITION_ONLY
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RenderTargetInfo {
    pub width: u32,
    pub height: u32,
    pub origin: SurfaceOrigin,
}

impl RenderTargetInfo {
    pub fn new(width: u32, height: u32, origin: SurfaceOrigin) -> Self {
        RenderTargetInfo {
            width,
            height,
            origin,
        }
    }

    /// Maps device pixels to clip space: `[sx, tx, sy, ty]`.
    pub fn adjustment(&self) -> [f32; 4] {
        let w = self.width.max(1) as f32;
        let h = self.height.max(1) as f32;
        match self.origin {
            SurfaceOrigin::BottomLeft => [2.0 / w, -1.0, 2.0 / h, -1.0],
            _ => [2.0 / w, -1.0, -2.0 / h, 1.0],
        }
    }
}

/// A copy of the destination the fragment stage samples in place of a framebuffer read.
#[derive(Debug, Copy, Clone)]
pub struct DstCopy<'a> {
    pub texture: &'a Texture,
    /// Device-space position of the copy's top-left corner.
    pub offset: Point2<i32>,
}

impl<'a> DstCopy<'a> {
    pub fn new(texture: &'a Texture, offset: Point2<i32>) -> Self {
        DstCopy { texture, offset }
    }

    pub fn coord_scale(&self) -> [f32; 2] {
        [
            1.0 / self.texture.width().max(1) as f32,
            1.0 / self.texture.height().max(1) as f32,
        ]
    }
}

/// Everything about a draw that shapes its program, plus the per-draw values fed to it.
#[derive(Debug, Clone, Builder)]
pub struct DrawState {
    #[builder(default = Matrix3::identity())]
    pub view_matrix: Matrix3<f32>,
    /// Premultiplied constant color, used when no color attribute is bound.
    #[builder(default = [1.0; 4])]
    pub color: [f32; 4],
    #[builder(default = 1.0)]
    pub coverage: f32,
    #[builder(default)]
    pub vertex_layout: VertexLayout,
    #[builder(default)]
    pub primary_output: PrimaryOutputType,
    #[builder(default)]
    pub secondary_output: SecondaryOutputType,
    pub geometry: Option<GeometryStage>,
    #[builder(default)]
    pub color_stages: Vec<FragmentStage>,
    #[builder(default)]
    pub coverage_stages: Vec<FragmentStage>,
    pub render_target: RenderTargetInfo,
}

impl DrawState {
    pub fn color_is_opaque_white(&self) -> bool {
        self.color == [1.0; 4]
    }

    pub fn has_full_coverage(&self) -> bool {
        self.coverage == 1.0
    }

    pub fn stage_count(&self) -> usize {
        self.geometry.is_some() as usize + self.color_stages.len() + self.coverage_stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_free_location_skips_builtins() {
        let layout = VertexLayout {
            position: 0,
            local_coords: None,
            color: Some(2),
            coverage: None,
        };
        assert_eq!(layout.first_free_location(), 3);
        assert_eq!(VertexLayout::POSITION_ONLY.first_free_location(), 1);
    }

    #[test]
    fn adjustment_flips_y_for_top_left() {
        let top = RenderTargetInfo::new(100, 50, SurfaceOrigin::TopLeft).adjustment();
        assert_eq!(top, [0.02, -1.0, -0.04, 1.0]);
        let bottom = RenderTargetInfo::new(100, 50, SurfaceOrigin::BottomLeft).adjustment();
        assert_eq!(bottom[2], 0.04);
    }

    #[test]
    fn dual_source_coefficients() {
        assert!(BlendCoeffs::new(BlendCoeff::One, BlendCoeff::InvSrc2Color).is_dual_source());
        assert!(!BlendCoeffs::SRC_OVER.is_dual_source());
        assert_eq!(BlendCoeff::Src2Alpha.to_wgpu(), BlendFactor::Src1Alpha);
    }
}
