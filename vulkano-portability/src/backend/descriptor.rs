// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Native pipeline descriptors and fixed-function state values.
//!
//! These mirror what a Metal-style API accepts. Everything a [`Backend`](super::Backend) needs to
//! compile a pipeline is carried by value, so a descriptor can be inspected, cloned and compared.

use crate::{
    pipeline::graphics::color_blend::{AttachmentBlend, ColorComponents},
    shader::ShaderFunction,
    Format,
};
use std::collections::BTreeMap;

/// Describes a render pipeline state to compile.
#[derive(Clone, Debug, Default)]
pub struct RenderPipelineDescriptor {
    pub label: String,
    pub vertex_function: Option<ShaderFunction>,
    pub fragment_function: Option<ShaderFunction>,
    pub vertex_descriptor: VertexDescriptor,
    pub rasterization_enabled: bool,
    pub color_attachments: Vec<Option<ColorAttachmentDescriptor>>,
    pub depth_attachment_pixel_format: Option<Format>,
    pub stencil_attachment_pixel_format: Option<Format>,
    pub sample_count: u32,
    pub alpha_to_coverage_enabled: bool,
    pub alpha_to_one_enabled: bool,
    pub input_primitive_topology: PrimitiveTopologyClass,
    pub tessellation: Option<TessellationDescriptor>,
}

/// Describes a compute pipeline state to compile.
#[derive(Clone, Debug, Default)]
pub struct ComputePipelineDescriptor {
    pub label: String,
    pub compute_function: Option<ShaderFunction>,
    pub stage_input_descriptor: Option<StageInputOutputDescriptor>,
}

/// Where vertex attributes are fetched from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexDescriptor {
    /// Attributes, keyed by attribute index.
    pub attributes: BTreeMap<u32, AttributeDescriptor>,
    /// Buffer layouts, keyed by native buffer index.
    pub layouts: BTreeMap<u32, VertexBufferLayoutDescriptor>,
}

/// Where the per-thread inputs of a compute function are fetched from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageInputOutputDescriptor {
    pub attributes: BTreeMap<u32, AttributeDescriptor>,
    pub layouts: BTreeMap<u32, StageInputLayoutDescriptor>,
    pub index_buffer_index: u32,
    /// The type of the index buffer, or `None` when threads index the inputs directly.
    pub index_type: Option<IndexType>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub format: VertexFormat,
    pub offset: u32,
    pub buffer_index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBufferLayoutDescriptor {
    pub stride: u32,
    pub step_function: VertexStepFunction,
    pub step_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageInputLayoutDescriptor {
    pub stride: u32,
    pub step_function: StepFunction,
    pub step_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexStepFunction {
    Constant,
    PerVertex,
    PerInstance,
    PerPatch,
    PerPatchControlPoint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepFunction {
    Constant,
    ThreadPositionInGridX,
    ThreadPositionInGridXIndexed,
}

/// The element type of an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    UInt16,
    UInt32,
}

/// Formats that vertex and stage input attributes can be read as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    UChar,
    UChar2,
    UChar4,
    Char,
    Char2,
    Char4,
    UCharNormalized,
    UChar2Normalized,
    UChar4Normalized,
    UChar4NormalizedBgra,
    CharNormalized,
    Char2Normalized,
    Char4Normalized,
    UShort,
    UShort2,
    UShort4,
    Short,
    Short2,
    Short4,
    UShortNormalized,
    UShort2Normalized,
    UShort4Normalized,
    ShortNormalized,
    Short2Normalized,
    Short4Normalized,
    Half,
    Half2,
    Half3,
    Half4,
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    UInt,
    UInt2,
    UInt3,
    UInt4,
    Int1010102Normalized,
    UInt1010102Normalized,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachmentDescriptor {
    pub pixel_format: Format,
    pub write_mask: ColorComponents,
    /// Blending, or `None` to write the fragment output unchanged.
    pub blend: Option<AttachmentBlend>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopologyClass {
    #[default]
    Unspecified,
    Point,
    Line,
    Triangle,
}

/// Fixed-function tessellator configuration of a raster pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TessellationDescriptor {
    pub max_tessellation_factor: u32,
    pub factor_format: TessellationFactorFormat,
    pub control_point_index_type: TessellationControlPointIndexType,
    pub factor_step_function: TessellationFactorStepFunction,
    pub output_winding_order: Winding,
    pub partition_mode: TessellationPartitionMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TessellationFactorFormat {
    Half,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TessellationControlPointIndexType {
    None,
    UInt16,
    UInt32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TessellationFactorStepFunction {
    Constant,
    PerPatch,
    PerInstance,
    PerPatchAndPerInstance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TessellationPartitionMode {
    Pow2,
    Integer,
    FractionalOdd,
    FractionalEven,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Winding {
    Clockwise,
    CounterClockwise,
}

impl Winding {
    /// Returns the opposite winding.
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            Self::Clockwise => Self::CounterClockwise,
            Self::CounterClockwise => Self::Clockwise,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriangleFillMode {
    #[default]
    Fill,
    Lines,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthClipMode {
    #[default]
    Clip,
    Clamp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Point,
    Line,
    LineStrip,
    #[default]
    Triangle,
    TriangleStrip,
}

/// A native viewport. Coordinates are in pixels, depth in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
    pub znear: f64,
    pub zfar: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub slope_factor: f32,
    pub clamp: f32,
}
