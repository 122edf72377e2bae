// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Subdivides primitives into smaller primitives.
//!
//! The native backend has a fixed-function tessellator but no programmable tessellation stages.
//! A tessellated pipeline is therefore run as three passes:
//!
//! 1. The vertex shader runs without rasterization, and captures its outputs into a buffer.
//! 2. The tessellation control shader runs as a compute pass over the captured vertices. It writes
//!    the output control points, the per-patch outputs and the tessellation levels into buffers.
//! 3. The tessellator runs on those levels, and the tessellation evaluation shader runs as the
//!    vertex function of the raster pass, fetching the control points and per-patch data as
//!    vertex attributes.
//!
//! The helpers of this module describe the buffers passed between the passes, for the stage that
//! writes them and for the stage that reads them.

use crate::{
    backend::descriptor::{
        AttributeDescriptor, TessellationControlPointIndexType, TessellationDescriptor,
        TessellationFactorFormat, TessellationFactorStepFunction, TessellationPartitionMode,
        VertexBufferLayoutDescriptor, VertexFormat, VertexStepFunction, Winding,
    },
    device::Device,
    macros::vulkan_enum,
    pipeline::PipelineCreationError,
    shader::{
        conversion::{VertexAttribute, VertexAttributeFormat},
        BuiltIn, ShaderBaseType, ShaderOutput, ShaderStage, TessellationModes,
        TessellationPatchKind, TessellationSpacing, TessellationVertexOrder,
    },
    ValidationError,
};
use std::collections::BTreeMap;

/// The state in a graphics pipeline describing the tessellation shader execution of a graphics
/// pipeline.
#[derive(Clone, Copy, Debug)]
pub struct TessellationState {
    /// The number of patch control points to use.
    ///
    /// The default value is 3.
    pub patch_control_points: u32,

    /// The origin to use for the tessellation domain.
    ///
    /// The default value is [`TessellationDomainOrigin::UpperLeft`].
    pub domain_origin: TessellationDomainOrigin,

    pub _ne: crate::NonExhaustive,
}

impl Default for TessellationState {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl TessellationState {
    /// Creates a new `TessellationState` with 3 patch control points.
    #[inline]
    pub fn new() -> Self {
        Self {
            patch_control_points: 3,
            domain_origin: TessellationDomainOrigin::default(),
            _ne: crate::NonExhaustive(()),
        }
    }

    /// Sets the number of patch control points.
    #[inline]
    pub fn patch_control_points(mut self, num: u32) -> Self {
        self.patch_control_points = num;
        self
    }

    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            patch_control_points,
            domain_origin: _,
            _ne: _,
        } = self;

        if patch_control_points == 0 {
            return Err(Box::new(ValidationError {
                context: "patch_control_points".into(),
                problem: "is zero".into(),
                vuids: &[
                    "VUID-VkPipelineTessellationStateCreateInfo-patchControlPoints-01214",
                ],
            }));
        }

        if patch_control_points > device.metal_features().max_patch_control_points {
            return Err(Box::new(ValidationError {
                context: "patch_control_points".into(),
                problem: "exceeds the `max_patch_control_points` limit".into(),
                vuids: &[
                    "VUID-VkPipelineTessellationStateCreateInfo-patchControlPoints-01214",
                ],
            }));
        }

        Ok(())
    }
}

vulkan_enum! {
    /// The origin of the tessellation domain.
    TessellationDomainOrigin = TessellationDomainOrigin(i32);

    /// The origin is in the upper left corner.
    ///
    /// This is the default.
    UpperLeft = UPPER_LEFT,

    /// The origin is in the lower left corner.
    LowerLeft = LOWER_LEFT,
}

impl Default for TessellationDomainOrigin {
    #[inline]
    fn default() -> Self {
        Self::UpperLeft
    }
}

/// The native buffer the tessellation control pass reads captured vertex outputs from. The raster
/// pass reads output control points from the same slot.
pub const TESS_CONTROL_INPUT_BUFFER_INDEX: u32 = 30;

/// The native buffer of the index buffer during an indexed tessellation control pass. The raster
/// pass reads per-patch outputs from the same slot.
pub const TESS_CONTROL_INDEX_BUFFER_INDEX: u32 = 29;

/// The native buffer the raster pass reads tessellation levels from.
pub const TESS_LEVEL_BUFFER_INDEX: u32 = 28;

/// The threadgroup memory slot holding the input control points of the tessellation control pass.
pub const TESS_CONTROL_INPUT_THREADGROUP_MEM_INDEX: u32 = 0;

/// The execution modes of a tessellated pipeline, merged from both tessellation shaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TessellationInfo {
    pub(crate) patch_kind: TessellationPatchKind,
    pub(crate) vertex_order: TessellationVertexOrder,
    pub(crate) spacing: TessellationSpacing,
    pub(crate) point_mode: bool,
    pub(crate) output_control_points: u32,
}

impl TessellationInfo {
    /// Merges the execution modes of the control and evaluation shaders. A mode may be declared
    /// by either shader.
    pub(crate) fn merge(
        control: &TessellationModes,
        evaluation: &TessellationModes,
    ) -> Result<Self, PipelineCreationError> {
        let patch_kind = evaluation.patch_kind.or(control.patch_kind).ok_or_else(|| {
            PipelineCreationError::ShaderReflectionFailed {
                stage: ShaderStage::TessellationEvaluation,
                problem: "neither tessellation shader specifies a patch input mode".into(),
            }
        })?;

        if patch_kind == TessellationPatchKind::Isolines {
            return Err(PipelineCreationError::FeatureNotPresent {
                problem: "isoline tessellation".into(),
            });
        }

        let output_control_points = control
            .output_vertices
            .or(evaluation.output_vertices)
            .ok_or_else(|| PipelineCreationError::ShaderReflectionFailed {
                stage: ShaderStage::TessellationControl,
                problem: "neither tessellation shader specifies the number of output control \
                    points"
                    .into(),
            })?;

        Ok(TessellationInfo {
            patch_kind,
            vertex_order: evaluation
                .vertex_order
                .or(control.vertex_order)
                .unwrap_or(TessellationVertexOrder::CounterClockwise),
            spacing: evaluation
                .spacing
                .or(control.spacing)
                .unwrap_or(TessellationSpacing::Equal),
            point_mode: control.point_mode || evaluation.point_mode,
            output_control_points,
        })
    }

    /// Returns the configuration of the native tessellator.
    pub(crate) fn descriptor(
        &self,
        domain_origin: TessellationDomainOrigin,
        max_tessellation_factor: u32,
    ) -> TessellationDescriptor {
        // Vertex Y is flipped by the converted shaders, which reverses the apparent order.
        let winding = match self.vertex_order {
            TessellationVertexOrder::Clockwise => Winding::CounterClockwise,
            TessellationVertexOrder::CounterClockwise => Winding::Clockwise,
        };
        let winding = match domain_origin {
            TessellationDomainOrigin::UpperLeft => winding,
            TessellationDomainOrigin::LowerLeft => winding.reversed(),
        };

        TessellationDescriptor {
            max_tessellation_factor,
            factor_format: TessellationFactorFormat::Half,
            control_point_index_type: TessellationControlPointIndexType::UInt32,
            factor_step_function: TessellationFactorStepFunction::PerPatch,
            output_winding_order: winding,
            partition_mode: match self.spacing {
                TessellationSpacing::Equal => TessellationPartitionMode::Integer,
                TessellationSpacing::FractionalEven => TessellationPartitionMode::FractionalEven,
                TessellationSpacing::FractionalOdd => TessellationPartitionMode::FractionalOdd,
            },
        }
    }

    /// Returns the size of the tessellation levels of one patch, as half floats.
    #[inline]
    pub(crate) fn level_stride(&self) -> u32 {
        match self.patch_kind {
            TessellationPatchKind::Quads => 12,
            _ => 8,
        }
    }
}

/// One output of a stage, placed in the buffer that the next pass reads it from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CapturedOutput {
    pub(crate) output: ShaderOutput,
    pub(crate) offset: u32,
    pub(crate) format: VertexFormat,
}

/// The layout of one element of a buffer that passes outputs between passes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CapturedLayout {
    pub(crate) buffer_index: u32,
    pub(crate) outputs: Vec<CapturedOutput>,
    pub(crate) stride: u32,
}

impl CapturedLayout {
    /// Lays out `outputs` in order, each aligned to its own size. The stride is rounded up to the
    /// largest alignment.
    pub(crate) fn new<'a>(
        stage: ShaderStage,
        buffer_index: u32,
        outputs: impl IntoIterator<Item = &'a ShaderOutput>,
    ) -> Result<Self, PipelineCreationError> {
        let mut captured = Vec::new();
        let mut offset: u32 = 0;
        let mut max_alignment: u32 = 1;

        for output in outputs {
            let format = captured_vertex_format(output).ok_or_else(|| {
                PipelineCreationError::ShaderReflectionFailed {
                    stage,
                    problem: format!(
                        "the output at location {} has a type that can't be passed between passes",
                        output.location,
                    )
                    .into(),
                }
            })?;

            let alignment = output.alignment();
            offset = offset.next_multiple_of(alignment);
            max_alignment = max_alignment.max(alignment);

            captured.push(CapturedOutput {
                output: *output,
                offset,
                format,
            });
            offset += output.size();
        }

        Ok(CapturedLayout {
            buffer_index,
            outputs: captured,
            stride: offset.next_multiple_of(max_alignment),
        })
    }

    /// Returns the inputs that describe the buffer to the shader converter of the reading stage.
    pub(crate) fn conversion_attributes(&self) -> impl Iterator<Item = VertexAttribute> + '_ {
        self.outputs.iter().map(|captured| VertexAttribute {
            location: captured.output.location,
            msl_buffer: self.buffer_index,
            offset: captured.offset,
            stride: self.stride,
            is_per_instance: false,
            format: VertexAttributeFormat::from(captured.output.base_type),
            builtin: captured.output.builtin,
            vec_width: captured.output.vec_width,
            is_used_by_shader: false,
        })
    }

    /// Returns the native attributes for the outputs that are both written and read, keyed by
    /// location.
    pub(crate) fn native_attributes(
        &self,
        is_location_used: impl Fn(u32) -> bool,
    ) -> BTreeMap<u32, AttributeDescriptor> {
        self.outputs
            .iter()
            .filter(|captured| captured.output.is_used && is_location_used(captured.output.location))
            .map(|captured| {
                (
                    captured.output.location,
                    AttributeDescriptor {
                        format: captured.format,
                        offset: captured.offset,
                        buffer_index: self.buffer_index,
                    },
                )
            })
            .collect()
    }

    /// Returns the native layout of the buffer, or `None` if nothing is passed through it.
    pub(crate) fn native_layout(
        &self,
        step_function: VertexStepFunction,
    ) -> Option<VertexBufferLayoutDescriptor> {
        (!self.outputs.is_empty()).then_some(VertexBufferLayoutDescriptor {
            stride: self.stride,
            step_function,
            step_rate: 1,
        })
    }
}

/// Describes the tessellation levels written by the control pass, as the raster pass reads them.
///
/// Outer levels come first. Triangles have three outer levels and one inner level, quads have
/// four and two.
pub(crate) fn level_attributes(
    info: &TessellationInfo,
    outputs: &[ShaderOutput],
) -> BTreeMap<u32, AttributeDescriptor> {
    let is_quads = info.patch_kind == TessellationPatchKind::Quads;

    outputs
        .iter()
        .filter_map(|output| {
            let (format, offset) = match (output.builtin, is_quads) {
                (Some(BuiltIn::TessLevelOuter), true) => (VertexFormat::Half4, 0),
                (Some(BuiltIn::TessLevelOuter), false) => (VertexFormat::Half3, 0),
                (Some(BuiltIn::TessLevelInner), true) => (VertexFormat::Half2, 8),
                (Some(BuiltIn::TessLevelInner), false) => (VertexFormat::Half, 6),
                _ => return None,
            };

            Some((
                output.location,
                AttributeDescriptor {
                    format,
                    offset,
                    buffer_index: TESS_LEVEL_BUFFER_INDEX,
                },
            ))
        })
        .collect()
}

/// Returns whether `output` is a tessellation level, which is passed in its own buffer.
#[inline]
pub(crate) fn is_level(output: &ShaderOutput) -> bool {
    matches!(
        output.builtin,
        Some(BuiltIn::TessLevelOuter | BuiltIn::TessLevelInner)
    )
}

fn captured_vertex_format(output: &ShaderOutput) -> Option<VertexFormat> {
    // Three-component vectors of small types are captured padded to four.
    Some(match (output.base_type, output.vec_width) {
        (ShaderBaseType::Float, 1) => VertexFormat::Float,
        (ShaderBaseType::Float, 2) => VertexFormat::Float2,
        (ShaderBaseType::Float, 3) => VertexFormat::Float3,
        (ShaderBaseType::Float, 4) => VertexFormat::Float4,
        (ShaderBaseType::Half, 1) => VertexFormat::Half,
        (ShaderBaseType::Half, 2) => VertexFormat::Half2,
        (ShaderBaseType::Half, 3) => VertexFormat::Half3,
        (ShaderBaseType::Half, 4) => VertexFormat::Half4,
        (ShaderBaseType::Int, 1) => VertexFormat::Int,
        (ShaderBaseType::Int, 2) => VertexFormat::Int2,
        (ShaderBaseType::Int, 3) => VertexFormat::Int3,
        (ShaderBaseType::Int, 4) => VertexFormat::Int4,
        (ShaderBaseType::UInt | ShaderBaseType::Boolean, 1) => VertexFormat::UInt,
        (ShaderBaseType::UInt | ShaderBaseType::Boolean, 2) => VertexFormat::UInt2,
        (ShaderBaseType::UInt | ShaderBaseType::Boolean, 3) => VertexFormat::UInt3,
        (ShaderBaseType::UInt | ShaderBaseType::Boolean, 4) => VertexFormat::UInt4,
        (ShaderBaseType::Short, 1) => VertexFormat::Short,
        (ShaderBaseType::Short, 2) => VertexFormat::Short2,
        (ShaderBaseType::Short, 3 | 4) => VertexFormat::Short4,
        (ShaderBaseType::UShort, 1) => VertexFormat::UShort,
        (ShaderBaseType::UShort, 2) => VertexFormat::UShort2,
        (ShaderBaseType::UShort, 3 | 4) => VertexFormat::UShort4,
        (ShaderBaseType::SByte, 1) => VertexFormat::Char,
        (ShaderBaseType::SByte, 2) => VertexFormat::Char2,
        (ShaderBaseType::SByte, 3 | 4) => VertexFormat::Char4,
        (ShaderBaseType::UByte, 1) => VertexFormat::UChar,
        (ShaderBaseType::UByte, 2) => VertexFormat::UChar2,
        (ShaderBaseType::UByte, 3 | 4) => VertexFormat::UChar4,
        _ => return None,
    })
}
