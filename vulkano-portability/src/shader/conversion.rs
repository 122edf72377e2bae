// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The contract with the external SPIR-V to MSL converter.
//!
//! The converter itself is not part of this crate. Pipelines describe everything that affects the
//! generated source in a [`ShaderConversionContext`], the converter fills in which of the
//! described vertex attributes and resources the shader really uses, and returns the MSL in a
//! [`ShaderLibrary`].
//!
//! Two conversions of the same module may share their output when their contexts *match*: the
//! options are identical, and every attribute and resource the earlier conversion found in use is
//! described identically in the later context. Attributes and resources the shader ignores don't
//! affect the output, so they are free to differ.

use super::{
    BuiltIn, ShaderBaseType, ShaderLibrary, ShaderStage, TessellationPatchKind,
    WorkgroupDimension,
};
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
};

/// The descriptor set number that push constants are described with.
pub const PUSH_CONSTANT_DESCRIPTOR_SET: u32 = u32::MAX;
/// The binding number that push constants are described with.
pub const PUSH_CONSTANT_BINDING: u32 = 0;

/// Converts SPIR-V into MSL.
pub trait ShaderConverter: Send + Sync + 'static {
    /// Converts the entry point named in `context.options`.
    ///
    /// The implementation must set `is_used_by_shader` on the vertex attributes and resource
    /// bindings of `context` that the generated code accesses. On failure, the returned string is
    /// the diagnostic.
    fn convert(
        &self,
        spirv: &[u32],
        context: &mut ShaderConversionContext,
    ) -> Result<ShaderLibrary, String>;
}

/// Everything that affects the MSL generated for one entry point.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderConversionContext {
    pub options: ShaderConversionOptions,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub resource_bindings: Vec<ResourceBinding>,
}

impl ShaderConversionContext {
    /// Returns whether a conversion made under `self` can serve a request made with `other`.
    pub fn matches(&self, other: &ShaderConversionContext) -> bool {
        if self.options != other.options {
            return false;
        }

        let attributes_match = self
            .vertex_attributes
            .iter()
            .filter(|attribute| attribute.is_used_by_shader)
            .all(|attribute| {
                other
                    .vertex_attributes
                    .iter()
                    .any(|other| attribute.matches(other))
            });

        let bindings_match = self
            .resource_bindings
            .iter()
            .filter(|binding| binding.is_used_by_shader)
            .all(|binding| {
                other
                    .resource_bindings
                    .iter()
                    .any(|other| binding.matches(other))
            });

        attributes_match && bindings_match
    }

    /// Copies the usage flags of `source`, a matching context, into `self`.
    pub fn align_with(&mut self, source: &ShaderConversionContext) {
        for attribute in &mut self.vertex_attributes {
            attribute.is_used_by_shader = source
                .vertex_attributes
                .iter()
                .any(|other| other.is_used_by_shader && other.matches(attribute));
        }

        for binding in &mut self.resource_bindings {
            binding.is_used_by_shader = source
                .resource_bindings
                .iter()
                .any(|other| other.is_used_by_shader && other.matches(binding));
        }
    }

    /// Returns whether the shader reads the vertex attribute or stage input at `location`.
    pub fn is_vertex_attribute_location_used(&self, location: u32) -> bool {
        self.vertex_attributes
            .iter()
            .any(|attribute| attribute.location == location && attribute.is_used_by_shader)
    }

    /// Returns whether the shader of `stage` accesses the given descriptor binding.
    pub fn is_resource_used(&self, stage: ShaderStage, descriptor_set: u32, binding: u32) -> bool {
        self.resource_bindings.iter().any(|rb| {
            rb.stage == stage
                && rb.descriptor_set == descriptor_set
                && rb.binding == binding
                && rb.is_used_by_shader
        })
    }
}

/// Options of a conversion.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderConversionOptions {
    pub entry_point_name: String,
    pub entry_point_stage: ShaderStage,
    pub msl_version: u32,
    pub texel_buffer_texture_width: u32,

    pub aux_buffer_index: u32,
    pub indirect_params_buffer_index: u32,
    pub output_buffer_index: u32,
    pub patch_output_buffer_index: u32,
    pub tess_level_buffer_index: u32,
    pub input_threadgroup_mem_index: u32,

    pub tess_patch_kind: Option<TessellationPatchKind>,
    pub num_tess_control_points: u32,
    pub tess_domain_origin_in_lower_left: bool,

    pub should_flip_vertex_y: bool,
    pub should_swizzle_texture_samples: bool,

    /// Whether the stage writes its outputs to the captured-output buffer instead of passing
    /// them down the pipeline.
    pub should_capture_output: bool,
    pub is_rendering_points: bool,
    pub is_rasterization_disabled: bool,
}

impl Default for ShaderConversionOptions {
    #[inline]
    fn default() -> Self {
        Self {
            entry_point_name: String::from("main"),
            entry_point_stage: ShaderStage::Vertex,
            msl_version: 0,
            texel_buffer_texture_width: 0,
            aux_buffer_index: 0,
            indirect_params_buffer_index: 0,
            output_buffer_index: 0,
            patch_output_buffer_index: 0,
            tess_level_buffer_index: 0,
            input_threadgroup_mem_index: 0,
            tess_patch_kind: None,
            num_tess_control_points: 0,
            tess_domain_origin_in_lower_left: false,
            should_flip_vertex_y: true,
            should_swizzle_texture_samples: false,
            should_capture_output: false,
            is_rendering_points: false,
            is_rasterization_disabled: false,
        }
    }
}

/// A vertex attribute, or an input fed by the previous stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub msl_buffer: u32,
    pub offset: u32,
    pub stride: u32,
    pub is_per_instance: bool,
    pub format: VertexAttributeFormat,
    pub builtin: Option<BuiltIn>,
    pub vec_width: u32,

    /// Set by the converter.
    pub is_used_by_shader: bool,
}

impl VertexAttribute {
    /// Returns whether `self` and `other` describe the same attribute, ignoring usage.
    pub fn matches(&self, other: &VertexAttribute) -> bool {
        let &Self {
            location,
            msl_buffer,
            offset,
            stride,
            is_per_instance,
            format,
            builtin,
            vec_width,
            is_used_by_shader: _,
        } = self;

        location == other.location
            && msl_buffer == other.msl_buffer
            && offset == other.offset
            && stride == other.stride
            && is_per_instance == other.is_per_instance
            && format == other.format
            && builtin == other.builtin
            && vec_width == other.vec_width
    }
}

/// How the converter must read an attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    #[default]
    Other,
    UInt8,
    UInt16,
}

impl From<ShaderBaseType> for VertexAttributeFormat {
    #[inline]
    fn from(val: ShaderBaseType) -> Self {
        match val {
            ShaderBaseType::UByte => Self::UInt8,
            ShaderBaseType::UShort => Self::UInt16,
            _ => Self::Other,
        }
    }
}

/// Where a descriptor binding, or the push constants, live in one stage's native slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    pub stage: ShaderStage,
    pub descriptor_set: u32,
    pub binding: u32,
    pub count: u32,
    pub msl_buffer: u32,
    pub msl_texture: u32,
    pub msl_sampler: u32,

    /// Set by the converter.
    pub is_used_by_shader: bool,
}

impl ResourceBinding {
    /// Returns whether `self` and `other` describe the same binding, ignoring usage.
    pub fn matches(&self, other: &ResourceBinding) -> bool {
        let &Self {
            stage,
            descriptor_set,
            binding,
            count,
            msl_buffer,
            msl_texture,
            msl_sampler,
            is_used_by_shader: _,
        } = self;

        stage == other.stage
            && descriptor_set == other.descriptor_set
            && binding == other.binding
            && count == other.count
            && msl_buffer == other.msl_buffer
            && msl_texture == other.msl_texture
            && msl_sampler == other.msl_sampler
    }
}

/// What the converter found the generated code to need, beyond the declared resources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderConversionResults {
    pub is_rasterization_disabled: bool,
    pub needs_aux_buffer: bool,
    pub needs_output_buffer: bool,
    pub needs_patch_output_buffer: bool,
    pub needs_input_threadgroup_mem: bool,
}

/// The entry point of a converted library.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderEntryPoint {
    /// The MSL name of the function.
    pub name: String,
    pub workgroup_size: [WorkgroupDimension; 3],
}

impl Default for ShaderEntryPoint {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::from("main0"),
            workgroup_size: [WorkgroupDimension::ONE; 3],
        }
    }
}

/// The converter failed to produce MSL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderConversionError {
    pub entry_point_name: String,
    pub message: String,
}

impl Error for ShaderConversionError {}

impl Display for ShaderConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "unable to convert entry point `{}` to MSL: {}",
            self.entry_point_name, self.message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(binding: u32, msl_buffer: u32, used: bool) -> ResourceBinding {
        ResourceBinding {
            stage: ShaderStage::Vertex,
            descriptor_set: 0,
            binding,
            count: 1,
            msl_buffer,
            msl_texture: 0,
            msl_sampler: 0,
            is_used_by_shader: used,
        }
    }

    #[test]
    fn unused_bindings_dont_affect_matching() {
        let stored = ShaderConversionContext {
            resource_bindings: vec![binding(0, 0, true), binding(1, 1, false)],
            ..Default::default()
        };

        // Binding 1 moved, but the stored conversion never used it.
        let incoming = ShaderConversionContext {
            resource_bindings: vec![binding(0, 0, false), binding(1, 5, false)],
            ..Default::default()
        };
        assert!(stored.matches(&incoming));

        // Binding 0 moved, and the stored conversion reads it.
        let moved = ShaderConversionContext {
            resource_bindings: vec![binding(0, 3, false), binding(1, 1, false)],
            ..Default::default()
        };
        assert!(!stored.matches(&moved));
    }

    #[test]
    fn options_must_be_equal() {
        let stored = ShaderConversionContext::default();
        let mut incoming = ShaderConversionContext::default();
        assert!(stored.matches(&incoming));

        incoming.options.aux_buffer_index = 9;
        assert!(!stored.matches(&incoming));
    }

    #[test]
    fn align_copies_usage() {
        let stored = ShaderConversionContext {
            resource_bindings: vec![binding(0, 0, true), binding(1, 1, false)],
            ..Default::default()
        };
        let mut incoming = ShaderConversionContext {
            resource_bindings: vec![binding(0, 0, false), binding(1, 1, true)],
            ..Default::default()
        };

        incoming.align_with(&stored);
        assert!(incoming.is_resource_used(ShaderStage::Vertex, 0, 0));
        assert!(!incoming.is_resource_used(ShaderStage::Vertex, 0, 1));
    }
}
