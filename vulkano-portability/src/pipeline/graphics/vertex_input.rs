// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Configuration of vertex input.
//!
//! The vertex input stage is the stage where the GPU fetches the data of each vertex from vertex
//! buffers. Each *binding* is a vertex buffer, and each *attribute* reads one shader input
//! location from a binding.
//!
//! # Native buffer slots
//!
//! The native backend has no separate vertex buffer table: vertex buffers share the buffer slots
//! of the vertex stage with descriptor resources. Vertex buffers are placed at the top of the
//! table, so that binding `b` occupies native buffer `max_per_stage_buffer_count - 1 - b`, while
//! descriptor resources and implicit buffers grow from the bottom. A pipeline can be created only
//! if the two ranges don't meet.

use crate::{
    backend::descriptor::VertexFormat, shader::conversion::VertexAttributeFormat, Format,
    ValidationError,
};
use foldhash::HashMap;

/// Defines how the vertex input stage fetches vertices.
#[derive(Clone, Debug)]
pub struct VertexInputState {
    /// A description of the vertex buffers that the vertex input stage will read from.
    pub bindings: HashMap<u32, VertexInputBindingDescription>,

    /// Describes, for each shader input location, the mapping between elements in a vertex buffer
    /// and the components of that location in the shader.
    pub attributes: HashMap<u32, VertexInputAttributeDescription>,

    pub _ne: crate::NonExhaustive,
}

impl VertexInputState {
    /// Constructs a new `VertexInputState` with no bindings or attributes.
    #[inline]
    pub fn new() -> VertexInputState {
        VertexInputState {
            bindings: Default::default(),
            attributes: Default::default(),
            _ne: crate::NonExhaustive(()),
        }
    }

    /// Adds a single binding.
    #[inline]
    pub fn binding(mut self, binding: u32, description: VertexInputBindingDescription) -> Self {
        self.bindings.insert(binding, description);
        self
    }

    /// Adds a single attribute.
    #[inline]
    pub fn attribute(
        mut self,
        location: u32,
        description: VertexInputAttributeDescription,
    ) -> Self {
        self.attributes.insert(location, description);
        self
    }

    /// Returns the native buffer slot of `binding`.
    #[inline]
    pub(crate) fn native_buffer_index(binding: u32, max_per_stage_buffer_count: u32) -> u32 {
        max_per_stage_buffer_count - 1 - binding
    }

    pub(crate) fn validate(
        &self,
        max_per_stage_buffer_count: u32,
    ) -> Result<(), Box<ValidationError>> {
        let Self {
            bindings,
            attributes,
            _ne: _,
        } = self;

        for (&binding, binding_desc) in bindings {
            if binding >= max_per_stage_buffer_count {
                return Err(Box::new(ValidationError {
                    context: "bindings".into(),
                    problem: format!(
                        "the binding number {} exceeds the number of vertex stage buffer slots",
                        binding,
                    )
                    .into(),
                    vuids: &["VUID-VkVertexInputBindingDescription-binding-00618"],
                }));
            }

            binding_desc
                .validate()
                .map_err(|err| err.add_context(format!("bindings[{}]", binding)))?;
        }

        for (&location, attribute_desc) in attributes {
            if !bindings.contains_key(&attribute_desc.binding) {
                return Err(Box::new(ValidationError {
                    problem: format!(
                        "`attributes[{}].binding` is not present in `bindings`",
                        location,
                    )
                    .into(),
                    vuids: &["VUID-VkPipelineVertexInputStateCreateInfo-binding-00615"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

impl Default for VertexInputState {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Describes a single vertex buffer binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexInputBindingDescription {
    /// The number of bytes from the start of one element in the vertex buffer to the start of the
    /// next element.
    ///
    /// The native backend requires a multiple of 4. A stride of 0 makes every vertex read the
    /// same element.
    pub stride: u32,

    /// How often the vertex input should advance to the next element.
    pub input_rate: VertexInputRate,
}

impl VertexInputBindingDescription {
    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        if self.stride > i32::MAX as u32 {
            return Err(Box::new(ValidationError {
                context: "stride".into(),
                problem: "is too large".into(),
                vuids: &["VUID-VkVertexInputBindingDescription-stride-00619"],
            }));
        }

        Ok(())
    }
}

/// Describes a single vertex buffer attribute mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexInputAttributeDescription {
    /// The vertex buffer binding number that this attribute should take its data from.
    pub binding: u32,

    /// The size and type of the vertex data.
    pub format: Format,

    /// Number of bytes between the start of a vertex buffer element and the location of attribute.
    pub offset: u32,
}

/// How the vertex source should be unrolled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexInputRate {
    /// Each element of the source corresponds to a vertex.
    Vertex,

    /// Each element of the source corresponds to an instance.
    ///
    /// `divisor` indicates how many consecutive instances will use the same instance buffer data.
    /// A `divisor` of 0 makes every instance use the same data.
    Instance { divisor: u32 },
}

/// Returns the native vertex format that reads `format`, if there is one.
pub(crate) fn native_vertex_format(format: Format) -> Option<VertexFormat> {
    Some(match format {
        Format::R8_UINT => VertexFormat::UChar,
        Format::R8G8_UINT => VertexFormat::UChar2,
        Format::R8G8B8A8_UINT => VertexFormat::UChar4,
        Format::R8_SINT => VertexFormat::Char,
        Format::R8G8_SINT => VertexFormat::Char2,
        Format::R8G8B8A8_SINT => VertexFormat::Char4,
        Format::R8_UNORM => VertexFormat::UCharNormalized,
        Format::R8G8_UNORM => VertexFormat::UChar2Normalized,
        Format::R8G8B8A8_UNORM => VertexFormat::UChar4Normalized,
        Format::B8G8R8A8_UNORM => VertexFormat::UChar4NormalizedBgra,
        Format::R8_SNORM => VertexFormat::CharNormalized,
        Format::R8G8_SNORM => VertexFormat::Char2Normalized,
        Format::R8G8B8A8_SNORM => VertexFormat::Char4Normalized,
        Format::R16_UINT => VertexFormat::UShort,
        Format::R16G16_UINT => VertexFormat::UShort2,
        Format::R16G16B16A16_UINT => VertexFormat::UShort4,
        Format::R16_SINT => VertexFormat::Short,
        Format::R16G16_SINT => VertexFormat::Short2,
        Format::R16G16B16A16_SINT => VertexFormat::Short4,
        Format::R16_UNORM => VertexFormat::UShortNormalized,
        Format::R16G16_UNORM => VertexFormat::UShort2Normalized,
        Format::R16G16B16A16_UNORM => VertexFormat::UShort4Normalized,
        Format::R16_SNORM => VertexFormat::ShortNormalized,
        Format::R16G16_SNORM => VertexFormat::Short2Normalized,
        Format::R16G16B16A16_SNORM => VertexFormat::Short4Normalized,
        Format::R16_SFLOAT => VertexFormat::Half,
        Format::R16G16_SFLOAT => VertexFormat::Half2,
        Format::R16G16B16_SFLOAT => VertexFormat::Half3,
        Format::R16G16B16A16_SFLOAT => VertexFormat::Half4,
        Format::R32_SFLOAT => VertexFormat::Float,
        Format::R32G32_SFLOAT => VertexFormat::Float2,
        Format::R32G32B32_SFLOAT => VertexFormat::Float3,
        Format::R32G32B32A32_SFLOAT => VertexFormat::Float4,
        Format::R32_SINT => VertexFormat::Int,
        Format::R32G32_SINT => VertexFormat::Int2,
        Format::R32G32B32_SINT => VertexFormat::Int3,
        Format::R32G32B32A32_SINT => VertexFormat::Int4,
        Format::R32_UINT => VertexFormat::UInt,
        Format::R32G32_UINT => VertexFormat::UInt2,
        Format::R32G32B32_UINT => VertexFormat::UInt3,
        Format::R32G32B32A32_UINT => VertexFormat::UInt4,
        Format::A2B10G10R10_SNORM_PACK32 => VertexFormat::Int1010102Normalized,
        Format::A2B10G10R10_UNORM_PACK32 => VertexFormat::UInt1010102Normalized,
        _ => return None,
    })
}

/// Returns how the shader converter must read an attribute of `format`.
pub(crate) fn shader_attribute_format(format: Format) -> VertexAttributeFormat {
    match format {
        Format::R8_UINT | Format::R8G8_UINT | Format::R8G8B8A8_UINT => VertexAttributeFormat::UInt8,
        Format::R16_UINT | Format::R16G16_UINT | Format::R16G16B16A16_UINT => {
            VertexAttributeFormat::UInt16
        }
        _ => VertexAttributeFormat::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_needs_binding() {
        let state = VertexInputState::new()
            .binding(
                0,
                VertexInputBindingDescription {
                    stride: 16,
                    input_rate: VertexInputRate::Vertex,
                },
            )
            .attribute(
                1,
                VertexInputAttributeDescription {
                    binding: 1,
                    format: Format::R32G32B32A32_SFLOAT,
                    offset: 0,
                },
            );
        assert!(state.validate(31).is_err());

        let state = state.binding(
            1,
            VertexInputBindingDescription {
                stride: 16,
                input_rate: VertexInputRate::Instance { divisor: 1 },
            },
        );
        assert!(state.validate(31).is_ok());
        assert!(state.validate(1).is_err());
        assert_eq!(VertexInputState::native_buffer_index(1, 31), 29);
    }

    #[test]
    fn formats() {
        assert_eq!(
            native_vertex_format(Format::B8G8R8A8_UNORM),
            Some(VertexFormat::UChar4NormalizedBgra),
        );
        assert_eq!(native_vertex_format(Format::R8G8B8_UNORM), None);
        assert_eq!(native_vertex_format(Format::R64_SFLOAT), None);
        assert_eq!(
            shader_attribute_format(Format::R16G16_UINT),
            VertexAttributeFormat::UInt16,
        );
        assert_eq!(
            shader_attribute_format(Format::R16G16_SFLOAT),
            VertexAttributeFormat::Other,
        );
    }
}
