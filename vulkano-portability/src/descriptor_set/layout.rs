// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Describes the layout of all descriptors within a descriptor set.
//!
//! Each layout also knows how many native buffer, texture and sampler slots its bindings take in
//! every shader stage, and where each binding starts relative to the start of the set.

use super::{DescriptorResource, DescriptorSet};
use crate::{
    backend::NativeHandle,
    command_buffer::CommandEncoder,
    device::{Device, DeviceOwned},
    macros::{impl_id_counter, vulkan_bitflags, vulkan_enum},
    shader::{NativeShaderStage, ShaderStages},
    ValidationError,
};
use std::{collections::BTreeMap, num::NonZero, ops::Add, sync::Arc};

/// Describes the layout of all descriptors within a descriptor set.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    id: NonZero<u64>,

    flags: DescriptorSetLayoutCreateFlags,
    bindings: BTreeMap<u32, DescriptorSetLayoutBinding>,

    binding_resource_indices: BTreeMap<u32, ShaderResourceIndices>,
    resource_counts: ShaderResourceIndices,
    dynamic_descriptor_count: u32,
}

impl DescriptorSetLayout {
    /// Creates a new `DescriptorSetLayout`.
    pub fn new(
        device: Arc<Device>,
        create_info: DescriptorSetLayoutCreateInfo,
    ) -> Result<Arc<DescriptorSetLayout>, Box<ValidationError>> {
        create_info
            .validate()
            .map_err(|err| err.add_context("create_info"))?;

        let DescriptorSetLayoutCreateInfo {
            flags,
            bindings,
            _ne: _,
        } = create_info;

        let mut binding_resource_indices = BTreeMap::new();
        let mut resource_counts = ShaderResourceIndices::default();
        let mut dynamic_descriptor_count = 0;

        for (&binding_num, binding) in &bindings {
            binding_resource_indices.insert(binding_num, resource_counts);

            for stage in binding.native_stages() {
                let counts = &mut resource_counts.stages[stage.index()];
                let consumed = binding.resources_per_stage();
                counts.buffer += consumed.buffer;
                counts.texture += consumed.texture;
                counts.sampler += consumed.sampler;
            }

            if binding.descriptor_type.is_dynamic() {
                dynamic_descriptor_count += binding.descriptor_count;
            }
        }

        Ok(Arc::new(DescriptorSetLayout {
            device,
            id: Self::next_id(),
            flags,
            bindings,
            binding_resource_indices,
            resource_counts,
            dynamic_descriptor_count,
        }))
    }

    /// Returns the flags that the descriptor set layout was created with.
    #[inline]
    pub fn flags(&self) -> DescriptorSetLayoutCreateFlags {
        self.flags
    }

    /// Returns the bindings of the descriptor set layout.
    #[inline]
    pub fn bindings(&self) -> &BTreeMap<u32, DescriptorSetLayoutBinding> {
        &self.bindings
    }

    /// Returns the native slots taken by the whole set, per stage.
    #[inline]
    pub fn resource_counts(&self) -> &ShaderResourceIndices {
        &self.resource_counts
    }

    /// Returns where a binding starts, per stage, relative to the start of the set.
    #[inline]
    pub fn binding_resource_indices(&self, binding: u32) -> Option<&ShaderResourceIndices> {
        self.binding_resource_indices.get(&binding)
    }

    /// Returns the number of dynamic buffer descriptors, each of which consumes one dynamic
    /// offset when the set is bound.
    #[inline]
    pub fn dynamic_descriptor_count(&self) -> u32 {
        self.dynamic_descriptor_count
    }

    /// Returns whether `self` is compatible with `other`.
    ///
    /// Either the two are the same descriptor set layout object, or they are identically
    /// defined.
    #[inline]
    pub fn is_compatible_with(&self, other: &DescriptorSetLayout) -> bool {
        self == other || (self.flags == other.flags && self.bindings == other.bindings)
    }

    /// Copies the contents of `set` into the native slots starting at `set_offsets`.
    ///
    /// `dynamic_offsets` must hold at least `self.dynamic_descriptor_count()` values; that many are
    /// consumed from its front.
    pub(crate) fn bind(
        &self,
        encoder: &mut dyn CommandEncoder,
        set: &dyn DescriptorSet,
        set_offsets: &ShaderResourceIndices,
        dynamic_offsets: &mut impl Iterator<Item = u32>,
    ) -> Result<(), Box<ValidationError>> {
        for (&binding_num, binding) in &self.bindings {
            let element_count = if binding.descriptor_type == DescriptorType::InlineUniformBlock {
                1
            } else {
                binding.descriptor_count
            };

            for element in 0..element_count {
                let dynamic_offset = if binding.descriptor_type.is_dynamic() {
                    dynamic_offsets.next().unwrap_or(0)
                } else {
                    0
                };

                self.write_resource(
                    encoder,
                    set_offsets,
                    binding_num,
                    element,
                    set.resource(binding_num, element),
                    dynamic_offset,
                )
                .map_err(|err| {
                    err.add_context(format!("bindings[{}][{}]", binding_num, element))
                })?;
            }
        }

        Ok(())
    }

    /// Checks that `resource` may be written to an element of a binding.
    pub(crate) fn validate_resource(
        &self,
        binding_num: u32,
        element: u32,
        resource: &DescriptorResource,
    ) -> Result<(), Box<ValidationError>> {
        let binding = self.bindings.get(&binding_num).ok_or_else(|| {
            Box::new(ValidationError {
                problem: format!("binding {} does not exist in the layout", binding_num).into(),
                ..Default::default()
            })
        })?;

        if element >= binding.descriptor_count {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "array element {} is out of range for a binding of {} descriptors",
                    element, binding.descriptor_count,
                )
                .into(),
                ..Default::default()
            }));
        }

        if !binding.descriptor_type.accepts(resource) {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "the resource can't be written to a binding of type {:?}",
                    binding.descriptor_type,
                )
                .into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Writes one element of a binding into the slots of every stage the binding is visible to.
    pub(crate) fn write_resource(
        &self,
        encoder: &mut dyn CommandEncoder,
        set_offsets: &ShaderResourceIndices,
        binding_num: u32,
        element: u32,
        resource: Option<&DescriptorResource>,
        dynamic_offset: u32,
    ) -> Result<(), Box<ValidationError>> {
        let Some(binding) = self.bindings.get(&binding_num) else {
            return Ok(());
        };
        let immutable_sampler = binding.immutable_samplers.get(element as usize).copied();

        if let Some(resource) = resource {
            self.validate_resource(binding_num, element, resource)?;
        } else if immutable_sampler.is_none() {
            // Never written.
            return Ok(());
        }

        let binding_start = set_offsets + &self.binding_resource_indices[&binding_num];

        for stage in binding.native_stages() {
            let start = binding_start.stages[stage.index()];

            match resource {
                Some(DescriptorResource::Buffer(buffer)) => {
                    let mut buffer = *buffer;
                    buffer.offset += u64::from(dynamic_offset);
                    encoder.set_buffer(stage, start.buffer + element, buffer);
                }
                Some(DescriptorResource::InlineUniformBlock(bytes)) => {
                    encoder.set_bytes(stage, start.buffer, bytes);
                }
                Some(&DescriptorResource::Texture(texture)) => {
                    encoder.set_texture(stage, start.texture + element, texture);
                }
                Some(&DescriptorResource::Sampler(sampler)) => {
                    let sampler = immutable_sampler.unwrap_or(sampler);
                    encoder.set_sampler(stage, start.sampler + element, sampler);
                }
                Some(&DescriptorResource::CombinedImageSampler { texture, sampler }) => {
                    let sampler = immutable_sampler.unwrap_or(sampler);
                    encoder.set_texture(stage, start.texture + element, texture);
                    encoder.set_sampler(stage, start.sampler + element, sampler);
                }
                None => {
                    if let Some(sampler) = immutable_sampler {
                        encoder.set_sampler(stage, start.sampler + element, sampler);
                    }
                }
            }
        }

        Ok(())
    }
}

impl DeviceOwned for DescriptorSetLayout {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl_id_counter!(DescriptorSetLayout);

/// Parameters to create a new `DescriptorSetLayout`.
#[derive(Clone, Debug)]
pub struct DescriptorSetLayoutCreateInfo {
    /// Specifies how to create the descriptor set layout.
    ///
    /// The default value is empty.
    pub flags: DescriptorSetLayoutCreateFlags,

    /// The bindings of the desriptor set layout. These are specified according to binding number.
    ///
    /// The default value is empty.
    pub bindings: BTreeMap<u32, DescriptorSetLayoutBinding>,

    pub _ne: crate::NonExhaustive,
}

impl Default for DescriptorSetLayoutCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: DescriptorSetLayoutCreateFlags::empty(),
            bindings: BTreeMap::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DescriptorSetLayoutCreateInfo {
    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            flags,
            ref bindings,
            _ne: _,
        } = self;

        for (&binding_num, binding) in bindings {
            binding
                .validate()
                .map_err(|err| err.add_context(format!("bindings[{}]", binding_num)))?;

            if flags.intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR) {
                if binding.descriptor_type.is_dynamic() {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "`flags` contains `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`, \
                            and `bindings[{}].descriptor_type` is \
                            `DescriptorType::UniformBufferDynamic` or \
                            `DescriptorType::StorageBufferDynamic`",
                            binding_num,
                        )
                        .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-00280"],
                        ..Default::default()
                    }));
                }

                if binding.descriptor_type == DescriptorType::InlineUniformBlock {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "`flags` contains `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`, \
                            and `bindings[{}].descriptor_type` is \
                            `DescriptorType::InlineUniformBlock`",
                            binding_num,
                        )
                        .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-02208"],
                        ..Default::default()
                    }));
                }
            }
        }

        Ok(())
    }
}

vulkan_bitflags! {
    /// Flags that control how a descriptor set layout is created.
    DescriptorSetLayoutCreateFlags = DescriptorSetLayoutCreateFlags(u32);

    /// Whether the descriptor set layout should be created for push descriptors.
    ///
    /// If set, the layout can only be used for push descriptors, and if not set, it can only
    /// be used for regular descriptor sets. There must be no bindings with a type of
    /// [`DescriptorType::UniformBufferDynamic`], [`DescriptorType::StorageBufferDynamic`] or
    /// [`DescriptorType::InlineUniformBlock`].
    PUSH_DESCRIPTOR = PUSH_DESCRIPTOR_KHR,
}

/// A binding in a descriptor set layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorSetLayoutBinding {
    /// The content and layout of each array element of a binding.
    ///
    /// There is no default value.
    pub descriptor_type: DescriptorType,

    /// How many descriptors (array elements) this binding is made of.
    ///
    /// If `descriptor_type` is [`DescriptorType::InlineUniformBlock`], then this value instead
    /// specifies the number of bytes available in the inline uniform block, and must be a
    /// multiple of 4. The block takes a single buffer slot regardless of its size.
    ///
    /// The default value is `1`.
    pub descriptor_count: u32,

    /// Which shader stages are going to access the descriptors in this binding.
    ///
    /// The default value is [`ShaderStages::empty()`], which must be overridden.
    pub stages: ShaderStages,

    /// Samplers that are included as a fixed part of the descriptor set layout.
    ///
    /// The list must be either empty, or contain exactly `descriptor_count` samplers. It can only
    /// be non-empty if `descriptor_type` is [`DescriptorType::Sampler`] or
    /// [`DescriptorType::CombinedImageSampler`].
    ///
    /// The default value is empty.
    pub immutable_samplers: Vec<NativeHandle>,

    pub _ne: crate::NonExhaustive,
}

impl DescriptorSetLayoutBinding {
    /// Returns a `DescriptorSetLayoutBinding` with the given type.
    #[inline]
    pub fn descriptor_type(descriptor_type: DescriptorType) -> Self {
        Self {
            descriptor_type,
            descriptor_count: 1,
            stages: ShaderStages::empty(),
            immutable_samplers: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }

    /// Returns the native stages that can see the binding.
    pub(crate) fn native_stages(&self) -> impl Iterator<Item = NativeShaderStage> + '_ {
        NativeShaderStage::ALL
            .into_iter()
            .filter(|stage| self.stages.contains_enum(stage.shader_stage()))
    }

    /// Returns the slots the binding takes in one stage that can see it.
    pub(crate) fn resources_per_stage(&self) -> ResourceIndices {
        let count = self.descriptor_count;

        match self.descriptor_type {
            DescriptorType::Sampler => ResourceIndices {
                sampler: count,
                ..Default::default()
            },
            DescriptorType::CombinedImageSampler => ResourceIndices {
                texture: count,
                sampler: count,
                ..Default::default()
            },
            DescriptorType::SampledImage
            | DescriptorType::StorageImage
            | DescriptorType::UniformTexelBuffer
            | DescriptorType::StorageTexelBuffer
            | DescriptorType::InputAttachment => ResourceIndices {
                texture: count,
                ..Default::default()
            },
            DescriptorType::UniformBuffer
            | DescriptorType::StorageBuffer
            | DescriptorType::UniformBufferDynamic
            | DescriptorType::StorageBufferDynamic => ResourceIndices {
                buffer: count,
                ..Default::default()
            },
            DescriptorType::InlineUniformBlock => ResourceIndices {
                buffer: 1,
                ..Default::default()
            },
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            descriptor_type,
            descriptor_count,
            stages: _,
            ref immutable_samplers,
            _ne: _,
        } = self;

        if descriptor_type == DescriptorType::InlineUniformBlock {
            if descriptor_count % 4 != 0 {
                return Err(Box::new(ValidationError {
                    problem: "`descriptor_type` is `DescriptorType::InlineUniformBlock`, and \
                        `descriptor_count` is not a multiple of 4"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-02209"],
                    ..Default::default()
                }));
            }
        }

        if !immutable_samplers.is_empty() {
            if !matches!(
                descriptor_type,
                DescriptorType::Sampler | DescriptorType::CombinedImageSampler
            ) {
                return Err(Box::new(ValidationError {
                    problem: "`immutable_samplers` is not empty, but `descriptor_type` is not \
                        `DescriptorType::Sampler` or `DescriptorType::CombinedImageSampler`"
                        .into(),
                    ..Default::default()
                }));
            }

            if descriptor_count != immutable_samplers.len() as u32 {
                return Err(Box::new(ValidationError {
                    problem: "`immutable_samplers` is not empty, but its length does not equal \
                        `descriptor_count`"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-00282"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

vulkan_enum! {
    /// Describes what kind of resource may later be bound to a descriptor.
    DescriptorType impl {
        /// Returns whether the buffer offset is supplied when the set is bound.
        #[inline]
        pub fn is_dynamic(self) -> bool {
            matches!(self, Self::UniformBufferDynamic | Self::StorageBufferDynamic)
        }

        /// Returns whether a resource of the kind of `resource` can be put in a descriptor of
        /// this type.
        pub(crate) fn accepts(self, resource: &DescriptorResource) -> bool {
            match resource {
                DescriptorResource::Buffer(_) => matches!(
                    self,
                    Self::UniformBuffer
                        | Self::StorageBuffer
                        | Self::UniformBufferDynamic
                        | Self::StorageBufferDynamic
                ),
                DescriptorResource::Texture(_) => matches!(
                    self,
                    Self::SampledImage
                        | Self::StorageImage
                        | Self::UniformTexelBuffer
                        | Self::StorageTexelBuffer
                        | Self::InputAttachment
                ),
                DescriptorResource::Sampler(_) => self == Self::Sampler,
                DescriptorResource::CombinedImageSampler { .. } => {
                    self == Self::CombinedImageSampler
                }
                DescriptorResource::InlineUniformBlock(_) => self == Self::InlineUniformBlock,
            }
        }
    }
    = DescriptorType(i32);

    /// Describes how a `SampledImage` descriptor should be read.
    Sampler = SAMPLER,

    /// Combines `SampledImage` and `Sampler` in one descriptor.
    CombinedImageSampler = COMBINED_IMAGE_SAMPLER,

    /// Gives read-only access to an image via a sampler.
    SampledImage = SAMPLED_IMAGE,

    /// Gives read and/or write access to individual pixels in an image.
    StorageImage = STORAGE_IMAGE,

    /// Gives read-only access to the content of a buffer, interpreted as an array of texel data.
    UniformTexelBuffer = UNIFORM_TEXEL_BUFFER,

    /// Gives read and/or write access to the content of a buffer, interpreted as an array of texel
    /// data.
    StorageTexelBuffer = STORAGE_TEXEL_BUFFER,

    /// Gives read-only access to the content of a buffer, interpreted as a structure.
    UniformBuffer = UNIFORM_BUFFER,

    /// Gives read and/or write access to the content of a buffer, interpreted as a structure.
    StorageBuffer = STORAGE_BUFFER,

    /// As `UniformBuffer`, but the offset within the buffer is specified at the time the descriptor
    /// set is bound, rather than when the descriptor set is updated.
    UniformBufferDynamic = UNIFORM_BUFFER_DYNAMIC,

    /// As `StorageBuffer`, but the offset within the buffer is specified at the time the descriptor
    /// set is bound, rather than when the descriptor set is updated.
    StorageBufferDynamic = STORAGE_BUFFER_DYNAMIC,

    /// Gives access to an image inside a fragment shader via a render pass.
    InputAttachment = INPUT_ATTACHMENT,

    /// Uniform data written directly into the descriptor set. The whole block is passed to the
    /// shader as inline bytes in a single buffer slot.
    InlineUniformBlock = INLINE_UNIFORM_BLOCK,
}

/// Numbers of native buffer, texture and sampler slots, in one stage.
///
/// Depending on context this is either a count of slots or the index of a first slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourceIndices {
    pub buffer: u32,
    pub texture: u32,
    pub sampler: u32,
}

/// [`ResourceIndices`] for every native shader stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderResourceIndices {
    pub stages: [ResourceIndices; NativeShaderStage::COUNT],
}

impl ShaderResourceIndices {
    /// Returns the indices of one stage.
    #[inline]
    pub fn stage(&self, stage: NativeShaderStage) -> &ResourceIndices {
        &self.stages[stage.index()]
    }
}

impl Add for &ShaderResourceIndices {
    type Output = ShaderResourceIndices;

    fn add(self, rhs: Self) -> ShaderResourceIndices {
        let mut out = *self;

        for (out, rhs) in out.stages.iter_mut().zip(&rhs.stages) {
            out.buffer += rhs.buffer;
            out.texture += rhs.texture;
            out.sampler += rhs.sampler;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_device;

    fn binding(descriptor_type: DescriptorType, count: u32, stages: ShaderStages) -> DescriptorSetLayoutBinding {
        DescriptorSetLayoutBinding {
            descriptor_count: count,
            stages,
            ..DescriptorSetLayoutBinding::descriptor_type(descriptor_type)
        }
    }

    #[test]
    fn counts_per_stage() {
        let (device, _, _) = test_device();
        let layout = DescriptorSetLayout::new(
            device,
            DescriptorSetLayoutCreateInfo {
                bindings: [
                    (0, binding(DescriptorType::UniformBuffer, 2, ShaderStages::VERTEX)),
                    (
                        1,
                        binding(
                            DescriptorType::CombinedImageSampler,
                            3,
                            ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                        ),
                    ),
                    (2, binding(DescriptorType::InlineUniformBlock, 64, ShaderStages::FRAGMENT)),
                    (3, binding(DescriptorType::StorageBufferDynamic, 2, ShaderStages::FRAGMENT)),
                ]
                .into_iter()
                .collect(),
                ..Default::default()
            },
        )
        .unwrap();

        let counts = layout.resource_counts();
        assert_eq!(
            *counts.stage(NativeShaderStage::Vertex),
            ResourceIndices {
                buffer: 2,
                texture: 3,
                sampler: 3,
            },
        );
        assert_eq!(
            *counts.stage(NativeShaderStage::Fragment),
            ResourceIndices {
                buffer: 3,
                texture: 3,
                sampler: 3,
            },
        );
        assert_eq!(
            *counts.stage(NativeShaderStage::Compute),
            ResourceIndices::default(),
        );

        let dynamic = layout.binding_resource_indices(3).unwrap();
        assert_eq!(dynamic.stage(NativeShaderStage::Fragment).buffer, 1);
        assert_eq!(layout.dynamic_descriptor_count(), 2);
    }

    #[test]
    fn push_layout_rejects_dynamic() {
        let (device, _, _) = test_device();
        let result = DescriptorSetLayout::new(
            device,
            DescriptorSetLayoutCreateInfo {
                flags: DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR,
                bindings: [(
                    0,
                    binding(DescriptorType::UniformBufferDynamic, 1, ShaderStages::VERTEX),
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            },
        );

        assert!(result.is_err());
    }

    #[test]
    fn inline_block_size_multiple_of_four() {
        let (device, _, _) = test_device();
        let result = DescriptorSetLayout::new(
            device,
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    binding(DescriptorType::InlineUniformBlock, 6, ShaderStages::VERTEX),
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            },
        );

        assert!(result.is_err());
    }

    #[test]
    fn compatibility_is_structural() {
        let (device, _, _) = test_device();
        let create_info = || DescriptorSetLayoutCreateInfo {
            bindings: [(0, binding(DescriptorType::StorageBuffer, 1, ShaderStages::COMPUTE))]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let a = DescriptorSetLayout::new(device.clone(), create_info()).unwrap();
        let b = DescriptorSetLayout::new(device.clone(), create_info()).unwrap();
        let c = DescriptorSetLayout::new(device, Default::default()).unwrap();

        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }
}
