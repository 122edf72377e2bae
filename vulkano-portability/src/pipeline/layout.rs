// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The layout of descriptor sets and push constants, and where they land in native slots.
//!
//! A pipeline layout lays its descriptor sets out one after the other in each native stage's
//! buffer, texture and sampler namespaces, in set order. The layout of a set determines how many
//! slots it takes in each stage (see
//! [`DescriptorSetLayout::resource_counts`](crate::descriptor_set::layout::DescriptorSetLayout::resource_counts)),
//! so the offsets only depend on the declared layouts. Two identical layouts always produce
//! identical slots.
//!
//! After the sets, each stage gets one buffer slot for push constants, followed by the implicit
//! buffers that translated shaders may need:
//!
//! | Slot      | Contents                                          |
//! |-----------|---------------------------------------------------|
//! | `pc`      | Push constants.                                   |
//! | `pc + 1`  | The auxiliary buffer (swizzles, buffer sizes).    |
//! | `pc + 2`  | Indirect draw parameters.                         |
//! | `pc + 3`  | Captured stage output.                            |
//! | `pc + 4`  | Per-patch output of the tessellation control pass.|
//! | `pc + 5`  | Tessellation levels.                              |

use super::ImplicitBinding;
use crate::{
    command_buffer::CommandEncoder,
    descriptor_set::{
        layout::{
            DescriptorSetLayout, DescriptorSetLayoutCreateFlags, DescriptorType,
            ShaderResourceIndices,
        },
        update::DescriptorUpdateTemplate,
        DescriptorSet, WriteDescriptorSet,
    },
    device::{Device, DeviceOwned},
    macros::impl_id_counter,
    shader::{
        conversion::{
            ResourceBinding, ShaderConversionContext, PUSH_CONSTANT_BINDING,
            PUSH_CONSTANT_DESCRIPTOR_SET,
        },
        NativeShaderStage, ShaderStages,
    },
    ValidationError,
};
use std::{num::NonZero, sync::Arc};

/// Describes the layout of descriptor sets and push constants that are made available to shaders.
#[derive(Debug)]
pub struct PipelineLayout {
    device: Arc<Device>,
    id: NonZero<u64>,

    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    push_constant_ranges: Vec<PushConstantRange>,

    set_resource_offsets: Vec<ShaderResourceIndices>,
    resource_counts: ShaderResourceIndices,
    push_constant_buffer_index: ImplicitBinding,
    aux_buffer_index: ImplicitBinding,
    indirect_params_buffer_index: ImplicitBinding,
    output_buffer_index: ImplicitBinding,
    tess_ctl_patch_output_buffer_index: ImplicitBinding,
    tess_ctl_level_buffer_index: ImplicitBinding,
    texture_count: u32,
}

impl PipelineLayout {
    /// Creates a new `PipelineLayout`.
    pub fn new(
        device: Arc<Device>,
        create_info: PipelineLayoutCreateInfo,
    ) -> Result<Arc<PipelineLayout>, Box<ValidationError>> {
        create_info
            .validate(&device)
            .map_err(|err| err.add_context("create_info"))?;

        let PipelineLayoutCreateInfo {
            set_layouts,
            mut push_constant_ranges,
            _ne: _,
        } = create_info;

        push_constant_ranges.sort_unstable_by_key(|range| {
            (
                range.offset,
                range.size,
                ash::vk::ShaderStageFlags::from(range.stages),
            )
        });

        let mut set_resource_offsets = Vec::with_capacity(set_layouts.len());
        let mut resource_counts = ShaderResourceIndices::default();

        for set_layout in &set_layouts {
            set_resource_offsets.push(resource_counts);
            resource_counts = &resource_counts + set_layout.resource_counts();
        }

        let implicit = |offset: u32| {
            ImplicitBinding(resource_counts.stages.map(|counts| counts.buffer + offset))
        };

        let texture_count = resource_counts
            .stages
            .iter()
            .map(|counts| counts.texture)
            .max()
            .unwrap_or(0);

        Ok(Arc::new(PipelineLayout {
            device,
            id: Self::next_id(),
            set_layouts,
            push_constant_ranges,
            set_resource_offsets,
            resource_counts,
            push_constant_buffer_index: implicit(0),
            aux_buffer_index: implicit(1),
            indirect_params_buffer_index: implicit(2),
            output_buffer_index: implicit(3),
            tess_ctl_patch_output_buffer_index: implicit(4),
            tess_ctl_level_buffer_index: implicit(5),
            texture_count,
        }))
    }

    /// Returns the descriptor set layouts this pipeline layout was created from.
    #[inline]
    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }

    /// Returns the push constant ranges this pipeline layout was created from.
    ///
    /// The ranges are sorted deterministically by offset, size, then stages.
    #[inline]
    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Returns the first slots of a descriptor set, per stage.
    #[inline]
    pub fn set_resource_offsets(&self, set_num: u32) -> Option<&ShaderResourceIndices> {
        self.set_resource_offsets.get(set_num as usize)
    }

    /// Returns the slots taken by all descriptor sets together, per stage.
    #[inline]
    pub fn resource_counts(&self) -> &ShaderResourceIndices {
        &self.resource_counts
    }

    #[inline]
    pub fn push_constant_buffer_index(&self) -> &ImplicitBinding {
        &self.push_constant_buffer_index
    }

    #[inline]
    pub fn aux_buffer_index(&self) -> &ImplicitBinding {
        &self.aux_buffer_index
    }

    #[inline]
    pub fn indirect_params_buffer_index(&self) -> &ImplicitBinding {
        &self.indirect_params_buffer_index
    }

    #[inline]
    pub fn output_buffer_index(&self) -> &ImplicitBinding {
        &self.output_buffer_index
    }

    #[inline]
    pub fn tess_ctl_patch_output_buffer_index(&self) -> &ImplicitBinding {
        &self.tess_ctl_patch_output_buffer_index
    }

    #[inline]
    pub fn tess_ctl_level_buffer_index(&self) -> &ImplicitBinding {
        &self.tess_ctl_level_buffer_index
    }

    /// Returns the largest number of texture slots used by any stage. The auxiliary buffer
    /// holds one entry per texture slot.
    #[inline]
    pub fn texture_count(&self) -> u32 {
        self.texture_count
    }

    /// Returns whether `self` is compatible with `other` for the given number of sets.
    pub fn is_compatible_with(&self, other: &PipelineLayout, num_sets: u32) -> bool {
        let num_sets = num_sets as usize;

        if self == other {
            return true;
        }

        if self.push_constant_ranges != other.push_constant_ranges {
            return false;
        }

        let (Some(self_sets), Some(other_sets)) = (
            self.set_layouts.get(0..num_sets),
            other.set_layouts.get(0..num_sets),
        ) else {
            return false;
        };

        self_sets
            .iter()
            .zip(other_sets)
            .all(|(a, b)| a.is_compatible_with(b))
    }

    /// Binds `descriptor_sets` to the set numbers starting at `first_set`.
    ///
    /// `dynamic_offsets` is consumed in set, binding and array element order, one value for
    /// every dynamic buffer descriptor of the bound sets, and must contain exactly that many
    /// values.
    pub fn bind_descriptor_sets(
        &self,
        encoder: &mut dyn CommandEncoder,
        first_set: u32,
        descriptor_sets: &[&dyn DescriptorSet],
        dynamic_offsets: &[u32],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_bind_descriptor_sets(first_set, descriptor_sets, dynamic_offsets)?;

        let mut dynamic_offsets = dynamic_offsets.iter().copied();

        for (set_num, set) in (first_set..).zip(descriptor_sets) {
            let set_layout = &self.set_layouts[set_num as usize];
            set_layout
                .bind(
                    encoder,
                    *set,
                    &self.set_resource_offsets[set_num as usize],
                    &mut dynamic_offsets,
                )
                .map_err(|err| err.add_context(format!("descriptor_sets[{}]", set_num)))?;
        }

        Ok(())
    }

    fn validate_bind_descriptor_sets(
        &self,
        first_set: u32,
        descriptor_sets: &[&dyn DescriptorSet],
        dynamic_offsets: &[u32],
    ) -> Result<(), Box<ValidationError>> {
        if first_set as usize + descriptor_sets.len() > self.set_layouts.len() {
            return Err(Box::new(ValidationError {
                problem: "`first_set + descriptor_sets.len()` is greater than the number of \
                    set layouts in the pipeline layout"
                    .into(),
                vuids: &["VUID-vkCmdBindDescriptorSets-firstSet-00360"],
                ..Default::default()
            }));
        }

        let mut dynamic_descriptor_count = 0;

        for (set_num, set) in (first_set..).zip(descriptor_sets) {
            let pipeline_set_layout = &self.set_layouts[set_num as usize];

            if pipeline_set_layout
                .flags()
                .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
            {
                return Err(Box::new(ValidationError {
                    context: format!("descriptor_sets[{}]", set_num).into(),
                    problem: "the set number is reserved for push descriptors in the pipeline \
                        layout"
                        .into(),
                    vuids: &["VUID-vkCmdBindDescriptorSets-pDescriptorSets-00358"],
                    ..Default::default()
                }));
            }

            if !set.layout().is_compatible_with(pipeline_set_layout) {
                return Err(Box::new(ValidationError {
                    context: format!("descriptor_sets[{}]", set_num).into(),
                    problem: "the layout of the set is not compatible with the set layout of the \
                        pipeline layout at that set number"
                        .into(),
                    vuids: &["VUID-vkCmdBindDescriptorSets-pDescriptorSets-00358"],
                    ..Default::default()
                }));
            }

            dynamic_descriptor_count += pipeline_set_layout.dynamic_descriptor_count() as usize;
        }

        if dynamic_offsets.len() != dynamic_descriptor_count {
            return Err(Box::new(ValidationError {
                context: "dynamic_offsets".into(),
                problem: format!(
                    "contains {} values, but the bound sets have {} dynamic descriptors",
                    dynamic_offsets.len(),
                    dynamic_descriptor_count,
                )
                .into(),
                vuids: &["VUID-vkCmdBindDescriptorSets-dynamicOffsetCount-00359"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Writes descriptors directly into the slots of a push descriptor set.
    pub fn push_descriptor_set(
        &self,
        encoder: &mut dyn CommandEncoder,
        set_num: u32,
        descriptor_writes: &[WriteDescriptorSet],
    ) -> Result<(), Box<ValidationError>> {
        let set_layout = self.push_set_layout(set_num)?;

        for (index, write) in descriptor_writes.iter().enumerate() {
            for (element, resource) in (write.first_array_element()..).zip(write.elements()) {
                set_layout
                    .validate_resource(write.binding(), element, resource)
                    .map_err(|err| err.add_context(format!("descriptor_writes[{}]", index)))?;
            }
        }

        let set_offsets = &self.set_resource_offsets[set_num as usize];

        for write in descriptor_writes {
            for (element, resource) in (write.first_array_element()..).zip(write.elements()) {
                set_layout.write_resource(
                    encoder,
                    set_offsets,
                    write.binding(),
                    element,
                    Some(resource),
                    0,
                )?;
            }
        }

        Ok(())
    }

    /// Writes descriptors read out of `data` through `template` into the slots of a push
    /// descriptor set.
    pub fn push_descriptor_set_with_template(
        &self,
        encoder: &mut dyn CommandEncoder,
        template: &DescriptorUpdateTemplate,
        set_num: u32,
        data: &[u8],
    ) -> Result<(), Box<ValidationError>> {
        let set_layout = self.push_set_layout(set_num)?;
        let descriptor_writes = template
            .read_writes(set_layout, data)
            .map_err(|err| err.add_context("template"))?;

        self.push_descriptor_set(encoder, set_num, &descriptor_writes)
    }

    fn push_set_layout(&self, set_num: u32) -> Result<&DescriptorSetLayout, Box<ValidationError>> {
        let set_layout = self.set_layouts.get(set_num as usize).ok_or_else(|| {
            Box::new(ValidationError {
                context: "set_num".into(),
                problem: "is not less than the number of set layouts in the pipeline layout"
                    .into(),
                vuids: &["VUID-vkCmdPushDescriptorSetKHR-set-00364"],
                ..Default::default()
            })
        })?;

        if !set_layout
            .flags()
            .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
        {
            return Err(Box::new(ValidationError {
                context: "set_num".into(),
                problem: "refers to a descriptor set layout that was not created with \
                    `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`"
                    .into(),
                vuids: &["VUID-vkCmdPushDescriptorSetKHR-set-00365"],
                ..Default::default()
            }));
        }

        Ok(set_layout)
    }

    /// Describes every descriptor binding and the push constants of every stage to the shader
    /// converter.
    pub fn populate_shader_conversion_context(&self, context: &mut ShaderConversionContext) {
        for (set_num, (set_layout, set_offsets)) in
            (0..).zip(self.set_layouts.iter().zip(&self.set_resource_offsets))
        {
            for (&binding_num, binding) in set_layout.bindings() {
                let Some(binding_offsets) = set_layout.binding_resource_indices(binding_num)
                else {
                    continue;
                };
                let start = set_offsets + binding_offsets;
                let count = if binding.descriptor_type == DescriptorType::InlineUniformBlock {
                    1
                } else {
                    binding.descriptor_count
                };

                for stage in binding.native_stages() {
                    let indices = start.stage(stage);
                    context.resource_bindings.push(ResourceBinding {
                        stage: stage.shader_stage(),
                        descriptor_set: set_num,
                        binding: binding_num,
                        count,
                        msl_buffer: indices.buffer,
                        msl_texture: indices.texture,
                        msl_sampler: indices.sampler,
                        is_used_by_shader: false,
                    });
                }
            }
        }

        for stage in NativeShaderStage::ALL {
            context.resource_bindings.push(ResourceBinding {
                stage: stage.shader_stage(),
                descriptor_set: PUSH_CONSTANT_DESCRIPTOR_SET,
                binding: PUSH_CONSTANT_BINDING,
                count: 1,
                msl_buffer: self.push_constant_buffer_index.get(stage),
                msl_texture: 0,
                msl_sampler: 0,
                is_used_by_shader: false,
            });
        }
    }
}

impl DeviceOwned for PipelineLayout {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl_id_counter!(PipelineLayout);

/// Parameters to create a new `PipelineLayout`.
#[derive(Clone, Debug, Default)]
pub struct PipelineLayoutCreateInfo {
    /// The descriptor set layouts that should be part of the pipeline layout.
    ///
    /// They are provided in order of set number.
    ///
    /// The default value is empty.
    pub set_layouts: Vec<Arc<DescriptorSetLayout>>,

    /// The ranges of push constants that the pipeline will access.
    ///
    /// A shader stage can only appear in one element of the list, but it is possible to combine
    /// ranges for multiple shader stages if they are the same.
    ///
    /// The default value is empty.
    pub push_constant_ranges: Vec<PushConstantRange>,

    pub _ne: crate::NonExhaustive,
}

impl PipelineLayoutCreateInfo {
    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            ref set_layouts,
            ref push_constant_ranges,
            _ne: _,
        } = self;

        let mut push_descriptor_set = None;

        for (set_num, set_layout) in set_layouts.iter().enumerate() {
            if set_layout.device().as_ref() != device {
                return Err(Box::new(ValidationError {
                    context: format!("set_layouts[{}]", set_num).into(),
                    problem: "was not created from the same device".into(),
                    ..Default::default()
                }));
            }

            if set_layout
                .flags()
                .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
            {
                if let Some(previous) = push_descriptor_set.replace(set_num) {
                    return Err(Box::new(ValidationError {
                        context: "set_layouts".into(),
                        problem: format!(
                            "elements {} and {} were both created with \
                            `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`",
                            previous, set_num,
                        )
                        .into(),
                        vuids: &["VUID-VkPipelineLayoutCreateInfo-pSetLayouts-00293"],
                        ..Default::default()
                    }));
                }
            }
        }

        let mut seen_stages = ShaderStages::empty();

        for (range_index, range) in push_constant_ranges.iter().enumerate() {
            range
                .validate()
                .map_err(|err| err.add_context(format!("push_constant_ranges[{}]", range_index)))?;

            if seen_stages.intersects(range.stages) {
                return Err(Box::new(ValidationError {
                    context: "push_constant_ranges".into(),
                    problem: "contains more than one range with the same stage".into(),
                    vuids: &["VUID-VkPipelineLayoutCreateInfo-pPushConstantRanges-00292"],
                    ..Default::default()
                }));
            }

            seen_stages |= range.stages;
        }

        Ok(())
    }
}

/// Description of a range of the push constants of a pipeline layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushConstantRange {
    /// The stages which can access this range. A stage can access at most one push constant range.
    ///
    /// The default value is [`ShaderStages::empty()`], which must be overridden.
    pub stages: ShaderStages,

    /// Offset in bytes from the start of the push constants to this range.
    ///
    /// The value must be a multiple of 4.
    ///
    /// The default value is `0`.
    pub offset: u32,

    /// Size in bytes of the range.
    ///
    /// The value must be a multiple of 4, and not 0.
    ///
    /// The default value is `0`, which must be overridden.
    pub size: u32,
}

impl Default for PushConstantRange {
    #[inline]
    fn default() -> Self {
        Self {
            stages: ShaderStages::empty(),
            offset: 0,
            size: 0,
        }
    }
}

impl PushConstantRange {
    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            stages,
            offset,
            size,
        } = self;

        if stages.is_empty() {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "is empty".into(),
                vuids: &["VUID-VkPushConstantRange-stageFlags-requiredbitmask"],
                ..Default::default()
            }));
        }

        if offset % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-VkPushConstantRange-offset-00295"],
                ..Default::default()
            }));
        }

        if size == 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is zero".into(),
                vuids: &["VUID-VkPushConstantRange-size-00296"],
                ..Default::default()
            }));
        }

        if size % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-VkPushConstantRange-size-00297"],
                ..Default::default()
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::NativeHandle,
        descriptor_set::{
            layout::{DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, ResourceIndices},
            update::{
                DescriptorUpdateTemplateCreateInfo, DescriptorUpdateTemplateEntry,
                TemplateBufferInfo,
            },
            BufferBinding, DescriptorResource,
        },
        tests::{test_device, EncodedCommand, RecordingEncoder, TestDescriptorSet},
    };

    fn set_layout(
        device: &Arc<Device>,
        flags: DescriptorSetLayoutCreateFlags,
        bindings: impl IntoIterator<Item = (u32, DescriptorType, u32, ShaderStages)>,
    ) -> Arc<DescriptorSetLayout> {
        DescriptorSetLayout::new(
            device.clone(),
            DescriptorSetLayoutCreateInfo {
                flags,
                bindings: bindings
                    .into_iter()
                    .map(|(binding, descriptor_type, count, stages)| {
                        (
                            binding,
                            DescriptorSetLayoutBinding {
                                descriptor_count: count,
                                stages,
                                ..DescriptorSetLayoutBinding::descriptor_type(descriptor_type)
                            },
                        )
                    })
                    .collect(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn buffer(handle: u64) -> BufferBinding {
        BufferBinding {
            buffer: NativeHandle(handle),
            offset: 0,
            range: 256,
        }
    }

    #[test]
    fn sets_do_not_overlap() {
        let (device, _, _) = test_device();
        let graphics = ShaderStages::VERTEX | ShaderStages::FRAGMENT;
        let set0 = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::empty(),
            [
                (0, DescriptorType::UniformBuffer, 2, graphics),
                (1, DescriptorType::CombinedImageSampler, 1, ShaderStages::FRAGMENT),
            ],
        );
        let set1 = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::empty(),
            [
                (0, DescriptorType::StorageBuffer, 1, graphics),
                (1, DescriptorType::SampledImage, 3, graphics),
            ],
        );

        let layout = PipelineLayout::new(
            device,
            PipelineLayoutCreateInfo {
                set_layouts: vec![set0, set1],
                ..Default::default()
            },
        )
        .unwrap();

        let offsets = layout.set_resource_offsets(1).unwrap();
        assert_eq!(
            *offsets.stage(NativeShaderStage::Vertex),
            ResourceIndices {
                buffer: 2,
                texture: 0,
                sampler: 0,
            },
        );
        assert_eq!(
            *offsets.stage(NativeShaderStage::Fragment),
            ResourceIndices {
                buffer: 2,
                texture: 1,
                sampler: 1,
            },
        );

        let set0_end = layout.set_layouts()[0].resource_counts();

        for stage in NativeShaderStage::ALL {
            let (end, start) = (set0_end.stage(stage), offsets.stage(stage));
            assert!(end.buffer <= start.buffer);
            assert!(end.texture <= start.texture);
            assert!(end.sampler <= start.sampler);
        }

        assert_eq!(layout.texture_count(), 4);
    }

    #[test]
    fn implicit_bindings_follow_push_constants() {
        let (device, _, _) = test_device();
        let set0 = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::empty(),
            [(0, DescriptorType::UniformBuffer, 3, ShaderStages::VERTEX)],
        );
        let layout = PipelineLayout::new(
            device,
            PipelineLayoutCreateInfo {
                set_layouts: vec![set0],
                push_constant_ranges: vec![PushConstantRange {
                    stages: ShaderStages::VERTEX,
                    offset: 0,
                    size: 16,
                }],
                ..Default::default()
            },
        )
        .unwrap();

        let vertex = NativeShaderStage::Vertex;
        assert_eq!(layout.push_constant_buffer_index()[vertex], 3);
        assert_eq!(layout.aux_buffer_index()[vertex], 4);
        assert_eq!(layout.indirect_params_buffer_index()[vertex], 5);
        assert_eq!(layout.output_buffer_index()[vertex], 6);
        assert_eq!(layout.tess_ctl_patch_output_buffer_index()[vertex], 7);
        assert_eq!(layout.tess_ctl_level_buffer_index()[vertex], 8);

        let fragment = NativeShaderStage::Fragment;
        assert_eq!(layout.push_constant_buffer_index()[fragment], 0);
        assert_eq!(layout.aux_buffer_index()[fragment], 1);
    }

    #[test]
    fn dynamic_offsets() {
        let (device, _, _) = test_device();
        let set_layout = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::empty(),
            [
                (0, DescriptorType::UniformBufferDynamic, 2, ShaderStages::VERTEX | ShaderStages::FRAGMENT),
                (1, DescriptorType::UniformBuffer, 1, ShaderStages::VERTEX),
            ],
        );
        let layout = PipelineLayout::new(
            device,
            PipelineLayoutCreateInfo {
                set_layouts: vec![set_layout.clone()],
                ..Default::default()
            },
        )
        .unwrap();

        let mut set = TestDescriptorSet::new(set_layout);
        set.write(0, 0, DescriptorResource::Buffer(buffer(1)));
        set.write(0, 1, DescriptorResource::Buffer(buffer(2)));
        set.write(1, 0, DescriptorResource::Buffer(buffer(3)));

        let mut encoder = RecordingEncoder::default();
        assert!(layout
            .bind_descriptor_sets(&mut encoder, 0, &[&set], &[64])
            .is_err());
        assert!(encoder.commands.is_empty());

        layout
            .bind_descriptor_sets(&mut encoder, 0, &[&set], &[64, 128])
            .unwrap();

        let offset_of = |stage, index| {
            encoder.commands.iter().find_map(|command| match *command {
                EncodedCommand::Buffer {
                    stage: s,
                    index: i,
                    buffer,
                } if s == stage && i == index => Some(buffer.offset),
                _ => None,
            })
        };

        assert_eq!(offset_of(NativeShaderStage::Vertex, 0), Some(64));
        assert_eq!(offset_of(NativeShaderStage::Vertex, 1), Some(128));
        assert_eq!(offset_of(NativeShaderStage::Fragment, 1), Some(128));
        assert_eq!(offset_of(NativeShaderStage::Vertex, 2), Some(0));
    }

    #[test]
    fn push_descriptors() {
        let (device, _, _) = test_device();
        let regular = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::empty(),
            [(0, DescriptorType::StorageBuffer, 1, ShaderStages::COMPUTE)],
        );
        let push = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR,
            [
                (0, DescriptorType::StorageBuffer, 1, ShaderStages::COMPUTE),
                (1, DescriptorType::Sampler, 2, ShaderStages::COMPUTE),
            ],
        );
        let layout = PipelineLayout::new(
            device,
            PipelineLayoutCreateInfo {
                set_layouts: vec![regular, push],
                ..Default::default()
            },
        )
        .unwrap();

        let mut encoder = RecordingEncoder::default();
        assert!(layout
            .push_descriptor_set(&mut encoder, 0, &[WriteDescriptorSet::buffer(0, buffer(1))])
            .is_err());
        assert!(layout
            .push_descriptor_set(&mut encoder, 1, &[WriteDescriptorSet::texture(0, NativeHandle(1))])
            .is_err());
        assert!(encoder.commands.is_empty());

        layout
            .push_descriptor_set(
                &mut encoder,
                1,
                &[
                    WriteDescriptorSet::buffer(0, buffer(7)),
                    WriteDescriptorSet::resources(
                        1,
                        1,
                        [DescriptorResource::Sampler(NativeHandle(9))],
                    ),
                ],
            )
            .unwrap();

        assert_eq!(
            encoder.commands,
            [
                EncodedCommand::Buffer {
                    stage: NativeShaderStage::Compute,
                    index: 1,
                    buffer: buffer(7),
                },
                EncodedCommand::Sampler {
                    stage: NativeShaderStage::Compute,
                    index: 1,
                    sampler: NativeHandle(9),
                },
            ],
        );

        let template = DescriptorUpdateTemplate::new(DescriptorUpdateTemplateCreateInfo {
            entries: vec![DescriptorUpdateTemplateEntry {
                binding: 0,
                first_array_element: 0,
                descriptor_count: 1,
                descriptor_type: DescriptorType::StorageBuffer,
                offset: 8,
                stride: 0,
            }],
            ..Default::default()
        })
        .unwrap();
        let mut data = vec![0u8; 8];
        data.extend_from_slice(bytemuck::bytes_of(&TemplateBufferInfo {
            buffer: 11,
            offset: 16,
            range: 32,
        }));

        let mut encoder = RecordingEncoder::default();
        layout
            .push_descriptor_set_with_template(&mut encoder, &template, 1, &data)
            .unwrap();
        assert_eq!(
            encoder.commands,
            [EncodedCommand::Buffer {
                stage: NativeShaderStage::Compute,
                index: 1,
                buffer: BufferBinding {
                    buffer: NativeHandle(11),
                    offset: 16,
                    range: 32,
                },
            }],
        );
    }

    #[test]
    fn incompatible_set() {
        let (device, _, _) = test_device();
        let a = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::empty(),
            [(0, DescriptorType::StorageBuffer, 1, ShaderStages::COMPUTE)],
        );
        let b = set_layout(
            &device,
            DescriptorSetLayoutCreateFlags::empty(),
            [(0, DescriptorType::UniformBuffer, 1, ShaderStages::COMPUTE)],
        );
        let layout = PipelineLayout::new(
            device,
            PipelineLayoutCreateInfo {
                set_layouts: vec![a],
                ..Default::default()
            },
        )
        .unwrap();

        let set = TestDescriptorSet::new(b);
        let mut encoder = RecordingEncoder::default();
        assert!(layout
            .bind_descriptor_sets(&mut encoder, 0, &[&set], &[])
            .is_err());
    }

    #[test]
    fn identical_layouts_identical_slots() {
        let (device, _, _) = test_device();
        let make = || {
            let set = set_layout(
                &device,
                DescriptorSetLayoutCreateFlags::empty(),
                [
                    (0, DescriptorType::UniformBuffer, 1, ShaderStages::all_graphics()),
                    (2, DescriptorType::StorageImage, 2, ShaderStages::FRAGMENT),
                ],
            );
            PipelineLayout::new(
                device.clone(),
                PipelineLayoutCreateInfo {
                    set_layouts: vec![set.clone(), set],
                    ..Default::default()
                },
            )
            .unwrap()
        };

        let (a, b) = (make(), make());
        assert_ne!(a, b);
        assert!(a.is_compatible_with(&b, 2));

        let mut context_a = ShaderConversionContext::default();
        let mut context_b = ShaderConversionContext::default();
        a.populate_shader_conversion_context(&mut context_a);
        b.populate_shader_conversion_context(&mut context_b);
        assert_eq!(context_a, context_b);
    }
}
