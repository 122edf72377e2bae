// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Descriptor update templates, which describe how to read descriptor writes out of a raw block
//! of application memory.

use super::{
    layout::{DescriptorSetLayout, DescriptorType},
    BufferBinding, DescriptorResource, WriteDescriptorSet,
};
use crate::{backend::NativeHandle, ValidationError};
use bytemuck::{Pod, Zeroable};
use std::{mem::size_of, sync::Arc};

/// Describes how to turn a block of memory into descriptor writes for one descriptor set.
#[derive(Clone, Debug)]
pub struct DescriptorUpdateTemplate {
    entries: Vec<DescriptorUpdateTemplateEntry>,
}

impl DescriptorUpdateTemplate {
    /// Creates a new `DescriptorUpdateTemplate`.
    pub fn new(
        create_info: DescriptorUpdateTemplateCreateInfo,
    ) -> Result<Arc<DescriptorUpdateTemplate>, Box<ValidationError>> {
        create_info
            .validate()
            .map_err(|err| err.add_context("create_info"))?;

        let DescriptorUpdateTemplateCreateInfo { entries, _ne: _ } = create_info;

        Ok(Arc::new(DescriptorUpdateTemplate { entries }))
    }

    /// Returns the entries of the template.
    #[inline]
    pub fn entries(&self) -> &[DescriptorUpdateTemplateEntry] {
        &self.entries
    }

    /// Reads the writes described by the template out of `data`.
    pub(crate) fn read_writes(
        &self,
        layout: &DescriptorSetLayout,
        data: &[u8],
    ) -> Result<Vec<WriteDescriptorSet>, Box<ValidationError>> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                entry
                    .read_write(layout, data)
                    .map_err(|err| err.add_context(format!("entries[{}]", index)))
            })
            .collect()
    }
}

/// Parameters to create a new `DescriptorUpdateTemplate`.
#[derive(Clone, Debug, Default)]
pub struct DescriptorUpdateTemplateCreateInfo {
    /// The descriptor writes to read from the template data.
    ///
    /// The default value is empty.
    pub entries: Vec<DescriptorUpdateTemplateEntry>,

    pub _ne: crate::NonExhaustive,
}

impl DescriptorUpdateTemplateCreateInfo {
    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.descriptor_type == DescriptorType::InlineUniformBlock
                && (entry.first_array_element % 4 != 0 || entry.descriptor_count % 4 != 0)
            {
                return Err(Box::new(ValidationError {
                    context: format!("entries[{}]", index).into(),
                    problem: "`descriptor_type` is `DescriptorType::InlineUniformBlock`, and \
                        `first_array_element` or `descriptor_count` is not a multiple of 4"
                        .into(),
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

/// One write described by a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorUpdateTemplateEntry {
    /// The binding to write to.
    pub binding: u32,

    /// The first array element to write to. For inline uniform blocks, the byte offset within
    /// the block.
    pub first_array_element: u32,

    /// The number of array elements to write. For inline uniform blocks, the number of bytes.
    pub descriptor_count: u32,

    /// The type of descriptor that is written. Must match the type of the binding.
    pub descriptor_type: DescriptorType,

    /// Byte offset of the first element within the template data.
    pub offset: usize,

    /// Bytes between consecutive elements within the template data.
    pub stride: usize,
}

impl DescriptorUpdateTemplateEntry {
    fn read_write(
        &self,
        layout: &DescriptorSetLayout,
        data: &[u8],
    ) -> Result<WriteDescriptorSet, Box<ValidationError>> {
        let binding = layout.bindings().get(&self.binding).ok_or_else(|| {
            Box::new(ValidationError {
                problem: format!("binding {} does not exist in the layout", self.binding).into(),
                ..Default::default()
            })
        })?;

        if binding.descriptor_type != self.descriptor_type {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "`descriptor_type` is {:?}, but the binding is of type {:?}",
                    self.descriptor_type, binding.descriptor_type,
                )
                .into(),
                ..Default::default()
            }));
        }

        if self.descriptor_type == DescriptorType::InlineUniformBlock {
            let bytes = read_bytes(data, self.offset, self.descriptor_count as usize)?;

            return Ok(WriteDescriptorSet::resources(
                self.binding,
                0,
                [DescriptorResource::InlineUniformBlock(bytes.into())],
            ));
        }

        let resources = (0..self.descriptor_count as usize)
            .map(|element| {
                let offset = element
                    .checked_mul(self.stride)
                    .and_then(|offset| offset.checked_add(self.offset))
                    .ok_or_else(|| {
                        Box::new(ValidationError {
                            problem: format!(
                                "the offset of element {} overflows `usize`",
                                element,
                            )
                            .into(),
                            ..Default::default()
                        })
                    })?;
                self.read_resource(data, offset)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WriteDescriptorSet::resources(
            self.binding,
            self.first_array_element,
            resources,
        ))
    }

    fn read_resource(
        &self,
        data: &[u8],
        offset: usize,
    ) -> Result<DescriptorResource, Box<ValidationError>> {
        Ok(match self.descriptor_type {
            DescriptorType::Sampler => {
                let info: TemplateImageInfo = read_pod(data, offset)?;
                DescriptorResource::Sampler(NativeHandle(info.sampler))
            }
            DescriptorType::CombinedImageSampler => {
                let info: TemplateImageInfo = read_pod(data, offset)?;
                DescriptorResource::CombinedImageSampler {
                    texture: NativeHandle(info.image_view),
                    sampler: NativeHandle(info.sampler),
                }
            }
            DescriptorType::SampledImage
            | DescriptorType::StorageImage
            | DescriptorType::InputAttachment => {
                let info: TemplateImageInfo = read_pod(data, offset)?;
                DescriptorResource::Texture(NativeHandle(info.image_view))
            }
            DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer => {
                DescriptorResource::Texture(read_pod(data, offset)?)
            }
            DescriptorType::UniformBuffer
            | DescriptorType::StorageBuffer
            | DescriptorType::UniformBufferDynamic
            | DescriptorType::StorageBufferDynamic => {
                let info: TemplateBufferInfo = read_pod(data, offset)?;
                DescriptorResource::Buffer(BufferBinding {
                    buffer: NativeHandle(info.buffer),
                    offset: info.offset,
                    range: info.range,
                })
            }
            DescriptorType::InlineUniformBlock => unreachable!(),
        })
    }
}

/// The memory layout of a buffer descriptor in template data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TemplateBufferInfo {
    pub buffer: u64,
    pub offset: u64,
    pub range: u64,
}

/// The memory layout of an image or sampler descriptor in template data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TemplateImageInfo {
    pub sampler: u64,
    pub image_view: u64,
    pub image_layout: i32,
    pub _pad: u32,
}

fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8], Box<ValidationError>> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            Box::new(ValidationError {
                context: "data".into(),
                problem: format!(
                    "reading {} bytes at offset {} goes past the end of the data ({} bytes)",
                    len,
                    offset,
                    data.len(),
                )
                .into(),
                ..Default::default()
            })
        })
}

fn read_pod<T: Pod>(data: &[u8], offset: usize) -> Result<T, Box<ValidationError>> {
    read_bytes(data, offset, size_of::<T>()).map(bytemuck::pod_read_unaligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor_set::layout::{DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo},
        shader::ShaderStages,
        tests::test_device,
    };

    fn layout() -> Arc<DescriptorSetLayout> {
        let (device, _, _) = test_device();
        DescriptorSetLayout::new(
            device,
            DescriptorSetLayoutCreateInfo {
                bindings: [
                    (
                        0,
                        DescriptorSetLayoutBinding {
                            descriptor_count: 2,
                            stages: ShaderStages::FRAGMENT,
                            ..DescriptorSetLayoutBinding::descriptor_type(
                                DescriptorType::UniformBuffer,
                            )
                        },
                    ),
                    (
                        1,
                        DescriptorSetLayoutBinding {
                            stages: ShaderStages::FRAGMENT,
                            ..DescriptorSetLayoutBinding::descriptor_type(
                                DescriptorType::CombinedImageSampler,
                            )
                        },
                    ),
                ]
                .into_iter()
                .collect(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn reads_strided_records() {
        let buffers = [
            TemplateBufferInfo {
                buffer: 10,
                offset: 0,
                range: 64,
            },
            TemplateBufferInfo {
                buffer: 11,
                offset: 256,
                range: 64,
            },
        ];
        let image = TemplateImageInfo {
            sampler: 20,
            image_view: 21,
            ..Default::default()
        };

        let mut data = bytemuck::cast_slice::<_, u8>(&buffers).to_vec();
        data.extend_from_slice(bytemuck::bytes_of(&image));

        let template = DescriptorUpdateTemplate::new(DescriptorUpdateTemplateCreateInfo {
            entries: vec![
                DescriptorUpdateTemplateEntry {
                    binding: 0,
                    first_array_element: 0,
                    descriptor_count: 2,
                    descriptor_type: DescriptorType::UniformBuffer,
                    offset: 0,
                    stride: size_of::<TemplateBufferInfo>(),
                },
                DescriptorUpdateTemplateEntry {
                    binding: 1,
                    first_array_element: 0,
                    descriptor_count: 1,
                    descriptor_type: DescriptorType::CombinedImageSampler,
                    offset: 2 * size_of::<TemplateBufferInfo>(),
                    stride: 0,
                },
            ],
            ..Default::default()
        })
        .unwrap();

        let writes = template.read_writes(&layout(), &data).unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(
            writes[0].elements()[1],
            DescriptorResource::Buffer(BufferBinding {
                buffer: NativeHandle(11),
                offset: 256,
                range: 64,
            }),
        );
        assert_eq!(
            writes[1].elements()[0],
            DescriptorResource::CombinedImageSampler {
                texture: NativeHandle(21),
                sampler: NativeHandle(20),
            },
        );
    }

    #[test]
    fn out_of_bounds_read() {
        let template = DescriptorUpdateTemplate::new(DescriptorUpdateTemplateCreateInfo {
            entries: vec![DescriptorUpdateTemplateEntry {
                binding: 0,
                first_array_element: 0,
                descriptor_count: 2,
                descriptor_type: DescriptorType::UniformBuffer,
                offset: 0,
                stride: size_of::<TemplateBufferInfo>(),
            }],
            ..Default::default()
        })
        .unwrap();

        let data = [0u8; size_of::<TemplateBufferInfo>()];
        assert!(template.read_writes(&layout(), &data).is_err());
    }

    #[test]
    fn overflowing_stride() {
        let template = DescriptorUpdateTemplate::new(DescriptorUpdateTemplateCreateInfo {
            entries: vec![DescriptorUpdateTemplateEntry {
                binding: 0,
                first_array_element: 0,
                descriptor_count: 2,
                descriptor_type: DescriptorType::UniformBuffer,
                offset: 8,
                stride: usize::MAX - 4,
            }],
            ..Default::default()
        })
        .unwrap();

        let data = [0u8; 64];
        let err = template.read_writes(&layout(), &data).unwrap_err();
        assert!(err.problem.contains("overflows"));
    }

    #[test]
    fn type_mismatch() {
        let template = DescriptorUpdateTemplate::new(DescriptorUpdateTemplateCreateInfo {
            entries: vec![DescriptorUpdateTemplateEntry {
                binding: 1,
                first_array_element: 0,
                descriptor_count: 1,
                descriptor_type: DescriptorType::Sampler,
                offset: 0,
                stride: 0,
            }],
            ..Default::default()
        })
        .unwrap();

        let data = [0u8; 64];
        assert!(template.read_writes(&layout(), &data).is_err());
    }
}
