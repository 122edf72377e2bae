// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The serialized form of a pipeline cache.
//!
//! All values are little endian. The data starts with a header laid out like Vulkan's
//! `VkPipelineCacheHeaderVersionOne`, followed by tagged entries and a terminating end tag:
//!
//! ```text
//! header:  u32 header size (32), u32 header version (1), u32 vendor id, u32 device id,
//!          [u8; 16] pipeline cache UUID
//! entry:   u32 tag (1), module key, conversion context, shader library
//! end:     u32 tag (0)
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8. Lists are a `u32` count followed by the
//! elements. Booleans and small enums are one byte.

use crate::{
    device::DeviceProperties,
    shader::{
        conversion::{
            ResourceBinding, ShaderConversionContext, ShaderConversionOptions,
            ShaderConversionResults, ShaderEntryPoint, VertexAttribute, VertexAttributeFormat,
        },
        BuiltIn, ShaderLibrary, ShaderModuleKey, ShaderStage, TessellationPatchKind,
        WorkgroupDimension,
    },
};
use bytemuck::{Pod, Zeroable};
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    mem::size_of,
};

/// The version of the entry format. Part of the pipeline cache UUID, so that data written by a
/// different version is rejected.
pub const CACHE_DATA_VERSION: u32 = 1;

const HEADER_VERSION_ONE: u32 = 1;
const TAG_END: u32 = 0;
const TAG_SHADER_LIBRARY: u32 = 1;

/// The size of the end tag.
pub(crate) const END_SIZE: usize = size_of::<u32>();

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct CacheHeader {
    header_size: u32,
    header_version: u32,
    vendor_id: u32,
    device_id: u32,
    pipeline_cache_uuid: [u8; 16],
}

pub(crate) const HEADER_SIZE: usize = size_of::<CacheHeader>();

/// One memoized conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CacheEntry {
    pub(crate) key: ShaderModuleKey,
    pub(crate) context: ShaderConversionContext,
    pub(crate) library: ShaderLibrary,
}

/// Returns the header for data written by a device with `properties`.
pub(crate) fn header(properties: &DeviceProperties) -> [u8; HEADER_SIZE] {
    let header = CacheHeader {
        header_size: (HEADER_SIZE as u32).to_le(),
        header_version: HEADER_VERSION_ONE.to_le(),
        vendor_id: properties.vendor_id.to_le(),
        device_id: properties.device_id.to_le(),
        pipeline_cache_uuid: properties.pipeline_cache_uuid,
    };

    bytemuck::cast(header)
}

/// Returns the end tag.
#[inline]
pub(crate) fn end() -> [u8; END_SIZE] {
    TAG_END.to_le_bytes()
}

/// Serializes one entry, including its tag.
pub(crate) fn encode_entry(
    key: ShaderModuleKey,
    context: &ShaderConversionContext,
    library: &ShaderLibrary,
) -> Vec<u8> {
    let mut writer = Writer::default();
    writer.u32(TAG_SHADER_LIBRARY);
    writer.u64(key.code_size);
    writer.u64(key.code_hash);

    let ShaderConversionContext {
        options,
        vertex_attributes,
        resource_bindings,
    } = context;
    writer.options(options);

    writer.u32(vertex_attributes.len() as u32);
    for attribute in vertex_attributes {
        writer.vertex_attribute(attribute);
    }

    writer.u32(resource_bindings.len() as u32);
    for binding in resource_bindings {
        writer.resource_binding(binding);
    }

    writer.library(library);

    writer.bytes
}

/// Reads all the entries of `data`, checking that it was written by a compatible device.
pub(crate) fn decode(
    data: &[u8],
    properties: &DeviceProperties,
) -> Result<Vec<CacheEntry>, CacheDataError> {
    let header_bytes = data.get(..HEADER_SIZE).ok_or(CacheDataError::Truncated)?;
    let header: CacheHeader = bytemuck::pod_read_unaligned(header_bytes);

    let header_size = u32::from_le(header.header_size);
    if header_size as usize != HEADER_SIZE {
        return Err(CacheDataError::BadHeaderSize { header_size });
    }

    let header_version = u32::from_le(header.header_version);
    if header_version != HEADER_VERSION_ONE {
        return Err(CacheDataError::BadHeaderVersion { header_version });
    }

    if u32::from_le(header.vendor_id) != properties.vendor_id
        || u32::from_le(header.device_id) != properties.device_id
        || header.pipeline_cache_uuid != properties.pipeline_cache_uuid
    {
        return Err(CacheDataError::IncompatibleDevice);
    }

    let mut reader = Reader {
        bytes: &data[HEADER_SIZE..],
    };
    let mut entries = Vec::new();

    loop {
        match reader.u32()? {
            TAG_END => break,
            TAG_SHADER_LIBRARY => entries.push(reader.entry()?),
            tag => return Err(CacheDataError::UnknownEntryType { tag }),
        }
    }

    Ok(entries)
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, val: u8) {
        self.bytes.push(val);
    }

    fn bool(&mut self, val: bool) {
        self.u8(val as u8);
    }

    fn u32(&mut self, val: u32) {
        self.bytes.extend_from_slice(&val.to_le_bytes());
    }

    fn u64(&mut self, val: u64) {
        self.bytes.extend_from_slice(&val.to_le_bytes());
    }

    fn string(&mut self, val: &str) {
        self.u32(val.len() as u32);
        self.bytes.extend_from_slice(val.as_bytes());
    }

    fn options(&mut self, options: &ShaderConversionOptions) {
        let &ShaderConversionOptions {
            ref entry_point_name,
            entry_point_stage,
            msl_version,
            texel_buffer_texture_width,
            aux_buffer_index,
            indirect_params_buffer_index,
            output_buffer_index,
            patch_output_buffer_index,
            tess_level_buffer_index,
            input_threadgroup_mem_index,
            tess_patch_kind,
            num_tess_control_points,
            tess_domain_origin_in_lower_left,
            should_flip_vertex_y,
            should_swizzle_texture_samples,
            should_capture_output,
            is_rendering_points,
            is_rasterization_disabled,
        } = options;

        self.string(entry_point_name);
        self.u32(ash::vk::ShaderStageFlags::from(entry_point_stage).as_raw());
        self.u32(msl_version);
        self.u32(texel_buffer_texture_width);
        self.u32(aux_buffer_index);
        self.u32(indirect_params_buffer_index);
        self.u32(output_buffer_index);
        self.u32(patch_output_buffer_index);
        self.u32(tess_level_buffer_index);
        self.u32(input_threadgroup_mem_index);
        self.u8(match tess_patch_kind {
            None => 0,
            Some(TessellationPatchKind::Triangles) => 1,
            Some(TessellationPatchKind::Quads) => 2,
            Some(TessellationPatchKind::Isolines) => 3,
        });
        self.u32(num_tess_control_points);
        self.bool(tess_domain_origin_in_lower_left);
        self.bool(should_flip_vertex_y);
        self.bool(should_swizzle_texture_samples);
        self.bool(should_capture_output);
        self.bool(is_rendering_points);
        self.bool(is_rasterization_disabled);
    }

    fn vertex_attribute(&mut self, attribute: &VertexAttribute) {
        let &VertexAttribute {
            location,
            msl_buffer,
            offset,
            stride,
            is_per_instance,
            format,
            builtin,
            vec_width,
            is_used_by_shader,
        } = attribute;

        self.u32(location);
        self.u32(msl_buffer);
        self.u32(offset);
        self.u32(stride);
        self.bool(is_per_instance);
        self.u8(match format {
            VertexAttributeFormat::Other => 0,
            VertexAttributeFormat::UInt8 => 1,
            VertexAttributeFormat::UInt16 => 2,
        });
        self.u8(match builtin {
            None => 0,
            Some(BuiltIn::Position) => 1,
            Some(BuiltIn::PointSize) => 2,
            Some(BuiltIn::ClipDistance) => 3,
            Some(BuiltIn::CullDistance) => 4,
            Some(BuiltIn::TessLevelOuter) => 5,
            Some(BuiltIn::TessLevelInner) => 6,
        });
        self.u32(vec_width);
        self.bool(is_used_by_shader);
    }

    fn resource_binding(&mut self, binding: &ResourceBinding) {
        let &ResourceBinding {
            stage,
            descriptor_set,
            binding,
            count,
            msl_buffer,
            msl_texture,
            msl_sampler,
            is_used_by_shader,
        } = binding;

        self.u32(ash::vk::ShaderStageFlags::from(stage).as_raw());
        self.u32(descriptor_set);
        self.u32(binding);
        self.u32(count);
        self.u32(msl_buffer);
        self.u32(msl_texture);
        self.u32(msl_sampler);
        self.bool(is_used_by_shader);
    }

    fn library(&mut self, library: &ShaderLibrary) {
        let ShaderLibrary {
            msl,
            entry_point,
            results,
        } = library;

        self.string(msl);
        self.string(&entry_point.name);

        for dimension in &entry_point.workgroup_size {
            self.u32(dimension.size);
            self.bool(dimension.specialization_id.is_some());
            self.u32(dimension.specialization_id.unwrap_or(0));
        }

        let &ShaderConversionResults {
            is_rasterization_disabled,
            needs_aux_buffer,
            needs_output_buffer,
            needs_patch_output_buffer,
            needs_input_threadgroup_mem,
        } = results;

        self.bool(is_rasterization_disabled);
        self.bool(needs_aux_buffer);
        self.bool(needs_output_buffer);
        self.bool(needs_patch_output_buffer);
        self.bool(needs_input_threadgroup_mem);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CacheDataError> {
        if self.bytes.len() < len {
            return Err(CacheDataError::Truncated);
        }

        let (taken, rest) = self.bytes.split_at(len);
        self.bytes = rest;

        Ok(taken)
    }

    fn u8(&mut self) -> Result<u8, CacheDataError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, CacheDataError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(CacheDataError::InvalidValue { what: "boolean" }),
        }
    }

    fn u32(&mut self) -> Result<u32, CacheDataError> {
        Ok(u32::from_le(bytemuck::pod_read_unaligned(self.take(4)?)))
    }

    fn u64(&mut self) -> Result<u64, CacheDataError> {
        Ok(u64::from_le(bytemuck::pod_read_unaligned(self.take(8)?)))
    }

    fn string(&mut self) -> Result<String, CacheDataError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;

        String::from_utf8(bytes.to_vec()).map_err(|_| CacheDataError::InvalidUtf8)
    }

    fn stage(&mut self) -> Result<ShaderStage, CacheDataError> {
        ShaderStage::try_from(ash::vk::ShaderStageFlags::from_raw(self.u32()?))
            .map_err(|_| CacheDataError::InvalidValue {
                what: "shader stage",
            })
    }

    fn entry(&mut self) -> Result<CacheEntry, CacheDataError> {
        let key = ShaderModuleKey {
            code_size: self.u64()?,
            code_hash: self.u64()?,
        };

        let options = self.options()?;

        let attribute_count = self.u32()?;
        let vertex_attributes = (0..attribute_count)
            .map(|_| self.vertex_attribute())
            .collect::<Result<_, _>>()?;

        let binding_count = self.u32()?;
        let resource_bindings = (0..binding_count)
            .map(|_| self.resource_binding())
            .collect::<Result<_, _>>()?;

        let library = self.library()?;

        Ok(CacheEntry {
            key,
            context: ShaderConversionContext {
                options,
                vertex_attributes,
                resource_bindings,
            },
            library,
        })
    }

    fn options(&mut self) -> Result<ShaderConversionOptions, CacheDataError> {
        Ok(ShaderConversionOptions {
            entry_point_name: self.string()?,
            entry_point_stage: self.stage()?,
            msl_version: self.u32()?,
            texel_buffer_texture_width: self.u32()?,
            aux_buffer_index: self.u32()?,
            indirect_params_buffer_index: self.u32()?,
            output_buffer_index: self.u32()?,
            patch_output_buffer_index: self.u32()?,
            tess_level_buffer_index: self.u32()?,
            input_threadgroup_mem_index: self.u32()?,
            tess_patch_kind: match self.u8()? {
                0 => None,
                1 => Some(TessellationPatchKind::Triangles),
                2 => Some(TessellationPatchKind::Quads),
                3 => Some(TessellationPatchKind::Isolines),
                _ => {
                    return Err(CacheDataError::InvalidValue {
                        what: "tessellation patch kind",
                    })
                }
            },
            num_tess_control_points: self.u32()?,
            tess_domain_origin_in_lower_left: self.bool()?,
            should_flip_vertex_y: self.bool()?,
            should_swizzle_texture_samples: self.bool()?,
            should_capture_output: self.bool()?,
            is_rendering_points: self.bool()?,
            is_rasterization_disabled: self.bool()?,
        })
    }

    fn vertex_attribute(&mut self) -> Result<VertexAttribute, CacheDataError> {
        Ok(VertexAttribute {
            location: self.u32()?,
            msl_buffer: self.u32()?,
            offset: self.u32()?,
            stride: self.u32()?,
            is_per_instance: self.bool()?,
            format: match self.u8()? {
                0 => VertexAttributeFormat::Other,
                1 => VertexAttributeFormat::UInt8,
                2 => VertexAttributeFormat::UInt16,
                _ => {
                    return Err(CacheDataError::InvalidValue {
                        what: "vertex attribute format",
                    })
                }
            },
            builtin: match self.u8()? {
                0 => None,
                1 => Some(BuiltIn::Position),
                2 => Some(BuiltIn::PointSize),
                3 => Some(BuiltIn::ClipDistance),
                4 => Some(BuiltIn::CullDistance),
                5 => Some(BuiltIn::TessLevelOuter),
                6 => Some(BuiltIn::TessLevelInner),
                _ => return Err(CacheDataError::InvalidValue { what: "builtin" }),
            },
            vec_width: self.u32()?,
            is_used_by_shader: self.bool()?,
        })
    }

    fn resource_binding(&mut self) -> Result<ResourceBinding, CacheDataError> {
        Ok(ResourceBinding {
            stage: self.stage()?,
            descriptor_set: self.u32()?,
            binding: self.u32()?,
            count: self.u32()?,
            msl_buffer: self.u32()?,
            msl_texture: self.u32()?,
            msl_sampler: self.u32()?,
            is_used_by_shader: self.bool()?,
        })
    }

    fn library(&mut self) -> Result<ShaderLibrary, CacheDataError> {
        let msl = self.string()?;
        let name = self.string()?;

        let mut workgroup_size = [WorkgroupDimension::ONE; 3];
        for dimension in &mut workgroup_size {
            let size = self.u32()?;
            let specialized = self.bool()?;
            let specialization_id = self.u32()?;

            *dimension = WorkgroupDimension {
                size,
                specialization_id: specialized.then_some(specialization_id),
            };
        }

        let results = ShaderConversionResults {
            is_rasterization_disabled: self.bool()?,
            needs_aux_buffer: self.bool()?,
            needs_output_buffer: self.bool()?,
            needs_patch_output_buffer: self.bool()?,
            needs_input_threadgroup_mem: self.bool()?,
        };

        Ok(ShaderLibrary {
            msl,
            entry_point: ShaderEntryPoint {
                name,
                workgroup_size,
            },
            results,
        })
    }
}

/// Error that can happen when reading serialized pipeline cache data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheDataError {
    /// The data ends in the middle of the header or of an entry, or without an end tag.
    Truncated,

    /// The header size field is not that of a version one header.
    BadHeaderSize { header_size: u32 },

    /// The header version is not one.
    BadHeaderVersion { header_version: u32 },

    /// The data was written for a different device, driver or format version.
    IncompatibleDevice,

    /// An entry has an unknown tag.
    UnknownEntryType { tag: u32 },

    /// A string is not valid UTF-8.
    InvalidUtf8,

    /// An enumerated value is out of range.
    InvalidValue { what: &'static str },
}

impl Error for CacheDataError {}

impl Display for CacheDataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Truncated => write!(f, "the data ends unexpectedly"),
            Self::BadHeaderSize { header_size } => {
                write!(f, "the header size is {}, expected {}", header_size, HEADER_SIZE)
            }
            Self::BadHeaderVersion { header_version } => {
                write!(f, "the header version {} is not supported", header_version)
            }
            Self::IncompatibleDevice => {
                write!(f, "the data was written for a different device or driver")
            }
            Self::UnknownEntryType { tag } => write!(f, "unknown entry type {}", tag),
            Self::InvalidUtf8 => write!(f, "a string is not valid UTF-8"),
            Self::InvalidValue { what } => write!(f, "invalid {} value", what),
        }
    }
}
