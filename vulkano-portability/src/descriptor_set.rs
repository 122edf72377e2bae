// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Bindings between shaders and the resources they access.
//!
//! # Overview
//!
//! In order to access a buffer, a texture or a sampler from a shader, that resource must be put
//! in a *descriptor*. Descriptors are grouped in *descriptor sets*, and the shape of a set is
//! described by a [`DescriptorSetLayout`](layout::DescriptorSetLayout).
//!
//! The native backend has no descriptor sets. Instead, each shader stage sees flat arrays of
//! buffer, texture and sampler slots. Binding a descriptor set therefore means copying each of
//! its resources into the slots that the
//! [`PipelineLayout`](crate::pipeline::layout::PipelineLayout) assigned to it, in every stage the
//! binding is visible to.
//!
//! Allocating descriptor sets and writing into them is the business of the surrounding API
//! layer. This crate reads their contents through the [`DescriptorSet`] trait.

use self::layout::DescriptorSetLayout;
use crate::backend::NativeHandle;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

pub mod layout;
pub mod update;

/// The contents of a descriptor set.
pub trait DescriptorSet: Send + Sync {
    /// Returns the layout the set was allocated with.
    fn layout(&self) -> &Arc<DescriptorSetLayout>;

    /// Returns the resource written to an array element of a binding, or `None` if nothing was
    /// written there.
    ///
    /// For inline uniform blocks, the whole block is returned for array element 0.
    fn resource(&self, binding: u32, array_element: u32) -> Option<&DescriptorResource>;
}

/// A resource held by a descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorResource {
    /// For uniform and storage buffers, dynamic or not.
    Buffer(BufferBinding),

    /// For sampled images, storage images, texel buffers and input attachments.
    Texture(NativeHandle),

    Sampler(NativeHandle),

    CombinedImageSampler {
        texture: NativeHandle,
        sampler: NativeHandle,
    },

    InlineUniformBlock(Arc<[u8]>),
}

/// A range of a native buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    pub buffer: NativeHandle,
    pub offset: u64,
    pub range: u64,
}

/// Represents a single write operation to the binding of a push descriptor set.
#[derive(Clone, Debug)]
pub struct WriteDescriptorSet {
    binding: u32,
    first_array_element: u32,
    resources: SmallVec<[DescriptorResource; 1]>,
}

impl WriteDescriptorSet {
    /// Write a single buffer to array element 0.
    #[inline]
    pub fn buffer(binding: u32, buffer: BufferBinding) -> Self {
        Self::resources(binding, 0, [DescriptorResource::Buffer(buffer)])
    }

    /// Write a number of consecutive buffer elements.
    #[inline]
    pub fn buffer_array(
        binding: u32,
        first_array_element: u32,
        elements: impl IntoIterator<Item = BufferBinding>,
    ) -> Self {
        Self::resources(
            binding,
            first_array_element,
            elements.into_iter().map(DescriptorResource::Buffer),
        )
    }

    /// Write a single texture (image view or buffer view) to array element 0.
    #[inline]
    pub fn texture(binding: u32, texture: NativeHandle) -> Self {
        Self::resources(binding, 0, [DescriptorResource::Texture(texture)])
    }

    /// Write a single sampler to array element 0.
    #[inline]
    pub fn sampler(binding: u32, sampler: NativeHandle) -> Self {
        Self::resources(binding, 0, [DescriptorResource::Sampler(sampler)])
    }

    /// Write a single texture and sampler pair to array element 0.
    #[inline]
    pub fn texture_sampler(binding: u32, texture: NativeHandle, sampler: NativeHandle) -> Self {
        Self::resources(
            binding,
            0,
            [DescriptorResource::CombinedImageSampler { texture, sampler }],
        )
    }

    /// Write a number of consecutive resources of any kind.
    pub fn resources(
        binding: u32,
        first_array_element: u32,
        resources: impl IntoIterator<Item = DescriptorResource>,
    ) -> Self {
        Self {
            binding,
            first_array_element,
            resources: resources.into_iter().collect(),
        }
    }

    /// Write nothing. The binding keeps whatever was pushed before.
    #[inline]
    pub fn none(binding: u32) -> Self {
        Self {
            binding,
            first_array_element: 0,
            resources: smallvec![],
        }
    }

    /// Returns the binding number that is updated by this descriptor write.
    #[inline]
    pub fn binding(&self) -> u32 {
        self.binding
    }

    /// Returns the first array element in the binding that is updated by this descriptor write.
    #[inline]
    pub fn first_array_element(&self) -> u32 {
        self.first_array_element
    }

    /// Returns the resources that are written.
    #[inline]
    pub fn elements(&self) -> &[DescriptorResource] {
        &self.resources
    }
}
