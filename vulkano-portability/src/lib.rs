// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![doc(html_logo_url = "https://raw.githubusercontent.com/vulkano-rs/vulkano/master/logo.png")]
//! Translation of Vulkan pipeline objects onto a Metal-style native backend.
//!
//! The native backend this crate targets has no tessellation stage and no descriptor sets. Every
//! shader stage sees one flat namespace of buffer, texture and sampler slots, and pipelines are
//! compiled from descriptor objects by an asynchronous compiler.
//!
//! # Brief summary
//!
//! - A [`Device`](crate::device::Device) bundles the native [`Backend`](crate::backend::Backend),
//!   the external [`ShaderConverter`](crate::shader::conversion::ShaderConverter), the
//!   backend's [`MetalFeatures`](crate::device::MetalFeatures) and the
//!   [`MetalConfiguration`](crate::config::MetalConfiguration) captured at creation.
//!
//! - A [`PipelineLayout`](crate::pipeline::layout::PipelineLayout) assigns each descriptor binding
//!   a native resource slot in every stage that can see it, and reserves the implicit slots the
//!   translated shaders need (auxiliary buffer, indirect parameters, captured stage output,
//!   tessellation buffers).
//!
//! - A [`GraphicsPipeline`](crate::pipeline::graphics::GraphicsPipeline) is compiled into one
//!   native render pipeline, or, when it tessellates, into a vertex pass, a tessellation control
//!   compute pass and a raster pass. A [`ComputePipeline`](crate::pipeline::compute::ComputePipeline)
//!   is compiled into one native compute pipeline.
//!
//! - A [`PipelineCache`](crate::pipeline::cache::PipelineCache) memoizes converted shader
//!   libraries and can be serialized, reloaded and merged.
//!
//! - At draw or dispatch time, the command recorder walks
//!   [`Pipeline::stages`](crate::pipeline::Pipeline::stages) and calls
//!   [`Pipeline::encode`](crate::pipeline::Pipeline::encode) once per stage, in order, against its
//!   own [`CommandEncoder`](crate::command_buffer::CommandEncoder).

pub use ash::vk::Format;
use std::{
    borrow::Cow,
    error::Error,
    fmt::{Debug, Display, Error as FmtError, Formatter},
};

pub mod backend;
pub mod command_buffer;
pub mod config;
pub mod descriptor_set;
pub mod device;
mod macros;
pub mod performance;
pub mod pipeline;
pub mod shader;
#[cfg(test)]
mod tests;

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures that have a field of this type
/// can therefore not be created by struct expression notation from outside this crate.
/// See the [`non_exhaustive`] RFC for why this type is used instead of the `#[non_exhaustive]`
/// attribute.
///
/// [`non_exhaustive`]: https://rust-lang.github.io/rfcs/2008-non-exhaustive.html
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());

/// The arguments or other context of a call did not meet the requirements of the API.
///
/// These are the usage contract violations: the caller handed in something the Vulkan API rules
/// out, and the translation refuses it rather than guessing.
#[derive(Clone, Default)]
pub struct ValidationError {
    /// The context in which the problem exists (e.g. a specific parameter).
    pub context: Cow<'static, str>,

    /// A description of the problem.
    pub problem: Cow<'static, str>,

    /// Vulkan valid usage IDs that the problem corresponds to, if any.
    pub vuids: &'static [&'static str],
}

impl ValidationError {
    fn prepend_context(&mut self, prefix: &str) {
        if self.context.is_empty() {
            self.context = prefix.to_owned().into();
        } else {
            self.context = format!("{}.{}", prefix, self.context).into();
        }
    }

    pub(crate) fn add_context(mut self: Box<Self>, context: impl Into<Cow<'static, str>>) -> Box<Self> {
        self.prepend_context(&context.into());
        self
    }
}

impl Debug for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)?;
        } else {
            write!(f, "{}: {}", self.context, self.problem)?;
        }

        if !self.vuids.is_empty() {
            write!(f, "\n\nVulkan VUIDs:")?;

            for vuid in self.vuids {
                write!(f, "\n    {}", vuid)?;
            }
        }

        Ok(())
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)
        } else {
            write!(f, "{}: {}", self.context, self.problem)
        }
    }
}

impl Error for ValidationError {}
