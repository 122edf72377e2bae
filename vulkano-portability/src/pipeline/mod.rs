// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Translated pipelines, and the state they encode at draw or dispatch time.
//!
//! There are two kinds of pipelines:
//!
//! - Compute pipelines, compiled into one native compute pipeline state.
//! - Graphics pipelines, compiled into one native render pipeline state, or, when the pipeline
//!   tessellates, into a sequence of passes that emulate the tessellation stages.
//!
//! Both kinds are wrapped in the closed [`Pipeline`] enum, which the command recorder uses to
//! walk the [`stages`](Pipeline::stages) of a pipeline and [`encode`](Pipeline::encode) each of
//! them in order.

use self::{compiler::CompileError, compute::ComputePipeline, graphics::GraphicsPipeline};
use crate::{
    command_buffer::CommandEncoder,
    macros::vulkan_enum,
    shader::{
        conversion::ShaderConversionError, EntryPoint, NativeShaderStage, SpecializationConstant,
        ShaderStage,
    },
    Format, ValidationError,
};
use foldhash::HashMap;
use std::{
    borrow::Cow,
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    iter::FusedIterator,
    ops::Index,
    sync::Arc,
};

pub mod cache;
pub mod compiler;
pub mod compute;
pub mod graphics;
pub mod layout;

/// A pipeline of either kind.
#[derive(Clone, Debug)]
pub enum Pipeline {
    Graphics(Arc<GraphicsPipeline>),
    Compute(Arc<ComputePipeline>),
}

impl Pipeline {
    /// Returns the stages the command recorder must encode, once each and in order, to execute
    /// the pipeline for one draw or dispatch.
    #[inline]
    pub fn stages(&self) -> PipelineStages {
        match self {
            Pipeline::Graphics(pipeline) => pipeline.stages(),
            Pipeline::Compute(pipeline) => pipeline.stages(),
        }
    }

    /// Binds the compiled state of `stage`, and the fixed state that goes with it.
    #[inline]
    pub fn encode(
        &self,
        encoder: &mut dyn CommandEncoder,
        stage: PipelineStage,
    ) -> Result<(), Box<ValidationError>> {
        match self {
            Pipeline::Graphics(pipeline) => pipeline.encode(encoder, stage),
            Pipeline::Compute(pipeline) => pipeline.encode(encoder, stage),
        }
    }

    /// Returns the slots of the auxiliary buffer.
    #[inline]
    pub fn aux_buffer_index(&self) -> &ImplicitBinding {
        match self {
            Pipeline::Graphics(pipeline) => pipeline.aux_buffer_index(),
            Pipeline::Compute(pipeline) => pipeline.aux_buffer_index(),
        }
    }

    /// Returns whether full image view swizzling was enabled when the pipeline was built.
    #[inline]
    pub fn full_image_view_swizzle(&self) -> bool {
        match self {
            Pipeline::Graphics(pipeline) => pipeline.full_image_view_swizzle(),
            Pipeline::Compute(pipeline) => pipeline.full_image_view_swizzle(),
        }
    }
}

impl From<Arc<GraphicsPipeline>> for Pipeline {
    #[inline]
    fn from(pipeline: Arc<GraphicsPipeline>) -> Self {
        Pipeline::Graphics(pipeline)
    }
}

impl From<Arc<ComputePipeline>> for Pipeline {
    #[inline]
    fn from(pipeline: Arc<ComputePipeline>) -> Self {
        Pipeline::Compute(pipeline)
    }
}

/// Specifies a single shader stage when creating a pipeline.
#[derive(Clone, Debug)]
pub struct PipelineShaderStageCreateInfo {
    /// The shader entry point for the stage.
    ///
    /// There is no default value.
    pub entry_point: EntryPoint,

    /// Values for the specialization constants in the shader, indexed by their `constant_id`.
    ///
    /// Specialization constants are constants whose value can be overridden when you create
    /// a pipeline. When provided, they must have the same type as defined in the shader.
    /// Constants that are not given a value here will have the default value that was specified
    /// for them in the shader code.
    ///
    /// The default value is empty.
    pub specialization_info: HashMap<u32, SpecializationConstant>,

    pub _ne: crate::NonExhaustive,
}

impl PipelineShaderStageCreateInfo {
    /// Returns a `PipelineShaderStageCreateInfo` with the specified `entry_point`.
    #[inline]
    pub fn new(entry_point: EntryPoint) -> Self {
        Self {
            entry_point,
            specialization_info: HashMap::default(),
            _ne: crate::NonExhaustive(()),
        }
    }

    /// Returns the stage of the entry point.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.entry_point.info().stage
    }
}

/// One pass of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// The vertex shader of a tessellated pipeline, run as a render pass without rasterization
    /// that captures its outputs.
    Vertex,

    /// The tessellation control shader, run as a compute pass that writes control points,
    /// per-patch data and tessellation levels.
    TessellationControl,

    /// A render pass. For a tessellated pipeline, its vertex function is the tessellation
    /// evaluation shader.
    Rasterization,

    /// A compute dispatch.
    Compute,
}

/// The ordered stages of a pipeline.
///
/// Consuming the iterator is the only way to walk the stages; it can't be restarted.
#[derive(Clone, Debug)]
pub struct PipelineStages {
    stages: &'static [PipelineStage],
}

impl PipelineStages {
    pub(crate) const RASTERIZATION: Self = Self {
        stages: &[PipelineStage::Rasterization],
    };

    pub(crate) const TESSELLATION: Self = Self {
        stages: &[
            PipelineStage::Vertex,
            PipelineStage::TessellationControl,
            PipelineStage::Rasterization,
        ],
    };

    pub(crate) const COMPUTE: Self = Self {
        stages: &[PipelineStage::Compute],
    };
}

impl Iterator for PipelineStages {
    type Item = PipelineStage;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (&first, rest) = self.stages.split_first()?;
        self.stages = rest;

        Some(first)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.stages.len(), Some(self.stages.len()))
    }
}

impl ExactSizeIterator for PipelineStages {}

impl FusedIterator for PipelineStages {}

/// A native slot per shader stage, for a resource the application did not declare but the
/// translated shaders need.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImplicitBinding(pub(crate) [u32; NativeShaderStage::COUNT]);

impl ImplicitBinding {
    /// Returns the slot in `stage`.
    #[inline]
    pub fn get(&self, stage: NativeShaderStage) -> u32 {
        self.0[stage.index()]
    }
}

impl Index<NativeShaderStage> for ImplicitBinding {
    type Output = u32;

    #[inline]
    fn index(&self, stage: NativeShaderStage) -> &u32 {
        &self.0[stage.index()]
    }
}

vulkan_enum! {
    /// A particular state value within a graphics pipeline that can be dynamically set by a
    /// command buffer.
    DynamicState = DynamicState(i32);

    Viewport = VIEWPORT,

    Scissor = SCISSOR,

    LineWidth = LINE_WIDTH,

    DepthBias = DEPTH_BIAS,

    BlendConstants = BLEND_CONSTANTS,

    DepthBounds = DEPTH_BOUNDS,

    StencilCompareMask = STENCIL_COMPARE_MASK,

    StencilWriteMask = STENCIL_WRITE_MASK,

    StencilReference = STENCIL_REFERENCE,
}

/// A set of [`DynamicState`] values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DynamicStateSet(u32);

impl DynamicStateSet {
    /// Returns an empty set.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub fn insert(&mut self, state: DynamicState) {
        self.0 |= 1 << state as u32;
    }

    #[inline]
    pub fn contains(&self, state: DynamicState) -> bool {
        self.0 & (1 << state as u32) != 0
    }

    /// Returns whether the raw Vulkan value is in the set. Values outside the range of
    /// [`DynamicState`] are never in the set.
    #[inline]
    pub fn contains_raw(&self, state: ash::vk::DynamicState) -> bool {
        DynamicState::try_from(state).is_ok_and(|state| self.contains(state))
    }
}

impl FromIterator<DynamicState> for DynamicStateSet {
    fn from_iter<T: IntoIterator<Item = DynamicState>>(iter: T) -> Self {
        let mut set = Self::empty();

        for state in iter {
            set.insert(state);
        }

        set
    }
}

/// Error that can happen when creating a graphics or compute pipeline.
#[derive(Clone, Debug)]
pub enum PipelineCreationError {
    /// The create info did not meet the requirements of the API.
    ValidationError(Box<ValidationError>),

    /// The pipeline uses something the native backend can't do.
    FeatureNotPresent { problem: Cow<'static, str> },

    /// The shaders lack information the pipeline needs.
    ShaderReflectionFailed {
        stage: ShaderStage,
        problem: Cow<'static, str>,
    },

    /// The shader converter rejected a shader.
    ShaderConversionFailed {
        stage: ShaderStage,
        error: ShaderConversionError,
    },

    /// A slot the translation needs collides with the slots taken by the application.
    NoFreeBufferSlot {
        stage: ShaderStage,
        purpose: &'static str,
        index: u32,
    },

    /// A vertex attribute format has no native equivalent.
    UnsupportedFormat { location: u32, format: Format },

    /// The backend failed to compile a pipeline state.
    Compile(CompileError),
}

impl Error for PipelineCreationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ValidationError(err) => Some(err.as_ref()),
            Self::ShaderConversionFailed { error, .. } => Some(error),
            Self::Compile(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for PipelineCreationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::ValidationError(_) => write!(f, "a validation error occurred"),
            Self::FeatureNotPresent { problem } => {
                write!(f, "the native backend does not support this: {}", problem)
            }
            Self::ShaderReflectionFailed { stage, problem } => {
                write!(f, "failed to reflect the {:?} shader: {}", stage, problem)
            }
            Self::ShaderConversionFailed { stage, .. } => {
                write!(f, "failed to convert the {:?} shader", stage)
            }
            Self::NoFreeBufferSlot {
                stage,
                purpose,
                index,
            } => write!(
                f,
                "the {:?} shader requires buffer {} for the {} buffer, which is not free",
                stage, index, purpose,
            ),
            Self::UnsupportedFormat { location, format } => write!(
                f,
                "the vertex attribute at location {} has format {:?}, which the native \
                backend can't read",
                location, format,
            ),
            Self::Compile(_) => write!(f, "the backend failed to compile a pipeline state"),
        }
    }
}

impl From<Box<ValidationError>> for PipelineCreationError {
    #[inline]
    fn from(err: Box<ValidationError>) -> Self {
        Self::ValidationError(err)
    }
}

impl From<CompileError> for PipelineCreationError {
    #[inline]
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_in_order() {
        let stages: Vec<_> = PipelineStages::TESSELLATION.collect();
        assert_eq!(
            stages,
            [
                PipelineStage::Vertex,
                PipelineStage::TessellationControl,
                PipelineStage::Rasterization,
            ],
        );

        let mut stages = PipelineStages::RASTERIZATION;
        assert_eq!(stages.len(), 1);
        assert_eq!(stages.next(), Some(PipelineStage::Rasterization));
        assert_eq!(stages.next(), None);
        assert_eq!(stages.next(), None);
    }

    #[test]
    fn dynamic_state_bounds() {
        let set: DynamicStateSet = [DynamicState::Viewport, DynamicState::StencilReference]
            .into_iter()
            .collect();

        assert!(set.contains_raw(ash::vk::DynamicState::VIEWPORT));
        assert!(set.contains_raw(ash::vk::DynamicState::STENCIL_REFERENCE));
        assert!(!set.contains_raw(ash::vk::DynamicState::SCISSOR));
        assert!(!set.contains_raw(ash::vk::DynamicState::CULL_MODE));
        assert!(!set.contains_raw(ash::vk::DynamicState::from_raw(-1)));
        assert!(!set.contains_raw(ash::vk::DynamicState::from_raw(31)));
        assert!(!set.contains_raw(ash::vk::DynamicState::from_raw(i32::MAX)));
    }
}
