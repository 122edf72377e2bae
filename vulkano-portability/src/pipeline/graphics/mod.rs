// Copyright (c) 2017 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! A pipeline that performs graphics processing operations.
//!
//! A graphics pipeline consists of several shaders, with fixed-function state in between. The
//! shaders are converted for the native backend, and the fixed-function state is split in two:
//!
//! - State that the native backend bakes into a render pipeline state (vertex fetch, attachment
//!   formats, blending, sample count, the tessellator configuration) goes into the descriptors
//!   that are compiled when the pipeline is created.
//! - State that the native backend sets on the command encoder (depth/stencil, culling, winding,
//!   depth bias, viewports and scissors, blend constants) is kept on the pipeline and encoded
//!   each time the pipeline is bound, except for the state declared dynamic.
//!
//! The native backend has no programmable tessellation stages. When the pipeline has tessellation
//! shaders, it is emulated with three passes; see the [`tessellation`] module.
//!
//! A graphics pipeline contains many configuration options, which are grouped into collections of
//! "state". Each state collection has a dedicated submodule.

use self::{
    color_blend::ColorBlendState,
    depth_stencil::DepthStencilState,
    input_assembly::{InputAssemblyState, PrimitiveTopology},
    multisample::MultisampleState,
    rasterization::{CullMode, PolygonMode, RasterizationState},
    subpass::PipelineRenderingCreateInfo,
    tessellation::{
        is_level, level_attributes, CapturedLayout, TessellationInfo, TessellationState,
        TESS_CONTROL_INDEX_BUFFER_INDEX, TESS_CONTROL_INPUT_BUFFER_INDEX,
        TESS_CONTROL_INPUT_THREADGROUP_MEM_INDEX, TESS_LEVEL_BUFFER_INDEX,
    },
    vertex_input::{native_vertex_format, shader_attribute_format, VertexInputRate, VertexInputState},
    viewport::ViewportState,
};
use super::{
    cache::PipelineCache,
    compiler::{ComputePipelineCompiler, RenderPipelineCompiler},
    layout::PipelineLayout,
    DynamicState, DynamicStateSet, ImplicitBinding, PipelineCreationError,
    PipelineShaderStageCreateInfo, PipelineStage, PipelineStages,
};
use crate::{
    backend::{
        descriptor::{
            self, AttributeDescriptor, ColorAttachmentDescriptor, ComputePipelineDescriptor,
            DepthBias, DepthClipMode, IndexType, PrimitiveTopologyClass, PrimitiveType,
            RenderPipelineDescriptor, ScissorRect, StageInputLayoutDescriptor,
            StageInputOutputDescriptor, StepFunction, TriangleFillMode, VertexBufferLayoutDescriptor,
            VertexDescriptor, VertexFormat, VertexStepFunction, Winding,
        },
        ComputePipelineState, RenderPipelineState,
    },
    command_buffer::CommandEncoder,
    device::{Device, DeviceOwned},
    macros::impl_id_counter,
    shader::{
        conversion::{ShaderConversionContext, VertexAttribute},
        BuiltIn, NativeShaderStage, ShaderFunction, ShaderStage, ShaderStages,
    },
    ValidationError,
};
use foldhash::HashSet;
use log::error;
use smallvec::SmallVec;
use std::{num::NonZero, sync::Arc};

pub mod color_blend;
pub mod depth_stencil;
pub mod input_assembly;
pub mod multisample;
pub mod rasterization;
pub mod subpass;
pub mod tessellation;
pub mod vertex_input;
pub mod viewport;

/// Defines how the implementation should perform a draw operation.
///
/// This object contains the shaders and the various fixed states that describe how the
/// implementation should perform the various operations needed by a draw command.
#[derive(Debug)]
pub struct GraphicsPipeline {
    device: Arc<Device>,
    id: NonZero<u64>,
    layout: Arc<PipelineLayout>,

    render_state: RenderPipelineState,
    tessellation: Option<TessellationPasses>,

    shader_stages: ShaderStages,
    primitive_type: PrimitiveType,
    is_rasterizing: bool,
    cull_mode: descriptor::CullMode,
    front_face: Winding,
    fill_mode: TriangleFillMode,
    depth_clip_mode: DepthClipMode,
    depth_bias: Option<DepthBias>,
    depth_stencil_state: DepthStencilState,
    blend_constants: [f32; 4],
    viewports: SmallVec<[descriptor::Viewport; 1]>,
    scissors: SmallVec<[ScissorRect; 1]>,
    dynamic_state: DynamicStateSet,

    needs_aux_buffer: [bool; NativeShaderStage::COUNT],
    needs_vertex_output_buffer: bool,
    needs_tess_ctl_output_buffer: bool,
    needs_tess_ctl_patch_output_buffer: bool,
    needs_tess_ctl_input: bool,

    full_image_view_swizzle: bool,
}

/// The extra passes of a tessellated pipeline.
#[derive(Debug)]
struct TessellationPasses {
    vertex_state: RenderPipelineState,
    control_states: TessellationControlStates,
    input_control_points: u32,
    output_control_points: u32,
}

/// The tessellation control pass, compiled once per way of fetching the input control points.
#[derive(Debug)]
struct TessellationControlStates {
    non_indexed: ComputePipelineState,
    index16: ComputePipelineState,
    index32: ComputePipelineState,
}

impl TessellationControlStates {
    fn get(&self, index_type: Option<IndexType>) -> &ComputePipelineState {
        match index_type {
            None => &self.non_indexed,
            Some(IndexType::UInt16) => &self.index16,
            Some(IndexType::UInt32) => &self.index32,
        }
    }
}

/// The entry points of a graphics pipeline, sorted by stage.
struct GraphicsStages<'a> {
    vertex: &'a PipelineShaderStageCreateInfo,
    tessellation: Option<(
        &'a PipelineShaderStageCreateInfo,
        &'a PipelineShaderStageCreateInfo,
    )>,
    fragment: Option<&'a PipelineShaderStageCreateInfo>,
}

impl GraphicsPipeline {
    /// Creates a new `GraphicsPipeline`.
    ///
    /// Every native state the pipeline needs is compiled before this returns. If any of them
    /// fails to compile, the ones already compiled are released and an error is returned.
    pub fn new(
        device: Arc<Device>,
        cache: Option<Arc<PipelineCache>>,
        create_info: GraphicsPipelineCreateInfo,
    ) -> Result<Arc<GraphicsPipeline>, PipelineCreationError> {
        Self::validate_new(&device, cache.as_deref(), &create_info)?;

        let GraphicsPipelineCreateInfo {
            stages,
            vertex_input_state,
            input_assembly_state,
            tessellation_state,
            viewport_state,
            rasterization_state,
            multisample_state,
            depth_stencil_state,
            color_blend_state,
            dynamic_state,
            subpass,
            layout,
            _ne: _,
        } = create_info;

        let graphics_stages = sort_stages(&stages)?;

        let vertex_input_state = vertex_input_state.unwrap_or_default();
        let input_assembly_state = input_assembly_state.unwrap_or_default();
        let rasterization_state = rasterization_state.unwrap_or_default();
        let multisample_state = multisample_state.unwrap_or_default();
        let subpass = subpass.unwrap_or_default();
        let dynamic_state: DynamicStateSet = dynamic_state.into_iter().collect();

        let topology = input_assembly_state.topology;
        let primitive_type =
            topology
                .primitive_type()
                .ok_or_else(|| PipelineCreationError::FeatureNotPresent {
                    problem: format!("the {:?} primitive topology", topology).into(),
                })?;

        let vertex_input = VertexInput::new(&device, &vertex_input_state)?;

        let tessellation_info = match graphics_stages.tessellation {
            Some((control, evaluation)) => Some(TessellationInfo::merge(
                &control.entry_point.info().tessellation,
                &evaluation.entry_point.info().tessellation,
            )?),
            None => None,
        };

        let is_rendering_points = topology == PrimitiveTopology::PointList
            || rasterization_state.polygon_mode == PolygonMode::Point
            || tessellation_info.is_some_and(|info| info.point_mode);

        let builder = PassBuilder {
            device: &device,
            layout: &layout,
            cache: cache.as_deref(),
            is_rendering_points,
            is_rasterization_disabled: rasterization_state.is_rasterization_disabled(),
        };

        let mut flags = PipelineFlags::default();

        let (render_state, tessellation, is_rasterizing) = match (
            graphics_stages.tessellation,
            tessellation_info,
        ) {
            (Some((control, evaluation)), Some(info)) => {
                let tessellation_state = tessellation_state.unwrap_or_default();

                // Vertex pass.
                let mut context = builder.context(NativeShaderStage::Vertex, graphics_stages.vertex);
                context.options.should_capture_output = true;
                context.options.is_rasterization_disabled = true;
                context.options.should_flip_vertex_y = false;
                context.vertex_attributes = vertex_input.conversion_attributes();
                let vertex_function = builder.convert(graphics_stages.vertex, &mut context)?;

                flags.needs_aux_buffer[NativeShaderStage::Vertex.index()] =
                    vertex_function.results().needs_aux_buffer;
                flags.needs_vertex_output_buffer = vertex_function.results().needs_output_buffer;
                builder.check_vertex_slots(&flags, vertex_input.buffer_slot_count)?;

                let vertex_descriptor = RenderPipelineDescriptor {
                    label: String::from("Tessellation vertex stage"),
                    vertex_descriptor: vertex_input.native_descriptor(&context),
                    vertex_function: Some(vertex_function),
                    rasterization_enabled: false,
                    sample_count: 1,
                    input_primitive_topology: PrimitiveTopologyClass::Point,
                    ..Default::default()
                };

                // Tessellation control pass.
                let control_input = CapturedLayout::new(
                    ShaderStage::Vertex,
                    TESS_CONTROL_INPUT_BUFFER_INDEX,
                    graphics_stages
                        .vertex
                        .entry_point
                        .info()
                        .outputs
                        .iter()
                        .filter(|output| {
                            is_rendering_points || output.builtin != Some(BuiltIn::PointSize)
                        }),
                )?;

                let mut context = builder.context(NativeShaderStage::TessellationControl, control);
                context.options.input_threadgroup_mem_index =
                    TESS_CONTROL_INPUT_THREADGROUP_MEM_INDEX;
                context.options.tess_patch_kind = Some(info.patch_kind);
                context.options.num_tess_control_points = info.output_control_points;
                context.vertex_attributes = control_input.conversion_attributes().collect();
                let control_function = builder.convert(control, &mut context)?;

                let results = *control_function.results();
                flags.needs_aux_buffer[NativeShaderStage::TessellationControl.index()] =
                    results.needs_aux_buffer;
                flags.needs_tess_ctl_output_buffer = results.needs_output_buffer;
                flags.needs_tess_ctl_patch_output_buffer = results.needs_patch_output_buffer;
                flags.needs_tess_ctl_input = results.needs_input_threadgroup_mem;
                builder.check_tess_ctl_slots(&flags)?;

                let control_attributes =
                    control_input.native_attributes(|location| {
                        context.is_vertex_attribute_location_used(location)
                    });
                let control_descriptor = |index_type: Option<IndexType>| ComputePipelineDescriptor {
                    label: String::from("Tessellation control stage"),
                    compute_function: Some(control_function.clone()),
                    stage_input_descriptor: Some(StageInputOutputDescriptor {
                        attributes: control_attributes.clone(),
                        layouts: (!control_input.outputs.is_empty())
                            .then_some((
                                TESS_CONTROL_INPUT_BUFFER_INDEX,
                                StageInputLayoutDescriptor {
                                    stride: control_input.stride,
                                    step_function: match index_type {
                                        None => StepFunction::ThreadPositionInGridX,
                                        Some(_) => StepFunction::ThreadPositionInGridXIndexed,
                                    },
                                    step_rate: 1,
                                },
                            ))
                            .into_iter()
                            .collect(),
                        index_buffer_index: TESS_CONTROL_INDEX_BUFFER_INDEX,
                        index_type,
                    }),
                };

                // Tessellation evaluation and fragment, in the raster pass.
                let control_outputs = &control.entry_point.info().outputs;
                let per_vertex = CapturedLayout::new(
                    ShaderStage::TessellationControl,
                    TESS_CONTROL_INPUT_BUFFER_INDEX,
                    control_outputs.iter().filter(|output| !output.per_patch),
                )?;
                let per_patch = CapturedLayout::new(
                    ShaderStage::TessellationControl,
                    TESS_CONTROL_INDEX_BUFFER_INDEX,
                    control_outputs
                        .iter()
                        .filter(|output| output.per_patch && !is_level(output)),
                )?;

                let mut context =
                    builder.context(NativeShaderStage::TessellationEvaluation, evaluation);
                context.options.tess_patch_kind = Some(info.patch_kind);
                context.options.num_tess_control_points = info.output_control_points;
                context.options.tess_domain_origin_in_lower_left = tessellation_state.domain_origin
                    == tessellation::TessellationDomainOrigin::LowerLeft;
                context.vertex_attributes = per_vertex
                    .conversion_attributes()
                    .chain(per_patch.conversion_attributes())
                    .collect();
                let evaluation_function = builder.convert(evaluation, &mut context)?;

                flags.needs_aux_buffer[NativeShaderStage::TessellationEvaluation.index()] =
                    evaluation_function.results().needs_aux_buffer;
                builder.check_slot(
                    ShaderStage::TessellationEvaluation,
                    "auxiliary",
                    flags.needs_aux_buffer[NativeShaderStage::TessellationEvaluation.index()],
                    layout.aux_buffer_index()[NativeShaderStage::TessellationEvaluation],
                    3,
                )?;

                let is_rasterizing = !builder.is_rasterization_disabled
                    && !evaluation_function.results().is_rasterization_disabled;
                let fragment_function = builder.fragment(
                    graphics_stages.fragment.filter(|_| is_rasterizing),
                    &mut flags,
                )?;

                let is_used = |location| context.is_vertex_attribute_location_used(location);
                let mut raster_vertex_descriptor = VertexDescriptor::default();
                for layout in [&per_vertex, &per_patch] {
                    raster_vertex_descriptor
                        .attributes
                        .extend(layout.native_attributes(is_used));
                }
                raster_vertex_descriptor
                    .attributes
                    .extend(level_attributes(&info, control_outputs));
                raster_vertex_descriptor.layouts.extend(
                    [
                        (
                            TESS_CONTROL_INPUT_BUFFER_INDEX,
                            per_vertex.native_layout(VertexStepFunction::PerPatchControlPoint),
                        ),
                        (
                            TESS_CONTROL_INDEX_BUFFER_INDEX,
                            per_patch.native_layout(VertexStepFunction::PerPatch),
                        ),
                        (
                            TESS_LEVEL_BUFFER_INDEX,
                            Some(VertexBufferLayoutDescriptor {
                                stride: info.level_stride(),
                                step_function: VertexStepFunction::PerPatch,
                                step_rate: 1,
                            }),
                        ),
                    ]
                    .into_iter()
                    .filter_map(|(index, layout)| Some((index, layout?))),
                );

                let mut raster_descriptor = RenderPipelineDescriptor {
                    label: String::from("Tessellation raster stage"),
                    vertex_function: Some(evaluation_function),
                    fragment_function,
                    vertex_descriptor: raster_vertex_descriptor,
                    input_primitive_topology: if info.point_mode {
                        PrimitiveTopologyClass::Point
                    } else {
                        PrimitiveTopologyClass::Triangle
                    },
                    tessellation: Some(info.descriptor(
                        tessellation_state.domain_origin,
                        device.metal_features().max_tessellation_factor,
                    )),
                    ..Default::default()
                };
                fill_output_state(
                    &mut raster_descriptor,
                    is_rasterizing,
                    &subpass,
                    color_blend_state.as_ref(),
                    &multisample_state,
                );

                // Compile every pass; any failure drops the states compiled so far.
                let vertex_state =
                    RenderPipelineCompiler::new(device.clone()).compile(&vertex_descriptor)?;
                let control_states = TessellationControlStates {
                    non_indexed: ComputePipelineCompiler::new(device.clone())
                        .compile(&control_descriptor(None))?,
                    index16: ComputePipelineCompiler::new(device.clone())
                        .compile(&control_descriptor(Some(IndexType::UInt16)))?,
                    index32: ComputePipelineCompiler::new(device.clone())
                        .compile(&control_descriptor(Some(IndexType::UInt32)))?,
                };
                let render_state =
                    RenderPipelineCompiler::new(device.clone()).compile(&raster_descriptor)?;

                (
                    render_state,
                    Some(TessellationPasses {
                        vertex_state,
                        control_states,
                        input_control_points: tessellation_state.patch_control_points,
                        output_control_points: info.output_control_points,
                    }),
                    is_rasterizing,
                )
            }
            _ => {
                let mut context = builder.context(NativeShaderStage::Vertex, graphics_stages.vertex);
                context.options.should_flip_vertex_y =
                    device.configuration().shader_conversion_flip_vertex_y;
                context.options.is_rendering_points = is_rendering_points;
                context.options.is_rasterization_disabled = builder.is_rasterization_disabled;
                context.vertex_attributes = vertex_input.conversion_attributes();
                let vertex_function = builder.convert(graphics_stages.vertex, &mut context)?;

                flags.needs_aux_buffer[NativeShaderStage::Vertex.index()] =
                    vertex_function.results().needs_aux_buffer;
                flags.needs_vertex_output_buffer = vertex_function.results().needs_output_buffer;
                builder.check_vertex_slots(&flags, vertex_input.buffer_slot_count)?;

                let is_rasterizing = !builder.is_rasterization_disabled
                    && !vertex_function.results().is_rasterization_disabled;
                let fragment_function = builder.fragment(
                    graphics_stages.fragment.filter(|_| is_rasterizing),
                    &mut flags,
                )?;

                let mut render_descriptor = RenderPipelineDescriptor {
                    label: String::from("Graphics pipeline"),
                    vertex_descriptor: vertex_input.native_descriptor(&context),
                    vertex_function: Some(vertex_function),
                    fragment_function,
                    input_primitive_topology: topology.class(),
                    ..Default::default()
                };
                fill_output_state(
                    &mut render_descriptor,
                    is_rasterizing,
                    &subpass,
                    color_blend_state.as_ref(),
                    &multisample_state,
                );

                let render_state =
                    RenderPipelineCompiler::new(device.clone()).compile(&render_descriptor)?;

                (render_state, None, is_rasterizing)
            }
        };

        let viewport_state = viewport_state.unwrap_or_default();
        let viewports = if dynamic_state.contains(DynamicState::Viewport) {
            viewport_state
                .viewports
                .iter()
                .map(|_| descriptor::Viewport::default())
                .collect()
        } else {
            viewport_state.viewports.iter().map(Into::into).collect()
        };
        let scissors = if dynamic_state.contains(DynamicState::Scissor) {
            viewport_state
                .scissors
                .iter()
                .map(|_| ScissorRect::default())
                .collect()
        } else {
            viewport_state.scissors.iter().map(Into::into).collect()
        };

        Ok(Arc::new(GraphicsPipeline {
            id: Self::next_id(),
            layout,

            render_state,
            tessellation,

            shader_stages: stages.iter().map(|stage| stage.stage()).collect(),
            primitive_type,
            is_rasterizing,
            cull_mode: rasterization_state.cull_mode.into(),
            front_face: rasterization_state.front_face.into(),
            fill_mode: rasterization_state.polygon_mode.into(),
            depth_clip_mode: if rasterization_state.depth_clamp_enable {
                DepthClipMode::Clamp
            } else {
                DepthClipMode::Clip
            },
            depth_bias: rasterization_state.depth_bias.map(Into::into),
            depth_stencil_state: depth_stencil_state.unwrap_or_default(),
            blend_constants: color_blend_state
                .map_or([0.0; 4], |state| state.blend_constants),
            viewports,
            scissors,
            dynamic_state,

            needs_aux_buffer: flags.needs_aux_buffer,
            needs_vertex_output_buffer: flags.needs_vertex_output_buffer,
            needs_tess_ctl_output_buffer: flags.needs_tess_ctl_output_buffer,
            needs_tess_ctl_patch_output_buffer: flags.needs_tess_ctl_patch_output_buffer,
            needs_tess_ctl_input: flags.needs_tess_ctl_input,

            full_image_view_swizzle: device.configuration().full_image_view_swizzle,
            device,
        }))
    }

    fn validate_new(
        device: &Device,
        cache: Option<&PipelineCache>,
        create_info: &GraphicsPipelineCreateInfo,
    ) -> Result<(), Box<ValidationError>> {
        if let Some(cache) = cache {
            if cache.device().as_ref() != device {
                return Err(Box::new(ValidationError {
                    context: "cache".into(),
                    problem: "was not created from the same device".into(),
                    ..Default::default()
                }));
            }
        }

        create_info
            .validate(device)
            .map_err(|err| err.add_context("create_info"))
    }

    /// Returns the pipeline layout used in this graphics pipeline.
    #[inline]
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    /// Returns the shader stages the pipeline was created with.
    #[inline]
    pub fn shader_stages(&self) -> ShaderStages {
        self.shader_stages
    }

    /// Returns the passes to encode for one draw.
    #[inline]
    pub fn stages(&self) -> PipelineStages {
        if self.tessellation.is_some() {
            PipelineStages::TESSELLATION
        } else {
            PipelineStages::RASTERIZATION
        }
    }

    /// Returns the compiled state of the raster pass.
    #[inline]
    pub fn render_state(&self) -> &RenderPipelineState {
        &self.render_state
    }

    /// Returns the compiled state of the tessellation vertex pass, if the pipeline tessellates.
    #[inline]
    pub fn tessellation_vertex_state(&self) -> Option<&RenderPipelineState> {
        self.tessellation.as_ref().map(|passes| &passes.vertex_state)
    }

    /// Returns the tessellation control state to use with an index buffer of type `index_type`,
    /// or with no index buffer if `None`.
    #[inline]
    pub fn tessellation_control_state(
        &self,
        index_type: Option<IndexType>,
    ) -> Option<&ComputePipelineState> {
        self.tessellation
            .as_ref()
            .map(|passes| passes.control_states.get(index_type))
    }

    #[inline]
    pub fn is_tessellation_pipeline(&self) -> bool {
        self.tessellation.is_some()
    }

    /// Returns the number of control points per input patch, or 0 if the pipeline does not
    /// tessellate.
    #[inline]
    pub fn input_control_point_count(&self) -> u32 {
        self.tessellation
            .as_ref()
            .map_or(0, |passes| passes.input_control_points)
    }

    /// Returns the number of control points per output patch, or 0 if the pipeline does not
    /// tessellate.
    #[inline]
    pub fn output_control_point_count(&self) -> u32 {
        self.tessellation
            .as_ref()
            .map_or(0, |passes| passes.output_control_points)
    }

    /// Returns whether primitives reach the rasterizer.
    #[inline]
    pub fn is_rasterizing(&self) -> bool {
        self.is_rasterizing
    }

    /// Returns the set of states declared dynamic.
    #[inline]
    pub fn dynamic_state(&self) -> DynamicStateSet {
        self.dynamic_state
    }

    /// Returns whether `state` was declared dynamic. Values that are not a supported dynamic
    /// state return `false`.
    #[inline]
    pub fn supports_dynamic_state(&self, state: ash::vk::DynamicState) -> bool {
        self.dynamic_state.contains_raw(state)
    }

    /// Returns whether the shader of `stage` reads the auxiliary buffer.
    #[inline]
    pub fn needs_aux_buffer(&self, stage: NativeShaderStage) -> bool {
        self.needs_aux_buffer[stage.index()]
    }

    #[inline]
    pub fn needs_vertex_output_buffer(&self) -> bool {
        self.needs_vertex_output_buffer
    }

    #[inline]
    pub fn needs_tess_ctl_output_buffer(&self) -> bool {
        self.needs_tess_ctl_output_buffer
    }

    #[inline]
    pub fn needs_tess_ctl_patch_output_buffer(&self) -> bool {
        self.needs_tess_ctl_patch_output_buffer
    }

    /// Returns whether the tessellation control pass stages its input control points in
    /// threadgroup memory.
    #[inline]
    pub fn needs_tess_ctl_input(&self) -> bool {
        self.needs_tess_ctl_input
    }

    #[inline]
    pub fn aux_buffer_index(&self) -> &ImplicitBinding {
        self.layout.aux_buffer_index()
    }

    #[inline]
    pub fn indirect_params_buffer_index(&self) -> &ImplicitBinding {
        self.layout.indirect_params_buffer_index()
    }

    #[inline]
    pub fn output_buffer_index(&self) -> &ImplicitBinding {
        self.layout.output_buffer_index()
    }

    #[inline]
    pub fn tess_ctl_patch_output_buffer_index(&self) -> &ImplicitBinding {
        self.layout.tess_ctl_patch_output_buffer_index()
    }

    #[inline]
    pub fn tess_ctl_level_buffer_index(&self) -> &ImplicitBinding {
        self.layout.tess_ctl_level_buffer_index()
    }

    #[inline]
    pub fn full_image_view_swizzle(&self) -> bool {
        self.full_image_view_swizzle
    }

    /// Binds the compiled state of `stage`, and the fixed state that goes with it.
    ///
    /// For the tessellation control pass, the variant matching `encoder.index_type()` is bound.
    pub fn encode(
        &self,
        encoder: &mut dyn CommandEncoder,
        stage: PipelineStage,
    ) -> Result<(), Box<ValidationError>> {
        match (stage, &self.tessellation) {
            (PipelineStage::Vertex, Some(passes)) => {
                encoder.set_render_pipeline_state(&passes.vertex_state);
            }
            (PipelineStage::TessellationControl, Some(passes)) => {
                encoder.set_compute_pipeline_state(
                    passes.control_states.get(encoder.index_type()),
                );

                if self.needs_tess_ctl_input {
                    encoder.set_threadgroup_memory_length(
                        self.device.metal_features().max_compute_shared_memory_size,
                        TESS_CONTROL_INPUT_THREADGROUP_MEM_INDEX,
                    );
                }
            }
            (PipelineStage::Rasterization, _) => self.encode_rasterization(encoder),
            _ => {
                return Err(Box::new(ValidationError {
                    context: "stage".into(),
                    problem: format!("{:?} is not a stage of this graphics pipeline", stage)
                        .into(),
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    fn encode_rasterization(&self, encoder: &mut dyn CommandEncoder) {
        let dynamic_state = self.dynamic_state;

        encoder.set_render_pipeline_state(&self.render_state);
        encoder.set_depth_stencil_state(&self.depth_stencil_state);

        if !dynamic_state.contains(DynamicState::StencilReference) {
            let (front, back) = self.depth_stencil_state.stencil_reference();
            encoder.set_stencil_reference(front, back);
        }

        encoder.set_cull_mode(self.cull_mode);
        encoder.set_front_facing_winding(self.front_face);
        encoder.set_triangle_fill_mode(self.fill_mode);

        if self.device.enabled_features().depth_clamp {
            encoder.set_depth_clip_mode(self.depth_clip_mode);
        }

        if !dynamic_state.contains(DynamicState::DepthBias) {
            encoder.set_depth_bias(self.depth_bias.unwrap_or_default());
        }

        if !dynamic_state.contains(DynamicState::BlendConstants) {
            encoder.set_blend_color(self.blend_constants);
        }

        if !dynamic_state.contains(DynamicState::Viewport) && !self.viewports.is_empty() {
            encoder.set_viewports(&self.viewports);
        }

        if !dynamic_state.contains(DynamicState::Scissor) && !self.scissors.is_empty() {
            encoder.set_scissor_rects(&self.scissors);
        }

        encoder.set_primitive_type(self.primitive_type);
    }
}

impl DeviceOwned for GraphicsPipeline {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl_id_counter!(GraphicsPipeline);

#[derive(Default)]
struct PipelineFlags {
    needs_aux_buffer: [bool; NativeShaderStage::COUNT],
    needs_vertex_output_buffer: bool,
    needs_tess_ctl_output_buffer: bool,
    needs_tess_ctl_patch_output_buffer: bool,
    needs_tess_ctl_input: bool,
}

/// Converts the stages of one pipeline.
struct PassBuilder<'a> {
    device: &'a Device,
    layout: &'a PipelineLayout,
    cache: Option<&'a PipelineCache>,
    is_rendering_points: bool,
    is_rasterization_disabled: bool,
}

impl PassBuilder<'_> {
    fn context(
        &self,
        stage: NativeShaderStage,
        stage_info: &PipelineShaderStageCreateInfo,
    ) -> ShaderConversionContext {
        let metal_features = self.device.metal_features();
        let layout = self.layout;

        let mut context = ShaderConversionContext::default();
        let options = &mut context.options;
        options.entry_point_name = stage_info.entry_point.info().name.clone();
        options.entry_point_stage = stage.shader_stage();
        options.msl_version = metal_features.msl_version;
        options.texel_buffer_texture_width = metal_features.max_texture_dimension;
        options.aux_buffer_index = layout.aux_buffer_index()[stage];
        options.indirect_params_buffer_index = layout.indirect_params_buffer_index()[stage];
        options.output_buffer_index = layout.output_buffer_index()[stage];
        options.patch_output_buffer_index = layout.tess_ctl_patch_output_buffer_index()[stage];
        options.tess_level_buffer_index = layout.tess_ctl_level_buffer_index()[stage];
        options.should_swizzle_texture_samples =
            self.device.configuration().full_image_view_swizzle;

        if stage == NativeShaderStage::TessellationEvaluation {
            options.should_flip_vertex_y =
                self.device.configuration().shader_conversion_flip_vertex_y;
            options.is_rendering_points = self.is_rendering_points;
            options.is_rasterization_disabled = self.is_rasterization_disabled;
        }

        layout.populate_shader_conversion_context(&mut context);

        context
    }

    fn convert(
        &self,
        stage_info: &PipelineShaderStageCreateInfo,
        context: &mut ShaderConversionContext,
    ) -> Result<ShaderFunction, PipelineCreationError> {
        stage_info
            .entry_point
            .module()
            .function(context, &stage_info.specialization_info, self.cache)
            .map_err(|error| PipelineCreationError::ShaderConversionFailed {
                stage: stage_info.stage(),
                error,
            })
    }

    fn fragment(
        &self,
        stage_info: Option<&PipelineShaderStageCreateInfo>,
        flags: &mut PipelineFlags,
    ) -> Result<Option<ShaderFunction>, PipelineCreationError> {
        let Some(stage_info) = stage_info else {
            return Ok(None);
        };

        let mut context = self.context(NativeShaderStage::Fragment, stage_info);
        let function = self.convert(stage_info, &mut context)?;

        flags.needs_aux_buffer[NativeShaderStage::Fragment.index()] =
            function.results().needs_aux_buffer;
        self.check_slot(
            ShaderStage::Fragment,
            "auxiliary",
            function.results().needs_aux_buffer,
            self.layout.aux_buffer_index()[NativeShaderStage::Fragment],
            0,
        )?;

        Ok(Some(function))
    }

    /// The top of the vertex stage's buffer slots holds the vertex buffers.
    fn check_vertex_slots(
        &self,
        flags: &PipelineFlags,
        vertex_buffer_slot_count: u32,
    ) -> Result<(), PipelineCreationError> {
        let stage = NativeShaderStage::Vertex;

        self.check_slot(
            ShaderStage::Vertex,
            "auxiliary",
            flags.needs_aux_buffer[stage.index()],
            self.layout.aux_buffer_index()[stage],
            vertex_buffer_slot_count,
        )?;
        self.check_slot(
            ShaderStage::Vertex,
            "output",
            flags.needs_vertex_output_buffer,
            self.layout.output_buffer_index()[stage],
            vertex_buffer_slot_count,
        )
    }

    /// The two top buffer slots of the tessellation control pass hold its input and index
    /// buffers.
    fn check_tess_ctl_slots(&self, flags: &PipelineFlags) -> Result<(), PipelineCreationError> {
        let stage = NativeShaderStage::TessellationControl;
        let layout = self.layout;

        for (purpose, needed, index) in [
            (
                "auxiliary",
                flags.needs_aux_buffer[stage.index()],
                layout.aux_buffer_index()[stage],
            ),
            (
                "indirect parameters",
                true,
                layout.indirect_params_buffer_index()[stage],
            ),
            (
                "output",
                flags.needs_tess_ctl_output_buffer,
                layout.output_buffer_index()[stage],
            ),
            (
                "per-patch output",
                flags.needs_tess_ctl_patch_output_buffer,
                layout.tess_ctl_patch_output_buffer_index()[stage],
            ),
            (
                "tessellation level",
                true,
                layout.tess_ctl_level_buffer_index()[stage],
            ),
        ] {
            self.check_slot(ShaderStage::TessellationControl, purpose, needed, index, 2)?;
        }

        Ok(())
    }

    /// Fails if a needed buffer lands in the `reserved` top slots of the stage.
    fn check_slot(
        &self,
        stage: ShaderStage,
        purpose: &'static str,
        needed: bool,
        index: u32,
        reserved: u32,
    ) -> Result<(), PipelineCreationError> {
        let limit = self
            .device
            .metal_features()
            .max_per_stage_buffer_count
            .saturating_sub(reserved);

        if needed && index >= limit {
            error!(
                "{:?} shader requires {} buffer, but there is no free slot to pass it.",
                stage, purpose,
            );

            return Err(PipelineCreationError::NoFreeBufferSlot {
                stage,
                purpose,
                index,
            });
        }

        Ok(())
    }
}

/// The application's vertex input, checked against what the native backend can fetch.
struct VertexInput<'a> {
    state: &'a VertexInputState,
    attributes: Vec<(u32, VertexFormat)>,
    max_per_stage_buffer_count: u32,

    /// The number of buffer slots, counted from the top, that vertex buffers may occupy.
    buffer_slot_count: u32,
}

impl<'a> VertexInput<'a> {
    fn new(device: &Device, state: &'a VertexInputState) -> Result<Self, PipelineCreationError> {
        for (&binding, description) in &state.bindings {
            if description.stride % 4 != 0 {
                return Err(PipelineCreationError::FeatureNotPresent {
                    problem: format!(
                        "a vertex stride of {} bytes for binding {}; strides must be a \
                        multiple of 4",
                        description.stride, binding,
                    )
                    .into(),
                });
            }
        }

        let mut attributes = state
            .attributes
            .iter()
            .map(|(&location, description)| {
                native_vertex_format(description.format)
                    .map(|format| (location, format))
                    .ok_or(PipelineCreationError::UnsupportedFormat {
                        location,
                        format: description.format,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        attributes.sort_unstable_by_key(|&(location, _)| location);

        Ok(VertexInput {
            state,
            attributes,
            max_per_stage_buffer_count: device.metal_features().max_per_stage_buffer_count,
            buffer_slot_count: state
                .bindings
                .keys()
                .max()
                .map_or(0, |&binding| binding + 1),
        })
    }

    fn native_buffer_index(&self, binding: u32) -> u32 {
        VertexInputState::native_buffer_index(binding, self.max_per_stage_buffer_count)
    }

    fn conversion_attributes(&self) -> Vec<VertexAttribute> {
        self.attributes
            .iter()
            .filter_map(|&(location, _)| {
                let description = self.state.attributes.get(&location)?;
                let binding = self.state.bindings.get(&description.binding)?;

                Some(VertexAttribute {
                    location,
                    msl_buffer: self.native_buffer_index(description.binding),
                    offset: description.offset,
                    stride: binding.stride,
                    is_per_instance: matches!(binding.input_rate, VertexInputRate::Instance { .. }),
                    format: shader_attribute_format(description.format),
                    builtin: None,
                    vec_width: 0,
                    is_used_by_shader: false,
                })
            })
            .collect()
    }

    /// Returns the vertex fetch of the attributes the converted shader reads, and of the
    /// bindings they read from.
    fn native_descriptor(&self, context: &ShaderConversionContext) -> VertexDescriptor {
        let mut descriptor = VertexDescriptor::default();

        for &(location, format) in &self.attributes {
            if !context.is_vertex_attribute_location_used(location) {
                continue;
            }

            let Some(description) = self.state.attributes.get(&location) else {
                continue;
            };
            let Some(binding) = self.state.bindings.get(&description.binding) else {
                continue;
            };
            let buffer_index = self.native_buffer_index(description.binding);

            descriptor.attributes.insert(
                location,
                AttributeDescriptor {
                    format,
                    offset: description.offset,
                    buffer_index,
                },
            );

            let (step_function, step_rate) = match binding.input_rate {
                _ if binding.stride == 0 => (VertexStepFunction::Constant, 0),
                VertexInputRate::Vertex => (VertexStepFunction::PerVertex, 1),
                VertexInputRate::Instance { divisor: 0 } => (VertexStepFunction::Constant, 0),
                VertexInputRate::Instance { divisor } => {
                    (VertexStepFunction::PerInstance, divisor)
                }
            };

            descriptor.layouts.insert(
                buffer_index,
                VertexBufferLayoutDescriptor {
                    stride: binding.stride,
                    step_function,
                    step_rate,
                },
            );
        }

        descriptor
    }
}

fn sort_stages(
    stages: &[PipelineShaderStageCreateInfo],
) -> Result<GraphicsStages<'_>, PipelineCreationError> {
    let find = |stage: ShaderStage| stages.iter().find(|info| info.stage() == stage);

    if find(ShaderStage::Geometry).is_some() {
        return Err(PipelineCreationError::FeatureNotPresent {
            problem: "geometry shaders".into(),
        });
    }

    let vertex = find(ShaderStage::Vertex).ok_or_else(|| {
        PipelineCreationError::ValidationError(Box::new(ValidationError {
            context: "create_info.stages".into(),
            problem: "does not contain a `ShaderStage::Vertex` stage".into(),
            vuids: &["VUID-VkGraphicsPipelineCreateInfo-stage-02096"],
        }))
    })?;

    Ok(GraphicsStages {
        vertex,
        tessellation: find(ShaderStage::TessellationControl)
            .zip(find(ShaderStage::TessellationEvaluation)),
        fragment: find(ShaderStage::Fragment),
    })
}

/// Fills in the attachment state of a render descriptor. Without rasterization, nothing is
/// written to the attachments.
fn fill_output_state(
    descriptor: &mut RenderPipelineDescriptor,
    is_rasterizing: bool,
    subpass: &PipelineRenderingCreateInfo,
    color_blend_state: Option<&ColorBlendState>,
    multisample_state: &MultisampleState,
) {
    descriptor.rasterization_enabled = is_rasterizing;
    descriptor.sample_count = multisample_state.rasterization_samples as u32;

    if !is_rasterizing {
        return;
    }

    descriptor.color_attachments = subpass
        .color_attachment_formats
        .iter()
        .enumerate()
        .map(|(index, format)| {
            let attachment_state = color_blend_state
                .and_then(|state| state.attachments.get(index))
                .copied()
                .unwrap_or_default();

            format.map(|pixel_format| ColorAttachmentDescriptor {
                pixel_format,
                write_mask: attachment_state.color_write_mask,
                blend: attachment_state.blend,
            })
        })
        .collect();
    descriptor.depth_attachment_pixel_format = subpass.depth_attachment_format;
    descriptor.stencil_attachment_pixel_format = subpass.stencil_attachment_format;
    descriptor.alpha_to_coverage_enabled = multisample_state.alpha_to_coverage_enable;
    descriptor.alpha_to_one_enabled = multisample_state.alpha_to_one_enable;
}

/// Parameters to create a new `GraphicsPipeline`.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineCreateInfo {
    /// The shader stages to use.
    ///
    /// A vertex shader must always be included. Other stages are optional.
    ///
    /// The default value is empty.
    pub stages: SmallVec<[PipelineShaderStageCreateInfo; 5]>,

    /// The vertex input state.
    ///
    /// The default value is `None`, which is the same as an empty vertex input state.
    pub vertex_input_state: Option<VertexInputState>,

    /// The input assembly state.
    ///
    /// The default value is `None`, which is the same as a triangle list.
    pub input_assembly_state: Option<InputAssemblyState>,

    /// The tessellation state.
    ///
    /// This state is used if `stages` contains tessellation shaders.
    ///
    /// The default value is `None`.
    pub tessellation_state: Option<TessellationState>,

    /// The viewport state.
    ///
    /// The default value is `None`, which encodes no viewports or scissors.
    pub viewport_state: Option<ViewportState>,

    /// The rasterization state.
    ///
    /// The default value is `None`, which is the same as `RasterizationState::default()`.
    pub rasterization_state: Option<RasterizationState>,

    /// The multisample state.
    ///
    /// The default value is `None`, which is the same as a single sample.
    pub multisample_state: Option<MultisampleState>,

    /// The depth/stencil state.
    ///
    /// The default value is `None`, which disables the depth and stencil tests.
    pub depth_stencil_state: Option<DepthStencilState>,

    /// The color blend state.
    ///
    /// The default value is `None`, which writes every color attachment unblended.
    pub color_blend_state: Option<ColorBlendState>,

    /// The state that will be set dynamically when recording a command buffer, rather than
    /// encoded with the pipeline.
    ///
    /// The default value is empty.
    pub dynamic_state: HashSet<DynamicState>,

    /// The formats of the attachments that will be rendered to.
    ///
    /// The default value is `None`, which is the same as no attachments.
    pub subpass: Option<PipelineRenderingCreateInfo>,

    /// The pipeline layout to use for the pipeline.
    ///
    /// There is no default value.
    pub layout: Arc<PipelineLayout>,

    pub _ne: crate::NonExhaustive,
}

impl GraphicsPipelineCreateInfo {
    /// Returns a `GraphicsPipelineCreateInfo` with the specified `layout`.
    #[inline]
    pub fn layout(layout: Arc<PipelineLayout>) -> Self {
        Self {
            stages: SmallVec::new(),
            vertex_input_state: None,
            input_assembly_state: None,
            tessellation_state: None,
            viewport_state: None,
            rasterization_state: None,
            multisample_state: None,
            depth_stencil_state: None,
            color_blend_state: None,
            dynamic_state: HashSet::default(),
            subpass: None,
            layout,
            _ne: crate::NonExhaustive(()),
        }
    }

    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            ref stages,
            ref vertex_input_state,
            ref input_assembly_state,
            ref tessellation_state,
            viewport_state: _,
            ref rasterization_state,
            multisample_state: _,
            depth_stencil_state: _,
            ref color_blend_state,
            dynamic_state: _,
            ref subpass,
            ref layout,
            _ne: _,
        } = self;

        if layout.device().as_ref() != device {
            return Err(Box::new(ValidationError {
                context: "layout".into(),
                problem: "was not created from the same device".into(),
                ..Default::default()
            }));
        }

        let mut stages_present = ShaderStages::empty();

        for (stage_index, stage) in stages.iter().enumerate() {
            if stage.entry_point.module().device().as_ref() != device {
                return Err(Box::new(ValidationError {
                    context: format!("stages[{}].entry_point", stage_index).into(),
                    problem: "was not created from the same device".into(),
                    ..Default::default()
                }));
            }

            let stage_enum = stage.stage();

            if stage_enum == ShaderStage::Compute {
                return Err(Box::new(ValidationError {
                    context: format!("stages[{}].entry_point", stage_index).into(),
                    problem: "is a `ShaderStage::Compute` entry point".into(),
                    ..Default::default()
                }));
            }

            if stages_present.contains_enum(stage_enum) {
                return Err(Box::new(ValidationError {
                    context: "stages".into(),
                    problem: format!(
                        "contains more than one element whose stage is `ShaderStage::{:?}`",
                        stage_enum,
                    )
                    .into(),
                    vuids: &["VUID-VkGraphicsPipelineCreateInfo-stage-06897"],
                }));
            }

            stages_present |= ShaderStages::from(stage_enum);
        }

        if !stages_present.intersects(ShaderStages::VERTEX) {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "does not contain a `ShaderStage::Vertex` stage".into(),
                vuids: &["VUID-VkGraphicsPipelineCreateInfo-stage-02096"],
            }));
        }

        let has_tessellation_control = stages_present.intersects(ShaderStages::TESSELLATION_CONTROL);
        let has_tessellation_evaluation =
            stages_present.intersects(ShaderStages::TESSELLATION_EVALUATION);

        if has_tessellation_control != has_tessellation_evaluation {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "contains only one of a `ShaderStage::TessellationControl` and a \
                    `ShaderStage::TessellationEvaluation` stage"
                    .into(),
                vuids: &[
                    "VUID-VkGraphicsPipelineCreateInfo-pStages-00729",
                    "VUID-VkGraphicsPipelineCreateInfo-pStages-00730",
                ],
            }));
        }

        let topology = input_assembly_state
            .as_ref()
            .map_or(PrimitiveTopology::TriangleList, |state| state.topology);

        if has_tessellation_control {
            if !device.enabled_features().tessellation_shader {
                return Err(Box::new(ValidationError {
                    context: "stages".into(),
                    problem: "contains tessellation shaders, but the `tessellation_shader` \
                        feature is not enabled on the device"
                        .into(),
                    vuids: &["VUID-VkPipelineShaderStageCreateInfo-stage-00705"],
                }));
            }

            let Some(tessellation_state) = tessellation_state else {
                return Err(Box::new(ValidationError {
                    problem: "`stages` contains tessellation shaders, but \
                        `tessellation_state` is `None`"
                        .into(),
                    vuids: &["VUID-VkGraphicsPipelineCreateInfo-pStages-00731"],
                    ..Default::default()
                }));
            };

            tessellation_state
                .validate(device)
                .map_err(|err| err.add_context("tessellation_state"))?;

            if topology != PrimitiveTopology::PatchList {
                return Err(Box::new(ValidationError {
                    problem: "`stages` contains tessellation shaders, but the primitive \
                        topology is not `PrimitiveTopology::PatchList`"
                        .into(),
                    vuids: &["VUID-VkGraphicsPipelineCreateInfo-pStages-00736"],
                    ..Default::default()
                }));
            }
        } else if topology == PrimitiveTopology::PatchList {
            return Err(Box::new(ValidationError {
                problem: "the primitive topology is `PrimitiveTopology::PatchList`, but \
                    `stages` does not contain tessellation shaders"
                    .into(),
                vuids: &["VUID-VkGraphicsPipelineCreateInfo-topology-08889"],
                ..Default::default()
            }));
        }

        if let Some(vertex_input_state) = vertex_input_state {
            vertex_input_state
                .validate(device.metal_features().max_per_stage_buffer_count)
                .map_err(|err| err.add_context("vertex_input_state"))?;
        }

        if let Some(rasterization_state) = rasterization_state {
            if rasterization_state.depth_clamp_enable && !device.enabled_features().depth_clamp {
                return Err(Box::new(ValidationError {
                    context: "rasterization_state.depth_clamp_enable".into(),
                    problem: "is `true`, but the `depth_clamp` feature is not enabled on the \
                        device"
                        .into(),
                    vuids: &["VUID-VkPipelineRasterizationStateCreateInfo-depthClampEnable-00782"],
                }));
            }
        }

        if let Some(subpass) = subpass {
            subpass
                .validate()
                .map_err(|err| err.add_context("subpass"))?;

            if let Some(color_blend_state) = color_blend_state {
                if color_blend_state.attachments.len() != subpass.color_attachment_formats.len() {
                    return Err(Box::new(ValidationError {
                        problem: "the length of `color_blend_state.attachments` does not equal \
                            the length of `subpass.color_attachment_formats`"
                            .into(),
                        vuids: &["VUID-VkGraphicsPipelineCreateInfo-renderPass-06055"],
                        ..Default::default()
                    }));
                }
            }
        }

        Ok(())
    }
}
