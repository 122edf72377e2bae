// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The recording sink that pipelines and layouts encode into.
//!
//! Command buffer recording itself lives in the surrounding API layer. When it records a draw or
//! a dispatch, it hands its encoder to [`Pipeline::encode`](crate::pipeline::Pipeline::encode)
//! once for every stage of the bound pipeline, and to
//! [`PipelineLayout::bind_descriptor_sets`](crate::pipeline::layout::PipelineLayout::bind_descriptor_sets)
//! whenever descriptor sets are bound.
//!
//! Slot operations name the [`NativeShaderStage`] whose slot table they target. A tessellated
//! draw encodes its tessellation control stage as a compute dispatch between two render passes,
//! and it is up to the encoder to route those slots to the compute encoder.

use crate::{
    backend::{
        descriptor::{
            CullMode, DepthBias, DepthClipMode, IndexType, PrimitiveType, ScissorRect,
            TriangleFillMode, Viewport, Winding,
        },
        ComputePipelineState, NativeHandle, RenderPipelineState,
    },
    descriptor_set::BufferBinding,
    pipeline::graphics::depth_stencil::DepthStencilState,
    shader::NativeShaderStage,
};

/// Receives the state changes and resource bindings of a command buffer.
pub trait CommandEncoder {
    fn set_render_pipeline_state(&mut self, state: &RenderPipelineState);

    fn set_compute_pipeline_state(&mut self, state: &ComputePipelineState);

    /// Sets the size of the threadgroups of the following dispatches.
    fn set_threadgroup_size(&mut self, size: [u32; 3]);

    fn set_threadgroup_memory_length(&mut self, length: u32, index: u32);

    fn set_depth_stencil_state(&mut self, state: &DepthStencilState);

    fn set_stencil_reference(&mut self, front: u32, back: u32);

    fn set_cull_mode(&mut self, cull_mode: CullMode);

    fn set_front_facing_winding(&mut self, winding: Winding);

    fn set_triangle_fill_mode(&mut self, fill_mode: TriangleFillMode);

    fn set_depth_clip_mode(&mut self, depth_clip_mode: DepthClipMode);

    fn set_depth_bias(&mut self, depth_bias: DepthBias);

    fn set_blend_color(&mut self, blend_constants: [f32; 4]);

    fn set_viewports(&mut self, viewports: &[Viewport]);

    fn set_scissor_rects(&mut self, scissors: &[ScissorRect]);

    fn set_primitive_type(&mut self, primitive_type: PrimitiveType);

    /// Returns the element type of the currently bound index buffer, or `None` for a
    /// non-indexed draw.
    fn index_type(&self) -> Option<IndexType>;

    fn set_buffer(&mut self, stage: NativeShaderStage, index: u32, buffer: BufferBinding);

    /// Binds a small block of bytes directly, without a backing buffer.
    fn set_bytes(&mut self, stage: NativeShaderStage, index: u32, bytes: &[u8]);

    fn set_texture(&mut self, stage: NativeShaderStage, index: u32, texture: NativeHandle);

    fn set_sampler(&mut self, stage: NativeShaderStage, index: u32, sampler: NativeHandle);
}
