// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! A pipeline that runs a compute shader.
//!
//! A compute pipeline has a single stage, and is compiled into one native compute pipeline
//! state.

use super::{
    cache::PipelineCache,
    compiler::ComputePipelineCompiler,
    layout::PipelineLayout,
    ImplicitBinding, PipelineCreationError, PipelineShaderStageCreateInfo, PipelineStage,
    PipelineStages,
};
use crate::{
    backend::{descriptor::ComputePipelineDescriptor, ComputePipelineState},
    command_buffer::CommandEncoder,
    device::{Device, DeviceOwned},
    macros::impl_id_counter,
    shader::{conversion::ShaderConversionContext, NativeShaderStage, ShaderStage},
    ValidationError,
};
use log::error;
use std::{num::NonZero, sync::Arc};

/// A pipeline object that describes to the native backend how it should perform compute
/// operations.
#[derive(Debug)]
pub struct ComputePipeline {
    device: Arc<Device>,
    id: NonZero<u64>,

    layout: Arc<PipelineLayout>,
    state: ComputePipelineState,
    threadgroup_size: [u32; 3],
    needs_aux_buffer: bool,
    aux_buffer_index: ImplicitBinding,
    full_image_view_swizzle: bool,
}

impl ComputePipeline {
    /// Creates a new `ComputePipeline`.
    pub fn new(
        device: Arc<Device>,
        cache: Option<Arc<PipelineCache>>,
        create_info: ComputePipelineCreateInfo,
    ) -> Result<Arc<ComputePipeline>, PipelineCreationError> {
        Self::validate_new(&device, cache.as_deref(), &create_info)?;

        let ComputePipelineCreateInfo {
            stage,
            layout,
            _ne: _,
        } = create_info;

        let PipelineShaderStageCreateInfo {
            entry_point,
            specialization_info,
            _ne: _,
        } = &stage;

        let full_image_view_swizzle = device.configuration().full_image_view_swizzle;
        let metal_features = device.metal_features();
        let stage_index = NativeShaderStage::Compute;
        let aux_buffer_index = *layout.aux_buffer_index();

        let mut context = ShaderConversionContext::default();
        context.options.entry_point_name = entry_point.info().name.clone();
        context.options.entry_point_stage = ShaderStage::Compute;
        context.options.msl_version = metal_features.msl_version;
        context.options.texel_buffer_texture_width = metal_features.max_texture_dimension;
        context.options.aux_buffer_index = aux_buffer_index[stage_index];
        context.options.indirect_params_buffer_index =
            layout.indirect_params_buffer_index()[stage_index];
        context.options.should_swizzle_texture_samples = full_image_view_swizzle;
        layout.populate_shader_conversion_context(&mut context);

        let function = entry_point
            .module()
            .function(&mut context, specialization_info, cache.as_deref())
            .map_err(|error| PipelineCreationError::ShaderConversionFailed {
                stage: ShaderStage::Compute,
                error,
            })?;

        let needs_aux_buffer = function.results().needs_aux_buffer;

        if needs_aux_buffer
            && aux_buffer_index[stage_index] >= metal_features.max_per_stage_buffer_count
        {
            error!(
                "Compute shader requires auxiliary buffer, but there is no free slot to pass it."
            );

            return Err(PipelineCreationError::NoFreeBufferSlot {
                stage: ShaderStage::Compute,
                purpose: "auxiliary",
                index: aux_buffer_index[stage_index],
            });
        }

        let threadgroup_size = function.threadgroup_size();
        let descriptor = ComputePipelineDescriptor {
            label: entry_point.info().name.clone(),
            compute_function: Some(function),
            stage_input_descriptor: None,
        };

        let state = ComputePipelineCompiler::new(device.clone()).compile(&descriptor)?;

        Ok(Arc::new(ComputePipeline {
            device,
            id: Self::next_id(),
            layout,
            state,
            threadgroup_size,
            needs_aux_buffer,
            aux_buffer_index,
            full_image_view_swizzle,
        }))
    }

    fn validate_new(
        device: &Device,
        cache: Option<&PipelineCache>,
        create_info: &ComputePipelineCreateInfo,
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

    /// Returns the pipeline layout used in this compute pipeline.
    #[inline]
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    /// Returns the compiled native state.
    #[inline]
    pub fn state(&self) -> &ComputePipelineState {
        &self.state
    }

    /// Returns the size of the threadgroups that dispatches run with.
    #[inline]
    pub fn threadgroup_size(&self) -> [u32; 3] {
        self.threadgroup_size
    }

    /// Returns whether the shader reads the auxiliary buffer.
    #[inline]
    pub fn needs_aux_buffer(&self) -> bool {
        self.needs_aux_buffer
    }

    #[inline]
    pub fn aux_buffer_index(&self) -> &ImplicitBinding {
        &self.aux_buffer_index
    }

    #[inline]
    pub fn full_image_view_swizzle(&self) -> bool {
        self.full_image_view_swizzle
    }

    /// Returns the stages to encode for one dispatch.
    #[inline]
    pub fn stages(&self) -> PipelineStages {
        PipelineStages::COMPUTE
    }

    /// Binds the compiled state and the threadgroup size.
    pub fn encode(
        &self,
        encoder: &mut dyn CommandEncoder,
        stage: PipelineStage,
    ) -> Result<(), Box<ValidationError>> {
        if stage != PipelineStage::Compute {
            return Err(Box::new(ValidationError {
                context: "stage".into(),
                problem: format!("{:?} is not a stage of a compute pipeline", stage).into(),
                ..Default::default()
            }));
        }

        encoder.set_compute_pipeline_state(&self.state);
        encoder.set_threadgroup_size(self.threadgroup_size);

        Ok(())
    }
}

impl DeviceOwned for ComputePipeline {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl_id_counter!(ComputePipeline);

/// Parameters to create a new `ComputePipeline`.
#[derive(Clone, Debug)]
pub struct ComputePipelineCreateInfo {
    /// The compute shader stage to use.
    ///
    /// There is no default value.
    pub stage: PipelineShaderStageCreateInfo,

    /// The pipeline layout to use.
    ///
    /// There is no default value.
    pub layout: Arc<PipelineLayout>,

    pub _ne: crate::NonExhaustive,
}

impl ComputePipelineCreateInfo {
    /// Returns a `ComputePipelineCreateInfo` with the specified `stage` and `layout`.
    #[inline]
    pub fn stage_layout(stage: PipelineShaderStageCreateInfo, layout: Arc<PipelineLayout>) -> Self {
        Self {
            stage,
            layout,
            _ne: crate::NonExhaustive(()),
        }
    }

    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            ref stage,
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

        if stage.entry_point.module().device().as_ref() != device {
            return Err(Box::new(ValidationError {
                context: "stage.entry_point".into(),
                problem: "was not created from the same device".into(),
                ..Default::default()
            }));
        }

        if stage.stage() != ShaderStage::Compute {
            return Err(Box::new(ValidationError {
                context: "stage.entry_point".into(),
                problem: "is not a `ShaderStage::Compute` entry point".into(),
                vuids: &["VUID-VkComputePipelineCreateInfo-stage-00701"],
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
        descriptor_set::layout::{
            DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo,
            DescriptorType,
        },
        pipeline::{compiler::CompileError, layout::PipelineLayoutCreateInfo, Pipeline},
        shader::{
            conversion::ShaderConversionResults, EntryPointInfo, ShaderModule,
            ShaderModuleCreateInfo, ShaderStages, SpecializationConstant, WorkgroupDimension,
        },
        tests::{
            spirv, test_device, test_device_with, CompletionMode, EncodedCommand,
            RecordingEncoder,
        },
    };

    fn stage(device: &Arc<Device>, stage: ShaderStage) -> PipelineShaderStageCreateInfo {
        let code = spirv(7);
        let module = ShaderModule::new(
            device.clone(),
            ShaderModuleCreateInfo {
                entry_points: vec![EntryPointInfo::new("main", stage)],
                ..ShaderModuleCreateInfo::new(&code)
            },
        )
        .unwrap();

        PipelineShaderStageCreateInfo::new(module.entry_point("main").unwrap())
    }

    fn layout(device: &Arc<Device>, buffers: u32) -> Arc<PipelineLayout> {
        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    DescriptorSetLayoutBinding {
                        descriptor_count: buffers,
                        stages: ShaderStages::COMPUTE,
                        ..DescriptorSetLayoutBinding::descriptor_type(
                            DescriptorType::StorageBuffer,
                        )
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            },
        )
        .unwrap();

        PipelineLayout::new(
            device.clone(),
            PipelineLayoutCreateInfo {
                set_layouts: vec![set_layout],
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn single_stage() {
        let (device, backend, converter) = test_device();
        converter.set_workgroup_size([
            WorkgroupDimension {
                size: 8,
                specialization_id: Some(0),
            },
            WorkgroupDimension {
                size: 4,
                specialization_id: None,
            },
            WorkgroupDimension::ONE,
        ]);

        let mut stage = stage(&device, ShaderStage::Compute);
        stage
            .specialization_info
            .insert(0, SpecializationConstant::U32(64));

        let pipeline = ComputePipeline::new(
            device.clone(),
            None,
            ComputePipelineCreateInfo::stage_layout(stage, layout(&device, 2)),
        )
        .unwrap();

        assert_eq!(pipeline.threadgroup_size(), [64, 4, 1]);
        assert_eq!(backend.compute_descriptors().len(), 1);

        let pipeline = Pipeline::from(pipeline);
        let stages: Vec<_> = pipeline.stages().collect();
        assert_eq!(stages, [PipelineStage::Compute]);

        let mut encoder = RecordingEncoder::default();
        pipeline.encode(&mut encoder, stages[0]).unwrap();
        assert_eq!(encoder.commands.len(), 2);
        assert!(matches!(
            encoder.commands[0],
            EncodedCommand::ComputePipelineState(_)
        ));
        assert_eq!(encoder.commands[1], EncodedCommand::ThreadgroupSize([64, 4, 1]));

        assert!(pipeline
            .encode(&mut encoder, PipelineStage::Rasterization)
            .is_err());
    }

    #[test]
    fn aux_buffer_slot() {
        let (device, _, converter) = test_device();
        converter.set_results(ShaderConversionResults {
            needs_aux_buffer: true,
            ..Default::default()
        });

        let pipeline = ComputePipeline::new(
            device.clone(),
            None,
            ComputePipelineCreateInfo::stage_layout(
                stage(&device, ShaderStage::Compute),
                layout(&device, 4),
            ),
        )
        .unwrap();
        assert!(pipeline.needs_aux_buffer());
        assert_eq!(pipeline.aux_buffer_index()[NativeShaderStage::Compute], 5);

        let result = ComputePipeline::new(
            device.clone(),
            None,
            ComputePipelineCreateInfo::stage_layout(
                stage(&device, ShaderStage::Compute),
                layout(&device, 30),
            ),
        );
        assert!(matches!(
            result,
            Err(PipelineCreationError::NoFreeBufferSlot { index: 31, .. })
        ));
    }

    #[test]
    fn image_view_swizzle() {
        let (device, _, converter) = test_device_with(|create_info| {
            create_info.configuration.full_image_view_swizzle = true;
        });

        let pipeline = ComputePipeline::new(
            device.clone(),
            None,
            ComputePipelineCreateInfo::stage_layout(
                stage(&device, ShaderStage::Compute),
                layout(&device, 1),
            ),
        )
        .unwrap();

        assert!(pipeline.full_image_view_swizzle());
        assert_eq!(converter.swizzled_conversion_count(), 1);

        let (device, _, converter) = test_device();
        let pipeline = ComputePipeline::new(
            device.clone(),
            None,
            ComputePipelineCreateInfo::stage_layout(
                stage(&device, ShaderStage::Compute),
                layout(&device, 1),
            ),
        )
        .unwrap();

        assert!(!pipeline.full_image_view_swizzle());
        assert_eq!(converter.swizzled_conversion_count(), 0);
    }

    #[test]
    fn wrong_stage() {
        let (device, _, _) = test_device();
        let result = ComputePipeline::new(
            device.clone(),
            None,
            ComputePipelineCreateInfo::stage_layout(
                stage(&device, ShaderStage::Vertex),
                layout(&device, 1),
            ),
        );

        assert!(matches!(
            result,
            Err(PipelineCreationError::ValidationError(_))
        ));
    }

    #[test]
    fn compile_failure() {
        let (device, backend, _) = test_device();
        backend.set_mode(CompletionMode::Fail(String::from("no")));

        let result = ComputePipeline::new(
            device.clone(),
            None,
            ComputePipelineCreateInfo::stage_layout(
                stage(&device, ShaderStage::Compute),
                layout(&device, 1),
            ),
        );

        assert!(matches!(
            result,
            Err(PipelineCreationError::Compile(CompileError::Failed { .. }))
        ));
        assert_eq!(backend.live_handles(), 0);
    }
}
