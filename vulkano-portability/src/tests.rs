// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![cfg(test)]

//! In-memory stand-ins for the native backend, the shader converter and the command encoder.

use crate::{
    backend::{
        descriptor::{
            ComputePipelineDescriptor, CullMode, DepthBias, DepthClipMode, IndexType,
            PrimitiveType, RenderPipelineDescriptor, ScissorRect, TriangleFillMode, Viewport,
            Winding,
        },
        Backend, CompletionHandler, ComputePipelineState, NativeHandle, RenderPipelineState,
    },
    command_buffer::CommandEncoder,
    descriptor_set::{
        layout::DescriptorSetLayout, BufferBinding, DescriptorResource, DescriptorSet,
    },
    device::{Device, DeviceCreateInfo},
    pipeline::graphics::depth_stencil::DepthStencilState,
    shader::{
        conversion::{
            ShaderConversionContext, ShaderConversionResults, ShaderConverter, ShaderEntryPoint,
        },
        NativeShaderStage, ShaderLibrary, ShaderStage, WorkgroupDimension,
    },
};
use foldhash::{HashMap, HashSet};
use log::{Level, LevelFilter, Log, Metadata};
use parking_lot::{Mutex, MutexGuard};
use std::{
    cell::RefCell,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Once,
    },
    thread,
    time::Duration,
};

/// Returns a minimal SPIR-V blob. Different seeds give different code.
pub(crate) fn spirv(seed: u32) -> Vec<u32> {
    vec![0x0723_0203, 0x0001_0000, 0, seed, 0]
}

/// Creates a device backed by fresh mocks.
pub(crate) fn test_device() -> (Arc<Device>, Arc<MockBackend>, Arc<MockConverter>) {
    test_device_with(|_| {})
}

/// Creates a device backed by fresh mocks, letting `f` adjust the create info first.
pub(crate) fn test_device_with(
    f: impl FnOnce(&mut DeviceCreateInfo),
) -> (Arc<Device>, Arc<MockBackend>, Arc<MockConverter>) {
    let backend = Arc::new(MockBackend::default());
    let converter = Arc::new(MockConverter::default());

    let mut create_info = DeviceCreateInfo::new(backend.clone(), converter.clone());
    f(&mut create_info);

    (Device::new(create_info).unwrap(), backend, converter)
}

/// When and how the mock backend finishes a compile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum CompletionMode {
    /// Inside the call that starts the compile.
    #[default]
    Immediate,
    /// On a separate thread, right away.
    Threaded,
    /// On a separate thread, after the given delay.
    Delayed(Duration),
    /// The completion handler is dropped without being called.
    Never,
    /// Inside the call, with the given error.
    Fail(String),
}

/// A backend that hands out counter handles and records what it was asked to compile.
#[derive(Default)]
pub(crate) struct MockBackend {
    state: Mutex<MockBackendState>,
}

#[derive(Default)]
struct MockBackendState {
    mode: CompletionMode,
    failure: Option<(usize, String)>,
    next_handle: u64,
    live: HashSet<NativeHandle>,
    released: Vec<NativeHandle>,
    render_descriptors: Vec<RenderPipelineDescriptor>,
    compute_descriptors: Vec<ComputePipelineDescriptor>,
}

impl MockBackend {
    pub(crate) fn set_mode(&self, mode: CompletionMode) {
        let mut state = self.state.lock();
        state.mode = mode;
        state.failure = None;
    }

    /// Lets `successes` more compiles succeed, then fails every following one with `message`.
    pub(crate) fn fail_from(&self, successes: usize, message: &str) {
        self.state.lock().failure = Some((successes, message.to_owned()));
    }

    pub(crate) fn released(&self) -> Vec<NativeHandle> {
        self.state.lock().released.clone()
    }

    /// Returns the number of handles delivered and not yet released.
    pub(crate) fn live_handles(&self) -> usize {
        self.state.lock().live.len()
    }

    pub(crate) fn render_descriptors(&self) -> Vec<RenderPipelineDescriptor> {
        self.state.lock().render_descriptors.clone()
    }

    pub(crate) fn compute_descriptors(&self) -> Vec<ComputePipelineDescriptor> {
        self.state.lock().compute_descriptors.clone()
    }

    fn deliver(&self, mut state: MutexGuard<'_, MockBackendState>, completion: CompletionHandler) {
        let failure = match &mut state.failure {
            Some((0, message)) => Some(message.clone()),
            Some((successes, _)) => {
                *successes -= 1;
                None
            }
            None => None,
        };

        let mode = state.mode.clone();
        let result = match (failure, &mode) {
            (Some(message), _) => Err(message),
            (None, CompletionMode::Fail(message)) => Err(message.clone()),
            (None, _) => {
                state.next_handle += 1;
                let handle = NativeHandle(state.next_handle);
                state.live.insert(handle);

                Ok(handle)
            }
        };
        drop(state);

        match mode {
            CompletionMode::Immediate | CompletionMode::Fail(_) => completion(result),
            CompletionMode::Threaded => {
                thread::spawn(move || completion(result));
            }
            CompletionMode::Delayed(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    completion(result);
                });
            }
            CompletionMode::Never => drop(completion),
        }
    }
}

impl Backend for MockBackend {
    fn new_render_pipeline_state(
        &self,
        descriptor: &RenderPipelineDescriptor,
        completion: CompletionHandler,
    ) {
        let mut state = self.state.lock();
        state.render_descriptors.push(descriptor.clone());
        self.deliver(state, completion);
    }

    fn new_compute_pipeline_state(
        &self,
        descriptor: &ComputePipelineDescriptor,
        completion: CompletionHandler,
    ) {
        let mut state = self.state.lock();
        state.compute_descriptors.push(descriptor.clone());
        self.deliver(state, completion);
    }

    fn release_pipeline_state(&self, handle: NativeHandle) {
        let mut state = self.state.lock();
        state.live.remove(&handle);
        state.released.push(handle);
    }
}

/// A converter that emits a placeholder library and reports every input as used, except for the
/// vertex attribute locations marked unused.
#[derive(Default)]
pub(crate) struct MockConverter {
    conversions: AtomicUsize,
    swizzled_conversions: AtomicUsize,
    settings: Mutex<MockConverterSettings>,
}

#[derive(Default)]
struct MockConverterSettings {
    results: ShaderConversionResults,
    stage_results: Vec<(ShaderStage, ShaderConversionResults)>,
    workgroup_size: Option<[WorkgroupDimension; 3]>,
    unused_locations: Vec<u32>,
}

impl MockConverter {
    /// Returns the number of conversions performed so far.
    pub(crate) fn conversion_count(&self) -> usize {
        self.conversions.load(Ordering::SeqCst)
    }

    /// Returns the number of conversions that were asked to swizzle texture samples.
    pub(crate) fn swizzled_conversion_count(&self) -> usize {
        self.swizzled_conversions.load(Ordering::SeqCst)
    }

    /// Sets the results reported for every stage without results of its own.
    pub(crate) fn set_results(&self, results: ShaderConversionResults) {
        self.settings.lock().results = results;
    }

    pub(crate) fn set_results_for(&self, stage: ShaderStage, results: ShaderConversionResults) {
        let mut settings = self.settings.lock();
        settings.stage_results.retain(|&(s, _)| s != stage);
        settings.stage_results.push((stage, results));
    }

    pub(crate) fn set_workgroup_size(&self, workgroup_size: [WorkgroupDimension; 3]) {
        self.settings.lock().workgroup_size = Some(workgroup_size);
    }

    pub(crate) fn set_unused_locations(&self, locations: impl IntoIterator<Item = u32>) {
        self.settings.lock().unused_locations = locations.into_iter().collect();
    }
}

impl ShaderConverter for MockConverter {
    fn convert(
        &self,
        spirv: &[u32],
        context: &mut ShaderConversionContext,
    ) -> Result<ShaderLibrary, String> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        if context.options.should_swizzle_texture_samples {
            self.swizzled_conversions.fetch_add(1, Ordering::SeqCst);
        }
        let settings = self.settings.lock();
        let stage = context.options.entry_point_stage;

        for attribute in &mut context.vertex_attributes {
            attribute.is_used_by_shader = !settings.unused_locations.contains(&attribute.location);
        }

        for binding in &mut context.resource_bindings {
            binding.is_used_by_shader = true;
        }

        let results = settings
            .stage_results
            .iter()
            .find_map(|&(s, results)| (s == stage).then_some(results))
            .unwrap_or(settings.results);

        let mut entry_point = ShaderEntryPoint::default();
        if stage == ShaderStage::Compute {
            if let Some(workgroup_size) = settings.workgroup_size {
                entry_point.workgroup_size = workgroup_size;
            }
        }

        Ok(ShaderLibrary {
            msl: format!(
                "// {} ({:?}), {} words\n",
                context.options.entry_point_name,
                stage,
                spirv.len(),
            ),
            entry_point,
            results,
        })
    }
}

/// A command recorded by [`RecordingEncoder`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum EncodedCommand {
    RenderPipelineState(NativeHandle),
    ComputePipelineState(NativeHandle),
    ThreadgroupSize([u32; 3]),
    ThreadgroupMemoryLength {
        length: u32,
        index: u32,
    },
    DepthStencilState(DepthStencilState),
    StencilReference {
        front: u32,
        back: u32,
    },
    CullMode(CullMode),
    FrontFacingWinding(Winding),
    TriangleFillMode(TriangleFillMode),
    DepthClipMode(DepthClipMode),
    DepthBias(DepthBias),
    BlendColor([f32; 4]),
    Viewports(Vec<Viewport>),
    ScissorRects(Vec<ScissorRect>),
    PrimitiveType(PrimitiveType),
    Buffer {
        stage: NativeShaderStage,
        index: u32,
        buffer: BufferBinding,
    },
    Bytes {
        stage: NativeShaderStage,
        index: u32,
        bytes: Vec<u8>,
    },
    Texture {
        stage: NativeShaderStage,
        index: u32,
        texture: NativeHandle,
    },
    Sampler {
        stage: NativeShaderStage,
        index: u32,
        sampler: NativeHandle,
    },
}

/// An encoder that records every call, in order.
#[derive(Debug, Default)]
pub(crate) struct RecordingEncoder {
    pub(crate) commands: Vec<EncodedCommand>,
    /// The type of the bound index buffer, as reported to pipelines.
    pub(crate) index_type: Option<IndexType>,
}

impl CommandEncoder for RecordingEncoder {
    fn set_render_pipeline_state(&mut self, state: &RenderPipelineState) {
        self.commands
            .push(EncodedCommand::RenderPipelineState(state.handle()));
    }

    fn set_compute_pipeline_state(&mut self, state: &ComputePipelineState) {
        self.commands
            .push(EncodedCommand::ComputePipelineState(state.handle()));
    }

    fn set_threadgroup_size(&mut self, size: [u32; 3]) {
        self.commands.push(EncodedCommand::ThreadgroupSize(size));
    }

    fn set_threadgroup_memory_length(&mut self, length: u32, index: u32) {
        self.commands
            .push(EncodedCommand::ThreadgroupMemoryLength { length, index });
    }

    fn set_depth_stencil_state(&mut self, state: &DepthStencilState) {
        self.commands
            .push(EncodedCommand::DepthStencilState(state.clone()));
    }

    fn set_stencil_reference(&mut self, front: u32, back: u32) {
        self.commands
            .push(EncodedCommand::StencilReference { front, back });
    }

    fn set_cull_mode(&mut self, cull_mode: CullMode) {
        self.commands.push(EncodedCommand::CullMode(cull_mode));
    }

    fn set_front_facing_winding(&mut self, winding: Winding) {
        self.commands
            .push(EncodedCommand::FrontFacingWinding(winding));
    }

    fn set_triangle_fill_mode(&mut self, fill_mode: TriangleFillMode) {
        self.commands
            .push(EncodedCommand::TriangleFillMode(fill_mode));
    }

    fn set_depth_clip_mode(&mut self, depth_clip_mode: DepthClipMode) {
        self.commands
            .push(EncodedCommand::DepthClipMode(depth_clip_mode));
    }

    fn set_depth_bias(&mut self, depth_bias: DepthBias) {
        self.commands.push(EncodedCommand::DepthBias(depth_bias));
    }

    fn set_blend_color(&mut self, blend_constants: [f32; 4]) {
        self.commands
            .push(EncodedCommand::BlendColor(blend_constants));
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.commands
            .push(EncodedCommand::Viewports(viewports.to_vec()));
    }

    fn set_scissor_rects(&mut self, scissors: &[ScissorRect]) {
        self.commands
            .push(EncodedCommand::ScissorRects(scissors.to_vec()));
    }

    fn set_primitive_type(&mut self, primitive_type: PrimitiveType) {
        self.commands
            .push(EncodedCommand::PrimitiveType(primitive_type));
    }

    fn index_type(&self) -> Option<IndexType> {
        self.index_type
    }

    fn set_buffer(&mut self, stage: NativeShaderStage, index: u32, buffer: BufferBinding) {
        self.commands.push(EncodedCommand::Buffer {
            stage,
            index,
            buffer,
        });
    }

    fn set_bytes(&mut self, stage: NativeShaderStage, index: u32, bytes: &[u8]) {
        self.commands.push(EncodedCommand::Bytes {
            stage,
            index,
            bytes: bytes.to_vec(),
        });
    }

    fn set_texture(&mut self, stage: NativeShaderStage, index: u32, texture: NativeHandle) {
        self.commands.push(EncodedCommand::Texture {
            stage,
            index,
            texture,
        });
    }

    fn set_sampler(&mut self, stage: NativeShaderStage, index: u32, sampler: NativeHandle) {
        self.commands.push(EncodedCommand::Sampler {
            stage,
            index,
            sampler,
        });
    }
}

/// A descriptor set whose contents are written directly.
pub(crate) struct TestDescriptorSet {
    layout: Arc<DescriptorSetLayout>,
    resources: HashMap<(u32, u32), DescriptorResource>,
}

impl TestDescriptorSet {
    pub(crate) fn new(layout: Arc<DescriptorSetLayout>) -> Self {
        TestDescriptorSet {
            layout,
            resources: HashMap::default(),
        }
    }

    pub(crate) fn write(&mut self, binding: u32, array_element: u32, resource: DescriptorResource) {
        self.resources.insert((binding, array_element), resource);
    }
}

impl DescriptorSet for TestDescriptorSet {
    fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    fn resource(&self, binding: u32, array_element: u32) -> Option<&DescriptorResource> {
        self.resources.get(&(binding, array_element))
    }
}

/// A log record captured by [`capture_logs`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) level: Level,
    pub(crate) message: String,
}

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Record>>> = const { RefCell::new(None) };
}

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        CAPTURED.with(|captured| {
            if let Some(records) = captured.borrow_mut().as_mut() {
                records.push(Record {
                    level: record.level(),
                    message: record.args().to_string(),
                });
            }
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Runs `f`, returning the records logged on the current thread while it ran.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<Record>) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });

    CAPTURED.with(|captured| *captured.borrow_mut() = Some(Vec::new()));
    let result = f();
    let records = CAPTURED
        .with(|captured| captured.borrow_mut().take())
        .unwrap_or_default();

    (result, records)
}
