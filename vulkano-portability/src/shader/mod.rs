// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Shader modules and the functions converted from them.
//!
//! A [`ShaderModule`] holds SPIR-V code together with the reflection of its entry points. The
//! reflection (stage outputs, tessellation execution modes) is produced by an external SPIR-V
//! parser and handed in at creation; this crate only consumes it.
//!
//! SPIR-V is not run natively. Each time a pipeline needs an entry point, the module is converted
//! to MSL by the device's [`ShaderConverter`](conversion::ShaderConverter) under a
//! [`ShaderConversionContext`](conversion::ShaderConversionContext) that describes the resource
//! layout and pipeline state the generated code must agree with. The result is a
//! [`ShaderLibrary`], memoized in a [`PipelineCache`] or in the module itself, from which a
//! [`ShaderFunction`] is taken.

use self::conversion::{
    ShaderConversionContext, ShaderConversionError, ShaderConversionResults, ShaderEntryPoint,
};
use crate::{
    device::{Device, DeviceOwned},
    macros::{impl_id_counter, vulkan_bitflags_enum},
    pipeline::cache::{PipelineCache, ShaderLibraryCache},
    ValidationError,
};
use foldhash::HashMap;
use std::{num::NonZero, sync::Arc};

pub mod conversion;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Contains SPIR-V code with one or more entry points.
#[derive(Debug)]
pub struct ShaderModule {
    device: Arc<Device>,
    id: NonZero<u64>,
    code: Vec<u32>,
    key: ShaderModuleKey,
    entry_points: Vec<EntryPointInfo>,
    library_cache: ShaderLibraryCache,
}

impl ShaderModule {
    /// Creates a new shader module from SPIR-V words and the reflection of its entry points.
    pub fn new(
        device: Arc<Device>,
        create_info: ShaderModuleCreateInfo<'_>,
    ) -> Result<Arc<ShaderModule>, Box<ValidationError>> {
        create_info
            .validate()
            .map_err(|err| err.add_context("create_info"))?;

        let ShaderModuleCreateInfo {
            code,
            entry_points,
            _ne: _,
        } = create_info;

        Ok(Arc::new(ShaderModule {
            device,
            id: Self::next_id(),
            code: code.to_owned(),
            key: ShaderModuleKey::new(code),
            entry_points,
            library_cache: ShaderLibraryCache::new(),
        }))
    }

    /// Returns the SPIR-V code of the module.
    #[inline]
    pub fn code(&self) -> &[u32] {
        &self.code
    }

    /// Returns the key that identifies the contents of the module in pipeline caches.
    #[inline]
    pub fn key(&self) -> ShaderModuleKey {
        self.key
    }

    /// Returns the entry point with the provided name, or `None` if there is none.
    ///
    /// If several entry points share the name, the first one is returned.
    pub fn entry_point(self: &Arc<Self>, name: &str) -> Option<EntryPoint> {
        self.entry_points
            .iter()
            .position(|info| info.name == name)
            .map(|index| EntryPoint {
                module: self.clone(),
                index,
            })
    }

    /// Returns the entry point with the provided name and stage, or `None` if there is none.
    pub fn entry_point_with_stage(self: &Arc<Self>, name: &str, stage: ShaderStage) -> Option<EntryPoint> {
        self.entry_points
            .iter()
            .position(|info| info.name == name && info.stage == stage)
            .map(|index| EntryPoint {
                module: self.clone(),
                index,
            })
    }

    /// Returns the converted function for `context`.
    ///
    /// The shader library is looked up in `pipeline_cache` if one is provided, in the module's
    /// own cache otherwise, and converted on a miss. On return, `context` carries the usage flags
    /// reported by the conversion.
    pub fn function(
        &self,
        context: &mut ShaderConversionContext,
        specialization_info: &HashMap<u32, SpecializationConstant>,
        pipeline_cache: Option<&PipelineCache>,
    ) -> Result<ShaderFunction, ShaderConversionError> {
        let library = match pipeline_cache {
            Some(pipeline_cache) => pipeline_cache.shader_library(self, context)?,
            None => {
                self.library_cache
                    .get_or_convert(&self.device, self, context)?
                    .0
            }
        };

        Ok(ShaderLibrary::function(&library, specialization_info))
    }
}

impl DeviceOwned for ShaderModule {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl_id_counter!(ShaderModule);

/// Parameters to create a new `ShaderModule`.
#[derive(Clone, Debug)]
pub struct ShaderModuleCreateInfo<'a> {
    /// The SPIR-V code, in the form of 32-bit words.
    ///
    /// There is no default value.
    pub code: &'a [u32],

    /// The reflection of each entry point in the code.
    ///
    /// The default value is empty.
    pub entry_points: Vec<EntryPointInfo>,

    pub _ne: crate::NonExhaustive,
}

impl<'a> ShaderModuleCreateInfo<'a> {
    /// Returns a `ShaderModuleCreateInfo` with the specified `code`.
    #[inline]
    pub fn new(code: &'a [u32]) -> Self {
        Self {
            code,
            entry_points: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            code,
            ref entry_points,
            _ne: _,
        } = self;

        if code.is_empty() {
            return Err(Box::new(ValidationError {
                context: "code".into(),
                problem: "is empty".into(),
                vuids: &["VUID-VkShaderModuleCreateInfo-codeSize-01085"],
            }));
        }

        if code[0] != SPIRV_MAGIC {
            return Err(Box::new(ValidationError {
                context: "code".into(),
                problem: "does not start with the SPIR-V magic number".into(),
                vuids: &["VUID-VkShaderModuleCreateInfo-pCode-07912"],
            }));
        }

        for (index, info) in entry_points.iter().enumerate() {
            if entry_points[..index]
                .iter()
                .any(|other| other.name == info.name && other.stage == info.stage)
            {
                return Err(Box::new(ValidationError {
                    context: format!("entry_points[{}]", index).into(),
                    problem: "has the same name and stage as an earlier entry point".into(),
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

/// Identifies the contents of a shader module: the code size and a hash of the code.
///
/// Two modules with identical code share converted libraries in a pipeline cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderModuleKey {
    pub code_size: u64,
    pub code_hash: u64,
}

impl ShaderModuleKey {
    /// Computes the key of `code`.
    pub fn new(code: &[u32]) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(code);

        Self {
            code_size: bytes.len() as u64,
            code_hash: xxhash_rust::xxh3::xxh3_64(bytes),
        }
    }
}

/// An entry point of a shader module.
#[derive(Clone, Debug)]
pub struct EntryPoint {
    module: Arc<ShaderModule>,
    index: usize,
}

impl EntryPoint {
    /// Returns the module that the entry point belongs to.
    #[inline]
    pub fn module(&self) -> &Arc<ShaderModule> {
        &self.module
    }

    /// Returns the reflection of the entry point.
    #[inline]
    pub fn info(&self) -> &EntryPointInfo {
        &self.module.entry_points[self.index]
    }
}

/// Reflection of one entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPointInfo {
    pub name: String,
    pub stage: ShaderStage,

    /// The variables the entry point writes for the next stage.
    pub outputs: Vec<ShaderOutput>,

    /// The tessellation execution modes declared by the entry point.
    pub tessellation: TessellationModes,
}

impl EntryPointInfo {
    /// Returns an `EntryPointInfo` with no outputs and no execution modes.
    #[inline]
    pub fn new(name: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            name: name.into(),
            stage,
            outputs: Vec::new(),
            tessellation: TessellationModes::default(),
        }
    }
}

/// A variable written by a stage for the next stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderOutput {
    pub location: u32,
    pub base_type: ShaderBaseType,

    /// The number of vector components, from 1 to 4.
    pub vec_width: u32,

    pub builtin: Option<BuiltIn>,

    /// Whether there is one value per patch rather than one per control point.
    pub per_patch: bool,

    /// Whether the stage actually writes the variable.
    pub is_used: bool,
}

impl ShaderOutput {
    /// Returns the size of one component, in bytes.
    pub fn component_size(&self) -> u32 {
        match self.base_type {
            ShaderBaseType::Boolean | ShaderBaseType::SByte | ShaderBaseType::UByte => 1,
            ShaderBaseType::Short | ShaderBaseType::UShort | ShaderBaseType::Half => 2,
            ShaderBaseType::Int | ShaderBaseType::UInt | ShaderBaseType::Float => 4,
            ShaderBaseType::Int64 | ShaderBaseType::UInt64 | ShaderBaseType::Double => 8,
        }
    }

    /// Returns the size of the output when captured into a buffer. Three-component vectors are
    /// padded to four.
    pub fn size(&self) -> u32 {
        let width = if self.vec_width == 3 { 4 } else { self.vec_width };
        self.component_size() * width
    }

    /// Returns the required alignment of the output when captured into a buffer.
    #[inline]
    pub fn alignment(&self) -> u32 {
        self.size()
    }
}

/// The scalar type of a shader variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderBaseType {
    Boolean,
    SByte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Int64,
    UInt64,
    Half,
    Float,
    Double,
}

/// Built-in variables that the translation treats specially.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltIn {
    Position,
    PointSize,
    ClipDistance,
    CullDistance,
    TessLevelOuter,
    TessLevelInner,
}

/// The tessellation execution modes declared by one shader.
///
/// Modes may be split between the control and evaluation shader; the pipeline merges them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TessellationModes {
    pub patch_kind: Option<TessellationPatchKind>,
    pub vertex_order: Option<TessellationVertexOrder>,
    pub spacing: Option<TessellationSpacing>,
    pub point_mode: bool,

    /// The number of control points output per patch.
    pub output_vertices: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TessellationPatchKind {
    Triangles,
    Quads,
    Isolines,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TessellationVertexOrder {
    Clockwise,
    CounterClockwise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TessellationSpacing {
    Equal,
    FractionalEven,
    FractionalOdd,
}

/// The value of a specialization constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpecializationConstant {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl SpecializationConstant {
    /// Returns the value as it is laid out in a specialization data block.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bool(false) => &[0, 0, 0, 0],
            Self::Bool(true) => &[1, 0, 0, 0],
            Self::I32(value) => bytemuck::bytes_of(value),
            Self::U32(value) => bytemuck::bytes_of(value),
            Self::I64(value) => bytemuck::bytes_of(value),
            Self::U64(value) => bytemuck::bytes_of(value),
            Self::F32(value) => bytemuck::bytes_of(value),
            Self::F64(value) => bytemuck::bytes_of(value),
        }
    }

    /// Returns the value read as a 32-bit unsigned integer, if it is 32 bits wide.
    pub fn as_u32(&self) -> Option<u32> {
        let bytes = self.as_bytes();

        (bytes.len() == 4).then(|| bytemuck::pod_read_unaligned(bytes))
    }
}

/// MSL source converted from a shader module, with the entry point it exposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderLibrary {
    pub msl: String,
    pub entry_point: ShaderEntryPoint,
    pub results: ShaderConversionResults,
}

impl ShaderLibrary {
    /// Returns the function of the library, specialized with `specialization_info`.
    pub fn function(
        library: &Arc<ShaderLibrary>,
        specialization_info: &HashMap<u32, SpecializationConstant>,
    ) -> ShaderFunction {
        let mut specialization: Vec<_> = specialization_info
            .iter()
            .map(|(&id, &value)| (id, value))
            .collect();
        specialization.sort_unstable_by_key(|&(id, _)| id);

        let threadgroup_size = library
            .entry_point
            .workgroup_size
            .map(|dimension| dimension.resolve(specialization_info));

        ShaderFunction {
            library: library.clone(),
            specialization,
            threadgroup_size,
        }
    }
}

/// A function of a shader library, ready to be put in a pipeline descriptor.
#[derive(Clone, Debug)]
pub struct ShaderFunction {
    library: Arc<ShaderLibrary>,
    specialization: Vec<(u32, SpecializationConstant)>,
    threadgroup_size: [u32; 3],
}

impl ShaderFunction {
    #[inline]
    pub fn library(&self) -> &Arc<ShaderLibrary> {
        &self.library
    }

    /// Returns the MSL name of the function.
    #[inline]
    pub fn name(&self) -> &str {
        &self.library.entry_point.name
    }

    /// Returns the specialization constants, sorted by constant id.
    #[inline]
    pub fn specialization(&self) -> &[(u32, SpecializationConstant)] {
        &self.specialization
    }

    /// Returns the workgroup size, with specialized dimensions resolved.
    #[inline]
    pub fn threadgroup_size(&self) -> [u32; 3] {
        self.threadgroup_size
    }

    #[inline]
    pub fn results(&self) -> &ShaderConversionResults {
        &self.library.results
    }
}

/// One dimension of a compute workgroup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkgroupDimension {
    /// The size declared in the shader.
    pub size: u32,

    /// The specialization constant that overrides `size`, if any.
    pub specialization_id: Option<u32>,
}

impl WorkgroupDimension {
    /// A dimension of size 1 that can't be specialized.
    pub const ONE: Self = Self {
        size: 1,
        specialization_id: None,
    };

    /// Returns the size after applying specialization constants.
    pub fn resolve(self, specialization_info: &HashMap<u32, SpecializationConstant>) -> u32 {
        self.specialization_id
            .and_then(|id| specialization_info.get(&id))
            .and_then(SpecializationConstant::as_u32)
            .unwrap_or(self.size)
    }
}

vulkan_bitflags_enum! {
    /// A set of [`ShaderStage`] values.
    ShaderStages impl {
        /// Creates a `ShaderStages` struct with all graphics stages set to `true`.
        #[inline]
        pub const fn all_graphics() -> ShaderStages {
            ShaderStages::VERTEX
                .union(ShaderStages::TESSELLATION_CONTROL)
                .union(ShaderStages::TESSELLATION_EVALUATION)
                .union(ShaderStages::GEOMETRY)
                .union(ShaderStages::FRAGMENT)
        }
    },

    /// A shader stage within a pipeline.
    ShaderStage,

    = ShaderStageFlags(u32);

    VERTEX, Vertex = VERTEX,
    TESSELLATION_CONTROL, TessellationControl = TESSELLATION_CONTROL,
    TESSELLATION_EVALUATION, TessellationEvaluation = TESSELLATION_EVALUATION,
    GEOMETRY, Geometry = GEOMETRY,
    FRAGMENT, Fragment = FRAGMENT,
    COMPUTE, Compute = COMPUTE,
}

/// A shader stage as the native backend sees it. Each one has its own namespace of buffer,
/// texture and sampler slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum NativeShaderStage {
    Vertex = 0,
    TessellationControl = 1,
    TessellationEvaluation = 2,
    Fragment = 3,
    Compute = 4,
}

impl NativeShaderStage {
    /// The number of native stages.
    pub const COUNT: usize = 5;

    /// All native stages, in index order.
    pub const ALL: [NativeShaderStage; Self::COUNT] = [
        Self::Vertex,
        Self::TessellationControl,
        Self::TessellationEvaluation,
        Self::Fragment,
        Self::Compute,
    ];

    /// Returns the index of the stage in per-stage tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the API stage that runs as this native stage.
    #[inline]
    pub const fn shader_stage(self) -> ShaderStage {
        match self {
            Self::Vertex => ShaderStage::Vertex,
            Self::TessellationControl => ShaderStage::TessellationControl,
            Self::TessellationEvaluation => ShaderStage::TessellationEvaluation,
            Self::Fragment => ShaderStage::Fragment,
            Self::Compute => ShaderStage::Compute,
        }
    }
}

impl TryFrom<ShaderStage> for NativeShaderStage {
    type Error = ();

    /// Geometry shaders have no native counterpart.
    #[inline]
    fn try_from(val: ShaderStage) -> Result<Self, Self::Error> {
        Ok(match val {
            ShaderStage::Vertex => Self::Vertex,
            ShaderStage::TessellationControl => Self::TessellationControl,
            ShaderStage::TessellationEvaluation => Self::TessellationEvaluation,
            ShaderStage::Fragment => Self::Fragment,
            ShaderStage::Compute => Self::Compute,
            ShaderStage::Geometry => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{spirv, test_device};

    #[test]
    fn rejects_non_spirv() {
        let (device, _, _) = test_device();
        let code = [0xdead_beef_u32, 0, 0, 0, 0];

        assert!(ShaderModule::new(device.clone(), ShaderModuleCreateInfo::new(&[])).is_err());
        assert!(ShaderModule::new(device, ShaderModuleCreateInfo::new(&code)).is_err());
    }

    #[test]
    fn rejects_duplicate_entry_points() {
        let (device, _, _) = test_device();
        let code = spirv(0);

        let result = ShaderModule::new(
            device,
            ShaderModuleCreateInfo {
                entry_points: vec![
                    EntryPointInfo::new("main", ShaderStage::Vertex),
                    EntryPointInfo::new("main", ShaderStage::Vertex),
                ],
                ..ShaderModuleCreateInfo::new(&code)
            },
        );

        assert!(result.is_err());
    }

    #[test]
    fn key_follows_code() {
        let (device, _, _) = test_device();
        let code_a = spirv(0);
        let code_b = spirv(1);
        let a1 = ShaderModule::new(device.clone(), ShaderModuleCreateInfo::new(&code_a)).unwrap();
        let a2 = ShaderModule::new(device.clone(), ShaderModuleCreateInfo::new(&code_a)).unwrap();
        let b = ShaderModule::new(device, ShaderModuleCreateInfo::new(&code_b)).unwrap();

        assert_ne!(a1, a2);
        assert_eq!(a1.key(), a2.key());
        assert_ne!(a1.key(), b.key());
        assert_eq!(a1.key().code_size, code_a.len() as u64 * 4);
    }

    #[test]
    fn entry_point_lookup() {
        let (device, _, _) = test_device();
        let code = spirv(0);
        let module = ShaderModule::new(
            device,
            ShaderModuleCreateInfo {
                entry_points: vec![
                    EntryPointInfo::new("main", ShaderStage::Vertex),
                    EntryPointInfo::new("main", ShaderStage::Fragment),
                ],
                ..ShaderModuleCreateInfo::new(&code)
            },
        )
        .unwrap();

        assert_eq!(module.entry_point("main").unwrap().info().stage, ShaderStage::Vertex);
        let fragment = module
            .entry_point_with_stage("main", ShaderStage::Fragment)
            .unwrap();
        assert_eq!(fragment.info().stage, ShaderStage::Fragment);
        assert!(module.entry_point("other").is_none());
        assert!(module
            .entry_point_with_stage("main", ShaderStage::Compute)
            .is_none());
    }

    #[test]
    fn workgroup_specialization() {
        let mut specialization = HashMap::default();
        specialization.insert(3, SpecializationConstant::U32(64));
        specialization.insert(4, SpecializationConstant::F64(1.0));

        let specialized = WorkgroupDimension {
            size: 8,
            specialization_id: Some(3),
        };
        let wide = WorkgroupDimension {
            size: 8,
            specialization_id: Some(4),
        };
        let missing = WorkgroupDimension {
            size: 8,
            specialization_id: Some(5),
        };

        assert_eq!(specialized.resolve(&specialization), 64);
        assert_eq!(wide.resolve(&specialization), 8);
        assert_eq!(missing.resolve(&specialization), 8);
        assert_eq!(WorkgroupDimension::ONE.resolve(&specialization), 1);
    }

    #[test]
    fn output_sizes() {
        let output = |base_type, vec_width| ShaderOutput {
            location: 0,
            base_type,
            vec_width,
            builtin: None,
            per_patch: false,
            is_used: true,
        };

        assert_eq!(output(ShaderBaseType::Float, 3).size(), 16);
        assert_eq!(output(ShaderBaseType::Half, 2).size(), 4);
        assert_eq!(output(ShaderBaseType::UByte, 1).size(), 1);
        assert_eq!(output(ShaderBaseType::Double, 4).alignment(), 32);
    }
}
