// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The device that pipelines are built for.
//!
//! A [`Device`] ties together the collaborators of the translation: the native [`Backend`] that
//! compiles pipeline states, the [`ShaderConverter`] that turns SPIR-V into MSL, the capabilities
//! of the backend, and the configuration captured when the device was created. Every object of
//! this crate is owned by a device, and pipelines built for one device can't be used with
//! another.

use crate::{
    backend::Backend, config::MetalConfiguration, macros::impl_id_counter,
    performance::{PerformanceStatistics, PerformanceTracker},
    pipeline::cache::CACHE_DATA_VERSION, shader::conversion::ShaderConverter, ValidationError,
};
use log::info;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    num::NonZero,
    sync::Arc,
    time::Instant,
};

/// Represents an open channel to a native backend.
pub struct Device {
    id: NonZero<u64>,
    backend: Arc<dyn Backend>,
    shader_converter: Arc<dyn ShaderConverter>,
    configuration: MetalConfiguration,
    metal_features: MetalFeatures,
    enabled_features: DeviceFeatures,
    properties: DeviceProperties,
    performance: PerformanceStatistics,
}

impl Device {
    /// Creates a new `Device`.
    pub fn new(create_info: DeviceCreateInfo) -> Result<Arc<Device>, Box<ValidationError>> {
        create_info
            .validate()
            .map_err(|err| err.add_context("create_info"))?;

        let DeviceCreateInfo {
            backend,
            shader_converter,
            configuration,
            metal_features,
            enabled_features,
            vendor_id,
            device_id,
            driver_version,
            _ne: _,
        } = create_info;

        let properties = DeviceProperties {
            vendor_id,
            device_id,
            pipeline_cache_uuid: pipeline_cache_uuid(metal_features.msl_version, driver_version),
        };

        Ok(Arc::new(Device {
            id: Self::next_id(),
            backend,
            shader_converter,
            configuration,
            metal_features,
            enabled_features,
            properties,
            performance: PerformanceStatistics::default(),
        }))
    }

    /// Returns the native backend.
    #[inline]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Returns the SPIR-V to MSL converter.
    #[inline]
    pub fn shader_converter(&self) -> &Arc<dyn ShaderConverter> {
        &self.shader_converter
    }

    /// Returns the configuration captured when the device was created.
    #[inline]
    pub fn configuration(&self) -> &MetalConfiguration {
        &self.configuration
    }

    /// Returns the capabilities of the native backend.
    #[inline]
    pub fn metal_features(&self) -> &MetalFeatures {
        &self.metal_features
    }

    /// Returns the API features that were enabled.
    #[inline]
    pub fn enabled_features(&self) -> &DeviceFeatures {
        &self.enabled_features
    }

    #[inline]
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Returns the performance trackers of the device.
    #[inline]
    pub fn performance(&self) -> &PerformanceStatistics {
        &self.performance
    }

    /// Records one occurrence of an activity that began at `start`.
    pub(crate) fn record_activity(&self, tracker: &PerformanceTracker, start: Instant) {
        let stats = tracker.record(start.elapsed());

        if self.configuration.performance_logging {
            info!(
                "{}: {:.3} ms (average {:.3} ms over {} runs)",
                tracker.name(),
                stats.latest.as_secs_f64() * 1000.0,
                stats.average.as_secs_f64() * 1000.0,
                stats.count,
            );
        }
    }
}

impl Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("configuration", &self.configuration)
            .field("metal_features", &self.metal_features)
            .field("enabled_features", &self.enabled_features)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl_id_counter!(Device);

/// Implemented on objects that belong to a device.
pub trait DeviceOwned {
    /// Returns the device that owns `self`.
    fn device(&self) -> &Arc<Device>;
}

impl<T> DeviceOwned for T
where
    T: std::ops::Deref,
    T::Target: DeviceOwned,
{
    fn device(&self) -> &Arc<Device> {
        (**self).device()
    }
}

/// Parameters to create a new `Device`.
#[derive(Clone)]
pub struct DeviceCreateInfo {
    /// The native backend that compiles pipeline states.
    ///
    /// There is no default value.
    pub backend: Arc<dyn Backend>,

    /// The SPIR-V to MSL converter.
    ///
    /// There is no default value.
    pub shader_converter: Arc<dyn ShaderConverter>,

    /// The default value is [`MetalConfiguration::default()`].
    pub configuration: MetalConfiguration,

    /// The default value is [`MetalFeatures::default()`].
    pub metal_features: MetalFeatures,

    /// The default value is empty.
    pub enabled_features: DeviceFeatures,

    /// The default value is `0`.
    pub vendor_id: u32,

    /// The default value is `0`.
    pub device_id: u32,

    /// The version of the native driver. Serialized pipeline caches are rejected when it changes.
    ///
    /// The default value is `0`.
    pub driver_version: u32,

    pub _ne: crate::NonExhaustive,
}

impl DeviceCreateInfo {
    /// Returns a `DeviceCreateInfo` with the specified collaborators.
    #[inline]
    pub fn new(backend: Arc<dyn Backend>, shader_converter: Arc<dyn ShaderConverter>) -> Self {
        Self {
            backend,
            shader_converter,
            configuration: MetalConfiguration::default(),
            metal_features: MetalFeatures::default(),
            enabled_features: DeviceFeatures::default(),
            vendor_id: 0,
            device_id: 0,
            driver_version: 0,
            _ne: crate::NonExhaustive(()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            ref metal_features,
            ref enabled_features,
            ..
        } = self;

        if metal_features.max_per_stage_buffer_count == 0 {
            return Err(Box::new(ValidationError {
                context: "metal_features.max_per_stage_buffer_count".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        if enabled_features.tessellation_shader
            && (metal_features.max_tessellation_factor == 0
                || metal_features.max_patch_control_points == 0)
        {
            return Err(Box::new(ValidationError {
                context: "enabled_features.tessellation_shader".into(),
                problem: "is enabled, but `metal_features` reports no tessellation support".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }
}

impl Debug for DeviceCreateInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("DeviceCreateInfo")
            .field("configuration", &self.configuration)
            .field("metal_features", &self.metal_features)
            .field("enabled_features", &self.enabled_features)
            .field("vendor_id", &self.vendor_id)
            .field("device_id", &self.device_id)
            .field("driver_version", &self.driver_version)
            .finish_non_exhaustive()
    }
}

/// Capabilities of the native backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetalFeatures {
    /// The MSL version that converted shaders target, as `major * 10000 + minor * 100 + patch`.
    pub msl_version: u32,

    /// The number of buffer slots available to each shader stage.
    pub max_per_stage_buffer_count: u32,

    /// The largest texture width, also used as the width of texel buffer textures.
    pub max_texture_dimension: u32,

    /// The threadgroup memory available to a compute pass, in bytes.
    pub max_compute_shared_memory_size: u32,

    pub max_tessellation_factor: u32,
    pub max_patch_control_points: u32,
}

impl Default for MetalFeatures {
    #[inline]
    fn default() -> Self {
        Self {
            msl_version: 20100,
            max_per_stage_buffer_count: 31,
            max_texture_dimension: 16384,
            max_compute_shared_memory_size: 32768,
            max_tessellation_factor: 64,
            max_patch_control_points: 32,
        }
    }
}

/// API features that can be enabled on a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub depth_clamp: bool,
    pub tessellation_shader: bool,
}

/// Properties of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceProperties {
    pub vendor_id: u32,
    pub device_id: u32,

    /// Identifies the format and producer of serialized pipeline cache data.
    pub pipeline_cache_uuid: [u8; 16],
}

fn pipeline_cache_uuid(msl_version: u32, driver_version: u32) -> [u8; 16] {
    let mut uuid = [0; 16];
    uuid[0..4].copy_from_slice(&CACHE_DATA_VERSION.to_be_bytes());
    uuid[4..8].copy_from_slice(&msl_version.to_be_bytes());
    uuid[8..12].copy_from_slice(&driver_version.to_be_bytes());
    uuid
}

#[cfg(test)]
mod tests {
    use super::{Device, DeviceCreateInfo, DeviceFeatures, MetalFeatures};
    use crate::tests::{MockBackend, MockConverter};
    use std::sync::Arc;

    #[test]
    fn cache_uuid_tracks_driver() {
        let create = |driver_version| {
            Device::new(DeviceCreateInfo {
                driver_version,
                ..DeviceCreateInfo::new(
                    Arc::new(MockBackend::default()),
                    Arc::new(MockConverter::default()),
                )
            })
            .unwrap()
        };

        let a = create(1);
        let b = create(1);
        let c = create(2);
        assert_eq!(a.properties().pipeline_cache_uuid, b.properties().pipeline_cache_uuid);
        assert_ne!(a.properties().pipeline_cache_uuid, c.properties().pipeline_cache_uuid);
        assert_ne!(a, b);
    }

    #[test]
    fn tessellation_requires_support() {
        let result = Device::new(DeviceCreateInfo {
            metal_features: MetalFeatures {
                max_tessellation_factor: 0,
                ..MetalFeatures::default()
            },
            enabled_features: DeviceFeatures {
                tessellation_shader: true,
                ..DeviceFeatures::default()
            },
            ..DeviceCreateInfo::new(
                Arc::new(MockBackend::default()),
                Arc::new(MockConverter::default()),
            )
        });

        assert!(result.is_err());
    }
}
