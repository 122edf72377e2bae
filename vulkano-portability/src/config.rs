// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Device-level configuration of the translation.
//!
//! The configuration is captured by a [`Device`](crate::device::Device) when it is created and is
//! read-only afterwards. Pipelines copy the parts they need at construction.

use log::warn;
use std::{env, str::FromStr, time::Duration};

/// Environment variable holding the compile timeout, in nanoseconds.
pub const COMPILE_TIMEOUT_ENV: &str = "VULKANO_PORTABILITY_COMPILE_TIMEOUT";
/// Environment variable enabling full image view swizzling.
pub const FULL_IMAGE_VIEW_SWIZZLE_ENV: &str = "VULKANO_PORTABILITY_FULL_IMAGE_VIEW_SWIZZLE";
/// Environment variable controlling the Y flip of vertex positions in converted shaders.
pub const FLIP_VERTEX_Y_ENV: &str = "VULKANO_PORTABILITY_FLIP_VERTEX_Y";
/// Environment variable enabling a log line per tracked activity.
pub const PERFORMANCE_LOGGING_ENV: &str = "VULKANO_PORTABILITY_PERFORMANCE_LOGGING";

/// Configuration of the translation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetalConfiguration {
    /// How long to wait for the native compiler before a pipeline compile is abandoned.
    ///
    /// The default value is `i64::MAX` nanoseconds, which never expires in practice.
    pub compile_timeout: Duration,

    /// Whether image view swizzles that the backend can't express natively are emulated in
    /// shaders. Enabling this makes converted shaders sample through a swizzle table held in the
    /// auxiliary buffer.
    ///
    /// The default value is `false`.
    pub full_image_view_swizzle: bool,

    /// Whether converted vertex stages flip the Y coordinate of their output position.
    ///
    /// The default value is `true`.
    pub shader_conversion_flip_vertex_y: bool,

    /// Whether each tracked activity is logged at the info level.
    ///
    /// The default value is `false`.
    pub performance_logging: bool,

    pub _ne: crate::NonExhaustive,
}

impl Default for MetalConfiguration {
    #[inline]
    fn default() -> Self {
        Self {
            compile_timeout: Duration::from_nanos(i64::MAX as u64),
            full_image_view_swizzle: false,
            shader_conversion_flip_vertex_y: true,
            performance_logging: false,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl MetalConfiguration {
    /// Returns the default configuration, overridden by any of the `VULKANO_PORTABILITY_*`
    /// environment variables that are set.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(nanos) = parse_var::<u64>(&lookup, COMPILE_TIMEOUT_ENV, |v| v.parse().ok()) {
            self.compile_timeout = Duration::from_nanos(nanos);
        }

        if let Some(value) = parse_var(&lookup, FULL_IMAGE_VIEW_SWIZZLE_ENV, parse_bool) {
            self.full_image_view_swizzle = value;
        }

        if let Some(value) = parse_var(&lookup, FLIP_VERTEX_Y_ENV, parse_bool) {
            self.shader_conversion_flip_vertex_y = value;
        }

        if let Some(value) = parse_var(&lookup, PERFORMANCE_LOGGING_ENV, parse_bool) {
            self.performance_logging = value;
        }

        self
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name)?;
    let parsed = parse(raw.trim());

    if parsed.is_none() {
        warn!("ignoring {}: `{}` is not a valid value", name, raw);
    }

    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => bool::from_str(&value.to_ascii_lowercase()).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_from_variables() {
        let config = MetalConfiguration::default().with_overrides(|name| match name {
            COMPILE_TIMEOUT_ENV => Some("2500000".to_owned()),
            FULL_IMAGE_VIEW_SWIZZLE_ENV => Some("1".to_owned()),
            FLIP_VERTEX_Y_ENV => Some("False".to_owned()),
            _ => None,
        });

        assert_eq!(config.compile_timeout, Duration::from_micros(2500));
        assert!(config.full_image_view_swizzle);
        assert!(!config.shader_conversion_flip_vertex_y);
        assert!(!config.performance_logging);
    }

    #[test]
    fn ignores_garbage() {
        let config = MetalConfiguration::default().with_overrides(|name| match name {
            COMPILE_TIMEOUT_ENV => Some("soon".to_owned()),
            PERFORMANCE_LOGGING_ENV => Some("maybe".to_owned()),
            _ => None,
        });

        assert_eq!(config, MetalConfiguration::default());
    }
}
