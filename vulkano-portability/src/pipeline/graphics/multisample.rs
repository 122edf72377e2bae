// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Generates multiple fragments per framebuffer pixel when rasterizing. This can be used for
//! anti-aliasing.

use crate::macros::vulkan_enum;

/// State of the multisampling.
#[derive(Copy, Clone, Debug)]
pub struct MultisampleState {
    /// The number of rasterization samples to take per pixel. The GPU will pick this many
    /// different locations within each pixel and assign to each of these locations a different
    /// depth value. The depth and stencil test will then be run for each sample.
    ///
    /// The default value is [`SampleCount::Sample1`].
    pub rasterization_samples: SampleCount,

    /// Controls the proportion (between 0.0 and 1.0) of the samples that will be run through the
    /// fragment shader.
    ///
    /// The native backend shades per sample only when the shader asks for it, so this value is
    /// not forwarded.
    ///
    /// The default value is `None`.
    pub sample_shading: Option<f32>,

    /// Controls whether the alpha value of the fragment will be used in an implementation-defined
    /// way to determine which samples get disabled or not. For example if the alpha value is 0.5,
    /// then about half of the samples will be discarded. If you render to a multisample image,
    /// this means that the color will end up being mixed with whatever color was underneath,
    /// which gives the same effect as alpha blending.
    ///
    /// The default value is `false`.
    pub alpha_to_coverage_enable: bool,

    /// Controls whether the alpha value of all the samples will be forced to 1.0 (or the
    /// maximum possible value) after the effects of `alpha_to_coverage` have been applied.
    ///
    /// The default value is `false`.
    pub alpha_to_one_enable: bool,

    pub _ne: crate::NonExhaustive,
}

impl Default for MultisampleState {
    /// Returns [`MultisampleState::new()`].
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl MultisampleState {
    /// Creates a `MultisampleState` with multisampling disabled.
    #[inline]
    pub fn new() -> MultisampleState {
        MultisampleState {
            rasterization_samples: SampleCount::Sample1,
            sample_shading: None,
            alpha_to_coverage_enable: false,
            alpha_to_one_enable: false,
            _ne: crate::NonExhaustive(()),
        }
    }
}

vulkan_enum! {
    /// The number of samples per texel of an image.
    SampleCount = SampleCountFlags(u32);

    /// 1 sample per texel.
    Sample1 = TYPE_1,

    /// 2 samples per texel.
    Sample2 = TYPE_2,

    /// 4 samples per texel.
    Sample4 = TYPE_4,

    /// 8 samples per texel.
    Sample8 = TYPE_8,

    /// 16 samples per texel.
    Sample16 = TYPE_16,

    /// 32 samples per texel.
    Sample32 = TYPE_32,

    /// 64 samples per texel.
    Sample64 = TYPE_64,
}
