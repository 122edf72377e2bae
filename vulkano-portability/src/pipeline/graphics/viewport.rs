// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Configure how to map vertices to pixels.
//!
//! The final output of the last shader stage is a 4-component vector. After the vertex is
//! divided by its `w` component, the `x` and `y` coordinates are mapped to the framebuffer with
//! a *viewport*, and fragments outside of the *scissor* box are discarded.
//!
//! Either can be fixed in the pipeline or declared dynamic. When a state is dynamic, the pipeline
//! only keeps the number of entries, and leaves the values to the command buffer.

use crate::backend::descriptor::{self, ScissorRect};
use smallvec::{smallvec, SmallVec};
use std::ops::RangeInclusive;

/// List of viewports and scissors that are used when rendering.
#[derive(Clone, Debug)]
pub struct ViewportState {
    /// Specifies the viewport transforms.
    ///
    /// When [`DynamicState::Viewport`](crate::pipeline::DynamicState::Viewport) is used, only the
    /// number of elements matters, and their values are ignored.
    ///
    /// The default value is a single element of `Viewport::default()`.
    pub viewports: SmallVec<[Viewport; 1]>,

    /// Specifies the scissor rectangles.
    ///
    /// When [`DynamicState::Scissor`](crate::pipeline::DynamicState::Scissor) is used, only the
    /// number of elements matters, and their values are ignored.
    ///
    /// The default value is a single element of `Scissor::default()`.
    pub scissors: SmallVec<[Scissor; 1]>,

    pub _ne: crate::NonExhaustive,
}

impl Default for ViewportState {
    #[inline]
    fn default() -> Self {
        Self {
            viewports: smallvec![Viewport::default()],
            scissors: smallvec![Scissor::default()],
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// State of a single viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    /// Coordinates in pixels of the top-left hand corner of the viewport.
    ///
    /// The default value is `[0.0; 2]`.
    pub offset: [f32; 2],

    /// Dimensions in pixels of the viewport.
    ///
    /// The default value is `[1.0; 2]`.
    pub extent: [f32; 2],

    /// Minimum and maximum values of the depth.
    ///
    /// The values `0.0` to `1.0` of each vertex's Z coordinate will be mapped to this
    /// `depth_range` before being compared to the existing depth value.
    ///
    /// The default value is `0.0..=1.0`.
    pub depth_range: RangeInclusive<f32>,
}

impl Default for Viewport {
    #[inline]
    fn default() -> Self {
        Self {
            offset: [0.0; 2],
            extent: [1.0; 2],
            depth_range: 0.0..=1.0,
        }
    }
}

impl From<&Viewport> for descriptor::Viewport {
    #[inline]
    fn from(val: &Viewport) -> Self {
        descriptor::Viewport {
            origin_x: val.offset[0] as f64,
            origin_y: val.offset[1] as f64,
            width: val.extent[0] as f64,
            height: val.extent[1] as f64,
            znear: *val.depth_range.start() as f64,
            zfar: *val.depth_range.end() as f64,
        }
    }
}

/// A two-dimensional subregion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scissor {
    /// Coordinates of the top-left hand corner of the box.
    ///
    /// The default value is `[0; 2]`.
    pub offset: [u32; 2],

    /// Dimensions of the box.
    ///
    /// The default value is `[i32::MAX as u32; 2]`.
    pub extent: [u32; 2],
}

impl Default for Scissor {
    #[inline]
    fn default() -> Self {
        Self {
            offset: [0; 2],
            extent: [i32::MAX as u32; 2],
        }
    }
}

impl From<&Scissor> for ScissorRect {
    #[inline]
    fn from(val: &Scissor) -> Self {
        ScissorRect {
            x: val.offset[0],
            y: val.offset[1],
            width: val.extent[0],
            height: val.extent[1],
        }
    }
}
