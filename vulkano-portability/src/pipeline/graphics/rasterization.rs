// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Configures how primitives should be converted into collections of fragments.

use crate::{
    backend::descriptor::{self, DepthBias, TriangleFillMode, Winding},
    macros::vulkan_enum,
};

/// The state in a graphics pipeline describing how the rasterization stage should behave.
#[derive(Clone, Debug)]
pub struct RasterizationState {
    /// If true, then the depth value of the vertices will be clamped to the range [0.0, 1.0]. If
    /// false, fragments whose depth is outside of this range will be discarded.
    ///
    /// If enabled, the [`depth_clamp`](crate::device::DeviceFeatures::depth_clamp) feature must be
    /// enabled on the device.
    ///
    /// The default value is `false`.
    pub depth_clamp_enable: bool,

    /// If true, all the fragments will be discarded, and the fragment shader will not be run. This
    /// is usually used when your vertex shader has some side effects and you don't need to run the
    /// fragment shader.
    ///
    /// The default value is `false`.
    pub rasterizer_discard_enable: bool,

    /// This setting can ask the rasterizer to downgrade triangles into lines or points, or lines
    /// into points.
    ///
    /// The native rasterizer can only draw triangle outlines; `Point` is drawn as `Fill`.
    ///
    /// The default value is [`PolygonMode::Fill`].
    pub polygon_mode: PolygonMode,

    /// Specifies whether front faces or back faces should be discarded, or none, or both.
    ///
    /// The native rasterizer can't cull both faces, so `FrontAndBack` disables rasterization
    /// altogether.
    ///
    /// The default value is [`CullMode::None`].
    pub cull_mode: CullMode,

    /// Specifies which triangle orientation is considered to be the front of the triangle.
    ///
    /// The default value is [`FrontFace::CounterClockwise`].
    pub front_face: FrontFace,

    /// Sets how to modify depth values in the rasterization stage.
    ///
    /// If set to `None`, depth biasing is disabled, the depth values will pass to the fragment
    /// shader unmodified.
    ///
    /// The default value is `None`.
    pub depth_bias: Option<DepthBiasState>,

    /// Width, in pixels, of lines when drawing lines.
    ///
    /// Only `1.0` is supported natively; other values are ignored.
    ///
    /// The default value is `1.0`.
    pub line_width: f32,

    pub _ne: crate::NonExhaustive,
}

impl Default for RasterizationState {
    #[inline]
    fn default() -> Self {
        Self {
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            polygon_mode: Default::default(),
            cull_mode: Default::default(),
            front_face: Default::default(),
            depth_bias: None,
            line_width: 1.0,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl RasterizationState {
    /// Returns whether no fragment can come out of the rasterizer.
    #[inline]
    pub(crate) fn is_rasterization_disabled(&self) -> bool {
        self.rasterizer_discard_enable || self.cull_mode == CullMode::FrontAndBack
    }
}

/// The values to use for depth biasing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBiasState {
    /// Specifies a constant factor to be multiplied to every depth value.
    ///
    /// The default value is `1.0`.
    pub constant_factor: f32,

    /// The maximum (or minimum) depth bias of a fragment.
    ///
    /// The default value is `0.0`.
    pub clamp: f32,

    /// A scalar factor to multiply with a fragment's slope in depth bias calculations.
    ///
    /// The default value is `1.0`.
    pub slope_factor: f32,
}

impl Default for DepthBiasState {
    #[inline]
    fn default() -> Self {
        Self {
            constant_factor: 1.0,
            clamp: 0.0,
            slope_factor: 1.0,
        }
    }
}

impl From<DepthBiasState> for DepthBias {
    #[inline]
    fn from(val: DepthBiasState) -> Self {
        DepthBias {
            constant_factor: val.constant_factor,
            slope_factor: val.slope_factor,
            clamp: val.clamp,
        }
    }
}

vulkan_enum! {
    /// Specifies the culling mode.
    ///
    /// This setting works in pair with `front_face`. The `front_face` setting tells the GPU whether
    /// clockwise or counter-clockwise correspond to the front and the back of each triangle. Then
    /// `cull_mode` lets you specify whether front faces should be discarded, back faces should be
    /// discarded, or none, or both.
    CullMode = CullModeFlags(u32);

    /// No culling.
    None = NONE,

    /// The faces facing the front of the screen (ie. facing the user) will be removed.
    Front = FRONT,

    /// The faces facing the back of the screen will be removed.
    Back = BACK,

    /// All faces will be removed.
    FrontAndBack = FRONT_AND_BACK,
}

impl Default for CullMode {
    #[inline]
    fn default() -> CullMode {
        CullMode::None
    }
}

impl From<CullMode> for descriptor::CullMode {
    /// `FrontAndBack` has no native equivalent and maps to no culling; the pipeline disables
    /// rasterization instead.
    #[inline]
    fn from(val: CullMode) -> Self {
        match val {
            CullMode::None | CullMode::FrontAndBack => descriptor::CullMode::None,
            CullMode::Front => descriptor::CullMode::Front,
            CullMode::Back => descriptor::CullMode::Back,
        }
    }
}

vulkan_enum! {
    /// Specifies which triangle orientation corresponds to the front or the triangle.
    FrontFace = FrontFace(i32);

    /// Triangles whose vertices are oriented counter-clockwise on the screen will be considered
    /// as facing their front. Otherwise they will be considered as facing their back.
    CounterClockwise = COUNTER_CLOCKWISE,

    /// Triangles whose vertices are oriented clockwise on the screen will be considered
    /// as facing their front. Otherwise they will be considered as facing their back.
    Clockwise = CLOCKWISE,
}

impl Default for FrontFace {
    #[inline]
    fn default() -> FrontFace {
        FrontFace::CounterClockwise
    }
}

impl From<FrontFace> for Winding {
    #[inline]
    fn from(val: FrontFace) -> Self {
        match val {
            FrontFace::CounterClockwise => Winding::CounterClockwise,
            FrontFace::Clockwise => Winding::Clockwise,
        }
    }
}

vulkan_enum! {
    /// How polygons are filled.
    PolygonMode = PolygonMode(i32);

    /// The interior of polygons is filled.
    Fill = FILL,

    /// Only the edges of polygons are drawn.
    Line = LINE,

    /// Only the vertices of polygons are drawn.
    Point = POINT,
}

impl Default for PolygonMode {
    #[inline]
    fn default() -> PolygonMode {
        PolygonMode::Fill
    }
}

impl From<PolygonMode> for TriangleFillMode {
    #[inline]
    fn from(val: PolygonMode) -> Self {
        match val {
            PolygonMode::Line => TriangleFillMode::Lines,
            PolygonMode::Fill | PolygonMode::Point => TriangleFillMode::Fill,
        }
    }
}
