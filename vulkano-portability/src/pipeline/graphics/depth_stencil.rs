// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Configures the operation of the depth and stencil tests.
//!
//! The depth test passes or fails depending on how the depth value of each fragment compares
//! to the existing depth value in the depth buffer at that fragment's location. Depth values
//! are always between 0.0 and 1.0.
//!
//! The stencil test passes or fails depending on how a reference value compares to the existing
//! value in the stencil buffer at each fragment's location. Depending on the outcome of the
//! depth and stencil tests, the value of the stencil buffer at that location can be updated.
//!
//! The native backend keeps depth and stencil configuration in a separate state object, not in
//! the compiled pipeline. A graphics pipeline keeps a snapshot of this state and hands it to the
//! encoder each time its raster stage is encoded.

use crate::macros::vulkan_enum;

/// The state in a graphics pipeline describing how the depth and stencil tests should behave.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DepthStencilState {
    /// The state of the depth test.
    ///
    /// If set to `None`, the depth test is disabled, all fragments will pass and no depth writes
    /// are performed.
    ///
    /// The default value is `None`.
    pub depth: Option<DepthState>,

    /// The state of the stencil test.
    ///
    /// If set to `None`, the stencil test is disabled, all fragments will pass and no stencil
    /// writes are performed.
    ///
    /// The default value is `None`.
    pub stencil: Option<StencilState>,

    pub _ne: crate::NonExhaustive,
}

impl DepthStencilState {
    /// Returns the stencil reference values of the front and back faces, or zero when the
    /// stencil test is disabled.
    #[inline]
    pub fn stencil_reference(&self) -> (u32, u32) {
        self.stencil
            .as_ref()
            .map_or((0, 0), |stencil| (stencil.front.reference, stencil.back.reference))
    }
}

/// The state in a graphics pipeline describing how the depth test should behave when enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    /// Sets whether the value in the depth buffer will be updated when the depth test succeeds.
    ///
    /// The default value is `false`.
    pub write_enable: bool,

    /// Comparison operation to use between the depth value of each incoming fragment and the
    /// depth value currently in the depth buffer.
    ///
    /// The default value is [`CompareOp::Always`].
    pub compare_op: CompareOp,
}

impl Default for DepthState {
    /// Returns a [`DepthState`] with all tests passing and no writes.
    #[inline]
    fn default() -> Self {
        Self {
            write_enable: false,
            compare_op: CompareOp::Always,
        }
    }
}

impl DepthState {
    /// Returns a `DepthState` with a `Less` depth test and depth writes enabled.
    #[inline]
    pub fn simple() -> Self {
        Self {
            compare_op: CompareOp::Less,
            write_enable: true,
        }
    }
}

/// The state in a graphics pipeline describing how the stencil test should behave when enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StencilState {
    /// The stencil operation state to use for points and lines, and for triangles whose front is
    /// facing the user.
    pub front: StencilOpState,

    /// The stencil operation state to use for triangles whose back is facing the user.
    pub back: StencilOpState,
}

/// Stencil test operations for a single face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilOpState {
    /// The stencil operations to perform.
    pub ops: StencilOps,

    /// A bitmask that selects the bits of the unsigned integer stencil values participating in
    /// the stencil test. Ignored if `compare_op` is `Never` or `Always`.
    pub compare_mask: u32,

    /// A bitmask that selects the bits of the unsigned integer stencil values updated by the
    /// stencil test in the stencil framebuffer attachment. Ignored if the relevant operation is
    /// `Keep`.
    pub write_mask: u32,

    /// Reference value that is used in the unsigned stencil comparison. The stencil test is
    /// considered to pass if the `compare_op` between the stencil buffer value and this reference
    /// value yields true.
    pub reference: u32,
}

impl Default for StencilOpState {
    #[inline]
    fn default() -> StencilOpState {
        StencilOpState {
            ops: Default::default(),
            compare_mask: u32::MAX,
            write_mask: u32::MAX,
            reference: u32::MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilOps {
    /// The operation to perform when the stencil test failed.
    pub fail_op: StencilOp,

    /// The operation to perform when both the depth test and the stencil test passed.
    pub pass_op: StencilOp,

    /// The operation to perform when the stencil test passed but the depth test failed.
    pub depth_fail_op: StencilOp,

    /// The comparison to perform between the existing stencil value in the stencil buffer, and
    /// the reference value (given by `reference`).
    pub compare_op: CompareOp,
}

impl Default for StencilOps {
    #[inline]
    fn default() -> Self {
        Self {
            pass_op: StencilOp::Keep,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Never,
        }
    }
}

vulkan_enum! {
    /// Operation to perform after the depth and stencil tests.
    StencilOp = StencilOp(i32);

    Keep = KEEP,

    Zero = ZERO,

    Replace = REPLACE,

    IncrementAndClamp = INCREMENT_AND_CLAMP,

    DecrementAndClamp = DECREMENT_AND_CLAMP,

    Invert = INVERT,

    IncrementAndWrap = INCREMENT_AND_WRAP,

    DecrementAndWrap = DECREMENT_AND_WRAP,
}

vulkan_enum! {
    /// Specifies how two values should be compared to decide whether a test passes or fails.
    ///
    /// Used for both depth testing and stencil testing.
    CompareOp = CompareOp(i32);

    /// The test never passes.
    Never = NEVER,

    /// The test passes if `value < reference_value`.
    Less = LESS,

    /// The test passes if `value == reference_value`.
    Equal = EQUAL,

    /// The test passes if `value <= reference_value`.
    LessOrEqual = LESS_OR_EQUAL,

    /// The test passes if `value > reference_value`.
    Greater = GREATER,

    /// The test passes if `value != reference_value`.
    NotEqual = NOT_EQUAL,

    /// The test passes if `value >= reference_value`.
    GreaterOrEqual = GREATER_OR_EQUAL,

    /// The test always passes.
    Always = ALWAYS,
}
