// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Configures how input vertices are assembled into primitives.

use crate::{
    backend::descriptor::{PrimitiveTopologyClass, PrimitiveType},
    macros::vulkan_enum,
};

/// The state in a graphics pipeline describing how the input assembly stage should behave.
#[derive(Clone, Copy, Debug)]
pub struct InputAssemblyState {
    /// The type of primitives.
    ///
    /// Fans and topologies with adjacency have no native equivalent, and are rejected when the
    /// pipeline is created.
    ///
    /// The default value is [`PrimitiveTopology::TriangleList`].
    pub topology: PrimitiveTopology,

    /// If true, then when drawing with an index buffer, the special index value consisting of the
    /// maximum unsigned value (`0xff`, `0xffff` or `0xffffffff`) will tell the GPU that it is the
    /// end of the current primitive. A new primitive will restart at the next index.
    ///
    /// The native backend always restarts strips on that value, so this flag changes nothing
    /// there.
    ///
    /// The default value is `false`.
    pub primitive_restart_enable: bool,

    pub _ne: crate::NonExhaustive,
}

impl Default for InputAssemblyState {
    /// Returns [`InputAssemblyState::new()`].
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl InputAssemblyState {
    /// Creates an `InputAssemblyState` with the `TriangleList` topology and primitive restart
    /// disabled.
    #[inline]
    pub fn new() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart_enable: false,
            _ne: crate::NonExhaustive(()),
        }
    }

    /// Sets the primitive topology.
    #[inline]
    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }
}

vulkan_enum! {
    /// Describes how vertices must be grouped together to form primitives.
    PrimitiveTopology impl {
        /// Returns the topology class of this topology.
        #[inline]
        pub fn class(self) -> PrimitiveTopologyClass {
            match self {
                Self::PointList => PrimitiveTopologyClass::Point,
                Self::LineList
                | Self::LineStrip
                | Self::LineListWithAdjacency
                | Self::LineStripWithAdjacency => PrimitiveTopologyClass::Line,
                Self::TriangleList
                | Self::TriangleStrip
                | Self::TriangleFan
                | Self::TriangleListWithAdjacency
                | Self::TriangleStripWithAdjacency
                | Self::PatchList => PrimitiveTopologyClass::Triangle,
            }
        }

        /// Returns the native primitive type, or `None` if the topology has none.
        ///
        /// Patches are drawn as triangles once tessellated.
        #[inline]
        pub fn primitive_type(self) -> Option<PrimitiveType> {
            Some(match self {
                Self::PointList => PrimitiveType::Point,
                Self::LineList => PrimitiveType::Line,
                Self::LineStrip => PrimitiveType::LineStrip,
                Self::TriangleList | Self::PatchList => PrimitiveType::Triangle,
                Self::TriangleStrip => PrimitiveType::TriangleStrip,
                Self::TriangleFan
                | Self::LineListWithAdjacency
                | Self::LineStripWithAdjacency
                | Self::TriangleListWithAdjacency
                | Self::TriangleStripWithAdjacency => return None,
            })
        }
    }
    = PrimitiveTopology(i32);

    /// A series of separate point primitives.
    PointList = POINT_LIST,

    /// A series of separate line primitives.
    LineList = LINE_LIST,

    /// A series of consecutive line primitives, with consecutive lines sharing a vertex.
    LineStrip = LINE_STRIP,

    /// A series of separate triangle primitives.
    TriangleList = TRIANGLE_LIST,

    /// A series of consecutive triangle primitives, with consecutive triangles sharing an edge
    /// (two vertices).
    TriangleStrip = TRIANGLE_STRIP,

    /// A series of consecutive triangle primitives, with all triangles sharing a common vertex
    /// (the first).
    TriangleFan = TRIANGLE_FAN,

    /// As `LineList`, but with adjacency, used in combination with geometry shaders.
    LineListWithAdjacency = LINE_LIST_WITH_ADJACENCY,

    /// As `LineStrip`, but with adjacency, used in combination with geometry shaders.
    LineStripWithAdjacency = LINE_STRIP_WITH_ADJACENCY,

    /// As `TriangleList`, but with adjacency, used in combination with geometry shaders.
    TriangleListWithAdjacency = TRIANGLE_LIST_WITH_ADJACENCY,

    /// As `TriangleStrip`, but with adjacency, used in combination with geometry shaders.
    TriangleStripWithAdjacency = TRIANGLE_STRIP_WITH_ADJACENCY,

    /// Separate patch primitives, used in combination with tessellation shaders.
    PatchList = PATCH_LIST,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_topologies() {
        assert_eq!(
            PrimitiveTopology::PatchList.primitive_type(),
            Some(PrimitiveType::Triangle),
        );
        assert_eq!(
            PrimitiveTopology::LineStrip.primitive_type(),
            Some(PrimitiveType::LineStrip),
        );
        assert_eq!(PrimitiveTopology::TriangleFan.primitive_type(), None);
        assert_eq!(
            PrimitiveTopology::TriangleStripWithAdjacency.primitive_type(),
            None,
        );
        assert_eq!(
            PrimitiveTopology::LineListWithAdjacency.class(),
            PrimitiveTopologyClass::Line,
        );
    }
}
