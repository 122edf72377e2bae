// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The native backend that pipelines are compiled for.
//!
//! The backend is an external collaborator. It receives fully assembled pipeline descriptors
//! (see [`descriptor`]) and compiles them asynchronously, reporting the outcome through a
//! [`CompletionHandler`] that may run on any thread, at any later time, or never.
//!
//! Compiled states are owned by [`RenderPipelineState`] and [`ComputePipelineState`] values, which
//! hand their native handle back to the backend when they are dropped.

use self::descriptor::{ComputePipelineDescriptor, RenderPipelineDescriptor};
use bytemuck::{Pod, Zeroable};
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    sync::Arc,
};

pub mod descriptor;

/// An opaque handle to a native object (pipeline state, buffer, texture or sampler).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Returns whether `self` is the null handle.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Receives the outcome of an asynchronous compile: the new state, or the backend's diagnostic.
pub type CompletionHandler = Box<dyn FnOnce(Result<NativeHandle, String>) + Send + 'static>;

/// The native pipeline compiler.
pub trait Backend: Send + Sync + 'static {
    /// Starts compiling a render pipeline state. `completion` must be called at most once.
    fn new_render_pipeline_state(
        &self,
        descriptor: &RenderPipelineDescriptor,
        completion: CompletionHandler,
    );

    /// Starts compiling a compute pipeline state. `completion` must be called at most once.
    fn new_compute_pipeline_state(
        &self,
        descriptor: &ComputePipelineDescriptor,
        completion: CompletionHandler,
    );

    /// Releases a state previously delivered through a completion handler.
    fn release_pipeline_state(&self, handle: NativeHandle);
}

struct OwnedState {
    backend: Arc<dyn Backend>,
    handle: NativeHandle,
}

impl Drop for OwnedState {
    #[inline]
    fn drop(&mut self) {
        self.backend.release_pipeline_state(self.handle);
    }
}

macro_rules! owned_state {
    ($(#[doc = $doc:literal])* $name:ident) => {
        $(#[doc = $doc])*
        pub struct $name(OwnedState);

        impl $name {
            pub(crate) fn from_handle(backend: Arc<dyn Backend>, handle: NativeHandle) -> Self {
                Self(OwnedState { backend, handle })
            }

            /// Returns the native handle of the state.
            #[inline]
            pub fn handle(&self) -> NativeHandle {
                self.0.handle
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
                f.debug_tuple(stringify!($name)).field(&self.0.handle).finish()
            }
        }
    };
}

owned_state! {
    /// A compiled native render pipeline state.
    RenderPipelineState
}

owned_state! {
    /// A compiled native compute pipeline state.
    ComputePipelineState
}

#[cfg(test)]
mod tests {
    use super::{NativeHandle, RenderPipelineState};
    use crate::tests::MockBackend;
    use std::sync::Arc;

    #[test]
    fn state_released_on_drop() {
        let backend = Arc::new(MockBackend::default());
        let state = RenderPipelineState::from_handle(backend.clone(), NativeHandle(7));
        assert_eq!(state.handle(), NativeHandle(7));
        assert!(backend.released().is_empty());

        drop(state);
        assert_eq!(backend.released(), [NativeHandle(7)]);
    }
}
