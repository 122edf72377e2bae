// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Waiting on the asynchronous native pipeline compiler.
//!
//! The backend reports compile results through a completion handler, which may run on any thread,
//! right away, later, or never. A compiler submits one request and blocks the calling thread until
//! either the result arrives or the device's
//! [`compile_timeout`](crate::config::MetalConfiguration::compile_timeout) expires.
//!
//! There is no way to cancel a native compile. When the wait times out, the request is abandoned:
//! a result that arrives afterwards is released straight back to the backend.

use crate::{
    backend::{
        descriptor::{ComputePipelineDescriptor, RenderPipelineDescriptor},
        CompletionHandler, ComputePipelineState, NativeHandle, RenderPipelineState,
    },
    device::Device,
};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    sync::Arc,
    time::{Duration, Instant},
};

/// Compiles one render pipeline state.
#[derive(Debug)]
pub struct RenderPipelineCompiler {
    inner: Compiler,
}

impl RenderPipelineCompiler {
    #[inline]
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            inner: Compiler::new(device, CompilerKind::RenderPipeline),
        }
    }

    /// Compiles `descriptor`, waiting at most for the device's compile timeout.
    pub fn compile(
        self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineState, CompileError> {
        let device = self.inner.device.clone();
        let handle = self.inner.compile(|completion| {
            device
                .backend()
                .new_render_pipeline_state(descriptor, completion);
        })?;

        Ok(RenderPipelineState::from_handle(
            device.backend().clone(),
            handle,
        ))
    }
}

/// Compiles one compute pipeline state.
#[derive(Debug)]
pub struct ComputePipelineCompiler {
    inner: Compiler,
}

impl ComputePipelineCompiler {
    #[inline]
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            inner: Compiler::new(device, CompilerKind::ComputePipeline),
        }
    }

    /// Compiles `descriptor`, waiting at most for the device's compile timeout.
    pub fn compile(
        self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineState, CompileError> {
        let device = self.inner.device.clone();
        let handle = self.inner.compile(|completion| {
            device
                .backend()
                .new_compute_pipeline_state(descriptor, completion);
        })?;

        Ok(ComputePipelineState::from_handle(
            device.backend().clone(),
            handle,
        ))
    }
}

#[derive(Debug)]
struct Compiler {
    device: Arc<Device>,
    kind: CompilerKind,
    slot: Arc<(Mutex<CompileSlot>, Condvar)>,
}

#[derive(Debug, Default)]
struct CompileSlot {
    result: Option<Result<NativeHandle, String>>,
    abandoned: bool,
}

impl Compiler {
    fn new(device: Arc<Device>, kind: CompilerKind) -> Self {
        Compiler {
            device,
            kind,
            slot: Arc::new((Mutex::new(CompileSlot::default()), Condvar::new())),
        }
    }

    fn completion_handler(&self) -> CompletionHandler {
        let slot = self.slot.clone();
        let backend = self.device.backend().clone();
        let kind = self.kind;

        Box::new(move |result| {
            let (mutex, condvar) = &*slot;
            let mut slot = mutex.lock();

            if slot.abandoned {
                drop(slot);
                debug!("{} compile finished after being abandoned; discarding it", kind);

                if let Ok(handle) = result {
                    backend.release_pipeline_state(handle);
                }

                return;
            }

            slot.result = Some(result);
            condvar.notify_all();
        })
    }

    fn compile(self, submit: impl FnOnce(CompletionHandler)) -> Result<NativeHandle, CompileError> {
        let start = Instant::now();
        let timeout = self.device.configuration().compile_timeout;

        submit(self.completion_handler());

        let result = {
            let (mutex, condvar) = &*self.slot;
            let mut slot = mutex.lock();
            condvar.wait_while_for(&mut slot, |slot| slot.result.is_none(), timeout);

            match slot.result.take() {
                Some(result) => result,
                None => {
                    slot.abandoned = true;
                    drop(slot);
                    self.device
                        .record_activity(&self.device.performance().pipeline_compile, start);
                    error!(
                        "{} compile failed: Timeout after {} milliseconds. Consider increasing \
                        the compile timeout.",
                        self.kind,
                        timeout.as_millis(),
                    );

                    return Err(CompileError::Timeout {
                        compiler: self.kind,
                        timeout,
                    });
                }
            }
        };

        self.device
            .record_activity(&self.device.performance().pipeline_compile, start);

        result.map_err(|message| {
            error!("{} compile failed: {}", self.kind, message);

            CompileError::Failed {
                compiler: self.kind,
                message,
            }
        })
    }
}

/// Which kind of pipeline state a compiler produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompilerKind {
    RenderPipeline,
    ComputePipeline,
}

impl Display for CompilerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::RenderPipeline => write!(f, "Render pipeline"),
            Self::ComputePipeline => write!(f, "Compute pipeline"),
        }
    }
}

/// Error that can happen when compiling a native pipeline state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// The backend did not report a result in time.
    Timeout {
        compiler: CompilerKind,
        timeout: Duration,
    },

    /// The backend rejected the descriptor.
    Failed {
        compiler: CompilerKind,
        message: String,
    },
}

impl Error for CompileError {}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Timeout { compiler, timeout } => write!(
                f,
                "{} compile failed: timeout after {} milliseconds",
                compiler,
                timeout.as_millis(),
            ),
            Self::Failed { compiler, message } => {
                write!(f, "{} compile failed: {}", compiler, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MetalConfiguration,
        tests::{capture_logs, test_device_with, CompletionMode},
    };
    use log::Level;
    use std::thread;

    fn with_timeout(timeout: Duration) -> MetalConfiguration {
        MetalConfiguration {
            compile_timeout: timeout,
            ..Default::default()
        }
    }

    #[test]
    fn immediate_and_threaded() {
        for mode in [CompletionMode::Immediate, CompletionMode::Threaded] {
            let (device, backend, _) = test_device_with(|create_info| {
                create_info.configuration = with_timeout(Duration::from_secs(10));
            });
            backend.set_mode(mode);

            let state = RenderPipelineCompiler::new(device.clone())
                .compile(&RenderPipelineDescriptor::default())
                .unwrap();
            assert!(!state.handle().is_null());
            assert_eq!(device.performance().pipeline_compile.statistics().count, 1);

            drop(state);
            assert_eq!(backend.live_handles(), 0);
        }
    }

    #[test]
    fn failure_is_logged() {
        let (device, backend, _) = test_device_with(|_| {});
        backend.set_mode(CompletionMode::Fail(String::from("bad function")));

        let (result, logs) = capture_logs(|| {
            ComputePipelineCompiler::new(device).compile(&ComputePipelineDescriptor::default())
        });

        assert_eq!(
            result.unwrap_err(),
            CompileError::Failed {
                compiler: CompilerKind::ComputePipeline,
                message: String::from("bad function"),
            },
        );
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, Level::Error);
        assert_eq!(logs[0].message, "Compute pipeline compile failed: bad function");
    }

    #[test]
    fn never_responding_backend_times_out() {
        let timeout = Duration::from_millis(50);
        let (device, backend, _) = test_device_with(|create_info| {
            create_info.configuration = with_timeout(timeout);
        });
        backend.set_mode(CompletionMode::Never);

        let start = Instant::now();
        let (result, logs) = capture_logs(|| {
            RenderPipelineCompiler::new(device).compile(&RenderPipelineDescriptor::default())
        });
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(CompileError::Timeout { .. })));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(2));

        let errors: Vec<_> = logs
            .iter()
            .filter(|record| record.level == Level::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "Render pipeline compile failed: Timeout after 50 milliseconds. Consider increasing \
            the compile timeout.",
        );
    }

    #[test]
    fn late_result_is_released() {
        let (device, backend, _) = test_device_with(|create_info| {
            create_info.configuration = with_timeout(Duration::from_millis(10));
        });
        backend.set_mode(CompletionMode::Delayed(Duration::from_millis(100)));

        let result =
            RenderPipelineCompiler::new(device).compile(&RenderPipelineDescriptor::default());
        assert!(result.is_err());

        let deadline = Instant::now() + Duration::from_secs(5);
        while backend.released().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(backend.released().len(), 1);
        assert_eq!(backend.live_handles(), 0);
    }
}
