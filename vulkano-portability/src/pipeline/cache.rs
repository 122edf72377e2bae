// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Cache converted shader libraries, and store them to disk for faster reloads.
//!
//! Converting SPIR-V to MSL is the expensive part of building a pipeline. A pipeline cache
//! remembers every conversion made through it, keyed by the contents of the shader module and
//! the [`ShaderConversionContext`] the conversion was made with. A later request for the same
//! module with a matching context gets the earlier library back without converting again.
//!
//! Once that is done, you can extract the data from the cache and store it. See
//! [`get_data`](PipelineCache::get_data) and [`write_data`](PipelineCache::write_data) for how to
//! retrieve the data, and [`new`](PipelineCache::new) for how to reload it. Data that can't be
//! read, or that was written by a different device or driver, is discarded with a warning: a bad
//! cache file only costs the conversions it would have saved.

pub use self::data::{CacheDataError, CACHE_DATA_VERSION};
use self::data::CacheEntry;
use crate::{
    device::{Device, DeviceOwned},
    macros::impl_id_counter,
    shader::{
        conversion::{ShaderConversionContext, ShaderConversionError},
        ShaderLibrary, ShaderModule, ShaderModuleKey,
    },
    ValidationError,
};
use foldhash::{HashMap, HashMapExt};
use log::{debug, error, warn};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{num::NonZero, sync::Arc, time::Instant};

mod data;

/// Opaque cache of converted shader libraries.
///
/// See [the documentation of the module](crate::pipeline::cache) for more info.
#[derive(Debug)]
pub struct PipelineCache {
    device: Arc<Device>,
    id: NonZero<u64>,

    shader_caches: Mutex<HashMap<ShaderModuleKey, Arc<ShaderLibraryCache>>>,
    data_size: Mutex<DataSize>,
}

/// Memoized size of the serialized data. `generation` is bumped on every modification, so that a
/// size computed from an older snapshot is never stored.
#[derive(Debug, Default)]
struct DataSize {
    generation: u64,
    size: Option<usize>,
}

impl PipelineCache {
    /// Builds a new pipeline cache.
    ///
    /// If `create_info.initial_data` is not empty, it must have been retrieved with
    /// [`get_data`](PipelineCache::get_data) or [`write_data`](PipelineCache::write_data). Data
    /// that is malformed, or that was written for another device, is ignored and the cache
    /// starts out empty.
    pub fn new(device: Arc<Device>, create_info: PipelineCacheCreateInfo) -> Arc<PipelineCache> {
        let PipelineCacheCreateInfo {
            initial_data,
            _ne: _,
        } = create_info;

        let mut shader_caches: HashMap<ShaderModuleKey, Arc<ShaderLibraryCache>> = HashMap::new();

        if !initial_data.is_empty() {
            match data::decode(&initial_data, device.properties()) {
                Ok(entries) => {
                    debug!("loaded {} shader libraries from pipeline cache data", entries.len());

                    for CacheEntry {
                        key,
                        context,
                        library,
                    } in entries
                    {
                        shader_caches
                            .entry(key)
                            .or_default()
                            .add(context, Arc::new(library));
                    }
                }
                Err(err) => {
                    warn!("discarding pipeline cache data: {}", err);
                }
            }
        }

        Arc::new(PipelineCache {
            device,
            id: Self::next_id(),
            shader_caches: Mutex::new(shader_caches),
            data_size: Mutex::new(DataSize::default()),
        })
    }

    /// Returns the shader library converted from `module` with a context matching `context`,
    /// converting it on the first request.
    ///
    /// On return, `context` carries the usage flags of the conversion.
    pub fn shader_library(
        &self,
        module: &ShaderModule,
        context: &mut ShaderConversionContext,
    ) -> Result<Arc<ShaderLibrary>, ShaderConversionError> {
        let shader_cache = self.shader_cache(module.key());
        let (library, converted) = shader_cache.get_or_convert(&self.device, module, context)?;

        if converted {
            self.mark_dirty();
        }

        Ok(library)
    }

    /// Returns the inner cache of a module, creating it if needed. The outer lock is only held
    /// for the lookup.
    fn shader_cache(&self, key: ShaderModuleKey) -> Arc<ShaderLibraryCache> {
        self.shader_caches.lock().entry(key).or_default().clone()
    }

    /// Forgets the memoized size of the serialized data.
    #[inline]
    pub fn mark_dirty(&self) {
        let mut data_size = self.data_size.lock();
        data_size.generation = data_size.generation.wrapping_add(1);
        data_size.size = None;
    }

    /// Memoizes `size`, unless the cache was modified since `generation` was read.
    fn memoize_data_size(&self, generation: u64, size: usize) {
        let mut data_size = self.data_size.lock();

        if data_size.generation == generation {
            data_size.size = Some(size);
        }
    }

    /// Writes the serialized data of the cache into `buffer`.
    ///
    /// With `buffer` set to `None`, nothing is written and the required size is returned as
    /// [`CacheData::Complete`]. Otherwise, the data is written into the start of `buffer`. If it
    /// doesn't fit, the header, as many whole entries as fit and the end tag are written, and
    /// [`CacheData::Incomplete`] reports the number of bytes written. What was written is still
    /// valid cache data. If not even the header and the end tag fit, nothing is written. Nothing
    /// is ever written past the end of `buffer`.
    pub fn write_data(&self, buffer: Option<&mut [u8]>) -> CacheData {
        let Some(buffer) = buffer else {
            return CacheData::Complete(self.data_size());
        };

        let (generation, header, entries) = self.serialized_entries();
        let total_size = data::HEADER_SIZE
            + entries.iter().map(Vec::len).sum::<usize>()
            + data::END_SIZE;
        self.memoize_data_size(generation, total_size);

        if buffer.len() < data::HEADER_SIZE + data::END_SIZE {
            return CacheData::Incomplete(0);
        }

        buffer[..data::HEADER_SIZE].copy_from_slice(&header);
        let mut written = data::HEADER_SIZE;
        let mut complete = true;

        for entry in &entries {
            if written + entry.len() + data::END_SIZE > buffer.len() {
                complete = false;
                break;
            }

            buffer[written..written + entry.len()].copy_from_slice(entry);
            written += entry.len();
        }

        buffer[written..written + data::END_SIZE].copy_from_slice(&data::end());
        written += data::END_SIZE;

        if complete {
            CacheData::Complete(written)
        } else {
            CacheData::Incomplete(written)
        }
    }

    /// Obtains the data from the cache.
    ///
    /// This data can be stored and then reloaded and passed to `PipelineCache::new`.
    pub fn get_data(&self) -> Vec<u8> {
        let (generation, header, entries) = self.serialized_entries();
        let mut data = Vec::with_capacity(
            data::HEADER_SIZE + entries.iter().map(Vec::len).sum::<usize>() + data::END_SIZE,
        );
        data.extend_from_slice(&header);

        for entry in &entries {
            data.extend_from_slice(entry);
        }

        data.extend_from_slice(&data::end());
        self.memoize_data_size(generation, data.len());

        data
    }

    fn data_size(&self) -> usize {
        if let Some(size) = self.data_size.lock().size {
            return size;
        }

        let (generation, _, entries) = self.serialized_entries();
        let size = data::HEADER_SIZE + entries.iter().map(Vec::len).sum::<usize>() + data::END_SIZE;
        self.memoize_data_size(generation, size);

        size
    }

    /// Returns the header and the serialized entries, in a canonical order so that an unmodified
    /// cache always serializes to the same bytes. The returned generation is read before the
    /// snapshot is taken.
    fn serialized_entries(&self) -> (u64, [u8; data::HEADER_SIZE], Vec<Vec<u8>>) {
        let generation = self.data_size.lock().generation;
        let shader_caches: Vec<_> = self
            .shader_caches
            .lock()
            .iter()
            .map(|(&key, cache)| (key, cache.clone()))
            .collect();

        let mut entries: Vec<Vec<u8>> = shader_caches
            .iter()
            .flat_map(|(key, cache)| {
                cache
                    .snapshot()
                    .into_iter()
                    .map(|(context, library)| data::encode_entry(*key, &context, &library))
            })
            .collect();
        entries.sort_unstable();

        (generation, data::header(self.device.properties()), entries)
    }

    /// Merges other pipeline caches into this one.
    ///
    /// It is `self` that is modified here. The pipeline caches passed as parameter are untouched.
    /// When `self` already holds a library that can serve the same request, it is kept.
    pub fn merge<'a>(
        &self,
        src_caches: impl IntoIterator<Item = &'a PipelineCache>,
    ) -> Result<(), Box<ValidationError>> {
        let src_caches: SmallVec<[_; 8]> = src_caches.into_iter().collect();
        self.validate_merge(&src_caches)?;

        let mut added = 0;

        for src_cache in src_caches {
            // Only one outer lock is held at any time.
            let src_shader_caches: Vec<_> = src_cache
                .shader_caches
                .lock()
                .iter()
                .map(|(&key, cache)| (key, cache.clone()))
                .collect();

            for (key, src_shader_cache) in src_shader_caches {
                let dst_shader_cache = self.shader_cache(key);

                for (context, library) in src_shader_cache.snapshot() {
                    if dst_shader_cache.add(context, library) {
                        added += 1;
                    }
                }
            }
        }

        if added > 0 {
            self.mark_dirty();
        }

        debug!("merged {} shader libraries into pipeline cache", added);

        Ok(())
    }

    fn validate_merge(&self, src_caches: &[&PipelineCache]) -> Result<(), Box<ValidationError>> {
        for (index, &src_cache) in src_caches.iter().enumerate() {
            if src_cache == self {
                return Err(Box::new(ValidationError {
                    context: format!("src_caches[{}]", index).into(),
                    problem: "equals `self`".into(),
                    vuids: &["VUID-vkMergePipelineCaches-dstCache-00770"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

impl DeviceOwned for PipelineCache {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl_id_counter!(PipelineCache);

/// Parameters to create a new `PipelineCache`.
#[derive(Clone, Debug, Default)]
pub struct PipelineCacheCreateInfo {
    /// The initial data to provide to the cache.
    ///
    /// If this is not empty, then the data must have been previously retrieved by calling
    /// [`PipelineCache::get_data`].
    ///
    /// The default value is empty.
    pub initial_data: Vec<u8>,

    pub _ne: crate::NonExhaustive,
}

/// The outcome of [`PipelineCache::write_data`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheData {
    /// All of the data was written, or would fit in this many bytes.
    Complete(usize),

    /// The buffer was too small; this many bytes were written.
    Incomplete(usize),
}

/// The libraries converted from one shader module, keyed by conversion context.
#[derive(Debug, Default)]
pub struct ShaderLibraryCache {
    entries: Mutex<Vec<(ShaderConversionContext, Arc<ShaderLibrary>)>>,
}

impl ShaderLibraryCache {
    /// Returns an empty cache.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of libraries in the cache.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the library converted with a context that matches `context`, along with that
    /// context.
    pub fn find(
        &self,
        context: &ShaderConversionContext,
    ) -> Option<(ShaderConversionContext, Arc<ShaderLibrary>)> {
        self.entries
            .lock()
            .iter()
            .find(|(stored, _)| stored.matches(context))
            .cloned()
    }

    /// Adds a library, unless one that can serve the same requests is already present.
    ///
    /// Returns whether the library was added.
    pub fn add(&self, context: ShaderConversionContext, library: Arc<ShaderLibrary>) -> bool {
        let mut entries = self.entries.lock();

        if entries.iter().any(|(stored, _)| stored.matches(&context)) {
            return false;
        }

        entries.push((context, library));

        true
    }

    /// Returns the library for `context`, converting `module` on a miss. The boolean is `true`
    /// when a conversion happened.
    ///
    /// The lock is not held during the conversion. If two threads convert the same request at
    /// once, the library that is added first is kept and returned to both.
    pub(crate) fn get_or_convert(
        &self,
        device: &Device,
        module: &ShaderModule,
        context: &mut ShaderConversionContext,
    ) -> Result<(Arc<ShaderLibrary>, bool), ShaderConversionError> {
        let start = Instant::now();

        if let Some((stored, library)) = self.find(context) {
            context.align_with(&stored);
            device.record_activity(&device.performance().shader_library_from_cache, start);
            debug!(
                "found shader library for entry point `{}` in cache",
                context.options.entry_point_name,
            );

            return Ok((library, false));
        }

        let converted = device.shader_converter().convert(module.code(), context);
        device.record_activity(&device.performance().shader_conversion, start);

        let library = converted.map_err(|message| {
            error!(
                "unable to convert {:?} entry point `{}` to MSL: {}",
                context.options.entry_point_stage, context.options.entry_point_name, message,
            );

            ShaderConversionError {
                entry_point_name: context.options.entry_point_name.clone(),
                message,
            }
        })?;

        let library = Arc::new(library);

        if !self.add(context.clone(), library.clone()) {
            if let Some((stored, existing)) = self.find(context) {
                context.align_with(&stored);

                return Ok((existing, true));
            }
        }

        Ok((library, true))
    }

    /// Returns a copy of the entries.
    pub(crate) fn snapshot(&self) -> Vec<(ShaderConversionContext, Arc<ShaderLibrary>)> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        shader::{EntryPointInfo, ShaderModuleCreateInfo, ShaderStage},
        tests::{capture_logs, spirv, test_device},
    };
    use log::Level;
    use std::thread;

    fn module(device: &Arc<Device>, seed: u32) -> Arc<ShaderModule> {
        let code = spirv(seed);
        ShaderModule::new(
            device.clone(),
            ShaderModuleCreateInfo {
                entry_points: vec![EntryPointInfo::new("main", ShaderStage::Vertex)],
                ..ShaderModuleCreateInfo::new(&code)
            },
        )
        .unwrap()
    }

    fn context(aux_buffer_index: u32) -> ShaderConversionContext {
        let mut context = ShaderConversionContext::default();
        context.options.aux_buffer_index = aux_buffer_index;
        context
    }

    #[test]
    fn merge_self_forbidden() {
        let (device, _, _) = test_device();
        let cache = PipelineCache::new(device, Default::default());
        assert!(cache.merge([cache.as_ref()]).is_err());
    }

    #[test]
    fn converts_once() {
        let (device, _, converter) = test_device();
        let cache = PipelineCache::new(device.clone(), Default::default());
        let module = module(&device, 1);

        let a = cache.shader_library(&module, &mut context(3)).unwrap();
        let b = cache.shader_library(&module, &mut context(3)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(converter.conversion_count(), 1);

        let c = cache.shader_library(&module, &mut context(4)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(converter.conversion_count(), 2);

        assert_eq!(device.performance().shader_conversion.statistics().count, 2);
        assert_eq!(
            device
                .performance()
                .shader_library_from_cache
                .statistics()
                .count,
            1,
        );
    }

    #[test]
    fn concurrent_requests() {
        let (device, _, _) = test_device();
        let cache = PipelineCache::new(device.clone(), Default::default());
        let modules: Vec<_> = (0..4).map(|seed| module(&device, seed)).collect();

        let libraries: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let cache = &cache;
                    let module = &modules[i % 4];
                    scope.spawn(move || cache.shader_library(module, &mut context(1)).unwrap())
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for i in 0..4 {
            assert!(Arc::ptr_eq(&libraries[i], &libraries[i + 4]));
        }
    }

    #[test]
    fn size_query_then_write() {
        let (device, _, _) = test_device();
        let cache = PipelineCache::new(device.clone(), Default::default());
        let module = module(&device, 1);
        cache.shader_library(&module, &mut context(1)).unwrap();
        cache.shader_library(&module, &mut context(2)).unwrap();

        let CacheData::Complete(size) = cache.write_data(None) else {
            panic!()
        };
        let mut buffer = vec![0xff; size];
        assert_eq!(cache.write_data(Some(&mut buffer)), CacheData::Complete(size));
        assert_eq!(cache.write_data(None), CacheData::Complete(size));
        assert_eq!(buffer, cache.get_data());
        assert_eq!(buffer[size - 4..], [0; 4]);
    }

    #[test]
    fn insert_during_size_query() {
        let (device, _, _) = test_device();
        let cache = PipelineCache::new(device.clone(), Default::default());
        let module = module(&device, 1);
        cache.shader_library(&module, &mut context(1)).unwrap();

        // A conversion lands between the snapshot and the memoization of its size.
        let (generation, _, entries) = cache.serialized_entries();
        let stale_size =
            data::HEADER_SIZE + entries.iter().map(Vec::len).sum::<usize>() + data::END_SIZE;
        cache.shader_library(&module, &mut context(2)).unwrap();
        cache.memoize_data_size(generation, stale_size);

        let size = cache.get_data().len();
        assert!(size > stale_size);
        assert_eq!(cache.write_data(None), CacheData::Complete(size));

        let mut buffer = vec![0; size];
        assert_eq!(cache.write_data(Some(&mut buffer)), CacheData::Complete(size));
    }

    #[test]
    fn concurrent_inserts_and_size_queries() {
        let (device, _, _) = test_device();
        let cache = PipelineCache::new(device.clone(), Default::default());
        let module = module(&device, 1);

        thread::scope(|scope| {
            scope.spawn(|| {
                for aux_buffer_index in 0..32 {
                    cache
                        .shader_library(&module, &mut context(aux_buffer_index))
                        .unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..64 {
                    cache.write_data(None);
                }
            });
        });

        let size = cache.get_data().len();
        assert_eq!(cache.write_data(None), CacheData::Complete(size));
    }

    #[test]
    fn truncated_write() {
        let (device, _, _) = test_device();
        let cache = PipelineCache::new(device.clone(), Default::default());
        let module = module(&device, 1);
        cache.shader_library(&module, &mut context(1)).unwrap();

        let full = cache.get_data();

        let mut small = vec![0xaa; full.len() - 1];
        assert_eq!(cache.write_data(Some(&mut small)), CacheData::Incomplete(36));
        assert_eq!(small[..32], full[..32]);
        assert_eq!(small[32..36], [0; 4]);
        assert!(small[36..].iter().all(|&b| b == 0xaa));

        let (reloaded, logs) = capture_logs(|| {
            PipelineCache::new(
                device.clone(),
                PipelineCacheCreateInfo {
                    initial_data: small[..36].to_vec(),
                    ..Default::default()
                },
            )
        });
        assert!(logs.iter().all(|record| record.level != Level::Warn));
        assert_eq!(reloaded.get_data().len(), 36);

        let mut tiny = vec![0xaa; 34];
        assert_eq!(cache.write_data(Some(&mut tiny)), CacheData::Incomplete(0));
        assert_eq!(tiny, [0xaa; 34]);
    }

    #[test]
    fn reload_and_merge() {
        let (device, _, converter) = test_device();
        let module_a = module(&device, 1);
        let module_b = module(&device, 2);

        let a = PipelineCache::new(device.clone(), Default::default());
        a.shader_library(&module_a, &mut context(1)).unwrap();
        let b = PipelineCache::new(device.clone(), Default::default());
        b.shader_library(&module_b, &mut context(1)).unwrap();
        assert_eq!(converter.conversion_count(), 2);

        let reloaded = PipelineCache::new(
            device.clone(),
            PipelineCacheCreateInfo {
                initial_data: a.get_data(),
                ..Default::default()
            },
        );
        assert_eq!(reloaded.get_data(), a.get_data());

        let merged = PipelineCache::new(device.clone(), Default::default());
        merged.merge([reloaded.as_ref(), b.as_ref()]).unwrap();
        merged.shader_library(&module_a, &mut context(1)).unwrap();
        merged.shader_library(&module_b, &mut context(1)).unwrap();
        assert_eq!(converter.conversion_count(), 2);

        let size = merged.get_data().len();
        merged.merge([b.as_ref()]).unwrap();
        assert_eq!(merged.write_data(None), CacheData::Complete(size));
    }

    #[test]
    fn bad_data_starts_empty() {
        let (device, _, _) = test_device();
        let (cache, logs) = capture_logs(|| {
            PipelineCache::new(
                device.clone(),
                PipelineCacheCreateInfo {
                    initial_data: vec![1, 2, 3],
                    ..Default::default()
                },
            )
        });

        assert_eq!(cache.get_data().len(), 36);
        assert!(logs.iter().any(|record| record.level == Level::Warn));
    }
}
