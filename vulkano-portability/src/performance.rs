// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Timing of the expensive activities performed while building pipelines.

use parking_lot::Mutex;
use std::time::Duration;

/// Accumulates the durations of one kind of activity.
#[derive(Debug)]
pub struct PerformanceTracker {
    name: &'static str,
    statistics: Mutex<ActivityStatistics>,
}

impl PerformanceTracker {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            statistics: Mutex::new(ActivityStatistics::default()),
        }
    }

    /// Returns the name of the tracked activity.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Adds one occurrence of the activity, and returns the updated statistics.
    pub fn record(&self, duration: Duration) -> ActivityStatistics {
        let mut statistics = self.statistics.lock();
        let previous_count = statistics.count;
        statistics.count += 1;
        statistics.latest = duration;

        if previous_count == 0 {
            statistics.average = duration;
            statistics.minimum = duration;
            statistics.maximum = duration;
        } else {
            statistics.average =
                (statistics.average * previous_count + duration) / statistics.count;
            statistics.minimum = statistics.minimum.min(duration);
            statistics.maximum = statistics.maximum.max(duration);
        }

        *statistics
    }

    /// Returns a snapshot of the statistics gathered so far.
    #[inline]
    pub fn statistics(&self) -> ActivityStatistics {
        *self.statistics.lock()
    }
}

/// A snapshot of the statistics of a [`PerformanceTracker`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivityStatistics {
    pub count: u32,
    pub latest: Duration,
    pub average: Duration,
    pub minimum: Duration,
    pub maximum: Duration,
}

/// The performance trackers owned by a device.
#[derive(Debug)]
pub struct PerformanceStatistics {
    /// Runs of the external SPIR-V to MSL converter.
    pub shader_conversion: PerformanceTracker,

    /// Shader libraries that were found in a cache instead of being converted.
    pub shader_library_from_cache: PerformanceTracker,

    /// Native pipeline state compiles, including those that failed or timed out.
    pub pipeline_compile: PerformanceTracker,
}

impl Default for PerformanceStatistics {
    fn default() -> Self {
        Self {
            shader_conversion: PerformanceTracker::new("SPIR-V to MSL conversion"),
            shader_library_from_cache: PerformanceTracker::new("shader library from cache"),
            pipeline_compile: PerformanceTracker::new("pipeline compile"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PerformanceTracker;
    use std::time::Duration;

    #[test]
    fn tracks_min_max_average() {
        let tracker = PerformanceTracker::new("test");
        tracker.record(Duration::from_millis(4));
        tracker.record(Duration::from_millis(2));
        let stats = tracker.record(Duration::from_millis(6));

        assert_eq!(stats.count, 3);
        assert_eq!(stats.latest, Duration::from_millis(6));
        assert_eq!(stats.minimum, Duration::from_millis(2));
        assert_eq!(stats.maximum, Duration::from_millis(6));
        assert_eq!(stats.average, Duration::from_millis(4));
        assert_eq!(tracker.statistics(), stats);
    }
}
