use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Stage names recorded by the pipeline.
pub const STAGE_COMPUTE: &str = "compute";
pub const STAGE_GEOMETRY: &str = "geometry";
pub const STAGE_RENDER: &str = "render";

/// Samples kept per stage for the recent average; older ones only feed the running totals.
pub const RECENT_WINDOW: usize = 120;

/// Running totals of one stage plus its most recent samples.
#[derive(Debug, Default)]
struct Series {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
    recent: VecDeque<Duration>,
}

impl Series {
    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
        self.min = Some(self.min.map_or(duration, |min| min.min(duration)));
        self.max = self.max.max(duration);
        if self.recent.len() == RECENT_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
    }

    fn stats(&self) -> Option<MeasurementStats> {
        let min = self.min?;
        let recent_total: Duration = self.recent.iter().sum();
        Some(MeasurementStats {
            count: self.count,
            total_time: self.total,
            average_time: average(self.total, self.count),
            recent_average_time: average(recent_total, self.recent.len() as u64),
            min_time: min,
            max_time: self.max,
        })
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((total.as_nanos() / u128::from(count)) as u64)
}

/// Per-stage frame timings
#[derive(Debug, Default)]
pub struct Profiler {
    timers: HashMap<String, Instant>,
    measurements: HashMap<String, Series>,
    counters: HashMap<String, u64>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&mut self, name: &str) {
        tracing::trace!(timer = name, "start_timer");
        self.timers.insert(name.to_string(), Instant::now());
    }

    pub fn end_timer(&mut self, name: &str) {
        if let Some(start) = self.timers.remove(name) {
            let duration = start.elapsed();
            tracing::debug!(timer = name, duration_us = duration.as_micros() as u64, "end_timer");
            self.add_measurement(name, duration);
        }
    }

    /// Runs `f` between `start_timer` and `end_timer`; failed runs are still timed.
    pub fn time<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        self.start_timer(name);
        let result = f();
        self.end_timer(name);
        result
    }

    pub fn increment_counter(&mut self, name: &str) {
        tracing::trace!(counter = name, "increment_counter");
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn add_measurement(&mut self, name: &str, duration: Duration) {
        self.measurements.entry(name.to_string()).or_default().record(duration);
    }

    /// Samples currently held for `name`; never more than [`RECENT_WINDOW`].
    pub fn retained_samples(&self, name: &str) -> usize {
        self.measurements.get(name).map_or(0, |series| series.recent.len())
    }

    pub fn get_stats(&self) -> ProfilerStats {
        let stats = self
            .measurements
            .iter()
            .filter_map(|(name, series)| Some((name.clone(), series.stats()?)))
            .collect();

        ProfilerStats {
            measurements: stats,
            counters: self.counters.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.timers.clear();
        self.measurements.clear();
        self.counters.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementStats {
    /// Samples recorded since the last reset.
    pub count: u64,
    pub total_time: Duration,
    pub average_time: Duration,
    /// Average over the last [`RECENT_WINDOW`] samples.
    pub recent_average_time: Duration,
    pub min_time: Duration,
    pub max_time: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ProfilerStats {
    pub measurements: HashMap<String, MeasurementStats>,
    pub counters: HashMap<String, u64>,
}

impl ProfilerStats {
    /// Logs one line per stage at debug level, in stage-name order.
    pub fn log(&self) {
        let mut names: Vec<_> = self.measurements.keys().collect();
        names.sort();
        for name in names {
            let stats = &self.measurements[name];
            tracing::debug!(
                stage = name.as_str(),
                count = stats.count,
                avg_us = stats.average_time.as_micros() as u64,
                recent_avg_us = stats.recent_average_time.as_micros() as u64,
                min_us = stats.min_time.as_micros() as u64,
                max_us = stats.max_time.as_micros() as u64,
                "stage timings"
            );
        }
    }
}
