//! "Percent since last call" state.
//!
//! [`RateCache`] keeps the most recent sample of each [`MetricFamily`].
//! It is an ordinary value owned by whoever drives the sampler: there is no
//! global state and no locking. Mutation needs `&mut`, so one writer per
//! cache is enforced by the borrow checker; callers sharing a monitor
//! across threads wrap it in their own `Mutex`.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::collector::{FileSystem, SystemSampler};
use crate::error::Result;
use crate::rates;
use crate::sample::{CpuTimes, CpuTimesPercent};

/// Metric families with a cached baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    /// Aggregate busy percent.
    Cpu,
    /// Per-core busy percent.
    PerCpu,
    /// Aggregate per-field percent.
    CpuFields,
    /// Per-core per-field percent.
    PerCpuFields,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::Cpu,
        MetricFamily::PerCpu,
        MetricFamily::CpuFields,
        MetricFamily::PerCpuFields,
    ];

    pub fn is_per_cpu(self) -> bool {
        matches!(self, MetricFamily::PerCpu | MetricFamily::PerCpuFields)
    }
}

/// A cached baseline.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedSample {
    Total(CpuTimes),
    PerCpu(Vec<CpuTimes>),
}

/// Last sample per metric family.
#[derive(Debug, Clone, Default)]
pub struct RateCache {
    entries: HashMap<MetricFamily, CachedSample>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, family: MetricFamily) -> Option<&CachedSample> {
        self.entries.get(&family)
    }

    /// Stores `sample` as the new baseline and returns the previous one.
    pub fn replace(&mut self, family: MetricFamily, sample: CachedSample) -> Option<CachedSample> {
        self.entries.insert(family, sample)
    }

    fn swap_total(&mut self, family: MetricFamily, end: CpuTimes) -> Option<CpuTimes> {
        match self.replace(family, CachedSample::Total(end)) {
            Some(CachedSample::Total(prev)) => Some(prev),
            _ => None,
        }
    }

    fn swap_per_cpu(&mut self, family: MetricFamily, end: Vec<CpuTimes>) -> Option<Vec<CpuTimes>> {
        match self.replace(family, CachedSample::PerCpu(end)) {
            Some(CachedSample::PerCpu(prev)) => Some(prev),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// System CPU utilization with interval or since-last-call semantics.
///
/// A positive interval samples, sleeps for the interval and samples again.
/// `Duration::ZERO` measures against the previous call of the same family
/// (or against construction time on the first call). Either way the end
/// sample becomes the family's new baseline.
pub struct CpuMonitor<F: FileSystem> {
    sampler: SystemSampler<F>,
    cache: RateCache,
}

impl<F: FileSystem> CpuMonitor<F> {
    /// Creates a monitor and primes every family with a sample taken now.
    pub fn new(sampler: SystemSampler<F>) -> Result<Self> {
        let total = sampler.cpu_times()?;
        let per_cpu = sampler.per_cpu_times()?;

        let mut cache = RateCache::new();
        for family in MetricFamily::ALL {
            let sample = if family.is_per_cpu() {
                CachedSample::PerCpu(per_cpu.clone())
            } else {
                CachedSample::Total(total)
            };
            cache.replace(family, sample);
        }

        Ok(Self { sampler, cache })
    }

    pub fn sampler(&self) -> &SystemSampler<F> {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut SystemSampler<F> {
        &mut self.sampler
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    fn total_pair(&mut self, family: MetricFamily, interval: Duration) -> Result<(CpuTimes, CpuTimes)> {
        let fresh_start = if interval.is_zero() {
            None
        } else {
            let start = self.sampler.cpu_times()?;
            trace!(?family, ?interval, "sleeping between cpu samples");
            thread::sleep(interval);
            Some(start)
        };

        let end = self.sampler.cpu_times()?;
        let cached = self.cache.swap_total(family, end);
        Ok((fresh_start.or(cached).unwrap_or(end), end))
    }

    fn per_cpu_pair(
        &mut self,
        family: MetricFamily,
        interval: Duration,
    ) -> Result<(Vec<CpuTimes>, Vec<CpuTimes>)> {
        let fresh_start = if interval.is_zero() {
            None
        } else {
            let start = self.sampler.per_cpu_times()?;
            trace!(?family, ?interval, "sleeping between per-cpu samples");
            thread::sleep(interval);
            Some(start)
        };

        let end = self.sampler.per_cpu_times()?;
        let cached = self.cache.swap_per_cpu(family, end.clone());
        let start = fresh_start.or(cached).unwrap_or_else(|| end.clone());
        Ok((start, end))
    }

    /// System-wide busy percent.
    pub fn cpu_percent(&mut self, interval: Duration) -> Result<f64> {
        let (start, end) = self.total_pair(MetricFamily::Cpu, interval)?;
        Ok(rates::cpu_percent(&start, &end))
    }

    /// Busy percent of each core.
    ///
    /// Fails with `InvalidArgument` when the core count changed since the
    /// baseline; the baseline is still replaced, so the next call succeeds.
    pub fn per_cpu_percent(&mut self, interval: Duration) -> Result<Vec<f64>> {
        let (start, end) = self.per_cpu_pair(MetricFamily::PerCpu, interval)?;
        rates::per_cpu_percent(&start, &end)
    }

    pub fn cpu_times_percent(&mut self, interval: Duration) -> Result<CpuTimesPercent> {
        let (start, end) = self.total_pair(MetricFamily::CpuFields, interval)?;
        Ok(rates::cpu_times_percent(&start, &end))
    }

    pub fn per_cpu_times_percent(&mut self, interval: Duration) -> Result<Vec<CpuTimesPercent>> {
        let (start, end) = self.per_cpu_pair(MetricFamily::PerCpuFields, interval)?;
        rates::per_cpu_times_percent(&start, &end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::error::Error;
    use crate::os::testing::FakeOs;
    use std::sync::Arc;

    const START_STAT: &str = "\
cpu  10000 0 5000 85000 0 0 0 0 0 0
cpu0 5000 0 2500 42500 0 0 0 0 0 0
cpu1 5000 0 2500 42500 0 0 0 0 0 0
btime 1700000000
";

    const END_STAT: &str = "\
cpu  11000 0 5500 85500 0 0 0 0 0 0
cpu0 5500 0 2750 42750 0 0 0 0 0 0
cpu1 5500 0 2750 42750 0 0 0 0 0 0
btime 1700000000
";

    fn monitor(stat: &str) -> CpuMonitor<MockFs> {
        let mut fs = MockFs::new();
        fs.add_file("/proc/stat", stat);
        let sampler = SystemSampler::new(fs, "/proc", Arc::new(FakeOs::new()));
        CpuMonitor::new(sampler).unwrap()
    }

    fn set_stat(m: &mut CpuMonitor<MockFs>, stat: &str) {
        m.sampler_mut().fs_mut().add_file("/proc/stat", stat);
    }

    #[test]
    fn test_primed_at_construction() {
        let m = monitor(START_STAT);
        assert_eq!(m.cache().len(), 4);
        assert!(matches!(
            m.cache().get(MetricFamily::PerCpu),
            Some(CachedSample::PerCpu(v)) if v.len() == 2
        ));
    }

    #[test]
    fn test_zero_interval_measures_since_construction() {
        let mut m = monitor(START_STAT);
        set_stat(&mut m, END_STAT);
        assert_eq!(m.cpu_percent(Duration::ZERO).unwrap(), 75.0);
    }

    #[test]
    fn test_zero_interval_overwrites_baseline() {
        let mut m = monitor(START_STAT);
        set_stat(&mut m, END_STAT);
        assert_eq!(m.cpu_percent(Duration::ZERO).unwrap(), 75.0);
        // Nothing changed since the previous call.
        assert_eq!(m.cpu_percent(Duration::ZERO).unwrap(), 0.0);
        assert_eq!(
            m.cache().get(MetricFamily::Cpu),
            Some(&CachedSample::Total(m.sampler().cpu_times().unwrap()))
        );
    }

    #[test]
    fn test_families_keep_separate_baselines() {
        let mut m = monitor(START_STAT);
        set_stat(&mut m, END_STAT);
        assert_eq!(m.cpu_percent(Duration::ZERO).unwrap(), 75.0);

        // The per-field family was not consumed by the call above.
        let fields = m.cpu_times_percent(Duration::ZERO).unwrap();
        assert_eq!(fields.user, 50.0);
        assert_eq!(fields.system, 25.0);
        assert_eq!(fields.idle, 25.0);

        assert_eq!(m.per_cpu_percent(Duration::ZERO).unwrap(), vec![75.0, 75.0]);
        let per_core = m.per_cpu_times_percent(Duration::ZERO).unwrap();
        assert_eq!(per_core[1].user, 50.0);
    }

    #[test]
    fn test_positive_interval_uses_fresh_start() {
        let mut m = monitor(START_STAT);
        set_stat(&mut m, END_STAT);
        // Both samples of the interval see END_STAT.
        assert_eq!(m.cpu_percent(Duration::from_millis(5)).unwrap(), 0.0);
        assert_eq!(
            m.cache().get(MetricFamily::Cpu),
            Some(&CachedSample::Total(m.sampler().cpu_times().unwrap()))
        );
    }

    #[test]
    fn test_core_hotplug_is_invalid_then_recovers() {
        let mut m = monitor(START_STAT);
        set_stat(
            &mut m,
            "cpu  11000 0 5500 85500 0 0 0 0 0 0\ncpu0 11000 0 5500 85500 0 0 0 0 0 0\n",
        );
        assert!(matches!(
            m.per_cpu_percent(Duration::ZERO),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(m.per_cpu_percent(Duration::ZERO).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_construction_fails_without_stat() {
        let sampler = SystemSampler::new(MockFs::new(), "/proc", Arc::new(FakeOs::new()));
        assert!(matches!(CpuMonitor::new(sampler), Err(e) if e.is_os_query()));
    }

    #[test]
    fn test_rate_cache_replace_returns_previous() {
        let mut cache = RateCache::new();
        assert!(cache.is_empty());
        let a = CpuTimes {
            user: 1.0,
            ..Default::default()
        };
        assert_eq!(cache.swap_total(MetricFamily::Cpu, a), None);
        assert_eq!(cache.swap_total(MetricFamily::Cpu, CpuTimes::default()), Some(a));
        // A per-core baseline is never handed out as an aggregate one.
        cache.replace(MetricFamily::CpuFields, CachedSample::PerCpu(vec![a]));
        assert_eq!(cache.swap_total(MetricFamily::CpuFields, a), None);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
