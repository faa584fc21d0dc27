//! Delta calculations between two samples of the same metric family.
//!
//! These are pure functions: they never sample and never touch the rate
//! cache. The only local recovery they perform is numeric clamping of tiny
//! negative deltas caused by floating-point accumulation.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::process::types::ProcessCpuTimes;
use crate::sample::{CpuTimes, CpuTimesPercent, DiskIoCounters, NetIoCounters};

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

/// Rounds to `places` decimals.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// `used / total * 100`, rounded; 0 when `total` is 0.
pub fn usage_percent(used: f64, total: f64, places: u32) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    round_to(used / total * 100.0, places)
}

/// Compute u64 delta, returning `None` on counter regression (wrap or reset).
pub fn du64(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Per-second rate of a cumulative counter; `None` on regression or zero elapsed time.
pub fn counter_rate(curr: u64, prev: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    du64(curr, prev).map(|d| d as f64 / secs)
}

// ---------------------------------------------------------------------------
// CPU utilization
// ---------------------------------------------------------------------------

/// Busy percentage between two CPU samples, in `[0, 100]`, rounded to 2 places.
///
/// A busy regression (floating-point noise) yields 0. When time elapsed but
/// no busy time was accounted, the interval was too short to observe a
/// transition and the ratio of the two cumulative samples is reported
/// instead, so sustained load is not shown as 0. No elapsed time at all
/// (identical samples) yields 0.
pub fn cpu_percent(start: &CpuTimes, end: &CpuTimes) -> f64 {
    let start_busy = start.busy();
    let end_busy = end.busy();

    if end_busy < start_busy {
        return 0.0;
    }

    let busy_delta = end_busy - start_busy;
    let total_delta = end.total() - start.total();
    if total_delta <= 0.0 {
        return 0.0;
    }

    let percent = if busy_delta == 0.0 {
        let total_sum = end.total() + start.total();
        if total_sum <= 0.0 {
            return 0.0;
        }
        (end_busy + start_busy) / total_sum * 100.0
    } else {
        busy_delta / total_delta * 100.0
    };

    round2(percent.clamp(0.0, 100.0))
}

/// Per-field share of the elapsed interval, each rounded to 2 places.
///
/// Negative field deltas are clamped to 0. A zero-length interval reports
/// every field as 0.
pub fn cpu_times_percent(start: &CpuTimes, end: &CpuTimes) -> CpuTimesPercent {
    let total_delta = end.total() - start.total();
    if total_delta <= 0.0 {
        return CpuTimesPercent::default();
    }

    let starts = start.values();
    let ends = end.values();
    let mut out = [0.0; 10];
    for (i, slot) in out.iter_mut().enumerate() {
        let field_delta = (ends[i] - starts[i]).max(0.0);
        *slot = round2(field_delta / total_delta * 100.0);
    }
    CpuTimesPercent::from_values(out)
}

fn check_core_alignment(start: &[CpuTimes], end: &[CpuTimes]) -> Result<()> {
    if start.len() != end.len() {
        return Err(Error::invalid(format!(
            "per-cpu samples are not aligned: {} cores vs {} cores",
            start.len(),
            end.len()
        )));
    }
    Ok(())
}

/// [`cpu_percent`] applied core by core.
pub fn per_cpu_percent(start: &[CpuTimes], end: &[CpuTimes]) -> Result<Vec<f64>> {
    check_core_alignment(start, end)?;
    Ok(start
        .iter()
        .zip(end)
        .map(|(s, e)| cpu_percent(s, e))
        .collect())
}

/// [`cpu_times_percent`] applied core by core.
pub fn per_cpu_times_percent(start: &[CpuTimes], end: &[CpuTimes]) -> Result<Vec<CpuTimesPercent>> {
    check_core_alignment(start, end)?;
    Ok(start
        .iter()
        .zip(end)
        .map(|(s, e)| cpu_times_percent(s, e))
        .collect())
}

/// CPU consumed by one process over `elapsed` wall time, in percent of one core.
///
/// Multi-threaded processes can exceed 100.
pub fn process_cpu_percent(
    start: &ProcessCpuTimes,
    end: &ProcessCpuTimes,
    elapsed: Duration,
) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let delta = (end.user + end.system) - (start.user + start.system);
    round2((delta / secs * 100.0).max(0.0))
}

// ---------------------------------------------------------------------------
// I/O rates
// ---------------------------------------------------------------------------

/// Per-second network rates between two counter samples.
///
/// Each field is `None` when its counter went backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NetIoRate {
    pub bytes_sent: Option<f64>,
    pub bytes_recv: Option<f64>,
    pub packets_sent: Option<f64>,
    pub packets_recv: Option<f64>,
}

impl NetIoRate {
    pub fn between(start: &NetIoCounters, end: &NetIoCounters, elapsed: Duration) -> Self {
        Self {
            bytes_sent: counter_rate(end.bytes_sent, start.bytes_sent, elapsed),
            bytes_recv: counter_rate(end.bytes_recv, start.bytes_recv, elapsed),
            packets_sent: counter_rate(end.packets_sent, start.packets_sent, elapsed),
            packets_recv: counter_rate(end.packets_recv, start.packets_recv, elapsed),
        }
    }
}

/// Per-second disk rates between two counter samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiskIoRate {
    pub read_bytes: Option<f64>,
    pub write_bytes: Option<f64>,
    pub read_count: Option<f64>,
    pub write_count: Option<f64>,
}

impl DiskIoRate {
    pub fn between(start: &DiskIoCounters, end: &DiskIoCounters, elapsed: Duration) -> Self {
        Self {
            read_bytes: counter_rate(end.read_bytes, start.read_bytes, elapsed),
            write_bytes: counter_rate(end.write_bytes, start.write_bytes, elapsed),
            read_count: counter_rate(end.read_count, start.read_count, elapsed),
            write_count: counter_rate(end.write_count, start.write_count, elapsed),
        }
    }
}
