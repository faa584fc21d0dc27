//! System sampler: one `/proc` (or native) read per call, normalized units.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use crate::collector::procfs::net::{Ownership, read_connections, socket_owners};
use crate::collector::procfs::parser::{
    CpuStat, GlobalStat, ParseError, parse_cpuinfo, parse_diskstats, parse_filesystems,
    parse_global_stat, parse_meminfo, parse_mounts, parse_net_dev, parse_partitions, parse_swaps,
    parse_vmstat,
};
use crate::collector::traits::FileSystem;
use crate::error::{Error, Result};
use crate::os::OsQuery;
use crate::rates::usage_percent;
use crate::sample::{
    Connection, ConnectionKind, CpuTimes, DiskIoCounters, DiskPartition, DiskUsage,
    NetIoCounters, SwapMemory, SystemInfo, User, VirtualMemory, sum_counters,
};

/// Bytes per sector in `/proc/diskstats`, independent of the device's real sector size.
const SECTOR_SIZE: u64 = 512;

/// Samples system-wide metrics.
///
/// Pseudo-files go through `F`; calls with no `/proc` counterpart
/// (disk usage, users, uname) go through the [`OsQuery`].
pub struct SystemSampler<F: FileSystem> {
    fs: F,
    proc_path: String,
    os: Arc<dyn OsQuery>,
    clock_ticks: f64,
}

impl<F: FileSystem> SystemSampler<F> {
    /// Creates a new sampler.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `os` - Native query capability; also supplies the tick frequency
    pub fn new(fs: F, proc_path: impl Into<String>, os: Arc<dyn OsQuery>) -> Self {
        let clock_ticks = os.clock_ticks().max(1) as f64;
        Self {
            fs,
            proc_path: proc_path.into(),
            os,
            clock_ticks,
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn proc_path(&self) -> &str {
        &self.proc_path
    }

    pub fn os(&self) -> &Arc<dyn OsQuery> {
        &self.os
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = format!("{}/{}", self.proc_path, name);
        self.fs
            .read_to_string(Path::new(&path))
            .map_err(|e| Error::os(format!("read {}", path), e))
    }

    fn parse_error(&self, name: &str, err: ParseError) -> Error {
        Error::parse(format!("{}/{}", self.proc_path, name), err)
    }

    fn global_stat(&self) -> Result<GlobalStat> {
        let content = self.read("stat")?;
        parse_global_stat(&content).map_err(|e| self.parse_error("stat", e))
    }

    fn to_cpu_times(&self, cpu: &CpuStat) -> CpuTimes {
        let secs = |ticks: u64| ticks as f64 / self.clock_ticks;
        CpuTimes {
            user: secs(cpu.user),
            nice: secs(cpu.nice),
            system: secs(cpu.system),
            idle: secs(cpu.idle),
            iowait: secs(cpu.iowait),
            irq: secs(cpu.irq),
            softirq: secs(cpu.softirq),
            steal: cpu.steal.map(secs),
            guest: cpu.guest.map(secs),
            guest_nice: cpu.guest_nice.map(secs),
        }
    }

    /// System-wide CPU times from the aggregate `cpu` line of `/proc/stat`.
    pub fn cpu_times(&self) -> Result<CpuTimes> {
        let stat = self.global_stat()?;
        let total = stat
            .total()
            .ok_or_else(|| self.parse_error("stat", ParseError::new("missing cpu line")))?;
        Ok(self.to_cpu_times(total))
    }

    /// CPU times of every core, in `cpuN` order.
    pub fn per_cpu_times(&self) -> Result<Vec<CpuTimes>> {
        let stat = self.global_stat()?;
        let mut cpus: Vec<&CpuStat> = stat.per_cpu().collect();
        cpus.sort_by_key(|c| c.cpu_id);
        Ok(cpus.into_iter().map(|c| self.to_cpu_times(c)).collect())
    }

    /// Number of logical or physical CPUs; `None` when undeterminable.
    pub fn cpu_count(&self, logical: bool) -> Result<Option<usize>> {
        let counts = parse_cpuinfo(&self.read("cpuinfo")?);
        if !logical {
            return Ok(counts.physical.or((counts.logical > 0).then_some(counts.logical)));
        }
        if counts.logical > 0 {
            return Ok(Some(counts.logical));
        }

        // Some architectures omit `processor` lines; count cpuN lines instead.
        let cores = self.global_stat()?.per_cpu().count();
        Ok((cores > 0).then_some(cores))
    }

    /// Boot time, seconds since the epoch.
    pub fn boot_time(&self) -> Result<u64> {
        Ok(self.global_stat()?.btime)
    }

    pub fn virtual_memory(&self) -> Result<VirtualMemory> {
        let content = self.read("meminfo")?;
        let info = parse_meminfo(&content).map_err(|e| self.parse_error("meminfo", e))?;

        let kb = |v: u64| v * 1024;
        let total = kb(info.mem_total);
        let free = kb(info.mem_free);
        let buffers = kb(info.buffers);
        let cached = kb(info.cached);
        let available = match info.mem_available {
            Some(v) => kb(v),
            None => (free + cached + buffers).min(total),
        };
        let used = total.saturating_sub(free + cached + buffers);

        Ok(VirtualMemory {
            total,
            available,
            percent: usage_percent(total.saturating_sub(available) as f64, total as f64, 1),
            used,
            free,
            active: kb(info.active),
            inactive: kb(info.inactive),
            buffers,
            cached,
        })
    }

    pub fn swap_memory(&self) -> Result<SwapMemory> {
        let devices = parse_swaps(&self.read("swaps")?);
        let total: u64 = devices.iter().map(|d| d.size * 1024).sum();
        let used: u64 = devices.iter().map(|d| d.used * 1024).sum();

        let content = self.read("vmstat")?;
        let vmstat = parse_vmstat(&content).map_err(|e| self.parse_error("vmstat", e))?;
        let page_size = self.os.page_size();

        Ok(SwapMemory {
            total,
            used,
            free: total.saturating_sub(used),
            percent: usage_percent(used as f64, total as f64, 1),
            sin: vmstat.pswpin * page_size,
            sout: vmstat.pswpout * page_size,
        })
    }

    /// Mounted filesystems backed by a device type listed in `/proc/filesystems`.
    pub fn disk_partitions(&self) -> Result<Vec<DiskPartition>> {
        let physical = parse_filesystems(&self.read("filesystems")?);
        Ok(parse_mounts(&self.read("self/mounts")?)
            .into_iter()
            .filter(|m| physical.contains(&m.fstype))
            .map(|m| DiskPartition {
                device: m.device,
                mountpoint: m.mountpoint,
                fstype: m.fstype,
                opts: m.opts,
            })
            .collect())
    }

    pub fn disk_usage(&self, path: impl AsRef<Path>) -> Result<DiskUsage> {
        let path = path.as_ref();
        self.os
            .disk_usage(path)
            .map_err(|e| Error::os(format!("statvfs {}", path.display()), e))
    }

    /// Per-device disk counters for partitions and partition-less disks.
    pub fn disk_io_counters(&self) -> Result<HashMap<String, DiskIoCounters>> {
        let devices = select_io_devices(&parse_partitions(&self.read("partitions")?));
        let content = self.read("diskstats")?;
        let stats = parse_diskstats(&content).map_err(|e| self.parse_error("diskstats", e))?;

        Ok(stats
            .into_iter()
            .filter(|d| devices.iter().any(|name| name == &d.device))
            .map(|d| {
                let counters = DiskIoCounters {
                    read_count: d.reads,
                    write_count: d.writes,
                    read_bytes: d.read_sectors * SECTOR_SIZE,
                    write_bytes: d.write_sectors * SECTOR_SIZE,
                    read_time: d.read_time,
                    write_time: d.write_time,
                };
                (d.device, counters)
            })
            .collect())
    }

    pub fn disk_io_counters_total(&self) -> Result<DiskIoCounters> {
        Ok(sum_counters(self.disk_io_counters()?.values()))
    }

    /// Per-interface network counters.
    pub fn net_io_counters(&self) -> Result<HashMap<String, NetIoCounters>> {
        let content = self.read("net/dev")?;
        let devices = parse_net_dev(&content).map_err(|e| self.parse_error("net/dev", e))?;

        Ok(devices
            .into_iter()
            .map(|d| {
                let counters = NetIoCounters {
                    bytes_sent: d.tx_bytes,
                    bytes_recv: d.rx_bytes,
                    packets_sent: d.tx_packets,
                    packets_recv: d.rx_packets,
                    errin: d.rx_errs,
                    errout: d.tx_errs,
                    dropin: d.rx_drop,
                    dropout: d.tx_drop,
                };
                (d.interface, counters)
            })
            .collect())
    }

    pub fn net_io_counters_total(&self) -> Result<NetIoCounters> {
        Ok(sum_counters(self.net_io_counters()?.values()))
    }

    /// Every socket of the selected kind, attributed to a pid where the
    /// owning fd table is readable.
    pub fn net_connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        let owners = socket_owners(&self.fs, &self.proc_path)
            .map_err(|e| Error::os(format!("scan {}", self.proc_path), e))?;
        trace!(sockets = owners.len(), "socket owners resolved");
        read_connections(&self.fs, &self.proc_path, kind, &Ownership::All(&owners))
    }

    pub fn users(&self) -> Result<Vec<User>> {
        self.os.users().map_err(|e| Error::os("enumerate users", e))
    }

    pub fn system_info(&self) -> Result<SystemInfo> {
        self.os.system_info().map_err(|e| Error::os("uname", e))
    }
}

/// Picks the devices whose I/O counters are reported.
///
/// A name is a partition of a disk listed before it when the rest of the
/// name is a partition number: digits after a letter-ending disk (`sda` →
/// `sda1`), `p` and digits after a digit-ending one (`nvme0n1` →
/// `nvme0n1p1`). `loop10` is therefore a disk of its own, not a partition
/// of `loop1`. Every partition is kept, together with every disk that has
/// none.
pub fn select_io_devices(names: &[String]) -> Vec<String> {
    let mut disks: Vec<(&str, bool)> = Vec::new();
    let mut partitions: Vec<&str> = Vec::new();

    for name in names {
        let parent = disks
            .iter_mut()
            .find(|(disk, _)| is_partition_of(name, *disk));
        match parent {
            Some((_, has_partitions)) => {
                *has_partitions = true;
                partitions.push(name.as_str());
            }
            None => disks.push((name.as_str(), false)),
        }
    }

    names
        .iter()
        .filter(|name| {
            partitions.contains(&name.as_str())
                || disks
                    .iter()
                    .any(|(disk, has)| *disk == name.as_str() && !*has)
        })
        .cloned()
        .collect()
}

fn is_partition_of(name: &str, disk: &str) -> bool {
    let Some(suffix) = name.strip_prefix(disk) else {
        return false;
    };
    let number = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        match suffix.strip_prefix('p') {
            Some(number) => number,
            None => return false,
        }
    } else {
        suffix
    };
    !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
}
