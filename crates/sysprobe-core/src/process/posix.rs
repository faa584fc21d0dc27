//! Portable process capability for hosts without `/proc`.
//!
//! The process table and per-process attributes come from `sysinfo`;
//! priorities, limits and signals go through [`OsQuery`]. Anything neither
//! source exposes keeps the [`ProcessOps`] default of `NotImplemented`.

use std::sync::Arc;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::{Error, Result};
use crate::os::OsQuery;
use crate::process::platform::{PlatformKind, ProcessOps, ProcessProvider};
use crate::process::types::{Ids, IoCounters, MemoryInfo, ProcessStatus, RLimit, RLimitResource};

/// [`ProcessProvider`] backed by `sysinfo` and native calls.
pub struct PosixProvider {
    os: Arc<dyn OsQuery>,
}

impl PosixProvider {
    pub fn new(os: Arc<dyn OsQuery>) -> Self {
        Self { os }
    }
}

impl ProcessProvider for PosixProvider {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Posix
    }

    fn open(&self, pid: u32) -> Result<Box<dyn ProcessOps>> {
        Ok(Box::new(PosixProcess {
            pid,
            os: Arc::clone(&self.os),
        }))
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let mut pids: Vec<u32> = sys.processes().keys().map(|p| p.as_u32()).collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn pid_exists(&self, pid: u32) -> bool {
        self.os.pid_exists(pid)
    }

    fn cpu_count(&self) -> usize {
        self.os.cpu_count()
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        self.os.user_name(uid)
    }
}

/// One process seen through a fresh `sysinfo` refresh per query.
pub struct PosixProcess {
    pid: u32,
    os: Arc<dyn OsQuery>,
}

impl PosixProcess {
    /// Refreshes this pid only and hands its record to `f`.
    fn with_process<T>(&self, f: impl FnOnce(&sysinfo::Process) -> Result<T>) -> Result<T> {
        let pid = Pid::from_u32(self.pid);
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        match sys.process(pid) {
            Some(process) => f(process),
            None => Err(Error::NoSuchProcess { pid: self.pid }),
        }
    }

    /// `sysinfo` leaves attributes it could not read unset.
    fn denied<T>(&self, value: Option<T>) -> Result<T> {
        value.ok_or(Error::AccessDenied { pid: self.pid })
    }

    fn is_self(&self) -> bool {
        self.pid == std::process::id()
    }
}

fn map_status(status: sysinfo::ProcessStatus) -> ProcessStatus {
    use sysinfo::ProcessStatus as S;
    match status {
        S::Run => ProcessStatus::Running,
        S::Sleep => ProcessStatus::Sleeping,
        S::Idle => ProcessStatus::Idle,
        S::UninterruptibleDiskSleep => ProcessStatus::DiskSleep,
        S::Stop => ProcessStatus::Stopped,
        S::Tracing => ProcessStatus::TracingStop,
        S::Zombie => ProcessStatus::Zombie,
        S::Dead => ProcessStatus::Dead,
        S::Wakekill => ProcessStatus::WakeKill,
        S::Waking => ProcessStatus::Waking,
        S::Parked => ProcessStatus::Parked,
        _ => ProcessStatus::Unknown,
    }
}

impl ProcessOps for PosixProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn create_time(&self) -> Result<f64> {
        self.with_process(|p| Ok(p.start_time() as f64))
    }

    fn ppid(&self) -> Result<u32> {
        self.with_process(|p| Ok(p.parent().map(|pp| pp.as_u32()).unwrap_or(0)))
    }

    fn name(&self) -> Result<String> {
        self.with_process(|p| Ok(p.name().to_string_lossy().into_owned()))
    }

    fn exe(&self) -> Result<String> {
        self.with_process(|p| {
            let exe = self.denied(p.exe())?;
            Ok(exe.to_string_lossy().into_owned())
        })
    }

    fn cmdline(&self) -> Result<Vec<String>> {
        self.with_process(|p| {
            Ok(p.cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect())
        })
    }

    fn cwd(&self) -> Result<String> {
        self.with_process(|p| {
            let cwd = self.denied(p.cwd())?;
            Ok(cwd.to_string_lossy().into_owned())
        })
    }

    fn status(&self) -> Result<ProcessStatus> {
        self.with_process(|p| Ok(map_status(p.status())))
    }

    /// The saved id is not exposed portably and is reported as the effective one.
    fn uids(&self) -> Result<Ids> {
        self.with_process(|p| {
            let real = **self.denied(p.user_id())?;
            let effective = **self.denied(p.effective_user_id())?;
            Ok(Ids {
                real,
                effective,
                saved: effective,
            })
        })
    }

    fn gids(&self) -> Result<Ids> {
        self.with_process(|p| {
            let real = *self.denied(p.group_id())?;
            let effective = *self.denied(p.effective_group_id())?;
            Ok(Ids {
                real,
                effective,
                saved: effective,
            })
        })
    }

    fn nice(&self) -> Result<i32> {
        self.os
            .get_priority(self.pid)
            .map_err(|e| Error::from_io(self.pid, "getpriority", e))
    }

    fn set_nice(&self, value: i32) -> Result<()> {
        self.os
            .set_priority(self.pid, value)
            .map_err(|e| Error::from_io(self.pid, "setpriority", e))
    }

    /// Limits of other processes are only reachable through `prlimit`.
    fn rlimit(&self, resource: RLimitResource) -> Result<RLimit> {
        if !self.is_self() {
            return Err(Error::NotImplemented("rlimit of another process"));
        }
        self.os
            .get_rlimit(self.pid, resource)
            .map_err(|e| Error::from_io(self.pid, "getrlimit", e))
    }

    fn set_rlimit(&self, resource: RLimitResource, limit: RLimit) -> Result<()> {
        if !self.is_self() {
            return Err(Error::NotImplemented("rlimit of another process"));
        }
        self.os
            .set_rlimit(self.pid, resource, limit)
            .map_err(|e| Error::from_io(self.pid, "setrlimit", e))
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        self.with_process(|p| {
            Ok(MemoryInfo {
                rss: p.memory(),
                vms: p.virtual_memory(),
            })
        })
    }

    fn num_threads(&self) -> Result<usize> {
        self.with_process(|p| {
            p.tasks()
                .map(|tasks| tasks.len().max(1))
                .ok_or(Error::NotImplemented("num_threads"))
        })
    }

    /// Byte totals only; syscall counts report 0.
    fn io_counters(&self) -> Result<IoCounters> {
        self.with_process(|p| {
            let usage = p.disk_usage();
            Ok(IoCounters {
                read_count: 0,
                write_count: 0,
                read_bytes: usage.total_read_bytes,
                write_bytes: usage.total_written_bytes,
            })
        })
    }

    fn send_signal(&self, signal: i32) -> Result<()> {
        self.os
            .send_signal(self.pid, signal)
            .map_err(|e| Error::from_io(self.pid, "kill", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::NativeOs;

    fn provider() -> PosixProvider {
        PosixProvider::new(Arc::new(NativeOs::new()))
    }

    #[test]
    fn test_own_process() {
        let p = provider();
        let me = p.open(std::process::id()).unwrap();
        assert!(me.create_time().unwrap() > 0.0);
        assert!(!me.name().unwrap().is_empty());
        assert!(me.ppid().unwrap() > 0);
        assert!(me.memory_info().unwrap().rss > 0);
        assert!(!me.cmdline().unwrap().is_empty());
        let uids = me.uids().unwrap();
        assert_eq!(uids.saved, uids.effective);
    }

    #[test]
    fn test_missing_process() {
        let p = provider();
        // Above any configurable pid_max.
        let ghost = p.open(4_000_000_000).unwrap();
        assert!(ghost.create_time().unwrap_err().is_no_such_process());
        assert!(!p.pid_exists(4_000_000_000));
    }

    #[test]
    fn test_rlimit_only_for_self() {
        let p = provider();
        let me = p.open(std::process::id()).unwrap();
        let limit = me.rlimit(RLimitResource::Nofile).unwrap();
        assert!(limit.soft <= limit.hard);
        assert!(matches!(
            p.open(1).unwrap().rlimit(RLimitResource::Nofile),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_table_contains_self() {
        let pids = provider().pids().unwrap();
        assert!(pids.contains(&std::process::id()));
        assert!(pids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_unsupported_queries() {
        let me = provider().open(std::process::id()).unwrap();
        assert!(matches!(me.cpu_times(), Err(Error::NotImplemented(_))));
        assert!(matches!(me.memory_maps(false), Err(Error::NotImplemented(_))));
    }
}
