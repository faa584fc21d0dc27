//! Platform process capability.
//!
//! [`ProcessOps`] is the per-process query surface. Every method except
//! [`ProcessOps::pid`] and [`ProcessOps::create_time`] has a default body
//! returning [`Error::NotImplemented`], so a platform variant only
//! implements what its kernel exposes. Arguments of the mutating methods
//! are validated by [`crate::process::Process`] before they get here.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::os::NativeOs;
use crate::process::types::{
    CtxSwitches, Ids, IoCounters, IoPriority, MemoryInfo, MemoryInfoEx, MemoryMap, OpenFile,
    ProcessCpuTimes, ProcessStatus, RLimit, RLimitResource, ThreadInfo,
};
use crate::sample::{Connection, ConnectionKind};

/// Queries against one process.
///
/// Failures distinguish [`Error::NoSuchProcess`] (the kernel record is gone)
/// from [`Error::AccessDenied`] (the caller lacks permission).
pub trait ProcessOps: Send {
    fn pid(&self) -> u32;

    /// Start time, seconds since the epoch.
    fn create_time(&self) -> Result<f64>;

    fn ppid(&self) -> Result<u32> {
        Err(Error::NotImplemented("ppid"))
    }

    /// Kernel process name (possibly truncated).
    fn name(&self) -> Result<String> {
        Err(Error::NotImplemented("name"))
    }

    /// Executable path; empty when the kernel has none (kernel threads, zombies).
    fn exe(&self) -> Result<String> {
        Err(Error::NotImplemented("exe"))
    }

    fn cmdline(&self) -> Result<Vec<String>> {
        Err(Error::NotImplemented("cmdline"))
    }

    fn cwd(&self) -> Result<String> {
        Err(Error::NotImplemented("cwd"))
    }

    fn status(&self) -> Result<ProcessStatus> {
        Err(Error::NotImplemented("status"))
    }

    /// Controlling terminal, if any.
    fn terminal(&self) -> Result<Option<String>> {
        Err(Error::NotImplemented("terminal"))
    }

    fn uids(&self) -> Result<Ids> {
        Err(Error::NotImplemented("uids"))
    }

    fn gids(&self) -> Result<Ids> {
        Err(Error::NotImplemented("gids"))
    }

    fn nice(&self) -> Result<i32> {
        Err(Error::NotImplemented("nice"))
    }

    fn set_nice(&self, _value: i32) -> Result<()> {
        Err(Error::NotImplemented("set_nice"))
    }

    fn cpu_affinity(&self) -> Result<Vec<usize>> {
        Err(Error::NotImplemented("cpu_affinity"))
    }

    fn set_cpu_affinity(&self, _cpus: &[usize]) -> Result<()> {
        Err(Error::NotImplemented("set_cpu_affinity"))
    }

    fn rlimit(&self, _resource: RLimitResource) -> Result<RLimit> {
        Err(Error::NotImplemented("rlimit"))
    }

    fn set_rlimit(&self, _resource: RLimitResource, _limit: RLimit) -> Result<()> {
        Err(Error::NotImplemented("set_rlimit"))
    }

    fn ionice(&self) -> Result<IoPriority> {
        Err(Error::NotImplemented("ionice"))
    }

    fn set_ionice(&self, _prio: IoPriority) -> Result<()> {
        Err(Error::NotImplemented("set_ionice"))
    }

    fn cpu_times(&self) -> Result<ProcessCpuTimes> {
        Err(Error::NotImplemented("cpu_times"))
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        Err(Error::NotImplemented("memory_info"))
    }

    fn memory_info_ex(&self) -> Result<MemoryInfoEx> {
        Err(Error::NotImplemented("memory_info_ex"))
    }

    /// Regular files held open.
    fn open_files(&self) -> Result<Vec<OpenFile>> {
        Err(Error::NotImplemented("open_files"))
    }

    fn num_fds(&self) -> Result<usize> {
        Err(Error::NotImplemented("num_fds"))
    }

    /// Memory mappings; with `grouped` the mappings of one path are summed.
    fn memory_maps(&self, _grouped: bool) -> Result<Vec<MemoryMap>> {
        Err(Error::NotImplemented("memory_maps"))
    }

    fn threads(&self) -> Result<Vec<ThreadInfo>> {
        Err(Error::NotImplemented("threads"))
    }

    fn num_threads(&self) -> Result<usize> {
        Err(Error::NotImplemented("num_threads"))
    }

    fn num_ctx_switches(&self) -> Result<CtxSwitches> {
        Err(Error::NotImplemented("num_ctx_switches"))
    }

    fn io_counters(&self) -> Result<IoCounters> {
        Err(Error::NotImplemented("io_counters"))
    }

    /// Sockets held by this process, filtered by `kind`.
    fn connections(&self, _kind: ConnectionKind) -> Result<Vec<Connection>> {
        Err(Error::NotImplemented("connections"))
    }

    fn send_signal(&self, _signal: i32) -> Result<()> {
        Err(Error::NotImplemented("send_signal"))
    }
}

/// Opens [`ProcessOps`] and answers process-table questions for one platform.
pub trait ProcessProvider: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Opens the capability for `pid`. Existence is checked lazily by the
    /// first query, usually [`ProcessOps::create_time`].
    fn open(&self, pid: u32) -> Result<Box<dyn ProcessOps>>;

    /// Pids currently in the process table, ascending.
    fn pids(&self) -> Result<Vec<u32>>;

    fn pid_exists(&self, pid: u32) -> bool;

    /// Number of CPUs affinity indices are checked against.
    fn cpu_count(&self) -> usize;

    fn user_name(&self, uid: u32) -> Option<String>;
}

/// The two process capability variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    /// `/proc` backed.
    Linux,
    /// Portable process table, native calls for the rest.
    Posix,
}

impl PlatformKind {
    /// The variant for the host this binary was built for.
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") {
            PlatformKind::Linux
        } else {
            PlatformKind::Posix
        }
    }

    /// Builds the host provider of this kind.
    pub fn provider(self) -> Arc<dyn ProcessProvider> {
        let os = Arc::new(NativeOs::new());
        match self {
            PlatformKind::Linux => Arc::new(crate::process::linux::LinuxProvider::new(
                crate::collector::RealFs::new(),
                "/proc",
                os,
            )),
            PlatformKind::Posix => Arc::new(crate::process::posix::PosixProvider::new(os)),
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::Linux => f.write_str("linux"),
            PlatformKind::Posix => f.write_str("posix"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl ProcessOps for Bare {
        fn pid(&self) -> u32 {
            7
        }

        fn create_time(&self) -> Result<f64> {
            Ok(1.0)
        }
    }

    #[test]
    fn test_defaults_are_not_implemented() {
        let ops = Bare;
        assert!(matches!(ops.cwd(), Err(Error::NotImplemented("cwd"))));
        assert!(matches!(
            ops.connections(ConnectionKind::Inet),
            Err(Error::NotImplemented(_))
        ));
        assert!(matches!(ops.set_nice(1), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_detect_matches_build_target() {
        let kind = PlatformKind::detect();
        if cfg!(target_os = "linux") {
            assert_eq!(kind, PlatformKind::Linux);
        } else {
            assert_eq!(kind, PlatformKind::Posix);
        }
        assert_eq!(kind.provider().kind(), kind);
    }
}
