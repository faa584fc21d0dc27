//! Process handles that stay safe across pid reuse.
//!
//! A [`Process`] is pinned to a [`ProcessIdentity`] (pid plus creation
//! time) taken when it is constructed. [`Process::is_running`] compares a
//! fresh identity against the stored one, and once a handle has seen its
//! process gone it stays gone.
//!
//! Queries go through a [`ProcessProvider`] chosen once per
//! [`Processes`] registry:
//!
//! ```text
//!   Processes::detect()
//!        │ PlatformKind::detect()
//!        ▼
//!   Arc<dyn ProcessProvider> ──open(pid)──► Box<dyn ProcessOps>
//!        │                                        │
//!   LinuxProvider (/proc)                   LinuxProcess
//!   PosixProvider (sysinfo)                 PosixProcess
//! ```

pub mod linux;
pub mod platform;
pub mod posix;
pub mod types;

pub use platform::{PlatformKind, ProcessOps, ProcessProvider};
pub use types::{
    CtxSwitches, Ids, IoClass, IoCounters, IoPriority, MemoryInfo, MemoryInfoEx, MemoryMap,
    NICE_RANGE, OpenFile, ProcessCpuTimes, ProcessStatus, RLimit, RLimitResource, ThreadInfo,
    signal,
};

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use once_cell::unsync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::rates;
use crate::sample::{Connection, ConnectionKind};

/// What makes a process "the same process": its pid and its start time.
///
/// `create_time` is `None` when the start time could not be read; two
/// such identities compare equal on pid alone.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub create_time: Option<f64>,
}

impl PartialEq for ProcessIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
            && self.create_time.map(f64::to_bits) == other.create_time.map(f64::to_bits)
    }
}

impl Eq for ProcessIdentity {}

impl Hash for ProcessIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pid.hash(state);
        self.create_time.map(f64::to_bits).hash(state);
    }
}

impl ProcessIdentity {
    /// Reads the identity of whatever process currently holds `pid`.
    fn probe(provider: &dyn ProcessProvider, pid: u32) -> Result<(Self, Box<dyn ProcessOps>)> {
        if pid == 0 {
            return Err(Error::invalid("pid must be greater than 0"));
        }
        let ops = provider.open(pid)?;
        let create_time = match ops.create_time() {
            Ok(t) => Some(t),
            Err(Error::AccessDenied { .. }) => {
                debug!(pid, "creation time not readable, identity is pid only");
                None
            }
            Err(e) => return Err(e),
        };
        Ok((Self { pid, create_time }, ops))
    }
}

/// Attributes collectable with [`Process::as_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessAttr {
    Pid,
    Ppid,
    Name,
    Exe,
    Cmdline,
    Cwd,
    Status,
    Terminal,
    Username,
    CreateTime,
    Uids,
    Gids,
    Nice,
    CpuAffinity,
    Ionice,
    CpuTimes,
    MemoryInfo,
    MemoryInfoEx,
    OpenFiles,
    NumFds,
    NumThreads,
    Threads,
    NumCtxSwitches,
    IoCounters,
    Connections,
}

impl ProcessAttr {
    pub const ALL: [ProcessAttr; 25] = [
        ProcessAttr::Pid,
        ProcessAttr::Ppid,
        ProcessAttr::Name,
        ProcessAttr::Exe,
        ProcessAttr::Cmdline,
        ProcessAttr::Cwd,
        ProcessAttr::Status,
        ProcessAttr::Terminal,
        ProcessAttr::Username,
        ProcessAttr::CreateTime,
        ProcessAttr::Uids,
        ProcessAttr::Gids,
        ProcessAttr::Nice,
        ProcessAttr::CpuAffinity,
        ProcessAttr::Ionice,
        ProcessAttr::CpuTimes,
        ProcessAttr::MemoryInfo,
        ProcessAttr::MemoryInfoEx,
        ProcessAttr::OpenFiles,
        ProcessAttr::NumFds,
        ProcessAttr::NumThreads,
        ProcessAttr::Threads,
        ProcessAttr::NumCtxSwitches,
        ProcessAttr::IoCounters,
        ProcessAttr::Connections,
    ];

    /// Key used in [`Process::as_map`] output.
    pub fn name(self) -> &'static str {
        match self {
            ProcessAttr::Pid => "pid",
            ProcessAttr::Ppid => "ppid",
            ProcessAttr::Name => "name",
            ProcessAttr::Exe => "exe",
            ProcessAttr::Cmdline => "cmdline",
            ProcessAttr::Cwd => "cwd",
            ProcessAttr::Status => "status",
            ProcessAttr::Terminal => "terminal",
            ProcessAttr::Username => "username",
            ProcessAttr::CreateTime => "create_time",
            ProcessAttr::Uids => "uids",
            ProcessAttr::Gids => "gids",
            ProcessAttr::Nice => "nice",
            ProcessAttr::CpuAffinity => "cpu_affinity",
            ProcessAttr::Ionice => "ionice",
            ProcessAttr::CpuTimes => "cpu_times",
            ProcessAttr::MemoryInfo => "memory_info",
            ProcessAttr::MemoryInfoEx => "memory_info_ex",
            ProcessAttr::OpenFiles => "open_files",
            ProcessAttr::NumFds => "num_fds",
            ProcessAttr::NumThreads => "num_threads",
            ProcessAttr::Threads => "threads",
            ProcessAttr::NumCtxSwitches => "num_ctx_switches",
            ProcessAttr::IoCounters => "io_counters",
            ProcessAttr::Connections => "connections",
        }
    }

    /// Looks an attribute up by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::invalid(format!("unknown process attribute {:?}", name)))
    }
}

fn to_value<T: Serialize>(v: T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

/// A handle on one process.
///
/// `name()` and `exe()` are resolved on first use and never refreshed;
/// build a new handle for fresh values.
pub struct Process {
    identity: ProcessIdentity,
    ops: Box<dyn ProcessOps>,
    provider: Arc<dyn ProcessProvider>,
    name: OnceCell<String>,
    exe: OnceCell<String>,
    gone: Cell<bool>,
    last_cpu: Option<(Instant, ProcessCpuTimes)>,
}

impl Process {
    /// Opens `pid` through `provider`.
    ///
    /// Fails with `InvalidArgument` for pid 0 and `NoSuchProcess` when no
    /// such process exists. A process whose start time is unreadable is
    /// still opened, with an identity of pid only.
    pub fn with_provider(provider: Arc<dyn ProcessProvider>, pid: u32) -> Result<Self> {
        let (identity, ops) = ProcessIdentity::probe(provider.as_ref(), pid)?;
        Ok(Self {
            identity,
            ops,
            provider,
            name: OnceCell::new(),
            exe: OnceCell::new(),
            gone: Cell::new(false),
            last_cpu: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.identity.pid
    }

    pub fn identity(&self) -> ProcessIdentity {
        self.identity
    }

    pub fn create_time(&self) -> Option<f64> {
        self.identity.create_time
    }

    /// True while the pid still belongs to the process this handle was
    /// built for. Once false, always false.
    pub fn is_running(&self) -> bool {
        if self.gone.get() {
            return false;
        }
        let same = match ProcessIdentity::probe(self.provider.as_ref(), self.pid()) {
            Ok((fresh, _)) => fresh == self.identity,
            Err(e) => {
                trace!(pid = self.pid(), error = %e, "identity probe failed");
                false
            }
        };
        if !same {
            debug!(pid = self.pid(), "process gone");
            self.gone.set(true);
        }
        same
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::NoSuchProcess { pid: self.pid() })
        }
    }

    /// The parent, unless it is unknown or younger than this process.
    ///
    /// A parent that started after its child means the parent pid was
    /// reused; `None` is returned rather than an unrelated process.
    pub fn parent(&self) -> Result<Option<Process>> {
        let ppid = self.ops.ppid()?;
        if ppid == 0 {
            return Ok(None);
        }
        let parent = match Process::with_provider(Arc::clone(&self.provider), ppid) {
            Ok(parent) => parent,
            Err(Error::NoSuchProcess { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if let (Some(parent_created), Some(created)) = (parent.create_time(), self.create_time())
            && parent_created > created
        {
            debug!(pid = self.pid(), ppid, "parent pid was reused");
            return Ok(None);
        }
        Ok(Some(parent))
    }

    /// Direct children, or all descendants with `recursive`.
    ///
    /// A process claiming a parent that started after it is not a child.
    pub fn children(&self, recursive: bool) -> Result<Vec<Process>> {
        let mut by_parent: HashMap<u32, Vec<u32>> = HashMap::new();
        for pid in self.provider.pids()? {
            match self.provider.open(pid).and_then(|ops| ops.ppid()) {
                Ok(ppid) => by_parent.entry(ppid).or_default().push(pid),
                Err(e) => trace!(pid, error = %e, "skipping process while building tree"),
            }
        }

        let mut found = Vec::new();
        let mut visited = HashSet::from([self.pid()]);
        let mut queue = VecDeque::from([(self.pid(), self.create_time())]);
        while let Some((ppid, parent_created)) = queue.pop_front() {
            for &pid in by_parent.get(&ppid).into_iter().flatten() {
                if !visited.insert(pid) {
                    continue;
                }
                let child = match Process::with_provider(Arc::clone(&self.provider), pid) {
                    Ok(child) => child,
                    Err(Error::NoSuchProcess { .. }) => continue,
                    Err(e) => return Err(e),
                };
                if let (Some(created), Some(parent_created)) = (child.create_time(), parent_created)
                    && created < parent_created
                {
                    continue;
                }
                if recursive {
                    queue.push_back((pid, child.create_time()));
                }
                found.push(child);
            }
        }
        Ok(found)
    }

    pub fn ppid(&self) -> Result<u32> {
        self.ops.ppid()
    }

    /// Process name, with kernel truncation undone where possible.
    pub fn name(&self) -> Result<&str> {
        self.name.get_or_try_init(|| self.ops.name()).map(String::as_str)
    }

    pub fn exe(&self) -> Result<&str> {
        self.exe.get_or_try_init(|| self.ops.exe()).map(String::as_str)
    }

    pub fn cmdline(&self) -> Result<Vec<String>> {
        self.ops.cmdline()
    }

    pub fn cwd(&self) -> Result<String> {
        self.ops.cwd()
    }

    pub fn status(&self) -> Result<ProcessStatus> {
        self.ops.status()
    }

    pub fn terminal(&self) -> Result<Option<String>> {
        self.ops.terminal()
    }

    pub fn uids(&self) -> Result<Ids> {
        self.ops.uids()
    }

    pub fn gids(&self) -> Result<Ids> {
        self.ops.gids()
    }

    /// Name of the real user; the numeric uid when it has no name.
    pub fn username(&self) -> Result<String> {
        let uid = self.ops.uids()?.real;
        Ok(self
            .provider
            .user_name(uid)
            .unwrap_or_else(|| uid.to_string()))
    }

    pub fn nice(&self) -> Result<i32> {
        self.ops.nice()
    }

    /// Sets the niceness, which must lie in [`NICE_RANGE`].
    pub fn set_nice(&self, value: i32) -> Result<()> {
        if !NICE_RANGE.contains(&value) {
            return Err(Error::invalid(format!(
                "nice value must be in {}..={}, got {}",
                NICE_RANGE.start(),
                NICE_RANGE.end(),
                value
            )));
        }
        self.ensure_running()?;
        self.ops.set_nice(value)
    }

    pub fn cpu_affinity(&self) -> Result<Vec<usize>> {
        self.ops.cpu_affinity()
    }

    /// Pins the process to `cpus`, each below the machine's CPU count.
    pub fn set_cpu_affinity(&self, cpus: &[usize]) -> Result<()> {
        if cpus.is_empty() {
            return Err(Error::invalid("cpu affinity set is empty"));
        }
        let count = self.provider.cpu_count();
        if let Some(bad) = cpus.iter().find(|&&cpu| cpu >= count) {
            return Err(Error::invalid(format!(
                "cpu index {} out of range, machine has {} cpus",
                bad, count
            )));
        }
        self.ensure_running()?;
        self.ops.set_cpu_affinity(cpus)
    }

    pub fn rlimit(&self, resource: RLimitResource) -> Result<RLimit> {
        self.ops.rlimit(resource)
    }

    pub fn set_rlimit(&self, resource: RLimitResource, limit: RLimit) -> Result<()> {
        let limit = RLimit::new(limit.soft, limit.hard)?;
        self.ensure_running()?;
        self.ops.set_rlimit(resource, limit)
    }

    pub fn ionice(&self) -> Result<IoPriority> {
        self.ops.ionice()
    }

    pub fn set_ionice(&self, class: IoClass, value: u8) -> Result<()> {
        let prio = IoPriority::new(class, value)?;
        self.ensure_running()?;
        self.ops.set_ionice(prio)
    }

    pub fn cpu_times(&self) -> Result<ProcessCpuTimes> {
        self.ops.cpu_times()
    }

    /// CPU utilization of this process, in percent of one CPU.
    ///
    /// A positive `interval` blocks for that long between two samples.
    /// `Duration::ZERO` compares against the previous call on this handle;
    /// the first such call returns 0.0.
    pub fn cpu_percent(&mut self, interval: Duration) -> Result<f64> {
        if !interval.is_zero() {
            let started = Instant::now();
            let start = self.ops.cpu_times()?;
            thread::sleep(interval);
            let end = self.ops.cpu_times()?;
            let elapsed = started.elapsed();
            self.last_cpu = Some((Instant::now(), end));
            return Ok(rates::process_cpu_percent(&start, &end, elapsed));
        }

        let now = Instant::now();
        let end = self.ops.cpu_times()?;
        Ok(match self.last_cpu.replace((now, end)) {
            Some((then, start)) => {
                rates::process_cpu_percent(&start, &end, now.duration_since(then))
            }
            None => 0.0,
        })
    }

    pub fn memory_info(&self) -> Result<MemoryInfo> {
        self.ops.memory_info()
    }

    pub fn memory_info_ex(&self) -> Result<MemoryInfoEx> {
        self.ops.memory_info_ex()
    }

    pub fn open_files(&self) -> Result<Vec<OpenFile>> {
        self.ops.open_files()
    }

    pub fn num_fds(&self) -> Result<usize> {
        self.ops.num_fds()
    }

    pub fn memory_maps(&self, grouped: bool) -> Result<Vec<MemoryMap>> {
        self.ops.memory_maps(grouped)
    }

    pub fn threads(&self) -> Result<Vec<ThreadInfo>> {
        self.ops.threads()
    }

    pub fn num_threads(&self) -> Result<usize> {
        self.ops.num_threads()
    }

    pub fn num_ctx_switches(&self) -> Result<CtxSwitches> {
        self.ops.num_ctx_switches()
    }

    pub fn io_counters(&self) -> Result<IoCounters> {
        self.ops.io_counters()
    }

    pub fn connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        self.ops.connections(kind)
    }

    pub fn send_signal(&self, signal: i32) -> Result<()> {
        self.ensure_running()?;
        self.ops.send_signal(signal)
    }

    pub fn suspend(&self) -> Result<()> {
        self.send_signal(signal::SIGSTOP)
    }

    pub fn resume(&self) -> Result<()> {
        self.send_signal(signal::SIGCONT)
    }

    pub fn terminate(&self) -> Result<()> {
        self.send_signal(signal::SIGTERM)
    }

    pub fn kill(&self) -> Result<()> {
        self.send_signal(signal::SIGKILL)
    }

    fn attr_value(&self, attr: ProcessAttr) -> Result<Value> {
        Ok(match attr {
            ProcessAttr::Pid => to_value(self.pid()),
            ProcessAttr::Ppid => to_value(self.ppid()?),
            ProcessAttr::Name => to_value(self.name()?),
            ProcessAttr::Exe => to_value(self.exe()?),
            ProcessAttr::Cmdline => to_value(self.cmdline()?),
            ProcessAttr::Cwd => to_value(self.cwd()?),
            ProcessAttr::Status => to_value(self.status()?),
            ProcessAttr::Terminal => to_value(self.terminal()?),
            ProcessAttr::Username => to_value(self.username()?),
            ProcessAttr::CreateTime => to_value(self.create_time()),
            ProcessAttr::Uids => to_value(self.uids()?),
            ProcessAttr::Gids => to_value(self.gids()?),
            ProcessAttr::Nice => to_value(self.nice()?),
            ProcessAttr::CpuAffinity => to_value(self.cpu_affinity()?),
            ProcessAttr::Ionice => to_value(self.ionice()?),
            ProcessAttr::CpuTimes => to_value(self.cpu_times()?),
            ProcessAttr::MemoryInfo => to_value(self.memory_info()?),
            ProcessAttr::MemoryInfoEx => to_value(self.memory_info_ex()?),
            ProcessAttr::OpenFiles => to_value(self.open_files()?),
            ProcessAttr::NumFds => to_value(self.num_fds()?),
            ProcessAttr::NumThreads => to_value(self.num_threads()?),
            ProcessAttr::Threads => to_value(self.threads()?),
            ProcessAttr::NumCtxSwitches => to_value(self.num_ctx_switches()?),
            ProcessAttr::IoCounters => to_value(self.io_counters()?),
            ProcessAttr::Connections => to_value(self.connections(ConnectionKind::Inet)?),
        })
    }

    /// Collects `attrs` (every attribute when empty) into one map.
    ///
    /// With `fallback`, attributes failing with `AccessDenied` or
    /// `NotImplemented` take that value instead; without it those errors
    /// are returned. `NoSuchProcess` is always returned.
    pub fn as_map(
        &self,
        attrs: &[ProcessAttr],
        fallback: Option<Value>,
    ) -> Result<BTreeMap<&'static str, Value>> {
        let attrs = if attrs.is_empty() {
            &ProcessAttr::ALL[..]
        } else {
            attrs
        };

        let mut map = BTreeMap::new();
        for &attr in attrs {
            let value = match self.attr_value(attr) {
                Ok(value) => value,
                Err(e @ (Error::AccessDenied { .. } | Error::NotImplemented(_))) => {
                    match &fallback {
                        Some(v) => v.clone(),
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            };
            map.insert(attr.name(), value);
        }
        Ok(map)
    }
}

impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Process {}

impl Hash for Process {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.identity.pid)
            .field("create_time", &self.identity.create_time)
            .field("name", &self.name.get())
            .field("gone", &self.gone.get())
            .finish()
    }
}

/// Entry point for process queries on one platform.
///
/// The provider is chosen once by [`Processes::detect`] (or injected with
/// [`Processes::new`]) and shared by every handle the registry opens.
#[derive(Clone)]
pub struct Processes {
    provider: Arc<dyn ProcessProvider>,
}

impl Processes {
    /// Registry for the host platform.
    pub fn detect() -> Self {
        let kind = PlatformKind::detect();
        debug!(platform = %kind, "selected process capability");
        Self::new(kind.provider())
    }

    pub fn new(provider: Arc<dyn ProcessProvider>) -> Self {
        Self { provider }
    }

    pub fn kind(&self) -> PlatformKind {
        self.provider.kind()
    }

    pub fn process(&self, pid: u32) -> Result<Process> {
        Process::with_provider(Arc::clone(&self.provider), pid)
    }

    /// Handle on the calling process.
    pub fn current(&self) -> Result<Process> {
        self.process(std::process::id())
    }

    pub fn pids(&self) -> Result<Vec<u32>> {
        self.provider.pids()
    }

    pub fn pid_exists(&self, pid: u32) -> bool {
        self.provider.pid_exists(pid)
    }

    /// Handles on every process, in pid order.
    ///
    /// Processes that exit between listing and opening are skipped; other
    /// failures are yielded.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<Process>> + '_> {
        let pids = self.provider.pids()?;
        Ok(pids
            .into_iter()
            .filter_map(move |pid| match self.process(pid) {
                Err(Error::NoSuchProcess { .. }) => {
                    trace!(pid, "process vanished during iteration");
                    None
                }
                other => Some(other),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::collector::mock::BOOT_TIME;
    use crate::os::testing::FakeOs;
    use crate::process::linux::LinuxProvider;
    use serde_json::json;
    use std::sync::Mutex;

    fn registry(fs: MockFs) -> Processes {
        registry_with(fs, FakeOs::new())
    }

    fn registry_with(fs: MockFs, os: FakeOs) -> Processes {
        Processes::new(Arc::new(LinuxProvider::new(fs, "/proc", Arc::new(os))))
    }

    /// Delegates to a provider that can be replaced mid-test.
    struct Swappable(Mutex<Arc<dyn ProcessProvider>>);

    impl Swappable {
        fn new(fs: MockFs) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Self::linux(fs))))
        }

        fn linux(fs: MockFs) -> Arc<dyn ProcessProvider> {
            Arc::new(LinuxProvider::new(fs, "/proc", Arc::new(FakeOs::new())))
        }

        fn swap(&self, fs: MockFs) {
            *self.0.lock().unwrap() = Self::linux(fs);
        }

        fn current(&self) -> Arc<dyn ProcessProvider> {
            Arc::clone(&self.0.lock().unwrap())
        }
    }

    impl ProcessProvider for Swappable {
        fn kind(&self) -> PlatformKind {
            PlatformKind::Linux
        }
        fn open(&self, pid: u32) -> Result<Box<dyn ProcessOps>> {
            self.current().open(pid)
        }
        fn pids(&self) -> Result<Vec<u32>> {
            self.current().pids()
        }
        fn pid_exists(&self, pid: u32) -> bool {
            self.current().pid_exists(pid)
        }
        fn cpu_count(&self) -> usize {
            self.current().cpu_count()
        }
        fn user_name(&self, uid: u32) -> Option<String> {
            self.current().user_name(uid)
        }
    }

    /// Ops with nothing but identity, and CPU time growing by one second
    /// per read.
    struct Scripted {
        pid: u32,
        ticks: Mutex<f64>,
    }

    impl ProcessOps for Scripted {
        fn pid(&self) -> u32 {
            self.pid
        }
        fn create_time(&self) -> Result<f64> {
            Ok(1.0)
        }
        fn ppid(&self) -> Result<u32> {
            Err(Error::NoSuchProcess { pid: self.pid })
        }
        fn cpu_times(&self) -> Result<ProcessCpuTimes> {
            let mut ticks = self.ticks.lock().unwrap();
            *ticks += 1.0;
            Ok(ProcessCpuTimes {
                user: *ticks,
                ..Default::default()
            })
        }
    }

    struct ScriptedProvider;

    impl ProcessProvider for ScriptedProvider {
        fn kind(&self) -> PlatformKind {
            PlatformKind::Posix
        }
        fn open(&self, pid: u32) -> Result<Box<dyn ProcessOps>> {
            Ok(Box::new(Scripted {
                pid,
                ticks: Mutex::new(0.0),
            }))
        }
        fn pids(&self) -> Result<Vec<u32>> {
            Ok(vec![42])
        }
        fn pid_exists(&self, pid: u32) -> bool {
            pid == 42
        }
        fn cpu_count(&self) -> usize {
            1
        }
        fn user_name(&self, _uid: u32) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_construction() {
        let procs = registry(MockFs::typical_system());
        assert!(matches!(procs.process(0), Err(Error::InvalidArgument(_))));
        assert!(procs.process(4242).unwrap_err().is_no_such_process());

        let bash = procs.process(1000).unwrap();
        assert_eq!(bash.create_time(), Some(BOOT_TIME as f64 + 1000.0));
        assert!(bash.is_running());
    }

    #[test]
    fn test_identity_equality() {
        let procs = registry(MockFs::typical_system());
        let a = procs.process(1000).unwrap();
        let b = procs.process(1000).unwrap();
        let c = procs.process(1001).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<ProcessIdentity> =
            [a.identity(), b.identity(), c.identity()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unreadable_create_time_keeps_handle() {
        let mut fs = MockFs::typical_system();
        fs.deny("/proc/1001/stat");
        let procs = registry(fs);
        let cat = procs.process(1001).unwrap();
        assert_eq!(cat.create_time(), None);
        assert!(cat.is_running());
    }

    #[test]
    fn test_gone_is_terminal() {
        let provider = Swappable::new(MockFs::typical_system());
        let cat = Process::with_provider(provider.clone(), 1001).unwrap();
        assert!(cat.is_running());

        // Same pid, different process.
        provider.swap(MockFs::with_reused_pid());
        assert!(!cat.is_running());

        // The original comes back; the handle stays gone.
        provider.swap(MockFs::typical_system());
        assert!(!cat.is_running());
        assert!(cat.terminate().unwrap_err().is_no_such_process());
    }

    #[test]
    fn test_exited_process_is_not_running() {
        let provider = Swappable::new(MockFs::typical_system());
        let cat = Process::with_provider(provider.clone(), 1001).unwrap();
        let mut fs = MockFs::typical_system();
        fs.remove("/proc/1001");
        provider.swap(fs);
        assert!(!cat.is_running());
        assert!(matches!(
            cat.set_nice(5),
            Err(Error::NoSuchProcess { pid: 1001 })
        ));
    }

    #[test]
    fn test_parent() {
        let procs = registry(MockFs::typical_system());
        let cat = procs.process(1001).unwrap();
        let parent = cat.parent().unwrap().unwrap();
        assert_eq!(parent.pid(), 1000);
        assert!(parent.create_time() <= cat.create_time());

        // bash's parent 999 does not exist
        assert!(parent.parent().unwrap().is_none());
        // init has no parent
        assert!(procs.process(1).unwrap().parent().unwrap().is_none());
    }

    #[test]
    fn test_parent_rejects_reused_pid() {
        let procs = registry(MockFs::with_orphan_after_reuse());
        let sleeper = procs.process(2000).unwrap();
        assert_eq!(sleeper.ppid().unwrap(), 1001);
        assert!(sleeper.parent().unwrap().is_none());
    }

    #[test]
    fn test_children() {
        let procs = registry(MockFs::with_zombie_process());
        let bash = procs.process(1000).unwrap();
        let pids: Vec<u32> = bash.children(false).unwrap().iter().map(Process::pid).collect();
        assert_eq!(pids, vec![1001, 5000]);
        assert!(procs.process(1001).unwrap().children(true).unwrap().is_empty());
    }

    #[test]
    fn test_children_skip_younger_parent() {
        let procs = registry(MockFs::with_orphan_after_reuse());
        let sshd = procs.process(1001).unwrap();
        assert!(sshd.children(true).unwrap().is_empty());

        let init = procs.process(1).unwrap();
        let pids: Vec<u32> = init.children(true).unwrap().iter().map(Process::pid).collect();
        assert_eq!(pids, vec![1001]);
    }

    #[test]
    fn test_memoized_name_and_exe() {
        let procs = registry(MockFs::with_long_name());
        let kube = procs.process(4000).unwrap();
        assert_eq!(kube.name().unwrap(), "kube-controller-manager");
        assert_eq!(kube.exe().unwrap(), "/usr/local/bin/kube-controller-manager");
        assert!(format!("{:?}", kube).contains("kube-controller-manager"));
    }

    #[test]
    fn test_username() {
        let procs = registry(MockFs::typical_system());
        assert_eq!(procs.process(1000).unwrap().username().unwrap(), "user");
        assert_eq!(procs.process(1).unwrap().username().unwrap(), "root");
    }

    #[test]
    fn test_affinity_validation_and_echo() {
        let procs = registry(MockFs::typical_system());
        let bash = procs.process(1000).unwrap();

        // FakeOs reports four cpus.
        assert!(matches!(
            bash.set_cpu_affinity(&[4]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            bash.set_cpu_affinity(&[]),
            Err(Error::InvalidArgument(_))
        ));

        bash.set_cpu_affinity(&[2, 0]).unwrap();
        assert_eq!(bash.cpu_affinity().unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_validation_precedes_os_call() {
        let procs = registry_with(MockFs::typical_system(), FakeOs::new().deny(1000));
        let bash = procs.process(1000).unwrap();

        assert!(matches!(bash.set_nice(20), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            bash.set_ionice(IoClass::BestEffort, 8),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            bash.set_rlimit(RLimitResource::Nofile, RLimit { soft: 10, hard: 5 }),
            Err(Error::InvalidArgument(_))
        ));
        assert!(bash.set_nice(5).unwrap_err().is_access_denied());
    }

    #[test]
    fn test_mutations_round_trip() {
        let procs = registry(MockFs::typical_system());
        let cat = procs.process(1001).unwrap();

        cat.set_nice(10).unwrap();
        assert_eq!(cat.nice().unwrap(), 10);

        let limit = RLimit::new(256, 1024).unwrap();
        cat.set_rlimit(RLimitResource::Nofile, limit).unwrap();
        assert_eq!(cat.rlimit(RLimitResource::Nofile).unwrap(), limit);

        cat.set_ionice(IoClass::Idle, 0).unwrap();
        assert_eq!(cat.ionice().unwrap().class, IoClass::Idle);
    }

    #[test]
    fn test_signals() {
        let os = Arc::new(FakeOs::new());
        let provider = LinuxProvider::new(MockFs::typical_system(), "/proc", os.clone());
        let procs = Processes::new(Arc::new(provider));
        let cat = procs.process(1001).unwrap();

        cat.suspend().unwrap();
        cat.resume().unwrap();
        cat.terminate().unwrap();
        cat.kill().unwrap();
        assert_eq!(
            os.signals(),
            vec![
                (1001, signal::SIGSTOP),
                (1001, signal::SIGCONT),
                (1001, signal::SIGTERM),
                (1001, signal::SIGKILL),
            ]
        );
    }

    #[test]
    fn test_as_map_access_denied() {
        let procs = registry(MockFs::with_restricted_process());
        let pg = procs.process(3000).unwrap();
        let attrs = [ProcessAttr::Name, ProcessAttr::Exe, ProcessAttr::Cwd];

        assert!(pg.as_map(&attrs, None).unwrap_err().is_access_denied());

        let map = pg.as_map(&attrs, Some(Value::Null)).unwrap();
        assert_eq!(map["name"], json!("postgres"));
        assert_eq!(map["exe"], Value::Null);
        assert_eq!(map["cwd"], Value::Null);
    }

    #[test]
    fn test_as_map_not_implemented_and_gone() {
        let procs = Processes::new(Arc::new(ScriptedProvider));
        let p = procs.process(42).unwrap();

        assert!(matches!(
            p.as_map(&[ProcessAttr::Cwd], None),
            Err(Error::NotImplemented(_))
        ));
        let map = p.as_map(&[ProcessAttr::Pid, ProcessAttr::Cwd], Some(json!("n/a"))).unwrap();
        assert_eq!(map["pid"], json!(42));
        assert_eq!(map["cwd"], json!("n/a"));

        // A vanished process is never papered over.
        assert!(
            p.as_map(&[ProcessAttr::Ppid], Some(Value::Null))
                .unwrap_err()
                .is_no_such_process()
        );
    }

    #[test]
    fn test_as_map_all_attributes() {
        let procs = registry(MockFs::typical_system());
        let bash = procs.process(1000).unwrap();
        let map = bash.as_map(&[], None).unwrap();
        assert_eq!(map.len(), ProcessAttr::ALL.len());
        assert_eq!(map["terminal"], json!("/dev/pts/0"));
        assert_eq!(map["status"], json!("sleeping"));
        assert_eq!(ProcessAttr::from_name("num_fds").unwrap(), ProcessAttr::NumFds);
        assert!(ProcessAttr::from_name("bogus").is_err());
    }

    #[test]
    fn test_cpu_percent_since_last_call() {
        let procs = Processes::new(Arc::new(ScriptedProvider));
        let mut p = procs.process(42).unwrap();
        assert_eq!(p.cpu_percent(Duration::ZERO).unwrap(), 0.0);
        thread::sleep(Duration::from_millis(10));
        assert!(p.cpu_percent(Duration::ZERO).unwrap() > 0.0);
        assert!(p.cpu_percent(Duration::from_millis(5)).unwrap() > 0.0);
    }

    #[test]
    fn test_iter_and_table_queries() {
        let procs = registry(MockFs::typical_system());
        assert_eq!(procs.kind(), PlatformKind::Linux);
        assert_eq!(procs.pids().unwrap(), vec![1, 1000, 1001]);
        assert!(procs.pid_exists(1001));

        let all: Vec<Process> = procs.iter().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].name().unwrap(), "cat");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_current_process_on_host() {
        let procs = Processes::detect();
        let me = procs.current().unwrap();
        assert!(me.is_running());
        assert_eq!(me.pid(), std::process::id());
        assert!(me.create_time().is_some());
        assert!(!me.name().unwrap().is_empty());
    }
}
