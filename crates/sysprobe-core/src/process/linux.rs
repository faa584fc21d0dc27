//! Linux process capability: `/proc/[pid]/*` through [`FileSystem`],
//! native calls through [`OsQuery`].

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::trace;

use crate::collector::procfs::list_pids;
use crate::collector::procfs::net::{Ownership, process_socket_fds, read_connections};
use crate::collector::procfs::parser::{
    ProcStat, ProcStatus, SmapsEntry, UserResolver, parse_cmdline, parse_global_stat,
    parse_proc_io, parse_proc_stat, parse_proc_status, parse_smaps, parse_statm,
};
use crate::collector::traits::FileSystem;
use crate::error::{Error, Result};
use crate::os::OsQuery;
use crate::process::platform::{PlatformKind, ProcessOps, ProcessProvider};
use crate::process::types::{
    CtxSwitches, Ids, IoCounters, IoPriority, MemoryInfo, MemoryInfoEx, MemoryMap, OpenFile,
    ProcessCpuTimes, ProcessStatus, RLimit, RLimitResource, ThreadInfo,
};
use crate::sample::{Connection, ConnectionKind};

/// Kernel `comm` is cut at this many bytes.
const COMM_LEN: usize = 15;

const PASSWD_PATH: &str = "/etc/passwd";

/// State shared by the provider and every process it opens.
struct Procfs<F: FileSystem> {
    fs: F,
    proc_path: String,
    os: Arc<dyn OsQuery>,
    clock_ticks: f64,
    page_size: u64,
    boot_time: OnceCell<f64>,
    users: OnceCell<UserResolver>,
}

impl<F: FileSystem> Procfs<F> {
    fn boot_time(&self) -> Result<f64> {
        self.boot_time
            .get_or_try_init(|| {
                let path = format!("{}/stat", self.proc_path);
                let content = self
                    .fs
                    .read_to_string(Path::new(&path))
                    .map_err(|e| Error::os(format!("read {}", path), e))?;
                let stat = parse_global_stat(&content).map_err(|e| Error::parse(path, e))?;
                Ok(stat.btime as f64)
            })
            .copied()
    }
}

/// [`ProcessProvider`] backed by a proc filesystem.
pub struct LinuxProvider<F: FileSystem> {
    inner: Arc<Procfs<F>>,
}

impl<F: FileSystem + 'static> LinuxProvider<F> {
    /// Creates a provider.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `os` - Native calls used for priorities, limits and signals
    pub fn new(fs: F, proc_path: impl Into<String>, os: Arc<dyn OsQuery>) -> Self {
        let clock_ticks = os.clock_ticks().max(1) as f64;
        let page_size = os.page_size();
        Self {
            inner: Arc::new(Procfs {
                fs,
                proc_path: proc_path.into(),
                os,
                clock_ticks,
                page_size,
                boot_time: OnceCell::new(),
                users: OnceCell::new(),
            }),
        }
    }

    /// Opens the concrete process type, for callers that hold a `LinuxProvider`.
    pub fn process(&self, pid: u32) -> LinuxProcess<F> {
        LinuxProcess {
            pid,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: FileSystem + 'static> ProcessProvider for LinuxProvider<F> {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Linux
    }

    fn open(&self, pid: u32) -> Result<Box<dyn ProcessOps>> {
        Ok(Box::new(self.process(pid)))
    }

    fn pids(&self) -> Result<Vec<u32>> {
        list_pids(&self.inner.fs, &self.inner.proc_path)
            .map_err(|e| Error::os(format!("list {}", self.inner.proc_path), e))
    }

    fn pid_exists(&self, pid: u32) -> bool {
        pid > 0
            && self
                .inner
                .fs
                .exists(Path::new(&format!("{}/{}", self.inner.proc_path, pid)))
    }

    fn cpu_count(&self) -> usize {
        self.inner.os.cpu_count()
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        let users = self.inner.users.get_or_init(|| {
            let mut resolver = UserResolver::new();
            match self.inner.fs.read_to_string(Path::new(PASSWD_PATH)) {
                Ok(content) => resolver.load_from_content(&content),
                Err(e) => trace!(error = %e, "passwd not readable"),
            }
            resolver
        });
        users
            .lookup(uid)
            .map(str::to_string)
            .or_else(|| self.inner.os.user_name(uid))
    }
}

/// One process seen through `/proc/[pid]`.
pub struct LinuxProcess<F: FileSystem> {
    pid: u32,
    inner: Arc<Procfs<F>>,
}

impl<F: FileSystem + 'static> LinuxProcess<F> {
    fn path(&self, file: &str) -> String {
        format!("{}/{}/{}", self.inner.proc_path, self.pid, file)
    }

    fn alive(&self) -> bool {
        self.inner
            .fs
            .exists(Path::new(&format!("{}/{}", self.inner.proc_path, self.pid)))
    }

    /// A missing file of a live process is not a vanished process.
    fn classify(&self, context: String, err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::NotFound && self.alive() {
            return Error::os(context, err);
        }
        Error::from_io(self.pid, context, err)
    }

    fn read(&self, file: &str) -> Result<String> {
        let path = self.path(file);
        self.inner
            .fs
            .read_to_string(Path::new(&path))
            .map_err(|e| self.classify(format!("read {}", path), e))
    }

    fn read_link(&self, file: &str) -> Result<String> {
        let path = self.path(file);
        self.inner
            .fs
            .read_link(Path::new(&path))
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|e| self.classify(format!("readlink {}", path), e))
    }

    fn stat(&self) -> Result<ProcStat> {
        let content = self.read("stat")?;
        parse_proc_stat(&content).map_err(|e| Error::parse(self.path("stat"), e))
    }

    fn proc_status(&self) -> Result<ProcStatus> {
        let content = self.read("status")?;
        parse_proc_status(&content).map_err(|e| Error::parse(self.path("status"), e))
    }

    fn native(&self, context: &str, err: io::Error) -> Error {
        Error::from_io(self.pid, context, err)
    }

    fn ticks(&self, v: u64) -> f64 {
        v as f64 / self.inner.clock_ticks
    }

    /// `cmdline[0]` when it names an existing absolute file.
    fn exe_from_cmdline(&self) -> Option<String> {
        let first = self.cmdline().ok()?.into_iter().next()?;
        (first.starts_with('/') && self.inner.fs.exists(Path::new(&first))).then_some(first)
    }
}

/// Device name of a `tty_nr` from `/proc/[pid]/stat`.
fn tty_name(tty_nr: i32) -> Option<String> {
    if tty_nr <= 0 {
        return None;
    }
    let nr = tty_nr as u32;
    let major = (nr >> 8) & 0xfff;
    let minor = (nr & 0xff) | ((nr >> 12) & 0xfff00);
    match major {
        136..=143 => Some(format!("/dev/pts/{}", (major - 136) * 256 + minor)),
        4 if minor < 64 => Some(format!("/dev/tty{}", minor)),
        4 => Some(format!("/dev/ttyS{}", minor - 64)),
        _ => None,
    }
}

impl<F: FileSystem + 'static> ProcessOps for LinuxProcess<F> {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn create_time(&self) -> Result<f64> {
        let stat = self.stat()?;
        Ok(self.inner.boot_time()? + self.ticks(stat.starttime))
    }

    fn ppid(&self) -> Result<u32> {
        Ok(self.stat()?.ppid)
    }

    /// The kernel keeps 15 bytes of the name; a longer one is recovered
    /// from the command line when it extends the truncated name.
    fn name(&self) -> Result<String> {
        let comm = self.stat()?.comm;
        if comm.len() >= COMM_LEN
            && let Ok(cmdline) = self.cmdline()
            && let Some(first) = cmdline.first()
        {
            let base = first.rsplit('/').next().unwrap_or(first);
            if base.starts_with(&comm) {
                return Ok(base.to_string());
            }
        }
        Ok(comm)
    }

    fn exe(&self) -> Result<String> {
        match self.read_link("exe") {
            Ok(target) => Ok(target
                .strip_suffix(" (deleted)")
                .map(str::to_string)
                .unwrap_or(target)),
            Err(e) if e.is_access_denied() => self.exe_from_cmdline().ok_or(e),
            Err(e) if e.is_os_query() => {
                // Kernel threads and zombies have no executable.
                Ok(self.exe_from_cmdline().unwrap_or_default())
            }
            Err(e) => Err(e),
        }
    }

    fn cmdline(&self) -> Result<Vec<String>> {
        Ok(parse_cmdline(&self.read("cmdline")?))
    }

    fn cwd(&self) -> Result<String> {
        self.read_link("cwd")
    }

    fn status(&self) -> Result<ProcessStatus> {
        Ok(ProcessStatus::from_state_char(self.stat()?.state))
    }

    fn terminal(&self) -> Result<Option<String>> {
        Ok(tty_name(self.stat()?.tty_nr))
    }

    fn uids(&self) -> Result<Ids> {
        let ids = self.proc_status()?.uids;
        Ok(Ids {
            real: ids.real,
            effective: ids.effective,
            saved: ids.saved,
        })
    }

    fn gids(&self) -> Result<Ids> {
        let ids = self.proc_status()?.gids;
        Ok(Ids {
            real: ids.real,
            effective: ids.effective,
            saved: ids.saved,
        })
    }

    fn nice(&self) -> Result<i32> {
        self.inner
            .os
            .get_priority(self.pid)
            .map_err(|e| self.native("getpriority", e))
    }

    fn set_nice(&self, value: i32) -> Result<()> {
        self.inner
            .os
            .set_priority(self.pid, value)
            .map_err(|e| self.native("setpriority", e))
    }

    fn cpu_affinity(&self) -> Result<Vec<usize>> {
        self.inner
            .os
            .get_affinity(self.pid)
            .map_err(|e| self.native("sched_getaffinity", e))
    }

    fn set_cpu_affinity(&self, cpus: &[usize]) -> Result<()> {
        self.inner
            .os
            .set_affinity(self.pid, cpus)
            .map_err(|e| self.native("sched_setaffinity", e))
    }

    fn rlimit(&self, resource: RLimitResource) -> Result<RLimit> {
        self.inner
            .os
            .get_rlimit(self.pid, resource)
            .map_err(|e| self.native("prlimit", e))
    }

    fn set_rlimit(&self, resource: RLimitResource, limit: RLimit) -> Result<()> {
        self.inner
            .os
            .set_rlimit(self.pid, resource, limit)
            .map_err(|e| self.native("prlimit", e))
    }

    fn ionice(&self) -> Result<IoPriority> {
        self.inner
            .os
            .get_ioprio(self.pid)
            .map_err(|e| self.native("ioprio_get", e))
    }

    fn set_ionice(&self, prio: IoPriority) -> Result<()> {
        self.inner
            .os
            .set_ioprio(self.pid, prio)
            .map_err(|e| self.native("ioprio_set", e))
    }

    fn cpu_times(&self) -> Result<ProcessCpuTimes> {
        let stat = self.stat()?;
        Ok(ProcessCpuTimes {
            user: self.ticks(stat.utime),
            system: self.ticks(stat.stime),
            children_user: self.ticks(stat.cutime.max(0) as u64),
            children_system: self.ticks(stat.cstime.max(0) as u64),
        })
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        let stat = self.stat()?;
        Ok(MemoryInfo {
            rss: stat.rss.max(0) as u64 * self.inner.page_size,
            vms: stat.vsize,
        })
    }

    fn memory_info_ex(&self) -> Result<MemoryInfoEx> {
        let content = self.read("statm")?;
        let statm = parse_statm(&content).map_err(|e| Error::parse(self.path("statm"), e))?;
        let page = self.inner.page_size;
        Ok(MemoryInfoEx {
            rss: statm.resident * page,
            vms: statm.size * page,
            shared: statm.shared * page,
            text: statm.text * page,
            lib: statm.lib * page,
            data: statm.data * page,
            dirty: statm.dirty * page,
        })
    }

    fn open_files(&self) -> Result<Vec<OpenFile>> {
        let dir = self.path("fd");
        let entries = self
            .inner
            .fs
            .read_dir(Path::new(&dir))
            .map_err(|e| self.classify(format!("list {}", dir), e))?;

        let mut files = Vec::new();
        for entry in entries {
            let Some(fd) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let target = match self.inner.fs.read_link(&entry) {
                Ok(target) => target.to_string_lossy().into_owned(),
                // Closed between listing and reading.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(self.classify(format!("readlink {}", entry.display()), e)),
            };
            if target.starts_with('/') && !target.starts_with("/dev/") {
                files.push(OpenFile { path: target, fd });
            }
        }
        files.sort_by_key(|f| f.fd);
        Ok(files)
    }

    fn num_fds(&self) -> Result<usize> {
        let dir = self.path("fd");
        self.inner
            .fs
            .read_dir(Path::new(&dir))
            .map(|entries| entries.len())
            .map_err(|e| self.classify(format!("list {}", dir), e))
    }

    fn memory_maps(&self, grouped: bool) -> Result<Vec<MemoryMap>> {
        let content = self.read("smaps")?;
        let entries = parse_smaps(&content).map_err(|e| Error::parse(self.path("smaps"), e))?;

        let to_map = |e: &SmapsEntry| {
            let kb = |key: &str| e.get(key) * 1024;
            MemoryMap {
                path: if e.path.is_empty() {
                    "[anon]".to_string()
                } else {
                    e.path.clone()
                },
                address: e.address.clone(),
                perms: e.perms.clone(),
                rss: kb("Rss"),
                size: kb("Size"),
                pss: kb("Pss"),
                shared_clean: kb("Shared_Clean"),
                shared_dirty: kb("Shared_Dirty"),
                private_clean: kb("Private_Clean"),
                private_dirty: kb("Private_Dirty"),
                referenced: kb("Referenced"),
                anonymous: kb("Anonymous"),
                swap: kb("Swap"),
            }
        };

        if !grouped {
            return Ok(entries.iter().map(to_map).collect());
        }

        let mut by_path: BTreeMap<String, MemoryMap> = BTreeMap::new();
        for map in entries.iter().map(to_map) {
            let slot = by_path.entry(map.path.clone()).or_insert_with(|| MemoryMap {
                path: map.path.clone(),
                ..Default::default()
            });
            slot.rss += map.rss;
            slot.size += map.size;
            slot.pss += map.pss;
            slot.shared_clean += map.shared_clean;
            slot.shared_dirty += map.shared_dirty;
            slot.private_clean += map.private_clean;
            slot.private_dirty += map.private_dirty;
            slot.referenced += map.referenced;
            slot.anonymous += map.anonymous;
            slot.swap += map.swap;
        }
        Ok(by_path.into_values().collect())
    }

    fn threads(&self) -> Result<Vec<ThreadInfo>> {
        let dir = self.path("task");
        let tasks = self
            .inner
            .fs
            .read_dir(Path::new(&dir))
            .map_err(|e| self.classify(format!("list {}", dir), e))?;

        let mut threads = Vec::new();
        for task in tasks {
            let Some(tid) = task
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let stat_path = task.join("stat");
            let content = match self.inner.fs.read_to_string(&stat_path) {
                Ok(content) => content,
                // Thread exited while listing.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(self.classify(format!("read {}", stat_path.display()), e));
                }
            };
            let stat = parse_proc_stat(&content)
                .map_err(|e| Error::parse(stat_path.display().to_string(), e))?;
            threads.push(ThreadInfo {
                id: tid,
                user_time: self.ticks(stat.utime),
                system_time: self.ticks(stat.stime),
            });
        }
        threads.sort_by_key(|t| t.id);
        Ok(threads)
    }

    fn num_threads(&self) -> Result<usize> {
        Ok(self.stat()?.num_threads.max(0) as usize)
    }

    fn num_ctx_switches(&self) -> Result<CtxSwitches> {
        let status = self.proc_status()?;
        Ok(CtxSwitches {
            voluntary: status.voluntary_ctxt_switches,
            involuntary: status.nonvoluntary_ctxt_switches,
        })
    }

    fn io_counters(&self) -> Result<IoCounters> {
        let content = self.read("io")?;
        let io = parse_proc_io(&content).map_err(|e| Error::parse(self.path("io"), e))?;
        Ok(IoCounters {
            read_count: io.syscr,
            write_count: io.syscw,
            read_bytes: io.read_bytes,
            write_bytes: io.write_bytes,
        })
    }

    fn connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        let fds = process_socket_fds(&self.inner.fs, &self.inner.proc_path, self.pid)
            .map_err(|e| self.classify(format!("list {}", self.path("fd")), e))?;
        if fds.is_empty() {
            return Ok(Vec::new());
        }
        read_connections(
            &self.inner.fs,
            &self.inner.proc_path,
            kind,
            &Ownership::Process {
                pid: self.pid,
                fds: &fds,
            },
        )
    }

    fn send_signal(&self, signal: i32) -> Result<()> {
        self.inner
            .os
            .send_signal(self.pid, signal)
            .map_err(|e| self.native("kill", e))
    }
}
