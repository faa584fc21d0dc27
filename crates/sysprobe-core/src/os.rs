//! Native system-call boundary.
//!
//! `OsQuery` is the capability through which the library reaches the kernel
//! for anything that is not a pseudo-file read. `NativeOs` implements it with
//! `libc`; tests substitute scripted doubles. Calls that the host kernel does
//! not offer return `io::ErrorKind::Unsupported`, which surfaces as
//! `Error::NotImplemented`.

use std::ffi::{CStr, CString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::process::types::{IoPriority, RLimit, RLimitResource};
use crate::rates::usage_percent;
use crate::sample::{DiskUsage, SystemInfo, User};

/// Native OS queries. Every call acquires and releases its resources before
/// returning.
pub trait OsQuery: Send + Sync {
    /// Kernel tick frequency (`USER_HZ`).
    fn clock_ticks(&self) -> u64;

    fn page_size(&self) -> u64;

    /// Number of configured CPUs; affinity indices must be below it.
    fn cpu_count(&self) -> usize;

    fn get_priority(&self, pid: u32) -> io::Result<i32>;

    fn set_priority(&self, pid: u32, value: i32) -> io::Result<()>;

    fn get_affinity(&self, pid: u32) -> io::Result<Vec<usize>>;

    fn set_affinity(&self, pid: u32, cpus: &[usize]) -> io::Result<()>;

    fn get_rlimit(&self, pid: u32, resource: RLimitResource) -> io::Result<RLimit>;

    fn set_rlimit(&self, pid: u32, resource: RLimitResource, limit: RLimit) -> io::Result<()>;

    fn get_ioprio(&self, pid: u32) -> io::Result<IoPriority>;

    fn set_ioprio(&self, pid: u32, prio: IoPriority) -> io::Result<()>;

    fn send_signal(&self, pid: u32, signal: i32) -> io::Result<()>;

    /// True if a process with this pid exists, even if we may not signal it.
    fn pid_exists(&self, pid: u32) -> bool;

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage>;

    fn users(&self) -> io::Result<Vec<User>>;

    fn system_info(&self) -> io::Result<SystemInfo>;

    fn user_name(&self, uid: u32) -> Option<String>;
}

/// `OsQuery` backed by the real kernel through `libc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOs;

impl NativeOs {
    pub fn new() -> Self {
        Self
    }
}

fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} is not available on this platform", what),
    )
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn sysconf(name: libc::c_int) -> Option<u64> {
    // SAFETY: sysconf only reads a configuration value.
    let v = unsafe { libc::sysconf(name) };
    (v > 0).then_some(v as u64)
}

fn c_chars_to_string(chars: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn clear_errno() {
    // SAFETY: __errno_location returns the calling thread's errno slot.
    unsafe { *libc::__errno_location() = 0 }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn clear_errno() {
    // SAFETY: __error returns the calling thread's errno slot.
    unsafe { *libc::__error() = 0 }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RawResource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type RawResource = libc::c_int;

#[cfg(target_os = "linux")]
fn raw_resource(resource: RLimitResource) -> Option<RawResource> {
    Some(match resource {
        RLimitResource::As => libc::RLIMIT_AS,
        RLimitResource::Core => libc::RLIMIT_CORE,
        RLimitResource::Cpu => libc::RLIMIT_CPU,
        RLimitResource::Data => libc::RLIMIT_DATA,
        RLimitResource::Fsize => libc::RLIMIT_FSIZE,
        RLimitResource::Locks => libc::RLIMIT_LOCKS,
        RLimitResource::Memlock => libc::RLIMIT_MEMLOCK,
        RLimitResource::Msgqueue => libc::RLIMIT_MSGQUEUE,
        RLimitResource::Nice => libc::RLIMIT_NICE,
        RLimitResource::Nofile => libc::RLIMIT_NOFILE,
        RLimitResource::Nproc => libc::RLIMIT_NPROC,
        RLimitResource::Rss => libc::RLIMIT_RSS,
        RLimitResource::Rtprio => libc::RLIMIT_RTPRIO,
        RLimitResource::Rttime => libc::RLIMIT_RTTIME,
        RLimitResource::Sigpending => libc::RLIMIT_SIGPENDING,
        RLimitResource::Stack => libc::RLIMIT_STACK,
    })
}

#[cfg(not(target_os = "linux"))]
fn raw_resource(resource: RLimitResource) -> Option<RawResource> {
    match resource {
        RLimitResource::As => Some(libc::RLIMIT_AS),
        RLimitResource::Core => Some(libc::RLIMIT_CORE),
        RLimitResource::Cpu => Some(libc::RLIMIT_CPU),
        RLimitResource::Data => Some(libc::RLIMIT_DATA),
        RLimitResource::Fsize => Some(libc::RLIMIT_FSIZE),
        RLimitResource::Memlock => Some(libc::RLIMIT_MEMLOCK),
        RLimitResource::Nofile => Some(libc::RLIMIT_NOFILE),
        RLimitResource::Nproc => Some(libc::RLIMIT_NPROC),
        RLimitResource::Rss => Some(libc::RLIMIT_RSS),
        RLimitResource::Stack => Some(libc::RLIMIT_STACK),
        _ => None,
    }
}

fn to_rlim(v: u64) -> libc::rlim_t {
    if v == RLimit::INFINITY {
        libc::RLIM_INFINITY
    } else {
        v as libc::rlim_t
    }
}

fn from_rlim(v: libc::rlim_t) -> u64 {
    if v == libc::RLIM_INFINITY {
        RLimit::INFINITY
    } else {
        v
    }
}

/// A pid above `pid_t::MAX` would turn negative and address a process group.
fn raw_pid(pid: u32) -> io::Result<libc::pid_t> {
    libc::pid_t::try_from(pid).map_err(|_| io::Error::from_raw_os_error(libc::ESRCH))
}

/// `ioprio_get`/`ioprio_set` target selector for a single process.
#[cfg(target_os = "linux")]
const IOPRIO_WHO_PROCESS: libc::c_long = 1;

impl OsQuery for NativeOs {
    fn clock_ticks(&self) -> u64 {
        sysconf(libc::_SC_CLK_TCK).unwrap_or(100)
    }

    fn page_size(&self) -> u64 {
        sysconf(libc::_SC_PAGESIZE).unwrap_or(4096)
    }

    fn cpu_count(&self) -> usize {
        sysconf(libc::_SC_NPROCESSORS_CONF).unwrap_or(1) as usize
    }

    fn get_priority(&self, pid: u32) -> io::Result<i32> {
        // getpriority may legitimately return -1, so errno is the only signal.
        clear_errno();
        // SAFETY: plain syscall wrapper with scalar arguments.
        let value = unsafe { libc::getpriority(libc::PRIO_PROCESS, pid as libc::id_t) };
        if value == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error().unwrap_or(0) != 0 {
                return Err(err);
            }
        }
        Ok(value)
    }

    fn set_priority(&self, pid: u32, value: i32) -> io::Result<()> {
        // SAFETY: plain syscall wrapper with scalar arguments.
        check(unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, value) })
    }

    #[cfg(target_os = "linux")]
    fn get_affinity(&self, pid: u32) -> io::Result<Vec<usize>> {
        // SAFETY: cpu_set_t is plain data; the kernel fills at most its size.
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        check(unsafe {
            libc::sched_getaffinity(
                raw_pid(pid)?,
                std::mem::size_of::<libc::cpu_set_t>(),
                &mut set,
            )
        })?;
        Ok((0..libc::CPU_SETSIZE as usize)
            .filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &set) })
            .collect())
    }

    #[cfg(not(target_os = "linux"))]
    fn get_affinity(&self, _pid: u32) -> io::Result<Vec<usize>> {
        Err(unsupported("cpu affinity"))
    }

    #[cfg(target_os = "linux")]
    fn set_affinity(&self, pid: u32, cpus: &[usize]) -> io::Result<()> {
        // SAFETY: see get_affinity; CPU_SET is bounds-checked against CPU_SETSIZE.
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        for &cpu in cpus {
            if cpu >= libc::CPU_SETSIZE as usize {
                return Err(io::Error::from_raw_os_error(libc::EINVAL));
            }
            unsafe { libc::CPU_SET(cpu, &mut set) };
        }
        check(unsafe {
            libc::sched_setaffinity(
                raw_pid(pid)?,
                std::mem::size_of::<libc::cpu_set_t>(),
                &set,
            )
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn set_affinity(&self, _pid: u32, _cpus: &[usize]) -> io::Result<()> {
        Err(unsupported("cpu affinity"))
    }

    #[cfg(target_os = "linux")]
    fn get_rlimit(&self, pid: u32, resource: RLimitResource) -> io::Result<RLimit> {
        let raw = raw_resource(resource).ok_or_else(|| unsupported("rlimit resource"))?;
        let mut old = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: a null new-limit pointer makes prlimit a pure read into `old`.
        check(unsafe { libc::prlimit(raw_pid(pid)?, raw, std::ptr::null(), &mut old) })?;
        Ok(RLimit {
            soft: from_rlim(old.rlim_cur),
            hard: from_rlim(old.rlim_max),
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn get_rlimit(&self, pid: u32, resource: RLimitResource) -> io::Result<RLimit> {
        if pid != std::process::id() {
            return Err(unsupported("rlimit of another process"));
        }
        let raw = raw_resource(resource).ok_or_else(|| unsupported("rlimit resource"))?;
        let mut old = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: getrlimit writes into the provided struct only.
        check(unsafe { libc::getrlimit(raw, &mut old) })?;
        Ok(RLimit {
            soft: from_rlim(old.rlim_cur),
            hard: from_rlim(old.rlim_max),
        })
    }

    #[cfg(target_os = "linux")]
    fn set_rlimit(&self, pid: u32, resource: RLimitResource, limit: RLimit) -> io::Result<()> {
        let raw = raw_resource(resource).ok_or_else(|| unsupported("rlimit resource"))?;
        let new = libc::rlimit {
            rlim_cur: to_rlim(limit.soft),
            rlim_max: to_rlim(limit.hard),
        };
        // SAFETY: `new` outlives the call; the old-limit pointer is null.
        check(unsafe { libc::prlimit(raw_pid(pid)?, raw, &new, std::ptr::null_mut()) })
    }

    #[cfg(not(target_os = "linux"))]
    fn set_rlimit(&self, pid: u32, resource: RLimitResource, limit: RLimit) -> io::Result<()> {
        if pid != std::process::id() {
            return Err(unsupported("rlimit of another process"));
        }
        let raw = raw_resource(resource).ok_or_else(|| unsupported("rlimit resource"))?;
        let new = libc::rlimit {
            rlim_cur: to_rlim(limit.soft),
            rlim_max: to_rlim(limit.hard),
        };
        // SAFETY: setrlimit only reads the provided struct.
        check(unsafe { libc::setrlimit(raw, &new) })
    }

    #[cfg(target_os = "linux")]
    fn get_ioprio(&self, pid: u32) -> io::Result<IoPriority> {
        // SAFETY: ioprio_get takes two scalar arguments.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_ioprio_get,
                IOPRIO_WHO_PROCESS,
                pid as libc::c_long,
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(IoPriority::from_raw(ret as u32))
    }

    #[cfg(not(target_os = "linux"))]
    fn get_ioprio(&self, _pid: u32) -> io::Result<IoPriority> {
        Err(unsupported("ionice"))
    }

    #[cfg(target_os = "linux")]
    fn set_ioprio(&self, pid: u32, prio: IoPriority) -> io::Result<()> {
        // SAFETY: ioprio_set takes three scalar arguments.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_ioprio_set,
                IOPRIO_WHO_PROCESS,
                pid as libc::c_long,
                prio.to_raw() as libc::c_long,
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn set_ioprio(&self, _pid: u32, _prio: IoPriority) -> io::Result<()> {
        Err(unsupported("ionice"))
    }

    fn send_signal(&self, pid: u32, signal: i32) -> io::Result<()> {
        if pid == 0 {
            // kill(0, ...) would target our whole process group.
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let pid = raw_pid(pid)?;
        // SAFETY: plain syscall wrapper with scalar arguments.
        check(unsafe { libc::kill(pid, signal) })
    }

    fn pid_exists(&self, pid: u32) -> bool {
        let Ok(pid) = raw_pid(pid) else {
            return false;
        };
        if pid == 0 {
            return false;
        }
        // SAFETY: signal 0 performs the permission/existence check only.
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        // SAFETY: statvfs fills the zeroed struct for a NUL-terminated path.
        let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
        check(unsafe { libc::statvfs(c_path.as_ptr(), &mut st) })?;

        let frsize = st.f_frsize as u64;
        let total = st.f_blocks as u64 * frsize;
        let free = st.f_bavail as u64 * frsize;
        let used = (st.f_blocks as u64).saturating_sub(st.f_bfree as u64) * frsize;
        // Reserved root blocks are neither free nor used, matching df.
        Ok(DiskUsage {
            total,
            used,
            free,
            percent: usage_percent(used as f64, (used + free) as f64, 1),
        })
    }

    fn users(&self) -> io::Result<Vec<User>> {
        let mut users = Vec::new();
        // SAFETY: the utmpx iterator is process-global; entries are copied out
        // before the next getutxent call and the database is closed on exit.
        unsafe {
            libc::setutxent();
            loop {
                let entry = libc::getutxent();
                if entry.is_null() {
                    break;
                }
                let entry = &*entry;
                if entry.ut_type != libc::USER_PROCESS {
                    continue;
                }
                let host = c_chars_to_string(&entry.ut_host);
                let terminal = c_chars_to_string(&entry.ut_line);
                users.push(User {
                    name: c_chars_to_string(&entry.ut_user),
                    terminal: (!terminal.is_empty()).then_some(terminal),
                    host: if host == ":0" || host == ":0.0" {
                        "localhost".to_string()
                    } else {
                        host
                    },
                    started: entry.ut_tv.tv_sec as i64,
                });
            }
            libc::endutxent();
        }
        Ok(users)
    }

    fn system_info(&self) -> io::Result<SystemInfo> {
        // SAFETY: uname fills the zeroed struct.
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        check(unsafe { libc::uname(&mut uts) })?;
        Ok(SystemInfo {
            os: c_chars_to_string(&uts.sysname),
            kernel: c_chars_to_string(&uts.release),
            version: c_chars_to_string(&uts.version),
            arch: c_chars_to_string(&uts.machine),
            hostname: c_chars_to_string(&uts.nodename),
        })
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        let mut buf = vec![0 as libc::c_char; 4096];
        // SAFETY: getpwuid_r writes into `pwd` and `buf` only; `result` is
        // either null or points at `pwd`.
        unsafe {
            let mut pwd: libc::passwd = std::mem::zeroed();
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            let rc = libc::getpwuid_r(
                uid as libc::uid_t,
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            );
            if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
                return None;
            }
            Some(CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned())
        }
    }
}


/// Scripted [`OsQuery`] for unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use crate::process::types::IoClass;

    /// Remembers every mutation so a later read echoes it back.
    ///
    /// Pids in `denied` fail with `EPERM`, pids in `gone` with `ESRCH`.
    pub struct FakeOs {
        pub cpus: usize,
        pub denied: HashSet<u32>,
        pub gone: HashSet<u32>,
        nice: Mutex<HashMap<u32, i32>>,
        affinity: Mutex<HashMap<u32, Vec<usize>>>,
        rlimits: Mutex<HashMap<(u32, RLimitResource), RLimit>>,
        ioprio: Mutex<HashMap<u32, IoPriority>>,
        signals: Mutex<Vec<(u32, i32)>>,
    }

    impl FakeOs {
        pub fn new() -> Self {
            Self {
                cpus: 4,
                denied: HashSet::new(),
                gone: HashSet::new(),
                nice: Mutex::default(),
                affinity: Mutex::default(),
                rlimits: Mutex::default(),
                ioprio: Mutex::default(),
                signals: Mutex::default(),
            }
        }

        pub fn deny(mut self, pid: u32) -> Self {
            self.denied.insert(pid);
            self
        }

        pub fn signals(&self) -> Vec<(u32, i32)> {
            self.signals.lock().unwrap().clone()
        }

        fn check(&self, pid: u32) -> io::Result<()> {
            if self.gone.contains(&pid) {
                return Err(io::Error::from_raw_os_error(libc::ESRCH));
            }
            if self.denied.contains(&pid) {
                return Err(io::Error::from_raw_os_error(libc::EPERM));
            }
            Ok(())
        }
    }

    impl OsQuery for FakeOs {
        fn clock_ticks(&self) -> u64 {
            100
        }

        fn page_size(&self) -> u64 {
            4096
        }

        fn cpu_count(&self) -> usize {
            self.cpus
        }

        fn get_priority(&self, pid: u32) -> io::Result<i32> {
            self.check(pid)?;
            Ok(self.nice.lock().unwrap().get(&pid).copied().unwrap_or(0))
        }

        fn set_priority(&self, pid: u32, value: i32) -> io::Result<()> {
            self.check(pid)?;
            self.nice.lock().unwrap().insert(pid, value);
            Ok(())
        }

        fn get_affinity(&self, pid: u32) -> io::Result<Vec<usize>> {
            self.check(pid)?;
            Ok(self
                .affinity
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .unwrap_or_else(|| (0..self.cpus).collect()))
        }

        fn set_affinity(&self, pid: u32, cpus: &[usize]) -> io::Result<()> {
            self.check(pid)?;
            let mut sorted = cpus.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            self.affinity.lock().unwrap().insert(pid, sorted);
            Ok(())
        }

        fn get_rlimit(&self, pid: u32, resource: RLimitResource) -> io::Result<RLimit> {
            self.check(pid)?;
            Ok(self
                .rlimits
                .lock()
                .unwrap()
                .get(&(pid, resource))
                .copied()
                .unwrap_or(RLimit {
                    soft: 1024,
                    hard: 4096,
                }))
        }

        fn set_rlimit(&self, pid: u32, resource: RLimitResource, limit: RLimit) -> io::Result<()> {
            self.check(pid)?;
            self.rlimits.lock().unwrap().insert((pid, resource), limit);
            Ok(())
        }

        fn get_ioprio(&self, pid: u32) -> io::Result<IoPriority> {
            self.check(pid)?;
            Ok(self
                .ioprio
                .lock()
                .unwrap()
                .get(&pid)
                .copied()
                .unwrap_or(IoPriority {
                    class: IoClass::BestEffort,
                    value: 4,
                }))
        }

        fn set_ioprio(&self, pid: u32, prio: IoPriority) -> io::Result<()> {
            self.check(pid)?;
            self.ioprio.lock().unwrap().insert(pid, prio);
            Ok(())
        }

        fn send_signal(&self, pid: u32, signal: i32) -> io::Result<()> {
            self.check(pid)?;
            self.signals.lock().unwrap().push((pid, signal));
            Ok(())
        }

        fn pid_exists(&self, pid: u32) -> bool {
            pid > 0 && !self.gone.contains(&pid)
        }

        fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
            if path != Path::new("/") {
                return Err(io::Error::from_raw_os_error(libc::ENOENT));
            }
            Ok(DiskUsage {
                total: 100 << 30,
                used: 25 << 30,
                free: 75 << 30,
                percent: 25.0,
            })
        }

        fn users(&self) -> io::Result<Vec<User>> {
            Ok(vec![User {
                name: "user".to_string(),
                terminal: Some("pts/0".to_string()),
                host: "localhost".to_string(),
                started: 1_700_000_100,
            }])
        }

        fn system_info(&self) -> io::Result<SystemInfo> {
            Ok(SystemInfo {
                os: "Linux".to_string(),
                kernel: "6.1.0".to_string(),
                version: "#1 SMP".to_string(),
                arch: "x86_64".to_string(),
                hostname: "testhost".to_string(),
            })
        }

        fn user_name(&self, uid: u32) -> Option<String> {
            match uid {
                0 => Some("root".to_string()),
                1000 => Some("user".to_string()),
                _ => None,
            }
        }
    }
}
