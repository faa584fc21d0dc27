//! Value types returned by per-process queries.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Scheduler state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessStatus {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    TracingStop,
    Zombie,
    Dead,
    WakeKill,
    Waking,
    Idle,
    Parked,
    Unknown,
}

impl ProcessStatus {
    /// Maps the state letter of `/proc/[pid]/stat`.
    pub fn from_state_char(c: char) -> Self {
        match c {
            'R' => Self::Running,
            'S' => Self::Sleeping,
            'D' => Self::DiskSleep,
            'T' => Self::Stopped,
            't' => Self::TracingStop,
            'Z' => Self::Zombie,
            'X' | 'x' => Self::Dead,
            'K' => Self::WakeKill,
            'W' => Self::Waking,
            'I' => Self::Idle,
            'P' => Self::Parked,
            _ => Self::Unknown,
        }
    }
}

/// Real, effective and saved user or group ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Ids {
    pub real: u32,
    pub effective: u32,
    pub saved: u32,
}

/// Accumulated CPU time of a process, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessCpuTimes {
    pub user: f64,
    pub system: f64,
    pub children_user: f64,
    pub children_system: f64,
}

/// Resident and virtual memory, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub rss: u64,
    pub vms: u64,
}

/// Extended memory breakdown from `statm`, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryInfoEx {
    pub rss: u64,
    pub vms: u64,
    pub shared: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dirty: u64,
}

/// One memory mapping (or the sum over all mappings of one path). Bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryMap {
    pub path: String,
    /// Address range and permissions; empty when maps are grouped by path.
    pub address: String,
    pub perms: String,
    pub rss: u64,
    pub size: u64,
    pub pss: u64,
    pub shared_clean: u64,
    pub shared_dirty: u64,
    pub private_clean: u64,
    pub private_dirty: u64,
    pub referenced: u64,
    pub anonymous: u64,
    pub swap: u64,
}

/// A regular file held open by a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenFile {
    pub path: String,
    pub fd: u32,
}

/// CPU time of one thread, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThreadInfo {
    pub id: u32,
    pub user_time: f64,
    pub system_time: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CtxSwitches {
    pub voluntary: u64,
    pub involuntary: u64,
}

/// Process-level I/O counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Resources that can be queried or limited with `rlimit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RLimitResource {
    As,
    Core,
    Cpu,
    Data,
    Fsize,
    Locks,
    Memlock,
    Msgqueue,
    Nice,
    Nofile,
    Nproc,
    Rss,
    Rtprio,
    Rttime,
    Sigpending,
    Stack,
}

/// A soft/hard limit pair. [`RLimit::INFINITY`] means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RLimit {
    pub soft: u64,
    pub hard: u64,
}

impl RLimit {
    pub const INFINITY: u64 = u64::MAX;

    /// Builds a limit, rejecting a soft limit above the hard one.
    pub fn new(soft: u64, hard: u64) -> Result<Self> {
        if soft > hard {
            return Err(Error::invalid(format!(
                "soft limit {} exceeds hard limit {}",
                soft, hard
            )));
        }
        Ok(Self { soft, hard })
    }
}

impl TryFrom<&[u64]> for RLimit {
    type Error = Error;

    /// Accepts exactly `[soft, hard]`.
    fn try_from(values: &[u64]) -> Result<Self> {
        match values {
            [soft, hard] => RLimit::new(*soft, *hard),
            _ => Err(Error::invalid(format!(
                "rlimit expects [soft, hard], got {} value(s)",
                values.len()
            ))),
        }
    }
}

/// I/O scheduling class (`ioprio_set(2)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IoClass {
    None,
    RealTime,
    BestEffort,
    Idle,
}

impl IoClass {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::RealTime,
            2 => Self::BestEffort,
            3 => Self::Idle,
            _ => Self::None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::None => 0,
            Self::RealTime => 1,
            Self::BestEffort => 2,
            Self::Idle => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoPriority {
    pub class: IoClass,
    pub value: u8,
}

impl IoPriority {
    /// Validates the class/value combination.
    ///
    /// Real-time and best-effort accept levels 0..=7; the idle and none
    /// classes carry no level.
    pub fn new(class: IoClass, value: u8) -> Result<Self> {
        match class {
            IoClass::RealTime | IoClass::BestEffort if value > 7 => Err(Error::invalid(format!(
                "ionice value must be in 0..=7, got {}",
                value
            ))),
            IoClass::Idle | IoClass::None if value != 0 => Err(Error::invalid(format!(
                "ionice class {:?} does not take a value (got {})",
                class, value
            ))),
            _ => Ok(Self { class, value }),
        }
    }

    /// Encodes as the kernel's `class << 13 | data`.
    pub fn to_raw(self) -> u32 {
        (self.class.as_raw() << 13) | u32::from(self.value)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self {
            class: IoClass::from_raw(raw >> 13),
            value: (raw & 0x1fff).min(u32::from(u8::MAX)) as u8,
        }
    }
}

impl fmt::Display for IoPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.class, self.value)
    }
}

/// Niceness bounds accepted by `setpriority(2)`.
pub const NICE_RANGE: std::ops::RangeInclusive<i32> = -20..=19;

/// Common signals for [`crate::process::Process::send_signal`].
pub mod signal {
    pub const SIGTERM: i32 = libc::SIGTERM;
    pub const SIGKILL: i32 = libc::SIGKILL;
    pub const SIGSTOP: i32 = libc::SIGSTOP;
    pub const SIGCONT: i32 = libc::SIGCONT;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rlimit_payload_validation() {
        assert_eq!(
            RLimit::try_from(&[1024u64, 4096][..]).unwrap(),
            RLimit {
                soft: 1024,
                hard: 4096
            }
        );
        assert!(RLimit::try_from(&[1024u64][..]).is_err());
        assert!(RLimit::try_from(&[1u64, 2, 3][..]).is_err());
        assert!(RLimit::new(10, 5).is_err());
        assert!(RLimit::new(10, RLimit::INFINITY).is_ok());
    }

    #[test]
    fn test_ionice_validation() {
        assert!(IoPriority::new(IoClass::BestEffort, 7).is_ok());
        assert!(IoPriority::new(IoClass::BestEffort, 8).is_err());
        assert!(IoPriority::new(IoClass::Idle, 0).is_ok());
        assert!(IoPriority::new(IoClass::Idle, 3).is_err());
    }

    #[test]
    fn test_ionice_raw_encoding() {
        let prio = IoPriority::new(IoClass::BestEffort, 4).unwrap();
        assert_eq!(prio.to_raw(), (2 << 13) | 4);
        assert_eq!(IoPriority::from_raw(prio.to_raw()), prio);
        assert_eq!(IoPriority::from_raw(0).class, IoClass::None);
    }

    #[test]
    fn test_status_from_state_char() {
        assert_eq!(ProcessStatus::from_state_char('R'), ProcessStatus::Running);
        assert_eq!(ProcessStatus::from_state_char('Z'), ProcessStatus::Zombie);
        assert_eq!(ProcessStatus::from_state_char('?'), ProcessStatus::Unknown);
    }
}
