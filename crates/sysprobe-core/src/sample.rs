//! Typed samples produced by the samplers.
//!
//! All values are already normalized: seconds for CPU time, bytes for
//! memory and I/O volumes.

use std::fmt;
use std::net::SocketAddr;
use std::ops::AddAssign;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;

/// System-wide (or per-core) CPU time buckets, in seconds.
///
/// `steal`, `guest` and `guest_nice` stay `None` when the kernel did not
/// report them; they are never synthesized as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuTimes {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: Option<f64>,
    pub guest: Option<f64>,
    pub guest_nice: Option<f64>,
}

impl CpuTimes {
    /// Sum of every reported field.
    pub fn total(&self) -> f64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal.unwrap_or(0.0)
            + self.guest.unwrap_or(0.0)
            + self.guest_nice.unwrap_or(0.0)
    }

    /// Time spent doing anything but idling.
    pub fn busy(&self) -> f64 {
        self.total() - self.idle
    }

    /// Field values in the canonical order of [`CpuField::ALL`], unset as 0.
    pub fn values(&self) -> [f64; 10] {
        CpuField::ALL.map(|f| self.get(f))
    }

    pub fn get(&self, field: CpuField) -> f64 {
        match field {
            CpuField::User => self.user,
            CpuField::Nice => self.nice,
            CpuField::System => self.system,
            CpuField::Idle => self.idle,
            CpuField::Iowait => self.iowait,
            CpuField::Irq => self.irq,
            CpuField::Softirq => self.softirq,
            CpuField::Steal => self.steal.unwrap_or(0.0),
            CpuField::Guest => self.guest.unwrap_or(0.0),
            CpuField::GuestNice => self.guest_nice.unwrap_or(0.0),
        }
    }
}

/// The ten `/proc/stat` CPU buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuField {
    User,
    Nice,
    System,
    Idle,
    Iowait,
    Irq,
    Softirq,
    Steal,
    Guest,
    GuestNice,
}

impl CpuField {
    pub const ALL: [CpuField; 10] = [
        CpuField::User,
        CpuField::Nice,
        CpuField::System,
        CpuField::Idle,
        CpuField::Iowait,
        CpuField::Irq,
        CpuField::Softirq,
        CpuField::Steal,
        CpuField::Guest,
        CpuField::GuestNice,
    ];
}

/// Per-field CPU utilization, in percent of the elapsed interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuTimesPercent {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl CpuTimesPercent {
    pub fn from_values(v: [f64; 10]) -> Self {
        Self {
            user: v[0],
            nice: v[1],
            system: v[2],
            idle: v[3],
            iowait: v[4],
            irq: v[5],
            softirq: v[6],
            steal: v[7],
            guest: v[8],
            guest_nice: v[9],
        }
    }

    pub fn values(&self) -> [f64; 10] {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
    }
}

/// System memory, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VirtualMemory {
    pub total: u64,
    pub available: u64,
    pub percent: f64,
    pub used: u64,
    pub free: u64,
    pub active: u64,
    pub inactive: u64,
    pub buffers: u64,
    pub cached: u64,
}

/// Swap usage, in bytes. `sin`/`sout` are cumulative bytes swapped in/out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SwapMemory {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
    pub sin: u64,
    pub sout: u64,
}

/// A mounted filesystem backed by a real device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskPartition {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub opts: String,
}

/// Space usage of a mount point, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

/// Cumulative disk activity. Times are in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskIoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_time: u64,
    pub write_time: u64,
}

impl AddAssign<&DiskIoCounters> for DiskIoCounters {
    fn add_assign(&mut self, other: &DiskIoCounters) {
        self.read_count += other.read_count;
        self.write_count += other.write_count;
        self.read_bytes += other.read_bytes;
        self.write_bytes += other.write_bytes;
        self.read_time += other.read_time;
        self.write_time += other.write_time;
    }
}

/// Cumulative network interface counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetIoCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: u64,
    pub dropout: u64,
}

impl AddAssign<&NetIoCounters> for NetIoCounters {
    fn add_assign(&mut self, other: &NetIoCounters) {
        self.bytes_sent += other.bytes_sent;
        self.bytes_recv += other.bytes_recv;
        self.packets_sent += other.packets_sent;
        self.packets_recv += other.packets_recv;
        self.errin += other.errin;
        self.errout += other.errout;
        self.dropin += other.dropin;
        self.dropout += other.dropout;
    }
}

/// Field-wise sum of per-device counters.
pub fn sum_counters<'a, T, I>(items: I) -> T
where
    T: Default + AddAssign<&'a T> + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut total = T::default();
    for item in items {
        total += item;
    }
    total
}

/// A logged-in user session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub name: String,
    pub terminal: Option<String>,
    pub host: String,
    /// Login time, seconds since the epoch.
    pub started: i64,
}

/// Kernel identification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub kernel: String,
    pub version: String,
    pub arch: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SocketFamily {
    Inet,
    Inet6,
    Unix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SocketType {
    Stream,
    Datagram,
    SeqPacket,
}

/// TCP connection state; `None` for connectionless sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    None,
}

impl ConnectionStatus {
    /// Maps the kernel's `st` column of `/proc/net/tcp*`.
    pub fn from_tcp_state(code: u8) -> Self {
        match code {
            0x01 => Self::Established,
            0x02 => Self::SynSent,
            0x03 => Self::SynRecv,
            0x04 => Self::FinWait1,
            0x05 => Self::FinWait2,
            0x06 => Self::TimeWait,
            0x07 => Self::Close,
            0x08 => Self::CloseWait,
            0x09 => Self::LastAck,
            0x0A => Self::Listen,
            0x0B => Self::Closing,
            _ => Self::None,
        }
    }
}

/// Socket endpoint: an inet address or a unix socket path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Endpoint {
    Inet(SocketAddr),
    Unix(String),
}

/// A socket attributed to a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub fd: Option<u32>,
    pub family: SocketFamily,
    pub socket_type: SocketType,
    pub local: Option<Endpoint>,
    pub remote: Option<Endpoint>,
    pub status: ConnectionStatus,
    pub pid: Option<u32>,
    pub inode: u64,
}

/// Which connection tables to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// tcp4, tcp6, udp4 and udp6.
    #[default]
    Inet,
    Inet4,
    Inet6,
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
    Unix,
    All,
}

/// One `/proc/net/<table>` source and how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTable {
    pub file: &'static str,
    pub family: SocketFamily,
    pub socket_type: SocketType,
}

const TCP4: ConnectionTable = ConnectionTable {
    file: "tcp",
    family: SocketFamily::Inet,
    socket_type: SocketType::Stream,
};
const TCP6: ConnectionTable = ConnectionTable {
    file: "tcp6",
    family: SocketFamily::Inet6,
    socket_type: SocketType::Stream,
};
const UDP4: ConnectionTable = ConnectionTable {
    file: "udp",
    family: SocketFamily::Inet,
    socket_type: SocketType::Datagram,
};
const UDP6: ConnectionTable = ConnectionTable {
    file: "udp6",
    family: SocketFamily::Inet6,
    socket_type: SocketType::Datagram,
};
const UNIX: ConnectionTable = ConnectionTable {
    file: "unix",
    family: SocketFamily::Unix,
    socket_type: SocketType::Stream,
};

impl ConnectionKind {
    pub fn tables(self) -> &'static [ConnectionTable] {
        match self {
            Self::Inet => &[TCP4, TCP6, UDP4, UDP6],
            Self::Inet4 => &[TCP4, UDP4],
            Self::Inet6 => &[TCP6, UDP6],
            Self::Tcp => &[TCP4, TCP6],
            Self::Tcp4 => &[TCP4],
            Self::Tcp6 => &[TCP6],
            Self::Udp => &[UDP4, UDP6],
            Self::Udp4 => &[UDP4],
            Self::Udp6 => &[UDP6],
            Self::Unix => &[UNIX],
            Self::All => &[TCP4, TCP6, UDP4, UDP6, UNIX],
        }
    }
}

impl FromStr for ConnectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "inet" => Self::Inet,
            "inet4" => Self::Inet4,
            "inet6" => Self::Inet6,
            "tcp" => Self::Tcp,
            "tcp4" => Self::Tcp4,
            "tcp6" => Self::Tcp6,
            "udp" => Self::Udp,
            "udp4" => Self::Udp4,
            "udp6" => Self::Udp6,
            "unix" => Self::Unix,
            "all" => Self::All,
            other => {
                return Err(Error::invalid(format!(
                    "unsupported connection kind {:?}",
                    other
                )));
            }
        })
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inet => "inet",
            Self::Inet4 => "inet4",
            Self::Inet6 => "inet6",
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::Unix => "unix",
            Self::All => "all",
        };
        f.write_str(name)
    }
}
