//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. Values are returned in kernel units (ticks, kB,
//! sectors, pages); unit normalization happens in the samplers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parsed data from `/proc/[pid]/stat`.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub pgrp: i32,
    pub session: i32,
    pub tty_nr: i32,
    pub minflt: u64,
    pub majflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub cutime: i64,
    pub cstime: i64,
    pub priority: i32,
    pub nice: i32,
    pub num_threads: i32,
    pub starttime: u64,
    pub vsize: u64,
    pub rss: i64,
    pub processor: i32,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The format is tricky because the comm field can contain spaces and parentheses.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();

    // Everything up to rss (index 21) is present on every kernel we care about.
    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let parse_field = |idx: usize, name: &str| -> Result<i64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    let parse_field_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: parse_field(1, "ppid")? as u32,
        pgrp: parse_field(2, "pgrp")? as i32,
        session: parse_field(3, "session")? as i32,
        tty_nr: parse_field(4, "tty_nr")? as i32,
        minflt: parse_field_u64(7, "minflt")?,
        majflt: parse_field_u64(9, "majflt")?,
        utime: parse_field_u64(11, "utime")?,
        stime: parse_field_u64(12, "stime")?,
        cutime: parse_field(13, "cutime")?,
        cstime: parse_field(14, "cstime")?,
        priority: parse_field(15, "priority")? as i32,
        nice: parse_field(16, "nice")? as i32,
        num_threads: parse_field(17, "num_threads")? as i32,
        starttime: parse_field_u64(19, "starttime")?,
        vsize: parse_field_u64(20, "vsize")?,
        rss: parse_field(21, "rss")?,
        processor: fields.get(36).and_then(|s| s.parse().ok()).unwrap_or(0),
    })
}

/// Real, effective and saved ids from a `Uid:`/`Gid:` status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdTriple {
    pub real: u32,
    pub effective: u32,
    pub saved: u32,
}

/// Parsed data from `/proc/[pid]/status`.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    pub name: String,
    pub pid: u32,
    pub ppid: u32,
    pub uids: IdTriple,
    pub gids: IdTriple,
    pub threads: u32,
    pub vm_rss: u64,
    pub vm_size: u64,
    pub vm_swap: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    if !fields.contains_key("Name") {
        return Err(ParseError::new("missing Name in status"));
    }

    let parse_num = |key: &str| -> u64 {
        fields
            .get(key)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    // Uid and Gid have format: real effective saved fs
    let parse_ids = |key: &str| -> IdTriple {
        let parts: Vec<u32> = fields
            .get(key)
            .map(|s| s.split_whitespace().filter_map(|p| p.parse().ok()).collect())
            .unwrap_or_default();
        IdTriple {
            real: parts.first().copied().unwrap_or(0),
            effective: parts.get(1).copied().unwrap_or(0),
            saved: parts.get(2).copied().unwrap_or(0),
        }
    };

    Ok(ProcStatus {
        name: fields.get("Name").unwrap_or(&"").to_string(),
        pid: parse_num("Pid") as u32,
        ppid: parse_num("PPid") as u32,
        uids: parse_ids("Uid"),
        gids: parse_ids("Gid"),
        threads: parse_num("Threads") as u32,
        vm_rss: parse_num("VmRSS"),
        vm_size: parse_num("VmSize"),
        vm_swap: parse_num("VmSwap"),
        voluntary_ctxt_switches: parse_num("voluntary_ctxt_switches"),
        nonvoluntary_ctxt_switches: parse_num("nonvoluntary_ctxt_switches"),
    })
}

/// Parsed data from `/proc/[pid]/io`.
#[derive(Debug, Clone, Default)]
pub struct ProcIo {
    pub rchar: u64,
    pub wchar: u64,
    pub syscr: u64,
    pub syscw: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub cancelled_write_bytes: u64,
}

/// Parses `/proc/[pid]/io` content.
pub fn parse_proc_io(content: &str) -> Result<ProcIo, ParseError> {
    let mut io = ProcIo::default();
    let mut seen = false;

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value: u64 = value.trim().parse().unwrap_or(0);
            seen = true;
            match key.trim() {
                "rchar" => io.rchar = value,
                "wchar" => io.wchar = value,
                "syscr" => io.syscr = value,
                "syscw" => io.syscw = value,
                "read_bytes" => io.read_bytes = value,
                "write_bytes" => io.write_bytes = value,
                "cancelled_write_bytes" => io.cancelled_write_bytes = value,
                _ => {}
            }
        }
    }

    if !seen {
        return Err(ParseError::new("empty io file"));
    }
    Ok(io)
}

/// Parsed data from `/proc/[pid]/statm`, in pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStatm {
    pub size: u64,
    pub resident: u64,
    pub shared: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dirty: u64,
}

/// Parses `/proc/[pid]/statm`: `size resident shared text lib data dt`.
pub fn parse_statm(content: &str) -> Result<ProcStatm, ParseError> {
    let values: Vec<u64> = content
        .split_whitespace()
        .map(|s| s.parse().map_err(|_| ParseError::new("invalid statm value")))
        .collect::<Result<_, _>>()?;

    if values.len() < 7 {
        return Err(ParseError::new(format!(
            "not enough fields in statm: expected 7, got {}",
            values.len()
        )));
    }

    Ok(ProcStatm {
        size: values[0],
        resident: values[1],
        shared: values[2],
        text: values[3],
        lib: values[4],
        data: values[5],
        dirty: values[6],
    })
}

/// Splits `/proc/[pid]/cmdline` into arguments.
///
/// Arguments are NUL-terminated. Some processes rewrite their title with
/// spaces instead, in which case the single argument is split on whitespace.
pub fn parse_cmdline(content: &str) -> Vec<String> {
    let trimmed = content.strip_suffix('\0').unwrap_or(content);
    if trimmed.is_empty() {
        return Vec::new();
    }
    if !trimmed.contains('\0') && content.ends_with(' ') {
        return trimmed.split_whitespace().map(str::to_string).collect();
    }
    trimmed.split('\0').map(str::to_string).collect()
}

/// One mapping from `/proc/[pid]/smaps`. Sizes are in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmapsEntry {
    pub address: String,
    pub perms: String,
    pub path: String,
    pub fields: BTreeMap<String, u64>,
}

impl SmapsEntry {
    pub fn get(&self, key: &str) -> u64 {
        self.fields.get(key).copied().unwrap_or(0)
    }
}

/// Parses `/proc/[pid]/smaps`.
///
/// Each mapping starts with a header such as
/// `00400000-0040b000 r-xp 00000000 08:01 1234 /bin/cat` followed by
/// `Key:   N kB` lines.
pub fn parse_smaps(content: &str) -> Result<Vec<SmapsEntry>, ParseError> {
    let mut entries: Vec<SmapsEntry> = Vec::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(first) = parts.next() else {
            continue;
        };

        if let Some(key) = first.strip_suffix(':') {
            let Some(current) = entries.last_mut() else {
                return Err(ParseError::new("smaps field before any mapping header"));
            };
            if let Some(value) = parts.next().and_then(|v| v.parse::<u64>().ok()) {
                current.fields.insert(key.to_string(), value);
            }
            continue;
        }

        if is_smaps_header(first) {
            let perms = parts.next().unwrap_or("").to_string();
            // offset, dev, inode
            let path = parts.by_ref().skip(3).collect::<Vec<_>>().join(" ");
            entries.push(SmapsEntry {
                address: first.to_string(),
                perms,
                path,
                fields: BTreeMap::new(),
            });
        }
    }

    Ok(entries)
}

fn is_smaps_header(token: &str) -> bool {
    token
        .split_once('-')
        .is_some_and(|(a, b)| is_hex(a) && is_hex(b))
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parsed data from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: Option<u64>,
    pub buffers: u64,
    pub cached: u64,
    pub active: u64,
    pub inactive: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut has_total = false;

    let parse_kb = |line: &str| -> u64 {
        line.split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    for line in content.lines() {
        let Some((key, _)) = line.split_once(':') else {
            continue;
        };
        match key {
            "MemTotal" => {
                info.mem_total = parse_kb(line);
                has_total = true;
            }
            "MemFree" => info.mem_free = parse_kb(line),
            "MemAvailable" => info.mem_available = Some(parse_kb(line)),
            "Buffers" => info.buffers = parse_kb(line),
            "Cached" => info.cached = parse_kb(line),
            "Active" => info.active = parse_kb(line),
            "Inactive" => info.inactive = parse_kb(line),
            "SwapTotal" => info.swap_total = parse_kb(line),
            "SwapFree" => info.swap_free = parse_kb(line),
            _ => {}
        }
    }

    if !has_total {
        return Err(ParseError::new("missing MemTotal in meminfo"));
    }
    Ok(info)
}

/// Single CPU line from `/proc/stat`, in clock ticks.
///
/// `steal`, `guest` and `guest_nice` are `None` on kernels that do not
/// report them (pre 2.6.11, 2.6.24 and 2.6.33 respectively).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuStat {
    pub cpu_id: Option<u32>, // None for aggregate "cpu" line
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: Option<u64>,
    pub guest: Option<u64>,
    pub guest_nice: Option<u64>,
}

/// Global stats from `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct GlobalStat {
    pub cpus: Vec<CpuStat>,
    pub btime: u64,
}

impl GlobalStat {
    /// The aggregate `cpu` line.
    pub fn total(&self) -> Option<&CpuStat> {
        self.cpus.iter().find(|c| c.cpu_id.is_none())
    }

    /// The `cpuN` lines, in file order.
    pub fn per_cpu(&self) -> impl Iterator<Item = &CpuStat> {
        self.cpus.iter().filter(|c| c.cpu_id.is_some())
    }
}

/// Parses `/proc/stat` content.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        if parts[0].starts_with("cpu") {
            let cpu_id = if parts[0] == "cpu" {
                None
            } else {
                match parts[0].strip_prefix("cpu").and_then(|s| s.parse().ok()) {
                    Some(id) => Some(id),
                    None => continue,
                }
            };

            if parts.len() < 5 {
                return Err(ParseError::new(format!("short cpu line: {}", line)));
            }

            let get_val =
                |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };
            let get_opt = |idx: usize| -> Option<u64> { parts.get(idx).and_then(|s| s.parse().ok()) };

            stat.cpus.push(CpuStat {
                cpu_id,
                user: get_val(1),
                nice: get_val(2),
                system: get_val(3),
                idle: get_val(4),
                iowait: get_val(5),
                irq: get_val(6),
                softirq: get_val(7),
                steal: get_opt(8),
                guest: get_opt(9),
                guest_nice: get_opt(10),
            });
        } else if parts[0] == "btime" {
            stat.btime = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        }
    }

    if stat.total().is_none() {
        return Err(ParseError::new("missing aggregate cpu line in stat"));
    }
    Ok(stat)
}

/// Counts derived from `/proc/cpuinfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuInfoCounts {
    /// Number of `processor` entries.
    pub logical: usize,
    /// Sum of `cpu cores` over distinct `physical id`s; `None` if the
    /// kernel does not report topology (common on ARM).
    pub physical: Option<usize>,
}

/// Parses `/proc/cpuinfo` into logical/physical core counts.
pub fn parse_cpuinfo(content: &str) -> CpuInfoCounts {
    let mut logical = 0;
    let mut sockets: HashMap<String, usize> = HashMap::new();
    let mut physical_id: Option<String> = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "processor" => {
                logical += 1;
                physical_id = None;
            }
            "physical id" => physical_id = Some(value.trim().to_string()),
            "cpu cores" => {
                if let (Some(id), Ok(cores)) = (physical_id.clone(), value.trim().parse()) {
                    sockets.entry(id).or_insert(cores);
                }
            }
            _ => {}
        }
    }

    CpuInfoCounts {
        logical,
        physical: (!sockets.is_empty()).then(|| sockets.values().sum()),
    }
}

/// One device from `/proc/swaps`, sizes in kB.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapDevice {
    pub size: u64,
    pub used: u64,
}

/// Parses `/proc/swaps`: `Filename Type Size Used Priority`.
pub fn parse_swaps(content: &str) -> Vec<SwapDevice> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            Some(SwapDevice {
                size: parts[2].parse().ok()?,
                used: parts[3].parse().ok()?,
            })
        })
        .collect()
}

/// Swap activity from `/proc/vmstat`, in pages.
#[derive(Debug, Clone, Default)]
pub struct VmstatInfo {
    pub pswpin: u64,
    pub pswpout: u64,
}

/// Parses `/proc/vmstat` content.
///
/// Format: key value (one per line)
pub fn parse_vmstat(content: &str) -> Result<VmstatInfo, ParseError> {
    let mut info = VmstatInfo::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let value: u64 = parts[1].parse().unwrap_or(0);
        match parts[0] {
            "pswpin" => info.pswpin = value,
            "pswpout" => info.pswpout = value,
            _ => {}
        }
    }

    Ok(info)
}

/// Parses `/proc/filesystems` and returns the types backed by a real device.
///
/// Lines flagged `nodev` are virtual filesystems and are skipped.
pub fn parse_filesystems(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter(|line| !line.starts_with("nodev"))
        .map(|line| line.trim().to_string())
        .filter(|fs| !fs.is_empty())
        .collect()
}

/// One line of `/proc/self/mounts`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub opts: String,
}

/// Parses `/proc/self/mounts` (fstab format).
///
/// Octal escapes (`\040` for space) in the mount point are decoded.
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            Some(MountEntry {
                device: parts[0].to_string(),
                mountpoint: decode_octal_escapes(parts[1]),
                fstype: parts[2].to_string(),
                opts: parts[3].to_string(),
            })
        })
        .collect()
}

fn decode_octal_escapes(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let digit = |b: u8| u32::from(b - b'0');
            let v = digit(bytes[i + 1]) * 64 + digit(bytes[i + 2]) * 8 + digit(bytes[i + 3]);
            out.push(v as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parses `/proc/partitions` and returns the device names in file order.
///
/// Format: `major minor #blocks name`, after a header and a blank line.
pub fn parse_partitions(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 || parts[0].parse::<u32>().is_err() {
                return None;
            }
            Some(parts[3].to_string())
        })
        .collect()
}

/// Parsed data from `/proc/diskstats`.
#[derive(Debug, Clone, Default)]
pub struct DiskStats {
    /// Device name (sda, nvme0n1, etc.)
    pub device: String,
    /// Number of reads completed
    pub reads: u64,
    /// Number of sectors read
    pub read_sectors: u64,
    /// Time spent reading (ms)
    pub read_time: u64,
    /// Number of writes completed
    pub writes: u64,
    /// Number of sectors written
    pub write_sectors: u64,
    /// Time spent writing (ms)
    pub write_time: u64,
}

/// Parses `/proc/diskstats` content.
///
/// Modern format: `major minor name reads r_merged r_sectors r_time writes
/// w_merged w_sectors w_time io_pending io_time w_io_time [discards ...]`.
/// Partitions on kernels before 2.6.25 only carry
/// `major minor name reads r_sectors writes w_sectors`.
pub fn parse_diskstats(content: &str) -> Result<Vec<DiskStats>, ParseError> {
    let mut disks = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();

        let get_val =
            |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        let mut disk = DiskStats::default();

        match parts.len() {
            n if n >= 14 => {
                disk.device = parts[2].to_string();
                disk.reads = get_val(3);
                disk.read_sectors = get_val(5);
                disk.read_time = get_val(6);
                disk.writes = get_val(7);
                disk.write_sectors = get_val(9);
                disk.write_time = get_val(10);
            }
            7 => {
                disk.device = parts[2].to_string();
                disk.reads = get_val(3);
                disk.read_sectors = get_val(4);
                disk.writes = get_val(5);
                disk.write_sectors = get_val(6);
            }
            _ => continue, // Skip malformed lines
        }

        disks.push(disk);
    }

    Ok(disks)
}

/// Parsed data from `/proc/net/dev`.
#[derive(Debug, Clone, Default)]
pub struct NetDevStats {
    /// Interface name (eth0, lo, etc.)
    pub interface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
}

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn parse_net_dev(content: &str) -> Result<Vec<NetDevStats>, ParseError> {
    let mut devices = Vec::new();

    for line in content.lines() {
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        // The counters may be glued to the colon ("eth0:123"), so split on the last one.
        let Some((name, rest)) = line.rsplit_once(':') else {
            continue;
        };

        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        let get_val =
            |idx: usize| -> u64 { values.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        devices.push(NetDevStats {
            interface: name.trim().to_string(),
            rx_bytes: get_val(0),
            rx_packets: get_val(1),
            rx_errs: get_val(2),
            rx_drop: get_val(3),
            tx_bytes: get_val(8),
            tx_packets: get_val(9),
            tx_errs: get_val(10),
            tx_drop: get_val(11),
        });
    }

    Ok(devices)
}

/// One socket from `/proc/net/{tcp,tcp6,udp,udp6}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InetSocket {
    pub local: SocketAddr,
    /// `None` for unconnected sockets (remote `0.0.0.0:0` / `[::]:0`).
    pub remote: Option<SocketAddr>,
    /// Raw kernel state code (`0A` = LISTEN).
    pub state: u8,
    pub inode: u64,
}

/// Parses an inet connection table.
///
/// Columns: `sl local_address rem_address st tx_queue:rx_queue tr:tm->when
/// retrnsmt uid timeout inode ...`. Addresses are hex words in host byte
/// order followed by a big-endian hex port.
pub fn parse_net_inet(content: &str) -> Result<Vec<InetSocket>, ParseError> {
    let mut sockets = Vec::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let local = decode_socket_addr(parts[1])?;
        let remote = decode_socket_addr(parts[2])?;
        let state = u8::from_str_radix(parts[3], 16)
            .map_err(|_| ParseError::new(format!("invalid socket state {}", parts[3])))?;
        let inode = parts[9]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid socket inode {}", parts[9])))?;

        sockets.push(InetSocket {
            local,
            remote: (remote.port() != 0 || !remote.ip().is_unspecified()).then_some(remote),
            state,
            inode,
        });
    }

    Ok(sockets)
}

fn decode_socket_addr(s: &str) -> Result<SocketAddr, ParseError> {
    let (ip_hex, port_hex) = s
        .split_once(':')
        .ok_or_else(|| ParseError::new(format!("invalid socket address {}", s)))?;
    let port = u16::from_str_radix(port_hex, 16)
        .map_err(|_| ParseError::new(format!("invalid port {}", port_hex)))?;

    let word = |chunk: &str| -> Result<[u8; 4], ParseError> {
        u32::from_str_radix(chunk, 16)
            .map(u32::to_ne_bytes)
            .map_err(|_| ParseError::new(format!("invalid address {}", ip_hex)))
    };

    let ip = match ip_hex.len() {
        8 => IpAddr::V4(Ipv4Addr::from(word(ip_hex)?)),
        32 => {
            let mut octets = [0u8; 16];
            for i in 0..4 {
                octets[i * 4..i * 4 + 4].copy_from_slice(&word(&ip_hex[i * 8..i * 8 + 8])?);
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return Err(ParseError::new(format!("invalid address {}", ip_hex))),
    };

    Ok(SocketAddr::new(ip, port))
}

/// One socket from `/proc/net/unix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixSocket {
    /// Raw socket type (1 = stream, 2 = datagram, 5 = seqpacket).
    pub socket_type: u32,
    pub inode: u64,
    pub path: Option<String>,
}

/// Parses `/proc/net/unix`: `Num RefCount Protocol Flags Type St Inode [Path]`.
pub fn parse_net_unix(content: &str) -> Result<Vec<UnixSocket>, ParseError> {
    let mut sockets = Vec::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 7 {
            continue;
        }
        let socket_type = u32::from_str_radix(parts[4], 16)
            .map_err(|_| ParseError::new(format!("invalid unix socket type {}", parts[4])))?;
        let inode = parts[6]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid unix socket inode {}", parts[6])))?;
        sockets.push(UnixSocket {
            socket_type,
            inode,
            path: parts.get(7).map(|p| p.to_string()),
        });
    }

    Ok(sockets)
}

/// Extracts the inode from an fd link target such as `socket:[12345]`.
pub fn parse_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

/// Parses `/etc/passwd` content and returns a map of UID -> username.
///
/// Format: username:password:uid:gid:gecos:home:shell
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3
            && let Ok(uid) = parts[2].parse::<u32>()
        {
            map.insert(uid, parts[0].to_string());
        }
    }
    map
}

/// Resolver for UID -> username mapping.
#[derive(Debug, Clone, Default)]
pub struct UserResolver {
    uid_to_name: HashMap<u32, String>,
}

impl UserResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads user mappings from /etc/passwd content.
    pub fn load_from_content(&mut self, content: &str) {
        self.uid_to_name = parse_passwd(content);
    }

    /// Returns the user name for `uid`, if `/etc/passwd` lists it.
    pub fn lookup(&self, uid: u32) -> Option<&str> {
        self.uid_to_name.get(&uid).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passwd() {
        let content = "\
root:x:0:0:root:/root:/bin/bash
# comment
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
user:x:1000:1000:User Name:/home/user:/bin/bash
";
        let map = parse_passwd(content);
        assert_eq!(map.get(&0), Some(&"root".to_string()));
        assert_eq!(map.get(&1000), Some(&"user".to_string()));
        assert_eq!(map.len(), 3);

        let mut resolver = UserResolver::new();
        resolver.load_from_content(content);
        assert_eq!(resolver.lookup(65534), Some("nobody"));
        assert_eq!(resolver.lookup(9999), None);
    }

    #[test]
    fn test_parse_proc_stat_basic() {
        let content = "1234 (bash) S 1233 1234 1234 34816 1235 4194304 5000 50000 10 20 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 5 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 1234);
        assert_eq!(stat.comm, "bash");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.ppid, 1233);
        assert_eq!(stat.tty_nr, 34816);
        assert_eq!(stat.utime, 100);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.cutime, 200);
        assert_eq!(stat.nice, 0);
        assert_eq!(stat.starttime, 100000);
        assert_eq!(stat.rss, 2000);
        assert_eq!(stat.processor, 2);
    }

    #[test]
    fn test_parse_proc_stat_with_parentheses_in_comm() {
        let content = "5001 (test (1)) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 1 0 500100 10000000 1000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 5001);
        assert_eq!(stat.comm, "test (1)");
        assert_eq!(stat.ppid, 1);
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        assert!(parse_proc_stat("12 (x) S 1 2 3").is_err());
        assert!(parse_proc_stat("garbage").is_err());
    }

    #[test]
    fn test_parse_proc_status() {
        let content = "\
Name:\tbash
Pid:\t1234
PPid:\t1233
Uid:\t1000\t1001\t1002\t1000
Gid:\t100\t101\t102\t100
Threads:\t3
VmSize:\t   25000 kB
VmRSS:\t    8000 kB
voluntary_ctxt_switches:\t500
nonvoluntary_ctxt_switches:\t50
";
        let status = parse_proc_status(content).unwrap();

        assert_eq!(status.name, "bash");
        assert_eq!(status.ppid, 1233);
        assert_eq!(
            status.uids,
            IdTriple {
                real: 1000,
                effective: 1001,
                saved: 1002
            }
        );
        assert_eq!(status.gids.saved, 102);
        assert_eq!(status.threads, 3);
        assert_eq!(status.vm_rss, 8000);
        assert_eq!(status.voluntary_ctxt_switches, 500);
        assert_eq!(status.nonvoluntary_ctxt_switches, 50);
    }

    #[test]
    fn test_parse_proc_io() {
        let content = "\
rchar: 1000
wchar: 2000
syscr: 10
syscw: 20
read_bytes: 4096
write_bytes: 8192
cancelled_write_bytes: 0
";
        let io = parse_proc_io(content).unwrap();
        assert_eq!(io.syscr, 10);
        assert_eq!(io.write_bytes, 8192);
        assert!(parse_proc_io("").is_err());
    }

    #[test]
    fn test_parse_statm() {
        let statm = parse_statm("6000 2000 500 100 0 1500 0\n").unwrap();
        assert_eq!(statm.size, 6000);
        assert_eq!(statm.resident, 2000);
        assert_eq!(statm.data, 1500);
        assert!(parse_statm("1 2 3").is_err());
    }

    #[test]
    fn test_parse_cmdline() {
        assert_eq!(
            parse_cmdline("/usr/bin/python3\0-m\0http.server\0"),
            vec!["/usr/bin/python3", "-m", "http.server"]
        );
        assert_eq!(
            parse_cmdline("nginx: worker process "),
            vec!["nginx:", "worker", "process"]
        );
        assert!(parse_cmdline("").is_empty());
    }

    #[test]
    fn test_parse_smaps() {
        let content = "\
00400000-0040b000 r-xp 00000000 08:01 1234                               /bin/cat
Size:                 44 kB
Rss:                  40 kB
Pss:                  40 kB
Swap:                  0 kB
VmFlags: rd ex mr mw me dw
7ffd1000-7ffd3000 rw-p 00000000 00:00 0                                  [stack]
Size:                  8 kB
Rss:                   8 kB
7ffd5000-7ffd6000 rw-p 00000000 00:00 0
Rss:                   4 kB
";
        let maps = parse_smaps(content).unwrap();
        assert_eq!(maps.len(), 3);
        assert_eq!(maps[0].path, "/bin/cat");
        assert_eq!(maps[0].perms, "r-xp");
        assert_eq!(maps[0].get("Rss"), 40);
        assert_eq!(maps[1].path, "[stack]");
        assert_eq!(maps[2].path, "");
        assert_eq!(maps[2].get("Rss"), 4);
        assert_eq!(maps[2].get("Pss"), 0);
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:         1000 kB
Active:          4096000 kB
";
        let info = parse_meminfo(content).unwrap();
        assert_eq!(info.mem_total, 16384000);
        assert_eq!(info.mem_available, Some(12000000));
        assert_eq!(info.cached, 2048000);
        assert!(parse_meminfo("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_global_stat() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 5000 250 1500 40000 500 100 50 0 0 0
cpu1 5000 250 1500 40000 500 100 50 0 0 0
intr 1000000 50 0 0
ctxt 500000
btime 1700000000
processes 10000
";
        let stat = parse_global_stat(content).unwrap();
        let total = stat.total().unwrap();
        assert_eq!(total.user, 10000);
        assert_eq!(total.steal, Some(0));
        assert_eq!(stat.per_cpu().count(), 2);
        assert_eq!(stat.btime, 1700000000);
    }

    #[test]
    fn test_parse_global_stat_old_kernel_leaves_fields_unset() {
        let stat = parse_global_stat("cpu  100 0 50 850 0 0 0\n").unwrap();
        let total = stat.total().unwrap();
        assert_eq!(total.softirq, 0);
        assert_eq!(total.steal, None);
        assert_eq!(total.guest, None);
        assert_eq!(total.guest_nice, None);
    }

    #[test]
    fn test_parse_cpuinfo() {
        let content = "\
processor\t: 0
physical id\t: 0
cpu cores\t: 2

processor\t: 1
physical id\t: 0
cpu cores\t: 2

processor\t: 2
physical id\t: 1
cpu cores\t: 2

processor\t: 3
physical id\t: 1
cpu cores\t: 2
";
        let counts = parse_cpuinfo(content);
        assert_eq!(counts.logical, 4);
        assert_eq!(counts.physical, Some(4));

        let arm = parse_cpuinfo("processor\t: 0\nBogoMIPS\t: 108\n\nprocessor\t: 1\n");
        assert_eq!(arm.logical, 2);
        assert_eq!(arm.physical, None);
    }

    #[test]
    fn test_parse_swaps() {
        let content = "\
Filename\t\t\t\tType\t\tSize\tUsed\tPriority
/dev/sda2                               partition\t4194300\t1024\t-2
/swapfile                               file\t\t1048576\t0\t-3
";
        let swaps = parse_swaps(content);
        assert_eq!(swaps.len(), 2);
        assert_eq!(swaps[0].size, 4194300);
        assert_eq!(swaps[0].used, 1024);
        assert_eq!(swaps[1].size, 1048576);
    }

    #[test]
    fn test_parse_vmstat() {
        let info = parse_vmstat("pgpgin 1\npswpin 100\npswpout 200\n").unwrap();
        assert_eq!(info.pswpin, 100);
        assert_eq!(info.pswpout, 200);
    }

    #[test]
    fn test_parse_filesystems() {
        let content = "nodev\tsysfs\nnodev\tproc\n\text4\n\txfs\nnodev\ttmpfs\n\tvfat\n";
        let fs = parse_filesystems(content);
        assert_eq!(fs.len(), 3);
        assert!(fs.contains("ext4"));
        assert!(!fs.contains("proc"));
    }

    #[test]
    fn test_parse_mounts() {
        let content = "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw,nosuid 0 0
/dev/sdb1 /mnt/my\\040disk vfat rw 0 0
";
        let mounts = parse_mounts(content);
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].mountpoint, "/");
        assert_eq!(mounts[0].opts, "rw,relatime");
        assert_eq!(mounts[2].mountpoint, "/mnt/my disk");
    }

    #[test]
    fn test_parse_partitions() {
        let content = "\
major minor  #blocks  name

   8        0  488386584 sda
   8        1     524288 sda1
 259        0  250059096 nvme0n1
";
        assert_eq!(parse_partitions(content), vec!["sda", "sda1", "nvme0n1"]);
    }

    #[test]
    fn test_parse_diskstats() {
        let content = "\
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 800000 5000 400000
   7       0 loop0 1 2
";
        let disks = parse_diskstats(content).unwrap();
        assert_eq!(disks.len(), 2);

        assert_eq!(disks[0].device, "sda");
        assert_eq!(disks[0].reads, 12345);
        assert_eq!(disks[0].read_sectors, 987654);
        assert_eq!(disks[0].write_time, 3000);

        assert_eq!(disks[1].device, "sda1");
        assert_eq!(disks[1].reads, 10000);
        assert_eq!(disks[1].read_sectors, 800000);
        assert_eq!(disks[1].writes, 5000);
        assert_eq!(disks[1].read_time, 0);
    }

    #[test]
    fn test_parse_net_dev() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0:987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
";
        let devices = parse_net_dev(content).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].interface, "eth0");
        assert_eq!(devices[1].rx_bytes, 987654321);
        assert_eq!(devices[1].rx_errs, 5);
        assert_eq!(devices[1].tx_drop, 5);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_parse_net_inet_v4() {
        let content = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0035 00000000:0000 0A 00000000:00000000 00:00000000 00000000   101        0 20123 1 0000000000000000 100 0 0 10 0
   1: 0F02000A:C350 2200A8C0:01BB 01 00000000:00000000 02:000AFA3E 00000000  1000        0 30456 1 0000000000000000 20 4 30 10 -1
";
        let sockets = parse_net_inet(content).unwrap();
        assert_eq!(sockets.len(), 2);

        assert_eq!(sockets[0].local, "127.0.0.1:53".parse().unwrap());
        assert_eq!(sockets[0].remote, None);
        assert_eq!(sockets[0].state, 0x0A);
        assert_eq!(sockets[0].inode, 20123);

        assert_eq!(sockets[1].local, "10.0.2.15:50000".parse().unwrap());
        assert_eq!(sockets[1].remote, Some("192.168.0.34:443".parse().unwrap()));
        assert_eq!(sockets[1].state, 0x01);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_parse_net_inet_v6() {
        let content = "\
  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000001000000:1F90 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 40001 1 0000000000000000 100 0 0 10 0
";
        let sockets = parse_net_inet(content).unwrap();
        assert_eq!(sockets[0].local, "[::1]:8080".parse().unwrap());
        assert_eq!(sockets[0].remote, None);
    }

    #[test]
    fn test_parse_net_unix() {
        let content = "\
Num       RefCount Protocol Flags    Type St Inode Path
0000000000000000: 00000002 00000000 00010000 0001 01 15001 /run/systemd/notify
0000000000000000: 00000003 00000000 00000000 0002 03 15002
";
        let sockets = parse_net_unix(content).unwrap();
        assert_eq!(sockets.len(), 2);
        assert_eq!(sockets[0].socket_type, 1);
        assert_eq!(sockets[0].path.as_deref(), Some("/run/systemd/notify"));
        assert_eq!(sockets[1].inode, 15002);
        assert_eq!(sockets[1].path, None);
    }

    #[test]
    fn test_parse_socket_inode() {
        assert_eq!(parse_socket_inode("socket:[12345]"), Some(12345));
        assert_eq!(parse_socket_inode("/dev/null"), None);
        assert_eq!(parse_socket_inode("pipe:[99]"), None);
    }
}
