//! sysprobe - point-in-time and rate-based system telemetry.
//!
//! Reads `/proc` and native calls through `sysprobe-core` and prints the
//! result as JSON.

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Level, debug, error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use sysprobe_core::collector::{RealFs, SystemSampler};
use sysprobe_core::os::{NativeOs, OsQuery};
use sysprobe_core::process::linux::LinuxProvider;
use sysprobe_core::process::{PlatformKind, ProcessAttr, Processes};
use sysprobe_core::rate_cache::CpuMonitor;
use sysprobe_core::rates::{DiskIoRate, NetIoRate};
use sysprobe_core::sample::ConnectionKind;
use sysprobe_core::{Error, Result};

/// System and process telemetry.
#[derive(Parser)]
#[command(name = "sysprobe", about = "System and process telemetry", version)]
struct Args {
    /// Path to /proc filesystem (for testing/containers).
    #[arg(long, default_value = "/proc", global = true)]
    proc_path: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// CPU utilization in percent.
    Cpu {
        /// Seconds between the two samples; 0 measures since startup.
        #[arg(short, long, default_value = "1.0")]
        interval: f64,

        /// Report each core separately.
        #[arg(long)]
        per_cpu: bool,

        /// Break utilization down by field (user, system, iowait, ...).
        #[arg(long)]
        fields: bool,
    },
    /// Physical memory and swap.
    Mem,
    /// Mounted real filesystems with their usage.
    Disks,
    /// Disk I/O counters, or per-second rates with --interval.
    Diskio {
        #[arg(short, long)]
        interval: Option<f64>,
    },
    /// Network interface counters, or per-second rates with --interval.
    Net {
        #[arg(short, long)]
        interval: Option<f64>,
    },
    /// Sockets with their owning processes.
    Conns {
        /// inet, inet4, inet6, tcp, tcp4, tcp6, udp, udp4, udp6, unix or all.
        #[arg(short, long, default_value = "inet")]
        kind: String,
    },
    /// Attributes of one process (default: sysprobe itself).
    Proc {
        pid: Option<u32>,

        /// Comma separated attribute names; all when omitted.
        #[arg(short, long, value_delimiter = ',')]
        attrs: Vec<String>,

        /// Also list the descendants.
        #[arg(long)]
        children: bool,
    },
    /// One line per process: pid, ppid, user, name.
    Ps,
    /// Host identity, boot time, cpu counts and logged-in users.
    Info,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("failed to encode output: {}", e),
    }
}

fn seconds(interval: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(interval).map_err(|_| {
        Error::invalid(format!(
            "interval must be a non-negative number, got {}",
            interval
        ))
    })
}

fn sampler(proc_path: &str) -> SystemSampler<RealFs> {
    let os: Arc<dyn OsQuery> = Arc::new(NativeOs::new());
    SystemSampler::new(RealFs::new(), proc_path, os)
}

/// Process registry honouring `--proc-path` on Linux.
fn processes(proc_path: &str) -> Processes {
    match PlatformKind::detect() {
        PlatformKind::Linux => {
            debug!(proc_path, "using procfs process capability");
            Processes::new(Arc::new(LinuxProvider::new(
                RealFs::new(),
                proc_path,
                Arc::new(NativeOs::new()),
            )))
        }
        PlatformKind::Posix => Processes::detect(),
    }
}

fn cpu(proc_path: &str, interval: f64, per_cpu: bool, fields: bool) -> Result<()> {
    let mut monitor = CpuMonitor::new(sampler(proc_path))?;
    let interval = seconds(interval)?;
    match (per_cpu, fields) {
        (false, false) => print_json(&json!({ "percent": monitor.cpu_percent(interval)? })),
        (true, false) => print_json(&monitor.per_cpu_percent(interval)?),
        (false, true) => print_json(&monitor.cpu_times_percent(interval)?),
        (true, true) => print_json(&monitor.per_cpu_times_percent(interval)?),
    }
    Ok(())
}

fn mem(proc_path: &str) -> Result<()> {
    let s = sampler(proc_path);
    print_json(&json!({
        "virtual": s.virtual_memory()?,
        "swap": s.swap_memory()?,
    }));
    Ok(())
}

fn disks(proc_path: &str) -> Result<()> {
    let s = sampler(proc_path);
    let mut rows = Vec::new();
    for part in s.disk_partitions()? {
        let usage = match s.disk_usage(&part.mountpoint) {
            Ok(usage) => to_json(&usage),
            Err(e) => {
                warn!(mountpoint = %part.mountpoint, error = %e, "disk usage unavailable");
                Value::Null
            }
        };
        rows.push(json!({ "partition": part, "usage": usage }));
    }
    print_json(&rows);
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn diskio(proc_path: &str, interval: Option<f64>) -> Result<()> {
    let s = sampler(proc_path);
    let Some(interval) = interval else {
        let per_disk: BTreeMap<_, _> = s.disk_io_counters()?.into_iter().collect();
        print_json(&json!({ "total": s.disk_io_counters_total()?, "per_disk": per_disk }));
        return Ok(());
    };

    let interval = seconds(interval)?;
    let start = s.disk_io_counters()?;
    let started = Instant::now();
    std::thread::sleep(interval);
    let end = s.disk_io_counters()?;
    let elapsed = started.elapsed();

    let rates: BTreeMap<&String, DiskIoRate> = end
        .iter()
        .filter_map(|(name, e)| {
            let b = start.get(name)?;
            Some((name, DiskIoRate::between(b, e, elapsed)))
        })
        .collect();
    print_json(&rates);
    Ok(())
}

fn net(proc_path: &str, interval: Option<f64>) -> Result<()> {
    let s = sampler(proc_path);
    let Some(interval) = interval else {
        let per_nic: BTreeMap<_, _> = s.net_io_counters()?.into_iter().collect();
        print_json(&json!({ "total": s.net_io_counters_total()?, "per_nic": per_nic }));
        return Ok(());
    };

    let interval = seconds(interval)?;
    let start = s.net_io_counters()?;
    let started = Instant::now();
    std::thread::sleep(interval);
    let end = s.net_io_counters()?;
    let elapsed = started.elapsed();

    let rates: BTreeMap<&String, NetIoRate> = end
        .iter()
        .filter_map(|(name, e)| {
            let b = start.get(name)?;
            Some((name, NetIoRate::between(b, e, elapsed)))
        })
        .collect();
    print_json(&rates);
    Ok(())
}

fn conns(proc_path: &str, kind: &str) -> Result<()> {
    let kind: ConnectionKind = kind.parse()?;
    print_json(&sampler(proc_path).net_connections(kind)?);
    Ok(())
}

fn proc(proc_path: &str, pid: Option<u32>, attrs: &[String], children: bool) -> Result<()> {
    let registry = processes(proc_path);
    let process = match pid {
        Some(pid) => registry.process(pid)?,
        None => registry.current()?,
    };
    let attrs = attrs
        .iter()
        .map(|name| ProcessAttr::from_name(name))
        .collect::<Result<Vec<_>>>()?;

    let mut map = process.as_map(&attrs, Some(Value::Null))?;
    if children {
        let pids: Vec<u32> = process.children(true)?.iter().map(|c| c.pid()).collect();
        map.insert("children", json!(pids));
    }
    print_json(&map);
    Ok(())
}

fn ps(proc_path: &str) -> Result<()> {
    let registry = processes(proc_path);
    for process in registry.iter()? {
        let process = match process {
            Ok(process) => process,
            Err(e) => {
                debug!(error = %e, "skipping process");
                continue;
            }
        };
        let ppid = process.ppid().map(|p| p.to_string()).unwrap_or_default();
        let user = process.username().unwrap_or_else(|_| "?".to_string());
        let name = process.name().unwrap_or("?");
        println!("{:>8} {:>8} {:<12} {}", process.pid(), ppid, user, name);
    }
    Ok(())
}

fn info(proc_path: &str) -> Result<()> {
    let s = sampler(proc_path);
    let boot = s.boot_time()?;
    let booted = DateTime::<Utc>::from_timestamp(boot as i64, 0)
        .map(|t| t.with_timezone(&Local).to_rfc3339())
        .unwrap_or_default();
    print_json(&json!({
        "system": s.system_info()?,
        "boot_time": boot,
        "booted_at": booted,
        "cpu_count": {
            "logical": s.cpu_count(true)?,
            "physical": s.cpu_count(false)?,
        },
        "users": s.users()?,
    }));
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let proc_path = args.proc_path.as_str();
    match args.command {
        Command::Cpu {
            interval,
            per_cpu,
            fields,
        } => cpu(proc_path, interval, per_cpu, fields),
        Command::Mem => mem(proc_path),
        Command::Disks => disks(proc_path),
        Command::Diskio { interval } => diskio(proc_path, interval),
        Command::Net { interval } => net(proc_path, interval),
        Command::Conns { kind } => conns(proc_path, &kind),
        Command::Proc {
            pid,
            attrs,
            children,
        } => proc(proc_path, pid, &attrs, children),
        Command::Ps => ps(proc_path),
        Command::Info => info(proc_path),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
