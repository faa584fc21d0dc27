//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` filesystem states
//! for testing samplers and the Linux process capability.

use super::filesystem::MockFs;

/// `btime` of every scenario; create times are `BOOT_TIME + starttime / 100`.
pub const BOOT_TIME: u64 = 1_700_000_000;

const BASH_STAT: &str = "1000 (bash) S 999 1000 1000 34816 1001 4194304 5000 50000 0 0 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 0 0 0 0 0 0 0 0 0 0 0";

#[allow(dead_code)]
impl MockFs {
    /// Creates a typical system with a few processes.
    ///
    /// Includes: init (PID 1), a bash shell holding a TCP connection, and a
    /// `cat` child of that shell.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        // /etc/passwd for user name resolution
        fs.add_file(
            "/etc/passwd",
            "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
user:x:1000:1000:User:/home/user:/bin/bash
",
        );

        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );
        fs.add_file(
            "/proc/cpuinfo",
            "\
processor\t: 0
physical id\t: 0
cpu cores\t: 1

processor\t: 1
physical id\t: 0
cpu cores\t: 1

processor\t: 2
physical id\t: 1
cpu cores\t: 1

processor\t: 3
physical id\t: 1
cpu cores\t: 1
",
        );
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       3145720 kB
SwapFree:        2621432 kB
",
        );
        fs.add_file(
            "/proc/swaps",
            "\
Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority
/dev/sda2                               partition\t2097148\t\t524288\t\t-2
/swapfile                               file\t\t1048572\t\t0\t\t-3
",
        );
        fs.add_file(
            "/proc/vmstat",
            "\
pgpgin 123456
pgpgout 654321
pswpin 100
pswpout 200
pgfault 999999
pgmajfault 1234
",
        );

        // Filesystems and mounts
        fs.add_file(
            "/proc/filesystems",
            "nodev\tsysfs\nnodev\tproc\nnodev\ttmpfs\n\text4\n\txfs\n",
        );
        fs.add_file(
            "/proc/self/mounts",
            "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev 0 0
/dev/nvme0n1 /mnt/my\\040data xfs rw,relatime 0 0
",
        );
        fs.add_file(
            "/proc/partitions",
            "\
major minor  #blocks  name

   8        0  976762584 sda
   8        1  976761560 sda1
 259        0  500107608 nvme0n1
",
        );
        fs.add_file(
            "/proc/diskstats",
            "\
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
",
        );

        // Network device statistics and socket tables
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
",
        );
        fs.add_file(
            "/proc/net/tcp",
            "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 11111 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 0100007F:B26E 01 00000000:00000000 00:00000000 00000000  1000        0 23456 1 0000000000000000 20 4 30 10 -1
",
        );
        fs.add_file(
            "/proc/net/tcp6",
            "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n",
        );
        fs.add_file(
            "/proc/net/udp",
            "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
  10: 0100007F:0035 00000000:0000 07 00000000:00000000 00:00000000 00000000   101        0 22222 2 0000000000000000 0
",
        );
        fs.add_file(
            "/proc/net/udp6",
            "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops\n",
        );
        fs.add_file(
            "/proc/net/unix",
            "\
Num       RefCount Protocol Flags    Type St Inode Path
0000000000000000: 00000002 00000000 00010000 0001 01 33333 /run/systemd/notify
0000000000000000: 00000003 00000000 00000000 0002 03 33334
",
        );

        // PID 1 - init/systemd
        fs.add_process(
            1,
            "1 (systemd) S 0 1 1 0 -1 4194560 50000 1000000 100 500 1000 500 2000 1000 20 0 1 0 1 170000000 3000 18446744073709551615 0 0 0 0 0 0 0 0 1073745152 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tsystemd
Pid:\t1
PPid:\t0
Uid:\t0\t0\t0\t0
Gid:\t0\t0\t0\t0
Threads:\t1
VmSize:\t  170000 kB
VmRSS:\t    12000 kB
VmSwap:\t        0 kB
voluntary_ctxt_switches:\t1000
nonvoluntary_ctxt_switches:\t100
",
            "/sbin/init\0",
        );
        fs.add_link("/proc/1/exe", "/usr/lib/systemd/systemd");
        fs.add_link("/proc/1/cwd", "/");
        fs.add_link("/proc/1/fd/0", "/dev/null");
        fs.add_link("/proc/1/fd/4", "socket:[33333]");
        fs.add_link("/proc/1/fd/5", "socket:[22222]");
        fs.add_file(
            "/proc/1/task/1/stat",
            "1 (systemd) S 0 1 1 0 -1 4194560 50000 1000000 100 500 1000 500 2000 1000 20 0 1 0 1 170000000 3000 18446744073709551615 0 0 0 0 0 0 0 0 1073745152 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
        );

        // PID 1000 - bash shell
        fs.add_process(
            1000,
            BASH_STAT,
            "\
Name:\tbash
Pid:\t1000
PPid:\t999
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
Threads:\t2
VmSize:\t   25000 kB
VmRSS:\t    8000 kB
VmSwap:\t        0 kB
voluntary_ctxt_switches:\t500
nonvoluntary_ctxt_switches:\t50
",
            "/bin/bash\0--login\0",
        );
        fs.add_link("/proc/1000/exe", "/usr/bin/bash");
        fs.add_link("/proc/1000/cwd", "/home/user");
        fs.add_link("/proc/1000/fd/0", "/dev/pts/0");
        fs.add_link("/proc/1000/fd/3", "socket:[23456]");
        fs.add_link("/proc/1000/fd/4", "/home/user/notes.txt");
        fs.add_file("/proc/1000/statm", "6250 2000 500 250 0 600 0\n");
        fs.add_file(
            "/proc/1000/io",
            "rchar: 1000000\nwchar: 500000\nsyscr: 5000\nsyscw: 2500\nread_bytes: 100000\nwrite_bytes: 50000\ncancelled_write_bytes: 0\n",
        );
        fs.add_file("/proc/1000/task/1000/stat", BASH_STAT);
        fs.add_file(
            "/proc/1000/task/1002/stat",
            "1002 (bash) S 999 1000 1000 34816 1001 4194304 0 0 0 0 30 20 0 0 20 0 2 0 100050 25000000 2000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0 0 0 0 0 0 0 0 0",
        );
        fs.add_file(
            "/proc/1000/smaps",
            "\
55d0c0a00000-55d0c0a2f000 r--p 00000000 08:01 1234                       /usr/bin/bash
Size:                188 kB
Rss:                 188 kB
Pss:                  94 kB
Shared_Clean:        188 kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:         0 kB
Referenced:          188 kB
Anonymous:             0 kB
Swap:                  0 kB
55d0c0a2f000-55d0c0b00000 r-xp 0002f000 08:01 1234                       /usr/bin/bash
Size:                836 kB
Rss:                 800 kB
Pss:                 400 kB
Shared_Clean:        800 kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:         0 kB
Referenced:          800 kB
Anonymous:             0 kB
Swap:                  0 kB
7ffd1c000000-7ffd1c021000 rw-p 00000000 00:00 0                          [stack]
Size:                132 kB
Rss:                  24 kB
Pss:                  24 kB
Shared_Clean:          0 kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:        24 kB
Referenced:           24 kB
Anonymous:            24 kB
Swap:                  4 kB
",
        );

        // PID 1001 - cat command (child of bash)
        fs.add_process(
            1001,
            "1001 (cat) R 1000 1000 1000 34816 1001 4194304 100 0 0 0 5 2 0 0 20 0 1 0 100100 5000000 500 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tcat
Pid:\t1001
PPid:\t1000
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
Threads:\t1
VmSize:\t    5000 kB
VmRSS:\t    2000 kB
VmSwap:\t        0 kB
voluntary_ctxt_switches:\t10
nonvoluntary_ctxt_switches:\t2
",
            "/bin/cat\0file.txt\0",
        );
        fs.add_link("/proc/1001/exe", "/usr/bin/cat");
        fs.add_link("/proc/1001/cwd", "/home/user");
        fs.add_link("/proc/1001/fd/3", "/home/user/file.txt");

        fs
    }

    /// Replaces PID 1001 with an unrelated process that started later.
    ///
    /// Simulates PID reuse: same pid, different creation time and parent.
    pub fn with_reused_pid() -> Self {
        let mut fs = Self::typical_system();
        fs.remove("/proc/1001");
        fs.add_process(
            1001,
            "1001 (sshd) S 1 1001 1001 0 -1 4194560 100 0 0 0 1 1 0 0 20 0 1 0 900000 9000000 700 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tsshd\nPid:\t1001\nPPid:\t1\nUid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\n",
            "sshd: user [priv]\0",
        );
        fs
    }

    /// A child whose reported parent pid now belongs to a younger process.
    ///
    /// PID 2000 claims PPid 1001, but 1001 was reused after 2000 started.
    pub fn with_orphan_after_reuse() -> Self {
        let mut fs = Self::with_reused_pid();
        fs.add_process(
            2000,
            "2000 (sleep) S 1001 1000 1000 0 -1 4194304 10 0 0 0 0 0 0 0 20 0 1 0 200000 5000000 200 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tsleep\nPid:\t2000\nPPid:\t1001\nUid:\t1000\t1000\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n",
            "sleep\0infinity\0",
        );
        fs
    }

    /// A process owned by another user: everything but `stat` and
    /// `status` is unreadable.
    pub fn with_restricted_process() -> Self {
        let mut fs = Self::typical_system();
        fs.add_process(
            3000,
            "3000 (postgres) S 1 3000 3000 0 -1 4194560 100 0 0 0 50 20 0 0 20 0 1 0 5000 200000000 9000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tpostgres\nPid:\t3000\nPPid:\t1\nUid:\t999\t999\t999\t999\nGid:\t999\t999\t999\t999\n",
            "/usr/lib/postgresql/16/bin/postgres\0-D\0/var/lib/postgresql/16/main\0",
        );
        fs.add_link("/proc/3000/exe", "/usr/lib/postgresql/16/bin/postgres");
        fs.deny("/proc/3000/exe");
        fs.deny("/proc/3000/cwd");
        fs.deny("/proc/3000/fd");
        fs.deny("/proc/3000/io");
        fs.deny("/proc/3000/smaps");
        fs
    }

    /// A process whose kernel name is truncated to 15 characters.
    pub fn with_long_name() -> Self {
        let mut fs = Self::typical_system();
        fs.add_process(
            4000,
            "4000 (kube-controller) S 1 4000 4000 0 -1 4194560 100 0 0 0 50 20 0 0 20 0 8 0 6000 800000000 20000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tkube-controller\nPid:\t4000\nPPid:\t1\nUid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\n",
            "/usr/local/bin/kube-controller-manager\0--leader-elect\0",
        );
        fs.add_link("/proc/4000/exe", "/usr/local/bin/kube-controller-manager (deleted)");
        fs
    }

    /// Creates a system with a zombie process.
    pub fn with_zombie_process() -> Self {
        let mut fs = Self::typical_system();

        // Zombies keep stat/status but lose cmdline and exe
        fs.add_process(
            5000,
            "5000 (defunct) Z 1000 5000 1000 0 -1 4194308 0 0 0 0 0 0 0 0 20 0 1 0 400000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 -1 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tdefunct\nPid:\t5000\nPPid:\t1000\nUid:\t1000\t1000\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n",
            "",
        );

        fs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_typical_system_layout() {
        let fs = MockFs::typical_system();
        assert!(fs.exists(Path::new("/proc/1/stat")));
        assert!(fs.exists(Path::new("/proc/1000/fd/3")));
        assert_eq!(
            fs.read_link(Path::new("/proc/1000/fd/3")).unwrap(),
            Path::new("socket:[23456]")
        );
    }

    #[test]
    fn test_reused_pid_replaces_process() {
        let fs = MockFs::with_reused_pid();
        let status = fs.read_to_string(Path::new("/proc/1001/status")).unwrap();
        assert!(status.contains("sshd"));
        assert!(!fs.exists(Path::new("/proc/1001/exe")));
    }
}
