//! Socket enumeration: `/proc/net/*` tables joined with `/proc/[pid]/fd`.
//!
//! A socket belongs to a process when one of the process's fd links reads
//! `socket:[inode]` with the inode of the table row.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use tracing::trace;

use crate::collector::procfs::list_pids;
use crate::collector::procfs::parser::{parse_net_inet, parse_net_unix, parse_socket_inode};
use crate::collector::traits::FileSystem;
use crate::error::{Error, Result};
use crate::sample::{
    Connection, ConnectionKind, ConnectionStatus, ConnectionTable, Endpoint, SocketFamily,
    SocketType,
};

/// Process and descriptor holding a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOwner {
    pub pid: u32,
    pub fd: u32,
}

/// Maps socket inode to fd number for one process.
///
/// Descriptors closed while the directory is scanned are skipped.
pub fn process_socket_fds<F: FileSystem + ?Sized>(
    fs: &F,
    proc_path: &str,
    pid: u32,
) -> io::Result<HashMap<u64, u32>> {
    let dir = format!("{}/{}/fd", proc_path, pid);
    let mut inodes = HashMap::new();

    for entry in fs.read_dir(Path::new(&dir))? {
        let target = match fs.read_link(&entry) {
            Ok(target) => target,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let Some(inode) = parse_socket_inode(&target.to_string_lossy()) else {
            continue;
        };
        let Some(fd) = entry
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse().ok())
        else {
            continue;
        };
        inodes.insert(inode, fd);
    }

    Ok(inodes)
}

/// Builds the system-wide inode → owner map.
///
/// Processes whose fd table cannot be read (exited, or owned by another
/// user) are left out; their sockets are reported without a pid.
pub fn socket_owners<F: FileSystem + ?Sized>(
    fs: &F,
    proc_path: &str,
) -> io::Result<HashMap<u64, SocketOwner>> {
    let mut owners = HashMap::new();
    for pid in list_pids(fs, proc_path)? {
        match process_socket_fds(fs, proc_path, pid) {
            Ok(fds) => {
                for (inode, fd) in fds {
                    owners.entry(inode).or_insert(SocketOwner { pid, fd });
                }
            }
            Err(e) => trace!(pid, error = %e, "skipping fd table"),
        }
    }
    Ok(owners)
}

/// Which rows of the socket tables to keep.
pub enum Ownership<'a> {
    /// Every row, attributed where the owner is known.
    All(&'a HashMap<u64, SocketOwner>),
    /// Only rows whose inode is held by `pid`; values are fd numbers.
    Process { pid: u32, fds: &'a HashMap<u64, u32> },
}

impl Ownership<'_> {
    fn owner(&self, inode: u64) -> Option<Option<SocketOwner>> {
        match self {
            Ownership::All(owners) => Some(owners.get(&inode).copied()),
            Ownership::Process { pid, fds } => fds
                .get(&inode)
                .map(|&fd| Some(SocketOwner { pid: *pid, fd })),
        }
    }
}

/// Reads the tables selected by `kind` and keeps the rows `ownership` accepts.
///
/// Tables missing from the host (IPv6 disabled) are skipped.
pub fn read_connections<F: FileSystem + ?Sized>(
    fs: &F,
    proc_path: &str,
    kind: ConnectionKind,
    ownership: &Ownership<'_>,
) -> Result<Vec<Connection>> {
    let mut connections = Vec::new();

    for table in kind.tables() {
        let path = format!("{}/net/{}", proc_path, table.file);
        let content = match fs.read_to_string(Path::new(&path)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(path, "socket table not present");
                continue;
            }
            Err(e) => return Err(Error::os(format!("read {}", path), e)),
        };

        if table.family == SocketFamily::Unix {
            read_unix_table(&content, &path, ownership, &mut connections)?;
        } else {
            read_inet_table(&content, &path, table, ownership, &mut connections)?;
        }
    }

    Ok(connections)
}

fn read_inet_table(
    content: &str,
    path: &str,
    table: &ConnectionTable,
    ownership: &Ownership<'_>,
    out: &mut Vec<Connection>,
) -> Result<()> {
    let sockets = parse_net_inet(content).map_err(|e| Error::parse(path, e))?;
    for socket in sockets {
        let Some(owner) = ownership.owner(socket.inode) else {
            continue;
        };
        let status = match table.socket_type {
            SocketType::Stream => ConnectionStatus::from_tcp_state(socket.state),
            _ => ConnectionStatus::None,
        };
        out.push(Connection {
            fd: owner.map(|o| o.fd),
            family: table.family,
            socket_type: table.socket_type,
            local: Some(Endpoint::Inet(socket.local)),
            remote: socket.remote.map(Endpoint::Inet),
            status,
            pid: owner.map(|o| o.pid),
            inode: socket.inode,
        });
    }
    Ok(())
}

fn read_unix_table(
    content: &str,
    path: &str,
    ownership: &Ownership<'_>,
    out: &mut Vec<Connection>,
) -> Result<()> {
    let sockets = parse_net_unix(content).map_err(|e| Error::parse(path, e))?;
    for socket in sockets {
        let socket_type = match socket.socket_type {
            1 => SocketType::Stream,
            2 => SocketType::Datagram,
            5 => SocketType::SeqPacket,
            other => {
                trace!(inode = socket.inode, other, "unknown unix socket type");
                continue;
            }
        };
        let Some(owner) = ownership.owner(socket.inode) else {
            continue;
        };
        out.push(Connection {
            fd: owner.map(|o| o.fd),
            family: SocketFamily::Unix,
            socket_type,
            local: Some(Endpoint::Unix(socket.path.unwrap_or_default())),
            remote: None,
            status: ConnectionStatus::None,
            pid: owner.map(|o| o.pid),
            inode: socket.inode,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_process_socket_fds() {
        let fs = MockFs::typical_system();
        let fds = process_socket_fds(&fs, "/proc", 1000).unwrap();
        assert_eq!(fds.get(&23456), Some(&3));
        // fd 0 points at a tty, not a socket
        assert!(fds.values().all(|&fd| fd != 0));
    }

    #[test]
    fn test_socket_owners_skip_denied_processes() {
        let mut fs = MockFs::typical_system();
        fs.deny("/proc/1000/fd");
        let owners = socket_owners(&fs, "/proc").unwrap();
        assert!(!owners.contains_key(&23456));
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn test_read_connections_per_process() {
        let fs = MockFs::typical_system();
        let fds = process_socket_fds(&fs, "/proc", 1000).unwrap();
        let conns = read_connections(
            &fs,
            "/proc",
            ConnectionKind::Tcp,
            &Ownership::Process { pid: 1000, fds: &fds },
        )
        .unwrap();

        assert_eq!(conns.len(), 1);
        let conn = &conns[0];
        assert_eq!(conn.pid, Some(1000));
        assert_eq!(conn.fd, Some(3));
        assert_eq!(conn.status, ConnectionStatus::Established);
        assert_eq!(
            conn.local,
            Some(Endpoint::Inet("127.0.0.1:8080".parse().unwrap()))
        );
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn test_read_connections_system_wide_keeps_unowned() {
        let fs = MockFs::typical_system();
        let owners = socket_owners(&fs, "/proc").unwrap();
        let conns =
            read_connections(&fs, "/proc", ConnectionKind::All, &Ownership::All(&owners)).unwrap();

        let listener = conns.iter().find(|c| c.inode == 11111).unwrap();
        assert_eq!(listener.status, ConnectionStatus::Listen);
        assert_eq!(listener.pid, None);
        assert_eq!(listener.remote, None);

        let unix = conns
            .iter()
            .find(|c| c.family == SocketFamily::Unix)
            .unwrap();
        assert_eq!(unix.pid, Some(1));
        assert_eq!(
            unix.local,
            Some(Endpoint::Unix("/run/systemd/notify".to_string()))
        );
    }

    #[test]
    fn test_missing_table_is_skipped() {
        let mut fs = MockFs::typical_system();
        fs.remove("/proc/net/tcp6");
        let owners = HashMap::new();
        assert!(
            read_connections(&fs, "/proc", ConnectionKind::Tcp6, &Ownership::All(&owners))
                .unwrap()
                .is_empty()
        );
    }
}
