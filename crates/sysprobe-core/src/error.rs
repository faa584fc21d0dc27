//! Error taxonomy shared by every sampler and process query.

use std::io;

use crate::collector::procfs::parser::ParseError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sampling and process queries.
///
/// `NoSuchProcess` and `AccessDenied` are kept distinct so callers can decide
/// between giving up and retrying with different privileges.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The process's kernel record is absent at query time.
    #[error("no such process (pid={pid})")]
    NoSuchProcess { pid: u32 },

    /// The query or mutation was rejected by a permission check.
    #[error("access denied (pid={pid})")]
    AccessDenied { pid: u32 },

    /// Malformed input to a public operation. Raised before any OS query.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not supported by the active platform variant.
    #[error("{0} is not implemented on this platform")]
    NotImplemented(&'static str),

    /// Unclassified failure from the OS query layer.
    #[error("{context}: {source}")]
    OsQuery {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A pseudo-file was read but its content could not be understood.
    #[error("{context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: ParseError,
    },
}

impl Error {
    /// Classifies an I/O error raised while querying process `pid`.
    pub fn from_io(pid: u32, context: impl Into<String>, err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ESRCH) => return Error::NoSuchProcess { pid },
            Some(libc::EPERM) | Some(libc::EACCES) => return Error::AccessDenied { pid },
            Some(libc::EINVAL) => {
                return Error::InvalidArgument(format!("{}: {}", context.into(), err));
            }
            _ => {}
        }
        match err.kind() {
            io::ErrorKind::NotFound => Error::NoSuchProcess { pid },
            io::ErrorKind::PermissionDenied => Error::AccessDenied { pid },
            io::ErrorKind::Unsupported => Error::NotImplemented("native query"),
            _ => Error::OsQuery {
                context: context.into(),
                source: err,
            },
        }
    }

    /// Wraps an I/O error from a system-wide source (no pid involved).
    pub fn os(context: impl Into<String>, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::Unsupported {
            return Error::NotImplemented("native query");
        }
        Error::OsQuery {
            context: context.into(),
            source: err,
        }
    }

    pub fn parse(context: impl Into<String>, err: ParseError) -> Self {
        Error::Parse {
            context: context.into(),
            source: err,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True for failures that belong to the generic OS-query category.
    pub fn is_os_query(&self) -> bool {
        matches!(self, Error::OsQuery { .. } | Error::Parse { .. })
    }

    pub fn is_no_such_process(&self) -> bool {
        matches!(self, Error::NoSuchProcess { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied { .. })
    }
}
