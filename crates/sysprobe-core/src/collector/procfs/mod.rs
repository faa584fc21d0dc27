//! Linux `/proc` filesystem readers.
//!
//! Parsers are pure text-to-struct functions; the sampler and the socket
//! join read through the [`FileSystem`](crate::collector::FileSystem) trait.

pub mod net;
pub mod parser;
pub mod system;

pub use parser::UserResolver;
pub use system::SystemSampler;

use std::io;
use std::path::Path;

use crate::collector::traits::FileSystem;

/// Lists the numeric entries of the proc root, in ascending order.
pub fn list_pids<F: FileSystem + ?Sized>(fs: &F, proc_path: &str) -> io::Result<Vec<u32>> {
    let mut pids: Vec<u32> = fs
        .read_dir(Path::new(proc_path))?
        .iter()
        .filter_map(|entry| entry.file_name()?.to_str()?.parse().ok())
        .filter(|&pid| pid > 0)
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_list_pids_skips_non_numeric() {
        let mut fs = MockFs::new();
        fs.add_dir("/proc/42");
        fs.add_dir("/proc/7");
        fs.add_dir("/proc/self");
        fs.add_file("/proc/meminfo", "");

        assert_eq!(list_pids(&fs, "/proc").unwrap(), vec![7, 42]);
    }
}
