//! System metrics sampling from the Linux `/proc` filesystem.
//!
//! All pseudo-file access goes through the [`FileSystem`] trait so the
//! samplers and the Linux process capability run unchanged against an
//! in-memory [`MockFs`].
//!
//! ```text
//!   ┌──────────────────┐   ┌─────────────────────────┐
//!   │  SystemSampler   │   │  process::LinuxProvider │
//!   │  /proc/stat ...  │   │  /proc/[pid]/*          │
//!   └────────┬─────────┘   └────────────┬────────────┘
//!            └──────────────┬───────────┘
//!                    ┌──────▼──────┐
//!                    │  FileSystem │ (trait)
//!                    └──────┬──────┘
//!              ┌────────────┼────────────┐
//!       ┌──────▼──────┐ ┌───▼───┐ ┌──────▼──────┐
//!       │   RealFs    │ │MockFs │ │  Scenarios  │
//!       └─────────────┘ └───────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use sysprobe_core::collector::{MockFs, SystemSampler};
//! use sysprobe_core::os::NativeOs;
//!
//! let sampler = SystemSampler::new(MockFs::typical_system(), "/proc", Arc::new(NativeOs::new()));
//! let mem = sampler.virtual_memory().unwrap();
//! assert!(mem.total > 0);
//! ```

pub mod mock;
pub mod procfs;
pub mod traits;

pub use mock::MockFs;
pub use procfs::{SystemSampler, UserResolver};
pub use traits::{FileSystem, RealFs};
