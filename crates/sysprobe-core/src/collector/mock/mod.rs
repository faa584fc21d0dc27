//! Mock filesystem and `/proc` fixtures for tests and doc examples.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::BOOT_TIME;
