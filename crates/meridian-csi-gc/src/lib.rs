//! Node-local garbage collection of agent binaries
//!
//! The CSI driver installs one directory per agent version and records
//! every pod using a version with a marker file. This crate removes the
//! versions no pod references anymore, keeping the latest one.

pub mod binaries;
pub mod controller;
pub mod distribution;
pub mod error;
pub mod fs;

pub use binaries::{BinaryGarbageCollector, GcReport};
pub use controller::{error_policy, reconcile, GcContext};
pub use error::GcError;
pub use fs::{Filesystem, OsFilesystem};
