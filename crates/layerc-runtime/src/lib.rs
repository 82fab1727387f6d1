//! Privileged side of layerc.
//!
//! Every mutation of a subvolume is expressed as a typed [`RootOp`] and run
//! through a [`PrivilegedExecutor`]. [`HostExecutor`] turns operations into
//! subprocesses (`btrfs`, `cp`, `tar`, ...), optionally under `sudo`.
//! [`VirtualExecutor`] applies the same operations to an in-memory
//! filesystem so builds can be verified without root or btrfs.

pub mod executor;
pub mod host;
pub mod identity;
pub mod prereq;
pub mod subvolume;
pub mod virtual_fs;

pub use executor::{select_executor, PrivilegedExecutor, RootOp};
pub use host::{Escalation, HostExecutor};
pub use prereq::{check_host_prereqs, format_missing, MissingPrereq};
pub use subvolume::Subvolume;
pub use virtual_fs::VirtualExecutor;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] layerc_store::StoreError),
    #[error("executor '{0}' is not available")]
    ExecutorUnavailable(String),
    #[error("command failed: {0}")]
    ExecFailed(String),
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    #[error("unknown {0}")]
    UnknownIdentity(String),
    #[error("no such file or directory: {}", .0.display())]
    NotFound(PathBuf),
    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("is a directory: {}", .0.display())]
    IsADirectory(PathBuf),
    #[error("read-only file system: {}", .0.display())]
    ReadOnly(PathBuf),
}
