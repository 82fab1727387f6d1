//! On-disk side of layerc that needs no privileges.
//!
//! This crate provides `SubvolumeLayout` for the subvolumes directory,
//! `SubvolumeDescriptor` for the JSON files that name a built layer, archive
//! reading for tarball items, and host tree enumeration plus the compact
//! `RenderedNode` format used to compare filesystem trees in tests and in
//! `layerc render`.

pub mod archive;
pub mod descriptor;
pub mod layout;
pub mod tree;

pub use archive::{
    archive_digest, read_archive, verify_archive_digest, ArchiveEntry, ArchiveEntryKind,
};
pub use descriptor::{current_hostname, SubvolumeDescriptor};
pub use layout::SubvolumeLayout;
pub use tree::{
    describe_node, enumerate_host_tree, parse_find_listing, render_host_tree, NodeMeta,
    RenderedNode, TreeEntry, TreeEntryKind,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename is durable until the parent directory
/// itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(#[from] layerc_schema::SchemaError),
    #[error("descriptor not found: {}", .0.display())]
    DescriptorNotFound(PathBuf),
    #[error("integrity check failed for '{}': expected {expected}, got {actual}", .path.display())]
    IntegrityFailure {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("subvolume was built on host '{found}', this is '{expected}'")]
    ForeignHost { expected: String, found: String },
    #[error("subvolume not found: {}", .0.display())]
    SubvolumeNotFound(PathBuf),
    #[error("invalid subvolume path '{0}'")]
    InvalidRelPath(String),
    #[error("unsupported archive entry '{path}' of type {kind}")]
    UnsupportedEntry { path: String, kind: String },
    #[error("invalid archive entry path: {0}")]
    InvalidEntryPath(String),
    #[error("archive entry '{path}' has {field} {value}, which does not fit in 32 bits")]
    OwnerOutOfRange {
        path: String,
        field: &'static str,
        value: u64,
    },
}
