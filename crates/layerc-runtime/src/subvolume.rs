use crate::executor::{PrivilegedExecutor, RootOp};
use crate::RuntimeError;
use layerc_schema::{ImagePath, Principal};
use layerc_store::{RenderedNode, TreeEntry};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A copy-on-write snapshot on the host, driven through an executor.
///
/// Mutating methods take `&mut self`: one build owns a subvolume at a time.
#[derive(Clone)]
pub struct Subvolume {
    path: PathBuf,
    executor: Arc<dyn PrivilegedExecutor>,
}

impl fmt::Debug for Subvolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subvolume")
            .field("path", &self.path)
            .field("executor", &self.executor.name())
            .finish()
    }
}

impl Subvolume {
    pub fn new(path: impl Into<PathBuf>, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self {
            path: path.into(),
            executor,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn executor(&self) -> &Arc<dyn PrivilegedExecutor> {
        &self.executor
    }

    /// Host location of an image path inside this subvolume.
    pub fn host_path(&self, path: &ImagePath) -> PathBuf {
        path.to_host_path(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.executor.exists(&self.path)
    }

    pub fn create(&mut self) -> Result<(), RuntimeError> {
        self.run_as_root(&RootOp::CreateSubvolume {
            path: self.path.clone(),
        })
    }

    /// Replace this (not yet existing) subvolume with a read-write
    /// snapshot of `parent`.
    pub fn snapshot_from(&mut self, parent: &Path) -> Result<(), RuntimeError> {
        self.run_as_root(&RootOp::SnapshotSubvolume {
            source: parent.to_path_buf(),
            dest: self.path.clone(),
        })
    }

    pub fn set_readonly(&mut self, readonly: bool) -> Result<(), RuntimeError> {
        self.run_as_root(&RootOp::SetReadonly {
            path: self.path.clone(),
            readonly,
        })
    }

    pub fn run_as_root(&mut self, op: &RootOp) -> Result<(), RuntimeError> {
        self.executor.run(op)
    }

    pub fn resolve_user(&self, principal: &Principal) -> Result<u32, RuntimeError> {
        self.executor.resolve_user(principal)
    }

    pub fn resolve_group(&self, principal: &Principal) -> Result<u32, RuntimeError> {
        self.executor.resolve_group(principal)
    }

    pub fn enumerate(&self) -> Result<Vec<TreeEntry>, RuntimeError> {
        self.executor.enumerate(&self.path)
    }

    pub fn render(&self) -> Result<RenderedNode, RuntimeError> {
        self.executor.render(&self.path)
    }
}
