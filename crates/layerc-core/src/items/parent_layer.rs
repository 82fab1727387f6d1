use super::{construction_error, ImageItem};
use crate::CoreError;
use layerc_runtime::{PrivilegedExecutor, RuntimeError, Subvolume};
use layerc_schema::{ImagePath, Provides, Requires, TargetLabel};
use layerc_store::TreeEntryKind;
use std::path::{Path, PathBuf};

/// Starts a layer from a read-write snapshot of an existing subvolume.
///
/// The parent tree is enumerated once, at construction, and everything in
/// it is provided to the child layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLayer {
    from_target: TargetLabel,
    path: PathBuf,
    provided: Vec<Provides>,
}

impl ParentLayer {
    pub fn new(
        from_target: TargetLabel,
        path: PathBuf,
        executor: &dyn PrivilegedExecutor,
    ) -> Result<Self, CoreError> {
        if !executor.exists(&path) {
            return Err(construction_error(
                &from_target,
                "parent_layer",
                format!("parent subvolume {} does not exist", path.display()),
            ));
        }
        let entries = executor
            .enumerate(&path)
            .map_err(|e| construction_error(&from_target, "parent_layer", e))?;
        let mut provided = vec![Provides::Directory(ImagePath::root())];
        provided.extend(entries.into_iter().map(|e| match e.kind {
            TreeEntryKind::Directory => Provides::Directory(e.path),
            TreeEntryKind::File | TreeEntryKind::Symlink => Provides::File(e.path),
        }));
        Ok(Self {
            from_target,
            path,
            provided,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageItem for ParentLayer {
    fn from_target(&self) -> &TargetLabel {
        &self.from_target
    }

    fn provides(&self) -> Vec<Provides> {
        self.provided.clone()
    }

    fn requires(&self) -> Vec<Requires> {
        Vec::new()
    }

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError> {
        subvol.snapshot_from(&self.path)
    }
}
