use super::{construction_error, ImageItem};
use crate::CoreError;
use layerc_runtime::{RootOp, RuntimeError, Subvolume};
use layerc_schema::{require_directory, ImagePath, Provides, Requires, TargetLabel};
use layerc_store::{read_archive, verify_archive_digest, ArchiveEntryKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Unpacks a tar archive into an existing image directory.
///
/// The archive is listed once, at construction. Directory entries provide
/// directories; every other entry type provides a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tarball {
    from_target: TargetLabel,
    tarball: PathBuf,
    into_dir: ImagePath,
    provided: Vec<Provides>,
}

impl Tarball {
    pub fn new(
        from_target: TargetLabel,
        tarball: PathBuf,
        into_dir: &str,
        blake3: Option<&str>,
    ) -> Result<Self, CoreError> {
        let into_dir =
            ImagePath::new(into_dir).map_err(|e| construction_error(&from_target, "tarball", e))?;
        if let Some(expected) = blake3 {
            verify_archive_digest(&tarball, expected)
                .map_err(|e| construction_error(&from_target, "tarball", e))?;
        }
        let entries =
            read_archive(&tarball).map_err(|e| construction_error(&from_target, "tarball", e))?;

        let mut seen = BTreeSet::new();
        let mut provided = Vec::new();
        for entry in entries {
            if entry.path.is_root() {
                continue;
            }
            let path = into_dir.join(&entry.path);
            if !seen.insert(path.clone()) {
                continue;
            }
            provided.push(match entry.kind {
                ArchiveEntryKind::Directory => Provides::Directory(path),
                ArchiveEntryKind::File | ArchiveEntryKind::Symlink | ArchiveEntryKind::HardLink => {
                    Provides::File(path)
                }
            });
        }
        debug!(
            "tarball {} provides {} paths",
            tarball.display(),
            provided.len()
        );
        Ok(Self {
            from_target,
            tarball,
            into_dir,
            provided,
        })
    }

    pub fn tarball(&self) -> &Path {
        &self.tarball
    }

    pub fn into_dir(&self) -> &ImagePath {
        &self.into_dir
    }
}

impl ImageItem for Tarball {
    fn from_target(&self) -> &TargetLabel {
        &self.from_target
    }

    fn provides(&self) -> Vec<Provides> {
        self.provided.clone()
    }

    fn requires(&self) -> Vec<Requires> {
        vec![require_directory(self.into_dir.clone())]
    }

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError> {
        let into_dir = subvol.host_path(&self.into_dir);
        subvol.run_as_root(&RootOp::ExtractTarball {
            archive: self.tarball.clone(),
            into_dir,
        })
    }
}
