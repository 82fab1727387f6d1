use super::stat::apply_stat_options;
use super::{construction_error, ImageItem};
use crate::CoreError;
use layerc_runtime::{RootOp, RuntimeError, Subvolume};
use layerc_schema::{require_directory, ImagePath, Provides, Requires, StatOptions, TargetLabel};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Copies one host file into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFile {
    from_target: TargetLabel,
    source: PathBuf,
    dest: ImagePath,
    stat: StatOptions,
}

impl CopyFile {
    /// A `dest` ending in `/` names a directory: the file keeps the source's
    /// basename inside it.
    pub fn new(
        from_target: TargetLabel,
        source: PathBuf,
        dest: &str,
        stat: StatOptions,
    ) -> Result<Self, CoreError> {
        let dest_path = if dest.ends_with('/') {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    construction_error(
                        &from_target,
                        "copy_file",
                        format!("source {} has no file name", source.display()),
                    )
                })?;
            ImagePath::new(dest)
                .and_then(|d| d.join_str(&name))
                .map_err(|e| construction_error(&from_target, "copy_file", e))?
        } else {
            ImagePath::new(dest).map_err(|e| construction_error(&from_target, "copy_file", e))?
        };
        if dest_path.is_root() {
            return Err(construction_error(
                &from_target,
                "copy_file",
                "destination cannot be the image root",
            ));
        }
        Ok(Self {
            from_target,
            source,
            dest: dest_path,
            stat,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn dest(&self) -> &ImagePath {
        &self.dest
    }

    pub fn stat(&self) -> &StatOptions {
        &self.stat
    }
}

impl ImageItem for CopyFile {
    fn from_target(&self) -> &TargetLabel {
        &self.from_target
    }

    fn provides(&self) -> Vec<Provides> {
        vec![Provides::File(self.dest.clone())]
    }

    fn requires(&self) -> Vec<Requires> {
        self.dest
            .parent()
            .map(require_directory)
            .into_iter()
            .collect()
    }

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError> {
        let executable = fs::metadata(&self.source)?.permissions().mode() & 0o111 != 0;
        let dest = subvol.host_path(&self.dest);
        subvol.run_as_root(&RootOp::CopyFile {
            source: self.source.clone(),
            dest: dest.clone(),
        })?;
        apply_stat_options(subvol, dest, &self.stat, self.stat.file_mode(executable), false)
    }
}
