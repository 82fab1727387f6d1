use super::stat::apply_stat_options;
use super::{construction_error, ImageItem};
use crate::CoreError;
use layerc_runtime::{RootOp, RuntimeError, Subvolume};
use layerc_schema::{require_directory, ImagePath, Provides, Requires, StatOptions, TargetLabel};

/// Creates `path_to_make` below `into_dir`.
///
/// Stat options are applied recursively from the first created segment
/// down, so metadata of pre-existing directories in that subtree is
/// overwritten. A missing `into_dir` is created with default metadata
/// instead of failing the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeDirs {
    from_target: TargetLabel,
    into_dir: ImagePath,
    path_to_make: ImagePath,
    stat: StatOptions,
}

impl MakeDirs {
    pub fn new(
        from_target: TargetLabel,
        into_dir: &str,
        path_to_make: &str,
        stat: StatOptions,
    ) -> Result<Self, CoreError> {
        let into_dir =
            ImagePath::new(into_dir).map_err(|e| construction_error(&from_target, "make_dirs", e))?;
        let path_to_make = ImagePath::new(path_to_make)
            .map_err(|e| construction_error(&from_target, "make_dirs", e))?;
        if path_to_make.is_root() {
            return Err(construction_error(
                &from_target,
                "make_dirs",
                "path_to_make is empty",
            ));
        }
        Ok(Self {
            from_target,
            into_dir,
            path_to_make,
            stat,
        })
    }

    pub fn into_dir(&self) -> &ImagePath {
        &self.into_dir
    }

    pub fn full_path(&self) -> ImagePath {
        self.into_dir.join(&self.path_to_make)
    }

    /// `into_dir/<first segment of path_to_make>`
    fn stat_root(&self) -> ImagePath {
        self.full_path()
            .descendants_from(&self.into_dir)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.full_path())
    }
}

impl ImageItem for MakeDirs {
    fn from_target(&self) -> &TargetLabel {
        &self.from_target
    }

    fn provides(&self) -> Vec<Provides> {
        self.full_path()
            .descendants_from(&self.into_dir)
            .into_iter()
            .map(Provides::Directory)
            .collect()
    }

    fn requires(&self) -> Vec<Requires> {
        vec![require_directory(self.into_dir.clone())]
    }

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError> {
        let full = subvol.host_path(&self.full_path());
        subvol.run_as_root(&RootOp::MakeDirs { path: full })?;
        let stat_root = subvol.host_path(&self.stat_root());
        apply_stat_options(
            subvol,
            stat_root,
            &self.stat,
            self.stat.directory_mode(),
            true,
        )
    }
}
