use layerc_runtime::{RootOp, RuntimeError, Subvolume};
use layerc_schema::StatOptions;
use std::path::PathBuf;

/// Apply ownership then mode to `host_path`, overwriting whatever was there.
pub(crate) fn apply_stat_options(
    subvol: &mut Subvolume,
    host_path: PathBuf,
    opts: &StatOptions,
    mode: u32,
    recursive: bool,
) -> Result<(), RuntimeError> {
    let uid = subvol.resolve_user(&opts.user_or_root())?;
    let gid = subvol.resolve_group(&opts.group_or_root())?;
    subvol.run_as_root(&RootOp::Chown {
        path: host_path.clone(),
        uid,
        gid,
        recursive,
    })?;
    subvol.run_as_root(&RootOp::Chmod {
        path: host_path,
        mode,
        recursive,
    })
}
