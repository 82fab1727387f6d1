use crate::host::HostExecutor;
use crate::identity::{lookup_group, lookup_user};
use crate::virtual_fs::VirtualExecutor;
use crate::RuntimeError;
use layerc_schema::{PackageActionKind, Principal};
use layerc_store::{RenderedNode, TreeEntry};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One privileged filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootOp {
    CreateSubvolume {
        path: PathBuf,
    },
    /// Read-write snapshot of `source` at `dest`.
    SnapshotSubvolume {
        source: PathBuf,
        dest: PathBuf,
    },
    SetReadonly {
        path: PathBuf,
        readonly: bool,
    },
    /// `mkdir -p`
    MakeDirs {
        path: PathBuf,
    },
    /// Copy onto `dest` itself, never into it.
    CopyFile {
        source: PathBuf,
        dest: PathBuf,
    },
    Chown {
        path: PathBuf,
        uid: u32,
        gid: u32,
        recursive: bool,
    },
    Chmod {
        path: PathBuf,
        mode: u32,
        recursive: bool,
    },
    /// Extract without replacing existing objects or existing directory
    /// metadata.
    ExtractTarball {
        archive: PathBuf,
        into_dir: PathBuf,
    },
    PackageTransaction {
        source: PathBuf,
        install_root: PathBuf,
        action: PackageActionKind,
        packages: Vec<String>,
    },
}

impl RootOp {
    /// The command line that performs this operation on a real host.
    pub fn argv(&self) -> Vec<OsString> {
        fn os(s: impl AsRef<OsStr>) -> OsString {
            s.as_ref().to_os_string()
        }
        match self {
            RootOp::CreateSubvolume { path } => {
                vec![os("btrfs"), os("subvolume"), os("create"), os(path)]
            }
            RootOp::SnapshotSubvolume { source, dest } => vec![
                os("btrfs"),
                os("subvolume"),
                os("snapshot"),
                os(source),
                os(dest),
            ],
            RootOp::SetReadonly { path, readonly } => vec![
                os("btrfs"),
                os("property"),
                os("set"),
                os("-ts"),
                os(path),
                os("ro"),
                os(if *readonly { "true" } else { "false" }),
            ],
            RootOp::MakeDirs { path } => vec![os("mkdir"), os("-p"), os(path)],
            RootOp::CopyFile { source, dest } => vec![
                os("cp"),
                os("--no-target-directory"),
                os(source),
                os(dest),
            ],
            RootOp::Chown {
                path,
                uid,
                gid,
                recursive,
            } => {
                let mut argv = vec![os("chown")];
                if *recursive {
                    argv.push(os("-R"));
                }
                argv.push(os(format!("{uid}:{gid}")));
                argv.push(os(path));
                argv
            }
            RootOp::Chmod {
                path,
                mode,
                recursive,
            } => {
                let mut argv = vec![os("chmod")];
                if *recursive {
                    argv.push(os("-R"));
                }
                argv.push(os(format!("{mode:04o}")));
                argv.push(os(path));
                argv
            }
            RootOp::ExtractTarball { archive, .. } => vec![
                os("tar"),
                os("--no-overwrite-dir"),
                os("--keep-old-files"),
                os("--same-owner"),
                os("--preserve-permissions"),
                os("-xf"),
                os(archive),
            ],
            RootOp::PackageTransaction {
                source,
                install_root,
                action,
                packages,
            } => {
                let mut argv = vec![
                    os(source),
                    os("--install-root"),
                    os(install_root),
                    os("--"),
                    os(action.as_str()),
                    os("--assumeyes"),
                ];
                argv.extend(packages.iter().map(OsString::from));
                argv
            }
        }
    }

    pub fn cwd(&self) -> Option<&Path> {
        match self {
            RootOp::ExtractTarball { into_dir, .. } => Some(into_dir),
            _ => None,
        }
    }
}

impl fmt::Display for RootOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self
            .argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        match self.cwd() {
            Some(dir) => write!(f, "(cd {} && {line})", dir.display()),
            None => f.write_str(&line),
        }
    }
}

/// Runs [`RootOp`]s and inspects the trees they produce.
pub trait PrivilegedExecutor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn run(&self, op: &RootOp) -> Result<(), RuntimeError>;

    fn exists(&self, path: &Path) -> bool;

    /// Every object below `root`, sorted, without following symlinks.
    fn enumerate(&self, root: &Path) -> Result<Vec<TreeEntry>, RuntimeError>;

    fn render(&self, root: &Path) -> Result<RenderedNode, RuntimeError>;

    fn resolve_user(&self, principal: &Principal) -> Result<u32, RuntimeError> {
        match principal {
            Principal::Id(id) => Ok(*id),
            Principal::Name(name) => lookup_user(name),
        }
    }

    fn resolve_group(&self, principal: &Principal) -> Result<u32, RuntimeError> {
        match principal {
            Principal::Id(id) => Ok(*id),
            Principal::Name(name) => lookup_group(name),
        }
    }
}

pub fn select_executor(name: &str) -> Result<Arc<dyn PrivilegedExecutor>, RuntimeError> {
    match name {
        "sudo" => Ok(Arc::new(HostExecutor::sudo())),
        "direct" => Ok(Arc::new(HostExecutor::direct())),
        "virtual" => Ok(Arc::new(VirtualExecutor::new())),
        other => Err(RuntimeError::ExecutorUnavailable(other.to_owned())),
    }
}
