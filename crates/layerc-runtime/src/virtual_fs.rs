//! In-memory filesystem that applies [`RootOp`]s the way the host tools do.
//!
//! Host files named as copy sources or archives are read from the real
//! filesystem; everything they land in lives in memory. Package sources are
//! simulated from a catalog registered up front.

use crate::executor::{PrivilegedExecutor, RootOp};
use crate::RuntimeError;
use layerc_schema::{ImagePath, PackageActionKind, Principal, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use layerc_store::{
    describe_node, read_archive, ArchiveEntryKind, NodeMeta, RenderedNode, TreeEntry,
    TreeEntryKind,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const UMASK: u32 = 0o022;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    kind: NodeKind,
    mode: u32,
    uid: u32,
    gid: u32,
}

impl Node {
    fn dir(mode: u32, uid: u32, gid: u32) -> Self {
        Self {
            kind: NodeKind::Dir,
            mode,
            uid,
            gid,
        }
    }

    fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    fn tree_kind(&self) -> TreeEntryKind {
        match self.kind {
            NodeKind::Dir => TreeEntryKind::Directory,
            NodeKind::File(_) => TreeEntryKind::File,
            NodeKind::Symlink(_) => TreeEntryKind::Symlink,
        }
    }
}

#[derive(Debug)]
struct World {
    nodes: BTreeMap<PathBuf, Node>,
    subvolumes: BTreeSet<PathBuf>,
    readonly: BTreeSet<PathBuf>,
    installed: BTreeMap<PathBuf, BTreeSet<String>>,
    history: Vec<RootOp>,
}

impl Default for World {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::dir(DEFAULT_DIR_MODE, 0, 0));
        Self {
            nodes,
            subvolumes: BTreeSet::new(),
            readonly: BTreeSet::new(),
            installed: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

fn rebase(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rel) if rel.as_os_str().is_empty() => to.to_path_buf(),
        Ok(rel) => to.join(rel),
        Err(_) => path.to_path_buf(),
    }
}

fn in_subtree(path: &Path, root: &Path, recursive: bool) -> bool {
    path == root || (recursive && path.starts_with(root))
}

impl World {
    fn check_writable(&self, path: &Path) -> Result<(), RuntimeError> {
        match self.readonly.iter().find(|ro| path.starts_with(ro)) {
            Some(ro) => Err(RuntimeError::ReadOnly(ro.clone())),
            None => Ok(()),
        }
    }

    fn require_dir(&self, path: &Path) -> Result<(), RuntimeError> {
        match self.nodes.get(path) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(RuntimeError::NotADirectory(path.to_path_buf())),
            None => Err(RuntimeError::NotFound(path.to_path_buf())),
        }
    }

    /// `mkdir -p` semantics: create missing ancestors and `path` itself
    /// with default metadata.
    fn make_dirs(&mut self, path: &Path) -> Result<(), RuntimeError> {
        let mut chain: Vec<&Path> = path.ancestors().collect();
        chain.reverse();
        for dir in chain {
            match self.nodes.get(dir) {
                Some(node) if node.is_dir() => {}
                Some(_) => return Err(RuntimeError::NotADirectory(dir.to_path_buf())),
                None => {
                    self.nodes
                        .insert(dir.to_path_buf(), Node::dir(DEFAULT_DIR_MODE, 0, 0));
                }
            }
        }
        Ok(())
    }

    fn create_subvolume(&mut self, path: &Path) -> Result<(), RuntimeError> {
        self.check_writable(path)?;
        if self.nodes.contains_key(path) {
            return Err(RuntimeError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            self.make_dirs(parent)?;
        }
        self.nodes
            .insert(path.to_path_buf(), Node::dir(DEFAULT_DIR_MODE, 0, 0));
        self.subvolumes.insert(path.to_path_buf());
        Ok(())
    }

    fn snapshot(&mut self, source: &Path, dest: &Path) -> Result<(), RuntimeError> {
        if !self.subvolumes.contains(source) {
            return Err(RuntimeError::NotFound(source.to_path_buf()));
        }
        self.check_writable(dest)?;
        if self.nodes.contains_key(dest) {
            return Err(RuntimeError::AlreadyExists(dest.to_path_buf()));
        }
        if let Some(parent) = dest.parent() {
            self.make_dirs(parent)?;
        }
        let copied: Vec<(PathBuf, Node)> = self
            .nodes
            .iter()
            .filter(|(p, _)| p.starts_with(source))
            .map(|(p, n)| (rebase(p, source, dest), n.clone()))
            .collect();
        self.nodes.extend(copied);
        if let Some(pkgs) = self.installed.get(source).cloned() {
            self.installed.insert(dest.to_path_buf(), pkgs);
        }
        self.subvolumes.insert(dest.to_path_buf());
        Ok(())
    }

    fn set_readonly(&mut self, path: &Path, readonly: bool) -> Result<(), RuntimeError> {
        if !self.subvolumes.contains(path) {
            return Err(RuntimeError::NotFound(path.to_path_buf()));
        }
        if readonly {
            self.readonly.insert(path.to_path_buf());
        } else {
            self.readonly.remove(path);
        }
        Ok(())
    }

    fn copy_file(&mut self, source: &Path, dest: &Path) -> Result<(), RuntimeError> {
        self.check_writable(dest)?;
        let data = fs::read(source)?;
        let source_mode = fs::metadata(source)?.permissions().mode();
        let parent = dest
            .parent()
            .ok_or_else(|| RuntimeError::IsADirectory(dest.to_path_buf()))?;
        self.require_dir(parent)?;
        match self.nodes.get_mut(dest) {
            Some(node) if node.is_dir() => Err(RuntimeError::IsADirectory(dest.to_path_buf())),
            Some(node) => {
                node.kind = NodeKind::File(data);
                Ok(())
            }
            None => {
                self.nodes.insert(
                    dest.to_path_buf(),
                    Node {
                        kind: NodeKind::File(data),
                        mode: source_mode & 0o777 & !UMASK,
                        uid: 0,
                        gid: 0,
                    },
                );
                Ok(())
            }
        }
    }

    fn chown(&mut self, path: &Path, uid: u32, gid: u32, recursive: bool) -> Result<(), RuntimeError> {
        self.check_writable(path)?;
        if !self.nodes.contains_key(path) {
            return Err(RuntimeError::NotFound(path.to_path_buf()));
        }
        for (p, node) in &mut self.nodes {
            if in_subtree(p, path, recursive) {
                node.uid = uid;
                node.gid = gid;
            }
        }
        Ok(())
    }

    fn chmod(&mut self, path: &Path, mode: u32, recursive: bool) -> Result<(), RuntimeError> {
        self.check_writable(path)?;
        if !self.nodes.contains_key(path) {
            return Err(RuntimeError::NotFound(path.to_path_buf()));
        }
        for (p, node) in &mut self.nodes {
            if in_subtree(p, path, recursive) && !matches!(node.kind, NodeKind::Symlink(_)) {
                node.mode = mode & 0o7777;
            }
        }
        Ok(())
    }

    /// GNU tar with `--keep-old-files --no-overwrite-dir`: every entry that
    /// would replace an existing object fails, the rest still land, and the
    /// whole extraction reports failure.
    fn extract(&mut self, archive: &Path, into_dir: &Path) -> Result<(), RuntimeError> {
        self.check_writable(into_dir)?;
        self.require_dir(into_dir)?;
        let entries = read_archive(archive)?;
        let mut failures = Vec::new();

        for entry in entries {
            if entry.path.is_root() {
                continue;
            }
            let target = entry.path.to_host_path(into_dir);
            if let Some(parent) = target.parent() {
                if let Err(e) = self.make_dirs(parent) {
                    failures.push(format!("{}: {e}", entry.path));
                    continue;
                }
            }
            let existing = self.nodes.get(&target);
            let node = match (entry.kind, existing) {
                (ArchiveEntryKind::Directory, Some(node)) if node.is_dir() => continue,
                (_, Some(_)) => {
                    failures.push(format!("{}: Cannot open: File exists", entry.path));
                    continue;
                }
                (ArchiveEntryKind::Directory, None) => Node::dir(entry.mode, entry.uid, entry.gid),
                (ArchiveEntryKind::File, None) => Node {
                    kind: NodeKind::File(entry.data),
                    mode: entry.mode,
                    uid: entry.uid,
                    gid: entry.gid,
                },
                (ArchiveEntryKind::Symlink, None) => Node {
                    kind: NodeKind::Symlink(entry.link_target.unwrap_or_default()),
                    mode: 0o777,
                    uid: entry.uid,
                    gid: entry.gid,
                },
                (ArchiveEntryKind::HardLink, None) => {
                    let linked = entry
                        .link_target
                        .as_deref()
                        .and_then(|t| ImagePath::new(&t.to_string_lossy()).ok())
                        .map(|t| t.to_host_path(into_dir))
                        .and_then(|t| self.nodes.get(&t).cloned());
                    match linked {
                        Some(node) if !node.is_dir() => node,
                        _ => {
                            failures.push(format!("{}: Cannot hard link", entry.path));
                            continue;
                        }
                    }
                }
            };
            self.nodes.insert(target, node);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::ExecFailed(format!(
                "tar into {}: {}",
                into_dir.display(),
                failures.join("; ")
            )))
        }
    }

    fn children<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a PathBuf, &'a Node)> + 'a {
        self.nodes
            .iter()
            .filter(move |(p, _)| p.parent() == Some(dir) && p.as_path() != dir)
    }

    fn render(&self, path: &Path, node: &Node) -> RenderedNode {
        let (size, link_target) = match &node.kind {
            NodeKind::File(data) => (data.len() as u64, None),
            NodeKind::Symlink(t) => (0, Some(t.to_string_lossy().into_owned())),
            NodeKind::Dir => (0, None),
        };
        let label = describe_node(&NodeMeta {
            kind: node.tree_kind(),
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            size,
            link_target: link_target.as_deref(),
        });
        if !node.is_dir() {
            return RenderedNode::Leaf(label);
        }
        let children = self
            .children(path)
            .filter_map(|(p, n)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some((name, self.render(p, n)))
            })
            .collect();
        RenderedNode::Dir { label, children }
    }
}

/// Files a simulated package installs, keyed by image path.
type PackageFiles = Vec<(String, Vec<u8>)>;

#[derive(Debug)]
pub struct VirtualExecutor {
    world: Mutex<World>,
    catalog: BTreeMap<String, PackageFiles>,
    package_sources: BTreeSet<PathBuf>,
    users: BTreeMap<String, u32>,
    groups: BTreeMap<String, u32>,
}

impl Default for VirtualExecutor {
    fn default() -> Self {
        Self {
            world: Mutex::new(World::default()),
            catalog: BTreeMap::new(),
            package_sources: BTreeSet::new(),
            users: BTreeMap::from([("root".to_owned(), 0)]),
            groups: BTreeMap::from([("root".to_owned(), 0)]),
        }
    }
}

impl VirtualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept package transactions through the wrapper at `path`.
    #[must_use]
    pub fn with_package_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_sources.insert(path.into());
        self
    }

    #[must_use]
    pub fn with_package(mut self, name: &str, files: &[(&str, &[u8])]) -> Self {
        self.catalog.insert(
            name.to_owned(),
            files
                .iter()
                .map(|(path, data)| ((*path).to_owned(), data.to_vec()))
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn with_user(mut self, name: &str, uid: u32) -> Self {
        self.users.insert(name.to_owned(), uid);
        self
    }

    #[must_use]
    pub fn with_group(mut self, name: &str, gid: u32) -> Self {
        self.groups.insert(name.to_owned(), gid);
        self
    }

    /// Every operation run so far, failed ones included.
    pub fn history(&self) -> Result<Vec<RootOp>, RuntimeError> {
        Ok(self.lock()?.history.clone())
    }

    pub fn is_readonly(&self, path: &Path) -> Result<bool, RuntimeError> {
        Ok(self.lock()?.readonly.contains(path))
    }

    fn lock(&self) -> Result<MutexGuard<'_, World>, RuntimeError> {
        self.world
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }

    /// `milk` for `milk-2` or `milk-2.71` when only `milk` is in the catalog.
    fn versioned_stem<'a>(&self, pkg: &'a str) -> Option<&'a str> {
        let (stem, version) = pkg.rsplit_once('-')?;
        let numeric = version.starts_with(|c: char| c.is_ascii_digit())
            && version.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
        (numeric && self.catalog.contains_key(stem)).then_some(stem)
    }

    fn package_transaction(
        &self,
        world: &mut World,
        source: &Path,
        install_root: &Path,
        action: PackageActionKind,
        packages: &[String],
    ) -> Result<(), RuntimeError> {
        if !self.package_sources.contains(source) {
            return Err(RuntimeError::ExecFailed(format!(
                "package source {} not found",
                source.display()
            )));
        }
        world.check_writable(install_root)?;
        world.require_dir(install_root)?;

        match action {
            PackageActionKind::Install => {
                let mut files = Vec::new();
                for pkg in packages {
                    let Some(pkg_files) = self.catalog.get(pkg) else {
                        if let Some(stem) = self.versioned_stem(pkg) {
                            return Err(RuntimeError::PolicyViolation(format!(
                                "{pkg} pins a version of {stem}, the package source does"
                            )));
                        }
                        return Err(RuntimeError::ExecFailed(format!(
                            "No package {pkg} available."
                        )));
                    };
                    for (path, data) in pkg_files {
                        let image_path = ImagePath::new(path)
                            .map_err(|e| RuntimeError::ExecFailed(format!("{pkg}: {e}")))?;
                        files.push((image_path.to_host_path(install_root), data.clone()));
                    }
                }
                for (target, data) in files {
                    if let Some(parent) = target.parent() {
                        world.make_dirs(parent)?;
                    }
                    world.nodes.insert(
                        target,
                        Node {
                            kind: NodeKind::File(data),
                            mode: DEFAULT_FILE_MODE,
                            uid: 0,
                            gid: 0,
                        },
                    );
                }
                world
                    .installed
                    .entry(install_root.to_path_buf())
                    .or_default()
                    .extend(packages.iter().cloned());
            }
            PackageActionKind::Remove => {
                let installed = world
                    .installed
                    .entry(install_root.to_path_buf())
                    .or_default();
                let removed: Vec<String> = packages
                    .iter()
                    .filter(|p| installed.remove(*p))
                    .cloned()
                    .collect();
                for pkg in removed {
                    for (path, _) in self.catalog.get(&pkg).into_iter().flatten() {
                        if let Ok(image_path) = ImagePath::new(path) {
                            world.nodes.remove(&image_path.to_host_path(install_root));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl PrivilegedExecutor for VirtualExecutor {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn run(&self, op: &RootOp) -> Result<(), RuntimeError> {
        let mut world = self.lock()?;
        debug!(executor = "virtual", "{op}");
        world.history.push(op.clone());
        match op {
            RootOp::CreateSubvolume { path } => world.create_subvolume(path),
            RootOp::SnapshotSubvolume { source, dest } => world.snapshot(source, dest),
            RootOp::SetReadonly { path, readonly } => world.set_readonly(path, *readonly),
            RootOp::MakeDirs { path } => {
                world.check_writable(path)?;
                world.make_dirs(path)
            }
            RootOp::CopyFile { source, dest } => world.copy_file(source, dest),
            RootOp::Chown {
                path,
                uid,
                gid,
                recursive,
            } => world.chown(path, *uid, *gid, *recursive),
            RootOp::Chmod {
                path,
                mode,
                recursive,
            } => world.chmod(path, *mode, *recursive),
            RootOp::ExtractTarball { archive, into_dir } => world.extract(archive, into_dir),
            RootOp::PackageTransaction {
                source,
                install_root,
                action,
                packages,
            } => self.package_transaction(&mut world, source, install_root, *action, packages),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().is_ok_and(|w| w.nodes.contains_key(path))
    }

    fn enumerate(&self, root: &Path) -> Result<Vec<TreeEntry>, RuntimeError> {
        let world = self.lock()?;
        world.require_dir(root)?;
        let mut entries = Vec::new();
        for (path, node) in &world.nodes {
            if path == root || !path.starts_with(root) {
                continue;
            }
            let rel = rebase(path, root, Path::new("/"));
            let image_path = ImagePath::new(&rel.to_string_lossy())
                .map_err(|e| RuntimeError::ExecFailed(e.to_string()))?;
            entries.push(TreeEntry {
                path: image_path,
                kind: node.tree_kind(),
            });
        }
        entries.sort();
        Ok(entries)
    }

    fn render(&self, root: &Path) -> Result<RenderedNode, RuntimeError> {
        let world = self.lock()?;
        let node = world
            .nodes
            .get(root)
            .ok_or_else(|| RuntimeError::NotFound(root.to_path_buf()))?;
        Ok(world.render(root, node))
    }

    fn resolve_user(&self, principal: &Principal) -> Result<u32, RuntimeError> {
        match principal {
            Principal::Id(id) => Ok(*id),
            Principal::Name(name) => self
                .users
                .get(name)
                .copied()
                .ok_or_else(|| RuntimeError::UnknownIdentity(format!("user '{name}'"))),
        }
    }

    fn resolve_group(&self, principal: &Principal) -> Result<u32, RuntimeError> {
        match principal {
            Principal::Id(id) => Ok(*id),
            Principal::Name(name) => self
                .groups
                .get(name)
                .copied()
                .ok_or_else(|| RuntimeError::UnknownIdentity(format!("group '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(exec: &VirtualExecutor, op: RootOp) -> Result<(), RuntimeError> {
        exec.run(&op)
    }

    fn subvol(exec: &VirtualExecutor, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        run(exec, RootOp::CreateSubvolume { path: p.clone() }).unwrap();
        p
    }

    #[test]
    fn new_subvolume_renders_empty_dir() {
        let exec = VirtualExecutor::new();
        let vol = subvol(&exec, "/subvols/a/volume");
        assert_eq!(exec.render(&vol).unwrap().to_json(), json!(["(Dir)", {}]));
        assert!(exec.exists(Path::new("/subvols/a")));
        assert!(matches!(
            run(&exec, RootOp::CreateSubvolume { path: vol }),
            Err(RuntimeError::AlreadyExists(_))
        ));
    }

    #[test]
    fn copy_chown_chmod() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"0123456789abc").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();

        let exec = VirtualExecutor::new();
        let vol = subvol(&exec, "/s/vol");
        run(&exec, RootOp::MakeDirs { path: vol.join("d") }).unwrap();
        run(
            &exec,
            RootOp::CopyFile {
                source: src.clone(),
                dest: vol.join("d/f"),
            },
        )
        .unwrap();
        assert_eq!(
            exec.render(&vol).unwrap().to_json(),
            json!(["(Dir)", {"d": ["(Dir)", {"f": ["(File m755 d13)"]}]}])
        );

        run(
            &exec,
            RootOp::Chown {
                path: vol.join("d/f"),
                uid: 12,
                gid: 34,
                recursive: false,
            },
        )
        .unwrap();
        run(
            &exec,
            RootOp::Chmod {
                path: vol.join("d/f"),
                mode: 0o600,
                recursive: false,
            },
        )
        .unwrap();
        assert_eq!(
            exec.render(&vol.join("d")).unwrap().to_json(),
            json!(["(Dir)", {"f": ["(File m600 o12:34 d13)"]}])
        );
    }

    #[test]
    fn copy_into_missing_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"").unwrap();
        let exec = VirtualExecutor::new();
        let vol = subvol(&exec, "/s/vol");
        let err = run(
            &exec,
            RootOp::CopyFile {
                source: src,
                dest: vol.join("no_dir/f"),
            },
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound(_)));
    }

    #[test]
    fn snapshot_is_isolated_from_parent() {
        let exec = VirtualExecutor::new();
        let parent = subvol(&exec, "/s/parent");
        run(&exec, RootOp::MakeDirs { path: parent.join("a") }).unwrap();
        run(
            &exec,
            RootOp::SetReadonly {
                path: parent.clone(),
                readonly: true,
            },
        )
        .unwrap();
        assert!(matches!(
            run(&exec, RootOp::MakeDirs { path: parent.join("b") }),
            Err(RuntimeError::ReadOnly(_))
        ));

        let child = PathBuf::from("/s/child");
        run(
            &exec,
            RootOp::SnapshotSubvolume {
                source: parent.clone(),
                dest: child.clone(),
            },
        )
        .unwrap();
        run(&exec, RootOp::MakeDirs { path: child.join("c") }).unwrap();

        assert_eq!(
            exec.render(&parent).unwrap().to_json(),
            json!(["(Dir)", {"a": ["(Dir)", {}]}])
        );
        assert_eq!(
            exec.render(&child).unwrap().to_json(),
            json!(["(Dir)", {"a": ["(Dir)", {}], "c": ["(Dir)", {}]}])
        );
    }

    #[test]
    fn package_transactions_use_catalog() {
        let exec = VirtualExecutor::new()
            .with_package_source("/bin/yum-snap")
            .with_package("milk", &[("/usr/share/milk.txt", &b"milk 2.71 8\n"[..])]);
        let vol = subvol(&exec, "/s/vol");
        let install = |pkgs: &[&str]| RootOp::PackageTransaction {
            source: "/bin/yum-snap".into(),
            install_root: vol.clone(),
            action: PackageActionKind::Install,
            packages: pkgs.iter().map(|p| (*p).to_owned()).collect(),
        };

        run(&exec, install(&["milk"])).unwrap();
        let tree = exec.render(&vol).unwrap();
        let milk = tree
            .at(&ImagePath::new("/usr/share/milk.txt").unwrap())
            .unwrap();
        assert_eq!(milk.label(), "(File d12)");

        assert!(matches!(
            run(&exec, install(&["cheese"])),
            Err(RuntimeError::ExecFailed(_))
        ));
        assert!(matches!(
            run(&exec, install(&["milk-2.71"])),
            Err(RuntimeError::PolicyViolation(_))
        ));

        run(
            &exec,
            RootOp::PackageTransaction {
                source: "/bin/yum-snap".into(),
                install_root: vol.clone(),
                action: PackageActionKind::Remove,
                packages: vec!["milk".to_owned(), "never-installed".to_owned()],
            },
        )
        .unwrap();
        let tree = exec.render(&vol).unwrap();
        assert!(tree.at(&ImagePath::new("/usr/share/milk.txt").unwrap()).is_none());
    }

    #[test]
    fn unknown_package_source_fails() {
        let exec = VirtualExecutor::new();
        let vol = subvol(&exec, "/s/vol");
        let err = run(
            &exec,
            RootOp::PackageTransaction {
                source: "bug".into(),
                install_root: vol,
                action: PackageActionKind::Install,
                packages: vec!["milk".to_owned()],
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("bug"));
    }

    #[test]
    fn enumerate_is_relative_and_sorted() {
        let exec = VirtualExecutor::new();
        let vol = subvol(&exec, "/s/vol");
        run(&exec, RootOp::MakeDirs { path: vol.join("b/c") }).unwrap();
        run(&exec, RootOp::MakeDirs { path: vol.join("a") }).unwrap();
        let paths: Vec<String> = exec
            .enumerate(&vol)
            .unwrap()
            .into_iter()
            .map(|e| e.path.to_string())
            .collect();
        assert_eq!(paths, vec!["/a", "/b", "/b/c"]);
    }

    #[test]
    fn names_resolve_through_registered_tables() {
        let exec = VirtualExecutor::new().with_user("alice", 1000);
        assert_eq!(exec.resolve_user(&Principal::Name("alice".into())).unwrap(), 1000);
        assert_eq!(exec.resolve_group(&Principal::Name("root".into())).unwrap(), 0);
        assert!(exec.resolve_group(&Principal::Name("wheel".into())).is_err());
        assert_eq!(exec.resolve_user(&Principal::Id(7)).unwrap(), 7);
    }

    #[test]
    fn history_records_every_operation() {
        let exec = VirtualExecutor::new();
        let vol = subvol(&exec, "/s/vol");
        let _ = run(&exec, RootOp::MakeDirs { path: vol.join("x") });
        assert_eq!(exec.history().unwrap().len(), 2);
    }
}
