use crate::StoreError;
use layerc_schema::{ImagePath, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TreeEntryKind {
    Directory,
    File,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeEntry {
    pub path: ImagePath,
    pub kind: TreeEntryKind,
}

/// Every object below `root`, sorted by path. The root itself is omitted.
/// Symlinks are reported, never followed.
pub fn enumerate_host_tree(root: &Path) -> Result<Vec<TreeEntry>, StoreError> {
    if !root.is_dir() {
        return Err(StoreError::SubvolumeNotFound(root.to_path_buf()));
    }
    let mut result = Vec::new();
    collect_entries(root, &ImagePath::root(), &mut result)?;
    result.sort();
    Ok(result)
}

/// Parse `find <root> -mindepth 1 -printf '%y %P\0'` output.
///
/// `d` records are directories, `l` records symlinks, and every other type
/// is reported as a file, matching [`enumerate_host_tree`].
pub fn parse_find_listing(listing: &[u8]) -> Result<Vec<TreeEntry>, StoreError> {
    let mut result = Vec::new();
    for record in listing.split(|b| *b == 0).filter(|r| !r.is_empty()) {
        let record = String::from_utf8_lossy(record);
        let (kind, rel) = record
            .split_once(' ')
            .ok_or_else(|| StoreError::InvalidEntryPath(record.to_string()))?;
        let kind = match kind {
            "d" => TreeEntryKind::Directory,
            "l" => TreeEntryKind::Symlink,
            _ => TreeEntryKind::File,
        };
        let path = ImagePath::new(rel).map_err(|_| StoreError::InvalidEntryPath(rel.to_owned()))?;
        if path.is_root() {
            return Err(StoreError::InvalidEntryPath(rel.to_owned()));
        }
        result.push(TreeEntry { path, kind });
    }
    result.sort();
    Ok(result)
}

fn collect_entries(
    current: &Path,
    image_dir: &ImagePath,
    out: &mut Vec<TreeEntry>,
) -> Result<(), StoreError> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = image_dir.join_str(&name)?;
        let meta = entry.path().symlink_metadata()?;
        if meta.is_dir() {
            out.push(TreeEntry {
                path: path.clone(),
                kind: TreeEntryKind::Directory,
            });
            collect_entries(&entry.path(), &path, out)?;
        } else if meta.file_type().is_symlink() {
            out.push(TreeEntry {
                path,
                kind: TreeEntryKind::Symlink,
            });
        } else {
            out.push(TreeEntry {
                path,
                kind: TreeEntryKind::File,
            });
        }
    }
    Ok(())
}

/// Metadata that shows up in a rendered node label.
#[derive(Debug, Clone, Copy)]
pub struct NodeMeta<'a> {
    pub kind: TreeEntryKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub link_target: Option<&'a str>,
}

/// Compact label for one filesystem object: `(Dir)`, `(File m600 o12:34)`,
/// `(File d13)`, `(Symlink target)`.
///
/// Mode is shown only when it differs from the default for the kind,
/// ownership only when it is not `0:0`, and file length only when nonzero.
pub fn describe_node(meta: &NodeMeta<'_>) -> String {
    let (word, default_mode) = match meta.kind {
        TreeEntryKind::Directory => ("Dir", DEFAULT_DIR_MODE),
        TreeEntryKind::File => ("File", DEFAULT_FILE_MODE),
        TreeEntryKind::Symlink => {
            return format!("(Symlink {})", meta.link_target.unwrap_or(""));
        }
    };
    let mut label = format!("({word}");
    let mode = meta.mode & 0o7777;
    if mode != default_mode {
        label.push_str(&format!(" m{mode:o}"));
    }
    if meta.uid != 0 || meta.gid != 0 {
        label.push_str(&format!(" o{}:{}", meta.uid, meta.gid));
    }
    if meta.kind == TreeEntryKind::File && meta.size > 0 {
        label.push_str(&format!(" d{}", meta.size));
    }
    label.push(')');
    label
}

/// A rendered filesystem tree. Directories own their children by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedNode {
    Dir {
        label: String,
        children: BTreeMap<String, RenderedNode>,
    },
    Leaf(String),
}

impl RenderedNode {
    pub fn label(&self) -> &str {
        match self {
            RenderedNode::Dir { label, .. } | RenderedNode::Leaf(label) => label,
        }
    }

    pub fn child(&self, name: &str) -> Option<&RenderedNode> {
        match self {
            RenderedNode::Dir { children, .. } => children.get(name),
            RenderedNode::Leaf(_) => None,
        }
    }

    /// Look up a node by image path relative to this node.
    pub fn at(&self, path: &ImagePath) -> Option<&RenderedNode> {
        path.components()
            .try_fold(self, |node, name| node.child(name))
    }

    /// `["(Dir)", {"name": [...]}]` for directories, `["(File)"]` otherwise.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RenderedNode::Dir { label, children } => {
                let map: serde_json::Map<String, serde_json::Value> = children
                    .iter()
                    .map(|(name, node)| (name.clone(), node.to_json()))
                    .collect();
                serde_json::json!([label, map])
            }
            RenderedNode::Leaf(label) => serde_json::json!([label]),
        }
    }

    /// One `(path, label)` pair per node, depth first, starting at `/`.
    pub fn flatten(&self) -> Vec<(ImagePath, String)> {
        let mut out = Vec::new();
        self.flatten_into(ImagePath::root(), &mut out);
        out
    }

    fn flatten_into(&self, here: ImagePath, out: &mut Vec<(ImagePath, String)>) {
        out.push((here.clone(), self.label().to_owned()));
        if let RenderedNode::Dir { children, .. } = self {
            for (name, node) in children {
                // Names come from directory listings and never contain '/'.
                if let Ok(path) = here.join_str(name) {
                    node.flatten_into(path, out);
                }
            }
        }
    }
}

/// Render the host directory tree rooted at `root`.
pub fn render_host_tree(root: &Path) -> Result<RenderedNode, StoreError> {
    let meta = root.symlink_metadata()?;
    if !meta.is_dir() {
        return Err(StoreError::SubvolumeNotFound(root.to_path_buf()));
    }
    render_path(root)
}

fn render_path(path: &Path) -> Result<RenderedNode, StoreError> {
    let meta = path.symlink_metadata()?;
    if meta.is_dir() {
        let mut children = BTreeMap::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            children.insert(name, render_path(&entry.path())?);
        }
        let label = describe_node(&NodeMeta {
            kind: TreeEntryKind::Directory,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: 0,
            link_target: None,
        });
        return Ok(RenderedNode::Dir { label, children });
    }
    if meta.file_type().is_symlink() {
        let target = fs::read_link(path)?;
        let target = target.to_string_lossy();
        return Ok(RenderedNode::Leaf(describe_node(&NodeMeta {
            kind: TreeEntryKind::Symlink,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: 0,
            link_target: Some(&target),
        })));
    }
    Ok(RenderedNode::Leaf(describe_node(&NodeMeta {
        kind: TreeEntryKind::File,
        mode: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.len(),
        link_target: None,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn find_listing_parses_kinds_and_sorts() {
        let listing = b"f etc/app/motd\0d etc\0l etc/link\0d etc/app\0p fifo\0";
        let entries = parse_find_listing(listing).unwrap();
        let got: Vec<(String, TreeEntryKind)> = entries
            .iter()
            .map(|e| (e.path.to_string(), e.kind))
            .collect();
        assert_eq!(
            got,
            vec![
                ("/etc".to_owned(), TreeEntryKind::Directory),
                ("/etc/app".to_owned(), TreeEntryKind::Directory),
                ("/etc/app/motd".to_owned(), TreeEntryKind::File),
                ("/etc/link".to_owned(), TreeEntryKind::Symlink),
                ("/fifo".to_owned(), TreeEntryKind::File),
            ]
        );
    }

    #[test]
    fn find_listing_keeps_spaces_in_names() {
        let entries = parse_find_listing(b"f my file\0").unwrap();
        assert_eq!(entries[0].path.to_string(), "/my file");
    }

    #[test]
    fn find_listing_rejects_escaping_paths() {
        assert!(parse_find_listing(b"f ../up\0").is_err());
        assert!(parse_find_listing(b"garbage\0").is_err());
        assert!(parse_find_listing(b"").unwrap().is_empty());
    }

    fn meta(kind: TreeEntryKind, mode: u32, uid: u32, gid: u32, size: u64) -> NodeMeta<'static> {
        NodeMeta {
            kind,
            mode,
            uid,
            gid,
            size,
            link_target: None,
        }
    }

    #[test]
    fn labels_hide_defaults() {
        assert_eq!(describe_node(&meta(TreeEntryKind::Directory, 0o755, 0, 0, 0)), "(Dir)");
        assert_eq!(describe_node(&meta(TreeEntryKind::File, 0o644, 0, 0, 0)), "(File)");
    }

    #[test]
    fn labels_show_overrides() {
        assert_eq!(
            describe_node(&meta(TreeEntryKind::Directory, 0o500, 77, 88, 0)),
            "(Dir m500 o77:88)"
        );
        assert_eq!(
            describe_node(&meta(TreeEntryKind::File, 0o600, 12, 34, 0)),
            "(File m600 o12:34)"
        );
        assert_eq!(
            describe_node(&meta(TreeEntryKind::File, 0o100_644, 0, 0, 13)),
            "(File d13)"
        );
        let link = NodeMeta {
            link_target: Some("../x"),
            ..meta(TreeEntryKind::Symlink, 0o777, 0, 0, 0)
        };
        assert_eq!(describe_node(&link), "(Symlink ../x)");
    }

    #[test]
    fn enumerate_lists_nested_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/c")).unwrap();
        fs::write(dir.path().join("a"), b"x").unwrap();
        fs::write(dir.path().join("b/c/d"), b"y").unwrap();

        let entries = enumerate_host_tree(dir.path()).unwrap();
        let listed: Vec<(&str, TreeEntryKind)> =
            entries.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        assert_eq!(
            listed,
            vec![
                ("/a", TreeEntryKind::File),
                ("/b", TreeEntryKind::Directory),
                ("/b/c", TreeEntryKind::Directory),
                ("/b/c/d", TreeEntryKind::File),
            ]
        );
    }

    #[test]
    fn enumerate_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            enumerate_host_tree(&dir.path().join("nope")),
            Err(StoreError::SubvolumeNotFound(_))
        ));
    }

    #[test]
    fn render_host_tree_to_json() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
        fs::create_dir(root.join("d")).unwrap();
        fs::set_permissions(root.join("d"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(root.join("d/f"), b"hello").unwrap();
        fs::set_permissions(root.join("d/f"), fs::Permissions::from_mode(0o600)).unwrap();

        let tree = render_host_tree(&root).unwrap();
        let uid = fs::metadata(&root).unwrap().uid();
        let gid = fs::metadata(&root).unwrap().gid();
        let owner = if uid == 0 && gid == 0 {
            String::new()
        } else {
            format!(" o{uid}:{gid}")
        };
        assert_eq!(
            tree.to_json(),
            json!([
                format!("(Dir{owner})"),
                {"d": [format!("(Dir{owner})"), {"f": [format!("(File m600{owner} d5)")]}]}
            ])
        );

        let f = tree.at(&ImagePath::new("/d/f").unwrap()).unwrap();
        assert_eq!(f.label(), format!("(File m600{owner} d5)"));
        assert_eq!(tree.flatten().len(), 3);
    }
}
