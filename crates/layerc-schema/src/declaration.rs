use crate::packages::PackageActionKind;
use crate::stat::{ModeSpec, Principal, StatOptions};
use crate::types::{PackageName, TargetLabel};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DECLARATION_VERSION: u32 = 1;

/// The items of one image layer, as written in a `layer.toml` file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayerDeclaration {
    pub declaration_version: u32,
    pub layer: LayerSection,
    #[serde(default)]
    pub items: Vec<ItemDeclaration>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayerSection {
    pub target: TargetLabel,
    #[serde(default)]
    pub package_source: Option<PathBuf>,
    /// Descriptor of the parent layer's subvolume; absent for a root layer.
    #[serde(default)]
    pub parent_layer: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ItemDeclaration {
    CopyFile {
        #[serde(default)]
        from_target: Option<TargetLabel>,
        source: PathBuf,
        dest: String,
        #[serde(default)]
        user: Option<Principal>,
        #[serde(default)]
        group: Option<Principal>,
        #[serde(default)]
        mode: Option<ModeSpec>,
    },
    MakeDirs {
        #[serde(default)]
        from_target: Option<TargetLabel>,
        into_dir: String,
        path_to_make: String,
        #[serde(default)]
        user: Option<Principal>,
        #[serde(default)]
        group: Option<Principal>,
        #[serde(default)]
        mode: Option<ModeSpec>,
    },
    Tarball {
        #[serde(default)]
        from_target: Option<TargetLabel>,
        tarball: PathBuf,
        into_dir: String,
        /// Optional blake3 hex digest the archive content must match.
        #[serde(default)]
        blake3: Option<String>,
    },
    Packages {
        #[serde(default)]
        from_target: Option<TargetLabel>,
        action: PackageActionKind,
        names: Vec<PackageName>,
    },
}

impl ItemDeclaration {
    pub fn from_target(&self) -> Option<&TargetLabel> {
        match self {
            ItemDeclaration::CopyFile { from_target, .. }
            | ItemDeclaration::MakeDirs { from_target, .. }
            | ItemDeclaration::Tarball { from_target, .. }
            | ItemDeclaration::Packages { from_target, .. } => from_target.as_ref(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ItemDeclaration::CopyFile { .. } => "copy_file",
            ItemDeclaration::MakeDirs { .. } => "make_dirs",
            ItemDeclaration::Tarball { .. } => "tarball",
            ItemDeclaration::Packages { .. } => "packages",
        }
    }

    /// Stat options declared on the item; empty for kinds without them.
    pub fn stat_options(&self) -> StatOptions {
        match self {
            ItemDeclaration::CopyFile {
                user, group, mode, ..
            }
            | ItemDeclaration::MakeDirs {
                user, group, mode, ..
            } => StatOptions {
                user: user.clone(),
                group: group.clone(),
                mode: mode.clone(),
            },
            ItemDeclaration::Tarball { .. } | ItemDeclaration::Packages { .. } => {
                StatOptions::default()
            }
        }
    }
}

impl LayerDeclaration {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.declaration_version != DECLARATION_VERSION {
            return Err(SchemaError::UnsupportedVersion(self.declaration_version));
        }
        if self.layer.target.trim().is_empty() {
            return Err(SchemaError::EmptyTarget);
        }
        Ok(())
    }

    /// Resolve relative host paths against `base_dir`, normally the
    /// directory that holds the declaration file. Image paths are untouched.
    #[must_use]
    pub fn rebase(mut self, base_dir: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };
        if let Some(p) = self.layer.package_source.as_mut() {
            rebase(p);
        }
        if let Some(p) = self.layer.parent_layer.as_mut() {
            rebase(p);
        }
        for item in &mut self.items {
            match item {
                ItemDeclaration::CopyFile { source, .. } => rebase(source),
                ItemDeclaration::Tarball { tarball, .. } => rebase(tarball),
                ItemDeclaration::MakeDirs { .. } | ItemDeclaration::Packages { .. } => {}
            }
        }
        self
    }
}

pub fn parse_declaration_str(input: &str) -> Result<LayerDeclaration, SchemaError> {
    let decl: LayerDeclaration = toml::from_str(input)?;
    decl.validate()?;
    Ok(decl)
}

pub fn parse_declaration_file(path: impl AsRef<Path>) -> Result<LayerDeclaration, SchemaError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let decl = parse_declaration_str(&content)?;
    let base = path.parent().unwrap_or(Path::new("."));
    Ok(decl.rebase(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
declaration_version = 1

[layer]
target = "//images:base"
package_source = "bin/yum-from-snapshot"

[[items]]
kind = "make_dirs"
into_dir = "/"
path_to_make = "etc/app"
user = "root"
group = 0
mode = "u+rwx,go+rx"

[[items]]
kind = "copy_file"
from_target = "//images:motd"
source = "files/motd"
dest = "/etc/"
mode = 0o644

[[items]]
kind = "tarball"
tarball = "/srv/assets.tar"
into_dir = "/opt"

[[items]]
kind = "packages"
action = "install"
names = ["bash", "coreutils"]
"#;

    #[test]
    fn parses_full_declaration() {
        let decl = parse_declaration_str(FULL).expect("should parse");
        assert_eq!(decl.layer.target, "//images:base");
        assert_eq!(decl.items.len(), 4);
        assert_eq!(decl.items[0].kind_name(), "make_dirs");
        assert_eq!(
            decl.items[1].from_target().map(TargetLabel::as_str),
            Some("//images:motd")
        );
        assert!(decl.items[0].from_target().is_none());
        let stat = decl.items[0].stat_options();
        assert_eq!(stat.user, Some(Principal::Name("root".to_owned())));
        assert_eq!(stat.group, Some(Principal::Id(0)));
        assert_eq!(stat.directory_mode(), 0o755);
        match &decl.items[3] {
            ItemDeclaration::Packages { action, names, .. } => {
                assert_eq!(*action, PackageActionKind::Install);
                assert_eq!(names.len(), 2);
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn parses_minimal_declaration() {
        let decl = parse_declaration_str(
            r#"
declaration_version = 1
[layer]
target = "//t:t"
"#,
        )
        .unwrap();
        assert!(decl.items.is_empty());
        assert!(decl.layer.parent_layer.is_none());
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse_declaration_str(
            r#"
declaration_version = 2
[layer]
target = "//t:t"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_misspelled_item_field() {
        let input = r#"
declaration_version = 1
[layer]
target = "//t:t"
[[items]]
kind = "make_dirs"
into_dir = "/"
path_to_make = "x"
modee = "0700"
"#;
        let err = parse_declaration_str(input).unwrap_err();
        assert!(err.to_string().contains("modee"), "{err}");
    }

    #[test]
    fn rejects_field_of_another_item_kind() {
        let input = r#"
declaration_version = 1
[layer]
target = "//t:t"
[[items]]
kind = "packages"
action = "install"
names = ["bash"]
into_dir = "/"
"#;
        assert!(parse_declaration_str(input).is_err());
    }

    #[test]
    fn rejects_unknown_layer_fields() {
        let input = r#"
declaration_version = 1
[layer]
target = "//t:t"
registry = "example.com"
"#;
        assert!(parse_declaration_str(input).is_err());
    }

    #[test]
    fn rejects_unknown_item_kind() {
        let input = r#"
declaration_version = 1
[layer]
target = "//t:t"
[[items]]
kind = "symlink"
"#;
        assert!(parse_declaration_str(input).is_err());
    }

    #[test]
    fn rejects_bad_mode() {
        let input = r#"
declaration_version = 1
[layer]
target = "//t:t"
[[items]]
kind = "make_dirs"
into_dir = "/"
path_to_make = "a"
mode = "u+q"
"#;
        assert!(parse_declaration_str(input).is_err());
    }

    #[test]
    fn file_parsing_rebases_relative_host_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.toml");
        fs::write(&path, FULL).unwrap();

        let decl = parse_declaration_file(&path).unwrap();
        assert_eq!(
            decl.layer.package_source.as_deref(),
            Some(dir.path().join("bin/yum-from-snapshot").as_path())
        );
        match &decl.items[1] {
            ItemDeclaration::CopyFile { source, dest, .. } => {
                assert_eq!(source, &dir.path().join("files/motd"));
                assert_eq!(dest, "/etc/");
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &decl.items[2] {
            ItemDeclaration::Tarball { tarball, .. } => {
                assert_eq!(tarball, Path::new("/srv/assets.tar"));
            }
            other => panic!("unexpected item {other:?}"),
        }
    }
}
