//! The closed set of things a layer can contain.

mod copy_file;
mod make_dirs;
mod packages;
mod parent_layer;
mod root;
mod stat;
mod tarball;

pub use copy_file::CopyFile;
pub use make_dirs::MakeDirs;
pub use packages::{is_version_pinned, MultiPackageAction};
pub use parent_layer::ParentLayer;
pub use root::FilesystemRoot;
pub use tarball::Tarball;

use crate::CoreError;
use layerc_runtime::{RuntimeError, Subvolume};
use layerc_schema::{
    ItemDeclaration, PackageName, PackageSource, Provides, Requires, TargetLabel,
};
use std::fmt;

/// What every item exposes to the dependency compiler.
///
/// `provides` and `requires` are pure: any input they depend on was read
/// when the item was constructed.
pub trait ImageItem {
    /// Label of the build target that declared this item. Diagnostic only.
    fn from_target(&self) -> &TargetLabel;

    fn provides(&self) -> Vec<Provides>;

    fn requires(&self) -> Vec<Requires>;

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    FilesystemRoot(FilesystemRoot),
    ParentLayer(ParentLayer),
    CopyFile(CopyFile),
    MakeDirs(MakeDirs),
    Tarball(Tarball),
    Packages(MultiPackageAction),
}

impl Item {
    fn inner(&self) -> &dyn ImageItem {
        match self {
            Item::FilesystemRoot(i) => i,
            Item::ParentLayer(i) => i,
            Item::CopyFile(i) => i,
            Item::MakeDirs(i) => i,
            Item::Tarball(i) => i,
            Item::Packages(i) => i,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Item::FilesystemRoot(_) => "filesystem_root",
            Item::ParentLayer(_) => "parent_layer",
            Item::CopyFile(_) => "copy_file",
            Item::MakeDirs(_) => "make_dirs",
            Item::Tarball(_) => "tarball",
            Item::Packages(_) => "packages",
        }
    }

    /// Items that create the subvolume itself and must run first.
    pub fn is_parent_phase(&self) -> bool {
        matches!(self, Item::FilesystemRoot(_) | Item::ParentLayer(_))
    }

    /// Build an item from its declaration. `default_target` labels items
    /// that do not name their own `from_target`.
    pub fn from_declaration(
        decl: &ItemDeclaration,
        default_target: &TargetLabel,
        package_source: Option<&PackageSource>,
    ) -> Result<Item, CoreError> {
        let from_target = decl
            .from_target()
            .cloned()
            .unwrap_or_else(|| default_target.clone());
        match decl {
            ItemDeclaration::CopyFile { source, dest, .. } => Ok(Item::CopyFile(CopyFile::new(
                from_target,
                source.clone(),
                dest,
                decl.stat_options(),
            )?)),
            ItemDeclaration::MakeDirs {
                into_dir,
                path_to_make,
                ..
            } => Ok(Item::MakeDirs(MakeDirs::new(
                from_target,
                into_dir,
                path_to_make,
                decl.stat_options(),
            )?)),
            ItemDeclaration::Tarball {
                tarball,
                into_dir,
                blake3,
                ..
            } => Ok(Item::Tarball(Tarball::new(
                from_target,
                tarball.clone(),
                into_dir,
                blake3.as_deref(),
            )?)),
            ItemDeclaration::Packages { action, names, .. } => {
                let source = package_source.ok_or_else(|| CoreError::Construction {
                    target: from_target.to_string(),
                    kind: "packages",
                    reason: "no package_source configured for this layer".to_owned(),
                })?;
                Ok(Item::Packages(MultiPackageAction::new(
                    from_target,
                    *action,
                    source.clone(),
                    names.iter().cloned(),
                )))
            }
        }
    }
}

impl ImageItem for Item {
    fn from_target(&self) -> &TargetLabel {
        self.inner().from_target()
    }

    fn provides(&self) -> Vec<Provides> {
        self.inner().provides()
    }

    fn requires(&self) -> Vec<Requires> {
        self.inner().requires()
    }

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError> {
        self.inner().build(subvol)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::FilesystemRoot(_) => write!(f, "create empty root"),
            Item::ParentLayer(i) => write!(f, "snapshot parent {}", i.path().display()),
            Item::CopyFile(i) => write!(f, "copy {} to {}", i.source().display(), i.dest()),
            Item::MakeDirs(i) => write!(f, "make dirs {}", i.full_path()),
            Item::Tarball(i) => {
                write!(f, "extract {} into {}", i.tarball().display(), i.into_dir())
            }
            Item::Packages(i) => write!(
                f,
                "{} packages {}",
                i.action(),
                i.packages()
                    .iter()
                    .map(PackageName::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        }
    }
}

/// Map a path parse failure to a construction error for `kind`.
pub(crate) fn construction_error(
    from_target: &TargetLabel,
    kind: &'static str,
    reason: impl fmt::Display,
) -> CoreError {
    CoreError::Construction {
        target: from_target.to_string(),
        kind,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerc_schema::parse_declaration_str;

    #[test]
    fn items_from_declaration_inherit_layer_target() {
        let decl = parse_declaration_str(
            r#"
declaration_version = 1
[layer]
target = "//images:base"
[[items]]
kind = "make_dirs"
into_dir = "/"
path_to_make = "etc/app"
[[items]]
kind = "make_dirs"
from_target = "//other:t"
into_dir = "/etc"
path_to_make = "x"
"#,
        )
        .unwrap();
        let items: Vec<Item> = decl
            .items
            .iter()
            .map(|d| Item::from_declaration(d, &decl.layer.target, None).unwrap())
            .collect();
        assert_eq!(items[0].from_target(), &TargetLabel::new("//images:base"));
        assert_eq!(items[1].from_target(), &TargetLabel::new("//other:t"));
        assert_eq!(items[0].kind_name(), "make_dirs");
        assert_eq!(items[0].to_string(), "make dirs /etc/app");
    }

    #[test]
    fn packages_without_source_is_construction_error() {
        let decl = parse_declaration_str(
            r#"
declaration_version = 1
[layer]
target = "//t:t"
[[items]]
kind = "packages"
action = "install"
names = ["bash"]
"#,
        )
        .unwrap();
        let err = Item::from_declaration(&decl.items[0], &decl.layer.target, None).unwrap_err();
        assert!(matches!(err, CoreError::Construction { kind: "packages", .. }));
    }
}
