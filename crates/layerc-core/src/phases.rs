//! Split a layer's items into build phases.
//!
//! The parent item runs first. Package actions are not modelled as facts, so
//! they are merged into at most one removal and one installation transaction
//! that run right after the parent, before any dependency-ordered item.

use crate::items::{ImageItem, Item, MultiPackageAction};
use crate::CoreError;
use layerc_schema::{ImagePath, PackageActionKind, PackageName};

#[derive(Debug, Default)]
pub struct Phases {
    pub parent: Option<Item>,
    pub remove: Option<MultiPackageAction>,
    pub install: Option<MultiPackageAction>,
    /// Everything else, in declaration order.
    pub ordered: Vec<Item>,
}

pub fn split_phases(items: &[Item]) -> Result<Phases, CoreError> {
    let mut phases = Phases::default();
    for item in items {
        match item {
            Item::FilesystemRoot(_) | Item::ParentLayer(_) => {
                if let Some(first) = &phases.parent {
                    return Err(CoreError::Conflict {
                        path: ImagePath::root(),
                        first: first.from_target().to_string(),
                        second: item.from_target().to_string(),
                    });
                }
                phases.parent = Some(item.clone());
            }
            Item::Packages(action) => {
                let slot = match action.action() {
                    PackageActionKind::Remove => &mut phases.remove,
                    PackageActionKind::Install => &mut phases.install,
                };
                *slot = Some(match slot.take() {
                    Some(merged) => merged.union(action)?,
                    None => action.clone(),
                });
            }
            Item::CopyFile(_) | Item::MakeDirs(_) | Item::Tarball(_) => {
                phases.ordered.push(item.clone());
            }
        }
    }

    if let (Some(remove), Some(install)) = (&phases.remove, &phases.install) {
        let both: Vec<&str> = remove
            .packages()
            .intersection(install.packages())
            .map(PackageName::as_str)
            .collect();
        if !both.is_empty() {
            return Err(CoreError::ActionIncompatibility(format!(
                "packages both installed and removed: {}",
                both.join(", ")
            )));
        }
    }
    Ok(phases)
}
