use super::ImageItem;
use crate::CoreError;
use layerc_runtime::{RootOp, RuntimeError, Subvolume};
use layerc_schema::{PackageActionKind, PackageName, PackageSource, Provides, Requires, TargetLabel};
use std::collections::BTreeSet;

/// True if `name` spells out a version instead of naming a bare package:
/// `foo=1`, `foo>=1`, `foo:1.0`, or a full `name-version-release` such as
/// `bash-5.1.8-6.el9`.
///
/// A single trailing number (`devtoolset-8`, `rpm-test-mice-2`) is
/// ambiguous on its own and is left for the package source to resolve.
pub fn is_version_pinned(name: &str) -> bool {
    if name.contains(['=', '<', '>', ':']) {
        return true;
    }
    let starts_with_digit = |s: &str| s.starts_with(|c: char| c.is_ascii_digit());
    let mut segments = name.rsplitn(3, '-');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(release), Some(version), Some(stem)) => {
            !stem.is_empty()
                && starts_with_digit(version)
                && version.contains('.')
                && starts_with_digit(release)
        }
        _ => false,
    }
}

/// One package transaction: install or remove a set of bare package names
/// through a package source.
///
/// Values are immutable; `union`, `with_packages` and `with_source` return
/// updated copies. Equality ignores `from_target`.
#[derive(Debug, Clone)]
pub struct MultiPackageAction {
    from_target: TargetLabel,
    action: PackageActionKind,
    source: PackageSource,
    packages: BTreeSet<PackageName>,
}

impl PartialEq for MultiPackageAction {
    fn eq(&self, other: &Self) -> bool {
        self.action == other.action
            && self.source == other.source
            && self.packages == other.packages
    }
}

impl Eq for MultiPackageAction {}

impl MultiPackageAction {
    pub fn new(
        from_target: TargetLabel,
        action: PackageActionKind,
        source: PackageSource,
        packages: impl IntoIterator<Item = PackageName>,
    ) -> Self {
        Self {
            from_target,
            action,
            source,
            packages: packages.into_iter().collect(),
        }
    }

    pub fn action(&self) -> PackageActionKind {
        self.action
    }

    pub fn source(&self) -> &PackageSource {
        &self.source
    }

    pub fn packages(&self) -> &BTreeSet<PackageName> {
        &self.packages
    }

    /// Merge two actions of the same kind through the same source.
    pub fn union(&self, other: &MultiPackageAction) -> Result<MultiPackageAction, CoreError> {
        if self.action != other.action {
            return Err(CoreError::ActionIncompatibility(format!(
                "cannot merge '{}' from {} with '{}' from {}",
                self.action, self.from_target, other.action, other.from_target
            )));
        }
        if self.source != other.source {
            return Err(CoreError::ActionIncompatibility(format!(
                "package source {} from {} differs from {} from {}",
                self.source, self.from_target, other.source, other.from_target
            )));
        }
        Ok(self.with_packages(self.packages.union(&other.packages).cloned()))
    }

    #[must_use]
    pub fn with_packages(&self, packages: impl IntoIterator<Item = PackageName>) -> Self {
        Self {
            packages: packages.into_iter().collect(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_source(&self, source: PackageSource) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }
}

impl ImageItem for MultiPackageAction {
    fn from_target(&self) -> &TargetLabel {
        &self.from_target
    }

    fn provides(&self) -> Vec<Provides> {
        Vec::new()
    }

    fn requires(&self) -> Vec<Requires> {
        Vec::new()
    }

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError> {
        if self.packages.is_empty() {
            return Ok(());
        }
        let pinned: Vec<&str> = self
            .packages
            .iter()
            .map(PackageName::as_str)
            .filter(|name| is_version_pinned(name))
            .collect();
        if !pinned.is_empty() {
            return Err(RuntimeError::PolicyViolation(format!(
                "package names must not pin versions, the package source does: {}",
                pinned.join(", ")
            )));
        }
        let install_root = subvol.path().to_path_buf();
        subvol.run_as_root(&RootOp::PackageTransaction {
            source: self.source.path().to_path_buf(),
            install_root,
            action: self.action,
            packages: self.packages.iter().map(|p| p.as_str().to_owned()).collect(),
        })
    }
}
