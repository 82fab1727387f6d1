use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What a package transaction does. The ordering is the order in which the
/// coalesced transactions run: removals before installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageActionKind {
    Remove,
    Install,
}

impl PackageActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageActionKind::Remove => "remove",
            PackageActionKind::Install => "install",
        }
    }
}

impl fmt::Display for PackageActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageActionKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(PackageActionKind::Install),
            "remove" | "remove_if_exists" => Ok(PackageActionKind::Remove),
            other => Err(SchemaError::UnknownPackageAction(other.to_owned())),
        }
    }
}

/// Handle to a package-manager wrapper bound to a pinned repository snapshot.
///
/// The wrapper resolves bare package names deterministically; two sources
/// are the same source only if they name the same wrapper.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageSource(PathBuf);

impl PackageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removals_sort_before_installs() {
        assert!(PackageActionKind::Remove < PackageActionKind::Install);
    }

    #[test]
    fn parses_action_names() {
        assert_eq!(
            "install".parse::<PackageActionKind>().unwrap(),
            PackageActionKind::Install
        );
        assert_eq!(
            "remove_if_exists".parse::<PackageActionKind>().unwrap(),
            PackageActionKind::Remove
        );
        assert!("upgrade".parse::<PackageActionKind>().is_err());
    }

    #[test]
    fn sources_compare_by_path() {
        assert_eq!(PackageSource::new("/bin/yum"), PackageSource::new("/bin/yum"));
        assert_ne!(PackageSource::new("/bin/yum"), PackageSource::new("bug"));
    }
}
