use crate::StoreError;
use layerc_schema::ImagePath;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout of the subvolumes directory.
///
/// Every built layer lives at `<root>/<subvolume_rel_path>`. Builds take an
/// advisory lock at `<root>/.<flat name>.lock` so that two builds never drive
/// the same subvolume. The flat name escapes `%` and `/` so distinct relative
/// paths never share a lock or a descriptor.
#[derive(Debug, Clone)]
pub struct SubvolumeLayout {
    root: PathBuf,
}

impl SubvolumeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a subvolume path relative to the subvolumes directory.
    pub fn validate_rel_path(rel: &str) -> Result<ImagePath, StoreError> {
        let normalized =
            ImagePath::new(rel).map_err(|_| StoreError::InvalidRelPath(rel.to_owned()))?;
        if normalized.is_root() || rel.starts_with('/') {
            return Err(StoreError::InvalidRelPath(rel.to_owned()));
        }
        Ok(normalized)
    }

    pub fn subvolume_path(&self, rel: &str) -> Result<PathBuf, StoreError> {
        let normalized = Self::validate_rel_path(rel)?;
        Ok(normalized.to_host_path(&self.root))
    }

    /// `a/b` becomes `a%2Fb`; a literal `%` becomes `%25`.
    fn flat_name(rel: &str) -> Result<String, StoreError> {
        let normalized = Self::validate_rel_path(rel)?;
        Ok(normalized
            .relative()
            .replace('%', "%25")
            .replace('/', "%2F"))
    }

    pub fn lock_file(&self, rel: &str) -> Result<PathBuf, StoreError> {
        let flat = Self::flat_name(rel)?;
        Ok(self.root.join(format!(".{flat}.lock")))
    }

    /// Default location of the descriptor naming a built subvolume.
    pub fn descriptor_path(&self, rel: &str) -> Result<PathBuf, StoreError> {
        let flat = Self::flat_name(rel)?;
        Ok(self.root.join(format!("{flat}.json")))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subvolume_paths_stay_inside_root() {
        let layout = SubvolumeLayout::new("/var/subvols");
        assert_eq!(
            layout.subvolume_path("base:1/volume").unwrap(),
            PathBuf::from("/var/subvols/base:1/volume")
        );
        assert!(layout.subvolume_path("../escape").is_err());
        assert!(layout.subvolume_path("/abs").is_err());
        assert!(layout.subvolume_path("").is_err());
    }

    #[test]
    fn lock_file_is_flat_and_hidden() {
        let layout = SubvolumeLayout::new("/var/subvols");
        assert_eq!(
            layout.lock_file("base:1/volume").unwrap(),
            PathBuf::from("/var/subvols/.base:1%2Fvolume.lock")
        );
        assert_eq!(
            layout.descriptor_path("base:1/volume").unwrap(),
            PathBuf::from("/var/subvols/base:1%2Fvolume.json")
        );
    }

    #[test]
    fn distinct_rel_paths_get_distinct_locks_and_descriptors() {
        let layout = SubvolumeLayout::new("/v");
        let rels = ["a/b", "a_b", "a%2Fb", "a%b", "a/b/c", "a/b_c", "a_b/c"];
        let locks: std::collections::BTreeSet<PathBuf> =
            rels.iter().map(|r| layout.lock_file(r).unwrap()).collect();
        let descriptors: std::collections::BTreeSet<PathBuf> =
            rels.iter().map(|r| layout.descriptor_path(r).unwrap()).collect();
        assert_eq!(locks.len(), rels.len());
        assert_eq!(descriptors.len(), rels.len());
        assert_eq!(layout.lock_file("a_b").unwrap(), PathBuf::from("/v/.a_b.lock"));
        assert_eq!(layout.lock_file("a/b").unwrap(), PathBuf::from("/v/.a%2Fb.lock"));
    }

    #[test]
    fn equivalent_spellings_share_a_lock() {
        let layout = SubvolumeLayout::new("/v");
        assert_eq!(
            layout.lock_file("a//b/").unwrap(),
            layout.lock_file("a/b").unwrap()
        );
    }

    #[test]
    fn initialize_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SubvolumeLayout::new(dir.path().join("subvols"));
        layout.initialize().unwrap();
        assert!(layout.root().is_dir());
    }
}
