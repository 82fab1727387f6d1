use crate::StoreError;
use layerc_schema::ImagePath;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveEntryKind {
    Directory,
    File,
    Symlink,
    HardLink,
}

/// One member of a tar archive, with its path normalized against the
/// archive root (the archive's own `.` entry becomes `/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: ImagePath,
    pub kind: ArchiveEntryKind,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub data: Vec<u8>,
    pub link_target: Option<PathBuf>,
}

/// Read every member of a plain tar archive in archive order.
///
/// Extension headers are consumed by the `tar` crate; device nodes and
/// FIFOs are refused because an image layer built without privileges could
/// not reproduce them.
pub fn read_archive(path: &Path) -> Result<Vec<ArchiveEntry>, StoreError> {
    let file = fs::File::open(path)?;
    let mut ar = tar::Archive::new(file);
    let mut result = Vec::new();

    for entry in ar.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.to_string_lossy().into_owned();
        let entry_type = entry.header().entry_type();

        let kind = match entry_type {
            tar::EntryType::Directory => ArchiveEntryKind::Directory,
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                ArchiveEntryKind::File
            }
            tar::EntryType::Symlink => ArchiveEntryKind::Symlink,
            tar::EntryType::Link => ArchiveEntryKind::HardLink,
            tar::EntryType::XGlobalHeader | tar::EntryType::XHeader => {
                warn!("skipping extension header in {}", path.display());
                continue;
            }
            other => {
                return Err(StoreError::UnsupportedEntry {
                    path: raw_path,
                    kind: format!("{other:?}"),
                });
            }
        };

        let image_path = ImagePath::new(&raw_path)
            .map_err(|e| StoreError::InvalidEntryPath(format!("{raw_path}: {e}")))?;

        let header = entry.header();
        let uid = owner_id(header.uid()?, "uid", &raw_path)?;
        let gid = owner_id(header.gid()?, "gid", &raw_path)?;
        let mode = header.mode()? & 0o7777;
        let link_target = entry.link_name()?.map(std::borrow::Cow::into_owned);

        let mut data = Vec::new();
        if kind == ArchiveEntryKind::File {
            entry.read_to_end(&mut data)?;
        }

        result.push(ArchiveEntry {
            path: image_path,
            kind,
            uid,
            gid,
            mode,
            data,
            link_target,
        });
    }

    debug!("read {} entries from {}", result.len(), path.display());
    Ok(result)
}

fn owner_id(value: u64, field: &'static str, path: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::OwnerOutOfRange {
        path: path.to_owned(),
        field,
        value,
    })
}

pub fn archive_digest(path: &Path) -> Result<String, StoreError> {
    let data = fs::read(path)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

pub fn verify_archive_digest(path: &Path, expected: &str) -> Result<(), StoreError> {
    let actual = archive_digest(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(StoreError::IntegrityFailure {
            path: path.to_path_buf(),
            expected: expected.to_owned(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(entry_type: tar::EntryType, mode: u32, uid: u64, gid: u64) -> tar::Header {
        let mut h = tar::Header::new_gnu();
        h.set_entry_type(entry_type);
        h.set_mode(mode);
        h.set_uid(uid);
        h.set_gid(gid);
        h.set_mtime(0);
        h
    }

    fn write_fixture(path: &Path) {
        let mut ar = tar::Builder::new(fs::File::create(path).unwrap());

        let mut h = header(tar::EntryType::Directory, 0o755, 0, 0);
        h.set_size(0);
        h.set_cksum();
        ar.append_data(&mut h, "./", &[] as &[u8]).unwrap();

        let mut h = header(tar::EntryType::Directory, 0o700, 5, 6);
        h.set_size(0);
        h.set_cksum();
        ar.append_data(&mut h, "./sub/", &[] as &[u8]).unwrap();

        let mut h = header(tar::EntryType::Regular, 0o640, 7, 8);
        h.set_size(5);
        h.set_cksum();
        ar.append_data(&mut h, "./sub/hello", &b"hello"[..]).unwrap();

        let mut h = header(tar::EntryType::Symlink, 0o777, 0, 0);
        h.set_size(0);
        h.set_cksum();
        ar.append_link(&mut h, "./link", "sub/hello").unwrap();

        ar.finish().unwrap();
    }

    #[test]
    fn reads_entries_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.tar");
        write_fixture(&path);

        let entries = read_archive(&path).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/sub", "/sub/hello", "/link"]);

        assert_eq!(entries[1].kind, ArchiveEntryKind::Directory);
        assert_eq!((entries[1].uid, entries[1].gid, entries[1].mode), (5, 6, 0o700));

        assert_eq!(entries[2].kind, ArchiveEntryKind::File);
        assert_eq!(entries[2].data, b"hello");
        assert_eq!(entries[2].mode, 0o640);

        assert_eq!(entries[3].kind, ArchiveEntryKind::Symlink);
        assert_eq!(entries[3].link_target.as_deref(), Some(Path::new("sub/hello")));
    }

    #[test]
    fn refuses_device_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.tar");
        let mut ar = tar::Builder::new(fs::File::create(&path).unwrap());
        let mut h = header(tar::EntryType::Block, 0o600, 0, 0);
        h.set_size(0);
        h.set_cksum();
        ar.append_data(&mut h, "sda", &[] as &[u8]).unwrap();
        ar.finish().unwrap();
        drop(ar);

        let err = read_archive(&path).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedEntry { .. }));
    }

    #[test]
    fn refuses_owner_ids_beyond_u32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big-uid.tar");
        let mut ar = tar::Builder::new(fs::File::create(&path).unwrap());
        let mut h = header(tar::EntryType::Regular, 0o644, 1 << 33, 0);
        h.set_size(0);
        h.set_cksum();
        ar.append_data(&mut h, "file", &[] as &[u8]).unwrap();
        ar.finish().unwrap();
        drop(ar);

        let err = read_archive(&path).unwrap_err();
        assert!(matches!(
            err,
            StoreError::OwnerOutOfRange { field: "uid", value: 8_589_934_592, .. }
        ));
        assert!(err.to_string().contains("'file'"), "{err}");
    }

    #[test]
    fn digest_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.tar");
        write_fixture(&path);

        let digest = archive_digest(&path).unwrap();
        verify_archive_digest(&path, &digest).unwrap();
        verify_archive_digest(&path, &digest.to_uppercase()).unwrap();

        let err = verify_archive_digest(&path, "00").unwrap_err();
        assert!(matches!(err, StoreError::IntegrityFailure { .. }));
    }
}
