use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// JSON file naming a built layer's subvolume.
///
/// A null `subvolume_rel_path` means "no parent": the child layer is built
/// from an empty root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubvolumeDescriptor {
    pub subvolume_rel_path: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub built_at: String,
    /// blake3 checksum over the other fields. `None` for hand-written files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl SubvolumeDescriptor {
    pub fn for_subvolume(rel_path: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            subvolume_rel_path: Some(rel_path.into()),
            hostname: current_hostname()?,
            built_at: chrono::Utc::now().to_rfc3339(),
            checksum: None,
        })
    }

    pub fn empty_root() -> Result<Self, StoreError> {
        Ok(Self {
            subvolume_rel_path: None,
            hostname: current_hostname()?,
            built_at: chrono::Utc::now().to_rfc3339(),
            checksum: None,
        })
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Pretty JSON with the checksum embedded.
    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        let mut sealed = self.clone();
        sealed.checksum = Some(self.compute_checksum()?);
        Ok(serde_json::to_string_pretty(&sealed)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        let content = self.to_json_pretty()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        debug!("wrote subvolume descriptor {}", path.display());
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::DescriptorNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let desc: SubvolumeDescriptor = serde_json::from_str(&content)?;

        if let Some(ref expected) = desc.checksum {
            let actual = desc.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    path: path.to_path_buf(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(desc)
    }

    /// Subvolumes are host-local; refuse descriptors written elsewhere.
    pub fn verify_host(&self) -> Result<(), StoreError> {
        let here = current_hostname()?;
        if self.hostname != here {
            return Err(StoreError::ForeignHost {
                expected: here,
                found: self.hostname.clone(),
            });
        }
        Ok(())
    }
}

#[allow(unsafe_code)]
pub fn current_hostname() -> Result<String, StoreError> {
    let mut buf = vec![0u8; 256];
    // SAFETY: buf is a live, writable allocation of exactly buf.len() bytes.
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if ret != 0 {
        return Err(StoreError::Io(std::io::Error::last_os_error()));
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}
