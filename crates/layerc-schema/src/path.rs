use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A normalized path inside an image, stored in image-absolute form.
///
/// `a/b`, `/a/b`, `./a//b/` and `a/x/../b` all normalize to `/a/b`. The
/// normalization is purely lexical: nothing on disk is consulted, since the
/// path usually does not exist yet when an item is declared.
///
/// A `..` that would climb above the image root is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImagePath(String);

impl ImagePath {
    pub fn new(raw: &str) -> Result<Self, SchemaError> {
        let mut parts: Vec<&str> = Vec::new();
        for component in raw.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(SchemaError::InvalidPath {
                            path: raw.to_owned(),
                            reason: "normalized path cannot start with ..".to_owned(),
                        });
                    }
                }
                other => parts.push(other),
            }
        }
        Ok(Self(format!("/{}", parts.join("/"))))
    }

    pub fn root() -> Self {
        Self("/".to_owned())
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path without its leading `/`; empty for the root.
    #[inline]
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.relative().split('/').filter(|c| !c.is_empty())
    }

    /// Parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<ImagePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some(("", _)) | None => Some(Self::root()),
            Some((head, _)) => Some(Self(head.to_owned())),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components().last()
    }

    /// Append an already-normalized path below this one.
    pub fn join(&self, rel: &ImagePath) -> ImagePath {
        if rel.is_root() {
            self.clone()
        } else if self.is_root() {
            rel.clone()
        } else {
            Self(format!("{}{}", self.0, rel.0))
        }
    }

    /// Normalize `rel` and append it below this path.
    pub fn join_str(&self, rel: &str) -> Result<ImagePath, SchemaError> {
        Ok(self.join(&ImagePath::new(rel)?))
    }

    /// True if `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &ImagePath) -> bool {
        other.is_root()
            || self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }

    /// Every path from just below `base` down to `self`, shallowest first.
    ///
    /// Returns an empty list if `self` is not strictly below `base`.
    pub fn descendants_from(&self, base: &ImagePath) -> Vec<ImagePath> {
        if self == base || !self.starts_with(base) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut current = base.clone();
        let skip = base.components().count();
        for component in self.components().skip(skip) {
            current = current.join(&Self(format!("/{component}")));
            out.push(current.clone());
        }
        out
    }

    /// Resolve this path against a host directory, typically a subvolume root.
    pub fn to_host_path(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            root.to_path_buf()
        } else {
            root.join(self.relative())
        }
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ImagePath {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ImagePath {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&str> for ImagePath {
    type Error = SchemaError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImagePath> for String {
    fn from(p: ImagePath) -> Self {
        p.0
    }
}

impl AsRef<str> for ImagePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
