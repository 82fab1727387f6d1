//! Facts about the image filesystem that items add (`Provides`) or need
//! (`Requires`). The dependency compiler matches them by path.

use crate::path::ImagePath;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Directory,
    File,
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactKind::Directory => write!(f, "directory"),
            FactKind::File => write!(f, "file"),
        }
    }
}

/// Something an item places into the image.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Provides {
    Directory(ImagePath),
    File(ImagePath),
}

impl Provides {
    pub fn path(&self) -> &ImagePath {
        match self {
            Provides::Directory(p) | Provides::File(p) => p,
        }
    }

    pub fn kind(&self) -> FactKind {
        match self {
            Provides::Directory(_) => FactKind::Directory,
            Provides::File(_) => FactKind::File,
        }
    }

    /// Whether this fact satisfies `req`: same path, compatible kind.
    pub fn satisfies(&self, req: &Requires) -> bool {
        self.path() == req.path() && self.kind() == req.kind()
    }
}

impl fmt::Display for Provides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}

/// A precondition an item needs before it can build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Requires {
    Directory(ImagePath),
}

impl Requires {
    pub fn path(&self) -> &ImagePath {
        match self {
            Requires::Directory(p) => p,
        }
    }

    pub fn kind(&self) -> FactKind {
        match self {
            Requires::Directory(_) => FactKind::Directory,
        }
    }
}

impl fmt::Display for Requires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}

pub fn require_directory(path: ImagePath) -> Requires {
    Requires::Directory(path)
}
