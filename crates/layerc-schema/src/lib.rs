//! Value types shared by every layerc crate.
//!
//! This crate defines the schema layer: normalized image paths (`ImagePath`),
//! the provides/requires facts the dependency compiler reasons about,
//! owner/group/mode stat options, package action kinds, and the TOML layer
//! declaration file (`LayerDeclaration`) that names the items of one layer.

pub mod declaration;
pub mod facts;
pub mod packages;
pub mod path;
pub mod stat;
pub mod types;

pub use declaration::{
    parse_declaration_file, parse_declaration_str, ItemDeclaration, LayerDeclaration,
    LayerSection, DECLARATION_VERSION,
};
pub use facts::{require_directory, FactKind, Provides, Requires};
pub use packages::{PackageActionKind, PackageSource};
pub use path::ImagePath;
pub use stat::{ModeSpec, Principal, StatOptions, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
pub use types::{PackageName, TargetLabel};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("invalid mode '{0}': expected octal (0755) or symbolic (u+rwx,go+rx)")]
    InvalidMode(String),
    #[error("invalid owner '{0}': expected a numeric id or a name")]
    InvalidPrincipal(String),
    #[error("unknown package action '{0}', expected 'install' or 'remove'")]
    UnknownPackageAction(String),
    #[error("failed to read declaration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse declaration: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported declaration_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("layer.target must not be empty")]
    EmptyTarget,
}
