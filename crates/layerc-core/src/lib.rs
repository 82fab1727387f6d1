//! Dependency compiler and build orchestration for image layers.
//!
//! A layer is a set of [`Item`]s. Each item states the filesystem facts it
//! provides and requires; [`LayerBuild::validate`] checks that the facts are
//! consistent and orders the items into a [`BuildPlan`] without touching any
//! subvolume. [`BuildPlan::execute`] then applies the items, one at a time,
//! to a single [`layerc_runtime::Subvolume`]. [`LayerCompiler`] ties this to
//! the subvolumes directory: parent resolution, locking, read-only marking,
//! and descriptor output.

pub mod compiler;
pub mod concurrency;
pub mod graph;
pub mod items;
pub mod lifecycle;
pub mod parent;
pub mod phases;

pub use compiler::{BuildOptions, BuildPlan, BuildResult, LayerBuild, LayerCompiler, PlanStep};
pub use concurrency::{install_signal_handler, shutdown_requested, SubvolumeLock};
pub use items::{
    CopyFile, FilesystemRoot, ImageItem, Item, MakeDirs, MultiPackageAction, ParentLayer,
    Tarball,
};
pub use lifecycle::{validate_transition, BuildState, FailureKind};
pub use parent::gen_parent_layer_items;

use layerc_schema::{ImagePath, Requires};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("declaration error: {0}")]
    Schema(#[from] layerc_schema::SchemaError),
    #[error("store error: {0}")]
    Store(#[from] layerc_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] layerc_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid {kind} item from {target}: {reason}")]
    Construction {
        target: String,
        kind: &'static str,
        reason: String,
    },
    #[error("conflict: {path} is provided by both {first} and {second}")]
    Conflict {
        path: ImagePath,
        first: String,
        second: String,
    },
    #[error("missing requirement: {target} requires {requirement}{detail}")]
    MissingRequirement {
        target: String,
        requirement: Requires,
        detail: String,
    },
    #[error("dependency cycle through {path} involving {targets}")]
    Cycle { path: ImagePath, targets: String },
    #[error("incompatible package actions: {0}")]
    ActionIncompatibility(String),
    #[error("build step from {target} failed: {source}")]
    Mutation {
        target: String,
        source: layerc_runtime::RuntimeError,
    },
    #[error("build interrupted before {0}")]
    Interrupted(String),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("subvolume is locked by another build: {}", .0.display())]
    Locked(PathBuf),
}

impl CoreError {
    /// Whether the error was raised before any subvolume was touched.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            CoreError::Conflict { .. }
                | CoreError::MissingRequirement { .. }
                | CoreError::Cycle { .. }
                | CoreError::ActionIncompatibility(_)
        )
    }
}
