pub mod build;
pub mod plan;
pub mod render;

use indicatif::{ProgressBar, ProgressStyle};
use layerc_core::CoreError;
use layerc_runtime::{check_host_prereqs, format_missing, Escalation};
use layerc_schema::{parse_declaration_file, LayerDeclaration};
use layerc_store::RenderedNode;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DECLARATION_ERROR: u8 = 2;
pub const EXIT_PLAN_ERROR: u8 = 3;

/// A failed command: the message for stderr and the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub code: u8,
    pub message: String,
}

impl CommandError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<CoreError> for CommandError {
    fn from(e: CoreError) -> Self {
        let code = if e.is_plan_error() {
            EXIT_PLAN_ERROR
        } else if matches!(e, CoreError::Schema(_) | CoreError::Construction { .. }) {
            EXIT_DECLARATION_ERROR
        } else {
            EXIT_FAILURE
        };
        Self::new(code, e.to_string())
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self::new(EXIT_FAILURE, message)
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CommandError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CommandError::from(format!("JSON serialization failed: {e}")))
}

pub fn load_declaration(path: &Path) -> Result<LayerDeclaration, CommandError> {
    parse_declaration_file(path).map_err(|e| CommandError::from(CoreError::Schema(e)))
}

/// Host prerequisites for `executor`. Skipped with `LAYERC_SKIP_PREREQS=1`.
pub fn check_prereqs(executor: &str) -> Result<(), String> {
    if std::env::var("LAYERC_SKIP_PREREQS").as_deref() == Ok("1") {
        return Ok(());
    }
    let escalation = match executor {
        "sudo" => Escalation::Sudo,
        "direct" => Escalation::Direct,
        "virtual" => return Ok(()),
        other => {
            return Err(format!(
                "unknown executor '{other}', expected sudo, direct or virtual"
            ))
        }
    };
    let missing = check_host_prereqs(escalation);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format_missing(&missing))
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(finish_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(finish_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_kind(kind: &str) -> String {
    use console::Style;
    match kind {
        "filesystem_root" | "parent_layer" => Style::new().cyan().bold().apply_to(kind).to_string(),
        "packages" => Style::new().magenta().apply_to(kind).to_string(),
        "copy_file" | "make_dirs" | "tarball" => Style::new().green().apply_to(kind).to_string(),
        other => other.to_owned(),
    }
}

/// Text form of a rendered tree: one `path label` line per node, depth first.
pub fn format_tree(node: &RenderedNode) -> String {
    let mut out = String::new();
    for (path, label) in node.flatten() {
        let _ = writeln!(out, "{path} {label}");
    }
    out
}
