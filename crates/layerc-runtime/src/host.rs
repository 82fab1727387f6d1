use crate::executor::{PrivilegedExecutor, RootOp};
use crate::RuntimeError;
use layerc_store::{parse_find_listing, render_host_tree, RenderedNode, StoreError, TreeEntry};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Prefix every command with `sudo --non-interactive --`.
    Sudo,
    /// Run commands as the current user; the caller is already root.
    Direct,
}

/// Runs operations as subprocesses on the host.
#[derive(Debug, Clone)]
pub struct HostExecutor {
    escalation: Escalation,
}

impl HostExecutor {
    pub fn sudo() -> Self {
        Self {
            escalation: Escalation::Sudo,
        }
    }

    pub fn direct() -> Self {
        Self {
            escalation: Escalation::Direct,
        }
    }

    pub fn escalation(&self) -> Escalation {
        self.escalation
    }

    fn escalated(&self, program: &OsStr) -> Command {
        match self.escalation {
            Escalation::Sudo => {
                let mut c = Command::new("sudo");
                c.args(["--non-interactive", "--"]).arg(program);
                c
            }
            Escalation::Direct => Command::new(program),
        }
    }

    fn command(&self, op: &RootOp) -> Result<Command, RuntimeError> {
        let argv = op.argv();
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| RuntimeError::ExecFailed(format!("empty command for {op:?}")))?;
        let mut cmd = self.escalated(program);
        cmd.args(rest);
        if let Some(dir) = op.cwd() {
            if !dir.is_dir() {
                return Err(RuntimeError::NotFound(dir.to_path_buf()));
            }
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    /// NUL-separated `<type> <relative path>` records for everything below
    /// `root`, listed with the same privileges the mutations run with.
    fn list_command(&self, root: &Path) -> Command {
        let mut cmd = self.escalated(OsStr::new("find"));
        cmd.arg(root).args(["-mindepth", "1", "-printf", "%y %P\\0"]);
        cmd
    }
}

impl PrivilegedExecutor for HostExecutor {
    fn name(&self) -> &'static str {
        match self.escalation {
            Escalation::Sudo => "sudo",
            Escalation::Direct => "direct",
        }
    }

    fn run(&self, op: &RootOp) -> Result<(), RuntimeError> {
        let mut cmd = self.command(op)?;
        debug!(executor = self.name(), "{op}");
        let output = cmd
            .output()
            .map_err(|e| RuntimeError::ExecFailed(format!("{op}: {e}")))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RuntimeError::ExecFailed(format!(
            "{op} exited with code {}: {}",
            output.status.code().unwrap_or(1),
            stderr.trim()
        )))
    }

    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn enumerate(&self, root: &Path) -> Result<Vec<TreeEntry>, RuntimeError> {
        if !root.is_dir() {
            return Err(StoreError::SubvolumeNotFound(root.to_path_buf()).into());
        }
        let mut cmd = self.list_command(root);
        debug!(executor = self.name(), "find {}", root.display());
        let output = cmd
            .output()
            .map_err(|e| RuntimeError::ExecFailed(format!("find {}: {e}", root.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::ExecFailed(format!(
                "find {} exited with code {}: {}",
                root.display(),
                output.status.code().unwrap_or(1),
                stderr.trim()
            )));
        }
        Ok(parse_find_listing(&output.stdout)?)
    }

    fn render(&self, root: &Path) -> Result<RenderedNode, RuntimeError> {
        Ok(render_host_tree(root)?)
    }
}
