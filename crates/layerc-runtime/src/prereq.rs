use crate::host::Escalation;
use std::fmt;
use std::process::Command;

/// A missing host tool with an install hint.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

const HOST_TOOLS: &[(&str, &str, &str)] = &[
    (
        "btrfs",
        "subvolume create, snapshot and read-only marking",
        "apt install btrfs-progs | dnf install btrfs-progs | pacman -S btrfs-progs",
    ),
    ("tar", "tarball extraction", "part of GNU tar"),
    ("cp", "file copies", "part of coreutils"),
    ("chown", "ownership changes", "part of coreutils"),
    ("chmod", "mode changes", "part of coreutils"),
    ("mkdir", "directory creation", "part of coreutils"),
    ("find", "parent layer enumeration", "part of GNU findutils"),
];

/// Check the tools the host executor shells out to.
/// An empty list means every prerequisite is met.
pub fn check_host_prereqs(escalation: Escalation) -> Vec<MissingPrereq> {
    let mut missing: Vec<MissingPrereq> = HOST_TOOLS
        .iter()
        .filter(|(name, _, _)| !command_exists(name))
        .map(|&(name, purpose, install_hint)| MissingPrereq {
            name,
            purpose,
            install_hint,
        })
        .collect();

    if escalation == Escalation::Sudo && !command_exists("sudo") {
        missing.push(MissingPrereq {
            name: "sudo",
            purpose: "privilege escalation for subvolume mutation",
            install_hint: "apt install sudo | dnf install sudo, or pass --executor direct as root",
        });
    }
    missing
}

pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nlayerc needs these tools to build image layers.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "btrfs",
            purpose: "snapshots",
            install_hint: "apt install btrfs-progs",
        };
        let s = m.to_string();
        assert!(s.contains("btrfs"));
        assert!(s.contains("snapshots"));
        assert!(s.contains("apt install btrfs-progs"));
    }

    #[test]
    fn format_missing_lists_all() {
        let missing = vec![
            MissingPrereq {
                name: "btrfs",
                purpose: "a",
                install_hint: "x",
            },
            MissingPrereq {
                name: "sudo",
                purpose: "b",
                install_hint: "y",
            },
        ];
        let msg = format_missing(&missing);
        assert!(msg.starts_with("missing prerequisites:"));
        assert!(msg.contains("btrfs"));
        assert!(msg.contains("sudo"));
    }
}
