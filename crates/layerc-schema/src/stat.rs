//! Owner, group and mode options for filesystem objects an item creates.
//!
//! Modes are always resolved *absolutely*: a symbolic mode such as `u+rw`
//! is applied to an all-zero mode, so re-applying it to an object with
//! different permissions yields the same final state.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_DIR_MODE: u32 = 0o755;
pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_EXECUTABLE_MODE: u32 = 0o755;

const MAX_MODE: u32 = 0o7777;

/// A user or group, either numeric or a name looked up on the build host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawScalar", into = "String")]
pub enum Principal {
    Id(u32),
    Name(String),
}

impl Principal {
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let s = s.trim();
        if s.is_empty() || s.contains(':') || s.chars().any(char::is_whitespace) {
            return Err(SchemaError::InvalidPrincipal(s.to_owned()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(Principal::Id)
                .map_err(|_| SchemaError::InvalidPrincipal(s.to_owned()));
        }
        Ok(Principal::Name(s.to_owned()))
    }

    pub fn root() -> Self {
        Principal::Id(0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Id(id) => write!(f, "{id}"),
            Principal::Name(name) => f.write_str(name),
        }
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Int(u32),
    Text(String),
}

impl TryFrom<RawScalar> for Principal {
    type Error = SchemaError;

    fn try_from(raw: RawScalar) -> Result<Self, Self::Error> {
        match raw {
            RawScalar::Int(id) => Ok(Principal::Id(id)),
            RawScalar::Text(s) => Principal::parse(&s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ModeOp {
    Add,
    Remove,
    Set,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModeClause {
    // Bitmask over the classes: 0b100 user, 0b010 group, 0b001 other.
    classes: u8,
    op: ModeOp,
    perms: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ModeForm {
    Octal(u32),
    Symbolic(Vec<ModeClause>),
}

/// A file mode given as octal (`0755`) or as symbolic clauses (`u+rw,go=r`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawScalar", into = "String")]
pub struct ModeSpec {
    text: String,
    form: ModeForm,
}

impl ModeSpec {
    pub fn octal(mode: u32) -> Result<Self, SchemaError> {
        if mode > MAX_MODE {
            return Err(SchemaError::InvalidMode(format!("{mode:o}")));
        }
        Ok(Self {
            text: format!("{mode:04o}"),
            form: ModeForm::Octal(mode),
        })
    }

    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let text = s.trim();
        if text.is_empty() {
            return Err(SchemaError::InvalidMode(s.to_owned()));
        }
        let digits = text.strip_prefix("0o").unwrap_or(text);
        if digits.bytes().all(|b| b.is_ascii_digit()) {
            let mode = u32::from_str_radix(digits, 8)
                .map_err(|_| SchemaError::InvalidMode(s.to_owned()))?;
            return Self::octal(mode);
        }

        let mut clauses = Vec::new();
        for raw_clause in text.split(',') {
            parse_clause(raw_clause, &mut clauses)
                .ok_or_else(|| SchemaError::InvalidMode(s.to_owned()))?;
        }
        Ok(Self {
            text: text.to_owned(),
            form: ModeForm::Symbolic(clauses),
        })
    }

    /// The absolute mode this spec produces for an object of the given type.
    pub fn resolve(&self, is_dir: bool) -> u32 {
        let clauses = match &self.form {
            ModeForm::Octal(mode) => return *mode,
            ModeForm::Symbolic(clauses) => clauses,
        };
        let mut mode = 0u32;
        for clause in clauses {
            let bits = clause_bits(clause, mode, is_dir);
            match clause.op {
                ModeOp::Add => mode |= bits,
                ModeOp::Remove => mode &= !bits,
                ModeOp::Set => {
                    mode &= !class_mask(clause.classes);
                    mode |= bits;
                }
            }
        }
        mode
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ModeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<ModeSpec> for String {
    fn from(m: ModeSpec) -> Self {
        m.text
    }
}

impl TryFrom<RawScalar> for ModeSpec {
    type Error = SchemaError;

    fn try_from(raw: RawScalar) -> Result<Self, Self::Error> {
        match raw {
            // TOML octal literals (`0o755`) arrive as plain integers.
            RawScalar::Int(mode) => ModeSpec::octal(mode),
            RawScalar::Text(s) => ModeSpec::parse(&s),
        }
    }
}

fn parse_clause(raw: &str, out: &mut Vec<ModeClause>) -> Option<()> {
    let op_start = raw.find(['+', '-', '='])?;
    let (who, mut rest) = raw.split_at(op_start);
    let mut classes = 0u8;
    for c in who.chars() {
        classes |= match c {
            'u' => 0b100,
            'g' => 0b010,
            'o' => 0b001,
            'a' => 0b111,
            _ => return None,
        };
    }
    if classes == 0 {
        classes = 0b111;
    }

    // A clause may chain several operations, e.g. `u+rw-x`.
    while !rest.is_empty() {
        let op = match rest.as_bytes()[0] {
            b'+' => ModeOp::Add,
            b'-' => ModeOp::Remove,
            b'=' => ModeOp::Set,
            _ => return None,
        };
        rest = &rest[1..];
        let end = rest.find(['+', '-', '=']).unwrap_or(rest.len());
        let perms = &rest[..end];
        if !perms.chars().all(|c| "rwxXst".contains(c)) {
            return None;
        }
        out.push(ModeClause {
            classes,
            op,
            perms: perms.to_owned(),
        });
        rest = &rest[end..];
    }
    Some(())
}

fn class_mask(classes: u8) -> u32 {
    let mut mask = 0;
    if classes & 0b100 != 0 {
        mask |= 0o4700;
    }
    if classes & 0b010 != 0 {
        mask |= 0o2070;
    }
    if classes & 0b001 != 0 {
        mask |= 0o1007;
    }
    mask
}

fn clause_bits(clause: &ModeClause, current: u32, is_dir: bool) -> u32 {
    let mut bits = 0;
    for (class, shift) in [(0b100u8, 6u32), (0b010, 3), (0b001, 0)] {
        if clause.classes & class == 0 {
            continue;
        }
        for p in clause.perms.chars() {
            bits |= match p {
                'r' => 0o4 << shift,
                'w' => 0o2 << shift,
                'x' => 0o1 << shift,
                'X' if is_dir || current & 0o111 != 0 => 0o1 << shift,
                's' if class == 0b100 => 0o4000,
                's' if class == 0b010 => 0o2000,
                't' if class == 0b001 => 0o1000,
                _ => 0,
            };
        }
    }
    bits
}

/// Owner, group and mode to apply to created objects. Unset fields fall
/// back to root ownership and type-dependent default modes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Principal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Principal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ModeSpec>,
}

impl StatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: &str) -> Result<Self, SchemaError> {
        self.user = Some(Principal::parse(user)?);
        Ok(self)
    }

    pub fn with_group(mut self, group: &str) -> Result<Self, SchemaError> {
        self.group = Some(Principal::parse(group)?);
        Ok(self)
    }

    pub fn with_mode(mut self, mode: &str) -> Result<Self, SchemaError> {
        self.mode = Some(ModeSpec::parse(mode)?);
        Ok(self)
    }

    pub fn user_or_root(&self) -> Principal {
        self.user.clone().unwrap_or_else(Principal::root)
    }

    pub fn group_or_root(&self) -> Principal {
        self.group.clone().unwrap_or_else(Principal::root)
    }

    pub fn directory_mode(&self) -> u32 {
        self.mode
            .as_ref()
            .map_or(DEFAULT_DIR_MODE, |m| m.resolve(true))
    }

    /// Mode for a regular file; without an explicit mode, the source's
    /// execute bits collapse to 0755 or 0644.
    pub fn file_mode(&self, source_executable: bool) -> u32 {
        match &self.mode {
            Some(m) => m.resolve(false),
            None if source_executable => DEFAULT_EXECUTABLE_MODE,
            None => DEFAULT_FILE_MODE,
        }
    }
}
