//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Provenance label of the build target that declared an item, e.g.
    /// `//images/base:motd`. Diagnostic only.
    TargetLabel
);

string_newtype!(
    /// Bare package name as resolved by a package source, e.g. `bash`.
    PackageName
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_label_display_and_as_ref() {
        let t = TargetLabel::new("//images:base");
        assert_eq!(t.to_string(), "//images:base");
        assert_eq!(t.as_str(), "//images:base");
        assert_eq!(AsRef::<str>::as_ref(&t), "//images:base");
    }

    #[test]
    fn package_name_serde_is_transparent() {
        let p = PackageName::new("bash");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"bash\"");
        let back: PackageName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn package_names_order_lexically() {
        let mut names = [PackageName::from("zsh"), PackageName::from("bash")];
        names.sort();
        assert_eq!(names[0], "bash");
    }
}
