//! Naming policy -- maps an owner identity to container, subdomain and database names.
//!
//! All names are pure functions of the identity so that a reconciliation
//! sweep can recompute them from either side (record or container).
//!
//! ```
//! use scoutpost_core::naming::{InstanceNames, slugify};
//!
//! assert_eq!(slugify("Alice_01"), "alice-01");
//!
//! let names = InstanceNames::derive("Alice_01");
//! assert_eq!(names.container_name, "ns_Alice_01");
//! assert_eq!(names.subdomain, "alice-01");
//! assert_eq!(names.db_name, "ns_user_Alice_01");
//! ```
//!
//! # Collisions
//!
//! `slugify` is not injective: `"A_B"` and `"a-b"` share the subdomain `a-b`.
//! Identities are unique upstream (case-sensitively), slugs are not; the record
//! store's unique subdomain constraint turns such a pair into a conflict on the
//! second create instead of a shared route.

use serde::{Deserialize, Serialize};

use crate::error::InstanceError;

/// Container name prefix.
pub const CONTAINER_PREFIX: &str = "ns_";

/// Logical database name prefix.
pub const DATABASE_PREFIX: &str = "ns_user_";

/// Longest identity accepted; keeps the subdomain within one DNS label.
pub const MAX_IDENTITY_LEN: usize = 63;

/// Normalizes an identity into a DNS-label and container-name safe slug.
///
/// ASCII letters are lowercased; every other character outside `[a-z0-9-]`
/// becomes a single `-`. The function is total and idempotent.
pub fn slugify(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Checks that an identity can be embedded verbatim in resource names.
///
/// The container and database names carry the identity unescaped, so only
/// `[A-Za-z0-9_-]` is accepted. Dots, slashes and `$` would otherwise reach
/// the docker and database name parsers.
pub fn validate_identity(identity: &str) -> Result<(), InstanceError> {
    let reject = |reason: String| InstanceError::InvalidIdentity {
        identity: identity.to_owned(),
        reason,
    };

    if identity.is_empty() {
        return Err(reject("identity must not be empty".to_owned()));
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(reject(format!(
            "length {} exceeds {MAX_IDENTITY_LEN}",
            identity.len()
        )));
    }
    if let Some(bad) = identity
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(reject(format!("character '{bad}' is not allowed")));
    }
    if slugify(identity).trim_matches('-').is_empty() {
        return Err(reject("identity has no letters or digits".to_owned()));
    }
    Ok(())
}

/// Resource names derived from one owner identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNames {
    /// Docker container name (`ns_<identity>`)
    pub container_name: String,
    /// Subdomain routed by the proxy (`slugify(identity)`)
    pub subdomain: String,
    /// Logical database name (`ns_user_<identity>`)
    pub db_name: String,
}

impl InstanceNames {
    /// Derives all names for `identity`. Does not validate; see [`validate_identity`].
    pub fn derive(identity: &str) -> Self {
        Self {
            container_name: format!("{CONTAINER_PREFIX}{identity}"),
            subdomain: slugify(identity),
            db_name: format!("{DATABASE_PREFIX}{identity}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_slug_alphabet(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    #[test]
    fn slugify_lowercases_and_replaces() {
        assert_eq!(slugify("Alice"), "alice");
        assert_eq!(slugify("bob.smith"), "bob-smith");
        assert_eq!(slugify("A_B"), "a-b");
        assert_eq!(slugify("x y/z"), "x-y-z");
    }

    #[test]
    fn slugify_keeps_hyphens_and_digits() {
        assert_eq!(slugify("user-42"), "user-42");
    }

    #[test]
    fn slugify_non_ascii_becomes_one_hyphen_per_char() {
        assert_eq!(slugify("jöhn"), "j-hn");
        assert_eq!(slugify("日本"), "--");
    }

    #[test]
    fn slugify_empty_is_empty() {
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn slugify_output_alphabet_and_idempotence() {
        let inputs = [
            "Alice",
            "A_B",
            "a-b",
            "Zoë.Smith",
            "  spaced  ",
            "UPPER_lower-123",
            "emoji🙂",
            "tab\tname",
            "$(rm -rf)",
            "",
        ];
        for input in inputs {
            let slug = slugify(input);
            assert!(is_slug_alphabet(&slug), "bad slug {slug:?} for {input:?}");
            assert_eq!(slugify(&slug), slug, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn slugify_known_collision_is_accepted() {
        assert_eq!(slugify("A_B"), slugify("a-b"));
    }

    #[test]
    fn derive_names() {
        let names = InstanceNames::derive("alice");
        assert_eq!(names.container_name, "ns_alice");
        assert_eq!(names.subdomain, "alice");
        assert_eq!(names.db_name, "ns_user_alice");
    }

    #[test]
    fn derive_keeps_identity_case_in_container_and_db() {
        let names = InstanceNames::derive("Bob_X");
        assert_eq!(names.container_name, "ns_Bob_X");
        assert_eq!(names.subdomain, "bob-x");
        assert_eq!(names.db_name, "ns_user_Bob_X");
    }

    #[test]
    fn validate_accepts_usernames() {
        for ok in ["alice", "Bob", "user_01", "a-b", "x"] {
            validate_identity(ok).unwrap();
        }
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(matches!(
            validate_identity(""),
            Err(InstanceError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn validate_rejects_name_breaking_characters() {
        for bad in ["a.b", "a/b", "a b", "a$b", "ü", "name\0"] {
            assert!(validate_identity(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn validate_rejects_separator_only() {
        assert!(validate_identity("___").is_err());
        assert!(validate_identity("-").is_err());
    }

    #[test]
    fn validate_length_boundary() {
        let max = "a".repeat(MAX_IDENTITY_LEN);
        validate_identity(&max).unwrap();
        let over = "a".repeat(MAX_IDENTITY_LEN + 1);
        assert!(validate_identity(&over).is_err());
    }
}
