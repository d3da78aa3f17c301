//! Strongly typed identifiers for users and roles.
//!
//! # Purpose
//! Wraps the integer keys handed out by the store so a role id can never be
//! compared against a user id by accident.
//!
//! # Key invariants
//! - The wrapped value is preserved exactly; `Display` prints the raw integer.
//! - Serialization is transparent, so JSON and token claims carry plain numbers.
//!
//! # Examples
//! ```rust
//! use gatehouse_authz::{RoleId, UserId};
//!
//! let user = UserId::new(42);
//! assert_eq!(user.get(), 42);
//! assert_eq!(RoleId::new(1).to_string(), "1");
//! ```
use serde::{Deserialize, Serialize};

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

int_id!(
    /// Identifier of a user record, and therefore of a principal.
    UserId
);
int_id!(
    /// Identifier of a role record.
    RoleId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&UserId::new(9)).expect("serialize");
        assert_eq!(json, "9");
        let role: RoleId = serde_json::from_str("3").expect("deserialize");
        assert_eq!(role, RoleId::new(3));
    }
}
