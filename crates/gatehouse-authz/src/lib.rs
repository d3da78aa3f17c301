//! Gatehouse authn/authz primitives shared by the service and its tests.
//!
//! # Purpose
//! Centralizes the role/rule model, the access decision engine, and the
//! credential helpers (password hashing, bearer tokens) used by the HTTP layer.
//!
//! # How it fits
//! The service resolves a [`Principal`] from a bearer token, locates the target
//! record, and asks [`AccessPolicy`] for a [`Decision`] before mutating state.
//! Nothing in this crate performs I/O; rules are loaded by the caller.
//!
//! # Key invariants
//! - The `admin` role is allowed everything without consulting the rule table.
//! - A missing rule row for `(role, element)` denies every action.
//! - Decisions are values, not errors; errors are reserved for faults.
//! - Access tokens are EdDSA/Ed25519 only.
//!
//! # Examples
//! ```rust
//! use gatehouse_authz::{
//!     AccessPolicy, Action, PermissionRule, Principal, Role, RoleId, RuleSet, UserId,
//! };
//!
//! let rules = RuleSet::from_rules(vec![
//!     PermissionRule::new(RoleId::new(2), "products").with(Action::Create),
//! ])
//! .expect("rules");
//! let policy = AccessPolicy::new(rules);
//! let principal = Principal::new(UserId::new(7), Role::new(RoleId::new(2), "user"), true);
//! assert!(policy.authorize(&principal, "products", Action::Create).is_allowed());
//! assert!(!policy.authorize(&principal, "products", Action::DeleteAll).is_allowed());
//! ```

mod action;
mod decision;
mod errors;
mod ids;
pub mod password;
mod principal;
mod rule;
pub mod token;

pub use action::{Action, Ownership, ScopedVerb};
pub use decision::{AccessPolicy, Decision, DenyReason, ListScope};
pub use errors::{AuthzError, AuthzResult};
pub use ids::{RoleId, UserId};
pub use principal::{ADMIN_ROLE, Principal, Role};
pub use rule::{PermissionRule, RuleSet, RuleTable};
pub use token::{
    AccessClaims, MAX_TOKEN_TTL, TokenError, TokenIssuer, TokenKey, TokenKeys, TokenVerifier,
};
