//! Gatehouse authentication modules.
//!
//! # Purpose
//! Turns bearer tokens into principals for the HTTP layer. Token and password
//! primitives live in `gatehouse-authz`.
pub mod identity;

pub use identity::{Authenticated, Identity, IdentityResolver};
