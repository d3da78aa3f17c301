//! Gatehouse HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules plus the shared access-check and input
//! validation helpers every handler goes through.
//!
//! # Key invariants
//! - Handlers locate the target first (404), then compute ownership, then ask
//!   the policy; a denial returns 403 before any write.
//! - Every decision is logged and counted.
pub mod auth;
pub mod error;
pub mod openapi;
pub mod products;
pub mod system;
pub mod types;
pub mod users;

use crate::api::error::{ApiError, api_forbidden, api_validation_error};
use crate::app::AppState;
use crate::observability::record_access_decision;
use gatehouse_authz::password::{hash_password, verify_password, verify_password_dummy};
use gatehouse_authz::{Action, Decision, ListScope, Ownership, Principal, ScopedVerb, UserId};
use tokio::task::spawn_blocking;

pub(crate) const USERS: &str = "users";
pub(crate) const PRODUCTS: &str = "products";

const MAX_NAME_LEN: usize = 100;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 256;

pub(crate) fn require_access(
    state: &AppState,
    principal: &Principal,
    element: &str,
    action: Action,
) -> Result<(), ApiError> {
    let decision = state.policy.authorize(principal, element, action);
    record_access_decision(element, action, &decision);
    match decision {
        Decision::Allow => {
            tracing::debug!(user_id = %principal.id, element, %action, "access allowed");
            Ok(())
        }
        Decision::Deny(reason) => {
            tracing::info!(
                user_id = %principal.id,
                role = %principal.role.name,
                element,
                %action,
                reason = reason.as_str(),
                "access denied"
            );
            Err(api_forbidden("insufficient permissions"))
        }
    }
}

/// Check the narrow or `_all` variant of `verb` depending on who owns the target.
pub(crate) fn require_scoped(
    state: &AppState,
    principal: &Principal,
    element: &str,
    verb: ScopedVerb,
    owner_id: UserId,
) -> Result<(), ApiError> {
    let action = Action::scoped(verb, Ownership::of(owner_id, principal));
    require_access(state, principal, element, action)
}

pub(crate) fn require_list_scope(
    state: &AppState,
    principal: &Principal,
    element: &str,
) -> Result<ListScope, ApiError> {
    match state.policy.list_scope(principal, element) {
        Ok(scope) => {
            let action = match scope {
                ListScope::All => Action::ReadAll,
                ListScope::Owned => Action::Read,
            };
            record_access_decision(element, action, &Decision::Allow);
            Ok(scope)
        }
        Err(decision) => {
            record_access_decision(element, Action::Read, &decision);
            tracing::info!(user_id = %principal.id, element, ?decision, "listing denied");
            Err(api_forbidden("insufficient permissions"))
        }
    }
}

/// Trim and lowercase an email, rejecting anything without a local part and a dotted domain.
pub(crate) fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(api_validation_error("invalid email address"));
    }
    Ok(email)
}

pub(crate) fn validate_name(field: &str, raw: &str) -> Result<String, ApiError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(api_validation_error(&format!("{field} must not be empty")));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(api_validation_error(&format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(api_validation_error(&format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(api_validation_error("password is too long"));
    }
    Ok(())
}

/// Argon2id hash computed on the blocking pool.
pub(crate) async fn hash_password_blocking(password: String) -> anyhow::Result<String> {
    let hash = spawn_blocking(move || hash_password(&password)).await??;
    Ok(hash)
}

/// [`verify_password`] on the blocking pool. A failed task counts as a mismatch.
pub(crate) async fn verify_password_blocking(password: String, hash: String) -> bool {
    match spawn_blocking(move || verify_password(&password, &hash)).await {
        Ok(valid) => valid,
        Err(err) => {
            tracing::error!(error = %err, "password verification task failed");
            false
        }
    }
}

pub(crate) async fn verify_password_dummy_blocking(password: String) {
    if let Err(err) = spawn_blocking(move || verify_password_dummy(&password)).await {
        tracing::error!(error = %err, "dummy password verification task failed");
    }
}
