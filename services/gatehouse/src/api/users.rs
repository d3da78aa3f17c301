//! User account handlers.
//!
//! # Purpose
//! Profile reads, updates, and deactivation for the caller (`/users/me`) and for
//! arbitrary accounts (`/users/{id}`), all checked against the `users` element.
//!
//! # Key invariants
//! - The target is loaded before authorization, so an unknown id is 404 for
//!   every caller.
//! - Acting on one's own record needs the narrow verb; anyone else's needs the
//!   `_all` verb.
//! - Deleting an account deactivates it. Its tokens stop resolving at once.
//! - Changing one's own profile requires the current password.
use crate::api::error::{
    ApiError, api_conflict, api_forbidden, api_from_lookup, api_internal, api_internal_message,
    api_not_found, api_validation_error,
};
use crate::api::types::{ErrorResponse, UserListResponse, UserResponse, UserUpdateRequest};
use crate::api::{
    USERS, hash_password_blocking, normalize_email, require_list_scope, require_scoped,
    validate_name, validate_password, verify_password_blocking,
};
use crate::app::AppState;
use crate::auth::Authenticated;
use crate::model::{User, UserPatch};
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use gatehouse_authz::{ListScope, Principal, ScopedVerb, UserId};

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller profile", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    )
)]
pub(crate) async fn get_me(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<UserResponse>, ApiError> {
    read_user(&state, &principal, principal.id).await
}

#[utoipa::path(
    patch,
    path = "/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Forbidden or wrong current password", body = ErrorResponse),
        (status = 409, description = "Email already taken", body = ErrorResponse)
    )
)]
pub(crate) async fn update_me(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Json(body): Json<UserUpdateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    update_user(&state, &principal, principal.id, body).await
}

#[utoipa::path(
    delete,
    path = "/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    )
)]
pub(crate) async fn delete_me(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<StatusCode, ApiError> {
    deactivate_user(&state, &principal, principal.id).await
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Users visible to the caller", body = UserListResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    )
)]
pub(crate) async fn list_users(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<UserListResponse>, ApiError> {
    let only = match require_list_scope(&state, &principal, USERS)? {
        ListScope::All => None,
        ListScope::Owned => Some(principal.id),
    };
    let users = state
        .store
        .list_users(only)
        .await
        .map_err(|err| api_internal("failed to list users", &err))?;
    Ok(Json(UserListResponse {
        items: users.into_iter().map(UserResponse::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User profile", body = UserResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub(crate) async fn get_user(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    read_user(&state, &principal, UserId::new(id)).await
}

#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Email already taken", body = ErrorResponse)
    )
)]
pub(crate) async fn patch_user(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
    Json(body): Json<UserUpdateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    update_user(&state, &principal, UserId::new(id), body).await
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub(crate) async fn delete_user(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    deactivate_user(&state, &principal, UserId::new(id)).await
}

async fn load_user(state: &AppState, id: UserId) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .await
        .map_err(|err| api_from_lookup("user not found", "failed to load user", err))
}

async fn read_user(
    state: &AppState,
    principal: &Principal,
    id: UserId,
) -> Result<Json<UserResponse>, ApiError> {
    let user = load_user(state, id).await?;
    require_scoped(state, principal, USERS, ScopedVerb::Read, user.id)?;
    Ok(Json(UserResponse::from(user)))
}

async fn update_user(
    state: &AppState,
    principal: &Principal,
    id: UserId,
    body: UserUpdateRequest,
) -> Result<Json<UserResponse>, ApiError> {
    let target = load_user(state, id).await?;
    require_scoped(state, principal, USERS, ScopedVerb::Update, target.id)?;

    if target.id == principal.id {
        let Some(current) = body.current_password.clone() else {
            return Err(api_validation_error("current_password is required"));
        };
        if !verify_password_blocking(current, target.password_hash.clone()).await {
            tracing::info!(user_id = %principal.id, "profile update with wrong current password");
            return Err(api_forbidden("incorrect current password"));
        }
    }

    let patch = build_patch(&target, body).await?;
    if patch.is_empty() {
        return Ok(Json(UserResponse::from(target)));
    }
    let updated = state
        .store
        .update_user(target.id, patch)
        .await
        .map_err(|err| match err {
            StoreError::Conflict(_) => api_conflict("email_taken", "email already taken"),
            StoreError::NotFound(_) => api_not_found("user not found"),
            other => api_internal("failed to update user", &other),
        })?;
    tracing::info!(user_id = %updated.id, actor = %principal.id, "user updated");
    Ok(Json(UserResponse::from(updated)))
}

async fn build_patch(target: &User, body: UserUpdateRequest) -> Result<UserPatch, ApiError> {
    let mut patch = UserPatch::default();
    if let Some(first_name) = body.first_name {
        patch.first_name = Some(validate_name("first_name", &first_name)?);
    }
    if let Some(last_name) = body.last_name {
        patch.last_name = Some(validate_name("last_name", &last_name)?);
    }
    if let Some(email) = body.email {
        let email = normalize_email(&email)?;
        if email != target.email {
            patch.email = Some(email);
        }
    }
    if let Some(password) = body.password {
        validate_password(&password)?;
        let hash = hash_password_blocking(password).await.map_err(|err| {
            tracing::error!(error = %err, "password hashing failed");
            api_internal_message("failed to update user")
        })?;
        patch.password_hash = Some(hash);
    }
    Ok(patch)
}

async fn deactivate_user(
    state: &AppState,
    principal: &Principal,
    id: UserId,
) -> Result<StatusCode, ApiError> {
    let target = load_user(state, id).await?;
    require_scoped(state, principal, USERS, ScopedVerb::Delete, target.id)?;
    state
        .store
        .set_user_active(target.id, false)
        .await
        .map_err(|err| api_from_lookup("user not found", "failed to deactivate user", err))?;
    tracing::info!(user_id = %target.id, actor = %principal.id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}
