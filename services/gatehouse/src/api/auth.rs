//! Registration and credential exchange.
//!
//! # Purpose
//! Public endpoints that create accounts and exchange email/password for a
//! short-lived access token, plus the stateless logout acknowledgement.
//!
//! # Security considerations
//! - Self-registration always receives the configured default role.
//! - Login failures share one generic 401 whether the email is unknown, the
//!   password is wrong, or the account is deactivated. Unknown emails still pay
//!   for a password verification.
use crate::api::error::{
    ApiError, api_conflict, api_internal, api_internal_message, api_unauthorized,
};
use crate::api::types::{
    ErrorResponse, LoginRequest, MessageResponse, RegisterRequest, TokenResponse, UserResponse,
};
use crate::api::{
    hash_password_blocking, normalize_email, validate_name, validate_password,
    verify_password_blocking, verify_password_dummy_blocking,
};
use crate::app::AppState;
use crate::auth::Authenticated;
use crate::model::NewUser;
use crate::observability::record_login;
use crate::store::StoreError;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

const INVALID_CREDENTIALS: &str = "invalid credentials";

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let first_name = validate_name("first_name", &body.first_name)?;
    let last_name = validate_name("last_name", &body.last_name)?;
    let email = normalize_email(&body.email)?;
    validate_password(&body.password)?;

    let role = state
        .store
        .find_role_by_name(&state.default_role)
        .await
        .map_err(|err| api_internal("failed to load default role", &err))?
        .ok_or_else(|| {
            tracing::error!(role = %state.default_role, "default role is not provisioned");
            api_internal_message("registration is unavailable")
        })?;

    let password_hash = hash_password_blocking(body.password).await.map_err(|err| {
        tracing::error!(error = %err, "password hashing failed");
        api_internal_message("failed to create account")
    })?;

    let user = state
        .store
        .create_user(NewUser {
            first_name,
            last_name,
            email,
            password_hash,
            role_id: role.id,
        })
        .await
        .map_err(|err| match err {
            StoreError::Conflict(_) => api_conflict("email_taken", "email already registered"),
            other => api_internal("failed to create account", &other),
        })?;
    tracing::info!(user_id = %user.id, role = %role.name, "user registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Ok(email) = normalize_email(&body.email) else {
        verify_password_dummy_blocking(body.password).await;
        record_login("failure");
        return Err(api_unauthorized(INVALID_CREDENTIALS));
    };
    let user = state
        .store
        .find_user_by_email(&email)
        .await
        .map_err(|err| api_internal("failed to load account", &err))?;
    let Some(user) = user else {
        verify_password_dummy_blocking(body.password).await;
        record_login("failure");
        return Err(api_unauthorized(INVALID_CREDENTIALS));
    };
    if !verify_password_blocking(body.password, user.password_hash.clone()).await {
        record_login("failure");
        tracing::info!(user_id = %user.id, "login rejected");
        return Err(api_unauthorized(INVALID_CREDENTIALS));
    }
    if !user.is_active {
        record_login("inactive");
        tracing::info!(user_id = %user.id, "login rejected for deactivated account");
        return Err(api_unauthorized(INVALID_CREDENTIALS));
    }

    let access_token = state.issuer.issue(user.id, state.token_ttl).map_err(|err| {
        tracing::error!(error = %err, "token issuance failed");
        api_internal_message("failed to issue token")
    })?;
    record_login("success");
    tracing::info!(user_id = %user.id, "login succeeded");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.token_ttl.as_secs(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
/// Tokens are stateless; logout is an acknowledgement and the client drops its token.
pub(crate) async fn logout(Authenticated(principal): Authenticated) -> Json<MessageResponse> {
    tracing::debug!(user_id = %principal.id, "logout");
    Json(MessageResponse {
        message: "logged out".to_string(),
    })
}
