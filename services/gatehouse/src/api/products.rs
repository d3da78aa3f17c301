//! Product handlers under `/resource/products`.
//!
//! # Key invariants
//! - Lookup precedes authorization: a missing product is 404 for everyone.
//! - Creating a product always records the caller as owner.
//! - A denied update or delete leaves the product untouched.
use crate::api::error::{ApiError, api_from_lookup, api_internal, api_validation_error};
use crate::api::types::{ErrorResponse, ProductListResponse, ProductRequest};
use crate::api::{PRODUCTS, require_access, require_list_scope, require_scoped, validate_name};
use crate::app::AppState;
use crate::auth::Authenticated;
use crate::model::{NewProduct, Product, ProductUpdate};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use gatehouse_authz::{Action, ListScope, ScopedVerb};

const MAX_DESCRIPTION_LEN: usize = 2000;

#[utoipa::path(
    get,
    path = "/resource/products",
    tag = "products",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Products visible to the caller", body = ProductListResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    )
)]
pub(crate) async fn list_products(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<ProductListResponse>, ApiError> {
    let owner = match require_list_scope(&state, &principal, PRODUCTS)? {
        ListScope::All => None,
        ListScope::Owned => Some(principal.id),
    };
    let items = state
        .store
        .list_products(owner)
        .await
        .map_err(|err| api_internal("failed to list products", &err))?;
    Ok(Json(ProductListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/resource/products",
    tag = "products",
    security(("bearer_auth" = [])),
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    )
)]
pub(crate) async fn create_product(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Json(body): Json<ProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    require_access(&state, &principal, PRODUCTS, Action::Create)?;
    let (name, description) = validate_product(body)?;
    let product = state
        .store
        .create_product(NewProduct {
            name,
            description,
            owner_id: principal.id,
        })
        .await
        .map_err(|err| api_internal("failed to create product", &err))?;
    tracing::info!(product_id = product.id, owner_id = %principal.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

#[utoipa::path(
    get,
    path = "/resource/products/{id}",
    tag = "products",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = Product),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub(crate) async fn get_product(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    let product = load_product(&state, id).await?;
    require_scoped(&state, &principal, PRODUCTS, ScopedVerb::Read, product.owner_id)?;
    Ok(Json(product))
}

#[utoipa::path(
    put,
    path = "/resource/products/{id}",
    tag = "products",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Product id")),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "Updated product", body = Product),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub(crate) async fn update_product(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let product = load_product(&state, id).await?;
    require_scoped(&state, &principal, PRODUCTS, ScopedVerb::Update, product.owner_id)?;
    let (name, description) = validate_product(body)?;
    let updated = state
        .store
        .update_product(product.id, ProductUpdate { name, description })
        .await
        .map_err(|err| api_from_lookup("product not found", "failed to update product", err))?;
    tracing::info!(product_id = updated.id, actor = %principal.id, "product updated");
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/resource/products/{id}",
    tag = "products",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub(crate) async fn delete_product(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let product = load_product(&state, id).await?;
    require_scoped(&state, &principal, PRODUCTS, ScopedVerb::Delete, product.owner_id)?;
    state
        .store
        .delete_product(product.id)
        .await
        .map_err(|err| api_from_lookup("product not found", "failed to delete product", err))?;
    tracing::info!(product_id = product.id, actor = %principal.id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_product(state: &AppState, id: i64) -> Result<Product, ApiError> {
    state
        .store
        .get_product(id)
        .await
        .map_err(|err| api_from_lookup("product not found", "failed to load product", err))
}

fn validate_product(body: ProductRequest) -> Result<(String, String), ApiError> {
    let name = validate_name("name", &body.name)?;
    let description = body.description.trim().to_string();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(api_validation_error(&format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok((name, description))
}
