//! OpenAPI schema aggregation for the Gatehouse API.
//!
//! # Purpose
//! Collects all routes and schema types into a single OpenAPI document served
//! at `/v1/openapi.json`, with a `bearer_auth` scheme for protected routes.
use crate::api::{
    auth, products, system,
    types::{
        ErrorResponse, HealthStatus, LoginRequest, MessageResponse, ProductListResponse,
        ProductRequest, RegisterRequest, TokenResponse, UserListResponse, UserResponse,
        UserUpdateRequest,
    },
    users,
};
use crate::model::Product;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gatehouse",
        version = "v1",
        description = "Role-based access control over users and products"
    ),
    paths(
        system::system_health,
        auth::register,
        auth::login,
        auth::logout,
        users::get_me,
        users::update_me,
        users::delete_me,
        users::list_users,
        users::get_user,
        users::patch_user,
        users::delete_user,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product
    ),
    components(schemas(
        HealthStatus,
        ErrorResponse,
        MessageResponse,
        RegisterRequest,
        LoginRequest,
        TokenResponse,
        UserResponse,
        UserListResponse,
        UserUpdateRequest,
        Product,
        ProductRequest,
        ProductListResponse
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "system", description = "Health checks"),
        (name = "auth", description = "Registration and login"),
        (name = "users", description = "User accounts"),
        (name = "products", description = "Products owned by users")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_protected_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).expect("serialize");
        let paths = json["paths"].as_object().expect("paths");
        for path in [
            "/auth/login",
            "/users/me",
            "/users/{id}",
            "/resource/products",
            "/resource/products/{id}",
            "/v1/system/health",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert_eq!(
            json["components"]["securitySchemes"]["bearer_auth"]["scheme"],
            "bearer"
        );
    }
}
