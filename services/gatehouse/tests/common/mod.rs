#![allow(dead_code)]

use crate::http_helpers::json_request;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use gatehouse::app::{AppState, build_router, build_state};
use gatehouse::config::{AdminAccount, GatehouseConfig};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const PASSWORD: &str = "s3cret-password";

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

/// Seeded in-memory service with a bootstrap admin account.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = GatehouseConfig {
            admin: Some(AdminAccount {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            }),
            ..GatehouseConfig::default()
        };
        let state = build_state(config).await.expect("state");
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Register a user and return its id.
    pub async fn register(&self, email: &str) -> i64 {
        let response = self
            .send(json_request(
                "POST",
                "/auth/register",
                serde_json::json!({
                    "first_name": "Test",
                    "last_name": "User",
                    "email": email,
                    "password": PASSWORD,
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await["id"].as_i64().expect("id")
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.send(json_request(
            "POST",
            "/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
    }

    pub async fn token(&self, email: &str, password: &str) -> String {
        let response = self.login(email, password).await;
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await["access_token"]
            .as_str()
            .expect("token")
            .to_string()
    }

    pub async fn register_and_login(&self, email: &str) -> (i64, String) {
        let id = self.register(email).await;
        (id, self.token(email, PASSWORD).await)
    }

    pub async fn admin_token(&self) -> String {
        self.token(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }
}
