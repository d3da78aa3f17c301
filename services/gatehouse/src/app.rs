//! Gatehouse HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and assembles the shared
//! application state injected into handlers.
//!
//! # Notes
//! The access policy and token keys are fixed once the state is built; rule
//! edits take effect on the next start.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth::IdentityResolver;
use crate::bootstrap::{load_rule_set, seed_defaults};
use crate::config::{GatehouseConfig, StorageBackend, TokenConfig};
use crate::store::GatehouseStore;
use crate::store::memory::InMemoryStore;
use crate::store::postgres::PostgresStore;
use anyhow::Context;
use axum::Router;
use gatehouse_authz::token::generate_token_keys;
use gatehouse_authz::{AccessPolicy, RuleSet, TokenIssuer, TokenKeys, TokenVerifier};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GatehouseStore + Send + Sync>,
    pub policy: Arc<AccessPolicy<RuleSet>>,
    pub issuer: Arc<TokenIssuer>,
    pub identity: IdentityResolver,
    pub token_ttl: Duration,
    pub default_role: String,
}

impl AppState {
    /// Assemble state from an already seeded store.
    pub fn new(
        store: Arc<dyn GatehouseStore + Send + Sync>,
        rules: RuleSet,
        keys: TokenKeys,
        token: &TokenConfig,
        default_role: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let verifier = TokenVerifier::new(&token.issuer, &token.audience, token.leeway_secs, &keys)
            .context("build token verifier")?;
        let issuer = TokenIssuer::new(token.issuer.clone(), token.audience.clone(), keys)
            .context("build token issuer")?;
        Ok(Self {
            identity: IdentityResolver::new(Arc::new(verifier), store.clone()),
            store,
            policy: Arc::new(AccessPolicy::new(rules)),
            issuer: Arc::new(issuer),
            token_ttl: token.ttl,
            default_role: default_role.into(),
        })
    }
}

/// Select the store, seed it, load the rule table, and set up token keys.
pub async fn build_state(config: GatehouseConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn GatehouseStore + Send + Sync> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await?)
        }
    };

    seed_defaults(store.as_ref(), &config).await?;
    let rules = load_rule_set(store.as_ref()).await?;
    let keys = signing_keys(&config.token)?;
    tracing::info!(
        backend = store.backend_name(),
        durable = store.is_durable(),
        kid = %keys.current.kid,
        "gatehouse state ready"
    );
    AppState::new(store, rules, keys, &config.token, config.default_role)
}

fn signing_keys(token: &TokenConfig) -> anyhow::Result<TokenKeys> {
    match &token.signing_key {
        Some(seed) => TokenKeys::from_seed_hex(seed, &token.previous_signing_keys)
            .context("parse GATEHOUSE_SIGNING_KEY"),
        None => {
            tracing::warn!("no signing key configured; tokens will not survive a restart");
            Ok(generate_token_keys())
        }
    }
}

/// Mount every route, the Swagger UI, and the request tracing layer.
pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    Router::new()
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route("/auth/register", axum::routing::post(api::auth::register))
        .route("/auth/login", axum::routing::post(api::auth::login))
        .route("/auth/logout", axum::routing::post(api::auth::logout))
        .route("/users", axum::routing::get(api::users::list_users))
        .route(
            "/users/me",
            axum::routing::get(api::users::get_me)
                .patch(api::users::update_me)
                .delete(api::users::delete_me),
        )
        .route(
            "/users/:id",
            axum::routing::get(api::users::get_user)
                .patch(api::users::patch_user)
                .delete(api::users::delete_user),
        )
        .route(
            "/resource/products",
            axum::routing::get(api::products::list_products)
                .post(api::products::create_product),
        )
        .route(
            "/resource/products/:id",
            axum::routing::get(api::products::get_product)
                .put(api::products::update_product)
                .delete(api::products::delete_product),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
