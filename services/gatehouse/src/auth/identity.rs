//! Identity resolution: bearer token to principal.
//!
//! # Purpose
//! Every request either carries a usable bearer token for an active user, or is
//! anonymous. Handlers that need a caller take the [`Authenticated`] extractor.
//!
//! # Key invariants
//! - Missing, malformed, expired, or foreign tokens resolve to anonymous; the
//!   reason never reaches the client.
//! - Unknown and deactivated users resolve to anonymous, so deactivation takes
//!   effect on the next request even while old tokens are unexpired.
//! - Store faults are errors, not anonymous.
use crate::api::error::{ApiError, api_internal, api_unauthorized};
use crate::app::AppState;
use crate::store::{GatehouseStore, StoreResult};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use gatehouse_authz::{Principal, TokenVerifier};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Principal(Principal),
    Anonymous,
}

#[derive(Clone)]
pub struct IdentityResolver {
    verifier: Arc<TokenVerifier>,
    store: Arc<dyn GatehouseStore + Send + Sync>,
}

impl IdentityResolver {
    /// Resolve tokens with `verifier` and look principals up in `store`.
    pub fn new(verifier: Arc<TokenVerifier>, store: Arc<dyn GatehouseStore + Send + Sync>) -> Self {
        Self { verifier, store }
    }

    /// Resolve the raw `Authorization` header value.
    ///
    /// # Errors
    /// Only store failures are errors; every token problem is anonymous.
    pub async fn resolve(&self, authorization: Option<&str>) -> StoreResult<Identity> {
        let Some(token) = authorization.and_then(extract_bearer) else {
            return Ok(Identity::Anonymous);
        };
        let Ok(claims) = self.verifier.verify(token) else {
            return Ok(Identity::Anonymous);
        };
        match self.store.load_principal(claims.user_id()).await? {
            Some(principal) if principal.active => Ok(Identity::Principal(principal)),
            Some(principal) => {
                tracing::debug!(user_id = %principal.id, "token presented for inactive user");
                Ok(Identity::Anonymous)
            }
            None => {
                tracing::debug!(user_id = claims.user_id, "token presented for unknown user");
                Ok(Identity::Anonymous)
            }
        }
    }
}

fn extract_bearer(value: &str) -> Option<&str> {
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for handlers that require a caller; anonymous requests get 401.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        match state.identity.resolve(header).await {
            Ok(Identity::Principal(principal)) => Ok(Authenticated(principal)),
            Ok(Identity::Anonymous) => Err(api_unauthorized("authentication required")),
            Err(err) => Err(api_internal("failed to resolve identity", &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewUser;
    use crate::store::memory::InMemoryStore;
    use gatehouse_authz::token::generate_token_keys;
    use gatehouse_authz::{AccessClaims, TokenIssuer, UserId};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        issuer: TokenIssuer,
        resolver: IdentityResolver,
        user_id: UserId,
    }

    async fn fixture() -> Fixture {
        let keys = generate_token_keys();
        let issuer = TokenIssuer::new("gatehouse", "gatehouse-api", keys.clone()).expect("issuer");
        let verifier =
            TokenVerifier::new("gatehouse", "gatehouse-api", 0, &keys).expect("verifier");
        let store = Arc::new(InMemoryStore::new());
        let role = store.create_role("user", None).await.expect("role");
        let user = store
            .create_user(NewUser {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "hash".to_string(),
                role_id: role.id,
            })
            .await
            .expect("user");
        let resolver = IdentityResolver::new(Arc::new(verifier), store.clone());
        Fixture {
            store,
            issuer,
            resolver,
            user_id: user.id,
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn valid_token_resolves_to_principal() {
        let fx = fixture().await;
        let token = fx
            .issuer
            .issue(fx.user_id, Duration::from_secs(60))
            .expect("token");
        let identity = fx
            .resolver
            .resolve(Some(&bearer(&token)))
            .await
            .expect("resolve");
        let Identity::Principal(principal) = identity else {
            panic!("expected principal, got {identity:?}");
        };
        assert_eq!(principal.id, fx.user_id);
        assert_eq!(principal.role.name, "user");
    }

    #[tokio::test]
    async fn missing_or_malformed_headers_are_anonymous() {
        let fx = fixture().await;
        let token = fx
            .issuer
            .issue(fx.user_id, Duration::from_secs(60))
            .expect("token");
        for header in [
            None,
            Some(String::new()),
            Some("Bearer ".to_string()),
            Some(format!("Basic {token}")),
            Some(token.clone()),
            Some("Bearer not-a-token".to_string()),
        ] {
            let identity = fx.resolver.resolve(header.as_deref()).await.expect("resolve");
            assert_eq!(identity, Identity::Anonymous, "header {header:?}");
        }
    }

    #[tokio::test]
    async fn expired_token_is_anonymous() {
        let fx = fixture().await;
        let token = fx
            .issuer
            .sign(&AccessClaims {
                iss: "gatehouse".to_string(),
                aud: "gatehouse-api".to_string(),
                user_id: fx.user_id.get(),
                iat: 1_000,
                exp: 2_000,
            })
            .expect("token");
        let identity = fx
            .resolver
            .resolve(Some(&bearer(&token)))
            .await
            .expect("resolve");
        assert_eq!(identity, Identity::Anonymous);
    }

    #[tokio::test]
    async fn deactivated_or_unknown_users_are_anonymous() {
        let fx = fixture().await;
        let token = fx
            .issuer
            .issue(fx.user_id, Duration::from_secs(60))
            .expect("token");
        fx.store
            .set_user_active(fx.user_id, false)
            .await
            .expect("deactivate");
        let identity = fx
            .resolver
            .resolve(Some(&bearer(&token)))
            .await
            .expect("resolve");
        assert_eq!(identity, Identity::Anonymous);

        let ghost = fx
            .issuer
            .issue(UserId::new(404), Duration::from_secs(60))
            .expect("token");
        let identity = fx
            .resolver
            .resolve(Some(&bearer(&ghost)))
            .await
            .expect("resolve");
        assert_eq!(identity, Identity::Anonymous);
    }
}
