//! In-memory implementation of the Gatehouse store.
//!
//! # Purpose
//! Implements [`GatehouseStore`] with `HashMap`s guarded by `tokio::sync::RwLock`.
//! It exists for local development and tests, and as the default backend when
//! no durable store is configured.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Operations are consistent within one process. Each method holds at most one
//!   lock at a time, so cross-table checks (role exists, owner exists) are
//!   best-effort rather than transactional.
//! - Ids are assigned from per-table counters starting at 1 and never reused.
use super::{GatehouseStore, StoreError, StoreResult};
use crate::model::{NewProduct, NewUser, Product, ProductUpdate, User, UserPatch};
use async_trait::async_trait;
use gatehouse_authz::{PermissionRule, Principal, Role, RoleId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct IdSequence(AtomicI64);

impl IdSequence {
    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    roles: Arc<RwLock<HashMap<RoleId, Role>>>,
    rules: Arc<RwLock<HashMap<(RoleId, String), PermissionRule>>>,
    users: Arc<RwLock<HashMap<UserId, User>>>,
    products: Arc<RwLock<HashMap<i64, Product>>>,
    role_ids: Arc<IdSequence>,
    user_ids: Arc<IdSequence>,
    product_ids: Arc<IdSequence>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn role_exists(&self, id: RoleId) -> bool {
        self.roles.read().await.contains_key(&id)
    }
}

fn sorted_by_key<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

#[async_trait]
impl GatehouseStore for InMemoryStore {
    async fn create_role(&self, name: &str, description: Option<&str>) -> StoreResult<Role> {
        let mut roles = self.roles.write().await;
        if roles.values().any(|role| role.name == name) {
            return Err(StoreError::Conflict("role exists".into()));
        }
        let mut role = Role::new(RoleId::new(self.role_ids.next()), name);
        role.description = description.map(str::to_string);
        roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Role> {
        self.roles
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("role".into()))
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|role| role.name == name)
            .cloned())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let roles = self.roles.read().await.values().cloned().collect();
        Ok(sorted_by_key(roles, |role: &Role| role.id))
    }

    async fn insert_rule(&self, rule: PermissionRule) -> StoreResult<PermissionRule> {
        if !self.role_exists(rule.role_id).await {
            return Err(StoreError::NotFound("role".into()));
        }
        let mut rules = self.rules.write().await;
        let key = (rule.role_id, rule.element.clone());
        if rules.contains_key(&key) {
            return Err(StoreError::Conflict("rule exists".into()));
        }
        rules.insert(key, rule.clone());
        Ok(rule)
    }

    async fn list_rules(&self) -> StoreResult<Vec<PermissionRule>> {
        let rules = self.rules.read().await.values().cloned().collect();
        Ok(sorted_by_key(rules, |rule: &PermissionRule| {
            (rule.role_id, rule.element.clone())
        }))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        if !self.role_exists(user.role_id).await {
            return Err(StoreError::NotFound("role".into()));
        }
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::Conflict("email exists".into()));
        }
        let created = User {
            id: UserId::new(self.user_ids.next()),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            role_id: user.role_id,
            is_active: true,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("user".into()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn list_users(&self, only: Option<UserId>) -> StoreResult<Vec<User>> {
        let users = self
            .users
            .read()
            .await
            .values()
            .filter(|user| only.is_none_or(|id| user.id == id))
            .cloned()
            .collect();
        Ok(sorted_by_key(users, |user: &User| user.id))
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if let Some(email) = patch.email.as_deref()
            && users
                .values()
                .any(|other| other.id != id && other.email == email)
        {
            return Err(StoreError::Conflict("email exists".into()));
        }
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("user".into()))?;
        patch.apply(user);
        Ok(user.clone())
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("user".into()))?;
        user.is_active = active;
        Ok(user.clone())
    }

    async fn load_principal(&self, id: UserId) -> StoreResult<Option<Principal>> {
        let Some(user) = self.users.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let role = self.get_role(user.role_id).await.map_err(|_| {
            StoreError::Unexpected(anyhow::anyhow!(
                "user {} references missing role {}",
                user.id,
                user.role_id
            ))
        })?;
        Ok(Some(Principal::new(user.id, role, user.is_active)))
    }

    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        if !self.users.read().await.contains_key(&product.owner_id) {
            return Err(StoreError::NotFound("user".into()));
        }
        let created = Product {
            id: self.product_ids.next(),
            name: product.name,
            description: product.description,
            owner_id: product.owner_id,
        };
        self.products
            .write()
            .await
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_product(&self, id: i64) -> StoreResult<Product> {
        self.products
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("product".into()))
    }

    async fn list_products(&self, owner: Option<UserId>) -> StoreResult<Vec<Product>> {
        let products = self
            .products
            .read()
            .await
            .values()
            .filter(|product| owner.is_none_or(|owner| product.owner_id == owner))
            .cloned()
            .collect();
        Ok(sorted_by_key(products, |product: &Product| product.id))
    }

    async fn update_product(&self, id: i64, update: ProductUpdate) -> StoreResult<Product> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("product".into()))?;
        product.name = update.name;
        product.description = update.description;
        Ok(product.clone())
    }

    async fn delete_product(&self, id: i64) -> StoreResult<()> {
        if self.products.write().await.remove(&id).is_none() {
            return Err(StoreError::NotFound("product".into()));
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
