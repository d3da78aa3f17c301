//! Persistence seam for roles, rules, users, and products.
//!
//! # Purpose
//! Handlers and bootstrap talk to storage only through [`GatehouseStore`], so
//! the in-memory and Postgres backends are interchangeable.
//!
//! # Key invariants
//! - Role names and user emails are unique; violations are [`StoreError::Conflict`].
//! - At most one rule per `(role_id, element)`; inserting a second is a conflict.
//! - Lookups by id return [`StoreError::NotFound`]; lookups by name or email
//!   return `Ok(None)`.
use crate::model::{NewProduct, NewUser, Product, ProductUpdate, User, UserPatch};
use async_trait::async_trait;
use gatehouse_authz::{PermissionRule, Principal, Role, RoleId, UserId};
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait GatehouseStore: Send + Sync {
    async fn create_role(&self, name: &str, description: Option<&str>) -> StoreResult<Role>;
    async fn get_role(&self, id: RoleId) -> StoreResult<Role>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;

    async fn insert_rule(&self, rule: PermissionRule) -> StoreResult<PermissionRule>;
    async fn list_rules(&self) -> StoreResult<Vec<PermissionRule>>;

    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: UserId) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// All users, or only `only` when the caller may list just itself.
    async fn list_users(&self, only: Option<UserId>) -> StoreResult<Vec<User>>;
    async fn update_user(&self, id: UserId, patch: UserPatch) -> StoreResult<User>;
    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<User>;
    /// The user joined with its role, or `None` for an unknown id.
    async fn load_principal(&self, id: UserId) -> StoreResult<Option<Principal>>;

    async fn create_product(&self, product: NewProduct) -> StoreResult<Product>;
    async fn get_product(&self, id: i64) -> StoreResult<Product>;
    async fn list_products(&self, owner: Option<UserId>) -> StoreResult<Vec<Product>>;
    async fn update_product(&self, id: i64, update: ProductUpdate) -> StoreResult<Product>;
    async fn delete_product(&self, id: i64) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
