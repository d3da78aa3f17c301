//! Postgres-backed implementation of the Gatehouse store.
//!
//! # Key invariants
//! - The schema lives in `migrations/` and is applied at connect time, before
//!   the store serves any request.
//! - Unique violations (role name, user email, rule per role and element) map to
//!   [`StoreError::Conflict`]; foreign-key violations map to [`StoreError::NotFound`].
//! - User updates are read-modify-commit inside one transaction with the row
//!   locked, so concurrent writers are last-writer-wins per row.
//!
//! # Security model
//! - Database URLs may contain credentials; avoid logging them.
//! - All SQL is static text with bound parameters.
use super::{GatehouseStore, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::{NewProduct, NewUser, Product, ProductUpdate, User, UserPatch};
use async_trait::async_trait;
use gatehouse_authz::{PermissionRule, Principal, Role, RoleId, UserId};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

/// Durable store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use gatehouse::config::PostgresConfig;
/// use gatehouse::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbRole {
    id: i64,
    name: String,
    description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct DbRule {
    role_id: i64,
    element: String,
    read: bool,
    read_all: bool,
    create: bool,
    update: bool,
    update_all: bool,
    delete: bool,
    delete_all: bool,
}

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    role_id: i64,
    is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
struct DbPrincipal {
    id: i64,
    is_active: bool,
    role_id: i64,
    role_name: String,
    role_description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct DbProduct {
    id: i64,
    name: String,
    description: String,
    owner_id: i64,
}

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, role_id, is_active";
const RULE_COLUMNS: &str =
    r#"role_id, element, read, read_all, "create", update, update_all, delete, delete_all"#;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl PostgresStore {
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    /// Connect without applying migrations, for tests that manage the schema.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = tokio::time::timeout(
            Duration::from_millis(pg.connect_timeout_ms),
            PgPoolOptions::new()
                .max_connections(pg.max_connections)
                .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
                .connect_with(connect_options),
        )
        .await
        .map_err(|_| StoreError::Unexpected(anyhow::anyhow!("postgres connect timed out")))??;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|err| StoreError::Unexpected(err.into()))?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GatehouseStore for PostgresStore {
    async fn create_role(&self, name: &str, description: Option<&str>) -> StoreResult<Role> {
        let row = sqlx::query_as::<_, DbRole>(
            "INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_write_error(err, "role exists", "role"))?;
        Ok(role_from_db(row))
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Role> {
        sqlx::query_as::<_, DbRole>("SELECT id, name, description FROM roles WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(role_from_db)
            .ok_or_else(|| StoreError::NotFound("role".into()))
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let row =
            sqlx::query_as::<_, DbRole>("SELECT id, name, description FROM roles WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(role_from_db))
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let rows =
            sqlx::query_as::<_, DbRole>("SELECT id, name, description FROM roles ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(role_from_db).collect())
    }

    async fn insert_rule(&self, rule: PermissionRule) -> StoreResult<PermissionRule> {
        let row = sqlx::query_as::<_, DbRule>(&format!(
            r#"INSERT INTO access_rules ({RULE_COLUMNS})
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING {RULE_COLUMNS}"#
        ))
        .bind(rule.role_id.get())
        .bind(&rule.element)
        .bind(rule.read)
        .bind(rule.read_all)
        .bind(rule.create)
        .bind(rule.update)
        .bind(rule.update_all)
        .bind(rule.delete)
        .bind(rule.delete_all)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_write_error(err, "rule exists", "role"))?;
        Ok(rule_from_db(row))
    }

    async fn list_rules(&self) -> StoreResult<Vec<PermissionRule>> {
        let rows = sqlx::query_as::<_, DbRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM access_rules ORDER BY role_id, element"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(rule_from_db).collect())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            r#"INSERT INTO users (first_name, last_name, email, password_hash, role_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_write_error(err, "email exists", "role"))?;
        Ok(user_from_db(row))
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(user_from_db)
            .ok_or_else(|| StoreError::NotFound("user".into()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_db))
    }

    async fn list_users(&self, only: Option<UserId>) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE ($1::BIGINT IS NULL OR id = $1) ORDER BY id"
        ))
        .bind(only.map(UserId::get))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(user_from_db).collect())
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("user".into()))?;
        let mut user = user_from_db(row);
        patch.apply(&mut user);

        let row = sqlx::query_as::<_, DbUser>(&format!(
            r#"UPDATE users SET first_name = $2, last_name = $3, email = $4, password_hash = $5
               WHERE id = $1
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(id.get())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| map_write_error(err, "email exists", "user"))?;
        tx.commit().await?;
        Ok(user_from_db(row))
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<User> {
        sqlx::query_as::<_, DbUser>(&format!(
            "UPDATE users SET is_active = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.get())
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_db)
        .ok_or_else(|| StoreError::NotFound("user".into()))
    }

    async fn load_principal(&self, id: UserId) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, DbPrincipal>(
            r#"SELECT u.id, u.is_active, r.id AS role_id, r.name AS role_name,
                      r.description AS role_description
               FROM users u JOIN roles r ON r.id = u.role_id
               WHERE u.id = $1"#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| {
            let mut role = Role::new(RoleId::new(row.role_id), row.role_name);
            role.description = row.role_description;
            Principal::new(UserId::new(row.id), role, row.is_active)
        }))
    }

    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, DbProduct>(
            r#"INSERT INTO products (name, description, owner_id) VALUES ($1, $2, $3)
               RETURNING id, name, description, owner_id"#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.owner_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_write_error(err, "product exists", "user"))?;
        Ok(product_from_db(row))
    }

    async fn get_product(&self, id: i64) -> StoreResult<Product> {
        sqlx::query_as::<_, DbProduct>(
            "SELECT id, name, description, owner_id FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(product_from_db)
        .ok_or_else(|| StoreError::NotFound("product".into()))
    }

    async fn list_products(&self, owner: Option<UserId>) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, DbProduct>(
            r#"SELECT id, name, description, owner_id FROM products
               WHERE ($1::BIGINT IS NULL OR owner_id = $1)
               ORDER BY id"#,
        )
        .bind(owner.map(UserId::get))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(product_from_db).collect())
    }

    async fn update_product(&self, id: i64, update: ProductUpdate) -> StoreResult<Product> {
        sqlx::query_as::<_, DbProduct>(
            r#"UPDATE products SET name = $2, description = $3 WHERE id = $1
               RETURNING id, name, description, owner_id"#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await?
        .map(product_from_db)
        .ok_or_else(|| StoreError::NotFound("product".into()))
    }

    async fn delete_product(&self, id: i64) -> StoreResult<()> {
        let removed = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(StoreError::NotFound("product".into()));
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn map_write_error(err: sqlx::Error, conflict: &str, missing: &str) -> StoreError {
    if is_unique_violation(&err) {
        return StoreError::Conflict(conflict.into());
    }
    if is_foreign_key_violation(&err) {
        return StoreError::NotFound(missing.into());
    }
    StoreError::Unexpected(err.into())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    database_code(err).as_deref() == Some("23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    database_code(err).as_deref() == Some("23503")
}

fn database_code(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code.into_owned());
    }
    None
}

fn role_from_db(row: DbRole) -> Role {
    let mut role = Role::new(RoleId::new(row.id), row.name);
    role.description = row.description;
    role
}

fn rule_from_db(row: DbRule) -> PermissionRule {
    PermissionRule {
        role_id: RoleId::new(row.role_id),
        element: row.element,
        read: row.read,
        read_all: row.read_all,
        create: row.create,
        update: row.update,
        update_all: row.update_all,
        delete: row.delete,
        delete_all: row.delete_all,
    }
}

fn user_from_db(row: DbUser) -> User {
    User {
        id: UserId::new(row.id),
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        password_hash: row.password_hash,
        role_id: RoleId::new(row.role_id),
        is_active: row.is_active,
    }
}

fn product_from_db(row: DbProduct) -> Product {
    Product {
        id: row.id,
        name: row.name,
        description: row.description,
        owner_id: UserId::new(row.owner_id),
    }
}
