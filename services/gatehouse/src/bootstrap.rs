//! Startup provisioning of roles, rule rows, and the bootstrap admin account.
//!
//! # Purpose
//! Brings an empty store to a usable state and builds the immutable rule table
//! the access policy evaluates against.
//!
//! # Key invariants
//! - Seeding is idempotent: rows that already exist are left as they are, so
//!   operator edits to rules survive restarts.
//! - The admin role also gets all-flags rows, although the policy bypasses the
//!   table for it.
use crate::config::GatehouseConfig;
use crate::model::NewUser;
use crate::store::{GatehouseStore, StoreError};
use anyhow::{Context, Result};
use gatehouse_authz::password::hash_password;
use gatehouse_authz::{ADMIN_ROLE, Action, PermissionRule, Role, RuleSet};
use std::collections::HashSet;

pub const USER_ROLE: &str = "user";

const SEEDED_ELEMENTS: [&str; 2] = ["users", "products"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub roles_created: usize,
    pub rules_created: usize,
    pub admin_created: bool,
}

/// Create the `admin` and `user` roles with their rule rows, the configured
/// default role (without rules), and the bootstrap admin account when set.
///
/// Rows that already exist are left untouched; running it twice is a no-op.
///
/// # Errors
/// Fails on any store error or if the admin password cannot be hashed.
pub async fn seed_defaults(
    store: &(dyn GatehouseStore + Send + Sync),
    config: &GatehouseConfig,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let admin = ensure_role(store, ADMIN_ROLE, Some("Administrator"), &mut report).await?;
    let user = ensure_role(store, USER_ROLE, Some("Regular User"), &mut report).await?;
    if config.default_role != USER_ROLE && config.default_role != ADMIN_ROLE {
        ensure_role(store, &config.default_role, None, &mut report).await?;
    }
    if config.default_role == ADMIN_ROLE {
        tracing::warn!("self-registration grants the admin role");
    }

    let mut rules = vec![];
    for element in SEEDED_ELEMENTS {
        rules.push(PermissionRule::full(admin.id, element));
    }
    rules.push(
        PermissionRule::new(user.id, "users")
            .with(Action::Read)
            .with(Action::Update)
            .with(Action::Delete),
    );
    rules.push(
        PermissionRule::new(user.id, "products")
            .with(Action::Read)
            .with(Action::Create)
            .with(Action::Update)
            .with(Action::Delete),
    );
    ensure_rules(store, rules, &mut report).await?;

    if let Some(account) = &config.admin {
        let email = account.email.trim().to_ascii_lowercase();
        let existing = store
            .find_user_by_email(&email)
            .await
            .context("look up bootstrap admin")?;
        if existing.is_none() {
            let password_hash =
                hash_password(&account.password).context("hash bootstrap admin password")?;
            let created = store
                .create_user(NewUser {
                    first_name: "Admin".to_string(),
                    last_name: "Account".to_string(),
                    email,
                    password_hash,
                    role_id: admin.id,
                })
                .await;
            match created {
                Ok(user) => {
                    tracing::info!(user_id = %user.id, "bootstrap admin account created");
                    report.admin_created = true;
                }
                Err(StoreError::Conflict(_)) => {}
                Err(err) => return Err(err).context("create bootstrap admin"),
            }
        }
    }

    tracing::info!(
        roles_created = report.roles_created,
        rules_created = report.rules_created,
        admin_created = report.admin_created,
        backend = store.backend_name(),
        "store seeded"
    );
    Ok(report)
}

/// Read every rule row and build the table the policy evaluates.
pub async fn load_rule_set(store: &(dyn GatehouseStore + Send + Sync)) -> Result<RuleSet> {
    let rules = store.list_rules().await.context("load access rules")?;
    let rule_set = RuleSet::from_rules(rules).context("access rule table is corrupt")?;
    tracing::info!(rules = rule_set.len(), "access rules loaded");
    Ok(rule_set)
}

async fn ensure_role(
    store: &(dyn GatehouseStore + Send + Sync),
    name: &str,
    description: Option<&str>,
    report: &mut SeedReport,
) -> Result<Role> {
    if let Some(role) = store
        .find_role_by_name(name)
        .await
        .with_context(|| format!("look up role {name}"))?
    {
        return Ok(role);
    }
    match store.create_role(name, description).await {
        Ok(role) => {
            report.roles_created += 1;
            Ok(role)
        }
        // Another instance seeded concurrently.
        Err(StoreError::Conflict(_)) => store
            .find_role_by_name(name)
            .await
            .with_context(|| format!("look up role {name}"))?
            .with_context(|| format!("role {name} vanished during seeding")),
        Err(err) => Err(err).with_context(|| format!("create role {name}")),
    }
}

async fn ensure_rules(
    store: &(dyn GatehouseStore + Send + Sync),
    rules: Vec<PermissionRule>,
    report: &mut SeedReport,
) -> Result<()> {
    let existing: HashSet<_> = store
        .list_rules()
        .await
        .context("load access rules")?
        .into_iter()
        .map(|rule| (rule.role_id, rule.element))
        .collect();
    for rule in rules {
        if existing.contains(&(rule.role_id, rule.element.clone())) {
            continue;
        }
        let element = rule.element.clone();
        match store.insert_rule(rule).await {
            Ok(_) => report.rules_created += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(err) => return Err(err).with_context(|| format!("insert rule for {element}")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminAccount;
    use crate::store::memory::InMemoryStore;
    use gatehouse_authz::password::verify_password;
    use gatehouse_authz::{RuleTable, UserId};

    fn config_with_admin() -> GatehouseConfig {
        GatehouseConfig {
            admin: Some(AdminAccount {
                email: " Root@Example.com ".to_string(),
                password: "correct horse".to_string(),
            }),
            ..GatehouseConfig::default()
        }
    }

    #[tokio::test]
    async fn seeds_roles_rules_and_admin_once() {
        let store = InMemoryStore::new();
        let config = config_with_admin();

        let first = seed_defaults(&store, &config).await.expect("seed");
        assert_eq!(first.roles_created, 2);
        assert_eq!(first.rules_created, 4);
        assert!(first.admin_created);

        let second = seed_defaults(&store, &config).await.expect("reseed");
        assert_eq!(second, SeedReport::default());

        let admin = store
            .find_user_by_email("root@example.com")
            .await
            .expect("lookup")
            .expect("admin exists");
        assert!(verify_password("correct horse", &admin.password_hash));
        let role = store.get_role(admin.role_id).await.expect("role");
        assert!(role.is_admin());
        assert_eq!(role.description.as_deref(), Some("Administrator"));
    }

    #[tokio::test]
    async fn user_role_rules_match_defaults() {
        let store = InMemoryStore::new();
        seed_defaults(&store, &GatehouseConfig::default())
            .await
            .expect("seed");
        let rules = load_rule_set(&store).await.expect("rules");
        let user = store
            .find_role_by_name(USER_ROLE)
            .await
            .expect("lookup")
            .expect("user role");

        let users = rules.lookup(user.id, "users").expect("users rule");
        assert_eq!(users.granted(), vec![Action::Read, Action::Update, Action::Delete]);
        let products = rules.lookup(user.id, "products").expect("products rule");
        assert_eq!(
            products.granted(),
            vec![Action::Read, Action::Create, Action::Update, Action::Delete]
        );
    }

    #[tokio::test]
    async fn existing_rules_are_not_overwritten() {
        let store = InMemoryStore::new();
        let user = store
            .create_role(USER_ROLE, Some("Regular User"))
            .await
            .expect("role");
        store
            .insert_rule(PermissionRule::new(user.id, "products").with(Action::Read))
            .await
            .expect("rule");

        let report = seed_defaults(&store, &GatehouseConfig::default())
            .await
            .expect("seed");
        assert_eq!(report.roles_created, 1);
        assert_eq!(report.rules_created, 3);

        let rules = load_rule_set(&store).await.expect("rules");
        let products = rules.lookup(user.id, "products").expect("rule");
        assert_eq!(products.granted(), vec![Action::Read]);
    }

    #[tokio::test]
    async fn existing_admin_account_is_left_alone() {
        let store = InMemoryStore::new();
        let config = config_with_admin();
        seed_defaults(&store, &config).await.expect("seed");
        let admin = store
            .find_user_by_email("root@example.com")
            .await
            .expect("lookup")
            .expect("admin");

        let rotated = GatehouseConfig {
            admin: Some(AdminAccount {
                email: "root@example.com".to_string(),
                password: "another password".to_string(),
            }),
            ..GatehouseConfig::default()
        };
        let report = seed_defaults(&store, &rotated).await.expect("reseed");
        assert!(!report.admin_created);
        let unchanged = store.get_user(admin.id).await.expect("user");
        assert!(verify_password("correct horse", &unchanged.password_hash));
        assert_ne!(unchanged.id, UserId::default());
    }

    #[tokio::test]
    async fn custom_default_role_is_created_without_rules() {
        let store = InMemoryStore::new();
        let config = GatehouseConfig {
            default_role: "guest".to_string(),
            ..GatehouseConfig::default()
        };
        let report = seed_defaults(&store, &config).await.expect("seed");
        assert_eq!(report.roles_created, 3);
        let guest = store
            .find_role_by_name("guest")
            .await
            .expect("lookup")
            .expect("guest role");
        let rules = load_rule_set(&store).await.expect("rules");
        assert!(rules.lookup(guest.id, "products").is_none());
    }
}
