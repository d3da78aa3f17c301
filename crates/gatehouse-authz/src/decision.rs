//! Access decision engine.
//!
//! # Purpose
//! Evaluate whether a principal may perform an action on an element, given the
//! rule table loaded at bootstrap.
//!
//! # Key invariants
//! - Evaluation order: admin bypass, inactive principal, rule lookup, flag.
//!   The admin bypass is absolute; identity resolution already turns
//!   deactivated users into anonymous callers before they get here.
//! - The engine is scope-blind. Handlers pick `update` vs `update_all` (and the
//!   other pairs) from the ownership fact before calling in.
//! - Denials are [`Decision`] values; nothing here returns an error.
//!
//! # Concurrency model
//! [`AccessPolicy`] is immutable after construction and is shared behind an
//! `Arc` without locking.
use crate::{Action, Ownership, Principal, PermissionRule, RuleTable, ScopedVerb};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Inactive,
    NoRule,
    NotGranted(Action),
    UnknownAction(String),
}

impl DenyReason {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Inactive => "inactive",
            DenyReason::NoRule => "no_rule",
            DenyReason::NotGranted(_) => "not_granted",
            DenyReason::UnknownAction(_) => "unknown_action",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::Inactive => f.write_str("principal is inactive"),
            DenyReason::NoRule => f.write_str("no rule for role and element"),
            DenyReason::NotGranted(action) => write!(f, "action {action} not granted"),
            DenyReason::UnknownAction(name) => write!(f, "unknown action {name}"),
        }
    }
}

/// How much of a collection a principal may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    All,
    Owned,
}

#[derive(Debug, Clone)]
pub struct AccessPolicy<R> {
    rules: R,
}

impl<R: RuleTable> AccessPolicy<R> {
    /// Wrap a rule table. The table is never mutated afterwards.
    pub fn new(rules: R) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Decide whether `principal` may perform `action` on `element`.
    ///
    /// Admins are allowed unconditionally. Everyone else needs an active
    /// account and a rule for their role on `element` with `action` set.
    ///
    /// ```rust
    /// use gatehouse_authz::{
    ///     AccessPolicy, Action, Decision, DenyReason, PermissionRule, Principal, Role, RoleId,
    ///     RuleSet, UserId,
    /// };
    ///
    /// let user_role = RoleId::new(2);
    /// let rules = RuleSet::from_rules(vec![
    ///     PermissionRule::new(user_role, "products").with(Action::Read),
    /// ])
    /// .expect("rules");
    /// let policy = AccessPolicy::new(rules);
    /// let user = Principal::new(UserId::new(5), Role::new(user_role, "user"), true);
    /// assert_eq!(policy.authorize(&user, "products", Action::Read), Decision::Allow);
    /// assert_eq!(
    ///     policy.authorize(&user, "products", Action::Delete),
    ///     Decision::Deny(DenyReason::NotGranted(Action::Delete))
    /// );
    /// ```
    pub fn authorize(&self, principal: &Principal, element: &str, action: Action) -> Decision {
        match self.rule_for(principal, element) {
            Ok(None) => Decision::Allow,
            Ok(Some(rule)) if rule.grants(action) => Decision::Allow,
            Ok(Some(_)) => Decision::Deny(DenyReason::NotGranted(action)),
            Err(denied) => denied,
        }
    }

    /// Like [`AccessPolicy::authorize`], for action names arriving as text.
    pub fn authorize_named(&self, principal: &Principal, element: &str, action: &str) -> Decision {
        match Action::from_str(action) {
            Ok(action) => self.authorize(principal, element, action),
            Err(()) => Decision::Deny(DenyReason::UnknownAction(action.to_string())),
        }
    }

    /// Authorize the plain or `_all` form of `verb`, picked by `ownership`.
    pub fn authorize_scoped(
        &self,
        principal: &Principal,
        element: &str,
        verb: ScopedVerb,
        ownership: Ownership,
    ) -> Decision {
        self.authorize(principal, element, Action::scoped(verb, ownership))
    }

    /// Resolve how much of `element` the principal may list.
    ///
    /// `read_all` lists everything; `read` alone narrows the listing to the
    /// principal's own records; neither is a denial.
    pub fn list_scope(&self, principal: &Principal, element: &str) -> Result<ListScope, Decision> {
        let rule = match self.rule_for(principal, element) {
            Ok(None) => return Ok(ListScope::All),
            Ok(Some(rule)) => rule,
            Err(denied) => return Err(denied),
        };
        if rule.grants(Action::ReadAll) {
            Ok(ListScope::All)
        } else if rule.grants(Action::Read) {
            Ok(ListScope::Owned)
        } else {
            Err(Decision::Deny(DenyReason::NotGranted(Action::ReadAll)))
        }
    }

    // Ok(None) is the admin bypass.
    fn rule_for(
        &self,
        principal: &Principal,
        element: &str,
    ) -> Result<Option<&PermissionRule>, Decision> {
        if principal.role.is_admin() {
            return Ok(None);
        }
        if !principal.active {
            return Err(Decision::Deny(DenyReason::Inactive));
        }
        self.rules
            .lookup(principal.role_id(), element)
            .map(Some)
            .ok_or(Decision::Deny(DenyReason::NoRule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, RoleId, RuleSet, UserId};

    const ADMIN: RoleId = RoleId::new(1);
    const USER: RoleId = RoleId::new(2);

    fn principal(role: RoleId, name: &str) -> Principal {
        Principal::new(UserId::new(10), Role::new(role, name), true)
    }

    fn policy(rules: Vec<PermissionRule>) -> AccessPolicy<RuleSet> {
        AccessPolicy::new(RuleSet::from_rules(rules).expect("rules"))
    }

    #[test]
    fn admin_is_allowed_everything_without_rules() {
        let policy = policy(vec![]);
        let admin = principal(ADMIN, "admin");
        for element in ["users", "products", "never-seeded"] {
            for action in Action::ALL {
                assert_eq!(policy.authorize(&admin, element, action), Decision::Allow);
            }
        }
        assert_eq!(policy.list_scope(&admin, "products"), Ok(ListScope::All));
    }

    #[test]
    fn missing_rule_denies_every_action() {
        let policy = policy(vec![PermissionRule::full(USER, "users")]);
        let user = principal(USER, "user");
        for action in Action::ALL {
            assert_eq!(
                policy.authorize(&user, "products", action),
                Decision::Deny(DenyReason::NoRule)
            );
        }
    }

    #[test]
    fn create_only_rule_allows_create_alone() {
        let policy = policy(vec![
            PermissionRule::new(USER, "products").with(Action::Create),
        ]);
        let user = principal(USER, "user");
        for action in Action::ALL {
            let decision = policy.authorize(&user, "products", action);
            if action == Action::Create {
                assert!(decision.is_allowed());
            } else {
                assert_eq!(decision, Decision::Deny(DenyReason::NotGranted(action)));
            }
        }
    }

    #[test]
    fn update_only_role_may_update_own_records_only() {
        let policy = policy(vec![
            PermissionRule::new(USER, "products").with(Action::Update),
        ]);
        let user = principal(USER, "user");
        let owned = policy.authorize_scoped(&user, "products", ScopedVerb::Update, Ownership::Owned);
        let other =
            policy.authorize_scoped(&user, "products", ScopedVerb::Update, Ownership::NotOwned);
        assert!(owned.is_allowed());
        assert_eq!(
            other,
            Decision::Deny(DenyReason::NotGranted(Action::UpdateAll))
        );
    }

    #[test]
    fn update_all_only_role_may_update_others_but_not_own() {
        let policy = policy(vec![
            PermissionRule::new(USER, "products").with(Action::UpdateAll),
        ]);
        let user = principal(USER, "user");
        let owned = policy.authorize_scoped(&user, "products", ScopedVerb::Update, Ownership::Owned);
        let other =
            policy.authorize_scoped(&user, "products", ScopedVerb::Update, Ownership::NotOwned);
        assert_eq!(owned, Decision::Deny(DenyReason::NotGranted(Action::Update)));
        assert!(other.is_allowed());
    }

    #[test]
    fn admin_bypass_is_checked_before_activity() {
        let policy = policy(vec![]);
        let mut admin = principal(ADMIN, "admin");
        admin.active = false;
        for action in Action::ALL {
            assert_eq!(policy.authorize(&admin, "users", action), Decision::Allow);
        }
        assert_eq!(policy.list_scope(&admin, "users"), Ok(ListScope::All));
    }

    #[test]
    fn inactive_non_admin_is_denied_despite_full_rule() {
        let policy = policy(vec![PermissionRule::full(USER, "users")]);
        let mut user = principal(USER, "user");
        user.active = false;
        for action in Action::ALL {
            assert_eq!(
                policy.authorize(&user, "users", action),
                Decision::Deny(DenyReason::Inactive)
            );
        }
        assert_eq!(
            policy.list_scope(&user, "users"),
            Err(Decision::Deny(DenyReason::Inactive))
        );
    }

    #[test]
    fn unknown_action_name_is_denied() {
        let policy = policy(vec![PermissionRule::full(USER, "products")]);
        let user = principal(USER, "user");
        assert_eq!(
            policy.authorize_named(&user, "products", "publish"),
            Decision::Deny(DenyReason::UnknownAction("publish".to_string()))
        );
        assert!(
            policy
                .authorize_named(&user, "products", "delete_all")
                .is_allowed()
        );
    }

    #[test]
    fn list_scope_follows_read_flags() {
        let policy = policy(vec![
            PermissionRule::new(USER, "users").with(Action::Read),
            PermissionRule::new(USER, "products")
                .with(Action::Read)
                .with(Action::ReadAll),
            PermissionRule::new(USER, "orders").with(Action::Create),
        ]);
        let user = principal(USER, "user");
        assert_eq!(policy.list_scope(&user, "users"), Ok(ListScope::Owned));
        assert_eq!(policy.list_scope(&user, "products"), Ok(ListScope::All));
        assert_eq!(
            policy.list_scope(&user, "orders"),
            Err(Decision::Deny(DenyReason::NotGranted(Action::ReadAll)))
        );
        assert_eq!(
            policy.list_scope(&user, "invoices"),
            Err(Decision::Deny(DenyReason::NoRule))
        );
    }

    #[test]
    fn deny_reason_labels_are_stable() {
        assert_eq!(DenyReason::NoRule.as_str(), "no_rule");
        assert_eq!(
            DenyReason::NotGranted(Action::Delete).to_string(),
            "action delete not granted"
        );
    }
}
