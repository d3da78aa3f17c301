//! Permission rule rows and the rule table.
//!
//! # Purpose
//! A [`PermissionRule`] is the permission bitset for one `(role, element)` pair.
//! A [`RuleTable`] answers lookups for the decision engine.
//!
//! # Key invariants
//! - At most one rule per `(role_id, element)`; [`RuleSet::from_rules`] rejects
//!   duplicates instead of picking one.
//! - Unset flags are `false`; a missing row means deny-all for that element.
use crate::{Action, AuthzError, AuthzResult, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub role_id: RoleId,
    pub element: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub read_all: bool,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub update_all: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub delete_all: bool,
}

impl PermissionRule {
    /// A rule granting nothing.
    pub fn new(role_id: RoleId, element: impl Into<String>) -> Self {
        Self {
            role_id,
            element: element.into(),
            ..Self::default()
        }
    }

    /// A rule granting all seven actions.
    pub fn full(role_id: RoleId, element: impl Into<String>) -> Self {
        Action::ALL
            .into_iter()
            .fold(Self::new(role_id, element), PermissionRule::with)
    }

    pub fn with(mut self, action: Action) -> Self {
        *self.flag_mut(action) = true;
        self
    }

    pub fn grants(&self, action: Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::ReadAll => self.read_all,
            Action::Create => self.create,
            Action::Update => self.update,
            Action::UpdateAll => self.update_all,
            Action::Delete => self.delete,
            Action::DeleteAll => self.delete_all,
        }
    }

    /// Granted actions in vocabulary order.
    pub fn granted(&self) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| self.grants(*action))
            .collect()
    }

    fn flag_mut(&mut self, action: Action) -> &mut bool {
        match action {
            Action::Read => &mut self.read,
            Action::ReadAll => &mut self.read_all,
            Action::Create => &mut self.create,
            Action::Update => &mut self.update,
            Action::UpdateAll => &mut self.update_all,
            Action::Delete => &mut self.delete,
            Action::DeleteAll => &mut self.delete_all,
        }
    }
}

/// Read-only lookup of rule rows.
pub trait RuleTable: Send + Sync {
    fn lookup(&self, role_id: RoleId, element: &str) -> Option<&PermissionRule>;
}

/// Immutable in-memory rule table, built once after bootstrap.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<(RoleId, String), PermissionRule>,
}

impl RuleSet {
    /// Index rules by `(role, element)`.
    ///
    /// # Errors
    /// [`AuthzError::DuplicateRule`] when a pair appears twice and
    /// [`AuthzError::EmptyElement`] for a blank element name.
    pub fn from_rules(rules: impl IntoIterator<Item = PermissionRule>) -> AuthzResult<Self> {
        let mut map = HashMap::new();
        for rule in rules {
            if rule.element.trim().is_empty() {
                return Err(AuthzError::EmptyElement(rule.role_id));
            }
            let key = (rule.role_id, rule.element.clone());
            if map.contains_key(&key) {
                return Err(AuthzError::DuplicateRule {
                    role_id: rule.role_id,
                    element: rule.element,
                });
            }
            map.insert(key, rule);
        }
        Ok(Self { rules: map })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionRule> {
        self.rules.values()
    }
}

impl RuleTable for RuleSet {
    fn lookup(&self, role_id: RoleId, element: &str) -> Option<&PermissionRule> {
        self.rules.get(&(role_id, element.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rule_grants_nothing() {
        let rule = PermissionRule::new(RoleId::new(2), "products");
        for action in Action::ALL {
            assert!(!rule.grants(action), "{action} should be denied");
        }
        assert!(rule.granted().is_empty());
    }

    #[test]
    fn full_rule_grants_everything() {
        let rule = PermissionRule::full(RoleId::new(1), "users");
        assert_eq!(rule.granted(), Action::ALL.to_vec());
    }

    #[test]
    fn with_sets_only_the_named_flag() {
        let rule = PermissionRule::new(RoleId::new(2), "products").with(Action::UpdateAll);
        assert!(rule.update_all);
        assert!(!rule.update);
        assert_eq!(rule.granted(), vec![Action::UpdateAll]);
    }

    #[test]
    fn rule_set_looks_up_by_role_and_element() {
        let rules = RuleSet::from_rules(vec![
            PermissionRule::new(RoleId::new(2), "products").with(Action::Create),
            PermissionRule::new(RoleId::new(2), "users").with(Action::Read),
        ])
        .expect("rules");
        assert_eq!(rules.len(), 2);
        let found = rules.lookup(RoleId::new(2), "products").expect("rule");
        assert!(found.create);
        assert!(rules.lookup(RoleId::new(3), "products").is_none());
        assert!(rules.lookup(RoleId::new(2), "orders").is_none());
    }

    #[test]
    fn rule_set_rejects_duplicates() {
        let err = RuleSet::from_rules(vec![
            PermissionRule::new(RoleId::new(2), "products"),
            PermissionRule::full(RoleId::new(2), "products"),
        ])
        .expect_err("duplicate");
        assert!(matches!(
            err,
            AuthzError::DuplicateRule { role_id, ref element }
                if role_id == RoleId::new(2) && element == "products"
        ));
    }

    #[test]
    fn rule_set_rejects_empty_element() {
        let err = RuleSet::from_rules(vec![PermissionRule::new(RoleId::new(2), " ")])
            .expect_err("empty element");
        assert!(matches!(err, AuthzError::EmptyElement(_)));
    }

    #[test]
    fn missing_flags_deserialize_as_false() {
        let rule: PermissionRule =
            serde_json::from_str(r#"{"role_id":2,"element":"products","read":true}"#)
                .expect("deserialize");
        assert!(rule.read);
        assert!(!rule.read_all);
        assert!(!rule.delete_all);
    }
}
