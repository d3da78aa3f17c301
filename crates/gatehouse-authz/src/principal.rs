//! Principal and role models.
//!
//! # Purpose
//! A principal is the authenticated caller as the decision engine sees it: a
//! user id, the role record loaded alongside it, and the active flag.
use crate::{RoleId, UserId};
use serde::{Deserialize, Serialize};

/// Role name that bypasses the rule table entirely.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_ROLE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    pub active: bool,
}

impl Principal {
    pub fn new(id: UserId, role: Role, active: bool) -> Self {
        Self { id, role, active }
    }

    pub fn role_id(&self) -> RoleId {
        self.role.id
    }
}
