//! User records.
//!
//! A user owns exactly one user record (its own) and is the principal for every
//! request authenticated with its token.
use gatehouse_authz::{RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: RoleId,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: RoleId,
}

/// Field-wise update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
    }

    pub fn apply(self, user: &mut User) {
        if let Some(value) = self.first_name {
            user.first_name = value;
        }
        if let Some(value) = self.last_name {
            user.last_name = value;
        }
        if let Some(value) = self.email {
            user.email = value;
        }
        if let Some(value) = self.password_hash {
            user.password_hash = value;
        }
    }
}
