use crate::RoleId;
use thiserror::Error;

/// Faults raised while building or querying the rule model.
///
/// Denials are never reported through this type; see [`crate::Decision`].
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("duplicate rule for role {role_id} on element {element}")]
    DuplicateRule { role_id: RoleId, element: String },
    #[error("empty element key for role {0}")]
    EmptyElement(RoleId),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
