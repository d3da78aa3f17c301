use crate::{Principal, UserId};
use serde::{Deserialize, Serialize};

/// The closed permission vocabulary. Each variant names one flag of a
/// [`crate::PermissionRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    ReadAll,
    Create,
    Update,
    UpdateAll,
    Delete,
    DeleteAll,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Read,
        Action::ReadAll,
        Action::Create,
        Action::Update,
        Action::UpdateAll,
        Action::Delete,
        Action::DeleteAll,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::ReadAll => "read_all",
            Action::Create => "create",
            Action::Update => "update",
            Action::UpdateAll => "update_all",
            Action::Delete => "delete",
            Action::DeleteAll => "delete_all",
        }
    }

    /// Pick the self or any variant of a scoped verb.
    ///
    /// Handlers compute the ownership fact for the target record and call this;
    /// the decision engine itself never looks at ownership.
    pub fn scoped(verb: ScopedVerb, ownership: Ownership) -> Action {
        match (verb, ownership) {
            (ScopedVerb::Read, Ownership::Owned) => Action::Read,
            (ScopedVerb::Read, Ownership::NotOwned) => Action::ReadAll,
            (ScopedVerb::Update, Ownership::Owned) => Action::Update,
            (ScopedVerb::Update, Ownership::NotOwned) => Action::UpdateAll,
            (ScopedVerb::Delete, Ownership::Owned) => Action::Delete,
            (ScopedVerb::Delete, Ownership::NotOwned) => Action::DeleteAll,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "read" => Ok(Action::Read),
            "read_all" => Ok(Action::ReadAll),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "update_all" => Ok(Action::UpdateAll),
            "delete" => Ok(Action::Delete),
            "delete_all" => Ok(Action::DeleteAll),
            _ => Err(()),
        }
    }
}

/// Verbs that come in a self/any pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopedVerb {
    Read,
    Update,
    Delete,
}

/// Whether the target record belongs to the requesting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NotOwned,
}

impl Ownership {
    /// Compare a record's owner against the caller.
    pub fn of(owner_id: UserId, principal: &Principal) -> Self {
        if owner_id == principal.id {
            Ownership::Owned
        } else {
            Ownership::NotOwned
        }
    }
}
