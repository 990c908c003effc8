use super::ids::ShopperId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Shopper,
    Admin,
}

/// Who is behind a credential, as vouched for by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: ShopperId,
    pub role: Role,
}

impl Identity {
    pub fn shopper(id: impl Into<ShopperId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Shopper,
        }
    }

    pub fn admin(id: impl Into<ShopperId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }
}
