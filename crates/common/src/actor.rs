//! Caller identity as supplied by the upstream authenticator.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Seller,
    Admin,
}

impl Role {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "seller" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authenticated caller. Credentials have already been checked upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// A regular customer.
    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    /// An administrator.
    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True if the caller owns a resource belonging to `owner` or is an admin.
    pub fn can_access(&self, owner: UserId) -> bool {
        self.is_admin() || self.user_id == owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("customer".parse::<Role>().unwrap(), Role::Customer);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn owner_and_admin_can_access() {
        let owner = UserId::new();
        assert!(Actor::customer(owner).can_access(owner));
        assert!(!Actor::customer(UserId::new()).can_access(owner));
        assert!(Actor::admin(UserId::new()).can_access(owner));
    }
}
