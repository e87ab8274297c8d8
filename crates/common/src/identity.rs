use serde::{Deserialize, Serialize};

use crate::UserId;

/// Role of an already-authenticated requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Merchant,
    Customer,
}

impl Role {
    /// Returns true if the role may read and cancel orders it does not own.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Returns true if the role may advance fulfillment status on order lines.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Merchant)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Merchant => "merchant",
            Role::Customer => "customer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a role string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError(pub String);

impl std::fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for ParseRoleError {}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "merchant" => Ok(Role::Merchant),
            "customer" => Ok(Role::Customer),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// The resolved identity every core operation receives.
///
/// Authentication happens upstream; the core only trusts what it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    /// Returns true if this requester may act on a resource owned by `owner`.
    pub fn can_access(&self, owner: UserId) -> bool {
        self.role.is_privileged() || self.user_id == owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_is_privileged() {
        assert!(Role::Admin.is_privileged());
        assert!(!Role::Merchant.is_privileged());
        assert!(!Role::Customer.is_privileged());
    }

    #[test]
    fn staff_roles() {
        assert!(Role::Admin.is_staff());
        assert!(Role::Merchant.is_staff());
        assert!(!Role::Customer.is_staff());
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" customer ".parse::<Role>().unwrap(), Role::Customer);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn owners_and_admins_can_access() {
        let owner = UserId::new();
        let stranger = UserId::new();

        assert!(Requester::customer(owner).can_access(owner));
        assert!(!Requester::customer(stranger).can_access(owner));
        assert!(!Requester::new(stranger, Role::Merchant).can_access(owner));
        assert!(Requester::admin(stranger).can_access(owner));
    }
}
