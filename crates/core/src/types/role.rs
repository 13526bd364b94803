//! Session roles.

use serde::{Deserialize, Serialize};

/// Role carried in a session token's claims.
///
/// Unknown role strings are preserved in [`Role::Other`] so newer backends can
/// introduce roles without breaking older terminals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Full access, including back-office screens.
    Admin,
    /// Store manager.
    Manager,
    /// Till operator.
    Cashier,
    /// Unattended price-check device.
    Device,
    /// A role this build does not know about.
    Other(String),
}

impl Role {
    /// Role assumed when a token decodes but carries no role claim.
    pub const DEFAULT: Self = Self::Admin;

    /// Whether the role grants access to back-office screens.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Manager => write!(f, "manager"),
            Self::Cashier => write!(f, "cashier"),
            Self::Device => write!(f, "device"),
            Self::Other(other) => write!(f, "{other}"),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "admin" => Self::Admin,
            "manager" => Self::Manager,
            "cashier" => Self::Cashier,
            "device" => Self::Device,
            _ => Self::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}
