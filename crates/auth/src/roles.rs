use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Dashboard role of an authenticated user.
///
/// Serialized in upper case (`"MERCHANT"`), matching the backend; parsing is
/// case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[serde(alias = "merchant")]
    Merchant,
    #[serde(alias = "admin")]
    Admin,
    #[serde(alias = "clerk")]
    Clerk,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Merchant => "MERCHANT",
            Role::Admin => "ADMIN",
            Role::Clerk => "CLERK",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MERCHANT" => Ok(Role::Merchant),
            "ADMIN" => Ok(Role::Admin),
            "CLERK" => Ok(Role::Clerk),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}
