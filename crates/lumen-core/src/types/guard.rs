//! Authentication guards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The API surface a credential was issued for.
///
/// A credential is only ever accepted by routes protected with the same
/// guard it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Back-office administration.
    Admin,
    /// End-user web and mobile API.
    Api,
    /// Third-party open platform.
    Open,
}

impl Guard {
    /// All guards, in a stable order.
    pub const ALL: [Guard; 3] = [Guard::Admin, Guard::Api, Guard::Open];

    /// Returns the wire label of this guard.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Api => "api",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Guard {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "api" => Ok(Self::Api),
            "open" => Ok(Self::Open),
            other => Err(AppError::validation(format!("Unknown guard: '{other}'"))),
        }
    }
}
