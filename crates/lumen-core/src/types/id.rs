//! Typed identifiers for subjects, client instances, and server processes.
//!
//! Using distinct types prevents accidentally passing a client instance id
//! where a process id is expected when building shared-store keys.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// The account a credential was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub i64);

impl SubjectId {
    /// Return the raw numeric id.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Macro to define a validated string identifier.
///
/// The separator characters used by shared-store keys and fields
/// (`/` and `:`) are rejected, as is the empty string.
macro_rules! define_label {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self, AppError> {
                let raw = raw.into();
                if raw.is_empty() || raw.len() > 128 {
                    return Err(AppError::validation(format!(
                        "{} must be 1..=128 characters",
                        stringify!($name)
                    )));
                }
                if raw.contains(['/', ':']) || raw.chars().any(char::is_whitespace) {
                    return Err(AppError::validation(format!(
                        "{} must not contain '/', ':' or whitespace",
                        stringify!($name)
                    )));
                }
                Ok(Self(raw))
            }

            /// Return the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = AppError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

define_label!(
    /// Identifies one device/tab of a subject. A subject may hold several
    /// live connections, one per client instance.
    ClientInstanceId
);

define_label!(
    /// Identifies one running server process in the cluster.
    ProcessId
);

impl ClientInstanceId {
    /// Generate a random client instance id for clients that do not
    /// provide their own.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl ProcessId {
    /// Generate the identity of the current process from host name,
    /// OS pid, boot time, and a random suffix.
    pub fn generate() -> Self {
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let host: String = host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
            .take(64)
            .collect();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{host}-{}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis(),
            &suffix[..8]
        ))
    }
}
