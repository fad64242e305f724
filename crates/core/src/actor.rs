//! Who performed an operation.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::ActorId;

/// Role an actor held when performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorRole {
    Admin,
    Manager,
    Accountant,
    Driver,
    /// Automated callers (schedulers, triggers).
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Manager => "manager",
            ActorRole::Accountant => "accountant",
            ActorRole::Driver => "driver",
            ActorRole::System => "system",
        }
    }
}

impl core::str::FromStr for ActorRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(ActorRole::Admin),
            "manager" => Ok(ActorRole::Manager),
            "accountant" => Ok(ActorRole::Accountant),
            "driver" => Ok(ActorRole::Driver),
            "system" => Ok(ActorRole::System),
            other => Err(DomainError::validation(format!("unknown actor role '{other}'"))),
        }
    }
}

/// Actor identity + role, recorded on every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: ActorId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: ActorId, role: ActorRole) -> Self {
        Self { id, role }
    }

    /// Actor used for automated cascades.
    pub fn system() -> Self {
        Self {
            id: ActorId::from_uuid(uuid::Uuid::nil()),
            role: ActorRole::System,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Driver".parse::<ActorRole>().unwrap(), ActorRole::Driver);
        assert!("courier".parse::<ActorRole>().is_err());
    }
}
