use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token persisted in `current_phase` once every phase has been completed.
pub const TERMINAL_TOKEN: &str = "complete";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} id must not be empty")]
    Empty { kind: &'static str },
    #[error("{kind} id `{value}` contains invalid characters")]
    InvalidChars { kind: &'static str, value: String },
    #[error("phase id `{TERMINAL_TOKEN}` is reserved")]
    Reserved,
}

/// Identifier of a phase: lowercase ascii, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhaseId(String);

impl PhaseId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(IdError::Empty { kind: "phase" });
        };
        let first_ok = first.is_ascii_lowercase() || first.is_ascii_digit();
        let rest_ok =
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !first_ok || !rest_ok {
            return Err(IdError::InvalidChars {
                kind: "phase",
                value,
            });
        }
        if value == TERMINAL_TOKEN {
            return Err(IdError::Reserved);
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhaseId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PhaseId {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PhaseId> for String {
    fn from(value: PhaseId) -> Self {
        value.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an open ticket. Doubles as the marker file name, so it is
/// restricted to characters that cannot form a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdError::Empty { kind: "ticket" });
        }
        let valid = !value.starts_with('.')
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(IdError::InvalidChars {
                kind: "ticket",
                value,
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TicketId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TicketId> for String {
    fn from(value: TicketId) -> Self {
        value.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{IdError, PhaseId, TicketId};

    #[test]
    fn phase_id_accepts_kebab_and_snake() {
        assert!(PhaseId::new("plan").is_ok());
        assert!(PhaseId::new("code-review").is_ok());
        assert!(PhaseId::new("phase_2").is_ok());
        assert!(PhaseId::new("2-build").is_ok());
    }

    #[test]
    fn phase_id_rejects_bad_input() {
        assert_eq!(PhaseId::new(""), Err(IdError::Empty { kind: "phase" }));
        assert!(PhaseId::new("Plan").is_err());
        assert!(PhaseId::new("-plan").is_err());
        assert!(PhaseId::new("plan/x").is_err());
        assert_eq!(PhaseId::new("complete"), Err(IdError::Reserved));
    }

    #[test]
    fn ticket_id_cannot_form_a_path() {
        assert!(TicketId::new("TCK-0042").is_ok());
        assert!(TicketId::new("a.b").is_ok());
        assert!(TicketId::new("..").is_err());
        assert!(TicketId::new("a/b").is_err());
        assert!(TicketId::new(".hidden").is_err());
        assert!(TicketId::new("").is_err());
    }
}
