//! Service-level error taxonomy.
//!
//! Every failure surfaced above the repository layer maps onto one
//! [`ErrorKind`]; callers branch on the kind, not on storage details.

use crate::model::{CompanyId, ContactId, EntityRef};
use crate::repo::{ConflictReason, RepoError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Caller-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required identifier is missing or malformed.
    Validation,
    /// A referenced row does not exist.
    NotFound,
    /// The write would violate a relationship rule or a version guard.
    Conflict,
    /// A later saga step failed after an earlier one committed.
    PartialSagaFailure,
    /// Transport or storage failure.
    Fatal,
}

impl ErrorKind {
    /// Stable code used in logs and request envelopes.
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PartialSagaFailure => "partial_saga_failure",
            Self::Fatal => "fatal_error",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug)]
pub enum ServiceError {
    Validation(String),
    NotFound(EntityRef),
    /// The contact has no area at the company.
    NoAreaAtCompany {
        contact_id: ContactId,
        company_id: CompanyId,
    },
    Conflict(ConflictReason),
    Fatal(RepoError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) | Self::NoAreaAtCompany { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::NoAreaAtCompany {
                contact_id,
                company_id,
            } => write!(
                f,
                "contact {contact_id} has no area of activity at company {company_id}"
            ),
            Self::Conflict(reason) => write!(f, "conflict: {reason}"),
            Self::Fatal(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fatal(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err.to_string()),
            RepoError::NotFound(entity) => Self::NotFound(entity),
            RepoError::Conflict(reason) => Self::Conflict(reason),
            other => Self::Fatal(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ServiceError};
    use crate::model::{EntityRef, ValidationError};
    use crate::repo::RepoError;

    #[test]
    fn repo_errors_map_to_most_specific_kind() {
        let not_found: ServiceError = RepoError::NotFound(EntityRef::Deal(4)).into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let validation: ServiceError =
            RepoError::Validation(ValidationError::UnknownContact(8)).into();
        assert_eq!(validation.kind(), ErrorKind::Validation);

        let fatal: ServiceError = RepoError::InvalidData("bad row".to_string()).into();
        assert_eq!(fatal.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(ErrorKind::PartialSagaFailure.code(), "partial_saga_failure");
        assert_eq!(ErrorKind::Fatal.to_string(), "fatal_error");
    }
}
