//! Relationship domain model.
//!
//! # Responsibility
//! - Define identity entities (contact, company, deal) and the two
//!   association records linking them (area of activity, synergy).
//! - Provide write-side validation shared by every repository.
//!
//! # Invariants
//! - Identifiers are positive SQLite row ids.
//! - A synergy always references a contact, a company and a deal.
//! - At most one area per contact carries the primary flag.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod area;
pub mod directory;
pub mod synergy;

pub type ContactId = i64;
pub type CompanyId = i64;
pub type DealId = i64;
pub type AreaId = i64;
pub type SynergyId = i64;

/// Typed pointer to one persisted row, used by not-found and conflict errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Contact(ContactId),
    Company(CompanyId),
    Deal(DealId),
    Area(AreaId),
    Synergy(SynergyId),
}

impl EntityRef {
    /// Returns the lowercase entity label used in logs and envelopes.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Contact(_) => "contact",
            Self::Company(_) => "company",
            Self::Deal(_) => "deal",
            Self::Area(_) => "area",
            Self::Synergy(_) => "synergy",
        }
    }

    pub fn id(&self) -> i64 {
        match *self {
            Self::Contact(id)
            | Self::Company(id)
            | Self::Deal(id)
            | Self::Area(id)
            | Self::Synergy(id) => id,
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.label(), self.id())
    }
}

/// Write-side validation failures for relationship records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty after trim.
    BlankField(&'static str),
    /// An identifier is zero or negative.
    InvalidId { field: &'static str, value: i64 },
    /// `end_date` is earlier than `start_date`.
    DateRangeReversed { start: i64, end: i64 },
    /// A referenced contact does not exist.
    UnknownContact(ContactId),
    /// The area is owned by another contact.
    AreaOwnerMismatch {
        area_id: AreaId,
        expected_contact_id: ContactId,
        actual_contact_id: ContactId,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "{field} must not be blank"),
            Self::InvalidId { field, value } => {
                write!(f, "{field} must be a positive id, got {value}")
            }
            Self::DateRangeReversed { start, end } => {
                write!(f, "end_date ({end}) must be >= start_date ({start})")
            }
            Self::UnknownContact(id) => write!(f, "unknown contact id: {id}"),
            Self::AreaOwnerMismatch {
                area_id,
                expected_contact_id,
                actual_contact_id,
            } => write!(
                f,
                "area {area_id} belongs to contact {actual_contact_id}, not {expected_contact_id}"
            ),
        }
    }
}

impl Error for ValidationError {}

/// Rejects zero and negative ids before they reach SQL.
pub fn ensure_valid_id(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::InvalidId { field, value });
    }
    Ok(())
}

pub(crate) fn ensure_date_range(
    start: Option<i64>,
    end: Option<i64>,
) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ValidationError::DateRangeReversed { start, end });
        }
    }
    Ok(())
}

pub(crate) fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{ensure_date_range, ensure_valid_id, normalize_optional_text, EntityRef};

    #[test]
    fn entity_ref_display_names_kind_and_id() {
        assert_eq!(EntityRef::Company(9).to_string(), "company 9");
        assert_eq!(EntityRef::Area(3).label(), "area");
    }

    #[test]
    fn non_positive_ids_are_rejected() {
        assert!(ensure_valid_id("contact_id", 0).is_err());
        assert!(ensure_valid_id("contact_id", -4).is_err());
        assert!(ensure_valid_id("contact_id", 1).is_ok());
    }

    #[test]
    fn date_range_allows_open_ends() {
        assert!(ensure_date_range(Some(10), None).is_ok());
        assert!(ensure_date_range(None, Some(10)).is_ok());
        assert!(ensure_date_range(Some(10), Some(5)).is_err());
    }

    #[test]
    fn blank_optional_text_collapses_to_none() {
        assert_eq!(normalize_optional_text(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional_text(Some(" CFO ".to_string())).as_deref(),
            Some("CFO")
        );
    }
}
