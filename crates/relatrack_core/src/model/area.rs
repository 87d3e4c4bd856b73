//! Area of activity: the contact↔company association.
//!
//! # Responsibility
//! - Describe "this contact works at this company, in this role".
//! - Carry the per-contact primary flag.
//!
//! # Invariants
//! - `contact_id` and `company_id` are mandatory positive ids.
//! - New areas default to `is_primary = false`; promotion goes through
//!   primary designation so that a contact never holds two primaries.

use super::{
    ensure_valid_id, normalize_optional_text, AreaId, CompanyId, ContactId, ValidationError,
};
use serde::{Deserialize, Serialize};

/// Persisted area row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub role: Option<String>,
    pub job_description: Option<String>,
    pub is_primary: bool,
    pub version: i64,
}

/// Insert model for areas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArea {
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub role: Option<String>,
    pub job_description: Option<String>,
    pub is_primary: bool,
}

impl NewArea {
    pub fn new(contact_id: ContactId, company_id: CompanyId) -> Self {
        Self {
            contact_id,
            company_id,
            role: None,
            job_description: None,
            is_primary: false,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_valid_id("contact_id", self.contact_id)?;
        ensure_valid_id("company_id", self.company_id)?;
        Ok(())
    }

    /// Trims free text and drops blank values.
    pub fn normalized(&self) -> Self {
        Self {
            role: normalize_optional_text(self.role.clone()),
            job_description: normalize_optional_text(self.job_description.clone()),
            ..self.clone()
        }
    }
}

/// Partial update for one area.
///
/// Outer `None` leaves a field unchanged; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaPatch {
    pub role: Option<Option<String>>,
    pub job_description: Option<Option<String>>,
    pub is_primary: Option<bool>,
    /// Rejects the write with a stale-version conflict when it does not
    /// match the stored version.
    pub expected_version: Option<i64>,
}

impl AreaPatch {
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.job_description.is_none() && self.is_primary.is_none()
    }

    /// Applies the patch to a loaded row, producing the values to persist.
    pub fn apply_to(&self, area: &Area) -> Area {
        let mut next = area.clone();
        if let Some(role) = &self.role {
            next.role = normalize_optional_text(role.clone());
        }
        if let Some(job_description) = &self.job_description {
            next.job_description = normalize_optional_text(job_description.clone());
        }
        if let Some(is_primary) = self.is_primary {
            next.is_primary = is_primary;
        }
        next
    }
}
