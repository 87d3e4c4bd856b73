//! Synergy: ternary contact/company/deal relationship.
//!
//! A synergy records that a contact, acting as an external connector rather
//! than an employee, is linked to a deal belonging to a company.
//!
//! # Invariants
//! - `contact_id`, `company_id` and `deal_id` are always present.
//! - `end_date` is never earlier than `start_date` when both are set.
//! - At most one synergy exists per `(deal_id, contact_id)`.

use super::{
    ensure_date_range, normalize_optional_text, CompanyId, ContactId, DealId, SynergyId,
    ValidationError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synergy {
    pub id: SynergyId,
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub deal_id: DealId,
    /// Serialized as `type` to match the storage column.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    /// Unix epoch milliseconds.
    pub start_date: Option<i64>,
    /// Unix epoch milliseconds. Should be >= `start_date` when set.
    pub end_date: Option<i64>,
}

impl Synergy {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_date_range(self.start_date, self.end_date)
    }
}

/// Partial update for synergy descriptive fields.
///
/// The three owning ids are immutable; re-pointing a synergy is a replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynergyPatch {
    pub kind: Option<Option<String>>,
    pub status: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub start_date: Option<Option<i64>>,
    pub end_date: Option<Option<i64>>,
}

impl SynergyPatch {
    pub fn apply_to(&self, synergy: &Synergy) -> Result<Synergy, ValidationError> {
        let mut next = synergy.clone();
        if let Some(kind) = &self.kind {
            next.kind = normalize_optional_text(kind.clone());
        }
        if let Some(status) = &self.status {
            next.status = normalize_optional_text(status.clone());
        }
        if let Some(description) = &self.description {
            next.description = normalize_optional_text(description.clone());
        }
        if let Some(start_date) = self.start_date {
            next.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            next.end_date = end_date;
        }
        next.validate()?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{Synergy, SynergyPatch};
    use crate::model::ValidationError;

    fn sample() -> Synergy {
        Synergy {
            id: 3,
            contact_id: 5,
            company_id: 9,
            deal_id: 11,
            kind: Some("referral".to_string()),
            status: None,
            description: None,
            start_date: Some(1_000),
            end_date: None,
        }
    }

    #[test]
    fn kind_is_serialized_as_type() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["type"], "referral");
        assert_eq!(value["deal_id"], 11);
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn patch_rejects_end_before_start() {
        let patch = SynergyPatch {
            end_date: Some(Some(500)),
            ..SynergyPatch::default()
        };
        assert!(matches!(
            patch.apply_to(&sample()),
            Err(ValidationError::DateRangeReversed { .. })
        ));
    }

    #[test]
    fn patch_blank_text_clears_field() {
        let patch = SynergyPatch {
            kind: Some(Some("   ".to_string())),
            ..SynergyPatch::default()
        };
        assert_eq!(patch.apply_to(&sample()).unwrap().kind, None);
    }
}
