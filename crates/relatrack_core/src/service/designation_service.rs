//! Primary designation on both sides of an area.
//!
//! # Responsibility
//! - Contact side: keep at most one primary area per contact.
//! - Company side: set or clear `companies.primary_contact_id`.
//!
//! # Invariants
//! - `set_contact_primary_area` runs as two storage calls: demote the other
//!   areas, then mark the target. A failure between them leaves the contact
//!   without a primary area until the call is retried.
//! - The mark step demotes competitors again inside its own transaction, so
//!   interleaved callers end with exactly one primary (last writer wins).
//! - Clearing a company's primary contact never deletes an area.
//! - Re-issuing the same designation leaves the same end state.

use crate::config::DesignationPolicy;
use crate::model::area::Area;
use crate::model::directory::Company;
use crate::model::{AreaId, CompanyId, ContactId, EntityRef, ValidationError};
use crate::repo::area_repo::AreaRepository;
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::ConflictReason;
use crate::service::error::ServiceError;
use log::debug;

/// Designation service over the area store and the directory.
pub struct PrimaryDesignationService<A: AreaRepository, D: DirectoryRepository> {
    areas: A,
    directory: D,
    policy: DesignationPolicy,
}

impl<A: AreaRepository, D: DirectoryRepository> PrimaryDesignationService<A, D> {
    pub fn new(areas: A, directory: D, policy: DesignationPolicy) -> Self {
        Self {
            areas,
            directory,
            policy,
        }
    }

    /// Makes `area_id` the contact's primary area.
    ///
    /// # Errors
    /// - `NotFound` when the area does not exist.
    /// - `Validation` when the area belongs to another contact.
    pub fn set_contact_primary_area(
        &self,
        contact_id: ContactId,
        area_id: AreaId,
    ) -> Result<Area, ServiceError> {
        self.ensure_area_owned_by(contact_id, area_id)?;
        self.clear_other_primaries(contact_id, area_id)?;
        self.mark_primary_area(contact_id, area_id)
    }

    /// Step (a): demotes every other primary area of the contact.
    pub fn clear_other_primaries(
        &self,
        contact_id: ContactId,
        keep_area_id: AreaId,
    ) -> Result<usize, ServiceError> {
        let demoted = self.areas.clear_primary_except(contact_id, keep_area_id)?;
        debug!(
            "event=primary_area_clear module=designation status=ok contact_id={contact_id} keep_area_id={keep_area_id} demoted={demoted}"
        );
        Ok(demoted)
    }

    /// Step (b): marks the area primary.
    pub fn mark_primary_area(
        &self,
        contact_id: ContactId,
        area_id: AreaId,
    ) -> Result<Area, ServiceError> {
        let area = self.areas.mark_primary(contact_id, area_id)?;
        debug!(
            "event=primary_area_mark module=designation status=ok contact_id={contact_id} area_id={area_id} version={}",
            area.version
        );
        Ok(area)
    }

    /// Sets or clears the company's primary contact.
    ///
    /// With `primary_contact_requires_area` the contact must already hold an
    /// area at the company.
    pub fn set_company_primary_contact(
        &self,
        company_id: CompanyId,
        contact_id: Option<ContactId>,
        expected_version: Option<i64>,
    ) -> Result<Company, ServiceError> {
        if self.directory.get_company(company_id)?.is_none() {
            return Err(ServiceError::NotFound(EntityRef::Company(company_id)));
        }

        if let Some(contact_id) = contact_id {
            if self.directory.get_contact(contact_id)?.is_none() {
                return Err(ServiceError::NotFound(EntityRef::Contact(contact_id)));
            }
            if self.policy.primary_contact_requires_area
                && !self
                    .areas
                    .list_by_contact(contact_id)?
                    .iter()
                    .any(|area| area.company_id == company_id)
            {
                return Err(ServiceError::Conflict(ConflictReason::ContactNotAtCompany {
                    contact_id,
                    company_id,
                }));
            }
        }

        let company =
            self.directory
                .set_company_primary_contact(company_id, contact_id, expected_version)?;
        debug!(
            "event=primary_contact_set module=designation status=ok company_id={company_id} contact_id={contact_id:?} version={}",
            company.version
        );
        Ok(company)
    }

    fn ensure_area_owned_by(
        &self,
        contact_id: ContactId,
        area_id: AreaId,
    ) -> Result<Area, ServiceError> {
        let area = self
            .areas
            .get_area(area_id)?
            .ok_or(ServiceError::NotFound(EntityRef::Area(area_id)))?;
        if area.contact_id != contact_id {
            return Err(ServiceError::Validation(
                ValidationError::AreaOwnerMismatch {
                    area_id,
                    expected_contact_id: contact_id,
                    actual_contact_id: area.contact_id,
                }
                .to_string(),
            ));
        }
        Ok(area)
    }
}
