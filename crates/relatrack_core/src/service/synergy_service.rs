//! Synergy registry use-cases.
//!
//! # Responsibility
//! - Full-replace the connector contacts of a deal.
//! - Apply the configured exclusivity rule between synergies and areas.
//!
//! # Invariants
//! - `replace_deal_synergies` is idempotent; a repeated call is a no-op.
//! - Under `SynergyExclusivity::Enforced`, nothing is written when any
//!   requested contact already holds an area at the company. The check runs
//!   in the replacement transaction, after the deal and company lookups.

use crate::config::SynergyPolicy;
use crate::model::synergy::{Synergy, SynergyPatch};
use crate::model::{CompanyId, ContactId, DealId, SynergyId};
use crate::repo::synergy_repo::SynergyRepository;
use crate::repo::RepoError;
use crate::service::error::ServiceError;
use log::{info, warn};

pub struct SynergyService<R: SynergyRepository> {
    repo: R,
    policy: SynergyPolicy,
}

impl<R: SynergyRepository> SynergyService<R> {
    pub fn new(repo: R, policy: SynergyPolicy) -> Self {
        Self { repo, policy }
    }

    /// Replaces the deal's synergy contacts with `contact_ids`.
    ///
    /// # Errors
    /// - `NotFound` when the deal or the company does not exist.
    /// - `Validation` when any contact id is unknown or not positive.
    /// - `Conflict` when exclusivity is enforced and a contact is an employee.
    pub fn replace_deal_synergies(
        &self,
        deal_id: DealId,
        company_id: CompanyId,
        contact_ids: &[ContactId],
    ) -> Result<Vec<Synergy>, ServiceError> {
        let replacement = self
            .repo
            .replace_deal_synergies(deal_id, company_id, contact_ids, self.policy.exclusivity)
            .map_err(|err| {
                if let RepoError::Conflict(reason) = &err {
                    warn!(
                        "event=synergy_replace module=synergy status=error deal_id={deal_id} company_id={company_id} error_code=conflict reason=\"{reason}\""
                    );
                }
                ServiceError::from(err)
            })?;
        if !replacement.employees.is_empty() {
            warn!(
                "event=synergy_exclusivity module=synergy status=advisory deal_id={deal_id} company_id={company_id} employees={:?}",
                replacement.employees
            );
        }
        info!(
            "event=synergy_replace module=synergy status=ok deal_id={deal_id} company_id={company_id} created={} removed={} total={}",
            replacement.created.len(),
            replacement.removed.len(),
            replacement.synergies.len()
        );
        Ok(replacement.synergies)
    }

    pub fn get_synergy(&self, id: SynergyId) -> Result<Option<Synergy>, ServiceError> {
        Ok(self.repo.get_synergy(id)?)
    }

    pub fn list_by_deal(&self, deal_id: DealId) -> Result<Vec<Synergy>, ServiceError> {
        Ok(self.repo.list_by_deal(deal_id)?)
    }

    pub fn list_by_contact(&self, contact_id: ContactId) -> Result<Vec<Synergy>, ServiceError> {
        Ok(self.repo.list_by_contact(contact_id)?)
    }

    pub fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<Synergy>, ServiceError> {
        Ok(self.repo.list_by_company(company_id)?)
    }

    /// Updates descriptive fields; the owning ids never change.
    pub fn update_synergy(
        &self,
        id: SynergyId,
        patch: &SynergyPatch,
    ) -> Result<Synergy, ServiceError> {
        Ok(self.repo.update_synergy(id, patch)?)
    }

    pub fn delete_synergy(&self, id: SynergyId) -> Result<(), ServiceError> {
        Ok(self.repo.delete_synergy(id)?)
    }
}
