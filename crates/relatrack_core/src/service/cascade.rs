//! Hard-delete cascades for contacts, companies and deals.
//!
//! The removal of dependent areas and synergies is declared by foreign keys;
//! this manager issues the owning delete and reports what went with it.

use crate::model::{CompanyId, ContactId, DealId};
use crate::repo::directory_repo::{CascadeReport, DirectoryRepository};
use crate::service::error::ServiceError;
use log::info;

pub struct CascadeManager<D: DirectoryRepository> {
    directory: D,
}

impl<D: DirectoryRepository> CascadeManager<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Deletes a contact with its areas and synergies.
    ///
    /// Companies pointing at the contact as primary contact are cleared.
    pub fn delete_contact(&self, contact_id: ContactId) -> Result<CascadeReport, ServiceError> {
        let report = self.directory.delete_contact(contact_id)?;
        log_cascade(&report);
        Ok(report)
    }

    /// Deletes a company with its areas and synergies.
    ///
    /// Contacts pointing at the company as primary company are cleared.
    pub fn delete_company(&self, company_id: CompanyId) -> Result<CascadeReport, ServiceError> {
        let report = self.directory.delete_company(company_id)?;
        log_cascade(&report);
        Ok(report)
    }

    /// Deletes a deal with its synergies.
    pub fn delete_deal(&self, deal_id: DealId) -> Result<CascadeReport, ServiceError> {
        let report = self.directory.delete_deal(deal_id)?;
        log_cascade(&report);
        Ok(report)
    }
}

fn log_cascade(report: &CascadeReport) {
    let (entity, id) = report
        .target
        .map_or(("unknown", 0), |target| (target.label(), target.id()));
    info!(
        "event=cascade_delete module=cascade status=ok entity={entity} id={id} areas_removed={} synergies_removed={} primary_pointers_cleared={}",
        report.areas_removed, report.synergies_removed, report.primary_pointers_cleared
    );
}
