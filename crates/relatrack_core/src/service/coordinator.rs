//! Multi-step relationship sagas.
//!
//! # Responsibility
//! - Associate a contact with a company (area + optional primary designation).
//! - Disassociate a contact from a company (area removal + pointer cleanup).
//! - Return the full aggregate after every mutation.
//!
//! # Invariants
//! - A saga never reports success when any step failed.
//! - A failure after a committed step is surfaced as
//!   [`SagaError::Partial`] listing the completed steps; a failure before
//!   any write is surfaced as [`SagaError::Aborted`].
//! - New areas are created non-primary; promotion always goes through
//!   [`PrimaryDesignationService`].
//! - [`run_atomically`] executes a saga inside one transaction, so a failure
//!   leaves no trace of earlier steps.

use crate::config::DesignationPolicy;
use crate::model::area::{Area, NewArea};
use crate::model::directory::{Company, Contact};
use crate::model::{AreaId, CompanyId, ContactId, EntityRef};
use crate::repo::area_repo::{AreaRepository, SqliteAreaRepository};
use crate::repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
use crate::repo::RepoError;
use crate::service::designation_service::PrimaryDesignationService;
use crate::service::error::{ErrorKind, ServiceError};
use log::{error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaKind {
    AssociateContactToCompany,
    DisassociateContactFromCompany,
}

impl SagaKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::AssociateContactToCompany => "associate",
            Self::DisassociateContactFromCompany => "disassociate",
        }
    }
}

/// One recorded step of a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    CreateArea,
    ClearOtherPrimaries,
    MarkPrimaryArea,
    SyncPrimaryCompany,
    InspectCompany,
    ClearCompanyPrimaryContact,
    LocateArea,
    DeleteArea,
    ClearPrimaryCompany,
    LoadAggregate,
}

impl SagaStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::CreateArea => "create_area",
            Self::ClearOtherPrimaries => "clear_other_primaries",
            Self::MarkPrimaryArea => "mark_primary_area",
            Self::SyncPrimaryCompany => "sync_primary_company",
            Self::InspectCompany => "inspect_company",
            Self::ClearCompanyPrimaryContact => "clear_company_primary_contact",
            Self::LocateArea => "locate_area",
            Self::DeleteArea => "delete_area",
            Self::ClearPrimaryCompany => "clear_primary_company",
            Self::LoadAggregate => "load_aggregate",
        }
    }

    /// Whether a completed step wrote to storage.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::CreateArea
                | Self::ClearOtherPrimaries
                | Self::MarkPrimaryArea
                | Self::SyncPrimaryCompany
                | Self::ClearCompanyPrimaryContact
                | Self::DeleteArea
                | Self::ClearPrimaryCompany
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaReport {
    pub saga: SagaKind,
    pub completed: Vec<SagaStep>,
    pub skipped: Vec<SagaStep>,
}

/// Contact with all of its areas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactAggregate {
    pub contact: Contact,
    pub areas: Vec<Area>,
}

impl ContactAggregate {
    pub fn primary_area(&self) -> Option<&Area> {
        self.areas.iter().find(|area| area.is_primary)
    }
}

/// Company with its resolved primary contact and all areas held there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyAggregate {
    pub company: Company,
    pub primary_contact: Option<Contact>,
    pub areas: Vec<Area>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateRequest {
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub role: Option<String>,
    pub job_description: Option<String>,
    pub is_primary: bool,
}

impl AssociateRequest {
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

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationOutcome {
    pub area: Area,
    pub contact: ContactAggregate,
    pub report: SagaReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisassociationOutcome {
    pub removed_area: Area,
    pub contact: ContactAggregate,
    pub company: CompanyAggregate,
    pub report: SagaReport,
}

/// A saga step failed after at least one earlier step committed.
#[derive(Debug)]
pub struct PartialSagaFailure {
    pub saga: SagaKind,
    pub completed: Vec<SagaStep>,
    pub failed: SagaStep,
    pub source: ServiceError,
    /// Area created or located before the failure, if any.
    pub area: Option<Area>,
}

#[derive(Debug)]
pub enum SagaError {
    /// Failed before anything was written.
    Aborted {
        saga: SagaKind,
        step: SagaStep,
        source: ServiceError,
    },
    Partial(Box<PartialSagaFailure>),
    /// Storage failed outside any step (transaction begin or commit).
    Storage(ServiceError),
}

impl SagaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Aborted { source, .. } => source.kind(),
            Self::Partial(_) => ErrorKind::PartialSagaFailure,
            Self::Storage(source) => source.kind(),
        }
    }

    pub fn failed_step(&self) -> Option<SagaStep> {
        match self {
            Self::Aborted { step, .. } => Some(*step),
            Self::Partial(failure) => Some(failure.failed),
            Self::Storage(_) => None,
        }
    }

    /// Error reported by the failing step.
    pub fn cause(&self) -> &ServiceError {
        match self {
            Self::Aborted { source, .. } => source,
            Self::Partial(failure) => &failure.source,
            Self::Storage(source) => source,
        }
    }
}

impl Display for SagaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aborted { saga, step, source } => write!(
                f,
                "{} saga aborted at `{}`: {source}",
                saga.label(),
                step.label()
            ),
            Self::Partial(failure) => {
                let completed = failure
                    .completed
                    .iter()
                    .map(|step| step.label())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(
                    f,
                    "{} saga partially applied; completed [{completed}], failed at `{}`: {}",
                    failure.saga.label(),
                    failure.failed.label(),
                    failure.source
                )
            }
            Self::Storage(source) => write!(f, "saga storage failure: {source}"),
        }
    }
}

impl Error for SagaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause())
    }
}

/// Progress of one saga execution.
struct SagaRun {
    saga: SagaKind,
    contact_id: ContactId,
    company_id: CompanyId,
    started_at: Instant,
    completed: Vec<SagaStep>,
    skipped: Vec<SagaStep>,
    area: Option<Area>,
}

impl SagaRun {
    fn start(saga: SagaKind, contact_id: ContactId, company_id: CompanyId) -> Self {
        info!(
            "event=saga module=coordinator status=start saga={} contact_id={contact_id} company_id={company_id}",
            saga.label()
        );
        Self {
            saga,
            contact_id,
            company_id,
            started_at: Instant::now(),
            completed: Vec::new(),
            skipped: Vec::new(),
            area: None,
        }
    }

    fn step<T>(
        &mut self,
        step: SagaStep,
        f: impl FnOnce() -> Result<T, ServiceError>,
    ) -> Result<T, SagaError> {
        match f() {
            Ok(value) => {
                self.completed.push(step);
                Ok(value)
            }
            Err(source) => Err(self.fail(step, source)),
        }
    }

    fn skip(&mut self, step: SagaStep) {
        self.skipped.push(step);
    }

    fn fail(&mut self, step: SagaStep, source: ServiceError) -> SagaError {
        let duration_ms = self.started_at.elapsed().as_millis();
        let committed = self.completed.iter().any(|done| done.is_mutation());
        if committed {
            warn!(
                "event=saga module=coordinator status=partial saga={} contact_id={} company_id={} failed_step={} completed={} duration_ms={duration_ms} error_code={}",
                self.saga.label(),
                self.contact_id,
                self.company_id,
                step.label(),
                self.completed.len(),
                source.kind()
            );
            SagaError::Partial(Box::new(PartialSagaFailure {
                saga: self.saga,
                completed: std::mem::take(&mut self.completed),
                failed: step,
                source,
                area: self.area.take(),
            }))
        } else {
            error!(
                "event=saga module=coordinator status=error saga={} contact_id={} company_id={} failed_step={} duration_ms={duration_ms} error_code={}",
                self.saga.label(),
                self.contact_id,
                self.company_id,
                step.label(),
                source.kind()
            );
            SagaError::Aborted {
                saga: self.saga,
                step,
                source,
            }
        }
    }

    fn finish(self) -> SagaReport {
        info!(
            "event=saga module=coordinator status=ok saga={} contact_id={} company_id={} completed={} skipped={} duration_ms={}",
            self.saga.label(),
            self.contact_id,
            self.company_id,
            self.completed.len(),
            self.skipped.len(),
            self.started_at.elapsed().as_millis()
        );
        SagaReport {
            saga: self.saga,
            completed: self.completed,
            skipped: self.skipped,
        }
    }
}

/// Orchestrates the association sagas over the area store and directory.
pub struct ConsistencyCoordinator<A: AreaRepository, D: DirectoryRepository> {
    areas: A,
    directory: D,
    policy: DesignationPolicy,
}

impl<A: AreaRepository, D: DirectoryRepository> ConsistencyCoordinator<A, D> {
    pub fn new(areas: A, directory: D, policy: DesignationPolicy) -> Self {
        Self {
            areas,
            directory,
            policy,
        }
    }

    pub fn designation(&self) -> PrimaryDesignationService<&A, &D> {
        PrimaryDesignationService::new(&self.areas, &self.directory, self.policy)
    }

    /// Creates an area for the contact at the company.
    ///
    /// When `is_primary` is set the contact's other areas are demoted, the new
    /// area is marked primary and the contact's primary company is synced to
    /// the company. Each of the three writes is its own step.
    ///
    /// # Errors
    /// - [`SagaError::Aborted`] when the area could not be created.
    /// - [`SagaError::Partial`] when the area exists but a later step failed.
    pub fn associate_contact_to_company(
        &self,
        request: &AssociateRequest,
    ) -> Result<AssociationOutcome, SagaError> {
        let contact_id = request.contact_id;
        let company_id = request.company_id;
        let mut run = SagaRun::start(SagaKind::AssociateContactToCompany, contact_id, company_id);

        let new_area = NewArea {
            contact_id,
            company_id,
            role: request.role.clone(),
            job_description: request.job_description.clone(),
            is_primary: false,
        };
        let mut area = run.step(SagaStep::CreateArea, || {
            Ok(self.areas.create_area(&new_area)?)
        })?;
        run.area = Some(area.clone());

        if request.is_primary {
            let area_id = area.id;
            let designation = self.designation();
            run.step(SagaStep::ClearOtherPrimaries, || {
                designation.clear_other_primaries(contact_id, area_id)
            })?;
            area = run.step(SagaStep::MarkPrimaryArea, || {
                designation.mark_primary_area(contact_id, area_id)
            })?;
            run.area = Some(area.clone());
            run.step(SagaStep::SyncPrimaryCompany, || {
                Ok(self
                    .directory
                    .set_contact_primary_company(contact_id, Some(company_id), None)?)
            })?;
        } else {
            run.skip(SagaStep::ClearOtherPrimaries);
            run.skip(SagaStep::MarkPrimaryArea);
            run.skip(SagaStep::SyncPrimaryCompany);
        }

        let contact = run.step(SagaStep::LoadAggregate, || {
            self.contact_aggregate(contact_id)
        })?;
        Ok(AssociationOutcome {
            area,
            contact,
            report: run.finish(),
        })
    }

    /// Removes the contact's area at the company.
    ///
    /// When the contact holds several areas there, the one with the lowest id
    /// is removed.
    ///
    /// # Errors
    /// - [`SagaError::Aborted`] with `NotFound` when the company is missing or
    ///   the contact has no area there and nothing was cleared.
    /// - [`SagaError::Partial`] when a later step failed after a write.
    pub fn disassociate_contact_from_company(
        &self,
        contact_id: ContactId,
        company_id: CompanyId,
    ) -> Result<DisassociationOutcome, SagaError> {
        let mut run = SagaRun::start(
            SagaKind::DisassociateContactFromCompany,
            contact_id,
            company_id,
        );

        let company = run.step(SagaStep::InspectCompany, || {
            self.directory
                .get_company(company_id)?
                .ok_or(ServiceError::NotFound(EntityRef::Company(company_id)))
        })?;
        if company.primary_contact_id == Some(contact_id) {
            run.step(SagaStep::ClearCompanyPrimaryContact, || {
                self.designation()
                    .set_company_primary_contact(company_id, None, None)
            })?;
        } else {
            run.skip(SagaStep::ClearCompanyPrimaryContact);
        }

        let area = run.step(SagaStep::LocateArea, || {
            self.areas
                .list_by_contact(contact_id)?
                .into_iter()
                .filter(|area| area.company_id == company_id)
                .min_by_key(|area| area.id)
                .ok_or(ServiceError::NoAreaAtCompany {
                    contact_id,
                    company_id,
                })
        })?;
        run.area = Some(area.clone());

        let area_id = area.id;
        run.step(SagaStep::DeleteArea, || Ok(self.areas.delete_area(area_id)?))?;

        if area.is_primary {
            run.step(SagaStep::ClearPrimaryCompany, || {
                Ok(self
                    .directory
                    .set_contact_primary_company(contact_id, None, None)?)
            })?;
        } else {
            run.skip(SagaStep::ClearPrimaryCompany);
        }

        let (contact, company) = run.step(SagaStep::LoadAggregate, || {
            Ok((
                self.contact_aggregate(contact_id)?,
                self.company_aggregate(company_id)?,
            ))
        })?;
        Ok(DisassociationOutcome {
            removed_area: area,
            contact,
            company,
            report: run.finish(),
        })
    }

    /// Designates an area primary and returns the contact aggregate.
    pub fn set_contact_primary_area(
        &self,
        contact_id: ContactId,
        area_id: AreaId,
    ) -> Result<ContactAggregate, ServiceError> {
        self.designation()
            .set_contact_primary_area(contact_id, area_id)?;
        self.contact_aggregate(contact_id)
    }

    pub fn set_contact_primary_company(
        &self,
        contact_id: ContactId,
        company_id: Option<CompanyId>,
        expected_version: Option<i64>,
    ) -> Result<ContactAggregate, ServiceError> {
        self.directory
            .set_contact_primary_company(contact_id, company_id, expected_version)?;
        self.contact_aggregate(contact_id)
    }

    pub fn set_company_primary_contact(
        &self,
        company_id: CompanyId,
        contact_id: Option<ContactId>,
        expected_version: Option<i64>,
    ) -> Result<CompanyAggregate, ServiceError> {
        self.designation()
            .set_company_primary_contact(company_id, contact_id, expected_version)?;
        self.company_aggregate(company_id)
    }

    /// Removes one area by id, without touching designation pointers.
    pub fn delete_area(&self, area_id: AreaId) -> Result<(), ServiceError> {
        self.areas.delete_area(area_id)?;
        info!("event=area_delete module=coordinator status=ok area_id={area_id}");
        Ok(())
    }

    pub fn contact_aggregate(&self, contact_id: ContactId) -> Result<ContactAggregate, ServiceError> {
        let contact = self
            .directory
            .get_contact(contact_id)?
            .ok_or(ServiceError::NotFound(EntityRef::Contact(contact_id)))?;
        let areas = self.areas.list_by_contact(contact_id)?;
        Ok(ContactAggregate { contact, areas })
    }

    pub fn company_aggregate(&self, company_id: CompanyId) -> Result<CompanyAggregate, ServiceError> {
        let company = self
            .directory
            .get_company(company_id)?
            .ok_or(ServiceError::NotFound(EntityRef::Company(company_id)))?;
        let primary_contact = match company.primary_contact_id {
            Some(contact_id) => self.directory.get_contact(contact_id)?,
            None => None,
        };
        let areas = self.areas.list_by_company(company_id)?;
        Ok(CompanyAggregate {
            company,
            primary_contact,
            areas,
        })
    }
}

/// SQLite-backed coordinator borrowed from one connection or transaction.
pub type SqliteCoordinator<'conn> =
    ConsistencyCoordinator<SqliteAreaRepository<'conn>, SqliteDirectoryRepository<'conn>>;

/// Runs one saga inside a single immediate transaction.
///
/// On failure every step is rolled back; a partial failure is reported as
/// [`SagaError::Aborted`] at the failing step because nothing persisted.
pub fn run_atomically<T, F>(
    conn: &Connection,
    policy: DesignationPolicy,
    saga: F,
) -> Result<T, SagaError>
where
    F: for<'c> FnOnce(&SqliteCoordinator<'c>) -> Result<T, SagaError>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|err| SagaError::Storage(RepoError::from(err).into()))?;

    let outcome = {
        let coordinator = ConsistencyCoordinator::new(
            SqliteAreaRepository::try_new(&tx).map_err(|err| SagaError::Storage(err.into()))?,
            SqliteDirectoryRepository::try_new(&tx)
                .map_err(|err| SagaError::Storage(err.into()))?,
            policy,
        );
        saga(&coordinator)
    };

    match outcome {
        Ok(value) => {
            tx.commit()
                .map_err(|err| SagaError::Storage(RepoError::from(err).into()))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                error!(
                    "event=saga_rollback module=coordinator status=error error={rollback_err}"
                );
            } else {
                info!(
                    "event=saga_rollback module=coordinator status=ok failed_step={}",
                    err.failed_step().map_or("none", SagaStep::label)
                );
            }
            Err(match err {
                SagaError::Partial(failure) => SagaError::Aborted {
                    saga: failure.saga,
                    step: failure.failed,
                    source: failure.source,
                },
                other => other,
            })
        }
    }
}
