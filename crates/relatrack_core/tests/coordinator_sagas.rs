use relatrack_core::config::DesignationPolicy;
use relatrack_core::db::open_db_in_memory;
use relatrack_core::repo::area_repo::{AreaRepository, SqliteAreaRepository};
use relatrack_core::repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
use relatrack_core::service::{
    run_atomically, AssociateRequest, ConsistencyCoordinator, ErrorKind, PartialSagaFailure,
    SagaError, SagaKind, SagaStep, ServiceError, SqliteCoordinator,
};
use relatrack_core::{
    Area, AreaId, AreaPatch, CascadeReport, Company, CompanyId, Contact, ContactId, Deal, DealId,
    NewArea, NewCompany, NewContact, NewDeal, RepoError, RepoResult,
};
use rusqlite::Connection;

/// Writes to fail on purpose; everything else is delegated.
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    delete_area: bool,
    mark_primary: bool,
    primary_company: bool,
}

fn injected(what: &str) -> RepoError {
    RepoError::InvalidData(format!("injected {what} failure"))
}

struct FailingAreas<'conn> {
    inner: SqliteAreaRepository<'conn>,
    faults: Faults,
}

impl AreaRepository for FailingAreas<'_> {
    fn create_area(&self, area: &NewArea) -> RepoResult<Area> {
        self.inner.create_area(area)
    }

    fn get_area(&self, id: AreaId) -> RepoResult<Option<Area>> {
        self.inner.get_area(id)
    }

    fn update_area(&self, id: AreaId, patch: &AreaPatch) -> RepoResult<Area> {
        self.inner.update_area(id, patch)
    }

    fn delete_area(&self, id: AreaId) -> RepoResult<()> {
        if self.faults.delete_area {
            return Err(injected("delete"));
        }
        self.inner.delete_area(id)
    }

    fn list_by_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Area>> {
        self.inner.list_by_contact(contact_id)
    }

    fn list_by_company(&self, company_id: CompanyId) -> RepoResult<Vec<Area>> {
        self.inner.list_by_company(company_id)
    }

    fn clear_primary_except(&self, contact_id: ContactId, keep: AreaId) -> RepoResult<usize> {
        self.inner.clear_primary_except(contact_id, keep)
    }

    fn mark_primary(&self, contact_id: ContactId, area_id: AreaId) -> RepoResult<Area> {
        if self.faults.mark_primary {
            return Err(injected("mark"));
        }
        self.inner.mark_primary(contact_id, area_id)
    }
}

struct FailingDirectory<'conn> {
    inner: SqliteDirectoryRepository<'conn>,
    faults: Faults,
}

impl DirectoryRepository for FailingDirectory<'_> {
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        self.inner.create_contact(contact)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        self.inner.get_contact(id)
    }

    fn set_contact_primary_company(
        &self,
        id: ContactId,
        company_id: Option<CompanyId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Contact> {
        if self.faults.primary_company {
            return Err(injected("primary company"));
        }
        self.inner
            .set_contact_primary_company(id, company_id, expected_version)
    }

    fn delete_contact(&self, id: ContactId) -> RepoResult<CascadeReport> {
        self.inner.delete_contact(id)
    }

    fn create_company(&self, company: &NewCompany) -> RepoResult<Company> {
        self.inner.create_company(company)
    }

    fn get_company(&self, id: CompanyId) -> RepoResult<Option<Company>> {
        self.inner.get_company(id)
    }

    fn set_company_primary_contact(
        &self,
        id: CompanyId,
        contact_id: Option<ContactId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Company> {
        self.inner
            .set_company_primary_contact(id, contact_id, expected_version)
    }

    fn delete_company(&self, id: CompanyId) -> RepoResult<CascadeReport> {
        self.inner.delete_company(id)
    }

    fn create_deal(&self, deal: &NewDeal) -> RepoResult<Deal> {
        self.inner.create_deal(deal)
    }

    fn get_deal(&self, id: DealId) -> RepoResult<Option<Deal>> {
        self.inner.get_deal(id)
    }

    fn delete_deal(&self, id: DealId) -> RepoResult<CascadeReport> {
        self.inner.delete_deal(id)
    }
}

struct Fixture {
    contact: ContactId,
    company_a: CompanyId,
    company_b: CompanyId,
}

fn seed(conn: &Connection) -> Fixture {
    let directory = SqliteDirectoryRepository::try_new(conn).unwrap();
    let contact = directory
        .create_contact(&NewContact::new("Chris", "One"))
        .unwrap();
    let company_a = directory.create_company(&NewCompany::new("A")).unwrap();
    let company_b = directory.create_company(&NewCompany::new("B")).unwrap();
    Fixture {
        contact: contact.id,
        company_a: company_a.id,
        company_b: company_b.id,
    }
}

fn coordinator(conn: &Connection) -> SqliteCoordinator<'_> {
    ConsistencyCoordinator::new(
        SqliteAreaRepository::try_new(conn).unwrap(),
        SqliteDirectoryRepository::try_new(conn).unwrap(),
        DesignationPolicy::default(),
    )
}

fn failing_coordinator(
    conn: &Connection,
    faults: Faults,
) -> ConsistencyCoordinator<FailingAreas<'_>, FailingDirectory<'_>> {
    ConsistencyCoordinator::new(
        FailingAreas {
            inner: SqliteAreaRepository::try_new(conn).unwrap(),
            faults,
        },
        FailingDirectory {
            inner: SqliteDirectoryRepository::try_new(conn).unwrap(),
            faults,
        },
        DesignationPolicy::default(),
    )
}

fn primary_count(areas: &[Area]) -> usize {
    areas.iter().filter(|area| area.is_primary).count()
}

fn expect_partial(err: SagaError) -> Box<PartialSagaFailure> {
    match err {
        SagaError::Partial(failure) => failure,
        other => panic!("expected partial failure, got: {other}"),
    }
}

#[test]
fn second_primary_association_moves_primary_company() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let coordinator = coordinator(&conn);

    let first = coordinator
        .associate_contact_to_company(
            &AssociateRequest::new(fx.contact, fx.company_a)
                .with_role("Sales")
                .primary(),
        )
        .unwrap();
    assert!(first.area.is_primary);
    assert_eq!(first.contact.contact.primary_company_id, Some(fx.company_a));
    assert_eq!(first.contact.areas.len(), 1);

    let second = coordinator
        .associate_contact_to_company(
            &AssociateRequest::new(fx.contact, fx.company_b)
                .with_role("Ops")
                .primary(),
        )
        .unwrap();
    let areas = &second.contact.areas;
    assert_eq!(areas.len(), 2);
    let at_a = areas.iter().find(|area| area.company_id == fx.company_a).unwrap();
    let at_b = areas.iter().find(|area| area.company_id == fx.company_b).unwrap();
    assert!(!at_a.is_primary);
    assert!(at_b.is_primary);
    assert_eq!(second.contact.contact.primary_company_id, Some(fx.company_b));
    assert_eq!(second.contact.primary_area(), Some(at_b));
}

#[test]
fn non_primary_association_skips_designation_steps() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);

    let outcome = coordinator(&conn)
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a))
        .unwrap();

    assert!(!outcome.area.is_primary);
    assert_eq!(outcome.contact.contact.primary_company_id, None);
    assert_eq!(
        outcome.report.completed,
        vec![SagaStep::CreateArea, SagaStep::LoadAggregate]
    );
    assert_eq!(
        outcome.report.skipped,
        vec![
            SagaStep::ClearOtherPrimaries,
            SagaStep::MarkPrimaryArea,
            SagaStep::SyncPrimaryCompany,
        ]
    );
}

#[test]
fn association_to_missing_company_aborts_without_writes() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let coordinator = coordinator(&conn);

    let err = coordinator
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, 404).primary())
        .unwrap_err();

    assert!(matches!(
        err,
        SagaError::Aborted {
            step: SagaStep::CreateArea,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(coordinator
        .contact_aggregate(fx.contact)
        .unwrap()
        .areas
        .is_empty());
}

#[test]
fn association_and_disassociation_round_trip() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let coordinator = coordinator(&conn);
    coordinator
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a).primary())
        .unwrap();
    let company = coordinator
        .set_company_primary_contact(fx.company_a, Some(fx.contact), None)
        .unwrap();
    assert_eq!(
        company.primary_contact.as_ref().map(|contact| contact.id),
        Some(fx.contact)
    );

    let outcome = coordinator
        .disassociate_contact_from_company(fx.contact, fx.company_a)
        .unwrap();

    assert!(outcome.removed_area.is_primary);
    assert!(outcome.contact.areas.is_empty());
    assert_eq!(outcome.contact.contact.primary_company_id, None);
    assert_eq!(outcome.company.company.primary_contact_id, None);
    assert!(outcome.company.primary_contact.is_none());
    assert_eq!(
        outcome.report.completed,
        vec![
            SagaStep::InspectCompany,
            SagaStep::ClearCompanyPrimaryContact,
            SagaStep::LocateArea,
            SagaStep::DeleteArea,
            SagaStep::ClearPrimaryCompany,
            SagaStep::LoadAggregate,
        ]
    );
}

#[test]
fn disassociation_removes_lowest_id_area_first() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let coordinator = coordinator(&conn);
    let first = coordinator
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a).with_role("Advisor"))
        .unwrap();
    let second = coordinator
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a).with_role("Board"))
        .unwrap();

    let outcome = coordinator
        .disassociate_contact_from_company(fx.contact, fx.company_a)
        .unwrap();

    assert_eq!(outcome.removed_area.id, first.area.id);
    assert_eq!(outcome.contact.areas, vec![second.area]);
    assert!(outcome.report.skipped.contains(&SagaStep::ClearPrimaryCompany));
}

#[test]
fn disassociation_without_area_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);

    let err = coordinator(&conn)
        .disassociate_contact_from_company(fx.contact, fx.company_b)
        .unwrap_err();

    match err {
        SagaError::Aborted {
            step: SagaStep::LocateArea,
            source: ServiceError::NoAreaAtCompany { .. },
            ..
        } => {}
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn delete_failure_after_clearing_primary_contact_is_partial() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let setup = coordinator(&conn);
    let area = setup
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a))
        .unwrap()
        .area;
    setup
        .set_company_primary_contact(fx.company_a, Some(fx.contact), None)
        .unwrap();

    let faults = Faults {
        delete_area: true,
        ..Faults::default()
    };
    let err = failing_coordinator(&conn, faults)
        .disassociate_contact_from_company(fx.contact, fx.company_a)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PartialSagaFailure);
    let failure = expect_partial(err);
    assert_eq!(failure.saga, SagaKind::DisassociateContactFromCompany);
    assert!(failure
        .completed
        .contains(&SagaStep::ClearCompanyPrimaryContact));
    assert_eq!(failure.failed, SagaStep::DeleteArea);
    assert_eq!(failure.area.as_ref().map(|area| area.id), Some(area.id));

    let company = setup.company_aggregate(fx.company_a).unwrap();
    assert_eq!(company.company.primary_contact_id, None);
    assert_eq!(company.areas, vec![area]);
}

#[test]
fn designation_failure_after_area_creation_is_partial() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let faults = Faults {
        mark_primary: true,
        ..Faults::default()
    };

    let err = failing_coordinator(&conn, faults)
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a).primary())
        .unwrap_err();

    let failure = expect_partial(err);
    assert_eq!(
        failure.completed,
        vec![SagaStep::CreateArea, SagaStep::ClearOtherPrimaries]
    );
    assert_eq!(failure.failed, SagaStep::MarkPrimaryArea);
    let area = failure.area.unwrap();
    assert!(!area.is_primary);

    let contact = coordinator(&conn).contact_aggregate(fx.contact).unwrap();
    assert_eq!(contact.areas, vec![area]);
    assert_eq!(contact.contact.primary_company_id, None);
}

#[test]
fn mark_failure_reports_demotion_of_previous_primary() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let setup = coordinator(&conn);
    let at_a = setup
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a).primary())
        .unwrap()
        .area;
    let faults = Faults {
        mark_primary: true,
        ..Faults::default()
    };

    let err = failing_coordinator(&conn, faults)
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_b).primary())
        .unwrap_err();

    let failure = expect_partial(err);
    assert_eq!(
        failure.completed,
        vec![SagaStep::CreateArea, SagaStep::ClearOtherPrimaries]
    );
    assert_eq!(failure.failed, SagaStep::MarkPrimaryArea);
    let at_b = failure.area.unwrap();

    let contact = setup.contact_aggregate(fx.contact).unwrap();
    assert_eq!(primary_count(&contact.areas), 0);
    assert!(contact.primary_area().is_none());
    assert_eq!(contact.contact.primary_company_id, Some(fx.company_a));
    assert!(contact.areas.iter().any(|area| area.id == at_a.id && !area.is_primary));

    let retried = setup.set_contact_primary_area(fx.contact, at_b.id).unwrap();
    assert_eq!(primary_count(&retried.areas), 1);
    assert_eq!(retried.primary_area().map(|area| area.id), Some(at_b.id));
}

#[test]
fn primary_company_sync_failure_leaves_designated_area() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let faults = Faults {
        primary_company: true,
        ..Faults::default()
    };

    let err = failing_coordinator(&conn, faults)
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a).primary())
        .unwrap_err();

    let failure = expect_partial(err);
    assert_eq!(
        failure.completed,
        vec![
            SagaStep::CreateArea,
            SagaStep::ClearOtherPrimaries,
            SagaStep::MarkPrimaryArea,
        ]
    );
    assert_eq!(failure.failed, SagaStep::SyncPrimaryCompany);
    assert!(failure.area.as_ref().is_some_and(|area| area.is_primary));

    let contact = coordinator(&conn).contact_aggregate(fx.contact).unwrap();
    assert_eq!(primary_count(&contact.areas), 1);
    assert_eq!(contact.contact.primary_company_id, None);
}

#[test]
fn pointer_cleanup_failure_after_delete_leaves_stale_primary_company() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let setup = coordinator(&conn);
    setup
        .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a).primary())
        .unwrap();
    let faults = Faults {
        primary_company: true,
        ..Faults::default()
    };

    let err = failing_coordinator(&conn, faults)
        .disassociate_contact_from_company(fx.contact, fx.company_a)
        .unwrap_err();

    let failure = expect_partial(err);
    assert_eq!(failure.saga, SagaKind::DisassociateContactFromCompany);
    assert_eq!(
        failure.completed,
        vec![
            SagaStep::InspectCompany,
            SagaStep::LocateArea,
            SagaStep::DeleteArea,
        ]
    );
    assert_eq!(failure.failed, SagaStep::ClearPrimaryCompany);

    let contact = setup.contact_aggregate(fx.contact).unwrap();
    assert!(contact.areas.is_empty());
    assert_eq!(contact.contact.primary_company_id, Some(fx.company_a));
}

#[test]
fn atomic_saga_commits_on_success() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);

    let outcome = run_atomically(&conn, DesignationPolicy::default(), |coordinator| {
        coordinator.associate_contact_to_company(
            &AssociateRequest::new(fx.contact, fx.company_a).primary(),
        )
    })
    .unwrap();

    assert!(conn.is_autocommit());
    let stored = coordinator(&conn).contact_aggregate(fx.contact).unwrap();
    assert_eq!(stored, outcome.contact);
}

#[test]
fn atomic_saga_rolls_back_every_step_on_failure() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);

    let err = run_atomically(&conn, DesignationPolicy::default(), |coordinator| {
        coordinator.associate_contact_to_company(
            &AssociateRequest::new(fx.contact, fx.company_a).primary(),
        )?;
        coordinator.disassociate_contact_from_company(fx.contact, fx.company_b)
    })
    .unwrap_err();

    assert!(matches!(
        err,
        SagaError::Aborted {
            step: SagaStep::LocateArea,
            ..
        }
    ));
    let contact = coordinator(&conn).contact_aggregate(fx.contact).unwrap();
    assert!(contact.areas.is_empty());
    assert_eq!(contact.contact.primary_company_id, None);
}

#[test]
fn atomic_saga_reports_partial_failure_as_aborted() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);

    let err = run_atomically(&conn, DesignationPolicy::default(), |coordinator| {
        let outcome = coordinator
            .associate_contact_to_company(&AssociateRequest::new(fx.contact, fx.company_a))?;
        Err::<(), _>(SagaError::Partial(Box::new(PartialSagaFailure {
            saga: SagaKind::AssociateContactToCompany,
            completed: vec![SagaStep::CreateArea],
            failed: SagaStep::MarkPrimaryArea,
            source: ServiceError::Validation("forced".to_string()),
            area: Some(outcome.area),
        })))
    })
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.failed_step(), Some(SagaStep::MarkPrimaryArea));
    assert!(coordinator(&conn)
        .contact_aggregate(fx.contact)
        .unwrap()
        .areas
        .is_empty());
}

#[test]
fn associate_then_disassociate_with_imported_ids() {
    let conn = open_db_in_memory().unwrap();
    let directory = SqliteDirectoryRepository::try_new(&conn).unwrap();
    directory
        .create_contact(&NewContact::with_id(5, "Finn", "Controller"))
        .unwrap();
    directory
        .create_company(&NewCompany::with_id(9, "Nine Ltd"))
        .unwrap();
    let coordinator = coordinator(&conn);

    coordinator
        .associate_contact_to_company(&AssociateRequest::new(5, 9).with_role("CFO").primary())
        .unwrap();
    let outcome = coordinator.disassociate_contact_from_company(5, 9).unwrap();

    assert_eq!(outcome.contact.contact.primary_company_id, None);
    assert!(outcome.contact.areas.is_empty());
    assert!(outcome.company.areas.is_empty());
}
