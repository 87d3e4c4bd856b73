//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the relationship operations to Dart via FRB.
//! - Translate core errors into a flat envelope with a stable `error_kind`.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - `error_kind` is `None` exactly when `ok` is true.
//! - Payloads are JSON documents of the post-mutation aggregate.

use log::{error, warn};
use relatrack_core::config::{load_config, CoreConfig, SagaMode};
use relatrack_core::db::open_db;
use relatrack_core::service::{
    run_atomically, AssociateRequest, AssociationOutcome, CascadeManager,
    ConsistencyCoordinator, DisassociationOutcome, ErrorKind, SagaError, ServiceError,
    SqliteCoordinator, SynergyService,
};
use relatrack_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    init_logging_from_config, ping as ping_inner,
    CompanyId, ContactId, DirectoryRepository, NewCompany, NewContact, NewDeal, RepoError,
    SqliteAreaRepository, SqliteDirectoryRepository, SqliteSynergyRepository,
};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::OnceLock;

const DB_FILE_NAME: &str = "relatrack.sqlite3";
const DB_PATH_ENV: &str = "RELATRACK_DB_PATH";
const CONFIG_PATH_ENV: &str = "RELATRACK_CONFIG_PATH";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static CONFIG: OnceLock<CoreConfig> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Response envelope shared by every relationship call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub ok: bool,
    /// One of `validation_error|not_found|conflict|partial_saga_failure|fatal_error`.
    pub error_kind: Option<String>,
    /// Human-readable diagnostics.
    pub message: String,
    /// JSON payload: the aggregate on success, saga progress on partial failure.
    pub payload_json: Option<String>,
}

impl ApiResponse {
    fn success(message: impl Into<String>, payload: &impl Serialize) -> Self {
        match serde_json::to_string(payload) {
            Ok(payload_json) => Self {
                ok: true,
                error_kind: None,
                message: message.into(),
                payload_json: Some(payload_json),
            },
            Err(err) => Failure::fatal(format!("payload encoding failed: {err}")).into(),
        }
    }
}

/// Flattened failure ready for the envelope.
struct Failure {
    kind: ErrorKind,
    message: String,
    detail: Option<serde_json::Value>,
}

impl Failure {
    fn fatal(message: String) -> Self {
        Self {
            kind: ErrorKind::Fatal,
            message,
            detail: None,
        }
    }
}

impl From<ServiceError> for Failure {
    fn from(value: ServiceError) -> Self {
        Self {
            kind: value.kind(),
            message: value.to_string(),
            detail: None,
        }
    }
}

impl From<RepoError> for Failure {
    fn from(value: RepoError) -> Self {
        ServiceError::from(value).into()
    }
}

impl From<SagaError> for Failure {
    fn from(value: SagaError) -> Self {
        let detail = match &value {
            SagaError::Partial(failure) => Some(json!({
                "saga": failure.saga,
                "completed": failure.completed,
                "failed": failure.failed,
                "area": failure.area,
            })),
            _ => None,
        };
        Self {
            kind: value.kind(),
            message: value.to_string(),
            detail,
        }
    }
}

impl From<Failure> for ApiResponse {
    fn from(value: Failure) -> Self {
        Self {
            ok: false,
            error_kind: Some(value.kind.code().to_string()),
            message: value.message,
            payload_json: value.detail.map(|detail| detail.to_string()),
        }
    }
}

/// Creates a contact.
#[flutter_rust_bridge::frb(sync)]
pub fn contact_create(
    first_name: String,
    last_name: String,
    email: Option<String>,
) -> ApiResponse {
    respond("contact_create", "Contact created.", |conn, _| {
        let directory = SqliteDirectoryRepository::try_new(conn)?;
        let contact = NewContact {
            email,
            ..NewContact::new(first_name, last_name)
        };
        Ok(directory.create_contact(&contact)?)
    })
}

/// Creates a company.
#[flutter_rust_bridge::frb(sync)]
pub fn company_create(name: String) -> ApiResponse {
    respond("company_create", "Company created.", |conn, _| {
        let directory = SqliteDirectoryRepository::try_new(conn)?;
        Ok(directory.create_company(&NewCompany::new(name))?)
    })
}

/// Creates a deal.
#[flutter_rust_bridge::frb(sync)]
pub fn deal_create(name: String) -> ApiResponse {
    respond("deal_create", "Deal created.", |conn, _| {
        let directory = SqliteDirectoryRepository::try_new(conn)?;
        Ok(directory.create_deal(&NewDeal::new(name))?)
    })
}

/// Associates a contact with a company through a new area of activity.
///
/// # FFI contract
/// - Runs stepwise or inside one transaction per `sagaMode`.
/// - A stepwise failure after the area was created returns
///   `partial_saga_failure` with the completed steps in `payload_json`.
#[flutter_rust_bridge::frb(sync)]
pub fn contact_add_area(
    contact_id: i64,
    company_id: i64,
    role: Option<String>,
    job_description: Option<String>,
    is_primary: bool,
) -> ApiResponse {
    let request = AssociateRequest {
        contact_id,
        company_id,
        role,
        job_description,
        is_primary,
    };
    respond("contact_add_area", "Area created.", |conn, config| {
        Ok(associate(conn, config, &request)?)
    })
}

/// Sets or clears the contact's primary company pointer.
#[flutter_rust_bridge::frb(sync)]
pub fn contact_set_primary_company(
    contact_id: i64,
    company_id: Option<i64>,
    expected_version: Option<i64>,
) -> ApiResponse {
    respond(
        "contact_set_primary_company",
        "Contact updated.",
        |conn, config| {
            let coordinator = coordinator(conn, config)?;
            Ok(coordinator.set_contact_primary_company(
                contact_id,
                company_id,
                expected_version,
            )?)
        },
    )
}

/// Returns the contact with all of its areas.
#[flutter_rust_bridge::frb(sync)]
pub fn contact_list_areas(contact_id: i64) -> ApiResponse {
    respond("contact_list_areas", "Areas loaded.", |conn, config| {
        Ok(coordinator(conn, config)?.contact_aggregate(contact_id)?)
    })
}

/// Deletes one area by id.
#[flutter_rust_bridge::frb(sync)]
pub fn area_delete(area_id: i64) -> ApiResponse {
    respond("area_delete", "Area deleted.", |conn, config| {
        coordinator(conn, config)?.delete_area(area_id)?;
        Ok(json!({ "area_id": area_id }))
    })
}

/// Removes the contact's area at the company and cleans designation pointers.
#[flutter_rust_bridge::frb(sync)]
pub fn contact_remove_company(contact_id: i64, company_id: i64) -> ApiResponse {
    respond(
        "contact_remove_company",
        "Contact removed from company.",
        |conn, config| Ok(disassociate(conn, config, contact_id, company_id)?),
    )
}

/// Sets (`Some`) or clears (`None`) the company's primary contact.
#[flutter_rust_bridge::frb(sync)]
pub fn company_set_primary_contact(
    company_id: i64,
    contact_id: Option<i64>,
    expected_version: Option<i64>,
) -> ApiResponse {
    respond(
        "company_set_primary_contact",
        "Primary contact updated.",
        |conn, config| {
            Ok(coordinator(conn, config)?.set_company_primary_contact(
                company_id,
                contact_id,
                expected_version,
            )?)
        },
    )
}

/// Replaces the deal's synergy contacts at one company.
#[flutter_rust_bridge::frb(sync)]
pub fn deal_replace_synergies(
    deal_id: i64,
    company_id: i64,
    contact_ids: Vec<i64>,
) -> ApiResponse {
    respond("deal_replace_synergies", "Synergies replaced.", |conn, config| {
        let service = SynergyService::new(SqliteSynergyRepository::try_new(conn)?, config.synergy);
        Ok(service.replace_deal_synergies(deal_id, company_id, &contact_ids)?)
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn deal_list_synergies(deal_id: i64) -> ApiResponse {
    respond("deal_list_synergies", "Synergies loaded.", |conn, config| {
        let service = SynergyService::new(SqliteSynergyRepository::try_new(conn)?, config.synergy);
        Ok(service.list_by_deal(deal_id)?)
    })
}

/// Hard-deletes a contact with its areas and synergies.
#[flutter_rust_bridge::frb(sync)]
pub fn contact_delete(contact_id: i64) -> ApiResponse {
    respond("contact_delete", "Contact deleted.", |conn, _| {
        Ok(cascade(conn)?.delete_contact(contact_id)?)
    })
}

/// Hard-deletes a company with its areas and synergies.
#[flutter_rust_bridge::frb(sync)]
pub fn company_delete(company_id: i64) -> ApiResponse {
    respond("company_delete", "Company deleted.", |conn, _| {
        Ok(cascade(conn)?.delete_company(company_id)?)
    })
}

/// Hard-deletes a deal with its synergies.
#[flutter_rust_bridge::frb(sync)]
pub fn deal_delete(deal_id: i64) -> ApiResponse {
    respond("deal_delete", "Deal deleted.", |conn, _| {
        Ok(cascade(conn)?.delete_deal(deal_id)?)
    })
}

fn associate(
    conn: &Connection,
    config: &CoreConfig,
    request: &AssociateRequest,
) -> Result<AssociationOutcome, Failure> {
    match config.saga_mode {
        SagaMode::Stepwise => Ok(coordinator(conn, config)?.associate_contact_to_company(request)?),
        SagaMode::Transactional => Ok(run_atomically(conn, config.designation, |coordinator| {
            coordinator.associate_contact_to_company(request)
        })?),
    }
}

fn disassociate(
    conn: &Connection,
    config: &CoreConfig,
    contact_id: ContactId,
    company_id: CompanyId,
) -> Result<DisassociationOutcome, Failure> {
    match config.saga_mode {
        SagaMode::Stepwise => Ok(coordinator(conn, config)?
            .disassociate_contact_from_company(contact_id, company_id)?),
        SagaMode::Transactional => Ok(run_atomically(conn, config.designation, |coordinator| {
            coordinator.disassociate_contact_from_company(contact_id, company_id)
        })?),
    }
}

fn coordinator<'conn>(
    conn: &'conn Connection,
    config: &CoreConfig,
) -> Result<SqliteCoordinator<'conn>, Failure> {
    Ok(ConsistencyCoordinator::new(
        SqliteAreaRepository::try_new(conn)?,
        SqliteDirectoryRepository::try_new(conn)?,
        config.designation,
    ))
}

fn cascade(conn: &Connection) -> Result<CascadeManager<SqliteDirectoryRepository<'_>>, Failure> {
    Ok(CascadeManager::new(SqliteDirectoryRepository::try_new(conn)?))
}

fn respond<T: Serialize>(
    operation: &str,
    success_message: &str,
    f: impl FnOnce(&Connection, &CoreConfig) -> Result<T, Failure>,
) -> ApiResponse {
    let db_path = resolve_db_path();
    let conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => {
            error!("event=ffi_call module=ffi status=error op={operation} error_code=fatal_error stage=db_open");
            return Failure::fatal(format!("{operation} failed: DB open failed: {err}")).into();
        }
    };

    match f(&conn, resolve_config()) {
        Ok(payload) => ApiResponse::success(success_message, &payload),
        Err(failure) => {
            warn!(
                "event=ffi_call module=ffi status=error op={operation} error_code={}",
                failure.kind
            );
            Failure {
                message: format!("{operation} failed: {}", failure.message),
                ..failure
            }
            .into()
        }
    }
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn resolve_config() -> &'static CoreConfig {
    CONFIG.get_or_init(|| {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        load_host_config(path.as_deref())
    })
}

/// Loads the host config file and starts file logging from its `logging`
/// section. Any failure falls back to defaults with a warn line.
fn load_host_config(path: Option<&str>) -> CoreConfig {
    let config = match path.map(str::trim).filter(|path| !path.is_empty()) {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("event=config_load module=ffi status=fallback error={err}");
                CoreConfig::default()
            }
        },
        None => CoreConfig::default(),
    };
    if let Err(err) = init_logging_from_config(&config.logging) {
        warn!("event=logging_init module=ffi status=error error={err}");
    }
    config
}
