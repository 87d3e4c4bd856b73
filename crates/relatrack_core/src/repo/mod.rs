//! Repository contracts and SQLite implementations.
//!
//! # Responsibility
//! - Keep SQL inside the persistence boundary.
//! - Translate storage outcomes into semantic errors (`NotFound`,
//!   `Conflict`, `Validation`) in addition to transport errors.
//!
//! # Invariants
//! - Every multi-statement write runs in one immediate transaction, or joins
//!   the caller's transaction when one is already open.
//! - Repositories only accept connections migrated to the latest schema.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::{AreaId, CompanyId, ContactId, EntityRef, ValidationError};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod area_repo;
pub mod directory_repo;
pub mod synergy_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Why a write was refused although every referenced row exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Caller's `expected_version` does not match storage.
    StaleVersion {
        entity: EntityRef,
        expected: i64,
        actual: i64,
    },
    /// Another area already holds the contact's primary flag.
    PrimaryAreaTaken {
        contact_id: ContactId,
        area_id: AreaId,
    },
    /// Designated primary contact has no area at the company.
    ContactNotAtCompany {
        contact_id: ContactId,
        company_id: CompanyId,
    },
    /// Synergy contacts already hold an area at the deal's company.
    SynergyContactIsEmployee {
        company_id: CompanyId,
        contact_ids: Vec<ContactId>,
    },
}

impl Display for ConflictReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleVersion {
                entity,
                expected,
                actual,
            } => write!(
                f,
                "stale write on {entity}: expected version {expected}, found {actual}"
            ),
            Self::PrimaryAreaTaken {
                contact_id,
                area_id,
            } => write!(
                f,
                "contact {contact_id} already has primary area {area_id}"
            ),
            Self::ContactNotAtCompany {
                contact_id,
                company_id,
            } => write!(
                f,
                "contact {contact_id} has no area of activity at company {company_id}"
            ),
            Self::SynergyContactIsEmployee {
                company_id,
                contact_ids,
            } => write!(
                f,
                "contacts {contact_ids:?} already have an area at company {company_id}"
            ),
        }
    }
}

#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    NotFound(EntityRef),
    Conflict(ConflictReason),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Conflict(reason) => write!(f, "{reason}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Runs `f` in an immediate transaction, or inline when the connection is
/// already inside one.
pub(crate) fn with_write_tx<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> RepoResult<T>,
) -> RepoResult<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

pub(crate) fn table_for(entity: &EntityRef) -> &'static str {
    match entity {
        EntityRef::Contact(_) => "contacts",
        EntityRef::Company(_) => "companies",
        EntityRef::Deal(_) => "deals",
        EntityRef::Area(_) => "areas_of_activity",
        EntityRef::Synergy(_) => "synergies",
    }
}

pub(crate) fn entity_exists(conn: &Connection, entity: EntityRef) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1);",
            table_for(&entity)
        ),
        [entity.id()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn ensure_exists(conn: &Connection, entity: EntityRef) -> RepoResult<()> {
    if entity_exists(conn, entity)? {
        Ok(())
    } else {
        Err(RepoError::NotFound(entity))
    }
}

/// Explains why a versioned `UPDATE` touched no row.
///
/// Only called after a zero-row update; a present row means the version
/// guard rejected the write.
pub(crate) fn explain_missed_write(
    conn: &Connection,
    entity: EntityRef,
    expected_version: Option<i64>,
) -> RepoError {
    let actual: Option<i64> = match conn
        .query_row(
            &format!(
                "SELECT version FROM {} WHERE id = ?1;",
                table_for(&entity)
            ),
            [entity.id()],
            |row| row.get(0),
        )
        .optional()
    {
        Ok(value) => value,
        Err(err) => return err.into(),
    };

    match (actual, expected_version) {
        (Some(actual), Some(expected)) => RepoError::Conflict(ConflictReason::StaleVersion {
            entity,
            expected,
            actual,
        }),
        _ => RepoError::NotFound(entity),
    }
}

pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
