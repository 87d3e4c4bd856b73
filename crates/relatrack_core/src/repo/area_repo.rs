//! Area-of-activity store: persistence of the contact↔company association.
//!
//! # Responsibility
//! - Low-level CRUD over `areas_of_activity`.
//! - Provide the two storage steps of primary designation
//!   (`clear_primary_except`, `mark_primary`).
//!
//! # Invariants
//! - Creating an area requires an existing contact and company.
//! - No write leaves a contact with two primary areas; a competing primary
//!   is reported as a conflict rather than overwritten.
//! - This store never touches `contacts.primary_company_id` or
//!   `companies.primary_contact_id`; the coordinator owns those.

use crate::model::area::{Area, AreaPatch, NewArea};
use crate::model::{AreaId, CompanyId, ContactId, EntityRef, ValidationError};
use crate::repo::{
    bool_to_int, ensure_connection_ready, ensure_exists, explain_missed_write, parse_flag,
    with_write_tx, ConflictReason, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const AREA_SELECT_SQL: &str = "SELECT
    id,
    contact_id,
    company_id,
    role,
    job_description,
    is_primary,
    version
FROM areas_of_activity";

/// Repository interface for area CRUD and primary flag steps.
pub trait AreaRepository {
    fn create_area(&self, area: &NewArea) -> RepoResult<Area>;
    fn get_area(&self, id: AreaId) -> RepoResult<Option<Area>>;
    fn update_area(&self, id: AreaId, patch: &AreaPatch) -> RepoResult<Area>;
    /// Pure delete; primary pointers on contact/company are left as-is.
    fn delete_area(&self, id: AreaId) -> RepoResult<()>;
    /// Areas of one contact ordered by id.
    fn list_by_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Area>>;
    /// Areas at one company ordered by id.
    fn list_by_company(&self, company_id: CompanyId) -> RepoResult<Vec<Area>>;
    /// Clears the primary flag on every area of `contact_id` except `keep`.
    ///
    /// Returns the number of areas demoted.
    fn clear_primary_except(&self, contact_id: ContactId, keep: AreaId) -> RepoResult<usize>;
    /// Makes `area_id` the single primary area of `contact_id`.
    fn mark_primary(&self, contact_id: ContactId, area_id: AreaId) -> RepoResult<Area>;
}

impl<T: AreaRepository + ?Sized> AreaRepository for &T {
    fn create_area(&self, area: &NewArea) -> RepoResult<Area> {
        (**self).create_area(area)
    }

    fn get_area(&self, id: AreaId) -> RepoResult<Option<Area>> {
        (**self).get_area(id)
    }

    fn update_area(&self, id: AreaId, patch: &AreaPatch) -> RepoResult<Area> {
        (**self).update_area(id, patch)
    }

    fn delete_area(&self, id: AreaId) -> RepoResult<()> {
        (**self).delete_area(id)
    }

    fn list_by_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Area>> {
        (**self).list_by_contact(contact_id)
    }

    fn list_by_company(&self, company_id: CompanyId) -> RepoResult<Vec<Area>> {
        (**self).list_by_company(company_id)
    }

    fn clear_primary_except(&self, contact_id: ContactId, keep: AreaId) -> RepoResult<usize> {
        (**self).clear_primary_except(contact_id, keep)
    }

    fn mark_primary(&self, contact_id: ContactId, area_id: AreaId) -> RepoResult<Area> {
        (**self).mark_primary(contact_id, area_id)
    }
}

/// SQLite-backed area store.
#[derive(Clone, Copy)]
pub struct SqliteAreaRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAreaRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["areas_of_activity", "contacts", "companies"])?;
        Ok(Self { conn })
    }
}

impl AreaRepository for SqliteAreaRepository<'_> {
    fn create_area(&self, area: &NewArea) -> RepoResult<Area> {
        area.validate()?;
        let area = area.normalized();

        with_write_tx(self.conn, |conn| {
            ensure_exists(conn, EntityRef::Contact(area.contact_id))?;
            ensure_exists(conn, EntityRef::Company(area.company_id))?;
            if area.is_primary {
                ensure_no_other_primary(conn, area.contact_id, None)?;
            }

            conn.execute(
                "INSERT INTO areas_of_activity (
                    contact_id,
                    company_id,
                    role,
                    job_description,
                    is_primary
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    area.contact_id,
                    area.company_id,
                    area.role.as_deref(),
                    area.job_description.as_deref(),
                    bool_to_int(area.is_primary),
                ],
            )?;
            load_required_area(conn, conn.last_insert_rowid())
        })
    }

    fn get_area(&self, id: AreaId) -> RepoResult<Option<Area>> {
        load_area(self.conn, id)
    }

    fn update_area(&self, id: AreaId, patch: &AreaPatch) -> RepoResult<Area> {
        with_write_tx(self.conn, |conn| {
            let current = load_required_area(conn, id)?;
            if let Some(expected) = patch.expected_version {
                if expected != current.version {
                    return Err(RepoError::Conflict(ConflictReason::StaleVersion {
                        entity: EntityRef::Area(id),
                        expected,
                        actual: current.version,
                    }));
                }
            }
            if patch.is_empty() {
                return Ok(current);
            }

            let next = patch.apply_to(&current);
            if next.is_primary && !current.is_primary {
                ensure_no_other_primary(conn, current.contact_id, Some(id))?;
            }

            let changed = conn.execute(
                "UPDATE areas_of_activity
                 SET role = ?2,
                     job_description = ?3,
                     is_primary = ?4,
                     version = version + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND version = ?5;",
                params![
                    id,
                    next.role.as_deref(),
                    next.job_description.as_deref(),
                    bool_to_int(next.is_primary),
                    current.version,
                ],
            )?;
            if changed == 0 {
                return Err(explain_missed_write(
                    conn,
                    EntityRef::Area(id),
                    Some(current.version),
                ));
            }
            load_required_area(conn, id)
        })
    }

    fn delete_area(&self, id: AreaId) -> RepoResult<()> {
        with_write_tx(self.conn, |conn| {
            let changed = conn.execute("DELETE FROM areas_of_activity WHERE id = ?1;", [id])?;
            if changed == 0 {
                return Err(RepoError::NotFound(EntityRef::Area(id)));
            }
            Ok(())
        })
    }

    fn list_by_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Area>> {
        list_areas(
            self.conn,
            &format!("{AREA_SELECT_SQL} WHERE contact_id = ?1 ORDER BY id ASC;"),
            contact_id,
        )
    }

    fn list_by_company(&self, company_id: CompanyId) -> RepoResult<Vec<Area>> {
        list_areas(
            self.conn,
            &format!("{AREA_SELECT_SQL} WHERE company_id = ?1 ORDER BY id ASC;"),
            company_id,
        )
    }

    fn clear_primary_except(&self, contact_id: ContactId, keep: AreaId) -> RepoResult<usize> {
        with_write_tx(self.conn, |conn| demote_primaries(conn, contact_id, keep))
    }

    fn mark_primary(&self, contact_id: ContactId, area_id: AreaId) -> RepoResult<Area> {
        with_write_tx(self.conn, |conn| {
            let area = load_required_area(conn, area_id)?;
            if area.contact_id != contact_id {
                return Err(RepoError::Validation(ValidationError::AreaOwnerMismatch {
                    area_id,
                    expected_contact_id: contact_id,
                    actual_contact_id: area.contact_id,
                }));
            }

            // Demote first: the partial unique index allows one primary per contact.
            demote_primaries(conn, contact_id, area_id)?;
            if !area.is_primary {
                conn.execute(
                    "UPDATE areas_of_activity
                     SET is_primary = 1,
                         version = version + 1,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?1;",
                    [area_id],
                )?;
            }
            load_required_area(conn, area_id)
        })
    }
}

fn demote_primaries(conn: &Connection, contact_id: ContactId, keep: AreaId) -> RepoResult<usize> {
    let demoted = conn.execute(
        "UPDATE areas_of_activity
         SET is_primary = 0,
             version = version + 1,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE contact_id = ?1
           AND id <> ?2
           AND is_primary = 1;",
        params![contact_id, keep],
    )?;
    Ok(demoted)
}

fn ensure_no_other_primary(
    conn: &Connection,
    contact_id: ContactId,
    except: Option<AreaId>,
) -> RepoResult<()> {
    let existing: Option<AreaId> = conn
        .query_row(
            "SELECT id
             FROM areas_of_activity
             WHERE contact_id = ?1
               AND is_primary = 1
               AND (?2 IS NULL OR id <> ?2)
             LIMIT 1;",
            params![contact_id, except],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(area_id) => Err(RepoError::Conflict(ConflictReason::PrimaryAreaTaken {
            contact_id,
            area_id,
        })),
        None => Ok(()),
    }
}

fn load_area(conn: &Connection, id: AreaId) -> RepoResult<Option<Area>> {
    let mut stmt = conn.prepare(&format!("{AREA_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_area_row(row)?));
    }
    Ok(None)
}

fn load_required_area(conn: &Connection, id: AreaId) -> RepoResult<Area> {
    load_area(conn, id)?.ok_or(RepoError::NotFound(EntityRef::Area(id)))
}

fn list_areas(conn: &Connection, sql: &str, key: i64) -> RepoResult<Vec<Area>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([key])?;
    let mut areas = Vec::new();
    while let Some(row) = rows.next()? {
        areas.push(parse_area_row(row)?);
    }
    Ok(areas)
}

fn parse_area_row(row: &Row<'_>) -> RepoResult<Area> {
    Ok(Area {
        id: row.get("id")?,
        contact_id: row.get("contact_id")?,
        company_id: row.get("company_id")?,
        role: row.get("role")?,
        job_description: row.get("job_description")?,
        is_primary: parse_flag(row.get("is_primary")?, "areas_of_activity.is_primary")?,
        version: row.get("version")?,
    })
}
