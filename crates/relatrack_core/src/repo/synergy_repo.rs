//! Synergy persistence with set-replace semantics.
//!
//! # Responsibility
//! - Store the ternary contact/company/deal relationship.
//! - Own `replace_deal_synergies`: the full-replace write that diffs the
//!   requested contact set against storage.
//!
//! # Invariants
//! - Replacement runs in one immediate transaction; re-running it with the
//!   same input changes nothing and keeps synergy ids stable.
//! - Existence checks run before the employee check, and both run inside the
//!   replacement transaction.
//! - Synergies for contacts kept in the set are never rewritten.
//! - `(deal_id, contact_id)` is unique, so concurrent replacements cannot
//!   duplicate a row.

use crate::config::SynergyExclusivity;
use crate::model::synergy::{Synergy, SynergyPatch};
use crate::model::{
    ensure_valid_id, CompanyId, ContactId, DealId, EntityRef, SynergyId, ValidationError,
};
use crate::repo::directory_repo::existing_contact_ids;
use crate::repo::{
    ensure_connection_ready, ensure_exists, with_write_tx, ConflictReason, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;

const SYNERGY_SELECT_SQL: &str = "SELECT
    id,
    contact_id,
    company_id,
    deal_id,
    type,
    status,
    description,
    start_date,
    end_date
FROM synergies";

/// Outcome of one full-replace call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynergyReplacement {
    /// Every synergy of the deal after the replace, ordered by id.
    pub synergies: Vec<Synergy>,
    /// Contacts that gained a synergy in this call.
    pub created: Vec<ContactId>,
    /// Contacts whose synergy was removed in this call.
    pub removed: Vec<ContactId>,
    /// Requested contacts that hold an area at the company.
    pub employees: Vec<ContactId>,
}

impl SynergyReplacement {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }
}

/// Repository interface for synergy storage.
pub trait SynergyRepository {
    fn get_synergy(&self, id: SynergyId) -> RepoResult<Option<Synergy>>;
    fn list_by_deal(&self, deal_id: DealId) -> RepoResult<Vec<Synergy>>;
    fn list_by_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Synergy>>;
    fn list_by_company(&self, company_id: CompanyId) -> RepoResult<Vec<Synergy>>;
    /// Replaces the contact set holding a synergy on `deal_id`.
    ///
    /// Under [`SynergyExclusivity::Enforced`] a requested contact holding an
    /// area at `company_id` fails the call with a conflict and nothing is
    /// written.
    fn replace_deal_synergies(
        &self,
        deal_id: DealId,
        company_id: CompanyId,
        contact_ids: &[ContactId],
        exclusivity: SynergyExclusivity,
    ) -> RepoResult<SynergyReplacement>;
    fn update_synergy(&self, id: SynergyId, patch: &SynergyPatch) -> RepoResult<Synergy>;
    fn delete_synergy(&self, id: SynergyId) -> RepoResult<()>;
}

impl<T: SynergyRepository + ?Sized> SynergyRepository for &T {
    fn get_synergy(&self, id: SynergyId) -> RepoResult<Option<Synergy>> {
        (**self).get_synergy(id)
    }

    fn list_by_deal(&self, deal_id: DealId) -> RepoResult<Vec<Synergy>> {
        (**self).list_by_deal(deal_id)
    }

    fn list_by_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Synergy>> {
        (**self).list_by_contact(contact_id)
    }

    fn list_by_company(&self, company_id: CompanyId) -> RepoResult<Vec<Synergy>> {
        (**self).list_by_company(company_id)
    }

    fn replace_deal_synergies(
        &self,
        deal_id: DealId,
        company_id: CompanyId,
        contact_ids: &[ContactId],
        exclusivity: SynergyExclusivity,
    ) -> RepoResult<SynergyReplacement> {
        (**self).replace_deal_synergies(deal_id, company_id, contact_ids, exclusivity)
    }

    fn update_synergy(&self, id: SynergyId, patch: &SynergyPatch) -> RepoResult<Synergy> {
        (**self).update_synergy(id, patch)
    }

    fn delete_synergy(&self, id: SynergyId) -> RepoResult<()> {
        (**self).delete_synergy(id)
    }
}

/// SQLite-backed synergy repository.
#[derive(Clone, Copy)]
pub struct SqliteSynergyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSynergyRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["synergies", "deals", "contacts", "companies"])?;
        Ok(Self { conn })
    }
}

impl SynergyRepository for SqliteSynergyRepository<'_> {
    fn get_synergy(&self, id: SynergyId) -> RepoResult<Option<Synergy>> {
        load_synergy(self.conn, id)
    }

    fn list_by_deal(&self, deal_id: DealId) -> RepoResult<Vec<Synergy>> {
        list_synergies(self.conn, "deal_id", deal_id)
    }

    fn list_by_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Synergy>> {
        list_synergies(self.conn, "contact_id", contact_id)
    }

    fn list_by_company(&self, company_id: CompanyId) -> RepoResult<Vec<Synergy>> {
        list_synergies(self.conn, "company_id", company_id)
    }

    fn replace_deal_synergies(
        &self,
        deal_id: DealId,
        company_id: CompanyId,
        contact_ids: &[ContactId],
        exclusivity: SynergyExclusivity,
    ) -> RepoResult<SynergyReplacement> {
        let desired = normalize_contact_ids(contact_ids)?;

        with_write_tx(self.conn, |conn| {
            ensure_exists(conn, EntityRef::Deal(deal_id))?;
            ensure_exists(conn, EntityRef::Company(company_id))?;

            let requested: Vec<ContactId> = desired.iter().copied().collect();
            let known = existing_contact_ids(conn, &requested)?;
            if let Some(unknown) = desired.difference(&known).next() {
                return Err(RepoError::Validation(ValidationError::UnknownContact(
                    *unknown,
                )));
            }

            let employees = employee_contact_ids(conn, company_id, &desired)?;
            if exclusivity == SynergyExclusivity::Enforced && !employees.is_empty() {
                return Err(RepoError::Conflict(
                    ConflictReason::SynergyContactIsEmployee {
                        company_id,
                        contact_ids: employees,
                    },
                ));
            }

            let current = deal_contact_ids(conn, deal_id)?;
            let removed: Vec<ContactId> = current.difference(&desired).copied().collect();
            let created: Vec<ContactId> = desired.difference(&current).copied().collect();

            for contact_id in &removed {
                conn.execute(
                    "DELETE FROM synergies WHERE deal_id = ?1 AND contact_id = ?2;",
                    params![deal_id, contact_id],
                )?;
            }
            for contact_id in &created {
                conn.execute(
                    "INSERT OR IGNORE INTO synergies (contact_id, company_id, deal_id)
                     VALUES (?1, ?2, ?3);",
                    params![contact_id, company_id, deal_id],
                )?;
            }

            Ok(SynergyReplacement {
                synergies: list_synergies(conn, "deal_id", deal_id)?,
                created,
                removed,
                employees,
            })
        })
    }

    fn update_synergy(&self, id: SynergyId, patch: &SynergyPatch) -> RepoResult<Synergy> {
        with_write_tx(self.conn, |conn| {
            let current =
                load_synergy(conn, id)?.ok_or(RepoError::NotFound(EntityRef::Synergy(id)))?;
            let next = patch.apply_to(&current)?;
            conn.execute(
                "UPDATE synergies
                 SET type = ?2,
                     status = ?3,
                     description = ?4,
                     start_date = ?5,
                     end_date = ?6,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    id,
                    next.kind.as_deref(),
                    next.status.as_deref(),
                    next.description.as_deref(),
                    next.start_date,
                    next.end_date,
                ],
            )?;
            load_synergy(conn, id)?.ok_or(RepoError::NotFound(EntityRef::Synergy(id)))
        })
    }

    fn delete_synergy(&self, id: SynergyId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM synergies WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Synergy(id)));
        }
        Ok(())
    }
}

fn normalize_contact_ids(contact_ids: &[ContactId]) -> RepoResult<BTreeSet<ContactId>> {
    let mut unique = BTreeSet::new();
    for contact_id in contact_ids {
        ensure_valid_id("contact_id", *contact_id)?;
        unique.insert(*contact_id);
    }
    Ok(unique)
}

fn employee_contact_ids(
    conn: &Connection,
    company_id: CompanyId,
    contact_ids: &BTreeSet<ContactId>,
) -> RepoResult<Vec<ContactId>> {
    let mut stmt = conn.prepare(
        "SELECT EXISTS(
            SELECT 1
            FROM areas_of_activity
            WHERE company_id = ?1
              AND contact_id = ?2
        );",
    )?;
    let mut employees = Vec::new();
    for contact_id in contact_ids {
        let exists: i64 = stmt.query_row(params![company_id, contact_id], |row| row.get(0))?;
        if exists == 1 {
            employees.push(*contact_id);
        }
    }
    Ok(employees)
}

fn deal_contact_ids(conn: &Connection, deal_id: DealId) -> RepoResult<BTreeSet<ContactId>> {
    let mut stmt = conn.prepare("SELECT contact_id FROM synergies WHERE deal_id = ?1;")?;
    let mut rows = stmt.query([deal_id])?;
    let mut ids = BTreeSet::new();
    while let Some(row) = rows.next()? {
        ids.insert(row.get::<_, ContactId>(0)?);
    }
    Ok(ids)
}

fn load_synergy(conn: &Connection, id: SynergyId) -> RepoResult<Option<Synergy>> {
    let mut stmt = conn.prepare(&format!("{SYNERGY_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_synergy_row(row)?));
    }
    Ok(None)
}

fn list_synergies(
    conn: &Connection,
    key_column: &'static str,
    key: i64,
) -> RepoResult<Vec<Synergy>> {
    let mut stmt = conn.prepare(&format!(
        "{SYNERGY_SELECT_SQL} WHERE {key_column} = ?1 ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([key])?;
    let mut synergies = Vec::new();
    while let Some(row) = rows.next()? {
        synergies.push(parse_synergy_row(row)?);
    }
    Ok(synergies)
}

fn parse_synergy_row(row: &Row<'_>) -> RepoResult<Synergy> {
    let synergy = Synergy {
        id: row.get("id")?,
        contact_id: row.get("contact_id")?,
        company_id: row.get("company_id")?,
        deal_id: row.get("deal_id")?,
        kind: row.get("type")?,
        status: row.get("status")?,
        description: row.get("description")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
    };
    synergy.validate().map_err(|err| {
        RepoError::InvalidData(format!("synergy {} has {err}", synergy.id))
    })?;
    Ok(synergy)
}
