//! Contact, company and deal persistence.
//!
//! # Responsibility
//! - CRUD for the identity entities referenced by areas and synergies.
//! - Own the two primary pointers (`contacts.primary_company_id`,
//!   `companies.primary_contact_id`) and their versioned writes.
//! - Perform hard deletes and report what the foreign-key cascade removed.
//!
//! # Invariants
//! - Deleting a contact, company or deal removes dependent areas and
//!   synergies through `ON DELETE CASCADE`; primary pointers referencing the
//!   deleted row are nulled through `ON DELETE SET NULL`.
//! - Setting a primary pointer never touches `areas_of_activity`.

use crate::model::directory::{Company, Contact, Deal, NewCompany, NewContact, NewDeal};
use crate::model::{normalize_optional_text, CompanyId, ContactId, DealId, EntityRef};
use crate::repo::{
    ensure_connection_ready, ensure_exists, explain_missed_write, with_write_tx, RepoError,
    RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    first_name,
    last_name,
    email,
    primary_company_id,
    version
FROM contacts";

const COMPANY_SELECT_SQL: &str = "SELECT
    id,
    name,
    primary_contact_id,
    version
FROM companies";

/// Rows removed or rewritten by one cascading hard delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub target: Option<EntityRef>,
    pub areas_removed: usize,
    pub synergies_removed: usize,
    /// Primary pointers on other rows nulled by the delete.
    pub primary_pointers_cleared: usize,
}

/// Repository interface for identity entities.
pub trait DirectoryRepository {
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact>;
    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;
    /// Sets or clears the denormalized primary company pointer.
    fn set_contact_primary_company(
        &self,
        id: ContactId,
        company_id: Option<CompanyId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Contact>;
    fn delete_contact(&self, id: ContactId) -> RepoResult<CascadeReport>;

    fn create_company(&self, company: &NewCompany) -> RepoResult<Company>;
    fn get_company(&self, id: CompanyId) -> RepoResult<Option<Company>>;
    /// Sets or clears the company's primary contact designation.
    fn set_company_primary_contact(
        &self,
        id: CompanyId,
        contact_id: Option<ContactId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Company>;
    fn delete_company(&self, id: CompanyId) -> RepoResult<CascadeReport>;

    fn create_deal(&self, deal: &NewDeal) -> RepoResult<Deal>;
    fn get_deal(&self, id: DealId) -> RepoResult<Option<Deal>>;
    fn delete_deal(&self, id: DealId) -> RepoResult<CascadeReport>;
}

impl<T: DirectoryRepository + ?Sized> DirectoryRepository for &T {
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        (**self).create_contact(contact)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        (**self).get_contact(id)
    }

    fn set_contact_primary_company(
        &self,
        id: ContactId,
        company_id: Option<CompanyId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Contact> {
        (**self).set_contact_primary_company(id, company_id, expected_version)
    }

    fn delete_contact(&self, id: ContactId) -> RepoResult<CascadeReport> {
        (**self).delete_contact(id)
    }

    fn create_company(&self, company: &NewCompany) -> RepoResult<Company> {
        (**self).create_company(company)
    }

    fn get_company(&self, id: CompanyId) -> RepoResult<Option<Company>> {
        (**self).get_company(id)
    }

    fn set_company_primary_contact(
        &self,
        id: CompanyId,
        contact_id: Option<ContactId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Company> {
        (**self).set_company_primary_contact(id, contact_id, expected_version)
    }

    fn delete_company(&self, id: CompanyId) -> RepoResult<CascadeReport> {
        (**self).delete_company(id)
    }

    fn create_deal(&self, deal: &NewDeal) -> RepoResult<Deal> {
        (**self).create_deal(deal)
    }

    fn get_deal(&self, id: DealId) -> RepoResult<Option<Deal>> {
        (**self).get_deal(id)
    }

    fn delete_deal(&self, id: DealId) -> RepoResult<CascadeReport> {
        (**self).delete_deal(id)
    }
}

/// SQLite-backed directory repository.
#[derive(Clone, Copy)]
pub struct SqliteDirectoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDirectoryRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["contacts", "companies", "deals"])?;
        Ok(Self { conn })
    }
}

impl DirectoryRepository for SqliteDirectoryRepository<'_> {
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;
        self.conn.execute(
            "INSERT INTO contacts (id, first_name, last_name, email)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                contact.id,
                contact.first_name.trim(),
                contact.last_name.trim(),
                normalize_optional_text(contact.email.clone()),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        load_contact(self.conn, id)?.ok_or(RepoError::NotFound(EntityRef::Contact(id)))
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        load_contact(self.conn, id)
    }

    fn set_contact_primary_company(
        &self,
        id: ContactId,
        company_id: Option<CompanyId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Contact> {
        with_write_tx(self.conn, |conn| {
            if let Some(company_id) = company_id {
                ensure_exists(conn, EntityRef::Company(company_id))?;
            }
            let changed = conn.execute(
                "UPDATE contacts
                 SET primary_company_id = ?2,
                     version = version + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND (?3 IS NULL OR version = ?3);",
                params![id, company_id, expected_version],
            )?;
            if changed == 0 {
                return Err(explain_missed_write(
                    conn,
                    EntityRef::Contact(id),
                    expected_version,
                ));
            }
            load_contact(conn, id)?.ok_or(RepoError::NotFound(EntityRef::Contact(id)))
        })
    }

    fn delete_contact(&self, id: ContactId) -> RepoResult<CascadeReport> {
        with_write_tx(self.conn, |conn| {
            ensure_exists(conn, EntityRef::Contact(id))?;
            let report = CascadeReport {
                target: Some(EntityRef::Contact(id)),
                areas_removed: count(
                    conn,
                    "SELECT COUNT(*) FROM areas_of_activity WHERE contact_id = ?1;",
                    id,
                )?,
                synergies_removed: count(
                    conn,
                    "SELECT COUNT(*) FROM synergies WHERE contact_id = ?1;",
                    id,
                )?,
                primary_pointers_cleared: count(
                    conn,
                    "SELECT COUNT(*) FROM companies WHERE primary_contact_id = ?1;",
                    id,
                )?,
            };
            conn.execute("DELETE FROM contacts WHERE id = ?1;", [id])?;
            Ok(report)
        })
    }

    fn create_company(&self, company: &NewCompany) -> RepoResult<Company> {
        company.validate()?;
        self.conn.execute(
            "INSERT INTO companies (id, name) VALUES (?1, ?2);",
            params![company.id, company.name.trim()],
        )?;
        let id = self.conn.last_insert_rowid();
        load_company(self.conn, id)?.ok_or(RepoError::NotFound(EntityRef::Company(id)))
    }

    fn get_company(&self, id: CompanyId) -> RepoResult<Option<Company>> {
        load_company(self.conn, id)
    }

    fn set_company_primary_contact(
        &self,
        id: CompanyId,
        contact_id: Option<ContactId>,
        expected_version: Option<i64>,
    ) -> RepoResult<Company> {
        with_write_tx(self.conn, |conn| {
            if let Some(contact_id) = contact_id {
                ensure_exists(conn, EntityRef::Contact(contact_id))?;
            }
            let changed = conn.execute(
                "UPDATE companies
                 SET primary_contact_id = ?2,
                     version = version + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND (?3 IS NULL OR version = ?3);",
                params![id, contact_id, expected_version],
            )?;
            if changed == 0 {
                return Err(explain_missed_write(
                    conn,
                    EntityRef::Company(id),
                    expected_version,
                ));
            }
            load_company(conn, id)?.ok_or(RepoError::NotFound(EntityRef::Company(id)))
        })
    }

    fn delete_company(&self, id: CompanyId) -> RepoResult<CascadeReport> {
        with_write_tx(self.conn, |conn| {
            ensure_exists(conn, EntityRef::Company(id))?;
            let report = CascadeReport {
                target: Some(EntityRef::Company(id)),
                areas_removed: count(
                    conn,
                    "SELECT COUNT(*) FROM areas_of_activity WHERE company_id = ?1;",
                    id,
                )?,
                synergies_removed: count(
                    conn,
                    "SELECT COUNT(*) FROM synergies WHERE company_id = ?1;",
                    id,
                )?,
                primary_pointers_cleared: count(
                    conn,
                    "SELECT COUNT(*) FROM contacts WHERE primary_company_id = ?1;",
                    id,
                )?,
            };
            conn.execute("DELETE FROM companies WHERE id = ?1;", [id])?;
            Ok(report)
        })
    }

    fn create_deal(&self, deal: &NewDeal) -> RepoResult<Deal> {
        deal.validate()?;
        self.conn.execute(
            "INSERT INTO deals (id, name) VALUES (?1, ?2);",
            params![deal.id, deal.name.trim()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_deal(id)?
            .ok_or(RepoError::NotFound(EntityRef::Deal(id)))
    }

    fn get_deal(&self, id: DealId) -> RepoResult<Option<Deal>> {
        let deal = self
            .conn
            .query_row(
                "SELECT id, name FROM deals WHERE id = ?1;",
                [id],
                |row| {
                    Ok(Deal {
                        id: row.get("id")?,
                        name: row.get("name")?,
                    })
                },
            )
            .optional()?;
        Ok(deal)
    }

    fn delete_deal(&self, id: DealId) -> RepoResult<CascadeReport> {
        with_write_tx(self.conn, |conn| {
            ensure_exists(conn, EntityRef::Deal(id))?;
            let report = CascadeReport {
                target: Some(EntityRef::Deal(id)),
                areas_removed: 0,
                synergies_removed: count(
                    conn,
                    "SELECT COUNT(*) FROM synergies WHERE deal_id = ?1;",
                    id,
                )?,
                primary_pointers_cleared: 0,
            };
            conn.execute("DELETE FROM deals WHERE id = ?1;", [id])?;
            Ok(report)
        })
    }
}

pub(crate) fn load_contact(conn: &Connection, id: ContactId) -> RepoResult<Option<Contact>> {
    let mut stmt = conn.prepare(&format!("{CONTACT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_contact_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_company(conn: &Connection, id: CompanyId) -> RepoResult<Option<Company>> {
    let mut stmt = conn.prepare(&format!("{COMPANY_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_company_row(row)?));
    }
    Ok(None)
}

pub(crate) fn existing_contact_ids(
    conn: &Connection,
    ids: &[ContactId],
) -> RepoResult<BTreeSet<ContactId>> {
    let mut found = BTreeSet::new();
    let mut stmt = conn.prepare("SELECT EXISTS(SELECT 1 FROM contacts WHERE id = ?1);")?;
    for id in ids {
        let exists: i64 = stmt.query_row([id], |row| row.get(0))?;
        if exists == 1 {
            found.insert(*id);
        }
    }
    Ok(found)
}

fn count(conn: &Connection, sql: &str, id: i64) -> RepoResult<usize> {
    let value: i64 = conn.query_row(sql, [id], |row| row.get(0))?;
    usize::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative row count `{value}`")))
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    Ok(Contact {
        id: row.get("id")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        email: row.get("email")?,
        primary_company_id: row.get("primary_company_id")?,
        version: row.get("version")?,
    })
}

fn parse_company_row(row: &Row<'_>) -> RepoResult<Company> {
    Ok(Company {
        id: row.get("id")?,
        name: row.get("name")?,
        primary_contact_id: row.get("primary_contact_id")?,
        version: row.get("version")?,
    })
}
