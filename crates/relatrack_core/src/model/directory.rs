//! Identity entities: contacts, companies and deals.
//!
//! # Invariants
//! - `Contact::primary_company_id` is a denormalized pointer kept in step
//!   with the contact's primary area by the coordinator, not by storage.
//! - `Company::primary_contact_id` is independent of any area primary flag.
//! - `version` starts at 1 and increases on every persisted write.

use super::{ensure_valid_id, CompanyId, ContactId, DealId, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub primary_company_id: Option<CompanyId>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub primary_contact_id: Option<ContactId>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub name: String,
}

/// Insert model for contacts.
///
/// `id = None` lets storage assign the row id; import paths pass an
/// explicit id through [`NewContact::with_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub id: Option<ContactId>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

impl NewContact {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
        }
    }

    pub fn with_id(
        id: ContactId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id),
            ..Self::new(first_name, last_name)
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = self.id {
            ensure_valid_id("contact_id", id)?;
        }
        if self.first_name.trim().is_empty() {
            return Err(ValidationError::BlankField("first_name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompany {
    pub id: Option<CompanyId>,
    pub name: String,
}

impl NewCompany {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_id(id: CompanyId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = self.id {
            ensure_valid_id("company_id", id)?;
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankField("company name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeal {
    pub id: Option<DealId>,
    pub name: String,
}

impl NewDeal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_id(id: DealId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = self.id {
            ensure_valid_id("deal_id", id)?;
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankField("deal name"));
        }
        Ok(())
    }
}
