//! Core domain logic for RelaTrack.
//! This crate is the single source of truth for relationship invariants
//! between contacts, companies, areas of activity and deal synergies.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{load_config, ConfigError, CoreConfig, SagaMode};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::area::{Area, AreaPatch, NewArea};
pub use model::directory::{Company, Contact, Deal, NewCompany, NewContact, NewDeal};
pub use model::synergy::{Synergy, SynergyPatch};
pub use model::{AreaId, CompanyId, ContactId, DealId, EntityRef, SynergyId, ValidationError};
pub use repo::area_repo::{AreaRepository, SqliteAreaRepository};
pub use repo::directory_repo::{CascadeReport, DirectoryRepository, SqliteDirectoryRepository};
pub use repo::synergy_repo::{SqliteSynergyRepository, SynergyReplacement, SynergyRepository};
pub use repo::{ConflictReason, RepoError, RepoResult};
pub use service::{
    run_atomically, AssociateRequest, CascadeManager, ConsistencyCoordinator, ErrorKind,
    PrimaryDesignationService, SagaError, ServiceError, SynergyService,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
