//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep FFI layers decoupled from storage details.
//! - Map storage failures onto the caller-facing [`error::ErrorKind`].

pub mod cascade;
pub mod coordinator;
pub mod designation_service;
pub mod error;
pub mod synergy_service;

pub use cascade::CascadeManager;
pub use coordinator::{
    run_atomically, AssociateRequest, AssociationOutcome, CompanyAggregate, ConsistencyCoordinator,
    ContactAggregate, DisassociationOutcome, PartialSagaFailure, SagaError, SagaKind, SagaReport,
    SagaStep, SqliteCoordinator,
};
pub use designation_service::PrimaryDesignationService;
pub use error::{ErrorKind, ServiceError};
pub use synergy_service::SynergyService;
