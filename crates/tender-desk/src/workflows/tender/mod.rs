//! Tender (appel d'offres) workflow: organizational directory, role and phase
//! registry, sign-off state machine, persistence seam, and dashboard read model.

mod blueprint;
pub mod dashboard;
pub mod domain;
pub mod import;
pub mod machine;
pub mod organization;
pub mod repository;
pub mod router;
pub mod service;

pub use blueprint::WorkflowBlueprint;
pub use dashboard::{
    aggregate_by_direction, aggregate_by_division, phase_distribution, DashboardSummary,
    DirectionSummary, DivisionSummary, PhaseLoad, TenderCounts,
};
pub use domain::{
    compare_phase, ActorRole, Phase, PhaseDescriptor, RegistryError, RoleDescriptor, SignOff,
    TenderId, TenderStatus,
};
pub use import::{TenderCsvImporter, TenderImportError};
pub use machine::{
    Precondition, TenderAction, TenderStateMachine, Transition, TransitionEffect,
    TransitionError, WorkflowState,
};
pub use organization::{Direction, DirectoryError, Division, OrganizationDirectory};
pub use repository::{
    MemoryTenderRepository, RepositoryError, TenderFilter, TenderRecord, TenderRepository,
    TenderView, TransitionLog,
};
pub use router::{actor_role, service_error, tender_router, ACTOR_ROLE_HEADER};
pub use service::{ActionOutcome, TenderDraft, TenderServiceError, TenderWorkflowService};
