//! Enterprise registration intake, reference allocation and step workflow.
//!
//! A creation request is checked field by field, its shareholding structure is validated,
//! a `CE-YYYY-MM-DD-NNNNN` reference is allocated from the per-year counter and the
//! aggregate is persisted together with its participant links. Afterwards agents pick
//! registrations up step by step, and administrators may ban or reinstate them.

pub mod assignment;
pub mod ban;
pub mod capital;
pub mod clock;
pub mod domain;
pub mod fees;
pub mod reference;
pub mod repository;
pub mod router;
pub mod service;
pub mod shareholding;

#[cfg(test)]
mod tests;

pub use assignment::{AssignmentPolicy, WorkflowAssignment};
pub use ban::BanAudit;
pub use capital::{parse_capital, CapitalParseError};
pub use clock::{age_in_years, Clock, SystemClock};
pub use domain::{
    Agent, AgentId, AgentRole, AssignmentAudit, BanStatus, CreationStatus, DeclaredFacts,
    EnterpriseKind, EntityMeta, Locality, LocalityId, ParticipantLink, ParticipantRole,
    ParticipantSubmission, Person, PersonId, Registration, RegistrationId, RegistrationRecord,
    RegistrationSubmission, WorkflowStep,
};
pub use fees::FeeSchedule;
pub use reference::{Reference, ReferenceAllocator, ReferenceError, RetryPolicy, YearSequence};
pub use repository::{
    AgentDirectory, Directory, LocalityLookup, Notification, NotificationError,
    NotificationSender, Page, PageRequest, PersonLookup, RegistrationRepository, RepositoryError,
    SequenceRepository, UniqueField,
};
pub use router::registration_router;
pub use service::{
    ErrorClass, RegistrationError, RegistrationService, RegistrySettings, RegistryServices,
};
pub use shareholding::{ShareholdingValidator, ShareholdingViolation};
