use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reference::Reference;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a registration aggregate.
    RegistrationId
);
uuid_id!(
    /// Identifier of a natural person known to the person registry.
    PersonId
);
uuid_id!(
    /// Identifier of a staff agent.
    AgentId
);
uuid_id!(LocalityId);

/// Identity, optimistic-lock version and audit timestamps embedded in every persisted aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta<I> {
    pub id: I,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<I> EntityMeta<I> {
    pub fn new(id: I, now: DateTime<Utc>) -> Self {
        Self {
            id,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnterpriseKind {
    Company,
    SoleProprietorship,
}

impl EnterpriseKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Company => "Company",
            Self::SoleProprietorship => "Sole proprietorship",
        }
    }
}

/// Progress of the creation file as declared by the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

/// Role a person holds inside a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    #[serde(alias = "dirigeant")]
    Founder,
    #[serde(alias = "gerant")]
    Manager,
    #[serde(alias = "associe")]
    Associate,
}

impl ParticipantRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Founder => "founder",
            Self::Manager => "manager",
            Self::Associate => "associate",
        }
    }
}

/// The fixed sequence of administrative review steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Reception,
    Registrar,
    Review,
    Taxes,
    RegistryStage1,
    RegistryStage2,
    NationalId,
    Withdrawal,
}

impl WorkflowStep {
    pub const fn ordered() -> [Self; 8] {
        [
            Self::Reception,
            Self::Registrar,
            Self::Review,
            Self::Taxes,
            Self::RegistryStage1,
            Self::RegistryStage2,
            Self::NationalId,
            Self::Withdrawal,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Reception => "Reception",
            Self::Registrar => "Registrar",
            Self::Review => "Review",
            Self::Taxes => "Taxes",
            Self::RegistryStage1 => "Registry (stage 1)",
            Self::RegistryStage2 => "Registry (stage 2)",
            Self::NationalId => "National ID",
            Self::Withdrawal => "Withdrawal",
        }
    }

    /// Next step in the sequence; `None` once the file reaches withdrawal.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Reception => Some(Self::Registrar),
            Self::Registrar => Some(Self::Review),
            Self::Review => Some(Self::Taxes),
            Self::Taxes => Some(Self::RegistryStage1),
            Self::RegistryStage1 => Some(Self::RegistryStage2),
            Self::RegistryStage2 => Some(Self::NationalId),
            Self::NationalId => Some(Self::Withdrawal),
            Self::Withdrawal => None,
        }
    }

    /// The agent role that owns this step.
    pub const fn required_role(self) -> AgentRole {
        match self {
            Self::Reception => AgentRole::ReceptionAgent,
            Self::Registrar => AgentRole::RegistrarAgent,
            Self::Review => AgentRole::ReviewAgent,
            Self::Taxes => AgentRole::TaxAgent,
            Self::RegistryStage1 => AgentRole::RegistryAgentStage1,
            Self::RegistryStage2 => AgentRole::RegistryAgentStage2,
            Self::NationalId => AgentRole::IdentityAgent,
            Self::Withdrawal => AgentRole::WithdrawalAgent,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ReceptionAgent,
    RegistrarAgent,
    ReviewAgent,
    TaxAgent,
    RegistryAgentStage1,
    RegistryAgentStage2,
    IdentityAgent,
    WithdrawalAgent,
    SuperAdmin,
}

impl AgentRole {
    /// Whether this role may own a registration sitting at `step`.
    pub fn may_handle(self, step: WorkflowStep) -> bool {
        self == Self::SuperAdmin || self == step.required_role()
    }
}

/// Staff member who can own registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub display_name: String,
    pub role: AgentRole,
}

/// Natural person as exposed by the person registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// `Some(false)` marks a person explicitly barred from holding a role.
    pub authorized: Option<bool>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    pub id: LocalityId,
    pub code: String,
    pub name: String,
}

/// Facts the submitter declares when filing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclaredFacts {
    pub address_mismatch: bool,
    pub judicial_extract_provided: bool,
    pub manager_authorization: bool,
    pub operating_authorization: bool,
    pub import_export_account: bool,
}

/// Participant entry as submitted, before it is linked to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSubmission {
    pub person_id: PersonId,
    pub role: ParticipantRole,
    pub percentage: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Persisted association between a person and a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantLink {
    pub registration_id: RegistrationId,
    pub person_id: PersonId,
    pub role: ParticipantRole,
    pub percentage: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ParticipantLink {
    pub fn from_submission(
        registration_id: RegistrationId,
        participant: &ParticipantSubmission,
    ) -> Self {
        Self {
            registration_id,
            person_id: participant.person_id,
            role: participant.role,
            percentage: participant.percentage,
            start_date: participant.start_date,
            end_date: participant.end_date,
        }
    }
}

/// Inbound creation request. Required fields are optional here so that presence can be
/// reported as a validation failure instead of a deserialization error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSubmission {
    pub legal_name: Option<String>,
    pub short_name: Option<String>,
    pub capital: Option<String>,
    pub facts: DeclaredFacts,
    pub kind: Option<EnterpriseKind>,
    pub creation_status: Option<CreationStatus>,
    pub step: Option<WorkflowStep>,
    pub legal_form: Option<String>,
    pub primary_activity: Option<String>,
    pub secondary_activity: Option<String>,
    pub locality_code: Option<String>,
    pub participants: Vec<ParticipantSubmission>,
}

/// Suspension state of a registration. Reason and timestamp only exist while banned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BanStatus {
    #[default]
    Active,
    Banned {
        reason: String,
        banned_at: DateTime<Utc>,
    },
}

impl BanStatus {
    pub fn is_banned(&self) -> bool {
        matches!(self, Self::Banned { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Banned { reason, .. } => Some(reason),
            Self::Active => None,
        }
    }

    pub fn banned_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Banned { banned_at, .. } => Some(*banned_at),
            Self::Active => None,
        }
    }
}

/// Trace of the most recent assignment decision against the role matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentAudit {
    pub agent_id: AgentId,
    pub agent_role: AgentRole,
    pub step: WorkflowStep,
    pub permitted: bool,
    pub at: DateTime<Utc>,
}

/// Aggregate root of the registration workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub meta: EntityMeta<RegistrationId>,
    pub(crate) reference: Reference,
    pub legal_name: String,
    pub short_name: Option<String>,
    pub capital: Decimal,
    pub facts: DeclaredFacts,
    pub kind: EnterpriseKind,
    pub creation_status: CreationStatus,
    pub step: WorkflowStep,
    pub legal_form: String,
    pub primary_activity: String,
    pub secondary_activity: Option<String>,
    pub locality_id: LocalityId,
    pub total_fee: Decimal,
    pub ban: BanStatus,
    pub assigned_agent: Option<AgentId>,
    pub last_assignment: Option<AssignmentAudit>,
}

impl Registration {
    pub fn id(&self) -> RegistrationId {
        self.meta.id
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn is_banned(&self) -> bool {
        self.ban.is_banned()
    }
}

/// Aggregate together with its participant links, as persisted in one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub registration: Registration,
    pub participants: Vec<ParticipantLink>,
}

impl RegistrationRecord {
    pub fn founders(&self) -> impl Iterator<Item = &ParticipantLink> {
        self.participants
            .iter()
            .filter(|link| link.role == ParticipantRole::Founder)
    }
}
