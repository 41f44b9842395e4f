use serde::{Deserialize, Serialize};

use super::domain::{
    Agent, AgentId, Locality, Person, PersonId, Registration, RegistrationId, RegistrationRecord,
    WorkflowStep,
};
use super::reference::YearSequence;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Storage for registrations and their participant links.
///
/// `insert` persists the aggregate and every link as one unit and fails with
/// `RepositoryError::Duplicate` when a unique name is already stored; `update` is a
/// compare-and-swap on `meta.version` and returns the stored copy with the bumped version.
pub trait RegistrationRepository: Send + Sync {
    fn insert(&self, record: RegistrationRecord) -> Result<RegistrationRecord, RepositoryError>;
    fn update(&self, registration: Registration) -> Result<Registration, RepositoryError>;
    fn fetch(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, RepositoryError>;
    fn legal_name_exists(&self, legal_name: &str) -> Result<bool, RepositoryError>;
    fn short_name_exists(&self, short_name: &str) -> Result<bool, RepositoryError>;
    fn unassigned_at_step(
        &self,
        step: WorkflowStep,
        page: PageRequest,
    ) -> Result<Page<Registration>, RepositoryError>;
    fn assigned_to(
        &self,
        agent_id: AgentId,
        page: PageRequest,
    ) -> Result<Page<Registration>, RepositoryError>;
}

/// Per-year reference counters under optimistic concurrency.
pub trait SequenceRepository: Send + Sync {
    fn load_sequence(&self, year: i32) -> Result<Option<YearSequence>, RepositoryError>;
    /// Persist `next` only if the stored version still equals `expected_version`
    /// (`None` meaning no row exists yet); otherwise fail with `RepositoryError::Conflict`.
    fn store_sequence(
        &self,
        next: YearSequence,
        expected_version: Option<u64>,
    ) -> Result<(), RepositoryError>;
}

pub trait LocalityLookup: Send + Sync {
    fn locality_by_code(&self, code: &str) -> Result<Option<Locality>, RepositoryError>;
}

pub trait PersonLookup: Send + Sync {
    fn person_by_id(&self, id: PersonId) -> Result<Option<Person>, RepositoryError>;
}

pub trait AgentDirectory: Send + Sync {
    fn agent_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;
}

/// Read-only view over the reference data the workflow resolves on demand.
pub trait Directory: LocalityLookup + PersonLookup + AgentDirectory {}

impl<T> Directory for T where T: LocalityLookup + PersonLookup + AgentDirectory {}

/// Column that must stay unique across registrations, compared case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    LegalName,
    ShortName,
}

impl UniqueField {
    /// First unique column `candidate` would share with `existing`, if any.
    pub fn clash(existing: &Registration, candidate: &Registration) -> Option<Self> {
        if existing
            .legal_name
            .eq_ignore_ascii_case(&candidate.legal_name)
        {
            return Some(Self::LegalName);
        }
        match (&existing.short_name, &candidate.short_name) {
            (Some(taken), Some(wanted)) if taken.eq_ignore_ascii_case(wanted) => {
                Some(Self::ShortName)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LegalName => write!(f, "legal name"),
            Self::ShortName => write!(f, "short name"),
        }
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("a registration with the same {0} already exists")]
    Duplicate(UniqueField),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound e-mail hook. Callers treat every failure as non-fatal.
pub trait NotificationSender: Send + Sync {
    fn send_to_many(&self, notification: &Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Zero-based page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }.normalized()
    }

    /// Clamp the size into `1..=100`.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page,
            size: self.size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }

    /// Slice an already filtered and ordered result set.
    pub fn paginate<T>(self, items: Vec<T>) -> Page<T> {
        let request = self.normalized();
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(request.offset())
            .take(request.size as usize)
            .collect();

        Page {
            items,
            page: request.page,
            size: request.size,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}
