use std::sync::Arc;

use tracing::{info, warn};

use crate::config::WorkflowConfig;

use super::assignment::{AssignmentPolicy, WorkflowAssignment};
use super::ban::BanAudit;
use super::capital::{parse_capital, CapitalParseError};
use super::clock::Clock;
use super::domain::{
    AgentId, AgentRole, BanStatus, EntityMeta, ParticipantLink, Registration, RegistrationId,
    RegistrationRecord, RegistrationSubmission, WorkflowStep,
};
use super::fees::FeeSchedule;
use super::reference::{ReferenceAllocator, ReferenceError, RetryPolicy};
use super::repository::{
    Directory, Notification, NotificationSender, RegistrationRepository, RepositoryError,
    SequenceRepository, UniqueField,
};
use super::shareholding::{ShareholdingValidator, ShareholdingViolation};

const CREATED_SUBJECT: &str = "Enterprise registration received";

/// Coarse outcome class surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

/// Error raised by the registration workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("an enterprise named '{0}' is already registered")]
    DuplicateLegalName(String),
    #[error("the short name '{0}' is already registered")]
    DuplicateShortName(String),
    #[error("no locality has code '{0}'")]
    LocalityNotFound(String),
    #[error("registration {0} not found")]
    RegistrationNotFound(RegistrationId),
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
    #[error(transparent)]
    Capital(#[from] CapitalParseError),
    #[error(transparent)]
    Shareholding(#[from] ShareholdingViolation),
    #[error("registration is already banned")]
    AlreadyBanned,
    #[error("a ban reason is required")]
    BlankBanReason,
    #[error("a {role:?} agent may not take registrations at the {step} step")]
    StepPermissionDenied { role: AgentRole, step: WorkflowStep },
    #[error("registration is not assigned to agent {0}")]
    NotAssignedTo(AgentId),
    #[error("registration is already at the final step")]
    FinalStep,
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("registration task did not complete: {0}")]
    Interrupted(String),
}

impl RegistrationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingField(_)
            | Self::DuplicateLegalName(_)
            | Self::DuplicateShortName(_)
            | Self::Capital(_)
            | Self::AlreadyBanned
            | Self::BlankBanReason
            | Self::StepPermissionDenied { .. }
            | Self::NotAssignedTo(_)
            | Self::FinalStep => ErrorClass::BadRequest,
            Self::Shareholding(ShareholdingViolation::Lookup(_)) => ErrorClass::Internal,
            Self::Shareholding(_) => ErrorClass::BadRequest,
            Self::LocalityNotFound(_) | Self::RegistrationNotFound(_) | Self::AgentNotFound(_) => {
                ErrorClass::NotFound
            }
            Self::Reference(ReferenceError::Contention { .. }) => ErrorClass::Conflict,
            Self::Reference(_) => ErrorClass::Internal,
            Self::Repository(RepositoryError::Conflict | RepositoryError::Duplicate(_)) => {
                ErrorClass::Conflict
            }
            Self::Repository(RepositoryError::NotFound) => ErrorClass::NotFound,
            Self::Repository(RepositoryError::Unavailable(_)) | Self::Interrupted(_) => {
                ErrorClass::Internal
            }
        }
    }

    /// Message safe to show to the caller; internal failures stay generic.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Service creating registrations: validation, reference allocation, fees and persistence.
pub struct RegistrationService<R, D, N> {
    repository: Arc<R>,
    directory: Arc<D>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    allocator: ReferenceAllocator<R>,
    validator: ShareholdingValidator,
    fees: FeeSchedule,
}

impl<R, D, N> RegistrationService<R, D, N>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        repository: Arc<R>,
        directory: Arc<D>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        fees: FeeSchedule,
    ) -> Self {
        let allocator = ReferenceAllocator::new(repository.clone(), retry);
        Self {
            repository,
            directory,
            notifier,
            clock,
            allocator,
            validator: ShareholdingValidator::new(),
            fees,
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Validate and persist a new registration together with its participant links.
    pub fn create(
        &self,
        submission: RegistrationSubmission,
    ) -> Result<RegistrationRecord, RegistrationError> {
        let legal_name = required_text(submission.legal_name, "legal name")?;
        let capital_raw = required_text(submission.capital, "capital")?;
        let kind = submission
            .kind
            .ok_or(RegistrationError::MissingField("enterprise kind"))?;
        let creation_status = submission
            .creation_status
            .ok_or(RegistrationError::MissingField("creation status"))?;
        let step = submission
            .step
            .ok_or(RegistrationError::MissingField("workflow step"))?;
        let legal_form = required_text(submission.legal_form, "legal form")?;
        let primary_activity = required_text(submission.primary_activity, "activity domain")?;
        let locality_code = required_text(submission.locality_code, "locality code")?;
        if submission.participants.is_empty() {
            return Err(RegistrationError::MissingField("participants"));
        }
        let short_name = optional_text(submission.short_name);
        let secondary_activity = optional_text(submission.secondary_activity);

        if self.repository.legal_name_exists(&legal_name)? {
            return Err(RegistrationError::DuplicateLegalName(legal_name));
        }
        if let Some(short_name) = &short_name {
            if self.repository.short_name_exists(short_name)? {
                return Err(RegistrationError::DuplicateShortName(short_name.clone()));
            }
        }

        let locality = self
            .directory
            .locality_by_code(&locality_code)?
            .ok_or_else(|| RegistrationError::LocalityNotFound(locality_code.clone()))?;

        let capital = parse_capital(&capital_raw)?;

        let today = self.clock.today();
        self.validator
            .validate(kind, &submission.participants, &*self.directory, today)?;

        // From here on a counter value is consumed even if persistence fails.
        let reference = self.allocator.allocate(today)?;
        let total_fee = self.fees.compute(kind, submission.participants.len());

        let id = RegistrationId::new();
        let registration = Registration {
            meta: EntityMeta::new(id, self.clock.now()),
            reference,
            legal_name,
            short_name,
            capital,
            facts: submission.facts,
            kind,
            creation_status,
            step,
            legal_form,
            primary_activity,
            secondary_activity,
            locality_id: locality.id,
            total_fee,
            ban: BanStatus::Active,
            assigned_agent: None,
            last_assignment: None,
        };
        let participants = submission
            .participants
            .iter()
            .map(|participant| ParticipantLink::from_submission(id, participant))
            .collect();

        let submitted_name = registration.legal_name.clone();
        let submitted_short_name = registration.short_name.clone().unwrap_or_default();
        let stored = self
            .repository
            .insert(RegistrationRecord {
                registration,
                participants,
            })
            .map_err(|error| match error {
                RepositoryError::Duplicate(UniqueField::LegalName) => {
                    RegistrationError::DuplicateLegalName(submitted_name)
                }
                RepositoryError::Duplicate(UniqueField::ShortName) => {
                    RegistrationError::DuplicateShortName(submitted_short_name)
                }
                other => other.into(),
            })?;

        info!(
            registration_id = %stored.registration.id(),
            reference = %stored.registration.reference(),
            kind = kind.label(),
            locality = %locality.code,
            "registration created"
        );

        let body = format!(
            "Your registration request for {} has been received under reference {}. Amount due: {}.",
            stored.registration.legal_name,
            stored.registration.reference(),
            stored.registration.total_fee
        );
        notify_founders(
            &*self.directory,
            &*self.notifier,
            &stored,
            CREATED_SUBJECT,
            &body,
        );

        Ok(stored)
    }

    pub fn get(&self, id: RegistrationId) -> Result<RegistrationRecord, RegistrationError> {
        self.repository
            .fetch(id)?
            .ok_or(RegistrationError::RegistrationNotFound(id))
    }
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, RegistrationError> {
    optional_text(value).ok_or(RegistrationError::MissingField(field))
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Best-effort e-mail to every founder of `record`. Failures are logged and dropped.
pub(crate) fn notify_founders<D, N>(
    directory: &D,
    notifier: &N,
    record: &RegistrationRecord,
    subject: &str,
    body: &str,
) where
    D: Directory + ?Sized,
    N: NotificationSender + ?Sized,
{
    let registration_id = record.registration.id();
    let mut recipients = Vec::new();
    for founder in record.founders() {
        match directory.person_by_id(founder.person_id) {
            Ok(Some(person)) => {
                if let Some(email) = person.email.filter(|email| !email.trim().is_empty()) {
                    if !recipients.contains(&email) {
                        recipients.push(email);
                    }
                }
            }
            Ok(None) => {
                warn!(%registration_id, person_id = %founder.person_id, "founder missing from person registry")
            }
            Err(error) => {
                warn!(%registration_id, %error, "could not resolve founder e-mail")
            }
        }
    }

    if recipients.is_empty() {
        return;
    }

    let notification = Notification {
        recipients,
        subject: subject.to_string(),
        body: body.to_string(),
    };
    if let Err(error) = notifier.send_to_many(&notification) {
        warn!(%registration_id, %error, subject, "founder notification failed");
    }
}

/// The three workflow components wired against the same collaborators.
pub struct RegistryServices<R, D, N> {
    pub registrations: RegistrationService<R, D, N>,
    pub assignments: WorkflowAssignment<R, D>,
    pub bans: BanAudit<R, D, N>,
}

impl<R, D, N> RegistryServices<R, D, N>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        repository: Arc<R>,
        directory: Arc<D>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            registrations: RegistrationService::new(
                repository.clone(),
                directory.clone(),
                notifier.clone(),
                clock.clone(),
                settings.retry,
                settings.fees,
            ),
            assignments: WorkflowAssignment::new(
                repository.clone(),
                directory.clone(),
                clock.clone(),
                settings.assignment_policy,
            ),
            bans: BanAudit::new(repository, directory, notifier, clock),
        }
    }
}

/// Tunables shared by the workflow components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistrySettings {
    pub retry: RetryPolicy,
    pub fees: FeeSchedule,
    pub assignment_policy: AssignmentPolicy,
}

impl From<&WorkflowConfig> for RegistrySettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.reference_max_attempts, config.reference_backoff),
            fees: FeeSchedule::default(),
            assignment_policy: config.assignment_policy,
        }
    }
}
