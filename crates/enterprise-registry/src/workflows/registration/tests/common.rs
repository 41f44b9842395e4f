use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::workflows::registration::clock::fixed::FixedClock;
use crate::workflows::registration::domain::{
    Agent, AgentId, AgentRole, CreationStatus, DeclaredFacts, EnterpriseKind, Locality,
    LocalityId, ParticipantRole, ParticipantSubmission, Person, PersonId, Registration,
    RegistrationId, RegistrationRecord, RegistrationSubmission, WorkflowStep,
};
use crate::workflows::registration::reference::{RetryPolicy, YearSequence};
use crate::workflows::registration::repository::{
    AgentDirectory, LocalityLookup, Notification, NotificationError, NotificationSender, Page,
    PageRequest, PersonLookup, RegistrationRepository, RepositoryError, SequenceRepository,
    UniqueField,
};
use crate::workflows::registration::service::{RegistrySettings, RegistryServices};
use crate::workflows::registration::{AssignmentPolicy, FeeSchedule};

pub(super) const LOCALITY_CODE: &str = "NKC-TVZ";

pub(super) const FOUNDER: PersonId = PersonId(Uuid::from_u128(0x01));
pub(super) const MANAGER: PersonId = PersonId(Uuid::from_u128(0x02));
pub(super) const ASSOCIATE_A: PersonId = PersonId(Uuid::from_u128(0x03));
pub(super) const ASSOCIATE_B: PersonId = PersonId(Uuid::from_u128(0x04));
pub(super) const SECOND_FOUNDER: PersonId = PersonId(Uuid::from_u128(0x05));
pub(super) const MINOR: PersonId = PersonId(Uuid::from_u128(0x10));
pub(super) const EIGHTEEN_TODAY: PersonId = PersonId(Uuid::from_u128(0x11));
pub(super) const EIGHTEEN_TOMORROW: PersonId = PersonId(Uuid::from_u128(0x12));
pub(super) const BARRED: PersonId = PersonId(Uuid::from_u128(0x13));
pub(super) const NO_BIRTH_DATE: PersonId = PersonId(Uuid::from_u128(0x14));
pub(super) const UNBORN: PersonId = PersonId(Uuid::from_u128(0x15));
pub(super) const UNKNOWN: PersonId = PersonId(Uuid::from_u128(0xFF));

pub(super) const RECEPTION_AGENT: AgentId = AgentId(Uuid::from_u128(0x100));
pub(super) const REGISTRAR_AGENT: AgentId = AgentId(Uuid::from_u128(0x101));
pub(super) const TAX_AGENT: AgentId = AgentId(Uuid::from_u128(0x102));
pub(super) const SUPER_ADMIN: AgentId = AgentId(Uuid::from_u128(0x1FF));

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn dec(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("valid decimal literal")
}

/// 2026-10-18 10:00 UTC, reference time zone UTC.
pub(super) fn clock() -> FixedClock {
    FixedClock {
        now: Utc
            .with_ymd_and_hms(2026, 10, 18, 10, 0, 0)
            .single()
            .expect("valid instant"),
        offset: FixedOffset::east_opt(0).expect("valid offset"),
    }
}

pub(super) fn today() -> NaiveDate {
    date(2026, 10, 18)
}

pub(super) fn participant(
    person_id: PersonId,
    role: ParticipantRole,
    percentage: &str,
) -> ParticipantSubmission {
    ParticipantSubmission {
        person_id,
        role,
        percentage: dec(percentage),
        start_date: date(2026, 1, 1),
        end_date: date(2036, 1, 1),
    }
}

/// Founder 40%, manager 30%, associate 30%.
pub(super) fn company_participants() -> Vec<ParticipantSubmission> {
    vec![
        participant(FOUNDER, ParticipantRole::Founder, "40"),
        participant(MANAGER, ParticipantRole::Manager, "30"),
        participant(ASSOCIATE_A, ParticipantRole::Associate, "30"),
    ]
}

pub(super) fn company_submission(legal_name: &str) -> RegistrationSubmission {
    RegistrationSubmission {
        legal_name: Some(legal_name.to_string()),
        short_name: None,
        capital: Some("1 000 000 MRU".to_string()),
        facts: DeclaredFacts {
            judicial_extract_provided: true,
            ..DeclaredFacts::default()
        },
        kind: Some(EnterpriseKind::Company),
        creation_status: Some(CreationStatus::Pending),
        step: Some(WorkflowStep::Reception),
        legal_form: Some("SARL".to_string()),
        primary_activity: Some("commerce-general".to_string()),
        secondary_activity: None,
        locality_code: Some(LOCALITY_CODE.to_string()),
        participants: company_participants(),
    }
}

pub(super) fn sole_submission(legal_name: &str) -> RegistrationSubmission {
    RegistrationSubmission {
        kind: Some(EnterpriseKind::SoleProprietorship),
        legal_form: Some("EI".to_string()),
        participants: vec![participant(FOUNDER, ParticipantRole::Founder, "100")],
        ..company_submission(legal_name)
    }
}

fn person(id: PersonId, first_name: &str, birth_date: Option<NaiveDate>) -> Person {
    Person {
        id,
        first_name: first_name.to_string(),
        last_name: "Ould Test".to_string(),
        email: Some(format!("{}@example.mr", first_name.to_ascii_lowercase())),
        birth_date,
        authorized: None,
    }
}

/// In-memory person, locality and agent registry.
pub(super) struct MemoryDirectory {
    people: HashMap<PersonId, Person>,
    localities: Vec<Locality>,
    agents: HashMap<AgentId, Agent>,
    pub(super) offline: AtomicBool,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        let mut people = HashMap::new();
        for entry in [
            person(FOUNDER, "Aicha", Some(date(1980, 5, 10))),
            person(MANAGER, "Mohamed", Some(date(1975, 1, 1))),
            person(ASSOCIATE_A, "Khadija", Some(date(1990, 7, 14))),
            person(ASSOCIATE_B, "Sidi", Some(date(1992, 3, 3))),
            person(SECOND_FOUNDER, "Mariem", Some(date(1985, 12, 24))),
            person(MINOR, "Ahmed", Some(date(2010, 1, 1))),
            person(EIGHTEEN_TODAY, "Fatimetou", Some(date(2008, 10, 18))),
            person(EIGHTEEN_TOMORROW, "Brahim", Some(date(2008, 10, 19))),
            Person {
                authorized: Some(false),
                ..person(BARRED, "Cheikh", Some(date(1970, 2, 2)))
            },
            person(NO_BIRTH_DATE, "Vatma", None),
            person(UNBORN, "Yahya", Some(date(2027, 1, 1))),
        ] {
            people.insert(entry.id, entry);
        }

        let mut agents = HashMap::new();
        for (id, role, name) in [
            (RECEPTION_AGENT, AgentRole::ReceptionAgent, "Reception desk"),
            (REGISTRAR_AGENT, AgentRole::RegistrarAgent, "Registrar"),
            (TAX_AGENT, AgentRole::TaxAgent, "Tax office"),
            (SUPER_ADMIN, AgentRole::SuperAdmin, "Administrator"),
        ] {
            agents.insert(
                id,
                Agent {
                    id,
                    display_name: name.to_string(),
                    role,
                },
            );
        }

        Self {
            people,
            localities: vec![Locality {
                id: LocalityId(Uuid::from_u128(0x500)),
                code: LOCALITY_CODE.to_string(),
                name: "Tevragh Zeina".to_string(),
            }],
            agents,
            offline: AtomicBool::new(false),
        }
    }
}

impl MemoryDirectory {
    fn check_online(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("directory offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl LocalityLookup for MemoryDirectory {
    fn locality_by_code(&self, code: &str) -> Result<Option<Locality>, RepositoryError> {
        self.check_online()?;
        Ok(self
            .localities
            .iter()
            .find(|locality| locality.code == code)
            .cloned())
    }
}

impl PersonLookup for MemoryDirectory {
    fn person_by_id(&self, id: PersonId) -> Result<Option<Person>, RepositoryError> {
        self.check_online()?;
        Ok(self.people.get(&id).cloned())
    }
}

impl AgentDirectory for MemoryDirectory {
    fn agent_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        self.check_online()?;
        Ok(self.agents.get(&id).cloned())
    }
}

/// Registration store with compare-and-swap semantics on both aggregates and year counters.
#[derive(Default)]
pub(super) struct MemoryRegistry {
    pub(super) records: Mutex<HashMap<RegistrationId, RegistrationRecord>>,
    pub(super) sequences: Mutex<HashMap<i32, YearSequence>>,
    pub(super) fail_inserts: AtomicBool,
    /// Number of upcoming sequence writes to reject as concurrent modifications.
    pub(super) sequence_conflicts: AtomicU32,
    pub(super) sequence_writes: AtomicU32,
}

impl MemoryRegistry {
    pub(super) fn stored_count(&self) -> usize {
        self.records.lock().expect("registry mutex poisoned").len()
    }

    pub(super) fn counter_for(&self, year: i32) -> Option<u32> {
        self.sequences
            .lock()
            .expect("sequence mutex poisoned")
            .get(&year)
            .map(|sequence| sequence.counter)
    }

    fn listed<F>(&self, page: PageRequest, keep: F) -> Page<Registration>
    where
        F: Fn(&Registration) -> bool,
    {
        let guard = self.records.lock().expect("registry mutex poisoned");
        let mut matching: Vec<Registration> = guard
            .values()
            .map(|record| &record.registration)
            .filter(|registration| keep(*registration))
            .cloned()
            .collect();
        matching.sort_by(|left, right| {
            (left.meta.created_at, left.reference()).cmp(&(right.meta.created_at, right.reference()))
        });
        page.paginate(matching)
    }
}

impl RegistrationRepository for MemoryRegistry {
    fn insert(&self, record: RegistrationRecord) -> Result<RegistrationRecord, RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "participant link table locked".to_string(),
            ));
        }
        let mut guard = self.records.lock().expect("registry mutex poisoned");
        if guard.contains_key(&record.registration.id()) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(field) = guard
            .values()
            .find_map(|existing| UniqueField::clash(&existing.registration, &record.registration))
        {
            return Err(RepositoryError::Duplicate(field));
        }
        guard.insert(record.registration.id(), record.clone());
        Ok(record)
    }

    fn update(&self, mut registration: Registration) -> Result<Registration, RepositoryError> {
        let mut guard = self.records.lock().expect("registry mutex poisoned");
        let stored = guard
            .get_mut(&registration.id())
            .ok_or(RepositoryError::NotFound)?;
        if stored.registration.meta.version != registration.meta.version {
            return Err(RepositoryError::Conflict);
        }
        registration.reference = stored.registration.reference.clone();
        registration.meta.version += 1;
        stored.registration = registration.clone();
        Ok(registration)
    }

    fn fetch(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("registry mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn legal_name_exists(&self, legal_name: &str) -> Result<bool, RepositoryError> {
        let guard = self.records.lock().expect("registry mutex poisoned");
        Ok(guard
            .values()
            .any(|record| record.registration.legal_name.eq_ignore_ascii_case(legal_name)))
    }

    fn short_name_exists(&self, short_name: &str) -> Result<bool, RepositoryError> {
        let guard = self.records.lock().expect("registry mutex poisoned");
        Ok(guard.values().any(|record| {
            record
                .registration
                .short_name
                .as_deref()
                .is_some_and(|existing| existing.eq_ignore_ascii_case(short_name))
        }))
    }

    fn unassigned_at_step(
        &self,
        step: WorkflowStep,
        page: PageRequest,
    ) -> Result<Page<Registration>, RepositoryError> {
        Ok(self.listed(page, |registration| {
            registration.step == step && registration.assigned_agent.is_none()
        }))
    }

    fn assigned_to(
        &self,
        agent_id: AgentId,
        page: PageRequest,
    ) -> Result<Page<Registration>, RepositoryError> {
        Ok(self.listed(page, |registration| {
            registration.assigned_agent == Some(agent_id)
        }))
    }
}

impl SequenceRepository for MemoryRegistry {
    fn load_sequence(&self, year: i32) -> Result<Option<YearSequence>, RepositoryError> {
        let guard = self.sequences.lock().expect("sequence mutex poisoned");
        Ok(guard.get(&year).copied())
    }

    fn store_sequence(
        &self,
        next: YearSequence,
        expected_version: Option<u64>,
    ) -> Result<(), RepositoryError> {
        self.sequence_writes.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .sequence_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(RepositoryError::Conflict);
        }

        let mut guard = self.sequences.lock().expect("sequence mutex poisoned");
        let current = guard.get(&next.year).map(|sequence| sequence.version);
        if current != expected_version {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(next.year, next);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSender for RecordingNotifier {
    fn send_to_many(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationSender for FailingNotifier {
    fn send_to_many(&self, _notification: &Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay refused".to_string()))
    }
}

pub(super) struct Harness<N> {
    pub(super) services: RegistryServices<MemoryRegistry, MemoryDirectory, N>,
    pub(super) registry: Arc<MemoryRegistry>,
    pub(super) directory: Arc<MemoryDirectory>,
    pub(super) notifier: Arc<N>,
}

pub(super) fn settings(policy: AssignmentPolicy) -> RegistrySettings {
    RegistrySettings {
        retry: RetryPolicy::new(4, std::time::Duration::ZERO),
        fees: FeeSchedule::default(),
        assignment_policy: policy,
    }
}

pub(super) fn harness_with<N>(notifier: N, policy: AssignmentPolicy) -> Harness<N>
where
    N: NotificationSender + 'static,
{
    let registry = Arc::new(MemoryRegistry::default());
    let directory = Arc::new(MemoryDirectory::default());
    let notifier = Arc::new(notifier);
    let services = RegistryServices::new(
        registry.clone(),
        directory.clone(),
        notifier.clone(),
        Arc::new(clock()),
        settings(policy),
    );
    Harness {
        services,
        registry,
        directory,
        notifier,
    }
}

pub(super) fn harness() -> Harness<RecordingNotifier> {
    harness_with(RecordingNotifier::default(), AssignmentPolicy::AuditedOverride)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
