use chrono::NaiveDate;
use enterprise_registry::workflows::registration::{
    Agent, AgentDirectory, AgentId, AgentRole, LocalityLookup, Locality, LocalityId,
    Notification, NotificationError, NotificationSender, Page, PageRequest, Person, PersonId,
    PersonLookup, Registration, RegistrationId, RegistrationRecord, RegistrationRepository,
    RepositoryError, SequenceRepository, UniqueField, WorkflowStep, YearSequence,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

/// Process-local registration store. Uniqueness and version checks happen under one lock so
/// concurrent requests observe the same guarantees a transactional store would give.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRegistry {
    records: Arc<Mutex<HashMap<RegistrationId, RegistrationRecord>>>,
    sequences: Arc<Mutex<HashMap<i32, YearSequence>>>,
}

impl InMemoryRegistry {
    fn select<F>(&self, page: PageRequest, keep: F) -> Result<Page<Registration>, RepositoryError>
    where
        F: Fn(&Registration) -> bool,
    {
        let guard = lock(&self.records)?;
        let mut matching: Vec<Registration> = guard
            .values()
            .map(|record| &record.registration)
            .filter(|registration| keep(*registration))
            .cloned()
            .collect();
        matching.sort_by(|left, right| {
            (left.meta.created_at, left.reference()).cmp(&(right.meta.created_at, right.reference()))
        });
        Ok(page.paginate(matching))
    }
}

impl RegistrationRepository for InMemoryRegistry {
    fn insert(&self, record: RegistrationRecord) -> Result<RegistrationRecord, RepositoryError> {
        let mut guard = lock(&self.records)?;
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
        let mut guard = lock(&self.records)?;
        let stored = guard
            .get_mut(&registration.id())
            .ok_or(RepositoryError::NotFound)?;
        if stored.registration.meta.version != registration.meta.version
            || stored.registration.reference() != registration.reference()
        {
            return Err(RepositoryError::Conflict);
        }
        registration.meta.version += 1;
        stored.registration = registration.clone();
        Ok(registration)
    }

    fn fetch(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, RepositoryError> {
        Ok(lock(&self.records)?.get(&id).cloned())
    }

    fn legal_name_exists(&self, legal_name: &str) -> Result<bool, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .any(|record| record.registration.legal_name.eq_ignore_ascii_case(legal_name)))
    }

    fn short_name_exists(&self, short_name: &str) -> Result<bool, RepositoryError> {
        Ok(lock(&self.records)?.values().any(|record| {
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
        self.select(page, |registration| {
            registration.step == step && registration.assigned_agent.is_none()
        })
    }

    fn assigned_to(
        &self,
        agent_id: AgentId,
        page: PageRequest,
    ) -> Result<Page<Registration>, RepositoryError> {
        self.select(page, |registration| {
            registration.assigned_agent == Some(agent_id)
        })
    }
}

impl SequenceRepository for InMemoryRegistry {
    fn load_sequence(&self, year: i32) -> Result<Option<YearSequence>, RepositoryError> {
        Ok(lock(&self.sequences)?.get(&year).copied())
    }

    fn store_sequence(
        &self,
        next: YearSequence,
        expected_version: Option<u64>,
    ) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.sequences)?;
        let current = guard.get(&next.year).map(|sequence| sequence.version);
        if current != expected_version {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(next.year, next);
        Ok(())
    }
}

pub(crate) const DEMO_FOUNDER: PersonId = PersonId(Uuid::from_u128(0x1001));
pub(crate) const DEMO_MANAGER: PersonId = PersonId(Uuid::from_u128(0x1002));
pub(crate) const DEMO_ASSOCIATE: PersonId = PersonId(Uuid::from_u128(0x1003));
pub(crate) const DEMO_MINOR: PersonId = PersonId(Uuid::from_u128(0x1004));

/// Seeded agents get `0x2000 + position` in `SEEDED_AGENTS` as their id.
pub(crate) fn seeded_agent_id(role: AgentRole) -> AgentId {
    let position = SEEDED_AGENTS
        .iter()
        .position(|(seeded, _)| *seeded == role)
        .unwrap_or_default() as u128;
    AgentId(Uuid::from_u128(0x2000 + position))
}

const SEEDED_AGENTS: [(AgentRole, &str); 9] = [
    (AgentRole::ReceptionAgent, "Reception desk"),
    (AgentRole::RegistrarAgent, "Registrar"),
    (AgentRole::ReviewAgent, "Legal review"),
    (AgentRole::TaxAgent, "Tax office"),
    (AgentRole::RegistryAgentStage1, "Trade registry (stage 1)"),
    (AgentRole::RegistryAgentStage2, "Trade registry (stage 2)"),
    (AgentRole::IdentityAgent, "National ID office"),
    (AgentRole::WithdrawalAgent, "Withdrawal counter"),
    (AgentRole::SuperAdmin, "Registry administrator"),
];

/// Reference data standing in for the person, locality and staff registries.
#[derive(Clone)]
pub(crate) struct InMemoryDirectory {
    people: Arc<HashMap<PersonId, Person>>,
    localities: Arc<Vec<Locality>>,
    agents: Arc<HashMap<AgentId, Agent>>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        let person = |id, first_name: &str, last_name: &str, born: Option<NaiveDate>| Person {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: Some(format!(
                "{}.{}@example.mr",
                first_name.to_ascii_lowercase(),
                last_name.to_ascii_lowercase().replace(' ', "-")
            )),
            birth_date: born,
            authorized: Some(true),
        };

        let people: HashMap<PersonId, Person> = [
            person(
                DEMO_FOUNDER,
                "Aminetou",
                "Mint Ahmed",
                NaiveDate::from_ymd_opt(1979, 6, 12),
            ),
            person(
                DEMO_MANAGER,
                "Moussa",
                "Ba",
                NaiveDate::from_ymd_opt(1984, 11, 3),
            ),
            person(
                DEMO_ASSOCIATE,
                "Cheikh",
                "Ould Sidi",
                NaiveDate::from_ymd_opt(1991, 2, 27),
            ),
            person(
                DEMO_MINOR,
                "Oumar",
                "Sy",
                NaiveDate::from_ymd_opt(2012, 9, 1),
            ),
        ]
        .into_iter()
        .map(|person| (person.id, person))
        .collect();

        let localities: Vec<Locality> = [
            ("NKC-TVZ", "Tevragh Zeina"),
            ("NKC-KSR", "Ksar"),
            ("NDB-CTR", "Nouadhibou"),
        ]
        .into_iter()
        .enumerate()
        .map(|(position, (code, name))| Locality {
            id: LocalityId(Uuid::from_u128(0x3000 + position as u128)),
            code: code.to_string(),
            name: name.to_string(),
        })
        .collect();

        let agents: HashMap<AgentId, Agent> = SEEDED_AGENTS
            .iter()
            .map(|(role, name)| {
                let id = seeded_agent_id(*role);
                (
                    id,
                    Agent {
                        id,
                        display_name: name.to_string(),
                        role: *role,
                    },
                )
            })
            .collect();

        Self {
            people: Arc::new(people),
            localities: Arc::new(localities),
            agents: Arc::new(agents),
        }
    }
}

impl LocalityLookup for InMemoryDirectory {
    fn locality_by_code(&self, code: &str) -> Result<Option<Locality>, RepositoryError> {
        Ok(self
            .localities
            .iter()
            .find(|locality| locality.code.eq_ignore_ascii_case(code))
            .cloned())
    }
}

impl PersonLookup for InMemoryDirectory {
    fn person_by_id(&self, id: PersonId) -> Result<Option<Person>, RepositoryError> {
        Ok(self.people.get(&id).cloned())
    }
}

impl AgentDirectory for InMemoryDirectory {
    fn agent_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.get(&id).cloned())
    }
}

/// Writes outgoing mail to the log instead of an SMTP relay.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    outbox: Arc<Mutex<Vec<Notification>>>,
}

impl LoggingNotifier {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.outbox
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationSender for LoggingNotifier {
    fn send_to_many(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            recipients = ?notification.recipients,
            subject = %notification.subject,
            "notification dispatched"
        );
        self.outbox
            .lock()
            .map_err(|_| NotificationError::Transport("outbox poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
