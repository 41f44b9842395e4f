use crate::infra::{
    seeded_agent_id, InMemoryDirectory, InMemoryRegistry, LoggingNotifier, DEMO_ASSOCIATE,
    DEMO_FOUNDER, DEMO_MANAGER, DEMO_MINOR,
};
use chrono::{Duration, NaiveDate};
use clap::Args;
use enterprise_registry::config::{AppConfig, ConfigError};
use enterprise_registry::error::AppError;
use enterprise_registry::workflows::registration::{
    AgentRole, AssignmentPolicy, Clock, CreationStatus, DeclaredFacts, EnterpriseKind,
    PageRequest, ParticipantRole, ParticipantSubmission, PersonId, Reference, RegistrationError,
    RegistrationSubmission, RegistryServices, RegistrySettings, SystemClock, WorkflowStep,
};
use rust_decimal::Decimal;
use std::sync::Arc;

type DemoServices = RegistryServices<InMemoryRegistry, InMemoryDirectory, LoggingNotifier>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Assignment policy for role mismatches: `enforce` or `audit`. Defaults to APP_ASSIGNMENT_POLICY.
    #[arg(long)]
    pub(crate) policy: Option<String>,
    /// Reference time zone as minutes east of UTC. Defaults to APP_UTC_OFFSET_MINUTES.
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) utc_offset_minutes: Option<i32>,
}

/// What the walkthrough produced, kept for assertions.
#[derive(Debug)]
pub(crate) struct DemoOutcome {
    pub(crate) reference: Reference,
    pub(crate) total_fee: Decimal,
    pub(crate) final_step: WorkflowStep,
    pub(crate) override_recorded: Option<bool>,
    pub(crate) notifications: usize,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        policy,
        utc_offset_minutes,
    } = args;

    let mut workflow = AppConfig::load()?.workflow;
    if let Some(raw) = policy {
        workflow.assignment_policy =
            AssignmentPolicy::parse(&raw).ok_or(ConfigError::InvalidAssignmentPolicy)?;
    }
    if let Some(minutes) = utc_offset_minutes {
        if !(-720..=840).contains(&minutes) {
            return Err(ConfigError::InvalidUtcOffset.into());
        }
        workflow.utc_offset_minutes = minutes;
    }

    let clock = SystemClock::with_offset_minutes(workflow.utc_offset_minutes);
    let notifier = Arc::new(LoggingNotifier::default());
    let services = RegistryServices::new(
        Arc::new(InMemoryRegistry::default()),
        Arc::new(InMemoryDirectory::default()),
        notifier.clone(),
        Arc::new(clock),
        RegistrySettings::from(&workflow),
    );

    println!("Enterprise registration demo");
    println!(
        "- reference date {} (UTC{:+} min), assignment policy {:?}",
        clock.today(),
        workflow.utc_offset_minutes,
        workflow.assignment_policy
    );

    let outcome = walkthrough(&services, &notifier, clock.today())?;

    println!("\nSummary");
    println!("- reference: {}", outcome.reference);
    println!("- amount due: {} MRU", outcome.total_fee);
    println!("- final step: {}", outcome.final_step);
    match outcome.override_recorded {
        Some(permitted) => println!("- last assignment permitted by role matrix: {permitted}"),
        None => println!("- mismatched assignment was refused"),
    }
    println!("- notifications sent: {}", outcome.notifications);

    Ok(())
}

fn participant(
    person_id: PersonId,
    role: ParticipantRole,
    percentage: i64,
    today: NaiveDate,
) -> ParticipantSubmission {
    ParticipantSubmission {
        person_id,
        role,
        percentage: Decimal::new(percentage, 0),
        start_date: today,
        end_date: today + Duration::days(365 * 5),
    }
}

fn demo_submission(participants: Vec<ParticipantSubmission>) -> RegistrationSubmission {
    RegistrationSubmission {
        legal_name: Some("Societe Mauritanienne de Logistique".to_string()),
        short_name: Some("SML".to_string()),
        capital: Some("1 500 000 MRU".to_string()),
        facts: DeclaredFacts {
            judicial_extract_provided: true,
            manager_authorization: true,
            ..DeclaredFacts::default()
        },
        kind: Some(EnterpriseKind::Company),
        creation_status: Some(CreationStatus::Pending),
        step: Some(WorkflowStep::Reception),
        legal_form: Some("SARL".to_string()),
        primary_activity: Some("transport-logistique".to_string()),
        secondary_activity: Some("entreposage".to_string()),
        locality_code: Some("NKC-TVZ".to_string()),
        participants,
    }
}

fn walkthrough(
    services: &DemoServices,
    notifier: &LoggingNotifier,
    today: NaiveDate,
) -> Result<DemoOutcome, AppError> {
    println!("\n1. Submission with an underage associate");
    let rejected = demo_submission(vec![
        participant(DEMO_FOUNDER, ParticipantRole::Founder, 60, today),
        participant(DEMO_MANAGER, ParticipantRole::Manager, 25, today),
        participant(DEMO_MINOR, ParticipantRole::Associate, 15, today),
    ]);
    match services.registrations.create(rejected) {
        Err(err) => println!("   rejected: {}", err.public_message()),
        Ok(record) => println!(
            "   unexpectedly accepted as {}",
            record.registration.reference()
        ),
    }

    println!("\n2. Corrected submission");
    let record = services.registrations.create(demo_submission(vec![
        participant(DEMO_FOUNDER, ParticipantRole::Founder, 60, today),
        participant(DEMO_MANAGER, ParticipantRole::Manager, 25, today),
        participant(DEMO_ASSOCIATE, ParticipantRole::Associate, 15, today),
    ]))?;
    let registration = &record.registration;
    let id = registration.id();
    println!(
        "   {} registered as {} (capital {}, {} participants, amount due {})",
        registration.legal_name,
        registration.reference(),
        registration.capital,
        record.participants.len(),
        registration.total_fee
    );

    let waiting = services
        .assignments
        .list_unassigned_for_step(WorkflowStep::Reception, PageRequest::default())?;
    println!("   reception queue holds {} file(s)", waiting.total);

    println!("\n3. Reception hands the file to the registrar");
    let reception = seeded_agent_id(AgentRole::ReceptionAgent);
    services.assignments.assign_to_agent(id, reception)?;
    let advanced = services.assignments.advance_step(id, reception)?;
    println!("   now at step: {}", advanced.step);

    println!("\n4. Tax agent tries to take the registrar step");
    let tax = seeded_agent_id(AgentRole::TaxAgent);
    let override_recorded = match services.assignments.assign_to_agent(id, tax) {
        Ok(assigned) => {
            let permitted = assigned
                .last_assignment
                .as_ref()
                .map(|audit| audit.permitted);
            println!("   assigned under audit (permitted: {permitted:?})");
            services.assignments.unassign(id)?;
            permitted
        }
        Err(err @ RegistrationError::StepPermissionDenied { .. }) => {
            println!("   refused: {err}");
            None
        }
        Err(err) => return Err(err.into()),
    };

    let registrar = seeded_agent_id(AgentRole::RegistrarAgent);
    services.assignments.assign_to_agent(id, registrar)?;
    let advanced = services.assignments.advance_step(id, registrar)?;
    println!("   registrar advanced the file to: {}", advanced.step);

    println!("\n5. Administrator suspends and reinstates the registration");
    let banned = services
        .bans
        .ban(id, "statutes signed by a person without mandate")?;
    println!(
        "   banned at {} for: {}",
        banned
            .ban
            .banned_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_default(),
        banned.ban.reason().unwrap_or_default()
    );
    let lifted = services.bans.unban(id)?;
    println!("   ban lifted, still at step {}", lifted.step);

    Ok(DemoOutcome {
        reference: record.registration.reference().clone(),
        total_fee: record.registration.total_fee,
        final_step: lifted.step,
        override_recorded,
        notifications: notifier.sent().len(),
    })
}
