use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::clock::age_in_years;
use super::domain::{EnterpriseKind, ParticipantRole, ParticipantSubmission, PersonId};
use super::repository::{PersonLookup, RepositoryError};

const LEGAL_AGE: i32 = 18;

/// Validation errors raised by the shareholding validator. `position` is 1-based.
#[derive(Debug, thiserror::Error)]
pub enum ShareholdingViolation {
    #[error("at least one participant is required")]
    NoParticipants,
    #[error("a sole proprietorship has exactly one participant, found {found}")]
    SoleProprietorCount { found: usize },
    #[error("the sole proprietor must be a founder, found {role}")]
    SoleProprietorRole { role: &'static str },
    #[error("the sole proprietor must hold exactly 100%, found {percentage}%")]
    SoleProprietorShare { percentage: Decimal },
    #[error("a company has exactly one manager, found {found}")]
    ManagerCount { found: usize },
    #[error("a company needs at least one founder")]
    MissingFounder,
    #[error("participant {position} ({person_id}) ends on {end_date}, before starting on {start_date}")]
    InvertedDates {
        position: usize,
        person_id: PersonId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    #[error("participant {position} ({person_id}) holds {percentage}%, outside 0-100")]
    PercentageOutOfRange {
        position: usize,
        person_id: PersonId,
        percentage: Decimal,
    },
    #[error("founder, associate and manager percentages must total exactly 100, found {total}")]
    PercentageSum { total: Decimal },
    #[error("participant {position} references unknown person {person_id}")]
    UnknownPerson { position: usize, person_id: PersonId },
    #[error("participant {position} ({person_id}) is not authorized to hold a role")]
    Unauthorized { position: usize, person_id: PersonId },
    #[error("participant {position} ({person_id}) has no recorded birth date")]
    MissingBirthDate { position: usize, person_id: PersonId },
    #[error("participant {position} ({person_id}) has a birth date after today")]
    FutureBirthDate { position: usize, person_id: PersonId },
    #[error("participant {position} ({person_id}) is {age}; the minimum age is 18")]
    Underage {
        position: usize,
        person_id: PersonId,
        age: i32,
    },
    #[error("person registry lookup failed: {0}")]
    Lookup(#[from] RepositoryError),
}

/// Checks role cardinality, ownership shares and individual eligibility of the participants.
/// Nothing is persisted here; the caller only proceeds once every rule passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShareholdingValidator;

impl ShareholdingValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate<P>(
        &self,
        kind: EnterpriseKind,
        participants: &[ParticipantSubmission],
        people: &P,
        today: NaiveDate,
    ) -> Result<(), ShareholdingViolation>
    where
        P: PersonLookup + ?Sized,
    {
        if participants.is_empty() {
            return Err(ShareholdingViolation::NoParticipants);
        }

        match kind {
            EnterpriseKind::SoleProprietorship => Self::sole_proprietorship_rules(participants)?,
            EnterpriseKind::Company => Self::company_rules(participants)?,
        }

        for (index, participant) in participants.iter().enumerate() {
            Self::check_person(index + 1, participant, people, today)?;
        }

        Ok(())
    }

    fn sole_proprietorship_rules(
        participants: &[ParticipantSubmission],
    ) -> Result<(), ShareholdingViolation> {
        let [owner] = participants else {
            return Err(ShareholdingViolation::SoleProprietorCount {
                found: participants.len(),
            });
        };

        if owner.role != ParticipantRole::Founder {
            return Err(ShareholdingViolation::SoleProprietorRole {
                role: owner.role.label(),
            });
        }
        if owner.percentage != Decimal::ONE_HUNDRED {
            return Err(ShareholdingViolation::SoleProprietorShare {
                percentage: owner.percentage,
            });
        }

        Self::check_share_and_dates(1, owner)
    }

    fn company_rules(participants: &[ParticipantSubmission]) -> Result<(), ShareholdingViolation> {
        let managers = participants
            .iter()
            .filter(|participant| participant.role == ParticipantRole::Manager)
            .count();
        if managers != 1 {
            return Err(ShareholdingViolation::ManagerCount { found: managers });
        }

        if !participants
            .iter()
            .any(|participant| participant.role == ParticipantRole::Founder)
        {
            return Err(ShareholdingViolation::MissingFounder);
        }

        for (index, participant) in participants.iter().enumerate() {
            Self::check_share_and_dates(index + 1, participant)?;
        }

        let total: Decimal = participants
            .iter()
            .filter(|participant| {
                matches!(
                    participant.role,
                    ParticipantRole::Founder | ParticipantRole::Associate | ParticipantRole::Manager
                )
            })
            .map(|participant| participant.percentage)
            .sum();
        if total != Decimal::ONE_HUNDRED {
            return Err(ShareholdingViolation::PercentageSum { total });
        }

        Ok(())
    }

    fn check_share_and_dates(
        position: usize,
        participant: &ParticipantSubmission,
    ) -> Result<(), ShareholdingViolation> {
        if participant.start_date > participant.end_date {
            return Err(ShareholdingViolation::InvertedDates {
                position,
                person_id: participant.person_id,
                start_date: participant.start_date,
                end_date: participant.end_date,
            });
        }

        if participant.percentage < Decimal::ZERO || participant.percentage > Decimal::ONE_HUNDRED
        {
            return Err(ShareholdingViolation::PercentageOutOfRange {
                position,
                person_id: participant.person_id,
                percentage: participant.percentage,
            });
        }

        Ok(())
    }

    fn check_person<P>(
        position: usize,
        participant: &ParticipantSubmission,
        people: &P,
        today: NaiveDate,
    ) -> Result<(), ShareholdingViolation>
    where
        P: PersonLookup + ?Sized,
    {
        let person_id = participant.person_id;
        let person = people
            .person_by_id(person_id)?
            .ok_or(ShareholdingViolation::UnknownPerson {
                position,
                person_id,
            })?;

        if person.authorized == Some(false) {
            return Err(ShareholdingViolation::Unauthorized {
                position,
                person_id,
            });
        }

        let birth_date = person
            .birth_date
            .ok_or(ShareholdingViolation::MissingBirthDate {
                position,
                person_id,
            })?;
        if birth_date > today {
            return Err(ShareholdingViolation::FutureBirthDate {
                position,
                person_id,
            });
        }

        let age = age_in_years(birth_date, today);
        if age < LEGAL_AGE {
            return Err(ShareholdingViolation::Underage {
                position,
                person_id,
                age,
            });
        }

        Ok(())
    }
}
