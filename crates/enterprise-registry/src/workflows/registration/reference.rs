use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use super::repository::{RepositoryError, SequenceRepository};

const PREFIX: &str = "CE";
const MAX_COUNTER: u32 = 99_999;
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Registration reference in the `CE-YYYY-MM-DD-NNNNN` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    value: String,
    date: NaiveDate,
    counter: u32,
}

impl Reference {
    pub fn new(date: NaiveDate, counter: u32) -> Result<Self, ReferenceError> {
        if counter == 0 || counter > MAX_COUNTER {
            return Err(ReferenceError::Exhausted { year: date.year() });
        }

        Ok(Self {
            value: format!("{PREFIX}-{}-{counter:05}", date.format("%Y-%m-%d")),
            date,
            counter,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, ReferenceError> {
        let malformed = || ReferenceError::Malformed(raw.to_string());

        let rest = raw
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(malformed)?;
        // YYYY-MM-DD is 10 characters, followed by '-' and 5 digits.
        if !rest.is_ascii() || rest.len() != 16 || rest.as_bytes()[10] != b'-' {
            return Err(malformed());
        }
        let (date_part, counter_part) = (&rest[..10], &rest[11..]);
        if !counter_part.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(malformed());
        }

        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| malformed())?;
        let counter = counter_part.parse::<u32>().map_err(|_| malformed())?;
        let reference = Self::new(date, counter).map_err(|_| malformed())?;
        if reference.value != raw {
            return Err(malformed());
        }
        Ok(reference)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Last issued counter for one calendar year, guarded by `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSequence {
    pub year: i32,
    pub counter: u32,
    pub version: u64,
}

impl YearSequence {
    pub fn first(year: i32) -> Self {
        Self {
            year,
            counter: 0,
            version: 0,
        }
    }
}

/// Bounded retry with doubling backoff around the year-counter compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(5))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("reference counter for {year} could not be updated after {attempts} attempts")]
    Contention { year: i32, attempts: u32 },
    #[error("reference counter for {year} is exhausted")]
    Exhausted { year: i32 },
    #[error("'{0}' is not a CE-YYYY-MM-DD-NNNNN reference")]
    Malformed(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Issues year-scoped references. Holds no state of its own beyond the sequence store.
pub struct ReferenceAllocator<S> {
    sequences: Arc<S>,
    policy: RetryPolicy,
}

impl<S> ReferenceAllocator<S>
where
    S: SequenceRepository + 'static,
{
    pub fn new(sequences: Arc<S>, policy: RetryPolicy) -> Self {
        Self { sequences, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Increment the counter for `today`'s year and format the reference.
    pub fn allocate(&self, today: NaiveDate) -> Result<Reference, ReferenceError> {
        let year = today.year();

        for attempt in 1..=self.policy.max_attempts {
            let current = self.sequences.load_sequence(year)?;
            let expected_version = current.map(|sequence| sequence.version);
            let base = current.unwrap_or_else(|| YearSequence::first(year));

            if base.counter >= MAX_COUNTER {
                warn!(year, "reference counter exhausted");
                return Err(ReferenceError::Exhausted { year });
            }

            let next = YearSequence {
                year,
                counter: base.counter + 1,
                version: base.version + 1,
            };

            match self.sequences.store_sequence(next, expected_version) {
                Ok(()) => {
                    let reference = Reference::new(today, next.counter)?;
                    info!(%reference, year, attempt, "registration reference issued");
                    return Ok(reference);
                }
                Err(RepositoryError::Conflict) => {
                    debug!(year, attempt, "year sequence changed concurrently, retrying");
                    if attempt < self.policy.max_attempts {
                        let pause = self.policy.backoff_for(attempt);
                        if !pause.is_zero() {
                            std::thread::sleep(pause);
                        }
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(
            year,
            attempts = self.policy.max_attempts,
            "reference allocation gave up under contention"
        );
        Err(ReferenceError::Contention {
            year,
            attempts: self.policy.max_attempts,
        })
    }
}
