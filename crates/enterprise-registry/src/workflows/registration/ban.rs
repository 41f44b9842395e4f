use std::sync::Arc;

use tracing::info;

use super::clock::Clock;
use super::domain::{BanStatus, Registration, RegistrationId};
use super::repository::{Directory, NotificationSender, RegistrationRepository};
use super::service::{notify_founders, RegistrationError};

const BANNED_SUBJECT: &str = "Enterprise registration suspended";

/// Ban/unban audit trail, independent of the workflow step.
pub struct BanAudit<R, D, N> {
    repository: Arc<R>,
    directory: Arc<D>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
}

impl<R, D, N> BanAudit<R, D, N>
where
    R: RegistrationRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        repository: Arc<R>,
        directory: Arc<D>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            directory,
            notifier,
            clock,
        }
    }

    pub fn ban(&self, id: RegistrationId, reason: &str) -> Result<Registration, RegistrationError> {
        let mut record = self
            .repository
            .fetch(id)?
            .ok_or(RegistrationError::RegistrationNotFound(id))?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RegistrationError::BlankBanReason);
        }
        if record.registration.is_banned() {
            return Err(RegistrationError::AlreadyBanned);
        }

        let now = self.clock.now();
        record.registration.ban = BanStatus::Banned {
            reason: reason.to_string(),
            banned_at: now,
        };
        record.registration.meta.touch(now);

        let stored = self.repository.update(record.registration)?;
        info!(registration_id = %id, reference = %stored.reference(), reason, "registration banned");

        record.registration = stored;
        let body = format!(
            "The registration of {} (reference {}) has been suspended. Reason: {}.",
            record.registration.legal_name,
            record.registration.reference(),
            reason
        );
        notify_founders(
            &*self.directory,
            &*self.notifier,
            &record,
            BANNED_SUBJECT,
            &body,
        );

        Ok(record.registration)
    }

    /// Lift a ban. Registrations that are not banned come back untouched.
    pub fn unban(&self, id: RegistrationId) -> Result<Registration, RegistrationError> {
        let mut registration = self
            .repository
            .fetch(id)?
            .map(|record| record.registration)
            .ok_or(RegistrationError::RegistrationNotFound(id))?;

        if !registration.is_banned() {
            return Ok(registration);
        }

        registration.ban = BanStatus::Active;
        registration.meta.touch(self.clock.now());

        let stored = self.repository.update(registration)?;
        info!(registration_id = %id, "registration ban lifted");
        Ok(stored)
    }
}
