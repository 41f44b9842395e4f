use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::EnterpriseKind;

/// Fixed tariff applied to every registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub registration: Decimal,
    pub service: Decimal,
    pub publication: Decimal,
    /// Charged to companies for each participant beyond the first.
    pub per_extra_participant: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            registration: Decimal::new(7_000, 0),
            service: Decimal::new(3_000, 0),
            publication: Decimal::new(2_000, 0),
            per_extra_participant: Decimal::new(2_500, 0),
        }
    }
}

impl FeeSchedule {
    pub fn base_amount(&self) -> Decimal {
        self.registration + self.service + self.publication
    }

    /// Total amount due for a registration of `kind` with `participant_count` participants.
    pub fn compute(&self, kind: EnterpriseKind, participant_count: usize) -> Decimal {
        match kind {
            EnterpriseKind::SoleProprietorship => self.base_amount(),
            EnterpriseKind::Company => {
                let extra = participant_count.saturating_sub(1) as u64;
                self.base_amount() + self.per_extra_participant * Decimal::from(extra)
            }
        }
    }
}
