use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::clock::Clock;
use super::domain::{AgentId, AssignmentAudit, Registration, RegistrationId, WorkflowStep};
use super::repository::{AgentDirectory, Page, PageRequest, RegistrationRepository};
use super::service::RegistrationError;

/// What happens when an agent's role does not match the step of the registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPolicy {
    /// Reject the assignment.
    Enforce,
    /// Log the mismatch, record it on the registration and assign anyway.
    #[default]
    AuditedOverride,
}

impl AssignmentPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "enforce" | "strict" => Some(Self::Enforce),
            "audit" | "audited" | "override" | "audited_override" => Some(Self::AuditedOverride),
            _ => None,
        }
    }
}

/// Step ownership: who holds a registration and the explicit moves between steps.
pub struct WorkflowAssignment<R, D> {
    repository: Arc<R>,
    agents: Arc<D>,
    clock: Arc<dyn Clock>,
    policy: AssignmentPolicy,
}

impl<R, D> WorkflowAssignment<R, D>
where
    R: RegistrationRepository + 'static,
    D: AgentDirectory + 'static,
{
    pub fn new(
        repository: Arc<R>,
        agents: Arc<D>,
        clock: Arc<dyn Clock>,
        policy: AssignmentPolicy,
    ) -> Self {
        Self {
            repository,
            agents,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> AssignmentPolicy {
        self.policy
    }

    pub fn assign_to_agent(
        &self,
        id: RegistrationId,
        agent_id: AgentId,
    ) -> Result<Registration, RegistrationError> {
        let mut registration = self.load(id)?;
        let agent = self
            .agents
            .agent_by_id(agent_id)?
            .ok_or(RegistrationError::AgentNotFound(agent_id))?;

        let step = registration.step;
        let permitted = agent.role.may_handle(step);
        if !permitted {
            match self.policy {
                AssignmentPolicy::Enforce => {
                    return Err(RegistrationError::StepPermissionDenied {
                        role: agent.role,
                        step,
                    });
                }
                AssignmentPolicy::AuditedOverride => warn!(
                    registration_id = %id,
                    %agent_id,
                    agent_role = ?agent.role,
                    required_role = ?step.required_role(),
                    %step,
                    "agent role does not cover this step; assigning under audited override"
                ),
            }
        }

        let now = self.clock.now();
        registration.assigned_agent = Some(agent_id);
        registration.last_assignment = Some(AssignmentAudit {
            agent_id,
            agent_role: agent.role,
            step,
            permitted,
            at: now,
        });
        registration.meta.touch(now);

        let stored = self.repository.update(registration)?;
        info!(registration_id = %id, %agent_id, %step, "registration assigned");
        Ok(stored)
    }

    /// Clear the assigned agent. Already unassigned registrations come back untouched.
    pub fn unassign(&self, id: RegistrationId) -> Result<Registration, RegistrationError> {
        let mut registration = self.load(id)?;
        let Some(previous) = registration.assigned_agent.take() else {
            return Ok(registration);
        };

        registration.meta.touch(self.clock.now());
        let stored = self.repository.update(registration)?;
        info!(registration_id = %id, agent_id = %previous, "registration unassigned");
        Ok(stored)
    }

    /// Hand the registration to the next step. Only the assigned agent may do this, and the
    /// registration is released so that the next step's agents can pick it up.
    pub fn advance_step(
        &self,
        id: RegistrationId,
        agent_id: AgentId,
    ) -> Result<Registration, RegistrationError> {
        let mut registration = self.load(id)?;
        if registration.assigned_agent != Some(agent_id) {
            return Err(RegistrationError::NotAssignedTo(agent_id));
        }
        let from = registration.step;
        let to = from.next().ok_or(RegistrationError::FinalStep)?;

        registration.step = to;
        registration.assigned_agent = None;
        registration.meta.touch(self.clock.now());

        let stored = self.repository.update(registration)?;
        info!(registration_id = %id, %agent_id, %from, %to, "registration advanced");
        Ok(stored)
    }

    /// Registrations waiting at `step` that nobody has picked up yet.
    pub fn list_unassigned_for_step(
        &self,
        step: WorkflowStep,
        page: PageRequest,
    ) -> Result<Page<Registration>, RegistrationError> {
        Ok(self
            .repository
            .unassigned_at_step(step, page.normalized())?)
    }

    pub fn list_assigned_to_agent(
        &self,
        agent_id: AgentId,
        page: PageRequest,
    ) -> Result<Page<Registration>, RegistrationError> {
        Ok(self.repository.assigned_to(agent_id, page.normalized())?)
    }

    fn load(&self, id: RegistrationId) -> Result<Registration, RegistrationError> {
        self.repository
            .fetch(id)?
            .map(|record| record.registration)
            .ok_or(RegistrationError::RegistrationNotFound(id))
    }
}
