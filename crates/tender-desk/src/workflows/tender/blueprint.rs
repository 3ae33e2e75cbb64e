use super::domain::{ActorRole, Phase};

/// Ordered sign-offs each phase needs before it can be closed.
#[derive(Debug, Clone)]
pub struct WorkflowBlueprint {
    preparation: Vec<ActorRole>,
    execution: Vec<ActorRole>,
    payments: Vec<ActorRole>,
}

impl WorkflowBlueprint {
    pub fn standard() -> Self {
        Self {
            preparation: vec![ActorRole::TechnicalService, ActorRole::StateControl],
            execution: vec![ActorRole::TechnicalService],
            payments: vec![ActorRole::BudgetService, ActorRole::TreasurerPayer],
        }
    }

    pub fn required_sign_offs(&self, phase: Phase) -> &[ActorRole] {
        match phase {
            Phase::Preparation => &self.preparation,
            Phase::Execution => &self.execution,
            Phase::Payments => &self.payments,
        }
    }

    /// Role whose sign-off closes `phase`.
    pub fn final_signatory(&self, phase: Phase) -> Option<ActorRole> {
        self.required_sign_offs(phase).last().copied()
    }

    /// First required role of `phase` that has not signed yet.
    pub fn next_required(&self, phase: Phase, signed: &[ActorRole]) -> Option<ActorRole> {
        self.required_sign_offs(phase)
            .iter()
            .copied()
            .find(|role| !signed.contains(role))
    }

    pub fn requires(&self, phase: Phase, role: ActorRole) -> bool {
        self.required_sign_offs(phase).contains(&role)
    }
}

impl Default for WorkflowBlueprint {
    fn default() -> Self {
        Self::standard()
    }
}
