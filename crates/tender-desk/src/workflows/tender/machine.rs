use super::blueprint::WorkflowBlueprint;
use super::domain::{ActorRole, Phase, TenderStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow-relevant projection of a tender: where it is and who has signed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkflowState {
    pub phase: Phase,
    pub status: TenderStatus,
    /// Sign-offs collected for `phase`, in signature order.
    pub signed: Vec<ActorRole>,
}

impl WorkflowState {
    pub fn initial() -> Self {
        Self {
            phase: Phase::Preparation,
            status: TenderStatus::Active,
            signed: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderAction {
    SignOff,
    AdvancePhase,
    Complete,
    Cancel,
}

impl TenderAction {
    pub const fn ordered() -> [Self; 4] {
        [Self::SignOff, Self::AdvancePhase, Self::Complete, Self::Cancel]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SignOff => "sign_off",
            Self::AdvancePhase => "advance_phase",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

/// What an accepted transition did, so the record layer can apply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum TransitionEffect {
    SignedOff { phase: Phase, role: ActorRole },
    PhaseAdvanced { from: Phase, to: Phase },
    Completed,
    AlreadyCompleted,
    Cancelled { phase: Phase },
}

impl TransitionEffect {
    pub fn is_noop(self) -> bool {
        matches!(self, Self::AlreadyCompleted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: WorkflowState,
    pub effect: TransitionEffect,
}

/// The unmet condition behind a rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Precondition {
    MissingSignOff {
        phase: Phase,
        role: ActorRole,
    },
    Terminal {
        status: TenderStatus,
    },
    SignOffNotRequired {
        phase: Phase,
        role: ActorRole,
    },
    AlreadySignedOff {
        phase: Phase,
        role: ActorRole,
    },
    NotFinalSignatory {
        phase: Phase,
        expected: ActorRole,
        actual: ActorRole,
    },
    FinalPhaseRequiresComplete,
    NotInFinalPhase {
        phase: Phase,
    },
    AdminCapabilityRequired {
        role: ActorRole,
    },
    MarketsServiceCreatesTenders {
        role: ActorRole,
    },
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::MissingSignOff { phase, role } => {
                write!(f, "missing {role} sign-off for phase {phase}")
            }
            Precondition::Terminal { status } => {
                write!(f, "tender is already {}", status.label())
            }
            Precondition::SignOffNotRequired { phase, role } => {
                write!(f, "{role} does not sign off phase {phase}")
            }
            Precondition::AlreadySignedOff { phase, role } => {
                write!(f, "{role} already signed off phase {phase}")
            }
            Precondition::NotFinalSignatory {
                phase,
                expected,
                actual,
            } => write!(
                f,
                "only {expected} may close phase {phase} (requested by {actual})"
            ),
            Precondition::FinalPhaseRequiresComplete => {
                write!(f, "the payments phase is closed with complete, not advance_phase")
            }
            Precondition::NotInFinalPhase { phase } => {
                write!(f, "complete is only valid in the payments phase (currently {phase})")
            }
            Precondition::AdminCapabilityRequired { role } => {
                write!(f, "{role} lacks the ADMIN capability required to cancel")
            }
            Precondition::MarketsServiceCreatesTenders { role } => {
                write!(f, "tenders are opened by SM, not {role}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid transition: {0}")]
    InvalidTransition(Precondition),
}

impl TransitionError {
    pub fn precondition(&self) -> Precondition {
        match self {
            TransitionError::InvalidTransition(precondition) => *precondition,
        }
    }
}

fn reject(precondition: Precondition) -> TransitionError {
    TransitionError::InvalidTransition(precondition)
}

/// Pure transition function over [`WorkflowState`].
///
/// Never mutates its input: a rejection leaves the caller's state untouched and an
/// acceptance hands back a fresh state plus the effect that produced it.
#[derive(Debug, Clone, Default)]
pub struct TenderStateMachine {
    blueprint: WorkflowBlueprint,
}

impl TenderStateMachine {
    pub fn new(blueprint: WorkflowBlueprint) -> Self {
        Self { blueprint }
    }

    pub fn blueprint(&self) -> &WorkflowBlueprint {
        &self.blueprint
    }

    /// Only the Markets Service opens a tender.
    pub fn open(&self, role: ActorRole) -> Result<WorkflowState, TransitionError> {
        if role != ActorRole::MarketsService {
            return Err(reject(Precondition::MarketsServiceCreatesTenders { role }));
        }
        Ok(WorkflowState::initial())
    }

    pub fn attempt_transition(
        &self,
        current: &WorkflowState,
        role: ActorRole,
        action: TenderAction,
    ) -> Result<Transition, TransitionError> {
        match action {
            TenderAction::SignOff => self.sign_off(current, role),
            TenderAction::AdvancePhase => self.advance_phase(current, role),
            TenderAction::Complete => self.complete(current, role),
            TenderAction::Cancel => self.cancel(current, role),
        }
    }

    /// Role the current phase is waiting on, if the tender is still active.
    pub fn awaiting(&self, state: &WorkflowState) -> Option<ActorRole> {
        if state.is_terminal() {
            return None;
        }
        self.blueprint
            .next_required(state.phase, &state.signed)
            .or_else(|| self.blueprint.final_signatory(state.phase))
    }

    fn sign_off(
        &self,
        current: &WorkflowState,
        role: ActorRole,
    ) -> Result<Transition, TransitionError> {
        ensure_active(current)?;
        let phase = current.phase;

        if !self.blueprint.requires(phase, role) {
            return Err(reject(Precondition::SignOffNotRequired { phase, role }));
        }
        if current.signed.contains(&role) {
            return Err(reject(Precondition::AlreadySignedOff { phase, role }));
        }
        match self.blueprint.next_required(phase, &current.signed) {
            Some(next) if next == role => {}
            Some(missing) => {
                return Err(reject(Precondition::MissingSignOff {
                    phase,
                    role: missing,
                }))
            }
            None => return Err(reject(Precondition::AlreadySignedOff { phase, role })),
        }

        let mut state = current.clone();
        state.signed.push(role);
        Ok(Transition {
            state,
            effect: TransitionEffect::SignedOff { phase, role },
        })
    }

    fn advance_phase(
        &self,
        current: &WorkflowState,
        role: ActorRole,
    ) -> Result<Transition, TransitionError> {
        ensure_active(current)?;
        let from = current.phase;
        let Some(to) = from.next() else {
            return Err(reject(Precondition::FinalPhaseRequiresComplete));
        };
        self.ensure_closable(current, role)?;

        Ok(Transition {
            state: WorkflowState {
                phase: to,
                status: TenderStatus::Active,
                signed: Vec::new(),
            },
            effect: TransitionEffect::PhaseAdvanced { from, to },
        })
    }

    fn complete(
        &self,
        current: &WorkflowState,
        role: ActorRole,
    ) -> Result<Transition, TransitionError> {
        if current.status == TenderStatus::Completed {
            return Ok(Transition {
                state: current.clone(),
                effect: TransitionEffect::AlreadyCompleted,
            });
        }
        ensure_active(current)?;
        if current.phase != Phase::Payments {
            return Err(reject(Precondition::NotInFinalPhase {
                phase: current.phase,
            }));
        }
        self.ensure_closable(current, role)?;

        let mut state = current.clone();
        state.status = TenderStatus::Completed;
        Ok(Transition {
            state,
            effect: TransitionEffect::Completed,
        })
    }

    fn cancel(
        &self,
        current: &WorkflowState,
        role: ActorRole,
    ) -> Result<Transition, TransitionError> {
        ensure_active(current)?;
        if !role.has_admin_capability() {
            return Err(reject(Precondition::AdminCapabilityRequired { role }));
        }

        let mut state = current.clone();
        state.status = TenderStatus::Cancelled;
        Ok(Transition {
            state,
            effect: TransitionEffect::Cancelled {
                phase: current.phase,
            },
        })
    }

    /// All sign-offs present and `role` holds the last one.
    fn ensure_closable(
        &self,
        current: &WorkflowState,
        role: ActorRole,
    ) -> Result<(), TransitionError> {
        let phase = current.phase;
        if let Some(missing) = self.blueprint.next_required(phase, &current.signed) {
            return Err(reject(Precondition::MissingSignOff {
                phase,
                role: missing,
            }));
        }
        match self.blueprint.final_signatory(phase) {
            Some(expected) if expected != role => {
                Err(reject(Precondition::NotFinalSignatory {
                    phase,
                    expected,
                    actual: role,
                }))
            }
            _ => Ok(()),
        }
    }
}

fn ensure_active(current: &WorkflowState) -> Result<(), TransitionError> {
    if current.is_terminal() {
        return Err(reject(Precondition::Terminal {
            status: current.status,
        }));
    }
    Ok(())
}
