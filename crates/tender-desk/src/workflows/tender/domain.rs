use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Collaborating services allowed to act on a tender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActorRole {
    #[serde(rename = "ST")]
    TechnicalService,
    #[serde(rename = "SM")]
    MarketsService,
    #[serde(rename = "CE")]
    StateControl,
    #[serde(rename = "SB")]
    BudgetService,
    #[serde(rename = "SOR")]
    SchedulingService,
    #[serde(rename = "TP")]
    TreasurerPayer,
    #[serde(rename = "ADMIN")]
    Admin,
}

impl ActorRole {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::TechnicalService,
            Self::MarketsService,
            Self::StateControl,
            Self::BudgetService,
            Self::SchedulingService,
            Self::TreasurerPayer,
            Self::Admin,
        ]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::TechnicalService => "ST",
            Self::MarketsService => "SM",
            Self::StateControl => "CE",
            Self::BudgetService => "SB",
            Self::SchedulingService => "SOR",
            Self::TreasurerPayer => "TP",
            Self::Admin => "ADMIN",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::TechnicalService => "Service Technique",
            Self::MarketsService => "Service des Marchés",
            Self::StateControl => "Contrôle d'État",
            Self::BudgetService => "Service Budgétaire",
            Self::SchedulingService => "Service d'Ordonnancement",
            Self::TreasurerPayer => "Trésorier-Payeur",
            Self::Admin => "Administrateur",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::TechnicalService => "#2563eb",
            Self::MarketsService => "#7c3aed",
            Self::StateControl => "#dc2626",
            Self::BudgetService => "#059669",
            Self::SchedulingService => "#d97706",
            Self::TreasurerPayer => "#0891b2",
            Self::Admin => "#374151",
        }
    }

    pub const fn has_admin_capability(self) -> bool {
        matches!(self, Self::Admin)
    }

    pub const fn describe(self) -> RoleDescriptor {
        RoleDescriptor {
            role: self,
            code: self.code(),
            label: self.label(),
            color: self.color(),
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ActorRole {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ordered()
            .into_iter()
            .find(|role| role.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RegistryError::UnknownRole(value.to_string()))
    }
}

/// Tender lifecycle phases, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preparation = 1,
    Execution = 2,
    Payments = 3,
}

impl Phase {
    pub const fn ordered() -> [Self; 3] {
        [Self::Preparation, Self::Execution, Self::Payments]
    }

    pub const fn order(self) -> u8 {
        self as u8
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Preparation => Some(Self::Execution),
            Self::Execution => Some(Self::Payments),
            Self::Payments => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Preparation => "Préparation",
            Self::Execution => "Exécution",
            Self::Payments => "Paiements",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::Preparation => "#f59e0b",
            Self::Execution => "#3b82f6",
            Self::Payments => "#10b981",
        }
    }

    pub const fn describe(self) -> PhaseDescriptor {
        PhaseDescriptor {
            phase: self,
            label: self.label(),
            color: self.color(),
            order: self.order(),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.order(), self.label())
    }
}

impl FromStr for Phase {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "preparation" => Ok(Self::Preparation),
            "2" | "execution" => Ok(Self::Execution),
            "3" | "payments" => Ok(Self::Payments),
            _ => Err(RegistryError::UnknownPhase(value.to_string())),
        }
    }
}

/// Fixed 1 < 2 < 3 ordering over phases.
pub fn compare_phase(a: Phase, b: Phase) -> Ordering {
    a.order().cmp(&b.order())
}

/// Aggregate status of a tender; `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Active,
    Completed,
    Cancelled,
}

impl TenderStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "En cours",
            Self::Completed => "Terminé",
            Self::Cancelled => "Annulé",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl FromStr for TenderStatus {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(RegistryError::UnknownStatus(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleDescriptor {
    pub role: ActorRole,
    pub code: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseDescriptor {
    pub phase: Phase,
    pub label: &'static str,
    pub color: &'static str,
    pub order: u8,
}

/// Raised when outside text does not name a member of a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown actor role '{0}'")]
    UnknownRole(String),
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),
    #[error("unknown tender status '{0}'")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenderId(pub String);

impl fmt::Display for TenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Approval recorded by one role for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOff {
    pub phase: Phase,
    pub role: ActorRole,
    pub signed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_compare_by_fixed_order() {
        assert_eq!(
            compare_phase(Phase::Preparation, Phase::Payments),
            Ordering::Less
        );
        assert_eq!(
            compare_phase(Phase::Execution, Phase::Execution),
            Ordering::Equal
        );
        assert_eq!(
            compare_phase(Phase::Payments, Phase::Execution),
            Ordering::Greater
        );
        assert_eq!(Phase::Payments.next(), None);
    }

    #[test]
    fn roles_parse_case_insensitively_from_codes() {
        assert_eq!(
            "ce".parse::<ActorRole>().expect("known role"),
            ActorRole::StateControl
        );
        assert_eq!(
            " admin ".parse::<ActorRole>().expect("known role"),
            ActorRole::Admin
        );
        assert_eq!(
            "DG".parse::<ActorRole>(),
            Err(RegistryError::UnknownRole("DG".to_string()))
        );
    }

    #[test]
    fn every_role_carries_display_metadata() {
        for role in ActorRole::ordered() {
            let descriptor = role.describe();
            assert_eq!(descriptor.code.parse::<ActorRole>(), Ok(role));
            assert!(descriptor.color.starts_with('#'));
            assert!(!descriptor.label.is_empty());
        }
        assert!(ActorRole::Admin.has_admin_capability());
        assert!(!ActorRole::MarketsService.has_admin_capability());
    }

    #[test]
    fn phase_parsing_accepts_numbers_and_names() {
        assert_eq!("2".parse::<Phase>(), Ok(Phase::Execution));
        assert_eq!("Payments".parse::<Phase>(), Ok(Phase::Payments));
        assert!(matches!(
            "4".parse::<Phase>(),
            Err(RegistryError::UnknownPhase(_))
        ));
        assert_eq!(Phase::Payments.describe().order, 3);
    }

    #[test]
    fn role_serializes_as_code() {
        let json = serde_json::to_string(&ActorRole::TreasurerPayer).expect("serializes");
        assert_eq!(json, "\"TP\"");
    }
}
