use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use super::domain::{ActorRole, Phase, PhaseDescriptor, SignOff, TenderId, TenderStatus};
use super::machine::{TenderAction, TenderStateMachine, Transition, TransitionEffect, WorkflowState};

/// Audit entry for an accepted, state-changing transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionLog {
    pub action: TenderAction,
    pub role: ActorRole,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub status: TenderStatus,
    pub at: DateTime<Utc>,
}

/// Persisted tender. `version` is bumped by the repository on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderRecord {
    pub id: TenderId,
    pub title: String,
    pub direction_code: String,
    pub division_code: String,
    pub phase: Phase,
    pub status: TenderStatus,
    pub sign_offs: Vec<SignOff>,
    pub history: Vec<TransitionLog>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl TenderRecord {
    pub fn workflow_state(&self) -> WorkflowState {
        WorkflowState {
            phase: self.phase,
            status: self.status,
            signed: self
                .sign_offs
                .iter()
                .filter(|sign_off| sign_off.phase == self.phase)
                .map(|sign_off| sign_off.role)
                .collect(),
        }
    }

    /// Folds an accepted transition into the record. No-op effects leave it untouched.
    pub fn apply(
        &mut self,
        role: ActorRole,
        action: TenderAction,
        transition: &Transition,
        at: DateTime<Utc>,
    ) {
        if transition.effect.is_noop() {
            return;
        }

        if let TransitionEffect::SignedOff { phase, role } = transition.effect {
            self.sign_offs.push(SignOff {
                phase,
                role,
                signed_at: at,
            });
        }

        self.history.push(TransitionLog {
            action,
            role,
            from_phase: self.phase,
            to_phase: transition.state.phase,
            status: transition.state.status,
            at,
        });
        self.phase = transition.state.phase;
        self.status = transition.state.status;
        self.updated_at = at;
    }

    pub fn view(&self, machine: &TenderStateMachine) -> TenderView {
        let state = self.workflow_state();
        TenderView {
            id: self.id.clone(),
            title: self.title.clone(),
            direction_code: self.direction_code.clone(),
            division_code: self.division_code.clone(),
            phase: self.phase.describe(),
            status: self.status,
            status_label: self.status.label(),
            signed: state.signed.clone(),
            awaiting: machine.awaiting(&state),
            sign_offs: self.sign_offs.clone(),
            history: self.history.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

/// Read model handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct TenderView {
    pub id: TenderId,
    pub title: String,
    pub direction_code: String,
    pub division_code: String,
    pub phase: PhaseDescriptor,
    pub status: TenderStatus,
    pub status_label: &'static str,
    pub signed: Vec<ActorRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<ActorRole>,
    pub sign_offs: Vec<SignOff>,
    pub history: Vec<TransitionLog>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Conjunctive listing filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TenderFilter {
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default, deserialize_with = "parse_registry_value")]
    pub status: Option<TenderStatus>,
    #[serde(default, deserialize_with = "parse_registry_value")]
    pub phase: Option<Phase>,
}

/// Query values go through the registry parsers, so `phase=1` and
/// `status=Active` are accepted the same way the CSV import accepts them.
fn parse_registry_value<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| value.parse().map_err(de::Error::custom))
        .transpose()
}

impl TenderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, record: &TenderRecord) -> bool {
        self.direction
            .as_deref()
            .map_or(true, |code| record.direction_code == code)
            && self
                .division
                .as_deref()
                .map_or(true, |code| record.division_code == code)
            && self.status.map_or(true, |status| record.status == status)
            && self.phase.map_or(true, |phase| record.phase == phase)
    }
}

/// Storage seam for tender records.
///
/// `save` is a compare-and-swap on `version`: it must fail with
/// [`RepositoryError::ConcurrentModification`] when the stored version differs from
/// `expected_version`, and otherwise store the record with `expected_version + 1`.
pub trait TenderRepository: Send + Sync {
    fn insert(&self, record: TenderRecord) -> Result<TenderRecord, RepositoryError>;
    fn load(&self, id: &TenderId) -> Result<Option<TenderRecord>, RepositoryError>;
    fn save(
        &self,
        record: TenderRecord,
        expected_version: u64,
    ) -> Result<TenderRecord, RepositoryError>;
    fn list(&self, filter: &TenderFilter) -> Result<Vec<TenderRecord>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("tender {id} changed concurrently (expected version {expected}, found {found})")]
    ConcurrentModification {
        id: TenderId,
        expected: u64,
        found: u64,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Mutex-guarded map; compare and write happen under one lock acquisition.
#[derive(Debug, Default, Clone)]
pub struct MemoryTenderRepository {
    records: Arc<Mutex<BTreeMap<TenderId, TenderRecord>>>,
}

impl MemoryTenderRepository {
    fn guard(&self) -> Result<MutexGuard<'_, BTreeMap<TenderId, TenderRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("tender store mutex poisoned".to_string()))
    }
}

impl TenderRepository for MemoryTenderRepository {
    fn insert(&self, record: TenderRecord) -> Result<TenderRecord, RepositoryError> {
        let mut guard = self.guard()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn load(&self, id: &TenderId) -> Result<Option<TenderRecord>, RepositoryError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn save(
        &self,
        mut record: TenderRecord,
        expected_version: u64,
    ) -> Result<TenderRecord, RepositoryError> {
        let mut guard = self.guard()?;
        let stored = guard.get(&record.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::ConcurrentModification {
                id: record.id.clone(),
                expected: expected_version,
                found: stored.version,
            });
        }
        record.version = expected_version + 1;
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn list(&self, filter: &TenderFilter) -> Result<Vec<TenderRecord>, RepositoryError> {
        Ok(self
            .guard()?
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }
}
