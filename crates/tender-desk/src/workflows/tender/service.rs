use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;

use super::dashboard::DashboardSummary;
use super::domain::{ActorRole, TenderId};
use super::machine::{TenderAction, TenderStateMachine, TransitionEffect, TransitionError};
use super::organization::{DirectoryError, OrganizationDirectory};
use super::repository::{RepositoryError, TenderFilter, TenderRecord, TenderRepository};

/// Fields supplied by the Markets Service when opening a tender.
#[derive(Debug, Clone, Deserialize)]
pub struct TenderDraft {
    pub title: String,
    pub division: String,
}

/// Result of an accepted action: the stored record and what changed.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub record: TenderRecord,
    pub effect: TransitionEffect,
}

/// Service composing the directory, state machine, and repository.
pub struct TenderWorkflowService<R> {
    repository: Arc<R>,
    directory: &'static OrganizationDirectory,
    machine: TenderStateMachine,
    config: WorkflowConfig,
    sequence: AtomicU64,
}

impl<R> TenderWorkflowService<R>
where
    R: TenderRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: WorkflowConfig) -> Self {
        Self::with_parts(
            repository,
            OrganizationDirectory::standard(),
            TenderStateMachine::default(),
            config,
        )
    }

    pub fn with_parts(
        repository: Arc<R>,
        directory: &'static OrganizationDirectory,
        machine: TenderStateMachine,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            repository,
            directory,
            machine,
            config,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn directory(&self) -> &'static OrganizationDirectory {
        self.directory
    }

    pub fn machine(&self) -> &TenderStateMachine {
        &self.machine
    }

    /// Open a tender in (Preparation, active). Only SM may do this.
    pub fn create(
        &self,
        draft: TenderDraft,
        role: ActorRole,
        at: DateTime<Utc>,
    ) -> Result<TenderRecord, TenderServiceError> {
        let state = self.machine.open(role)?;
        let direction = self.directory.resolve_direction(&draft.division)?;

        loop {
            let record = TenderRecord {
                id: self.next_id(),
                title: draft.title.clone(),
                direction_code: direction.to_string(),
                division_code: draft.division.clone(),
                phase: state.phase,
                status: state.status,
                sign_offs: Vec::new(),
                history: Vec::new(),
                created_at: at,
                updated_at: at,
                version: 0,
            };

            // Seeded records may already occupy low sequence numbers.
            match self.repository.insert(record) {
                Ok(stored) => {
                    info!(tender = %stored.id, division = %stored.division_code, "tender opened");
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Single load/apply/save round. Rejections and lost races write nothing.
    pub fn act(
        &self,
        id: &TenderId,
        role: ActorRole,
        action: TenderAction,
        at: DateTime<Utc>,
    ) -> Result<ActionOutcome, TenderServiceError> {
        let mut record = self.get(id)?;
        let expected_version = record.version;

        let transition = match self
            .machine
            .attempt_transition(&record.workflow_state(), role, action)
        {
            Ok(transition) => transition,
            Err(err) => {
                warn!(tender = %id, %role, action = action.label(), error = %err, "transition rejected");
                return Err(err.into());
            }
        };

        if transition.effect.is_noop() {
            return Ok(ActionOutcome {
                record,
                effect: transition.effect,
            });
        }

        record.apply(role, action, &transition, at);
        let stored = self.repository.save(record, expected_version)?;
        info!(
            tender = %id,
            %role,
            action = action.label(),
            phase = stored.phase.order(),
            status = stored.status.label(),
            "transition applied"
        );

        Ok(ActionOutcome {
            record: stored,
            effect: transition.effect,
        })
    }

    /// [`Self::act`], re-fetching after a lost compare-and-swap up to the configured
    /// number of attempts. Business-rule rejections are returned immediately.
    pub fn act_with_retry(
        &self,
        id: &TenderId,
        role: ActorRole,
        action: TenderAction,
        at: DateTime<Utc>,
    ) -> Result<ActionOutcome, TenderServiceError> {
        let attempts = self.config.max_transition_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.act(id, role, action, at) {
                Err(err) if err.is_concurrent_modification() && attempt < attempts => {
                    debug!(tender = %id, attempt, "concurrent modification, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub fn get(&self, id: &TenderId) -> Result<TenderRecord, TenderServiceError> {
        let record = self
            .repository
            .load(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    pub fn list(&self, filter: &TenderFilter) -> Result<Vec<TenderRecord>, TenderServiceError> {
        Ok(self.repository.list(filter)?)
    }

    /// Dashboard recomputed from the current collection.
    pub fn dashboard(&self) -> Result<DashboardSummary, TenderServiceError> {
        let tenders = self.repository.list(&TenderFilter::all())?;
        Ok(DashboardSummary::build(self.directory, &tenders))
    }

    /// Active tenders whose current phase is waiting on `role`.
    pub fn pending_for(&self, role: ActorRole) -> Result<Vec<TenderRecord>, TenderServiceError> {
        let tenders = self.repository.list(&TenderFilter::all())?;
        Ok(tenders
            .into_iter()
            .filter(|record| self.machine.awaiting(&record.workflow_state()) == Some(role))
            .collect())
    }

    fn next_id(&self) -> TenderId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        TenderId(format!("AO-{id:06}"))
    }
}

/// Error raised by the tender workflow service.
#[derive(Debug, thiserror::Error)]
pub enum TenderServiceError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TenderServiceError {
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(
            self,
            TenderServiceError::Repository(RepositoryError::ConcurrentModification { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::tender::domain::{Phase, TenderStatus};
    use crate::workflows::tender::machine::Precondition;
    use crate::workflows::tender::repository::MemoryTenderRepository;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicBool;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 9, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn draft(division: &str) -> TenderDraft {
        TenderDraft {
            title: "Fourniture de matériel informatique".to_string(),
            division: division.to_string(),
        }
    }

    fn service() -> TenderWorkflowService<MemoryTenderRepository> {
        TenderWorkflowService::new(
            Arc::new(MemoryTenderRepository::default()),
            WorkflowConfig::default(),
        )
    }

    #[test]
    fn create_resolves_direction_and_requires_markets_service() {
        let service = service();
        let record = service
            .create(draft("DSI"), ActorRole::MarketsService, at(0))
            .expect("SM opens tender");
        assert_eq!(record.id, TenderId("AO-000001".to_string()));
        assert_eq!(record.direction_code, "DAF");
        assert_eq!(record.phase, Phase::Preparation);
        assert_eq!(record.status, TenderStatus::Active);

        match service.create(draft("DSI"), ActorRole::TechnicalService, at(0)) {
            Err(TenderServiceError::Transition(err)) => assert_eq!(
                err.precondition(),
                Precondition::MarketsServiceCreatesTenders {
                    role: ActorRole::TechnicalService
                }
            ),
            other => panic!("expected transition error, got {other:?}"),
        }

        match service.create(draft("UNKNOWN"), ActorRole::MarketsService, at(0)) {
            Err(TenderServiceError::Directory(DirectoryError::UnknownDivision(code))) => {
                assert_eq!(code, "UNKNOWN")
            }
            other => panic!("expected unknown division, got {other:?}"),
        }
    }

    #[test]
    fn rejected_action_leaves_record_unchanged() {
        let service = service();
        let record = service
            .create(draft("DTX"), ActorRole::MarketsService, at(0))
            .expect("created");

        let err = service
            .act(&record.id, ActorRole::StateControl, TenderAction::SignOff, at(1))
            .expect_err("ST must sign first");
        assert!(matches!(err, TenderServiceError::Transition(_)));

        let stored = service.get(&record.id).expect("still there");
        assert_eq!(stored, record);
    }

    #[test]
    fn accepted_action_bumps_version_and_logs_history() {
        let service = service();
        let record = service
            .create(draft("DTX"), ActorRole::MarketsService, at(0))
            .expect("created");

        let outcome = service
            .act(&record.id, ActorRole::TechnicalService, TenderAction::SignOff, at(5))
            .expect("ST signs");
        assert_eq!(outcome.record.version, 1);
        assert_eq!(outcome.record.sign_offs.len(), 1);
        assert_eq!(outcome.record.sign_offs[0].signed_at, at(5));
        assert_eq!(outcome.record.history.len(), 1);
        assert_eq!(outcome.record.updated_at, at(5));
    }

    #[test]
    fn missing_tender_is_not_found() {
        let service = service();
        match service.act(
            &TenderId("AO-999999".to_string()),
            ActorRole::Admin,
            TenderAction::Cancel,
            at(0),
        ) {
            Err(TenderServiceError::Repository(RepositoryError::NotFound)) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn pending_for_lists_role_work_queue() {
        let service = service();
        let first = service
            .create(draft("DSI"), ActorRole::MarketsService, at(0))
            .expect("created");
        let second = service
            .create(draft("DCX"), ActorRole::MarketsService, at(0))
            .expect("created");
        service
            .act(&second.id, ActorRole::TechnicalService, TenderAction::SignOff, at(1))
            .expect("ST signs second");

        let st_queue: Vec<_> = service
            .pending_for(ActorRole::TechnicalService)
            .expect("queue")
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(st_queue, vec![first.id]);

        let ce_queue = service.pending_for(ActorRole::StateControl).expect("queue");
        assert_eq!(ce_queue.len(), 1);
        assert_eq!(ce_queue[0].id, second.id);
    }

    /// Repository that lets one foreign write land between the first load and save.
    #[derive(Default)]
    struct RacingRepository {
        inner: MemoryTenderRepository,
        raced: AtomicBool,
    }

    impl TenderRepository for RacingRepository {
        fn insert(&self, record: TenderRecord) -> Result<TenderRecord, RepositoryError> {
            self.inner.insert(record)
        }

        fn load(&self, id: &TenderId) -> Result<Option<TenderRecord>, RepositoryError> {
            self.inner.load(id)
        }

        fn save(
            &self,
            record: TenderRecord,
            expected_version: u64,
        ) -> Result<TenderRecord, RepositoryError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let mut foreign = self.inner.load(&record.id)?.ok_or(RepositoryError::NotFound)?;
                foreign.title.push_str(" (révisé)");
                self.inner.save(foreign, expected_version)?;
            }
            self.inner.save(record, expected_version)
        }

        fn list(&self, filter: &TenderFilter) -> Result<Vec<TenderRecord>, RepositoryError> {
            self.inner.list(filter)
        }
    }

    #[test]
    fn act_with_retry_recovers_from_lost_compare_and_swap() {
        let repository = Arc::new(RacingRepository::default());
        let service = TenderWorkflowService::new(repository.clone(), WorkflowConfig::default());
        let record = service
            .create(draft("DSI"), ActorRole::MarketsService, at(0))
            .expect("created");

        let outcome = service
            .act_with_retry(&record.id, ActorRole::TechnicalService, TenderAction::SignOff, at(1))
            .expect("second attempt wins");
        assert_eq!(outcome.record.version, 2);
        assert!(outcome.record.title.ends_with("(révisé)"));
        assert_eq!(outcome.record.sign_offs.len(), 1);
    }

    #[test]
    fn single_attempt_surfaces_concurrent_modification() {
        let repository = Arc::new(RacingRepository::default());
        let service = TenderWorkflowService::new(
            repository,
            WorkflowConfig {
                max_transition_attempts: 1,
            },
        );
        let record = service
            .create(draft("DSI"), ActorRole::MarketsService, at(0))
            .expect("created");

        let err = service
            .act_with_retry(&record.id, ActorRole::TechnicalService, TenderAction::SignOff, at(1))
            .expect_err("no retry budget");
        assert!(err.is_concurrent_modification());
    }
}
