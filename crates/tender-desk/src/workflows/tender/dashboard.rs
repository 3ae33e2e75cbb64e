use serde::Serialize;
use std::collections::HashMap;

use super::domain::{Phase, TenderStatus};
use super::organization::OrganizationDirectory;
use super::repository::TenderRecord;

/// Tender counts for one organizational unit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenderCounts {
    pub total_ao: usize,
    pub en_cours: usize,
    pub termines: usize,
}

impl TenderCounts {
    /// Cancelled tenders only count toward the total.
    fn record(&mut self, status: TenderStatus) {
        self.total_ao += 1;
        match status {
            TenderStatus::Active => self.en_cours += 1,
            TenderStatus::Completed => self.termines += 1,
            TenderStatus::Cancelled => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectionSummary {
    pub direction: &'static str,
    pub direction_name: &'static str,
    #[serde(flatten)]
    pub counts: TenderCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivisionSummary {
    pub direction: &'static str,
    pub division: &'static str,
    pub division_name: &'static str,
    #[serde(flatten)]
    pub counts: TenderCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseLoad {
    pub phase: Phase,
    pub phase_label: &'static str,
    pub active: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub directions: Vec<DirectionSummary>,
    pub divisions: Vec<DivisionSummary>,
    pub phases: Vec<PhaseLoad>,
    pub totals: TenderCounts,
}

impl DashboardSummary {
    pub fn build(directory: &OrganizationDirectory, tenders: &[TenderRecord]) -> Self {
        let directions = aggregate_by_direction(directory, tenders);
        let totals = directions
            .iter()
            .fold(TenderCounts::default(), |mut acc, row| {
                acc.total_ao += row.counts.total_ao;
                acc.en_cours += row.counts.en_cours;
                acc.termines += row.counts.termines;
                acc
            });

        Self {
            directions,
            divisions: aggregate_by_division(directory, tenders),
            phases: phase_distribution(directory, tenders),
            totals,
        }
    }
}

/// One row per known direction, ordered by code, zero rows included.
///
/// A tender belongs to the direction its division resolves to; tenders whose
/// division is not in the directory are left out.
pub fn aggregate_by_direction(
    directory: &OrganizationDirectory,
    tenders: &[TenderRecord],
) -> Vec<DirectionSummary> {
    let mut counts: HashMap<&str, TenderCounts> = HashMap::new();
    for tender in tenders {
        if let Ok(direction) = directory.resolve_direction(&tender.division_code) {
            counts.entry(direction).or_default().record(tender.status);
        }
    }

    directory
        .directions()
        .map(|direction| DirectionSummary {
            direction: direction.code,
            direction_name: direction.name,
            counts: counts.get(direction.code).copied().unwrap_or_default(),
        })
        .collect()
}

/// One row per known division, ordered by direction then division code.
pub fn aggregate_by_division(
    directory: &OrganizationDirectory,
    tenders: &[TenderRecord],
) -> Vec<DivisionSummary> {
    let mut counts: HashMap<&str, TenderCounts> = HashMap::new();
    for tender in tenders {
        if let Some(division) = directory.division(&tender.division_code) {
            counts.entry(division.code).or_default().record(tender.status);
        }
    }

    let mut rows: Vec<DivisionSummary> = directory
        .divisions()
        .map(|division| DivisionSummary {
            direction: division.direction_code,
            division: division.code,
            division_name: division.name,
            counts: counts.get(division.code).copied().unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| (a.direction, a.division).cmp(&(b.direction, b.division)));
    rows
}

/// Active tenders per phase, in phase order.
///
/// Same population as [`aggregate_by_direction`]: tenders whose division does
/// not resolve are left out, so the loads sum to the summary's `en_cours`.
pub fn phase_distribution(
    directory: &OrganizationDirectory,
    tenders: &[TenderRecord],
) -> Vec<PhaseLoad> {
    Phase::ordered()
        .into_iter()
        .map(|phase| PhaseLoad {
            phase,
            phase_label: phase.label(),
            active: tenders
                .iter()
                .filter(|tender| tender.status == TenderStatus::Active && tender.phase == phase)
                .filter(|tender| directory.division(&tender.division_code).is_some())
                .count(),
        })
        .collect()
}
