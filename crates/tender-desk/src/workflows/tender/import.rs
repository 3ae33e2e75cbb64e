use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use super::blueprint::WorkflowBlueprint;
use super::domain::{ActorRole, Phase, RegistryError, SignOff, TenderId, TenderStatus};
use super::organization::{DirectoryError, OrganizationDirectory};
use super::repository::TenderRecord;

#[derive(Debug, thiserror::Error)]
pub enum TenderImportError {
    #[error("failed to read tender export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tender CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {source}")]
    Directory {
        line: u64,
        #[source]
        source: DirectoryError,
    },
    #[error("line {line}: {source}")]
    Registry {
        line: u64,
        #[source]
        source: RegistryError,
    },
    #[error("line {line}: invalid created_at '{value}'")]
    Timestamp { line: u64, value: String },
    #[error("line {line}: {reason}")]
    Inconsistent { line: u64, reason: String },
}

#[derive(Debug, Deserialize)]
struct TenderRow {
    id: String,
    title: String,
    division: String,
    phase: String,
    status: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    sign_offs: Option<String>,
    created_at: String,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|raw| !raw.trim().is_empty()))
}

/// Loads tender records from a CSV export
/// (`id,title,division,phase,status,sign_offs,created_at`).
///
/// `sign_offs` lists the current phase's signatories separated by `;`, in order.
/// Earlier phases are considered fully signed at `created_at`.
pub struct TenderCsvImporter;

impl TenderCsvImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<TenderRecord>, TenderImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<TenderRecord>, TenderImportError> {
        let directory = OrganizationDirectory::standard();
        let blueprint = WorkflowBlueprint::standard();
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        for (index, row) in csv_reader.deserialize::<TenderRow>().enumerate() {
            // Header is line 1.
            let line = index as u64 + 2;
            records.push(build_record(row?, line, directory, &blueprint)?);
        }

        Ok(records)
    }
}

fn build_record(
    row: TenderRow,
    line: u64,
    directory: &OrganizationDirectory,
    blueprint: &WorkflowBlueprint,
) -> Result<TenderRecord, TenderImportError> {
    let registry = |source| TenderImportError::Registry { line, source };

    let direction = directory
        .resolve_direction(&row.division)
        .map_err(|source| TenderImportError::Directory { line, source })?;
    let phase: Phase = row.phase.parse().map_err(registry)?;
    let status: TenderStatus = row.status.parse().map_err(registry)?;
    let created_at = parse_timestamp(&row.created_at).ok_or_else(|| {
        TenderImportError::Timestamp {
            line,
            value: row.created_at.clone(),
        }
    })?;

    let signed = row
        .sign_offs
        .as_deref()
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| code.parse::<ActorRole>().map_err(registry))
        .collect::<Result<Vec<_>, _>>()?;

    let required = blueprint.required_sign_offs(phase);
    if !required.starts_with(&signed) {
        return Err(TenderImportError::Inconsistent {
            line,
            reason: format!(
                "sign-offs {} are not an ordered prefix of {} for phase {phase}",
                join_codes(&signed),
                join_codes(required)
            ),
        });
    }
    if status == TenderStatus::Completed && (phase != Phase::Payments || signed != required) {
        return Err(TenderImportError::Inconsistent {
            line,
            reason: "completed tenders must be in the payments phase with every sign-off"
                .to_string(),
        });
    }

    let mut sign_offs: Vec<SignOff> = Phase::ordered()
        .into_iter()
        .filter(|earlier| *earlier < phase)
        .flat_map(|earlier| {
            blueprint
                .required_sign_offs(earlier)
                .iter()
                .map(move |role| SignOff {
                    phase: earlier,
                    role: *role,
                    signed_at: created_at,
                })
        })
        .collect();
    sign_offs.extend(signed.into_iter().map(|role| SignOff {
        phase,
        role,
        signed_at: created_at,
    }));

    Ok(TenderRecord {
        id: TenderId(row.id),
        title: row.title,
        direction_code: direction.to_string(),
        division_code: row.division,
        phase,
        status,
        sign_offs,
        history: Vec::new(),
        created_at,
        updated_at: created_at,
        version: 0,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn join_codes(roles: &[ActorRole]) -> String {
    if roles.is_empty() {
        return "(none)".to_string();
    }
    roles
        .iter()
        .map(|role| role.code())
        .collect::<Vec<_>>()
        .join(";")
}
