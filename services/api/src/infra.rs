use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tender_desk::error::AppError;
use tender_desk::workflows::tender::{
    MemoryTenderRepository, TenderCsvImporter, TenderRepository, TenderWorkflowService,
};

pub(crate) type DeskService = TenderWorkflowService<MemoryTenderRepository>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Builds the in-memory store, optionally hydrated from a tender CSV export.
pub(crate) fn seeded_repository(seed: Option<&Path>) -> Result<MemoryTenderRepository, AppError> {
    let repository = MemoryTenderRepository::default();
    if let Some(path) = seed {
        for record in TenderCsvImporter::from_path(path)? {
            repository
                .insert(record)
                .map_err(|err| AppError::Workflow(err.into()))?;
        }
    }
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_desk::workflows::tender::TenderFilter;

    #[test]
    fn seeding_without_file_yields_empty_store() {
        let repository = seeded_repository(None).expect("empty store");
        assert!(repository
            .list(&TenderFilter::all())
            .expect("list")
            .is_empty());
    }

    #[test]
    fn missing_seed_file_is_an_import_error() {
        let err = seeded_repository(Some(Path::new("/nonexistent/tenders.csv")))
            .expect_err("file is missing");
        assert!(matches!(err, AppError::Import(_)));
    }
}
