use crate::infra::{seeded_repository, DeskService};
use chrono::{Duration, Utc};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tender_desk::config::WorkflowConfig;
use tender_desk::error::AppError;
use tender_desk::workflows::tender::{
    ActorRole, DashboardSummary, MemoryTenderRepository, OrganizationDirectory, TenderAction,
    TenderDraft, TenderServiceError, TenderWorkflowService,
};

#[derive(Args, Debug)]
pub(crate) struct DashboardArgs {
    /// Tender CSV export (id,title,division,phase,status,sign_offs,created_at)
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Include the per-division breakdown
    #[arg(long)]
    pub(crate) divisions: bool,
    /// Emit JSON instead of a text table
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_dashboard(args: DashboardArgs) -> Result<(), AppError> {
    let repository = Arc::new(seeded_repository(Some(&args.csv))?);
    let service = TenderWorkflowService::new(repository, WorkflowConfig::default());
    let summary = service.dashboard()?;

    if args.json {
        print_json(&summary)?;
    } else {
        render_dashboard(&summary, args.divisions);
    }
    Ok(())
}

pub(crate) fn run_demo() -> Result<(), AppError> {
    let service: DeskService = TenderWorkflowService::new(
        Arc::new(MemoryTenderRepository::default()),
        WorkflowConfig::default(),
    );
    let started = Utc::now();

    println!("Tender workflow demo");
    let record = service.create(
        TenderDraft {
            title: "Renouvellement du parc informatique".to_string(),
            division: "DSI".to_string(),
        },
        ActorRole::MarketsService,
        started,
    )?;
    let direction = OrganizationDirectory::standard()
        .direction(&record.direction_code)
        .map(|direction| direction.name)
        .unwrap_or("?");
    println!(
        "  {} opened by SM for {} ({})",
        record.id, record.division_code, direction
    );

    let script = [
        (ActorRole::TechnicalService, TenderAction::AdvancePhase),
        (ActorRole::TechnicalService, TenderAction::SignOff),
        (ActorRole::StateControl, TenderAction::SignOff),
        (ActorRole::StateControl, TenderAction::AdvancePhase),
        (ActorRole::TechnicalService, TenderAction::SignOff),
        (ActorRole::TechnicalService, TenderAction::AdvancePhase),
        (ActorRole::TreasurerPayer, TenderAction::SignOff),
        (ActorRole::BudgetService, TenderAction::SignOff),
        (ActorRole::TreasurerPayer, TenderAction::SignOff),
        (ActorRole::TreasurerPayer, TenderAction::Complete),
        (ActorRole::TreasurerPayer, TenderAction::Complete),
        (ActorRole::Admin, TenderAction::Cancel),
    ];

    for (minute, (role, action)) in (1_i64..).zip(script) {
        let at = started + Duration::minutes(minute);
        match service.act(&record.id, role, action, at) {
            Ok(outcome) => println!(
                "  {:<5} {:<13} -> phase {} / {} ({:?})",
                role.code(),
                action.label(),
                outcome.record.phase,
                outcome.record.status.label(),
                outcome.effect
            ),
            Err(TenderServiceError::Transition(err)) => println!(
                "  {:<5} {:<13} rejected: {}",
                role.code(),
                action.label(),
                err.precondition()
            ),
            Err(err) => return Err(err.into()),
        }
    }

    let final_record = service.get(&record.id)?;
    println!("\nFinal record");
    print_json(&final_record.view(service.machine()))?;

    println!("\nDashboard");
    render_dashboard(&service.dashboard()?, false);
    Ok(())
}

fn render_dashboard(summary: &DashboardSummary, include_divisions: bool) {
    println!(
        "{:<6} {:<50} {:>8} {:>8} {:>8}",
        "Code", "Direction", "Total AO", "En cours", "Terminés"
    );
    for row in &summary.directions {
        println!(
            "{:<6} {:<50} {:>8} {:>8} {:>8}",
            row.direction,
            row.direction_name,
            row.counts.total_ao,
            row.counts.en_cours,
            row.counts.termines
        );
    }
    println!(
        "{:<57} {:>8} {:>8} {:>8}",
        "Total", summary.totals.total_ao, summary.totals.en_cours, summary.totals.termines
    );

    if include_divisions {
        println!();
        for row in &summary.divisions {
            println!(
                "{:<6} {:<6} {:<50} {:>4} {:>4} {:>4}",
                row.direction,
                row.division,
                row.division_name,
                row.counts.total_ao,
                row.counts.en_cours,
                row.counts.termines
            );
        }
    }

    let phases = summary
        .phases
        .iter()
        .map(|load| format!("{}: {}", load.phase_label, load.active))
        .collect::<Vec<_>>()
        .join(", ");
    println!("Active by phase: {phases}");
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{rendered}");
    Ok(())
}
