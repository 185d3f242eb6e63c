//! `scoutpost reconcile` command handler

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use scoutpost_core::config::ScoutpostConfig;
use scoutpost_provisioner::ReconciliationReport;

use crate::cli::ReconcileArgs;
use crate::commands::connect;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `reconcile` command.
///
/// Prints the report, then fails with [`CliError::Drift`] (exit code 5) if
/// anything was found.
pub async fn execute(
    args: ReconcileArgs,
    config: &ScoutpostConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let manager = connect(config, true).await?;
    let report = manager.reconcile(args.limit).await?;

    let view = ReconcileView { report };
    writer.render(&view)?;

    match view.report.drift_count() {
        0 => Ok(()),
        n => Err(CliError::Drift(n)),
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct ReconcileView {
    pub report: ReconciliationReport,
}

impl Render for ReconcileView {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let r = &self.report;
        writeln!(
            w,
            "Reconciliation: {} record(s), {} managed container(s)",
            r.records_checked, r.containers_checked
        )?;
        if r.truncated {
            writeln!(
                w,
                "  {} record listing hit the limit; orphans may be over-reported",
                "warning:".yellow()
            )?;
        }

        if !r.has_drift() {
            writeln!(w, "  Result: {}", "NO DRIFT".green().bold())?;
            return Ok(());
        }
        writeln!(w, "  Result: {}", "DRIFT".red().bold())?;

        if !r.orphaned_containers.is_empty() {
            writeln!(w, "\n  Orphaned containers (no record, clean up with `instance purge`):")?;
            for c in &r.orphaned_containers {
                let owner = c.owner.as_deref().unwrap_or("?");
                writeln!(w, "    {:<32} owner={owner}", c.name)?;
            }
        }
        if !r.missing_containers.is_empty() {
            writeln!(w, "\n  Active records without a container:")?;
            for rec in &r.missing_containers {
                writeln!(w, "    {:<32} container={}", rec.owner, rec.container_name)?;
            }
        }
        if !r.stalled_records.is_empty() {
            writeln!(w, "\n  Stalled records:")?;
            for rec in &r.stalled_records {
                writeln!(w, "    {:<32} status={}", rec.owner, rec.status)?;
            }
        }
        if !r.subdomain_collisions.is_empty() {
            writeln!(w, "\n  Subdomain collisions:")?;
            for (sub, owners) in &r.subdomain_collisions {
                writeln!(w, "    {:<32} owners={}", sub, owners.join(", "))?;
            }
        }
        Ok(())
    }
}
