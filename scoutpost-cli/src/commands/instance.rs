//! `scoutpost instance` command handler

use std::collections::BTreeMap;
use std::io::Write;

use colored::Colorize;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tracing::info;

use scoutpost_core::config::ScoutpostConfig;
use scoutpost_core::error::ScoutpostError;
use scoutpost_core::{AccessSecret, InstanceRecord, InstanceSettings, InstanceStatus};
use scoutpost_provisioner::{DatabaseCleanup, DeleteOutcome, DeleteReport};

use crate::cli::{CreateArgs, InstanceAction, InstanceArgs, SecretSource};
use crate::commands::{Manager, connect};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Minimum API secret length accepted by the application.
pub const MIN_SECRET_LEN: usize = 12;

/// Execute the `instance` command.
pub async fn execute(
    args: InstanceArgs,
    config: &ScoutpostConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        InstanceAction::Create(create) => execute_create(create, config, writer).await,
        InstanceAction::Delete { owner } => {
            let manager = connect(config, true).await?;
            execute_delete(&manager, &owner, writer).await
        }
        InstanceAction::Purge { owner } => {
            let manager = connect(config, true).await?;
            let report = manager.purge_instance(&owner).await?;
            writer.render(&TeardownView::purged(report))
        }
        InstanceAction::Show { owner } => {
            let manager = connect(config, false).await?;
            let record = manager
                .get_instance(&owner)
                .await?
                .ok_or(CliError::NotFound(owner))?;
            writer.render(&InstanceView::new(&manager, &record))
        }
        InstanceAction::List { limit } => {
            let manager = connect(config, false).await?;
            let records = manager.list_instances(limit).await?;
            let list = InstanceList {
                instances: records
                    .iter()
                    .map(|r| InstanceView::new(&manager, r))
                    .collect(),
            };
            writer.render(&list)
        }
    }
}

async fn execute_create(
    args: CreateArgs,
    config: &ScoutpostConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let secret = check_secret(read_secret(&args.secret).await?)?;
    let settings = build_settings(args.settings)?;

    let manager = connect(config, true).await?;
    info!(owner = %args.owner, settings = settings.len(), "creating instance");
    let outcome = manager.create_instance(&args.owner, secret, settings).await?;

    let view = CreateView {
        created: outcome.is_created(),
        instance: InstanceView::new(&manager, outcome.record()),
    };
    writer.render(&view)
}

async fn execute_delete(manager: &Manager, owner: &str, writer: &OutputWriter) -> Result<(), CliError> {
    let view = match manager.delete_instance(owner).await? {
        DeleteOutcome::Deleted(report) => TeardownView::deleted(report),
        DeleteOutcome::NotFound => TeardownView::not_found(owner),
    };
    writer.render(&view)
}

async fn read_secret(source: &SecretSource) -> Result<String, CliError> {
    if let Some(var) = &source.secret_env {
        return std::env::var(var).map_err(|_| {
            CliError::Command(format!("environment variable {var} is not set or not UTF-8"))
        });
    }

    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Enforces the secret length the application requires.
pub fn check_secret(raw: String) -> Result<AccessSecret, CliError> {
    let len = raw.chars().count();
    if len < MIN_SECRET_LEN {
        return Err(CliError::Command(format!(
            "API secret must be at least {MIN_SECRET_LEN} characters (got {len})"
        )));
    }
    Ok(AccessSecret::new(raw))
}

/// Validates `--set` pairs; later pairs overwrite earlier ones.
pub fn build_settings(pairs: Vec<(String, String)>) -> Result<InstanceSettings, CliError> {
    InstanceSettings::from_pairs(pairs)
        .map_err(|e| CliError::Core(ScoutpostError::from(e)))
}

// --- Output payloads ---

/// One instance as shown to an operator.
#[derive(Debug, Serialize)]
pub struct InstanceView {
    pub owner: String,
    pub status: InstanceStatus,
    pub url: String,
    pub container_name: String,
    pub subdomain: String,
    pub db_name: String,
    pub created_at: String,
    pub settings: BTreeMap<String, String>,
}

impl InstanceView {
    fn new(manager: &Manager, record: &InstanceRecord) -> Self {
        Self::from_record(record, manager.instance_url(record))
    }

    pub fn from_record(record: &InstanceRecord, url: String) -> Self {
        Self {
            owner: record.owner.clone(),
            status: record.status,
            url,
            container_name: record.container_name.clone(),
            subdomain: record.subdomain.clone(),
            db_name: record.db_name.clone(),
            created_at: record.created_at.to_rfc3339(),
            settings: record.settings.as_map().clone(),
        }
    }
}

fn colored_status(status: InstanceStatus) -> colored::ColoredString {
    match status {
        InstanceStatus::Active => status.as_str().green(),
        InstanceStatus::Creating | InstanceStatus::Deleting => status.as_str().yellow(),
    }
}

impl Render for InstanceView {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Instance: {}", self.owner.bold())?;
        writeln!(w, "  Status:    {}", colored_status(self.status))?;
        writeln!(w, "  URL:       {}", self.url)?;
        writeln!(w, "  Container: {}", self.container_name)?;
        writeln!(w, "  Database:  {}", self.db_name)?;
        writeln!(w, "  Created:   {}", self.created_at)?;
        if !self.settings.is_empty() {
            writeln!(w, "  Settings:")?;
            for (key, value) in &self.settings {
                writeln!(w, "    {key} = {value}")?;
            }
        }
        Ok(())
    }
}

/// Result of `instance create`.
#[derive(Debug, Serialize)]
pub struct CreateView {
    /// `false` when the owner already had an instance
    pub created: bool,
    pub instance: InstanceView,
}

impl Render for CreateView {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.created {
            writeln!(w, "{} instance created", "✓".green())?;
        } else if self.instance.status == InstanceStatus::Active {
            writeln!(w, "instance already exists, nothing changed")?;
        } else {
            // 중단된 생성/삭제가 남긴 레코드
            writeln!(
                w,
                "{} instance exists but is stalled in '{}', nothing changed",
                "warning:".yellow(),
                self.instance.status
            )?;
            writeln!(
                w,
                "  run `scoutpost instance purge {}` to clear it, then create again",
                self.instance.owner
            )?;
        }
        self.instance.render_text(w)
    }
}

/// Result of `instance delete` / `instance purge`.
#[derive(Debug, Serialize)]
pub struct TeardownView {
    pub owner: String,
    pub action: &'static str,
    /// `false` when there was nothing to delete
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DeleteReport>,
}

impl TeardownView {
    fn deleted(report: DeleteReport) -> Self {
        Self {
            owner: report.owner.clone(),
            action: "delete",
            found: true,
            report: Some(report),
        }
    }

    fn purged(report: DeleteReport) -> Self {
        Self {
            owner: report.owner.clone(),
            action: "purge",
            found: true,
            report: Some(report),
        }
    }

    fn not_found(owner: &str) -> Self {
        Self {
            owner: owner.to_owned(),
            action: "delete",
            found: false,
            report: None,
        }
    }
}

impl Render for TeardownView {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let Some(report) = &self.report else {
            writeln!(w, "no instance for owner '{}', nothing to delete", self.owner)?;
            return Ok(());
        };

        writeln!(w, "{} {}: {}", "✓".green(), self.action, self.owner.bold())?;
        let container = if report.container_removed {
            "removed"
        } else {
            "already absent"
        };
        writeln!(w, "  Container: {container}")?;
        match &report.database {
            DatabaseCleanup::Dropped => writeln!(w, "  Database:  dropped")?,
            DatabaseCleanup::NotFound => writeln!(w, "  Database:  already absent")?,
            DatabaseCleanup::Failed { reason } => {
                writeln!(w, "  Database:  {} ({reason})", "DROP FAILED".red().bold())?;
                writeln!(w, "  The database must be dropped manually.")?;
            }
        }
        if !report.record_deleted {
            writeln!(w, "  Record:    none")?;
        }
        Ok(())
    }
}

/// Result of `instance list`.
#[derive(Debug, Serialize)]
pub struct InstanceList {
    pub instances: Vec<InstanceView>,
}

impl Render for InstanceList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.instances.is_empty() {
            writeln!(w, "No instances.")?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<24} {:<10} {:<40} {:<25}",
            "Owner", "Status", "URL", "Created"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;
        for i in &self.instances {
            writeln!(
                w,
                "{:<24} {:<10} {:<40} {:<25}",
                i.owner,
                i.status.as_str(),
                i.url,
                i.created_at
            )?;
        }
        writeln!(w)?;
        writeln!(w, "{} instance(s)", self.instances.len())?;
        Ok(())
    }
}
