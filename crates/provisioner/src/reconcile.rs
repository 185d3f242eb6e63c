//! 상태 불일치 점검 -- 레코드 저장소와 컨테이너 런타임 비교 (읽기 전용)
//!
//! 여기서는 아무것도 고치지 않습니다. 고아 컨테이너는
//! `InstanceManager::purge_instance`로, 멈춘 레코드는 delete 또는 purge로 정리합니다.

use std::collections::{BTreeMap, BTreeSet};

use metrics::gauge;
use serde::Serialize;
use tracing::{debug, info, warn};

use scoutpost_core::metrics as m;
use scoutpost_core::types::{InstanceRecord, InstanceStatus};

use crate::docker::{ContainerRuntime, ManagedContainer};
use crate::error::ProvisionerError;
use crate::store::InstanceStore;

/// 정합성 점검 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub records_checked: usize,
    pub containers_checked: usize,
    /// The record listing hit the limit; orphans may be over-reported
    pub truncated: bool,
    /// Managed containers with no record
    pub orphaned_containers: Vec<ManagedContainer>,
    /// `active` records whose container does not exist
    pub missing_containers: Vec<InstanceRecord>,
    /// Records left in `creating` or `deleting`
    pub stalled_records: Vec<InstanceRecord>,
    /// Subdomain -> owners, for subdomains shared by several records
    pub subdomain_collisions: BTreeMap<String, Vec<String>>,
}

impl ReconciliationReport {
    /// Number of drift findings.
    pub fn drift_count(&self) -> usize {
        self.orphaned_containers.len()
            + self.missing_containers.len()
            + self.stalled_records.len()
            + self.subdomain_collisions.len()
    }

    pub fn has_drift(&self) -> bool {
        self.drift_count() > 0
    }
}

/// Compares up to `limit` records against the managed containers.
pub async fn sweep<R, S>(
    runtime: &R,
    store: &S,
    limit: usize,
) -> Result<ReconciliationReport, ProvisionerError>
where
    R: ContainerRuntime,
    S: InstanceStore,
{
    let records = store.list_all(limit).await?;
    let containers = runtime.list_managed().await?;
    debug!(
        records = records.len(),
        containers = containers.len(),
        "reconciling"
    );

    let mut report = ReconciliationReport {
        records_checked: records.len(),
        containers_checked: containers.len(),
        truncated: records.len() >= limit,
        ..Default::default()
    };

    let recorded: BTreeSet<&str> = records.iter().map(|r| r.container_name.as_str()).collect();
    let running: BTreeSet<&str> = containers.iter().map(|c| c.name.as_str()).collect();

    report.orphaned_containers = containers
        .iter()
        .filter(|c| !recorded.contains(c.name.as_str()))
        .cloned()
        .collect();

    let mut by_subdomain: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for record in &records {
        by_subdomain
            .entry(record.subdomain.as_str())
            .or_default()
            .push(record.owner.clone());

        match record.status {
            InstanceStatus::Active => {
                // unlabeled containers don't show up in the managed listing
                if !running.contains(record.container_name.as_str())
                    && runtime.inspect(&record.container_name).await?.is_none()
                {
                    report.missing_containers.push(record.clone());
                }
            }
            InstanceStatus::Creating | InstanceStatus::Deleting => {
                report.stalled_records.push(record.clone());
            }
        }
    }

    report.subdomain_collisions = by_subdomain
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .map(|(sub, owners)| (sub.to_owned(), owners))
        .collect();

    let drift = report.drift_count();
    gauge!(m::RECONCILE_DRIFT).set(drift as f64);
    if drift > 0 {
        warn!(
            orphaned = report.orphaned_containers.len(),
            missing = report.missing_containers.len(),
            stalled = report.stalled_records.len(),
            collisions = report.subdomain_collisions.len(),
            "drift detected"
        );
    } else {
        info!(records = report.records_checked, "no drift");
    }
    if report.truncated {
        warn!(limit, "record listing truncated, raise the limit for a full sweep");
    }

    Ok(report)
}
