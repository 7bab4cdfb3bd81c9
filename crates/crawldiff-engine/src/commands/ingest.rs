//! Snapshot ingest and change recomputation.
//!
//! ## Pipeline (in order):
//! 1. Validate configuration and every entity collection (no writes on failure)
//! 2. Reject a new crawl id that sorts below the newest ingested crawl
//! 3. Record the crawl in the ledger (idempotent)
//! 4. Archive each entity type's raw versions for this crawl
//! 5. Materialize each entity table, unless a newer crawl already did
//! 6. If a previous crawl exists: extract and reconcile each entity type
//!    (and, for a rerun of an older crawl, the pair it forms with its successor)
//!
//! Every table write runs in its own transaction, so an interrupted run
//! leaves some tables converged and the rest untouched; rerunning finishes
//! the job.
//!
//! ## Logging Ownership
//!
//! `log_op_start!` / `log_op_end!` / `log_op_error!` at the public entry
//! points; per-stage detail goes through `tracing::debug!`.

#![allow(clippy::result_large_err)]

use chrono::Utc;
use crawldiff_core::change::{plan_reconciliation, ChangeExtractor, ChangeSet, ReconcileCounts, ReconcilePlan};
use crawldiff_core::errors::{ExError, ExErrorKind};
use crawldiff_core::materialize::{plan_materialization, MaterializeCounts, MaterializeOptions};
use crawldiff_core::types::RunId;
use crawldiff_core::{log_op_end, log_op_error, log_op_start};
use crawldiff_core::{Entity, EntityType, PipelineConfig, Snapshot};
use crawldiff_store::errors::Result;
use crawldiff_store::repo::{archive, changes, crawls, entities};
use crawldiff_store::{ArchiveScan, CrawlRow};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of one ingest run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub run_id: RunId,
    pub crawl_id: String,
    pub previous_crawl_id: Option<String>,
    /// False when the crawl was already in the ledger (a rerun)
    pub newly_recorded: bool,
    /// Empty when a newer crawl already owns the current-state tables
    pub materialized: BTreeMap<EntityType, MaterializeCounts>,
    /// Empty for the first crawl ever ingested
    pub reconciled: BTreeMap<EntityType, ReconcileCounts>,
    /// Set when rerunning a crawl that already has a successor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_crawl_id: Option<String>,
    /// The `(crawl_id, next_crawl_id)` pair, re-reconciled after re-archiving
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub reconciled_next: BTreeMap<EntityType, ReconcileCounts>,
}

/// Outcome of one recompute run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeReport {
    pub run_id: RunId,
    pub crawl_id: String,
    pub previous_crawl_id: Option<String>,
    pub reconciled: BTreeMap<EntityType, ReconcileCounts>,
}

/// Ingest one snapshot.
///
/// ## Errors
///
/// - `InvalidConfig`: configuration rejected
/// - `InvalidSnapshot` / `DuplicateEntityKey`: malformed snapshot, nothing written
/// - `InvalidInput`: a new crawl id sorts below the newest ingested crawl,
///   nothing written
/// - `DuplicateChangeKey`: the extractor produced colliding records; no
///   change records are written for this crawl pair
/// - `Persistence` / `Serialization`: store failure
pub fn ingest_snapshot(
    conn: &mut Connection,
    snapshot: &Snapshot,
    config: &PipelineConfig,
) -> Result<IngestReport> {
    let run_id = RunId::new();
    log_op_start!(
        "ingest_snapshot",
        run_id = %run_id,
        crawl_id = snapshot.crawl_id.as_str()
    );
    let start = std::time::Instant::now();

    let report = ingest_snapshot_impl(conn, snapshot, config, &run_id).map_err(|e| {
        let e = e.with_run_id(run_id.clone());
        log_op_error!(
            "ingest_snapshot",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64,
            crawl_id = snapshot.crawl_id.as_str()
        );
        e
    })?;

    let totals = report.materialized.values().fold(MaterializeCounts::default(), |mut acc, c| {
        acc.insert += c.insert;
        acc.update += c.update;
        acc.stable += c.stable;
        acc.unavailable += c.unavailable;
        acc
    });
    let changes = report.reconciled.values().fold(ReconcileCounts::default(), |mut acc, c| {
        acc.merge(*c);
        acc
    });
    log_op_end!(
        "ingest_snapshot",
        duration_ms = start.elapsed().as_millis() as u64,
        crawl_id = report.crawl_id.as_str(),
        insert = totals.insert,
        update = totals.update,
        stable = totals.stable,
        unavailable = totals.unavailable,
        change_insert = changes.insert,
        change_delete = changes.delete
    );

    Ok(report)
}

fn ingest_snapshot_impl(
    conn: &mut Connection,
    snapshot: &Snapshot,
    config: &PipelineConfig,
    run_id: &RunId,
) -> Result<IngestReport> {
    config.validate()?;
    if snapshot.crawl_id.is_empty() {
        return Err(ExError::new(ExErrorKind::InvalidSnapshot)
            .with_op("ingest_snapshot")
            .with_message("crawl_id must not be empty"));
    }

    let mut collections: Vec<(EntityType, Vec<Entity>)> = Vec::with_capacity(EntityType::ALL.len());
    for entity_type in EntityType::ALL {
        let entities = snapshot.entities(entity_type).map_err(|e| {
            ExError::from(e)
                .with_op("validate_snapshot")
                .with_crawl_id(snapshot.crawl_id.as_str())
        })?;
        collections.push((entity_type, entities));
    }

    // Crawl ids must increase; only a rerun may sit below the newest crawl.
    let newer = crawls::latest_crawl(conn)?.filter(|l| l.crawl_id > snapshot.crawl_id);
    if let Some(newer) = &newer {
        if crawls::get_crawl(conn, &snapshot.crawl_id)?.is_none() {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("ingest_snapshot")
                .with_crawl_id(snapshot.crawl_id.as_str())
                .with_message(format!(
                    "crawl id sorts below the newest ingested crawl `{}`",
                    newer.crawl_id
                )));
        }
    }
    let superseded = newer.is_some();

    let now = Utc::now();
    let newly_recorded = crawls::record_crawl(conn, &snapshot.crawl_id, snapshot.crawled_at, now)?;
    if !newly_recorded {
        tracing::debug!(crawl_id = snapshot.crawl_id.as_str(), "crawl already in ledger; rerunning");
    }
    let current = crawls::get_crawl(conn, &snapshot.crawl_id)?.ok_or_else(|| {
        ExError::new(ExErrorKind::Internal)
            .with_op("ingest_snapshot")
            .with_crawl_id(snapshot.crawl_id.as_str())
            .with_message("crawl missing from ledger after recording it")
    })?;

    let options = MaterializeOptions {
        reactivate_on_reappearance: config.reactivate_on_reappearance,
    };
    let mut materialized = BTreeMap::new();
    for (entity_type, entities) in collections {
        let archived = archive::archive_entities(conn, &current.crawl_id, entity_type, &entities)?;
        if superseded {
            tracing::debug!(
                run_id = %run_id,
                crawl_id = current.crawl_id.as_str(),
                entity_type = entity_type.as_str(),
                archived,
                "newer crawl owns current state; materialization skipped"
            );
            continue;
        }

        let stored = entities::scan_current(conn, entity_type, config.scan_batch_size)?;
        let plan = plan_materialization(
            entity_type,
            entities,
            stored,
            &config.volatile_fields,
            current.crawled_at,
            options,
        );
        entities::apply_materialization(conn, &current.crawl_id, &plan, now)?;

        tracing::debug!(
            run_id = %run_id,
            crawl_id = current.crawl_id.as_str(),
            entity_type = entity_type.as_str(),
            archived,
            insert = plan.counts.insert,
            update = plan.counts.update,
            stable = plan.counts.stable,
            unavailable = plan.counts.unavailable,
            "materialized"
        );
        materialized.insert(entity_type, plan.counts);
    }

    let previous = crawls::previous_crawl(conn, &current.crawl_id)?;
    let reconciled = match &previous {
        Some(previous) => reconcile_pair(conn, previous, &current, config, run_id)?,
        None => BTreeMap::new(),
    };
    let next = crawls::next_crawl(conn, &current.crawl_id)?;
    let reconciled_next = match &next {
        Some(next) => reconcile_pair(conn, &current, next, config, run_id)?,
        None => BTreeMap::new(),
    };

    Ok(IngestReport {
        run_id: run_id.clone(),
        crawl_id: current.crawl_id,
        previous_crawl_id: previous.map(|p| p.crawl_id),
        newly_recorded,
        materialized,
        reconciled,
        next_crawl_id: next.map(|n| n.crawl_id),
        reconciled_next,
    })
}

/// Recompute the change records between an ingested crawl and its
/// predecessor, e.g. after the extractor or its configuration changed.
///
/// ## Errors
///
/// - `NotFound`: crawl not in the ledger
/// - `DuplicateChangeKey`: colliding fresh records, nothing written
/// - `Persistence` / `Serialization`: store failure
pub fn recompute_changes(
    conn: &mut Connection,
    crawl_id: &str,
    config: &PipelineConfig,
) -> Result<RecomputeReport> {
    let run_id = RunId::new();
    log_op_start!("recompute_changes", run_id = %run_id, crawl_id = crawl_id);
    let start = std::time::Instant::now();

    let report = recompute_changes_impl(conn, crawl_id, config, &run_id).map_err(|e| {
        let e = e.with_run_id(run_id.clone());
        log_op_error!(
            "recompute_changes",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64,
            crawl_id = crawl_id
        );
        e
    })?;

    log_op_end!(
        "recompute_changes",
        duration_ms = start.elapsed().as_millis() as u64,
        crawl_id = crawl_id,
        entity_types = report.reconciled.len()
    );
    Ok(report)
}

fn recompute_changes_impl(
    conn: &mut Connection,
    crawl_id: &str,
    config: &PipelineConfig,
    run_id: &RunId,
) -> Result<RecomputeReport> {
    config.validate()?;
    let current = crawls::get_crawl(conn, crawl_id)?.ok_or_else(|| {
        ExError::new(ExErrorKind::NotFound)
            .with_op("recompute_changes")
            .with_crawl_id(crawl_id)
            .with_message("crawl not found")
    })?;
    let previous = crawls::previous_crawl(conn, crawl_id)?;
    let reconciled = match &previous {
        Some(previous) => reconcile_pair(conn, previous, &current, config, run_id)?,
        None => BTreeMap::new(),
    };
    Ok(RecomputeReport {
        run_id: run_id.clone(),
        crawl_id: current.crawl_id,
        previous_crawl_id: previous.map(|p| p.crawl_id),
        reconciled,
    })
}

/// Extract every entity type of the pair, then reconcile them together.
fn reconcile_pair(
    conn: &mut Connection,
    previous: &CrawlRow,
    current: &CrawlRow,
    config: &PipelineConfig,
    run_id: &RunId,
) -> Result<BTreeMap<EntityType, ReconcileCounts>> {
    let diff_options = config.diff_options();
    let mut sets: Vec<(EntityType, ChangeSet)> = Vec::with_capacity(EntityType::ALL.len());

    for entity_type in EntityType::ALL {
        let extractor = ChangeExtractor::new(
            previous.crawl_id.as_str(),
            current.crawl_id.as_str(),
            entity_type,
            config.volatile_fields.clone(),
            diff_options.clone(),
        );
        let read: &Connection = conn;
        let fresh = extractor.extract(
            ArchiveScan::new(read, previous.crawl_id.as_str(), entity_type, config.scan_batch_size),
            ArchiveScan::new(read, current.crawl_id.as_str(), entity_type, config.scan_batch_size),
        )?;
        tracing::debug!(
            run_id = %run_id,
            crawl_id = current.crawl_id.as_str(),
            previous_crawl_id = previous.crawl_id.as_str(),
            entity_type = entity_type.as_str(),
            fresh = fresh.len(),
            "extracted"
        );
        sets.push((
            entity_type,
            ChangeSet {
                previous_crawl_id: previous.crawl_id.clone(),
                crawl_id: current.crawl_id.clone(),
                changes: fresh,
            },
        ));
    }

    reconcile_change_sets(conn, &current.day(), sets)
}

/// Converge the stored records of one crawl pair onto fresh change sets,
/// one per entity type.
///
/// Every set is planned before anything is written, and all plans are applied
/// in one transaction, so a rejected set leaves the pair and its day count
/// untouched.
///
/// ## Errors
///
/// - `DuplicateChangeKey`: two fresh records of a set share a key
/// - `InvalidInput`: a record names a different crawl pair than its set
/// - `Persistence` / `Serialization`: store failure
pub fn reconcile_change_sets(
    conn: &mut Connection,
    day: &str,
    sets: Vec<(EntityType, ChangeSet)>,
) -> Result<BTreeMap<EntityType, ReconcileCounts>> {
    let mut plans: Vec<(EntityType, ReconcilePlan)> = Vec::with_capacity(sets.len());
    for (entity_type, set) in sets {
        let crawl_id = set.crawl_id.clone();
        let stored = changes::load_changes(conn, &set.previous_crawl_id, &set.crawl_id, entity_type)?;
        let plan = plan_reconciliation(set, stored).map_err(|e| {
            ExError::from(e)
                .with_op("reconcile")
                .with_crawl_id(crawl_id)
                .with_entity_type(entity_type.as_str())
        })?;
        plans.push((entity_type, plan));
    }

    let (entity_types, plans): (Vec<EntityType>, Vec<ReconcilePlan>) = plans.into_iter().unzip();
    changes::apply_reconciliation(conn, day, &plans, Utc::now())?;

    let mut counts: BTreeMap<EntityType, ReconcileCounts> = BTreeMap::new();
    for (entity_type, plan) in entity_types.into_iter().zip(&plans) {
        tracing::debug!(
            day,
            entity_type = entity_type.as_str(),
            insert = plan.counts.insert,
            update = plan.counts.update,
            delete = plan.counts.delete,
            stable = plan.counts.stable,
            "reconciled"
        );
        counts.entry(entity_type).or_default().merge(plan.counts);
    }
    Ok(counts)
}
