//! Mapped load paths.
//!
//! All three share one shape: consume the ordered stream of a
//! `(source, info_type)` batch, upsert the xref on the first row of each
//! staged id, upsert the binding on each new `(xref_id, ensembl_id)` pair,
//! and flush synonyms plus dumped flags in batches at xref boundaries.

use std::collections::{HashMap, HashSet};

use futures::TryStreamExt;
use sqlx::postgres::PgConnection;
use tracing::{debug, info};
use xrefsync_common::WarningLog;

use crate::coredb::{CoreStore, IdentityParams, NewXref};
use crate::error::{LoadError, Result};
use crate::models::{DumpStatus, EnsemblObjectType, InfoType};
use crate::offsets::Offsets;
use crate::staging::{MappedXrefRow, SourceGroup, StagingStore};

use super::{AnalysisSet, LoadSummary, DUMP_BATCH_SIZE};

/// Shared collaborators of one mapped-load phase.
pub(crate) struct GroupContext<'a> {
    pub staging: &'a StagingStore,
    pub core: &'a CoreStore,
    pub offsets: Offsets,
    pub analyses: &'a AnalysisSet,
    pub verbose: bool,
}

/// Per-group running state: the staged ids written so far and their core
/// counterparts, flushed at xref boundaries.
struct GroupBatch {
    staged_to_core: HashMap<i64, i64>,
    staged_ids: Vec<i64>,
}

impl GroupBatch {
    fn new() -> Self {
        Self {
            staged_to_core: HashMap::new(),
            staged_ids: Vec::new(),
        }
    }

    fn push(&mut self, staged_id: i64, core_id: i64) {
        self.staged_to_core.insert(staged_id, core_id);
        self.staged_ids.push(staged_id);
    }

    fn is_full(&self) -> bool {
        self.staged_ids.len() >= DUMP_BATCH_SIZE
    }

    /// Copy synonyms for the batch and mark it dumped, then reset.
    async fn flush(
        &mut self,
        ctx: &GroupContext<'_>,
        conn: &mut PgConnection,
        summary: &mut LoadSummary,
    ) -> Result<()> {
        if self.staged_ids.is_empty() {
            return Ok(());
        }
        {
            let mut synonyms = ctx.staging.synonyms_for(&self.staged_ids);
            while let Some(row) = synonyms.try_next().await? {
                if let Some(&core_xref_id) = self.staged_to_core.get(&row.xref_id) {
                    ctx.core.add_synonym(conn, core_xref_id, &row.synonym).await?;
                    summary.synonyms_written += 1;
                }
            }
        }
        ctx.staging
            .mark_dumped(&self.staged_ids, DumpStatus::Mapped)
            .await?;
        self.staged_to_core.clear();
        self.staged_ids.clear();
        Ok(())
    }
}

fn parse_object_type(raw: &str, accession: &str) -> Result<EnsemblObjectType> {
    EnsemblObjectType::from_str(raw).map_err(|_| {
        LoadError::integrity(format!("xref {} bound to unknown feature type {}", accession, raw))
    })
}

fn identity_from_row(row: &MappedXrefRow) -> IdentityParams {
    IdentityParams {
        query_identity: row.query_identity,
        target_identity: row.target_identity,
        hit_start: row.hit_start,
        hit_end: row.hit_end,
        translation_start: row.translation_start,
        translation_end: row.translation_end,
        cigar_line: row.cigar_line.clone(),
        score: row.score,
        evalue: row.evalue,
    }
}

fn log_group_done(verbose: bool, group: &SourceGroup, info_type: InfoType, loaded: u64) {
    if verbose {
        info!(source = %group.name, info_type = %info_type, loaded, "group loaded");
    } else {
        debug!(source = %group.name, info_type = %info_type, loaded, "group loaded");
    }
}

/// DIRECT, INFERRED_PAIR, MISC and SEQUENCE_MATCH batches; identity rows are
/// attached whenever the stream carries alignment coordinates.
pub(crate) async fn load_identity_group(
    ctx: &GroupContext<'_>,
    conn: &mut PgConnection,
    group: &SourceGroup,
    info_type: InfoType,
    external_db_id: i64,
    summary: &mut LoadSummary,
) -> Result<()> {
    let mut batch = GroupBatch::new();
    let mut last_xref: Option<i64> = None;
    let mut last_pair: Option<(i64, i64)> = None;
    let mut core_xref_id = 0i64;
    let mut loaded = 0u64;

    {
        let mut stream = ctx.staging.mapped_xrefs(group.source_id, info_type);
        while let Some(row) = stream.try_next().await? {
            let object_type = parse_object_type(&row.ensembl_object_type, &row.accession)?;

            if last_xref != Some(row.xref_id) {
                if batch.is_full() {
                    // Safe mid-stream: the flush runs on other pooled
                    // connections and only touches rows already consumed.
                    batch.flush(ctx, conn, summary).await?;
                }
                let returned = ctx
                    .core
                    .upsert_xref(conn, ctx.offsets.xref, row.xref_id, &new_xref(&row, external_db_id, info_type))
                    .await?;
                core_xref_id = ctx.offsets.promote_xref(returned);
                batch.push(row.xref_id, core_xref_id);
                summary.xrefs_written += 1;
                loaded += 1;
                last_xref = Some(row.xref_id);
                last_pair = None;
            }

            if last_pair != Some((row.xref_id, row.ensembl_id)) {
                let analysis_id = ctx.analyses.for_object_type(object_type);
                let returned = ctx
                    .core
                    .upsert_object_xref(
                        conn,
                        ctx.offsets.object_xref,
                        row.object_xref_id,
                        core_xref_id,
                        object_type,
                        row.ensembl_id,
                        analysis_id,
                        None,
                    )
                    .await?;
                let core_object_xref_id = ctx.offsets.promote_object_xref(returned);
                summary.object_xrefs_written += 1;

                if row.has_alignment() {
                    ctx.core
                        .add_identity_xref(conn, core_object_xref_id, &identity_from_row(&row))
                        .await?;
                    summary.identity_xrefs_written += 1;
                }
                last_pair = Some((row.xref_id, row.ensembl_id));
            }
        }
    }

    batch.flush(ctx, conn, summary).await?;
    log_group_done(ctx.verbose, group, info_type, loaded);
    Ok(())
}

/// CHECKSUM batches, bound under the checksum analysis.
pub(crate) async fn load_checksum_group(
    ctx: &GroupContext<'_>,
    conn: &mut PgConnection,
    group: &SourceGroup,
    external_db_id: i64,
    summary: &mut LoadSummary,
) -> Result<()> {
    let analysis_id = ctx.analyses.checksum()?;
    let mut batch = GroupBatch::new();
    let mut last_xref: Option<i64> = None;
    let mut last_pair: Option<(i64, i64)> = None;
    let mut core_xref_id = 0i64;
    let mut loaded = 0u64;

    {
        let mut stream = ctx.staging.checksum_xrefs(group.source_id);
        while let Some(row) = stream.try_next().await? {
            let object_type = parse_object_type(&row.ensembl_object_type, &row.accession)?;

            if last_xref != Some(row.xref_id) {
                if batch.is_full() {
                    batch.flush(ctx, conn, summary).await?;
                }
                let x = NewXref {
                    external_db_id,
                    accession: row.accession.clone(),
                    label: row.label.clone().unwrap_or_else(|| row.accession.clone()),
                    version: row.version.unwrap_or(0),
                    description: row.description.clone(),
                    info_type: InfoType::Checksum,
                    info_text: row.info_text.clone().unwrap_or_default(),
                };
                let returned = ctx
                    .core
                    .upsert_xref(conn, ctx.offsets.xref, row.xref_id, &x)
                    .await?;
                core_xref_id = ctx.offsets.promote_xref(returned);
                batch.push(row.xref_id, core_xref_id);
                summary.xrefs_written += 1;
                loaded += 1;
                last_xref = Some(row.xref_id);
                last_pair = None;
            }

            if last_pair != Some((row.xref_id, row.ensembl_id)) {
                let returned = ctx
                    .core
                    .upsert_object_xref(
                        conn,
                        ctx.offsets.object_xref,
                        row.object_xref_id,
                        core_xref_id,
                        object_type,
                        row.ensembl_id,
                        analysis_id,
                        None,
                    )
                    .await?;
                let _ = ctx.offsets.promote_object_xref(returned);
                summary.object_xrefs_written += 1;
                last_pair = Some((row.xref_id, row.ensembl_id));
            }
        }
    }

    batch.flush(ctx, conn, summary).await?;
    log_group_done(ctx.verbose, group, InfoType::Checksum, loaded);
    Ok(())
}

/// DEPENDENT batches: the binding inherits the master's mapping, and the
/// master/dependent edge is written once per pair per run.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn load_dependent_group(
    ctx: &GroupContext<'_>,
    conn: &mut PgConnection,
    group: &SourceGroup,
    external_db_id: i64,
    dependent_memo: &mut HashSet<(i64, i64)>,
    master_warnings: &mut WarningLog,
    summary: &mut LoadSummary,
) -> Result<()> {
    let mut batch = GroupBatch::new();
    let mut last_xref: Option<i64> = None;
    let mut last_pair: Option<(i64, i64)> = None;
    let mut core_xref_id = 0i64;
    let mut loaded = 0u64;

    {
        let mut stream = ctx.staging.dependent_xrefs(group.source_id);
        while let Some(row) = stream.try_next().await? {
            let object_type = parse_object_type(&row.ensembl_object_type, &row.accession)?;

            if last_xref != Some(row.xref_id) {
                if batch.is_full() {
                    batch.flush(ctx, conn, summary).await?;
                }
                let x = NewXref {
                    external_db_id,
                    accession: row.accession.clone(),
                    label: row.label.clone().unwrap_or_else(|| row.accession.clone()),
                    version: row.version.unwrap_or(0),
                    description: row.description.clone(),
                    info_type: InfoType::Dependent,
                    info_text: row.info_text.clone().unwrap_or_default(),
                };
                let returned = ctx
                    .core
                    .upsert_xref(conn, ctx.offsets.xref, row.xref_id, &x)
                    .await?;
                core_xref_id = ctx.offsets.promote_xref(returned);
                batch.push(row.xref_id, core_xref_id);
                summary.xrefs_written += 1;
                loaded += 1;
                last_xref = Some(row.xref_id);
                last_pair = None;
            }

            if last_pair != Some((row.xref_id, row.ensembl_id)) {
                let analysis_id = ctx.analyses.for_object_type(object_type);
                let returned = ctx
                    .core
                    .upsert_object_xref(
                        conn,
                        ctx.offsets.object_xref,
                        row.object_xref_id,
                        core_xref_id,
                        object_type,
                        row.ensembl_id,
                        analysis_id,
                        row.linkage_annotation.as_deref(),
                    )
                    .await?;
                let core_object_xref_id = ctx.offsets.promote_object_xref(returned);
                summary.object_xrefs_written += 1;
                last_pair = Some((row.xref_id, row.ensembl_id));

                match row.master_xref_id {
                    Some(master_xref_id) => {
                        if dependent_memo.insert((master_xref_id, row.xref_id)) {
                            ctx.core
                                .add_dependent_xref(
                                    conn,
                                    core_object_xref_id,
                                    ctx.offsets.promote_xref(master_xref_id),
                                    core_xref_id,
                                )
                                .await?;
                            summary.dependent_links_written += 1;
                        }
                    }
                    None => {
                        summary.master_problems += 1;
                        master_warnings.note(row.accession.clone());
                    }
                }
            }
        }
    }

    batch.flush(ctx, conn, summary).await?;
    log_group_done(ctx.verbose, group, InfoType::Dependent, loaded);
    Ok(())
}

fn new_xref(row: &MappedXrefRow, external_db_id: i64, info_type: InfoType) -> NewXref {
    NewXref {
        external_db_id,
        accession: row.accession.clone(),
        label: row.label.clone().unwrap_or_else(|| row.accession.clone()),
        version: row.version.unwrap_or(0),
        description: row.description.clone(),
        info_type,
        info_text: row.info_text.clone().unwrap_or_default(),
    }
}
