//! Unmapped load path.
//!
//! Whatever the mapped load left behind is still recorded: the xref goes
//! into the core as `UNMAPPED` so the accession stays searchable, an
//! `unmapped_object` row carries the typed reason, and the staged row gets
//! the dumped tag matching that reason.

use std::collections::HashMap;

use futures::TryStreamExt;
use sqlx::postgres::PgConnection;
use tracing::debug;

use crate::coredb::{CoreStore, NewXref, UnmappedObjectRow};
use crate::error::Result;
use crate::models::{DumpStatus, EnsemblObjectType, InfoType};
use crate::offsets::Offsets;
use crate::reasons::{UnmappedReasonKind, UnmappedReasonRegistry};
use crate::resolver::NamespaceResolver;
use crate::staging::{StagingStore, UnmappedXrefRow};

use super::{AnalysisSet, LoadSummary, DUMP_BATCH_SIZE};

/// The five unmapped passes, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnmappedCategory {
    Direct,
    Misc,
    Dependent,
    Sequence,
    Other,
}

impl UnmappedCategory {
    pub const ALL: [UnmappedCategory; 5] = [
        UnmappedCategory::Direct,
        UnmappedCategory::Misc,
        UnmappedCategory::Dependent,
        UnmappedCategory::Sequence,
        UnmappedCategory::Other,
    ];

    fn label(&self) -> &'static str {
        match self {
            UnmappedCategory::Direct => "direct",
            UnmappedCategory::Misc => "misc",
            UnmappedCategory::Dependent => "dependent",
            UnmappedCategory::Sequence => "sequence",
            UnmappedCategory::Other => "other",
        }
    }
}

/// Pick the reason and the staging dumped tag for one row.
fn reason_for(
    category: UnmappedCategory,
    row: &UnmappedXrefRow,
    resolver: &NamespaceResolver,
    registry: &UnmappedReasonRegistry,
) -> (i64, DumpStatus) {
    let kind = match category {
        UnmappedCategory::Direct => UnmappedReasonKind::NoStableId,
        UnmappedCategory::Misc => UnmappedReasonKind::NoMapping,
        UnmappedCategory::Dependent => UnmappedReasonKind::MasterFailed,
        UnmappedCategory::Other => UnmappedReasonKind::NoMaster,
        UnmappedCategory::Sequence => {
            // Three ways a sequence xref ends up here: it hangs off a
            // master that never mapped, its best alignment fell below the
            // source cutoffs, or it never aligned at all.
            if row.parent.is_some() {
                UnmappedReasonKind::MasterFailed
            } else if row.query_identity.is_some() || row.target_identity.is_some() {
                let reason_id = resolver
                    .source_name(row.source_id)
                    .and_then(|name| registry.cutoff_id(name))
                    .unwrap_or_else(|| registry.id(UnmappedReasonKind::FailedMap));
                return (reason_id, UnmappedReasonKind::FailedMap.dump_status());
            } else {
                UnmappedReasonKind::FailedMap
            }
        }
    };
    (registry.id(kind), kind.dump_status())
}

/// Stream one category, writing the UNMAPPED xref, the unmapped_object row
/// and the dumped tag for every candidate in a transferable namespace.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn load_unmapped_category(
    staging: &StagingStore,
    core: &CoreStore,
    conn: &mut PgConnection,
    resolver: &NamespaceResolver,
    offsets: Offsets,
    analyses: &AnalysisSet,
    registry: &UnmappedReasonRegistry,
    category: UnmappedCategory,
    summary: &mut LoadSummary,
) -> Result<()> {
    let mut batches: HashMap<DumpStatus, Vec<i64>> = HashMap::new();
    let mut written = 0u64;

    {
        let mut stream = match category {
            UnmappedCategory::Direct => staging.direct_unmapped(),
            UnmappedCategory::Misc => staging.misc_unmapped(),
            UnmappedCategory::Dependent => staging.dependent_unmapped(),
            UnmappedCategory::Sequence => staging.sequence_unmapped(),
            UnmappedCategory::Other => staging.other_unmapped(),
        };

        while let Some(row) = stream.try_next().await? {
            let Some(external_db_id) = resolver.external_db_id_for_source(row.source_id) else {
                // Suppressed or never-promoted namespace.
                continue;
            };

            let x = NewXref {
                external_db_id,
                accession: row.accession.clone(),
                label: row.label.clone().unwrap_or_else(|| row.accession.clone()),
                version: row.version.unwrap_or(0),
                description: row.description.clone(),
                info_type: InfoType::Unmapped,
                info_text: row.info_text.clone().unwrap_or_default(),
            };
            core.upsert_xref(conn, offsets.xref, row.xref_id, &x).await?;

            let (unmapped_reason_id, dump_status) =
                reason_for(category, &row, resolver, registry);

            let object_type = row
                .ensembl_object_type
                .as_deref()
                .and_then(|raw| EnsemblObjectType::from_str(raw).ok());
            let analysis_id = match object_type {
                Some(EnsemblObjectType::Translation) => analyses.protein(),
                _ => analyses.dna(),
            };

            core.add_unmapped_object(
                conn,
                &UnmappedObjectRow {
                    analysis_id,
                    external_db_id,
                    identifier: row.accession.clone(),
                    unmapped_reason_id,
                    query_score: row.query_identity.map(f64::from),
                    target_score: row.target_identity.map(f64::from),
                    ensembl_id: row.ensembl_id,
                    ensembl_object_type: object_type,
                    parent: row.parent.clone(),
                },
            )
            .await?;
            summary.unmapped_objects_written += 1;
            written += 1;

            let batch = batches.entry(dump_status).or_default();
            batch.push(row.xref_id);
            if batch.len() >= DUMP_BATCH_SIZE {
                staging.mark_dumped(batch, dump_status).await?;
                batch.clear();
            }
        }
    }

    for (dump_status, batch) in batches {
        staging.mark_dumped(&batch, dump_status).await?;
    }
    debug!(category = category.label(), written, "unmapped category recorded");
    Ok(())
}
