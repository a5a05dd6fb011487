//! Alternative-allele propagation.
//!
//! Every gene-specific xref must end up on the reference gene of its
//! alt-allele group and be mirrored onto every alternative gene, so that a
//! symbol search hits all loci. Planning is pure; execution runs inside the
//! caller's core transaction.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::postgres::PgConnection;
use tracing::{debug, info};
use xrefsync_common::WarningLog;

use crate::coredb::CoreStore;
use crate::error::Result;
use crate::models::EnsemblObjectType;
use crate::staging::AltAlleleRow;

/// The move/copy plan for one run.
#[derive(Debug, Clone, Default)]
pub struct AltAllelePlan {
    /// Every alternative gene and the reference it yields its xrefs to.
    pub alt_to_ref: BTreeMap<i64, i64>,
    /// Every reference gene and the alternatives that receive copies.
    pub ref_to_alts: BTreeMap<i64, Vec<i64>>,
}

impl AltAllelePlan {
    pub fn is_empty(&self) -> bool {
        self.alt_to_ref.is_empty()
    }
}

/// Row movement counts of one propagation run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AltAlleleStats {
    pub moved: u64,
    pub deleted: u64,
    pub copied: u64,
    pub ignored: u64,
}

/// Elect a reference per group and fold in the LRG pseudo-groups.
///
/// A group with no reference member elects its first gene and is noted as a
/// warning. An LRG gene attaches as a non-reference member of the group its
/// target gene belongs to, or forms a new two-gene group with the target as
/// reference; groups stay flat.
pub fn build_plan(
    rows: &[AltAlleleRow],
    lrg_pairs: &[(i64, i64)],
    warnings: &mut WarningLog,
) -> AltAllelePlan {
    let mut groups: BTreeMap<i64, Vec<&AltAlleleRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.alt_allele_id).or_default().push(row);
    }

    let mut plan = AltAllelePlan::default();
    for (group_id, members) in &groups {
        let reference = match members.iter().find(|m| m.is_reference) {
            Some(member) => member.gene_id,
            None => {
                let elected = members[0].gene_id;
                warnings.note(format!(
                    "alt allele group {} has no reference gene, elected gene {}",
                    group_id, elected
                ));
                elected
            }
        };
        for member in members {
            if member.gene_id == reference {
                continue;
            }
            plan.alt_to_ref.insert(member.gene_id, reference);
            plan.ref_to_alts
                .entry(reference)
                .or_default()
                .push(member.gene_id);
        }
    }

    for &(lrg_gene, target_gene) in lrg_pairs {
        // An LRG pointing at a gene that is itself an alternative joins that
        // gene's group instead of nesting under it.
        let reference = plan
            .alt_to_ref
            .get(&target_gene)
            .copied()
            .unwrap_or(target_gene);
        if plan.alt_to_ref.contains_key(&lrg_gene) {
            continue;
        }
        plan.alt_to_ref.insert(lrg_gene, reference);
        plan.ref_to_alts.entry(reference).or_default().push(lrg_gene);
    }

    plan
}

pub struct AltAlleleResolver {
    core: CoreStore,
}

impl AltAlleleResolver {
    pub fn new(core: CoreStore) -> Self {
        Self { core }
    }

    /// Execute the plan: move gene-specific bindings from alternatives to
    /// their reference, then copy the reference's bindings to every
    /// alternative with freshly allocated ids. A move whose target binding
    /// already exists deletes the alternative-side row instead of merging.
    pub async fn propagate(
        &self,
        conn: &mut PgConnection,
        plan: &AltAllelePlan,
        gene_specific_db_ids: &[i64],
    ) -> Result<AltAlleleStats> {
        let mut stats = AltAlleleStats::default();
        if plan.is_empty() || gene_specific_db_ids.is_empty() {
            debug!("no alt-allele propagation to do");
            return Ok(stats);
        }

        for (&alt_gene, &ref_gene) in &plan.alt_to_ref {
            let bindings = self
                .core
                .gene_bindings(conn, alt_gene, gene_specific_db_ids)
                .await?;
            for binding in bindings {
                let exists = self
                    .core
                    .object_xref_exists(
                        conn,
                        binding.xref_id,
                        EnsemblObjectType::Gene,
                        ref_gene,
                        binding.analysis_id,
                    )
                    .await?;
                if exists {
                    self.core
                        .delete_object_xref(conn, binding.object_xref_id)
                        .await?;
                    stats.ignored += 1;
                    stats.deleted += 1;
                } else {
                    self.core
                        .reassign_object_xref_gene(conn, binding.object_xref_id, ref_gene)
                        .await?;
                    stats.moved += 1;
                }
            }
        }

        let mut next_object_xref_id = self.core.max_object_xref_id(conn).await? + 1;
        for (&ref_gene, alts) in &plan.ref_to_alts {
            let bindings = self
                .core
                .gene_bindings(conn, ref_gene, gene_specific_db_ids)
                .await?;
            for &alt_gene in alts {
                for binding in &bindings {
                    let inserted = self
                        .core
                        .insert_object_xref_with_id(
                            conn,
                            next_object_xref_id,
                            binding.xref_id,
                            EnsemblObjectType::Gene,
                            alt_gene,
                            binding.analysis_id,
                            binding.linkage_annotation.as_deref(),
                        )
                        .await?;
                    if inserted {
                        if let Some(identity) = binding.identity() {
                            self.core
                                .add_identity_xref(conn, next_object_xref_id, &identity)
                                .await?;
                        }
                        next_object_xref_id += 1;
                        stats.copied += 1;
                    } else {
                        stats.ignored += 1;
                    }
                }
            }
        }

        info!(
            moved = stats.moved,
            deleted = stats.deleted,
            copied = stats.copied,
            ignored = stats.ignored,
            "alt-allele propagation finished"
        );
        Ok(stats)
    }
}
