//! Single-feature-type normalisation ("biomart fix").
//!
//! Downstream marts require each namespace to target exactly one feature
//! type. This pass probes the loaded bindings per namespace, picks the
//! target type by precedence and migrates the rest through
//! `gene_transcript_translation`, deleting rows whose migrated form would
//! collide. It reruns until the probe comes back clean.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use sqlx::postgres::PgConnection;
use tracing::{debug, info};
use xrefsync_common::WarningLog;

use crate::coredb::CoreStore;
use crate::error::{LoadError, Result};
use crate::models::EnsemblObjectType;

/// Namespaces pinned to Translation regardless of where their xrefs sit.
pub const GO_SOURCES: &[&str] = &["GO", "goslim_goa"];

const MAX_PASSES: usize = 8;

/// Row counts of one normalisation run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BiomartStats {
    pub migrated: u64,
    pub deleted: u64,
    pub passes: u32,
}

/// The feature type a namespace must collapse to, or `None` when it is
/// already consistent.
///
/// Precedence: GO namespaces always go to Translation; gene-specific
/// sources always go to Gene; otherwise Gene beats Translation beats
/// Transcript, and a single-type namespace stays put.
pub fn collapse_target(
    db_name: &str,
    gene_specific: bool,
    types: &[EnsemblObjectType],
) -> Option<EnsemblObjectType> {
    let needs = |target: EnsemblObjectType| types.iter().any(|t| *t != target);

    if GO_SOURCES.contains(&db_name) {
        return needs(EnsemblObjectType::Translation).then_some(EnsemblObjectType::Translation);
    }
    if gene_specific {
        return needs(EnsemblObjectType::Gene).then_some(EnsemblObjectType::Gene);
    }
    if types.len() <= 1 {
        return None;
    }
    if types.contains(&EnsemblObjectType::Gene) {
        Some(EnsemblObjectType::Gene)
    } else {
        Some(EnsemblObjectType::Translation)
    }
}

pub struct BiomartNormaliser {
    core: CoreStore,
    gene_specific: HashSet<String>,
}

impl BiomartNormaliser {
    pub fn new(core: CoreStore, gene_specific: HashSet<String>) -> Self {
        Self { core, gene_specific }
    }

    /// Collapse every namespace in `allowed_db_ids` to a single feature
    /// type. Runs inside the caller's transaction.
    pub async fn normalise(
        &self,
        conn: &mut PgConnection,
        allowed_db_ids: &HashSet<i64>,
        warnings: &mut WarningLog,
    ) -> Result<BiomartStats> {
        let mut stats = BiomartStats::default();

        for _ in 0..MAX_PASSES {
            let work = self.pending_migrations(conn, allowed_db_ids, warnings).await?;
            if work.is_empty() {
                return Ok(stats);
            }
            stats.passes += 1;

            for (external_db_id, db_name, from, to) in work {
                let include_go = GO_SOURCES.contains(&db_name.as_str());

                if CoreStore::supports_migration(from, to) {
                    stats.deleted += self
                        .core
                        .delete_migration_collisions(conn, external_db_id, from, to, include_go)
                        .await?;
                    let migrated = self
                        .core
                        .migrate_object_type(conn, external_db_id, from, to)
                        .await?;
                    stats.migrated += migrated;
                    let leftover = self
                        .core
                        .delete_unmigrated(conn, external_db_id, from, include_go)
                        .await?;
                    if leftover > 0 {
                        warnings.note(format!(
                            "{}: {} {} bindings had no {} to migrate to",
                            db_name, leftover, from, to
                        ));
                        stats.deleted += leftover;
                    }
                    debug!(
                        db_name = %db_name,
                        from = %from,
                        to = %to,
                        migrated,
                        leftover,
                        "feature-type migration"
                    );
                } else {
                    // No join path (e.g. GO attached directly to a gene);
                    // the rows cannot be kept without breaking the
                    // single-type constraint.
                    let dropped = self
                        .core
                        .delete_unmigrated(conn, external_db_id, from, include_go)
                        .await?;
                    warnings.note(format!(
                        "{}: dropped {} unmigratable {} bindings",
                        db_name, dropped, from
                    ));
                    stats.deleted += dropped;
                }
            }
        }

        let remaining = self.pending_migrations(conn, allowed_db_ids, warnings).await?;
        if remaining.is_empty() {
            info!(
                migrated = stats.migrated,
                deleted = stats.deleted,
                passes = stats.passes,
                "biomart normalisation finished"
            );
            Ok(stats)
        } else {
            let names: Vec<String> = remaining.into_iter().map(|(_, name, _, _)| name).collect();
            Err(LoadError::integrity(format!(
                "feature-type normalisation did not converge for: {}",
                names.join(", ")
            )))
        }
    }

    /// Probe the bindings and list every `(namespace, from, to)` migration
    /// still outstanding.
    async fn pending_migrations(
        &self,
        conn: &mut PgConnection,
        allowed_db_ids: &HashSet<i64>,
        warnings: &mut WarningLog,
    ) -> Result<Vec<(i64, String, EnsemblObjectType, EnsemblObjectType)>> {
        let counts = self.core.source_type_counts(conn).await?;

        let mut by_db: BTreeMap<i64, (String, Vec<EnsemblObjectType>)> = BTreeMap::new();
        for count in counts {
            if !allowed_db_ids.contains(&count.external_db_id) {
                continue;
            }
            let object_type = match EnsemblObjectType::from_str(&count.ensembl_object_type) {
                Ok(t) => t,
                Err(_) => {
                    warnings.note(format!(
                        "{}: unknown feature type {}",
                        count.db_name, count.ensembl_object_type
                    ));
                    continue;
                }
            };
            by_db
                .entry(count.external_db_id)
                .or_insert_with(|| (count.db_name.clone(), Vec::new()))
                .1
                .push(object_type);
        }

        let mut work = Vec::new();
        for (external_db_id, (db_name, types)) in by_db {
            let gene_specific = self.gene_specific.contains(&db_name);
            if let Some(target) = collapse_target(&db_name, gene_specific, &types) {
                for from in types {
                    if from != target {
                        work.push((external_db_id, db_name.clone(), from, target));
                    }
                }
            }
        }
        Ok(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EnsemblObjectType::{Gene, Transcript, Translation};

    #[test]
    fn single_type_sources_stay_put() {
        assert_eq!(collapse_target("RefSeq_mRNA", false, &[Transcript]), None);
        assert_eq!(collapse_target("UniProt", false, &[Translation]), None);
    }

    #[test]
    fn gene_wins_over_everything() {
        assert_eq!(
            collapse_target("RefSeq_mRNA", false, &[Gene, Transcript]),
            Some(Gene)
        );
        assert_eq!(
            collapse_target("RefSeq_mRNA", false, &[Transcript, Gene, Translation]),
            Some(Gene)
        );
    }

    #[test]
    fn translation_beats_transcript() {
        assert_eq!(
            collapse_target("UniProt", false, &[Transcript, Translation]),
            Some(Translation)
        );
    }

    #[test]
    fn go_always_collapses_to_translation() {
        assert_eq!(
            collapse_target("GO", false, &[Transcript, Translation]),
            Some(Translation)
        );
        assert_eq!(collapse_target("GO", false, &[Transcript]), Some(Translation));
        assert_eq!(collapse_target("GO", false, &[Translation]), None);
        assert_eq!(
            collapse_target("goslim_goa", false, &[Transcript]),
            Some(Translation)
        );
    }

    #[test]
    fn gene_specific_sources_collapse_to_gene_even_from_one_type() {
        assert_eq!(collapse_target("HGNC", true, &[Transcript]), Some(Gene));
        assert_eq!(collapse_target("HGNC", true, &[Gene]), None);
    }
}
