//! The loader orchestrator.
//!
//! `Loader::update` is the single public entry point. Phases run in order,
//! each under its own core transaction, with the process-status log as the
//! durable checkpoint between them: reset, per-source purge, offset
//! allocation, analysis ensure, mapped load, unmapped load, alt-allele
//! propagation, biomart normalisation, audit.

pub(crate) mod mapped;
pub(crate) mod unmapped;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::{PgConnection, PgPool};
use tracing::{debug, info};
use xrefsync_common::WarningLog;

use crate::alt_allele::{build_plan, AltAlleleResolver, AltAlleleStats};
use crate::biomart::{BiomartNormaliser, BiomartStats};
use crate::config::{create_pool, LoaderConfig};
use crate::coredb::CoreStore;
use crate::error::{LoadError, Result};
use crate::models::{EnsemblObjectType, InfoType};
use crate::offsets::{OffsetAllocator, Offsets};
use crate::qc::QualityChecker;
use crate::reasons::UnmappedReasonRegistry;
use crate::resolver::{NamespaceResolver, GENE_SPECIFIC_SOURCES};
use crate::staging::StagingStore;
use crate::status::{ProcessPhase, ProcessStatusMachine};

/// Analysis used for gene- and transcript-level bindings.
pub const ANALYSIS_DNA: &str = "xrefexoneratedna";
/// Analysis used for translation-level bindings.
pub const ANALYSIS_PROTEIN: &str = "xrefexonerateprotein";
/// Analysis used for checksum-matched bindings.
pub const ANALYSIS_CHECKSUM: &str = "xrefchecksum";

/// How many xrefs to accumulate before flushing synonyms and dumped flags.
pub(crate) const DUMP_BATCH_SIZE: usize = 5_000;

/// Default pool size per database.
const POOL_CONNECTIONS: u32 = 4;

/// Counters for one `update` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub sources_purged: u64,
    pub groups_loaded: u64,
    pub xrefs_written: u64,
    pub object_xrefs_written: u64,
    pub identity_xrefs_written: u64,
    pub dependent_links_written: u64,
    pub synonyms_written: u64,
    pub unmapped_objects_written: u64,
    pub master_problems: u64,
    pub alt_allele: AltAlleleStats,
    pub biomart: BiomartStats,
    pub warnings: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

impl LoadSummary {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;
        }
    }
}

/// The analysis ids materialised for one run.
pub(crate) struct AnalysisSet {
    dna: i64,
    protein: i64,
    checksum: Option<i64>,
}

impl AnalysisSet {
    pub async fn ensure(
        core: &CoreStore,
        conn: &mut PgConnection,
        needs_checksum: bool,
    ) -> Result<Self> {
        let dna = core.ensure_analysis(conn, ANALYSIS_DNA).await?;
        let protein = core.ensure_analysis(conn, ANALYSIS_PROTEIN).await?;
        let checksum = if needs_checksum {
            Some(core.ensure_analysis(conn, ANALYSIS_CHECKSUM).await?)
        } else {
            None
        };
        Ok(Self {
            dna,
            protein,
            checksum,
        })
    }

    pub fn dna(&self) -> i64 {
        self.dna
    }

    pub fn protein(&self) -> i64 {
        self.protein
    }

    pub fn for_object_type(&self, object_type: EnsemblObjectType) -> i64 {
        match object_type {
            EnsemblObjectType::Gene | EnsemblObjectType::Transcript => self.dna,
            EnsemblObjectType::Translation => self.protein,
        }
    }

    pub fn checksum(&self) -> Result<i64> {
        self.checksum
            .ok_or_else(|| LoadError::integrity("checksum analysis was not materialised"))
    }
}

pub struct Loader {
    config: LoaderConfig,
    staging: StagingStore,
    core: CoreStore,
    status: ProcessStatusMachine,
}

impl Loader {
    pub fn new(config: LoaderConfig, staging_pool: PgPool, core_pool: PgPool) -> Self {
        let staging = StagingStore::new(staging_pool, config.species_id);
        let core = CoreStore::new(core_pool);
        let status = ProcessStatusMachine::new(staging.clone());
        Self {
            config,
            staging,
            core,
            status,
        }
    }

    /// Open pools from the configuration and build the loader.
    pub async fn connect(config: LoaderConfig) -> Result<Self> {
        let staging_pool = create_pool(&config.staging, POOL_CONNECTIONS).await?;
        let core_pool = create_pool(&config.core, POOL_CONNECTIONS).await?;
        Ok(Self::new(config, staging_pool, core_pool))
    }

    pub fn status(&self) -> &ProcessStatusMachine {
        &self.status
    }

    /// Run the end-to-end promotion.
    pub async fn update(&self) -> Result<LoadSummary> {
        let mut summary = LoadSummary::new();
        self.status.require_mapping_finished().await?;

        // Planning inputs.
        let groups = self.staging.xref_groups_for_dump_out().await?;
        let sources = self.staging.sources().await?;
        let external_dbs = self.core.external_dbs().await?;
        let curated: Vec<String> = GENE_SPECIFIC_SOURCES
            .iter()
            .map(|name| name.to_string())
            .collect();
        let gene_specific_with_xrefs: HashSet<String> = self
            .staging
            .source_names_with_xrefs(&curated)
            .await?
            .into_iter()
            .collect();
        let promoted: HashSet<String> = groups.iter().map(|g| g.name.clone()).collect();
        let resolver = NamespaceResolver::build(
            &sources,
            &external_dbs,
            &promoted,
            &gene_specific_with_xrefs,
        )?;
        info!(
            groups = groups.len(),
            sources = sources.len(),
            "starting core load"
        );

        // Phase 1: reset projections and dumped flags.
        {
            let mut tx = self.core.pool().begin().await?;
            let projected = self.core.delete_projected(&mut tx).await?;
            tx.commit().await?;
            let cleared = self.staging.reset_dumped_unless_another_priority().await?;
            info!(projected, cleared, "reset phase finished");
        }

        // Phase 2: purge each promoted namespace.
        {
            let mut tx = self.core.pool().begin().await?;
            let mut purged: HashSet<i64> = HashSet::new();
            for group in &groups {
                if resolver.is_suppressed(&group.name) {
                    continue;
                }
                let external_db_id = resolver.external_db_id(&group.name).ok_or_else(|| {
                    LoadError::config(format!("Could not find {} in external_db", group.name))
                })?;
                if purged.insert(external_db_id) {
                    let deleted = self.core.delete_by_external_db(&mut tx, external_db_id).await?;
                    debug!(source = %group.name, deleted, "namespace purged");
                    summary.sources_purged += 1;
                }
            }
            tx.commit().await?;
        }

        // Phase 3: offsets.
        let offsets = OffsetAllocator::allocate(&self.staging, &self.core).await?;

        // Phase 4: analyses.
        let needs_checksum = groups.iter().any(|g| g.info_type == "CHECKSUM");
        let analyses = {
            let mut conn = self.core.pool().acquire().await?;
            AnalysisSet::ensure(&self.core, &mut conn, needs_checksum).await?
        };

        // Phase 5: mapped load.
        self.load_mapped(&groups, &resolver, offsets, &analyses, &mut summary)
            .await?;

        // Phase 6: unmapped load.
        self.load_unmapped(&resolver, offsets, &analyses, &mut summary)
            .await?;

        // Phase 7: alt alleles, biomart fix, audit, status.
        self.propagate_alt_alleles(&resolver, &mut summary).await?;
        self.normalise_feature_types(&resolver, &mut summary).await?;

        let run_db_ids: Vec<i64> = resolver
            .transferable_external_db_ids()
            .into_iter()
            .collect();
        QualityChecker::new(self.core.clone()).audit(&run_db_ids).await?;
        self.status.record(ProcessPhase::CoreLoaded).await?;

        summary.complete();
        info!(
            summary = %serde_json::to_string(&summary).unwrap_or_default(),
            "core load finished"
        );
        Ok(summary)
    }

    /// Phase 5: promote every `(source, info_type)` batch under one
    /// transaction.
    async fn load_mapped(
        &self,
        groups: &[crate::staging::SourceGroup],
        resolver: &NamespaceResolver,
        offsets: Offsets,
        analyses: &AnalysisSet,
        summary: &mut LoadSummary,
    ) -> Result<()> {
        let mut tx = self.core.pool().begin().await?;
        let mut warnings = WarningLog::new("mapped load");
        let mut master_warnings = WarningLog::new("dependent xrefs without master");
        let mut dependent_memo: HashSet<(i64, i64)> = HashSet::new();

        let ctx = mapped::GroupContext {
            staging: &self.staging,
            core: &self.core,
            offsets,
            analyses,
            verbose: self.config.verbose,
        };

        for group in groups {
            if resolver.is_suppressed(&group.name) {
                debug!(source = %group.name, "suppressed source skipped");
                continue;
            }
            let info_type = match InfoType::from_str(&group.info_type) {
                Ok(info_type) => info_type,
                Err(_) => {
                    warnings.note(format!("{} ({})", group.name, group.info_type));
                    continue;
                }
            };
            let external_db_id = resolver.external_db_id(&group.name).ok_or_else(|| {
                LoadError::config(format!("Could not find {} in external_db", group.name))
            })?;

            match info_type {
                InfoType::Direct
                | InfoType::InferredPair
                | InfoType::Misc
                | InfoType::SequenceMatch => {
                    mapped::load_identity_group(
                        &ctx,
                        &mut tx,
                        group,
                        info_type,
                        external_db_id,
                        summary,
                    )
                    .await?;
                }
                InfoType::Checksum => {
                    mapped::load_checksum_group(&ctx, &mut tx, group, external_db_id, summary)
                        .await?;
                }
                InfoType::Dependent => {
                    mapped::load_dependent_group(
                        &ctx,
                        &mut tx,
                        group,
                        external_db_id,
                        &mut dependent_memo,
                        &mut master_warnings,
                        summary,
                    )
                    .await?;
                }
                InfoType::Projection => {
                    // Stale projections were purged in phase 1 and are never
                    // re-promoted from staging.
                    debug!(source = %group.name, "projection group skipped");
                    continue;
                }
                InfoType::Unmapped => {
                    warnings.note(format!("{} (UNMAPPED in staging)", group.name));
                    continue;
                }
            }
            summary.groups_loaded += 1;

            if let Some(release) = &group.release {
                self.core
                    .set_source_release(&mut tx, external_db_id, release)
                    .await?;
            }
        }

        warnings.emit();
        master_warnings.emit();
        summary.warnings += warnings.count() + master_warnings.count();
        tx.commit().await?;
        Ok(())
    }

    /// Phase 6: record every leftover xref with a typed reason.
    async fn load_unmapped(
        &self,
        resolver: &NamespaceResolver,
        offsets: Offsets,
        analyses: &AnalysisSet,
        summary: &mut LoadSummary,
    ) -> Result<()> {
        let mut tx = self.core.pool().begin().await?;

        let cutoffs = self.staging.unmapped_cutoffs().await?;
        let registry = UnmappedReasonRegistry::build(&self.core, &mut tx, &cutoffs).await?;

        for category in unmapped::UnmappedCategory::ALL {
            unmapped::load_unmapped_category(
                &self.staging,
                &self.core,
                &mut tx,
                resolver,
                offsets,
                analyses,
                &registry,
                category,
                summary,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Phase 7a: move and copy gene-specific xrefs across alt-allele groups.
    async fn propagate_alt_alleles(
        &self,
        resolver: &NamespaceResolver,
        summary: &mut LoadSummary,
    ) -> Result<()> {
        let mut warnings = WarningLog::new("alt alleles");

        let rows = self.staging.alt_allele_rows().await?;
        let lrg_links = self.staging.lrg_links().await?;

        let mut stable_ids: Vec<String> = Vec::with_capacity(lrg_links.len() * 2);
        for link in &lrg_links {
            stable_ids.push(link.lrg_stable_id.clone());
            stable_ids.push(link.accession.clone());
        }
        let gene_ids = self.core.gene_ids_by_stable_id(&stable_ids).await?;

        let mut lrg_pairs = Vec::new();
        for link in &lrg_links {
            match (
                gene_ids.get(&link.lrg_stable_id),
                gene_ids.get(&link.accession),
            ) {
                (Some(&lrg_gene), Some(&target_gene)) => lrg_pairs.push((lrg_gene, target_gene)),
                _ => warnings.note(format!(
                    "LRG link {} -> {} has no core gene",
                    link.lrg_stable_id, link.accession
                )),
            }
        }

        let plan = build_plan(&rows, &lrg_pairs, &mut warnings);
        let gene_specific_db_ids = resolver.gene_specific_external_db_ids();

        let mut tx = self.core.pool().begin().await?;
        summary.alt_allele = AltAlleleResolver::new(self.core.clone())
            .propagate(&mut tx, &plan, &gene_specific_db_ids)
            .await?;
        tx.commit().await?;

        warnings.emit();
        summary.warnings += warnings.count();
        Ok(())
    }

    /// Phase 7b: collapse every promoted namespace to one feature type.
    async fn normalise_feature_types(
        &self,
        resolver: &NamespaceResolver,
        summary: &mut LoadSummary,
    ) -> Result<()> {
        let mut warnings = WarningLog::new("biomart fix");
        let allowed = resolver.transferable_external_db_ids();
        let normaliser = BiomartNormaliser::new(
            self.core.clone(),
            resolver.gene_specific_names().clone(),
        );

        let mut tx = self.core.pool().begin().await?;
        summary.biomart = normaliser.normalise(&mut tx, &allowed, &mut warnings).await?;
        tx.commit().await?;

        warnings.emit();
        summary.warnings += warnings.count();
        Ok(())
    }
}
