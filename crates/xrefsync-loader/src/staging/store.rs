//! The staging store.
//!
//! All streams wrap a server-side cursor on one pooled connection; dropping
//! the stream releases the cursor. Streams are safe to consume while the
//! mutators run on another connection of the same pool, because the two
//! never touch the same rows inside one phase.

use futures::stream::BoxStream;
use sqlx::postgres::PgPool;

use crate::error::Result;
use crate::models::{DumpStatus, InfoType};

use super::models::{
    AltAlleleRow, ChecksumXrefRow, CutoffRow, DependentXrefRow, LrgLinkRow, MappedXrefRow,
    SourceGroup, SourceRow, SynonymRow, UnmappedXrefRow,
};

/// Source name whose direct xrefs define the LRG pseudo-groups.
const LRG_SOURCE: &str = "Ens_Hs_gene";

#[derive(Clone)]
pub struct StagingStore {
    pool: PgPool,
    species_id: i64,
}

impl StagingStore {
    pub fn new(pool: PgPool, species_id: i64) -> Self {
        Self { pool, species_id }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------

    /// Every staging source, for namespace resolution.
    pub async fn sources(&self) -> Result<Vec<SourceRow>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT source_id, name FROM source ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The `(source, info_type)` batches that have promotable xrefs,
    /// with their row counts and release metadata.
    pub async fn xref_groups_for_dump_out(&self) -> Result<Vec<SourceGroup>> {
        let rows = sqlx::query_as::<_, SourceGroup>(
            r#"
            SELECT s.source_id, s.name, x.info_type, COUNT(*) AS xref_count,
                   s.priority_description, s.release
            FROM source s
            JOIN xref x ON x.source_id = s.source_id
            JOIN object_xref ox ON ox.xref_id = x.xref_id
            WHERE ox.ox_status = 'DUMP_OUT'
              AND x.species_id = $1
            GROUP BY s.source_id, s.name, x.info_type, s.priority_description, s.release
            ORDER BY s.source_id, x.info_type
            "#,
        )
        .bind(self.species_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Which of the given source names actually carry xrefs in this run.
    pub async fn source_names_with_xrefs(&self, names: &[String]) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT s.name
            FROM source s
            JOIN xref x ON x.source_id = s.source_id
            WHERE s.name = ANY($1) AND x.species_id = $2
            "#,
        )
        .bind(names.to_vec())
        .bind(self.species_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Mapped streams
    // ------------------------------------------------------------------

    /// Promotable xrefs of one `(source, info_type)` batch with their
    /// bindings and, when the alignment stage produced them, identity
    /// coordinates. Ordered by `(xref_id, ensembl_id)` so the consumer can
    /// detect the first row of each xref by watching the id change.
    pub fn mapped_xrefs(
        &self,
        source_id: i64,
        info_type: InfoType,
    ) -> BoxStream<'_, sqlx::Result<MappedXrefRow>> {
        sqlx::query_as::<_, MappedXrefRow>(
            r#"
            SELECT x.xref_id, x.accession, x.version, x.label, x.description, x.info_text,
                   ox.object_xref_id, ox.ensembl_id, ox.ensembl_object_type,
                   ix.query_identity, ix.target_identity,
                   ix.hit_start, ix.hit_end, ix.translation_start, ix.translation_end,
                   ix.cigar_line, ix.score, ix.evalue
            FROM xref x
            JOIN object_xref ox ON ox.xref_id = x.xref_id
            LEFT JOIN identity_xref ix ON ix.object_xref_id = ox.object_xref_id
            WHERE ox.ox_status = 'DUMP_OUT'
              AND x.source_id = $1
              AND x.info_type = $2
              AND x.species_id = $3
            ORDER BY x.xref_id, ox.ensembl_id
            "#,
        )
        .bind(source_id)
        .bind(info_type.as_str())
        .bind(self.species_id)
        .fetch(&self.pool)
    }

    /// Checksum-matched xrefs of one source, ordered by
    /// `(xref_id, ensembl_id)`.
    pub fn checksum_xrefs(&self, source_id: i64) -> BoxStream<'_, sqlx::Result<ChecksumXrefRow>> {
        sqlx::query_as::<_, ChecksumXrefRow>(
            r#"
            SELECT x.xref_id, x.accession, x.version, x.label, x.description, x.info_text,
                   ox.object_xref_id, ox.ensembl_id, ox.ensembl_object_type
            FROM xref x
            JOIN object_xref ox ON ox.xref_id = x.xref_id
            WHERE ox.ox_status = 'DUMP_OUT'
              AND x.source_id = $1
              AND x.info_type = 'CHECKSUM'
              AND x.species_id = $2
            ORDER BY x.xref_id, ox.ensembl_id
            "#,
        )
        .bind(source_id)
        .bind(self.species_id)
        .fetch(&self.pool)
    }

    /// Dependent xrefs of one source with the master recorded by the mapping
    /// stage, ordered by `(xref_id, ensembl_id)`.
    pub fn dependent_xrefs(&self, source_id: i64) -> BoxStream<'_, sqlx::Result<DependentXrefRow>> {
        sqlx::query_as::<_, DependentXrefRow>(
            r#"
            SELECT x.xref_id, x.accession, x.version, x.label, x.description, x.info_text,
                   ox.object_xref_id, ox.ensembl_id, ox.ensembl_object_type,
                   ox.master_xref_id, ox.linkage_annotation
            FROM xref x
            JOIN object_xref ox ON ox.xref_id = x.xref_id
            WHERE ox.ox_status = 'DUMP_OUT'
              AND x.source_id = $1
              AND x.info_type = 'DEPENDENT'
              AND x.species_id = $2
            ORDER BY x.xref_id, ox.ensembl_id
            "#,
        )
        .bind(source_id)
        .bind(self.species_id)
        .fetch(&self.pool)
    }

    /// Synonyms of the given staged xrefs.
    pub fn synonyms_for(&self, xref_ids: &[i64]) -> BoxStream<'_, sqlx::Result<SynonymRow>> {
        sqlx::query_as::<_, SynonymRow>(
            "SELECT xref_id, synonym FROM synonym WHERE xref_id = ANY($1) ORDER BY xref_id",
        )
        .bind(xref_ids.to_vec())
        .fetch(&self.pool)
    }

    // ------------------------------------------------------------------
    // Unmapped streams
    // ------------------------------------------------------------------

    /// DIRECT xrefs that never got a binding: the stable id they pointed at
    /// no longer exists.
    pub fn direct_unmapped(&self) -> BoxStream<'_, sqlx::Result<UnmappedXrefRow>> {
        self.simple_unmapped("DIRECT")
    }

    /// MISC xrefs, for which no mapping is ever attempted.
    pub fn misc_unmapped(&self) -> BoxStream<'_, sqlx::Result<UnmappedXrefRow>> {
        self.simple_unmapped("MISC")
    }

    fn simple_unmapped(
        &self,
        info_type: &'static str,
    ) -> BoxStream<'_, sqlx::Result<UnmappedXrefRow>> {
        sqlx::query_as::<_, UnmappedXrefRow>(
            r#"
            SELECT x.xref_id, x.source_id, x.accession, x.version, x.label,
                   x.description, x.info_text,
                   NULL::TEXT AS parent,
                   NULL::INT AS query_identity, NULL::INT AS target_identity,
                   NULL::BIGINT AS ensembl_id, NULL::TEXT AS ensembl_object_type
            FROM xref x
            WHERE x.dumped IS NULL
              AND x.info_type = $1
              AND x.species_id = $2
              AND NOT EXISTS (
                  SELECT 1 FROM object_xref ox
                  WHERE ox.xref_id = x.xref_id AND ox.ox_status <> 'FAILED_PRIORITY'
              )
            ORDER BY x.xref_id
            "#,
        )
        .bind(info_type)
        .bind(self.species_id)
        .fetch(&self.pool)
    }

    /// DEPENDENT xrefs left behind because their master failed, with the
    /// master accession as the parent where one is recorded.
    pub fn dependent_unmapped(&self) -> BoxStream<'_, sqlx::Result<UnmappedXrefRow>> {
        sqlx::query_as::<_, UnmappedXrefRow>(
            r#"
            SELECT DISTINCT ON (x.xref_id)
                   x.xref_id, x.source_id, x.accession, x.version, x.label,
                   x.description, x.info_text,
                   mx.accession AS parent,
                   NULL::INT AS query_identity, NULL::INT AS target_identity,
                   NULL::BIGINT AS ensembl_id, NULL::TEXT AS ensembl_object_type
            FROM xref x
            LEFT JOIN dependent_xref dx ON dx.dependent_xref_id = x.xref_id
            LEFT JOIN xref mx ON mx.xref_id = dx.master_xref_id
            WHERE x.dumped IS NULL
              AND x.info_type = 'DEPENDENT'
              AND x.species_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM object_xref ox
                  WHERE ox.xref_id = x.xref_id AND ox.ox_status <> 'FAILED_PRIORITY'
              )
            ORDER BY x.xref_id, mx.xref_id
            "#,
        )
        .bind(self.species_id)
        .fetch(&self.pool)
    }

    /// SEQUENCE_MATCH xrefs that did not survive to DUMP_OUT. The best
    /// recorded below-cutoff alignment, if any, supplies the scores and the
    /// would-be target. When the xref hangs off a master that itself never
    /// mapped, that master's accession comes back as the parent.
    pub fn sequence_unmapped(&self) -> BoxStream<'_, sqlx::Result<UnmappedXrefRow>> {
        sqlx::query_as::<_, UnmappedXrefRow>(
            r#"
            SELECT DISTINCT ON (x.xref_id)
                   x.xref_id, x.source_id, x.accession, x.version, x.label,
                   x.description, x.info_text,
                   (SELECT mx.accession
                    FROM dependent_xref dx
                    JOIN xref mx ON mx.xref_id = dx.master_xref_id
                    WHERE dx.dependent_xref_id = x.xref_id
                      AND NOT EXISTS (
                          SELECT 1 FROM object_xref mo
                          WHERE mo.xref_id = mx.xref_id AND mo.ox_status = 'DUMP_OUT'
                      )
                    ORDER BY mx.xref_id
                    LIMIT 1) AS parent,
                   ix.query_identity, ix.target_identity,
                   ox.ensembl_id, ox.ensembl_object_type
            FROM xref x
            LEFT JOIN object_xref ox
                   ON ox.xref_id = x.xref_id AND ox.ox_status = 'MULTI_DELETE'
            LEFT JOIN identity_xref ix ON ix.object_xref_id = ox.object_xref_id
            WHERE x.dumped IS NULL
              AND x.info_type = 'SEQUENCE_MATCH'
              AND x.species_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM object_xref o2
                  WHERE o2.xref_id = x.xref_id
                    AND o2.ox_status IN ('DUMP_OUT', 'FAILED_PRIORITY')
              )
            ORDER BY x.xref_id, ix.query_identity DESC NULLS LAST
            "#,
        )
        .bind(self.species_id)
        .fetch(&self.pool)
    }

    /// Everything else still undumped: checksum and inferred-pair xrefs with
    /// no master to inherit a mapping from.
    pub fn other_unmapped(&self) -> BoxStream<'_, sqlx::Result<UnmappedXrefRow>> {
        sqlx::query_as::<_, UnmappedXrefRow>(
            r#"
            SELECT x.xref_id, x.source_id, x.accession, x.version, x.label,
                   x.description, x.info_text,
                   NULL::TEXT AS parent,
                   NULL::INT AS query_identity, NULL::INT AS target_identity,
                   NULL::BIGINT AS ensembl_id, NULL::TEXT AS ensembl_object_type
            FROM xref x
            WHERE x.dumped IS NULL
              AND x.info_type NOT IN
                  ('DIRECT', 'MISC', 'DEPENDENT', 'SEQUENCE_MATCH', 'PROJECTION')
              AND x.species_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM object_xref ox
                  WHERE ox.xref_id = x.xref_id AND ox.ox_status <> 'FAILED_PRIORITY'
              )
            ORDER BY x.xref_id
            "#,
        )
        .bind(self.species_id)
        .fetch(&self.pool)
    }

    /// Per-source alignment cutoffs, for the threshold unmapped reasons.
    pub async fn unmapped_cutoffs(&self) -> Result<Vec<CutoffRow>> {
        let rows = sqlx::query_as::<_, CutoffRow>(
            r#"
            SELECT DISTINCT s.name, m.percent_query_cutoff, m.percent_target_cutoff
            FROM source_mapping_method smm
            JOIN source s ON s.source_id = smm.source_id
            JOIN mapping m ON m.method = smm.method
            ORDER BY s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Alt-allele input
    // ------------------------------------------------------------------

    /// Alt-allele group membership, reference rows first within each group.
    pub async fn alt_allele_rows(&self) -> Result<Vec<AltAlleleRow>> {
        let rows = sqlx::query_as::<_, AltAlleleRow>(
            r#"
            SELECT alt_allele_id, gene_id, is_reference
            FROM alt_allele
            ORDER BY alt_allele_id, is_reference DESC, gene_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// LRG pseudo-group links from the `Ens_Hs_gene` direct xrefs.
    pub async fn lrg_links(&self) -> Result<Vec<LrgLinkRow>> {
        let rows = sqlx::query_as::<_, LrgLinkRow>(
            r#"
            SELECT gd.ensembl_stable_id AS lrg_stable_id, x.accession
            FROM gene_direct_xref gd
            JOIN xref x ON x.xref_id = gd.general_xref_id
            JOIN source s ON s.source_id = x.source_id
            WHERE s.name = $1
              AND gd.ensembl_stable_id IS NOT NULL
            ORDER BY gd.ensembl_stable_id
            "#,
        )
        .bind(LRG_SOURCE)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Record the fate of a batch of xrefs.
    pub async fn mark_dumped(&self, xref_ids: &[i64], status: DumpStatus) -> Result<u64> {
        if xref_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE xref SET dumped = $1 WHERE xref_id = ANY($2)")
            .bind(status.as_str())
            .bind(xref_ids.to_vec())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Idempotent-restart reset: clear every dumped flag except the
    /// priority marker, which is owned by the priority-selection stage.
    pub async fn reset_dumped_unless_another_priority(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE xref SET dumped = NULL
            WHERE dumped IS NOT NULL AND dumped <> 'NO_DUMP_ANOTHER_PRIORITY'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Append a process-status entry.
    pub async fn insert_process_status(&self, status: &str) -> Result<()> {
        sqlx::query("INSERT INTO process_status (status, date) VALUES ($1, NOW())")
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The most recent process-status entry, if any.
    pub async fn latest_process_status(&self) -> Result<Option<String>> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM process_status ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    /// Upsert a meta key.
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("DELETE FROM meta WHERE meta_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT INTO meta (meta_key, meta_value, date) VALUES ($1, $2, NOW())")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT meta_value FROM meta WHERE meta_key = $1 ORDER BY meta_id DESC LIMIT 1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    /// Drop everything the mapping stage produced. Used by the revert to
    /// `parsing_finished`.
    pub async fn clear_mapping_results(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM identity_xref")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM object_xref").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM mapping_jobs").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM mapping").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Put every mapping job back to the submitted state. Used by the revert
    /// to `mapping_finished`.
    pub async fn reset_mapping_jobs(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE mapping_jobs SET status = 'SUBMITTED', failed_reason = NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
