//! The core store.

use std::collections::HashMap;

use sqlx::postgres::{PgConnection, PgPool};

use crate::error::{LoadError, Result};
use crate::models::{truncate_description, EnsemblObjectType};

use super::models::{
    GeneBindingRow, IdentityParams, NewXref, SourceTypeCount, UnmappedObjectRow,
};

#[derive(Clone)]
pub struct CoreStore {
    pool: PgPool,
}

impl CoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Namespace catalogue
    // ------------------------------------------------------------------

    /// The full `db_name -> external_db_id` map.
    pub async fn external_dbs(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT db_name, external_db_id FROM external_db",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Record the provider release for a namespace.
    pub async fn set_source_release(
        &self,
        conn: &mut PgConnection,
        external_db_id: i64,
        release: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE external_db SET db_release = $1 WHERE external_db_id = $2")
            .bind(release)
            .bind(external_db_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Purges
    // ------------------------------------------------------------------

    /// Remove every projected xref and its children. Projections are
    /// regenerated after each load, so stale ones must not survive into it.
    pub async fn delete_projected(&self, conn: &mut PgConnection) -> Result<u64> {
        sqlx::query(
            r#"
            DELETE FROM identity_xref WHERE object_xref_id IN (
                SELECT ox.object_xref_id FROM object_xref ox
                JOIN xref x ON x.xref_id = ox.xref_id
                WHERE x.info_type = 'PROJECTION')
            "#,
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM object_xref WHERE xref_id IN (
                SELECT xref_id FROM xref WHERE info_type = 'PROJECTION')
            "#,
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM external_synonym WHERE xref_id IN (
                SELECT xref_id FROM xref WHERE info_type = 'PROJECTION')
            "#,
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM dependent_xref WHERE master_xref_id IN (
                SELECT xref_id FROM xref WHERE info_type = 'PROJECTION')
            "#,
        )
        .execute(&mut *conn)
        .await?;
        let result = sqlx::query("DELETE FROM xref WHERE info_type = 'PROJECTION'")
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Cascade delete of one namespace, in dependency order across the
    /// eight xref tables.
    pub async fn delete_by_external_db(
        &self,
        conn: &mut PgConnection,
        external_db_id: i64,
    ) -> Result<u64> {
        let statements = [
            r#"DELETE FROM external_synonym WHERE xref_id IN (
                   SELECT xref_id FROM xref WHERE external_db_id = $1)"#,
            r#"DELETE FROM ontology_xref WHERE object_xref_id IN (
                   SELECT ox.object_xref_id FROM object_xref ox
                   JOIN xref x ON x.xref_id = ox.xref_id
                   WHERE x.external_db_id = $1)"#,
            r#"DELETE FROM go_xref WHERE object_xref_id IN (
                   SELECT ox.object_xref_id FROM object_xref ox
                   JOIN xref x ON x.xref_id = ox.xref_id
                   WHERE x.external_db_id = $1)"#,
            r#"DELETE FROM identity_xref WHERE object_xref_id IN (
                   SELECT ox.object_xref_id FROM object_xref ox
                   JOIN xref x ON x.xref_id = ox.xref_id
                   WHERE x.external_db_id = $1)"#,
            r#"DELETE FROM object_xref WHERE xref_id IN (
                   SELECT xref_id FROM xref WHERE external_db_id = $1)"#,
            r#"DELETE FROM dependent_xref WHERE master_xref_id IN (
                   SELECT xref_id FROM xref WHERE external_db_id = $1)"#,
            r#"DELETE FROM dependent_xref WHERE dependent_xref_id IN (
                   SELECT xref_id FROM xref WHERE external_db_id = $1)"#,
        ];
        for statement in statements {
            sqlx::query(statement)
                .bind(external_db_id)
                .execute(&mut *conn)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM xref WHERE external_db_id = $1")
            .bind(external_db_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "DELETE FROM unmapped_object WHERE unmapped_object_type = 'xref' AND external_db_id = $1",
        )
        .bind(external_db_id)
        .execute(&mut *conn)
        .await?;
        Ok(deleted.rows_affected())
    }

    // ------------------------------------------------------------------
    // Identifier maxima
    // ------------------------------------------------------------------

    pub async fn max_xref_id(&self, conn: &mut PgConnection) -> Result<i64> {
        let max = sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(xref_id), 0) FROM xref")
            .fetch_one(&mut *conn)
            .await?;
        Ok(max)
    }

    pub async fn max_object_xref_id(&self, conn: &mut PgConnection) -> Result<i64> {
        let max = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(object_xref_id), 0) FROM object_xref",
        )
        .fetch_one(&mut *conn)
        .await?;
        Ok(max)
    }

    // ------------------------------------------------------------------
    // Upserts
    // ------------------------------------------------------------------

    /// Query-before-insert on the full uniqueness key. On a hit the existing
    /// id is returned shifted back into staging space, so the caller can keep
    /// applying `+ offset` uniformly; on a miss the row is written as
    /// `staged_id + offset` and `staged_id` is returned.
    pub async fn upsert_xref(
        &self,
        conn: &mut PgConnection,
        offset: i64,
        staged_id: i64,
        xref: &NewXref,
    ) -> Result<i64> {
        let existing = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT xref_id FROM xref
            WHERE dbprimary_acc = $1 AND external_db_id = $2
              AND info_type = $3 AND info_text = $4 AND version = $5
            "#,
        )
        .bind(&xref.accession)
        .bind(xref.external_db_id)
        .bind(xref.info_type.as_str())
        .bind(&xref.info_text)
        .bind(xref.version)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(xref_id) = existing {
            return Ok(xref_id - offset);
        }

        let description = xref.description.as_deref().map(truncate_description);
        sqlx::query(
            r#"
            INSERT INTO xref (xref_id, external_db_id, dbprimary_acc, display_label,
                              version, description, info_type, info_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(staged_id + offset)
        .bind(xref.external_db_id)
        .bind(&xref.accession)
        .bind(&xref.label)
        .bind(xref.version)
        .bind(description)
        .bind(xref.info_type.as_str())
        .bind(&xref.info_text)
        .execute(&mut *conn)
        .await?;

        Ok(staged_id)
    }

    /// Same contract as `upsert_xref`, keyed on
    /// `(xref_id, ensembl_object_type, ensembl_id, analysis_id)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_object_xref(
        &self,
        conn: &mut PgConnection,
        offset: i64,
        staged_id: i64,
        xref_id: i64,
        object_type: EnsemblObjectType,
        ensembl_id: i64,
        analysis_id: i64,
        linkage_annotation: Option<&str>,
    ) -> Result<i64> {
        let existing = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT object_xref_id FROM object_xref
            WHERE xref_id = $1 AND ensembl_object_type = $2
              AND ensembl_id = $3 AND analysis_id = $4
            "#,
        )
        .bind(xref_id)
        .bind(object_type.as_str())
        .bind(ensembl_id)
        .bind(analysis_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(object_xref_id) = existing {
            return Ok(object_xref_id - offset);
        }

        sqlx::query(
            r#"
            INSERT INTO object_xref (object_xref_id, ensembl_id, ensembl_object_type,
                                     xref_id, linkage_annotation, analysis_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(staged_id + offset)
        .bind(ensembl_id)
        .bind(object_type.as_str())
        .bind(xref_id)
        .bind(linkage_annotation)
        .bind(analysis_id)
        .execute(&mut *conn)
        .await?;

        Ok(staged_id)
    }

    pub async fn add_identity_xref(
        &self,
        conn: &mut PgConnection,
        object_xref_id: i64,
        identity: &IdentityParams,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO identity_xref (object_xref_id, query_identity, target_identity,
                                       hit_start, hit_end, translation_start, translation_end,
                                       cigar_line, score, evalue)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (object_xref_id) DO NOTHING
            "#,
        )
        .bind(object_xref_id)
        .bind(identity.query_identity)
        .bind(identity.target_identity)
        .bind(identity.hit_start)
        .bind(identity.hit_end)
        .bind(identity.translation_start)
        .bind(identity.translation_end)
        .bind(identity.cigar_line.as_deref())
        .bind(identity.score)
        .bind(identity.evalue)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn add_dependent_xref(
        &self,
        conn: &mut PgConnection,
        object_xref_id: i64,
        master_xref_id: i64,
        dependent_xref_id: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dependent_xref (object_xref_id, master_xref_id, dependent_xref_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (object_xref_id, master_xref_id, dependent_xref_id) DO NOTHING
            "#,
        )
        .bind(object_xref_id)
        .bind(master_xref_id)
        .bind(dependent_xref_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn add_synonym(
        &self,
        conn: &mut PgConnection,
        xref_id: i64,
        synonym: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO external_synonym (xref_id, synonym)
            VALUES ($1, $2)
            ON CONFLICT (xref_id, synonym) DO NOTHING
            "#,
        )
        .bind(xref_id)
        .bind(synonym)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Analyses and unmapped bookkeeping
    // ------------------------------------------------------------------

    /// Select-or-create an analysis row.
    pub async fn ensure_analysis(
        &self,
        conn: &mut PgConnection,
        logic_name: &str,
    ) -> Result<i64> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT analysis_id FROM analysis WHERE logic_name = $1",
        )
        .bind(logic_name)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(analysis_id) = existing {
            return Ok(analysis_id);
        }

        let analysis_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO analysis (created, logic_name) VALUES (NOW(), $1) RETURNING analysis_id",
        )
        .bind(logic_name)
        .fetch_one(&mut *conn)
        .await?;
        Ok(analysis_id)
    }

    pub async fn add_unmapped_reason(
        &self,
        conn: &mut PgConnection,
        summary: &str,
        description: &str,
    ) -> Result<i64> {
        let unmapped_reason_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO unmapped_reason (summary_description, full_description)
            VALUES ($1, $2)
            RETURNING unmapped_reason_id
            "#,
        )
        .bind(summary)
        .bind(description)
        .fetch_one(&mut *conn)
        .await?;
        Ok(unmapped_reason_id)
    }

    /// LIKE lookup on the full description, so shortened descriptions stored
    /// by parsers still match.
    pub async fn find_unmapped_reason(
        &self,
        conn: &mut PgConnection,
        description_pattern: &str,
    ) -> Result<Option<i64>> {
        let unmapped_reason_id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT unmapped_reason_id FROM unmapped_reason
            WHERE full_description LIKE $1
            ORDER BY unmapped_reason_id
            LIMIT 1
            "#,
        )
        .bind(description_pattern)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(unmapped_reason_id)
    }

    pub async fn add_unmapped_object(
        &self,
        conn: &mut PgConnection,
        row: &UnmappedObjectRow,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO unmapped_object (unmapped_object_type, analysis_id, external_db_id,
                                         identifier, unmapped_reason_id, query_score,
                                         target_score, ensembl_id, ensembl_object_type, parent)
            VALUES ('xref', $1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.analysis_id)
        .bind(row.external_db_id)
        .bind(&row.identifier)
        .bind(row.unmapped_reason_id)
        .bind(row.query_score)
        .bind(row.target_score)
        .bind(row.ensembl_id)
        .bind(row.ensembl_object_type.map(|t| t.as_str()))
        .bind(row.parent.as_deref())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stable-id resolution
    // ------------------------------------------------------------------

    /// Resolve gene stable ids to internal gene ids; unknown ids are simply
    /// absent from the result.
    pub async fn gene_ids_by_stable_id(
        &self,
        stable_ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        if stable_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT stable_id, gene_id FROM gene_stable_id WHERE stable_id = ANY($1)",
        )
        .bind(stable_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    // ------------------------------------------------------------------
    // Alt-allele support
    // ------------------------------------------------------------------

    /// Gene-level bindings of the given namespaces on one gene, with their
    /// identity extensions.
    pub async fn gene_bindings(
        &self,
        conn: &mut PgConnection,
        gene_id: i64,
        external_db_ids: &[i64],
    ) -> Result<Vec<GeneBindingRow>> {
        let rows = sqlx::query_as::<_, GeneBindingRow>(
            r#"
            SELECT ox.object_xref_id, ox.xref_id, ox.analysis_id, ox.linkage_annotation,
                   (ix.object_xref_id IS NOT NULL) AS has_identity,
                   ix.query_identity, ix.target_identity,
                   ix.hit_start, ix.hit_end, ix.translation_start, ix.translation_end,
                   ix.cigar_line, ix.score, ix.evalue
            FROM object_xref ox
            JOIN xref x ON x.xref_id = ox.xref_id
            LEFT JOIN identity_xref ix ON ix.object_xref_id = ox.object_xref_id
            WHERE ox.ensembl_object_type = 'Gene'
              AND ox.ensembl_id = $1
              AND x.external_db_id = ANY($2)
            ORDER BY ox.object_xref_id
            "#,
        )
        .bind(gene_id)
        .bind(external_db_ids.to_vec())
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    pub async fn object_xref_exists(
        &self,
        conn: &mut PgConnection,
        xref_id: i64,
        object_type: EnsemblObjectType,
        ensembl_id: i64,
        analysis_id: i64,
    ) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT object_xref_id FROM object_xref
            WHERE xref_id = $1 AND ensembl_object_type = $2
              AND ensembl_id = $3 AND analysis_id = $4
            "#,
        )
        .bind(xref_id)
        .bind(object_type.as_str())
        .bind(ensembl_id)
        .bind(analysis_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(found.is_some())
    }

    /// Repoint a gene-level binding at another gene. The identity and
    /// dependent rows stay attached through the unchanged object_xref_id.
    pub async fn reassign_object_xref_gene(
        &self,
        conn: &mut PgConnection,
        object_xref_id: i64,
        new_gene_id: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE object_xref SET ensembl_id = $1 WHERE object_xref_id = $2")
            .bind(new_gene_id)
            .bind(object_xref_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Delete one binding together with its children.
    pub async fn delete_object_xref(
        &self,
        conn: &mut PgConnection,
        object_xref_id: i64,
    ) -> Result<()> {
        for statement in [
            "DELETE FROM identity_xref WHERE object_xref_id = $1",
            "DELETE FROM go_xref WHERE object_xref_id = $1",
            "DELETE FROM ontology_xref WHERE object_xref_id = $1",
            "DELETE FROM dependent_xref WHERE object_xref_id = $1",
            "DELETE FROM object_xref WHERE object_xref_id = $1",
        ] {
            sqlx::query(statement)
                .bind(object_xref_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Insert a binding with a caller-allocated id; returns false when the
    /// uniqueness key already exists.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_object_xref_with_id(
        &self,
        conn: &mut PgConnection,
        object_xref_id: i64,
        xref_id: i64,
        object_type: EnsemblObjectType,
        ensembl_id: i64,
        analysis_id: i64,
        linkage_annotation: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO object_xref (object_xref_id, ensembl_id, ensembl_object_type,
                                     xref_id, linkage_annotation, analysis_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (xref_id, ensembl_object_type, ensembl_id, analysis_id) DO NOTHING
            "#,
        )
        .bind(object_xref_id)
        .bind(ensembl_id)
        .bind(object_type.as_str())
        .bind(xref_id)
        .bind(linkage_annotation)
        .bind(analysis_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Biomart probe and migration
    // ------------------------------------------------------------------

    /// Binding counts per `(external_db, feature type)`.
    pub async fn source_type_counts(
        &self,
        conn: &mut PgConnection,
    ) -> Result<Vec<SourceTypeCount>> {
        let rows = sqlx::query_as::<_, SourceTypeCount>(
            r#"
            SELECT x.external_db_id, ed.db_name, ox.ensembl_object_type,
                   COUNT(*) AS bindings
            FROM object_xref ox
            JOIN xref x ON x.xref_id = ox.xref_id
            JOIN external_db ed ON ed.external_db_id = x.external_db_id
            GROUP BY x.external_db_id, ed.db_name, ox.ensembl_object_type
            ORDER BY x.external_db_id, ox.ensembl_object_type
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    /// Whether a feature-type migration can be expressed through
    /// `gene_transcript_translation`.
    pub fn supports_migration(from: EnsemblObjectType, to: EnsemblObjectType) -> bool {
        migration_columns(from, to).is_ok()
    }

    /// Delete the bindings whose migrated form would collide, either with an
    /// existing target-type binding or with another row migrating to the
    /// same target. Children go first. Returns the number of bindings
    /// removed.
    pub async fn delete_migration_collisions(
        &self,
        conn: &mut PgConnection,
        external_db_id: i64,
        from: EnsemblObjectType,
        to: EnsemblObjectType,
        include_go: bool,
    ) -> Result<u64> {
        let (join_col, target_col) = migration_columns(from, to)?;
        let doomed = format!(
            r#"
            WITH cand AS (
                SELECT ox.object_xref_id, ox.xref_id, ox.analysis_id,
                       gtt.{target_col} AS target_id
                FROM object_xref ox
                JOIN xref x ON x.xref_id = ox.xref_id
                JOIN gene_transcript_translation gtt ON gtt.{join_col} = ox.ensembl_id
                WHERE x.external_db_id = $1
                  AND ox.ensembl_object_type = '{from}'
                  AND gtt.{target_col} IS NOT NULL
            )
            SELECT c.object_xref_id FROM cand c
            WHERE EXISTS (
                    SELECT 1 FROM object_xref t
                    WHERE t.xref_id = c.xref_id
                      AND t.ensembl_object_type = '{to}'
                      AND t.ensembl_id = c.target_id
                      AND t.analysis_id = c.analysis_id)
               OR EXISTS (
                    SELECT 1 FROM cand c2
                    WHERE c2.xref_id = c.xref_id
                      AND c2.target_id = c.target_id
                      AND c2.analysis_id = c.analysis_id
                      AND c2.object_xref_id < c.object_xref_id)
            "#,
            join_col = join_col,
            target_col = target_col,
            from = from.as_str(),
            to = to.as_str(),
        );

        self.delete_bindings_in(conn, &doomed, external_db_id, include_go)
            .await
    }

    /// Rewrite the surviving bindings to the target feature type.
    pub async fn migrate_object_type(
        &self,
        conn: &mut PgConnection,
        external_db_id: i64,
        from: EnsemblObjectType,
        to: EnsemblObjectType,
    ) -> Result<u64> {
        let (join_col, target_col) = migration_columns(from, to)?;
        let statement = format!(
            r#"
            UPDATE object_xref SET ensembl_object_type = '{to}', ensembl_id = gtt.{target_col}
            FROM xref x, gene_transcript_translation gtt
            WHERE x.xref_id = object_xref.xref_id
              AND gtt.{join_col} = object_xref.ensembl_id
              AND x.external_db_id = $1
              AND object_xref.ensembl_object_type = '{from}'
              AND gtt.{target_col} IS NOT NULL
            "#,
            join_col = join_col,
            target_col = target_col,
            from = from.as_str(),
            to = to.as_str(),
        );
        let result = sqlx::query(&statement)
            .bind(external_db_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete the bindings of the old type that have no migration target
    /// (e.g. a transcript without a translation). Returns the number of
    /// bindings removed.
    pub async fn delete_unmigrated(
        &self,
        conn: &mut PgConnection,
        external_db_id: i64,
        from: EnsemblObjectType,
        include_go: bool,
    ) -> Result<u64> {
        let doomed = format!(
            r#"
            SELECT ox.object_xref_id FROM object_xref ox
            JOIN xref x ON x.xref_id = ox.xref_id
            WHERE x.external_db_id = $1 AND ox.ensembl_object_type = '{from}'
            "#,
            from = from.as_str(),
        );
        self.delete_bindings_in(conn, &doomed, external_db_id, include_go)
            .await
    }

    async fn delete_bindings_in(
        &self,
        conn: &mut PgConnection,
        doomed_select: &str,
        external_db_id: i64,
        include_go: bool,
    ) -> Result<u64> {
        sqlx::query(&format!(
            "DELETE FROM identity_xref WHERE object_xref_id IN ({doomed_select})"
        ))
        .bind(external_db_id)
        .execute(&mut *conn)
        .await?;
        if include_go {
            sqlx::query(&format!(
                "DELETE FROM go_xref WHERE object_xref_id IN ({doomed_select})"
            ))
            .bind(external_db_id)
            .execute(&mut *conn)
            .await?;
            sqlx::query(&format!(
                "DELETE FROM ontology_xref WHERE object_xref_id IN ({doomed_select})"
            ))
            .bind(external_db_id)
            .execute(&mut *conn)
            .await?;
        }
        let result = sqlx::query(&format!(
            "DELETE FROM object_xref WHERE object_xref_id IN ({doomed_select})"
        ))
        .bind(external_db_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Quality probes
    // ------------------------------------------------------------------

    pub async fn count_unlinked_object_xrefs(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM object_xref ox
            LEFT JOIN xref x ON x.xref_id = ox.xref_id
            WHERE x.xref_id IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_unlinked_identity_xrefs(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM identity_xref ix
            LEFT JOIN object_xref ox ON ox.object_xref_id = ix.object_xref_id
            WHERE ox.object_xref_id IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Namespaces (within the given set) still bound to more than one
    /// feature type.
    pub async fn duplicate_type_db_names(&self, external_db_ids: &[i64]) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT ed.db_name
            FROM object_xref ox
            JOIN xref x ON x.xref_id = ox.xref_id
            JOIN external_db ed ON ed.external_db_id = x.external_db_id
            WHERE x.external_db_id = ANY($1)
            GROUP BY ed.db_name
            HAVING COUNT(DISTINCT ox.ensembl_object_type) > 1
            ORDER BY ed.db_name
            "#,
        )
        .bind(external_db_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

/// The `gene_transcript_translation` columns joining a migration's old type
/// to its new one.
fn migration_columns(
    from: EnsemblObjectType,
    to: EnsemblObjectType,
) -> Result<(&'static str, &'static str)> {
    match (from, to) {
        (EnsemblObjectType::Transcript, EnsemblObjectType::Translation) => {
            Ok(("transcript_id", "translation_id"))
        }
        (EnsemblObjectType::Transcript, EnsemblObjectType::Gene) => {
            Ok(("transcript_id", "gene_id"))
        }
        (EnsemblObjectType::Translation, EnsemblObjectType::Gene) => {
            Ok(("translation_id", "gene_id"))
        }
        _ => Err(LoadError::integrity(format!(
            "no feature-type migration from {} to {}",
            from, to
        ))),
    }
}
