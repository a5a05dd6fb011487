//! Shared harness for loader integration tests.
//!
//! One PostgreSQL container per test, carrying both the staging and the
//! core database with their schemas applied. Tests call
//! `docker_available()` first and return early when no daemon is around, so
//! the suite stays green on machines without Docker.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

use xrefsync_loader::{DbParams, Loader, LoaderConfig};

const STAGING_SCHEMA: &str = include_str!("../../../../schema/staging.sql");
const CORE_SCHEMA: &str = include_str!("../../../../schema/core.sql");

/// The species every fixture xref belongs to.
pub const SPECIES_ID: i64 = 9606;

/// Check that a Docker daemon is reachable.
pub fn docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Initialize tracing for a test run.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,testcontainers=warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A running PostgreSQL container with the staging and core databases.
pub struct TestDatabases {
    _container: ContainerAsync<Postgres>,
    pub staging: PgPool,
    pub core: PgPool,
}

impl TestDatabases {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get port")?;

        let admin_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&admin_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::query("CREATE DATABASE xref_staging")
            .execute(&admin)
            .await
            .context("Failed to create staging database")?;
        sqlx::query("CREATE DATABASE xref_core")
            .execute(&admin)
            .await
            .context("Failed to create core database")?;
        admin.close().await;

        let staging = Self::connect_and_apply(&host.to_string(), port, "xref_staging", STAGING_SCHEMA)
            .await
            .context("Failed to prepare staging database")?;
        let core = Self::connect_and_apply(&host.to_string(), port, "xref_core", CORE_SCHEMA)
            .await
            .context("Failed to prepare core database")?;

        Ok(Self {
            _container: container,
            staging,
            core,
        })
    }

    async fn connect_and_apply(
        host: &str,
        port: u16,
        dbname: &str,
        schema: &str,
    ) -> Result<PgPool> {
        let url = format!("postgresql://postgres:postgres@{}:{}/{}", host, port, dbname);
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await?;
        sqlx::raw_sql(schema).execute(&pool).await?;
        Ok(pool)
    }

    /// A loader wired to both databases.
    pub fn loader(&self) -> Loader {
        let params = |dbname: &str| DbParams {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: Some("postgres".to_string()),
            dbname: dbname.to_string(),
        };
        let config = LoaderConfig::new(params("xref_staging"), params("xref_core"), SPECIES_ID);
        Loader::new(config, self.staging.clone(), self.core.clone())
    }
}

// ============================================================================
// Fixture helpers
// ============================================================================

pub async fn seed_source(pool: &PgPool, source_id: i64, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO source (source_id, name, priority) VALUES ($1, $2, 1)")
        .bind(source_id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn seed_xref(
    pool: &PgPool,
    xref_id: i64,
    accession: &str,
    version: i32,
    label: &str,
    source_id: i64,
    info_type: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO xref (xref_id, accession, version, label, source_id, species_id, info_type, info_text)
        VALUES ($1, $2, $3, $4, $5, $6, $7, '')
        "#,
    )
    .bind(xref_id)
    .bind(accession)
    .bind(version)
    .bind(label)
    .bind(source_id)
    .bind(SPECIES_ID)
    .bind(info_type)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed_object_xref(
    pool: &PgPool,
    object_xref_id: i64,
    xref_id: i64,
    ensembl_id: i64,
    object_type: &str,
    ox_status: &str,
    master_xref_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO object_xref (object_xref_id, ensembl_id, ensembl_object_type, xref_id, ox_status, master_xref_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(object_xref_id)
    .bind(ensembl_id)
    .bind(object_type)
    .bind(xref_id)
    .bind(ox_status)
    .bind(master_xref_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn seed_identity(
    pool: &PgPool,
    object_xref_id: i64,
    query_identity: i32,
    target_identity: i32,
    hit_start: i32,
    hit_end: i32,
    cigar_line: &str,
    score: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO identity_xref (object_xref_id, query_identity, target_identity,
                                   hit_start, hit_end, cigar_line, score)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(object_xref_id)
    .bind(query_identity)
    .bind(target_identity)
    .bind(hit_start)
    .bind(hit_end)
    .bind(cigar_line)
    .bind(score)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed_primary_xref(
    pool: &PgPool,
    xref_id: i64,
    sequence: &str,
    sequence_type: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO primary_xref (xref_id, sequence, sequence_type, status) VALUES ($1, $2, $3, 'experimental')",
    )
    .bind(xref_id)
    .bind(sequence)
    .bind(sequence_type)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed_external_db(pool: &PgPool, external_db_id: i64, db_name: &str) -> Result<()> {
    sqlx::query("INSERT INTO external_db (external_db_id, db_name, priority) VALUES ($1, $2, 1)")
        .bind(external_db_id)
        .bind(db_name)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn seed_alt_allele(
    pool: &PgPool,
    group_id: i64,
    gene_id: i64,
    is_reference: bool,
) -> Result<()> {
    sqlx::query("INSERT INTO alt_allele (alt_allele_id, gene_id, is_reference) VALUES ($1, $2, $3)")
        .bind(group_id)
        .bind(gene_id)
        .bind(is_reference)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn seed_gene_transcript_translation(
    pool: &PgPool,
    gene_id: i64,
    transcript_id: i64,
    translation_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO gene_transcript_translation (gene_id, transcript_id, translation_id) VALUES ($1, $2, $3)",
    )
    .bind(gene_id)
    .bind(transcript_id)
    .bind(translation_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_mapping_finished(pool: &PgPool) -> Result<()> {
    sqlx::query("INSERT INTO process_status (status, date) VALUES ('mapping_finished', NOW())")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count(pool: &PgPool, sql: &str) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?;
    Ok(n)
}

pub async fn dumped_of(pool: &PgPool, xref_id: i64) -> Result<Option<String>> {
    let dumped = sqlx::query_scalar::<_, Option<String>>(
        "SELECT dumped FROM xref WHERE xref_id = $1",
    )
    .bind(xref_id)
    .fetch_one(pool)
    .await?;
    Ok(dumped)
}
