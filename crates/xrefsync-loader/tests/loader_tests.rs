//! End-to-end loader tests against containerised PostgreSQL.
//!
//! Each test spins up its own container with both schemas applied, seeds
//! the staging and core databases, runs `Loader::update` and asserts on the
//! promoted rows. Tests return early when Docker is unavailable.

mod common;

use common::*;

#[tokio::test]
async fn direct_xref_is_promoted_with_namespace_and_dumped_flag() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_dna_predicted").await.unwrap();
    seed_xref(&db.staging, 1, "NM04560", 1, "NM04560.1", 1, "DIRECT").await.unwrap();
    seed_object_xref(&db.staging, 1, 1, 1, "Gene", "DUMP_OUT", None).await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 700, "RefSeq_dna_predicted").await.unwrap();

    let summary = db.loader().update().await.expect("update");

    assert_eq!(summary.xrefs_written, 1);
    assert_eq!(summary.object_xrefs_written, 1);

    let xrefs = count(
        &db.core,
        "SELECT COUNT(*) FROM xref WHERE dbprimary_acc = 'NM04560' AND external_db_id = 700 \
         AND display_label = 'NM04560.1' AND info_type = 'DIRECT'",
    )
    .await
    .unwrap();
    assert_eq!(xrefs, 1);

    let bindings = count(
        &db.core,
        "SELECT COUNT(*) FROM object_xref WHERE ensembl_id = 1 AND ensembl_object_type = 'Gene'",
    )
    .await
    .unwrap();
    assert_eq!(bindings, 1);

    let identities = count(&db.core, "SELECT COUNT(*) FROM identity_xref").await.unwrap();
    assert_eq!(identities, 0);

    assert_eq!(dumped_of(&db.staging, 1).await.unwrap().as_deref(), Some("MAPPED"));
}

#[tokio::test]
async fn dependent_chain_writes_offset_shifted_link() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_dna_predicted").await.unwrap();
    seed_source(&db.staging, 2, "EntrezGene").await.unwrap();
    seed_xref(&db.staging, 1, "NM04561", 1, "NM04561.1", 1, "DIRECT").await.unwrap();
    seed_xref(&db.staging, 2, "NM04564", 1, "NM04564.1", 2, "DEPENDENT").await.unwrap();
    seed_object_xref(&db.staging, 1, 1, 1, "Gene", "DUMP_OUT", None).await.unwrap();
    seed_object_xref(&db.staging, 2, 2, 1, "Gene", "DUMP_OUT", Some(1)).await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 700, "RefSeq_dna_predicted").await.unwrap();
    seed_external_db(&db.core, 1300, "EntrezGene").await.unwrap();

    let summary = db.loader().update().await.expect("update");

    assert_eq!(summary.xrefs_written, 2);
    assert_eq!(summary.object_xrefs_written, 2);
    assert_eq!(summary.dependent_links_written, 1);

    // Empty core, so the offsets are zero and the link carries the staged
    // ids shifted by nothing.
    let links = count(
        &db.core,
        "SELECT COUNT(*) FROM dependent_xref WHERE master_xref_id = 1 AND dependent_xref_id = 2",
    )
    .await
    .unwrap();
    assert_eq!(links, 1);

    assert_eq!(dumped_of(&db.staging, 2).await.unwrap().as_deref(), Some("MAPPED"));
}

#[tokio::test]
async fn sequence_match_carries_identity_coordinates() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_dna_predicted").await.unwrap();
    seed_xref(&db.staging, 1, "NM04562", 1, "NM04562.1", 1, "SEQUENCE_MATCH").await.unwrap();
    seed_primary_xref(&db.staging, 1, "GATACCA", "dna").await.unwrap();
    seed_object_xref(&db.staging, 1, 1, 3, "Transcript", "DUMP_OUT", None).await.unwrap();
    seed_identity(&db.staging, 1, 90, 95, 1, 7, "7M", 100.0).await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 700, "RefSeq_dna_predicted").await.unwrap();

    let summary = db.loader().update().await.expect("update");
    assert_eq!(summary.identity_xrefs_written, 1);

    let row = sqlx::query_as::<_, (i32, i32, i32, i32, String, f64)>(
        r#"
        SELECT ix.query_identity, ix.target_identity, ix.hit_start, ix.hit_end,
               ix.cigar_line, ix.score
        FROM identity_xref ix
        JOIN object_xref ox ON ox.object_xref_id = ix.object_xref_id
        JOIN xref x ON x.xref_id = ox.xref_id
        WHERE x.dbprimary_acc = 'NM04562'
        "#,
    )
    .fetch_one(&db.core)
    .await
    .expect("identity row");
    assert_eq!(row, (90, 95, 1, 7, "7M".to_string(), 100.0));
}

#[tokio::test]
async fn lost_direct_xref_is_recorded_as_unmapped() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_dna_predicted").await.unwrap();
    seed_xref(&db.staging, 1, "NM_LOST", 1, "NM_LOST.1", 1, "DIRECT").await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 700, "RefSeq_dna_predicted").await.unwrap();

    let summary = db.loader().update().await.expect("update");
    assert_eq!(summary.unmapped_objects_written, 1);

    let unmapped = count(
        &db.core,
        "SELECT COUNT(*) FROM unmapped_object uo \
         JOIN unmapped_reason ur ON ur.unmapped_reason_id = uo.unmapped_reason_id \
         WHERE uo.identifier = 'NM_LOST' AND uo.unmapped_object_type = 'xref' \
           AND ur.summary_description = 'No stable id'",
    )
    .await
    .unwrap();
    assert_eq!(unmapped, 1);

    let as_unmapped_xref = count(
        &db.core,
        "SELECT COUNT(*) FROM xref WHERE dbprimary_acc = 'NM_LOST' AND info_type = 'UNMAPPED'",
    )
    .await
    .unwrap();
    assert_eq!(as_unmapped_xref, 1);

    assert_eq!(
        dumped_of(&db.staging, 1).await.unwrap().as_deref(),
        Some("UNMAPPED_NO_STABLE_ID")
    );
}

#[tokio::test]
async fn sequence_xref_under_failed_master_gets_master_failed_reason() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_peptide").await.unwrap();
    // The master never reached DUMP_OUT; its dependent sequence xref has no
    // bindings of its own either.
    seed_xref(&db.staging, 1, "NP_MASTER", 1, "NP_MASTER.1", 1, "SEQUENCE_MATCH").await.unwrap();
    seed_xref(&db.staging, 2, "NP_CHILD", 1, "NP_CHILD.1", 1, "SEQUENCE_MATCH").await.unwrap();
    sqlx::query(
        "INSERT INTO dependent_xref (master_xref_id, dependent_xref_id) VALUES (1, 2)",
    )
    .execute(&db.staging)
    .await
    .unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 701, "RefSeq_peptide").await.unwrap();

    let summary = db.loader().update().await.expect("update");
    assert_eq!(summary.unmapped_objects_written, 2);

    let master_failed = count(
        &db.core,
        "SELECT COUNT(*) FROM unmapped_object uo \
         JOIN unmapped_reason ur ON ur.unmapped_reason_id = uo.unmapped_reason_id \
         WHERE uo.identifier = 'NP_CHILD' AND uo.parent = 'NP_MASTER' \
           AND ur.summary_description = 'Master failed'",
    )
    .await
    .unwrap();
    assert_eq!(master_failed, 1);

    assert_eq!(
        dumped_of(&db.staging, 2).await.unwrap().as_deref(),
        Some("UNMAPPED_MASTER_FAILED")
    );
    // The master itself never aligned at all.
    assert_eq!(
        dumped_of(&db.staging, 1).await.unwrap().as_deref(),
        Some("UNMAPPED_NO_MAPPING")
    );
}

#[tokio::test]
async fn go_bindings_collapse_to_translation() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "GO").await.unwrap();
    seed_xref(&db.staging, 1, "GO:0005515", 0, "GO:0005515", 1, "DIRECT").await.unwrap();
    seed_xref(&db.staging, 2, "GO:0008150", 0, "GO:0008150", 1, "DIRECT").await.unwrap();
    // One xref sits on a transcript, the other already on its translation.
    seed_object_xref(&db.staging, 1, 1, 100, "Transcript", "DUMP_OUT", None).await.unwrap();
    seed_object_xref(&db.staging, 2, 2, 201, "Translation", "DUMP_OUT", None).await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 1000, "GO").await.unwrap();
    seed_gene_transcript_translation(&db.core, 10, 100, Some(201)).await.unwrap();

    let summary = db.loader().update().await.expect("update");
    assert!(summary.biomart.migrated >= 1);

    let on_transcripts = count(
        &db.core,
        "SELECT COUNT(*) FROM object_xref WHERE ensembl_object_type = 'Transcript'",
    )
    .await
    .unwrap();
    assert_eq!(on_transcripts, 0);

    let on_translations = count(
        &db.core,
        "SELECT COUNT(*) FROM object_xref WHERE ensembl_object_type = 'Translation' AND ensembl_id = 201",
    )
    .await
    .unwrap();
    assert_eq!(on_translations, 2);
}

#[tokio::test]
async fn hgnc_xref_moves_to_reference_gene_and_copies_to_alts() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 2, "HGNC").await.unwrap();
    seed_xref(&db.staging, 20, "HGNC:1100", 0, "BRCA1", 2, "DIRECT").await.unwrap();
    seed_object_xref(&db.staging, 20, 20, 42, "Gene", "DUMP_OUT", None).await.unwrap();
    seed_alt_allele(&db.staging, 1, 7, true).await.unwrap();
    seed_alt_allele(&db.staging, 1, 42, false).await.unwrap();
    seed_alt_allele(&db.staging, 1, 43, false).await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 1100, "HGNC").await.unwrap();

    let summary = db.loader().update().await.expect("update");
    assert_eq!(summary.alt_allele.moved, 1);
    assert_eq!(summary.alt_allele.copied, 2);

    let genes: Vec<i64> = sqlx::query_scalar(
        "SELECT ensembl_id FROM object_xref WHERE ensembl_object_type = 'Gene' ORDER BY ensembl_id",
    )
    .fetch_all(&db.core)
    .await
    .unwrap();
    assert_eq!(genes, vec![7, 42, 43]);
}

#[tokio::test]
async fn new_ids_stay_above_preexisting_core_rows() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_dna_predicted").await.unwrap();
    seed_xref(&db.staging, 1, "NM04560", 1, "NM04560.1", 1, "DIRECT").await.unwrap();
    seed_object_xref(&db.staging, 1, 1, 1, "Gene", "DUMP_OUT", None).await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 700, "RefSeq_dna_predicted").await.unwrap();
    // A namespace outside this run with high ids already present.
    seed_external_db(&db.core, 999, "Uniprot/SWISSPROT").await.unwrap();
    sqlx::query(
        "INSERT INTO xref (xref_id, external_db_id, dbprimary_acc, display_label, version, info_type) \
         VALUES (5000, 999, 'P12345', 'P12345', 1, 'SEQUENCE_MATCH')",
    )
    .execute(&db.core)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO analysis (created, logic_name) VALUES (NOW(), 'preexisting') ",
    )
    .execute(&db.core)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO object_xref (object_xref_id, ensembl_id, ensembl_object_type, xref_id, analysis_id) \
         VALUES (800, 5, 'Translation', 5000, 1)",
    )
    .execute(&db.core)
    .await
    .unwrap();

    db.loader().update().await.expect("update");

    let new_xref_id = sqlx::query_scalar::<_, i64>(
        "SELECT xref_id FROM xref WHERE dbprimary_acc = 'NM04560'",
    )
    .fetch_one(&db.core)
    .await
    .unwrap();
    assert_eq!(new_xref_id, 5001);

    let new_object_xref_id = sqlx::query_scalar::<_, i64>(
        "SELECT object_xref_id FROM object_xref WHERE xref_id = 5001",
    )
    .fetch_one(&db.core)
    .await
    .unwrap();
    assert_eq!(new_object_xref_id, 801);

    // The untouched namespace survives the load.
    let preexisting = count(&db.core, "SELECT COUNT(*) FROM xref WHERE xref_id = 5000")
        .await
        .unwrap();
    assert_eq!(preexisting, 1);
}

#[tokio::test]
async fn rerunning_update_yields_identical_row_counts() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_dna_predicted").await.unwrap();
    seed_source(&db.staging, 2, "EntrezGene").await.unwrap();
    seed_xref(&db.staging, 1, "NM04561", 1, "NM04561.1", 1, "DIRECT").await.unwrap();
    seed_xref(&db.staging, 2, "NM04564", 1, "NM04564.1", 2, "DEPENDENT").await.unwrap();
    seed_xref(&db.staging, 3, "NM_LOST", 1, "NM_LOST.1", 1, "DIRECT").await.unwrap();
    seed_object_xref(&db.staging, 1, 1, 1, "Gene", "DUMP_OUT", None).await.unwrap();
    seed_object_xref(&db.staging, 2, 2, 1, "Gene", "DUMP_OUT", Some(1)).await.unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 700, "RefSeq_dna_predicted").await.unwrap();
    seed_external_db(&db.core, 1300, "EntrezGene").await.unwrap();

    let loader = db.loader();
    loader.update().await.expect("first update");

    let counts_after_first = (
        count(&db.core, "SELECT COUNT(*) FROM xref").await.unwrap(),
        count(&db.core, "SELECT COUNT(*) FROM object_xref").await.unwrap(),
        count(&db.core, "SELECT COUNT(*) FROM dependent_xref").await.unwrap(),
        count(&db.core, "SELECT COUNT(*) FROM unmapped_object").await.unwrap(),
    );

    loader.update().await.expect("second update");

    let counts_after_second = (
        count(&db.core, "SELECT COUNT(*) FROM xref").await.unwrap(),
        count(&db.core, "SELECT COUNT(*) FROM object_xref").await.unwrap(),
        count(&db.core, "SELECT COUNT(*) FROM dependent_xref").await.unwrap(),
        count(&db.core, "SELECT COUNT(*) FROM unmapped_object").await.unwrap(),
    );

    assert_eq!(counts_after_first, counts_after_second);

    let latest = sqlx::query_scalar::<_, String>(
        "SELECT status FROM process_status ORDER BY id DESC LIMIT 1",
    )
    .fetch_one(&db.staging)
    .await
    .unwrap();
    assert_eq!(latest, "core_loaded");
}

#[tokio::test]
async fn update_refuses_to_run_before_mapping_finished() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    sqlx::query("INSERT INTO process_status (status, date) VALUES ('parsing_finished', NOW())")
        .execute(&db.staging)
        .await
        .unwrap();

    let err = db.loader().update().await.unwrap_err();
    assert!(err.to_string().contains("mapping_finished"));
}

#[tokio::test]
async fn priority_marker_survives_reset() {
    if !docker_available() {
        eprintln!("skipping: Docker is not available");
        return;
    }
    init_test_tracing();
    let db = TestDatabases::start().await.expect("container start");

    seed_source(&db.staging, 1, "RefSeq_dna_predicted").await.unwrap();
    seed_xref(&db.staging, 1, "NM04560", 1, "NM04560.1", 1, "DIRECT").await.unwrap();
    seed_xref(&db.staging, 2, "NM04599", 1, "NM04599.1", 1, "DIRECT").await.unwrap();
    seed_object_xref(&db.staging, 1, 1, 1, "Gene", "DUMP_OUT", None).await.unwrap();
    sqlx::query("UPDATE xref SET dumped = 'NO_DUMP_ANOTHER_PRIORITY' WHERE xref_id = 2")
        .execute(&db.staging)
        .await
        .unwrap();
    sqlx::query("UPDATE xref SET dumped = 'MAPPED' WHERE xref_id = 1")
        .execute(&db.staging)
        .await
        .unwrap();
    mark_mapping_finished(&db.staging).await.unwrap();

    seed_external_db(&db.core, 700, "RefSeq_dna_predicted").await.unwrap();

    db.loader().update().await.expect("update");

    // Cleared at re-entry, then re-marked by the load.
    assert_eq!(dumped_of(&db.staging, 1).await.unwrap().as_deref(), Some("MAPPED"));
    // Never cleared.
    assert_eq!(
        dumped_of(&db.staging, 2).await.unwrap().as_deref(),
        Some("NO_DUMP_ANOTHER_PRIORITY")
    );
}
