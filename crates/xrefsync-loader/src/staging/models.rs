//! Row types returned by the staging store.
//!
//! These are named records for the exact column sets the loader consumes;
//! enum-valued columns come back as TEXT and are parsed at the point of use.

use sqlx::FromRow;

/// One `(source, info_type)` batch of promotable xrefs.
#[derive(Debug, Clone, FromRow)]
pub struct SourceGroup {
    pub source_id: i64,
    pub name: String,
    pub info_type: String,
    pub xref_count: i64,
    pub priority_description: Option<String>,
    pub release: Option<String>,
}

/// A staging source row, independent of whether it has promotable xrefs.
#[derive(Debug, Clone, FromRow)]
pub struct SourceRow {
    pub source_id: i64,
    pub name: String,
}

/// One row of the identity-bearing mapped stream, ordered by
/// `(xref_id, ensembl_id)`. Alignment columns are NULL for DIRECT, MISC and
/// INFERRED_PAIR rows.
#[derive(Debug, Clone, FromRow)]
pub struct MappedXrefRow {
    pub xref_id: i64,
    pub accession: String,
    pub version: Option<i32>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub info_text: Option<String>,
    pub object_xref_id: i64,
    pub ensembl_id: i64,
    pub ensembl_object_type: String,
    pub query_identity: Option<i32>,
    pub target_identity: Option<i32>,
    pub hit_start: Option<i32>,
    pub hit_end: Option<i32>,
    pub translation_start: Option<i32>,
    pub translation_end: Option<i32>,
    pub cigar_line: Option<String>,
    pub score: Option<f64>,
    pub evalue: Option<f64>,
}

impl MappedXrefRow {
    /// Whether the alignment stage recorded coordinates for this binding.
    pub fn has_alignment(&self) -> bool {
        self.query_identity.is_some() || self.target_identity.is_some()
    }
}

/// One row of the checksum stream.
#[derive(Debug, Clone, FromRow)]
pub struct ChecksumXrefRow {
    pub xref_id: i64,
    pub accession: String,
    pub version: Option<i32>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub info_text: Option<String>,
    pub object_xref_id: i64,
    pub ensembl_id: i64,
    pub ensembl_object_type: String,
}

/// One row of the dependent stream; `master_xref_id` is NULL when the
/// mapping stage could not resolve a master ("master problem").
#[derive(Debug, Clone, FromRow)]
pub struct DependentXrefRow {
    pub xref_id: i64,
    pub accession: String,
    pub version: Option<i32>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub info_text: Option<String>,
    pub object_xref_id: i64,
    pub ensembl_id: i64,
    pub ensembl_object_type: String,
    pub master_xref_id: Option<i64>,
    pub linkage_annotation: Option<String>,
}

/// A synonym attached to a staged xref.
#[derive(Debug, Clone, FromRow)]
pub struct SynonymRow {
    pub xref_id: i64,
    pub synonym: String,
}

/// A candidate for the unmapped load. The optional columns are only filled
/// by the streams that can provide them: `parent` by the dependent stream,
/// the identity/target columns by the sequence stream.
#[derive(Debug, Clone, FromRow)]
pub struct UnmappedXrefRow {
    pub xref_id: i64,
    pub source_id: i64,
    pub accession: String,
    pub version: Option<i32>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub info_text: Option<String>,
    pub parent: Option<String>,
    pub query_identity: Option<i32>,
    pub target_identity: Option<i32>,
    pub ensembl_id: Option<i64>,
    pub ensembl_object_type: Option<String>,
}

/// Per-source alignment cutoffs feeding the threshold unmapped reasons.
#[derive(Debug, Clone, FromRow)]
pub struct CutoffRow {
    pub name: String,
    pub percent_query_cutoff: Option<i32>,
    pub percent_target_cutoff: Option<i32>,
}

/// Membership row of an alt-allele group.
#[derive(Debug, Clone, FromRow)]
pub struct AltAlleleRow {
    pub alt_allele_id: i64,
    pub gene_id: i64,
    pub is_reference: bool,
}

/// An LRG pseudo-group link: the staged `Ens_Hs_gene` direct xref ties the
/// LRG gene (by stable id) to a core reference gene (by accession).
#[derive(Debug, Clone, FromRow)]
pub struct LrgLinkRow {
    pub lrg_stable_id: String,
    pub accession: String,
}
