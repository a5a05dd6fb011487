//! Row and parameter types for the core store.

use sqlx::FromRow;

use crate::models::{EnsemblObjectType, InfoType};

/// A core xref about to be written. The description is truncated by the
/// store, not the caller.
#[derive(Debug, Clone)]
pub struct NewXref {
    pub external_db_id: i64,
    pub accession: String,
    pub label: String,
    pub version: i32,
    pub description: Option<String>,
    pub info_type: InfoType,
    pub info_text: String,
}

/// Alignment columns of an identity xref.
#[derive(Debug, Clone, Default)]
pub struct IdentityParams {
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

/// An unmapped-object row about to be written.
#[derive(Debug, Clone)]
pub struct UnmappedObjectRow {
    pub analysis_id: i64,
    pub external_db_id: i64,
    pub identifier: String,
    pub unmapped_reason_id: i64,
    pub query_score: Option<f64>,
    pub target_score: Option<f64>,
    pub ensembl_id: Option<i64>,
    pub ensembl_object_type: Option<EnsemblObjectType>,
    pub parent: Option<String>,
}

/// Binding counts per `(external_db, feature type)`, the biomart probe.
#[derive(Debug, Clone, FromRow)]
pub struct SourceTypeCount {
    pub external_db_id: i64,
    pub db_name: String,
    pub ensembl_object_type: String,
    pub bindings: i64,
}

/// One gene-level binding with its optional identity extension, as consumed
/// by the alt-allele move and copy passes.
#[derive(Debug, Clone, FromRow)]
pub struct GeneBindingRow {
    pub object_xref_id: i64,
    pub xref_id: i64,
    pub analysis_id: i64,
    pub linkage_annotation: Option<String>,
    pub has_identity: bool,
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

impl GeneBindingRow {
    pub fn identity(&self) -> Option<IdentityParams> {
        if !self.has_identity {
            return None;
        }
        Some(IdentityParams {
            query_identity: self.query_identity,
            target_identity: self.target_identity,
            hit_start: self.hit_start,
            hit_end: self.hit_end,
            translation_start: self.translation_start,
            translation_end: self.translation_end,
            cigar_line: self.cigar_line.clone(),
            score: self.score,
            evalue: self.evalue,
        })
    }
}
