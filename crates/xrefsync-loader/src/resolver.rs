//! Namespace resolution between staging sources and core external dbs.
//!
//! Built once per run from the staging source list and the core
//! `external_db` catalogue. A source whose name ends in `notransfer` is
//! silently suppressed; a promoted source with no core namespace is a hard
//! configuration error before anything is written.

use std::collections::{HashMap, HashSet};

use crate::error::{LoadError, Result};
use crate::staging::SourceRow;

/// Sources whose xrefs belong on genes, wherever the mapping attached them.
pub const GENE_SPECIFIC_SOURCES: &[&str] = &[
    "HGNC",
    "MGI",
    "ZFIN_ID",
    "EntrezGene",
    "WikiGene",
    "MIM_GENE",
    "MIM_MORBID",
    "RGD",
    "SGD_GENE",
    "FlyBaseName_gene",
    "VGNC",
    "RFAM",
    "TRNASCAN_SE",
    "RNAMMER",
    "UniGene",
    "miRBase",
    "Uniprot_gn",
    "DBASS3",
    "DBASS5",
    "wormbase_gseqname",
    "wormbase_locus",
    "Xenbase",
];

const NOTRANSFER_SUFFIX: &str = "notransfer";

#[derive(Debug)]
pub struct NamespaceResolver {
    by_name: HashMap<String, i64>,
    by_source_id: HashMap<i64, i64>,
    source_names: HashMap<i64, String>,
    suppressed: HashSet<String>,
    gene_specific: HashSet<String>,
}

impl NamespaceResolver {
    /// Classify every staging source against the core namespace catalogue.
    ///
    /// `promoted_names` are the sources with promotable xrefs in this run;
    /// only those are entitled to a hard error when the namespace is
    /// missing. `gene_specific_with_xrefs` is the curated list filtered to
    /// the names that actually carry xrefs.
    pub fn build(
        sources: &[SourceRow],
        external_dbs: &HashMap<String, i64>,
        promoted_names: &HashSet<String>,
        gene_specific_with_xrefs: &HashSet<String>,
    ) -> Result<Self> {
        let mut by_name = HashMap::new();
        let mut by_source_id = HashMap::new();
        let mut source_names = HashMap::new();
        let mut suppressed = HashSet::new();

        for source in sources {
            source_names.insert(source.source_id, source.name.clone());
            if source.name.ends_with(NOTRANSFER_SUFFIX) {
                suppressed.insert(source.name.clone());
                continue;
            }
            match external_dbs.get(&source.name) {
                Some(&external_db_id) => {
                    by_name.insert(source.name.clone(), external_db_id);
                    by_source_id.insert(source.source_id, external_db_id);
                }
                None if promoted_names.contains(&source.name) => {
                    return Err(LoadError::config(format!(
                        "Could not find {} in external_db",
                        source.name
                    )));
                }
                None => {
                    tracing::debug!(source = %source.name, "source has no core namespace");
                }
            }
        }

        let gene_specific = GENE_SPECIFIC_SOURCES
            .iter()
            .filter(|name| gene_specific_with_xrefs.contains(**name))
            .map(|name| name.to_string())
            .collect();

        Ok(Self {
            by_name,
            by_source_id,
            source_names,
            suppressed,
            gene_specific,
        })
    }

    pub fn external_db_id(&self, source_name: &str) -> Option<i64> {
        self.by_name.get(source_name).copied()
    }

    pub fn external_db_id_for_source(&self, source_id: i64) -> Option<i64> {
        self.by_source_id.get(&source_id).copied()
    }

    pub fn source_name(&self, source_id: i64) -> Option<&str> {
        self.source_names.get(&source_id).map(String::as_str)
    }

    pub fn is_suppressed(&self, source_name: &str) -> bool {
        self.suppressed.contains(source_name)
    }

    pub fn is_gene_specific(&self, source_name: &str) -> bool {
        self.gene_specific.contains(source_name)
    }

    pub fn gene_specific_names(&self) -> &HashSet<String> {
        &self.gene_specific
    }

    /// Core namespace ids of the gene-specific sources active in this run,
    /// in a deterministic order.
    pub fn gene_specific_external_db_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .gene_specific
            .iter()
            .filter_map(|name| self.external_db_id(name))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Every core namespace id this run may touch.
    pub fn transferable_external_db_ids(&self) -> HashSet<i64> {
        self.by_name.values().copied().collect()
    }
}
