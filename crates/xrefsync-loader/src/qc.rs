//! Post-condition audits on the core database.

use serde::Serialize;
use tracing::info;

use crate::coredb::CoreStore;
use crate::error::{LoadError, Result};

/// Counts of rows violating the referential invariants.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnlinkedReport {
    pub orphan_object_xrefs: i64,
    pub orphan_identity_xrefs: i64,
}

impl UnlinkedReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_object_xrefs == 0 && self.orphan_identity_xrefs == 0
    }
}

pub struct QualityChecker {
    core: CoreStore,
}

impl QualityChecker {
    pub fn new(core: CoreStore) -> Self {
        Self { core }
    }

    /// Object xrefs without an xref, identity xrefs without an object xref.
    pub async fn unlinked_entries(&self) -> Result<UnlinkedReport> {
        Ok(UnlinkedReport {
            orphan_object_xrefs: self.core.count_unlinked_object_xrefs().await?,
            orphan_identity_xrefs: self.core.count_unlinked_identity_xrefs().await?,
        })
    }

    /// Namespaces of this run still bound to more than one feature type
    /// after the biomart fix.
    pub async fn sources_with_multiple_types(
        &self,
        external_db_ids: &[i64],
    ) -> Result<Vec<String>> {
        self.core.duplicate_type_db_names(external_db_ids).await
    }

    /// Run every probe; any violation is fatal.
    pub async fn audit(&self, external_db_ids: &[i64]) -> Result<()> {
        let report = self.unlinked_entries().await?;
        if !report.is_clean() {
            return Err(LoadError::integrity(format!(
                "unlinked entries after load: {} object_xref rows without xref, \
                 {} identity_xref rows without object_xref",
                report.orphan_object_xrefs, report.orphan_identity_xrefs
            )));
        }

        let duplicates = self.sources_with_multiple_types(external_db_ids).await?;
        if !duplicates.is_empty() {
            return Err(LoadError::integrity(format!(
                "sources bound to multiple feature types after normalisation: {}",
                duplicates.join(", ")
            )));
        }

        info!("post-load audit clean");
        Ok(())
    }
}
