//! The unmapped-reason catalogue.
//!
//! Built once at load start: the five enumerated kinds plus one row per
//! source alignment cutoff. Lookups go through a LIKE on the stored
//! description so rows written with shortened descriptions by earlier
//! tooling still match; misses insert a fresh row.

use std::collections::HashMap;

use sqlx::postgres::PgConnection;

use crate::coredb::CoreStore;
use crate::error::Result;
use crate::models::DumpStatus;
use crate::staging::CutoffRow;

/// Default identity cutoff when the mapping method did not record one.
const DEFAULT_CUTOFF_PERCENT: i32 = 90;

/// The enumerated failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmappedReasonKind {
    NoStableId,
    FailedMap,
    NoMapping,
    MasterFailed,
    NoMaster,
}

impl UnmappedReasonKind {
    pub const ALL: [UnmappedReasonKind; 5] = [
        UnmappedReasonKind::NoStableId,
        UnmappedReasonKind::FailedMap,
        UnmappedReasonKind::NoMapping,
        UnmappedReasonKind::MasterFailed,
        UnmappedReasonKind::NoMaster,
    ];

    pub fn summary(&self) -> &'static str {
        match self {
            UnmappedReasonKind::NoStableId => "No stable id",
            UnmappedReasonKind::FailedMap => "Failed to match",
            UnmappedReasonKind::NoMapping => "No mapping done",
            UnmappedReasonKind::MasterFailed => "Master failed",
            UnmappedReasonKind::NoMaster => "No master",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            UnmappedReasonKind::NoStableId => {
                "The stable id this xref was directly linked to is no longer in the database"
            }
            UnmappedReasonKind::FailedMap => "Unable to match to any ensembl entity at all",
            UnmappedReasonKind::NoMapping => "No mapping done for this type of xref",
            UnmappedReasonKind::MasterFailed => {
                "The dependent xref was not matched because its master xref failed to map"
            }
            UnmappedReasonKind::NoMaster => {
                "The dependent xref has no master xref to inherit a mapping from"
            }
        }
    }

    /// The `dumped` tag written to staging for this failure kind.
    pub fn dump_status(&self) -> DumpStatus {
        match self {
            UnmappedReasonKind::NoStableId => DumpStatus::UnmappedNoStableId,
            UnmappedReasonKind::FailedMap => DumpStatus::UnmappedNoMapping,
            UnmappedReasonKind::NoMapping => DumpStatus::UnmappedNoMapping,
            UnmappedReasonKind::MasterFailed => DumpStatus::UnmappedMasterFailed,
            UnmappedReasonKind::NoMaster => DumpStatus::UnmappedNoMaster,
        }
    }
}

pub fn cutoff_summary() -> &'static str {
    "Failed to match at thresholds"
}

pub fn cutoff_description(query_cutoff: i32, target_cutoff: i32) -> String {
    format!(
        "Unable to match at the thresholds of {}% for the query or {}% for the target",
        query_cutoff, target_cutoff
    )
}

/// The resolved `kind -> unmapped_reason_id` catalogue for one run.
pub struct UnmappedReasonRegistry {
    no_stable_id: i64,
    failed_map: i64,
    no_mapping: i64,
    master_failed: i64,
    no_master: i64,
    cutoffs: HashMap<String, i64>,
}

impl UnmappedReasonRegistry {
    pub async fn build(
        core: &CoreStore,
        conn: &mut PgConnection,
        cutoffs: &[CutoffRow],
    ) -> Result<Self> {
        let mut kind_ids = [0i64; 5];
        for (slot, kind) in kind_ids.iter_mut().zip(UnmappedReasonKind::ALL) {
            *slot = Self::find_or_insert(core, conn, kind.summary(), kind.description()).await?;
        }

        let mut cutoff_ids = HashMap::new();
        for row in cutoffs {
            let description = cutoff_description(
                row.percent_query_cutoff.unwrap_or(DEFAULT_CUTOFF_PERCENT),
                row.percent_target_cutoff.unwrap_or(DEFAULT_CUTOFF_PERCENT),
            );
            let id = Self::find_or_insert(core, conn, cutoff_summary(), &description).await?;
            cutoff_ids.insert(row.name.clone(), id);
        }

        Ok(Self {
            no_stable_id: kind_ids[0],
            failed_map: kind_ids[1],
            no_mapping: kind_ids[2],
            master_failed: kind_ids[3],
            no_master: kind_ids[4],
            cutoffs: cutoff_ids,
        })
    }

    async fn find_or_insert(
        core: &CoreStore,
        conn: &mut PgConnection,
        summary: &str,
        description: &str,
    ) -> Result<i64> {
        let pattern = format!("{}%", description);
        if let Some(id) = core.find_unmapped_reason(conn, &pattern).await? {
            return Ok(id);
        }
        core.add_unmapped_reason(conn, summary, description).await
    }

    pub fn id(&self, kind: UnmappedReasonKind) -> i64 {
        match kind {
            UnmappedReasonKind::NoStableId => self.no_stable_id,
            UnmappedReasonKind::FailedMap => self.failed_map,
            UnmappedReasonKind::NoMapping => self.no_mapping,
            UnmappedReasonKind::MasterFailed => self.master_failed,
            UnmappedReasonKind::NoMaster => self.no_master,
        }
    }

    /// The threshold reason of a source, when the mapping stage recorded
    /// cutoffs for it.
    pub fn cutoff_id(&self, source_name: &str) -> Option<i64> {
        self.cutoffs.get(source_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_description_embeds_both_thresholds() {
        assert_eq!(
            cutoff_description(90, 75),
            "Unable to match at the thresholds of 90% for the query or 75% for the target"
        );
    }

    #[test]
    fn every_kind_has_distinct_text() {
        let mut descriptions: Vec<&str> = UnmappedReasonKind::ALL
            .iter()
            .map(|k| k.description())
            .collect();
        descriptions.sort_unstable();
        descriptions.dedup();
        assert_eq!(descriptions.len(), UnmappedReasonKind::ALL.len());
    }

    #[test]
    fn dump_status_tags_follow_the_kind() {
        assert_eq!(
            UnmappedReasonKind::NoStableId.dump_status(),
            DumpStatus::UnmappedNoStableId
        );
        assert_eq!(
            UnmappedReasonKind::MasterFailed.dump_status(),
            DumpStatus::UnmappedMasterFailed
        );
        // Below-threshold sequence matches share the no-mapping tag.
        assert_eq!(
            UnmappedReasonKind::FailedMap.dump_status(),
            DumpStatus::UnmappedNoMapping
        );
    }
}
