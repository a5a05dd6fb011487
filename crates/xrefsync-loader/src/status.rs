//! The append-only process-status log.
//!
//! Each pipeline stage appends its phase on completion; readers only ever
//! look at the newest entry. The loader refuses to start until the mapping
//! stage has recorded `mapping_finished`, and the two revert operations put
//! a wedged pipeline back to a known phase.

use std::fmt;

use tracing::warn;

use crate::error::{LoadError, Result};
use crate::staging::StagingStore;

/// Pipeline phases, in execution order. The derived ordering is the
/// progression used for gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessPhase {
    ParsingFinished,
    AltAllelesAdded,
    AltAllelesProcessed,
    BiomartTestFinished,
    SourceLevelMoveFinished,
    MappingFinished,
    CoreLoaded,
}

impl ProcessPhase {
    pub fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "parsing_finished" => Ok(ProcessPhase::ParsingFinished),
            "alt_alleles_added" => Ok(ProcessPhase::AltAllelesAdded),
            "alt_alleles_processed" => Ok(ProcessPhase::AltAllelesProcessed),
            "biomart_test_finished" => Ok(ProcessPhase::BiomartTestFinished),
            "source_level_move_finished" => Ok(ProcessPhase::SourceLevelMoveFinished),
            "mapping_finished" => Ok(ProcessPhase::MappingFinished),
            "core_loaded" => Ok(ProcessPhase::CoreLoaded),
            _ => Err(format!("Unknown process status: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessPhase::ParsingFinished => "parsing_finished",
            ProcessPhase::AltAllelesAdded => "alt_alleles_added",
            ProcessPhase::AltAllelesProcessed => "alt_alleles_processed",
            ProcessPhase::BiomartTestFinished => "biomart_test_finished",
            ProcessPhase::SourceLevelMoveFinished => "source_level_move_finished",
            ProcessPhase::MappingFinished => "mapping_finished",
            ProcessPhase::CoreLoaded => "core_loaded",
        }
    }
}

impl fmt::Display for ProcessPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct ProcessStatusMachine {
    staging: StagingStore,
}

impl ProcessStatusMachine {
    pub fn new(staging: StagingStore) -> Self {
        Self { staging }
    }

    /// Append a phase entry.
    pub async fn record(&self, phase: ProcessPhase) -> Result<()> {
        self.staging.insert_process_status(phase.as_str()).await
    }

    /// The newest recorded phase. An unrecognised entry (written by a newer
    /// or older pipeline) is reported as absent rather than guessed at.
    pub async fn latest(&self) -> Result<Option<ProcessPhase>> {
        let raw = self.staging.latest_process_status().await?;
        match raw {
            None => Ok(None),
            Some(s) => match ProcessPhase::from_str(&s) {
                Ok(phase) => Ok(Some(phase)),
                Err(_) => {
                    warn!(status = %s, "unrecognised process status entry");
                    Ok(None)
                }
            },
        }
    }

    /// Gate for the core load: the mapping stage must have completed. A
    /// previous `core_loaded` is fine, the load is idempotent.
    pub async fn require_mapping_finished(&self) -> Result<()> {
        match self.latest().await? {
            Some(phase) if phase >= ProcessPhase::MappingFinished => Ok(()),
            Some(phase) => Err(LoadError::config(format!(
                "core load requires mapping_finished, pipeline is at {}",
                phase
            ))),
            None => Err(LoadError::config(
                "core load requires mapping_finished, no process status recorded",
            )),
        }
    }

    /// Throw away all mapping output and return the pipeline to the end of
    /// parsing. The priority markers on `dumped` survive.
    pub async fn revert_to_parsing_finished(&self) -> Result<()> {
        self.staging.clear_mapping_results().await?;
        self.staging.reset_dumped_unless_another_priority().await?;
        self.record(ProcessPhase::ParsingFinished).await
    }

    /// Keep the mapping output but reset the job markers and dumped flags so
    /// the post-mapping stages can be rerun.
    pub async fn revert_to_mapping_finished(&self) -> Result<()> {
        self.staging.reset_mapping_jobs().await?;
        self.staging.reset_dumped_unless_another_priority().await?;
        self.record(ProcessPhase::MappingFinished).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trip() {
        for raw in [
            "parsing_finished",
            "alt_alleles_added",
            "alt_alleles_processed",
            "biomart_test_finished",
            "source_level_move_finished",
            "mapping_finished",
            "core_loaded",
        ] {
            assert_eq!(ProcessPhase::from_str(raw).unwrap().as_str(), raw);
        }
        assert!(ProcessPhase::from_str("tea_break").is_err());
    }

    #[test]
    fn phases_order_by_pipeline_progression() {
        assert!(ProcessPhase::ParsingFinished < ProcessPhase::MappingFinished);
        assert!(ProcessPhase::MappingFinished < ProcessPhase::CoreLoaded);
        assert!(ProcessPhase::CoreLoaded >= ProcessPhase::MappingFinished);
    }
}
