//! Shared domain enums and column-level rules.
//!
//! Both schemas store these as TEXT; the typed enums are the single place
//! where the legal values live. `from_str` is strict — an unknown value is an
//! error the caller decides how to handle (the loader downgrades unknown
//! info types to a counted warning and skips the group).

use std::fmt;

/// How an xref was tied to an Ensembl feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoType {
    Direct,
    Dependent,
    SequenceMatch,
    Checksum,
    InferredPair,
    Misc,
    Projection,
    Unmapped,
}

impl InfoType {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "DIRECT" => Ok(InfoType::Direct),
            "DEPENDENT" => Ok(InfoType::Dependent),
            "SEQUENCE_MATCH" => Ok(InfoType::SequenceMatch),
            "CHECKSUM" => Ok(InfoType::Checksum),
            "INFERRED_PAIR" => Ok(InfoType::InferredPair),
            "MISC" => Ok(InfoType::Misc),
            "PROJECTION" => Ok(InfoType::Projection),
            "UNMAPPED" => Ok(InfoType::Unmapped),
            _ => Err(format!("Unknown info_type: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::Direct => "DIRECT",
            InfoType::Dependent => "DEPENDENT",
            InfoType::SequenceMatch => "SEQUENCE_MATCH",
            InfoType::Checksum => "CHECKSUM",
            InfoType::InferredPair => "INFERRED_PAIR",
            InfoType::Misc => "MISC",
            InfoType::Projection => "PROJECTION",
            InfoType::Unmapped => "UNMAPPED",
        }
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The feature kind an object xref binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnsemblObjectType {
    Gene,
    Transcript,
    Translation,
}

impl EnsemblObjectType {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "Gene" => Ok(EnsemblObjectType::Gene),
            "Transcript" => Ok(EnsemblObjectType::Transcript),
            "Translation" => Ok(EnsemblObjectType::Translation),
            _ => Err(format!("Unknown ensembl_object_type: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnsemblObjectType::Gene => "Gene",
            EnsemblObjectType::Transcript => "Transcript",
            EnsemblObjectType::Translation => "Translation",
        }
    }
}

impl fmt::Display for EnsemblObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Promotion state of a staged object xref.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OxStatus {
    DumpOut,
    FailedPriority,
    MultiDelete,
}

impl OxStatus {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "DUMP_OUT" => Ok(OxStatus::DumpOut),
            "FAILED_PRIORITY" => Ok(OxStatus::FailedPriority),
            "MULTI_DELETE" => Ok(OxStatus::MultiDelete),
            _ => Err(format!("Unknown ox_status: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OxStatus::DumpOut => "DUMP_OUT",
            OxStatus::FailedPriority => "FAILED_PRIORITY",
            OxStatus::MultiDelete => "MULTI_DELETE",
        }
    }
}

impl fmt::Display for OxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal fate of a staged xref, written back by the loader.
///
/// `NoDumpAnotherPriority` is set by the priority-selection stage upstream
/// and survives every reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpStatus {
    Mapped,
    UnmappedNoStableId,
    UnmappedNoMapping,
    UnmappedMasterFailed,
    UnmappedNoMaster,
    NoDumpAnotherPriority,
}

impl DumpStatus {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "MAPPED" => Ok(DumpStatus::Mapped),
            "UNMAPPED_NO_STABLE_ID" => Ok(DumpStatus::UnmappedNoStableId),
            "UNMAPPED_NO_MAPPING" => Ok(DumpStatus::UnmappedNoMapping),
            "UNMAPPED_MASTER_FAILED" => Ok(DumpStatus::UnmappedMasterFailed),
            "UNMAPPED_NO_MASTER" => Ok(DumpStatus::UnmappedNoMaster),
            "NO_DUMP_ANOTHER_PRIORITY" => Ok(DumpStatus::NoDumpAnotherPriority),
            _ => Err(format!("Unknown dumped value: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DumpStatus::Mapped => "MAPPED",
            DumpStatus::UnmappedNoStableId => "UNMAPPED_NO_STABLE_ID",
            DumpStatus::UnmappedNoMapping => "UNMAPPED_NO_MAPPING",
            DumpStatus::UnmappedMasterFailed => "UNMAPPED_MASTER_FAILED",
            DumpStatus::UnmappedNoMaster => "UNMAPPED_NO_MASTER",
            DumpStatus::NoDumpAnotherPriority => "NO_DUMP_ANOTHER_PRIORITY",
        }
    }
}

impl fmt::Display for DumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maximum length of a core xref description.
pub const MAX_DESCRIPTION_LEN: usize = 255;

const TRUNCATION_SUFFIX: &str = " /.../";

/// Enforce the 255-character description limit. Longer text is cut and
/// suffixed with ` /.../` so the truncation is visible downstream.
pub fn truncate_description(description: &str) -> String {
    let len = description.chars().count();
    if len <= MAX_DESCRIPTION_LEN {
        return description.to_string();
    }
    let keep = MAX_DESCRIPTION_LEN - TRUNCATION_SUFFIX.chars().count();
    let head: String = description.chars().take(keep).collect();
    format!("{}{}", head, TRUNCATION_SUFFIX)
}
