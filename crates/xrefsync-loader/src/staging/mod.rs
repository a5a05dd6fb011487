//! Typed, streaming access to the staging (xref working) schema.
//!
//! Every read is either a small grouped summary or a pull stream wrapping a
//! server-side cursor, so a source with millions of rows never has to fit in
//! memory. The only writes are the `dumped` flags, the offset meta keys and
//! the process-status log.

pub mod models;
pub mod store;

pub use models::{
    AltAlleleRow, ChecksumXrefRow, CutoffRow, DependentXrefRow, LrgLinkRow, MappedXrefRow,
    SourceGroup, SourceRow, SynonymRow, UnmappedXrefRow,
};
pub use store::StagingStore;
