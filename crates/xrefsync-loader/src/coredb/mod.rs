//! Typed access to the xref-related tables of the production core schema.
//!
//! Write operations take a `&mut PgConnection` so the loader can compose a
//! whole phase under one transaction; reads that feed planning run directly
//! on the pool.

pub mod models;
pub mod store;

pub use models::{
    GeneBindingRow, IdentityParams, NewXref, SourceTypeCount, UnmappedObjectRow,
};
pub use store::CoreStore;
