//! Promotion of staged cross-reference annotations into a production core
//! genome-annotation database.
//!
//! The staging database is populated upstream by the per-source parsers and
//! the alignment stage; this crate implements the load: namespace
//! reconciliation, per-source purges, offset-based id promotion, the mapped
//! and unmapped load paths, alt-allele propagation, the single-feature-type
//! normalisation, post-load audits and the process-status log.
//!
//! ```no_run
//! use xrefsync_loader::{Loader, LoaderConfig};
//!
//! # async fn run() -> xrefsync_loader::Result<()> {
//! let config = LoaderConfig::from_env()?;
//! let loader = Loader::connect(config).await?;
//! let summary = loader.update().await?;
//! println!("loaded {} xrefs", summary.xrefs_written);
//! # Ok(())
//! # }
//! ```

pub mod alt_allele;
pub mod biomart;
pub mod config;
pub mod coredb;
pub mod error;
pub mod loader;
pub mod models;
pub mod offsets;
pub mod qc;
pub mod reasons;
pub mod resolver;
pub mod staging;
pub mod status;

pub use config::{create_pool, DbParams, LoaderConfig};
pub use coredb::CoreStore;
pub use error::{LoadError, Result};
pub use loader::{LoadSummary, Loader};
pub use models::{DumpStatus, EnsemblObjectType, InfoType, OxStatus};
pub use offsets::{OffsetAllocator, Offsets};
pub use qc::QualityChecker;
pub use resolver::NamespaceResolver;
pub use staging::StagingStore;
pub use status::{ProcessPhase, ProcessStatusMachine};
