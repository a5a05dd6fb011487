//! Offset allocation for collision-free id promotion.
//!
//! Parse-stage ids are dense and start at 1 in the staging database. Rather
//! than renumbering them, every promoted row gets `staged_id + offset`,
//! where the offsets are the core maxima captured after the parsers finish.
//! The offsets are also persisted as staging meta keys so a resumed run and
//! the operator can see the values the load used.

use tracing::info;

use crate::coredb::CoreStore;
use crate::error::Result;
use crate::staging::StagingStore;

pub const XREF_OFFSET_KEY: &str = "xref_offset";
pub const OBJECT_XREF_OFFSET_KEY: &str = "object_xref_offset";

/// The additive offsets in force for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offsets {
    pub xref: i64,
    pub object_xref: i64,
}

impl Offsets {
    pub fn promote_xref(&self, staged_id: i64) -> i64 {
        staged_id + self.xref
    }

    pub fn promote_object_xref(&self, staged_id: i64) -> i64 {
        staged_id + self.object_xref
    }
}

pub struct OffsetAllocator;

impl OffsetAllocator {
    /// Capture the current core maxima and persist them as meta keys.
    pub async fn allocate(staging: &StagingStore, core: &CoreStore) -> Result<Offsets> {
        let mut conn = core.pool().acquire().await?;
        let xref = core.max_xref_id(&mut conn).await?;
        let object_xref = core.max_object_xref_id(&mut conn).await?;
        drop(conn);

        staging.set_meta(XREF_OFFSET_KEY, &xref.to_string()).await?;
        staging
            .set_meta(OBJECT_XREF_OFFSET_KEY, &object_xref.to_string())
            .await?;

        info!(
            xref_offset = xref,
            object_xref_offset = object_xref,
            "id offsets allocated"
        );

        Ok(Offsets { xref, object_xref })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_additive() {
        let offsets = Offsets {
            xref: 4000,
            object_xref: 970,
        };
        assert_eq!(offsets.promote_xref(1), 4001);
        assert_eq!(offsets.promote_xref(250_000), 254_000);
        assert_eq!(offsets.promote_object_xref(17), 987);
    }

    #[test]
    fn empty_core_means_identity_promotion() {
        let offsets = Offsets {
            xref: 0,
            object_xref: 0,
        };
        assert_eq!(offsets.promote_xref(42), 42);
        assert_eq!(offsets.promote_object_xref(42), 42);
    }

    #[test]
    fn existing_rows_round_trip_through_the_offset() {
        // An upsert hit returns `existing - offset`; promoting that value
        // must land back on the existing core id.
        let offsets = Offsets {
            xref: 4000,
            object_xref: 0,
        };
        let existing_core_id = 1234;
        let caller_space = existing_core_id - offsets.xref;
        assert_eq!(offsets.promote_xref(caller_space), existing_core_id);
    }
}
