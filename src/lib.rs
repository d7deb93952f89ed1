//! A free-range land that spills to a fallback when its index cannot grow.

#![no_std]

pub use spill_land_core::*;

/// Prelude for convenient imports.
pub mod prelude {
    #[cfg(feature = "alloc")]
    pub use crate::Cbs;
    pub use crate::{
        Failover, FailoverBuilder, Find, FindDelete, Freelist, Land, LandError, Range, ZoneSet,
    };
}
