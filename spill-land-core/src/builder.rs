//! Builder for composing failover lands.

use crate::{failover::Failover, land::Land};

/// Builder for a [`Failover`].
///
/// Both children are required, and the requirement is compile-time:
/// [`build`](Self::build) only exists once [`primary`](Self::primary) and
/// [`secondary`](Self::secondary) have each been supplied.
///
/// # Example
///
/// ```
/// use spill_land_core::{Cbs, FailoverBuilder};
///
/// let failover = FailoverBuilder::new()
///     .primary(Cbs::with_block_pool_limit(16, 8))
///     .secondary(Cbs::new(16))
///     .build();
/// # let _ = failover;
/// ```
#[must_use]
pub struct FailoverBuilder<P = (), S = ()> {
    primary: P,
    secondary: S,
}

impl FailoverBuilder {
    /// Start an empty composition.
    pub fn new() -> Self {
        Self {
            primary: (),
            secondary: (),
        }
    }
}

impl Default for FailoverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, S> FailoverBuilder<P, S> {
    /// Supply the primary (preferred, indexed) land.
    pub fn primary<P2: Land>(self, primary: P2) -> FailoverBuilder<P2, S> {
        FailoverBuilder {
            primary,
            secondary: self.secondary,
        }
    }

    /// Supply the secondary (fallback, allocation-free) land.
    pub fn secondary<S2: Land>(self, secondary: S2) -> FailoverBuilder<P, S2> {
        FailoverBuilder {
            primary: self.primary,
            secondary,
        }
    }
}

impl<P: Land, S: Land> FailoverBuilder<P, S> {
    /// Compose the two lands.
    ///
    /// # Panics
    ///
    /// Panics if the children disagree on alignment.
    pub fn build(self) -> Failover<P, S> {
        Failover::new(self.primary, self.secondary)
    }
}
