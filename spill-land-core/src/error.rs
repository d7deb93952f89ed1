//! Error taxonomy shared by every land.
//!
//! Two families matter to callers:
//!
//! - **Semantic refusals** ([`Overlap`](LandError::Overlap),
//!   [`NotFound`](LandError::NotFound)): the operation's precondition did
//!   not hold. These are expected outcomes and never justify spilling to a
//!   fallback land: a range that overlaps in one land overlaps in any.
//! - **Allocation failures** ([`MetadataExhausted`](LandError::MetadataExhausted),
//!   [`SplitExhausted`](LandError::SplitExhausted)): the land could not
//!   allocate metadata to represent the mutation. A failover recovers from
//!   these by redirecting the write to its secondary.

use core::fmt;

use crate::range::Range;

/// Why a land operation was refused.
///
/// `#[non_exhaustive]` leaves room for land implementations with failure
/// modes of their own; compositions classify unknown kinds through
/// [`is_semantic`](Self::is_semantic) and
/// [`is_alloc_failure`](Self::is_alloc_failure) rather than matching
/// variants exhaustively.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandError {
    /// Insert refused: the range collides with a resident range.
    Overlap,
    /// Delete or find refused: no resident range covers the request.
    NotFound,
    /// The land's metadata pool is exhausted and the mutation would need
    /// a fresh metadata block.
    MetadataExhausted,
    /// Delete-side exhaustion: a resident range `old` covers the request,
    /// but representing the residual fragments would need a fresh
    /// metadata block.
    ///
    /// Carrying `old` in the error is what makes failover recovery
    /// possible: the caller deletes the whole of `old` (which releases
    /// metadata) and re-inserts the fragments wherever they fit.
    SplitExhausted {
        /// The resident range containing the requested one.
        old: Range,
    },
}

impl LandError {
    /// True for expected negative outcomes (overlap, absent range).
    #[must_use]
    pub const fn is_semantic(&self) -> bool {
        matches!(self, Self::Overlap | Self::NotFound)
    }

    /// True when the land ran out of metadata, which a failover may
    /// recover from by spilling to its secondary.
    #[must_use]
    pub const fn is_alloc_failure(&self) -> bool {
        matches!(self, Self::MetadataExhausted | Self::SplitExhausted { .. })
    }

    /// Short name of the error kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Overlap => "overlap",
            Self::NotFound => "not found",
            Self::MetadataExhausted => "metadata exhausted",
            Self::SplitExhausted { .. } => "split exhausted",
        }
    }
}

impl fmt::Display for LandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SplitExhausted { old } => {
                write!(f, "split exhausted (resident range {old})")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LandError {}
