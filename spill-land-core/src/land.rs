//! The land abstraction: a set of disjoint free address ranges.

use core::fmt;

use crate::{error::LandError, range::Range, zone::ZoneSet};

/// Whether and how a find operation also deletes what it found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindDelete {
    /// Locate only; the land is unchanged.
    None,
    /// Delete `size` bytes from the low end of the found range.
    Low,
    /// Delete `size` bytes from the high end of the found range.
    High,
    /// Delete the entire found range.
    Entire,
}

/// Outcome of a successful find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Find {
    /// The selected portion: what was deleted, or the whole resident
    /// range for [`FindDelete::None`].
    pub range: Range,
    /// The resident range the selection came from.
    pub old: Range,
}

/// A set of disjoint non-empty address ranges, not necessarily coalesced.
///
/// Every range a land handles is aligned to the land's configured
/// alignment. Implementations differ in how they index ranges and in
/// whether mutations can exhaust their own metadata; the
/// [`Failover`](crate::Failover) composition exists to paper over exactly
/// that difference.
///
/// Lands are single-entry: callers must not re-enter a land from within
/// one of its own operations (in particular, not from an
/// [`iterate`](Self::iterate) visitor).
pub trait Land {
    /// The configured alignment grain. A power of two.
    fn alignment(&self) -> usize;

    /// Total bytes covered by resident ranges.
    fn size(&self) -> usize;

    /// True if no ranges are resident.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Add `range` to the set.
    ///
    /// The returned range may be larger than the input where it coalesced
    /// with resident neighbours.
    ///
    /// # Errors
    ///
    /// [`LandError::Overlap`] if `range` collides with a resident range;
    /// [`LandError::MetadataExhausted`] if the land could not allocate
    /// metadata to represent it.
    fn insert(&mut self, range: Range) -> Result<Range, LandError>;

    /// Remove `range` from the set, returning the resident range that
    /// contained it (so `range ⊆ old`).
    ///
    /// # Errors
    ///
    /// [`LandError::NotFound`] if no resident range covers `range`;
    /// [`LandError::SplitExhausted`] if the containing range was found but
    /// the residual fragments could not be represented.
    fn delete(&mut self, range: Range) -> Result<Range, LandError>;

    /// Like [`insert`](Self::insert), but the land may clip `range` in
    /// place to fund its own metadata.
    ///
    /// # Errors
    ///
    /// [`LandError::Overlap`] as for `insert`. Metadata exhaustion is
    /// handled internally by stealing from the range.
    fn insert_steal(&mut self, range: &mut Range) -> Result<Range, LandError>;

    /// Like [`delete`](Self::delete), but the land may adjust `range` in
    /// place to fund its own metadata, deleting exactly what is there.
    ///
    /// # Errors
    ///
    /// [`LandError::NotFound`] as for `delete`.
    fn delete_steal(&mut self, range: &mut Range) -> Result<Range, LandError>;

    /// Visit every resident range. A visitor returning `false` stops the
    /// walk. Returns `true` iff the walk ran to completion.
    ///
    /// Visit order is the land's own ordering. Visitors must not mutate
    /// this land.
    fn iterate(&self, visitor: &mut dyn FnMut(Range) -> bool) -> bool;

    /// Locate the lowest-addressed resident range of at least `size`
    /// bytes, optionally deleting part of it per `find_delete`.
    fn find_first(&mut self, size: usize, find_delete: FindDelete) -> Option<Find>;

    /// Locate the highest-addressed resident range of at least `size`
    /// bytes, optionally deleting part of it per `find_delete`.
    fn find_last(&mut self, size: usize, find_delete: FindDelete) -> Option<Find>;

    /// Locate the largest resident range, provided it has at least `size`
    /// bytes, optionally deleting part of it per `find_delete`.
    fn find_largest(&mut self, size: usize, find_delete: FindDelete) -> Option<Find>;

    /// Locate a sub-range of `size` bytes lying entirely within `zones`,
    /// searching from the high end of the address space when `high`.
    ///
    /// The selection is not deleted; callers remove it with
    /// [`delete`](Self::delete).
    ///
    /// # Errors
    ///
    /// Implementations that must mutate to answer may surface their own
    /// failures; the in-tree lands answer infallibly.
    fn find_in_zones(
        &mut self,
        size: usize,
        zones: ZoneSet,
        high: bool,
    ) -> Result<Option<Find>, LandError>;

    /// Best-effort migration of this land's contents into `target`,
    /// moving as many ranges as `target` will accept. Returns `true` iff
    /// this land was fully drained.
    ///
    /// A refusal by `target` is not an error; the refused ranges simply
    /// stay put.
    fn flush_into(&mut self, target: &mut dyn Land) -> bool;

    /// Concrete type name for diagnostics.
    fn class_name(&self) -> &'static str;

    /// Write a diagnostic description, each line indented by `depth`
    /// spaces.
    fn describe(&self, w: &mut dyn fmt::Write, depth: usize) -> fmt::Result;
}
