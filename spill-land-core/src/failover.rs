//! The failover composition: a primary land that spills to a secondary.
//!
//! A [`Failover`] owns two child lands and presents their union as one.
//! The primary is the fast, indexed store and takes every write it can;
//! the secondary is the slower store that never needs fresh metadata to
//! admit memory that is already free. When the primary refuses a mutation
//! for want of metadata, the mutation is redirected (whole on insert,
//! split into fragments on delete) so callers never observe the
//! exhaustion at all.
//!
//! These paths sit on the critical path of allocation and free in the
//! enclosing pool, hence the cheap always-on assertions and the
//! `debug_assert!` validation everywhere else.

use core::fmt;

use crate::{
    error::LandError,
    land::{Find, FindDelete, Land},
    range::Range,
    zone::ZoneSet,
};

/// Union of two lands with spill-on-exhaustion and drain-before-use.
///
/// Writes target `P`; when `P` reports an allocation failure they spill
/// to `S`. Before most operations the contents of `S` are flushed back
/// into `P`, maximizing coalescence there and keeping lookups in the fast
/// index. Reads observe the union of both children.
///
/// `Failover` implements [`Land`] itself, so failover nodes compose into
/// trees.
pub struct Failover<P: Land, S: Land> {
    primary: P,
    secondary: S,
}

impl<P: Land, S: Land> Failover<P, S> {
    /// Compose `primary` and `secondary` into one land.
    ///
    /// The children must already exist and be empty or pre-populated
    /// consistently; they are owned by the failover until
    /// [`into_parts`](Self::into_parts).
    ///
    /// # Panics
    ///
    /// Panics if the children disagree on alignment.
    #[must_use]
    pub fn new(primary: P, secondary: S) -> Self {
        assert_eq!(
            primary.alignment(),
            secondary.alignment(),
            "failover children must share an alignment"
        );
        Self { primary, secondary }
    }

    /// Dissolve the composition, handing both children back.
    ///
    /// Range contents are untouched; whatever each child holds at this
    /// moment, it keeps.
    #[must_use]
    pub fn into_parts(self) -> (P, S) {
        (self.primary, self.secondary)
    }

    /// Move what the primary will accept out of the secondary, so writes
    /// coalesce there and lookups concentrate in the fast index.
    /// Residue in the secondary is fine; a refusal is not an error.
    fn drain(&mut self) {
        let Self { primary, secondary } = self;
        let _ = secondary.flush_into(primary);
    }

    /// Recovery for a delete the primary could locate but not represent:
    /// `old ⊇ range` is resident, but splitting it would need metadata the
    /// primary does not have. Delete the whole of `old` (which releases
    /// metadata) and re-insert the surviving fragments wherever they fit.
    ///
    /// The fragments go directly to the children: routing them through
    /// `self.insert` would re-enter this land mid-operation.
    fn recover_split(&mut self, range: Range, old: Range) -> Result<(), LandError> {
        let removed = self.primary.delete(old)?;
        debug_assert_eq!(removed, old);

        let left = Range::new(old.base(), range.base());
        if !left.is_empty() {
            self.spill_fragment(left);
        }
        let right = Range::new(range.limit(), old.limit());
        if !right.is_empty() {
            self.spill_fragment(right);
        }
        Ok(())
    }

    /// Re-insert one fragment of a recovered delete: primary if it will
    /// take it, secondary otherwise. The secondary admitting free memory
    /// is its defining contract; a refusal there is unrecoverable.
    fn spill_fragment(&mut self, fragment: Range) {
        match self.primary.insert(fragment) {
            Ok(_) => {}
            Err(err) => {
                // The fragment was resident a moment ago; it cannot overlap.
                debug_assert!(!err.is_semantic());
                if let Err(err) = self.secondary.insert(fragment) {
                    unreachable!("secondary land refused free memory {fragment}: {err}");
                }
            }
        }
    }
}

impl<P: Land, S: Land> Land for Failover<P, S> {
    fn alignment(&self) -> usize {
        self.primary.alignment()
    }

    fn size(&self) -> usize {
        self.primary.size() + self.secondary.size()
    }

    fn insert(&mut self, range: Range) -> Result<Range, LandError> {
        self.drain();
        match self.primary.insert(range) {
            // A semantic refusal would refuse in the secondary too; only
            // resource errors justify the spill.
            Err(err) if !err.is_semantic() => self.secondary.insert(range),
            result => result,
        }
    }

    fn delete(&mut self, range: Range) -> Result<Range, LandError> {
        self.drain();
        let old = match self.primary.delete(range) {
            Ok(old) => old,
            // Not resident in the primary: the secondary owns it or nobody does.
            Err(LandError::NotFound) => return self.secondary.delete(range),
            Err(LandError::SplitExhausted { old }) => {
                self.recover_split(range, old)?;
                old
            }
            Err(err) => {
                // A conforming primary reports delete-side exhaustion with
                // the containing range; anything else is the child's
                // problem and goes to the caller untouched.
                debug_assert!(err.is_alloc_failure(), "unexpected delete failure: {err}");
                return Err(err);
            }
        };
        debug_assert!(old.nests(&range));
        Ok(old)
    }

    fn insert_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        self.drain();
        // Steal ranges come from the primary's own vicinity; only the
        // primary is consulted.
        let result = self.primary.insert_steal(range);
        debug_assert!(matches!(result, Ok(_) | Err(LandError::Overlap)));
        result
    }

    fn delete_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        self.drain();
        let result = match self.primary.delete_steal(range) {
            Err(LandError::NotFound) => self.secondary.delete_steal(range),
            result => result,
        };
        debug_assert!(matches!(result, Ok(_) | Err(LandError::NotFound)));
        result
    }

    fn iterate(&self, visitor: &mut dyn FnMut(Range) -> bool) -> bool {
        self.primary.iterate(visitor) && self.secondary.iterate(visitor)
    }

    fn find_first(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        self.drain();
        match self.primary.find_first(size, find_delete) {
            Some(found) => Some(found),
            None => self.secondary.find_first(size, find_delete),
        }
    }

    fn find_last(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        self.drain();
        match self.primary.find_last(size, find_delete) {
            Some(found) => Some(found),
            None => self.secondary.find_last(size, find_delete),
        }
    }

    fn find_largest(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        self.drain();
        match self.primary.find_largest(size, find_delete) {
            Some(found) => Some(found),
            None => self.secondary.find_largest(size, find_delete),
        }
    }

    fn find_in_zones(
        &mut self,
        size: usize,
        zones: ZoneSet,
        high: bool,
    ) -> Result<Option<Find>, LandError> {
        self.drain();
        match self.primary.find_in_zones(size, zones, high) {
            Ok(Some(found)) => Ok(Some(found)),
            // Primary erred or found nothing: the secondary's outcome is
            // the answer, hit, miss or failure alike.
            _ => self.secondary.find_in_zones(size, zones, high),
        }
    }

    fn flush_into(&mut self, target: &mut dyn Land) -> bool {
        let drained_primary = self.primary.flush_into(target);
        let drained_secondary = self.secondary.flush_into(target);
        drained_primary && drained_secondary
    }

    fn class_name(&self) -> &'static str {
        "Failover"
    }

    fn describe(&self, w: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
        writeln!(
            w,
            "{:indent$}primary = {:p} ({})",
            "",
            &self.primary,
            self.primary.class_name(),
            indent = depth + 2
        )?;
        writeln!(
            w,
            "{:indent$}secondary = {:p} ({})",
            "",
            &self.secondary,
            self.secondary.class_name(),
            indent = depth + 2
        )
    }
}
