//! Coalescing block set: the fast, indexed land.

use alloc::collections::{BTreeMap, BTreeSet};
use core::fmt;

use crate::{
    error::LandError,
    land::{Find, FindDelete, Land},
    range::Range,
    zone::ZoneSet,
};

/// An address-ordered, size-indexed, coalescing set of free ranges.
///
/// Inserts coalesce with abutting neighbours; finds run against a block
/// index ordered by address or by size. The price of the index is that it
/// lives in metadata blocks of its own, and the pool of those can be
/// bounded: a `Cbs` built with [`with_block_pool_limit`] refuses (without
/// mutating) any operation that would grow the resident block count past
/// the limit. That makes metadata exhaustion a real, testable state, and
/// is exactly the failure a [`Failover`](crate::Failover) composition
/// recovers from.
///
/// [`with_block_pool_limit`]: Self::with_block_pool_limit
pub struct Cbs {
    align: usize,
    /// Resident blocks, base -> limit.
    blocks: BTreeMap<usize, usize>,
    /// Size index, `(size, base)`.
    by_size: BTreeSet<(usize, usize)>,
    total: usize,
    /// Metadata block budget; `None` is unbounded.
    block_pool_limit: Option<usize>,
}

impl Cbs {
    /// Create an empty set with an unbounded metadata pool.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[must_use]
    pub fn new(align: usize) -> Self {
        Self::with_pool(align, None)
    }

    /// Create an empty set whose metadata pool holds at most `limit`
    /// blocks. Mutations that would grow the resident block count past
    /// the limit fail with an allocation-failure kind, leaving the set
    /// unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[must_use]
    pub fn with_block_pool_limit(align: usize, limit: usize) -> Self {
        Self::with_pool(align, Some(limit))
    }

    fn with_pool(align: usize, block_pool_limit: Option<usize>) -> Self {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        Self {
            align,
            blocks: BTreeMap::new(),
            by_size: BTreeSet::new(),
            total: 0,
            block_pool_limit,
        }
    }

    /// Number of resident blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn at_capacity(&self) -> bool {
        match self.block_pool_limit {
            Some(limit) => self.blocks.len() >= limit,
            None => false,
        }
    }

    /// One more metadata block, funded by a stolen grain.
    fn grow_block_pool(&mut self) {
        if let Some(limit) = &mut self.block_pool_limit {
            *limit += 1;
        }
    }

    fn add_block(&mut self, base: usize, limit: usize) {
        let prev = self.blocks.insert(base, limit);
        debug_assert!(prev.is_none());
        self.by_size.insert((limit - base, base));
        self.total += limit - base;
    }

    fn remove_block(&mut self, base: usize, limit: usize) {
        let removed = self.blocks.remove(&base);
        debug_assert_eq!(removed, Some(limit));
        self.by_size.remove(&(limit - base, base));
        self.total -= limit - base;
    }

    /// Clip or remove the located block per `find_delete`. Clipping only
    /// shrinks a block, so this never needs a fresh metadata block.
    fn apply_find_delete(&mut self, old: Range, size: usize, find_delete: FindDelete) -> Find {
        let range = match find_delete {
            FindDelete::None | FindDelete::Entire => old,
            FindDelete::Low => Range::new(old.base(), old.base() + size),
            FindDelete::High => Range::new(old.limit() - size, old.limit()),
        };
        match find_delete {
            FindDelete::None => {}
            FindDelete::Entire => self.remove_block(old.base(), old.limit()),
            FindDelete::Low => {
                self.remove_block(old.base(), old.limit());
                if range.limit() < old.limit() {
                    self.add_block(range.limit(), old.limit());
                }
            }
            FindDelete::High => {
                self.remove_block(old.base(), old.limit());
                if old.base() < range.base() {
                    self.add_block(old.base(), range.base());
                }
            }
        }
        Find { range, old }
    }
}

impl Land for Cbs {
    fn alignment(&self) -> usize {
        self.align
    }

    fn size(&self) -> usize {
        self.total
    }

    fn insert(&mut self, range: Range) -> Result<Range, LandError> {
        debug_assert!(!range.is_empty());
        debug_assert!(range.is_aligned(self.align));

        let base = range.base();
        let limit = range.limit();

        let left = self
            .blocks
            .range(..=base)
            .next_back()
            .map(|(&b, &l)| (b, l));
        if let Some((_, left_limit)) = left {
            if left_limit > base {
                return Err(LandError::Overlap);
            }
        }
        let right = self.blocks.range(base..).next().map(|(&b, &l)| (b, l));
        if let Some((right_base, _)) = right {
            if right_base < limit {
                return Err(LandError::Overlap);
            }
        }

        let merge_left = left.filter(|&(_, left_limit)| left_limit == base);
        let merge_right = right.filter(|&(right_base, _)| right_base == limit);

        // Coalescing reuses block slots; only an isolated range needs a
        // fresh one.
        if merge_left.is_none() && merge_right.is_none() && self.at_capacity() {
            return Err(LandError::MetadataExhausted);
        }

        let mut new_base = base;
        let mut new_limit = limit;
        if let Some((left_base, left_limit)) = merge_left {
            self.remove_block(left_base, left_limit);
            new_base = left_base;
        }
        if let Some((right_base, right_limit)) = merge_right {
            self.remove_block(right_base, right_limit);
            new_limit = right_limit;
        }
        self.add_block(new_base, new_limit);
        Ok(Range::new(new_base, new_limit))
    }

    fn delete(&mut self, range: Range) -> Result<Range, LandError> {
        debug_assert!(!range.is_empty());
        debug_assert!(range.is_aligned(self.align));

        let Some((&base, &limit)) = self.blocks.range(..=range.base()).next_back() else {
            return Err(LandError::NotFound);
        };
        let old = Range::new(base, limit);
        if !old.nests(&range) {
            return Err(LandError::NotFound);
        }

        match (old.base() == range.base(), old.limit() == range.limit()) {
            (true, true) => self.remove_block(base, limit),
            (true, false) => {
                self.remove_block(base, limit);
                self.add_block(range.limit(), limit);
            }
            (false, true) => {
                self.remove_block(base, limit);
                self.add_block(base, range.base());
            }
            (false, false) => {
                // An interior delete splits one block into two.
                if self.at_capacity() {
                    return Err(LandError::SplitExhausted { old });
                }
                self.remove_block(base, limit);
                self.add_block(base, range.base());
                self.add_block(range.limit(), limit);
            }
        }
        Ok(old)
    }

    fn insert_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        match self.insert(*range) {
            Err(err) if err.is_alloc_failure() => {
                // One grain of the range funds one more metadata block;
                // the caller sees the clipped range.
                let clipped = Range::new(range.base() + self.align, range.limit());
                self.grow_block_pool();
                *range = clipped;
                if clipped.is_empty() {
                    return Ok(clipped);
                }
                self.insert(clipped)
            }
            result => result,
        }
    }

    fn delete_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        match self.delete(*range) {
            Err(err) if err.is_alloc_failure() => {
                // A grain of the deleted range funds the split. The whole
                // request leaves the free set; the caller receives what
                // remains after the grain.
                let requested = *range;
                self.grow_block_pool();
                *range = Range::new(requested.base() + self.align, requested.limit());
                self.delete(requested)
            }
            result => result,
        }
    }

    fn iterate(&self, visitor: &mut dyn FnMut(Range) -> bool) -> bool {
        for (&base, &limit) in &self.blocks {
            if !visitor(Range::new(base, limit)) {
                return false;
            }
        }
        true
    }

    fn find_first(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        debug_assert!(size > 0);
        let old = self
            .blocks
            .iter()
            .find(|&(&base, &limit)| limit - base >= size)
            .map(|(&base, &limit)| Range::new(base, limit))?;
        Some(self.apply_find_delete(old, size, find_delete))
    }

    fn find_last(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        debug_assert!(size > 0);
        let old = self
            .blocks
            .iter()
            .rev()
            .find(|&(&base, &limit)| limit - base >= size)
            .map(|(&base, &limit)| Range::new(base, limit))?;
        Some(self.apply_find_delete(old, size, find_delete))
    }

    fn find_largest(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        debug_assert!(size > 0);
        let &(largest, base) = self.by_size.iter().next_back()?;
        if largest < size {
            return None;
        }
        let old = Range::new(base, base + largest);
        Some(self.apply_find_delete(old, size, find_delete))
    }

    fn find_in_zones(
        &mut self,
        size: usize,
        zones: ZoneSet,
        high: bool,
    ) -> Result<Option<Find>, LandError> {
        debug_assert!((1usize << zones.shift()) % self.align == 0);
        let mut found = None;
        for (&base, &limit) in &self.blocks {
            let old = Range::new(base, limit);
            if let Some(range) = zones.find_in(old, size, high) {
                found = Some(Find { range, old });
                if !high {
                    break;
                }
                // Later blocks are higher; keep the last hit.
            }
        }
        Ok(found)
    }

    fn flush_into(&mut self, target: &mut dyn Land) -> bool {
        let mut cursor = 0usize;
        loop {
            let Some((&base, &limit)) = self.blocks.range(cursor..).next() else {
                break;
            };
            if target.insert(Range::new(base, limit)).is_ok() {
                self.remove_block(base, limit);
            }
            cursor = base + 1;
        }
        self.blocks.is_empty()
    }

    fn class_name(&self) -> &'static str {
        "Cbs"
    }

    fn describe(&self, w: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
        writeln!(
            w,
            "{:indent$}cbs: {} blocks, {} bytes",
            "",
            self.blocks.len(),
            self.total,
            indent = depth
        )
    }
}
