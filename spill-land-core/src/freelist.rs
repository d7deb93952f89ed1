//! Intrusive freelist: the allocation-free land.
//!
//! The freelist keeps its bookkeeping *inside the memory it tracks*: the
//! first two words of every free range hold that block's limit and the
//! base of the next block. Admitting a range that is already free memory
//! therefore never allocates, which is what qualifies the freelist as the
//! secondary of a [`Failover`](crate::Failover): the land of last resort
//! when the primary's own metadata is exhausted.
//!
//! The cost is linear walks for every operation and a raw-pointer core;
//! the unsafe is confined to the header accessors below and is justified
//! by the ownership contract on [`Freelist::new`].

use core::fmt;
use core::mem;
use core::ptr;

use crate::{
    error::LandError,
    land::{Find, FindDelete, Land},
    range::Range,
    zone::ZoneSet,
};

/// Base address standing for "no block".
///
/// Usable as a sentinel because a block at `usize::MAX` cannot be
/// non-empty.
const NIL: usize = usize::MAX;

/// In-band block header, written at the base of every free block.
#[repr(C)]
#[derive(Clone, Copy)]
struct BlockHeader {
    /// One past the block's highest address.
    limit: usize,
    /// Base of the next block in address order, or [`NIL`].
    next: usize,
}

/// Compile-time proof that a header fits the minimum grain and needs no
/// more than word alignment. Every aligned non-empty range can hold one.
const _: () = {
    assert!(mem::size_of::<BlockHeader>() == 2 * mem::size_of::<usize>());
    assert!(mem::align_of::<BlockHeader>() == mem::align_of::<usize>());
};

/// Smallest alignment under which every block can carry its header.
const MIN_ALIGN: usize = mem::size_of::<BlockHeader>();

/// # Safety (shared by the header accessors)
///
/// `base` must be the base of a resident block of this freelist: per the
/// contract on [`Freelist::new`], such memory is valid for reads and
/// writes, exclusively owned by the freelist, and at least header-sized
/// and word-aligned.
unsafe fn read_header(base: usize) -> BlockHeader {
    unsafe { ptr::read(base as *const BlockHeader) }
}

unsafe fn write_header(base: usize, limit: usize, next: usize) {
    unsafe { ptr::write(base as *mut BlockHeader, BlockHeader { limit, next }) }
}

/// An address-ordered singly-linked freelist stored in the free memory
/// itself.
///
/// Insertion coalesces with abutting neighbours by rewriting headers;
/// deletion splits by writing a fresh header into the surviving fragment.
/// No operation allocates, ever.
pub struct Freelist {
    align: usize,
    /// Base of the first block, or [`NIL`].
    head: usize,
    total: usize,
    blocks: usize,
}

impl Freelist {
    /// Create an empty freelist.
    ///
    /// `align` must be a power of two of at least two machine words, so
    /// every resident range can hold its own header.
    ///
    /// # Safety
    ///
    /// Every range handed to this land (directly, or spilled here by a
    /// composition) must denote memory that is valid for reads and
    /// writes and exclusively owned by the freelist for as long as the
    /// range is resident. The freelist writes block headers into that
    /// memory.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two or is smaller than two
    /// machine words.
    #[must_use]
    pub unsafe fn new(align: usize) -> Self {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        assert!(
            align >= MIN_ALIGN,
            "alignment must hold a block header ({MIN_ALIGN} bytes)"
        );
        Self {
            align,
            head: NIL,
            total: 0,
            blocks: 0,
        }
    }

    /// Number of resident blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks
    }

    /// Point `prev`'s link (or the head) at `base`.
    fn link(&mut self, prev: usize, base: usize) {
        if prev == NIL {
            self.head = base;
        } else {
            // SAFETY: `prev` is a resident block base.
            let header = unsafe { read_header(prev) };
            unsafe { write_header(prev, header.limit, base) };
        }
    }

    /// Walk to `target`'s position: the last block base below `target`
    /// (or [`NIL`]) and the first at or above it (or [`NIL`]).
    fn locate(&self, target: usize) -> (usize, usize) {
        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL && cur < target {
            prev = cur;
            // SAFETY: `cur` is a resident block base.
            cur = unsafe { read_header(cur) }.next;
        }
        (prev, cur)
    }
}

impl Land for Freelist {
    fn alignment(&self) -> usize {
        self.align
    }

    fn size(&self) -> usize {
        self.total
    }

    fn insert(&mut self, range: Range) -> Result<Range, LandError> {
        debug_assert!(!range.is_empty());
        debug_assert!(range.is_aligned(self.align));

        let (prev, cur) = self.locate(range.base());
        // SAFETY: `prev` is a resident block base when not NIL.
        let prev_header = (prev != NIL).then(|| unsafe { read_header(prev) });
        if let Some(header) = prev_header {
            if header.limit > range.base() {
                return Err(LandError::Overlap);
            }
        }
        if cur != NIL && cur < range.limit() {
            return Err(LandError::Overlap);
        }

        // Absorb the right neighbour first so left-coalescing links past it.
        let mut new_limit = range.limit();
        let mut next = cur;
        if cur != NIL && cur == range.limit() {
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            new_limit = header.limit;
            next = header.next;
            self.blocks -= 1;
        }

        let new_base = match prev_header {
            Some(header) if header.limit == range.base() => {
                // Extend the left neighbour in place.
                // SAFETY: `prev` is a resident block base.
                unsafe { write_header(prev, new_limit, next) };
                prev
            }
            _ => {
                // SAFETY: `range` is memory the caller handed to this
                // freelist (see `new`), large enough for a header.
                unsafe { write_header(range.base(), new_limit, next) };
                self.link(prev, range.base());
                self.blocks += 1;
                range.base()
            }
        };
        self.total += range.size();
        Ok(Range::new(new_base, new_limit))
    }

    fn delete(&mut self, range: Range) -> Result<Range, LandError> {
        debug_assert!(!range.is_empty());
        debug_assert!(range.is_aligned(self.align));

        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            if cur > range.base() {
                break;
            }
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            if range.limit() <= header.limit {
                let old = Range::new(cur, header.limit);
                match (cur == range.base(), header.limit == range.limit()) {
                    (true, true) => {
                        self.link(prev, header.next);
                        self.blocks -= 1;
                    }
                    (true, false) => {
                        // The surviving fragment gets a fresh in-band header.
                        // SAFETY: the fragment is within the resident block.
                        unsafe { write_header(range.limit(), header.limit, header.next) };
                        self.link(prev, range.limit());
                    }
                    (false, true) => {
                        // SAFETY: `cur` is a resident block base.
                        unsafe { write_header(cur, range.base(), header.next) };
                    }
                    (false, false) => {
                        // Split: both fragments are aligned and non-empty,
                        // so both can carry a header. No allocation.
                        // SAFETY: both fragments are within the resident block.
                        unsafe { write_header(range.limit(), header.limit, header.next) };
                        unsafe { write_header(cur, range.base(), range.limit()) };
                        self.blocks += 1;
                    }
                }
                self.total -= range.size();
                return Ok(old);
            }
            prev = cur;
            cur = header.next;
        }
        Err(LandError::NotFound)
    }

    fn insert_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        // Nothing to steal for: admitting free memory is allocation-free.
        self.insert(*range)
    }

    fn delete_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        self.delete(*range)
    }

    fn iterate(&self, visitor: &mut dyn FnMut(Range) -> bool) -> bool {
        let mut cur = self.head;
        while cur != NIL {
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            if !visitor(Range::new(cur, header.limit)) {
                return false;
            }
            cur = header.next;
        }
        true
    }

    fn find_first(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        debug_assert!(size > 0);
        let mut cur = self.head;
        while cur != NIL {
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            if header.limit - cur >= size {
                return Some(self.apply_find_delete(Range::new(cur, header.limit), size, find_delete));
            }
            cur = header.next;
        }
        None
    }

    fn find_last(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        debug_assert!(size > 0);
        let mut best = None;
        let mut cur = self.head;
        while cur != NIL {
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            if header.limit - cur >= size {
                best = Some(Range::new(cur, header.limit));
            }
            cur = header.next;
        }
        Some(self.apply_find_delete(best?, size, find_delete))
    }

    fn find_largest(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        debug_assert!(size > 0);
        let mut best: Option<Range> = None;
        let mut cur = self.head;
        while cur != NIL {
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            let found = Range::new(cur, header.limit);
            if best.map_or(true, |b| found.size() > b.size()) {
                best = Some(found);
            }
            cur = header.next;
        }
        let best = best.filter(|b| b.size() >= size)?;
        Some(self.apply_find_delete(best, size, find_delete))
    }

    fn find_in_zones(
        &mut self,
        size: usize,
        zones: ZoneSet,
        high: bool,
    ) -> Result<Option<Find>, LandError> {
        debug_assert!((1usize << zones.shift()) % self.align == 0);
        let mut found = None;
        let mut cur = self.head;
        while cur != NIL {
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            let old = Range::new(cur, header.limit);
            if let Some(range) = zones.find_in(old, size, high) {
                found = Some(Find { range, old });
                if !high {
                    break;
                }
                // Later blocks are higher; keep the last hit.
            }
            cur = header.next;
        }
        Ok(found)
    }

    fn flush_into(&mut self, target: &mut dyn Land) -> bool {
        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            // Copy the header out before the move: a freelist target will
            // write its own header over these words.
            // SAFETY: `cur` is a resident block base.
            let header = unsafe { read_header(cur) };
            let range = Range::new(cur, header.limit);
            if target.insert(range).is_ok() {
                self.link(prev, header.next);
                self.blocks -= 1;
                self.total -= range.size();
            } else {
                prev = cur;
            }
            cur = header.next;
        }
        self.head == NIL
    }

    fn class_name(&self) -> &'static str {
        "Freelist"
    }

    fn describe(&self, w: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
        writeln!(
            w,
            "{:indent$}freelist: {} blocks, {} bytes",
            "",
            self.blocks,
            self.total,
            indent = depth
        )
    }
}

impl Freelist {
    /// Remove the selected portion of a block just located by a find.
    /// The selection is a sub-range of a resident block, so the delete
    /// cannot refuse.
    fn apply_find_delete(&mut self, old: Range, size: usize, find_delete: FindDelete) -> Find {
        let range = match find_delete {
            FindDelete::None => return Find { range: old, old },
            FindDelete::Entire => old,
            FindDelete::Low => Range::new(old.base(), old.base() + size),
            FindDelete::High => Range::new(old.limit() - size, old.limit()),
        };
        match self.delete(range) {
            Ok(deleted_from) => {
                debug_assert_eq!(deleted_from, old);
                Find { range, old }
            }
            Err(_) => unreachable!("resident range vanished during find"),
        }
    }
}
