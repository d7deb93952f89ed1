//! Instrumented collaborators for exercising failure paths.

extern crate std;

use core::cell::Cell;
use core::fmt;
use std::vec::Vec;

use crate::{Cbs, Find, FindDelete, Land, LandError, Range, ZoneSet};

/// Collect a land's resident ranges in its own visit order.
pub(crate) fn ranges_of(land: &impl Land) -> Vec<Range> {
    let mut out = Vec::new();
    land.iterate(&mut |range| {
        out.push(range);
        true
    });
    out
}

/// A `Cbs` wrapper with scriptable failures and a busy flag asserting the
/// single-entry discipline: no operation may enter the land while another
/// is still on the stack.
pub(crate) struct ScriptedLand {
    pub inner: Cbs,
    /// Fail this many upcoming inserts with an allocation-failure kind.
    pub fail_next_inserts: usize,
    /// Fail every zones query.
    pub fail_zone_finds: bool,
    busy: Cell<bool>,
}

impl ScriptedLand {
    pub fn new(inner: Cbs) -> Self {
        Self {
            inner,
            fail_next_inserts: 0,
            fail_zone_finds: false,
            busy: Cell::new(false),
        }
    }

    fn enter(busy: &Cell<bool>) -> Busy<'_> {
        assert!(!busy.get(), "re-entered a land mid-operation");
        busy.set(true);
        Busy(busy)
    }
}

struct Busy<'a>(&'a Cell<bool>);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Land for ScriptedLand {
    fn alignment(&self) -> usize {
        self.inner.alignment()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn insert(&mut self, range: Range) -> Result<Range, LandError> {
        let _busy = ScriptedLand::enter(&self.busy);
        if self.fail_next_inserts > 0 {
            self.fail_next_inserts -= 1;
            return Err(LandError::MetadataExhausted);
        }
        self.inner.insert(range)
    }

    fn delete(&mut self, range: Range) -> Result<Range, LandError> {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.delete(range)
    }

    fn insert_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.insert_steal(range)
    }

    fn delete_steal(&mut self, range: &mut Range) -> Result<Range, LandError> {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.delete_steal(range)
    }

    fn iterate(&self, visitor: &mut dyn FnMut(Range) -> bool) -> bool {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.iterate(visitor)
    }

    fn find_first(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.find_first(size, find_delete)
    }

    fn find_last(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.find_last(size, find_delete)
    }

    fn find_largest(&mut self, size: usize, find_delete: FindDelete) -> Option<Find> {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.find_largest(size, find_delete)
    }

    fn find_in_zones(
        &mut self,
        size: usize,
        zones: ZoneSet,
        high: bool,
    ) -> Result<Option<Find>, LandError> {
        let _busy = ScriptedLand::enter(&self.busy);
        if self.fail_zone_finds {
            return Err(LandError::MetadataExhausted);
        }
        self.inner.find_in_zones(size, zones, high)
    }

    fn flush_into(&mut self, target: &mut dyn Land) -> bool {
        let _busy = ScriptedLand::enter(&self.busy);
        self.inner.flush_into(target)
    }

    fn class_name(&self) -> &'static str {
        "Scripted"
    }

    fn describe(&self, w: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
        self.inner.describe(w, depth)
    }
}

/// Owned, alignment-adjusted backing memory for freelist tests. Ranges
/// handed out denote real writable bytes, as the freelist contract
/// requires.
pub(crate) struct Arena {
    _buf: std::boxed::Box<[u8]>,
    base: usize,
    size: usize,
}

impl Arena {
    pub fn new(size: usize, align: usize) -> Self {
        let buf = std::vec![0u8; size + align].into_boxed_slice();
        let addr = buf.as_ptr() as usize;
        let base = (addr + align - 1) & !(align - 1);
        Self {
            _buf: buf,
            base,
            size,
        }
    }

    /// The range `[offset, offset + len)` within the arena.
    pub fn range(&self, offset: usize, len: usize) -> Range {
        assert!(offset + len <= self.size, "range escapes the arena");
        Range::new(self.base + offset, self.base + offset + len)
    }
}
