use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::Mark;

use super::error::Error;

/// Stable handle into the mark arena.
pub(crate) type MarkIdx = u32;

/// New marks usually win over everything already observed, so `locate`
/// scans this many tail entries in reverse before falling back to a binary
/// search of the prefix.
const TAIL_SCAN: usize = 10;

/// Canonical marks live in a slab addressed by [`MarkIdx`]; `ordered` keeps
/// their handles ascending under the mark precedence order. The resolution
/// index stores handles only, so removing a mark here must happen after its
/// handle has been scrubbed from every stack.
#[derive(Debug)]
pub(crate) struct MarkStore<M> {
    arena: Vec<Option<M>>,
    free: SmallVec<[MarkIdx; 4]>,
    ordered: Vec<MarkIdx>,
}

impl<M> MarkStore<M> {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            free: SmallVec::new(),
            ordered: Vec::new(),
        }
    }

    pub fn get(&self, idx: MarkIdx) -> &M {
        self.arena[idx as usize].as_ref().unwrap()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &M> + '_ {
        self.ordered.iter().map(move |&idx| self.get(idx))
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.free.clear();
        self.ordered.clear();
    }
}

impl<M: Mark> MarkStore<M> {
    /// Binary-search position for `mark` in the ordered sequence, plus the
    /// handle of the canonical copy when an equal mark is already present.
    ///
    /// Fails with [`Error::InconsistentComparator`] when the comparator
    /// contradicts itself around the found position.
    pub fn locate(&self, mark: &M) -> Result<(usize, Option<MarkIdx>), Error> {
        let n = self.ordered.len();
        let mut at = n;
        let stop = n.saturating_sub(TAIL_SCAN);
        while at > stop {
            match mark.compare(self.get(self.ordered[at - 1])) {
                Ordering::Greater => return Ok((at, None)),
                Ordering::Equal => return Ok((at - 1, Some(self.ordered[at - 1]))),
                Ordering::Less => at -= 1,
            }
        }
        if at == 0 {
            return Ok((0, None));
        }

        let (mut lo, mut hi) = (0, at);
        while lo < hi {
            let mid = (lo + hi) / 2;
            match mark.compare(self.get(self.ordered[mid])) {
                Ordering::Greater => lo = mid + 1,
                Ordering::Equal => return Ok((mid, Some(self.ordered[mid]))),
                Ordering::Less => hi = mid,
            }
        }
        // the found slot must sit strictly between its neighbors, or the
        // comparator is not a total order
        if lo > 0 && mark.compare(self.get(self.ordered[lo - 1])) != Ordering::Greater {
            return Err(Error::InconsistentComparator);
        }
        if lo < n && mark.compare(self.get(self.ordered[lo])) != Ordering::Less {
            return Err(Error::InconsistentComparator);
        }
        Ok((lo, None))
    }

    /// Insert `mark` at the ordered position `at` (as returned by
    /// [`MarkStore::locate`]) and return its handle.
    pub fn insert_at(&mut self, at: usize, mark: M) -> MarkIdx {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.arena[idx as usize] = Some(mark);
                idx
            }
            None => {
                self.arena.push(Some(mark));
                (self.arena.len() - 1) as MarkIdx
            }
        };
        self.ordered.insert(at, idx);
        idx
    }

    /// Drop the ordered entry at `at`. The slab slot stays live until
    /// [`MarkStore::release`].
    pub fn unlink(&mut self, at: usize) {
        self.ordered.remove(at);
    }

    /// Free a slab slot, returning the canonical mark.
    pub fn release(&mut self, idx: MarkIdx) -> M {
        let mark = self.arena[idx as usize].take().unwrap();
        self.free.push(idx);
        mark
    }
}
