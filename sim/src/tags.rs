//! Reorder tag bookkeeping on the requester side.
//!
//! The pool holds tags `0..capacity`. Every tag is either free or
//! outstanding, never both, and allocation always hands out the lowest free
//! tag so runs are reproducible.

use std::collections::{BTreeMap, BTreeSet};

use crate::{bus::ReorderId, error::ProtocolError};

#[derive(Debug, Clone)]
pub struct TagAllocator<C> {
    capacity: u32,
    free: BTreeSet<ReorderId>,
    outstanding: BTreeMap<ReorderId, C>,
    /// Reclaimed tags not handed out again since. A second reclaim of one of
    /// these is a duplicate response rather than a stray one.
    retired: BTreeSet<ReorderId>,
}

impl<C> TagAllocator<C> {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free: (0..capacity).collect(),
            outstanding: BTreeMap::new(),
            retired: BTreeSet::new(),
        }
    }

    /// The lowest free tag.
    pub fn peek(&self) -> Option<ReorderId> {
        self.free.first().copied()
    }

    /// Mark a specific tag outstanding, e.g. one already placed on the bus.
    pub fn claim(&mut self, tag: ReorderId, context: C) -> Result<(), ProtocolError> {
        if tag >= self.capacity {
            return Err(ProtocolError::TagOutOfRange {
                tag,
                capacity: self.capacity,
            });
        }
        if !self.free.remove(&tag) {
            return Err(ProtocolError::TagReuse { tag });
        }
        self.retired.remove(&tag);
        self.outstanding.insert(tag, context);
        Ok(())
    }

    /// Retire an outstanding tag, returning its context.
    pub fn reclaim(&mut self, tag: ReorderId) -> Result<C, ProtocolError> {
        match self.outstanding.remove(&tag) {
            Some(context) => {
                self.free.insert(tag);
                self.retired.insert(tag);
                Ok(context)
            }
            None if self.retired.contains(&tag) => Err(ProtocolError::DuplicateResponse { tag }),
            None => Err(ProtocolError::UnknownTag { tag }),
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// No free tag: issuing must wait for a response.
    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    pub fn outstanding_tags(&self) -> Vec<ReorderId> {
        self.outstanding.keys().copied().collect()
    }

    /// Return to the fully-free state, handing back whatever was in flight.
    pub fn reset(&mut self) -> Vec<(ReorderId, C)> {
        let aborted = std::mem::take(&mut self.outstanding).into_iter().collect();
        self.free = (0..self.capacity).collect();
        self.retired.clear();
        aborted
    }

    /// Free and outstanding tags partition the pool.
    pub fn is_consistent(&self) -> bool {
        self.free.len() + self.outstanding.len() == self.capacity as usize
            && self.outstanding.keys().all(|tag| !self.free.contains(tag))
            && self.free.iter().all(|tag| *tag < self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take<C>(tags: &mut TagAllocator<C>, context: C) -> Option<ReorderId> {
        let tag = tags.peek()?;
        tags.claim(tag, context).ok()?;
        Some(tag)
    }

    #[test]
    fn test_lowest_first() {
        let mut tags = TagAllocator::new(4);
        assert_eq!(take(&mut tags, "a"), Some(0));
        assert_eq!(take(&mut tags, "b"), Some(1));
        assert_eq!(take(&mut tags, "c"), Some(2));
        assert_eq!(tags.reclaim(1), Ok("b"));
        assert_eq!(tags.peek(), Some(1));
        assert_eq!(take(&mut tags, "d"), Some(1));
        assert_eq!(tags.outstanding_tags(), vec![0, 1, 2]);
        assert_eq!(tags.reclaim(1), Ok("d"));
        assert!(tags.is_consistent());
    }

    #[test]
    fn test_exhaustion() {
        let mut tags = TagAllocator::new(2);
        take(&mut tags, ()).unwrap();
        take(&mut tags, ()).unwrap();
        assert!(tags.is_exhausted());
        assert_eq!(tags.peek(), None);
        tags.reclaim(0).unwrap();
        assert!(!tags.is_exhausted());
        assert_eq!(take(&mut tags, ()), Some(0));
    }

    #[test]
    fn test_violations() {
        let mut tags = TagAllocator::new(2);
        tags.claim(1, ()).unwrap();
        assert_eq!(tags.claim(1, ()), Err(ProtocolError::TagReuse { tag: 1 }));
        assert_eq!(
            tags.claim(2, ()),
            Err(ProtocolError::TagOutOfRange {
                tag: 2,
                capacity: 2
            })
        );
        assert_eq!(tags.reclaim(0), Err(ProtocolError::UnknownTag { tag: 0 }));
        tags.reclaim(1).unwrap();
        assert_eq!(
            tags.reclaim(1),
            Err(ProtocolError::DuplicateResponse { tag: 1 })
        );

        // once reissued, the tag is live again
        tags.claim(1, ()).unwrap();
        assert_eq!(tags.reclaim(1), Ok(()));
        assert!(tags.is_consistent());
    }

    #[test]
    fn test_reset() {
        let mut tags = TagAllocator::new(3);
        take(&mut tags, 'x').unwrap();
        take(&mut tags, 'y').unwrap();
        let aborted = tags.reset();
        assert_eq!(aborted, vec![(0, 'x'), (1, 'y')]);
        assert_eq!(tags.free_count(), 3);
        assert_eq!(tags.outstanding_count(), 0);
        assert_eq!(tags.reclaim(0), Err(ProtocolError::UnknownTag { tag: 0 }));
    }
}
