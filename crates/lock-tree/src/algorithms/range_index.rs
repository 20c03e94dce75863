//! Range Index
//!
//! Interval tree over lock records: an AVL tree ordered by `(low, high, slot)`
//! whose nodes carry the slot of the greatest `high` bound in their subtree.
//! Nodes live in an arena and are addressed by [`RecordHandle`]s, which stay
//! valid until the record is removed.
//!
//! | Operation | Cost |
//! |-----------|------|
//! | insert | O(log n) |
//! | remove by handle | O(log n) |
//! | overlapping(range) | O(log n + k) |

use super::ordering::{compare_bounds, compare_ranges};
use crate::domain::entities::LockRecord;
use crate::domain::errors::IndexCorruption;
use crate::domain::value_objects::{KeyBound, KeyRange};
use crate::ports::outbound::{KeyComparator, SharedComparator};
use std::cmp::Ordering;

/// Stable handle to a record stored in a [`RangeIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordHandle(usize);

impl RecordHandle {
    /// Arena slot behind this handle.
    pub fn slot(&self) -> usize {
        self.0
    }
}

struct Node {
    record: LockRecord,
    left: Option<usize>,
    right: Option<usize>,
    height: u32,
    /// Slot holding the greatest high bound of this subtree.
    max_high: usize,
}

/// Arena-backed interval tree of lock records.
pub struct RangeIndex {
    cmp: SharedComparator,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
}

impl RangeIndex {
    /// Create an empty index ordered by `cmp`.
    pub fn new(cmp: SharedComparator) -> Self {
        Self {
            cmp,
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    /// The comparator this index orders by.
    pub fn comparator(&self) -> &dyn KeyComparator {
        self.cmp.as_ref()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record behind `handle`, if it is live.
    pub fn get(&self, handle: RecordHandle) -> Option<&LockRecord> {
        self.slots
            .get(handle.0)
            .and_then(Option::as_ref)
            .map(|node| &node.record)
    }

    /// Store a record and return its handle.
    pub fn insert(&mut self, record: LockRecord) -> RecordHandle {
        let node = Node {
            record,
            left: None,
            right: None,
            height: 1,
            max_high: 0,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.node_mut(slot).max_high = slot;

        let root = self.root;
        let new_root = self.insert_at(root, slot);
        self.root = Some(new_root);
        self.len += 1;
        RecordHandle(slot)
    }

    /// Remove the record behind `handle`.
    ///
    /// Fails if the handle is not live or the record cannot be reached by
    /// walking the tree order, both of which mean the structure is corrupted.
    pub fn remove(&mut self, handle: RecordHandle) -> Result<LockRecord, IndexCorruption> {
        let slot = handle.0;
        if !matches!(self.slots.get(slot), Some(Some(_))) {
            return Err(IndexCorruption(format!("handle {} is not live", slot)));
        }

        let root = self.root;
        let mut found = false;
        let new_root = self.remove_at(root, slot, &mut found);
        if !found {
            return Err(IndexCorruption(format!(
                "record in slot {} is unreachable from the root",
                slot
            )));
        }
        self.root = new_root;
        self.len -= 1;
        self.free.push(slot);

        self.slots[slot]
            .take()
            .map(|node| node.record)
            .ok_or_else(|| IndexCorruption(format!("slot {} emptied during removal", slot)))
    }

    /// Handles of every record whose range intersects `range`, in index order.
    pub fn overlapping(&self, range: &KeyRange) -> Vec<RecordHandle> {
        let mut out = Vec::new();
        self.collect_overlapping(self.root, range, &mut out);
        out
    }

    /// Every live record, in index order.
    pub fn in_order(&self) -> Vec<(RecordHandle, &LockRecord)> {
        let mut out = Vec::with_capacity(self.len);
        self.collect_in_order(self.root, &mut out);
        out
    }

    /// Every live record, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordHandle, &LockRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| node.as_ref().map(|n| (RecordHandle(slot), &n.record)))
    }

    /// Remove and return every record.
    pub fn drain(&mut self) -> Vec<LockRecord> {
        let records = self
            .slots
            .drain(..)
            .flatten()
            .map(|node| node.record)
            .collect();
        self.free.clear();
        self.root = None;
        self.len = 0;
        records
    }

    /// Verify ordering, balance, heights, the max-high augment and the
    /// record count.
    pub fn check_structure(&self) -> Result<(), IndexCorruption> {
        let (count, _) = self.check_subtree(self.root)?;
        if count != self.len {
            return Err(IndexCorruption(format!(
                "tree reaches {} records but {} are counted",
                count, self.len
            )));
        }
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        if live != self.len {
            return Err(IndexCorruption(format!(
                "{} live slots but {} records counted",
                live, self.len
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Arena access
    // ------------------------------------------------------------------

    // `remove` unlinks a slot before vacating it, so every slot reachable
    // from the root during insert or remove is occupied. `check_subtree`
    // goes through `try_node` instead and reports dangling links.
    fn node(&self, slot: usize) -> &Node {
        match self.slots.get(slot) {
            Some(Some(node)) => node,
            _ => unreachable!("slot {} is linked into the tree but vacant", slot),
        }
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        match self.slots.get_mut(slot) {
            Some(Some(node)) => node,
            _ => unreachable!("slot {} is linked into the tree but vacant", slot),
        }
    }

    fn try_node(&self, slot: usize) -> Result<&Node, IndexCorruption> {
        match self.slots.get(slot) {
            Some(Some(node)) => Ok(node),
            _ => Err(IndexCorruption(format!(
                "slot {} is linked into the tree but vacant",
                slot
            ))),
        }
    }

    fn height(&self, slot: Option<usize>) -> u32 {
        slot.map_or(0, |s| self.node(s).height)
    }

    fn high_of(&self, slot: usize) -> &KeyBound {
        self.node(slot).record.range.high()
    }

    fn order(&self, a: usize, b: usize) -> Ordering {
        compare_ranges(
            &self.node(a).record.range,
            &self.node(b).record.range,
            self.cmp.as_ref(),
        )
        .then(a.cmp(&b))
    }

    // ------------------------------------------------------------------
    // AVL maintenance
    // ------------------------------------------------------------------

    fn update(&mut self, slot: usize) {
        let (left, right) = {
            let node = self.node(slot);
            (node.left, node.right)
        };
        let height = 1 + self.height(left).max(self.height(right));

        let mut best = slot;
        for child in [left, right].into_iter().flatten() {
            let candidate = self.node(child).max_high;
            if compare_bounds(self.high_of(candidate), self.high_of(best), self.cmp.as_ref())
                == Ordering::Greater
            {
                best = candidate;
            }
        }

        let node = self.node_mut(slot);
        node.height = height;
        node.max_high = best;
    }

    fn rotate_right(&mut self, slot: usize) -> usize {
        let Some(pivot) = self.node(slot).left else {
            return slot;
        };
        let inner = self.node(pivot).right;
        self.node_mut(slot).left = inner;
        self.node_mut(pivot).right = Some(slot);
        self.update(slot);
        self.update(pivot);
        pivot
    }

    fn rotate_left(&mut self, slot: usize) -> usize {
        let Some(pivot) = self.node(slot).right else {
            return slot;
        };
        let inner = self.node(pivot).left;
        self.node_mut(slot).right = inner;
        self.node_mut(pivot).left = Some(slot);
        self.update(slot);
        self.update(pivot);
        pivot
    }

    fn rebalance(&mut self, slot: usize) -> usize {
        self.update(slot);
        let (left, right) = {
            let node = self.node(slot);
            (node.left, node.right)
        };
        let balance = i64::from(self.height(left)) - i64::from(self.height(right));

        if balance > 1 {
            if let Some(l) = left {
                let (ll, lr) = (self.node(l).left, self.node(l).right);
                if self.height(ll) < self.height(lr) {
                    let new_left = self.rotate_left(l);
                    self.node_mut(slot).left = Some(new_left);
                }
            }
            return self.rotate_right(slot);
        }

        if balance < -1 {
            if let Some(r) = right {
                let (rl, rr) = (self.node(r).left, self.node(r).right);
                if self.height(rr) < self.height(rl) {
                    let new_right = self.rotate_right(r);
                    self.node_mut(slot).right = Some(new_right);
                }
            }
            return self.rotate_left(slot);
        }

        slot
    }

    fn insert_at(&mut self, at: Option<usize>, slot: usize) -> usize {
        let Some(n) = at else {
            return slot;
        };
        if self.order(slot, n) == Ordering::Less {
            let left = self.node(n).left;
            let new_left = self.insert_at(left, slot);
            self.node_mut(n).left = Some(new_left);
        } else {
            let right = self.node(n).right;
            let new_right = self.insert_at(right, slot);
            self.node_mut(n).right = Some(new_right);
        }
        self.rebalance(n)
    }

    fn remove_at(&mut self, at: Option<usize>, target: usize, found: &mut bool) -> Option<usize> {
        let n = at?;
        match self.order(target, n) {
            Ordering::Less => {
                let left = self.node(n).left;
                let new_left = self.remove_at(left, target, found);
                self.node_mut(n).left = new_left;
            }
            Ordering::Greater => {
                let right = self.node(n).right;
                let new_right = self.remove_at(right, target, found);
                self.node_mut(n).right = new_right;
            }
            Ordering::Equal => {
                *found = true;
                let (left, right) = {
                    let node = self.node(n);
                    (node.left, node.right)
                };
                return match (left, right) {
                    (None, None) => None,
                    (Some(child), None) | (None, Some(child)) => Some(child),
                    (Some(l), Some(r)) => {
                        let (new_right, successor) = self.detach_min(r);
                        let node = self.node_mut(successor);
                        node.left = Some(l);
                        node.right = new_right;
                        Some(self.rebalance(successor))
                    }
                };
            }
        }
        Some(self.rebalance(n))
    }

    /// Unlink the minimum of the subtree at `slot`.
    /// Returns the new subtree root and the detached slot.
    fn detach_min(&mut self, slot: usize) -> (Option<usize>, usize) {
        match self.node(slot).left {
            None => (self.node(slot).right, slot),
            Some(left) => {
                let (new_left, min) = self.detach_min(left);
                self.node_mut(slot).left = new_left;
                (Some(self.rebalance(slot)), min)
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn collect_overlapping(&self, at: Option<usize>, range: &KeyRange, out: &mut Vec<RecordHandle>) {
        let Some(n) = at else {
            return;
        };
        let cmp = self.cmp.as_ref();
        let node = self.node(n);

        // Nothing below reaches the query.
        if compare_bounds(self.high_of(node.max_high), range.low(), cmp) == Ordering::Less {
            return;
        }

        self.collect_overlapping(node.left, range, out);

        // This node and its right subtree start after the query ends.
        if compare_bounds(node.record.range.low(), range.high(), cmp) == Ordering::Greater {
            return;
        }
        if compare_bounds(node.record.range.high(), range.low(), cmp) != Ordering::Less {
            out.push(RecordHandle(n));
        }

        self.collect_overlapping(node.right, range, out);
    }

    fn collect_in_order<'a>(&'a self, at: Option<usize>, out: &mut Vec<(RecordHandle, &'a LockRecord)>) {
        let Some(n) = at else {
            return;
        };
        let node = self.node(n);
        self.collect_in_order(node.left, out);
        out.push((RecordHandle(n), &node.record));
        self.collect_in_order(node.right, out);
    }

    /// Returns (record count, height) of a verified subtree.
    fn check_subtree(&self, at: Option<usize>) -> Result<(usize, u32), IndexCorruption> {
        let Some(n) = at else {
            return Ok((0, 0));
        };
        let node = self.try_node(n)?;
        let (left_count, left_height) = self.check_subtree(node.left)?;
        let (right_count, right_height) = self.check_subtree(node.right)?;

        if let Some(l) = node.left {
            if self.order(l, n) != Ordering::Less {
                return Err(IndexCorruption(format!("slot {} out of order left of {}", l, n)));
            }
        }
        if let Some(r) = node.right {
            if self.order(r, n) != Ordering::Greater {
                return Err(IndexCorruption(format!("slot {} out of order right of {}", r, n)));
            }
        }

        let height = 1 + left_height.max(right_height);
        if node.height != height {
            return Err(IndexCorruption(format!(
                "slot {} records height {} but has {}",
                n, node.height, height
            )));
        }
        if left_height.abs_diff(right_height) > 1 {
            return Err(IndexCorruption(format!("slot {} is unbalanced", n)));
        }

        let mut expected = node.record.range.high();
        for child in [node.left, node.right].into_iter().flatten() {
            let child_max = self.try_node(self.node(child).max_high)?.record.range.high();
            if compare_bounds(child_max, expected, self.cmp.as_ref()) == Ordering::Greater {
                expected = child_max;
            }
        }
        let max_high = self.try_node(node.max_high)?.record.range.high();
        if compare_bounds(max_high, expected, self.cmp.as_ref())
            != Ordering::Equal
        {
            return Err(IndexCorruption(format!("slot {} has a stale max-high", n)));
        }

        Ok((1 + left_count + right_count, height))
    }
}
