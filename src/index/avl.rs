//! # Node Index
//!
//! Height-balanced (AVL) search tree over node ids, stored in an arena.
//! Tree links are slot indices into the arena rather than owning pointers,
//! so rotations are plain index reassignments and parent links never form
//! ownership cycles. Vacated slots are recycled through a free list.
//!
//! Every completed insert or delete leaves |height(left) - height(right)| <= 1
//! at every node. A violation is a bug in this module and aborts.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::{validate_load, NodeAttrs, NodeStatus};
use crate::error::{GridError, GridResult};

type Slot = usize;

#[derive(Debug, Clone)]
struct TreeNode {
    key: String,
    attrs: NodeAttrs,
    parent: Option<Slot>,
    left: Option<Slot>,
    right: Option<Slot>,
    height: i32,
}

/// Index statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub size: usize,
    pub height: i32,
    pub rotations: u64,
    pub is_balanced: bool,
}

/// A node whose utilization exceeded the queried threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverloadedNode {
    pub node_id: String,
    pub attrs: NodeAttrs,
    pub utilization: f64,
}

/// Ordered index of network nodes keyed by node id
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    arena: Vec<Option<TreeNode>>,
    free: Vec<Slot>,
    root: Option<Slot>,
    len: usize,
    rotations: u64,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total single rotations performed since creation (a double rotation counts twice)
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub fn height(&self) -> i32 {
        self.height_of(self.root)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Insert a new node. Existing keys are never overwritten.
    pub fn insert(&mut self, key: impl Into<String>, mut attrs: NodeAttrs) -> GridResult<()> {
        attrs.validate("insert")?;
        attrs.refresh_status();
        let key = key.into();

        let mut parent = None;
        let mut cursor = self.root;
        let mut go_left = false;
        while let Some(s) = cursor {
            let n = self.node(s);
            match key.as_str().cmp(n.key.as_str()) {
                Ordering::Less => {
                    go_left = true;
                    cursor = n.left;
                }
                Ordering::Greater => {
                    go_left = false;
                    cursor = n.right;
                }
                Ordering::Equal => {
                    return Err(GridError::DuplicateKey {
                        operation: "insert",
                        key,
                    })
                }
            }
            parent = Some(s);
        }

        let slot = self.alloc(TreeNode {
            key,
            attrs,
            parent,
            left: None,
            right: None,
            height: 1,
        });
        match parent {
            None => self.root = Some(slot),
            Some(p) if go_left => self.node_mut(p).left = Some(slot),
            Some(p) => self.node_mut(p).right = Some(slot),
        }
        self.len += 1;
        self.retrace(parent);
        debug_assert!(self.check_invariants(), "index invariant broken by insert");
        Ok(())
    }

    pub fn search(&self, key: &str) -> GridResult<&NodeAttrs> {
        self.get(key).ok_or_else(|| GridError::not_found("search", key))
    }

    pub fn get(&self, key: &str) -> Option<&NodeAttrs> {
        self.find(key).map(|s| &self.node(s).attrs)
    }

    /// Overwrite a node's load and recompute its status band. The key is
    /// unchanged, so no rebalancing takes place.
    pub fn update_load(&mut self, key: &str, new_load: f64) -> GridResult<&NodeAttrs> {
        let slot = self
            .find(key)
            .ok_or_else(|| GridError::not_found("update_load", key))?;
        validate_load("update_load", new_load)?;
        let attrs = &mut self.node_mut(slot).attrs;
        attrs.current_load = new_load;
        attrs.refresh_status();
        Ok(attrs)
    }

    /// Mark a node failed, or clear the failure and re-derive its status
    pub fn set_failed(&mut self, key: &str, failed: bool) -> GridResult<&NodeAttrs> {
        let slot = self
            .find(key)
            .ok_or_else(|| GridError::not_found("set_failed", key))?;
        let attrs = &mut self.node_mut(slot).attrs;
        if failed {
            attrs.status = NodeStatus::Failed;
        } else {
            attrs.status = NodeStatus::Active;
            attrs.refresh_status();
        }
        Ok(attrs)
    }

    /// Remove a node, promoting its in-order successor when it has two children
    pub fn delete(&mut self, key: &str) -> GridResult<NodeAttrs> {
        let target = self
            .find(key)
            .ok_or_else(|| GridError::not_found("delete", key))?;
        let (left, right) = {
            let n = self.node(target);
            (n.left, n.right)
        };

        let removed = match (left, right) {
            (Some(_), Some(r)) => {
                let succ = self.leftmost(r);
                let succ_parent = self.node(succ).parent;
                let succ_right = self.node(succ).right;
                self.replace_child(succ_parent, succ, succ_right);
                let succ_node = self.release(succ);

                let t = self.node_mut(target);
                t.key = succ_node.key;
                let removed = std::mem::replace(&mut t.attrs, succ_node.attrs);
                self.retrace(succ_parent);
                removed
            }
            _ => {
                let parent = self.node(target).parent;
                self.replace_child(parent, target, left.or(right));
                let removed = self.release(target).attrs;
                self.retrace(parent);
                removed
            }
        };
        self.len -= 1;
        debug_assert!(self.check_invariants(), "index invariant broken by delete");
        Ok(removed)
    }

    /// Lazy ascending traversal. Each call starts a fresh pass.
    pub fn in_order(&self) -> InOrder<'_> {
        InOrder {
            index: self,
            next: self.root.map(|r| self.leftmost(r)),
        }
    }

    pub fn iter(&self) -> InOrder<'_> {
        self.in_order()
    }

    /// Nodes whose utilization is strictly above `threshold`, ascending by key
    pub fn get_overloaded_nodes(&self, threshold: f64) -> Vec<OverloadedNode> {
        self.in_order()
            .filter(|(_, attrs)| attrs.utilization() > threshold)
            .map(|(key, attrs)| OverloadedNode {
                node_id: key.to_string(),
                attrs: attrs.clone(),
                utilization: attrs.utilization(),
            })
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            size: self.len,
            height: self.height(),
            rotations: self.rotations,
            is_balanced: self.check_invariants(),
        }
    }

    /// Full structural check: heights, balance factors, parent links and key order
    pub fn check_invariants(&self) -> bool {
        match self.root {
            None => self.len == 0,
            Some(r) => {
                self.node(r).parent.is_none()
                    && self.verify(r, None, None).is_some()
                    && self.in_order().count() == self.len
            }
        }
    }

    fn verify(&self, slot: Slot, low: Option<&str>, high: Option<&str>) -> Option<i32> {
        let n = self.node(slot);
        if low.is_some_and(|lo| n.key.as_str() <= lo) || high.is_some_and(|hi| n.key.as_str() >= hi)
        {
            return None;
        }
        let lh = self.verify_child(slot, n.left, low, Some(n.key.as_str()))?;
        let rh = self.verify_child(slot, n.right, Some(n.key.as_str()), high)?;
        let height = 1 + lh.max(rh);
        ((lh - rh).abs() <= 1 && height == n.height).then_some(height)
    }

    fn verify_child(
        &self,
        parent: Slot,
        child: Option<Slot>,
        low: Option<&str>,
        high: Option<&str>,
    ) -> Option<i32> {
        match child {
            None => Some(0),
            Some(c) if self.node(c).parent == Some(parent) => self.verify(c, low, high),
            Some(_) => None,
        }
    }

    fn find(&self, key: &str) -> Option<Slot> {
        let mut cursor = self.root;
        while let Some(s) = cursor {
            let n = self.node(s);
            cursor = match key.cmp(n.key.as_str()) {
                Ordering::Less => n.left,
                Ordering::Greater => n.right,
                Ordering::Equal => return Some(s),
            };
        }
        None
    }

    fn node(&self, slot: Slot) -> &TreeNode {
        self.arena[slot]
            .as_ref()
            .expect("index link points at a vacant arena slot")
    }

    fn node_mut(&mut self, slot: Slot) -> &mut TreeNode {
        self.arena[slot]
            .as_mut()
            .expect("index link points at a vacant arena slot")
    }

    fn alloc(&mut self, node: TreeNode) -> Slot {
        match self.free.pop() {
            Some(slot) => {
                self.arena[slot] = Some(node);
                slot
            }
            None => {
                self.arena.push(Some(node));
                self.arena.len() - 1
            }
        }
    }

    fn release(&mut self, slot: Slot) -> TreeNode {
        let node = self.arena[slot]
            .take()
            .expect("released an already vacant arena slot");
        self.free.push(slot);
        node
    }

    fn height_of(&self, slot: Option<Slot>) -> i32 {
        slot.map_or(0, |s| self.node(s).height)
    }

    fn balance_factor(&self, slot: Slot) -> i32 {
        let n = self.node(slot);
        self.height_of(n.left) - self.height_of(n.right)
    }

    fn update_height(&mut self, slot: Slot) {
        let (l, r) = {
            let n = self.node(slot);
            (n.left, n.right)
        };
        let h = 1 + self.height_of(l).max(self.height_of(r));
        self.node_mut(slot).height = h;
    }

    fn leftmost(&self, mut slot: Slot) -> Slot {
        while let Some(l) = self.node(slot).left {
            slot = l;
        }
        slot
    }

    /// Point `parent`'s link that referenced `old` at `new` (or the root when
    /// `parent` is None), and fix `new`'s parent link.
    fn replace_child(&mut self, parent: Option<Slot>, old: Slot, new: Option<Slot>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let pn = self.node_mut(p);
                if pn.left == Some(old) {
                    pn.left = new;
                } else {
                    debug_assert_eq!(pn.right, Some(old));
                    pn.right = new;
                }
            }
        }
        if let Some(n) = new {
            self.node_mut(n).parent = parent;
        }
    }

    fn rotate_left(&mut self, x: Slot) -> Slot {
        let y = self
            .node(x)
            .right
            .expect("left rotation requires a right child");
        let inner = self.node(y).left;
        let parent = self.node(x).parent;

        self.node_mut(x).right = inner;
        if let Some(t) = inner {
            self.node_mut(t).parent = Some(x);
        }
        self.replace_child(parent, x, Some(y));
        self.node_mut(y).left = Some(x);
        self.node_mut(x).parent = Some(y);

        self.update_height(x);
        self.update_height(y);
        self.rotations += 1;
        y
    }

    fn rotate_right(&mut self, x: Slot) -> Slot {
        let y = self
            .node(x)
            .left
            .expect("right rotation requires a left child");
        let inner = self.node(y).right;
        let parent = self.node(x).parent;

        self.node_mut(x).left = inner;
        if let Some(t) = inner {
            self.node_mut(t).parent = Some(x);
        }
        self.replace_child(parent, x, Some(y));
        self.node_mut(y).right = Some(x);
        self.node_mut(x).parent = Some(y);

        self.update_height(x);
        self.update_height(y);
        self.rotations += 1;
        y
    }

    /// Restore balance at `slot`; returns the root of the (possibly rotated) subtree
    fn rebalance(&mut self, slot: Slot) -> Slot {
        self.update_height(slot);
        let bf = self.balance_factor(slot);
        if bf > 1 {
            let left = self.node(slot).left.expect("left-heavy node has a left child");
            if self.balance_factor(left) < 0 {
                self.rotate_left(left);
            }
            self.rotate_right(slot)
        } else if bf < -1 {
            let right = self
                .node(slot)
                .right
                .expect("right-heavy node has a right child");
            if self.balance_factor(right) > 0 {
                self.rotate_right(right);
            }
            self.rotate_left(slot)
        } else {
            slot
        }
    }

    /// Walk from `start` to the root fixing heights and rotating where needed
    fn retrace(&mut self, start: Option<Slot>) {
        let mut cursor = start;
        while let Some(s) = cursor {
            let top = self.rebalance(s);
            cursor = self.node(top).parent;
        }
    }
}

/// Ascending (key, attrs) traversal following parent links; O(1) extra memory
pub struct InOrder<'a> {
    index: &'a NodeIndex,
    next: Option<Slot>,
}

impl<'a> Iterator for InOrder<'a> {
    type Item = (&'a str, &'a NodeAttrs);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let index = self.index;
        let n = index.node(current);

        self.next = match n.right {
            Some(r) => Some(index.leftmost(r)),
            None => {
                let mut child = current;
                let mut parent = n.parent;
                while let Some(p) = parent {
                    if index.node(p).left == Some(child) {
                        break;
                    }
                    child = p;
                    parent = index.node(p).parent;
                }
                parent
            }
        };
        Some((n.key.as_str(), &n.attrs))
    }
}

impl<'a> IntoIterator for &'a NodeIndex {
    type Item = (&'a str, &'a NodeAttrs);
    type IntoIter = InOrder<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.in_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeType;
    use proptest::prelude::*;

    fn attrs(capacity: f64, load: f64) -> NodeAttrs {
        NodeAttrs::new(NodeType::Consumer, capacity).with_load(load)
    }

    fn keys(index: &NodeIndex) -> Vec<String> {
        index.in_order().map(|(k, _)| k.to_string()).collect()
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = NodeIndex::new();
        index.insert("CONS_1", attrs(100.0, 10.0)).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.search("CONS_1").unwrap().current_load, 10.0);
        assert!(matches!(
            index.search("CONS_2"),
            Err(GridError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut index = NodeIndex::new();
        index.insert("A", attrs(100.0, 10.0)).unwrap();
        let err = index.insert("A", attrs(100.0, 99.0)).unwrap_err();
        assert!(matches!(err, GridError::DuplicateKey { .. }));
        assert_eq!(index.search("A").unwrap().current_load, 10.0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_single_rotations() {
        // Left-left case
        let mut index = NodeIndex::new();
        for k in ["c", "b", "a"] {
            index.insert(k, attrs(1.0, 0.0)).unwrap();
        }
        assert_eq!(index.rotations(), 1);
        assert_eq!(index.height(), 2);

        // Right-right case
        let mut index = NodeIndex::new();
        for k in ["a", "b", "c"] {
            index.insert(k, attrs(1.0, 0.0)).unwrap();
        }
        assert_eq!(index.rotations(), 1);
        assert!(index.stats().is_balanced);
    }

    #[test]
    fn test_double_rotations() {
        // Left-right case
        let mut index = NodeIndex::new();
        for k in ["c", "a", "b"] {
            index.insert(k, attrs(1.0, 0.0)).unwrap();
        }
        assert_eq!(index.rotations(), 2);
        assert_eq!(keys(&index), vec!["a", "b", "c"]);

        // Right-left case
        let mut index = NodeIndex::new();
        for k in ["a", "c", "b"] {
            index.insert(k, attrs(1.0, 0.0)).unwrap();
        }
        assert_eq!(index.rotations(), 2);
        assert_eq!(index.height(), 2);
    }

    #[test]
    fn test_delete_node_with_two_children() {
        let mut index = NodeIndex::new();
        for k in ["50", "30", "70", "20", "40", "60", "80"] {
            index.insert(k, attrs(100.0, k.parse().unwrap())).unwrap();
        }
        let removed = index.delete("50").unwrap();
        assert_eq!(removed.current_load, 50.0);
        assert!(matches!(index.search("50"), Err(GridError::NotFound { .. })));
        assert_eq!(index.search("60").unwrap().current_load, 60.0);
        assert_eq!(keys(&index), vec!["20", "30", "40", "60", "70", "80"]);
        assert!(index.check_invariants());
    }

    #[test]
    fn test_delete_rebalances_and_reuses_slots() {
        let mut index = NodeIndex::new();
        for i in 0..32 {
            index.insert(format!("N{i:02}"), attrs(10.0, 1.0)).unwrap();
        }
        for i in 0..24 {
            index.delete(&format!("N{i:02}")).unwrap();
            assert!(index.check_invariants());
        }
        assert_eq!(index.len(), 8);
        index.insert("N00", attrs(10.0, 1.0)).unwrap();
        assert_eq!(index.arena.len(), 32);
        assert!(matches!(index.delete("missing"), Err(GridError::NotFound { .. })));
    }

    #[test]
    fn test_update_load_recomputes_status() {
        let mut index = NodeIndex::new();
        index.insert("T", attrs(1000.0, 100.0)).unwrap();
        let rotations = index.rotations();

        assert_eq!(index.update_load("T", 800.0).unwrap().status, NodeStatus::Warning);
        assert_eq!(index.update_load("T", 950.0).unwrap().status, NodeStatus::Overloaded);
        assert_eq!(index.update_load("T", 700.0).unwrap().status, NodeStatus::Active);
        assert_eq!(index.rotations(), rotations);

        assert!(matches!(
            index.update_load("T", -1.0),
            Err(GridError::Validation { .. })
        ));
        assert!(matches!(
            index.update_load("nope", 1.0),
            Err(GridError::NotFound { .. })
        ));
        assert_eq!(index.search("T").unwrap().current_load, 700.0);
    }

    #[test]
    fn test_failed_flag_survives_load_updates() {
        let mut index = NodeIndex::new();
        index.insert("S", attrs(100.0, 10.0)).unwrap();
        index.set_failed("S", true).unwrap();
        index.update_load("S", 95.0).unwrap();
        assert_eq!(index.search("S").unwrap().status, NodeStatus::Failed);
        assert_eq!(
            index.set_failed("S", false).unwrap().status,
            NodeStatus::Overloaded
        );
    }

    #[test]
    fn test_in_order_is_restartable() {
        let mut index = NodeIndex::new();
        for k in ["d", "b", "f", "a", "c", "e", "g"] {
            index.insert(k, attrs(1.0, 0.0)).unwrap();
        }
        let mut first = index.in_order();
        assert_eq!(first.next().map(|(k, _)| k), Some("a"));
        assert_eq!(first.next().map(|(k, _)| k), Some("b"));
        assert_eq!(keys(&index), vec!["a", "b", "c", "d", "e", "f", "g"]);
        assert_eq!((&index).into_iter().count(), 7);
        assert_eq!(NodeIndex::new().in_order().count(), 0);
    }

    #[test]
    fn test_get_overloaded_nodes() {
        let mut index = NodeIndex::new();
        index.insert("B", attrs(100.0, 95.0)).unwrap();
        index.insert("A", attrs(100.0, 91.0)).unwrap();
        index.insert("C", attrs(100.0, 90.0)).unwrap();
        index.insert("D", attrs(100.0, 20.0)).unwrap();

        let overloaded = index.get_overloaded_nodes(0.9);
        let ids: Vec<_> = overloaded.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!((overloaded[1].utilization - 0.95).abs() < 1e-9);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u16),
        Delete(u16),
    }

    fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
        proptest::collection::vec(
            prop_oneof![
                (0u16..200).prop_map(Op::Insert),
                (0u16..200).prop_map(Op::Delete),
            ],
            1..300,
        )
    }

    proptest! {
        #[test]
        fn prop_balanced_and_sorted_after_every_op(ops in arb_ops()) {
            let mut index = NodeIndex::new();
            let mut model = std::collections::BTreeSet::new();
            for op in ops {
                match op {
                    Op::Insert(k) => {
                        let key = format!("N{k:03}");
                        let result = index.insert(key.clone(), attrs(10.0, 1.0));
                        prop_assert_eq!(result.is_ok(), model.insert(key));
                    }
                    Op::Delete(k) => {
                        let key = format!("N{k:03}");
                        let result = index.delete(&key);
                        prop_assert_eq!(result.is_ok(), model.remove(&key));
                    }
                }
                prop_assert!(index.check_invariants());
                let listed = keys(&index);
                prop_assert!(listed.windows(2).all(|w| w[0] < w[1]));
                prop_assert_eq!(listed, model.iter().cloned().collect::<Vec<_>>());
            }
        }

        #[test]
        fn prop_height_is_logarithmic(n in 1usize..512) {
            let mut index = NodeIndex::new();
            for i in 0..n {
                index.insert(format!("K{i:04}"), attrs(1.0, 0.0)).unwrap();
            }
            let bound = 1.45 * ((n + 2) as f64).log2();
            prop_assert!((index.height() as f64) <= bound);
        }
    }
}
