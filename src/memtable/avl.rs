//! AVL tree of records
//!
//! Each node owns its children (`Option<Box<Node>>`), so rotations are plain
//! moves of boxes and no node is ever reachable from two places. Records are
//! ordered by key; inserting an existing key replaces the stored record.

use std::cmp::Ordering;

use crate::record::Record;

type Link = Option<Box<Node>>;

struct Node {
    record: Record,
    height: u32,
    left: Link,
    right: Link,
}

impl Node {
    fn leaf(record: Record) -> Box<Self> {
        Box::new(Self {
            record,
            height: 1,
            left: None,
            right: None,
        })
    }

    fn key(&self) -> &[u8] {
        self.record.key()
    }

    fn update_height(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
    }

    /// h(left) - h(right)
    fn balance_factor(&self) -> i64 {
        height(&self.left) as i64 - height(&self.right) as i64
    }
}

fn height(link: &Link) -> u32 {
    link.as_ref().map_or(0, |node| node.height)
}

/// Self-balancing ordered map from key to record
#[derive(Default)]
pub struct AvlTree {
    root: Link,
    len: usize,
}

impl AvlTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Height of the tree (0 when empty)
    pub fn height(&self) -> u32 {
        height(&self.root)
    }

    /// Insert a record, returning the one it replaced (if the key existed)
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        let (root, replaced) = insert(self.root.take(), record);
        self.root = Some(root);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    pub fn search(&self, key: &[u8]) -> Option<&Record> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match key.cmp(node.key()) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.record),
            };
        }
        None
    }

    /// Flag the record under `key` as a tombstone in place
    ///
    /// The node stays in the tree so the deletion can shadow older versions
    /// on disk. Returns false when the key is absent.
    pub fn mark_deleted(&mut self, key: &[u8]) -> bool {
        let mut current = self.root.as_deref_mut();
        while let Some(node) = current {
            current = match key.cmp(node.key()) {
                Ordering::Less => node.left.as_deref_mut(),
                Ordering::Greater => node.right.as_deref_mut(),
                Ordering::Equal => {
                    node.record.set_deleted(true);
                    return true;
                }
            };
        }
        false
    }

    /// Remove and return the record with the largest key
    pub fn pop_max(&mut self) -> Option<Record> {
        let root = self.root.take()?;
        let (rest, max) = remove_max(root);
        self.root = rest;
        self.len -= 1;
        Some(max)
    }

    pub fn first(&self) -> Option<&Record> {
        let mut node = self.root.as_deref()?;
        while let Some(left) = node.left.as_deref() {
            node = left;
        }
        Some(&node.record)
    }

    pub fn last(&self) -> Option<&Record> {
        let mut node = self.root.as_deref()?;
        while let Some(right) = node.right.as_deref() {
            node = right;
        }
        Some(&node.record)
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// In-order (ascending) traversal
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left_spine(self.root.as_deref());
        iter
    }

    /// Ascending traversal starting at the first key `>= key`
    pub fn iter_from(&self, key: &[u8]) -> Iter<'_> {
        let mut stack = Vec::new();
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            if node.key() >= key {
                stack.push(node);
                current = node.left.as_deref();
            } else {
                current = node.right.as_deref();
            }
        }
        Iter { stack }
    }

    /// Descending traversal
    pub fn iter_rev(&self) -> RevIter<'_> {
        let mut iter = RevIter { stack: Vec::new() };
        iter.push_right_spine(self.root.as_deref());
        iter
    }

    /// Descending traversal starting at the last key `<= key`
    pub fn iter_rev_from(&self, key: &[u8]) -> RevIter<'_> {
        let mut stack = Vec::new();
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            if node.key() <= key {
                stack.push(node);
                current = node.right.as_deref();
            } else {
                current = node.left.as_deref();
            }
        }
        RevIter { stack }
    }

    /// Check ordering and the AVL balance condition at every node
    pub fn is_balanced(&self) -> bool {
        fn check(link: &Link, lower: Option<&[u8]>, upper: Option<&[u8]>) -> Option<u32> {
            let Some(node) = link else {
                return Some(0);
            };
            if lower.is_some_and(|l| node.key() <= l) || upper.is_some_and(|u| node.key() >= u) {
                return None;
            }
            let left = check(&node.left, lower, Some(node.key()))?;
            let right = check(&node.right, Some(node.key()), upper)?;
            if left.abs_diff(right) > 1 || node.height != 1 + left.max(right) {
                return None;
            }
            Some(node.height)
        }
        check(&self.root, None, None).is_some()
    }
}

// =============================================================================
// Structural operations
// =============================================================================

fn insert(link: Link, record: Record) -> (Box<Node>, Option<Record>) {
    let Some(mut node) = link else {
        return (Node::leaf(record), None);
    };

    let replaced = match record.key().as_ref().cmp(node.key()) {
        Ordering::Less => {
            let (child, replaced) = insert(node.left.take(), record);
            node.left = Some(child);
            replaced
        }
        Ordering::Greater => {
            let (child, replaced) = insert(node.right.take(), record);
            node.right = Some(child);
            replaced
        }
        Ordering::Equal => {
            // same key: shape is unchanged
            let old = std::mem::replace(&mut node.record, record);
            return (node, Some(old));
        }
    };

    (rebalance(node), replaced)
}

fn remove_max(mut node: Box<Node>) -> (Link, Record) {
    match node.right.take() {
        None => {
            let Node { record, left, .. } = *node;
            (left, record)
        }
        Some(right) => {
            let (rest, max) = remove_max(right);
            node.right = rest;
            (Some(rebalance(node)), max)
        }
    }
}

fn rebalance(mut node: Box<Node>) -> Box<Node> {
    node.update_height();
    let balance = node.balance_factor();

    if balance > 1 {
        // left heavy: LR first turns into LL
        if let Some(left) = node.left.take() {
            node.left = Some(if left.balance_factor() < 0 {
                rotate_left(left)
            } else {
                left
            });
        }
        return rotate_right(node);
    }

    if balance < -1 {
        // right heavy: RL first turns into RR
        if let Some(right) = node.right.take() {
            node.right = Some(if right.balance_factor() > 0 {
                rotate_right(right)
            } else {
                right
            });
        }
        return rotate_left(node);
    }

    node
}

fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    node.update_height();
    pivot.right = Some(node);
    pivot.update_height();
    pivot
}

fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    node.update_height();
    pivot.left = Some(node);
    pivot.update_height();
    pivot
}

// =============================================================================
// Iterators
// =============================================================================

/// Ascending iterator over records
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iter<'a> {
    fn push_left_spine(&mut self, mut current: Option<&'a Node>) {
        while let Some(node) = current {
            self.stack.push(node);
            current = node.left.as_deref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left_spine(node.right.as_deref());
        Some(&node.record)
    }
}

/// Descending iterator over records
pub struct RevIter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> RevIter<'a> {
    fn push_right_spine(&mut self, mut current: Option<&'a Node>) {
        while let Some(node) = current {
            self.stack.push(node);
            current = node.right.as_deref();
        }
    }
}

impl<'a> Iterator for RevIter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_right_spine(node.left.as_deref());
        Some(&node.record)
    }
}
