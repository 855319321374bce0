//! Persistent B+tree keyed by entry refs.
//!
//! Nodes are shared through `Arc`. Mutation goes through `Arc::make_mut`, so a node is
//! copied only when a frozen snapshot still references it. Freezing the tree is a clone
//! of the root pointer, and readers of a snapshot never observe a half-written node.

use std::sync::Arc;
use crate::core::stats::MemoryUsage;
use crate::datastore::entry_ref::EntryRef;

pub const LEAF_SLOTS: usize = 16;
pub const INTERNAL_SLOTS: usize = 16;
const LEAF_MIN: usize = LEAF_SLOTS / 2;
const INTERNAL_MIN: usize = INTERNAL_SLOTS / 2;

#[derive(Clone, Debug)]
struct LeafNode {
    keys: Vec<EntryRef>,
    data: Vec<EntryRef>,
}

/// `keys[i]` is the largest key below `children[i]`.
#[derive(Clone, Debug)]
struct InternalNode {
    keys: Vec<EntryRef>,
    children: Vec<Arc<Node>>,
}

#[derive(Clone, Debug)]
enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    fn len(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Internal(inner) => inner.children.len(),
        }
    }

    fn max_key(&self) -> EntryRef {
        match self {
            Node::Leaf(leaf) => leaf.keys.last().copied().unwrap_or_default(),
            Node::Internal(inner) => inner.keys.last().copied().unwrap_or_default(),
        }
    }

    fn is_underfull(&self) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.keys.len() < LEAF_MIN,
            Node::Internal(inner) => inner.children.len() < INTERNAL_MIN,
        }
    }

    fn capacity(&self) -> usize {
        match self {
            Node::Leaf(_) => LEAF_SLOTS,
            Node::Internal(_) => INTERNAL_SLOTS,
        }
    }
}

type Before<'a> = &'a dyn Fn(EntryRef) -> bool;

/// B+tree of `(key, data)` pairs ordered by an external comparator.
///
/// Every positional operation takes an `is_before` predicate that answers "does this
/// key sort before the target". Cloning the tree is O(1) and yields a snapshot.
#[derive(Clone, Debug, Default)]
pub struct BTree {
    root: Option<Arc<Node>>,
    len: usize,
}

impl BTree {
    pub fn new() -> Self {
        BTree::default()
    }

    /// Bulk-build from entries already in key order; every node is filled.
    pub fn from_sorted(entries: &[(EntryRef, EntryRef)]) -> Self {
        if entries.is_empty() {
            return BTree::new();
        }
        let mut level: Vec<Arc<Node>> = entries
            .chunks(LEAF_SLOTS)
            .map(|chunk| {
                Arc::new(Node::Leaf(LeafNode {
                    keys: chunk.iter().map(|(k, _)| *k).collect(),
                    data: chunk.iter().map(|(_, d)| *d).collect(),
                }))
            })
            .collect();
        while level.len() > 1 {
            level = level
                .chunks(INTERNAL_SLOTS)
                .map(|chunk| {
                    Arc::new(Node::Internal(InternalNode {
                        keys: chunk.iter().map(|child| child.max_key()).collect(),
                        children: chunk.to_vec(),
                    }))
                })
                .collect();
        }
        BTree {
            root: level.pop(),
            len: entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First entry whose key does not sort before the target.
    pub fn lower_bound(&self, is_before: Before<'_>) -> Option<(EntryRef, EntryRef)> {
        self.iter_from(is_before).next()
    }

    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter { stack: Vec::new() };
        if let Some(root) = &self.root {
            iter.descend_leftmost(root);
        }
        iter
    }

    pub fn iter_from(&self, is_before: Before<'_>) -> Iter<'_> {
        let mut iter = Iter { stack: Vec::new() };
        let mut node = match &self.root {
            Some(root) => root.as_ref(),
            None => return iter,
        };
        loop {
            match node {
                Node::Internal(inner) => {
                    let i = inner.keys.partition_point(|&k| is_before(k));
                    if i == inner.children.len() {
                        iter.stack.clear();
                        return iter;
                    }
                    iter.stack.push((node, i));
                    node = inner.children[i].as_ref();
                }
                Node::Leaf(leaf) => {
                    let j = leaf.keys.partition_point(|&k| is_before(k));
                    iter.stack.push((node, j));
                    return iter;
                }
            }
        }
    }

    /// Insert a key at its sorted position. The caller guarantees it is not present.
    pub fn insert(&mut self, key: EntryRef, data: EntryRef, is_before: Before<'_>) {
        match &mut self.root {
            None => {
                self.root = Some(Arc::new(Node::Leaf(LeafNode {
                    keys: vec![key],
                    data: vec![data],
                })));
            }
            Some(root) => {
                if let Some(right) = insert_rec(root, key, data, is_before) {
                    let left = Arc::clone(root);
                    *root = Arc::new(Node::Internal(InternalNode {
                        keys: vec![left.max_key(), right.max_key()],
                        children: vec![left, right],
                    }));
                }
            }
        }
        self.len += 1;
    }

    /// Remove the exact key (by ref identity). Returns its data if present.
    pub fn remove(&mut self, key: EntryRef, is_before: Before<'_>) -> Option<EntryRef> {
        let root = self.root.as_mut()?;
        let removed = remove_rec(root, key, is_before)?;
        self.len -= 1;
        loop {
            let next = match self.root.as_deref() {
                Some(Node::Internal(inner)) if inner.children.len() == 1 => Some(Some(Arc::clone(&inner.children[0]))),
                Some(node) if node.len() == 0 => Some(None),
                _ => None,
            };
            match next {
                Some(root) => self.root = root,
                None => break,
            }
        }
        Some(removed)
    }

    /// Replace the data of the exact key. Returns false if the key is absent.
    pub fn update_data(&mut self, key: EntryRef, is_before: Before<'_>, f: &mut dyn FnMut(EntryRef) -> EntryRef) -> bool {
        match self.root.as_mut() {
            Some(root) => update_rec(root, key, is_before, f),
            None => false,
        }
    }

    /// Visit every entry in order; a returned pair replaces the entry's key and data.
    /// Only the paths leading to changed leaves are copied.
    pub fn rewrite(&mut self, f: &mut dyn FnMut(EntryRef, EntryRef) -> Option<(EntryRef, EntryRef)>) -> bool {
        match self.root.as_mut() {
            Some(root) => rewrite_rec(root, f),
            None => false,
        }
    }

    pub fn node_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 1,
                Node::Internal(inner) => 1 + inner.children.iter().map(|c| count(c)).sum::<usize>(),
            }
        }
        self.root.as_deref().map(count).unwrap_or(0)
    }

    /// Slots below half fill count as dead; a repack via `from_sorted` recovers them.
    pub fn memory_usage(&self) -> MemoryUsage {
        fn visit(node: &Node, is_root: bool, usage: &mut MemoryUsage) {
            let slot_bytes = 2 * std::mem::size_of::<EntryRef>();
            let capacity = node.capacity();
            usage.allocated_bytes += capacity * slot_bytes;
            usage.used_bytes += node.len() * slot_bytes;
            if !is_root {
                usage.dead_bytes += (capacity / 2).saturating_sub(node.len()) * slot_bytes;
            }
            if let Node::Internal(inner) = node {
                for child in &inner.children {
                    visit(child, false, usage);
                }
            }
        }
        let mut usage = MemoryUsage::default();
        if let Some(root) = self.root.as_deref() {
            visit(root, true, &mut usage);
        }
        usage
    }

    pub fn compacted(&self) -> BTree {
        let entries: Vec<(EntryRef, EntryRef)> = self.iter().collect();
        BTree::from_sorted(&entries)
    }

    /// Structural check used by tests: sorted keys, separator keys equal child maxima.
    pub fn check_invariants(&self, is_less: &dyn Fn(EntryRef, EntryRef) -> bool) -> bool {
        fn check(node: &Node, is_less: &dyn Fn(EntryRef, EntryRef) -> bool) -> bool {
            match node {
                Node::Leaf(leaf) => {
                    leaf.keys.len() == leaf.data.len()
                        && leaf.keys.windows(2).all(|w| is_less(w[0], w[1]))
                }
                Node::Internal(inner) => {
                    inner.keys.len() == inner.children.len()
                        && inner.children.iter().zip(inner.keys.iter()).all(|(c, k)| c.max_key() == *k && c.len() > 0)
                        && inner.keys.windows(2).all(|w| is_less(w[0], w[1]))
                        && inner.children.iter().all(|c| check(c, is_less))
                }
            }
        }
        let counted = self.iter().count();
        counted == self.len && self.root.as_deref().map(|r| check(r, is_less)).unwrap_or(true)
    }
}

fn insert_rec(node: &mut Arc<Node>, key: EntryRef, data: EntryRef, is_before: Before<'_>) -> Option<Arc<Node>> {
    match Arc::make_mut(node) {
        Node::Leaf(leaf) => {
            let pos = leaf.keys.partition_point(|&k| is_before(k));
            leaf.keys.insert(pos, key);
            leaf.data.insert(pos, data);
            if leaf.keys.len() > LEAF_SLOTS {
                let mid = leaf.keys.len() / 2;
                let right = LeafNode {
                    keys: leaf.keys.split_off(mid),
                    data: leaf.data.split_off(mid),
                };
                return Some(Arc::new(Node::Leaf(right)));
            }
            None
        }
        Node::Internal(inner) => {
            let mut i = inner.keys.partition_point(|&k| is_before(k));
            if i == inner.children.len() {
                i -= 1;
            }
            let split = insert_rec(&mut inner.children[i], key, data, is_before);
            inner.keys[i] = inner.children[i].max_key();
            if let Some(right) = split {
                inner.keys.insert(i + 1, right.max_key());
                inner.children.insert(i + 1, right);
            }
            if inner.children.len() > INTERNAL_SLOTS {
                let mid = inner.children.len() / 2;
                let right = InternalNode {
                    keys: inner.keys.split_off(mid),
                    children: inner.children.split_off(mid),
                };
                return Some(Arc::new(Node::Internal(right)));
            }
            None
        }
    }
}

fn remove_rec(node: &mut Arc<Node>, key: EntryRef, is_before: Before<'_>) -> Option<EntryRef> {
    match Arc::make_mut(node) {
        Node::Leaf(leaf) => {
            let pos = leaf.keys.partition_point(|&k| is_before(k));
            if pos >= leaf.keys.len() || leaf.keys[pos] != key {
                return None;
            }
            leaf.keys.remove(pos);
            Some(leaf.data.remove(pos))
        }
        Node::Internal(inner) => {
            let i = inner.keys.partition_point(|&k| is_before(k));
            if i == inner.children.len() {
                return None;
            }
            let removed = remove_rec(&mut inner.children[i], key, is_before)?;
            if inner.children[i].len() == 0 {
                inner.children.remove(i);
                inner.keys.remove(i);
            } else {
                inner.keys[i] = inner.children[i].max_key();
                if inner.children[i].is_underfull() {
                    merge_with_neighbour(inner, i);
                }
            }
            Some(removed)
        }
    }
}

fn merge_with_neighbour(inner: &mut InternalNode, i: usize) {
    let n = inner.children.len();
    let j = if i + 1 < n {
        i + 1
    } else if i > 0 {
        i - 1
    } else {
        return;
    };
    let (l, r) = (i.min(j), i.max(j));
    let merged = match (inner.children[l].as_ref(), inner.children[r].as_ref()) {
        (Node::Leaf(a), Node::Leaf(b)) if a.keys.len() + b.keys.len() <= LEAF_SLOTS => {
            let mut leaf = a.clone();
            leaf.keys.extend_from_slice(&b.keys);
            leaf.data.extend_from_slice(&b.data);
            Node::Leaf(leaf)
        }
        (Node::Internal(a), Node::Internal(b)) if a.children.len() + b.children.len() <= INTERNAL_SLOTS => {
            let mut node = a.clone();
            node.keys.extend_from_slice(&b.keys);
            node.children.extend(b.children.iter().cloned());
            Node::Internal(node)
        }
        _ => return,
    };
    let merged = Arc::new(merged);
    inner.keys[l] = merged.max_key();
    inner.children[l] = merged;
    inner.keys.remove(r);
    inner.children.remove(r);
}

fn update_rec(node: &mut Arc<Node>, key: EntryRef, is_before: Before<'_>, f: &mut dyn FnMut(EntryRef) -> EntryRef) -> bool {
    match Arc::make_mut(node) {
        Node::Leaf(leaf) => {
            let pos = leaf.keys.partition_point(|&k| is_before(k));
            if pos >= leaf.keys.len() || leaf.keys[pos] != key {
                return false;
            }
            leaf.data[pos] = f(leaf.data[pos]);
            true
        }
        Node::Internal(inner) => {
            let i = inner.keys.partition_point(|&k| is_before(k));
            if i == inner.children.len() {
                return false;
            }
            update_rec(&mut inner.children[i], key, is_before, f)
        }
    }
}

fn rewrite_rec(node: &mut Arc<Node>, f: &mut dyn FnMut(EntryRef, EntryRef) -> Option<(EntryRef, EntryRef)>) -> bool {
    match node.as_ref() {
        Node::Leaf(leaf) => {
            let changes: Vec<(usize, EntryRef, EntryRef)> = leaf
                .keys
                .iter()
                .zip(leaf.data.iter())
                .enumerate()
                .filter_map(|(pos, (&k, &d))| match f(k, d) {
                    Some((nk, nd)) if nk != k || nd != d => Some((pos, nk, nd)),
                    _ => None,
                })
                .collect();
            if changes.is_empty() {
                return false;
            }
            let Node::Leaf(leaf) = Arc::make_mut(node) else { unreachable!() };
            for (pos, key, data) in changes {
                leaf.keys[pos] = key;
                leaf.data[pos] = data;
            }
            true
        }
        Node::Internal(inner) => {
            let mut changed: Vec<(usize, Arc<Node>)> = Vec::new();
            for (i, child) in inner.children.iter().enumerate() {
                let mut child = Arc::clone(child);
                if rewrite_rec(&mut child, f) {
                    changed.push((i, child));
                }
            }
            if changed.is_empty() {
                return false;
            }
            let Node::Internal(inner) = Arc::make_mut(node) else { unreachable!() };
            for (i, child) in changed {
                inner.keys[i] = child.max_key();
                inner.children[i] = child;
            }
            true
        }
    }
}

/// In-order iterator over `(key, data)`.
pub struct Iter<'a> {
    stack: Vec<(&'a Node, usize)>,
}

impl<'a> Iter<'a> {
    fn descend_leftmost(&mut self, mut node: &'a Node) {
        loop {
            self.stack.push((node, 0));
            match node {
                Node::Internal(inner) => node = inner.children[0].as_ref(),
                Node::Leaf(_) => return,
            }
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (EntryRef, EntryRef);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, idx) = self.stack.last_mut()?;
            let node: &'a Node = *node;
            let Node::Leaf(leaf) = node else {
                self.stack.pop();
                continue;
            };
            if *idx < leaf.keys.len() {
                let item = (leaf.keys[*idx], leaf.data[*idx]);
                *idx += 1;
                return Some(item);
            }
            self.stack.pop();
            self.advance_parent();
        }
    }
}

impl<'a> Iter<'a> {
    fn advance_parent(&mut self) {
        while let Some((node, idx)) = self.stack.last_mut() {
            let node: &'a Node = *node;
            let Node::Internal(inner) = node else { return };
            *idx += 1;
            let next = *idx;
            if next < inner.children.len() {
                self.descend_leftmost(inner.children[next].as_ref());
                return;
            }
            self.stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(v: u32) -> EntryRef {
        EntryRef::from_raw(v)
    }

    fn insert(tree: &mut BTree, v: u32) {
        tree.insert(r(v), r(v * 10), &|k| k.raw() < v);
    }

    fn keys(tree: &BTree) -> Vec<u32> {
        tree.iter().map(|(k, _)| k.raw()).collect()
    }

    #[test]
    fn insert_keeps_order_across_splits() {
        let mut tree = BTree::new();
        let mut values: Vec<u32> = (1..500).map(|i| (i * 7919) % 1009 + 1).collect();
        values.sort_unstable();
        values.dedup();
        let mut shuffled = values.clone();
        shuffled.reverse();
        shuffled.rotate_left(37);
        for &v in &shuffled {
            insert(&mut tree, v);
        }
        assert_eq!(keys(&tree), values);
        assert!(tree.check_invariants(&|a, b| a.raw() < b.raw()));
        assert!(tree.node_count() > 1);
    }

    #[test]
    fn lower_bound_finds_first_not_before() {
        let mut tree = BTree::new();
        for v in [10, 20, 30, 40] {
            insert(&mut tree, v);
        }
        assert_eq!(tree.lower_bound(&|k| k.raw() < 25), Some((r(30), r(300))));
        assert_eq!(tree.lower_bound(&|k| k.raw() < 40), Some((r(40), r(400))));
        assert_eq!(tree.lower_bound(&|k| k.raw() < 41), None);
        let from: Vec<u32> = tree.iter_from(&|k| k.raw() < 15).map(|(k, _)| k.raw()).collect();
        assert_eq!(from, vec![20, 30, 40]);
    }

    #[test]
    fn remove_merges_and_collapses() {
        let mut tree = BTree::new();
        for v in 1..=300 {
            insert(&mut tree, v);
        }
        for v in (1..=300).filter(|v| v % 3 != 0) {
            assert_eq!(tree.remove(r(v), &|k| k.raw() < v), Some(r(v * 10)));
        }
        assert_eq!(tree.len(), 100);
        assert!(tree.check_invariants(&|a, b| a.raw() < b.raw()));
        assert_eq!(tree.remove(r(1), &|k| k.raw() < 1), None);
        for v in (1..=300).filter(|v| v % 3 == 0) {
            tree.remove(r(v), &|k| k.raw() < v);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_writes() {
        let mut tree = BTree::new();
        for v in 1..=100 {
            insert(&mut tree, v);
        }
        let frozen = tree.clone();
        for v in 101..=150 {
            insert(&mut tree, v);
        }
        tree.remove(r(50), &|k| k.raw() < 50);
        tree.update_data(r(60), &|k| k.raw() < 60, &mut |_| r(1));
        assert_eq!(frozen.len(), 100);
        assert_eq!(keys(&frozen), (1..=100).collect::<Vec<_>>());
        assert_eq!(frozen.lower_bound(&|k| k.raw() < 60), Some((r(60), r(600))));
        assert_eq!(tree.lower_bound(&|k| k.raw() < 60), Some((r(60), r(1))));
    }

    #[test]
    fn rewrite_changes_keys_and_separators() {
        let mut tree = BTree::new();
        for v in 1..=64 {
            insert(&mut tree, v * 2);
        }
        let frozen = tree.clone();
        tree.rewrite(&mut |k, d| (k.raw() % 8 == 0).then(|| (r(k.raw() + 1), d)));
        assert!(tree.check_invariants(&|a, b| a.raw() < b.raw()));
        assert!(tree.iter().any(|(k, _)| k.raw() == 9));
        assert!(frozen.iter().all(|(k, _)| k.raw() % 2 == 0));
    }

    #[test]
    fn from_sorted_matches_iteration() {
        let entries: Vec<(EntryRef, EntryRef)> = (1..=1000).map(|v| (r(v), r(v))).collect();
        let tree = BTree::from_sorted(&entries);
        assert_eq!(tree.len(), 1000);
        assert!(tree.check_invariants(&|a, b| a.raw() < b.raw()));
        assert_eq!(tree.iter().collect::<Vec<_>>(), entries);
        assert_eq!(tree.memory_usage().dead_bytes, 0);
    }
}
