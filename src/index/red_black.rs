//! Color-balanced binary search tree.
//!
//! Nodes live in an arena and refer to each other through [`NodeId`]s.
//! [`NodeId::NIL`] is the shared sentinel: it reads as a black node with no
//! links and every write aimed at it is dropped, so fixup code can inspect a
//! missing child's color without special cases while the sentinel itself is
//! never mutated.
//!
//! Every node whose links or color change during an operation is remembered.
//! Once the structure has settled, digests are recomputed from each of those
//! nodes up to the root and all recomputed nodes are materialized.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use log::{debug, trace};

use crate::error::GitLiteResult;
use crate::index::{apply_update, corrupted, Capabilities, IndexKind, OrderedIndex, Row};
use crate::storage::{NodeRecord, RecordSink, RecordWriter};
use crate::utils::hash::{leaf_digest, node_digest, Digest, EMPTY_DIGEST};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct NodeId(usize);

impl NodeId {
    const NIL: NodeId = NodeId(usize::MAX);

    fn is_nil(self) -> bool {
        self == NodeId::NIL
    }
}

#[derive(Debug, Clone)]
struct RbNode {
    key: String,
    row: Row,
    digest: Digest,
    color: Color,
    left: NodeId,
    right: NodeId,
    parent: NodeId,
}

#[derive(Debug, Clone)]
pub struct RedBlackIndex {
    nodes: Vec<RbNode>,
    free: Vec<NodeId>,
    root: NodeId,
    len: usize,
    touched: BTreeSet<NodeId>,
    persistence_failures: usize,
}

impl Default for RedBlackIndex {
    fn default() -> Self {
        Self {
            nodes: vec![],
            free: vec![],
            root: NodeId::NIL,
            len: 0,
            touched: BTreeSet::new(),
            persistence_failures: 0,
        }
    }
}

impl RedBlackIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_key(&self) -> Option<&str> {
        (!self.root.is_nil()).then(|| self.node(self.root).key.as_str())
    }

    fn node(&self, id: NodeId) -> &RbNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut RbNode {
        self.touched.insert(id);
        &mut self.nodes[id.0]
    }

    fn color(&self, id: NodeId) -> Color {
        if id.is_nil() {
            Color::Black
        } else {
            self.node(id).color
        }
    }

    fn left(&self, id: NodeId) -> NodeId {
        if id.is_nil() {
            NodeId::NIL
        } else {
            self.node(id).left
        }
    }

    fn right(&self, id: NodeId) -> NodeId {
        if id.is_nil() {
            NodeId::NIL
        } else {
            self.node(id).right
        }
    }

    fn parent(&self, id: NodeId) -> NodeId {
        if id.is_nil() {
            NodeId::NIL
        } else {
            self.node(id).parent
        }
    }

    fn set_color(&mut self, id: NodeId, color: Color) {
        if !id.is_nil() && self.node(id).color != color {
            self.node_mut(id).color = color;
        }
    }

    fn set_left(&mut self, id: NodeId, child: NodeId) {
        if !id.is_nil() {
            self.node_mut(id).left = child;
        }
    }

    fn set_right(&mut self, id: NodeId, child: NodeId) {
        if !id.is_nil() {
            self.node_mut(id).right = child;
        }
    }

    fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        if !id.is_nil() {
            self.node_mut(id).parent = parent;
        }
    }

    fn alloc(&mut self, node: RbNode) -> NodeId {
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        };
        self.touched.insert(id);
        id
    }

    fn release(&mut self, id: NodeId) {
        self.touched.remove(&id);
        let node = &mut self.nodes[id.0];
        node.key.clear();
        node.row.clear();
        node.left = NodeId::NIL;
        node.right = NodeId::NIL;
        node.parent = NodeId::NIL;
        self.free.push(id);
    }

    fn find(&self, key: &str) -> NodeId {
        let mut current = self.root;
        while !current.is_nil() {
            let node = self.node(current);
            current = match key.cmp(node.key.as_str()) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return current,
            };
        }
        NodeId::NIL
    }

    fn minimum(&self, mut id: NodeId) -> NodeId {
        while !self.left(id).is_nil() {
            id = self.left(id);
        }
        id
    }

    /// Points `parent`'s slot holding `old` at `new`; a NIL parent means the root.
    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if parent.is_nil() {
            self.root = new;
        } else if self.left(parent) == old {
            self.set_left(parent, new);
        } else {
            self.set_right(parent, new);
        }
    }

    fn rotate_left(&mut self, x: NodeId) {
        let y = self.right(x);
        if y.is_nil() {
            return;
        }
        trace!("red-black rotate left at {}", self.node(x).key);
        let y_left = self.left(y);
        self.set_right(x, y_left);
        self.set_parent(y_left, x);
        let x_parent = self.parent(x);
        self.set_parent(y, x_parent);
        self.replace_child(x_parent, x, y);
        self.set_left(y, x);
        self.set_parent(x, y);
    }

    fn rotate_right(&mut self, x: NodeId) {
        let y = self.left(x);
        if y.is_nil() {
            return;
        }
        trace!("red-black rotate right at {}", self.node(x).key);
        let y_right = self.right(y);
        self.set_left(x, y_right);
        self.set_parent(y_right, x);
        let x_parent = self.parent(x);
        self.set_parent(y, x_parent);
        self.replace_child(x_parent, x, y);
        self.set_right(y, x);
        self.set_parent(x, y);
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        while self.color(self.parent(z)) == Color::Red {
            let parent = self.parent(z);
            let grandparent = self.parent(parent);
            if parent == self.left(grandparent) {
                let uncle = self.right(grandparent);
                if self.color(uncle) == Color::Red {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    z = grandparent;
                } else {
                    if z == self.right(parent) {
                        z = parent;
                        self.rotate_left(z);
                    }
                    let parent = self.parent(z);
                    let grandparent = self.parent(parent);
                    self.set_color(parent, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    self.rotate_right(grandparent);
                }
            } else {
                let uncle = self.left(grandparent);
                if self.color(uncle) == Color::Red {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    z = grandparent;
                } else {
                    if z == self.left(parent) {
                        z = parent;
                        self.rotate_right(z);
                    }
                    let parent = self.parent(z);
                    let grandparent = self.parent(parent);
                    self.set_color(parent, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    self.rotate_left(grandparent);
                }
            }
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    /// Puts the subtree rooted at `v` where `u` was.
    fn transplant(&mut self, u: NodeId, v: NodeId) {
        let u_parent = self.parent(u);
        self.replace_child(u_parent, u, v);
        self.set_parent(v, u_parent);
    }

    /// Unlinks `z`, returning its key. `x` may be the sentinel, so its parent
    /// is tracked alongside it instead of being written into the sentinel.
    fn delete_node(&mut self, z: NodeId) -> String {
        let z_left = self.left(z);
        let z_right = self.right(z);
        let mut removed_color = self.color(z);
        let x;
        let x_parent;

        if z_left.is_nil() {
            x = z_right;
            x_parent = self.parent(z);
            self.transplant(z, z_right);
        } else if z_right.is_nil() {
            x = z_left;
            x_parent = self.parent(z);
            self.transplant(z, z_left);
        } else {
            let y = self.minimum(z_right);
            removed_color = self.color(y);
            x = self.right(y);
            if self.parent(y) == z {
                x_parent = y;
            } else {
                x_parent = self.parent(y);
                self.transplant(y, x);
                self.set_right(y, z_right);
                self.set_parent(z_right, y);
            }
            self.transplant(z, y);
            self.set_left(y, z_left);
            self.set_parent(z_left, y);
            let z_color = self.color(z);
            self.set_color(y, z_color);
        }

        let key = std::mem::take(&mut self.nodes[z.0].key);
        self.release(z);
        if removed_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }
        key
    }

    fn delete_fixup(&mut self, mut x: NodeId, mut parent: NodeId) {
        while x != self.root && self.color(x) == Color::Black && !parent.is_nil() {
            if x == self.left(parent) {
                let mut sibling = self.right(parent);
                if self.color(sibling) == Color::Red {
                    self.set_color(sibling, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_left(parent);
                    sibling = self.right(parent);
                }
                if self.color(self.left(sibling)) == Color::Black
                    && self.color(self.right(sibling)) == Color::Black
                {
                    self.set_color(sibling, Color::Red);
                    x = parent;
                    parent = self.parent(x);
                } else {
                    if self.color(self.right(sibling)) == Color::Black {
                        let nephew = self.left(sibling);
                        self.set_color(nephew, Color::Black);
                        self.set_color(sibling, Color::Red);
                        self.rotate_right(sibling);
                        sibling = self.right(parent);
                    }
                    let parent_color = self.color(parent);
                    self.set_color(sibling, parent_color);
                    self.set_color(parent, Color::Black);
                    let nephew = self.right(sibling);
                    self.set_color(nephew, Color::Black);
                    self.rotate_left(parent);
                    x = self.root;
                    parent = NodeId::NIL;
                }
            } else {
                let mut sibling = self.left(parent);
                if self.color(sibling) == Color::Red {
                    self.set_color(sibling, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_right(parent);
                    sibling = self.left(parent);
                }
                if self.color(self.left(sibling)) == Color::Black
                    && self.color(self.right(sibling)) == Color::Black
                {
                    self.set_color(sibling, Color::Red);
                    x = parent;
                    parent = self.parent(x);
                } else {
                    if self.color(self.left(sibling)) == Color::Black {
                        let nephew = self.right(sibling);
                        self.set_color(nephew, Color::Black);
                        self.set_color(sibling, Color::Red);
                        self.rotate_left(sibling);
                        sibling = self.left(parent);
                    }
                    let parent_color = self.color(parent);
                    self.set_color(sibling, parent_color);
                    self.set_color(parent, Color::Black);
                    let nephew = self.left(sibling);
                    self.set_color(nephew, Color::Black);
                    self.rotate_right(parent);
                    x = self.root;
                    parent = NodeId::NIL;
                }
            }
        }
        self.set_color(x, Color::Black);
    }

    fn child_digest(&self, id: NodeId) -> Option<Digest> {
        (!id.is_nil()).then(|| self.node(id).digest)
    }

    fn refresh_digest(&mut self, id: NodeId) {
        let node = self.node(id);
        let digest = node_digest(
            self.child_digest(node.left),
            &node.key,
            self.child_digest(node.right),
        );
        self.nodes[id.0].digest = digest;
    }

    fn record(&self, id: NodeId) -> NodeRecord {
        let node = self.node(id);
        let key_of = |id: NodeId| (!id.is_nil()).then(|| self.node(id).key.clone());
        let mut record = NodeRecord::new(IndexKind::RedBlack, vec![node.key.clone()]);
        record.hash = Some(node.digest);
        record.color = Some(node.color);
        record.left = key_of(node.left);
        record.right = key_of(node.right);
        record.parent = key_of(node.parent);
        record.rows = vec![node.row.clone()];
        record
    }

    fn save(&self, id: NodeId, out: &mut RecordWriter) {
        out.write(&self.node(id).key, &self.record(id));
    }

    /// Recomputes digests from every touched node up to the root, then
    /// materializes each recomputed node once.
    fn settle(&mut self, out: &mut RecordWriter) {
        let touched = std::mem::take(&mut self.touched);
        let mut dirty = BTreeSet::new();
        for id in touched {
            let mut current = id;
            while !current.is_nil() {
                self.refresh_digest(current);
                dirty.insert(current);
                current = self.parent(current);
            }
        }
        for id in dirty {
            self.save(id, out);
        }
    }

    fn collect_range(&self, id: NodeId, start: &str, end: &str, out: &mut Vec<(String, Row)>) {
        if id.is_nil() {
            return;
        }
        let node = self.node(id);
        let key = node.key.as_str();
        if start < key {
            self.collect_range(node.left, start, end, out);
        }
        if start <= key && key <= end {
            out.push((node.key.clone(), node.row.clone()));
        }
        if end > key {
            self.collect_range(node.right, start, end, out);
        }
    }

    fn collect_ids(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if !id.is_nil() {
            self.collect_ids(self.left(id), out);
            out.push(id);
            self.collect_ids(self.right(id), out);
        }
    }

    fn print_node(&self, id: NodeId, indent: &str, display: &mut String) {
        let node = self.node(id);
        display.push_str(&format!(
            "{indent}Node Key: {}, Hash: {}, Color: {}\n",
            node.key, node.digest, node.color
        ));
        let child_indent = format!("{indent}  ");
        if !node.left.is_nil() {
            display.push_str(&format!("{indent}Left:\n"));
            self.print_node(node.left, &child_indent, display);
        }
        if !node.right.is_nil() {
            display.push_str(&format!("{indent}Right:\n"));
            self.print_node(node.right, &child_indent, display);
        }
    }

    /// Returns `(black height, digest, node count)` of a verified subtree.
    fn verify_node(
        &self,
        id: NodeId,
        parent: NodeId,
        lower: Option<&str>,
        upper: Option<&str>,
    ) -> GitLiteResult<(usize, Option<Digest>, usize)> {
        if id.is_nil() {
            return Ok((1, None, 0));
        }
        let node = self.node(id);
        let key = node.key.as_str();
        if node.parent != parent {
            return Err(corrupted(format!("red-black node {key} has a wrong parent link")));
        }
        if lower.is_some_and(|lower| key <= lower) || upper.is_some_and(|upper| key >= upper) {
            return Err(corrupted(format!("red-black key {key} is out of order")));
        }
        if node.color == Color::Red && self.color(parent) == Color::Red {
            return Err(corrupted(format!("red-black node {key} is red under a red parent")));
        }
        let (left_black, left_digest, left_count) =
            self.verify_node(node.left, id, lower, Some(key))?;
        let (right_black, right_digest, right_count) =
            self.verify_node(node.right, id, Some(key), upper)?;
        if left_black != right_black {
            return Err(corrupted(format!(
                "red-black node {key} has unequal black heights ({left_black} vs {right_black})"
            )));
        }
        if node.digest != node_digest(left_digest, key, right_digest) {
            return Err(corrupted(format!("red-black node {key} has a stale digest")));
        }
        let black = left_black + usize::from(node.color == Color::Black);
        Ok((black, Some(node.digest), left_count + right_count + 1))
    }

    /// Number of black nodes on every path from the root to a sentinel, the
    /// sentinel included.
    pub fn black_height(&self) -> GitLiteResult<usize> {
        self.verify_node(self.root, NodeId::NIL, None, None)
            .map(|(black, _, _)| black)
    }
}

impl OrderedIndex for RedBlackIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::RedBlack
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn insert(&mut self, key: &str, row: Row, sink: &mut dyn RecordSink) -> bool {
        let mut parent = NodeId::NIL;
        let mut current = self.root;
        let mut go_left = false;
        while !current.is_nil() {
            parent = current;
            match key.cmp(self.node(current).key.as_str()) {
                Ordering::Less => {
                    go_left = true;
                    current = self.left(current);
                }
                Ordering::Greater => {
                    go_left = false;
                    current = self.right(current);
                }
                Ordering::Equal => {
                    debug!("red-black ignoring duplicate key {}", key);
                    return false;
                }
            }
        }

        let z = self.alloc(RbNode {
            key: key.to_string(),
            row,
            digest: leaf_digest(key),
            color: Color::Red,
            left: NodeId::NIL,
            right: NodeId::NIL,
            parent,
        });
        if parent.is_nil() {
            self.root = z;
        } else if go_left {
            self.set_left(parent, z);
        } else {
            self.set_right(parent, z);
        }
        self.len += 1;
        debug!("red-black creating node for key {}", key);
        self.insert_fixup(z);

        let mut out = RecordWriter::new(sink);
        self.settle(&mut out);
        self.persistence_failures += out.failures();
        true
    }

    fn update(
        &mut self,
        column_index: usize,
        new_value: &str,
        condition_index: usize,
        condition_value: &str,
        sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        let mut ids = Vec::with_capacity(self.len);
        self.collect_ids(self.root, &mut ids);

        let mut out = RecordWriter::new(sink);
        let mut updated = 0;
        for id in ids {
            if apply_update(
                &mut self.nodes[id.0].row,
                column_index,
                new_value,
                condition_index,
                condition_value,
            ) {
                self.save(id, &mut out);
                updated += 1;
            }
        }
        self.persistence_failures += out.failures();
        Ok(updated)
    }

    fn remove(&mut self, key: &str, sink: &mut dyn RecordSink) -> GitLiteResult<bool> {
        let z = self.find(key);
        if z.is_nil() {
            return Ok(false);
        }
        let mut out = RecordWriter::new(sink);
        let key = self.delete_node(z);
        out.remove(&key);
        self.len -= 1;
        self.settle(&mut out);
        self.persistence_failures += out.failures();
        Ok(true)
    }

    fn remove_range(
        &mut self,
        start: &str,
        end: &str,
        sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        let mut doomed = vec![];
        self.collect_range(self.root, start, end, &mut doomed);
        let mut removed = 0;
        for (key, _) in doomed {
            if self.remove(&key, sink)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn get(&self, key: &str) -> Option<&Row> {
        let id = self.find(key);
        (!id.is_nil()).then(|| &self.node(id).row)
    }

    fn range(&self, start: &str, end: &str) -> Vec<(String, Row)> {
        let mut entries = vec![];
        self.collect_range(self.root, start, end, &mut entries);
        entries
    }

    fn keys(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.len);
        self.collect_ids(self.root, &mut ids);
        ids.into_iter().map(|id| self.node(id).key.clone()).collect()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn print(&self) -> String {
        let mut display = String::new();
        if self.root.is_nil() {
            display.push_str("Empty tree.\n");
        } else {
            self.print_node(self.root, "", &mut display);
        }
        display
    }

    fn root_digest(&self) -> GitLiteResult<Digest> {
        Ok(self.child_digest(self.root).unwrap_or(EMPTY_DIGEST))
    }

    fn verify(&self) -> GitLiteResult<()> {
        if self.color(self.root) != Color::Black {
            return Err(corrupted("red-black root is red"));
        }
        let (_, _, count) = self.verify_node(self.root, NodeId::NIL, None, None)?;
        if count != self.len {
            return Err(corrupted(format!(
                "red-black tree holds {count} nodes but counts {}",
                self.len
            )));
        }
        Ok(())
    }

    fn persist_all(&mut self, sink: &mut dyn RecordSink) {
        let mut ids = Vec::with_capacity(self.len);
        self.collect_ids(self.root, &mut ids);
        let mut out = RecordWriter::new(sink);
        for id in ids {
            self.save(id, &mut out);
        }
        self.persistence_failures += out.failures();
    }

    fn persistence_failures(&self) -> usize {
        self.persistence_failures
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    use super::{Color, RedBlackIndex};
    use crate::error::GitLiteResult;
    use crate::index::OrderedIndex;
    use crate::storage::MemorySink;

    fn build(keys: &[&str]) -> (RedBlackIndex, MemorySink) {
        let mut index = RedBlackIndex::new();
        let mut sink = MemorySink::new();
        for key in keys {
            index.insert(key, vec![key.to_string()], &mut sink);
        }
        (index, sink)
    }

    fn assert_mirrored(index: &RedBlackIndex, sink: &MemorySink) {
        let ids = sink.ids().cloned().collect::<Vec<_>>();
        assert_eq!(ids, index.keys());
        let mut expected = MemorySink::new();
        index.clone().persist_all(&mut expected);
        for id in expected.ids() {
            assert_eq!(sink.get(id), expected.get(id), "record {id} is stale");
        }
    }

    #[test]
    fn ascending_inserts_stay_balanced() {
        let (index, sink) = build(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        assert_eq!(index.root_key(), Some("d"));
        index.verify().unwrap();
        assert_eq!(sink.get("d").unwrap().color, Some(Color::Black));
        assert_eq!(sink.get("d").unwrap().parent, None);
        assert_eq!(sink.get("b").unwrap().parent.as_deref(), Some("d"));
        assert_mirrored(&index, &sink);
    }

    #[test]
    fn three_inserts_recolor_root_black() {
        let (index, sink) = build(&["b", "a", "c"]);
        let printed = index.print();
        assert!(printed.starts_with("Node Key: b, Hash: "));
        assert!(printed.contains("Color: BLACK\nLeft:\n  Node Key: a, "));
        assert!(printed.contains("Color: RED\n"));
        assert_eq!(sink.get("a").unwrap().color, Some(Color::Red));
        assert_eq!(index.black_height().unwrap(), 2);
    }

    #[test]
    fn remove_every_shape() -> GitLiteResult<()> {
        let keys = ["m", "d", "t", "b", "h", "p", "x", "a", "c", "f", "k"];
        let (mut index, mut sink) = build(&keys);

        for key in ["a", "b", "d", "m"] {
            assert!(index.remove(key, &mut sink)?);
            assert!(index.get(key).is_none());
            assert!(sink.get(key).is_none());
            index.verify()?;
            assert_mirrored(&index, &sink);
        }
        assert_eq!(index.keys(), vec!["c", "f", "h", "k", "p", "t", "x"]);
        Ok(())
    }

    #[test]
    fn remove_down_to_empty() -> GitLiteResult<()> {
        let (mut index, mut sink) = build(&["q", "w", "e", "r"]);
        assert_eq!(index.remove_range("a", "z", &mut sink)?, 4);
        assert!(index.is_empty());
        assert!(sink.is_empty());
        assert_eq!(index.root_digest()?, 0);
        assert!(index.insert("again", vec![], &mut sink));
        index.verify()?;
        Ok(())
    }

    #[test]
    fn single_key_range_equals_remove() -> GitLiteResult<()> {
        let keys = ["k1", "k2", "k3", "k4", "k5", "k6"];
        let (mut by_range, mut range_sink) = build(&keys);
        let (mut by_key, mut key_sink) = build(&keys);

        assert_eq!(by_range.remove_range("k4", "k4", &mut range_sink)?, 1);
        assert!(by_key.remove("k4", &mut key_sink)?);

        assert_eq!(by_range.keys(), by_key.keys());
        assert_eq!(by_range.root_digest()?, by_key.root_digest()?);
        assert_eq!(by_range.print(), by_key.print());
        Ok(())
    }

    #[test]
    fn update_rewrites_matching_records() -> GitLiteResult<()> {
        let mut index = RedBlackIndex::new();
        let mut sink = MemorySink::new();
        for (id, city) in [("1", "oslo"), ("2", "rome"), ("3", "oslo")] {
            index.insert(id, vec![id.to_string(), city.to_string()], &mut sink);
        }
        assert_eq!(index.update(1, "bergen", 1, "oslo", &mut sink)?, 2);
        assert_eq!(sink.get("1").unwrap().rows[0][1], "bergen");
        assert_eq!(sink.get("2").unwrap().rows[0][1], "rome");
        assert_eq!(index.get("3").unwrap()[1], "bergen");
        Ok(())
    }

    #[test]
    fn random_operations_keep_invariants() -> GitLiteResult<()> {
        let mut rng = StdRng::seed_from_u64(0xB1AC);
        let mut keys = (0..400).map(|i| format!("{i:04}")).collect::<Vec<_>>();
        keys.shuffle(&mut rng);

        let mut index = RedBlackIndex::new();
        let mut sink = MemorySink::new();
        let mut expected = BTreeSet::new();
        for key in &keys[..300] {
            index.insert(key, vec![], &mut sink);
            expected.insert(key.clone());
        }
        index.verify()?;

        for step in 0..600 {
            let key = &keys[rng.random_range(0..keys.len())];
            if step % 3 == 0 {
                assert_eq!(index.insert(key, vec![], &mut sink), expected.insert(key.clone()));
            } else {
                assert_eq!(index.remove(key, &mut sink)?, expected.remove(key));
            }
            index.verify()?;
        }

        assert_eq!(index.keys(), expected.into_iter().collect::<Vec<_>>());
        assert_mirrored(&index, &sink);
        Ok(())
    }
}
