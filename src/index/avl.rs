//! Height-balanced binary search tree.
//!
//! Subtrees are owned boxes; rotations move ownership between parent slots.
//! Heights and digests are recomputed child-first on the way back up every
//! recursive mutation, and each node whose height, digest, links or payload
//! changed is rewritten to the sink before the call returns.

use std::cmp::Ordering;

use log::{debug, trace};

use crate::error::GitLiteResult;
use crate::index::{apply_update, corrupted, Capabilities, IndexKind, OrderedIndex, Row};
use crate::storage::{NodeRecord, RecordSink, RecordWriter};
use crate::utils::hash::{leaf_digest, node_digest, Digest, EMPTY_DIGEST};

type Link = Option<Box<AvlNode>>;

#[derive(Debug, Clone)]
struct AvlNode {
    key: String,
    row: Row,
    digest: Digest,
    height: usize,
    left: Link,
    right: Link,
}

fn height(link: &Link) -> usize {
    link.as_ref().map_or(0, |node| node.height)
}

fn digest_of(link: &Link) -> Option<Digest> {
    link.as_ref().map(|node| node.digest)
}

impl AvlNode {
    fn new(key: String, row: Row) -> Box<Self> {
        Box::new(Self {
            digest: leaf_digest(&key),
            key,
            row,
            height: 1,
            left: None,
            right: None,
        })
    }

    fn refresh(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
        self.digest = node_digest(digest_of(&self.left), &self.key, digest_of(&self.right));
    }

    fn balance(&self) -> isize {
        height(&self.left) as isize - height(&self.right) as isize
    }

    fn record(&self) -> NodeRecord {
        let mut record = NodeRecord::new(IndexKind::Avl, vec![self.key.clone()]);
        record.hash = Some(self.digest);
        record.left = self.left.as_ref().map(|node| node.key.clone());
        record.right = self.right.as_ref().map(|node| node.key.clone());
        record.rows = vec![self.row.clone()];
        record
    }

    fn save(&self, out: &mut RecordWriter) {
        out.write(&self.key, &self.record());
    }
}

fn rotate_right(mut y: Box<AvlNode>, out: &mut RecordWriter) -> Box<AvlNode> {
    let Some(mut x) = y.left.take() else {
        return y;
    };
    trace!("avl rotate right at {}", y.key);
    y.left = x.right.take();
    y.refresh();
    x.right = Some(y);
    x.refresh();

    if let Some(y) = x.right.as_deref() {
        y.save(out);
    }
    x.save(out);
    x
}

fn rotate_left(mut x: Box<AvlNode>, out: &mut RecordWriter) -> Box<AvlNode> {
    let Some(mut y) = x.right.take() else {
        return x;
    };
    trace!("avl rotate left at {}", x.key);
    x.right = y.left.take();
    x.refresh();
    y.left = Some(x);
    y.refresh();

    if let Some(x) = y.left.as_deref() {
        x.save(out);
    }
    y.save(out);
    y
}

/// Restores balance after a key was inserted below `node`, choosing the
/// rotation case from where `key` sits relative to the heavy child.
fn rebalance_insert(mut node: Box<AvlNode>, key: &str, out: &mut RecordWriter) -> Box<AvlNode> {
    node.refresh();
    let balance = node.balance();

    if balance > 1 {
        if let Some(left) = node.left.take() {
            if key > left.key.as_str() {
                node.left = Some(rotate_left(left, out));
            } else {
                node.left = Some(left);
            }
            return rotate_right(node, out);
        }
    }
    if balance < -1 {
        if let Some(right) = node.right.take() {
            if key < right.key.as_str() {
                node.right = Some(rotate_right(right, out));
            } else {
                node.right = Some(right);
            }
            return rotate_left(node, out);
        }
    }

    node.save(out);
    node
}

/// Restores balance after a removal below `node`. The removed key is gone,
/// so the case is chosen from the heavy child's own balance.
fn rebalance(mut node: Box<AvlNode>, out: &mut RecordWriter) -> Box<AvlNode> {
    node.refresh();
    let balance = node.balance();

    if balance > 1 {
        if let Some(left) = node.left.take() {
            node.left = Some(if left.balance() < 0 {
                rotate_left(left, out)
            } else {
                left
            });
            return rotate_right(node, out);
        }
    }
    if balance < -1 {
        if let Some(right) = node.right.take() {
            node.right = Some(if right.balance() > 0 {
                rotate_right(right, out)
            } else {
                right
            });
            return rotate_left(node, out);
        }
    }

    node.save(out);
    node
}

fn insert_node(
    link: Link,
    key: &str,
    row: Row,
    out: &mut RecordWriter,
    inserted: &mut bool,
) -> Box<AvlNode> {
    let mut node = match link {
        None => {
            let node = AvlNode::new(key.to_string(), row);
            debug!("avl creating node for key {}, hash {}", node.key, node.digest);
            node.save(out);
            *inserted = true;
            return node;
        }
        Some(node) => node,
    };

    match key.cmp(node.key.as_str()) {
        Ordering::Less => node.left = Some(insert_node(node.left.take(), key, row, out, inserted)),
        Ordering::Greater => {
            node.right = Some(insert_node(node.right.take(), key, row, out, inserted))
        }
        Ordering::Equal => return node,
    }
    if !*inserted {
        return node;
    }
    rebalance_insert(node, key, out)
}

fn min_entry(node: &AvlNode) -> (String, Row) {
    let mut current = node;
    while let Some(left) = current.left.as_deref() {
        current = left;
    }
    (current.key.clone(), current.row.clone())
}

fn remove_node(link: Link, key: &str, out: &mut RecordWriter, removed: &mut bool) -> Link {
    let mut node = link?;

    match key.cmp(node.key.as_str()) {
        Ordering::Less => node.left = remove_node(node.left.take(), key, out, removed),
        Ordering::Greater => node.right = remove_node(node.right.take(), key, out, removed),
        Ordering::Equal => {
            *removed = true;
            out.remove(&node.key);
            match (node.left.take(), node.right.take()) {
                (None, None) => return None,
                (Some(child), None) | (None, Some(child)) => return Some(child),
                (Some(left), Some(right)) => {
                    // Take over the successor's entry, then delete the
                    // successor from the subtree that owns it.
                    let (successor_key, successor_row) = min_entry(&right);
                    let mut found = false;
                    node.right = remove_node(Some(right), &successor_key, out, &mut found);
                    node.left = Some(left);
                    node.key = successor_key;
                    node.row = successor_row;
                }
            }
        }
    }
    if !*removed {
        return Some(node);
    }
    Some(rebalance(node, out))
}

fn collect_range(link: &Link, start: &str, end: &str, out: &mut Vec<(String, Row)>) {
    let Some(node) = link else {
        return;
    };
    let key = node.key.as_str();
    if start < key {
        collect_range(&node.left, start, end, out);
    }
    if start <= key && key <= end {
        out.push((node.key.clone(), node.row.clone()));
    }
    if end > key {
        collect_range(&node.right, start, end, out);
    }
}

fn collect_keys(link: &Link, out: &mut Vec<String>) {
    if let Some(node) = link {
        collect_keys(&node.left, out);
        out.push(node.key.clone());
        collect_keys(&node.right, out);
    }
}

fn update_nodes(
    link: &mut Link,
    column_index: usize,
    new_value: &str,
    condition_index: usize,
    condition_value: &str,
    out: &mut RecordWriter,
) -> usize {
    let Some(node) = link else {
        return 0;
    };
    let mut updated = 0;
    if apply_update(
        &mut node.row,
        column_index,
        new_value,
        condition_index,
        condition_value,
    ) {
        node.save(out);
        updated += 1;
    }
    updated += update_nodes(
        &mut node.left,
        column_index,
        new_value,
        condition_index,
        condition_value,
        out,
    );
    updated += update_nodes(
        &mut node.right,
        column_index,
        new_value,
        condition_index,
        condition_value,
        out,
    );
    updated
}

fn print_node(node: &AvlNode, indent: &str, display: &mut String) {
    display.push_str(&format!(
        "{indent}Node Key: {}, Hash: {}, Height: {}\n",
        node.key, node.digest, node.height
    ));
    let child_indent = format!("{indent}  ");
    if let Some(left) = node.left.as_deref() {
        display.push_str(&format!("{indent}Left:\n"));
        print_node(left, &child_indent, display);
    }
    if let Some(right) = node.right.as_deref() {
        display.push_str(&format!("{indent}Right:\n"));
        print_node(right, &child_indent, display);
    }
}

fn persist_nodes(link: &Link, out: &mut RecordWriter) {
    if let Some(node) = link {
        node.save(out);
        persist_nodes(&node.left, out);
        persist_nodes(&node.right, out);
    }
}

/// Returns `(height, digest, node count)` of a verified subtree whose keys
/// must lie strictly between `lower` and `upper`.
fn verify_node(
    link: &Link,
    lower: Option<&str>,
    upper: Option<&str>,
) -> GitLiteResult<(usize, Option<Digest>, usize)> {
    let Some(node) = link else {
        return Ok((0, None, 0));
    };
    let key = node.key.as_str();
    if lower.is_some_and(|lower| key <= lower) || upper.is_some_and(|upper| key >= upper) {
        return Err(corrupted(format!("avl key {key} is out of order")));
    }
    let (left_height, left_digest, left_count) = verify_node(&node.left, lower, Some(key))?;
    let (right_height, right_digest, right_count) = verify_node(&node.right, Some(key), upper)?;

    if left_height.abs_diff(right_height) > 1 {
        return Err(corrupted(format!(
            "avl node {key} is unbalanced ({left_height} vs {right_height})"
        )));
    }
    if node.height != 1 + left_height.max(right_height) {
        return Err(corrupted(format!("avl node {key} has a stale height")));
    }
    if node.digest != node_digest(left_digest, key, right_digest) {
        return Err(corrupted(format!("avl node {key} has a stale digest")));
    }
    Ok((node.height, Some(node.digest), left_count + right_count + 1))
}

#[derive(Debug, Clone, Default)]
pub struct AvlIndex {
    root: Link,
    len: usize,
    persistence_failures: usize,
}

impl AvlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the tree, 0 when empty.
    pub fn height(&self) -> usize {
        height(&self.root)
    }

    pub fn root_key(&self) -> Option<&str> {
        self.root.as_ref().map(|node| node.key.as_str())
    }
}

impl OrderedIndex for AvlIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Avl
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn insert(&mut self, key: &str, row: Row, sink: &mut dyn RecordSink) -> bool {
        let mut out = RecordWriter::new(sink);
        let mut inserted = false;
        self.root = Some(insert_node(
            self.root.take(),
            key,
            row,
            &mut out,
            &mut inserted,
        ));
        if inserted {
            self.len += 1;
        } else {
            debug!("avl ignoring duplicate key {}", key);
        }
        self.persistence_failures += out.failures();
        inserted
    }

    fn update(
        &mut self,
        column_index: usize,
        new_value: &str,
        condition_index: usize,
        condition_value: &str,
        sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        let mut out = RecordWriter::new(sink);
        let updated = update_nodes(
            &mut self.root,
            column_index,
            new_value,
            condition_index,
            condition_value,
            &mut out,
        );
        self.persistence_failures += out.failures();
        Ok(updated)
    }

    fn remove(&mut self, key: &str, sink: &mut dyn RecordSink) -> GitLiteResult<bool> {
        let mut out = RecordWriter::new(sink);
        let mut removed = false;
        self.root = remove_node(self.root.take(), key, &mut out, &mut removed);
        if removed {
            self.len -= 1;
        }
        self.persistence_failures += out.failures();
        Ok(removed)
    }

    fn remove_range(
        &mut self,
        start: &str,
        end: &str,
        sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        // Doomed keys are gathered in one bounded walk first, so no node is
        // visited again after a rebalance has moved it.
        let mut doomed = vec![];
        collect_range(&self.root, start, end, &mut doomed);
        let mut removed = 0;
        for (key, _) in doomed {
            if self.remove(&key, sink)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn get(&self, key: &str) -> Option<&Row> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match key.cmp(node.key.as_str()) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.row),
            };
        }
        None
    }

    fn range(&self, start: &str, end: &str) -> Vec<(String, Row)> {
        let mut entries = vec![];
        collect_range(&self.root, start, end, &mut entries);
        entries
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len);
        collect_keys(&self.root, &mut keys);
        keys
    }

    fn len(&self) -> usize {
        self.len
    }

    fn print(&self) -> String {
        let mut display = String::new();
        match self.root.as_deref() {
            Some(root) => print_node(root, "", &mut display),
            None => display.push_str("Empty tree.\n"),
        }
        display
    }

    fn root_digest(&self) -> GitLiteResult<Digest> {
        Ok(digest_of(&self.root).unwrap_or(EMPTY_DIGEST))
    }

    fn verify(&self) -> GitLiteResult<()> {
        let (_, _, count) = verify_node(&self.root, None, None)?;
        if count != self.len {
            return Err(corrupted(format!(
                "avl holds {count} nodes but counts {}",
                self.len
            )));
        }
        Ok(())
    }

    fn persist_all(&mut self, sink: &mut dyn RecordSink) {
        let mut out = RecordWriter::new(sink);
        persist_nodes(&self.root, &mut out);
        self.persistence_failures += out.failures();
    }

    fn persistence_failures(&self) -> usize {
        self.persistence_failures
    }
}
