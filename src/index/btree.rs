//! Multiway balanced tree with proactive top-down splitting.
//!
//! Nodes are stored in an arena and never freed, so a node's arena slot
//! doubles as its stable record identifier (`node_<id>`). The variant is
//! insert-only: update, removal and digests fall back to the trait's
//! unsupported defaults.

use log::{debug, trace};

use crate::error::{GitLiteError, GitLiteResult};
use crate::index::{corrupted, Capabilities, IndexKind, OrderedIndex, Row};
use crate::storage::{NodeRecord, RecordSink, RecordWriter};

type NodeId = usize;

#[derive(Debug, Clone)]
struct BNode {
    keys: Vec<String>,
    rows: Vec<Row>,
    children: Vec<NodeId>,
    is_leaf: bool,
}

impl BNode {
    fn new(is_leaf: bool) -> Self {
        Self {
            keys: vec![],
            rows: vec![],
            children: vec![],
            is_leaf,
        }
    }

    /// Index of the first key not less than `key`.
    fn position(&self, key: &str) -> usize {
        self.keys.partition_point(|k| k.as_str() < key)
    }
}

pub fn record_id(node_id: usize) -> String {
    format!("node_{node_id}")
}

#[derive(Debug, Clone)]
pub struct BTreeIndex {
    min_degree: usize,
    nodes: Vec<BNode>,
    root: Option<NodeId>,
    len: usize,
    persistence_failures: usize,
}

impl BTreeIndex {
    pub fn try_new(min_degree: usize) -> GitLiteResult<Self> {
        if min_degree < 2 {
            return Err(GitLiteError::InvalidArgument(format!(
                "B-tree minimum degree must be at least 2, got {min_degree}"
            )));
        }
        Ok(Self {
            min_degree,
            nodes: vec![],
            root: None,
            len: 0,
            persistence_failures: 0,
        })
    }

    pub fn min_degree(&self) -> usize {
        self.min_degree
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(id) = current {
            height += 1;
            current = self.nodes[id].children.first().copied();
        }
        height
    }

    pub fn root_keys(&self) -> Vec<String> {
        self.root
            .map(|id| self.nodes[id].keys.clone())
            .unwrap_or_default()
    }

    fn max_keys(&self) -> usize {
        2 * self.min_degree - 1
    }

    fn is_full(&self, id: NodeId) -> bool {
        self.nodes[id].keys.len() == self.max_keys()
    }

    fn alloc(&mut self, node: BNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Splits the full `children[index]` of `parent` around its median key.
    fn split_child(&mut self, parent: NodeId, index: usize, out: &mut RecordWriter) {
        let t = self.min_degree;
        let full = self.nodes[parent].children[index];

        let y = &mut self.nodes[full];
        let mut sibling = BNode::new(y.is_leaf);
        sibling.keys = y.keys.split_off(t);
        sibling.rows = y.rows.split_off(t);
        if !y.is_leaf {
            sibling.children = y.children.split_off(t);
        }
        let (median_key, median_row) = match (y.keys.pop(), y.rows.pop()) {
            (Some(key), Some(row)) => (key, row),
            _ => return,
        };
        trace!("B-tree split node {} around {}", full, median_key);

        let sibling = self.alloc(sibling);
        let p = &mut self.nodes[parent];
        p.keys.insert(index, median_key);
        p.rows.insert(index, median_row);
        p.children.insert(index + 1, sibling);

        self.save(full, out);
        self.save(sibling, out);
        self.save(parent, out);
    }

    /// Inserts into the subtree under `id`, then saves every node on the
    /// descent path: a parent's record embeds its edge children's keys.
    fn insert_non_full(&mut self, mut id: NodeId, key: &str, row: Row, out: &mut RecordWriter) {
        let mut path = vec![];
        loop {
            let mut index = self.nodes[id].position(key);
            if self.nodes[id].is_leaf {
                let node = &mut self.nodes[id];
                node.keys.insert(index, key.to_string());
                node.rows.insert(index, row);
                self.save(id, out);
                for ancestor in path.into_iter().rev() {
                    self.save(ancestor, out);
                }
                return;
            }
            path.push(id);
            if self.is_full(self.nodes[id].children[index]) {
                self.split_child(id, index, out);
                if key > self.nodes[id].keys[index].as_str() {
                    index += 1;
                }
            }
            id = self.nodes[id].children[index];
        }
    }

    fn record(&self, id: NodeId) -> NodeRecord {
        let node = &self.nodes[id];
        let child_keys = |child: Option<&NodeId>| child.map(|c| self.nodes[*c].keys.join(","));
        let mut record = NodeRecord::new(IndexKind::BTree, node.keys.clone());
        record.left = child_keys(node.children.first());
        record.right = child_keys(node.children.last());
        record.is_leaf = Some(node.is_leaf);
        record.node_id = Some(id);
        record.rows = node.rows.clone();
        record
    }

    fn save(&self, id: NodeId, out: &mut RecordWriter) {
        out.write(&record_id(id), &self.record(id));
    }

    fn collect_range(&self, id: NodeId, start: &str, end: &str, out: &mut Vec<(String, Row)>) {
        let node = &self.nodes[id];
        let first = node.position(start);
        for i in first..=node.keys.len() {
            if !node.is_leaf {
                self.collect_range(node.children[i], start, end, out);
            }
            match node.keys.get(i) {
                Some(key) if key.as_str() <= end => out.push((key.clone(), node.rows[i].clone())),
                _ => break,
            }
        }
    }

    fn collect_keys(&self, id: NodeId, out: &mut Vec<String>) {
        let node = &self.nodes[id];
        for (i, key) in node.keys.iter().enumerate() {
            if !node.is_leaf {
                self.collect_keys(node.children[i], out);
            }
            out.push(key.clone());
        }
        if let Some(last) = node.children.last().filter(|_| !node.is_leaf) {
            self.collect_keys(*last, out);
        }
    }

    fn collect_ids(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for child in &self.nodes[id].children {
            self.collect_ids(*child, out);
        }
    }

    fn print_node(&self, id: NodeId, indent: &str, display: &mut String) {
        let node = &self.nodes[id];
        display.push_str(&format!(
            "{indent}Node ID: {id}, Keys: {}, Leaf: {}\n",
            node.keys.join(","),
            node.is_leaf
        ));
        let child_indent = format!("{indent}  ");
        for child in &node.children {
            self.print_node(*child, &child_indent, display);
        }
    }

    /// Returns `(leaf depth, key count)` of a verified subtree.
    fn verify_node(
        &self,
        id: NodeId,
        is_root: bool,
        lower: Option<&str>,
        upper: Option<&str>,
    ) -> GitLiteResult<(usize, usize)> {
        let node = &self.nodes[id];
        let count = node.keys.len();
        let min_keys = if is_root { 1 } else { self.min_degree - 1 };
        if count < min_keys || count > self.max_keys() {
            return Err(corrupted(format!("B-tree node {id} holds {count} keys")));
        }
        if node.rows.len() != count {
            return Err(corrupted(format!("B-tree node {id} has misaligned rows")));
        }
        if node.keys.windows(2).any(|pair| pair[0] >= pair[1])
            || lower.is_some_and(|lower| node.keys[0].as_str() <= lower)
            || upper.is_some_and(|upper| node.keys[count - 1].as_str() >= upper)
        {
            return Err(corrupted(format!("B-tree node {id} keys are out of order")));
        }
        if node.is_leaf {
            if !node.children.is_empty() {
                return Err(corrupted(format!("B-tree leaf {id} has children")));
            }
            return Ok((1, count));
        }
        if node.children.len() != count + 1 {
            return Err(corrupted(format!(
                "B-tree node {id} has {} children for {count} keys",
                node.children.len()
            )));
        }

        let mut depth = None;
        let mut total = count;
        for (i, child) in node.children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(node.keys[i - 1].as_str()) };
            let child_upper = node.keys.get(i).map(String::as_str).or(upper);
            let (child_depth, child_count) =
                self.verify_node(*child, false, child_lower, child_upper)?;
            if depth.is_some_and(|depth| depth != child_depth) {
                return Err(corrupted(format!("B-tree node {id} has leaves at unequal depth")));
            }
            depth = Some(child_depth);
            total += child_count;
        }
        Ok((depth.unwrap_or(0) + 1, total))
    }
}

impl OrderedIndex for BTreeIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::BTree
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::INSERT_ONLY
    }

    fn insert(&mut self, key: &str, row: Row, sink: &mut dyn RecordSink) -> bool {
        if self.get(key).is_some() {
            debug!("B-tree ignoring duplicate key {}", key);
            return false;
        }

        let mut out = RecordWriter::new(sink);
        let root = self.root;
        match root {
            None => {
                let mut leaf = BNode::new(true);
                leaf.keys.push(key.to_string());
                leaf.rows.push(row);
                let id = self.alloc(leaf);
                self.root = Some(id);
                self.save(id, &mut out);
            }
            Some(root) if self.is_full(root) => {
                let mut new_root = BNode::new(false);
                new_root.children.push(root);
                let new_root = self.alloc(new_root);
                self.root = Some(new_root);
                debug!("B-tree root split, height now {}", self.height());
                self.split_child(new_root, 0, &mut out);
                self.insert_non_full(new_root, key, row, &mut out);
            }
            Some(root) => self.insert_non_full(root, key, row, &mut out),
        }
        self.len += 1;
        self.persistence_failures += out.failures();
        true
    }

    fn get(&self, key: &str) -> Option<&Row> {
        let mut current = self.root?;
        loop {
            let node = &self.nodes[current];
            let index = node.position(key);
            if node.keys.get(index).is_some_and(|k| k == key) {
                return node.rows.get(index);
            }
            if node.is_leaf {
                return None;
            }
            current = node.children[index];
        }
    }

    fn range(&self, start: &str, end: &str) -> Vec<(String, Row)> {
        let mut entries = vec![];
        if let Some(root) = self.root.filter(|_| start <= end) {
            self.collect_range(root, start, end, &mut entries);
        }
        entries
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len);
        if let Some(root) = self.root {
            self.collect_keys(root, &mut keys);
        }
        keys
    }

    fn len(&self) -> usize {
        self.len
    }

    fn print(&self) -> String {
        let mut display = String::new();
        match self.root {
            Some(root) => self.print_node(root, "", &mut display),
            None => display.push_str("Empty tree.\n"),
        }
        display
    }

    fn verify(&self) -> GitLiteResult<()> {
        let Some(root) = self.root else {
            return match self.len {
                0 => Ok(()),
                len => Err(corrupted(format!("empty B-tree counts {len} keys"))),
            };
        };
        let (_, count) = self.verify_node(root, true, None, None)?;
        if count != self.len {
            return Err(corrupted(format!(
                "B-tree holds {count} keys but counts {}",
                self.len
            )));
        }
        Ok(())
    }

    fn persist_all(&mut self, sink: &mut dyn RecordSink) {
        let mut ids = vec![];
        if let Some(root) = self.root {
            self.collect_ids(root, &mut ids);
        }
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
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use super::{record_id, BTreeIndex};
    use crate::error::GitLiteResult;
    use crate::index::OrderedIndex;
    use crate::storage::MemorySink;

    fn build(t: usize, keys: &[&str]) -> GitLiteResult<(BTreeIndex, MemorySink)> {
        let mut index = BTreeIndex::try_new(t)?;
        let mut sink = MemorySink::new();
        for key in keys {
            assert!(index.insert(key, vec![format!("row-{key}")], &mut sink));
        }
        Ok((index, sink))
    }

    #[test]
    fn min_degree_two_splits_root_once() -> GitLiteResult<()> {
        let (index, sink) = build(2, &["10", "20", "5", "6", "12", "30", "7", "17"])?;

        assert_eq!(index.root_keys(), vec!["20", "5"]);
        assert_eq!(index.height(), 2);
        index.verify()?;
        assert_eq!(
            index.keys(),
            vec!["10", "12", "17", "20", "30", "5", "6", "7"]
        );

        let printed = index.print();
        let lines = printed.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Node ID: "));
        assert!(lines[0].ends_with("Keys: 20,5, Leaf: false"));
        assert!(lines[1].ends_with("Keys: 10,12,17, Leaf: true"));
        assert!(lines[2].ends_with("Keys: 30, Leaf: true"));
        assert!(lines[3].ends_with("Keys: 6,7, Leaf: true"));
        assert!(lines[1].starts_with("  Node ID: "));

        let root = sink
            .records()
            .find(|record| record.is_leaf == Some(false))
            .unwrap();
        assert_eq!(root.keys, vec!["20", "5"]);
        assert_eq!(root.left.as_deref(), Some("10,12,17"));
        assert_eq!(root.right.as_deref(), Some("6,7"));
        assert_eq!(root.rows[1], vec!["row-5"]);
        Ok(())
    }

    #[test]
    fn every_live_node_has_a_current_record() -> GitLiteResult<()> {
        let (mut index, sink) = build(2, &["a", "b", "c", "d", "e", "f", "g", "h", "i"])?;
        let mut fresh = MemorySink::new();
        index.persist_all(&mut fresh);
        for id in fresh.ids() {
            assert_eq!(sink.get(id), fresh.get(id), "record {id} is stale");
        }
        assert!(fresh.get(&record_id(0)).is_some());
        Ok(())
    }

    #[test]
    fn edge_child_inserts_refresh_ancestor_records() -> GitLiteResult<()> {
        let (mut index, sink) = build(2, &["a", "b", "c", "d"])?;
        let root = sink.get(&record_id(1)).unwrap();
        assert_eq!(root.right.as_deref(), Some("c,d"));

        let mut fresh = MemorySink::new();
        index.persist_all(&mut fresh);
        for id in fresh.ids() {
            assert_eq!(sink.get(id), fresh.get(id), "record {id} is stale");
        }
        Ok(())
    }

    #[test]
    fn duplicate_insert_writes_nothing() -> GitLiteResult<()> {
        let (mut index, mut sink) = build(3, &["x", "y"])?;
        let writes = sink.writes();
        assert!(!index.insert("x", vec!["other".to_string()], &mut sink));
        assert_eq!(sink.writes(), writes);
        assert_eq!(index.get("x").unwrap(), &vec!["row-x".to_string()]);
        assert_eq!(index.len(), 2);
        Ok(())
    }

    #[test]
    fn range_spans_nodes() -> GitLiteResult<()> {
        let keys = (0..50).map(|i| format!("{i:02}")).collect::<Vec<_>>();
        let refs = keys.iter().map(String::as_str).collect::<Vec<_>>();
        let (index, _) = build(2, &refs)?;

        let found = index
            .range("07", "23")
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        assert_eq!(found, keys[7..=23].to_vec());
        assert!(index.range("30", "10").is_empty());
        assert_eq!(index.range("49", "99").len(), 1);
        Ok(())
    }

    #[test]
    fn shuffled_inserts_hold_invariants() -> GitLiteResult<()> {
        let mut rng = StdRng::seed_from_u64(7);
        for t in [2, 3, 5] {
            let mut keys = (0..500).map(|i| format!("k{i}")).collect::<Vec<_>>();
            keys.shuffle(&mut rng);
            let mut index = BTreeIndex::try_new(t)?;
            let mut sink = MemorySink::new();
            for key in &keys {
                index.insert(key, vec![], &mut sink);
            }
            index.verify()?;
            keys.sort();
            assert_eq!(index.keys(), keys);
            assert!(keys.iter().all(|key| index.get(key).is_some()));
        }
        Ok(())
    }
}
