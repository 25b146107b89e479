//! Text form of one persisted index node.
//!
//! ```text
//! Key: <key>                         (B-tree: comma-joined keys)
//! Hash: <digest>                     (AVL, Red-Black)
//! Color: RED|BLACK                   (Red-Black)
//! Left: <left-child-key or NULL>     (B-tree: keys of the leftmost child)
//! Right: <right-child-key or NULL>   (B-tree: keys of the rightmost child)
//! Parent: <parent-key or NULL>       (Red-Black)
//! IsLeaf: true|false                 (B-tree)
//! NodeID: <id>                       (B-tree)
//! Row Data: <space-separated fields> (one line per key on B-tree nodes)
//! ```

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::{GitLiteError, GitLiteResult};
use crate::index::red_black::Color;
use crate::index::{IndexKind, Row};
use crate::utils::hash::Digest;

const NULL: &str = "NULL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub kind: IndexKind,
    /// Exactly one key for the binary trees, the node's ordered keys for the B-tree.
    pub keys: Vec<String>,
    pub hash: Option<Digest>,
    pub color: Option<Color>,
    pub left: Option<String>,
    pub right: Option<String>,
    pub parent: Option<String>,
    pub is_leaf: Option<bool>,
    pub node_id: Option<usize>,
    /// Payload rows aligned with `keys`; the binary trees omit an empty row.
    pub rows: Vec<Row>,
}

impl NodeRecord {
    pub fn new(kind: IndexKind, keys: Vec<String>) -> Self {
        Self {
            kind,
            keys,
            hash: None,
            color: None,
            left: None,
            right: None,
            parent: None,
            is_leaf: None,
            node_id: None,
            rows: vec![],
        }
    }

    /// The first key, which is the record identity of binary tree nodes.
    pub fn key(&self) -> &str {
        self.keys.first().map(String::as_str).unwrap_or_default()
    }

    /// `(key, row)` pairs stored in this record, rows defaulting to empty.
    pub fn entries(&self) -> impl Iterator<Item = (&String, Row)> + '_ {
        self.keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key, self.rows.get(i).cloned().unwrap_or_default()))
    }
}

fn link(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NULL)
}

impl Display for NodeRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Key: {}", self.keys.join(","))?;
        if let Some(hash) = self.hash {
            writeln!(f, "Hash: {hash}")?;
        }
        if let Some(color) = self.color {
            writeln!(f, "Color: {color}")?;
        }
        writeln!(f, "Left: {}", link(&self.left))?;
        writeln!(f, "Right: {}", link(&self.right))?;
        if self.kind == IndexKind::RedBlack {
            writeln!(f, "Parent: {}", link(&self.parent))?;
        }
        if let Some(is_leaf) = self.is_leaf {
            writeln!(f, "IsLeaf: {is_leaf}")?;
        }
        if let Some(node_id) = self.node_id {
            writeln!(f, "NodeID: {node_id}")?;
        }
        for row in &self.rows {
            if self.kind != IndexKind::BTree && row.is_empty() {
                continue;
            }
            writeln!(f, "Row Data: {}", row.join(" "))?;
        }
        Ok(())
    }
}

fn parse_link(value: &str) -> Option<String> {
    if value == NULL {
        None
    } else {
        Some(value.to_string())
    }
}

fn malformed(line: &str, reason: impl Display) -> GitLiteError {
    GitLiteError::Persistence(format!("malformed record line '{line}': {reason}"))
}

impl FromStr for NodeRecord {
    type Err = GitLiteError;

    fn from_str(text: &str) -> GitLiteResult<Self> {
        let mut record = NodeRecord::new(IndexKind::Avl, vec![]);
        let mut key = None;
        let mut saw_parent = false;

        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let (label, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(line, "missing ':'"))?;
            let value = value.trim();
            match label {
                "Key" => key = Some(value.to_string()),
                "Hash" => {
                    record.hash = Some(value.parse().map_err(|e| malformed(line, e))?);
                }
                "Color" => {
                    record.color = Some(value.parse().map_err(|e| malformed(line, e))?);
                }
                "Left" => record.left = parse_link(value),
                "Right" => record.right = parse_link(value),
                "Parent" => {
                    saw_parent = true;
                    record.parent = parse_link(value);
                }
                "IsLeaf" => {
                    record.is_leaf = Some(value.parse().map_err(|e| malformed(line, e))?);
                }
                "NodeID" => {
                    record.node_id = Some(value.parse().map_err(|e| malformed(line, e))?);
                }
                "Row Data" => record
                    .rows
                    .push(value.split_whitespace().map(str::to_string).collect()),
                other => return Err(malformed(line, format!("unknown label '{other}'"))),
            }
        }

        let Some(key) = key else {
            return Err(GitLiteError::Persistence(
                "record has no Key line".to_string(),
            ));
        };
        record.kind = if record.node_id.is_some() {
            IndexKind::BTree
        } else if record.color.is_some() || saw_parent {
            IndexKind::RedBlack
        } else {
            IndexKind::Avl
        };
        // only B-tree nodes hold several keys
        record.keys = match record.kind {
            IndexKind::BTree => key.split(',').map(str::to_string).collect(),
            _ => vec![key],
        };
        Ok(record)
    }
}
