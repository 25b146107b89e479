//! Ordered indexes over string keys.
//!
//! Three interchangeable balanced trees implement [`OrderedIndex`]. Each owns
//! its nodes, keeps per-node digests where it supports them, and materializes
//! every node it touches into the [`RecordSink`] passed to the mutating call.

use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::error::{GitLiteError, GitLiteResult};
use crate::storage::RecordSink;
use crate::utils::hash::Digest;

pub mod avl;
pub mod btree;
pub mod red_black;

pub use avl::AvlIndex;
pub use btree::BTreeIndex;
pub use red_black::RedBlackIndex;

/// Payload stored with a key: the fields of one dataset row.
pub type Row = Vec<String>;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum IndexKind {
    #[strum(to_string = "AVL")]
    #[serde(rename = "AVL")]
    Avl,
    #[strum(to_string = "RBTree", serialize = "RB", serialize = "RedBlack")]
    #[serde(rename = "RBTree")]
    RedBlack,
    #[strum(to_string = "BTree")]
    #[serde(rename = "BTree")]
    BTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_update: bool,
    pub supports_delete: bool,
    pub supports_digest: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        supports_update: true,
        supports_delete: true,
        supports_digest: true,
    };

    pub const INSERT_ONLY: Capabilities = Capabilities {
        supports_update: false,
        supports_delete: false,
        supports_digest: false,
    };
}

pub(crate) fn unsupported(kind: IndexKind, operation: &str) -> GitLiteError {
    GitLiteError::UnsupportedOperation(format!("{operation} is not supported by the {kind} index"))
}

pub(crate) fn corrupted(reason: impl Into<String>) -> GitLiteError {
    GitLiteError::Internal(format!("index invariant violated: {}", reason.into()))
}

/// Sets `row[column_index]` when `row[condition_index] == condition_value`.
/// Returns whether the row was updated; rows too short for either column
/// never match.
pub(crate) fn apply_update(
    row: &mut Row,
    column_index: usize,
    new_value: &str,
    condition_index: usize,
    condition_value: &str,
) -> bool {
    if column_index >= row.len() {
        return false;
    }
    match row.get(condition_index) {
        Some(value) if value == condition_value => {
            row[column_index] = new_value.to_string();
            true
        }
        _ => false,
    }
}

/// Capability set shared by every tree variant.
///
/// Mutations take the record sink explicitly. Sink failures are absorbed and
/// counted in [`OrderedIndex::persistence_failures`]; the in-memory tree is
/// always authoritative.
pub trait OrderedIndex: std::fmt::Debug {
    fn kind(&self) -> IndexKind;

    fn capabilities(&self) -> Capabilities;

    /// Inserts `key` with its payload. Returns `false`, touching nothing, when
    /// the key is already present. An empty row means "no payload".
    fn insert(&mut self, key: &str, row: Row, sink: &mut dyn RecordSink) -> bool;

    /// Sets `column_index` to `new_value` on every entry whose payload holds
    /// `condition_value` at `condition_index`. Returns the number of entries updated.
    fn update(
        &mut self,
        _column_index: usize,
        _new_value: &str,
        _condition_index: usize,
        _condition_value: &str,
        _sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        Err(unsupported(self.kind(), "update"))
    }

    /// Removes `key`; `Ok(false)` when it was absent.
    fn remove(&mut self, _key: &str, _sink: &mut dyn RecordSink) -> GitLiteResult<bool> {
        Err(unsupported(self.kind(), "remove"))
    }

    /// Removes every key in `start..=end`, returning how many were removed.
    fn remove_range(
        &mut self,
        _start: &str,
        _end: &str,
        _sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        Err(unsupported(self.kind(), "remove_range"))
    }

    fn get(&self, key: &str) -> Option<&Row>;

    /// Entries with `start <= key <= end`, in key order.
    fn range(&self, start: &str, end: &str) -> Vec<(String, Row)>;

    /// All keys in ascending order.
    fn keys(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-order rendering with two-space indentation per level.
    fn print(&self) -> String;

    /// Digest of the root node, [`crate::utils::hash::EMPTY_DIGEST`] for an empty tree.
    fn root_digest(&self) -> GitLiteResult<Digest> {
        Err(unsupported(self.kind(), "root_digest"))
    }

    /// Checks ordering, balance and digest invariants of the whole structure.
    fn verify(&self) -> GitLiteResult<()>;

    /// Rewrites the record of every live node.
    fn persist_all(&mut self, sink: &mut dyn RecordSink);

    /// Number of record writes or removals that failed and were absorbed.
    fn persistence_failures(&self) -> usize;
}

/// The closed set of index implementations, chosen once per repository.
#[derive(Debug, Clone)]
pub enum TreeIndex {
    Avl(AvlIndex),
    RedBlack(RedBlackIndex),
    BTree(BTreeIndex),
}

impl TreeIndex {
    pub fn new(config: &IndexConfig) -> GitLiteResult<Self> {
        Ok(match config.kind {
            IndexKind::Avl => TreeIndex::Avl(AvlIndex::new()),
            IndexKind::RedBlack => TreeIndex::RedBlack(RedBlackIndex::new()),
            IndexKind::BTree => TreeIndex::BTree(BTreeIndex::try_new(config.btree_min_degree)?),
        })
    }

    fn inner(&self) -> &dyn OrderedIndex {
        match self {
            TreeIndex::Avl(index) => index,
            TreeIndex::RedBlack(index) => index,
            TreeIndex::BTree(index) => index,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn OrderedIndex {
        match self {
            TreeIndex::Avl(index) => index,
            TreeIndex::RedBlack(index) => index,
            TreeIndex::BTree(index) => index,
        }
    }
}

impl OrderedIndex for TreeIndex {
    fn kind(&self) -> IndexKind {
        self.inner().kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner().capabilities()
    }

    fn insert(&mut self, key: &str, row: Row, sink: &mut dyn RecordSink) -> bool {
        self.inner_mut().insert(key, row, sink)
    }

    fn update(
        &mut self,
        column_index: usize,
        new_value: &str,
        condition_index: usize,
        condition_value: &str,
        sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        self.inner_mut().update(
            column_index,
            new_value,
            condition_index,
            condition_value,
            sink,
        )
    }

    fn remove(&mut self, key: &str, sink: &mut dyn RecordSink) -> GitLiteResult<bool> {
        self.inner_mut().remove(key, sink)
    }

    fn remove_range(
        &mut self,
        start: &str,
        end: &str,
        sink: &mut dyn RecordSink,
    ) -> GitLiteResult<usize> {
        self.inner_mut().remove_range(start, end, sink)
    }

    fn get(&self, key: &str) -> Option<&Row> {
        self.inner().get(key)
    }

    fn range(&self, start: &str, end: &str) -> Vec<(String, Row)> {
        self.inner().range(start, end)
    }

    fn keys(&self) -> Vec<String> {
        self.inner().keys()
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn print(&self) -> String {
        self.inner().print()
    }

    fn root_digest(&self) -> GitLiteResult<Digest> {
        self.inner().root_digest()
    }

    fn verify(&self) -> GitLiteResult<()> {
        self.inner().verify()
    }

    fn persist_all(&mut self, sink: &mut dyn RecordSink) {
        self.inner_mut().persist_all(sink)
    }

    fn persistence_failures(&self) -> usize {
        self.inner().persistence_failures()
    }
}
