use std::path::PathBuf;

use derive_with::With;

use crate::index::IndexKind;

pub const DEFAULT_BTREE_MIN_DEGREE: usize = 3;
pub const METADATA_FILE: &str = "repositories_metadata.txt";
pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, With)]
pub struct IndexConfig {
    pub kind: IndexKind,
    /// Minimum degree `t` of the B-tree variant; ignored by the binary trees.
    pub btree_min_degree: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            kind: IndexKind::Avl,
            btree_min_degree: DEFAULT_BTREE_MIN_DEGREE,
        }
    }
}

#[derive(Debug, Clone, With)]
pub struct WorkspaceConfig {
    /// Directory holding the metadata file and every `<name>-repo` directory.
    pub root: PathBuf,
    pub metadata_file: String,
}

impl WorkspaceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(&self.metadata_file)
    }

    pub fn repository_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}-repo"))
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            root: PathBuf::from("."),
            metadata_file: METADATA_FILE.to_string(),
        }
    }
}
