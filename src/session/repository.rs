use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{IndexConfig, DEFAULT_BRANCH};
use crate::error::{GitLiteError, GitLiteResult};
use crate::index::{IndexKind, OrderedIndex, Row, TreeIndex};
use crate::session::dataset::{resolve_column, Dataset};
use crate::storage::{FileSink, MemorySink};
use crate::utils::hash::Digest;

const COLUMN_SEPARATOR: char = '|';

/// One line of the workspace metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMeta {
    pub name: String,
    pub directory: PathBuf,
    pub kind: IndexKind,
    pub key_column: usize,
    pub min_degree: usize,
    /// Header names joined with `|`.
    pub columns: String,
}

impl RepositoryMeta {
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig::default()
            .with_kind(self.kind)
            .with_btree_min_degree(self.min_degree)
    }

    pub fn column_names(&self) -> Vec<String> {
        if self.columns.is_empty() {
            return vec![];
        }
        self.columns
            .split(COLUMN_SEPARATOR)
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Branch {
    index: TreeIndex,
    sink: FileSink,
}

/// A named, indexed dataset with git-like branches.
///
/// Every branch owns an independent index and mirrors it into its own record
/// directory: the default branch writes to the repository directory, other
/// branches to `<directory>/<branch>`.
#[derive(Debug)]
pub struct Repository {
    meta: RepositoryMeta,
    branches: BTreeMap<String, Branch>,
    current_branch: String,
}

pub(crate) fn validate_name(what: &str, name: &str) -> GitLiteResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(GitLiteError::InvalidArgument(format!(
            "invalid {what} name '{name}'"
        )))
    }
}

impl Repository {
    /// Builds the index from `dataset`, writing one record per node under
    /// `meta.directory`.
    pub fn create(meta: RepositoryMeta, dataset: &Dataset) -> GitLiteResult<Self> {
        let mut index = TreeIndex::new(&meta.index_config())?;
        let mut sink = FileSink::new(&meta.directory);
        fs::create_dir_all(sink.dir())?;

        let mut inserted = 0;
        for (line, row) in dataset.rows.iter().enumerate() {
            let Some(key) = row.get(meta.key_column) else {
                warn!(
                    "skipping row {} of {}: no value for key column {}",
                    line + 1,
                    meta.name,
                    meta.key_column
                );
                continue;
            };
            if index.insert(key, row.clone(), &mut sink) {
                inserted += 1;
            } else {
                warn!("skipping row {} of {}: duplicate key {}", line + 1, meta.name, key);
            }
        }
        info!(
            "initialized repository {} ({} index, {} keys)",
            meta.name, meta.kind, inserted
        );

        let mut branches = BTreeMap::new();
        branches.insert(DEFAULT_BRANCH.to_string(), Branch { index, sink });
        Ok(Self {
            meta,
            branches,
            current_branch: DEFAULT_BRANCH.to_string(),
        })
    }

    /// Rebuilds every branch from the records left in `meta.directory`.
    pub fn load(meta: RepositoryMeta) -> GitLiteResult<Self> {
        if !meta.directory.is_dir() {
            return Err(GitLiteError::Repository(format!(
                "directory {} of repository {} is missing",
                meta.directory.display(),
                meta.name
            )));
        }

        let mut branches = BTreeMap::new();
        branches.insert(
            DEFAULT_BRANCH.to_string(),
            Self::load_branch(&meta, &meta.directory)?,
        );
        for entry in fs::read_dir(&meta.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name("branch", &name).is_err() || name == DEFAULT_BRANCH {
                continue;
            }
            let branch = Self::load_branch(&meta, &entry.path())?;
            branches.insert(name, branch);
        }
        info!(
            "reloaded repository {} with {} branch(es)",
            meta.name,
            branches.len()
        );
        Ok(Self {
            meta,
            branches,
            current_branch: DEFAULT_BRANCH.to_string(),
        })
    }

    /// Re-inserts every stored entry, then rewrites the directory so the
    /// records match the rebuilt shape.
    fn load_branch(meta: &RepositoryMeta, dir: &Path) -> GitLiteResult<Branch> {
        let mut sink = FileSink::new(dir);
        let mut index = TreeIndex::new(&meta.index_config())?;
        let mut scratch = MemorySink::new();
        for record in sink.load_all()? {
            for (key, row) in record.entries() {
                index.insert(key, row, &mut scratch);
            }
        }
        sink.clear()?;
        index.persist_all(&mut sink);
        debug!("loaded {} keys from {}", index.len(), dir.display());
        Ok(Branch { index, sink })
    }

    pub fn meta(&self) -> &RepositoryMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn directory(&self) -> &Path {
        &self.meta.directory
    }

    pub fn columns(&self) -> Vec<String> {
        self.meta.column_names()
    }

    pub fn key_column(&self) -> usize {
        self.meta.key_column
    }

    pub fn current_branch(&self) -> &str {
        &self.current_branch
    }

    pub fn branches(&self) -> Vec<&str> {
        self.branches.keys().map(String::as_str).collect()
    }

    fn active(&self) -> GitLiteResult<&Branch> {
        self.branches.get(&self.current_branch).ok_or_else(|| {
            GitLiteError::Internal(format!("branch {} vanished", self.current_branch))
        })
    }

    fn active_mut(&mut self) -> GitLiteResult<&mut Branch> {
        let current = &self.current_branch;
        self.branches
            .get_mut(current)
            .ok_or_else(|| GitLiteError::Internal(format!("branch {current} vanished")))
    }

    pub fn index(&self) -> GitLiteResult<&TreeIndex> {
        Ok(&self.active()?.index)
    }

    fn resolve(&self, column: &str) -> GitLiteResult<usize> {
        let columns = self.columns();
        if columns.is_empty() {
            return column.parse().map_err(|_| {
                GitLiteError::InvalidArgument(format!("unknown column '{column}'"))
            });
        }
        resolve_column(&columns, column)
    }

    /// Inserts `row` under `key`; the key column of `row` must hold `key`.
    pub fn insert_row(&mut self, key: &str, row: Row) -> GitLiteResult<bool> {
        match row.get(self.meta.key_column) {
            Some(value) if value == key => {}
            Some(value) => {
                return Err(GitLiteError::InvalidArgument(format!(
                    "key '{key}' does not match key column value '{value}'"
                )))
            }
            None => {
                return Err(GitLiteError::InvalidArgument(format!(
                    "row has {} fields but the key column is {}",
                    row.len(),
                    self.meta.key_column
                )))
            }
        }
        let branch = self.active_mut()?;
        Ok(branch.index.insert(key, row, &mut branch.sink))
    }

    pub fn update(
        &mut self,
        column: &str,
        value: &str,
        condition_column: &str,
        condition_value: &str,
    ) -> GitLiteResult<usize> {
        let column = self.resolve(column)?;
        let condition_column = self.resolve(condition_column)?;
        if column == self.meta.key_column {
            return Err(GitLiteError::InvalidArgument(
                "the key column cannot be updated".to_string(),
            ));
        }
        let branch = self.active_mut()?;
        branch.index.update(
            column,
            value,
            condition_column,
            condition_value,
            &mut branch.sink,
        )
    }

    pub fn delete(&mut self, key: &str) -> GitLiteResult<bool> {
        let branch = self.active_mut()?;
        branch.index.remove(key, &mut branch.sink)
    }

    pub fn delete_range(&mut self, start: &str, end: &str) -> GitLiteResult<usize> {
        let branch = self.active_mut()?;
        branch.index.remove_range(start, end, &mut branch.sink)
    }

    pub fn select(&self, key: &str) -> GitLiteResult<Option<Row>> {
        Ok(self.active()?.index.get(key).cloned())
    }

    pub fn select_range(&self, start: &str, end: &str) -> GitLiteResult<Vec<Row>> {
        Ok(self
            .active()?
            .index
            .range(start, end)
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    pub fn print_tree(&self) -> GitLiteResult<String> {
        Ok(self.active()?.index.print())
    }

    pub fn root_hash(&self) -> GitLiteResult<Digest> {
        self.active()?.index.root_digest()
    }

    pub fn persistence_failures(&self) -> GitLiteResult<usize> {
        Ok(self.active()?.index.persistence_failures())
    }

    /// Forks the active branch into `name` and writes its full record set.
    pub fn create_branch(&mut self, name: &str) -> GitLiteResult<()> {
        validate_name("branch", name)?;
        if self.branches.contains_key(name) {
            return Err(GitLiteError::Repository(format!(
                "branch '{name}' already exists"
            )));
        }
        let mut index = self.active()?.index.clone();
        let mut sink = FileSink::new(self.meta.directory.join(name));
        fs::create_dir_all(sink.dir())?;
        sink.clear()?;
        index.persist_all(&mut sink);
        info!(
            "created branch {} of {} from {}",
            name, self.meta.name, self.current_branch
        );
        self.branches.insert(name.to_string(), Branch { index, sink });
        Ok(())
    }

    pub fn checkout(&mut self, name: &str) -> GitLiteResult<()> {
        if !self.branches.contains_key(name) {
            return Err(GitLiteError::Repository(format!(
                "branch '{name}' does not exist"
            )));
        }
        self.current_branch = name.to_string();
        info!("switched {} to branch {}", self.meta.name, name);
        Ok(())
    }
}
