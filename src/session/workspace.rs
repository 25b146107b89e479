use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use tempfile::TempDir;

use crate::config::{IndexConfig, WorkspaceConfig};
use crate::error::{GitLiteError, GitLiteResult};
use crate::session::dataset::Dataset;
use crate::session::repository::{validate_name, Repository, RepositoryMeta};

/// Registry of repositories sharing one root directory.
///
/// The registry itself is persisted to the metadata file; repositories are
/// loaded lazily, when first switched to.
#[derive(Debug)]
pub struct Workspace {
    config: WorkspaceConfig,
    entries: BTreeMap<String, RepositoryMeta>,
    live: BTreeMap<String, Repository>,
    current: Option<String>,
    _temp_dir: Option<TempDir>,
}

impl Workspace {
    pub fn open(config: WorkspaceConfig) -> GitLiteResult<Self> {
        let entries = load_metadata(&config.metadata_path())?;
        debug!(
            "opened workspace {} with {} repositories",
            config.root.display(),
            entries.len()
        );
        Ok(Self {
            config,
            entries,
            live: BTreeMap::new(),
            current: None,
            _temp_dir: None,
        })
    }

    /// A workspace rooted in a temporary directory removed on drop.
    pub fn new_temp() -> GitLiteResult<Self> {
        let temp_dir = TempDir::new()?;
        let mut workspace = Self::open(WorkspaceConfig::new(temp_dir.path()))?;
        workspace._temp_dir = Some(temp_dir);
        Ok(workspace)
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Loads `csv_path`, indexes it on `key_column` and makes it current.
    pub fn init_repository(
        &mut self,
        name: &str,
        csv_path: impl AsRef<Path>,
        index: IndexConfig,
        key_column: &str,
    ) -> GitLiteResult<&Repository> {
        self.check_new_name(name)?;
        let dataset = Dataset::from_path(csv_path)?;
        self.init_from_dataset(name, &dataset, index, key_column)
    }

    pub fn init_from_dataset(
        &mut self,
        name: &str,
        dataset: &Dataset,
        index: IndexConfig,
        key_column: &str,
    ) -> GitLiteResult<&Repository> {
        self.check_new_name(name)?;
        let meta = RepositoryMeta {
            name: name.to_string(),
            directory: self.config.repository_dir(name),
            kind: index.kind,
            key_column: dataset.column_index(key_column)?,
            min_degree: index.btree_min_degree,
            columns: dataset.columns.join("|"),
        };
        if meta.directory.exists() {
            warn!(
                "refusing to initialize {} over existing directory {}",
                name,
                meta.directory.display()
            );
            return Err(GitLiteError::Repository(format!(
                "directory {} already exists",
                meta.directory.display()
            )));
        }
        let repository = Repository::create(meta.clone(), dataset)?;

        self.entries.insert(name.to_string(), meta);
        self.live.insert(name.to_string(), repository);
        self.current = Some(name.to_string());
        self.save_metadata()?;
        self.current()
    }

    fn check_new_name(&self, name: &str) -> GitLiteResult<()> {
        validate_name("repository", name)?;
        if self.entries.contains_key(name) {
            return Err(GitLiteError::Repository(format!(
                "repository {name} already exists"
            )));
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<&RepositoryMeta> {
        self.entries.values().collect()
    }

    pub fn switch(&mut self, name: &str) -> GitLiteResult<&Repository> {
        let meta = self
            .entries
            .get(name)
            .ok_or_else(|| GitLiteError::Repository(format!("repository {name} not found")))?;
        if !self.live.contains_key(name) {
            let repository = Repository::load(meta.clone())?;
            self.live.insert(name.to_string(), repository);
        }
        self.current = Some(name.to_string());
        info!("switched to repository {}", name);
        self.current()
    }

    /// Forgets `name` and removes its directory.
    pub fn delete_repository(&mut self, name: &str) -> GitLiteResult<()> {
        let meta = self
            .entries
            .remove(name)
            .ok_or_else(|| GitLiteError::Repository(format!("repository {name} not found")))?;
        self.live.remove(name);
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        if meta.directory.exists() {
            fs::remove_dir_all(&meta.directory)?;
        }
        self.save_metadata()?;
        info!("deleted repository {}", name);
        Ok(())
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> GitLiteResult<&Repository> {
        self.current
            .as_ref()
            .and_then(|name| self.live.get(name))
            .ok_or_else(no_active_repository)
    }

    pub fn current_mut(&mut self) -> GitLiteResult<&mut Repository> {
        self.current
            .as_ref()
            .and_then(|name| self.live.get_mut(name))
            .ok_or_else(no_active_repository)
    }

    fn save_metadata(&self) -> GitLiteResult<()> {
        fs::create_dir_all(&self.config.root)?;
        let mut writer = csv::Writer::from_path(self.config.metadata_path())?;
        for meta in self.entries.values() {
            writer.serialize(meta)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn no_active_repository() -> GitLiteError {
    GitLiteError::Repository("no active repository".to_string())
}

fn load_metadata(path: &Path) -> GitLiteResult<BTreeMap<String, RepositoryMeta>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut entries = BTreeMap::new();
    for meta in reader.deserialize::<RepositoryMeta>() {
        let meta = meta?;
        entries.insert(meta.name.clone(), meta);
    }
    Ok(entries)
}
